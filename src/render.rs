use std::fmt::Write;

use console::style;
use serde_json::Value;

use crate::form::FormState;
use crate::history::RunRecord;
use crate::live::LiveView;
use crate::live::Overlay;
use crate::live::Phase;
use crate::snapshot::LiveStats;
use crate::test_type::FieldKind;

const NOT_AVAILABLE: &str = "N/A";

/// Fixed-point rendering of an optional number, `N/A` when absent.
pub fn format_number(value: Option<f64>, digits: usize) -> String {
    match value {
        Some(value) if value.is_finite() => format!("{value:.digits$}"),
        _ => NOT_AVAILABLE.to_string(),
    }
}

/// Numeric keys such as `"95"` become `95.0%`, named keys stay.
pub fn format_percentile_key(key: &str) -> String {
    if key == "Total" {
        return key.to_string();
    }

    match key.trim().parse::<f64>() {
        Ok(num) if num.is_finite() => format!("{num:.1}%"),
        _ => key.to_string(),
    }
}

/// One line of the request statistics table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestRow {
    pub method: Option<String>,
    pub name: String,
    pub num_requests: Option<f64>,
    pub num_failures: Option<f64>,
    pub avg_response_time: Option<f64>,
    pub rps: Option<f64>,
    pub fail_per_sec: Option<f64>,
}

/// Per-endpoint rows. Structured `stats` entries are used when the backend
/// sends them; otherwise the rows are recovered from `response_times_avg`
/// keys of the form `"<METHOD> <name>"`, which misreads names without a
/// method prefix.
pub fn request_rows(stats: &LiveStats) -> Vec<RequestRow> {
    if let Some(entries) = &stats.stats {
        return entries
            .iter()
            .map(|entry| RequestRow {
                method: entry.method.clone(),
                name: entry.name.clone().unwrap_or_default(),
                num_requests: entry.num_requests,
                num_failures: entry.num_failures,
                avg_response_time: entry.avg_response_time,
                rps: entry.current_rps,
                fail_per_sec: entry.current_fail_per_sec,
            })
            .collect();
    }

    stats
        .response_times_avg
        .iter()
        .filter(|(key, _)| key.as_str() != "Total")
        .map(|(key, avg)| {
            let (method, name) = key.split_once(' ').unwrap_or((key.as_str(), key.as_str()));
            RequestRow {
                method: Some(method.to_string()),
                name: name.to_string(),
                avg_response_time: avg.as_f64(),
                ..Default::default()
            }
        })
        .collect()
}

/// Aggregate row from `stats_total`, falling back to the top-level rates.
pub fn total_row(stats: &LiveStats) -> Option<RequestRow> {
    let total = stats.stats_total.as_ref()?;

    Some(RequestRow {
        method: None,
        name: "Total".to_string(),
        num_requests: total.num_requests,
        num_failures: total.num_failures,
        avg_response_time: total.avg_response_time,
        rps: total.total_rps.filter(|v| *v != 0.0).or(stats.current_rps),
        fail_per_sec: total
            .total_fail_per_sec
            .filter(|v| *v != 0.0)
            .or(stats.current_fail_per_sec),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct PercentileTable {
    /// Raw keys of the `Total` entry.
    pub columns: Vec<String>,
    pub rows: Vec<(String, Vec<Option<f64>>)>,
}

pub fn percentile_table(stats: &LiveStats) -> PercentileTable {
    let columns: Vec<String> = stats
        .response_times_percentiles
        .get("Total")
        .and_then(Value::as_object)
        .map(|total| total.keys().cloned().collect())
        .unwrap_or_default();

    let rows = stats
        .response_times_percentiles
        .iter()
        .map(|(name, percentiles)| {
            let values = columns
                .iter()
                .map(|column| percentiles.get(column).and_then(Value::as_f64))
                .collect();
            (name.clone(), values)
        })
        .collect();

    PercentileTable { columns, rows }
}

struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    // columns from this index on are right aligned
    numeric_from: usize,
}

impl Table {
    fn new(headers: &[&str], numeric_from: usize) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: vec![],
            numeric_from,
        }
    }

    fn row(&mut self, cells: Vec<String>) {
        self.rows.push(cells);
    }

    fn render(&self, out: &mut String) {
        let widths: Vec<usize> = (0..self.headers.len())
            .map(|i| {
                self.rows
                    .iter()
                    .filter_map(|row| row.get(i))
                    .chain(std::iter::once(&self.headers[i]))
                    .map(|cell| console::measure_text_width(cell))
                    .max()
                    .unwrap_or_default()
            })
            .collect();

        let line = |cells: &[String]| {
            cells
                .iter()
                .zip(&widths)
                .enumerate()
                .map(|(i, (cell, width))| {
                    if i >= self.numeric_from {
                        format!("{cell:>width$}")
                    } else {
                        format!("{cell:<width$}")
                    }
                })
                .collect::<Vec<_>>()
                .join("  ")
        };

        let _ = writeln!(out, "{}", style(line(&self.headers)).bold());
        for row in &self.rows {
            let _ = writeln!(out, "{}", line(row));
        }
    }
}

fn heading(out: &mut String, title: &str) {
    let _ = writeln!(out, "\n{}", style(title).bold().cyan());
}

/// Full text of the live results screen.
pub fn render_live(view: &LiveView) -> String {
    let mut out = String::new();
    let test_id = view.test_id().unwrap_or_default();

    let Some(stats) = view.snapshot() else {
        match view.overlay() {
            Some(Overlay::HardError(error)) => {
                let _ = writeln!(out, "{} {error}", style("Error loading results:").red().bold());
            }
            Some(Overlay::Waiting(message)) => {
                let _ = writeln!(out, "Waiting for test data for Test ID: {test_id}...");
                let _ = writeln!(out, "{}", style(message).yellow());
            }
            _ => {
                let _ = writeln!(out, "Loading live results for Test ID: {test_id}...");
            }
        }
        return out;
    };

    let _ = writeln!(out, "{}", style("Live Test Results").bold().underlined());
    if let Some(Overlay::SoftError(error)) = view.overlay() {
        let _ = writeln!(out, "{} {error}", style("Update error:").yellow().bold());
    }

    heading(&mut out, "Overall Status");
    let _ = writeln!(
        out,
        "Test ID: {test_id}   State: {}   Users: {}",
        stats.state.as_deref().unwrap_or(NOT_AVAILABLE),
        format_number(stats.user_count, 0),
    );
    if view.phase() == Phase::Complete {
        let _ = writeln!(out, "{}", style("Test is complete.").green().bold());
    }

    heading(&mut out, "Key Metrics (Total)");
    let _ = write!(
        out,
        "RPS: {}   Failures/sec: {}   Requests: {}   Failures: {}",
        format_number(stats.current_rps, 2),
        format_number(stats.current_fail_per_sec, 2),
        format_number(stats.total_requests, 0),
        format_number(stats.total_failures, 0),
    );
    if let Some(avg) = stats
        .stats_total
        .as_ref()
        .and_then(|total| total.avg_response_time)
        .filter(|avg| *avg != 0.0)
    {
        let _ = write!(out, "   Avg RT (Total): {} ms", format_number(Some(avg), 2));
    }
    out.push('\n');

    heading(&mut out, "Request Statistics");
    let mut table = Table::new(
        &[
            "Method",
            "Name",
            "# Requests",
            "# Fails",
            "Avg. RT (ms)",
            "RPS",
            "Failures/s",
        ],
        2,
    );
    for row in request_rows(stats).into_iter().chain(total_row(stats)) {
        table.row(vec![
            row.method.unwrap_or_else(|| {
                if row.name == "Total" { String::new() } else { NOT_AVAILABLE.to_string() }
            }),
            row.name,
            format_number(row.num_requests, 0),
            format_number(row.num_failures, 0),
            format_number(row.avg_response_time, 2),
            format_number(row.rps, 2),
            format_number(row.fail_per_sec, 2),
        ]);
    }
    table.render(&mut out);

    heading(&mut out, "Response Time Percentiles (ms)");
    let percentiles = percentile_table(stats);
    let mut headers = vec!["Request (Name)".to_string()];
    headers.extend(percentiles.columns.iter().map(|key| format_percentile_key(key)));
    let mut table = Table {
        headers,
        rows: vec![],
        numeric_from: 1,
    };
    for (name, values) in percentiles.rows {
        let mut cells = vec![name];
        cells.extend(values.into_iter().map(|value| format_number(value, 2)));
        table.row(cells);
    }
    table.render(&mut out);

    if !stats.errors.is_empty() {
        let _ = writeln!(out, "\n{}", style("Errors").bold().red());
        let mut table = Table::new(&["Request", "Method", "Error", "Occurrences"], 3);
        for error in &stats.errors {
            table.row(vec![
                error.name.clone().unwrap_or_default(),
                error.method.clone().unwrap_or_default(),
                error.error.clone().unwrap_or_default(),
                format_number(error.occurrences, 0),
            ]);
        }
        table.render(&mut out);
    }

    out
}

/// Which inputs the configuration form offers for the current state.
pub fn render_form(form: &FormState) -> String {
    let mut out = String::new();
    let visibility = form.visibility();
    let mark = |offered: bool| {
        if offered {
            style("offered").green().to_string()
        } else {
            style("hidden").dim().to_string()
        }
    };

    let _ = writeln!(out, "{}", style(format!("{} form", form.test_type())).bold().underlined());

    heading(&mut out, "Request Details");
    for (name, value) in form.request.fields() {
        let _ = writeln!(out, "  {name:<14} {value}");
    }
    let _ = writeln!(out, "  {:<14} {}", "payloadType", mark(visibility.payload_type));
    let _ = writeln!(out, "  {:<14} {}", "inlinePayload", mark(visibility.inline_payload));

    heading(&mut out, &format!("Load Parameters ({})", form.test_type()));
    for (spec, value) in form.load().entries() {
        let kind = match spec.kind {
            FieldKind::Numeric => "number",
            FieldKind::Text => "text",
        };
        let _ = writeln!(
            out,
            "  {:<20} {:<18} {:<7} {}",
            spec.label(),
            spec.name,
            kind,
            value
        );
    }

    heading(&mut out, "Test Artifacts");
    let _ = writeln!(out, "  {:<20} {}", "dataFile", mark(visibility.data_file));
    let _ = writeln!(
        out,
        "  {:<20} {}",
        "payloadTemplateFile",
        mark(visibility.payload_template_file)
    );
    let _ = writeln!(out, "  {:<20} {}", "envVarsFile", mark(visibility.env_vars_file));

    out
}

pub fn render_history(records: &[RunRecord]) -> String {
    let mut out = String::new();

    if records.is_empty() {
        let _ = writeln!(out, "No runs recorded yet.");
        return out;
    }

    let mut table = Table::new(&["When", "Type", "Method", "Host", "URL"], 5);
    for record in records {
        table.row(vec![
            record.timestamp.clone(),
            record.test_type.clone(),
            record.param("method").to_string(),
            record.param("host").to_string(),
            record.param("url").to_string(),
        ]);
    }
    table.render(&mut out);
    out
}
