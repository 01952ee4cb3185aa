#![allow(clippy::result_large_err)]

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use console::Term;
use miette::Diagnostic;
use miette::Result;
use reqwest::StatusCode;
use thiserror::Error;

use crate::app::App;
use crate::app::FollowEnd;
use crate::app::Screen;
use crate::app::View;
use crate::app::follow_run;
use crate::cli::Cli;
use crate::cli::Command;
use crate::client::ClientError;
use crate::client::PerfServiceClient;
use crate::client::StartResponse;
use crate::encoder::encode;
use crate::form::Attachment;
use crate::form::AttachmentSlot;
use crate::form::FormError;
use crate::form::FormState;
use crate::history::HistoryError;
use crate::history::RunHistory;
use crate::history::RunRecord;
use crate::parser::RunFile;
use crate::render::render_form;
use crate::render::render_history;
use crate::test_type::TestType;
use crate::validator::ValidationError;
use crate::validator::Validator;

mod app;
mod cli;
mod client;
mod encoder;
mod form;
mod history;
mod live;
mod logging;
mod parser;
mod poller;
mod render;
mod snapshot;
mod test_type;
mod validator;

#[derive(Error, Debug, Diagnostic)]
pub enum PerfDesignerError {
    #[error("Failed to read run file `{path}`")]
    RunFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse run file")]
    TomlParsing(#[from] toml::de::Error),

    #[error(transparent)]
    #[diagnostic(transparent)]
    ValidationError(#[from] ValidationError),

    #[error("Failed to read attachment `{path}`")]
    Attachment {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{0}")]
    #[diagnostic(help("Check the run file and try again."))]
    Form(#[from] FormError),

    #[error("Error: {0}")]
    Client(#[from] ClientError),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error("The performance service rejected the run with status {status}")]
    Rejected { status: StatusCode },
}

/// Reads and validates the run file at `path`.
///
/// The file is parsed from TOML and checked field by field; validation
/// errors point at the offending value in the file. `test_type` overrides
/// the file's own test type.
fn load_and_validate_run_file(
    path: &Path,
    test_type: Option<TestType>,
) -> Result<(FormState, Vec<(AttachmentSlot, PathBuf)>), PerfDesignerError> {
    let contents = std::fs::read_to_string(path).map_err(|source| PerfDesignerError::RunFile {
        path: path.to_path_buf(),
        source,
    })?;
    let run: RunFile = toml::from_str(&contents).map_err(PerfDesignerError::TomlParsing)?;

    let validator = Validator::new(&run, &contents, &path.to_string_lossy());
    let validated = validator.validate(test_type)?;

    Ok((validated.form, validated.files))
}

/// Reads every requested attachment into the form.
async fn attach_files(
    form: &mut FormState,
    files: Vec<(AttachmentSlot, PathBuf)>,
) -> Result<(), PerfDesignerError> {
    for (slot, path) in files {
        let attachment = Attachment::read(&path)
            .await
            .map_err(|source| PerfDesignerError::Attachment {
                path: path.clone(),
                source,
            })?;
        form.choose_file(slot, attachment)?;
    }

    Ok(())
}

fn history_path(cli: &Cli) -> PathBuf {
    let dir = cli.history_dir.clone().unwrap_or_else(RunHistory::default_dir);
    RunHistory::file_in(&dir)
}

/// Records the run and posts it, handing a returned test id to `app`.
///
/// Nothing is recorded or sent when the form does not validate. The record
/// is written before the request goes out, so runs the service rejects are
/// kept too. A history that cannot be written only produces a warning.
async fn submit(
    form: &mut FormState,
    client: &PerfServiceClient,
    history: Option<&mut RunHistory>,
    app: &mut App,
) -> Result<StartResponse, PerfDesignerError> {
    let submission = encode(form)?;
    let url = client.start_url(&submission)?;

    if let Some(history) = history {
        if let Err(error) = history.record(RunRecord::new(form)).await {
            tracing::warn!(%error, "failed to record run in history");
        }
    }

    println!(
        "{}",
        console::style(format!("Starting {} at {url}", form.test_type()))
            .bold()
            .cyan()
    );

    let response = client.start(submission).await?;
    form.set_response_summary(response.summary());
    app.test_started(response.test_id());

    Ok(response)
}

/// Submits the run in the run file and, unless `no_follow` is set, follows
/// its live results.
async fn start(
    cli: &Cli,
    path: &Path,
    test_type: Option<TestType>,
    no_follow: bool,
) -> Result<(), PerfDesignerError> {
    let (mut form, files) = load_and_validate_run_file(path, test_type)?;
    attach_files(&mut form, files).await?;

    let client = PerfServiceClient::new(&cli.base_url)?;
    let mut history = RunHistory::load(history_path(cli))
        .await
        .inspect_err(|error| tracing::warn!(%error, "failed to load run history"))
        .ok();

    let mut app = App::new();
    let response = submit(&mut form, &client, history.as_mut(), &mut app).await?;

    let title = if response.status.is_success() {
        console::style("Response:").green().bold()
    } else {
        console::style("Response:").red().bold()
    };
    println!("{title}\n{}", form.response_summary().unwrap_or_default());

    if !response.status.is_success() {
        return Err(PerfDesignerError::Rejected {
            status: response.status,
        });
    }

    let Some(test_id) = app.active_test_id() else {
        tracing::warn!("start response carried no test id, nothing to follow");
        return Ok(());
    };

    if no_follow {
        println!("Follow it with: perf_designer watch {test_id}");
        return Ok(());
    }

    follow(cli, &mut app, client).await;
    Ok(())
}

async fn follow(cli: &Cli, app: &mut App, client: PerfServiceClient) {
    let View::Results { test_id } = app.view() else {
        return;
    };
    let test_id = test_id.clone();
    let mut screen = Screen::new(Term::stdout());

    let end = follow_run(
        app,
        Arc::new(client),
        Duration::from_secs(cli.poll_interval),
        &mut screen,
    )
    .await;

    if end == Some(FollowEnd::Interrupted) {
        println!(
            "\n{}",
            console::style(format!("Stopped following Test ID: {test_id}")).yellow()
        );
    }
}

async fn watch(cli: &Cli, test_id: &str) -> Result<(), PerfDesignerError> {
    let client = PerfServiceClient::new(&cli.base_url)?;

    let mut app = App::new();
    app.test_started(Some(test_id.to_string()));
    follow(cli, &mut app, client).await;

    Ok(())
}

async fn history(cli: &Cli, limit: usize) -> Result<(), PerfDesignerError> {
    let history = RunHistory::load(history_path(cli)).await?;
    let records = history.records();

    print!("{}", render_history(&records[..limit.min(records.len())]));
    Ok(())
}

/// The form listing for a combination of choices. A data file is only
/// pretended where the form offers one; elsewhere a note says why.
fn form_preview(
    test_type: TestType,
    method: &str,
    payload_type: &str,
    with_data_file: bool,
) -> Result<String, PerfDesignerError> {
    let mut form = FormState::new(test_type);
    form.request.method = Some(method.parse()?);
    form.payload.kind = Some(payload_type.parse()?);

    let mut out = String::new();
    if with_data_file {
        if let Err(error) = form.choose_file(
            AttachmentSlot::DataFile,
            Attachment::new("data", Vec::new()),
        ) {
            out.push_str(&format!(
                "{}\n\n",
                console::style(format!("Note: {error}")).yellow()
            ));
        }
    }

    out.push_str(&render_form(&form));
    Ok(out)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);

    match &cli.command {
        Command::Start {
            path,
            test_type,
            no_follow,
        } => start(&cli, path, *test_type, *no_follow).await?,
        Command::Watch { test_id } => watch(&cli, test_id).await?,
        Command::History { limit } => history(&cli, *limit).await?,
        Command::Form {
            test_type,
            method,
            payload_type,
            with_data_file,
        } => print!(
            "{}",
            form_preview(*test_type, method, payload_type, *with_data_file)?
        ),
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::form::HttpMethod;

    fn ramp_up_form(host: &str) -> FormState {
        let mut form = FormState::new(TestType::RampUp);
        form.request.method = Some(HttpMethod::Post);
        form.request.url = "/orders".into();
        form.request.host = host.into();
        form.set_load("users", "10").unwrap();
        form
    }

    #[tokio::test]
    async fn rejected_run_is_still_recorded() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/perf-service/api/ramp-up/start");
                then.status(500)
                    .json_body(json!({"error": "Failed to start Locust process"}));
            })
            .await;
        let dir = tempfile::tempdir().unwrap();
        let path = RunHistory::file_in(dir.path());
        let mut history = RunHistory::load(&path).await.unwrap();
        let client = PerfServiceClient::new(&server.base_url()).unwrap();
        let mut app = App::new();
        let mut form = ramp_up_form("https://shop.example");

        let response = submit(&mut form, &client, Some(&mut history), &mut app)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(app.view(), &View::Config);
        assert!(
            form.response_summary()
                .unwrap()
                .contains("Failed to start Locust process")
        );

        let reloaded = RunHistory::load(&path).await.unwrap();
        assert_eq!(reloaded.records().len(), 1);
        assert_eq!(reloaded.records()[0].param("host"), "https://shop.example");
    }

    #[tokio::test]
    async fn invalid_form_is_neither_sent_nor_recorded() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200).json_body(json!({"test_id": "run-1"}));
            })
            .await;
        let dir = tempfile::tempdir().unwrap();
        let path = RunHistory::file_in(dir.path());
        let mut history = RunHistory::load(&path).await.unwrap();
        let client = PerfServiceClient::new(&server.base_url()).unwrap();
        let mut app = App::new();

        let err = submit(&mut ramp_up_form(""), &client, Some(&mut history), &mut app)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PerfDesignerError::Form(FormError::MissingRequired)
        ));
        mock.assert_hits_async(0).await;
        assert!(history.records().is_empty());
        assert!(!path.exists());
        assert_eq!(app.view(), &View::Config);
    }

    #[tokio::test]
    async fn accepted_run_opens_results() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/perf-service/api/ramp-up/start");
                then.status(200).json_body(json!({
                    "message": "Test (ramp-up) started successfully",
                    "test_id": "run-42"
                }));
            })
            .await;
        let client = PerfServiceClient::new(&server.base_url()).unwrap();
        let mut app = App::new();

        let response = submit(&mut ramp_up_form("h"), &client, None, &mut app)
            .await
            .unwrap();

        assert!(response.status.is_success());
        assert_eq!(
            app.view(),
            &View::Results {
                test_id: "run-42".into()
            }
        );
    }

    #[test]
    fn preview_notes_data_file_not_offered() {
        let out = form_preview(TestType::RampUp, "GET", "json", true).unwrap();
        let out = console::strip_ansi_codes(&out);

        assert!(out.contains("Note: the data file upload is not offered"));
        assert!(out.contains("Spawn Rate"));
    }

    #[test]
    fn preview_with_protobuf_data_file_hides_inline_payload() {
        let out = form_preview(TestType::Soak, "POST", "protobuf", true).unwrap();
        let out = console::strip_ansi_codes(&out);

        assert!(!out.contains("Note:"));
        assert!(out.contains("inlinePayload  hidden"));
        assert!(out.contains("payloadTemplateFile  hidden"));
    }

    #[test]
    fn preview_rejects_unknown_method() {
        assert!(matches!(
            form_preview(TestType::Soak, "TRACE", "json", false),
            Err(PerfDesignerError::Form(FormError::UnknownMethod(_)))
        ));
    }
}
