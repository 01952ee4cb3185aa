use std::io;
use std::sync::Arc;
use std::time::Duration;

use console::Term;
use console::style;
use indicatif::ProgressBar;
use indicatif::ProgressStyle;

use crate::live::LiveView;
use crate::live::Phase;
use crate::poller::LiveSession;
use crate::poller::LiveStatsSource;
use crate::render::render_live;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum View {
    #[default]
    Config,
    Results {
        test_id: String,
    },
}

/// Top-level navigation between the configuration form and the live
/// results of one run.
#[derive(Debug, Default)]
pub struct App {
    view: View,
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    /// Switches to the results of `test_id`. Start responses without an id
    /// leave the form where it is.
    pub fn test_started(&mut self, test_id: Option<String>) -> bool {
        match test_id.filter(|id| !id.is_empty()) {
            Some(test_id) => {
                self.view = View::Results { test_id };
                true
            }
            None => false,
        }
    }

    pub fn back_to_config(&mut self) {
        self.view = View::Config;
    }

    pub fn active_test_id(&self) -> Option<&str> {
        match &self.view {
            View::Results { test_id } => Some(test_id),
            View::Config => None,
        }
    }
}

/// How following a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowEnd {
    Completed,
    Interrupted,
}

/// Terminal output of the live results view.
pub struct Screen {
    term: Term,
    spinner: Option<ProgressBar>,
}

impl Screen {
    pub fn new(term: Term) -> Self {
        Self {
            term,
            spinner: None,
        }
    }

    pub fn draw(&mut self, view: &LiveView) {
        if let Err(error) = self.try_draw(view) {
            tracing::warn!(%error, "failed to draw live results");
        }
    }

    fn try_draw(&mut self, view: &LiveView) -> io::Result<()> {
        if view.phase() == Phase::Loading && view.overlay().is_none() {
            let message = format!(
                "Loading live results for Test ID: {}...",
                view.test_id().unwrap_or_default()
            );
            self.spinner
                .get_or_insert_with(new_spinner)
                .set_message(message);
            return Ok(());
        }

        self.finish();
        if self.term.is_term() {
            self.term.clear_screen()?;
        }

        let mut screen = render_live(view);
        if view.should_poll() {
            screen.push_str(&format!(
                "\n{}\n",
                style("Press Ctrl-C to go back to the configuration.").dim()
            ));
        }
        self.term.write_str(&screen)?;
        self.term.flush()
    }

    pub fn finish(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }
}

fn new_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

/// Shows live results of the active run until it completes or the user
/// presses Ctrl-C, then returns the app to the configuration view. Polling
/// stops in both cases.
pub async fn follow_run<S: LiveStatsSource>(
    app: &mut App,
    source: Arc<S>,
    every: Duration,
    screen: &mut Screen,
) -> Option<FollowEnd> {
    let test_id = app.active_test_id()?.to_string();

    let mut session = LiveSession::new(source, every);
    session.attach(test_id.clone());
    screen.draw(session.view());

    let end = tokio::select! {
        _ = session.watch(|view| screen.draw(view)) => FollowEnd::Completed,
        _ = tokio::signal::ctrl_c() => FollowEnd::Interrupted,
    };

    screen.finish();
    session.detach();
    app.back_to_config();

    tracing::info!(%test_id, ?end, "stopped following run");
    Some(end)
}
