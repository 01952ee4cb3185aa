use crate::snapshot::LiveStats;

/// Substring of the backend error that marks a run id it has never seen.
pub const UNKNOWN_RUN_MARKER: &str = "Test ID not found";

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Stats(LiveStats),
    /// The backend accepted the id but has no statistics yet.
    Pending(String),
    Failed(String),
}

/// A poll result, tagged with the run it was fetched for.
#[derive(Debug, Clone, PartialEq)]
pub struct PollUpdate {
    pub test_id: String,
    pub outcome: PollOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Loading,
    Live,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overlay<'a> {
    /// Nothing to show and the last fetch failed.
    HardError(&'a str),
    /// The last fetch failed, the previous snapshot is still shown.
    SoftError(&'a str),
    Waiting(&'a str),
}

/// State of the live results view for a single run.
#[derive(Debug, Clone, Default)]
pub struct LiveView {
    test_id: Option<String>,
    snapshot: Option<LiveStats>,
    error: Option<String>,
    waiting: Option<String>,
    complete: bool,
}

impl LiveView {
    pub fn new(test_id: impl Into<String>) -> Self {
        let mut view = Self::default();
        view.reset(Some(test_id.into()));
        view
    }

    /// Starts over for `test_id`; everything learned about the previous run
    /// is dropped.
    pub fn reset(&mut self, test_id: Option<String>) {
        self.test_id = test_id;
        self.snapshot = None;
        self.error = None;
        self.waiting = None;
        self.complete = false;
    }

    pub fn test_id(&self) -> Option<&str> {
        self.test_id.as_deref()
    }

    pub fn snapshot(&self) -> Option<&LiveStats> {
        self.snapshot.as_ref()
    }

    pub fn should_poll(&self) -> bool {
        self.test_id.is_some() && !self.complete
    }

    pub fn phase(&self) -> Phase {
        if self.complete {
            Phase::Complete
        } else if self.snapshot.is_some() {
            Phase::Live
        } else {
            Phase::Loading
        }
    }

    pub fn overlay(&self) -> Option<Overlay<'_>> {
        match (&self.error, &self.snapshot, &self.waiting) {
            (Some(error), None, _) => Some(Overlay::HardError(error)),
            (Some(error), Some(_), _) => Some(Overlay::SoftError(error)),
            (None, _, Some(message)) => Some(Overlay::Waiting(message)),
            (None, _, None) => None,
        }
    }

    /// Applies a poll result. Returns `false` when the update belongs to
    /// another run and was ignored.
    pub fn apply(&mut self, update: PollUpdate) -> bool {
        if self.test_id.as_deref() != Some(update.test_id.as_str()) {
            tracing::debug!(test_id = %update.test_id, "ignoring stale poll result");
            return false;
        }

        match update.outcome {
            PollOutcome::Stats(stats) => {
                if stats.is_terminal() {
                    tracing::info!(
                        test_id = %update.test_id,
                        state = stats.state.as_deref().unwrap_or_default(),
                        "run reported as complete"
                    );
                    self.complete = true;
                }
                self.snapshot = Some(stats);
                self.error = None;
                self.waiting = None;
            }
            PollOutcome::Pending(message) => {
                self.error = None;
                self.waiting = Some(message);
            }
            PollOutcome::Failed(message) => {
                tracing::warn!(test_id = %update.test_id, error = %message, "live results poll failed");
                if message.contains(UNKNOWN_RUN_MARKER) {
                    self.snapshot = None;
                }
                self.error = Some(message);
            }
        }

        true
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn update(test_id: &str, outcome: PollOutcome) -> PollUpdate {
        PollUpdate {
            test_id: test_id.into(),
            outcome,
        }
    }

    fn stats(state: &str, rps: f64) -> PollOutcome {
        PollOutcome::Stats(LiveStats {
            state: Some(state.into()),
            current_rps: Some(rps),
            ..Default::default()
        })
    }

    #[test]
    fn loading_then_live_then_complete() {
        let mut view = LiveView::new("run-1");
        assert_eq!(view.phase(), Phase::Loading);
        assert!(view.should_poll());

        assert!(view.apply(update("run-1", stats("running", 3.0))));
        assert_eq!(view.phase(), Phase::Live);
        assert!(view.should_poll());

        assert!(view.apply(update("run-1", stats("Finished", 0.0))));
        assert_eq!(view.phase(), Phase::Complete);
        assert_eq!(view.overlay(), None);
        assert!(!view.should_poll());
    }

    #[test]
    fn unknown_run_drops_snapshot() {
        let mut view = LiveView::new("run-1");
        view.apply(update("run-1", stats("running", 3.0)));

        view.apply(update(
            "run-1",
            PollOutcome::Failed(
                "Test ID not found or results directory does not exist.".into(),
            ),
        ));

        assert!(view.snapshot().is_none());
        assert!(matches!(view.overlay(), Some(Overlay::HardError(_))));
        assert_eq!(view.phase(), Phase::Loading);
    }

    #[test]
    fn other_failures_keep_last_snapshot() {
        let mut view = LiveView::new("run-1");
        view.apply(update("run-1", stats("running", 3.0)));

        view.apply(update(
            "run-1",
            PollOutcome::Failed("connection refused".into()),
        ));

        assert_eq!(view.snapshot().and_then(|s| s.current_rps), Some(3.0));
        assert_eq!(view.overlay(), Some(Overlay::SoftError("connection refused")));
        assert!(view.should_poll());

        view.apply(update("run-1", stats("running", 4.0)));
        assert_eq!(view.overlay(), None);
    }

    #[test]
    fn failure_before_first_snapshot_is_hard() {
        let mut view = LiveView::new("run-1");
        view.apply(update("run-1", PollOutcome::Failed("timeout".into())));

        assert_eq!(view.overlay(), Some(Overlay::HardError("timeout")));
        assert!(view.should_poll());
    }

    #[test]
    fn pending_keeps_snapshot() {
        let mut view = LiveView::new("run-1");
        view.apply(update(
            "run-1",
            PollOutcome::Pending("Log file not yet created.".into()),
        ));
        assert_eq!(view.overlay(), Some(Overlay::Waiting("Log file not yet created.")));
        assert_eq!(view.phase(), Phase::Loading);

        view.apply(update("run-1", stats("running", 1.0)));
        view.apply(update("run-1", PollOutcome::Pending("again".into())));
        assert_eq!(view.phase(), Phase::Live);
    }

    #[test]
    fn stale_updates_are_ignored() {
        let mut view = LiveView::new("run-1");
        view.reset(Some("run-2".into()));

        assert!(!view.apply(update("run-1", stats("finished", 9.0))));
        assert!(view.snapshot().is_none());
        assert!(view.should_poll());
    }

    #[test]
    fn reset_clears_everything() {
        let mut view = LiveView::new("run-1");
        view.apply(update("run-1", stats("stopped", 1.0)));
        view.apply(update("run-1", PollOutcome::Failed("x".into())));

        view.reset(Some("run-2".into()));

        assert_eq!(view.test_id(), Some("run-2"));
        assert_eq!(view.phase(), Phase::Loading);
        assert_eq!(view.overlay(), None);
        assert!(view.should_poll());
    }
}
