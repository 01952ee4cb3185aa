use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use flume::Receiver;
use flume::Sender;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::client::PerfServiceClient;
use crate::live::LiveView;
use crate::live::PollOutcome;
use crate::live::PollUpdate;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Anything that can report the live state of a run.
pub trait LiveStatsSource: Send + Sync + 'static {
    fn fetch_live(&self, test_id: &str) -> impl Future<Output = PollOutcome> + Send;
}

impl LiveStatsSource for PerfServiceClient {
    async fn fetch_live(&self, test_id: &str) -> PollOutcome {
        self.live_results(test_id).await.into()
    }
}

/// Polls `source` for `test_id` every `every` until a terminal snapshot has
/// been delivered or the receiving side is gone.
///
/// The first fetch happens immediately. Fetches never overlap: the next tick
/// is only awaited once the previous response was handled, and ticks missed
/// by a slow response are delayed instead of fired in a burst.
pub async fn poll_live<S: LiveStatsSource>(
    source: Arc<S>,
    test_id: String,
    every: Duration,
    tx: Sender<PollUpdate>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let outcome = source.fetch_live(&test_id).await;
        let terminal = matches!(&outcome, PollOutcome::Stats(stats) if stats.is_terminal());

        let update = PollUpdate {
            test_id: test_id.clone(),
            outcome,
        };
        if tx.send_async(update).await.is_err() {
            tracing::debug!(%test_id, "live view closed, stopping poller");
            break;
        }

        if terminal {
            tracing::info!(%test_id, "run complete, stopping poller");
            break;
        }
    }
}

/// Owns the polling task of one run. Dropping the handle stops polling.
#[derive(Debug)]
pub struct PollHandle {
    test_id: String,
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn spawn<S: LiveStatsSource>(
        source: Arc<S>,
        test_id: impl Into<String>,
        every: Duration,
        tx: Sender<PollUpdate>,
    ) -> Self {
        let test_id = test_id.into();
        let task = tokio::spawn(poll_live(source, test_id.clone(), every, tx));

        Self { test_id, task }
    }

}

impl Drop for PollHandle {
    fn drop(&mut self) {
        if !self.task.is_finished() {
            tracing::debug!(test_id = %self.test_id, "cancelling poller");
        }
        self.task.abort();
    }
}

/// The live results view wired to its poller.
///
/// At most one poller runs at a time. Attaching to another run tears the
/// current poller down before the new one starts, and anything the old one
/// already queued is discarded by the view as stale.
pub struct LiveSession<S> {
    source: Arc<S>,
    every: Duration,
    view: LiveView,
    poller: Option<PollHandle>,
    tx: Sender<PollUpdate>,
    rx: Receiver<PollUpdate>,
}

impl<S: LiveStatsSource> LiveSession<S> {
    pub fn new(source: Arc<S>, every: Duration) -> Self {
        let (tx, rx) = flume::unbounded();

        Self {
            source,
            every,
            view: LiveView::default(),
            poller: None,
            tx,
            rx,
        }
    }

    pub fn view(&self) -> &LiveView {
        &self.view
    }

    pub fn attach(&mut self, test_id: impl Into<String>) {
        let test_id = test_id.into();
        self.poller = None;
        self.view = LiveView::new(test_id.clone());

        tracing::info!(%test_id, every = ?self.every, "polling live results");
        self.poller = Some(PollHandle::spawn(
            self.source.clone(),
            test_id,
            self.every,
            self.tx.clone(),
        ));
    }

    /// Stops polling and forgets the current run.
    pub fn detach(&mut self) {
        self.poller = None;
        self.view.reset(None);
    }

    /// Waits for the next update of the current run and applies it.
    pub async fn next_update(&mut self) -> &LiveView {
        while let Ok(update) = self.rx.recv_async().await {
            if self.view.apply(update) {
                break;
            }
        }
        &self.view
    }

    /// Applies updates until the run completes, calling `on_update` after
    /// each one.
    pub async fn watch(&mut self, mut on_update: impl FnMut(&LiveView)) {
        while self.view.should_poll() {
            let view = self.next_update().await;
            on_update(view);
        }
        self.poller = None;
    }
}

#[cfg(test)]
mod test {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::live::Phase;
    use crate::snapshot::LiveStats;

    struct Scripted {
        outcomes: Mutex<VecDeque<PollOutcome>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(outcomes: impl IntoIterator<Item = PollOutcome>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into_iter().collect()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl LiveStatsSource for Scripted {
        async fn fetch_live(&self, _test_id: &str) -> PollOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| state("running"))
        }
    }

    fn state(state: &str) -> PollOutcome {
        PollOutcome::Stats(LiveStats {
            state: Some(state.into()),
            ..Default::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn stops_after_terminal_snapshot() {
        let source = Scripted::new([state("running"), state("running"), state("Finished")]);
        let (tx, rx) = flume::unbounded();

        poll_live(source.clone(), "run-1".into(), DEFAULT_POLL_INTERVAL, tx).await;
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(source.calls(), 3);
        assert_eq!(rx.drain().count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn polls_on_a_fixed_interval_until_dropped() {
        let source = Scripted::new([]);
        let (tx, rx) = flume::unbounded();

        let handle = PollHandle::spawn(source.clone(), "run-1", DEFAULT_POLL_INTERVAL, tx);
        tokio::time::sleep(Duration::from_millis(12_500)).await;

        // t = 0s, 5s and 10s
        assert_eq!(source.calls(), 3);
        assert_eq!(rx.drain().count(), 3);

        drop(handle);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_view_is_gone() {
        let source = Scripted::new([]);
        let (tx, rx) = flume::unbounded();
        drop(rx);

        poll_live(source.clone(), "run-1".into(), DEFAULT_POLL_INTERVAL, tx).await;

        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn session_watches_until_complete() {
        let source = Scripted::new([
            PollOutcome::Pending("initializing".into()),
            PollOutcome::Failed("connection reset".into()),
            state("running"),
            state("stopped"),
        ]);
        let mut session = LiveSession::new(source.clone(), DEFAULT_POLL_INTERVAL);
        session.attach("run-1");

        let mut phases = vec![];
        session.watch(|view| phases.push(view.phase())).await;

        assert_eq!(
            phases,
            [Phase::Loading, Phase::Loading, Phase::Live, Phase::Complete]
        );
        assert_eq!(session.view().phase(), Phase::Complete);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(source.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn reattaching_discards_the_previous_run() {
        let source = Scripted::new([]);
        let mut session = LiveSession::new(source.clone(), DEFAULT_POLL_INTERVAL);

        session.attach("run-1");
        session.next_update().await;
        assert_eq!(session.view().test_id(), Some("run-1"));

        session.attach("run-2");
        assert_eq!(session.view().phase(), Phase::Loading);

        let view = session.next_update().await;
        assert_eq!(view.test_id(), Some("run-2"));
        assert_eq!(view.phase(), Phase::Live);
        assert_eq!(session.poller.as_ref().map(|p| p.test_id.as_str()), Some("run-2"));

        session.detach();
        assert!(session.poller.is_none());
        assert_eq!(session.view().test_id(), None);
    }
}
