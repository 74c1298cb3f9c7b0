//! Dashboard polling with an all-or-nothing join and a staleness guard.
//!
//! Each refresh cycle takes the next generation number and fetches all six
//! dashboard datasets concurrently. A cycle commits only if every fetch
//! succeeded, it is still the most recently started cycle, and the aggregator
//! has not been stopped. Cycles triggered by the timer, by
//! [`PollingAggregator::refresh_now`], or by the initial load may overlap;
//! whichever started last wins, regardless of completion order.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use staxtrade_core::{AnalyticsSnapshot, DashboardData};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::error::ApiError;

/// Shortest timer period accepted; shorter requests are raised to this.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Something that can fetch a complete dashboard.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetch all datasets, failing if any one of them fails.
    async fn fetch(&self) -> Result<DashboardData, ApiError>;
}

/// Published snapshot; `None` until the first successful cycle.
pub type SnapshotReceiver = watch::Receiver<Option<Arc<AnalyticsSnapshot>>>;

/// What happened to one refresh cycle.
#[derive(Debug)]
pub enum CycleOutcome {
    /// The cycle's data is now the published snapshot.
    Committed { generation: u64 },
    /// A later cycle started first; this one's data was discarded.
    Superseded { generation: u64, latest: u64 },
    /// The aggregator was stopped before the cycle could commit.
    Cancelled { generation: u64 },
    /// At least one fetch failed; the previous snapshot is kept.
    Failed { generation: u64, error: ApiError },
}

impl CycleOutcome {
    #[must_use]
    pub const fn generation(&self) -> u64 {
        match self {
            Self::Committed { generation }
            | Self::Superseded { generation, .. }
            | Self::Cancelled { generation }
            | Self::Failed { generation, .. } => *generation,
        }
    }

    #[must_use]
    pub const fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }
}

struct Inner {
    source: Arc<dyn SnapshotSource>,
    interval: Duration,
    /// Highest generation started so far.
    started: AtomicU64,
    auto_refresh: AtomicBool,
    cancel: CancellationToken,
    snapshot: watch::Sender<Option<Arc<AnalyticsSnapshot>>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

/// Cloneable handle to a dashboard poller.
#[derive(Clone)]
pub struct PollingAggregator {
    inner: Arc<Inner>,
}

impl PollingAggregator {
    /// Create an idle aggregator. Auto-refresh starts enabled.
    ///
    /// `interval` is raised to [`MIN_INTERVAL`] if shorter.
    #[must_use]
    pub fn new(source: Arc<dyn SnapshotSource>, interval: Duration) -> Self {
        if interval < MIN_INTERVAL {
            warn!(requested_ms = interval.as_millis(), "Polling interval too short, using minimum");
        }
        let interval = interval.max(MIN_INTERVAL);
        let (snapshot, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                source,
                interval,
                started: AtomicU64::new(0),
                auto_refresh: AtomicBool::new(true),
                cancel: CancellationToken::new(),
                snapshot,
                timer: Mutex::new(None),
            }),
        }
    }

    /// Start the timer. The first cycle runs immediately; later ticks only
    /// start a cycle while auto-refresh is on.
    ///
    /// Calling `start` on a running or stopped aggregator does nothing.
    pub async fn start(&self) {
        let mut timer = self.inner.timer.lock().await;
        if timer.is_some() || self.inner.cancel.is_cancelled() {
            return;
        }

        let inner = Arc::clone(&self.inner);
        *timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(inner.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut initial = true;

            loop {
                tokio::select! {
                    () = inner.cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if initial || inner.auto_refresh.load(Ordering::SeqCst) {
                            initial = false;
                            let cycle = Arc::clone(&inner);
                            tokio::spawn(async move {
                                cycle.run_cycle().await;
                            });
                        }
                    }
                }
            }
            debug!("Polling timer stopped");
        }));
        info!(interval_secs = self.inner.interval.as_secs(), "Polling started");
    }

    /// Stop the timer for good. In-flight cycles may finish fetching but
    /// will not commit.
    pub async fn stop(&self) {
        self.inner.cancel.cancel();
        if let Some(handle) = self.inner.timer.lock().await.take() {
            handle.abort();
        }
        info!("Polling stopped");
    }

    /// Run one cycle now, independent of the timer and auto-refresh flag.
    pub async fn refresh_now(&self) -> CycleOutcome {
        self.inner.run_cycle().await
    }

    /// Enable or disable timer-driven cycles.
    pub fn set_auto_refresh(&self, enabled: bool) {
        let previous = self.inner.auto_refresh.swap(enabled, Ordering::SeqCst);
        if previous != enabled {
            info!(enabled, "Auto-refresh toggled");
        }
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    #[must_use]
    pub fn auto_refresh(&self) -> bool {
        self.inner.auto_refresh.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Latest committed snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Option<Arc<AnalyticsSnapshot>> {
        self.inner.snapshot.borrow().clone()
    }

    /// Watch committed snapshots.
    #[must_use]
    pub fn subscribe(&self) -> SnapshotReceiver {
        self.inner.snapshot.subscribe()
    }

    /// Highest generation started so far.
    #[must_use]
    pub fn latest_generation(&self) -> u64 {
        self.inner.started.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for PollingAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollingAggregator")
            .field("interval", &self.inner.interval)
            .field("latest_generation", &self.latest_generation())
            .field("auto_refresh", &self.auto_refresh())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

impl Inner {
    async fn run_cycle(&self) -> CycleOutcome {
        let generation = self.started.fetch_add(1, Ordering::SeqCst) + 1;
        let span = info_span!("poll_cycle", generation);

        async {
            if self.cancel.is_cancelled() {
                return CycleOutcome::Cancelled { generation };
            }

            match self.source.fetch().await {
                Ok(data) => self.commit(generation, data),
                Err(error) => {
                    warn!(error = %error, "Dashboard refresh failed, keeping previous snapshot");
                    CycleOutcome::Failed { generation, error }
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Publish `data` if this cycle is still current.
    fn commit(&self, generation: u64, data: DashboardData) -> CycleOutcome {
        let mut outcome = CycleOutcome::Committed { generation };

        self.snapshot.send_if_modified(|current| {
            if self.cancel.is_cancelled() {
                outcome = CycleOutcome::Cancelled { generation };
                return false;
            }
            let latest = self.started.load(Ordering::SeqCst);
            let committed = current.as_ref().map_or(0, |s| s.fetched_at_generation);
            if generation != latest || generation <= committed {
                outcome = CycleOutcome::Superseded {
                    generation,
                    latest: latest.max(committed),
                };
                return false;
            }

            *current = Some(Arc::new(AnalyticsSnapshot {
                data,
                fetched_at_generation: generation,
                fetched_at: Utc::now(),
            }));
            true
        });

        match &outcome {
            CycleOutcome::Committed { .. } => debug!("Snapshot committed"),
            CycleOutcome::Superseded { latest, .. } => {
                debug!(latest, "Discarding superseded snapshot");
            }
            _ => debug!("Discarding snapshot after stop"),
        }
        outcome
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::VecDeque;

    use staxtrade_core::Summary;
    use tokio::sync::oneshot;

    use super::*;

    fn data(products: u64) -> DashboardData {
        DashboardData {
            summary: Summary {
                products,
                ..Summary::default()
            },
            ..DashboardData::default()
        }
    }

    /// Source whose fetches complete only when the test releases them.
    #[derive(Default)]
    struct GatedSource {
        gates: std::sync::Mutex<VecDeque<oneshot::Receiver<Result<DashboardData, ApiError>>>>,
    }

    impl GatedSource {
        fn gate(&self) -> oneshot::Sender<Result<DashboardData, ApiError>> {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().unwrap().push_back(rx);
            tx
        }
    }

    #[async_trait]
    impl SnapshotSource for GatedSource {
        async fn fetch(&self) -> Result<DashboardData, ApiError> {
            let gate = self.gates.lock().unwrap().pop_front().unwrap();
            gate.await.unwrap()
        }
    }

    /// Yield until `n` cycles have started and parked on their gates.
    async fn started(aggregator: &PollingAggregator, n: u64) {
        while aggregator.latest_generation() < n {
            tokio::task::yield_now().await;
        }
    }

    struct ImmediateSource;

    #[async_trait]
    impl SnapshotSource for ImmediateSource {
        async fn fetch(&self) -> Result<DashboardData, ApiError> {
            Ok(data(7))
        }
    }

    #[tokio::test]
    async fn test_later_cycle_wins_even_if_earlier_finishes_last() {
        let source = Arc::new(GatedSource::default());
        let gate_a = source.gate();
        let gate_b = source.gate();
        let aggregator = PollingAggregator::new(source.clone(), Duration::from_secs(60));

        let cycle_a = tokio::spawn({
            let aggregator = aggregator.clone();
            async move { aggregator.refresh_now().await }
        });
        started(&aggregator, 1).await;
        let cycle_b = tokio::spawn({
            let aggregator = aggregator.clone();
            async move { aggregator.refresh_now().await }
        });
        started(&aggregator, 2).await;

        // B finishes first, then A.
        gate_b.send(Ok(data(2))).unwrap();
        let outcome_b = cycle_b.await.unwrap();
        assert!(matches!(outcome_b, CycleOutcome::Committed { generation: 2 }));

        gate_a.send(Ok(data(1))).unwrap();
        let outcome_a = cycle_a.await.unwrap();
        assert!(matches!(
            outcome_a,
            CycleOutcome::Superseded { generation: 1, latest: 2 }
        ));

        let snapshot = aggregator.snapshot().unwrap();
        assert_eq!(snapshot.fetched_at_generation, 2);
        assert_eq!(snapshot.data.summary.products, 2);
    }

    #[tokio::test]
    async fn test_earlier_cycle_cannot_commit_while_later_in_flight() {
        let source = Arc::new(GatedSource::default());
        let gate_a = source.gate();
        let gate_b = source.gate();
        let aggregator = PollingAggregator::new(source.clone(), Duration::from_secs(60));

        let cycle_a = tokio::spawn({
            let aggregator = aggregator.clone();
            async move { aggregator.refresh_now().await }
        });
        started(&aggregator, 1).await;
        let cycle_b = tokio::spawn({
            let aggregator = aggregator.clone();
            async move { aggregator.refresh_now().await }
        });
        started(&aggregator, 2).await;

        gate_a.send(Ok(data(1))).unwrap();
        assert!(!cycle_a.await.unwrap().is_committed());
        assert!(aggregator.snapshot().is_none());

        gate_b.send(Ok(data(2))).unwrap();
        assert!(cycle_b.await.unwrap().is_committed());
        assert_eq!(aggregator.snapshot().unwrap().data.summary.products, 2);
    }

    #[tokio::test]
    async fn test_failed_cycle_keeps_previous_snapshot() {
        let source = Arc::new(GatedSource::default());
        let aggregator = PollingAggregator::new(source.clone(), Duration::from_secs(60));

        source.gate().send(Ok(data(5))).unwrap();
        assert!(aggregator.refresh_now().await.is_committed());

        source
            .gate()
            .send(Err(ApiError::Server { status: 500 }))
            .unwrap();
        let outcome = aggregator.refresh_now().await;
        assert!(matches!(
            outcome,
            CycleOutcome::Failed { generation: 2, error: ApiError::Server { status: 500 } }
        ));

        let snapshot = aggregator.snapshot().unwrap();
        assert_eq!(snapshot.fetched_at_generation, 1);
        assert_eq!(snapshot.data.summary.products, 5);
    }

    #[tokio::test]
    async fn test_stop_prevents_in_flight_commit() {
        let source = Arc::new(GatedSource::default());
        let gate = source.gate();
        let aggregator = PollingAggregator::new(source.clone(), Duration::from_secs(60));

        let cycle = tokio::spawn({
            let aggregator = aggregator.clone();
            async move { aggregator.refresh_now().await }
        });
        started(&aggregator, 1).await;

        aggregator.stop().await;
        gate.send(Ok(data(1))).unwrap();

        assert!(matches!(
            cycle.await.unwrap(),
            CycleOutcome::Cancelled { generation: 1 }
        ));
        assert!(aggregator.snapshot().is_none());
        assert!(matches!(
            aggregator.refresh_now().await,
            CycleOutcome::Cancelled { generation: 2 }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_runs_initial_load_and_respects_auto_refresh() {
        let aggregator = PollingAggregator::new(Arc::new(ImmediateSource), Duration::from_secs(10));
        let mut updates = aggregator.subscribe();

        aggregator.set_auto_refresh(false);
        aggregator.start().await;

        // Initial load runs even with auto-refresh off.
        updates.changed().await.unwrap();
        assert_eq!(aggregator.snapshot().unwrap().fetched_at_generation, 1);

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(aggregator.latest_generation(), 1);

        aggregator.set_auto_refresh(true);
        tokio::time::sleep(Duration::from_secs(10)).await;
        updates.changed().await.unwrap();
        assert!(aggregator.latest_generation() >= 2);

        aggregator.stop().await;
        let stopped_at = aggregator.latest_generation();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(aggregator.latest_generation(), stopped_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_is_raised_to_minimum() {
        let aggregator = PollingAggregator::new(Arc::new(ImmediateSource), Duration::ZERO);
        assert_eq!(aggregator.interval(), MIN_INTERVAL);

        let mut updates = aggregator.subscribe();
        aggregator.start().await;
        tokio::time::timeout(Duration::from_secs(5), updates.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(aggregator.snapshot().unwrap().fetched_at_generation, 1);

        aggregator.stop().await;
        assert!(aggregator.is_stopped());
    }
}
