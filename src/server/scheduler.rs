use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::alerting::thresholds::{evaluate_snapshot, AlertThresholds};
use crate::models::Snapshot;
use crate::server::broadcaster::SnapshotBroadcaster;
use crate::server::simulator;
use crate::server::sites::SiteDirectory;
use crate::store::MetricsStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The tick ran; `sites_broadcast` sites made it through generation,
    /// persistence and fan-out.
    Completed { sites_broadcast: usize },
    /// A previous tick was still in flight, so this one was dropped whole.
    Skipped,
}

/// One execution of the sampling cycle across all online sites: generate,
/// persist, fan out, derive alerts. Per-site work runs as one task per
/// site, joined before the tick counts as complete; the one-permit
/// semaphore keeps whole ticks from ever overlapping.
pub struct TickPipeline {
    sites: Arc<SiteDirectory>,
    store: Arc<dyn MetricsStore>,
    broadcaster: Arc<SnapshotBroadcaster>,
    thresholds: AlertThresholds,
    in_flight: Semaphore,
}

impl TickPipeline {
    pub fn new(
        sites: Arc<SiteDirectory>,
        store: Arc<dyn MetricsStore>,
        broadcaster: Arc<SnapshotBroadcaster>,
        thresholds: AlertThresholds,
    ) -> Self {
        Self {
            sites,
            store,
            broadcaster,
            thresholds,
            in_flight: Semaphore::new(1),
        }
    }

    pub async fn run_tick(&self) -> TickOutcome {
        let _permit = match self.in_flight.try_acquire() {
            Ok(permit) => permit,
            Err(_) => {
                warn!("Previous tick still in flight; skipping this tick.");
                return TickOutcome::Skipped;
            }
        };

        let online = self.sites.online_sites();
        debug!(site_count = online.len(), "Tick started.");

        let mut tasks: JoinSet<Option<Snapshot>> = JoinSet::new();
        for site in online {
            let store = Arc::clone(&self.store);
            tasks.spawn(async move {
                let snapshot = simulator::generate_snapshot(&site, chrono::Utc::now());
                if snapshot.is_empty() {
                    // Already logged by the generator; skip this site only.
                    return None;
                }
                match store.insert_metrics(snapshot.samples()).await {
                    Ok(()) => Some(snapshot),
                    Err(e) => {
                        error!(site_id = %site.id, error = %e,
                            "Persisting tick samples failed; skipping broadcast for this site.");
                        None
                    }
                }
            });
        }

        let mut sites_broadcast = 0;
        while let Some(joined) = tasks.join_next().await {
            let snapshot = match joined {
                Ok(Some(snapshot)) => snapshot,
                Ok(None) => continue,
                Err(e) => {
                    error!(error = %e, "Per-site tick task panicked.");
                    continue;
                }
            };

            self.broadcaster.broadcast_snapshot(&snapshot).await;
            for alert in evaluate_snapshot(&snapshot, &self.thresholds) {
                info!(site_id = %alert.site_id, metric = ?alert.metric,
                    severity = ?alert.severity, "Power-quality alert derived.");
                self.broadcaster.broadcast_alert(&alert).await;
            }
            sites_broadcast += 1;
        }

        debug!(sites_broadcast, "Tick complete.");
        TickOutcome::Completed { sites_broadcast }
    }
}

/// Drives the pipeline on a fixed interval, independent of client
/// connections. `start` fires one tick immediately so subscribers get data
/// without waiting a full interval; `stop` lets an in-flight tick finish
/// and prevents further ones. Both are idempotent.
pub struct TickScheduler {
    pipeline: Arc<TickPipeline>,
    interval: Duration,
    running: AtomicBool,
    shutdown: std::sync::Mutex<Option<watch::Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TickScheduler {
    pub fn new(pipeline: Arc<TickPipeline>, interval: Duration) -> Self {
        Self {
            pipeline,
            interval,
            running: AtomicBool::new(false),
            shutdown: std::sync::Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("Scheduler already running; start is a no-op.");
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(());
        *self
            .shutdown
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(shutdown_tx);

        let pipeline = Arc::clone(&self.pipeline);
        let interval = self.interval;
        let task = tokio::spawn(async move {
            info!(interval_ms = interval.as_millis() as u64, "Tick scheduler started.");

            // First tick fires right away, before the periodic loop.
            pipeline.run_tick().await;

            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The interval's first tick completes immediately; the
            // immediate tick above already covered it.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        pipeline.run_tick().await;
                    }
                }
            }
            info!("Tick scheduler stopped.");
        });

        // start() is only called from async context in practice, but keep
        // the handle behind an async-aware lock for stop().
        if let Ok(mut guard) = self.handle.try_lock() {
            *guard = Some(task);
        }
    }

    /// Signals shutdown and waits for any in-flight tick to finish.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            debug!("Scheduler not running; stop is a no-op.");
            return;
        }

        let shutdown_tx = self
            .shutdown
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(tx) = shutdown_tx {
            let _ = tx.send(());
        }

        let task = self.handle.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(error = %e, "Scheduler task ended abnormally.");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
