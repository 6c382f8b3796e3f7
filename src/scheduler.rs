use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::models::WatchKey;
use crate::utils::error::{AppError, Result};
use crate::watch_manager::{WatchCheckResult, WatchManager};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    Idle,
    Running,
}

/// Tally of one recurring pass over every stored watch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CycleReport {
    pub attempted: usize,
    /// A price was obtained.
    pub checked: usize,
    pub failed: usize,
    pub alerts_sent: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub phase: CyclePhase,
    pub running: bool,
    pub recheck_interval_secs: u64,
    pub cycles_completed: u64,
    pub last_cycle_started_at: Option<DateTime<Utc>>,
    pub last_cycle_finished_at: Option<DateTime<Utc>>,
    pub last_report: Option<CycleReport>,
    pub pending_checks: usize,
}

/// Result of asking for a one-off check.
#[derive(Debug, Clone)]
pub enum OneOffCheck {
    /// Zero delay: the check ran before returning.
    Completed(WatchCheckResult),
    Scheduled { job_id: Uuid, run_at: DateTime<Utc> },
}

struct SchedulerInner {
    manager: Arc<WatchManager>,
    interval: Duration,
    max_concurrent_checks: usize,
    max_delay: Duration,
    token: CancellationToken,
    pending: Mutex<HashMap<Uuid, JoinHandle<()>>>,
    stats: RwLock<SchedulerStats>,
    // Serializes recurring and manually triggered cycles
    cycle_lock: Mutex<()>,
}

/// Drives the check coordinator: a recurring pass over all watches on a fixed
/// interval, plus one-off checks for newly registered watches.
pub struct RecheckScheduler {
    inner: Arc<SchedulerInner>,
    run_on_start: bool,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl RecheckScheduler {
    pub fn new(manager: Arc<WatchManager>, config: &SchedulerConfig) -> Self {
        let interval = config.recheck_interval();
        Self {
            inner: Arc::new(SchedulerInner {
                manager,
                interval,
                max_concurrent_checks: config.max_concurrent_checks.max(1),
                max_delay: config.max_delay(),
                token: CancellationToken::new(),
                pending: Mutex::new(HashMap::new()),
                stats: RwLock::new(SchedulerStats {
                    phase: CyclePhase::Idle,
                    running: false,
                    recheck_interval_secs: interval.as_secs(),
                    cycles_completed: 0,
                    last_cycle_started_at: None,
                    last_cycle_finished_at: None,
                    last_report: None,
                    pending_checks: 0,
                }),
                cycle_lock: Mutex::new(()),
            }),
            run_on_start: config.run_on_start,
            loop_handle: Mutex::new(None),
        }
    }

    /// Overrides the recurring interval. Only valid before [`start`](Self::start).
    pub fn with_interval(mut self, interval: Duration) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.interval = interval;
            inner.stats.get_mut().recheck_interval_secs = interval.as_secs();
        }
        self
    }

    pub fn manager(&self) -> &Arc<WatchManager> {
        &self.inner.manager
    }

    pub fn max_delay(&self) -> Duration {
        self.inner.max_delay
    }

    /// Spawns the recurring loop. The first cycle runs immediately when
    /// `run_on_start` is set, otherwise after one interval.
    pub async fn start(&self) -> Result<()> {
        let mut slot = self.loop_handle.lock().await;
        if slot.is_some() {
            return Err(AppError::Internal("Recheck scheduler already started".to_string()));
        }
        if self.inner.token.is_cancelled() {
            return Err(AppError::Internal("Recheck scheduler has been shut down".to_string()));
        }

        let inner = Arc::clone(&self.inner);
        let period = inner.interval;
        let first_tick = if self.run_on_start {
            Instant::now()
        } else {
            Instant::now() + period
        };

        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(first_tick, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = inner.token.cancelled() => break,
                    _ = ticker.tick() => {
                        inner.run_cycle().await;
                    }
                }
            }
            tracing::debug!("Recheck loop exited");
        }));

        self.inner.stats.write().await.running = true;
        tracing::info!(interval_secs = period.as_secs(), "Recheck scheduler started");
        Ok(())
    }

    /// Stops the loop and drops pending one-off checks. A cycle in progress
    /// gets `grace` to finish before it is aborted.
    pub async fn shutdown(&self, grace: Duration) {
        self.inner.token.cancel();

        {
            let mut pending = self.inner.pending.lock().await;
            for (job_id, handle) in pending.drain() {
                handle.abort();
                tracing::debug!(%job_id, "Cancelled pending one-off check");
            }
        }

        if let Some(handle) = self.loop_handle.lock().await.take() {
            let abort = handle.abort_handle();
            if tokio::time::timeout(grace, handle).await.is_err() {
                tracing::warn!("Recheck cycle did not finish within {:?}, aborting", grace);
                abort.abort();
            }
        }

        let mut stats = self.inner.stats.write().await;
        stats.running = false;
        stats.phase = CyclePhase::Idle;
        tracing::info!("Recheck scheduler shutdown");
    }

    /// Runs one recurring cycle now and waits for it to finish.
    pub async fn run_cycle(&self) -> CycleReport {
        self.inner.run_cycle().await
    }

    /// Checks one watch after `delay`. A zero delay runs the check inline and
    /// returns its result; anything up to the configured maximum is spawned.
    pub async fn check_once(&self, key: WatchKey, delay: Duration) -> Result<OneOffCheck> {
        if delay > self.inner.max_delay {
            return Err(AppError::Validation(format!(
                "Delay must be at most {} minutes",
                self.inner.max_delay.as_secs() / 60
            )));
        }

        if delay.is_zero() {
            let result = self.inner.manager.check_watch(&key).await?;
            return Ok(OneOffCheck::Completed(result));
        }

        if self.inner.token.is_cancelled() {
            return Err(AppError::Internal("Recheck scheduler has been shut down".to_string()));
        }

        let job_id = Uuid::new_v4();
        let run_at = self.inner.manager.now()
            + chrono::Duration::from_std(delay).map_err(|e| AppError::Internal(e.to_string()))?;

        // Held until the handle is stored so the task cannot deregister first
        let mut pending = self.inner.pending.lock().await;
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = inner.token.cancelled() => {
                    tracing::debug!(%job_id, "One-off check cancelled before it ran");
                }
                _ = tokio::time::sleep(delay) => {
                    match inner.manager.check_watch(&key).await {
                        Ok(result) => tracing::info!(
                            %job_id,
                            %key,
                            checked = result.checked,
                            alerted = result.alerted,
                            "One-off check finished"
                        ),
                        Err(e) => tracing::error!(%job_id, %key, error = %e, "One-off check failed"),
                    }
                }
            }
            inner.pending.lock().await.remove(&job_id);
        });
        pending.insert(job_id, handle);

        tracing::info!(%job_id, %run_at, "One-off check scheduled");
        Ok(OneOffCheck::Scheduled { job_id, run_at })
    }

    pub async fn phase(&self) -> CyclePhase {
        self.inner.stats.read().await.phase
    }

    pub async fn pending_checks(&self) -> usize {
        self.inner.pending.lock().await.len()
    }

    pub async fn stats(&self) -> SchedulerStats {
        let mut stats = self.inner.stats.read().await.clone();
        stats.pending_checks = self.pending_checks().await;
        stats
    }
}

impl SchedulerInner {
    async fn run_cycle(&self) -> CycleReport {
        let _cycle = self.cycle_lock.lock().await;
        let start_time = Instant::now();

        {
            let mut stats = self.stats.write().await;
            stats.phase = CyclePhase::Running;
            stats.last_cycle_started_at = Some(self.manager.now());
        }

        let mut report = CycleReport::default();
        match self.manager.list_watches().await {
            Ok(watches) => {
                tracing::info!(watches = watches.len(), "Starting recheck cycle");
                let results: Vec<Result<WatchCheckResult>> = stream::iter(watches)
                    .map(|watch| {
                        let manager = Arc::clone(&self.manager);
                        async move { manager.check_watch(&watch.key()).await }
                    })
                    .buffer_unordered(self.max_concurrent_checks)
                    .collect()
                    .await;

                for result in results {
                    report.attempted += 1;
                    match result {
                        Ok(result) if result.checked => {
                            report.checked += 1;
                            if result.alerted {
                                report.alerts_sent += 1;
                            }
                        }
                        Ok(_) => report.failed += 1,
                        Err(e) => {
                            report.failed += 1;
                            tracing::error!(error = %e, "Watch check errored during cycle");
                        }
                    }
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to load watches for recheck cycle");
            }
        }

        report.duration_ms = start_time.elapsed().as_millis() as u64;
        metrics::counter!("pricewatch_cycles_total").increment(1);

        {
            let mut stats = self.stats.write().await;
            stats.phase = CyclePhase::Idle;
            stats.cycles_completed += 1;
            stats.last_cycle_finished_at = Some(self.manager.now());
            stats.last_report = Some(report.clone());
        }

        tracing::info!(
            attempted = report.attempted,
            checked = report.checked,
            failed = report.failed,
            alerts_sent = report.alerts_sent,
            "Recheck cycle finished"
        );
        report
    }
}
