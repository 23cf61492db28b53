// src/scheduler.rs
//! Runs each registered cycle on its own tokio task: run once immediately,
//! then sleep the cycle's interval and run again. Tasks are independent,
//! so a slow or failing cycle never delays another's re-arm. Shutdown is
//! cooperative through a watch channel observed by every sleep and by the
//! cycles themselves between candidates.

use metrics::gauge;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::harvest::{ensure_metrics_described, run_guarded, CycleContext, HarvestCycle, RunOutcome};

/// Per-cycle bookkeeping exposed by `snapshot()`.
#[derive(Debug, Clone)]
pub struct ScheduleEntry {
    pub name: &'static str,
    pub interval: Duration,
    pub runs: u64,
    pub failures: u64,
    pub last_outcome: Option<RunOutcome>,
    pub last_duration: Option<Duration>,
    /// Unix seconds of the last completed run.
    pub last_run_unix: Option<i64>,
}

impl ScheduleEntry {
    fn new(name: &'static str, interval: Duration) -> Self {
        Self {
            name,
            interval,
            runs: 0,
            failures: 0,
            last_outcome: None,
            last_duration: None,
            last_run_unix: None,
        }
    }
}

pub struct Scheduler {
    pending: Vec<(Arc<dyn HarvestCycle>, Duration, Arc<Mutex<ScheduleEntry>>)>,
    handles: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    entries: Vec<Arc<Mutex<ScheduleEntry>>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            pending: Vec::new(),
            handles: Vec::new(),
            shutdown_tx,
            shutdown_rx,
            entries: Vec::new(),
        }
    }

    pub fn register(&mut self, cycle: Arc<dyn HarvestCycle>, interval: Duration) {
        let entry = Arc::new(Mutex::new(ScheduleEntry::new(cycle.name(), interval)));
        self.entries.push(Arc::clone(&entry));
        self.pending.push((cycle, interval, entry));
    }

    /// Spawn one loop task per registered cycle. Every cycle runs once
    /// right away; re-arm happens after the run completes, so real cadence
    /// is interval plus run duration.
    pub fn start(&mut self) {
        ensure_metrics_described();
        for (cycle, interval, entry) in self.pending.drain(..) {
            let ctx = CycleContext::from_receiver(self.shutdown_rx.clone());
            info!(cycle = cycle.name(), interval_secs = interval.as_secs(), "cycle scheduled");
            self.handles.push(tokio::spawn(async move {
                loop {
                    if ctx.cancelled() {
                        break;
                    }
                    let t0 = Instant::now();
                    let outcome = run_guarded(cycle.as_ref(), &ctx).await;
                    record_run(&entry, cycle.name(), &outcome, t0.elapsed());

                    tokio::select! {
                        _ = tokio::time::sleep(interval) => {}
                        _ = ctx.cancelled_wait() => break,
                    }
                }
                info!(cycle = cycle.name(), "cycle loop drained");
            }));
        }
    }

    /// Flip the shutdown signal; running cycles stop at their next
    /// cancellation point and sleeping loops wake immediately.
    pub fn shutdown(&self) {
        if self.shutdown_tx.send(true).is_err() {
            warn!("shutdown signalled with no live cycle tasks");
        }
    }

    /// Wait for every cycle loop to drain.
    pub async fn join(&mut self) {
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = ?e, "cycle task ended abnormally");
            }
        }
    }

    /// Entries in registration order.
    pub fn snapshot(&self) -> Vec<ScheduleEntry> {
        self.entries
            .iter()
            .map(|e| e.lock().unwrap_or_else(|p| p.into_inner()).clone())
            .collect()
    }
}

fn record_run(
    entry: &Mutex<ScheduleEntry>,
    name: &'static str,
    outcome: &RunOutcome,
    elapsed: Duration,
) {
    let now = chrono::Utc::now().timestamp();
    gauge!("harvest_last_run_ts", "cycle" => name).set(now as f64);
    let mut entry = entry.lock().unwrap_or_else(|p| p.into_inner());
    entry.runs += 1;
    if outcome.is_failed() {
        entry.failures += 1;
    }
    entry.last_outcome = Some(outcome.clone());
    entry.last_duration = Some(elapsed);
    entry.last_run_unix = Some(now);
}
