// src/harvest/mod.rs
//! Shared machinery for the recurring harvest cycles: the candidate and
//! report types, the `HarvestCycle` trait, the cancellation context, and
//! `run_guarded`, which is the single place cycle failures are converted
//! into logged, non-fatal outcomes.

pub mod alert_feeds;
pub mod feed_dorks;
pub mod feed_probe;
pub mod news_dorks;
pub mod registry_crawl;

use anyhow::Result;
use async_trait::async_trait;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::store::LineStore;

/// One-time metrics registration so series show up on whatever recorder
/// the host installs.
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("harvest_runs_total", "Completed cycle runs (success or caught failure).");
        describe_counter!("harvest_cycle_errors_total", "Cycle runs that ended in a caught error.");
        describe_counter!("harvest_persisted_total", "Records accepted and durably written.");
        describe_counter!("harvest_dedup_total", "Candidates skipped as already seen.");
        describe_counter!("harvest_rejected_total", "Candidates rejected by the relevance gate.");
        describe_counter!("harvest_search_errors_total", "Search adapter failures.");
        describe_counter!("harvest_fetch_errors_total", "Page/feed fetch failures.");
        describe_histogram!("harvest_fetch_extract_ms", "Fetch + extract time per page (ms).");
        describe_gauge!("harvest_last_run_ts", "Unix ts of each cycle's last completed run.");
    });
}

/// A discovered key (URL) awaiting fetch/validation, with whatever
/// metadata the source happened to carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub key: String,
    pub title: Option<String>,
}

impl Candidate {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            title: None,
        }
    }
}

/// Source adapter: hands a cycle its batch of candidate inputs. Failures
/// surface as errors the cycle logs and treats as "no candidates".
#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn fetch_candidates(&self) -> Result<Vec<Candidate>>;
    fn name(&self) -> &'static str;
}

/// Reads `url | optional title` lines from a file.
pub struct FileUrlSource {
    store: LineStore,
}

impl FileUrlSource {
    pub fn new(store: LineStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CandidateSource for FileUrlSource {
    async fn fetch_candidates(&self) -> Result<Vec<Candidate>> {
        let lines = self.store.lines()?;
        Ok(lines
            .iter()
            .filter_map(|line| {
                let mut parts = line.splitn(2, '|');
                let key = parts.next().unwrap_or("").trim();
                if key.is_empty() {
                    return None;
                }
                let title = parts
                    .next()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string);
                Some(Candidate {
                    key: key.to_string(),
                    title,
                })
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "file-urls"
    }
}

/// Per-run tallies a cycle reports back to the scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub candidates: usize,
    pub skipped_seen: usize,
    pub persisted: usize,
    pub rejected: usize,
    pub errors: usize,
}

/// Cooperative cancellation handle, observed between candidates and at
/// every sleep so shutdown never has to interrupt a write mid-flight.
#[derive(Clone)]
pub struct CycleContext {
    shutdown: watch::Receiver<bool>,
    // kept alive for detached contexts so `changed()` never errors out
    _hold: Option<Arc<watch::Sender<bool>>>,
}

impl CycleContext {
    pub(crate) fn from_receiver(shutdown: watch::Receiver<bool>) -> Self {
        Self {
            shutdown,
            _hold: None,
        }
    }

    /// A context that never cancels; used by tests and one-off runs.
    pub fn detached() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            shutdown: rx,
            _hold: Some(Arc::new(tx)),
        }
    }

    pub fn cancelled(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Resolves once cancellation is signalled; pending forever otherwise.
    pub async fn cancelled_wait(&self) {
        let mut rx = self.shutdown.clone();
        if *rx.borrow() {
            return;
        }
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
        // sender gone without a cancel: nothing will ever cancel us
        std::future::pending::<()>().await;
    }
}

/// One independently scheduled recurring harvesting task.
#[async_trait]
pub trait HarvestCycle: Send + Sync {
    fn name(&self) -> &'static str;
    async fn run_once(&self, ctx: &CycleContext) -> Result<CycleReport>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(CycleReport),
    Failed(String),
}

impl RunOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, RunOutcome::Failed(_))
    }
}

/// Run one cycle invocation, converting any error into a logged outcome.
/// A failing cycle never takes down the scheduler or its siblings.
pub async fn run_guarded(cycle: &dyn HarvestCycle, ctx: &CycleContext) -> RunOutcome {
    ensure_metrics_described();
    let name = cycle.name();
    let t0 = std::time::Instant::now();
    match cycle.run_once(ctx).await {
        Ok(report) => {
            counter!("harvest_runs_total", "cycle" => name).increment(1);
            counter!("harvest_persisted_total", "cycle" => name)
                .increment(report.persisted as u64);
            counter!("harvest_dedup_total", "cycle" => name)
                .increment(report.skipped_seen as u64);
            counter!("harvest_rejected_total", "cycle" => name)
                .increment(report.rejected as u64);
            info!(
                cycle = name,
                candidates = report.candidates,
                persisted = report.persisted,
                skipped_seen = report.skipped_seen,
                rejected = report.rejected,
                errors = report.errors,
                elapsed_ms = t0.elapsed().as_millis() as u64,
                "cycle completed"
            );
            RunOutcome::Completed(report)
        }
        Err(e) => {
            counter!("harvest_runs_total", "cycle" => name).increment(1);
            counter!("harvest_cycle_errors_total", "cycle" => name).increment(1);
            warn!(cycle = name, error = ?e, "cycle failed");
            RunOutcome::Failed(format!("{e:#}"))
        }
    }
}
