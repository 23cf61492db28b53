// src/harvest/news_dorks.rs
//! Dork-based news harvesting: search each news dork, fetch and extract
//! every previously unseen result, gate on the keyword list, and persist
//! accepted documents to the JSON-array store and every configured sink.
//! Rejected or failed URLs are not marked seen, so they get another chance
//! on the next run.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::dedup::DedupSet;
use crate::extract::Document;
use crate::fetch::{PageFetcher, SearchAdapter};
use crate::harvest::{CycleContext, CycleReport, HarvestCycle};
use crate::pacing::Pacer;
use crate::relevance::KeywordGate;
use crate::sinks::DocumentSink;
use crate::store::JsonArrayStore;

pub struct NewsDorkHarvest {
    search: Arc<dyn SearchAdapter>,
    fetcher: Arc<dyn PageFetcher>,
    gate: KeywordGate,
    news_store: JsonArrayStore,
    sinks: Vec<Arc<dyn DocumentSink>>,
    dorks: Vec<String>,
    results_per_dork: usize,
    inter_dork_pacer: Pacer,
    result_pacer: Pacer,
}

impl NewsDorkHarvest {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        search: Arc<dyn SearchAdapter>,
        fetcher: Arc<dyn PageFetcher>,
        gate: KeywordGate,
        news_store: JsonArrayStore,
        sinks: Vec<Arc<dyn DocumentSink>>,
        dorks: Vec<String>,
        results_per_dork: usize,
        inter_dork_pacer: Pacer,
        result_pacer: Pacer,
    ) -> Self {
        Self {
            search,
            fetcher,
            gate,
            news_store,
            sinks,
            dorks,
            results_per_dork,
            inter_dork_pacer,
            result_pacer,
        }
    }

    /// JSON store first (that is the dedup source of truth), then every
    /// sink on its own: one sink failing never blocks the others.
    async fn persist_document(&self, doc: &Document, report: &mut CycleReport) -> bool {
        if let Err(e) = self.news_store.append_async(doc).await {
            warn!(url = %doc.url, error = ?e, "news store append failed");
            report.errors += 1;
            return false;
        }
        true
    }

    async fn fan_out_to_sinks(&self, doc: &Document, report: &mut CycleReport) {
        for sink in &self.sinks {
            if let Err(e) = sink.persist(doc).await {
                warn!(sink = sink.name(), url = %doc.url, error = ?e, "sink persist failed");
                report.errors += 1;
            }
        }
    }
}

#[async_trait]
impl HarvestCycle for NewsDorkHarvest {
    fn name(&self) -> &'static str {
        "news-dorks"
    }

    async fn run_once(&self, ctx: &CycleContext) -> Result<CycleReport> {
        let mut report = CycleReport::default();
        if self.dorks.is_empty() {
            info!("no candidates: news dork list is empty");
            return Ok(report);
        }

        let mut seen = DedupSet::preload_json_array(self.news_store.path());
        debug!(preloaded = seen.len(), "seen urls preloaded from news store");

        for (i, dork) in self.dorks.iter().enumerate() {
            if ctx.cancelled() {
                break;
            }
            if i > 0 {
                tokio::select! {
                    _ = self.inter_dork_pacer.wait() => {}
                    _ = ctx.cancelled_wait() => break,
                }
            }

            let results = match self.search.search(dork, self.results_per_dork).await {
                Ok(r) => r,
                Err(e) => {
                    warn!(dork, engine = self.search.name(), error = ?e, "news dork search failed");
                    report.errors += 1;
                    continue;
                }
            };
            report.candidates += results.len();

            for url in results {
                if ctx.cancelled() {
                    break;
                }
                if !url.starts_with("http") {
                    report.rejected += 1;
                    continue;
                }
                if seen.contains(&url) {
                    report.skipped_seen += 1;
                    continue;
                }

                match self.fetcher.fetch_and_extract(&url).await {
                    Ok(doc) if self.gate.is_relevant(&doc.full_text()) => {
                        if self.persist_document(&doc, &mut report).await {
                            seen.insert(&url);
                            report.persisted += 1;
                            self.fan_out_to_sinks(&doc, &mut report).await;
                            info!(%url, dork, "news document harvested");
                        }
                    }
                    Ok(_) => {
                        debug!(%url, "document rejected by keyword gate");
                        report.rejected += 1;
                    }
                    Err(e) => {
                        warn!(%url, error = ?e, "fetch/extract failed");
                        report.errors += 1;
                    }
                }
                // every url that cost a fetch is paced, accepted or not
                self.result_pacer.wait().await;
            }
        }

        Ok(report)
    }
}
