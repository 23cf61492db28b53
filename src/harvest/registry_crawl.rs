// src/harvest/registry_crawl.rs
//! Registry-driven crawl: drain the feed registry's unread entry links,
//! mark each read up front, then fetch + extract + gate + persist. Marking
//! read first means a crashed run does not re-crawl the same batch; the
//! JSON store preload still guards against duplicate documents.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::dedup::DedupSet;
use crate::extract::Document;
use crate::fetch::PageFetcher;
use crate::harvest::{CycleContext, CycleReport, HarvestCycle};
use crate::pacing::Pacer;
use crate::relevance::KeywordGate;
use crate::sinks::{DocumentSink, FeedRegistry};
use crate::store::JsonArrayStore;

pub struct RegistryCrawl {
    registry: Arc<dyn FeedRegistry>,
    fetcher: Arc<dyn PageFetcher>,
    gate: KeywordGate,
    news_store: JsonArrayStore,
    sinks: Vec<Arc<dyn DocumentSink>>,
    result_pacer: Pacer,
}

impl RegistryCrawl {
    pub fn new(
        registry: Arc<dyn FeedRegistry>,
        fetcher: Arc<dyn PageFetcher>,
        gate: KeywordGate,
        news_store: JsonArrayStore,
        sinks: Vec<Arc<dyn DocumentSink>>,
        result_pacer: Pacer,
    ) -> Self {
        Self {
            registry,
            fetcher,
            gate,
            news_store,
            sinks,
            result_pacer,
        }
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
impl HarvestCycle for RegistryCrawl {
    fn name(&self) -> &'static str {
        "registry-crawl"
    }

    async fn run_once(&self, ctx: &CycleContext) -> Result<CycleReport> {
        let mut report = CycleReport::default();

        let unread = self.registry.unread_links().await?;
        if unread.is_empty() {
            info!("no candidates: registry has no unread entries");
            return Ok(report);
        }
        report.candidates = unread.len();

        let mut seen = DedupSet::preload_json_array(self.news_store.path());

        for url in &unread {
            if ctx.cancelled() {
                break;
            }

            if let Err(e) = self.registry.mark_read(url).await {
                warn!(%url, error = ?e, "could not mark entry read");
                report.errors += 1;
            }

            if seen.contains(url) {
                report.skipped_seen += 1;
                continue;
            }

            match self.fetcher.fetch_and_extract(url).await {
                Ok(doc) if self.gate.is_relevant(&doc.full_text()) => {
                    match self.news_store.append_async(&doc).await {
                        Ok(()) => {
                            seen.insert(url);
                            report.persisted += 1;
                            self.fan_out_to_sinks(&doc, &mut report).await;
                            info!(%url, "registry entry harvested");
                        }
                        Err(e) => {
                            warn!(%url, error = ?e, "news store append failed");
                            report.errors += 1;
                        }
                    }
                }
                Ok(_) => {
                    debug!(%url, "entry rejected by keyword gate");
                    report.rejected += 1;
                }
                Err(e) => {
                    warn!(%url, error = ?e, "fetch/extract failed");
                    report.errors += 1;
                }
            }
            // every entry that cost a fetch is paced, accepted or not
            self.result_pacer.wait().await;
        }

        Ok(report)
    }
}
