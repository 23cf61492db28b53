// src/harvest/alert_feeds.rs
//! Alert feed refresh: read alert feed URLs (Google-Alerts style) from the
//! feed list file, pull every feed, unwrap redirect/tracking links to the
//! real article URLs, and rewrite the candidate URL file with the fresh
//! list. This cycle feeds the discovery cycles; it has no dedup set of its
//! own because it replaces its output wholesale.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::feedxml;
use crate::fetch::{redirect_target, FeedClient};
use crate::harvest::{Candidate, CandidateSource, CycleContext, CycleReport, HarvestCycle};
use crate::store::LineStore;

pub struct AlertFeedRefresh {
    source: Arc<dyn CandidateSource>,
    feed_client: Arc<dyn FeedClient>,
    urls_store: LineStore,
}

impl AlertFeedRefresh {
    pub fn new(
        source: Arc<dyn CandidateSource>,
        feed_client: Arc<dyn FeedClient>,
        urls_store: LineStore,
    ) -> Self {
        Self {
            source,
            feed_client,
            urls_store,
        }
    }

    async fn collect_entry_urls(&self, feed: &Candidate, report: &mut CycleReport) -> Vec<String> {
        let xml = match self.feed_client.fetch(&feed.key).await {
            Ok(xml) => xml,
            Err(e) => {
                warn!(feed = %feed.key, error = ?e, "alert feed fetch failed");
                report.errors += 1;
                return Vec::new();
            }
        };
        let parsed = match feedxml::parse_feed(&xml) {
            Ok(p) => p,
            Err(e) => {
                warn!(feed = %feed.key, error = ?e, "alert feed unparsable");
                report.errors += 1;
                return Vec::new();
            }
        };
        if parsed.entries.is_empty() {
            warn!(feed = %feed.key, "no entries found in alert feed");
            report.rejected += 1;
            return Vec::new();
        }
        parsed
            .entry_links()
            .into_iter()
            .map(|link| redirect_target(&link, "url").unwrap_or(link))
            .collect()
    }
}

#[async_trait]
impl HarvestCycle for AlertFeedRefresh {
    fn name(&self) -> &'static str {
        "alert-feeds"
    }

    async fn run_once(&self, ctx: &CycleContext) -> Result<CycleReport> {
        let mut report = CycleReport::default();

        let feeds = match self.source.fetch_candidates().await {
            Ok(f) => f,
            Err(e) => {
                warn!(source = self.source.name(), error = ?e, "alert feed list unavailable, skipping run");
                return Ok(report);
            }
        };
        if feeds.is_empty() {
            info!("no candidates: alert feed list is empty");
            return Ok(report);
        }
        report.candidates = feeds.len();

        let mut urls: Vec<String> = Vec::new();
        for feed in &feeds {
            if ctx.cancelled() {
                break;
            }
            for url in self.collect_entry_urls(feed, &mut report).await {
                if !urls.contains(&url) {
                    urls.push(url);
                }
            }
        }

        if urls.is_empty() {
            warn!("no valid urls were extracted from any alert feed");
            return Ok(report);
        }

        self.urls_store.rewrite(&urls)?;
        report.persisted = urls.len();
        info!(count = urls.len(), path = %self.urls_store.path().display(), "alert urls refreshed");
        Ok(report)
    }
}
