// src/harvest/feed_probe.rs
//! Link-based RSS discovery: fetch each candidate site page, scan its
//! `<link>` tags for RSS/Atom/XML alternates, resolve relative hrefs
//! against the page URL, validate each discovered feed by parsing it, and
//! register valid feeds with the feed registry. Every probed feed URL is
//! recorded, valid or not, so broken feeds stop costing a fetch per run.

use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::dedup::DedupSet;
use crate::feedxml;
use crate::fetch::{FeedClient, PageFetcher};
use crate::harvest::{CycleContext, CycleReport, HarvestCycle};
use crate::pacing::Pacer;
use crate::sinks::{FeedRecord, FeedRegistry};
use crate::store::LineStore;

pub struct RssLinkDiscovery {
    sites_store: LineStore,
    probed_store: LineStore,
    fetcher: Arc<dyn PageFetcher>,
    feed_client: Arc<dyn FeedClient>,
    registry: Arc<dyn FeedRegistry>,
    result_pacer: Pacer,
}

impl RssLinkDiscovery {
    pub fn new(
        sites_store: LineStore,
        probed_store: LineStore,
        fetcher: Arc<dyn PageFetcher>,
        feed_client: Arc<dyn FeedClient>,
        registry: Arc<dyn FeedRegistry>,
        result_pacer: Pacer,
    ) -> Self {
        Self {
            sites_store,
            probed_store,
            fetcher,
            feed_client,
            registry,
            result_pacer,
        }
    }

    /// Fetch + parse a discovered feed URL; a feed only counts when it has
    /// at least one entry.
    async fn validate_feed(&self, feed_url: &str, site_url: &str) -> Option<FeedRecord> {
        let xml = match self.feed_client.fetch(feed_url).await {
            Ok(xml) => xml,
            Err(e) => {
                debug!(%feed_url, error = ?e, "feed fetch failed");
                return None;
            }
        };
        let parsed = match feedxml::parse_feed(&xml) {
            Ok(p) => p,
            Err(e) => {
                debug!(%feed_url, error = ?e, "feed did not parse");
                return None;
            }
        };
        if parsed.entries.is_empty() {
            debug!(%feed_url, "feed has no entries");
            return None;
        }
        Some(FeedRecord {
            title: parsed.title.unwrap_or_else(|| feed_url.to_string()),
            feed_url: feed_url.to_string(),
            site_url: parsed.site_url.unwrap_or_else(|| site_url.to_string()),
        })
    }
}

#[async_trait]
impl HarvestCycle for RssLinkDiscovery {
    fn name(&self) -> &'static str {
        "feed-probe"
    }

    async fn run_once(&self, ctx: &CycleContext) -> Result<CycleReport> {
        let mut report = CycleReport::default();

        let sites = self.sites_store.lines()?;
        if sites.is_empty() {
            info!("no candidates: candidate url file is empty");
            return Ok(report);
        }

        let mut seen = DedupSet::preload_lines(self.probed_store.path());
        match self.registry.feed_urls().await {
            Ok(urls) => {
                for url in urls {
                    seen.insert(&url);
                }
            }
            Err(e) => warn!(error = ?e, "registry feed list unavailable, probing with file state only"),
        }

        for site in &sites {
            if ctx.cancelled() {
                break;
            }
            let html = match self.fetcher.fetch_html(site).await {
                Ok(h) => h,
                Err(e) => {
                    warn!(%site, error = ?e, "site fetch failed");
                    report.errors += 1;
                    continue;
                }
            };

            for feed_url in discover_feed_links(&html, site) {
                if ctx.cancelled() {
                    break;
                }
                report.candidates += 1;
                if seen.contains(&feed_url) {
                    report.skipped_seen += 1;
                    continue;
                }

                let outcome = self.validate_feed(&feed_url, site).await;
                // probed either way, so the next run skips this url
                if let Err(e) = self.probed_store.append_line(&feed_url) {
                    warn!(%feed_url, error = ?e, "could not record probed feed");
                    report.errors += 1;
                }
                seen.insert(&feed_url);

                match outcome {
                    Some(record) => {
                        if let Err(e) = self.registry.insert_feed(&record).await {
                            warn!(%feed_url, error = ?e, "feed registration failed");
                            report.errors += 1;
                        } else {
                            info!(%feed_url, title = %record.title, "feed registered");
                            report.persisted += 1;
                        }
                    }
                    None => report.rejected += 1,
                }
                self.result_pacer.wait().await;
            }
        }

        Ok(report)
    }
}

/// Pull feed URLs out of a page's `<link>` tags: any `type` mentioning
/// rss/atom/xml counts, and relative hrefs are resolved against the page
/// URL. Order-preserving, deduped.
pub fn discover_feed_links(html: &str, page_url: &str) -> Vec<String> {
    static RE_LINK: OnceCell<Regex> = OnceCell::new();
    static RE_ATTR: OnceCell<Regex> = OnceCell::new();
    let re_link = RE_LINK.get_or_init(|| Regex::new(r"(?is)<link\b[^>]*>").expect("link regex"));
    let re_attr = RE_ATTR.get_or_init(|| {
        Regex::new(r#"(?is)(type|href)\s*=\s*["']([^"']*)["']"#).expect("attr regex")
    });

    let base = url::Url::parse(page_url).ok();
    let mut out = Vec::new();
    for tag in re_link.find_iter(html) {
        let mut href = None;
        let mut kind = None;
        for cap in re_attr.captures_iter(tag.as_str()) {
            match cap[1].to_lowercase().as_str() {
                "href" => href = Some(cap[2].to_string()),
                "type" => kind = Some(cap[2].to_lowercase()),
                _ => {}
            }
        }
        let Some(href) = href else { continue };
        let Some(kind) = kind else { continue };
        if !(kind.contains("rss") || kind.contains("atom") || kind.contains("xml")) {
            continue;
        }
        let resolved = if href.starts_with("http") {
            Some(href)
        } else {
            base.as_ref()
                .and_then(|b| b.join(&href).ok())
                .map(|u| u.to_string())
        };
        if let Some(resolved) = resolved {
            if !out.contains(&resolved) {
                out.push(resolved);
            }
        }
    }
    out
}
