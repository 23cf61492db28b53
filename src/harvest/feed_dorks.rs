// src/harvest/feed_dorks.rs
//! Dork-based feed discovery: one search per configured dork, appending
//! every previously unseen http(s) result URL to the candidate URL file.
//! Appends happen immediately per result, so a crash mid-run loses at most
//! the result in flight. The seen set is rebuilt from the file each run.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::dedup::DedupSet;
use crate::fetch::SearchAdapter;
use crate::harvest::{CycleContext, CycleReport, HarvestCycle};
use crate::pacing::Pacer;
use crate::store::LineStore;

pub struct FeedDorkDiscovery {
    search: Arc<dyn SearchAdapter>,
    urls_store: LineStore,
    dorks: Vec<String>,
    results_per_dork: usize,
    search_pacer: Pacer,
    result_pacer: Pacer,
}

impl FeedDorkDiscovery {
    pub fn new(
        search: Arc<dyn SearchAdapter>,
        urls_store: LineStore,
        dorks: Vec<String>,
        results_per_dork: usize,
        search_pacer: Pacer,
        result_pacer: Pacer,
    ) -> Self {
        Self {
            search,
            urls_store,
            dorks,
            results_per_dork,
            search_pacer,
            result_pacer,
        }
    }
}

#[async_trait]
impl HarvestCycle for FeedDorkDiscovery {
    fn name(&self) -> &'static str {
        "feed-dorks"
    }

    async fn run_once(&self, ctx: &CycleContext) -> Result<CycleReport> {
        let mut report = CycleReport::default();
        if self.dorks.is_empty() {
            info!("no candidates: dork list is empty");
            return Ok(report);
        }

        let mut seen = DedupSet::preload_lines(self.urls_store.path());
        debug!(preloaded = seen.len(), "seen urls preloaded from candidate file");

        for (i, dork) in self.dorks.iter().enumerate() {
            if ctx.cancelled() {
                break;
            }
            if i > 0 {
                tokio::select! {
                    _ = self.search_pacer.wait() => {}
                    _ = ctx.cancelled_wait() => break,
                }
            }

            let results = match self.search.search(dork, self.results_per_dork).await {
                Ok(r) => r,
                Err(e) => {
                    warn!(dork, engine = self.search.name(), error = ?e, "feed dork search failed");
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
                match self.urls_store.append_line(&url) {
                    Ok(()) => {
                        seen.insert(&url);
                        report.persisted += 1;
                        debug!(%url, dork, "candidate url recorded");
                    }
                    Err(e) => {
                        warn!(%url, error = ?e, "could not record candidate url");
                        report.errors += 1;
                        continue;
                    }
                }
                self.result_pacer.wait().await;
            }
        }

        info!(
            new_urls = report.persisted,
            skipped = report.skipped_seen,
            "feed dork discovery finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct CannedSearch {
        results: HashMap<String, Vec<String>>,
    }

    #[async_trait]
    impl SearchAdapter for CannedSearch {
        async fn search(&self, query: &str, limit: usize) -> Result<Vec<String>> {
            let mut r = self
                .results
                .get(query)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("engine rejected `{query}`"))?;
            r.truncate(limit);
            Ok(r)
        }

        fn name(&self) -> &'static str {
            "canned"
        }
    }

    fn fast_pacer() -> Pacer {
        Pacer::between_ms(0, 1)
    }

    fn cycle(store: LineStore, results: HashMap<String, Vec<String>>) -> FeedDorkDiscovery {
        FeedDorkDiscovery::new(
            Arc::new(CannedSearch { results }),
            store,
            results_keys_sorted(),
            10,
            fast_pacer(),
            fast_pacer(),
        )
    }

    fn results_keys_sorted() -> Vec<String> {
        vec!["dork-a".to_string(), "dork-b".to_string()]
    }

    #[tokio::test]
    async fn repeated_results_are_appended_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = LineStore::new(dir.path().join("urls.txt"));
        let mut results = HashMap::new();
        results.insert(
            "dork-a".to_string(),
            vec![
                "https://a.example".to_string(),
                "https://a.example".to_string(),
            ],
        );
        results.insert("dork-b".to_string(), vec!["https://b.example".to_string()]);

        let report = cycle(store.clone(), results)
            .run_once(&CycleContext::detached())
            .await
            .unwrap();

        assert_eq!(report.persisted, 2);
        assert_eq!(report.skipped_seen, 1);
        assert_eq!(
            store.lines().unwrap(),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }

    #[tokio::test]
    async fn preexisting_urls_survive_and_are_not_duplicated() {
        let dir = tempfile::tempdir().unwrap();
        let store = LineStore::new(dir.path().join("urls.txt"));
        store.append_line("https://a.example").unwrap();
        let mut results = HashMap::new();
        results.insert("dork-a".to_string(), vec!["https://a.example".to_string()]);
        results.insert("dork-b".to_string(), vec![]);

        let report = cycle(store.clone(), results)
            .run_once(&CycleContext::detached())
            .await
            .unwrap();

        assert_eq!(report.persisted, 0);
        assert_eq!(report.skipped_seen, 1);
        assert_eq!(store.lines().unwrap(), vec!["https://a.example".to_string()]);
    }

    #[tokio::test]
    async fn search_failure_moves_on_to_the_next_dork() {
        let dir = tempfile::tempdir().unwrap();
        let store = LineStore::new(dir.path().join("urls.txt"));
        // only dork-b has canned results; dork-a errors
        let mut results = HashMap::new();
        results.insert("dork-b".to_string(), vec!["https://b.example".to_string()]);

        let report = cycle(store.clone(), results)
            .run_once(&CycleContext::detached())
            .await
            .unwrap();

        assert_eq!(report.errors, 1);
        assert_eq!(report.persisted, 1);
        assert_eq!(store.lines().unwrap(), vec!["https://b.example".to_string()]);
    }

    #[tokio::test]
    async fn non_http_results_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = LineStore::new(dir.path().join("urls.txt"));
        let mut results = HashMap::new();
        results.insert(
            "dork-a".to_string(),
            vec!["ftp://files.example".to_string(), "https://ok.example".to_string()],
        );
        results.insert("dork-b".to_string(), vec![]);

        let report = cycle(store.clone(), results)
            .run_once(&CycleContext::detached())
            .await
            .unwrap();

        assert_eq!(report.rejected, 1);
        assert_eq!(store.lines().unwrap(), vec!["https://ok.example".to_string()]);
    }
}
