// End-to-end dedup behaviour of the news harvest: duplicate search results
// yield one stored record each, and an empty source leaves the filesystem
// untouched.

use anyhow::Result;
use async_trait::async_trait;
use cyberintel_harvester::extract::Document;
use cyberintel_harvester::fetch::{PageFetcher, SearchAdapter};
use cyberintel_harvester::harvest::news_dorks::NewsDorkHarvest;
use cyberintel_harvester::harvest::{CycleContext, HarvestCycle};
use cyberintel_harvester::pacing::Pacer;
use cyberintel_harvester::relevance::KeywordGate;
use cyberintel_harvester::store::JsonArrayStore;
use std::collections::HashMap;
use std::sync::Arc;

struct ListSearch {
    results: Vec<String>,
}

#[async_trait]
impl SearchAdapter for ListSearch {
    async fn search(&self, _query: &str, limit: usize) -> Result<Vec<String>> {
        let mut r = self.results.clone();
        r.truncate(limit);
        Ok(r)
    }
    fn name(&self) -> &'static str {
        "list"
    }
}

struct PageMap {
    pages: HashMap<String, String>,
}

#[async_trait]
impl PageFetcher for PageMap {
    async fn fetch_html(&self, url: &str) -> Result<String> {
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no page for {url}"))
    }
}

fn harvest(dir: &std::path::Path, results: Vec<String>, pages: HashMap<String, String>) -> NewsDorkHarvest {
    NewsDorkHarvest::new(
        Arc::new(ListSearch { results }),
        Arc::new(PageMap { pages }),
        KeywordGate::new(&["malware".to_string()]),
        JsonArrayStore::new(dir.join("news.json")),
        Vec::new(),
        vec!["dork".to_string()],
        10,
        Pacer::between_ms(0, 1),
        Pacer::between_ms(0, 1),
    )
}

#[tokio::test]
async fn duplicate_results_store_exactly_one_record_each() {
    let dir = tempfile::tempdir().unwrap();
    let mut pages = HashMap::new();
    pages.insert(
        "https://a.example/story".to_string(),
        "<html><title>malware campaign</title></html>".to_string(),
    );
    pages.insert(
        "https://b.example/story".to_string(),
        "<html><title>malware loader</title></html>".to_string(),
    );

    // a, a, b in one result batch
    let cycle = harvest(
        dir.path(),
        vec![
            "https://a.example/story".to_string(),
            "https://a.example/story".to_string(),
            "https://b.example/story".to_string(),
        ],
        pages,
    );
    let report = cycle.run_once(&CycleContext::detached()).await.unwrap();

    assert_eq!(report.persisted, 2);
    assert_eq!(report.skipped_seen, 1);

    let stored: Vec<Document> =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("news.json")).unwrap())
            .unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].url, "https://a.example/story");
    assert_eq!(stored[1].url, "https://b.example/story");

    // a second run over the same results adds nothing
    let report = cycle.run_once(&CycleContext::detached()).await.unwrap();
    assert_eq!(report.persisted, 0);
    assert_eq!(report.skipped_seen, 3);
    let stored: Vec<Document> =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("news.json")).unwrap())
            .unwrap();
    assert_eq!(stored.len(), 2);
}

#[tokio::test]
async fn empty_search_results_leave_no_files_behind() {
    let dir = tempfile::tempdir().unwrap();
    let cycle = harvest(dir.path(), Vec::new(), HashMap::new());
    let report = cycle.run_once(&CycleContext::detached()).await.unwrap();

    assert_eq!(report.candidates, 0);
    assert_eq!(report.persisted, 0);
    assert!(
        std::fs::read_dir(dir.path()).unwrap().next().is_none(),
        "no files should be created for an empty run"
    );
}
