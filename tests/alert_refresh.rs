// Alert feed refresh against a captured Google-Alerts style Atom feed:
// tracking links are unwrapped and the candidate file is replaced.

use anyhow::Result;
use async_trait::async_trait;
use cyberintel_harvester::fetch::FeedClient;
use cyberintel_harvester::harvest::alert_feeds::AlertFeedRefresh;
use cyberintel_harvester::harvest::{CycleContext, FileUrlSource, HarvestCycle};
use cyberintel_harvester::store::LineStore;
use std::sync::Arc;

const ALERT_FEED: &str = include_str!("fixtures/google_alert.xml");

struct OneFeed;

#[async_trait]
impl FeedClient for OneFeed {
    async fn fetch(&self, url: &str) -> Result<String> {
        anyhow::ensure!(url == "https://www.google.com/alerts/feeds/000/111");
        Ok(ALERT_FEED.to_string())
    }
}

#[tokio::test]
async fn alert_refresh_replaces_candidates_with_unwrapped_links() {
    let dir = tempfile::tempdir().unwrap();
    let feeds = LineStore::new(dir.path().join("alert_feeds.txt"));
    feeds
        .append_line("https://www.google.com/alerts/feeds/000/111 | scada vulnerability")
        .unwrap();

    let urls = LineStore::new(dir.path().join("candidate_urls.txt"));
    urls.append_line("https://from-last-run.example").unwrap();

    let cycle = AlertFeedRefresh::new(
        Arc::new(FileUrlSource::new(feeds)),
        Arc::new(OneFeed),
        urls.clone(),
    );
    let report = cycle.run_once(&CycleContext::detached()).await.unwrap();

    assert_eq!(report.candidates, 1);
    assert_eq!(report.persisted, 3);
    assert_eq!(
        urls.lines().unwrap(),
        vec![
            "https://otsec.example/critical-flaw".to_string(),
            "https://news.example/emergency-patch".to_string(),
            "https://direct.example/advisory".to_string(),
        ]
    );
}
