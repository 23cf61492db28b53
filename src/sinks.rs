// src/sinks.rs
//! External sinks behind narrow traits. The search index and the feed
//! registry are collaborators the cycles talk to; each call may fail on
//! its own and a failure in one sink never blocks the others.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::extract::Document;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedRecord {
    pub title: String,
    pub feed_url: String,
    pub site_url: String,
}

/// Durable home for a finished document (search index, secondary DB, ...).
#[async_trait]
pub trait DocumentSink: Send + Sync {
    async fn persist(&self, doc: &Document) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Feed database stand-in: registered feeds plus the unread entry queue
/// the crawl cycle drains.
#[async_trait]
pub trait FeedRegistry: Send + Sync {
    /// All currently registered feed URLs (dedup preload for discovery).
    async fn feed_urls(&self) -> Result<Vec<String>>;
    async fn insert_feed(&self, feed: &FeedRecord) -> Result<()>;
    /// Entry links not yet handed to the crawler.
    async fn unread_links(&self) -> Result<Vec<String>>;
    async fn mark_read(&self, url: &str) -> Result<()>;
}

/* ---------------- reqwest-backed implementations ---------------- */

/// Upserts documents into a search index over its REST surface.
pub struct SearchIndexSink {
    client: reqwest::Client,
    base_url: String,
    index: String,
}

impl SearchIndexSink {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, index: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            index: index.into(),
        }
    }
}

#[async_trait]
impl DocumentSink for SearchIndexSink {
    async fn persist(&self, doc: &Document) -> Result<()> {
        let endpoint = format!("{}/{}/_doc", self.base_url.trim_end_matches('/'), self.index);
        self.client
            .post(&endpoint)
            .json(doc)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("indexing {} into {}", doc.url, self.index))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "search-index"
    }
}

/// REST facade over the feed database.
pub struct RestFeedRegistry {
    client: reqwest::Client,
    base_url: String,
}

impl RestFeedRegistry {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl FeedRegistry for RestFeedRegistry {
    async fn feed_urls(&self) -> Result<Vec<String>> {
        let feeds: Vec<FeedRecord> = self
            .client
            .get(format!("{}/feeds", self.base_url))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .context("listing feeds")?
            .json()
            .await
            .context("decoding feed list")?;
        Ok(feeds.into_iter().map(|f| f.feed_url).collect())
    }

    async fn insert_feed(&self, feed: &FeedRecord) -> Result<()> {
        self.client
            .post(format!("{}/feeds", self.base_url))
            .json(feed)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("registering feed {}", feed.feed_url))?;
        Ok(())
    }

    async fn unread_links(&self) -> Result<Vec<String>> {
        self.client
            .get(format!("{}/entries/unread", self.base_url))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .context("listing unread entries")?
            .json()
            .await
            .context("decoding unread entries")
    }

    async fn mark_read(&self, url: &str) -> Result<()> {
        self.client
            .post(format!("{}/entries/read", self.base_url))
            .json(&serde_json::json!({ "url": url }))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("marking {url} read"))?;
        Ok(())
    }
}

/* ---------------- Test helpers ---------------- */

/// In-memory sink recording every persisted document; can be told to fail.
#[derive(Default)]
pub struct RecordingSink {
    pub docs: std::sync::Mutex<Vec<Document>>,
    pub fail: std::sync::atomic::AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentSink for RecordingSink {
    async fn persist(&self, doc: &Document) -> Result<()> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            anyhow::bail!("recording sink told to fail");
        }
        self.docs.lock().unwrap().push(doc.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// In-memory registry with an unread queue; mirrors the REST facade.
#[derive(Default)]
pub struct MemoryRegistry {
    pub feeds: std::sync::Mutex<Vec<FeedRecord>>,
    pub unread: std::sync::Mutex<Vec<String>>,
    pub read: std::sync::Mutex<Vec<String>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unread(links: Vec<String>) -> Self {
        Self {
            unread: std::sync::Mutex::new(links),
            ..Self::default()
        }
    }
}

#[async_trait]
impl FeedRegistry for MemoryRegistry {
    async fn feed_urls(&self) -> Result<Vec<String>> {
        Ok(self
            .feeds
            .lock()
            .unwrap()
            .iter()
            .map(|f| f.feed_url.clone())
            .collect())
    }

    async fn insert_feed(&self, feed: &FeedRecord) -> Result<()> {
        self.feeds.lock().unwrap().push(feed.clone());
        Ok(())
    }

    async fn unread_links(&self) -> Result<Vec<String>> {
        Ok(self.unread.lock().unwrap().clone())
    }

    async fn mark_read(&self, url: &str) -> Result<()> {
        self.read.lock().unwrap().push(url.to_string());
        Ok(())
    }
}
