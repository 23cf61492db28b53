// src/fetch.rs
//! Network adapters behind narrow traits: search queries, page fetches,
//! and raw feed fetches. Cycles depend on the traits; tests swap in mocks,
//! production wires the reqwest-backed implementations below.

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use once_cell::sync::OnceCell;
use regex::Regex;
use std::time::Duration;

use crate::extract::{extract_document, Document};

/// External search endpoint: one query in, up to `limit` result URLs out.
#[async_trait]
pub trait SearchAdapter: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<String>>;
    fn name(&self) -> &'static str;
}

/// Page fetch + structured extraction.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_html(&self, url: &str) -> Result<String>;

    async fn fetch_and_extract(&self, url: &str) -> Result<Document> {
        let t0 = std::time::Instant::now();
        let html = self.fetch_html(url).await?;
        let doc = extract_document(url, &html);
        histogram!("harvest_fetch_extract_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(doc)
    }
}

/// Raw feed XML fetch, kept separate so feed validation can be mocked
/// independently of page scraping.
#[async_trait]
pub trait FeedClient: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

pub fn build_client(user_agent: &str, timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(user_agent.to_string())
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .context("building http client")
}

/* ---------------- reqwest-backed implementations ---------------- */

pub struct HttpSearchAdapter {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSearchAdapter {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl SearchAdapter for HttpSearchAdapter {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query)])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                counter!("harvest_search_errors_total").increment(1);
                e
            })
            .with_context(|| format!("search query `{query}`"))?;
        let body = resp.text().await.context("reading search response")?;
        Ok(extract_result_urls(&body, &self.endpoint, limit))
    }

    fn name(&self) -> &'static str {
        "http-search"
    }
}

/// Pull absolute http(s) hrefs out of a search results page, unwrap
/// redirect wrappers, drop links back into the engine itself, and dedupe
/// preserving order.
pub fn extract_result_urls(html: &str, endpoint: &str, limit: usize) -> Vec<String> {
    static RE_HREF: OnceCell<Regex> = OnceCell::new();
    let re = RE_HREF
        .get_or_init(|| Regex::new(r#"href\s*=\s*["'](https?://[^"']+)["']"#).expect("href regex"));

    let engine_host = url::Url::parse(endpoint)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string));

    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for cap in re.captures_iter(html) {
        let raw = html_escape::decode_html_entities(&cap[1]).to_string();
        // result pages often wrap targets in a redirect parameter
        let target = redirect_target(&raw, "uddg")
            .or_else(|| redirect_target(&raw, "url"))
            .unwrap_or(raw);
        let host = url::Url::parse(&target)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string));
        if host.is_none() || host == engine_host {
            continue;
        }
        if seen.insert(target.clone()) {
            out.push(target);
            if out.len() >= limit {
                break;
            }
        }
    }
    out
}

/// Extract the real destination from a redirect/tracking URL that carries
/// it in a query parameter (Google Alerts style `?url=`, result pages'
/// `?uddg=`). Returns `None` when the parameter is absent.
pub fn redirect_target(raw: &str, param: &str) -> Option<String> {
    let parsed = url::Url::parse(raw).ok()?;
    parsed
        .query_pairs()
        .find(|(k, _)| k == param)
        .map(|(_, v)| v.into_owned())
        .filter(|v| v.starts_with("http"))
}

pub struct HttpPageFetcher {
    client: reqwest::Client,
}

impl HttpPageFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch_html(&self, url: &str) -> Result<String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                counter!("harvest_fetch_errors_total").increment(1);
                e
            })
            .with_context(|| format!("fetching {url}"))?;
        resp.text().await.with_context(|| format!("reading {url}"))
    }
}

pub struct HttpFeedClient {
    client: reqwest::Client,
}

impl HttpFeedClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FeedClient for HttpFeedClient {
    async fn fetch(&self, url: &str) -> Result<String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("fetching feed {url}"))?;
        resp.text()
            .await
            .with_context(|| format!("reading feed {url}"))
    }
}
