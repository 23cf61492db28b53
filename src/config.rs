// src/config.rs
//! Runtime configuration: cycle intervals, pacing ceilings, file paths,
//! keyword and dork lists, and external endpoints. Everything has a sane
//! default so the harvester boots without a config file.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config/harvester.toml";
pub const ENV_CONFIG_PATH: &str = "HARVESTER_CONFIG_PATH";

/// Curated relevance keywords. Case does not matter; matching is
/// containment over the lowercased document text.
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "cybersecurity",
    "ciberseguridad",
    "malware",
    "ransomware",
    "phishing",
    "vulnerability",
    "vulnerabilidad",
    "exploit",
    "scada",
    "ics",
    "ot security",
    "it security",
    "data leak",
    "breach",
    "cyber attack",
    "ddos",
    "zero-day",
    "botnet",
    "spyware",
    "incident response",
    "threat",
    "intrusion",
    "sql injection",
    "cross-site scripting",
];

const DEFAULT_FEED_DORKS: &[&str] = &[
    "\"cybersecurity\" \"RSS feed\"",
    "\"cybersecurity\" \"Atom feed\"",
    "\"OT security\" \"RSS feed\"",
    "\"OT security\" \"Atom feed\"",
    "\"IT security\" \"RSS feed\"",
    "\"IT security\" \"Atom feed\"",
    "\"information security\" \"RSS feed\"",
    "\"information security\" \"Atom feed\"",
];

const DEFAULT_NEWS_DORKS: &[&str] = &[
    "\"SCADA vulnerability\"",
    "\"ICS vulnerability\"",
    "\"OT security\" AND \"vulnerability\"",
    "\"cybersecurity vulnerability\"",
    "\"vulnerabilidad SCADA\"",
    "\"ciberseguridad industrial vulnerabilidad\"",
    "\"seguridad OT\" AND \"vulnerabilidad\"",
];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HarvesterConfig {
    pub scheduler: SchedulerCfg,
    pub pacing: PacingCfg,
    pub paths: PathsCfg,
    pub search: SearchCfg,
    pub sinks: SinksCfg,
    pub keywords: Vec<String>,
    pub feed_dorks: Vec<String>,
    pub news_dorks: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerCfg {
    pub alert_feeds_secs: u64,
    pub feed_dorks_secs: u64,
    pub news_dorks_secs: u64,
    pub feed_probe_secs: u64,
    pub registry_crawl_secs: u64,
}

impl Default for SchedulerCfg {
    fn default() -> Self {
        Self {
            alert_feeds_secs: 24 * 3600,
            feed_dorks_secs: 24 * 3600,
            news_dorks_secs: 24 * 3600,
            feed_probe_secs: 25 * 3600,
            registry_crawl_secs: 26 * 3600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PacingCfg {
    /// Ceiling for external search queries per rolling minute.
    pub max_searches_per_minute: u32,
    /// Jitter band applied to the per-search gap (multiplier range).
    pub jitter_low: f64,
    pub jitter_high: f64,
    /// Short wait after each accepted result (milliseconds).
    pub per_result_min_ms: u64,
    pub per_result_max_ms: u64,
    /// Longer wait between news dork queries (milliseconds).
    pub inter_dork_min_ms: u64,
    pub inter_dork_max_ms: u64,
}

impl Default for PacingCfg {
    fn default() -> Self {
        Self {
            max_searches_per_minute: 6,
            jitter_low: 0.8,
            jitter_high: 1.5,
            per_result_min_ms: 1_000,
            per_result_max_ms: 2_000,
            inter_dork_min_ms: 20_000,
            inter_dork_max_ms: 35_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsCfg {
    /// Alert feed URLs, one per line, optional ` | title` suffix.
    pub alert_feeds_file: PathBuf,
    /// Discovered candidate site URLs, one per line.
    pub urls_file: PathBuf,
    /// Feed URLs already probed by link discovery (valid or not), one per
    /// line, so a permanently broken feed is not re-probed every run.
    pub probed_feeds_file: PathBuf,
    /// JSON-array store for harvested documents.
    pub news_file: PathBuf,
}

impl Default for PathsCfg {
    fn default() -> Self {
        Self {
            alert_feeds_file: PathBuf::from("data/alert_feeds.txt"),
            urls_file: PathBuf::from("data/candidate_urls.txt"),
            probed_feeds_file: PathBuf::from("data/probed_feeds.txt"),
            news_file: PathBuf::from("outputs/news.json"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchCfg {
    /// HTML search endpoint queried with a `q` parameter.
    pub endpoint: String,
    pub results_per_feed_dork: usize,
    pub results_per_news_dork: usize,
    pub user_agent: String,
    /// Per-request timeout (seconds) shared by all HTTP adapters.
    pub request_timeout_secs: u64,
}

impl Default for SearchCfg {
    fn default() -> Self {
        Self {
            endpoint: "https://html.duckduckgo.com/html/".to_string(),
            results_per_feed_dork: 15,
            results_per_news_dork: 5,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36"
                .to_string(),
            request_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SinksCfg {
    /// Base URL of the search index (e.g. `http://localhost:9200`).
    /// When absent the index sink is not wired.
    pub index_url: Option<String>,
    pub index_name: Option<String>,
    /// Base URL of the feed registry REST facade. When absent the two
    /// registry-backed cycles are not scheduled.
    pub registry_url: Option<String>,
}

impl Default for HarvesterConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerCfg::default(),
            pacing: PacingCfg::default(),
            paths: PathsCfg::default(),
            search: SearchCfg::default(),
            sinks: SinksCfg::default(),
            keywords: DEFAULT_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            feed_dorks: DEFAULT_FEED_DORKS.iter().map(|s| s.to_string()).collect(),
            news_dorks: DEFAULT_NEWS_DORKS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl HarvesterConfig {
    /// Load config using env var + fallback:
    /// 1) $HARVESTER_CONFIG_PATH (must exist if set)
    /// 2) config/harvester.toml
    /// 3) built-in defaults
    pub fn load() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            return Self::load_from(&pb)
                .with_context(|| format!("{} points to {}", ENV_CONFIG_PATH, pb.display()));
        }
        let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default_p.exists() {
            return Self::load_from(&default_p);
        }
        tracing::info!("no config file found, using built-in defaults");
        Ok(Self::default())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: HarvesterConfig = toml::from_str(s).context("parsing harvester config")?;
        Ok(cfg)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.search.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_populated() {
        let cfg = HarvesterConfig::default();
        assert_eq!(cfg.pacing.max_searches_per_minute, 6);
        assert_eq!(cfg.scheduler.alert_feeds_secs, 86_400);
        assert_eq!(cfg.scheduler.feed_probe_secs, 90_000);
        assert!(cfg.keywords.iter().any(|k| k == "ransomware"));
        assert!(!cfg.feed_dorks.is_empty());
        assert!(cfg.sinks.registry_url.is_none());
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let cfg = HarvesterConfig::from_toml_str(
            r#"
            keywords = ["scada"]

            [scheduler]
            news_dorks_secs = 3600

            [pacing]
            max_searches_per_minute = 12

            [sinks]
            registry_url = "http://localhost:8080"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.keywords, vec!["scada".to_string()]);
        assert_eq!(cfg.scheduler.news_dorks_secs, 3_600);
        // untouched sections keep defaults
        assert_eq!(cfg.scheduler.alert_feeds_secs, 86_400);
        assert_eq!(cfg.pacing.max_searches_per_minute, 12);
        assert_eq!(cfg.pacing.jitter_low, 0.8);
        assert_eq!(
            cfg.sinks.registry_url.as_deref(),
            Some("http://localhost:8080")
        );
    }

    #[test]
    fn garbage_toml_is_an_error() {
        assert!(HarvesterConfig::from_toml_str("keywords = 42").is_err());
    }

    #[test]
    #[serial_test::serial]
    fn env_var_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[pacing]\nmax_searches_per_minute = 3\n").unwrap();
        std::env::set_var(ENV_CONFIG_PATH, &path);
        let cfg = HarvesterConfig::load().unwrap();
        std::env::remove_var(ENV_CONFIG_PATH);
        assert_eq!(cfg.pacing.max_searches_per_minute, 3);
    }

    #[test]
    #[serial_test::serial]
    fn env_var_pointing_nowhere_is_an_error() {
        std::env::set_var(ENV_CONFIG_PATH, "/definitely/not/here.toml");
        let res = HarvesterConfig::load();
        std::env::remove_var(ENV_CONFIG_PATH);
        assert!(res.is_err());
    }
}
