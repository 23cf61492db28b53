// src/main.rs
//! Harvester entrypoint: load config, wire the HTTP adapters and sinks,
//! register the cycles with the scheduler, and run until ctrl-c.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cyberintel_harvester::config::HarvesterConfig;
use cyberintel_harvester::fetch::{build_client, HttpFeedClient, HttpPageFetcher, HttpSearchAdapter};
use cyberintel_harvester::harvest::alert_feeds::AlertFeedRefresh;
use cyberintel_harvester::harvest::feed_dorks::FeedDorkDiscovery;
use cyberintel_harvester::harvest::feed_probe::RssLinkDiscovery;
use cyberintel_harvester::harvest::news_dorks::NewsDorkHarvest;
use cyberintel_harvester::harvest::registry_crawl::RegistryCrawl;
use cyberintel_harvester::harvest::FileUrlSource;
use cyberintel_harvester::pacing::Pacer;
use cyberintel_harvester::relevance::KeywordGate;
use cyberintel_harvester::sinks::{DocumentSink, RestFeedRegistry, SearchIndexSink};
use cyberintel_harvester::store::{JsonArrayStore, LineStore};
use cyberintel_harvester::Scheduler;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("cyberintel_harvester=info,warn")),
        )
        .with(fmt::layer().compact())
        .init();

    let cfg = HarvesterConfig::load()?;
    info!(
        feed_dorks = cfg.feed_dorks.len(),
        news_dorks = cfg.news_dorks.len(),
        keywords = cfg.keywords.len(),
        "harvester starting"
    );

    let client = build_client(&cfg.search.user_agent, cfg.request_timeout())?;
    let search = Arc::new(HttpSearchAdapter::new(client.clone(), cfg.search.endpoint.clone()));
    let fetcher = Arc::new(HttpPageFetcher::new(client.clone()));
    let feed_client = Arc::new(HttpFeedClient::new(client.clone()));

    let gate = KeywordGate::new(&cfg.keywords);
    let news_store = JsonArrayStore::new(&cfg.paths.news_file);
    let urls_store = LineStore::new(&cfg.paths.urls_file);

    let mut sinks: Vec<Arc<dyn DocumentSink>> = Vec::new();
    if let (Some(url), Some(index)) = (&cfg.sinks.index_url, &cfg.sinks.index_name) {
        info!(%url, index, "search index sink enabled");
        sinks.push(Arc::new(SearchIndexSink::new(client.clone(), url, index)));
    }

    let search_pacer = Pacer::per_minute(
        cfg.pacing.max_searches_per_minute,
        cfg.pacing.jitter_low,
        cfg.pacing.jitter_high,
    );
    let result_pacer = Pacer::between_ms(cfg.pacing.per_result_min_ms, cfg.pacing.per_result_max_ms);
    let inter_dork_pacer =
        Pacer::between_ms(cfg.pacing.inter_dork_min_ms, cfg.pacing.inter_dork_max_ms);

    let mut scheduler = Scheduler::new();
    scheduler.register(
        Arc::new(AlertFeedRefresh::new(
            Arc::new(FileUrlSource::new(LineStore::new(&cfg.paths.alert_feeds_file))),
            feed_client.clone(),
            urls_store.clone(),
        )),
        Duration::from_secs(cfg.scheduler.alert_feeds_secs),
    );
    scheduler.register(
        Arc::new(FeedDorkDiscovery::new(
            search.clone(),
            urls_store.clone(),
            cfg.feed_dorks.clone(),
            cfg.search.results_per_feed_dork,
            search_pacer,
            result_pacer,
        )),
        Duration::from_secs(cfg.scheduler.feed_dorks_secs),
    );
    scheduler.register(
        Arc::new(NewsDorkHarvest::new(
            search.clone(),
            fetcher.clone(),
            gate.clone(),
            news_store.clone(),
            sinks.clone(),
            cfg.news_dorks.clone(),
            cfg.search.results_per_news_dork,
            inter_dork_pacer,
            result_pacer,
        )),
        Duration::from_secs(cfg.scheduler.news_dorks_secs),
    );

    match &cfg.sinks.registry_url {
        Some(url) => {
            info!(%url, "feed registry enabled, scheduling discovery and crawl");
            let registry = Arc::new(RestFeedRegistry::new(client.clone(), url));
            scheduler.register(
                Arc::new(RssLinkDiscovery::new(
                    urls_store.clone(),
                    LineStore::new(&cfg.paths.probed_feeds_file),
                    fetcher.clone(),
                    feed_client.clone(),
                    registry.clone(),
                    result_pacer,
                )),
                Duration::from_secs(cfg.scheduler.feed_probe_secs),
            );
            scheduler.register(
                Arc::new(RegistryCrawl::new(
                    registry,
                    fetcher.clone(),
                    gate.clone(),
                    news_store.clone(),
                    sinks.clone(),
                    result_pacer,
                )),
                Duration::from_secs(cfg.scheduler.registry_crawl_secs),
            );
        }
        None => info!("no registry configured, feed probe and crawl cycles disabled"),
    }

    scheduler.start();

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested, draining cycles");
    scheduler.shutdown();
    scheduler.join().await;
    info!("harvester stopped");
    Ok(())
}
