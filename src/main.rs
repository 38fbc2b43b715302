use std::future::IntoFuture;
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use property_scanner::adapter::{LeilaoAdapter, SourceAdapter, VivaRealAdapter};
use property_scanner::aggregation::AggregationEngine;
use property_scanner::api::{router, ApiState, HealthState};
use property_scanner::config::Config;
use property_scanner::coordinator::{Coordinator, CoordinatorConfig};
use property_scanner::crawler::Crawler;
use property_scanner::db::{self, SqliteStore};
use property_scanner::error::Result;
use property_scanner::fetcher::{Fetcher, LatencyStats, ReqwestTransport};
use property_scanner::pipeline::normalize_all;
use property_scanner::store::{ListingStore, RawCaptureStore};

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let pool = db::connect(&cfg.db_path).await?;
    info!("Database ready at {}", cfg.db_path);
    let sqlite = Arc::new(SqliteStore::new(pool));
    let raw_store: Arc<dyn RawCaptureStore> = sqlite.clone();
    let listing_store: Arc<dyn ListingStore> = sqlite;

    // --- Fetch stack ---
    let transport = Arc::new(ReqwestTransport::new(&cfg.user_agent, cfg.http_timeout, &cfg.proxy_urls)?);
    let coordinator = Arc::new(Coordinator::new(CoordinatorConfig {
        base_delay: cfg.request_base_delay,
        max_delay: cfg.request_max_delay,
        jitter: cfg.request_jitter,
        identities: transport.identities(),
    }));
    let latency = Arc::new(LatencyStats::new());
    let cancel = CancellationToken::new();
    let fetcher = Arc::new(Fetcher::new(
        coordinator,
        transport,
        Arc::clone(&latency),
        cancel.clone(),
        cfg.fetch_max_attempts,
    ));

    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, shutting down");
            ctrl_c_cancel.cancel();
        }
    });

    let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
        Arc::new(LeilaoAdapter::new(
            Arc::clone(&fetcher),
            &cfg.leilao_base_url,
            cfg.crawl_max_pages,
            cfg.crawl_max_items_per_source,
        )?),
        Arc::new(VivaRealAdapter::new(
            Arc::clone(&fetcher),
            &cfg.vivareal_base_url,
            &cfg.vivareal_cities,
            &cfg.vivareal_types,
            cfg.crawl_max_pages,
            cfg.crawl_max_items_per_source,
        )?),
    ];

    // --- HTTP API server ---
    // Serves while the crawl runs so /health can report progress.
    let health = Arc::new(HealthState::new());
    let api_state = ApiState {
        listings: Arc::clone(&listing_store),
        engine: Arc::new(AggregationEngine::new(cfg.trim_quantiles)),
        health: Arc::clone(&health),
        latency,
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");
    let server = tokio::spawn(
        axum::serve(listener, app)
            .with_graceful_shutdown(cancel.clone().cancelled_owned())
            .into_future(),
    );

    // --- Crawl ---
    health.set_crawl_running(true);
    let crawler = Crawler::new(
        Arc::clone(&fetcher),
        Arc::clone(&raw_store),
        cfg.workers_per_source,
        &cfg.user_agent,
    );
    let crawl_stats = crawler.crawl_all(adapters).await;
    health.add_captures_written(crawl_stats.iter().map(|s| s.items_captured).sum());
    health.mark_crawl_finished(Utc::now());
    for stats in &crawl_stats {
        if !stats.skipped_pages.is_empty() {
            warn!(source = %stats.source, "[CRAWL] skipped pages: {:?}", stats.skipped_pages);
        }
    }

    // --- Normalize ---
    let normalized = normalize_all(raw_store.as_ref(), listing_store.as_ref()).await;
    if let Ok(stats) = &normalized {
        health.set_listings_promoted((stats.inserted + stats.replaced) as u64);
    }
    if normalized.is_err() || cancel.is_cancelled() {
        cancel.cancel();
        let _ = server.await;
        normalized?;
        info!("Crawl interrupted; captured listings were normalized, exiting");
        return Ok(());
    }

    match server.await {
        Ok(served) => served?,
        Err(e) => error!("HTTP API task failed: {e}"),
    }

    Ok(())
}
