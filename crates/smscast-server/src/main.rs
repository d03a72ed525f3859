//! smscast - campaign engine entry point

use anyhow::{Context, Result};
use smscast_api::{create_router, AppState};
use smscast_common::config::{Config, LoggingConfig};
use smscast_core::{
    CampaignEngine, CampaignScheduler, ClickTracker, DeliveryReconciler, EngineMetrics,
    OptInManager, SendThrottle, ShortLinkClient, TwilioGateway,
};
use smscast_storage::{DatabasePool, MemoryStore, Stores};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    init_logging(&config.logging);

    info!("Starting smscast...");

    // Initialize database
    let (stores, db_pool) = if config.database.url.is_empty() {
        warn!("No database configured; using in-memory storage");
        (Stores::in_memory(Arc::new(MemoryStore::new())), None)
    } else {
        let db_pool = DatabasePool::new(&config.database).await?;
        info!("Database connection established");

        db_pool.migrate().await?;
        info!("Database migrations completed");

        (Stores::postgres(db_pool.clone()), Some(db_pool))
    };

    // Gateways
    let sms = Arc::new(TwilioGateway::new(&config.sms)?);
    let shortener = Arc::new(ShortLinkClient::new(config.short_links.clone())?);
    let metrics = Arc::new(EngineMetrics::new().context("Failed to register metrics")?);

    let base_url = config.server.base_url.trim_end_matches('/');
    let engine = Arc::new(
        CampaignEngine::new(stores.clone(), sms.clone(), shortener, metrics.clone())
            .with_throttle(Arc::new(SendThrottle::from_config(&config.sending)))
            .with_status_callback_url(format!("{}/api/webhooks/sms/status", base_url)),
    );

    // Scheduler
    let scheduler = Arc::new(CampaignScheduler::from_config(
        engine.clone(),
        stores.campaigns.clone(),
        &config.scheduler,
    ));
    if config.scheduler.enabled {
        scheduler.start().await;
    } else {
        info!("Campaign scheduler disabled");
    }

    let state = AppState {
        reconciler: Arc::new(DeliveryReconciler::new(
            stores.clone(),
            sms.clone(),
            metrics.clone(),
        )),
        opt_in: Arc::new(OptInManager::new(
            stores.clone(),
            sms,
            base_url,
            &config.opt_in,
        )),
        clicks: Arc::new(ClickTracker::new(stores.clone(), metrics.clone())),
        engine,
        stores,
        db_pool,
        metrics,
        webhook_secret: config.webhooks.signing_secret.clone(),
    };

    // Start API server
    let app = create_router(Arc::new(state));
    let listener = tokio::net::TcpListener::bind(&config.api.bind)
        .await
        .with_context(|| format!("Failed to bind API server to {}", config.api.bind))?;
    info!("API server listening on {}", config.api.bind);

    info!("smscast started successfully");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server error")?;

    // Cleanup
    scheduler.stop().await;

    info!("smscast shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.format.eq_ignore_ascii_case("json") {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
