use std::net::SocketAddr;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing_subscriber::{fmt, EnvFilter};

use import_service::api;
use import_service::config::Config;
use import_service::import::ImportEngine;
use import_service::progress::EventHub;
use import_service::registry::SessionRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load this crate's .env regardless of current working directory, and override any pre-set envs
    let _ = dotenvy::from_filename_override(concat!(env!("CARGO_MANIFEST_DIR"), "/.env"));
    // Initialize logging
    let filter = EnvFilter::from_default_env().add_directive("info".parse().unwrap());
    fmt()
        .with_env_filter(filter)
        .json()
        .flatten_event(true)
        .with_current_span(true)
        .with_span_list(true)
        .init();

    let cfg = Config::from_env();
    tracing::info!(
        port = cfg.port,
        session_ttl_secs = cfg.session_ttl_secs,
        eviction_enabled = cfg.enable_session_eviction,
        "Loaded configuration"
    );

    let registry = SessionRegistry::new();
    let engine = Arc::new(ImportEngine::new(registry.clone(), cfg.clone()));
    let events = Arc::new(EventHub::new());

    // Periodic sweep evicting idle sessions past their TTL
    let scheduler = JobScheduler::new().await?;
    if cfg.enable_session_eviction {
        start_eviction_job(scheduler.clone(), registry.clone(), cfg.session_ttl_secs).await?;
        scheduler.start().await?;
        tracing::info!("Session eviction job started");
    }

    let app = api::router(engine, events);

    let addr: SocketAddr = format!("0.0.0.0:{}", cfg.port).parse()?;
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                tracing::error!(port = cfg.port, "Port is already in use. Another import-service might be running. Try changing PORT env var or stop the other process.");
            }
            return Err(e.into());
        }
    };
    tracing::info!(port = cfg.port, "Import service listening");
    axum::serve(listener, app).await?;

    Ok(())
}

async fn start_eviction_job(
    scheduler: JobScheduler,
    registry: SessionRegistry,
    ttl_secs: u64,
) -> anyhow::Result<()> {
    // Check for expired sessions every minute
    let sweep_job = Job::new_async("0 * * * * *", move |_uuid, _l| {
        let registry = registry.clone();
        Box::pin(async move {
            let evicted = registry.evict_idle(chrono::Duration::seconds(ttl_secs as i64));
            if evicted > 0 {
                tracing::info!(evicted = evicted, "Evicted idle import sessions");
            }
        })
    })?;

    scheduler.add(sweep_job).await?;

    Ok(())
}
