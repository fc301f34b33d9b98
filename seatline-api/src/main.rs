use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use seatline_api::{app, token::JwtTokenDecoder, AppState};
use seatline_core::memory::MemoryDraftStore;
use seatline_core::repository::DraftStore;
use seatline_core::{PayloadAssembler, ReservationService};
use seatline_store::app_config::{Config, DraftBackend};
use seatline_store::{DbClient, RedisClient, RedisDraftStore, StoreReservationRepository};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "seatline_api=debug,seatline_core=debug,seatline_store=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Seatline API on port {}", config.server.port);

    // Postgres
    let db = DbClient::new(&config.database)
        .await
        .context("Failed to connect to Postgres")?;
    if config.database.run_migrations {
        db.migrate().await.context("Failed to run migrations")?;
    }
    let reservation_repo = Arc::new(StoreReservationRepository::new(db.pool.clone()));

    // Redis: external cache, and optionally the draft store
    let redis = RedisClient::new(&config.redis.url)
        .await
        .context("Failed to create Redis client")?;

    let drafts: Arc<dyn DraftStore> = match config.drafts.backend {
        DraftBackend::Memory => Arc::new(MemoryDraftStore::new(config.drafts.ttl())),
        DraftBackend::Redis => Arc::new(RedisDraftStore::new(
            redis.clone(),
            config.drafts.ttl().map(|ttl| ttl.as_secs()),
        )),
    };
    tracing::info!("Draft store backend: {:?}", config.drafts.backend);

    let timeout = config.storage.operation_timeout();
    let app_state = AppState {
        reservations: Arc::new(ReservationService::new(drafts, reservation_repo, timeout)),
        assembler: Arc::new(PayloadAssembler::new(
            Arc::new(redis),
            Arc::new(JwtTokenDecoder::new(&config.auth.jwt_secret)),
            timeout,
        )),
    };

    let app = app(app_state, config.server.allowed_origin.as_deref());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}
