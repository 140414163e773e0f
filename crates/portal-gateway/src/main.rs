use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result as AnyResult};
use chrono::Duration;
use portal_core::SystemClock;
use portal_gateway::{AppState, router};
use portal_platform::{PgPortalStore, RedisBus, ServiceConfig, apply_schema, connect_database};
use tracing::info;

#[tokio::main]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "portal_gateway=info".to_string()),
        )
        .init();

    let config = ServiceConfig::from_env("0.0.0.0:8080")?;
    let pool = connect_database(&config.database_url)
        .await
        .context("failed to connect to postgres")?;
    apply_schema(&pool).await?;
    let redis = RedisBus::connect(&config.redis_url)?;

    let state = AppState::new(
        Arc::new(PgPortalStore::new(pool)),
        Arc::new(SystemClock),
        Some(redis),
        Duration::seconds(config.pending_document_cache_secs),
    );
    let app = router(state);

    let addr: SocketAddr = config.http_addr.parse()?;
    info!("gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
