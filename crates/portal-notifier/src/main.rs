use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use futures_util::StreamExt;
use portal_core::SystemClock;
use portal_notifier::{Dispatcher, MessagingChannel, WhatsAppCloudClient};
use portal_platform::{
    NotifierConfig, OUTBOX_CHANNEL, PgPortalStore, RedisBus, apply_schema, connect_database,
    decode_wakeup,
};
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "portal_notifier=info".to_string()),
        )
        .init();

    let config = NotifierConfig::from_env()?;
    let pool = connect_database(&config.service.database_url)
        .await
        .context("failed to connect to postgres")?;
    apply_schema(&pool).await?;
    let redis = RedisBus::connect(&config.service.redis_url)?;

    let channel: Option<Arc<dyn MessagingChannel>> = match config.whatsapp.clone() {
        Some(whatsapp) => Some(Arc::new(WhatsAppCloudClient::new(whatsapp))),
        None => {
            warn!("WHATSAPP_TOKEN not set; only in-app notifications will be delivered");
            None
        }
    };
    let dispatcher = Dispatcher::new(
        Arc::new(PgPortalStore::new(pool)),
        Arc::new(SystemClock),
        channel,
        config.outbox_batch_size,
    );

    let mut pubsub = redis.subscribe_wakeups().await?;
    let mut wakeups = pubsub.on_message();

    let mut poll = tokio::time::interval(Duration::from_secs(config.outbox_poll_secs.max(1)));
    let mut sweep = tokio::time::interval(Duration::from_secs(config.expiry_sweep_secs.max(1)));

    info!("notifier subscribed to {}", OUTBOX_CHANNEL);

    loop {
        tokio::select! {
            msg = wakeups.next() => {
                let msg = msg.with_context(|| format!("{OUTBOX_CHANNEL} stream ended unexpectedly"))?;
                match decode_wakeup(&msg) {
                    Ok(wakeup) => debug!("woken for {} queued messages", wakeup.queued),
                    Err(err) => warn!("{err:#}"),
                }
                drain(&dispatcher).await;
            }
            _ = poll.tick() => drain(&dispatcher).await,
            _ = sweep.tick() => {
                match dispatcher.sweep_expired().await {
                    Ok(0) => {}
                    Ok(expired) => info!("expiry sweep expired {} agreements", expired),
                    Err(err) => error!("expiry sweep failed: {err:#}"),
                }
                drain(&dispatcher).await;
            }
        }
    }
}

async fn drain(dispatcher: &Dispatcher) {
    if let Err(err) = dispatcher.drain_once().await {
        error!("failed to drain outbox: {err:#}");
    }
}
