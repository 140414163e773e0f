use anyhow::{Context, Result};
use redis::{AsyncCommands, Client, Msg, aio::PubSub};

use crate::contracts::{OUTBOX_CHANNEL, OutboxWakeup};

/// Pub/sub link between the gateway and the notifier. Carries only wake-ups;
/// the outbox table stays the source of truth.
#[derive(Clone)]
pub struct RedisBus {
    client: Client,
}

impl RedisBus {
    pub fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url).context("invalid REDIS_URL")?;
        Ok(Self { client })
    }

    pub async fn publish_wakeup(&self, wakeup: &OutboxWakeup) -> Result<()> {
        let mut connection = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(wakeup)?;
        let _: i64 = connection.publish(OUTBOX_CHANNEL, payload).await?;
        Ok(())
    }

    pub async fn subscribe_wakeups(&self) -> Result<PubSub> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .context("failed to open redis pubsub connection")?;
        pubsub.subscribe(OUTBOX_CHANNEL).await?;
        Ok(pubsub)
    }
}

pub fn decode_wakeup(msg: &Msg) -> Result<OutboxWakeup> {
    let payload: String = msg.get_payload()?;
    parse_wakeup(&payload)
}

fn parse_wakeup(payload: &str) -> Result<OutboxWakeup> {
    serde_json::from_str(payload).context("malformed outbox wake-up")
}
