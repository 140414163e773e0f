use std::sync::Arc;

use anyhow::Result;
use chrono::Duration;
use portal_core::{
    Clock, NotificationKind, OutboxMessage, PortalStore, StoreError,
};
use tracing::{debug, error, info, warn};

use crate::whatsapp::MessagingChannel;

/// Exponential backoff between delivery attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: i32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::seconds(30),
            max_delay: Duration::hours(1),
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// Wait before the attempt following failure number `attempts`.
    pub fn delay(&self, attempts: i32) -> Duration {
        let mut delay = self.base_delay;
        for _ in 1..attempts.max(1) {
            delay = delay * 2;
            if delay >= self.max_delay {
                return self.max_delay;
            }
        }
        delay.min(self.max_delay)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub delivered: usize,
    pub retried: usize,
    pub dead: usize,
}

pub struct Dispatcher {
    store: Arc<dyn PortalStore>,
    clock: Arc<dyn Clock>,
    channel: Option<Arc<dyn MessagingChannel>>,
    retry: RetryPolicy,
    batch_size: usize,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn PortalStore>,
        clock: Arc<dyn Clock>,
        channel: Option<Arc<dyn MessagingChannel>>,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            clock,
            channel,
            retry: RetryPolicy::default(),
            batch_size: batch_size.max(1),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Delivers every outbox message that is due. Failed messages are
    /// rescheduled with backoff, or marked dead once attempts run out.
    pub async fn drain_once(&self) -> Result<DrainReport, StoreError> {
        let now = self.clock.now();
        let due = self.store.due_messages(now, self.batch_size).await?;
        let mut report = DrainReport::default();

        for message in due {
            match self.deliver(&message).await {
                Ok(()) => {
                    self.store.mark_delivered(message.id, self.clock.now()).await?;
                    report.delivered += 1;
                }
                Err(err) => {
                    let attempts = message.attempts + 1;
                    let reason = format!("{err:#}");
                    if attempts >= self.retry.max_attempts {
                        self.store.mark_dead(message.id, attempts, &reason).await?;
                        error!(
                            "outbox message {} to {} dead after {} attempts: {}",
                            message.id, message.recipient, attempts, reason
                        );
                        report.dead += 1;
                    } else {
                        let next_attempt_at = now + self.retry.delay(attempts);
                        self.store
                            .reschedule(message.id, attempts, next_attempt_at, &reason)
                            .await?;
                        warn!(
                            "outbox message {} attempt {} failed, retrying at {}: {}",
                            message.id, attempts, next_attempt_at, reason
                        );
                        report.retried += 1;
                    }
                }
            }
        }

        if report != DrainReport::default() {
            info!(
                "outbox drained: {} delivered, {} retried, {} dead",
                report.delivered, report.retried, report.dead
            );
        }
        Ok(report)
    }

    async fn deliver(&self, message: &OutboxMessage) -> Result<()> {
        // Shares the outbox id, so a redelivery after a partial failure does
        // not duplicate the in-app record.
        if !self.store.insert_notification(&message.to_notification()).await? {
            debug!("notification {} already recorded", message.id);
        }

        if !message.whatsapp {
            return Ok(());
        }
        let Some(channel) = &self.channel else {
            debug!("whatsapp disabled; skipping phone delivery of {}", message.id);
            return Ok(());
        };
        let Some(contact) = self.store.contact(message.recipient).await? else {
            debug!("no contact number for {}; skipping whatsapp", message.recipient);
            return Ok(());
        };

        channel
            .send_template(&contact.phone_number, &message.message)
            .await
    }

    /// Persists the expiry of agreements whose date has passed and tells the
    /// client and the uploader. Returns how many agreements were expired.
    pub async fn sweep_expired(&self) -> Result<usize, StoreError> {
        let now = self.clock.now();
        let today = now.date_naive();
        let mut expired = 0;

        for mut agreement in self.store.agreements_past_expiry(today).await? {
            if !agreement.refresh_expiry(today) {
                continue;
            }
            agreement.updated_at = now;

            let message = format!(
                "Agreement \"{}\" expired on {}",
                agreement.title, agreement.expiry_date
            );
            let outbox = [
                OutboxMessage::new(
                    agreement.client,
                    NotificationKind::AgreementExpired,
                    message.clone(),
                    Some(agreement.action_url()),
                    now,
                )
                .with_whatsapp(true),
                OutboxMessage::new(
                    agreement.uploaded_by,
                    NotificationKind::AgreementExpired,
                    message,
                    Some(agreement.action_url()),
                    now,
                ),
            ];

            match self.store.update_agreement(&agreement, &outbox).await {
                Ok(saved) => {
                    info!("agreement {} expired", saved.agreement_id);
                    expired += 1;
                }
                Err(StoreError::Conflict(_)) => {
                    debug!(
                        "agreement {} changed during sweep; next sweep retries",
                        agreement.agreement_id
                    );
                }
                Err(err) => return Err(err),
            }
        }

        Ok(expired)
    }
}
