pub mod agreements;
pub mod auth;
pub mod bills;
pub mod contacts;
pub mod documents;
pub mod error;
pub mod notifications;
pub mod salary;

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, patch, post, put},
};
use chrono::Duration;
use portal_core::{Clock, OutboxMessage, PortalStore, PushedDocument, TtlCache};
use portal_platform::{OutboxWakeup, RedisBus};
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

pub type PendingDocumentCache = TtlCache<Uuid, Vec<PushedDocument>>;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PortalStore>,
    pub clock: Arc<dyn Clock>,
    /// Absent in tests; the notifier's polling picks the messages up anyway.
    pub redis: Option<RedisBus>,
    pub pending_documents: Arc<Mutex<PendingDocumentCache>>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn PortalStore>,
        clock: Arc<dyn Clock>,
        redis: Option<RedisBus>,
        pending_document_ttl: Duration,
    ) -> Self {
        let pending_documents = TtlCache::new(pending_document_ttl, clock.clone());
        Self {
            store,
            clock,
            redis,
            pending_documents: Arc::new(Mutex::new(pending_documents)),
        }
    }

    /// Pokes the notifier after outbox rows were committed. A lost wake-up
    /// only delays delivery until the next poll.
    pub(crate) async fn wake_notifier(&self, outbox: &[OutboxMessage]) {
        if outbox.is_empty() {
            return;
        }
        let Some(redis) = &self.redis else {
            return;
        };

        let wakeup = OutboxWakeup {
            queued: outbox.len(),
            queued_at: self.clock.now(),
        };
        if let Err(err) = redis.publish_wakeup(&wakeup).await {
            warn!("failed to publish outbox wake-up: {err}");
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route(
            "/agreement",
            get(agreements::list_agreements).post(agreements::create_agreement),
        )
        .route("/agreement/client", get(agreements::list_client_agreements))
        .route("/agreement/view/{agreement_id}", get(agreements::view_agreement))
        .route("/agreement/{agreement_id}", delete(agreements::delete_agreement))
        .route("/agreement/{agreement_id}/sign", patch(agreements::sign_agreement))
        .route(
            "/agreement/{agreement_id}/reject",
            patch(agreements::reject_agreement),
        )
        .route(
            "/agreement/{agreement_id}/extension",
            post(agreements::request_extension),
        )
        .route(
            "/agreement/{agreement_id}/extension/review",
            patch(agreements::review_extension),
        )
        .route("/bills", get(bills::list_bills).post(bills::submit_bill))
        .route("/bills/{bill_id}", get(bills::get_bill).delete(bills::delete_bill))
        .route("/bills/{bill_id}/review", patch(bills::review_bill))
        .route("/bills/{bill_id}/payments", post(bills::record_payment))
        .route("/documents", post(documents::push_document))
        .route("/documents/pending", get(documents::pending_documents))
        .route("/documents/{document_id}/review", patch(documents::review_document))
        .route(
            "/notifications",
            get(notifications::list_notifications).post(notifications::create_notification),
        )
        .route(
            "/notifications/{notification_id}",
            delete(notifications::delete_notification),
        )
        .route(
            "/notifications/{notification_id}/read",
            patch(notifications::mark_read),
        )
        .route("/contacts/{user_id}", put(contacts::upsert_contact))
        .route(
            "/salary/slips",
            get(salary::list_slips).post(salary::create_slip),
        )
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}


#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::test_support::{Harness, start_of};

    #[tokio::test]
    async fn healthz_needs_no_identity() {
        let harness = Harness::at(start_of(2025, 1, 1));
        let (status, body) = harness.call("GET", "/healthz", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }
}
