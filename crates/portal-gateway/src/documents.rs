use anyhow::Result as AnyResult;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use portal_core::{
    DocumentStatus, NotificationKind, OutboxMessage, PushedDocument, ReviewDecision,
};
use portal_platform::{DocumentListResponse, PushDocumentRequest, ReviewDocumentRequest};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    AppState,
    auth::Caller,
    error::{ApiError, invalid_request, lifecycle_error, not_found, store_error},
};

fn validate_push(payload: &PushDocumentRequest) -> AnyResult<()> {
    if payload.title.trim().is_empty() {
        anyhow::bail!("title is required");
    }
    if payload.file_url.trim().is_empty() {
        anyhow::bail!("fileUrl is required");
    }
    Ok(())
}

pub async fn push_document(
    State(state): State<AppState>,
    caller: Caller,
    Json(payload): Json<PushDocumentRequest>,
) -> Result<(StatusCode, Json<PushedDocument>), ApiError> {
    caller.require_back_office()?;
    validate_push(&payload).map_err(invalid_request)?;
    let now = state.clock.now();

    let document = PushedDocument {
        id: Uuid::new_v4(),
        title: payload.title.trim().to_string(),
        file_url: payload.file_url.trim().to_string(),
        pushed_by: caller.user,
        recipient: payload.recipient,
        status: DocumentStatus::Pending,
        review_note: None,
        pushed_at: now,
        reviewed_at: None,
        version: 0,
    };
    let outbox = vec![OutboxMessage::new(
        document.recipient,
        NotificationKind::DocumentPushed,
        format!("Document \"{}\" needs your approval", document.title),
        Some(document.action_url()),
        now,
    )];

    state
        .store
        .insert_document(&document, &outbox)
        .await
        .map_err(store_error)?;
    state
        .pending_documents
        .lock()
        .await
        .invalidate(&document.recipient);
    state.wake_notifier(&outbox).await;

    info!(
        "document {} pushed to {} by {}",
        document.id, document.recipient, caller.user
    );
    Ok((StatusCode::CREATED, Json(document)))
}

/// Pending documents addressed to the caller, served from the per-recipient
/// cache while it is fresh. The cache lock is not held across the store
/// query; a push or review that lands meanwhile keeps the result out of the
/// cache.
pub async fn pending_documents(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<DocumentListResponse>, ApiError> {
    let generation = {
        let mut cache = state.pending_documents.lock().await;
        if let Some(items) = cache.get(&caller.user) {
            debug!("pending documents for {} served from cache", caller.user);
            return Ok(Json(DocumentListResponse { items }));
        }
        cache.generation(&caller.user)
    };

    let items = state
        .store
        .pending_documents(caller.user)
        .await
        .map_err(store_error)?;

    let mut cache = state.pending_documents.lock().await;
    let purged = cache.purge_expired();
    if purged > 0 {
        debug!("purged {purged} stale pending-document entries");
    }
    if !cache.insert_if_current(caller.user, items.clone(), generation) {
        debug!("pending documents for {} changed during load; not cached", caller.user);
    }

    Ok(Json(DocumentListResponse { items }))
}

pub async fn review_document(
    State(state): State<AppState>,
    caller: Caller,
    Path(document_id): Path<Uuid>,
    Json(payload): Json<ReviewDocumentRequest>,
) -> Result<Json<PushedDocument>, ApiError> {
    let decision = ReviewDecision::parse(&payload.decision).map_err(lifecycle_error)?;
    let mut document = state
        .store
        .document(document_id)
        .await
        .map_err(store_error)?
        .filter(|document| document.recipient == caller.user)
        .ok_or_else(|| not_found("document"))?;
    let now = state.clock.now();

    document
        .review(decision, payload.note.as_deref(), now)
        .map_err(lifecycle_error)?;

    let outbox = vec![OutboxMessage::new(
        document.pushed_by,
        NotificationKind::DocumentReviewed,
        format!("Document \"{}\" was {}", document.title, decision.as_str()),
        Some(document.action_url()),
        now,
    )];
    let saved = state
        .store
        .update_document(&document, &outbox)
        .await
        .map_err(store_error)?;
    state
        .pending_documents
        .lock()
        .await
        .invalidate(&saved.recipient);
    state.wake_notifier(&outbox).await;

    info!("document {} {} by {}", saved.id, decision.as_str(), caller.user);
    Ok(Json(saved))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use chrono::Duration;
    use portal_core::{DocumentStatus, DocumentStore, PushedDocument, Role};
    use serde_json::json;
    use uuid::Uuid;

    use crate::test_support::{Harness, start_of};

    #[tokio::test]
    async fn push_then_approve_clears_pending_list() {
        let harness = Harness::at(start_of(2025, 5, 1));
        let staff = (Uuid::new_v4(), Role::Staff);
        let client = (Uuid::new_v4(), Role::Client);

        let (status, pushed) = harness
            .call(
                "POST",
                "/documents",
                Some(staff),
                Some(json!({
                    "title": "NDA",
                    "fileUrl": "https://files.example.com/nda.pdf",
                    "recipient": client.0,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = pushed["id"].as_str().unwrap().to_string();

        let (_, pending) = harness
            .call("GET", "/documents/pending", Some(client), None)
            .await;
        assert_eq!(pending["items"].as_array().unwrap().len(), 1);

        let (status, _) = harness
            .call(
                "PATCH",
                &format!("/documents/{id}/review"),
                Some(staff),
                Some(json!({ "decision": "approved" })),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = harness
            .call(
                "PATCH",
                &format!("/documents/{id}/review"),
                Some(client),
                Some(json!({ "decision": "rejected" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, reviewed) = harness
            .call(
                "PATCH",
                &format!("/documents/{id}/review"),
                Some(client),
                Some(json!({ "decision": "approved" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reviewed["status"], "approved");

        let (_, pending) = harness
            .call("GET", "/documents/pending", Some(client), None)
            .await;
        assert!(pending["items"].as_array().unwrap().is_empty());

        let (status, _) = harness
            .call(
                "PATCH",
                &format!("/documents/{id}/review"),
                Some(client),
                Some(json!({ "decision": "approved" })),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn pending_list_is_cached_until_ttl_lapses() {
        let harness = Harness::at(start_of(2025, 5, 1));
        let client = (Uuid::new_v4(), Role::Client);

        let (_, pending) = harness
            .call("GET", "/documents/pending", Some(client), None)
            .await;
        assert!(pending["items"].as_array().unwrap().is_empty());

        // Written behind the gateway's back, so the cache is not invalidated.
        let now = start_of(2025, 5, 1);
        let document = PushedDocument {
            id: Uuid::new_v4(),
            title: "Policy".to_string(),
            file_url: "https://files.example.com/policy.pdf".to_string(),
            pushed_by: Uuid::new_v4(),
            recipient: client.0,
            status: DocumentStatus::Pending,
            review_note: None,
            pushed_at: now,
            reviewed_at: None,
            version: 0,
        };
        harness.store.insert_document(&document, &[]).await.unwrap();

        harness.clock.advance(Duration::minutes(4));
        let (_, cached) = harness
            .call("GET", "/documents/pending", Some(client), None)
            .await;
        assert!(cached["items"].as_array().unwrap().is_empty());

        harness.clock.advance(Duration::minutes(2));
        let (_, fresh) = harness
            .call("GET", "/documents/pending", Some(client), None)
            .await;
        assert_eq!(fresh["items"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn push_replaces_a_cached_empty_list() {
        let harness = Harness::at(start_of(2025, 5, 1));
        let staff = (Uuid::new_v4(), Role::Staff);
        let client = (Uuid::new_v4(), Role::Client);

        let (_, pending) = harness
            .call("GET", "/documents/pending", Some(client), None)
            .await;
        assert!(pending["items"].as_array().unwrap().is_empty());

        let (status, _) = harness
            .call(
                "POST",
                "/documents",
                Some(staff),
                Some(json!({
                    "title": "Handbook",
                    "fileUrl": "https://files.example.com/handbook.pdf",
                    "recipient": client.0,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (_, pending) = harness
            .call("GET", "/documents/pending", Some(client), None)
            .await;
        assert_eq!(pending["items"].as_array().unwrap().len(), 1);
    }
}
