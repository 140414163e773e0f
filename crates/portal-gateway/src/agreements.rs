use anyhow::Result as AnyResult;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::NaiveDate;
use portal_core::{
    Agreement, AgreementFilter, AgreementStatus, NewAgreement, NotificationKind, OutboxMessage,
    ReviewDecision, Role, StoreError,
};
use portal_platform::{
    AgreementListQuery, AgreementListResponse, ExtensionRequestBody, RejectAgreementRequest,
    ReviewExtensionRequest, SignAgreementRequest,
};
use tracing::info;
use uuid::Uuid;

use crate::{
    AppState,
    auth::{Caller, ClientAddr},
    error::{ApiError, invalid_request, lifecycle_error, not_found, store_error},
};

fn validate_new_agreement(input: &NewAgreement, today: NaiveDate) -> AnyResult<()> {
    if input.title.trim().is_empty() {
        anyhow::bail!("title is required");
    }
    if input.file_url.trim().is_empty() {
        anyhow::bail!("fileUrl is required");
    }
    if input.expiry_date < today {
        anyhow::bail!("expiryDate must not be in the past");
    }
    Ok(())
}

fn status_filter(raw: Option<&str>) -> Result<Option<AgreementStatus>, ApiError> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(AgreementStatus::parse)
        .transpose()
        .map_err(lifecycle_error)
}

/// Loads an agreement the caller may see. Clients only see their own; any
/// other id reads as missing.
async fn load_agreement(
    state: &AppState,
    caller: &Caller,
    agreement_id: Uuid,
) -> Result<Agreement, ApiError> {
    let agreement = state
        .store
        .agreement(agreement_id)
        .await
        .map_err(store_error)?
        .filter(|agreement| !caller.is_client() || agreement.client == caller.user)
        .ok_or_else(|| not_found("agreement"))?;
    Ok(agreement)
}

async fn save_agreement(
    state: &AppState,
    agreement: &Agreement,
    outbox: Vec<OutboxMessage>,
) -> Result<Agreement, ApiError> {
    let saved = state
        .store
        .update_agreement(agreement, &outbox)
        .await
        .map_err(store_error)?;
    state.wake_notifier(&outbox).await;
    Ok(saved)
}

async fn list_with(
    state: &AppState,
    filter: AgreementFilter,
    status: Option<&str>,
) -> Result<Json<AgreementListResponse>, ApiError> {
    let status = status_filter(status)?;
    let today = state.clock.today();

    let mut items = state
        .store
        .list_agreements(&filter)
        .await
        .map_err(store_error)?;
    for agreement in &mut items {
        agreement.refresh_expiry(today);
    }
    if let Some(status) = status {
        items.retain(|agreement| agreement.status == status);
    }

    Ok(Json(AgreementListResponse { items }))
}

pub async fn create_agreement(
    State(state): State<AppState>,
    caller: Caller,
    Json(payload): Json<NewAgreement>,
) -> Result<(StatusCode, Json<Agreement>), ApiError> {
    caller.require_back_office()?;
    let now = state.clock.now();
    validate_new_agreement(&payload, now.date_naive()).map_err(invalid_request)?;

    let agreement = Agreement::new(payload, caller.user, now);
    let outbox = vec![
        OutboxMessage::new(
            agreement.client,
            NotificationKind::AgreementPushed,
            format!(
                "New agreement \"{}\" is waiting for your signature",
                agreement.title
            ),
            Some(agreement.action_url()),
            now,
        )
        .with_whatsapp(true),
    ];

    state
        .store
        .insert_agreement(&agreement, &outbox)
        .await
        .map_err(store_error)?;
    state.wake_notifier(&outbox).await;

    info!(
        "agreement {} pushed to client {} by {}",
        agreement.agreement_id, agreement.client, caller.user
    );
    Ok((StatusCode::CREATED, Json(agreement)))
}

pub async fn list_agreements(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<AgreementListQuery>,
) -> Result<Json<AgreementListResponse>, ApiError> {
    caller.require_back_office()?;

    let filter = AgreementFilter {
        client: None,
        uploaded_by: query.mine.unwrap_or(false).then_some(caller.user),
    };
    list_with(&state, filter, query.status.as_deref()).await
}

pub async fn list_client_agreements(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<AgreementListQuery>,
) -> Result<Json<AgreementListResponse>, ApiError> {
    caller.require(&[Role::Client])?;

    let filter = AgreementFilter {
        client: Some(caller.user),
        uploaded_by: None,
    };
    list_with(&state, filter, query.status.as_deref()).await
}

/// Reading as the owning client marks a pending agreement viewed.
pub async fn view_agreement(
    State(state): State<AppState>,
    caller: Caller,
    Path(agreement_id): Path<Uuid>,
) -> Result<Json<Agreement>, ApiError> {
    let mut agreement = load_agreement(&state, &caller, agreement_id).await?;
    let now = state.clock.now();

    if !caller.is_client() {
        agreement.refresh_expiry(now.date_naive());
        return Ok(Json(agreement));
    }

    if !agreement.mark_viewed(now) {
        return Ok(Json(agreement));
    }

    match state.store.update_agreement(&agreement, &[]).await {
        Ok(saved) => {
            info!("agreement {} viewed by client {}", saved.agreement_id, caller.user);
            Ok(Json(saved))
        }
        // Another request changed it first; serve what is stored now.
        Err(StoreError::Conflict(_)) => {
            let mut current = load_agreement(&state, &caller, agreement_id).await?;
            current.refresh_expiry(now.date_naive());
            Ok(Json(current))
        }
        Err(err) => Err(store_error(err)),
    }
}

pub async fn sign_agreement(
    State(state): State<AppState>,
    caller: Caller,
    ClientAddr(ip_address): ClientAddr,
    Path(agreement_id): Path<Uuid>,
    Json(payload): Json<SignAgreementRequest>,
) -> Result<Json<Agreement>, ApiError> {
    caller.require(&[Role::Client])?;
    let mut agreement = load_agreement(&state, &caller, agreement_id).await?;
    let now = state.clock.now();

    agreement
        .sign(&payload.name, &ip_address, now)
        .map_err(lifecycle_error)?;

    let outbox = vec![OutboxMessage::new(
        agreement.uploaded_by,
        NotificationKind::AgreementSigned,
        format!("Agreement \"{}\" was signed", agreement.title),
        Some(agreement.action_url()),
        now,
    )];
    let saved = save_agreement(&state, &agreement, outbox).await?;

    info!("agreement {} signed from {}", saved.agreement_id, ip_address);
    Ok(Json(saved))
}

pub async fn reject_agreement(
    State(state): State<AppState>,
    caller: Caller,
    Path(agreement_id): Path<Uuid>,
    Json(payload): Json<RejectAgreementRequest>,
) -> Result<Json<Agreement>, ApiError> {
    caller.require(&[Role::Client])?;
    let mut agreement = load_agreement(&state, &caller, agreement_id).await?;
    let now = state.clock.now();

    agreement
        .reject(&payload.reason, now)
        .map_err(lifecycle_error)?;

    let outbox = vec![OutboxMessage::new(
        agreement.uploaded_by,
        NotificationKind::AgreementRejected,
        format!(
            "Agreement \"{}\" was rejected: {}",
            agreement.title,
            payload.reason.trim()
        ),
        Some(agreement.action_url()),
        now,
    )];
    let saved = save_agreement(&state, &agreement, outbox).await?;

    info!("agreement {} rejected by client {}", saved.agreement_id, caller.user);
    Ok(Json(saved))
}

pub async fn request_extension(
    State(state): State<AppState>,
    caller: Caller,
    Path(agreement_id): Path<Uuid>,
    Json(payload): Json<ExtensionRequestBody>,
) -> Result<Json<Agreement>, ApiError> {
    caller.require(&[Role::Client])?;
    let mut agreement = load_agreement(&state, &caller, agreement_id).await?;
    let now = state.clock.now();

    agreement
        .request_extension(payload.requested_expiry_date, &payload.reason, now)
        .map_err(lifecycle_error)?;

    let outbox = match &agreement.extension_request {
        Some(request) => vec![OutboxMessage::new(
            agreement.uploaded_by,
            NotificationKind::ExtensionRequested,
            format!(
                "Extension requested for \"{}\" until {}",
                agreement.title, request.requested_expiry_date
            ),
            Some(agreement.action_url()),
            now,
        )],
        None => Vec::new(),
    };
    let saved = save_agreement(&state, &agreement, outbox).await?;

    info!("extension requested on agreement {}", saved.agreement_id);
    Ok(Json(saved))
}

pub async fn review_extension(
    State(state): State<AppState>,
    caller: Caller,
    Path(agreement_id): Path<Uuid>,
    Json(payload): Json<ReviewExtensionRequest>,
) -> Result<Json<Agreement>, ApiError> {
    caller.require(&[Role::Admin])?;
    let decision = ReviewDecision::parse(&payload.decision).map_err(lifecycle_error)?;
    let mut agreement = load_agreement(&state, &caller, agreement_id).await?;
    let now = state.clock.now();

    agreement
        .review_extension(decision, caller.user, now)
        .map_err(lifecycle_error)?;

    let message = match decision {
        ReviewDecision::Approved => format!(
            "Your extension for \"{}\" was approved; it now expires on {}",
            agreement.title, agreement.expiry_date
        ),
        ReviewDecision::Rejected => {
            format!("Your extension for \"{}\" was rejected", agreement.title)
        }
    };
    let outbox = vec![
        OutboxMessage::new(
            agreement.client,
            NotificationKind::ExtensionReviewed,
            message,
            Some(agreement.action_url()),
            now,
        )
        .with_whatsapp(true),
    ];
    let saved = save_agreement(&state, &agreement, outbox).await?;

    info!(
        "extension on agreement {} {} by {}",
        saved.agreement_id,
        decision.as_str(),
        caller.user
    );
    Ok(Json(saved))
}

pub async fn delete_agreement(
    State(state): State<AppState>,
    caller: Caller,
    Path(agreement_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    caller.require(&[Role::Admin])?;

    state
        .store
        .delete_agreement(agreement_id)
        .await
        .map_err(store_error)?;

    info!("agreement {} deleted by {}", agreement_id, caller.user);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use chrono::Duration;
    use portal_core::{NotificationStore, OutboxStatus, Role};
    use serde_json::{Value, json};
    use uuid::Uuid;

    use crate::test_support::{Harness, start_of};

    struct Cast {
        admin: (Uuid, Role),
        staff: (Uuid, Role),
        client: (Uuid, Role),
    }

    fn cast() -> Cast {
        Cast {
            admin: (Uuid::new_v4(), Role::Admin),
            staff: (Uuid::new_v4(), Role::Staff),
            client: (Uuid::new_v4(), Role::Client),
        }
    }

    async fn push(harness: &Harness, cast: &Cast, expiry: &str) -> Value {
        let (status, body) = harness
            .call(
                "POST",
                "/agreement",
                Some(cast.staff),
                Some(json!({
                    "title": "Service agreement",
                    "fileUrl": "https://files.example.com/agr.pdf",
                    "expiryDate": expiry,
                    "client": cast.client.0,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body
    }

    #[tokio::test]
    async fn push_view_and_sign() {
        let harness = Harness::at(start_of(2025, 1, 10));
        let cast = cast();
        let pushed = push(&harness, &cast, "2025-02-01").await;
        assert_eq!(pushed["status"], "pending");
        assert!(pushed["agreementId"].as_str().unwrap().starts_with("AGR-20250110-"));
        let id = pushed["id"].as_str().unwrap().to_string();

        let (status, viewed) = harness
            .call("GET", &format!("/agreement/view/{id}"), Some(cast.client), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(viewed["status"], "viewed");
        assert!(viewed["viewedAt"].is_string());

        let (status, signed) = harness
            .call(
                "PATCH",
                &format!("/agreement/{id}/sign"),
                Some(cast.client),
                Some(json!({ "name": "Ada Client" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(signed["status"], "signed");
        assert_eq!(signed["clientSignature"]["name"], "Ada Client");
        assert_eq!(signed["clientSignature"]["ipAddress"], "unknown");

        let outbox = harness.store.outbox_snapshot().await;
        assert_eq!(outbox.len(), 2);
        assert_eq!(outbox[0].recipient, cast.client.0);
        assert!(outbox[0].whatsapp);
        assert_eq!(outbox[1].recipient, cast.staff.0);
        assert!(outbox.iter().all(|message| message.status == OutboxStatus::Pending));
    }

    #[tokio::test]
    async fn clients_cannot_push_or_see_foreign_agreements() {
        let harness = Harness::at(start_of(2025, 1, 10));
        let cast = cast();
        let (status, _) = harness
            .call(
                "POST",
                "/agreement",
                Some(cast.client),
                Some(json!({
                    "title": "Self-service",
                    "fileUrl": "https://files.example.com/x.pdf",
                    "expiryDate": "2025-02-01",
                    "client": cast.client.0,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let pushed = push(&harness, &cast, "2025-02-01").await;
        let id = pushed["id"].as_str().unwrap();
        let stranger = (Uuid::new_v4(), Role::Client);
        let (status, _) = harness
            .call("GET", &format!("/agreement/view/{id}"), Some(stranger), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = harness.call("GET", "/agreement", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn empty_rejection_reason_leaves_agreement_pending() {
        let harness = Harness::at(start_of(2025, 1, 10));
        let cast = cast();
        let pushed = push(&harness, &cast, "2025-02-01").await;
        let id = pushed["id"].as_str().unwrap();

        let (status, _) = harness
            .call(
                "PATCH",
                &format!("/agreement/{id}/reject"),
                Some(cast.client),
                Some(json!({ "reason": "   " })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, list) = harness
            .call("GET", "/agreement/client", Some(cast.client), None)
            .await;
        assert_eq!(list["items"][0]["status"], "pending");

        let (status, rejected) = harness
            .call(
                "PATCH",
                &format!("/agreement/{id}/reject"),
                Some(cast.client),
                Some(json!({ "reason": "pricing is wrong" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(rejected["rejectionReason"], "pricing is wrong");

        let (status, _) = harness
            .call(
                "PATCH",
                &format!("/agreement/{id}/sign"),
                Some(cast.client),
                Some(json!({ "name": "Ada Client" })),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn expired_agreement_extension_round_trip() {
        let harness = Harness::at(start_of(2024, 12, 20));
        let cast = cast();
        let pushed = push(&harness, &cast, "2025-01-01").await;
        let id = pushed["id"].as_str().unwrap().to_string();

        harness.clock.set(start_of(2025, 1, 15));
        let (_, listed) = harness
            .call("GET", "/agreement?status=expired", Some(cast.admin), None)
            .await;
        assert_eq!(listed["items"].as_array().unwrap().len(), 1);

        let (status, requested) = harness
            .call(
                "POST",
                &format!("/agreement/{id}/extension"),
                Some(cast.client),
                Some(json!({
                    "requestedExpiryDate": "2025-03-01",
                    "reason": "need more time",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{requested}");
        assert_eq!(requested["status"], "expired");
        assert_eq!(requested["extensionRequest"]["status"], "pending");

        let (status, _) = harness
            .call(
                "PATCH",
                &format!("/agreement/{id}/extension/review"),
                Some(cast.staff),
                Some(json!({ "decision": "approved" })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, reviewed) = harness
            .call(
                "PATCH",
                &format!("/agreement/{id}/extension/review"),
                Some(cast.admin),
                Some(json!({ "decision": "approved" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{reviewed}");
        assert_eq!(reviewed["expiryDate"], "2025-03-01");
        assert_eq!(reviewed["status"], "pending");
        assert_eq!(reviewed["extensionRequest"]["status"], "approved");
        let extensions = reviewed["extensions"].as_array().unwrap();
        assert_eq!(extensions.len(), 1);
        assert_eq!(extensions[0]["oldExpiryDate"], "2025-01-01");
        assert_eq!(extensions[0]["newExpiryDate"], "2025-03-01");
        assert_eq!(extensions[0]["reason"], "need more time");
    }

    #[tokio::test]
    async fn extension_is_refused_before_expiry() {
        let harness = Harness::at(start_of(2025, 1, 10));
        let cast = cast();
        let pushed = push(&harness, &cast, "2025-02-01").await;
        let id = pushed["id"].as_str().unwrap();

        let (status, _) = harness
            .call(
                "POST",
                &format!("/agreement/{id}/extension"),
                Some(cast.client),
                Some(json!({ "requestedExpiryDate": "2025-04-01", "reason": "early" })),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn mine_filter_and_delete_cascade() {
        let harness = Harness::at(start_of(2025, 1, 10));
        let cast = cast();
        let pushed = push(&harness, &cast, "2025-02-01").await;
        let id = pushed["id"].as_str().unwrap().to_string();

        let (_, mine) = harness
            .call("GET", "/agreement?mine=true", Some(cast.admin), None)
            .await;
        assert!(mine["items"].as_array().unwrap().is_empty());
        let (_, all) = harness.call("GET", "/agreement", Some(cast.admin), None).await;
        assert_eq!(all["items"].as_array().unwrap().len(), 1);

        let (status, _) = harness
            .call("DELETE", &format!("/agreement/{id}"), Some(cast.staff), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = harness
            .call("DELETE", &format!("/agreement/{id}"), Some(cast.admin), None)
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let due = harness
            .store
            .due_messages(start_of(2025, 1, 10) + Duration::hours(1), 10)
            .await
            .unwrap();
        assert!(due.is_empty());
        let (status, _) = harness
            .call("GET", &format!("/agreement/view/{id}"), Some(cast.admin), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
