use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use portal_core::{Notification, NotificationKind, OutboxMessage};
use portal_platform::{
    CreateNotificationRequest, CreateNotificationResponse, NotificationListQuery,
    NotificationListResponse,
};
use tracing::info;
use uuid::Uuid;

use crate::{
    AppState,
    auth::Caller,
    error::{ApiError, store_error},
};

pub async fn list_notifications(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<NotificationListQuery>,
) -> Result<Json<NotificationListResponse>, ApiError> {
    let items = state
        .store
        .notifications(caller.user, query.unread.unwrap_or(false))
        .await
        .map_err(store_error)?;
    Ok(Json(NotificationListResponse { items }))
}

/// Queues a free-form notification. Delivery happens in the notifier.
pub async fn create_notification(
    State(state): State<AppState>,
    caller: Caller,
    Json(payload): Json<CreateNotificationRequest>,
) -> Result<(StatusCode, Json<CreateNotificationResponse>), ApiError> {
    caller.require_back_office()?;
    let message = payload.message.trim();
    if message.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "message is required".to_string()));
    }

    let now = state.clock.now();
    let action_url = payload
        .action_url
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty());
    let outbox = vec![
        OutboxMessage::new(
            payload.recipient,
            NotificationKind::General,
            message,
            action_url,
            now,
        )
        .with_whatsapp(payload.whatsapp),
    ];

    state.store.enqueue(&outbox).await.map_err(store_error)?;
    state.wake_notifier(&outbox).await;

    info!(
        "notification {} queued for {} by {}",
        outbox[0].id, payload.recipient, caller.user
    );
    Ok((
        StatusCode::ACCEPTED,
        Json(CreateNotificationResponse {
            outbox_id: outbox[0].id,
            queued_at: now,
        }),
    ))
}

pub async fn mark_read(
    State(state): State<AppState>,
    caller: Caller,
    Path(notification_id): Path<Uuid>,
) -> Result<Json<Notification>, ApiError> {
    let notification = state
        .store
        .mark_read(caller.user, notification_id)
        .await
        .map_err(store_error)?;
    Ok(Json(notification))
}

pub async fn delete_notification(
    State(state): State<AppState>,
    caller: Caller,
    Path(notification_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .store
        .delete_notification(caller.user, notification_id)
        .await
        .map_err(store_error)?;
    Ok(StatusCode::NO_CONTENT)
}
