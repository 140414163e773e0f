use anyhow::Result as AnyResult;
use axum::{
    Json,
    extract::{Path, State},
};
use portal_core::{Contact, Role};
use portal_platform::UpsertContactRequest;
use tracing::info;
use uuid::Uuid;

use crate::{
    AppState,
    auth::Caller,
    error::{ApiError, invalid_request, store_error},
};

/// Accepts E.164-style numbers: optional leading `+`, then 7 to 15 digits.
/// Spaces and dashes are dropped.
fn normalize_phone(raw: &str) -> AnyResult<String> {
    let trimmed = raw.trim();
    let (plus, digits) = match trimmed.strip_prefix('+') {
        Some(rest) => ("+", rest),
        None => ("", trimmed),
    };
    let digits: String = digits
        .chars()
        .filter(|c| !matches!(c, ' ' | '-'))
        .collect();

    if !digits.chars().all(|c| c.is_ascii_digit()) {
        anyhow::bail!("phoneNumber may only contain digits");
    }
    if !(7..=15).contains(&digits.len()) {
        anyhow::bail!("phoneNumber must have between 7 and 15 digits");
    }
    Ok(format!("{plus}{digits}"))
}

pub async fn upsert_contact(
    State(state): State<AppState>,
    caller: Caller,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<UpsertContactRequest>,
) -> Result<Json<Contact>, ApiError> {
    if caller.user != user_id {
        caller.require(&[Role::Admin])?;
    }

    let contact = Contact {
        user_id,
        phone_number: normalize_phone(&payload.phone_number).map_err(invalid_request)?,
        updated_at: state.clock.now(),
    };
    state
        .store
        .upsert_contact(&contact)
        .await
        .map_err(store_error)?;

    info!("contact number updated for {}", user_id);
    Ok(Json(contact))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use portal_core::{ContactDirectory, Role};
    use serde_json::json;
    use uuid::Uuid;

    use super::normalize_phone;
    use crate::test_support::{Harness, start_of};

    #[test]
    fn phone_numbers_are_normalized() {
        assert_eq!(normalize_phone(" +44 7700-900123 ").unwrap(), "+447700900123");
        assert!(normalize_phone("12345").is_err());
        assert!(normalize_phone("call me").is_err());
    }

    #[tokio::test]
    async fn users_manage_their_own_number_and_admins_any() {
        let harness = Harness::at(start_of(2025, 6, 1));
        let client = (Uuid::new_v4(), Role::Client);
        let staff = (Uuid::new_v4(), Role::Staff);
        let admin = (Uuid::new_v4(), Role::Admin);
        let body = json!({ "phoneNumber": "+15550100200" });

        let (status, _) = harness
            .call("PUT", &format!("/contacts/{}", client.0), Some(staff), Some(body.clone()))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, saved) = harness
            .call("PUT", &format!("/contacts/{}", client.0), Some(client), Some(body))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(saved["phoneNumber"], "+15550100200");

        let (status, _) = harness
            .call(
                "PUT",
                &format!("/contacts/{}", client.0),
                Some(admin),
                Some(json!({ "phoneNumber": "+15550100999" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let stored = harness.store.contact(client.0).await.unwrap().unwrap();
        assert_eq!(stored.phone_number, "+15550100999");
    }
}
