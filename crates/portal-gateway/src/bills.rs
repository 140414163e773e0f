use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use portal_core::{Bill, BillStatus, NotificationKind, OutboxMessage, Role};
use portal_finance::{BillDecision, NewBill, payment_summary, refresh_overdue};
use portal_platform::{
    BillListQuery, BillListResponse, BillView, RecordPaymentRequest, RecordPaymentResponse,
    ReviewBillRequest,
};
use tracing::info;
use uuid::Uuid;

use crate::{
    AppState,
    auth::Caller,
    error::{ApiError, lifecycle_error, not_found, store_error},
};

async fn load_bill(state: &AppState, caller: &Caller, bill_id: Uuid) -> Result<Bill, ApiError> {
    let mut bill = state
        .store
        .bill(bill_id)
        .await
        .map_err(store_error)?
        .filter(|bill| !caller.is_client() || bill.client == caller.user)
        .ok_or_else(|| not_found("bill"))?;
    refresh_overdue(&mut bill, state.clock.today());
    Ok(bill)
}

pub async fn submit_bill(
    State(state): State<AppState>,
    caller: Caller,
    Json(payload): Json<NewBill>,
) -> Result<(StatusCode, Json<BillView>), ApiError> {
    caller.require(&[Role::Client])?;

    let bill = portal_finance::submit_bill(payload, caller.user, state.clock.now())
        .map_err(lifecycle_error)?;
    state
        .store
        .insert_bill(&bill, &[])
        .await
        .map_err(store_error)?;

    info!(
        "bill {} submitted by client {} for {} {}",
        bill.bill_number, bill.client, bill.amount, bill.currency
    );
    Ok((StatusCode::CREATED, Json(BillView::from(bill))))
}

pub async fn list_bills(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<BillListQuery>,
) -> Result<Json<BillListResponse>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(BillStatus::parse)
        .transpose()
        .map_err(lifecycle_error)?;
    let client = caller.is_client().then_some(caller.user);
    let today = state.clock.today();

    let mut bills = state.store.list_bills(client).await.map_err(store_error)?;
    for bill in &mut bills {
        refresh_overdue(bill, today);
    }
    let items = bills
        .into_iter()
        .filter(|bill| status.is_none_or(|status| bill.status == status))
        .map(BillView::from)
        .collect();

    Ok(Json(BillListResponse { items }))
}

pub async fn get_bill(
    State(state): State<AppState>,
    caller: Caller,
    Path(bill_id): Path<Uuid>,
) -> Result<Json<BillView>, ApiError> {
    let bill = load_bill(&state, &caller, bill_id).await?;
    Ok(Json(BillView::from(bill)))
}

pub async fn review_bill(
    State(state): State<AppState>,
    caller: Caller,
    Path(bill_id): Path<Uuid>,
    Json(payload): Json<ReviewBillRequest>,
) -> Result<Json<BillView>, ApiError> {
    caller.require_back_office()?;
    let decision = BillDecision::parse(&payload.decision).map_err(lifecycle_error)?;
    let mut bill = load_bill(&state, &caller, bill_id).await?;
    let now = state.clock.now();

    portal_finance::review_bill(&mut bill, decision, payload.note.as_deref(), now)
        .map_err(lifecycle_error)?;

    let message = match &bill.review_note {
        Some(note) => format!("Bill {} was {}: {}", bill.bill_number, bill.status, note),
        None => format!("Bill {} was {}", bill.bill_number, bill.status),
    };
    let outbox = vec![OutboxMessage::new(
        bill.client,
        NotificationKind::BillReviewed,
        message,
        Some(bill.action_url()),
        now,
    )];
    let saved = state
        .store
        .update_bill(&bill, &outbox)
        .await
        .map_err(store_error)?;
    state.wake_notifier(&outbox).await;

    info!("bill {} marked {} by {}", saved.bill_number, saved.status, caller.user);
    Ok(Json(BillView::from(saved)))
}

pub async fn record_payment(
    State(state): State<AppState>,
    caller: Caller,
    Path(bill_id): Path<Uuid>,
    Json(payload): Json<RecordPaymentRequest>,
) -> Result<(StatusCode, Json<RecordPaymentResponse>), ApiError> {
    caller.require_back_office()?;
    let mut bill = load_bill(&state, &caller, bill_id).await?;
    let now = state.clock.now();

    let payment = portal_finance::record_payment(
        &mut bill,
        payload.amount,
        &payload.method,
        payload.reference.as_deref(),
        caller.user,
        now,
    )
    .map_err(lifecycle_error)?;

    let summary = payment_summary(&bill);
    let outbox = vec![OutboxMessage::new(
        bill.client,
        NotificationKind::PaymentRecorded,
        format!(
            "Payment of {} {} recorded on bill {}; {} remaining",
            payment.amount, bill.currency, bill.bill_number, summary.remaining
        ),
        Some(bill.action_url()),
        now,
    )];
    let saved = state
        .store
        .update_bill(&bill, &outbox)
        .await
        .map_err(store_error)?;
    state.wake_notifier(&outbox).await;

    info!(
        "payment {} of {} recorded on bill {}",
        payment.id, payment.amount, saved.bill_number
    );
    Ok((
        StatusCode::CREATED,
        Json(RecordPaymentResponse {
            payment,
            bill: BillView::from(saved),
        }),
    ))
}

pub async fn delete_bill(
    State(state): State<AppState>,
    caller: Caller,
    Path(bill_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    caller.require(&[Role::Admin])?;
    state.store.delete_bill(bill_id).await.map_err(store_error)?;

    info!("bill {} deleted by {}", bill_id, caller.user);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use portal_core::Role;
    use serde_json::{Value, json};
    use uuid::Uuid;

    use crate::test_support::{Harness, start_of};

    async fn submit(harness: &Harness, client: (Uuid, Role), amount: &str) -> Value {
        let (status, body) = harness
            .call(
                "POST",
                "/bills",
                Some(client),
                Some(json!({
                    "title": "Consulting, March",
                    "amount": amount,
                    "currency": "usd",
                    "dueDate": "2025-03-31",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body
    }

    #[tokio::test]
    async fn two_payments_settle_a_bill() {
        let harness = Harness::at(start_of(2025, 3, 1));
        let client = (Uuid::new_v4(), Role::Client);
        let staff = (Uuid::new_v4(), Role::Staff);
        let bill = submit(&harness, client, "1000").await;
        let id = bill["id"].as_str().unwrap().to_string();
        assert_eq!(bill["status"], "Pending");
        assert_eq!(bill["summary"]["remaining"], "1000");

        let (status, _) = harness
            .call(
                "POST",
                &format!("/bills/{id}/payments"),
                Some(client),
                Some(json!({ "amount": "400", "method": "card" })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        for amount in ["400", "600"] {
            let (status, body) = harness
                .call(
                    "POST",
                    &format!("/bills/{id}/payments"),
                    Some(staff),
                    Some(json!({ "amount": amount, "method": "bank_transfer" })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED, "{body}");
        }

        let (status, view) = harness
            .call("GET", &format!("/bills/{id}"), Some(client), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["status"], "Paid");
        assert_eq!(view["summary"]["totalPaid"], "1000");
        assert_eq!(view["summary"]["remaining"], "0");
        assert_eq!(view["payments"].as_array().unwrap().len(), 2);

        let (status, _) = harness
            .call(
                "POST",
                &format!("/bills/{id}/payments"),
                Some(staff),
                Some(json!({ "amount": "1", "method": "cash" })),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn overdue_filter_and_review() {
        let harness = Harness::at(start_of(2025, 3, 1));
        let client = (Uuid::new_v4(), Role::Client);
        let admin = (Uuid::new_v4(), Role::Admin);
        let bill = submit(&harness, client, "250.50").await;
        let id = bill["id"].as_str().unwrap().to_string();

        harness.clock.set(start_of(2025, 4, 2));
        let (_, overdue) = harness
            .call("GET", "/bills?status=overdue", Some(admin), None)
            .await;
        assert_eq!(overdue["items"].as_array().unwrap().len(), 1);

        let (status, _) = harness
            .call(
                "PATCH",
                &format!("/bills/{id}/review"),
                Some(admin),
                Some(json!({ "decision": "reject" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, reviewed) = harness
            .call(
                "PATCH",
                &format!("/bills/{id}/review"),
                Some(admin),
                Some(json!({ "decision": "sanction" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reviewed["status"], "Sanctioned");

        let outbox = harness.store.outbox_snapshot().await;
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].recipient, client.0);
    }

    #[tokio::test]
    async fn clients_only_see_their_own_bills() {
        let harness = Harness::at(start_of(2025, 3, 1));
        let owner = (Uuid::new_v4(), Role::Client);
        let other = (Uuid::new_v4(), Role::Client);
        let bill = submit(&harness, owner, "80").await;
        let id = bill["id"].as_str().unwrap();

        let (status, _) = harness
            .call("GET", &format!("/bills/{id}"), Some(other), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (_, listed) = harness.call("GET", "/bills", Some(other), None).await;
        assert!(listed["items"].as_array().unwrap().is_empty());
    }
}
