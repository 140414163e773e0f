use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use portal_core::{Role, SalarySlip};
use portal_finance::{SalaryInput, salary_slip};
use portal_platform::{SalarySlipListResponse, SalarySlipQuery};
use tracing::info;

use crate::{
    AppState,
    auth::Caller,
    error::{ApiError, invalid_request, store_error},
};

pub async fn create_slip(
    State(state): State<AppState>,
    caller: Caller,
    Json(payload): Json<SalaryInput>,
) -> Result<(StatusCode, Json<SalarySlip>), ApiError> {
    caller.require(&[Role::Admin])?;

    let slip = salary_slip(&payload, caller.user, state.clock.now()).map_err(invalid_request)?;
    state.store.insert_slip(&slip).await.map_err(store_error)?;

    info!(
        "salary slip {} for staff {} period {} net {}",
        slip.id, slip.staff_id, slip.period, slip.net
    );
    Ok((StatusCode::CREATED, Json(slip)))
}

/// Admins may list anyone's slips; staff only ever see their own.
pub async fn list_slips(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<SalarySlipQuery>,
) -> Result<Json<SalarySlipListResponse>, ApiError> {
    caller.require_back_office()?;
    let staff_id = if caller.role == Role::Admin {
        query.staff_id
    } else {
        if query.staff_id.is_some_and(|staff_id| staff_id != caller.user) {
            return Err((
                StatusCode::FORBIDDEN,
                "staff may only list their own salary slips".to_string(),
            ));
        }
        Some(caller.user)
    };

    let items = state.store.slips(staff_id).await.map_err(store_error)?;
    Ok(Json(SalarySlipListResponse { items }))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use portal_core::Role;
    use rust_decimal::Decimal;
    use serde_json::json;
    use uuid::Uuid;

    use crate::test_support::{Harness, start_of};

    #[tokio::test]
    async fn admin_computes_one_slip_per_period() {
        let harness = Harness::at(start_of(2025, 2, 1));
        let admin = (Uuid::new_v4(), Role::Admin);
        let staff = (Uuid::new_v4(), Role::Staff);
        let input = json!({
            "staffId": staff.0,
            "period": "2025-01",
            "baseMonthly": "3000",
            "workingDays": 20,
            "daysPresent": 15,
            "allowances": "100",
            "deductions": "50",
        });

        let (status, _) = harness
            .call("POST", "/salary/slips", Some(staff), Some(input.clone()))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, slip) = harness
            .call("POST", "/salary/slips", Some(admin), Some(input.clone()))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{slip}");
        let money = |field: &str| slip[field].as_str().unwrap().parse::<Decimal>().unwrap();
        assert_eq!(money("proratedBase"), Decimal::new(2250, 0));
        assert_eq!(money("gross"), Decimal::new(2350, 0));
        assert_eq!(money("net"), Decimal::new(2300, 0));

        let (status, _) = harness
            .call("POST", "/salary/slips", Some(admin), Some(input.clone()))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let mut unpadded = input;
        unpadded["period"] = json!("2025-1");
        let (status, _) = harness
            .call("POST", "/salary/slips", Some(admin), Some(unpadded))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, own) = harness.call("GET", "/salary/slips", Some(staff), None).await;
        assert_eq!(own["items"].as_array().unwrap().len(), 1);

        let (status, _) = harness
            .call(
                "GET",
                &format!("/salary/slips?staffId={}", Uuid::new_v4()),
                Some(staff),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = harness
            .call("GET", "/salary/slips", Some((Uuid::new_v4(), Role::Client)), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn attendance_above_working_days_is_rejected() {
        let harness = Harness::at(start_of(2025, 2, 1));
        let admin = (Uuid::new_v4(), Role::Admin);
        let (status, body) = harness
            .call(
                "POST",
                "/salary/slips",
                Some(admin),
                Some(json!({
                    "staffId": Uuid::new_v4(),
                    "period": "2025-01",
                    "baseMonthly": "3000",
                    "workingDays": 20,
                    "daysPresent": 21,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.as_str().unwrap().contains("daysPresent"));
    }
}
