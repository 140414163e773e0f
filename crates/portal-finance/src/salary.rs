use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use portal_core::SalarySlip;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalaryInput {
    pub staff_id: Uuid,
    /// `YYYY-MM`; a single-digit month is accepted and zero-padded.
    pub period: String,
    pub base_monthly: Decimal,
    pub working_days: i32,
    pub days_present: i32,
    #[serde(default)]
    pub allowances: Decimal,
    #[serde(default)]
    pub deductions: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalaryBreakdown {
    pub prorated_base: Decimal,
    pub gross: Decimal,
    pub net: Decimal,
}

pub fn compute_salary(input: &SalaryInput) -> Result<SalaryBreakdown> {
    normalize_period(&input.period)?;
    if input.working_days <= 0 {
        anyhow::bail!("workingDays must be positive");
    }
    if input.days_present < 0 || input.days_present > input.working_days {
        anyhow::bail!("daysPresent must be between 0 and workingDays");
    }
    if input.base_monthly < Decimal::ZERO {
        anyhow::bail!("baseMonthly must not be negative");
    }
    if input.allowances < Decimal::ZERO {
        anyhow::bail!("allowances must not be negative");
    }
    if input.deductions < Decimal::ZERO {
        anyhow::bail!("deductions must not be negative");
    }

    prorate(input).ok_or_else(|| anyhow::anyhow!("salary amounts are out of range"))
}

fn prorate(input: &SalaryInput) -> Option<SalaryBreakdown> {
    let prorated_base = input
        .base_monthly
        .checked_mul(Decimal::from(input.days_present))?
        .checked_div(Decimal::from(input.working_days))?
        .round_dp(2);
    let gross = prorated_base.checked_add(input.allowances.round_dp(2))?;
    let net = gross
        .checked_sub(input.deductions.round_dp(2))?
        .max(Decimal::ZERO);

    Some(SalaryBreakdown {
        prorated_base,
        gross,
        net,
    })
}

pub fn salary_slip(input: &SalaryInput, computed_by: Uuid, now: DateTime<Utc>) -> Result<SalarySlip> {
    let breakdown = compute_salary(input)?;

    Ok(SalarySlip {
        id: Uuid::new_v4(),
        staff_id: input.staff_id,
        period: normalize_period(&input.period)?,
        base_monthly: input.base_monthly.round_dp(2),
        working_days: input.working_days,
        days_present: input.days_present,
        allowances: input.allowances.round_dp(2),
        deductions: input.deductions.round_dp(2),
        prorated_base: breakdown.prorated_base,
        gross: breakdown.gross,
        net: breakdown.net,
        computed_by,
        computed_at: now,
    })
}

fn normalize_period(value: &str) -> Result<String> {
    let trimmed = value.trim();
    let Ok(month) = NaiveDate::parse_from_str(&format!("{trimmed}-01"), "%Y-%m-%d") else {
        anyhow::bail!("period must be formatted as YYYY-MM");
    };
    Ok(month.format("%Y-%m").to_string())
}
