use chrono::{DateTime, NaiveDate, Utc};
use portal_core::{Bill, BillStatus, LifecycleError, PaymentTransaction, reference_code};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBill {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub amount: Decimal,
    pub currency: String,
    pub due_date: NaiveDate,
    pub file_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillDecision {
    Sanction,
    Reject,
}

impl BillDecision {
    pub fn parse(value: &str) -> Result<Self, LifecycleError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sanction" | "sanctioned" => Ok(Self::Sanction),
            "reject" | "rejected" => Ok(Self::Reject),
            _ => Err(LifecycleError::validation(
                "decision must be sanction or reject",
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSummary {
    pub total_paid: Decimal,
    pub remaining: Decimal,
    pub payment_count: usize,
}

pub fn submit_bill(input: NewBill, client: Uuid, now: DateTime<Utc>) -> Result<Bill, LifecycleError> {
    let title = input.title.trim();
    if title.is_empty() {
        return Err(LifecycleError::validation("title is required"));
    }
    if input.amount <= Decimal::ZERO {
        return Err(LifecycleError::validation("amount must be positive"));
    }
    let currency = input.currency.trim().to_ascii_uppercase();
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(LifecycleError::validation(
            "currency must be a 3-letter code",
        ));
    }

    let id = Uuid::new_v4();
    let mut bill = Bill {
        id,
        bill_number: reference_code("BILL", id, now),
        client,
        title: title.to_string(),
        description: input.description.trim().to_string(),
        amount: input.amount.round_dp(2),
        currency,
        due_date: input.due_date,
        file_url: input
            .file_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty()),
        status: BillStatus::Pending,
        review_note: None,
        payments: Vec::new(),
        submitted_at: now,
        updated_at: now,
        version: 0,
    };
    refresh_overdue(&mut bill, now.date_naive());

    Ok(bill)
}

pub fn payment_summary(bill: &Bill) -> PaymentSummary {
    let total_paid: Decimal = bill.payments.iter().map(|payment| payment.amount).sum();
    let remaining = (bill.amount - total_paid).max(Decimal::ZERO);

    PaymentSummary {
        total_paid,
        remaining,
        payment_count: bill.payments.len(),
    }
}

/// A pending bill with an outstanding balance becomes overdue once its due
/// date has passed. Returns true when the status changed.
pub fn refresh_overdue(bill: &mut Bill, today: NaiveDate) -> bool {
    if bill.status == BillStatus::Pending
        && bill.due_date < today
        && payment_summary(bill).remaining > Decimal::ZERO
    {
        bill.status = BillStatus::Overdue;
        return true;
    }
    false
}

pub fn review_bill(
    bill: &mut Bill,
    decision: BillDecision,
    note: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(), LifecycleError> {
    let note = note.map(str::trim).filter(|note| !note.is_empty());
    if decision == BillDecision::Reject && note.is_none() {
        return Err(LifecycleError::validation(
            "a note is required when rejecting a bill",
        ));
    }

    refresh_overdue(bill, now.date_naive());
    if !matches!(bill.status, BillStatus::Pending | BillStatus::Overdue) {
        return Err(LifecycleError::illegal("review a bill", bill.status));
    }

    bill.status = match decision {
        BillDecision::Sanction => BillStatus::Sanctioned,
        BillDecision::Reject => BillStatus::Rejected,
    };
    bill.review_note = note.map(str::to_string);
    bill.updated_at = now;
    Ok(())
}

pub fn record_payment(
    bill: &mut Bill,
    amount: Decimal,
    method: &str,
    reference: Option<&str>,
    recorded_by: Uuid,
    now: DateTime<Utc>,
) -> Result<PaymentTransaction, LifecycleError> {
    if amount <= Decimal::ZERO {
        return Err(LifecycleError::validation("payment amount must be positive"));
    }
    let method = method.trim();
    if method.is_empty() {
        return Err(LifecycleError::validation("payment method is required"));
    }

    refresh_overdue(bill, now.date_naive());
    if matches!(bill.status, BillStatus::Rejected | BillStatus::Paid) {
        return Err(LifecycleError::illegal("record a payment", bill.status));
    }

    let remaining = payment_summary(bill).remaining;
    let amount = amount.round_dp(2);
    if amount > remaining {
        return Err(LifecycleError::validation(format!(
            "payment exceeds the remaining balance of {remaining}"
        )));
    }

    let payment = PaymentTransaction {
        id: Uuid::new_v4(),
        amount,
        method: method.to_string(),
        reference: reference
            .map(str::trim)
            .filter(|reference| !reference.is_empty())
            .map(str::to_string),
        paid_at: now,
        recorded_by,
    };
    bill.payments.push(payment.clone());
    if payment_summary(bill).remaining.is_zero() {
        bill.status = BillStatus::Paid;
    }
    bill.updated_at = now;

    Ok(payment)
}
