use chrono::{DateTime, NaiveDate, Utc};
use portal_core::{Agreement, Bill, Notification, PaymentTransaction, PushedDocument, SalarySlip};
use portal_finance::{PaymentSummary, payment_summary};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Redis channel the gateway pokes after writing outbox messages.
pub const OUTBOX_CHANNEL: &str = "portal.outbox";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgreementListQuery {
    pub status: Option<String>,
    pub mine: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgreementListResponse {
    pub items: Vec<Agreement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignAgreementRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectAgreementRequest {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionRequestBody {
    pub requested_expiry_date: Option<NaiveDate>,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewExtensionRequest {
    pub decision: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillListQuery {
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillView {
    #[serde(flatten)]
    pub bill: Bill,
    pub summary: PaymentSummary,
}

impl From<Bill> for BillView {
    fn from(bill: Bill) -> Self {
        let summary = payment_summary(&bill);
        Self { bill, summary }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillListResponse {
    pub items: Vec<BillView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewBillRequest {
    pub decision: String,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordPaymentRequest {
    pub amount: Decimal,
    pub method: String,
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordPaymentResponse {
    pub payment: PaymentTransaction,
    pub bill: BillView,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushDocumentRequest {
    pub title: String,
    pub file_url: String,
    pub recipient: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewDocumentRequest {
    pub decision: String,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentListResponse {
    pub items: Vec<PushedDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationListQuery {
    pub unread: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationListResponse {
    pub items: Vec<Notification>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNotificationRequest {
    pub recipient: Uuid,
    pub message: String,
    pub action_url: Option<String>,
    #[serde(default)]
    pub whatsapp: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNotificationResponse {
    pub outbox_id: Uuid,
    pub queued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertContactRequest {
    pub phone_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalarySlipQuery {
    pub staff_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalarySlipListResponse {
    pub items: Vec<SalarySlip>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxWakeup {
    pub queued: usize,
    pub queued_at: DateTime<Utc>,
}
