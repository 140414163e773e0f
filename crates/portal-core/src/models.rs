use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LifecycleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Staff,
    Client,
}

impl Role {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Self::Admin),
            "staff" => Some(Self::Staff),
            "client" => Some(Self::Client),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Staff => "staff",
            Self::Client => "client",
        }
    }

    /// Admin and staff share the back-office surface.
    pub fn is_back_office(self) -> bool {
        matches!(self, Self::Admin | Self::Staff)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgreementStatus {
    Pending,
    Viewed,
    Signed,
    Rejected,
    Expired,
}

impl AgreementStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Viewed => "viewed",
            Self::Signed => "signed",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Result<Self, LifecycleError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "viewed" => Ok(Self::Viewed),
            "signed" => Ok(Self::Signed),
            "rejected" => Ok(Self::Rejected),
            "expired" => Ok(Self::Expired),
            _ => Err(LifecycleError::Validation(
                "status must be one of pending, viewed, signed, rejected, expired".to_string(),
            )),
        }
    }

    /// Statuses that lapse into `Expired` once the expiry date has passed.
    pub fn can_expire(self) -> bool {
        matches!(self, Self::Pending | Self::Viewed | Self::Signed)
    }
}

impl fmt::Display for AgreementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    Approved,
    Rejected,
}

impl ReviewDecision {
    pub fn parse(value: &str) -> Result<Self, LifecycleError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approved" | "approve" => Ok(Self::Approved),
            "rejected" | "reject" => Ok(Self::Rejected),
            _ => Err(LifecycleError::Validation(
                "decision must be approved or rejected".to_string(),
            )),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSignature {
    pub name: String,
    pub signed_at: DateTime<Utc>,
    pub ip_address: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtensionRequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl ExtensionRequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionRequest {
    pub requested: bool,
    pub requested_expiry_date: NaiveDate,
    pub reason: String,
    pub status: ExtensionRequestStatus,
    pub requested_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionRecord {
    pub old_expiry_date: NaiveDate,
    pub new_expiry_date: NaiveDate,
    pub extended_at: DateTime<Utc>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAgreement {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub file_url: String,
    pub expiry_date: NaiveDate,
    pub client: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agreement {
    pub id: Uuid,
    pub agreement_id: String,
    pub title: String,
    pub description: String,
    pub file_url: String,
    pub expiry_date: NaiveDate,
    pub status: AgreementStatus,
    pub uploaded_by: Uuid,
    pub client: Uuid,
    pub client_signature: Option<ClientSignature>,
    pub viewed_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub extension_request: Option<ExtensionRequest>,
    #[serde(default)]
    pub extensions: Vec<ExtensionRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl Agreement {
    pub fn new(input: NewAgreement, uploaded_by: Uuid, now: DateTime<Utc>) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            agreement_id: reference_code("AGR", id, now),
            title: input.title.trim().to_string(),
            description: input.description.trim().to_string(),
            file_url: input.file_url.trim().to_string(),
            expiry_date: input.expiry_date,
            status: AgreementStatus::Pending,
            uploaded_by,
            client: input.client,
            client_signature: None,
            viewed_at: None,
            rejection_reason: None,
            extension_request: None,
            extensions: Vec::new(),
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Relative URL used as the action link of agreement notifications.
    pub fn action_url(&self) -> String {
        format!("/agreement/view/{}", self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BillStatus {
    Pending,
    Overdue,
    Paid,
    Sanctioned,
    Rejected,
}

impl BillStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Overdue => "Overdue",
            Self::Paid => "Paid",
            Self::Sanctioned => "Sanctioned",
            Self::Rejected => "Rejected",
        }
    }

    pub fn parse(value: &str) -> Result<Self, LifecycleError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "overdue" => Ok(Self::Overdue),
            "paid" => Ok(Self::Paid),
            "sanctioned" => Ok(Self::Sanctioned),
            "rejected" => Ok(Self::Rejected),
            _ => Err(LifecycleError::Validation(
                "status must be one of Pending, Overdue, Paid, Sanctioned, Rejected".to_string(),
            )),
        }
    }
}

impl fmt::Display for BillStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentTransaction {
    pub id: Uuid,
    pub amount: Decimal,
    pub method: String,
    pub reference: Option<String>,
    pub paid_at: DateTime<Utc>,
    pub recorded_by: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bill {
    pub id: Uuid,
    pub bill_number: String,
    pub client: Uuid,
    pub title: String,
    pub description: String,
    pub amount: Decimal,
    pub currency: String,
    pub due_date: NaiveDate,
    pub file_url: Option<String>,
    pub status: BillStatus,
    pub review_note: Option<String>,
    #[serde(default)]
    pub payments: Vec<PaymentTransaction>,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl Bill {
    pub fn action_url(&self) -> String {
        format!("/bills/{}", self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Approved,
    Rejected,
}

impl DocumentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushedDocument {
    pub id: Uuid,
    pub title: String,
    pub file_url: String,
    pub pushed_by: Uuid,
    pub recipient: Uuid,
    pub status: DocumentStatus,
    pub review_note: Option<String>,
    pub pushed_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl PushedDocument {
    pub fn action_url(&self) -> String {
        format!("/documents/{}", self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub recipient: Uuid,
    pub kind: crate::events::NotificationKind,
    pub message: String,
    pub action_url: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub user_id: Uuid,
    pub phone_number: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalarySlip {
    pub id: Uuid,
    pub staff_id: Uuid,
    pub period: String,
    pub base_monthly: Decimal,
    pub working_days: i32,
    pub days_present: i32,
    pub allowances: Decimal,
    pub deductions: Decimal,
    pub prorated_base: Decimal,
    pub gross: Decimal,
    pub net: Decimal,
    pub computed_by: Uuid,
    pub computed_at: DateTime<Utc>,
}

/// Human-readable code such as `AGR-20250101-1A2B3C`.
pub fn reference_code(prefix: &str, id: Uuid, now: DateTime<Utc>) -> String {
    let suffix: String = id.simple().to_string().chars().take(6).collect();
    format!(
        "{}-{}-{}",
        prefix,
        now.format("%Y%m%d"),
        suffix.to_ascii_uppercase()
    )
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn reference_code_carries_prefix_and_date() {
        let now = Utc.with_ymd_and_hms(2025, 1, 15, 9, 0, 0).unwrap();
        let code = reference_code("AGR", Uuid::new_v4(), now);

        assert!(code.starts_with("AGR-20250115-"));
        assert_eq!(code.len(), "AGR-20250115-".len() + 6);
    }

    #[test]
    fn agreement_serializes_with_camel_case_fields() {
        let now = Utc.with_ymd_and_hms(2025, 1, 15, 9, 0, 0).unwrap();
        let agreement = Agreement::new(
            NewAgreement {
                title: " Service terms ".to_string(),
                description: String::new(),
                file_url: "https://files.example/terms.pdf".to_string(),
                expiry_date: NaiveDate::from_ymd_opt(2025, 6, 30).unwrap(),
                client: Uuid::new_v4(),
            },
            Uuid::new_v4(),
            now,
        );

        let value = serde_json::to_value(&agreement).unwrap();
        assert_eq!(value["title"], "Service terms");
        assert_eq!(value["status"], "pending");
        assert_eq!(value["expiryDate"], "2025-06-30");
        assert!(value["agreementId"].as_str().unwrap().starts_with("AGR-"));
    }

    #[test]
    fn status_parsing_is_case_insensitive() {
        assert_eq!(
            AgreementStatus::parse(" Signed ").unwrap(),
            AgreementStatus::Signed
        );
        assert!(AgreementStatus::parse("archived").is_err());
        assert_eq!(BillStatus::parse("overdue").unwrap(), BillStatus::Overdue);
        assert_eq!(Role::parse("ADMIN"), Some(Role::Admin));
        assert_eq!(Role::parse("guest"), None);
    }
}
