use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Notification;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    AgreementPushed,
    AgreementSigned,
    AgreementRejected,
    AgreementExpired,
    ExtensionRequested,
    ExtensionReviewed,
    BillSubmitted,
    BillReviewed,
    PaymentRecorded,
    DocumentPushed,
    DocumentReviewed,
    General,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AgreementPushed => "agreement_pushed",
            Self::AgreementSigned => "agreement_signed",
            Self::AgreementRejected => "agreement_rejected",
            Self::AgreementExpired => "agreement_expired",
            Self::ExtensionRequested => "extension_requested",
            Self::ExtensionReviewed => "extension_reviewed",
            Self::BillSubmitted => "bill_submitted",
            Self::BillReviewed => "bill_reviewed",
            Self::PaymentRecorded => "payment_recorded",
            Self::DocumentPushed => "document_pushed",
            Self::DocumentReviewed => "document_reviewed",
            Self::General => "general",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let kind = match value.trim() {
            "agreement_pushed" => Self::AgreementPushed,
            "agreement_signed" => Self::AgreementSigned,
            "agreement_rejected" => Self::AgreementRejected,
            "agreement_expired" => Self::AgreementExpired,
            "extension_requested" => Self::ExtensionRequested,
            "extension_reviewed" => Self::ExtensionReviewed,
            "bill_submitted" => Self::BillSubmitted,
            "bill_reviewed" => Self::BillReviewed,
            "payment_recorded" => Self::PaymentRecorded,
            "document_pushed" => Self::DocumentPushed,
            "document_reviewed" => Self::DocumentReviewed,
            "general" => Self::General,
            _ => return None,
        };
        Some(kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    Pending,
    Delivered,
    Dead,
}

impl OutboxStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Delivered => "delivered",
            Self::Dead => "dead",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "delivered" => Some(Self::Delivered),
            "dead" => Some(Self::Dead),
            _ => None,
        }
    }
}

/// A notification side effect written in the same commit as the state
/// change that caused it. The notifier delivers it at least once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxMessage {
    pub id: Uuid,
    pub recipient: Uuid,
    pub kind: NotificationKind,
    pub message: String,
    pub action_url: Option<String>,
    pub whatsapp: bool,
    pub status: OutboxStatus,
    pub attempts: i32,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl OutboxMessage {
    pub fn new(
        recipient: Uuid,
        kind: NotificationKind,
        message: impl Into<String>,
        action_url: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient,
            kind,
            message: message.into(),
            action_url,
            whatsapp: false,
            status: OutboxStatus::Pending,
            attempts: 0,
            next_attempt_at: now,
            last_error: None,
            created_at: now,
            delivered_at: None,
        }
    }

    pub fn with_whatsapp(mut self, enabled: bool) -> Self {
        self.whatsapp = enabled;
        self
    }

    /// The in-app record shares the message id so redelivery is idempotent.
    pub fn to_notification(&self) -> Notification {
        Notification {
            id: self.id,
            recipient: self.recipient,
            kind: self.kind,
            message: self.message.clone(),
            action_url: self.action_url.clone(),
            read: false,
            created_at: self.created_at,
        }
    }
}
