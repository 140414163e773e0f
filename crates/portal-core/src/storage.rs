use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::events::OutboxMessage;
use crate::models::{Agreement, Bill, Contact, Notification, PushedDocument, SalarySlip};

#[derive(Debug, Clone, Default)]
pub struct AgreementFilter {
    pub client: Option<Uuid>,
    pub uploaded_by: Option<Uuid>,
}

// Writes take the outbox messages produced by the same state change; a store
// commits both or neither. Updates are optimistic: the write only lands if
// the stored version still equals the version on the record passed in, and
// the returned record carries the bumped version.

#[async_trait]
pub trait AgreementStore: Send + Sync {
    async fn insert_agreement(
        &self,
        agreement: &Agreement,
        outbox: &[OutboxMessage],
    ) -> Result<(), StoreError>;

    async fn agreement(&self, id: Uuid) -> Result<Option<Agreement>, StoreError>;

    async fn list_agreements(&self, filter: &AgreementFilter) -> Result<Vec<Agreement>, StoreError>;

    async fn update_agreement(
        &self,
        agreement: &Agreement,
        outbox: &[OutboxMessage],
    ) -> Result<Agreement, StoreError>;

    /// Removes the agreement together with its undelivered outbox messages
    /// and the notifications that link to it.
    async fn delete_agreement(&self, id: Uuid) -> Result<(), StoreError>;

    /// Agreements still marked pending, viewed or signed whose expiry date is
    /// before `today`.
    async fn agreements_past_expiry(&self, today: NaiveDate) -> Result<Vec<Agreement>, StoreError>;
}

#[async_trait]
pub trait BillStore: Send + Sync {
    async fn insert_bill(&self, bill: &Bill, outbox: &[OutboxMessage]) -> Result<(), StoreError>;

    async fn bill(&self, id: Uuid) -> Result<Option<Bill>, StoreError>;

    async fn list_bills(&self, client: Option<Uuid>) -> Result<Vec<Bill>, StoreError>;

    async fn update_bill(&self, bill: &Bill, outbox: &[OutboxMessage]) -> Result<Bill, StoreError>;

    async fn delete_bill(&self, id: Uuid) -> Result<(), StoreError>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert_document(
        &self,
        document: &PushedDocument,
        outbox: &[OutboxMessage],
    ) -> Result<(), StoreError>;

    async fn document(&self, id: Uuid) -> Result<Option<PushedDocument>, StoreError>;

    async fn pending_documents(&self, recipient: Uuid) -> Result<Vec<PushedDocument>, StoreError>;

    async fn update_document(
        &self,
        document: &PushedDocument,
        outbox: &[OutboxMessage],
    ) -> Result<PushedDocument, StoreError>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn enqueue(&self, outbox: &[OutboxMessage]) -> Result<(), StoreError>;

    /// Pending messages whose next attempt is due, oldest first.
    async fn due_messages(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OutboxMessage>, StoreError>;

    async fn mark_delivered(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError>;

    async fn reschedule(
        &self,
        id: Uuid,
        attempts: i32,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), StoreError>;

    async fn mark_dead(&self, id: Uuid, attempts: i32, error: &str) -> Result<(), StoreError>;

    /// Returns false when a notification with the same id already exists.
    async fn insert_notification(&self, notification: &Notification) -> Result<bool, StoreError>;

    async fn notifications(
        &self,
        recipient: Uuid,
        unread_only: bool,
    ) -> Result<Vec<Notification>, StoreError>;

    async fn mark_read(&self, recipient: Uuid, id: Uuid) -> Result<Notification, StoreError>;

    async fn delete_notification(&self, recipient: Uuid, id: Uuid) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ContactDirectory: Send + Sync {
    async fn upsert_contact(&self, contact: &Contact) -> Result<(), StoreError>;

    async fn contact(&self, user_id: Uuid) -> Result<Option<Contact>, StoreError>;
}

#[async_trait]
pub trait SalaryStore: Send + Sync {
    /// Fails with [`StoreError::Duplicate`] when the staff member already has
    /// a slip for the period.
    async fn insert_slip(&self, slip: &SalarySlip) -> Result<(), StoreError>;

    async fn slips(&self, staff_id: Option<Uuid>) -> Result<Vec<SalarySlip>, StoreError>;
}

/// Everything the gateway and the notifier need from persistence.
pub trait PortalStore:
    AgreementStore + BillStore + DocumentStore + NotificationStore + ContactDirectory + SalaryStore
{
}

impl<T> PortalStore for T where
    T: AgreementStore
        + BillStore
        + DocumentStore
        + NotificationStore
        + ContactDirectory
        + SalaryStore
{
}
