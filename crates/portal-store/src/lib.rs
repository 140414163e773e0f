use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use portal_core::{
    Agreement, AgreementFilter, AgreementStore, Bill, BillStore, Contact, ContactDirectory,
    DocumentStatus, DocumentStore, Notification, NotificationStore, OutboxMessage, OutboxStatus,
    PushedDocument, SalarySlip, SalaryStore, StoreError,
};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    agreements: HashMap<Uuid, Agreement>,
    bills: HashMap<Uuid, Bill>,
    documents: HashMap<Uuid, PushedDocument>,
    outbox: Vec<OutboxMessage>,
    notifications: Vec<Notification>,
    contacts: HashMap<Uuid, Contact>,
    slips: Vec<SalarySlip>,
}

/// Process-local store. One lock guards every table, so an aggregate write
/// and its outbox messages land together.
#[derive(Default)]
pub struct InMemoryPortalStore {
    tables: RwLock<Tables>,
}

impl InMemoryPortalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every outbox message in insertion order, whatever its status.
    pub async fn outbox_snapshot(&self) -> Vec<OutboxMessage> {
        self.tables.read().await.outbox.clone()
    }
}

fn check_version(stored: i64, incoming: i64, entity: &'static str) -> Result<(), StoreError> {
    if stored != incoming {
        return Err(StoreError::Conflict(entity));
    }
    Ok(())
}

fn outbox_entry<'a>(
    tables: &'a mut Tables,
    id: Uuid,
) -> Result<&'a mut OutboxMessage, StoreError> {
    tables
        .outbox
        .iter_mut()
        .find(|message| message.id == id)
        .ok_or(StoreError::NotFound("outbox message"))
}

#[async_trait]
impl AgreementStore for InMemoryPortalStore {
    async fn insert_agreement(
        &self,
        agreement: &Agreement,
        outbox: &[OutboxMessage],
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.agreements.contains_key(&agreement.id) {
            return Err(StoreError::Duplicate(format!(
                "agreement {} already exists",
                agreement.id
            )));
        }
        tables.agreements.insert(agreement.id, agreement.clone());
        tables.outbox.extend_from_slice(outbox);
        Ok(())
    }

    async fn agreement(&self, id: Uuid) -> Result<Option<Agreement>, StoreError> {
        Ok(self.tables.read().await.agreements.get(&id).cloned())
    }

    async fn list_agreements(&self, filter: &AgreementFilter) -> Result<Vec<Agreement>, StoreError> {
        let tables = self.tables.read().await;
        let mut items: Vec<Agreement> = tables
            .agreements
            .values()
            .filter(|agreement| filter.client.is_none_or(|client| agreement.client == client))
            .filter(|agreement| {
                filter
                    .uploaded_by
                    .is_none_or(|uploader| agreement.uploaded_by == uploader)
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items)
    }

    async fn update_agreement(
        &self,
        agreement: &Agreement,
        outbox: &[OutboxMessage],
    ) -> Result<Agreement, StoreError> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .agreements
            .get_mut(&agreement.id)
            .ok_or(StoreError::NotFound("agreement"))?;
        check_version(stored.version, agreement.version, "agreement")?;

        let mut updated = agreement.clone();
        updated.version += 1;
        *stored = updated.clone();
        tables.outbox.extend_from_slice(outbox);
        Ok(updated)
    }

    async fn delete_agreement(&self, id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let Some(agreement) = tables.agreements.remove(&id) else {
            return Err(StoreError::NotFound("agreement"));
        };

        let action_url = agreement.action_url();
        tables.outbox.retain(|message| {
            message.status != OutboxStatus::Pending
                || message.action_url.as_deref() != Some(action_url.as_str())
        });
        tables
            .notifications
            .retain(|notification| notification.action_url.as_deref() != Some(action_url.as_str()));
        Ok(())
    }

    async fn agreements_past_expiry(&self, today: NaiveDate) -> Result<Vec<Agreement>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .agreements
            .values()
            .filter(|agreement| agreement.status.can_expire() && agreement.expiry_date < today)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl BillStore for InMemoryPortalStore {
    async fn insert_bill(&self, bill: &Bill, outbox: &[OutboxMessage]) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.bills.contains_key(&bill.id) {
            return Err(StoreError::Duplicate(format!("bill {} already exists", bill.id)));
        }
        tables.bills.insert(bill.id, bill.clone());
        tables.outbox.extend_from_slice(outbox);
        Ok(())
    }

    async fn bill(&self, id: Uuid) -> Result<Option<Bill>, StoreError> {
        Ok(self.tables.read().await.bills.get(&id).cloned())
    }

    async fn list_bills(&self, client: Option<Uuid>) -> Result<Vec<Bill>, StoreError> {
        let tables = self.tables.read().await;
        let mut items: Vec<Bill> = tables
            .bills
            .values()
            .filter(|bill| client.is_none_or(|client| bill.client == client))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(items)
    }

    async fn update_bill(&self, bill: &Bill, outbox: &[OutboxMessage]) -> Result<Bill, StoreError> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .bills
            .get_mut(&bill.id)
            .ok_or(StoreError::NotFound("bill"))?;
        check_version(stored.version, bill.version, "bill")?;

        let mut updated = bill.clone();
        updated.version += 1;
        *stored = updated.clone();
        tables.outbox.extend_from_slice(outbox);
        Ok(updated)
    }

    async fn delete_bill(&self, id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables
            .bills
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound("bill"))
    }
}

#[async_trait]
impl DocumentStore for InMemoryPortalStore {
    async fn insert_document(
        &self,
        document: &PushedDocument,
        outbox: &[OutboxMessage],
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.documents.insert(document.id, document.clone());
        tables.outbox.extend_from_slice(outbox);
        Ok(())
    }

    async fn document(&self, id: Uuid) -> Result<Option<PushedDocument>, StoreError> {
        Ok(self.tables.read().await.documents.get(&id).cloned())
    }

    async fn pending_documents(&self, recipient: Uuid) -> Result<Vec<PushedDocument>, StoreError> {
        let tables = self.tables.read().await;
        let mut items: Vec<PushedDocument> = tables
            .documents
            .values()
            .filter(|document| {
                document.recipient == recipient && document.status == DocumentStatus::Pending
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| b.pushed_at.cmp(&a.pushed_at));
        Ok(items)
    }

    async fn update_document(
        &self,
        document: &PushedDocument,
        outbox: &[OutboxMessage],
    ) -> Result<PushedDocument, StoreError> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .documents
            .get_mut(&document.id)
            .ok_or(StoreError::NotFound("document"))?;
        check_version(stored.version, document.version, "document")?;

        let mut updated = document.clone();
        updated.version += 1;
        *stored = updated.clone();
        tables.outbox.extend_from_slice(outbox);
        Ok(updated)
    }
}

#[async_trait]
impl NotificationStore for InMemoryPortalStore {
    async fn enqueue(&self, outbox: &[OutboxMessage]) -> Result<(), StoreError> {
        self.tables.write().await.outbox.extend_from_slice(outbox);
        Ok(())
    }

    async fn due_messages(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OutboxMessage>, StoreError> {
        let tables = self.tables.read().await;
        let mut due: Vec<OutboxMessage> = tables
            .outbox
            .iter()
            .filter(|message| message.status == OutboxStatus::Pending && message.next_attempt_at <= now)
            .cloned()
            .collect();
        due.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        due.truncate(limit);
        Ok(due)
    }

    async fn mark_delivered(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let message = outbox_entry(&mut tables, id)?;
        message.status = OutboxStatus::Delivered;
        message.delivered_at = Some(now);
        message.last_error = None;
        Ok(())
    }

    async fn reschedule(
        &self,
        id: Uuid,
        attempts: i32,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let message = outbox_entry(&mut tables, id)?;
        message.attempts = attempts;
        message.next_attempt_at = next_attempt_at;
        message.last_error = Some(error.to_string());
        Ok(())
    }

    async fn mark_dead(&self, id: Uuid, attempts: i32, error: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let message = outbox_entry(&mut tables, id)?;
        message.status = OutboxStatus::Dead;
        message.attempts = attempts;
        message.last_error = Some(error.to_string());
        Ok(())
    }

    async fn insert_notification(&self, notification: &Notification) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        if tables
            .notifications
            .iter()
            .any(|existing| existing.id == notification.id)
        {
            return Ok(false);
        }
        tables.notifications.push(notification.clone());
        Ok(true)
    }

    async fn notifications(
        &self,
        recipient: Uuid,
        unread_only: bool,
    ) -> Result<Vec<Notification>, StoreError> {
        let tables = self.tables.read().await;
        let mut items: Vec<Notification> = tables
            .notifications
            .iter()
            .filter(|notification| notification.recipient == recipient)
            .filter(|notification| !unread_only || !notification.read)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items)
    }

    async fn mark_read(&self, recipient: Uuid, id: Uuid) -> Result<Notification, StoreError> {
        let mut tables = self.tables.write().await;
        let notification = tables
            .notifications
            .iter_mut()
            .find(|notification| notification.id == id && notification.recipient == recipient)
            .ok_or(StoreError::NotFound("notification"))?;
        notification.read = true;
        Ok(notification.clone())
    }

    async fn delete_notification(&self, recipient: Uuid, id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let before = tables.notifications.len();
        tables
            .notifications
            .retain(|notification| !(notification.id == id && notification.recipient == recipient));
        if tables.notifications.len() == before {
            return Err(StoreError::NotFound("notification"));
        }
        Ok(())
    }
}

#[async_trait]
impl ContactDirectory for InMemoryPortalStore {
    async fn upsert_contact(&self, contact: &Contact) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .contacts
            .insert(contact.user_id, contact.clone());
        Ok(())
    }

    async fn contact(&self, user_id: Uuid) -> Result<Option<Contact>, StoreError> {
        Ok(self.tables.read().await.contacts.get(&user_id).cloned())
    }
}

#[async_trait]
impl SalaryStore for InMemoryPortalStore {
    async fn insert_slip(&self, slip: &SalarySlip) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables
            .slips
            .iter()
            .any(|existing| existing.staff_id == slip.staff_id && existing.period == slip.period)
        {
            return Err(StoreError::Duplicate(format!(
                "a salary slip for {} already exists",
                slip.period
            )));
        }
        tables.slips.push(slip.clone());
        Ok(())
    }

    async fn slips(&self, staff_id: Option<Uuid>) -> Result<Vec<SalarySlip>, StoreError> {
        let tables = self.tables.read().await;
        let mut items: Vec<SalarySlip> = tables
            .slips
            .iter()
            .filter(|slip| staff_id.is_none_or(|staff| slip.staff_id == staff))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.period.cmp(&a.period));
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use portal_core::{AgreementStatus, NewAgreement, NotificationKind};

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 10, 8, 0, 0).unwrap()
    }

    fn agreement() -> Agreement {
        Agreement::new(
            NewAgreement {
                title: "NDA".to_string(),
                description: String::new(),
                file_url: "https://files.example/nda.pdf".to_string(),
                expiry_date: NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
                client: Uuid::new_v4(),
            },
            Uuid::new_v4(),
            now(),
        )
    }

    #[tokio::test]
    async fn stale_update_is_a_conflict() {
        let store = InMemoryPortalStore::new();
        let original = agreement();
        store.insert_agreement(&original, &[]).await.unwrap();

        let mut first = original.clone();
        first.mark_viewed(now());
        let saved = store.update_agreement(&first, &[]).await.unwrap();
        assert_eq!(saved.version, 1);

        let mut second = original.clone();
        second.reject("not needed", now()).unwrap();
        let err = store.update_agreement(&second, &[]).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict("agreement")));

        let stored = store.agreement(original.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AgreementStatus::Viewed);
    }

    #[tokio::test]
    async fn update_commits_outbox_with_the_record() {
        let store = InMemoryPortalStore::new();
        let mut record = agreement();
        store.insert_agreement(&record, &[]).await.unwrap();

        record.sign("Grace", "192.0.2.1", now()).unwrap();
        let message = OutboxMessage::new(
            record.uploaded_by,
            NotificationKind::AgreementSigned,
            "signed",
            Some(record.action_url()),
            now(),
        );
        store
            .update_agreement(&record, std::slice::from_ref(&message))
            .await
            .unwrap();

        let due = store.due_messages(now(), 10).await.unwrap();
        assert_eq!(due, vec![message]);
    }

    #[tokio::test]
    async fn delete_cascades_to_linked_notifications() {
        let store = InMemoryPortalStore::new();
        let record = agreement();
        let message = OutboxMessage::new(
            record.client,
            NotificationKind::AgreementPushed,
            "new agreement",
            Some(record.action_url()),
            now(),
        );
        store
            .insert_agreement(&record, std::slice::from_ref(&message))
            .await
            .unwrap();
        store
            .insert_notification(&message.to_notification())
            .await
            .unwrap();

        store.delete_agreement(record.id).await.unwrap();

        assert!(store.outbox_snapshot().await.is_empty());
        assert!(store.notifications(record.client, false).await.unwrap().is_empty());
        assert!(matches!(
            store.delete_agreement(record.id).await,
            Err(StoreError::NotFound("agreement"))
        ));
    }

    #[tokio::test]
    async fn notification_insert_is_idempotent() {
        let store = InMemoryPortalStore::new();
        let message = OutboxMessage::new(
            Uuid::new_v4(),
            NotificationKind::General,
            "hello",
            None,
            now(),
        );
        let notification = message.to_notification();

        assert!(store.insert_notification(&notification).await.unwrap());
        assert!(!store.insert_notification(&notification).await.unwrap());
        assert_eq!(
            store
                .notifications(notification.recipient, true)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn rescheduled_messages_wait_for_their_slot() {
        let store = InMemoryPortalStore::new();
        let message = OutboxMessage::new(
            Uuid::new_v4(),
            NotificationKind::General,
            "retry me",
            None,
            now(),
        );
        store.enqueue(std::slice::from_ref(&message)).await.unwrap();

        store
            .reschedule(message.id, 1, now() + Duration::seconds(30), "timeout")
            .await
            .unwrap();

        assert!(store.due_messages(now(), 10).await.unwrap().is_empty());
        let due = store
            .due_messages(now() + Duration::seconds(30), 10)
            .await
            .unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].attempts, 1);
        assert_eq!(due[0].last_error.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn one_slip_per_staff_and_period() {
        use rust_decimal::Decimal;

        let store = InMemoryPortalStore::new();
        let staff_id = Uuid::new_v4();
        let slip = SalarySlip {
            id: Uuid::new_v4(),
            staff_id,
            period: "2025-01".to_string(),
            base_monthly: Decimal::new(3000, 0),
            working_days: 20,
            days_present: 20,
            allowances: Decimal::ZERO,
            deductions: Decimal::ZERO,
            prorated_base: Decimal::new(3000, 0),
            gross: Decimal::new(3000, 0),
            net: Decimal::new(3000, 0),
            computed_by: Uuid::new_v4(),
            computed_at: now(),
        };
        store.insert_slip(&slip).await.unwrap();

        let again = SalarySlip {
            id: Uuid::new_v4(),
            ..slip.clone()
        };
        assert!(matches!(
            store.insert_slip(&again).await,
            Err(StoreError::Duplicate(_))
        ));
        assert_eq!(store.slips(Some(staff_id)).await.unwrap().len(), 1);
        assert!(store.slips(Some(Uuid::new_v4())).await.unwrap().is_empty());
    }
}
