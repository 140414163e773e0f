use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use portal_core::{
    Agreement, AgreementFilter, AgreementStatus, AgreementStore, Bill, BillStatus, BillStore,
    ClientSignature, Contact, ContactDirectory, DocumentStatus, DocumentStore, ExtensionRecord,
    ExtensionRequest, Notification, NotificationKind, NotificationStore, OutboxMessage,
    OutboxStatus, PaymentTransaction, PushedDocument, SalarySlip, SalaryStore, StoreError,
};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow, types::Json};
use uuid::Uuid;

const UNIQUE_VIOLATION: &str = "23505";

/// Postgres-backed store. Every aggregate write runs in one transaction with
/// the outbox rows it produced.
#[derive(Clone)]
pub struct PgPortalStore {
    pool: PgPool,
}

impl PgPortalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return StoreError::Duplicate(db_err.message().to_string());
        }
    }
    StoreError::Backend(err.into())
}

fn unknown(column: &str, value: &str) -> StoreError {
    StoreError::Backend(anyhow::anyhow!("unrecognised {column} value `{value}`"))
}

async fn insert_outbox(
    tx: &mut Transaction<'_, Postgres>,
    outbox: &[OutboxMessage],
) -> Result<(), StoreError> {
    for message in outbox {
        sqlx::query(
            r#"
            INSERT INTO outbox_messages (
                id, recipient, kind, message, action_url, whatsapp, status,
                attempts, next_attempt_at, last_error, created_at, delivered_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(message.id)
        .bind(message.recipient)
        .bind(message.kind.as_str())
        .bind(&message.message)
        .bind(&message.action_url)
        .bind(message.whatsapp)
        .bind(message.status.as_str())
        .bind(message.attempts)
        .bind(message.next_attempt_at)
        .bind(&message.last_error)
        .bind(message.created_at)
        .bind(message.delivered_at)
        .execute(&mut **tx)
        .await
        .map_err(backend)?;
    }
    Ok(())
}

/// Distinguishes a missing row from a stale version after an update matched
/// nothing.
async fn missed_update(
    tx: &mut Transaction<'_, Postgres>,
    table: &'static str,
    entity: &'static str,
    id: Uuid,
) -> StoreError {
    let sql = format!("SELECT 1 FROM {table} WHERE id = $1");
    match sqlx::query(&sql).bind(id).fetch_optional(&mut **tx).await {
        Ok(Some(_)) => StoreError::Conflict(entity),
        Ok(None) => StoreError::NotFound(entity),
        Err(err) => backend(err),
    }
}

fn agreement_from_row(row: &PgRow) -> Result<Agreement, StoreError> {
    let status: String = row.try_get("status").map_err(backend)?;
    let status = AgreementStatus::parse(&status).map_err(|_| unknown("agreement status", &status))?;
    let client_signature: Option<Json<ClientSignature>> =
        row.try_get("client_signature").map_err(backend)?;
    let extension_request: Option<Json<ExtensionRequest>> =
        row.try_get("extension_request").map_err(backend)?;
    let extensions: Json<Vec<ExtensionRecord>> = row.try_get("extensions").map_err(backend)?;

    Ok(Agreement {
        id: row.try_get("id").map_err(backend)?,
        agreement_id: row.try_get("agreement_code").map_err(backend)?,
        title: row.try_get("title").map_err(backend)?,
        description: row.try_get("description").map_err(backend)?,
        file_url: row.try_get("file_url").map_err(backend)?,
        expiry_date: row.try_get("expiry_date").map_err(backend)?,
        status,
        uploaded_by: row.try_get("uploaded_by").map_err(backend)?,
        client: row.try_get("client_id").map_err(backend)?,
        client_signature: client_signature.map(|json| json.0),
        viewed_at: row.try_get("viewed_at").map_err(backend)?,
        rejection_reason: row.try_get("rejection_reason").map_err(backend)?,
        extension_request: extension_request.map(|json| json.0),
        extensions: extensions.0,
        created_at: row.try_get("created_at").map_err(backend)?,
        updated_at: row.try_get("updated_at").map_err(backend)?,
        version: row.try_get("version").map_err(backend)?,
    })
}

fn bill_from_row(row: &PgRow) -> Result<Bill, StoreError> {
    let status: String = row.try_get("status").map_err(backend)?;
    let status = BillStatus::parse(&status).map_err(|_| unknown("bill status", &status))?;

    Ok(Bill {
        id: row.try_get("id").map_err(backend)?,
        bill_number: row.try_get("bill_number").map_err(backend)?,
        client: row.try_get("client_id").map_err(backend)?,
        title: row.try_get("title").map_err(backend)?,
        description: row.try_get("description").map_err(backend)?,
        amount: row.try_get("amount").map_err(backend)?,
        currency: row.try_get("currency").map_err(backend)?,
        due_date: row.try_get("due_date").map_err(backend)?,
        file_url: row.try_get("file_url").map_err(backend)?,
        status,
        review_note: row.try_get("review_note").map_err(backend)?,
        payments: Vec::new(),
        submitted_at: row.try_get("submitted_at").map_err(backend)?,
        updated_at: row.try_get("updated_at").map_err(backend)?,
        version: row.try_get("version").map_err(backend)?,
    })
}

fn document_from_row(row: &PgRow) -> Result<PushedDocument, StoreError> {
    let status: String = row.try_get("status").map_err(backend)?;
    let status = DocumentStatus::parse(&status).ok_or_else(|| unknown("document status", &status))?;

    Ok(PushedDocument {
        id: row.try_get("id").map_err(backend)?,
        title: row.try_get("title").map_err(backend)?,
        file_url: row.try_get("file_url").map_err(backend)?,
        pushed_by: row.try_get("pushed_by").map_err(backend)?,
        recipient: row.try_get("recipient").map_err(backend)?,
        status,
        review_note: row.try_get("review_note").map_err(backend)?,
        pushed_at: row.try_get("pushed_at").map_err(backend)?,
        reviewed_at: row.try_get("reviewed_at").map_err(backend)?,
        version: row.try_get("version").map_err(backend)?,
    })
}

fn outbox_from_row(row: &PgRow) -> Result<OutboxMessage, StoreError> {
    let kind: String = row.try_get("kind").map_err(backend)?;
    let status: String = row.try_get("status").map_err(backend)?;

    Ok(OutboxMessage {
        id: row.try_get("id").map_err(backend)?,
        recipient: row.try_get("recipient").map_err(backend)?,
        kind: NotificationKind::parse(&kind).ok_or_else(|| unknown("notification kind", &kind))?,
        message: row.try_get("message").map_err(backend)?,
        action_url: row.try_get("action_url").map_err(backend)?,
        whatsapp: row.try_get("whatsapp").map_err(backend)?,
        status: OutboxStatus::parse(&status).ok_or_else(|| unknown("outbox status", &status))?,
        attempts: row.try_get("attempts").map_err(backend)?,
        next_attempt_at: row.try_get("next_attempt_at").map_err(backend)?,
        last_error: row.try_get("last_error").map_err(backend)?,
        created_at: row.try_get("created_at").map_err(backend)?,
        delivered_at: row.try_get("delivered_at").map_err(backend)?,
    })
}

fn notification_from_row(row: &PgRow) -> Result<Notification, StoreError> {
    let kind: String = row.try_get("kind").map_err(backend)?;

    Ok(Notification {
        id: row.try_get("id").map_err(backend)?,
        recipient: row.try_get("recipient").map_err(backend)?,
        kind: NotificationKind::parse(&kind).ok_or_else(|| unknown("notification kind", &kind))?,
        message: row.try_get("message").map_err(backend)?,
        action_url: row.try_get("action_url").map_err(backend)?,
        read: row.try_get("read").map_err(backend)?,
        created_at: row.try_get("created_at").map_err(backend)?,
    })
}

fn slip_from_row(row: &PgRow) -> Result<SalarySlip, StoreError> {
    Ok(SalarySlip {
        id: row.try_get("id").map_err(backend)?,
        staff_id: row.try_get("staff_id").map_err(backend)?,
        period: row.try_get("period").map_err(backend)?,
        base_monthly: row.try_get("base_monthly").map_err(backend)?,
        working_days: row.try_get("working_days").map_err(backend)?,
        days_present: row.try_get("days_present").map_err(backend)?,
        allowances: row.try_get("allowances").map_err(backend)?,
        deductions: row.try_get("deductions").map_err(backend)?,
        prorated_base: row.try_get("prorated_base").map_err(backend)?,
        gross: row.try_get("gross").map_err(backend)?,
        net: row.try_get("net").map_err(backend)?,
        computed_by: row.try_get("computed_by").map_err(backend)?,
        computed_at: row.try_get("computed_at").map_err(backend)?,
    })
}

impl PgPortalStore {
    async fn attach_payments(&self, bills: &mut [Bill]) -> Result<(), StoreError> {
        if bills.is_empty() {
            return Ok(());
        }
        let ids: Vec<Uuid> = bills.iter().map(|bill| bill.id).collect();
        let rows = sqlx::query(
            r#"
            SELECT id, bill_id, amount, method, reference, paid_at, recorded_by
            FROM bill_payments
            WHERE bill_id = ANY($1)
            ORDER BY paid_at, id
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        for row in rows {
            let bill_id: Uuid = row.try_get("bill_id").map_err(backend)?;
            let payment = PaymentTransaction {
                id: row.try_get("id").map_err(backend)?,
                amount: row.try_get("amount").map_err(backend)?,
                method: row.try_get("method").map_err(backend)?,
                reference: row.try_get("reference").map_err(backend)?,
                paid_at: row.try_get("paid_at").map_err(backend)?,
                recorded_by: row.try_get("recorded_by").map_err(backend)?,
            };
            if let Some(bill) = bills.iter_mut().find(|bill| bill.id == bill_id) {
                bill.payments.push(payment);
            }
        }
        Ok(())
    }
}

async fn insert_payments(
    tx: &mut Transaction<'_, Postgres>,
    bill_id: Uuid,
    payments: &[PaymentTransaction],
) -> Result<(), StoreError> {
    for payment in payments {
        sqlx::query(
            r#"
            INSERT INTO bill_payments (id, bill_id, amount, method, reference, paid_at, recorded_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(payment.id)
        .bind(bill_id)
        .bind(payment.amount)
        .bind(&payment.method)
        .bind(&payment.reference)
        .bind(payment.paid_at)
        .bind(payment.recorded_by)
        .execute(&mut **tx)
        .await
        .map_err(backend)?;
    }
    Ok(())
}

#[async_trait]
impl AgreementStore for PgPortalStore {
    async fn insert_agreement(
        &self,
        agreement: &Agreement,
        outbox: &[OutboxMessage],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        sqlx::query(
            r#"
            INSERT INTO agreements (
                id, agreement_code, title, description, file_url, expiry_date, status,
                uploaded_by, client_id, client_signature, viewed_at, rejection_reason,
                extension_request, extensions, created_at, updated_at, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(agreement.id)
        .bind(&agreement.agreement_id)
        .bind(&agreement.title)
        .bind(&agreement.description)
        .bind(&agreement.file_url)
        .bind(agreement.expiry_date)
        .bind(agreement.status.as_str())
        .bind(agreement.uploaded_by)
        .bind(agreement.client)
        .bind(agreement.client_signature.as_ref().map(Json))
        .bind(agreement.viewed_at)
        .bind(&agreement.rejection_reason)
        .bind(agreement.extension_request.as_ref().map(Json))
        .bind(Json(&agreement.extensions))
        .bind(agreement.created_at)
        .bind(agreement.updated_at)
        .bind(agreement.version)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        insert_outbox(&mut tx, outbox).await?;
        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn agreement(&self, id: Uuid) -> Result<Option<Agreement>, StoreError> {
        let row = sqlx::query("SELECT * FROM agreements WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        row.as_ref().map(agreement_from_row).transpose()
    }

    async fn list_agreements(&self, filter: &AgreementFilter) -> Result<Vec<Agreement>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT *
            FROM agreements
            WHERE ($1::uuid IS NULL OR client_id = $1)
              AND ($2::uuid IS NULL OR uploaded_by = $2)
            ORDER BY created_at DESC
            "#,
        )
        .bind(filter.client)
        .bind(filter.uploaded_by)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(agreement_from_row).collect()
    }

    async fn update_agreement(
        &self,
        agreement: &Agreement,
        outbox: &[OutboxMessage],
    ) -> Result<Agreement, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let result = sqlx::query(
            r#"
            UPDATE agreements
            SET title = $3,
                description = $4,
                file_url = $5,
                expiry_date = $6,
                status = $7,
                client_signature = $8,
                viewed_at = $9,
                rejection_reason = $10,
                extension_request = $11,
                extensions = $12,
                updated_at = $13,
                version = version + 1
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(agreement.id)
        .bind(agreement.version)
        .bind(&agreement.title)
        .bind(&agreement.description)
        .bind(&agreement.file_url)
        .bind(agreement.expiry_date)
        .bind(agreement.status.as_str())
        .bind(agreement.client_signature.as_ref().map(Json))
        .bind(agreement.viewed_at)
        .bind(&agreement.rejection_reason)
        .bind(agreement.extension_request.as_ref().map(Json))
        .bind(Json(&agreement.extensions))
        .bind(agreement.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(missed_update(&mut tx, "agreements", "agreement", agreement.id).await);
        }

        insert_outbox(&mut tx, outbox).await?;
        tx.commit().await.map_err(backend)?;

        let mut updated = agreement.clone();
        updated.version += 1;
        Ok(updated)
    }

    async fn delete_agreement(&self, id: Uuid) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let row = sqlx::query("DELETE FROM agreements WHERE id = $1 RETURNING *")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(backend)?;
        let Some(row) = row else {
            return Err(StoreError::NotFound("agreement"));
        };
        let action_url = agreement_from_row(&row)?.action_url();

        sqlx::query("DELETE FROM outbox_messages WHERE status = 'pending' AND action_url = $1")
            .bind(&action_url)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        sqlx::query("DELETE FROM notifications WHERE action_url = $1")
            .bind(&action_url)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn agreements_past_expiry(&self, today: NaiveDate) -> Result<Vec<Agreement>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT *
            FROM agreements
            WHERE status IN ('pending', 'viewed', 'signed')
              AND expiry_date < $1
            ORDER BY expiry_date
            "#,
        )
        .bind(today)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(agreement_from_row).collect()
    }
}

#[async_trait]
impl BillStore for PgPortalStore {
    async fn insert_bill(&self, bill: &Bill, outbox: &[OutboxMessage]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        sqlx::query(
            r#"
            INSERT INTO bills (
                id, bill_number, client_id, title, description, amount, currency, due_date,
                file_url, status, review_note, submitted_at, updated_at, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(bill.id)
        .bind(&bill.bill_number)
        .bind(bill.client)
        .bind(&bill.title)
        .bind(&bill.description)
        .bind(bill.amount)
        .bind(&bill.currency)
        .bind(bill.due_date)
        .bind(&bill.file_url)
        .bind(bill.status.as_str())
        .bind(&bill.review_note)
        .bind(bill.submitted_at)
        .bind(bill.updated_at)
        .bind(bill.version)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        insert_payments(&mut tx, bill.id, &bill.payments).await?;
        insert_outbox(&mut tx, outbox).await?;
        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn bill(&self, id: Uuid) -> Result<Option<Bill>, StoreError> {
        let row = sqlx::query("SELECT * FROM bills WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut bills = vec![bill_from_row(&row)?];
        self.attach_payments(&mut bills).await?;
        Ok(bills.pop())
    }

    async fn list_bills(&self, client: Option<Uuid>) -> Result<Vec<Bill>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT *
            FROM bills
            WHERE ($1::uuid IS NULL OR client_id = $1)
            ORDER BY submitted_at DESC
            "#,
        )
        .bind(client)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let mut bills = rows
            .iter()
            .map(bill_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        self.attach_payments(&mut bills).await?;
        Ok(bills)
    }

    async fn update_bill(&self, bill: &Bill, outbox: &[OutboxMessage]) -> Result<Bill, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let result = sqlx::query(
            r#"
            UPDATE bills
            SET title = $3,
                description = $4,
                amount = $5,
                currency = $6,
                due_date = $7,
                file_url = $8,
                status = $9,
                review_note = $10,
                updated_at = $11,
                version = version + 1
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(bill.id)
        .bind(bill.version)
        .bind(&bill.title)
        .bind(&bill.description)
        .bind(bill.amount)
        .bind(&bill.currency)
        .bind(bill.due_date)
        .bind(&bill.file_url)
        .bind(bill.status.as_str())
        .bind(&bill.review_note)
        .bind(bill.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(missed_update(&mut tx, "bills", "bill", bill.id).await);
        }

        // Payments are append-only; rows already stored are skipped.
        insert_payments(&mut tx, bill.id, &bill.payments).await?;
        insert_outbox(&mut tx, outbox).await?;
        tx.commit().await.map_err(backend)?;

        let mut updated = bill.clone();
        updated.version += 1;
        Ok(updated)
    }

    async fn delete_bill(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM bills WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("bill"));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PgPortalStore {
    async fn insert_document(
        &self,
        document: &PushedDocument,
        outbox: &[OutboxMessage],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        sqlx::query(
            r#"
            INSERT INTO pushed_documents (
                id, title, file_url, pushed_by, recipient, status, review_note,
                pushed_at, reviewed_at, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(document.id)
        .bind(&document.title)
        .bind(&document.file_url)
        .bind(document.pushed_by)
        .bind(document.recipient)
        .bind(document.status.as_str())
        .bind(&document.review_note)
        .bind(document.pushed_at)
        .bind(document.reviewed_at)
        .bind(document.version)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        insert_outbox(&mut tx, outbox).await?;
        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn document(&self, id: Uuid) -> Result<Option<PushedDocument>, StoreError> {
        let row = sqlx::query("SELECT * FROM pushed_documents WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        row.as_ref().map(document_from_row).transpose()
    }

    async fn pending_documents(&self, recipient: Uuid) -> Result<Vec<PushedDocument>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT *
            FROM pushed_documents
            WHERE recipient = $1 AND status = 'pending'
            ORDER BY pushed_at DESC
            "#,
        )
        .bind(recipient)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(document_from_row).collect()
    }

    async fn update_document(
        &self,
        document: &PushedDocument,
        outbox: &[OutboxMessage],
    ) -> Result<PushedDocument, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let result = sqlx::query(
            r#"
            UPDATE pushed_documents
            SET status = $3,
                review_note = $4,
                reviewed_at = $5,
                version = version + 1
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(document.id)
        .bind(document.version)
        .bind(document.status.as_str())
        .bind(&document.review_note)
        .bind(document.reviewed_at)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(missed_update(&mut tx, "pushed_documents", "document", document.id).await);
        }

        insert_outbox(&mut tx, outbox).await?;
        tx.commit().await.map_err(backend)?;

        let mut updated = document.clone();
        updated.version += 1;
        Ok(updated)
    }
}

#[async_trait]
impl NotificationStore for PgPortalStore {
    async fn enqueue(&self, outbox: &[OutboxMessage]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        insert_outbox(&mut tx, outbox).await?;
        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn due_messages(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OutboxMessage>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT *
            FROM outbox_messages
            WHERE status = 'pending' AND next_attempt_at <= $1
            ORDER BY created_at
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(outbox_from_row).collect()
    }

    async fn mark_delivered(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_messages
            SET status = 'delivered', delivered_at = $2, last_error = NULL
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("outbox message"));
        }
        Ok(())
    }

    async fn reschedule(
        &self,
        id: Uuid,
        attempts: i32,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_messages
            SET attempts = $2, next_attempt_at = $3, last_error = $4
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(attempts)
        .bind(next_attempt_at)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("outbox message"));
        }
        Ok(())
    }

    async fn mark_dead(&self, id: Uuid, attempts: i32, error: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_messages
            SET status = 'dead', attempts = $2, last_error = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(attempts)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("outbox message"));
        }
        Ok(())
    }

    async fn insert_notification(&self, notification: &Notification) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO notifications (id, recipient, kind, message, action_url, read, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(notification.id)
        .bind(notification.recipient)
        .bind(notification.kind.as_str())
        .bind(&notification.message)
        .bind(&notification.action_url)
        .bind(notification.read)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(result.rows_affected() == 1)
    }

    async fn notifications(
        &self,
        recipient: Uuid,
        unread_only: bool,
    ) -> Result<Vec<Notification>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT *
            FROM notifications
            WHERE recipient = $1 AND (NOT $2 OR read = FALSE)
            ORDER BY created_at DESC
            "#,
        )
        .bind(recipient)
        .bind(unread_only)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(notification_from_row).collect()
    }

    async fn mark_read(&self, recipient: Uuid, id: Uuid) -> Result<Notification, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE notifications
            SET read = TRUE
            WHERE id = $1 AND recipient = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(recipient)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        match row {
            Some(row) => notification_from_row(&row),
            None => Err(StoreError::NotFound("notification")),
        }
    }

    async fn delete_notification(&self, recipient: Uuid, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND recipient = $2")
            .bind(id)
            .bind(recipient)
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("notification"));
        }
        Ok(())
    }
}

#[async_trait]
impl ContactDirectory for PgPortalStore {
    async fn upsert_contact(&self, contact: &Contact) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO contacts (user_id, phone_number, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id)
            DO UPDATE SET phone_number = EXCLUDED.phone_number, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(contact.user_id)
        .bind(&contact.phone_number)
        .bind(contact.updated_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn contact(&self, user_id: Uuid) -> Result<Option<Contact>, StoreError> {
        let row = sqlx::query("SELECT user_id, phone_number, updated_at FROM contacts WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(Contact {
            user_id: row.try_get("user_id").map_err(backend)?,
            phone_number: row.try_get("phone_number").map_err(backend)?,
            updated_at: row.try_get("updated_at").map_err(backend)?,
        }))
    }
}

#[async_trait]
impl SalaryStore for PgPortalStore {
    async fn insert_slip(&self, slip: &SalarySlip) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO salary_slips (
                id, staff_id, period, base_monthly, working_days, days_present, allowances,
                deductions, prorated_base, gross, net, computed_by, computed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(slip.id)
        .bind(slip.staff_id)
        .bind(&slip.period)
        .bind(slip.base_monthly)
        .bind(slip.working_days)
        .bind(slip.days_present)
        .bind(slip.allowances)
        .bind(slip.deductions)
        .bind(slip.prorated_base)
        .bind(slip.gross)
        .bind(slip.net)
        .bind(slip.computed_by)
        .bind(slip.computed_at)
        .execute(&self.pool)
        .await
        .map_err(|err| match backend(err) {
            StoreError::Duplicate(_) => StoreError::Duplicate(format!(
                "a salary slip for {} already exists",
                slip.period
            )),
            other => other,
        })?;

        Ok(())
    }

    async fn slips(&self, staff_id: Option<Uuid>) -> Result<Vec<SalarySlip>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT *
            FROM salary_slips
            WHERE ($1::uuid IS NULL OR staff_id = $1)
            ORDER BY period DESC
            "#,
        )
        .bind(staff_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(slip_from_row).collect()
    }
}
