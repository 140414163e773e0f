pub mod config;
pub mod contracts;
pub mod db;
pub mod pg_store;
pub mod redis_bus;

pub use config::{NotifierConfig, ServiceConfig, WhatsAppConfig};
pub use contracts::{
    AgreementListQuery, AgreementListResponse, BillListQuery, BillListResponse, BillView,
    CreateNotificationRequest, CreateNotificationResponse, DocumentListResponse,
    ExtensionRequestBody, NotificationListQuery, NotificationListResponse, OUTBOX_CHANNEL,
    OutboxWakeup, PushDocumentRequest, RecordPaymentRequest, RecordPaymentResponse,
    RejectAgreementRequest, ReviewBillRequest, ReviewDocumentRequest, ReviewExtensionRequest,
    SalarySlipListResponse, SalarySlipQuery, SignAgreementRequest, UpsertContactRequest,
};
pub use db::{apply_schema, connect_database};
pub use pg_store::PgPortalStore;
pub use redis_bus::{RedisBus, decode_wakeup};
