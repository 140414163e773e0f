pub mod cache;
pub mod clock;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod models;
pub mod storage;

pub use cache::TtlCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{LifecycleError, StoreError};
pub use events::{NotificationKind, OutboxMessage, OutboxStatus};
pub use models::{
    Agreement, AgreementStatus, Bill, BillStatus, ClientSignature, Contact, DocumentStatus,
    ExtensionRecord, ExtensionRequest, ExtensionRequestStatus, NewAgreement, Notification,
    PaymentTransaction, PushedDocument, ReviewDecision, Role, SalarySlip, reference_code,
};
pub use storage::{
    AgreementFilter, AgreementStore, BillStore, ContactDirectory, DocumentStore,
    NotificationStore, PortalStore, SalaryStore,
};
