pub mod dispatcher;
pub mod whatsapp;

pub use dispatcher::{Dispatcher, DrainReport, RetryPolicy};
pub use whatsapp::{MessagingChannel, WhatsAppCloudClient};
