use anyhow::{Context, Result};

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub database_url: String,
    pub redis_url: String,
    pub http_addr: String,
    pub pending_document_cache_secs: i64,
}

impl ServiceConfig {
    pub fn from_env(default_http_addr: &str) -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is required")?;
        let redis_url = std::env::var("REDIS_URL").context("REDIS_URL is required")?;
        let http_addr =
            std::env::var("HTTP_ADDR").unwrap_or_else(|_| default_http_addr.to_string());
        let pending_document_cache_secs = env_or("PENDING_DOCUMENT_CACHE_SECS", 300)?;

        Ok(Self {
            database_url,
            redis_url,
            http_addr,
            pending_document_cache_secs,
        })
    }

    pub fn worker_from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is required")?;
        let redis_url = std::env::var("REDIS_URL").context("REDIS_URL is required")?;

        Ok(Self {
            database_url,
            redis_url,
            http_addr: String::new(),
            pending_document_cache_secs: 0,
        })
    }
}

#[derive(Clone, Debug)]
pub struct WhatsAppConfig {
    pub api_url: String,
    pub phone_number_id: String,
    pub token: String,
    pub template: String,
    pub language: String,
}

impl WhatsAppConfig {
    /// `None` when no access token is configured; WhatsApp delivery is then
    /// skipped and only in-app notifications are written.
    pub fn from_env() -> Result<Option<Self>> {
        let Ok(token) = std::env::var("WHATSAPP_TOKEN") else {
            return Ok(None);
        };
        if token.trim().is_empty() {
            return Ok(None);
        }

        let phone_number_id = std::env::var("WHATSAPP_PHONE_NUMBER_ID")
            .context("WHATSAPP_PHONE_NUMBER_ID is required when WHATSAPP_TOKEN is set")?;
        let api_url = std::env::var("WHATSAPP_API_URL")
            .unwrap_or_else(|_| "https://graph.facebook.com/v19.0".to_string());
        let template =
            std::env::var("WHATSAPP_TEMPLATE").unwrap_or_else(|_| "hello_world".to_string());
        let language =
            std::env::var("WHATSAPP_LANGUAGE").unwrap_or_else(|_| "en_US".to_string());

        Ok(Some(Self {
            api_url,
            phone_number_id,
            token,
            template,
            language,
        }))
    }
}

#[derive(Clone, Debug)]
pub struct NotifierConfig {
    pub service: ServiceConfig,
    pub outbox_poll_secs: u64,
    pub outbox_batch_size: usize,
    pub expiry_sweep_secs: u64,
    pub whatsapp: Option<WhatsAppConfig>,
}

impl NotifierConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            service: ServiceConfig::worker_from_env()?,
            outbox_poll_secs: env_or("OUTBOX_POLL_SECS", 15)?,
            outbox_batch_size: env_or("OUTBOX_BATCH_SIZE", 50)?,
            expiry_sweep_secs: env_or("EXPIRY_SWEEP_SECS", 3600)?,
            whatsapp: WhatsAppConfig::from_env()?,
        })
    }
}

fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{name} must be a number")),
        Err(_) => Ok(default),
    }
}
