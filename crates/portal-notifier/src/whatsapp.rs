use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use portal_platform::WhatsAppConfig;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{error, info};

/// Outbound channel for phone messages.
#[async_trait]
pub trait MessagingChannel: Send + Sync {
    async fn send_template(&self, phone_number: &str, message: &str) -> Result<()>;
}

/// WhatsApp Cloud API sender.
///
/// Always sends the configured template, which takes no parameters, so the
/// `message` text is accepted but never transmitted.
pub struct WhatsAppCloudClient {
    client: Client,
    config: WhatsAppConfig,
}

impl WhatsAppCloudClient {
    pub fn new(config: WhatsAppConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}/messages",
            self.config.api_url.trim_end_matches('/'),
            self.config.phone_number_id
        )
    }
}

pub(crate) fn template_body(config: &WhatsAppConfig, phone_number: &str) -> Value {
    json!({
        "messaging_product": "whatsapp",
        "to": phone_number,
        "type": "template",
        "template": {
            "name": config.template,
            "language": { "code": config.language },
        },
    })
}

#[async_trait]
impl MessagingChannel for WhatsAppCloudClient {
    async fn send_template(&self, phone_number: &str, _message: &str) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.token)
            .json(&template_body(&self.config, phone_number))
            .send()
            .await
            .context("failed to send whatsapp template request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .context("failed to read whatsapp error response body")?;
            error!("whatsapp template send failed: {status} - {error_text}");
            return Err(anyhow!("whatsapp template send failed: {status} - {error_text}"));
        }

        info!("whatsapp template {} sent", self.config.template);
        Ok(())
    }
}
