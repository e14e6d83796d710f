use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::Config;
use crate::error::ProcessingError;
use crate::ports::NotificationSender;

/// Immutable mapping from a template's service reference to the sender id
/// registered for it. Built once from configuration at process start.
#[derive(Debug, Clone)]
pub struct SenderRegistry {
    default_sender_id: String,
    overrides: HashMap<String, String>,
}

impl SenderRegistry {
    pub fn new(default_sender_id: String, overrides: HashMap<String, String>) -> Self {
        Self {
            default_sender_id,
            overrides,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let overrides = match &config.notify_sender_overrides {
            Some(raw) => serde_json::from_str(raw)
                .map_err(|_| anyhow!("Invalid notify sender overrides JSON"))?,
            None => HashMap::new(),
        };

        Ok(Self::new(config.notify_sender_id.clone(), overrides))
    }

    pub fn resolve(&self, service_ref: Option<&str>) -> &str {
        service_ref
            .and_then(|service_ref| self.overrides.get(service_ref))
            .map(String::as_str)
            .unwrap_or(&self.default_sender_id)
    }
}

#[derive(Serialize)]
struct SmsSendRequest<'a> {
    template_id: Uuid,
    phone_number: &'a str,
    personalisation: &'a HashMap<String, String>,
    sms_sender_id: &'a str,
}

#[derive(Serialize)]
struct EmailSendRequest<'a> {
    template_id: Uuid,
    email_address: &'a str,
    personalisation: &'a HashMap<String, String>,
}

/// Client for the notification provider's send API.
///
/// Sends are deliberately not retried here: a failed dispatch is terminal
/// for the current processing attempt and is handled by the caller.
pub struct NotifyClient {
    http_client: Client,
    base_url: String,
    api_key: String,
}

impl NotifyClient {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.remote_call_timeout_seconds))
            .build()
            .map_err(|_| anyhow!("Failed to create HTTP client"))?;

        info!(base_url = %config.notify_api_url, "Notify client initialized");

        Ok(Self {
            http_client,
            base_url: config.notify_api_url.clone(),
            api_key: config.notify_api_key.clone(),
        })
    }

    async fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<(), ProcessingError> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| ProcessingError::ProviderSend { source: e.into() })?;

        let status = response.status();

        if status.is_success() {
            Ok(())
        } else {
            let error_text = response.text().await.unwrap_or_default();
            Err(ProcessingError::ProviderSend {
                source: anyhow!("Provider returned status {status}: {error_text}"),
            })
        }
    }
}

#[async_trait]
impl NotificationSender for NotifyClient {
    async fn send_sms(
        &self,
        provider_template_id: Uuid,
        phone_number: &str,
        personalisation: &HashMap<String, String>,
        sender_id: &str,
    ) -> Result<(), ProcessingError> {
        debug!(%provider_template_id, "Sending SMS notification");

        self.post(
            "/v2/notifications/sms",
            &SmsSendRequest {
                template_id: provider_template_id,
                phone_number,
                personalisation,
                sms_sender_id: sender_id,
            },
        )
        .await
    }

    async fn send_email(
        &self,
        provider_template_id: Uuid,
        email_address: &str,
        personalisation: &HashMap<String, String>,
    ) -> Result<(), ProcessingError> {
        debug!(%provider_template_id, "Sending email notification");

        self.post(
            "/v2/notifications/email",
            &EmailSendRequest {
                template_id: provider_template_id,
                email_address,
                personalisation,
            },
        )
        .await
    }
}
