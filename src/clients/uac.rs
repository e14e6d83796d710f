use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::ProcessingError;
use crate::models::retry::RetryConfig;
use crate::models::uac::UacQidPair;
use crate::ports::CodeGenerator;
use crate::utils::retry_with_backoff;

/// Client for the external code-generation service that mints fresh
/// UAC/QID pairs.
pub struct UacQidServiceClient {
    http_client: Client,
    base_url: String,
    retry_config: RetryConfig,
}

impl UacQidServiceClient {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.remote_call_timeout_seconds))
            .build()
            .map_err(|_| anyhow!("Failed to create HTTP client"))?;

        info!(base_url = %config.uac_service_url, "UAC service client initialized");

        Ok(Self {
            http_client,
            base_url: config.uac_service_url.clone(),
            retry_config: config.retry_config(),
        })
    }
}

#[async_trait]
impl CodeGenerator for UacQidServiceClient {
    async fn generate_uac_qid(&self, qid_type: i32) -> Result<UacQidPair, ProcessingError> {
        let url = format!("{}/uacqid/create?type={}", self.base_url, qid_type);

        debug!(qid_type, "Requesting a new UAC/QID pair");

        let http_client = self.http_client.clone();

        retry_with_backoff(&self.retry_config, || {
            let url = url.clone();
            let client = http_client.clone();

            async move {
                let response = client.get(&url).send().await.map_err(|e| e.to_string())?;

                let status = response.status();

                if status.is_success() {
                    response
                        .json::<UacQidPair>()
                        .await
                        .map_err(|e| format!("Failed to parse UAC/QID response: {e}"))
                } else {
                    Err(format!("UAC service returned status {status}"))
                }
            }
        })
        .await
        .map_err(|reason| ProcessingError::RemoteCall {
            service: "uac service",
            source: anyhow!(reason),
        })
    }
}
