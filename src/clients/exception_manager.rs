use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use tracing::info;

use crate::config::Config;
use crate::models::exception::{ExceptionReport, ExceptionReportResponse, Peek, SkippedMessage};
use crate::ports::ExceptionReporter;

/// Client for the exception manager, which records processing failures
/// and hands back quarantine decisions.
///
/// Calls are single-shot; the recovery engine treats any failure here as
/// "no decision" and carries on conservatively.
pub struct ExceptionManagerClient {
    http_client: Client,
    base_url: String,
}

impl ExceptionManagerClient {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.remote_call_timeout_seconds))
            .build()
            .map_err(|_| anyhow!("Failed to create HTTP client"))?;

        info!(base_url = %config.exception_manager_url, "Exception manager client initialized");

        Ok(Self {
            http_client,
            base_url: config.exception_manager_url.clone(),
        })
    }

    async fn post<T: serde::Serialize>(&self, path: &str, body: &T) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);

        let response = self.http_client.post(&url).json(body).send().await?;

        let status = response.status();

        if status.is_success() {
            Ok(response)
        } else {
            Err(anyhow!("Exception manager returned status {status}"))
        }
    }
}

#[async_trait]
impl ExceptionReporter for ExceptionManagerClient {
    async fn report_exception(
        &self,
        report: &ExceptionReport,
    ) -> Result<ExceptionReportResponse> {
        let response = self.post("/reportexception", report).await?;

        response
            .json::<ExceptionReportResponse>()
            .await
            .map_err(|e| anyhow!("Failed to parse exception report response: {e}"))
    }

    async fn store_skipped_message(&self, skipped: &SkippedMessage) -> Result<()> {
        self.post("/storeskippedmessage", skipped).await?;
        Ok(())
    }

    async fn respond_to_peek(&self, peek: &Peek) -> Result<()> {
        self.post("/peekreply", peek).await?;
        Ok(())
    }
}
