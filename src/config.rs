use anyhow::{Error, Result, anyhow};
use dotenvy::dotenv;
use serde::Deserialize;

use crate::models::retry::RetryConfig;

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    pub rabbitmq_url: String,
    pub sms_request_queue: String,
    pub email_request_queue: String,
    pub sms_request_enriched_queue: String,
    pub email_request_enriched_queue: String,
    pub prefetch_count: u16,

    pub database_url: String,

    pub uac_service_url: String,
    pub exception_manager_url: String,

    pub notify_api_url: String,
    pub notify_api_key: String,
    pub notify_sender_id: String,

    /// JSON object mapping a template's service reference to an override
    /// sender id, e.g. `{"survey-a":"sender-a"}`.
    #[serde(default)]
    pub notify_sender_overrides: Option<String>,

    pub max_retry_attempts: u32,
    pub initial_retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub retry_backoff_multiplier: u64,

    pub max_delivery_attempts: u32,

    /// Fixed throttle before expensive downstream calls, not a retry backoff.
    #[serde(default)]
    pub processing_delay_ms: u64,

    pub remote_call_timeout_seconds: u64,

    #[serde(default)]
    pub log_stack_traces: bool,

    pub server_port: u16,
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();

        let config = envy::from_env::<Self>()
            .map_err(|_| anyhow!("Invalid or missing environmental variable"))?;
        Ok(config)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_retry_attempts,
            initial_delay_ms: self.initial_retry_delay_ms,
            max_delay_ms: self.max_retry_delay_ms,
            backoff_multiplier: self.retry_backoff_multiplier,
        }
    }
}
