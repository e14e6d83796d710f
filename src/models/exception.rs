use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Failure notification sent to the exception manager after local
/// retries are exhausted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionReport {
    pub message_hash: String,
    pub service: String,
    pub subscription: String,
    pub exception_class: String,
    pub exception_message: String,
    pub exception_root_cause: String,
}

/// Quarantine decision returned by the exception manager. All flags
/// default to off so a partial or empty reply degrades to log-and-retry.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionReportResponse {
    #[serde(default)]
    pub skip_it: bool,

    #[serde(default)]
    pub peek: bool,

    #[serde(default)]
    pub log_it: bool,
}

/// Immutable copy of a message stored ahead of quarantining it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedMessage {
    pub message_hash: String,
    pub message_payload: String,
    pub service: String,
    pub subscription: String,
    pub content_type: String,

    #[serde(default)]
    pub routing_key: Option<String>,

    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
}

/// Best-effort diagnostic forward of a failing message's raw content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Peek {
    pub message_hash: String,
    pub message_payload: String,
}
