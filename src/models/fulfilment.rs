use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body of the synchronous fulfilment endpoints. Header fields are kept
/// optional at the (de)serialization layer so that completeness can be
/// reported as a validation failure rather than a parse failure.
#[derive(Debug, Clone, Deserialize)]
pub struct FulfilmentRequest {
    pub header: RequestHeader,
    pub payload: RequestPayload,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestHeader {
    #[serde(default)]
    pub source: Option<String>,

    #[serde(default)]
    pub channel: Option<String>,

    #[serde(default)]
    pub correlation_id: Option<Uuid>,

    #[serde(default)]
    pub originating_user: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPayload {
    #[serde(default)]
    pub sms_fulfilment: Option<SmsFulfilment>,

    #[serde(default)]
    pub email_fulfilment: Option<EmailFulfilment>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmsFulfilment {
    pub case_id: Uuid,
    pub phone_number: String,
    pub pack_code: String,

    #[serde(default)]
    pub uac_metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailFulfilment {
    pub case_id: Uuid,
    pub email: String,
    pub pack_code: String,

    #[serde(default)]
    pub uac_metadata: Option<serde_json::Value>,
}

/// Success body. Serializes to `{}` when no code was generated, or to
/// `{"uacHash": ..., "qid": ...}` when one was. The raw access code is
/// never echoed back, only its hash.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FulfilmentResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uac_hash: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub qid: Option<String>,
}

impl FulfilmentResponse {
    pub fn empty() -> Self {
        FulfilmentResponse::default()
    }

    pub fn with_code(uac_hash: String, qid: String) -> Self {
        FulfilmentResponse {
            uac_hash: Some(uac_hash),
            qid: Some(qid),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
