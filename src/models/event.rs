use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const OUTBOUND_EVENT_SCHEMA_VERSION: &str = "v0.3_RELEASE";

pub const ALLOWED_INBOUND_EVENT_SCHEMA_VERSIONS: [&str; 4] =
    ["v0.3_RELEASE", "0.4.0-DRAFT", "0.4.0", "0.5.0-DRAFT"];

/// Queue envelope shared by every inbound and outbound fulfilment event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub header: EventHeader,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventHeader {
    pub version: String,
    pub message_id: Uuid,
    pub correlation_id: Uuid,
    pub source: String,
    pub channel: String,
    pub originating_user: String,
    pub date_time: DateTime<Utc>,
    pub topic: String,
}

impl EventHeader {
    /// Header for an outbound enriched event. The message id is freshly
    /// assigned; the correlation id and provenance fields are carried over
    /// from the inbound request.
    pub fn outbound(
        topic: &str,
        source: &str,
        channel: &str,
        correlation_id: Uuid,
        originating_user: &str,
    ) -> Self {
        EventHeader {
            version: OUTBOUND_EVENT_SCHEMA_VERSION.to_string(),
            message_id: Uuid::new_v4(),
            correlation_id,
            source: source.to_string(),
            channel: channel.to_string(),
            originating_user: originating_user.to_string(),
            date_time: Utc::now(),
            topic: topic.to_string(),
        }
    }

    pub fn version_accepted(&self) -> bool {
        ALLOWED_INBOUND_EVENT_SCHEMA_VERSIONS.contains(&self.version.as_str())
    }
}

/// One-of payload carrier. Exactly one field is expected to be populated;
/// absent variants are omitted from the wire form entirely.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sms_request: Option<SmsRequest>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sms_request_enriched: Option<SmsRequestEnriched>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_request: Option<EmailRequest>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_request_enriched: Option<EmailRequestEnriched>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmsRequest {
    pub case_id: Uuid,
    pub phone_number: String,
    pub pack_code: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uac_metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmsRequestEnriched {
    pub case_id: Uuid,
    pub phone_number: String,
    pub pack_code: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uac_metadata: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uac: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qid: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailRequest {
    pub case_id: Uuid,
    pub email: String,
    pub pack_code: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uac_metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailRequestEnriched {
    pub case_id: Uuid,
    pub email: String,
    pub pack_code: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uac_metadata: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uac: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qid: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_payload_variants_are_omitted_from_the_wire_form() {
        let event = Event {
            header: EventHeader::outbound(
                "sms-fulfilment",
                "CASE_PROCESSOR",
                "RM",
                Uuid::new_v4(),
                "tester@example.com",
            ),
            payload: EventPayload {
                sms_request_enriched: Some(SmsRequestEnriched {
                    case_id: Uuid::new_v4(),
                    phone_number: "+447123456789".to_string(),
                    pack_code: "TEST_SMS".to_string(),
                    uac_metadata: None,
                    uac: Some("ABCD1234".to_string()),
                    qid: Some("0120000000000100".to_string()),
                }),
                ..Default::default()
            },
        };

        let json = serde_json::to_value(&event).unwrap();
        let payload = json.get("payload").unwrap().as_object().unwrap();
        assert_eq!(payload.len(), 1);
        assert!(payload.contains_key("smsRequestEnriched"));
        assert!(
            payload["smsRequestEnriched"]
                .as_object()
                .unwrap()
                .contains_key("phoneNumber")
        );
    }

    #[test]
    fn inbound_version_gate_accepts_the_published_set_only() {
        let mut header = EventHeader::outbound("t", "s", "c", Uuid::new_v4(), "u");
        assert!(header.version_accepted());

        header.version = "0.4.0".to_string();
        assert!(header.version_accepted());

        header.version = "0.1.0".to_string();
        assert!(!header.version_accepted());
    }
}
