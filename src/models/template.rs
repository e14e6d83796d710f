use uuid::Uuid;

pub const TEMPLATE_UAC_KEY: &str = "__uac__";
pub const TEMPLATE_QID_KEY: &str = "__qid__";
pub const TEMPLATE_SENSITIVE_PREFIX: &str = "__sensitive__.";

/// Questionnaire-id type minted for fulfilment codes.
pub const QID_TYPE: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Sms,
    Email,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Sms => "SMS",
            Channel::Email => "EMAIL",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A channel template as registered in the reference-data store.
///
/// `items` is the ordered list of placeholder tokens the provider template
/// expects. `service_ref` selects an override sender registration when one
/// is configured.
#[derive(Debug, Clone)]
pub struct Template {
    pub pack_code: String,
    pub items: Vec<String>,
    pub provider_template_id: Uuid,
    pub service_ref: Option<String>,
}

impl Template {
    /// Whether fulfilment of this template requires minting a new
    /// UAC/QID pair.
    pub fn requires_new_uac_qid_pair(&self) -> bool {
        self.items
            .iter()
            .any(|item| item == TEMPLATE_UAC_KEY || item == TEMPLATE_QID_KEY)
    }
}
