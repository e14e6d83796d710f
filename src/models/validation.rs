use std::sync::LazyLock;

use regex::Regex;
use uuid::Uuid;

use crate::error::ProcessingError;
use crate::models::fulfilment::RequestHeader;

static PHONE_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s.,\-\[\]{}()]").unwrap());

static PHONE_LEADING_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(0{1,2}44|\+44|0)").unwrap());

static PHONE_LOCAL_PART: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^7[0-9]{9}$").unwrap());

static EMAIL_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$",
    )
    .unwrap()
});

/// Header fields proven present and non-blank, ready to carry into the
/// outbound enriched event.
#[derive(Debug, Clone)]
pub struct ValidatedHeader {
    pub source: String,
    pub channel: String,
    pub correlation_id: Uuid,
    pub originating_user: String,
}

pub fn validate_request_header(header: &RequestHeader) -> Result<ValidatedHeader, ProcessingError> {
    let source = header.source.as_deref().unwrap_or("").trim();
    let channel = header.channel.as_deref().unwrap_or("").trim();

    let Some(correlation_id) = header.correlation_id else {
        return Err(ProcessingError::Validation(
            "Invalid request header".to_string(),
        ));
    };

    if source.is_empty() || channel.is_empty() {
        return Err(ProcessingError::Validation(
            "Invalid request header".to_string(),
        ));
    }

    Ok(ValidatedHeader {
        source: source.to_string(),
        channel: channel.to_string(),
        correlation_id,
        originating_user: header.originating_user.clone().unwrap_or_default(),
    })
}

/// UK mobile number check. Separator characters are stripped throughout
/// the number, then at most one leading trunk or country-code prefix is
/// removed; the ten remaining digits must start with 7.
pub fn validate_phone_number(phone_number: &str) -> Result<(), ProcessingError> {
    let sanitised = PHONE_SEPARATORS.replace_all(phone_number, "");
    let sanitised = PHONE_LEADING_PREFIX.replace(&sanitised, "");

    if PHONE_LOCAL_PART.is_match(&sanitised) {
        Ok(())
    } else {
        Err(ProcessingError::Validation(
            "Invalid phone number".to_string(),
        ))
    }
}

pub fn validate_email_address(email_address: &str) -> Result<(), ProcessingError> {
    if EMAIL_ADDRESS.is_match(email_address) {
        Ok(())
    } else {
        Err(ProcessingError::Validation(
            "Invalid email address".to_string(),
        ))
    }
}
