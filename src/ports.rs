use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::ProcessingError;
use crate::models::case::Case;
use crate::models::exception::{ExceptionReportResponse, Peek, SkippedMessage};
use crate::models::template::{Channel, Template};
use crate::models::uac::UacQidPair;

/// Read-only access to fulfilment reference data.
///
/// Implemented by the Postgres store; tests substitute in-memory maps.
#[async_trait]
pub trait FulfilmentLookup: Send + Sync {
    /// Find a case by id, including its collection exercise linkage.
    async fn find_case(&self, case_id: Uuid) -> Result<Case, ProcessingError>;

    /// Find the template registered for this channel under `pack_code`.
    async fn find_template(
        &self,
        channel: Channel,
        pack_code: &str,
    ) -> Result<Template, ProcessingError>;

    /// Whether the template is allow-listed for fulfilment on the survey.
    async fn template_allowed_on_survey(
        &self,
        channel: Channel,
        pack_code: &str,
        survey_id: Uuid,
    ) -> Result<bool, ProcessingError>;
}

/// Generates new access-code / questionnaire-id pairs on demand.
#[async_trait]
pub trait CodeGenerator: Send + Sync {
    async fn generate_uac_qid(&self, qid_type: i32) -> Result<UacQidPair, ProcessingError>;
}

/// Durable publication of enriched fulfilment events.
///
/// `publish_confirmed` must not return until the broker has confirmed the
/// message is persisted. Callers rely on this to order the enriched event
/// ahead of any provider send.
#[async_trait]
pub trait EnrichedEventPublisher: Send + Sync {
    async fn publish_confirmed(&self, queue: &str, body: &[u8]) -> Result<(), ProcessingError>;
}

/// Outbound notification delivery through the provider API.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send_sms(
        &self,
        provider_template_id: Uuid,
        phone_number: &str,
        personalisation: &HashMap<String, String>,
        sender_id: &str,
    ) -> Result<(), ProcessingError>;

    async fn send_email(
        &self,
        provider_template_id: Uuid,
        email_address: &str,
        personalisation: &HashMap<String, String>,
    ) -> Result<(), ProcessingError>;
}

/// Quarantine decisions for messages that repeatedly fail processing.
///
/// These calls sit OUTSIDE the processing-failure taxonomy: an error here
/// is an operational fault and is surfaced as `anyhow::Error`, never fed
/// back into the recovery engine.
#[async_trait]
pub trait ExceptionReporter: Send + Sync {
    async fn report_exception(
        &self,
        report: &crate::models::exception::ExceptionReport,
    ) -> anyhow::Result<ExceptionReportResponse>;

    async fn store_skipped_message(&self, skipped: &SkippedMessage) -> anyhow::Result<()>;

    async fn respond_to_peek(&self, peek: &Peek) -> anyhow::Result<()>;
}
