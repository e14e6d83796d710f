use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::SERVICE_NAME;
use crate::clients::notify::SenderRegistry;
use crate::error::ProcessingError;
use crate::models::case::Case;
use crate::models::event::{
    EmailRequestEnriched, Event, EventHeader, EventPayload, SmsRequestEnriched,
};
use crate::models::fulfilment::{EmailFulfilment, FulfilmentResponse, RequestHeader, SmsFulfilment};
use crate::models::template::{
    Channel, QID_TYPE, TEMPLATE_QID_KEY, TEMPLATE_SENSITIVE_PREFIX, TEMPLATE_UAC_KEY, Template,
};
use crate::models::uac::UacQidPair;
use crate::models::validation::{
    validate_email_address, validate_phone_number, validate_request_header,
};
use crate::ports::{CodeGenerator, EnrichedEventPublisher, FulfilmentLookup, NotificationSender};
use crate::utils::sha256_hex;

/// The fulfilment pipeline: validate, resolve reference data, mint a code
/// if the template calls for one, durably publish the enriched event, and
/// only then attempt the provider send.
///
/// The publish happens strictly before the send on every path, so a send
/// failure can never strand a generated code.
pub struct FulfilmentPipeline {
    lookup: Arc<dyn FulfilmentLookup>,
    code_generator: Arc<dyn CodeGenerator>,
    publisher: Arc<dyn EnrichedEventPublisher>,
    sender: Arc<dyn NotificationSender>,
    sender_registry: SenderRegistry,
    sms_enriched_queue: String,
    email_enriched_queue: String,
}

impl FulfilmentPipeline {
    pub fn new(
        lookup: Arc<dyn FulfilmentLookup>,
        code_generator: Arc<dyn CodeGenerator>,
        publisher: Arc<dyn EnrichedEventPublisher>,
        sender: Arc<dyn NotificationSender>,
        sender_registry: SenderRegistry,
        sms_enriched_queue: String,
        email_enriched_queue: String,
    ) -> Self {
        Self {
            lookup,
            code_generator,
            publisher,
            sender,
            sender_registry,
            sms_enriched_queue,
            email_enriched_queue,
        }
    }

    /// Synchronous SMS fulfilment. Returns the response body for the HTTP
    /// caller; the enriched event has been durably published by the time
    /// this returns, even if the final send failed.
    pub async fn handle_sms_fulfilment(
        &self,
        header: &RequestHeader,
        fulfilment: &SmsFulfilment,
    ) -> Result<FulfilmentResponse, ProcessingError> {
        let header = validate_request_header(header)?;

        let case = self.lookup.find_case(fulfilment.case_id).await?;
        let template = self
            .lookup
            .find_template(Channel::Sms, &fulfilment.pack_code)
            .await?;
        self.check_template_on_survey(Channel::Sms, &template, &case)
            .await?;
        validate_phone_number(&fulfilment.phone_number)?;

        let pair = self.fetch_new_uac_qid_pair_if_required(&template).await?;
        let personalisation = build_personalisation(&template, &case, pair.as_ref())?;

        let event = Event {
            header: EventHeader::outbound(
                &self.sms_enriched_queue,
                &header.source,
                &header.channel,
                header.correlation_id,
                &header.originating_user,
            ),
            payload: EventPayload {
                sms_request_enriched: Some(SmsRequestEnriched {
                    case_id: fulfilment.case_id,
                    phone_number: fulfilment.phone_number.clone(),
                    pack_code: fulfilment.pack_code.clone(),
                    uac_metadata: fulfilment.uac_metadata.clone(),
                    uac: pair.as_ref().map(|pair| pair.uac.clone()),
                    qid: pair.as_ref().map(|pair| pair.qid.clone()),
                }),
                ..Default::default()
            },
        };

        self.publish_enriched(&self.sms_enriched_queue, &event)
            .await?;

        let sender_id = self.sender_registry.resolve(template.service_ref.as_deref());
        self.sender
            .send_sms(
                template.provider_template_id,
                &fulfilment.phone_number,
                &personalisation,
                sender_id,
            )
            .await?;

        info!(
            case_id = %fulfilment.case_id,
            pack_code = %fulfilment.pack_code,
            "SMS fulfilment processed"
        );

        Ok(code_response(pair))
    }

    /// Synchronous email fulfilment, mirroring the SMS path.
    pub async fn handle_email_fulfilment(
        &self,
        header: &RequestHeader,
        fulfilment: &EmailFulfilment,
    ) -> Result<FulfilmentResponse, ProcessingError> {
        let header = validate_request_header(header)?;

        let case = self.lookup.find_case(fulfilment.case_id).await?;
        let template = self
            .lookup
            .find_template(Channel::Email, &fulfilment.pack_code)
            .await?;
        self.check_template_on_survey(Channel::Email, &template, &case)
            .await?;
        validate_email_address(&fulfilment.email)?;

        let pair = self.fetch_new_uac_qid_pair_if_required(&template).await?;
        let personalisation = build_personalisation(&template, &case, pair.as_ref())?;

        let event = Event {
            header: EventHeader::outbound(
                &self.email_enriched_queue,
                &header.source,
                &header.channel,
                header.correlation_id,
                &header.originating_user,
            ),
            payload: EventPayload {
                email_request_enriched: Some(EmailRequestEnriched {
                    case_id: fulfilment.case_id,
                    email: fulfilment.email.clone(),
                    pack_code: fulfilment.pack_code.clone(),
                    uac_metadata: fulfilment.uac_metadata.clone(),
                    uac: pair.as_ref().map(|pair| pair.uac.clone()),
                    qid: pair.as_ref().map(|pair| pair.qid.clone()),
                }),
                ..Default::default()
            },
        };

        self.publish_enriched(&self.email_enriched_queue, &event)
            .await?;

        self.sender
            .send_email(
                template.provider_template_id,
                &fulfilment.email,
                &personalisation,
            )
            .await?;

        info!(
            case_id = %fulfilment.case_id,
            pack_code = %fulfilment.pack_code,
            "Email fulfilment processed"
        );

        Ok(code_response(pair))
    }

    /// Stage one of the asynchronous flow: consume a request event, mint a
    /// code if needed, and publish the enriched event. Never sends.
    pub async fn process_sms_request_event(&self, event: &Event) -> Result<(), ProcessingError> {
        check_schema_version(&event.header)?;

        let request = event.payload.sms_request.as_ref().ok_or_else(|| {
            ProcessingError::Validation("Event payload is missing smsRequest".to_string())
        })?;

        let template = self
            .lookup
            .find_template(Channel::Sms, &request.pack_code)
            .await?;

        let pair = self.fetch_new_uac_qid_pair_if_required(&template).await?;

        let enriched = Event {
            header: enriched_header(&self.sms_enriched_queue, &event.header),
            payload: EventPayload {
                sms_request_enriched: Some(SmsRequestEnriched {
                    case_id: request.case_id,
                    phone_number: request.phone_number.clone(),
                    pack_code: request.pack_code.clone(),
                    uac_metadata: request.uac_metadata.clone(),
                    uac: pair.as_ref().map(|pair| pair.uac.clone()),
                    qid: pair.as_ref().map(|pair| pair.qid.clone()),
                }),
                ..Default::default()
            },
        };

        self.publish_enriched(&self.sms_enriched_queue, &enriched)
            .await?;

        info!(
            case_id = %request.case_id,
            pack_code = %request.pack_code,
            "SMS request enriched and forwarded"
        );

        Ok(())
    }

    /// Stage one for email request events.
    pub async fn process_email_request_event(&self, event: &Event) -> Result<(), ProcessingError> {
        check_schema_version(&event.header)?;

        let request = event.payload.email_request.as_ref().ok_or_else(|| {
            ProcessingError::Validation("Event payload is missing emailRequest".to_string())
        })?;

        let template = self
            .lookup
            .find_template(Channel::Email, &request.pack_code)
            .await?;

        let pair = self.fetch_new_uac_qid_pair_if_required(&template).await?;

        let enriched = Event {
            header: enriched_header(&self.email_enriched_queue, &event.header),
            payload: EventPayload {
                email_request_enriched: Some(EmailRequestEnriched {
                    case_id: request.case_id,
                    email: request.email.clone(),
                    pack_code: request.pack_code.clone(),
                    uac_metadata: request.uac_metadata.clone(),
                    uac: pair.as_ref().map(|pair| pair.uac.clone()),
                    qid: pair.as_ref().map(|pair| pair.qid.clone()),
                }),
                ..Default::default()
            },
        };

        self.publish_enriched(&self.email_enriched_queue, &enriched)
            .await?;

        info!(
            case_id = %request.case_id,
            pack_code = %request.pack_code,
            "Email request enriched and forwarded"
        );

        Ok(())
    }

    /// Stage two of the asynchronous flow: consume an enriched event and
    /// perform the provider send. Never touches the code generator.
    pub async fn process_sms_enriched_event(&self, event: &Event) -> Result<(), ProcessingError> {
        check_schema_version(&event.header)?;

        let enriched = event.payload.sms_request_enriched.as_ref().ok_or_else(|| {
            ProcessingError::Validation("Event payload is missing smsRequestEnriched".to_string())
        })?;

        let template = self
            .lookup
            .find_template(Channel::Sms, &enriched.pack_code)
            .await?;
        let case = self.lookup.find_case(enriched.case_id).await?;

        let pair = carried_pair(&enriched.uac, &enriched.qid);
        let personalisation = build_personalisation(&template, &case, pair.as_ref())?;

        let sender_id = self.sender_registry.resolve(template.service_ref.as_deref());
        self.sender
            .send_sms(
                template.provider_template_id,
                &enriched.phone_number,
                &personalisation,
                sender_id,
            )
            .await?;

        info!(
            case_id = %enriched.case_id,
            pack_code = %enriched.pack_code,
            "SMS sent from enriched request"
        );

        Ok(())
    }

    /// Stage two for enriched email events.
    pub async fn process_email_enriched_event(&self, event: &Event) -> Result<(), ProcessingError> {
        check_schema_version(&event.header)?;

        let enriched = event
            .payload
            .email_request_enriched
            .as_ref()
            .ok_or_else(|| {
                ProcessingError::Validation(
                    "Event payload is missing emailRequestEnriched".to_string(),
                )
            })?;

        let template = self
            .lookup
            .find_template(Channel::Email, &enriched.pack_code)
            .await?;
        let case = self.lookup.find_case(enriched.case_id).await?;

        let pair = carried_pair(&enriched.uac, &enriched.qid);
        let personalisation = build_personalisation(&template, &case, pair.as_ref())?;

        self.sender
            .send_email(template.provider_template_id, &enriched.email, &personalisation)
            .await?;

        info!(
            case_id = %enriched.case_id,
            pack_code = %enriched.pack_code,
            "Email sent from enriched request"
        );

        Ok(())
    }

    /// Calls the code generator exactly once if any reserved token is
    /// present in the template, and not at all otherwise.
    async fn fetch_new_uac_qid_pair_if_required(
        &self,
        template: &Template,
    ) -> Result<Option<UacQidPair>, ProcessingError> {
        if !template.requires_new_uac_qid_pair() {
            return Ok(None);
        }

        let pair = self.code_generator.generate_uac_qid(QID_TYPE).await?;
        Ok(Some(pair))
    }

    async fn check_template_on_survey(
        &self,
        channel: Channel,
        template: &Template,
        case: &Case,
    ) -> Result<(), ProcessingError> {
        let allowed = self
            .lookup
            .template_allowed_on_survey(channel, &template.pack_code, case.survey_id)
            .await?;

        if allowed {
            Ok(())
        } else {
            Err(ProcessingError::Validation(
                "Template is not allowed on this survey".to_string(),
            ))
        }
    }

    async fn publish_enriched(&self, queue: &str, event: &Event) -> Result<(), ProcessingError> {
        let body = serde_json::to_vec(event).map_err(|e| {
            ProcessingError::Invariant(format!("Failed to serialize enriched event: {e}"))
        })?;

        self.publisher.publish_confirmed(queue, &body).await
    }
}

/// Resolves a template's ordered placeholder tokens against the case's
/// field maps and the minted pair. Missing case fields resolve to an
/// empty value; a reserved token without a pair is an invariant breach.
pub fn build_personalisation(
    template: &Template,
    case: &Case,
    pair: Option<&UacQidPair>,
) -> Result<HashMap<String, String>, ProcessingError> {
    let mut values = HashMap::new();

    for item in &template.items {
        if item == TEMPLATE_UAC_KEY {
            let pair = require_pair(pair)?;
            values.insert(item.clone(), pair.uac.clone());
        } else if item == TEMPLATE_QID_KEY {
            let pair = require_pair(pair)?;
            values.insert(item.clone(), pair.qid.clone());
        } else if let Some(field) = item.strip_prefix(TEMPLATE_SENSITIVE_PREFIX) {
            let value = case.sample_sensitive.get(field).cloned().unwrap_or_default();
            values.insert(item.clone(), value);
        } else {
            let value = case.sample.get(item.as_str()).cloned().unwrap_or_default();
            values.insert(item.clone(), value);
        }
    }

    Ok(values)
}

fn require_pair(pair: Option<&UacQidPair>) -> Result<&UacQidPair, ProcessingError> {
    pair.ok_or_else(|| {
        ProcessingError::Invariant(
            "Template requires a UAC/QID pair but none was generated".to_string(),
        )
    })
}

fn carried_pair(uac: &Option<String>, qid: &Option<String>) -> Option<UacQidPair> {
    match (uac, qid) {
        (Some(uac), Some(qid)) => Some(UacQidPair {
            uac: uac.clone(),
            qid: qid.clone(),
        }),
        _ => None,
    }
}

fn check_schema_version(header: &EventHeader) -> Result<(), ProcessingError> {
    if header.version_accepted() {
        Ok(())
    } else {
        Err(ProcessingError::SchemaVersion {
            version: header.version.clone(),
        })
    }
}

/// Outbound header for an enriched event produced from an inbound queue
/// event. Provenance channel is carried over; this service becomes the
/// source.
fn enriched_header(topic: &str, inbound: &EventHeader) -> EventHeader {
    EventHeader::outbound(
        topic,
        SERVICE_NAME,
        &inbound.channel,
        inbound.correlation_id,
        &inbound.originating_user,
    )
}

fn code_response(pair: Option<UacQidPair>) -> FulfilmentResponse {
    match pair {
        Some(pair) => FulfilmentResponse::with_code(sha256_hex(pair.uac.as_bytes()), pair.qid),
        None => FulfilmentResponse::empty(),
    }
}

