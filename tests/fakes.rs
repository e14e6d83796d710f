use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;
use uuid::Uuid;

use notify_service::clients::notify::SenderRegistry;
use notify_service::error::ProcessingError;
use notify_service::models::case::Case;
use notify_service::models::event::Event;
use notify_service::models::exception::{
    ExceptionReport, ExceptionReportResponse, Peek, SkippedMessage,
};
use notify_service::models::fulfilment::RequestHeader;
use notify_service::models::template::{Channel, Template};
use notify_service::models::uac::UacQidPair;
use notify_service::pipeline::FulfilmentPipeline;
use notify_service::ports::{
    CodeGenerator, EnrichedEventPublisher, ExceptionReporter, FulfilmentLookup, NotificationSender,
};

pub const SMS_ENRICHED_QUEUE: &str = "sms-request-enriched";
pub const EMAIL_ENRICHED_QUEUE: &str = "email-request-enriched";

pub struct FakeLookup {
    cases: HashMap<Uuid, Case>,
    sms_templates: HashMap<String, Template>,
    email_templates: HashMap<String, Template>,
    allowed: bool,
}

impl FakeLookup {
    pub fn new() -> Self {
        Self {
            cases: HashMap::new(),
            sms_templates: HashMap::new(),
            email_templates: HashMap::new(),
            allowed: true,
        }
    }

    pub fn with_case(mut self, case: Case) -> Self {
        self.cases.insert(case.id, case);
        self
    }

    pub fn with_sms_template(mut self, template: Template) -> Self {
        self.sms_templates.insert(template.pack_code.clone(), template);
        self
    }

    pub fn with_email_template(mut self, template: Template) -> Self {
        self.email_templates
            .insert(template.pack_code.clone(), template);
        self
    }

    pub fn with_allowed(mut self, allowed: bool) -> Self {
        self.allowed = allowed;
        self
    }
}

#[async_trait]
impl FulfilmentLookup for FakeLookup {
    async fn find_case(&self, case_id: Uuid) -> Result<Case, ProcessingError> {
        self.cases
            .get(&case_id)
            .cloned()
            .ok_or_else(|| ProcessingError::NotFound("Case does not exist".to_string()))
    }

    async fn find_template(
        &self,
        channel: Channel,
        pack_code: &str,
    ) -> Result<Template, ProcessingError> {
        let templates = match channel {
            Channel::Sms => &self.sms_templates,
            Channel::Email => &self.email_templates,
        };

        templates
            .get(pack_code)
            .cloned()
            .ok_or_else(|| ProcessingError::NotFound("Template does not exist".to_string()))
    }

    async fn template_allowed_on_survey(
        &self,
        _channel: Channel,
        _pack_code: &str,
        _survey_id: Uuid,
    ) -> Result<bool, ProcessingError> {
        Ok(self.allowed)
    }
}

pub struct FakeCodeGenerator {
    pair: UacQidPair,
    calls: AtomicU32,
    fail: bool,
}

impl FakeCodeGenerator {
    pub fn new(uac: &str, qid: &str) -> Self {
        Self {
            pair: UacQidPair {
                uac: uac.to_string(),
                qid: qid.to_string(),
            },
            calls: AtomicU32::new(0),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        let mut generator = Self::new("unused", "unused");
        generator.fail = true;
        generator
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CodeGenerator for FakeCodeGenerator {
    async fn generate_uac_qid(&self, _qid_type: i32) -> Result<UacQidPair, ProcessingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.fail {
            return Err(ProcessingError::RemoteCall {
                service: "uac service",
                source: anyhow!("UAC service unavailable"),
            });
        }

        Ok(self.pair.clone())
    }
}

pub struct RecordingPublisher {
    published: Mutex<Vec<(String, Vec<u8>)>>,
    fail: bool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        let mut publisher = Self::new();
        publisher.fail = true;
        publisher
    }

    pub fn publish_count(&self) -> usize {
        self.published.lock().unwrap().len()
    }

    pub fn published_events(&self) -> Vec<(String, Event)> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|(queue, body)| (queue.clone(), serde_json::from_slice(body).unwrap()))
            .collect()
    }
}

#[async_trait]
impl EnrichedEventPublisher for RecordingPublisher {
    async fn publish_confirmed(&self, queue: &str, body: &[u8]) -> Result<(), ProcessingError> {
        if self.fail {
            return Err(ProcessingError::RemoteCall {
                service: "event publisher",
                source: anyhow!("Broker unavailable"),
            });
        }

        self.published
            .lock()
            .unwrap()
            .push((queue.to_string(), body.to_vec()));
        Ok(())
    }
}

pub struct SmsSend {
    pub template_id: Uuid,
    pub phone_number: String,
    pub personalisation: HashMap<String, String>,
    pub sender_id: String,
    pub publishes_before_send: usize,
}

pub struct EmailSend {
    pub template_id: Uuid,
    pub email_address: String,
    pub personalisation: HashMap<String, String>,
    pub publishes_before_send: usize,
}

/// Provider double. Records every send together with how many enriched
/// events the publisher had already confirmed at that point, so tests can
/// assert the publish-before-send ordering.
pub struct RecordingSender {
    publisher: Arc<RecordingPublisher>,
    pub sms_sends: Mutex<Vec<SmsSend>>,
    pub email_sends: Mutex<Vec<EmailSend>>,
    fail: bool,
}

impl RecordingSender {
    pub fn new(publisher: Arc<RecordingPublisher>) -> Self {
        Self {
            publisher,
            sms_sends: Mutex::new(Vec::new()),
            email_sends: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing(publisher: Arc<RecordingPublisher>) -> Self {
        let mut sender = Self::new(publisher);
        sender.fail = true;
        sender
    }
}

#[async_trait]
impl NotificationSender for RecordingSender {
    async fn send_sms(
        &self,
        provider_template_id: Uuid,
        phone_number: &str,
        personalisation: &HashMap<String, String>,
        sender_id: &str,
    ) -> Result<(), ProcessingError> {
        self.sms_sends.lock().unwrap().push(SmsSend {
            template_id: provider_template_id,
            phone_number: phone_number.to_string(),
            personalisation: personalisation.clone(),
            sender_id: sender_id.to_string(),
            publishes_before_send: self.publisher.publish_count(),
        });

        if self.fail {
            return Err(ProcessingError::ProviderSend {
                source: anyhow!("Provider returned status 500"),
            });
        }

        Ok(())
    }

    async fn send_email(
        &self,
        provider_template_id: Uuid,
        email_address: &str,
        personalisation: &HashMap<String, String>,
    ) -> Result<(), ProcessingError> {
        self.email_sends.lock().unwrap().push(EmailSend {
            template_id: provider_template_id,
            email_address: email_address.to_string(),
            personalisation: personalisation.clone(),
            publishes_before_send: self.publisher.publish_count(),
        });

        if self.fail {
            return Err(ProcessingError::ProviderSend {
                source: anyhow!("Provider returned status 500"),
            });
        }

        Ok(())
    }
}

pub struct FakeReporter {
    decision: ExceptionReportResponse,
    report_fails: bool,
    store_fails: bool,
    peek_fails: bool,
    pub reports: Mutex<Vec<ExceptionReport>>,
    pub stored: Mutex<Vec<SkippedMessage>>,
    pub peeks: Mutex<Vec<Peek>>,
}

impl FakeReporter {
    pub fn deciding(skip_it: bool, peek: bool, log_it: bool) -> Self {
        Self {
            decision: ExceptionReportResponse {
                skip_it,
                peek,
                log_it,
            },
            report_fails: false,
            store_fails: false,
            peek_fails: false,
            reports: Mutex::new(Vec::new()),
            stored: Mutex::new(Vec::new()),
            peeks: Mutex::new(Vec::new()),
        }
    }

    pub fn unreachable_manager() -> Self {
        let mut reporter = Self::deciding(false, false, false);
        reporter.report_fails = true;
        reporter
    }

    pub fn with_store_failure(mut self) -> Self {
        self.store_fails = true;
        self
    }

    pub fn with_peek_failure(mut self) -> Self {
        self.peek_fails = true;
        self
    }
}

#[async_trait]
impl ExceptionReporter for FakeReporter {
    async fn report_exception(
        &self,
        report: &ExceptionReport,
    ) -> anyhow::Result<ExceptionReportResponse> {
        self.reports.lock().unwrap().push(report.clone());

        if self.report_fails {
            return Err(anyhow!("Exception manager returned status 503"));
        }

        Ok(self.decision)
    }

    async fn store_skipped_message(&self, skipped: &SkippedMessage) -> anyhow::Result<()> {
        if self.store_fails {
            return Err(anyhow!("Exception manager returned status 500"));
        }

        self.stored.lock().unwrap().push(skipped.clone());
        Ok(())
    }

    async fn respond_to_peek(&self, peek: &Peek) -> anyhow::Result<()> {
        if self.peek_fails {
            return Err(anyhow!("Exception manager returned status 500"));
        }

        self.peeks.lock().unwrap().push(peek.clone());
        Ok(())
    }
}

pub fn test_case(case_id: Uuid) -> Case {
    Case {
        id: case_id,
        collection_exercise_id: Uuid::new_v4(),
        survey_id: Uuid::new_v4(),
        sample: HashMap::new(),
        sample_sensitive: HashMap::new(),
    }
}

pub fn test_template(pack_code: &str, items: &[&str]) -> Template {
    Template {
        pack_code: pack_code.to_string(),
        items: items.iter().map(|item| item.to_string()).collect(),
        provider_template_id: Uuid::new_v4(),
        service_ref: None,
    }
}

pub fn request_header(correlation_id: Uuid) -> RequestHeader {
    RequestHeader {
        source: Some("CONTACT_CENTRE".to_string()),
        channel: Some("CC".to_string()),
        correlation_id: Some(correlation_id),
        originating_user: Some("tester@example.com".to_string()),
    }
}

pub fn build_pipeline(
    lookup: FakeLookup,
    generator: Arc<FakeCodeGenerator>,
    publisher: Arc<RecordingPublisher>,
    sender: Arc<RecordingSender>,
) -> Arc<FulfilmentPipeline> {
    Arc::new(FulfilmentPipeline::new(
        Arc::new(lookup),
        generator,
        publisher,
        sender,
        SenderRegistry::new("default-sender".to_string(), HashMap::new()),
        SMS_ENRICHED_QUEUE.to_string(),
        EMAIL_ENRICHED_QUEUE.to_string(),
    ))
}
