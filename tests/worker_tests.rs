use std::sync::Arc;

use anyhow::Result;
use tokio::time::Duration;
use uuid::Uuid;

use notify_service::models::event::{Event, EventHeader, EventPayload, SmsRequest};
use notify_service::recovery::MessageRecoverer;
use notify_service::worker::{DeliveryProcessor, DeliveryVerdict, QueueKind};

use crate::fakes::{
    FakeCodeGenerator, FakeLookup, FakeReporter, RecordingPublisher, RecordingSender,
    build_pipeline, test_case, test_template,
};

const SOURCE_QUEUE: &str = "sms-fulfilment";

fn sms_request_body(case_id: Uuid, pack_code: &str) -> Vec<u8> {
    let event = Event {
        header: EventHeader::outbound(
            SOURCE_QUEUE,
            "CASE_PROCESSOR",
            "RM",
            Uuid::new_v4(),
            "requester@example.com",
        ),
        payload: EventPayload {
            sms_request: Some(SmsRequest {
                case_id,
                phone_number: "07123456789".to_string(),
                pack_code: pack_code.to_string(),
                uac_metadata: None,
            }),
            ..Default::default()
        },
    };

    serde_json::to_vec(&event).unwrap()
}

/// Test: Exhausted attempts are handed to recovery exactly once
#[tokio::test]
async fn test_exhausted_attempts_hand_off_to_recovery() -> Result<()> {
    let case_id = Uuid::new_v4();

    let lookup = FakeLookup::new()
        .with_case(test_case(case_id))
        .with_sms_template(test_template("CODE_SMS", &["__uac__"]));
    let generator = Arc::new(FakeCodeGenerator::new("UAC", "QID"));
    let publisher = Arc::new(RecordingPublisher::failing());
    let sender = Arc::new(RecordingSender::new(Arc::clone(&publisher)));

    let pipeline = build_pipeline(lookup, Arc::clone(&generator), publisher, sender);

    let reporter = Arc::new(FakeReporter::deciding(false, false, true));
    let recoverer = MessageRecoverer::new(Arc::clone(&reporter) as std::sync::Arc<dyn notify_service::ports::ExceptionReporter>, false);
    let processor = DeliveryProcessor::new(pipeline, recoverer, 3, Duration::ZERO);

    let verdict = processor
        .handle(
            SOURCE_QUEUE,
            QueueKind::SmsRequest,
            &sms_request_body(case_id, "CODE_SMS"),
        )
        .await;

    assert_eq!(
        verdict,
        DeliveryVerdict::Requeue,
        "A log-only decision keeps the message on the queue"
    );
    assert_eq!(
        reporter.reports.lock().unwrap().len(),
        1,
        "Recovery runs once, after the final attempt"
    );
    assert_eq!(
        generator.call_count(),
        3,
        "Each attempt mints afresh; only a confirmed publish pins a pair"
    );

    Ok(())
}

/// Test: A malformed envelope is quarantined when skipping is approved
#[tokio::test]
async fn test_malformed_envelope_quarantined_when_approved() -> Result<()> {
    let lookup = FakeLookup::new();
    let generator = Arc::new(FakeCodeGenerator::new("UAC", "QID"));
    let publisher = Arc::new(RecordingPublisher::new());
    let sender = Arc::new(RecordingSender::new(Arc::clone(&publisher)));

    let pipeline = build_pipeline(lookup, generator, publisher, sender);

    let reporter = Arc::new(FakeReporter::deciding(true, false, false));
    let recoverer = MessageRecoverer::new(Arc::clone(&reporter) as std::sync::Arc<dyn notify_service::ports::ExceptionReporter>, false);
    let processor = DeliveryProcessor::new(pipeline, recoverer, 2, Duration::ZERO);

    let verdict = processor
        .handle(SOURCE_QUEUE, QueueKind::SmsRequest, b"this is not json")
        .await;

    assert_eq!(
        verdict,
        DeliveryVerdict::Ack,
        "A quarantined message is acknowledged so it is never redelivered"
    );

    let stored = reporter.stored.lock().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].message_payload, "this is not json");
    assert_eq!(
        reporter.reports.lock().unwrap()[0].exception_class,
        "ValidationError"
    );

    Ok(())
}

/// Test: Successful deliveries are acknowledged without involving recovery
#[tokio::test]
async fn test_successful_delivery_acks_without_reporting() -> Result<()> {
    let case_id = Uuid::new_v4();

    let lookup = FakeLookup::new()
        .with_case(test_case(case_id))
        .with_sms_template(test_template("CODE_SMS", &["__uac__"]));
    let generator = Arc::new(FakeCodeGenerator::new("UAC", "QID"));
    let publisher = Arc::new(RecordingPublisher::new());
    let sender = Arc::new(RecordingSender::new(Arc::clone(&publisher)));

    let pipeline = build_pipeline(lookup, generator, Arc::clone(&publisher), sender);

    let reporter = Arc::new(FakeReporter::deciding(true, true, true));
    let recoverer = MessageRecoverer::new(Arc::clone(&reporter) as std::sync::Arc<dyn notify_service::ports::ExceptionReporter>, false);
    let processor = DeliveryProcessor::new(pipeline, recoverer, 3, Duration::ZERO);

    let verdict = processor
        .handle(
            SOURCE_QUEUE,
            QueueKind::SmsRequest,
            &sms_request_body(case_id, "CODE_SMS"),
        )
        .await;

    assert_eq!(verdict, DeliveryVerdict::Ack);
    assert_eq!(publisher.publish_count(), 1);
    assert!(reporter.reports.lock().unwrap().is_empty());

    Ok(())
}
