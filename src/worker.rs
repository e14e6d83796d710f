use std::sync::Arc;

use anyhow::{Error, Result, anyhow};
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::{Duration, sleep};
use tracing::{info, warn};

use crate::clients::rbmq::RabbitMqClient;
use crate::config::Config;
use crate::error::ProcessingError;
use crate::models::event::Event;
use crate::pipeline::FulfilmentPipeline;
use crate::recovery::{MessageRecoverer, RecoveryOutcome};

/// Which stage of the two-stage asynchronous flow a queue feeds.
///
/// Request queues enrich and publish; enriched queues dispatch to the
/// provider and never touch the code generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    SmsRequest,
    EmailRequest,
    SmsRequestEnriched,
    EmailRequestEnriched,
}

impl QueueKind {
    fn consumer_tag(&self) -> &'static str {
        match self {
            QueueKind::SmsRequest => "sms_request_worker",
            QueueKind::EmailRequest => "email_request_worker",
            QueueKind::SmsRequestEnriched => "sms_request_enriched_worker",
            QueueKind::EmailRequestEnriched => "email_request_enriched_worker",
        }
    }
}

/// Final disposition of one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryVerdict {
    /// Processed or quarantined; acknowledge the delivery.
    Ack,

    /// Reject with requeue so the broker redelivers later.
    Requeue,
}

/// Runs the bounded attempt loop for one delivery and hands exhausted
/// failures to the recovery engine.
pub struct DeliveryProcessor {
    pipeline: Arc<FulfilmentPipeline>,
    recoverer: MessageRecoverer,
    max_delivery_attempts: u32,
    processing_delay: Duration,
}

impl DeliveryProcessor {
    pub fn new(
        pipeline: Arc<FulfilmentPipeline>,
        recoverer: MessageRecoverer,
        max_delivery_attempts: u32,
        processing_delay: Duration,
    ) -> Self {
        Self {
            pipeline,
            recoverer,
            max_delivery_attempts,
            processing_delay,
        }
    }

    /// Processes one raw delivery from `source_queue`.
    ///
    /// Every attempt re-runs the pipeline from the start, so a failure
    /// after code generation but before a confirmed publish will mint a
    /// fresh pair on the next attempt; only a published enriched event
    /// pins the pair.
    pub async fn handle(
        &self,
        source_queue: &str,
        kind: QueueKind,
        raw_body: &[u8],
    ) -> DeliveryVerdict {
        if !self.processing_delay.is_zero() {
            // Fixed throttle ahead of the expensive downstream calls,
            // not a retry backoff.
            sleep(self.processing_delay).await;
        }

        let mut attempt = 0;
        let failure = loop {
            attempt += 1;

            match self.process(kind, raw_body).await {
                Ok(()) => return DeliveryVerdict::Ack,
                Err(e) => {
                    warn!(
                        queue = source_queue,
                        attempt,
                        max_attempts = self.max_delivery_attempts,
                        error = %e,
                        "Processing attempt failed"
                    );

                    if attempt >= self.max_delivery_attempts {
                        break e;
                    }
                }
            }
        };

        match self.recoverer.recover(source_queue, raw_body, &failure).await {
            RecoveryOutcome::Quarantine => DeliveryVerdict::Ack,
            RecoveryOutcome::Redeliver => DeliveryVerdict::Requeue,
        }
    }

    async fn process(&self, kind: QueueKind, raw_body: &[u8]) -> Result<(), ProcessingError> {
        let event: Event = serde_json::from_slice(raw_body)
            .map_err(|e| ProcessingError::Validation(format!("Malformed event envelope: {e}")))?;

        match kind {
            QueueKind::SmsRequest => self.pipeline.process_sms_request_event(&event).await,
            QueueKind::EmailRequest => self.pipeline.process_email_request_event(&event).await,
            QueueKind::SmsRequestEnriched => self.pipeline.process_sms_enriched_event(&event).await,
            QueueKind::EmailRequestEnriched => {
                self.pipeline.process_email_enriched_event(&event).await
            }
        }
    }
}

/// Consumes the fulfilment queues and drives the delivery processor.
pub struct QueueWorker {
    rbmq: Arc<RabbitMqClient>,
    processor: DeliveryProcessor,
}

impl QueueWorker {
    pub fn new(rbmq: Arc<RabbitMqClient>, processor: DeliveryProcessor) -> Self {
        Self { rbmq, processor }
    }

    /// Consumes one queue until the stream ends or a broker operation
    /// fails. Broker faults are not processing failures; they are raised
    /// to the caller rather than recovered.
    pub async fn consume(&self, queue: &str, kind: QueueKind) -> Result<(), Error> {
        let mut consumer = self.rbmq.create_consumer(queue, kind.consumer_tag()).await?;

        info!(queue, "Worker consuming");

        while let Some(delivery) = consumer.next().await {
            let delivery = delivery.map_err(|e| anyhow!("Broker delivery failed: {e}"))?;

            match self.processor.handle(queue, kind, &delivery.data).await {
                DeliveryVerdict::Ack => self.rbmq.acknowledge(delivery.delivery_tag).await?,
                DeliveryVerdict::Requeue => self.rbmq.reject(delivery.delivery_tag, true).await?,
            }
        }

        Err(anyhow!("Consumer stream for {queue} ended unexpectedly"))
    }
}

/// Spawns one consumer task per fulfilment queue.
pub fn spawn_workers(
    worker: Arc<QueueWorker>,
    config: &Config,
) -> Vec<JoinHandle<Result<(), Error>>> {
    [
        (config.sms_request_queue.clone(), QueueKind::SmsRequest),
        (config.email_request_queue.clone(), QueueKind::EmailRequest),
        (
            config.sms_request_enriched_queue.clone(),
            QueueKind::SmsRequestEnriched,
        ),
        (
            config.email_request_enriched_queue.clone(),
            QueueKind::EmailRequestEnriched,
        ),
    ]
    .into_iter()
    .map(|(queue, kind)| {
        let worker = Arc::clone(&worker);
        tokio::spawn(async move { worker.consume(&queue, kind).await })
    })
    .collect()
}
