use std::sync::Arc;

use tracing::{error, warn};

use crate::SERVICE_NAME;
use crate::error::ProcessingError;
use crate::models::exception::{ExceptionReport, ExceptionReportResponse, Peek, SkippedMessage};
use crate::ports::ExceptionReporter;
use crate::utils::sha256_hex;

/// What the worker must do with the original delivery once the recovery
/// decision has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// A copy of the message is stored with the exception manager;
    /// acknowledge the original so it is never redelivered.
    Quarantine,

    /// Leave the message on the queue to be redelivered later.
    Redeliver,
}

/// Decides the fate of a message whose processing attempts are exhausted.
///
/// The engine only ever sees `ProcessingError`s. Anything else (broker
/// faults, task panics) is an operational bug the worker re-raises
/// instead of recovering.
pub struct MessageRecoverer {
    reporter: Arc<dyn ExceptionReporter>,
    log_stack_traces: bool,
}

impl MessageRecoverer {
    pub fn new(reporter: Arc<dyn ExceptionReporter>, log_stack_traces: bool) -> Self {
        Self {
            reporter,
            log_stack_traces,
        }
    }

    /// Runs the recovery decision for one exhausted delivery.
    ///
    /// A message is only ever quarantined after the exception manager has
    /// confirmed it holds a copy; every other path ends in `Redeliver`.
    pub async fn recover(
        &self,
        source_queue: &str,
        raw_body: &[u8],
        failure: &ProcessingError,
    ) -> RecoveryOutcome {
        let message_hash = sha256_hex(raw_body);

        let decision = self.report(source_queue, &message_hash, failure).await;

        if decision.is_some_and(|decision| decision.skip_it) {
            if self.store_copy(source_queue, &message_hash, raw_body).await {
                warn!(message_hash = %message_hash, "Quarantined message");
                return RecoveryOutcome::Quarantine;
            }
            // No stored copy means no quarantine; fall through so the
            // message stays on the queue.
        }

        if decision.is_some_and(|decision| decision.peek) {
            self.forward_for_peek(&message_hash, raw_body).await;
        }

        if decision.is_none_or(|decision| decision.log_it) {
            self.log_failure(&message_hash, failure);
        }

        RecoveryOutcome::Redeliver
    }

    async fn report(
        &self,
        source_queue: &str,
        message_hash: &str,
        failure: &ProcessingError,
    ) -> Option<ExceptionReportResponse> {
        let report = ExceptionReport {
            message_hash: message_hash.to_string(),
            service: SERVICE_NAME.to_string(),
            subscription: source_queue.to_string(),
            exception_class: failure.class_name().to_string(),
            exception_message: failure.cause_chain(),
            exception_root_cause: failure.origin().to_string(),
        };

        match self.reporter.report_exception(&report).await {
            Ok(decision) => Some(decision),
            Err(e) => {
                warn!(
                    reason = %e,
                    "Could not report to exception manager. There will be excessive logging until resolved"
                );
                None
            }
        }
    }

    async fn store_copy(&self, source_queue: &str, message_hash: &str, raw_body: &[u8]) -> bool {
        let skipped = SkippedMessage {
            message_hash: message_hash.to_string(),
            message_payload: String::from_utf8_lossy(raw_body).into_owned(),
            service: SERVICE_NAME.to_string(),
            subscription: source_queue.to_string(),
            content_type: "application/json".to_string(),
            routing_key: None,
            headers: None,
        };

        match self.reporter.store_skipped_message(&skipped).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    message_hash = %message_hash,
                    error = %e,
                    "Unable to store a copy of the message. Will NOT be quarantining"
                );
                false
            }
        }
    }

    async fn forward_for_peek(&self, message_hash: &str, raw_body: &[u8]) {
        let peek = Peek {
            message_hash: message_hash.to_string(),
            message_payload: String::from_utf8_lossy(raw_body).into_owned(),
        };

        // Peek is diagnostic only; a failure here must never block recovery.
        if let Err(e) = self.reporter.respond_to_peek(&peek).await {
            warn!(message_hash = %message_hash, error = %e, "Peek response failed");
        }
    }

    fn log_failure(&self, message_hash: &str, failure: &ProcessingError) {
        if self.log_stack_traces {
            error!(
                message_hash = %message_hash,
                cause = %failure.cause_chain(),
                root_cause = failure.origin(),
                "Could not process message"
            );
        } else {
            error!(
                message_hash = %message_hash,
                cause = %failure,
                root_cause = failure.origin(),
                "Could not process message"
            );
        }
    }
}
