use thiserror::Error;

/// Failure taxonomy for one processing attempt of a fulfilment request.
///
/// Anything that is NOT a `ProcessingError` (broker ack failures, task
/// panics) is an operational bug and must not be routed through the
/// recovery engine.
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Unrecognized event schema version: {version}")]
    SchemaVersion { version: String },

    #[error("Call to {service} failed: {source}")]
    RemoteCall {
        service: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("Notification provider send failed: {source}")]
    ProviderSend {
        #[source]
        source: anyhow::Error,
    },

    #[error("Invariant violated: {0}")]
    Invariant(String),
}

impl ProcessingError {
    /// Failure class name, as reported to the exception manager.
    pub fn class_name(&self) -> &'static str {
        match self {
            ProcessingError::Validation(_) => "ValidationError",
            ProcessingError::NotFound(_) => "NotFoundError",
            ProcessingError::SchemaVersion { .. } => "SchemaVersionError",
            ProcessingError::RemoteCall { .. } => "RemoteCallError",
            ProcessingError::ProviderSend { .. } => "ProviderSendError",
            ProcessingError::Invariant(_) => "InvariantError",
        }
    }

    /// The component that first detected the failure. Reported to the
    /// exception manager in place of stack-trace introspection.
    pub fn origin(&self) -> &'static str {
        match self {
            ProcessingError::Validation(_) => "request validation",
            ProcessingError::NotFound(_) => "reference data lookup",
            ProcessingError::SchemaVersion { .. } => "event envelope",
            ProcessingError::RemoteCall { service, .. } => service,
            ProcessingError::ProviderSend { .. } => "notification provider",
            ProcessingError::Invariant(_) => "personalisation builder",
        }
    }

    /// One-line cause description including the error source chain.
    pub fn cause_chain(&self) -> String {
        use std::error::Error as _;

        let mut description = self.to_string();
        let mut source = self.source();
        while let Some(cause) = source {
            description.push_str(": ");
            description.push_str(&cause.to_string());
            source = cause.source();
        }
        description
    }
}
