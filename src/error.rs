//! Error types for grpc-stream-observer.

use std::time::Duration;

use thiserror::Error;

use crate::handler::CallbackKind;
use crate::status::Status;

/// Failures raised by the observer itself.
///
/// Every variant is fatal for the stream it occurred on. The transport gets
/// them as an INTERNAL status via [`ObserverError::to_status`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObserverError {
    /// The observer was built without a handler.
    #[error("Error while building the connection. {0}")]
    Configuration(String),

    /// An event arrived for a callback the handler does not implement.
    #[error("Error in listener service definition. {0} resource does not exist")]
    MissingCallback(CallbackKind),

    /// The admission wait was cancelled or the gate was closed.
    #[error("Internal error occurred. The dispatching task got interrupted")]
    Interrupted,

    /// The admission wait exceeded the configured timeout.
    #[error("Internal error occurred. Admission wait timed out after {0:?}")]
    AcquireTimeout(Duration),

    /// Non-blocking acquire found the gate occupied.
    #[error("Throttle gate busy")]
    GateBusy,
}

impl ObserverError {
    /// Internal-severity status reported to the transport.
    pub fn to_status(&self) -> Status {
        Status::internal(self.to_string())
    }
}

impl From<ObserverError> for Status {
    fn from(err: ObserverError) -> Self {
        err.to_status()
    }
}

/// Result type alias using ObserverError.
pub type Result<T> = std::result::Result<T, ObserverError>;
