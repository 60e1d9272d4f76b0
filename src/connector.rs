//! Uniform error representation handed to user callbacks.
//!
//! Transport failures and internal dispatch failures both end up as a
//! [`ConnectorError`]. Its [`ErrorKind`] is derived from the gRPC status code,
//! so handlers can branch on a closed set of error kinds instead of parsing
//! status messages.

use std::fmt;

use thiserror::Error;

use crate::error::ObserverError;
use crate::status::{Code, Status};

/// Kind of a [`ConnectorError`], one per non-OK status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl ErrorKind {
    /// Map a status code to its error kind.
    ///
    /// `Code::Ok` only shows up here when a transport reports a failure with a
    /// success code; that is treated as [`ErrorKind::Unknown`].
    pub fn from_code(code: Code) -> Self {
        match code {
            Code::Ok | Code::Unknown => ErrorKind::Unknown,
            Code::Cancelled => ErrorKind::Cancelled,
            Code::InvalidArgument => ErrorKind::InvalidArgument,
            Code::DeadlineExceeded => ErrorKind::DeadlineExceeded,
            Code::NotFound => ErrorKind::NotFound,
            Code::AlreadyExists => ErrorKind::AlreadyExists,
            Code::PermissionDenied => ErrorKind::PermissionDenied,
            Code::ResourceExhausted => ErrorKind::ResourceExhausted,
            Code::FailedPrecondition => ErrorKind::FailedPrecondition,
            Code::Aborted => ErrorKind::Aborted,
            Code::OutOfRange => ErrorKind::OutOfRange,
            Code::Unimplemented => ErrorKind::Unimplemented,
            Code::Internal => ErrorKind::Internal,
            Code::Unavailable => ErrorKind::Unavailable,
            Code::DataLoss => ErrorKind::DataLoss,
            Code::Unauthenticated => ErrorKind::Unauthenticated,
        }
    }

    /// Status code this kind is reported as.
    pub fn code(self) -> Code {
        match self {
            ErrorKind::Cancelled => Code::Cancelled,
            ErrorKind::Unknown => Code::Unknown,
            ErrorKind::InvalidArgument => Code::InvalidArgument,
            ErrorKind::DeadlineExceeded => Code::DeadlineExceeded,
            ErrorKind::NotFound => Code::NotFound,
            ErrorKind::AlreadyExists => Code::AlreadyExists,
            ErrorKind::PermissionDenied => Code::PermissionDenied,
            ErrorKind::ResourceExhausted => Code::ResourceExhausted,
            ErrorKind::FailedPrecondition => Code::FailedPrecondition,
            ErrorKind::Aborted => Code::Aborted,
            ErrorKind::OutOfRange => Code::OutOfRange,
            ErrorKind::Unimplemented => Code::Unimplemented,
            ErrorKind::Internal => Code::Internal,
            ErrorKind::Unavailable => Code::Unavailable,
            ErrorKind::DataLoss => Code::DataLoss,
            ErrorKind::Unauthenticated => Code::Unauthenticated,
        }
    }

    /// Error type name exposed to user code.
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Cancelled => "CancelledError",
            ErrorKind::Unknown => "UnknownError",
            ErrorKind::InvalidArgument => "InvalidArgumentError",
            ErrorKind::DeadlineExceeded => "DeadlineExceededError",
            ErrorKind::NotFound => "NotFoundError",
            ErrorKind::AlreadyExists => "AlreadyExistsError",
            ErrorKind::PermissionDenied => "PermissionDeniedError",
            ErrorKind::ResourceExhausted => "ResourceExhaustedError",
            ErrorKind::FailedPrecondition => "FailedPreconditionError",
            ErrorKind::Aborted => "AbortedError",
            ErrorKind::OutOfRange => "OutOfRangeError",
            ErrorKind::Unimplemented => "UnimplementedError",
            ErrorKind::Internal => "InternalError",
            ErrorKind::Unavailable => "UnavailableError",
            ErrorKind::DataLoss => "DataLossError",
            ErrorKind::Unauthenticated => "UnauthenticatedError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error value delivered to user callbacks and returned by them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ConnectorError {
    kind: ErrorKind,
    message: String,
}

impl ConnectorError {
    /// Create an error of `kind`.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Create an `InternalError`.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Translate a transport status.
    ///
    /// A status without a message keeps the code name as its message so the
    /// value is never blank.
    pub fn from_status(status: &Status) -> Self {
        let message = status
            .message()
            .map(str::to_owned)
            .unwrap_or_else(|| status.code().as_str().to_owned());
        Self::new(ErrorKind::from_code(status.code()), message)
    }

    /// Kind derived from the status code.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Human readable message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Status equivalent of this error.
    pub fn to_status(&self) -> Status {
        Status::new(self.kind.code(), self.message.clone())
    }
}

impl From<Status> for ConnectorError {
    fn from(status: Status) -> Self {
        ConnectorError::from_status(&status)
    }
}

impl From<&Status> for ConnectorError {
    fn from(status: &Status) -> Self {
        ConnectorError::from_status(status)
    }
}

impl From<ObserverError> for ConnectorError {
    fn from(err: ObserverError) -> Self {
        ConnectorError::from_status(&err.to_status())
    }
}
