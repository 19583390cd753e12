use std::{error::Error, sync::Arc};

use serde::{Deserialize, Serialize};
use tower::timeout::error::Elapsed;

use crate::ServiceError;

/// The error type of the [`ProtocolError`].
///
/// This is the closed set of outcomes a call can terminate with, other than
/// success.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolErrorType {
    /// Malformed or out-of-domain input. Never retried.
    InvalidArgument,
    /// The identifier (or method) has no corresponding record.
    NotFound,
    /// Store, transport or task failure.
    Internal,
    /// The caller's deadline elapsed before the call produced its outcome.
    DeadlineExceeded,
    /// The caller aborted the call.
    Cancelled,
}

/// A "one size fits all" error type for the protocol.
/// Contains a shared error, and the error type.
///
/// The error is reference counted so the same terminal outcome can be
/// observed by both ends of a call.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{error}")]
pub struct ProtocolError {
    pub error_type: ProtocolErrorType,
    #[source]
    pub error: Arc<dyn Error + Send + Sync + 'static>,
}

impl ProtocolError {
    pub fn new(
        error_type: ProtocolErrorType,
        error: Box<dyn Error + Send + Sync + 'static>,
    ) -> Self {
        Self {
            error_type,
            error: Arc::from(error),
        }
    }

    /// Creates an error from a plain description.
    pub fn with_description(error_type: ProtocolErrorType, description: impl Into<String>) -> Self {
        let description: String = description.into();
        Self::new(error_type, description.into())
    }

    pub fn invalid_argument(description: impl Into<String>) -> Self {
        Self::with_description(ProtocolErrorType::InvalidArgument, description)
    }

    pub fn not_found(description: impl Into<String>) -> Self {
        Self::with_description(ProtocolErrorType::NotFound, description)
    }

    pub fn internal(description: impl Into<String>) -> Self {
        Self::with_description(ProtocolErrorType::Internal, description)
    }

    pub fn deadline_exceeded() -> Self {
        Self::with_description(ProtocolErrorType::DeadlineExceeded, "deadline exceeded")
    }

    pub fn cancelled() -> Self {
        Self::with_description(ProtocolErrorType::Cancelled, "call cancelled by the caller")
    }
}

impl From<ServiceError> for ProtocolError {
    fn from(error: ServiceError) -> Self {
        let error = match error.downcast::<Self>() {
            Ok(e) => return *e,
            Err(e) => e,
        };
        match error.downcast::<Elapsed>() {
            Ok(_) => ProtocolError::deadline_exceeded(),
            Err(e) => ProtocolError::new(ProtocolErrorType::Internal, e),
        }
    }
}

/// A serializable variant of the protocol error.
/// Contains a description of the error and the error type.
#[derive(Clone, Debug, thiserror::Error, Serialize, Deserialize)]
#[error("{description}")]
pub struct SerializableProtocolError {
    pub error_type: ProtocolErrorType,
    pub description: String,
}

impl From<ProtocolError> for SerializableProtocolError {
    fn from(value: ProtocolError) -> Self {
        Self {
            error_type: value.error_type,
            description: value.error.to_string(),
        }
    }
}

impl From<SerializableProtocolError> for ProtocolError {
    fn from(value: SerializableProtocolError) -> Self {
        Self {
            error_type: value.error_type,
            error: Arc::new(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_error_keeps_protocol_error_type() {
        let boxed: ServiceError = Box::new(ProtocolError::not_found("no blog"));
        let error = ProtocolError::from(boxed);
        assert_eq!(error.error_type, ProtocolErrorType::NotFound);
        assert_eq!(error.to_string(), "no blog");
    }

    #[test]
    fn elapsed_timeout_maps_to_deadline_exceeded() {
        let boxed: ServiceError = Box::new(Elapsed::new());
        assert_eq!(
            ProtocolError::from(boxed).error_type,
            ProtocolErrorType::DeadlineExceeded
        );

        let boxed: ServiceError = "socket reset".into();
        assert_eq!(
            ProtocolError::from(boxed).error_type,
            ProtocolErrorType::Internal
        );
    }

    #[test]
    fn serializable_round_trip_keeps_type_and_text() {
        let error = ProtocolError::invalid_argument("Received a negative number : -2");
        let serializable = SerializableProtocolError::from(error);
        let error = ProtocolError::from(serializable);
        assert_eq!(error.error_type, ProtocolErrorType::InvalidArgument);
        assert_eq!(error.to_string(), "Received a negative number : -2");
    }
}
