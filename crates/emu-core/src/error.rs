//! Unified error type for the messaging engine.
//!
//! Mirrors the error kinds spec'd for the wire protocol (see the server
//! crate's `wire::error` for the XML/HTTP status mapping); this type only
//! carries engine-level meaning.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Invalid parameter value: {0}")]
    InvalidParameterValue(String),

    #[error("The specified queue does not exist: {0}")]
    QueueDoesNotExist(String),

    #[error("A queue named '{0}' already exists with different attributes")]
    QueueAlreadyExists(String),

    #[error("A queue named '{0}' already exists with a conflicting FIFO setting")]
    QueueNameExists(String),

    #[error("Topic not found: {0}")]
    TopicNotFound(String),

    #[error("The receipt handle is invalid: {0}")]
    ReceiptHandleIsInvalid(String),

    #[error("Message body exceeds the queue's maximum message size of {limit} bytes")]
    MessageTooLong { limit: u64 },

    #[error("Unknown action: {0}")]
    InvalidAction(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// The cloud-service error code string used in XML error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidParameterValue(_) => "InvalidParameterValue",
            EngineError::QueueDoesNotExist(_) => "QueueDoesNotExist",
            EngineError::QueueAlreadyExists(_) => "QueueAlreadyExists",
            EngineError::QueueNameExists(_) => "QueueNameExists",
            EngineError::TopicNotFound(_) => "TopicNotFound",
            EngineError::ReceiptHandleIsInvalid(_) => "ReceiptHandleIsInvalid",
            EngineError::MessageTooLong { .. } => "MessageTooLong",
            EngineError::InvalidAction(_) => "InvalidAction",
            EngineError::Internal(_) => "InternalError",
        }
    }

    /// HTTP status spec.md §7 maps this kind to.
    pub fn status(&self) -> u16 {
        match self {
            EngineError::Internal(_) => 500,
            _ => 400,
        }
    }
}
