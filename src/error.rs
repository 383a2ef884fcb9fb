//! Node error type and its mapping onto wire error codes.

use thiserror::Error;

use crate::network::message::ErrorCode;

/// Errors raised while handling a message or running the node.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Malformed request: {0}")]
    Malformed(String),

    #[error("Unsupported message type: {0}")]
    NotSupported(String),

    #[error("Node has not received init")]
    NotInitialized,

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl NodeError {
    /// Wire error code reported to the requester.
    pub fn code(&self) -> ErrorCode {
        match self {
            NodeError::Malformed(_) | NodeError::Json(_) => ErrorCode::MalformedRequest,
            NodeError::NotSupported(_) => ErrorCode::NotSupported,
            NodeError::NotInitialized | NodeError::Transport(_) => {
                ErrorCode::TemporarilyUnavailable
            }
            NodeError::Config(_) | NodeError::Io(_) => ErrorCode::Crash,
        }
    }
}

pub type Result<T> = std::result::Result<T, NodeError>;
