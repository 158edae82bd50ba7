//! Plugin error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::abi::Status;

/// Failure raised inside a plugin, converted to a [`Status`] at the boundary.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0}")]
    NotImplemented(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("bad persistence path {}: {reason}", path.display())]
    PersistencePath { path: PathBuf, reason: String },

    #[error("action {0} not found")]
    ActionNotFound(u64),

    #[error("action {0} already exists")]
    ActionExists(u64),

    #[error("{0}")]
    Execution(String),

    #[error("{0}")]
    Serialization(String),

    #[error("{0}")]
    InvalidPayload(String),

    #[error("system error: {0}")]
    System(#[from] std::io::Error),

    #[error("{0}")]
    Fatal(String),

    #[error("{0}")]
    Other(String),
}

impl PluginError {
    /// Status code reported to the host for this failure.
    pub fn status(&self) -> Status {
        match self {
            PluginError::InvalidArgument(_) => Status::InvalidArgument,
            PluginError::NotImplemented(_) => Status::NotImplemented,
            PluginError::Unavailable(_) => Status::Unavailable,
            PluginError::PersistencePath { .. } => Status::PersistencePath,
            PluginError::ActionNotFound(_) => Status::ActionNotFound,
            PluginError::ActionExists(_) => Status::Plugin,
            PluginError::Execution(_) => Status::ActionExecution,
            PluginError::Serialization(_) => Status::ActionSerialization,
            PluginError::InvalidPayload(_) => Status::PayloadInvalid,
            PluginError::System(_) => Status::System,
            PluginError::Fatal(_) => Status::Fatal,
            PluginError::Other(_) => Status::Other,
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        PluginError::InvalidArgument(message.into())
    }
}

/// Plugin result type
pub type Result<T> = std::result::Result<T, PluginError>;
