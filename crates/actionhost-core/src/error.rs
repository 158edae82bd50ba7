//! Host-side error taxonomy.
//!
//! Status codes returned across the boundary are folded into four
//! categories, grouped by who is responsible for the failure:
//!
//! - [`LogicErrc`]: misuse of the contract by either side
//! - [`GenericErrc`]: the environment (allocation, OS, truncation)
//! - [`PluginErrc`]: the plugin domain
//! - [`ActionErrc`]: a single action
//!
//! [`ErrorCode`] is the allocation-free classification used by the `try_*`
//! call forms; [`Error`] adds the text the plugin wrote into the error
//! descriptor.

use std::fmt;
use std::path::PathBuf;

use actionhost_plugin_sdk::{RawStatus, Status};
use serde::Serialize;
use thiserror::Error;

use crate::version::LibraryVersion;

const NO_DESCRIPTION: &str = "(no description available)";
const SEE_DESCRIPTOR: &str = "other error; check descriptor for more information";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicErrc {
    InvalidStatus,
    InvalidArgument,
    CallbackException,
    Unknown,
    Fatal,
}

impl LogicErrc {
    pub fn message(self) -> &'static str {
        match self {
            LogicErrc::InvalidStatus => "invalid status value",
            LogicErrc::InvalidArgument => "invalid argument in plugin call",
            LogicErrc::CallbackException => "exception in user-provided callback",
            LogicErrc::Unknown => "unknown error in plugin call",
            LogicErrc::Fatal => "fatal error in plugin call",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenericErrc {
    NotImplemented,
    Alloc,
    System,
    Truncated,
    Other,
}

impl GenericErrc {
    pub fn message(self) -> &'static str {
        match self {
            GenericErrc::NotImplemented => "feature not implemented",
            GenericErrc::Alloc => "error allocating memory in plugin",
            GenericErrc::System => "system error",
            GenericErrc::Truncated => "input buffer truncated",
            GenericErrc::Other => SEE_DESCRIPTOR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginErrc {
    ActionNotFound,
    PersistencePath,
    Unavailable,
    Other,
}

impl PluginErrc {
    pub fn message(self) -> &'static str {
        match self {
            PluginErrc::ActionNotFound => "action not found",
            PluginErrc::PersistencePath => {
                "bad persistence path (must exist, be a directory and have write permissions)"
            }
            PluginErrc::Unavailable => "request currently not available",
            PluginErrc::Other => SEE_DESCRIPTOR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionErrc {
    Execution,
    Serialization,
    InvalidPayload,
    Other,
}

impl ActionErrc {
    pub fn message(self) -> &'static str {
        match self {
            ActionErrc::Execution => "error during action execution",
            ActionErrc::Serialization => "error during action (de)serialization",
            ActionErrc::InvalidPayload => "invalid payload tag",
            ActionErrc::Other => SEE_DESCRIPTOR,
        }
    }
}

/// Error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Logic,
    Generic,
    Plugin,
    Action,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Logic => "logic",
            Category::Generic => "generic",
            Category::Plugin => "plugin",
            Category::Action => "action",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified failure without any text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "category", content = "code", rename_all = "snake_case")]
pub enum ErrorCode {
    Logic(LogicErrc),
    Generic(GenericErrc),
    Plugin(PluginErrc),
    Action(ActionErrc),
}

impl ErrorCode {
    /// Classification of a non-success status.
    pub fn from_status(status: Status) -> Option<Self> {
        let code = match status {
            Status::Success => return None,
            Status::Unknown => ErrorCode::Logic(LogicErrc::Unknown),
            Status::InvalidStatus => ErrorCode::Logic(LogicErrc::InvalidStatus),
            Status::InvalidArgument => ErrorCode::Logic(LogicErrc::InvalidArgument),
            Status::Fatal => ErrorCode::Logic(LogicErrc::Fatal),
            Status::NotImplemented => ErrorCode::Generic(GenericErrc::NotImplemented),
            Status::Alloc => ErrorCode::Generic(GenericErrc::Alloc),
            Status::System => ErrorCode::Generic(GenericErrc::System),
            Status::Truncated => ErrorCode::Generic(GenericErrc::Truncated),
            Status::Other => ErrorCode::Generic(GenericErrc::Other),
            Status::Unavailable => ErrorCode::Plugin(PluginErrc::Unavailable),
            Status::PersistencePath => ErrorCode::Plugin(PluginErrc::PersistencePath),
            Status::Plugin => ErrorCode::Plugin(PluginErrc::Other),
            Status::ActionNotFound => ErrorCode::Plugin(PluginErrc::ActionNotFound),
            Status::ActionExecution => ErrorCode::Action(ActionErrc::Execution),
            Status::ActionOther => ErrorCode::Action(ActionErrc::Other),
            Status::ActionSerialization => ErrorCode::Action(ActionErrc::Serialization),
            Status::PayloadInvalid => ErrorCode::Action(ActionErrc::InvalidPayload),
        };
        Some(code)
    }

    /// Check a raw status returned by the plugin. Values outside the contract
    /// are reported as [`LogicErrc::InvalidStatus`].
    pub fn check(raw: RawStatus) -> std::result::Result<(), ErrorCode> {
        match Status::from_raw(raw) {
            Some(status) => Self::from_status(status).map_or(Ok(()), Err),
            None => Err(ErrorCode::Logic(LogicErrc::InvalidStatus)),
        }
    }

    /// Status a plugin would return for this classification.
    pub fn status(self) -> Status {
        match self {
            ErrorCode::Logic(LogicErrc::InvalidStatus) => Status::InvalidStatus,
            ErrorCode::Logic(LogicErrc::InvalidArgument) => Status::InvalidArgument,
            ErrorCode::Logic(LogicErrc::CallbackException) => Status::Unknown,
            ErrorCode::Logic(LogicErrc::Unknown) => Status::Unknown,
            ErrorCode::Logic(LogicErrc::Fatal) => Status::Fatal,
            ErrorCode::Generic(GenericErrc::NotImplemented) => Status::NotImplemented,
            ErrorCode::Generic(GenericErrc::Alloc) => Status::Alloc,
            ErrorCode::Generic(GenericErrc::System) => Status::System,
            ErrorCode::Generic(GenericErrc::Truncated) => Status::Truncated,
            ErrorCode::Generic(GenericErrc::Other) => Status::Other,
            ErrorCode::Plugin(PluginErrc::ActionNotFound) => Status::ActionNotFound,
            ErrorCode::Plugin(PluginErrc::PersistencePath) => Status::PersistencePath,
            ErrorCode::Plugin(PluginErrc::Unavailable) => Status::Unavailable,
            ErrorCode::Plugin(PluginErrc::Other) => Status::Plugin,
            ErrorCode::Action(ActionErrc::Execution) => Status::ActionExecution,
            ErrorCode::Action(ActionErrc::Serialization) => Status::ActionSerialization,
            ErrorCode::Action(ActionErrc::InvalidPayload) => Status::PayloadInvalid,
            ErrorCode::Action(ActionErrc::Other) => Status::ActionOther,
        }
    }

    pub fn category(self) -> Category {
        match self {
            ErrorCode::Logic(_) => Category::Logic,
            ErrorCode::Generic(_) => Category::Generic,
            ErrorCode::Plugin(_) => Category::Plugin,
            ErrorCode::Action(_) => Category::Action,
        }
    }

    /// Fixed text of the code.
    pub fn message(self) -> &'static str {
        match self {
            ErrorCode::Logic(c) => c.message(),
            ErrorCode::Generic(c) => c.message(),
            ErrorCode::Plugin(c) => c.message(),
            ErrorCode::Action(c) => c.message(),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.category(), self.message())
    }
}

impl From<LogicErrc> for ErrorCode {
    fn from(code: LogicErrc) -> Self {
        ErrorCode::Logic(code)
    }
}

impl From<GenericErrc> for ErrorCode {
    fn from(code: GenericErrc) -> Self {
        ErrorCode::Generic(code)
    }
}

impl From<PluginErrc> for ErrorCode {
    fn from(code: PluginErrc) -> Self {
        ErrorCode::Plugin(code)
    }
}

impl From<ActionErrc> for ErrorCode {
    fn from(code: ActionErrc) -> Self {
        ErrorCode::Action(code)
    }
}

/// A classified failure plus the text the plugin reported, if any.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    Logic {
        code: LogicErrc,
        message: Option<String>,
    },
    Generic {
        code: GenericErrc,
        message: Option<String>,
    },
    Plugin {
        code: PluginErrc,
        message: Option<String>,
    },
    Action {
        code: ActionErrc,
        message: Option<String>,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            self.code().message(),
            self.message().unwrap_or(NO_DESCRIPTION)
        )
    }
}

impl Error {
    pub fn new(code: impl Into<ErrorCode>, message: Option<String>) -> Self {
        match code.into() {
            ErrorCode::Logic(code) => Error::Logic { code, message },
            ErrorCode::Generic(code) => Error::Generic { code, message },
            ErrorCode::Plugin(code) => Error::Plugin { code, message },
            ErrorCode::Action(code) => Error::Action { code, message },
        }
    }

    pub fn with_message(code: impl Into<ErrorCode>, message: impl Into<String>) -> Self {
        Self::new(code, Some(message.into()))
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Logic { code, .. } => ErrorCode::Logic(*code),
            Error::Generic { code, .. } => ErrorCode::Generic(*code),
            Error::Plugin { code, .. } => ErrorCode::Plugin(*code),
            Error::Action { code, .. } => ErrorCode::Action(*code),
        }
    }

    pub fn category(&self) -> Category {
        self.code().category()
    }

    /// Text reported by the plugin, `None` when it wrote none.
    pub fn message(&self) -> Option<&str> {
        match self {
            Error::Logic { message, .. }
            | Error::Generic { message, .. }
            | Error::Plugin { message, .. }
            | Error::Action { message, .. } => message.as_deref(),
        }
    }
}

impl From<ErrorCode> for Error {
    fn from(code: ErrorCode) -> Self {
        Error::new(code, None)
    }
}

/// Host result type
pub type Result<T> = std::result::Result<T, Error>;

/// Failure to load a module.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot open module {}: {source}", path.display())]
    System {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("incompatible module: host implements {current}, module implements {found}")]
    Incompatible {
        current: LibraryVersion,
        found: LibraryVersion,
    },

    #[error("cannot resolve function {name}: {source}")]
    FunctionLoad {
        name: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_failure_status_is_classified() {
        for status in Status::ALL {
            match ErrorCode::from_status(status) {
                None => assert_eq!(status, Status::Success),
                Some(code) => {
                    assert_ne!(status, Status::Success);
                    assert_eq!(code.status(), status, "{code:?}");
                }
            }
        }
    }

    #[test]
    fn test_check_rejects_unknown_raw_values() {
        assert_eq!(ErrorCode::check(0), Ok(()));
        assert_eq!(
            ErrorCode::check(9_999),
            Err(ErrorCode::Logic(LogicErrc::InvalidStatus))
        );
        assert_eq!(
            ErrorCode::check(Status::ActionNotFound.raw()),
            Err(ErrorCode::Plugin(PluginErrc::ActionNotFound))
        );
    }

    #[test]
    fn test_error_display() {
        let err = Error::with_message(ActionErrc::Execution, "execution error of action 3");
        assert_eq!(
            err.to_string(),
            "error during action execution: execution error of action 3"
        );
        assert_eq!(err.category(), Category::Action);

        let err = Error::from(ErrorCode::Plugin(PluginErrc::Unavailable));
        assert_eq!(
            err.to_string(),
            "request currently not available: (no description available)"
        );
        assert_eq!(err.message(), None);
    }

    #[test]
    fn test_error_code_serializes_with_category() {
        let json = serde_json::to_string(&ErrorCode::Logic(LogicErrc::CallbackException)).unwrap();
        assert_eq!(json, r#"{"category":"logic","code":"callback_exception"}"#);
    }
}
