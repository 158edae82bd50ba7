//! Shape shared by every call through the function table.

use actionhost_plugin_sdk::{RawErrorDescriptor, RawStatus};

use crate::error::{Error, ErrorCode, Result};
use crate::error_descriptor::ErrorDescriptor;
use crate::notify;

/// Call `f` with a fresh descriptor and turn a failure into an [`Error`]
/// carrying the text the plugin wrote.
pub(crate) fn invoke(f: impl FnOnce(*mut RawErrorDescriptor) -> RawStatus) -> Result<()> {
    rich(|descriptor| try_invoke(descriptor, f))
}

/// Call `f` with the caller's descriptor. Never allocates.
pub(crate) fn try_invoke(
    descriptor: &mut ErrorDescriptor,
    f: impl FnOnce(*mut RawErrorDescriptor) -> RawStatus,
) -> std::result::Result<(), ErrorCode> {
    descriptor.clear();
    ErrorCode::check(descriptor.with_raw(f))
}

/// Route the outcome of a destroy/release call to the notification hook.
pub(crate) fn release(what: &str, outcome: std::result::Result<(), ErrorCode>) {
    if let Err(code) = outcome {
        notify::default_error_handler(&format!("failed to release {what}"), code);
    }
}

/// Rich form of a `try_*` operation: run it with a fresh descriptor and
/// attach the descriptor text to the failure.
pub(crate) fn rich<T>(
    f: impl FnOnce(&mut ErrorDescriptor) -> std::result::Result<T, ErrorCode>,
) -> Result<T> {
    let mut descriptor = ErrorDescriptor::new();
    f(&mut descriptor).map_err(|code| Error::new(code, descriptor.message()))
}
