//! Panic-safe execution of exported functions.
//!
//! Unwinding out of an `extern "C"` function aborts the process, so every
//! export runs its body through [`guard`] or [`guard_value`].

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::abi::{RawErrorDescriptor, RawStatus, Status};
use crate::error::Result;
use crate::error_descriptor;

/// Run `body` and translate its outcome into a status code.
///
/// Errors are written to `err` and mapped through
/// [`PluginError::status`](crate::PluginError::status). A panic becomes
/// [`Status::Fatal`] with the panic message as description.
///
/// # Safety
///
/// `err` must satisfy the requirements of [`error_descriptor::fill`].
pub unsafe fn guard<F>(err: *mut RawErrorDescriptor, body: F) -> RawStatus
where
    F: FnOnce() -> Result<()>,
{
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(())) => Status::Success.raw(),
        Ok(Err(e)) => {
            let status = e.status();
            tracing::debug!(status = %status, error = %e, "plugin call failed");
            // SAFETY: forwarded from the caller.
            unsafe { error_descriptor::fill(err, &e.to_string()) };
            status.raw()
        }
        Err(panic) => {
            let message = format!("panic in plugin: {}", panic_message(panic.as_ref()));
            tracing::error!("{}", message);
            // SAFETY: forwarded from the caller.
            unsafe { error_descriptor::fill(err, &message) };
            Status::Fatal.raw()
        }
    }
}

/// Run `body`, returning `fallback` if it panics.
///
/// Used by exports that have no status channel (accessors, hash, equality).
pub fn guard_value<T, F>(fallback: T, body: F) -> T
where
    F: FnOnce() -> T,
{
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(value) => value,
        Err(panic) => {
            tracing::error!(panic = %panic_message(panic.as_ref()), "panic in plugin accessor");
            fallback
        }
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PluginError;

    #[test]
    fn test_guard_success_and_error() {
        let ok = unsafe { guard(std::ptr::null_mut(), || Ok(())) };
        assert_eq!(ok, Status::Success.raw());

        let mut buffer = [0u8; 64];
        let mut err = RawErrorDescriptor {
            what: buffer.as_mut_ptr().cast(),
            size: buffer.len() as u64,
        };
        let status = unsafe { guard(&mut err, || Err(PluginError::ActionNotFound(4))) };
        assert_eq!(status, Status::ActionNotFound.raw());
        assert!(buffer.starts_with(b"action 4 not found\0"));
    }

    #[test]
    fn test_guard_catches_panic() {
        let status = unsafe {
            guard(std::ptr::null_mut(), || -> Result<()> {
                panic!("exploded");
            })
        };
        assert_eq!(status, Status::Fatal.raw());
        assert_eq!(guard_value(7u64, || panic!("again")), 7);
    }
}
