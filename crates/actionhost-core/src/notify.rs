//! Process-wide notification hook for failures that cannot be propagated.
//!
//! Destructors and plugin-invoked callbacks have nobody to return an error to.
//! They report through [`default_error_handler`], which logs by default and
//! can be replaced with [`set_default_error_handler`].

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use actionhost_plugin_sdk::boundary::panic_message;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::{error, warn};

use crate::error::{ErrorCode, LogicErrc};
use crate::plugin::BoxError;

type Handler = Arc<dyn Fn(&str, ErrorCode) + Send + Sync>;

static HANDLER: Lazy<RwLock<Option<Handler>>> = Lazy::new(|| RwLock::new(None));

/// Replace the hook for the whole process.
pub fn set_default_error_handler<F>(handler: F)
where
    F: Fn(&str, ErrorCode) + Send + Sync + 'static,
{
    *HANDLER.write() = Some(Arc::new(handler));
}

/// Restore the logging hook.
pub fn reset_default_error_handler() {
    *HANDLER.write() = None;
}

/// Report a failure through the current hook.
pub fn default_error_handler(message: &str, code: ErrorCode) {
    // Cloned out so the hook may itself replace the handler.
    let handler = HANDLER.read().clone();
    match handler {
        Some(handler) => {
            let result =
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(message, code)));
            if result.is_err() {
                log_error(message, code);
            }
        }
        None => log_error(message, code),
    }
}

/// Run a user callback invoked by the plugin. A panic becomes an error
/// carrying the panic message.
pub(crate) fn run_callback<F>(name: &str, callback: F) -> Result<(), BoxError>
where
    F: FnOnce() -> Result<(), BoxError>,
{
    std::panic::catch_unwind(AssertUnwindSafe(callback)).unwrap_or_else(|panic| {
        let message = panic_message(panic.as_ref());
        warn!(callback = name, panic = %message, "callback panicked");
        Err(message.into())
    })
}

/// Hand a callback failure to `on_error`, or to the hook when there is none
/// or it panics itself.
pub(crate) fn report_callback_failure(
    on_error: Option<&(dyn Fn(BoxError) + Send + Sync)>,
    failure: BoxError,
) {
    let code = ErrorCode::Logic(LogicErrc::CallbackException);
    let Some(on_error) = on_error else {
        default_error_handler(&failure.to_string(), code);
        return;
    };
    let message = failure.to_string();
    if std::panic::catch_unwind(AssertUnwindSafe(|| on_error(failure))).is_err() {
        default_error_handler(&message, code);
    }
}

fn log_error(message: &str, code: ErrorCode) {
    error!(
        category = %code.category(),
        code = ?code,
        "{}: {}",
        code.message(),
        message
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_handler_replacement() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        set_default_error_handler(move |message, code| {
            sink.lock().push((message.to_string(), code));
        });

        default_error_handler("boom", ErrorCode::Logic(LogicErrc::CallbackException));
        reset_default_error_handler();
        default_error_handler("logged only", ErrorCode::Logic(LogicErrc::Unknown));

        assert_eq!(
            *seen.lock(),
            vec![(
                "boom".to_string(),
                ErrorCode::Logic(LogicErrc::CallbackException)
            )]
        );
    }

    #[test]
    fn test_panicking_callback_becomes_error() {
        let result = run_callback("test", || panic!("callback blew up"));
        assert_eq!(result.unwrap_err().to_string(), "callback blew up");

        assert!(run_callback("test", || Ok(())).is_ok());
        let result = run_callback("test", || Err("plain failure".into()));
        assert_eq!(result.unwrap_err().to_string(), "plain failure");
    }

    #[test]
    fn test_failure_prefers_error_handler() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let on_error = move |e: BoxError| sink.lock().push(e.to_string());

        report_callback_failure(Some(&on_error), "handled".into());
        assert_eq!(*seen.lock(), vec!["handled".to_string()]);
    }
}
