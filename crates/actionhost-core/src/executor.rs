//! Asynchronous action execution with completion tracking.
//!
//! Every accepted submission hands the plugin one strong reference to the
//! executor state as user data; the completion trampoline takes it back. The
//! state therefore outlives every outstanding call, and dropping the executor
//! waits until all of them have completed.

use std::ffi::c_void;
use std::sync::Arc;

use actionhost_plugin_sdk::boundary::panic_message;
use actionhost_plugin_sdk::{RawStatus, StringView};
use parking_lot::{Condvar, Mutex, RwLock};
use tracing::warn;

use crate::action::Action;
use crate::call;
use crate::error::{Error, ErrorCode, Result};
use crate::error_descriptor::ErrorDescriptor;
use crate::notify;
use crate::payload::Payload;
use crate::plugin::BoxError;

/// Receives the outcome of each submission.
pub type FinishCallback = Box<dyn Fn(Result<()>) -> std::result::Result<(), BoxError> + Send + Sync>;

/// Receives failures of the [`FinishCallback`].
pub type ExecutorErrorCallback = Box<dyn Fn(BoxError) + Send + Sync>;

struct ExecutorState {
    outstanding: Mutex<usize>,
    idle: Condvar,
    /// Set when the executor starts dropping; held for reading while a user
    /// callback runs.
    cancelled: RwLock<bool>,
    on_finish: FinishCallback,
    on_error: Option<ExecutorErrorCallback>,
}

impl ExecutorState {
    fn deliver(&self, outcome: Result<()>) {
        let cancelled = self.cancelled.read();
        if *cancelled {
            return;
        }
        if let Err(e) = notify::run_callback("execution", || (self.on_finish)(outcome)) {
            notify::report_callback_failure(self.on_error.as_deref(), e);
        }
    }

    fn finish_one(&self) {
        let mut outstanding = self.outstanding.lock();
        *outstanding = outstanding.saturating_sub(1);
        if *outstanding == 0 {
            self.idle.notify_all();
        }
    }
}

/// Submits payloads to one action and tracks their completion.
pub struct ActionExecutor {
    action: Action,
    state: Arc<ExecutorState>,
}

impl ActionExecutor {
    pub fn new<F>(action: Action, on_finish: F) -> Self
    where
        F: Fn(Result<()>) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        Self::build(action, Box::new(on_finish), None)
    }

    /// Like [`ActionExecutor::new`], with a handler for failures of
    /// `on_finish` instead of the notification hook.
    pub fn with_error_handler<F, E>(action: Action, on_finish: F, on_error: E) -> Self
    where
        F: Fn(Result<()>) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
        E: Fn(BoxError) + Send + Sync + 'static,
    {
        Self::build(action, Box::new(on_finish), Some(Box::new(on_error)))
    }

    fn build(
        action: Action,
        on_finish: FinishCallback,
        on_error: Option<ExecutorErrorCallback>,
    ) -> Self {
        Self {
            action,
            state: Arc::new(ExecutorState {
                outstanding: Mutex::new(0),
                idle: Condvar::new(),
                cancelled: RwLock::new(false),
                on_finish,
                on_error,
            }),
        }
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    /// Submit one payload. On `Ok` the finish callback runs exactly once.
    pub fn submit<'a>(&self, payload: impl Into<Payload<'a>>) -> Result<()> {
        let payload = payload.into();
        call::rich(|descriptor| self.try_submit(payload, descriptor))
    }

    pub fn try_submit(
        &self,
        payload: Payload<'_>,
        descriptor: &mut ErrorDescriptor,
    ) -> std::result::Result<(), ErrorCode> {
        *self.state.outstanding.lock() += 1;
        let token = Arc::into_raw(Arc::clone(&self.state)).cast_mut().cast::<c_void>();

        // SAFETY: the token is a strong reference reclaimed exactly once,
        // either by the completion trampoline or below.
        let issued = unsafe {
            self.action
                .try_execute_async(payload, on_action_finished, token, descriptor)
        };
        if issued.is_err() {
            // SAFETY: the plugin rejected the call and will never invoke the callback.
            unsafe { drop(Arc::from_raw(token.cast_const().cast::<ExecutorState>())) };
            self.state.finish_one();
        }
        issued
    }

    /// Submissions whose callback has not run yet.
    pub fn outstanding(&self) -> usize {
        *self.state.outstanding.lock()
    }

    /// Block until every submission has completed. Must not be called from
    /// inside the finish callback.
    pub fn wait(&self) {
        let mut outstanding = self.state.outstanding.lock();
        while *outstanding > 0 {
            self.state.idle.wait(&mut outstanding);
        }
    }
}

impl Drop for ActionExecutor {
    fn drop(&mut self) {
        *self.state.cancelled.write() = true;
        self.wait();
    }
}

unsafe extern "C" fn on_action_finished(status: RawStatus, message: StringView, user_data: *mut c_void) {
    // SAFETY: `user_data` is the token created in `try_submit`.
    let state = unsafe { Arc::from_raw(user_data.cast_const().cast::<ExecutorState>()) };
    let outcome = ErrorCode::check(status).map_err(|code| {
        // SAFETY: the message is valid for the duration of the callback.
        let text = unsafe { message.to_string_lossy() };
        Error::new(code, (!text.is_empty()).then_some(text))
    });

    // Only a panic escaping the hook itself lands here.
    let delivered =
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| state.deliver(outcome)));
    if let Err(panic) = delivered {
        warn!(panic = %panic_message(panic.as_ref()), "execution callback panicked");
    }
    state.finish_one();
}
