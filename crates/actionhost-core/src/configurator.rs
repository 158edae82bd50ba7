//! Configuration sessions driven from the host.
//!
//! A configurator allows one session at a time. Starting while a session is
//! still running fails immediately with [`PluginErrc::Unavailable`]; the
//! running session is not affected.
//!
//! [`PluginConfiguratorAsync`] may carry a completion callback. It runs on the
//! plugin's configuration thread before the session is marked finished, so it
//! must not wait on its own configurator.

use std::ffi::c_void;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use actionhost_plugin_sdk::{ConfigStatus, RawConfigStatus, RawStatus};
use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::call;
use crate::error::{Error, ErrorCode, LogicErrc, PluginErrc, Result};
use crate::error_descriptor::ErrorDescriptor;
use crate::notify;
use crate::plugin::{BoxError, ConfigureMode, Plugin};

/// Receives the outcome of an asynchronous configuration session.
pub type ConfigCallback =
    Box<dyn Fn(Result<ConfigStatus>) -> std::result::Result<(), BoxError> + Send + Sync>;

/// Receives failures of a [`ConfigCallback`].
pub type ConfigErrorCallback = Box<dyn Fn(BoxError) + Send + Sync>;

#[derive(Default)]
struct Session {
    in_progress: AtomicBool,
    outcome: Mutex<Option<std::result::Result<ConfigStatus, ErrorCode>>>,
    ready: Condvar,
    on_finish: Option<ConfigCallback>,
    on_error: Option<ConfigErrorCallback>,
}

impl Session {
    /// Hand the outcome to the user callback. A failing callback turns the
    /// session outcome into a callback exception.
    fn deliver(
        &self,
        outcome: std::result::Result<ConfigStatus, ErrorCode>,
    ) -> std::result::Result<ConfigStatus, ErrorCode> {
        let Some(on_finish) = &self.on_finish else {
            return outcome;
        };
        match notify::run_callback("configuration", || on_finish(outcome.map_err(Error::from))) {
            Ok(()) => outcome,
            Err(e) => {
                notify::report_callback_failure(self.on_error.as_deref(), e);
                Err(ErrorCode::Logic(LogicErrc::CallbackException))
            }
        }
    }

    fn begin(&self) -> std::result::Result<(), ErrorCode> {
        self.in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| ErrorCode::Plugin(PluginErrc::Unavailable))?;
        *self.outcome.lock() = None;
        Ok(())
    }

    fn complete(&self, outcome: std::result::Result<ConfigStatus, ErrorCode>) {
        let mut slot = self.outcome.lock();
        *slot = Some(outcome);
        self.in_progress.store(false, Ordering::Release);
        self.ready.notify_all();
    }

    fn abandon(&self) {
        self.in_progress.store(false, Ordering::Release);
    }

    fn is_running(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Block until no session is running and return the last outcome.
    fn wait(&self) -> Option<std::result::Result<ConfigStatus, ErrorCode>> {
        let mut slot = self.outcome.lock();
        while self.is_running() {
            self.ready.wait(&mut slot);
        }
        *slot
    }

    fn wait_for(&self, timeout: Duration) -> bool {
        let mut slot = self.outcome.lock();
        if self.is_running() {
            self.ready.wait_while_for(&mut slot, |_| self.is_running(), timeout);
        }
        !self.is_running()
    }
}

/// Starts sessions on a plugin and delivers their outcome to a [`Session`].
struct SessionDriver {
    plugin: Plugin,
    mode: ConfigureMode,
    session: Arc<Session>,
}

impl SessionDriver {
    fn new(plugin: Plugin, mode: ConfigureMode) -> Self {
        Self::with_session(plugin, mode, Session::default())
    }

    fn with_session(plugin: Plugin, mode: ConfigureMode, session: Session) -> Self {
        Self {
            plugin,
            mode,
            session: Arc::new(session),
        }
    }

    fn try_start(&self, descriptor: &mut ErrorDescriptor) -> std::result::Result<(), ErrorCode> {
        if let Err(code) = self.session.begin() {
            descriptor.write("configuration already in progress");
            return Err(code);
        }

        let token = Arc::into_raw(Arc::clone(&self.session)).cast_mut().cast::<c_void>();
        // SAFETY: the token is a strong reference reclaimed exactly once,
        // either by the completion trampoline or below.
        let started = unsafe {
            self.plugin
                .try_configure_raw(self.mode, on_config_finished, token, descriptor)
        };
        match started {
            Ok(()) => debug!(mode = ?self.mode, "configuration started"),
            Err(_) => {
                // SAFETY: the plugin rejected the call and will never invoke the callback.
                unsafe { drop(Arc::from_raw(token.cast_const().cast::<Session>())) };
                self.session.abandon();
            }
        }
        started
    }
}

/// Runs a configuration session to completion.
pub struct PluginConfigurator {
    driver: SessionDriver,
}

impl PluginConfigurator {
    /// Configurator using the plugin's command-line front end.
    pub fn cli(plugin: Plugin) -> Self {
        Self {
            driver: SessionDriver::new(plugin, ConfigureMode::Cli),
        }
    }

    /// Configurator using the plugin's graphical front end.
    pub fn gui(plugin: Plugin) -> Self {
        Self {
            driver: SessionDriver::new(plugin, ConfigureMode::Gui),
        }
    }

    pub fn mode(&self) -> ConfigureMode {
        self.driver.mode
    }

    /// Start a session and block until the plugin reports its outcome.
    pub fn configure(&self) -> Result<ConfigStatus> {
        call::rich(|descriptor| self.try_configure(descriptor))
    }

    pub fn try_configure(
        &self,
        descriptor: &mut ErrorDescriptor,
    ) -> std::result::Result<ConfigStatus, ErrorCode> {
        self.driver.try_start(descriptor)?;
        self.driver
            .session
            .wait()
            .unwrap_or(Err(ErrorCode::Logic(LogicErrc::Unknown)))
    }
}

/// Starts a configuration session and lets the caller collect the outcome
/// later. Dropping the configurator waits for a running session.
pub struct PluginConfiguratorAsync {
    driver: SessionDriver,
}

impl PluginConfiguratorAsync {
    pub fn cli(plugin: Plugin) -> Self {
        Self {
            driver: SessionDriver::new(plugin, ConfigureMode::Cli),
        }
    }

    pub fn gui(plugin: Plugin) -> Self {
        Self {
            driver: SessionDriver::new(plugin, ConfigureMode::Gui),
        }
    }

    /// Configurator whose sessions report to `on_finish` as well. Failures of
    /// the callback go to the notification hook.
    pub fn with_callback<F>(plugin: Plugin, mode: ConfigureMode, on_finish: F) -> Self
    where
        F: Fn(Result<ConfigStatus>) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        Self::build(plugin, mode, Box::new(on_finish), None)
    }

    pub fn with_error_handler<F, E>(
        plugin: Plugin,
        mode: ConfigureMode,
        on_finish: F,
        on_error: E,
    ) -> Self
    where
        F: Fn(Result<ConfigStatus>) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
        E: Fn(BoxError) + Send + Sync + 'static,
    {
        Self::build(plugin, mode, Box::new(on_finish), Some(Box::new(on_error)))
    }

    fn build(
        plugin: Plugin,
        mode: ConfigureMode,
        on_finish: ConfigCallback,
        on_error: Option<ConfigErrorCallback>,
    ) -> Self {
        let session = Session {
            on_finish: Some(on_finish),
            on_error,
            ..Session::default()
        };
        Self {
            driver: SessionDriver::with_session(plugin, mode, session),
        }
    }

    pub fn mode(&self) -> ConfigureMode {
        self.driver.mode
    }

    /// Start a session without waiting for it.
    pub fn start(&self) -> Result<()> {
        call::rich(|descriptor| self.try_start(descriptor))
    }

    pub fn try_start(&self, descriptor: &mut ErrorDescriptor) -> std::result::Result<(), ErrorCode> {
        self.driver.try_start(descriptor)
    }

    pub fn is_running(&self) -> bool {
        self.driver.session.is_running()
    }

    /// Block until the current session finishes. `None` if no session was
    /// ever started.
    pub fn wait(&self) -> Option<Result<ConfigStatus>> {
        self.driver
            .session
            .wait()
            .map(|outcome| outcome.map_err(Error::from))
    }

    /// Like [`PluginConfiguratorAsync::wait`] with an upper bound. Returns
    /// whether the session finished in time.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.driver.session.wait_for(timeout)
    }
}

impl Drop for PluginConfiguratorAsync {
    fn drop(&mut self) {
        self.driver.session.wait();
    }
}

unsafe extern "C" fn on_config_finished(
    status: RawStatus,
    config: RawConfigStatus,
    user_data: *mut c_void,
) {
    // SAFETY: `user_data` is the token created in `SessionDriver::try_start`.
    let session = unsafe { Arc::from_raw(user_data.cast_const().cast::<Session>()) };
    let outcome = ErrorCode::check(status)
        .map(|()| ConfigStatus::from_raw(config).unwrap_or(ConfigStatus::Cancel));
    debug!(?outcome, "configuration finished");
    let outcome = session.deliver(outcome);
    session.complete(outcome);
}
