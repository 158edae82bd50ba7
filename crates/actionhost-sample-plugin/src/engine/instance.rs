//! A running plugin instance and its background threads.
//!
//! Each instance owns:
//! - a scripted mutation thread that adds ten actions and removes the first
//!   five again, generating add/remove traffic towards the host;
//! - a configuration worker implementing the plugin half of the
//!   single-flight handshake;
//! - the completion threads of outstanding asynchronous executions.
//!
//! Dropping the instance asks the worker to stop and joins every thread.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use actionhost_plugin_sdk::abi::PayloadValue;
use actionhost_plugin_sdk::{boundary, BinarySemaphore, ConfigStatus, PluginError, Result};
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::action::{Action, ActionId, ActionInfo, IdGenerator};
use super::registry::{ActionRegistry, Notifications};
use crate::config;

/// Receives the outcome of a configuration session exactly once.
pub type ConfigureCallback = Box<dyn FnOnce(Result<ConfigStatus>) + Send>;

/// Receives the outcome of an asynchronous execution exactly once.
pub type CompletionCallback = Box<dyn FnOnce(Result<()>) + Send>;

/// Destination of the text written by executed actions.
#[derive(Clone)]
pub struct ExecutionLog(Arc<Mutex<Box<dyn Write + Send>>>);

impl ExecutionLog {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self(Arc::new(Mutex::new(Box::new(writer))))
    }

    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl std::fmt::Debug for ExecutionLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ExecutionLog")
    }
}

/// Tunables of an instance.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// How long a simulated configuration session takes.
    pub configure_delay: Duration,
    /// Whether to start the scripted mutation thread.
    pub scripted_mutations: bool,
    pub log: ExecutionLog,
}

impl EngineOptions {
    /// Defaults, with the configuration delay taken from the environment.
    pub fn from_env() -> Self {
        Self {
            configure_delay: config::env_vars::configure_delay(),
            ..Self::default()
        }
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            configure_delay: Duration::from_millis(config::DEFAULT_CONFIGURE_DELAY_MS),
            scripted_mutations: true,
            log: ExecutionLog::stdout(),
        }
    }
}

/// Validated creation parameters.
#[derive(Debug)]
pub struct PluginSettings {
    pub persistence_path: PathBuf,
    pub notifications: Notifications,
}

/// The persistence directory must exist, be a directory and be writable by its owner.
pub fn validate_persistence_path(path: &Path) -> Result<()> {
    let bad = |reason: String| PluginError::PersistencePath {
        path: path.to_path_buf(),
        reason,
    };
    let metadata =
        std::fs::metadata(path).map_err(|e| bad(format!("cannot be accessed: {e}")))?;
    if !metadata.is_dir() {
        return Err(bad("is not a directory".to_string()));
    }
    if !owner_writable(&metadata) {
        return Err(bad("is not writable".to_string()));
    }
    Ok(())
}

#[cfg(unix)]
fn owner_writable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o200 != 0
}

#[cfg(not(unix))]
fn owner_writable(metadata: &std::fs::Metadata) -> bool {
    !metadata.permissions().readonly()
}

fn expect_int32(payload: PayloadValue<'_>) -> Result<i32> {
    match payload {
        PayloadValue::Int32(value) => Ok(value),
        _ => Err(PluginError::InvalidPayload(
            "Payload must be a 32-bit signed integer".to_string(),
        )),
    }
}

// ============================================================================
// Shared state
// ============================================================================

struct Shared {
    registry: ActionRegistry,
    ids: Arc<IdGenerator>,
    log: ExecutionLog,
    configure_delay: Duration,
    /// Wakes the configuration worker.
    start: BinarySemaphore,
    /// Available while no session is in flight.
    idle: BinarySemaphore,
    pending: Mutex<Option<ConfigureCallback>>,
    stop: AtomicBool,
}

impl Shared {
    fn execute(&self, id: ActionId, value: i32) -> Result<()> {
        let mut log = self.log.0.lock();
        self.registry.execute(id, value, &mut **log)
    }
}

/// A live plugin instance.
pub struct PluginInstance {
    shared: Arc<Shared>,
    persistence_path: PathBuf,
    mutator: Mutex<Option<JoinHandle<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    completions: Mutex<Vec<JoinHandle<()>>>,
}

impl PluginInstance {
    /// Validate `settings` and start the background threads.
    pub fn new(
        settings: PluginSettings,
        ids: Arc<IdGenerator>,
        options: &EngineOptions,
    ) -> Result<Self> {
        validate_persistence_path(&settings.persistence_path)?;

        let shared = Arc::new(Shared {
            registry: ActionRegistry::new(settings.notifications),
            ids,
            log: options.log.clone(),
            configure_delay: options.configure_delay,
            start: BinarySemaphore::new(false),
            idle: BinarySemaphore::new(true),
            pending: Mutex::new(None),
            stop: AtomicBool::new(false),
        });

        let worker = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("ahp-configure".into())
                .spawn(move || configuration_worker(shared))?
        };

        let instance = Self {
            shared,
            persistence_path: settings.persistence_path,
            mutator: Mutex::new(None),
            worker: Mutex::new(Some(worker)),
            completions: Mutex::new(Vec::new()),
        };

        if options.scripted_mutations {
            let shared = Arc::clone(&instance.shared);
            let mutator = thread::Builder::new()
                .name("ahp-mutations".into())
                .spawn(move || scripted_mutations(shared))?;
            *instance.mutator.lock() = Some(mutator);
        }

        debug!(path = %instance.persistence_path.display(), "plugin instance started");
        Ok(instance)
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.shared.registry
    }

    pub fn persistence_path(&self) -> &Path {
        &self.persistence_path
    }

    /// Block until the scripted mutation thread has finished.
    pub fn wait_scripted_mutations(&self) {
        let handle = self.mutator.lock().take();
        if let Some(handle) = handle {
            join_quietly(handle, "mutation");
        }
    }

    /// Execute action `id` synchronously.
    pub fn execute(&self, id: ActionId, payload: PayloadValue<'_>) -> Result<()> {
        let value = expect_int32(payload)?;
        self.shared.execute(id, value)
    }

    /// Execute action `id` on a background thread.
    ///
    /// On `Ok` the callback runs exactly once with the outcome. On `Err` it is
    /// dropped without being called.
    pub fn execute_async(
        &self,
        id: ActionId,
        payload: PayloadValue<'_>,
        done: CompletionCallback,
    ) -> Result<()> {
        let value = expect_int32(payload)?;
        if !self.shared.registry.contains(id) {
            return Err(PluginError::ActionNotFound(id));
        }

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("ahp-execute".into())
            .spawn(move || {
                let outcome = shared.execute(id, value);
                if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    done(outcome)
                })) {
                    warn!(
                        action_id = id,
                        panic = %boundary::panic_message(panic.as_ref()),
                        "completion callback panicked"
                    );
                }
            })?;

        let mut completions = self.completions.lock();
        completions.retain(|handle| !handle.is_finished());
        completions.push(handle);
        Ok(())
    }

    /// Start a configuration session.
    ///
    /// Fails with [`PluginError::Unavailable`] without blocking when a session
    /// is already in flight.
    pub fn configure(&self, callback: ConfigureCallback) -> Result<()> {
        if !self.shared.idle.try_acquire() {
            return Err(PluginError::Unavailable(
                "a configuration session is already in progress".to_string(),
            ));
        }
        *self.shared.pending.lock() = Some(callback);
        self.shared.start.release();
        Ok(())
    }
}

impl Drop for PluginInstance {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        self.shared.start.release();

        if let Some(handle) = self.worker.get_mut().take() {
            join_quietly(handle, "configuration");
        }
        if let Some(handle) = self.mutator.get_mut().take() {
            join_quietly(handle, "mutation");
        }
        for handle in self.completions.get_mut().drain(..) {
            join_quietly(handle, "completion");
        }
        debug!(path = %self.persistence_path.display(), "plugin instance stopped");
    }
}

/// Join `handle` unless it is the calling thread, which happens when the last
/// reference is released from inside one of the instance's own callbacks.
fn join_quietly(handle: JoinHandle<()>, role: &str) {
    if handle.thread().id() == thread::current().id() {
        return;
    }
    if handle.join().is_err() {
        warn!(thread = role, "plugin thread panicked");
    }
}

// ============================================================================
// Background threads
// ============================================================================

fn configuration_worker(shared: Arc<Shared>) {
    loop {
        shared.start.acquire();
        let callback = shared.pending.lock().take();

        if shared.stop.load(Ordering::Acquire) {
            if let Some(callback) = callback {
                finish_configuration(callback, Ok(ConfigStatus::Cancel));
            }
            break;
        }

        if let Some(callback) = callback {
            debug!(delay_ms = shared.configure_delay.as_millis() as u64, "configuring");
            thread::sleep(shared.configure_delay);
            // The session lasts until its callback returned; only then may
            // the next one start.
            finish_configuration(callback, Ok(ConfigStatus::Success));
            shared.idle.release();
        } else {
            shared.idle.release();
        }
    }
}

fn finish_configuration(callback: ConfigureCallback, outcome: Result<ConfigStatus>) {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback(outcome)));
    if let Err(panic) = result {
        warn!(panic = %boundary::panic_message(panic.as_ref()), "configuration callback panicked");
    }
}

fn scripted_mutations(shared: Arc<Shared>) {
    let mut inserted = Vec::with_capacity(config::SCRIPTED_ACTIONS);
    for i in 0..config::SCRIPTED_ACTIONS {
        if shared.stop.load(Ordering::Acquire) {
            return;
        }
        let action = Action::new(
            shared.ids.next_id(),
            ActionInfo::new(format!("action{i}"), "prints value"),
        );
        match shared.registry.insert(action) {
            Ok(id) => inserted.push(id),
            Err(e) => warn!(error = %e, "scripted insert failed"),
        }
    }
    for id in inserted.into_iter().take(config::SCRIPTED_REMOVALS) {
        if shared.stop.load(Ordering::Acquire) {
            return;
        }
        if let Err(e) = shared.registry.remove(id) {
            warn!(action_id = id, error = %e, "scripted remove failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_persistence_path() {
        let dir = tempfile::tempdir().unwrap();
        assert!(validate_persistence_path(dir.path()).is_ok());

        let missing = dir.path().join("missing");
        assert!(matches!(
            validate_persistence_path(&missing),
            Err(PluginError::PersistencePath { .. })
        ));

        let file = dir.path().join("file");
        std::fs::write(&file, b"x").unwrap();
        assert!(matches!(
            validate_persistence_path(&file),
            Err(PluginError::PersistencePath { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_validate_rejects_read_only_directory() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let locked = dir.path().join("locked");
        std::fs::create_dir(&locked).unwrap();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o500)).unwrap();

        let result = validate_persistence_path(&locked);
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o700)).unwrap();
        assert!(matches!(result, Err(PluginError::PersistencePath { .. })));
    }

    #[test]
    fn test_payload_must_be_int32() {
        assert_eq!(expect_int32(PayloadValue::Int32(4)).unwrap(), 4);
        let err = expect_int32(PayloadValue::Int64(4)).unwrap_err();
        assert!(matches!(err, PluginError::InvalidPayload(_)));
        assert_eq!(err.to_string(), "Payload must be a 32-bit signed integer");
    }
}
