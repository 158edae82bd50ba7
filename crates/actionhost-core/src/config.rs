//! Host defaults and the environment variables overriding them.

/// Error descriptor defaults
pub mod error_buffer {
    /// Capacity of the descriptor allocated by the rich call form.
    pub const DEFAULT_CAPACITY: usize = 256;
}

/// Sample host defaults
pub mod host {
    use std::time::Duration;

    /// Name of the directory created under the user data directory.
    pub const DATA_DIR_NAME: &str = "actionhost";
    /// Default number of payloads submitted per discovered action.
    pub const DEFAULT_SUBMISSIONS: usize = 10;
    /// Default time the event loop waits for a new event before stopping.
    pub const DEFAULT_SETTLE_MS: u64 = 500;
    /// Capacity of the event channel between plugin callbacks and the host.
    pub const EVENT_QUEUE_CAPACITY: usize = 64;
    /// Attempts made while the plugin reports a configuration in progress.
    pub const CONFIGURE_RETRIES: u32 = 50;
    /// Pause between configuration attempts.
    pub const CONFIGURE_RETRY_INTERVAL: Duration = Duration::from_millis(20);
}

/// Environment variable names
pub mod env_vars {
    use std::path::PathBuf;

    use super::{error_buffer, host};

    pub const ERROR_BUFFER: &str = "ACTIONHOST_ERROR_BUFFER";
    pub const PLUGIN_PATH: &str = "ACTIONHOST_PLUGIN_PATH";
    pub const PERSISTENCE_DIR: &str = "ACTIONHOST_PERSISTENCE_DIR";
    pub const LOG_JSON: &str = "ACTIONHOST_LOG_JSON";

    /// Descriptor capacity from the environment, or the default.
    pub fn error_buffer_capacity() -> usize {
        std::env::var(ERROR_BUFFER)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(error_buffer::DEFAULT_CAPACITY)
    }

    pub fn plugin_path() -> Option<PathBuf> {
        std::env::var_os(PLUGIN_PATH).map(PathBuf::from)
    }

    /// Persistence directory from the environment, falling back to
    /// `<data dir>/actionhost`.
    pub fn persistence_dir() -> Option<PathBuf> {
        std::env::var_os(PERSISTENCE_DIR)
            .map(PathBuf::from)
            .or_else(|| dirs::data_dir().map(|dir| dir.join(host::DATA_DIR_NAME)))
    }

    /// Whether logs should be emitted as JSON.
    pub fn log_json() -> bool {
        std::env::var(LOG_JSON)
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        assert!(error_buffer::DEFAULT_CAPACITY > 0);
        assert!(host::EVENT_QUEUE_CAPACITY > 0);
    }
}
