//! Defaults and environment overrides of the reference plugin.

/// Actions inserted by the scripted mutation thread.
pub const SCRIPTED_ACTIONS: usize = 10;

/// Actions removed again (the first ones inserted).
pub const SCRIPTED_REMOVALS: usize = 5;

/// Duration of a simulated configuration session.
pub const DEFAULT_CONFIGURE_DELAY_MS: u64 = 2000;

/// Environment variable names
pub mod env_vars {
    use std::time::Duration;

    pub const CONFIGURE_DELAY_MS: &str = "ACTIONHOST_SAMPLE_CONFIGURE_DELAY_MS";

    pub fn configure_delay() -> Duration {
        let millis = std::env::var(CONFIGURE_DELAY_MS)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(super::DEFAULT_CONFIGURE_DELAY_MS);
        Duration::from_millis(millis)
    }
}
