//! Shared fixtures: the reference plugin linked into the test binary.

#![allow(dead_code)]

use std::sync::mpsc;
use std::time::{Duration, Instant};

use actionhost_core::{
    Action, ActionEvent, ErrorCode, LoadedModule, PluginErrc, Result, StaticSymbols,
};
use actionhost_plugin_sdk::ffi::symbols;
use actionhost_sample_plugin::config::env_vars::CONFIGURE_DELAY_MS;
use actionhost_sample_plugin::exports::*;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, MutexGuard};

/// The reference plugin is a process-wide singleton, so tests touching it
/// run one at a time.
static PLUGIN_LOCK: Lazy<Mutex<()>> = Lazy::new(|| {
    std::env::set_var(CONFIGURE_DELAY_MS, "50");
    Mutex::new(())
});

pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Events produced by the scripted mutations of a fresh instance.
pub const SCRIPTED_EVENTS: usize = 15;

pub fn lock_plugin() -> MutexGuard<'static, ()> {
    PLUGIN_LOCK.lock()
}

/// Addresses of every contract export of the reference plugin.
pub fn sample_symbols() -> StaticSymbols {
    let mut table = StaticSymbols::new();
    table
        .insert(symbols::VERSION, ahp_version as *const ())
        .insert(symbols::IS_LIBRARY_COMPATIBLE, ahp_is_library_compatible as *const ())
        .insert(symbols::VERSION_CREATE, ahp_version_create as *const ())
        .insert(symbols::VERSION_DESTROY, ahp_version_destroy as *const ())
        .insert(symbols::VERSION_MAJOR, ahp_version_major as *const ())
        .insert(symbols::VERSION_MINOR, ahp_version_minor as *const ())
        .insert(symbols::VERSION_PATCH, ahp_version_patch as *const ())
        .insert(symbols::VERSION_PRE_RELEASE, ahp_version_pre_release as *const ())
        .insert(symbols::VERSION_BUILD, ahp_version_build as *const ())
        .insert(symbols::PLUGIN_ATTR_CREATE, ahp_plugin_attr_create as *const ())
        .insert(symbols::PLUGIN_ATTR_DESTROY, ahp_plugin_attr_destroy as *const ())
        .insert(symbols::PLUGIN_ATTR_SET_ON_ADD, ahp_plugin_attr_set_on_add as *const ())
        .insert(symbols::PLUGIN_ATTR_SET_ON_MODIFY, ahp_plugin_attr_set_on_modify as *const ())
        .insert(symbols::PLUGIN_ATTR_SET_ON_REMOVE, ahp_plugin_attr_set_on_remove as *const ())
        .insert(
            symbols::PLUGIN_ATTR_SET_PERSISTENCE_PATH,
            ahp_plugin_attr_set_persistence_path as *const (),
        )
        .insert(symbols::PLUGIN_CREATE, ahp_plugin_create as *const ())
        .insert(symbols::PLUGIN_ADDREF, ahp_plugin_addref as *const ())
        .insert(symbols::PLUGIN_RELEASE, ahp_plugin_release as *const ())
        .insert(symbols::PLUGIN_DESCRIPTOR_CREATE, ahp_plugin_descriptor_create as *const ())
        .insert(symbols::PLUGIN_DESCRIPTOR_DESTROY, ahp_plugin_descriptor_destroy as *const ())
        .insert(symbols::PLUGIN_DESCRIPTOR_NAME, ahp_plugin_descriptor_name as *const ())
        .insert(
            symbols::PLUGIN_DESCRIPTOR_DESCRIPTION,
            ahp_plugin_descriptor_description as *const (),
        )
        .insert(symbols::ACTION_COLLECTION_CREATE, ahp_action_collection_create as *const ())
        .insert(symbols::ACTION_COLLECTION_DESTROY, ahp_action_collection_destroy as *const ())
        .insert(symbols::ACTION_COLLECTION_SIZE, ahp_action_collection_size as *const ())
        .insert(symbols::ACTION_COLLECTION_AT, ahp_action_collection_at as *const ())
        .insert(symbols::PLUGIN_ACTIONS, ahp_plugin_actions as *const ())
        .insert(symbols::PLUGIN_CONFIGURE_CLI, ahp_plugin_configure_cli as *const ())
        .insert(symbols::PLUGIN_CONFIGURE_GUI, ahp_plugin_configure_gui as *const ())
        .insert(symbols::ACTION_SERIALIZE, ahp_action_serialize as *const ())
        .insert(symbols::ACTION_DESERIALIZE, ahp_action_deserialize as *const ())
        .insert(symbols::ACTION_DESTROY, ahp_action_destroy as *const ())
        .insert(symbols::ACTION_DESCRIPTOR_CREATE, ahp_action_descriptor_create as *const ())
        .insert(symbols::ACTION_DESCRIPTOR_DESTROY, ahp_action_descriptor_destroy as *const ())
        .insert(symbols::ACTION_DESCRIPTOR_NAME, ahp_action_descriptor_name as *const ())
        .insert(
            symbols::ACTION_DESCRIPTOR_DESCRIPTION,
            ahp_action_descriptor_description as *const (),
        )
        .insert(symbols::ACTION_EXECUTE, ahp_action_execute as *const ())
        .insert(symbols::ACTION_EXECUTE_ASYNC, ahp_action_execute_async as *const ())
        .insert(symbols::ACTION_HASH, ahp_action_hash as *const ())
        .insert(symbols::ACTION_EQUAL, ahp_action_equal as *const ());
    table
}

pub fn sample_module() -> LoadedModule {
    // SAFETY: every entry is the matching export of the linked plugin.
    unsafe { LoadedModule::from_symbols("sample-plugin", &sample_symbols()) }
        .expect("sample plugin binds")
}

/// Collect `count` events, failing the test if they do not arrive in time.
pub fn collect_events(
    rx: &mpsc::Receiver<(ActionEvent, Action)>,
    count: usize,
) -> Vec<(ActionEvent, Action)> {
    (0..count)
        .map(|i| {
            rx.recv_timeout(SETTLE_TIMEOUT)
                .unwrap_or_else(|e| panic!("event {i} of {count} missing: {e}"))
        })
        .collect()
}

/// Retry `attempt` while the plugin still reports the previous configuration
/// session; it frees its slot only after the completion callback returned.
pub fn when_plugin_idle<T>(mut attempt: impl FnMut() -> Result<T>) -> Result<T> {
    let deadline = Instant::now() + SETTLE_TIMEOUT;
    loop {
        match attempt() {
            Err(e)
                if e.code() == ErrorCode::Plugin(PluginErrc::Unavailable)
                    && Instant::now() < deadline =>
            {
                std::thread::sleep(Duration::from_millis(10));
            }
            outcome => return outcome,
        }
    }
}
