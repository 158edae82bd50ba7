//! Plugin lifecycle, action collections and configuration.

use std::ffi::c_void;

use actionhost_plugin_sdk::boundary::{guard, guard_value};
use actionhost_plugin_sdk::ffi::{ConfigFinishCallback, UserData};
use actionhost_plugin_sdk::{
    ActionCollectionHandle, ActionHandle, ConfigStatus, HandleTable, PluginAttrHandle,
    PluginError, PluginHandle, RawErrorDescriptor, RawStatus, Status,
};
use parking_lot::Mutex;
use tracing::debug;

use super::{unknown, write_out, ATTRIBUTES, FACTORY};

static COLLECTIONS: HandleTable<Mutex<Vec<ActionHandle>>> = HandleTable::new();

// ============================================================================
// Lifecycle
// ============================================================================

#[no_mangle]
pub unsafe extern "C" fn ahp_plugin_create(
    out: *mut PluginHandle,
    attr: PluginAttrHandle,
    err: *mut RawErrorDescriptor,
) -> RawStatus {
    guard(err, || {
        if out.is_null() {
            return Err(PluginError::invalid_argument("output pointer is null"));
        }
        let attributes = ATTRIBUTES
            .get(attr.raw())
            .ok_or_else(|| unknown("attribute", attr.raw()))?;
        let settings = attributes.lock().clone().into_settings()?;
        let handle = FACTORY.create(settings)?;
        // SAFETY: checked non-null above, valid per the contract.
        unsafe { write_out(out, handle) }
    })
}

#[no_mangle]
pub unsafe extern "C" fn ahp_plugin_addref(plugin: PluginHandle) -> RawStatus {
    guard(std::ptr::null_mut(), || FACTORY.add_ref(plugin))
}

#[no_mangle]
pub unsafe extern "C" fn ahp_plugin_release(plugin: PluginHandle) -> RawStatus {
    guard(std::ptr::null_mut(), || FACTORY.release(plugin))
}

// ============================================================================
// Action collections
// ============================================================================

#[no_mangle]
pub unsafe extern "C" fn ahp_action_collection_create(
    out: *mut ActionCollectionHandle,
    err: *mut RawErrorDescriptor,
) -> RawStatus {
    guard(err, || {
        let handle = ActionCollectionHandle(COLLECTIONS.insert(Mutex::new(Vec::new())));
        // SAFETY: forwarded from the caller.
        unsafe { write_out(out, handle) }
    })
}

#[no_mangle]
pub unsafe extern "C" fn ahp_action_collection_destroy(
    collection: ActionCollectionHandle,
) -> RawStatus {
    guard(std::ptr::null_mut(), || {
        COLLECTIONS
            .remove(collection.raw())
            .map(drop)
            .ok_or_else(|| unknown("collection", collection.raw()))
    })
}

#[no_mangle]
pub extern "C" fn ahp_action_collection_size(collection: ActionCollectionHandle) -> u64 {
    guard_value(0, || {
        COLLECTIONS
            .get(collection.raw())
            .map_or(0, |actions| actions.lock().len() as u64)
    })
}

#[no_mangle]
pub unsafe extern "C" fn ahp_action_collection_at(
    collection: ActionCollectionHandle,
    index: u64,
    out: *mut ActionHandle,
    err: *mut RawErrorDescriptor,
) -> RawStatus {
    guard(err, || {
        let actions = COLLECTIONS
            .get(collection.raw())
            .ok_or_else(|| unknown("collection", collection.raw()))?;
        let actions = actions.lock();
        let action = usize::try_from(index)
            .ok()
            .and_then(|index| actions.get(index).copied())
            .ok_or_else(|| {
                PluginError::invalid_argument(format!(
                    "index {index} out of range for a collection of {} actions",
                    actions.len()
                ))
            })?;
        // SAFETY: forwarded from the caller.
        unsafe { write_out(out, action) }
    })
}

#[no_mangle]
pub unsafe extern "C" fn ahp_plugin_actions(
    plugin: PluginHandle,
    collection: ActionCollectionHandle,
    err: *mut RawErrorDescriptor,
) -> RawStatus {
    guard(err, || {
        let instance = FACTORY.get(plugin)?;
        let actions = COLLECTIONS
            .get(collection.raw())
            .ok_or_else(|| unknown("collection", collection.raw()))?;
        let snapshot = instance.registry().snapshot();
        *actions.lock() = snapshot.into_iter().map(ActionHandle::from_id).collect();
        Ok(())
    })
}

// ============================================================================
// Configuration
// ============================================================================

#[no_mangle]
pub unsafe extern "C" fn ahp_plugin_configure_cli(
    plugin: PluginHandle,
    callback: Option<ConfigFinishCallback>,
    user_data: *mut c_void,
    err: *mut RawErrorDescriptor,
) -> RawStatus {
    guard(err, || {
        let callback =
            callback.ok_or_else(|| PluginError::invalid_argument("callback must not be null"))?;
        let instance = FACTORY.get(plugin)?;
        let user_data = UserData(user_data);
        instance.configure(Box::new(move |outcome| {
            let (status, config) = match outcome {
                Ok(config) => (Status::Success, config),
                Err(e) => (e.status(), ConfigStatus::Cancel),
            };
            debug!(status = %status, config = ?config, "configuration finished");
            // SAFETY: the host keeps the callback target alive until it has
            // been invoked.
            unsafe { callback(status.raw(), config.raw(), user_data.get()) }
        }))
    })
}

#[no_mangle]
pub unsafe extern "C" fn ahp_plugin_configure_gui(
    _plugin: PluginHandle,
    _callback: Option<ConfigFinishCallback>,
    _user_data: *mut c_void,
    err: *mut RawErrorDescriptor,
) -> RawStatus {
    guard(err, || {
        Err(PluginError::NotImplemented(
            "GUI configuration is currently not implemented".to_string(),
        ))
    })
}
