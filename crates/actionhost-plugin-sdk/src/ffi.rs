//! Function-pointer types and symbol names of every contract operation.
//!
//! A module exports one `extern "C"` function per entry of [`symbols::ALL`].
//! Operations returning [`RawStatus`] accept a trailing
//! `*mut RawErrorDescriptor`, which may be null.

use std::ffi::{c_char, c_int, c_void};

use crate::abi::{
    ActionCollectionHandle, ActionDescriptorHandle, ActionHandle, PluginAttrHandle,
    PluginDescriptorHandle, PluginHandle, RawConfigStatus, RawErrorDescriptor, RawPayload,
    RawStatus, StringView, TextVariant, VersionHandle,
};

// ============================================================================
// Callbacks (host-supplied)
// ============================================================================

/// Opaque user data handed back to a host callback.
///
/// The contract requires hosts to pass user data that may be used from any
/// thread, which is what makes the `Send`/`Sync` impls sound.
#[derive(Debug, Clone, Copy)]
pub struct UserData(pub *mut c_void);

// SAFETY: see the type documentation.
unsafe impl Send for UserData {}
// SAFETY: see the type documentation.
unsafe impl Sync for UserData {}

impl UserData {
    /// The raw pointer. Closures should call this instead of reading `.0`,
    /// which would capture the bare (non-`Send`) pointer.
    pub fn get(self) -> *mut c_void {
        self.0
    }
}

/// Action added/modified/removed. The receiver owns `action` and must destroy it.
pub type ActionEventCallback = unsafe extern "C" fn(action: ActionHandle, user_data: *mut c_void);

/// Completion of a configuration session. Invoked exactly once per accepted session.
pub type ConfigFinishCallback =
    unsafe extern "C" fn(status: RawStatus, config: RawConfigStatus, user_data: *mut c_void);

/// Completion of an asynchronous execution. `message` is only valid during the call.
pub type ActionFinishCallback =
    unsafe extern "C" fn(status: RawStatus, message: StringView, user_data: *mut c_void);

// ============================================================================
// Exported operations
// ============================================================================

pub type VersionFn = unsafe extern "C" fn() -> u32;
pub type IsCompatibleFn = unsafe extern "C" fn(host: u32) -> c_int;

pub type VersionCreateFn =
    unsafe extern "C" fn(out: *mut VersionHandle, err: *mut RawErrorDescriptor) -> RawStatus;
pub type VersionDestroyFn = unsafe extern "C" fn(version: VersionHandle) -> RawStatus;
pub type VersionNumberFn = unsafe extern "C" fn(version: VersionHandle) -> u16;
pub type VersionTextFn = unsafe extern "C" fn(version: VersionHandle) -> StringView;

pub type PluginAttrCreateFn =
    unsafe extern "C" fn(out: *mut PluginAttrHandle, err: *mut RawErrorDescriptor) -> RawStatus;
pub type PluginAttrDestroyFn = unsafe extern "C" fn(attr: PluginAttrHandle) -> RawStatus;
pub type PluginAttrSetCallbackFn = unsafe extern "C" fn(
    attr: PluginAttrHandle,
    callback: Option<ActionEventCallback>,
    user_data: *mut c_void,
    err: *mut RawErrorDescriptor,
) -> RawStatus;
pub type PluginAttrSetPathFn = unsafe extern "C" fn(
    attr: PluginAttrHandle,
    path: StringView,
    err: *mut RawErrorDescriptor,
) -> RawStatus;

pub type PluginCreateFn = unsafe extern "C" fn(
    out: *mut PluginHandle,
    attr: PluginAttrHandle,
    err: *mut RawErrorDescriptor,
) -> RawStatus;
pub type PluginRefFn = unsafe extern "C" fn(plugin: PluginHandle) -> RawStatus;

pub type PluginDescriptorCreateFn = unsafe extern "C" fn(
    out: *mut PluginDescriptorHandle,
    err: *mut RawErrorDescriptor,
) -> RawStatus;
pub type PluginDescriptorDestroyFn =
    unsafe extern "C" fn(descriptor: PluginDescriptorHandle) -> RawStatus;
pub type PluginDescriptorTextFn =
    unsafe extern "C" fn(descriptor: PluginDescriptorHandle, variant: TextVariant) -> StringView;

pub type ActionCollectionCreateFn = unsafe extern "C" fn(
    out: *mut ActionCollectionHandle,
    err: *mut RawErrorDescriptor,
) -> RawStatus;
pub type ActionCollectionDestroyFn =
    unsafe extern "C" fn(collection: ActionCollectionHandle) -> RawStatus;
pub type ActionCollectionSizeFn = unsafe extern "C" fn(collection: ActionCollectionHandle) -> u64;
pub type ActionCollectionAtFn = unsafe extern "C" fn(
    collection: ActionCollectionHandle,
    index: u64,
    out: *mut ActionHandle,
    err: *mut RawErrorDescriptor,
) -> RawStatus;

pub type PluginActionsFn = unsafe extern "C" fn(
    plugin: PluginHandle,
    collection: ActionCollectionHandle,
    err: *mut RawErrorDescriptor,
) -> RawStatus;

pub type PluginConfigureFn = unsafe extern "C" fn(
    plugin: PluginHandle,
    callback: Option<ConfigFinishCallback>,
    user_data: *mut c_void,
    err: *mut RawErrorDescriptor,
) -> RawStatus;

pub type ActionSerializeFn = unsafe extern "C" fn(
    action: ActionHandle,
    buffer: *mut c_char,
    size: *mut u64,
    err: *mut RawErrorDescriptor,
) -> RawStatus;
pub type ActionDeserializeFn = unsafe extern "C" fn(
    out: *mut ActionHandle,
    buffer: *const c_char,
    size: u64,
    err: *mut RawErrorDescriptor,
) -> RawStatus;
pub type ActionDestroyFn = unsafe extern "C" fn(action: ActionHandle) -> RawStatus;

pub type ActionDescriptorCreateFn = unsafe extern "C" fn(
    plugin: PluginHandle,
    action: ActionHandle,
    out: *mut ActionDescriptorHandle,
    err: *mut RawErrorDescriptor,
) -> RawStatus;
pub type ActionDescriptorDestroyFn =
    unsafe extern "C" fn(descriptor: ActionDescriptorHandle) -> RawStatus;
pub type ActionDescriptorTextFn =
    unsafe extern "C" fn(descriptor: ActionDescriptorHandle, variant: TextVariant) -> StringView;

pub type ActionExecuteFn = unsafe extern "C" fn(
    plugin: PluginHandle,
    action: ActionHandle,
    payload: RawPayload,
    err: *mut RawErrorDescriptor,
) -> RawStatus;
pub type ActionExecuteAsyncFn = unsafe extern "C" fn(
    plugin: PluginHandle,
    action: ActionHandle,
    payload: RawPayload,
    callback: Option<ActionFinishCallback>,
    user_data: *mut c_void,
    err: *mut RawErrorDescriptor,
) -> RawStatus;

pub type ActionHashFn = unsafe extern "C" fn(action: ActionHandle) -> u64;
pub type ActionEqualFn = unsafe extern "C" fn(lhs: ActionHandle, rhs: ActionHandle) -> c_int;

// ============================================================================
// Symbol names
// ============================================================================

/// Exported symbol names, one per operation.
pub mod symbols {
    pub const VERSION: &str = "ahp_version";
    pub const IS_LIBRARY_COMPATIBLE: &str = "ahp_is_library_compatible";

    pub const VERSION_CREATE: &str = "ahp_version_create";
    pub const VERSION_DESTROY: &str = "ahp_version_destroy";
    pub const VERSION_MAJOR: &str = "ahp_version_major";
    pub const VERSION_MINOR: &str = "ahp_version_minor";
    pub const VERSION_PATCH: &str = "ahp_version_patch";
    pub const VERSION_PRE_RELEASE: &str = "ahp_version_pre_release";
    pub const VERSION_BUILD: &str = "ahp_version_build";

    pub const PLUGIN_ATTR_CREATE: &str = "ahp_plugin_attr_create";
    pub const PLUGIN_ATTR_DESTROY: &str = "ahp_plugin_attr_destroy";
    pub const PLUGIN_ATTR_SET_ON_ADD: &str = "ahp_plugin_attr_set_on_add";
    pub const PLUGIN_ATTR_SET_ON_MODIFY: &str = "ahp_plugin_attr_set_on_modify";
    pub const PLUGIN_ATTR_SET_ON_REMOVE: &str = "ahp_plugin_attr_set_on_remove";
    pub const PLUGIN_ATTR_SET_PERSISTENCE_PATH: &str = "ahp_plugin_attr_set_persistence_path";

    pub const PLUGIN_CREATE: &str = "ahp_plugin_create";
    pub const PLUGIN_ADDREF: &str = "ahp_plugin_addref";
    pub const PLUGIN_RELEASE: &str = "ahp_plugin_release";

    pub const PLUGIN_DESCRIPTOR_CREATE: &str = "ahp_plugin_descriptor_create";
    pub const PLUGIN_DESCRIPTOR_DESTROY: &str = "ahp_plugin_descriptor_destroy";
    pub const PLUGIN_DESCRIPTOR_NAME: &str = "ahp_plugin_descriptor_name";
    pub const PLUGIN_DESCRIPTOR_DESCRIPTION: &str = "ahp_plugin_descriptor_description";

    pub const ACTION_COLLECTION_CREATE: &str = "ahp_action_collection_create";
    pub const ACTION_COLLECTION_DESTROY: &str = "ahp_action_collection_destroy";
    pub const ACTION_COLLECTION_SIZE: &str = "ahp_action_collection_size";
    pub const ACTION_COLLECTION_AT: &str = "ahp_action_collection_at";

    pub const PLUGIN_ACTIONS: &str = "ahp_plugin_actions";
    pub const PLUGIN_CONFIGURE_CLI: &str = "ahp_plugin_configure_cli";
    pub const PLUGIN_CONFIGURE_GUI: &str = "ahp_plugin_configure_gui";

    pub const ACTION_SERIALIZE: &str = "ahp_action_serialize";
    pub const ACTION_DESERIALIZE: &str = "ahp_action_deserialize";
    pub const ACTION_DESTROY: &str = "ahp_action_destroy";

    pub const ACTION_DESCRIPTOR_CREATE: &str = "ahp_action_descriptor_create";
    pub const ACTION_DESCRIPTOR_DESTROY: &str = "ahp_action_descriptor_destroy";
    pub const ACTION_DESCRIPTOR_NAME: &str = "ahp_action_descriptor_name";
    pub const ACTION_DESCRIPTOR_DESCRIPTION: &str = "ahp_action_descriptor_description";

    pub const ACTION_EXECUTE: &str = "ahp_action_execute";
    pub const ACTION_EXECUTE_ASYNC: &str = "ahp_action_execute_async";
    pub const ACTION_HASH: &str = "ahp_action_hash";
    pub const ACTION_EQUAL: &str = "ahp_action_equal";

    /// Every symbol a module must export, in resolution order.
    pub const ALL: [&str; 40] = [
        VERSION,
        IS_LIBRARY_COMPATIBLE,
        VERSION_CREATE,
        VERSION_DESTROY,
        VERSION_MAJOR,
        VERSION_MINOR,
        VERSION_PATCH,
        VERSION_PRE_RELEASE,
        VERSION_BUILD,
        PLUGIN_ATTR_CREATE,
        PLUGIN_ATTR_DESTROY,
        PLUGIN_ATTR_SET_ON_ADD,
        PLUGIN_ATTR_SET_ON_MODIFY,
        PLUGIN_ATTR_SET_ON_REMOVE,
        PLUGIN_ATTR_SET_PERSISTENCE_PATH,
        PLUGIN_CREATE,
        PLUGIN_ADDREF,
        PLUGIN_RELEASE,
        PLUGIN_DESCRIPTOR_CREATE,
        PLUGIN_DESCRIPTOR_DESTROY,
        PLUGIN_DESCRIPTOR_NAME,
        PLUGIN_DESCRIPTOR_DESCRIPTION,
        ACTION_COLLECTION_CREATE,
        ACTION_COLLECTION_DESTROY,
        ACTION_COLLECTION_SIZE,
        ACTION_COLLECTION_AT,
        PLUGIN_ACTIONS,
        PLUGIN_CONFIGURE_CLI,
        PLUGIN_CONFIGURE_GUI,
        ACTION_SERIALIZE,
        ACTION_DESERIALIZE,
        ACTION_DESTROY,
        ACTION_DESCRIPTOR_CREATE,
        ACTION_DESCRIPTOR_DESTROY,
        ACTION_DESCRIPTOR_NAME,
        ACTION_DESCRIPTOR_DESCRIPTION,
        ACTION_EXECUTE,
        ACTION_EXECUTE_ASYNC,
        ACTION_HASH,
        ACTION_EQUAL,
    ];
}

#[cfg(test)]
mod tests {
    use super::symbols;
    use std::collections::HashSet;

    #[test]
    fn test_symbol_names_are_unique_and_prefixed() {
        let unique: HashSet<_> = symbols::ALL.iter().collect();
        assert_eq!(unique.len(), symbols::ALL.len());
        assert!(symbols::ALL.iter().all(|name| name.starts_with("ahp_")));
    }
}
