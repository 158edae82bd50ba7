//! Typed entry points of a loaded module.

use actionhost_plugin_sdk::ffi::{self, symbols};

use crate::error::LoadError;
use crate::module::SymbolResolver;

/// Resolve one symbol, naming it in the failure.
///
/// # Safety
///
/// `T` must be the function-pointer type the contract assigns to `name`.
pub(crate) unsafe fn resolve_one<R, T>(resolver: &R, name: &'static str) -> Result<T, LoadError>
where
    R: SymbolResolver,
    T: Copy,
{
    // SAFETY: forwarded from the caller.
    unsafe { resolver.resolve::<T>(name) }
        .map_err(|source| LoadError::FunctionLoad { name, source })
}

macro_rules! function_table {
    ($($field:ident: $ty:ident = $symbol:ident,)*) => {
        /// One bound entry point per contract operation.
        ///
        /// Built once when the module is loaded and never mutated; a missing
        /// symbol fails the whole load.
        #[derive(Debug, Clone, Copy)]
        pub struct FunctionTable {
            $(pub $field: ffi::$ty,)*
        }

        impl FunctionTable {
            /// Resolve every operation in [`symbols::ALL`] order, stopping at
            /// the first missing one.
            ///
            /// # Safety
            ///
            /// Every symbol `resolver` finds must have the contract's signature.
            pub(crate) unsafe fn resolve<R: SymbolResolver>(resolver: &R) -> Result<Self, LoadError> {
                Ok(Self {
                    // SAFETY: each field type is the contract type of its symbol.
                    $($field: unsafe { resolve_one::<R, ffi::$ty>(resolver, symbols::$symbol)? },)*
                })
            }
        }
    };
}

function_table! {
    version: VersionFn = VERSION,
    is_library_compatible: IsCompatibleFn = IS_LIBRARY_COMPATIBLE,

    version_create: VersionCreateFn = VERSION_CREATE,
    version_destroy: VersionDestroyFn = VERSION_DESTROY,
    version_major: VersionNumberFn = VERSION_MAJOR,
    version_minor: VersionNumberFn = VERSION_MINOR,
    version_patch: VersionNumberFn = VERSION_PATCH,
    version_pre_release: VersionTextFn = VERSION_PRE_RELEASE,
    version_build: VersionTextFn = VERSION_BUILD,

    plugin_attr_create: PluginAttrCreateFn = PLUGIN_ATTR_CREATE,
    plugin_attr_destroy: PluginAttrDestroyFn = PLUGIN_ATTR_DESTROY,
    plugin_attr_set_on_add: PluginAttrSetCallbackFn = PLUGIN_ATTR_SET_ON_ADD,
    plugin_attr_set_on_modify: PluginAttrSetCallbackFn = PLUGIN_ATTR_SET_ON_MODIFY,
    plugin_attr_set_on_remove: PluginAttrSetCallbackFn = PLUGIN_ATTR_SET_ON_REMOVE,
    plugin_attr_set_persistence_path: PluginAttrSetPathFn = PLUGIN_ATTR_SET_PERSISTENCE_PATH,

    plugin_create: PluginCreateFn = PLUGIN_CREATE,
    plugin_addref: PluginRefFn = PLUGIN_ADDREF,
    plugin_release: PluginRefFn = PLUGIN_RELEASE,

    plugin_descriptor_create: PluginDescriptorCreateFn = PLUGIN_DESCRIPTOR_CREATE,
    plugin_descriptor_destroy: PluginDescriptorDestroyFn = PLUGIN_DESCRIPTOR_DESTROY,
    plugin_descriptor_name: PluginDescriptorTextFn = PLUGIN_DESCRIPTOR_NAME,
    plugin_descriptor_description: PluginDescriptorTextFn = PLUGIN_DESCRIPTOR_DESCRIPTION,

    action_collection_create: ActionCollectionCreateFn = ACTION_COLLECTION_CREATE,
    action_collection_destroy: ActionCollectionDestroyFn = ACTION_COLLECTION_DESTROY,
    action_collection_size: ActionCollectionSizeFn = ACTION_COLLECTION_SIZE,
    action_collection_at: ActionCollectionAtFn = ACTION_COLLECTION_AT,

    plugin_actions: PluginActionsFn = PLUGIN_ACTIONS,
    plugin_configure_cli: PluginConfigureFn = PLUGIN_CONFIGURE_CLI,
    plugin_configure_gui: PluginConfigureFn = PLUGIN_CONFIGURE_GUI,

    action_serialize: ActionSerializeFn = ACTION_SERIALIZE,
    action_deserialize: ActionDeserializeFn = ACTION_DESERIALIZE,
    action_destroy: ActionDestroyFn = ACTION_DESTROY,

    action_descriptor_create: ActionDescriptorCreateFn = ACTION_DESCRIPTOR_CREATE,
    action_descriptor_destroy: ActionDescriptorDestroyFn = ACTION_DESCRIPTOR_DESTROY,
    action_descriptor_name: ActionDescriptorTextFn = ACTION_DESCRIPTOR_NAME,
    action_descriptor_description: ActionDescriptorTextFn = ACTION_DESCRIPTOR_DESCRIPTION,

    action_execute: ActionExecuteFn = ACTION_EXECUTE,
    action_execute_async: ActionExecuteAsyncFn = ACTION_EXECUTE_ASYNC,
    action_hash: ActionHashFn = ACTION_HASH,
    action_equal: ActionEqualFn = ACTION_EQUAL,
}
