//! Descriptor snapshots.
//!
//! A descriptor is read once from the plugin and never kept in sync with
//! later changes. The plugin-side object is destroyed before the snapshot is
//! returned.

use std::ops::Deref;

use actionhost_plugin_sdk::abi::{TEXT_LONG, TEXT_SHORT};
use actionhost_plugin_sdk::{
    ActionDescriptorHandle, PluginDescriptorHandle, StringView, TextVariant,
};
use serde::Serialize;

use crate::action::Action;
use crate::call;
use crate::error::{ErrorCode, Result};
use crate::error_descriptor::ErrorDescriptor;
use crate::module::LoadedModule;

/// Long and short texts shared by every descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct BasicDescriptor {
    pub name: String,
    pub short_name: String,
    pub description: String,
    pub short_description: String,
}

impl BasicDescriptor {
    /// Read all four texts through the two accessors of a descriptor.
    ///
    /// # Safety
    ///
    /// The accessors must return views valid until the descriptor is destroyed,
    /// which happens after this returns.
    unsafe fn read(
        name: impl Fn(TextVariant) -> StringView,
        description: impl Fn(TextVariant) -> StringView,
    ) -> Self {
        // SAFETY: forwarded from the caller.
        unsafe {
            Self {
                name: name(TEXT_LONG).to_string_lossy(),
                short_name: name(TEXT_SHORT).to_string_lossy(),
                description: description(TEXT_LONG).to_string_lossy(),
                short_description: description(TEXT_SHORT).to_string_lossy(),
            }
        }
    }
}

/// Descriptor of the plugin itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PluginDescriptor(pub BasicDescriptor);

impl PluginDescriptor {
    pub fn query(module: &LoadedModule) -> Result<Self> {
        call::rich(|descriptor| Self::try_query(module, descriptor))
    }

    pub fn try_query(
        module: &LoadedModule,
        descriptor: &mut ErrorDescriptor,
    ) -> std::result::Result<Self, ErrorCode> {
        let functions = module.functions();
        let mut handle = PluginDescriptorHandle::NULL;
        call::try_invoke(descriptor, |err| unsafe {
            (functions.plugin_descriptor_create)(&mut handle, err)
        })?;

        // SAFETY: the views are copied before the descriptor is destroyed.
        let text = unsafe {
            BasicDescriptor::read(
                |variant| (functions.plugin_descriptor_name)(handle, variant),
                |variant| (functions.plugin_descriptor_description)(handle, variant),
            )
        };
        // SAFETY: created above, destroyed exactly once.
        call::release(
            "plugin descriptor",
            ErrorCode::check(unsafe { (functions.plugin_descriptor_destroy)(handle) }),
        );
        Ok(Self(text))
    }
}

impl Deref for PluginDescriptor {
    type Target = BasicDescriptor;

    fn deref(&self) -> &BasicDescriptor {
        &self.0
    }
}

/// Descriptor of one action, as it was when requested.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ActionDescriptor(pub BasicDescriptor);

impl ActionDescriptor {
    pub fn query(action: &Action) -> Result<Self> {
        call::rich(|descriptor| Self::try_query(action, descriptor))
    }

    pub fn try_query(
        action: &Action,
        descriptor: &mut ErrorDescriptor,
    ) -> std::result::Result<Self, ErrorCode> {
        let plugin = action.plugin().try_handle()?;
        let functions = action.plugin().module().functions();
        let mut handle = ActionDescriptorHandle::NULL;
        call::try_invoke(descriptor, |err| unsafe {
            (functions.action_descriptor_create)(plugin, action.handle(), &mut handle, err)
        })?;

        // SAFETY: the views are copied before the descriptor is destroyed.
        let text = unsafe {
            BasicDescriptor::read(
                |variant| (functions.action_descriptor_name)(handle, variant),
                |variant| (functions.action_descriptor_description)(handle, variant),
            )
        };
        // SAFETY: created above, destroyed exactly once.
        call::release(
            "action descriptor",
            ErrorCode::check(unsafe { (functions.action_descriptor_destroy)(handle) }),
        );
        Ok(Self(text))
    }
}

impl Deref for ActionDescriptor {
    type Target = BasicDescriptor;

    fn deref(&self) -> &BasicDescriptor {
        &self.0
    }
}
