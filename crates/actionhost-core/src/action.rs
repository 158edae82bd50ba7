//! Host-side action wrapper.

use std::ffi::c_void;
use std::fmt;
use std::hash::{Hash, Hasher};

use actionhost_plugin_sdk::ffi::ActionFinishCallback;
use actionhost_plugin_sdk::ActionHandle;

use crate::call;
use crate::descriptor::ActionDescriptor;
use crate::error::{ActionErrc, ErrorCode, Result};
use crate::error_descriptor::ErrorDescriptor;
use crate::payload::Payload;
use crate::plugin::Plugin;

/// An action handle owned by the host.
///
/// Copies go through the plugin (serialize, then deserialize); dropping the
/// wrapper destroys the handle.
pub struct Action {
    plugin: Plugin,
    handle: ActionHandle,
}

impl Action {
    /// Take ownership of a handle produced by `plugin`.
    pub(crate) fn from_raw(plugin: Plugin, handle: ActionHandle) -> Self {
        Self { plugin, handle }
    }

    pub fn plugin(&self) -> &Plugin {
        &self.plugin
    }

    pub fn handle(&self) -> ActionHandle {
        self.handle
    }

    // ------------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------------

    pub fn serialize(&self) -> Result<String> {
        call::rich(|descriptor| self.try_serialize(descriptor))
    }

    pub fn try_serialize(
        &self,
        descriptor: &mut ErrorDescriptor,
    ) -> std::result::Result<String, ErrorCode> {
        let functions = self.plugin.module().functions();

        let mut size = 0u64;
        call::try_invoke(descriptor, |err| unsafe {
            (functions.action_serialize)(self.handle, std::ptr::null_mut(), &mut size, err)
        })?;

        let capacity = usize::try_from(size).map_err(|_| ErrorCode::from(ActionErrc::Serialization))?;
        let mut buffer = vec![0u8; capacity];
        call::try_invoke(descriptor, |err| unsafe {
            (functions.action_serialize)(self.handle, buffer.as_mut_ptr().cast(), &mut size, err)
        })?;
        buffer.truncate(usize::try_from(size).unwrap_or(capacity).min(capacity));
        String::from_utf8(buffer).map_err(|_| ErrorCode::from(ActionErrc::Serialization))
    }

    pub fn deserialize(plugin: &Plugin, text: &str) -> Result<Self> {
        call::rich(|descriptor| Self::try_deserialize(plugin, text, descriptor))
    }

    pub fn try_deserialize(
        plugin: &Plugin,
        text: &str,
        descriptor: &mut ErrorDescriptor,
    ) -> std::result::Result<Self, ErrorCode> {
        let functions = plugin.module().functions();
        let mut handle = ActionHandle::NULL;
        call::try_invoke(descriptor, |err| unsafe {
            (functions.action_deserialize)(&mut handle, text.as_ptr().cast(), text.len() as u64, err)
        })?;
        Ok(Self::from_raw(plugin.clone(), handle))
    }

    /// A second handle to the same action.
    pub fn try_clone(&self) -> Result<Self> {
        let text = self.serialize()?;
        Self::deserialize(&self.plugin, &text)
    }

    // ------------------------------------------------------------------------
    // Descriptor and execution
    // ------------------------------------------------------------------------

    /// Snapshot of the action's current descriptor.
    pub fn descriptor(&self) -> Result<ActionDescriptor> {
        ActionDescriptor::query(self)
    }

    pub fn execute<'a>(&self, payload: impl Into<Payload<'a>>) -> Result<()> {
        let payload = payload.into();
        call::rich(|descriptor| self.try_execute(payload, descriptor))
    }

    pub fn try_execute(
        &self,
        payload: Payload<'_>,
        descriptor: &mut ErrorDescriptor,
    ) -> std::result::Result<(), ErrorCode> {
        let plugin = self.plugin.try_handle()?;
        let functions = self.plugin.module().functions();
        payload.with_raw(|raw| {
            call::try_invoke(descriptor, |err| unsafe {
                (functions.action_execute)(plugin, self.handle, raw, err)
            })
        })
    }

    /// Issue an asynchronous execution.
    ///
    /// # Safety
    ///
    /// `user_data` must stay valid until `callback` has run. The callback
    /// runs exactly once if and only if this returns `Ok`.
    pub(crate) unsafe fn try_execute_async(
        &self,
        payload: Payload<'_>,
        callback: ActionFinishCallback,
        user_data: *mut c_void,
        descriptor: &mut ErrorDescriptor,
    ) -> std::result::Result<(), ErrorCode> {
        let plugin = self.plugin.try_handle()?;
        let functions = self.plugin.module().functions();
        payload.with_raw(|raw| {
            call::try_invoke(descriptor, |err| unsafe {
                (functions.action_execute_async)(
                    plugin,
                    self.handle,
                    raw,
                    Some(callback),
                    user_data,
                    err,
                )
            })
        })
    }
}

impl Drop for Action {
    fn drop(&mut self) {
        let functions = self.plugin.module().functions();
        // SAFETY: the wrapper owns the handle and destroys it exactly once.
        let status = unsafe { (functions.action_destroy)(self.handle) };
        call::release("action", ErrorCode::check(status));
    }
}

impl PartialEq for Action {
    fn eq(&self, other: &Self) -> bool {
        if self.plugin.module() != other.plugin.module() {
            return false;
        }
        let functions = self.plugin.module().functions();
        // SAFETY: both handles are live.
        unsafe { (functions.action_equal)(self.handle, other.handle) != 0 }
    }
}

impl Eq for Action {}

impl Hash for Action {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let functions = self.plugin.module().functions();
        // SAFETY: the handle is live.
        unsafe { (functions.action_hash)(self.handle) }.hash(state);
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut descriptor = ErrorDescriptor::null();
        match self.try_serialize(&mut descriptor) {
            Ok(text) => f.write_str(&text),
            Err(_) => f.write_str("<unserializable action>"),
        }
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("handle", &self.handle)
            .field("plugin", &self.plugin)
            .finish()
    }
}
