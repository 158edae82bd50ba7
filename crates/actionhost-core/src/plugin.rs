//! Plugin instances and action notifications.
//!
//! [`Plugin::create`] builds an attribute set, registers the add/modify/remove
//! trampolines and asks the module for an instance. The trampolines reach the
//! plugin through a weak reference, so notifications arriving after the last
//! [`Plugin`] is gone are dropped instead of touching freed memory.

use std::error::Error as StdError;
use std::ffi::c_void;
use std::fmt;
use std::mem::ManuallyDrop;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use actionhost_plugin_sdk::boundary::panic_message;
use actionhost_plugin_sdk::ffi::{ActionEventCallback, ConfigFinishCallback};
use actionhost_plugin_sdk::{
    ActionCollectionHandle, ActionHandle, PluginAttrHandle, PluginHandle, StringView,
};
use once_cell::sync::OnceCell;
use tracing::{debug, warn};

use crate::action::Action;
use crate::call;
use crate::descriptor::PluginDescriptor;
use crate::error::{Error, ErrorCode, LogicErrc, Result};
use crate::error_descriptor::ErrorDescriptor;
use crate::module::LoadedModule;
use crate::notify;
use crate::version::PluginVersion;

/// Error returned by user callbacks.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Receives every add/modify/remove notification with an owned action.
pub type EventCallback =
    Box<dyn Fn(Action, ActionEvent) -> std::result::Result<(), BoxError> + Send + Sync>;

/// Receives failures of an [`EventCallback`].
pub type ErrorCallback = Box<dyn Fn(BoxError) + Send + Sync>;

/// Kind of registry change a notification reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionEvent {
    Added,
    Modified,
    Removed,
}

impl fmt::Display for ActionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ActionEvent::Added => "added",
            ActionEvent::Modified => "modified",
            ActionEvent::Removed => "removed",
        })
    }
}

/// Creation parameters of a plugin.
pub struct PluginAttributes {
    persistence_path: PathBuf,
    on_event: Option<EventCallback>,
    on_error: Option<ErrorCallback>,
}

impl PluginAttributes {
    pub fn new(persistence_path: impl Into<PathBuf>) -> Self {
        Self {
            persistence_path: persistence_path.into(),
            on_event: None,
            on_error: None,
        }
    }

    /// Callback for action notifications. It runs on a plugin thread while
    /// the plugin holds its registry lock, so it must not call back into the
    /// same plugin; hand the action to another thread instead.
    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: Fn(Action, ActionEvent) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.on_event = Some(Box::new(callback));
        self
    }

    /// Callback for failures of the event callback. Without one they go to
    /// the notification hook.
    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(BoxError) + Send + Sync + 'static,
    {
        self.on_error = Some(Box::new(callback));
        self
    }

    pub fn persistence_path(&self) -> &Path {
        &self.persistence_path
    }
}

impl fmt::Debug for PluginAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginAttributes")
            .field("persistence_path", &self.persistence_path)
            .field("on_event", &self.on_event.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

#[derive(Default)]
struct Callbacks {
    on_event: Option<EventCallback>,
    on_error: Option<ErrorCallback>,
}

impl Callbacks {
    fn dispatch(&self, action: Action, event: ActionEvent) {
        let Some(on_event) = &self.on_event else {
            return;
        };
        if let Err(e) = notify::run_callback("action event", || on_event(action, event)) {
            notify::report_callback_failure(self.on_error.as_deref(), e);
        }
    }
}

pub(crate) struct PluginInner {
    module: LoadedModule,
    /// Set once `create` returned; `None` when it failed.
    handle: OnceCell<Option<PluginHandle>>,
    callbacks: Callbacks,
}

impl Drop for PluginInner {
    fn drop(&mut self) {
        if let Some(Some(handle)) = self.handle.get() {
            let functions = self.module.functions();
            // SAFETY: each wrapper owns one reference to the handle.
            let status = unsafe { (functions.plugin_release)(*handle) };
            call::release("plugin", ErrorCode::check(status));
            debug!(handle = handle.raw(), "plugin released");
        }
    }
}

/// A reference to a plugin instance. Cloning shares the same reference.
#[derive(Clone)]
pub struct Plugin(Arc<PluginInner>);

impl Plugin {
    /// Create (or join) the module's plugin instance.
    pub fn create(module: &LoadedModule, attributes: PluginAttributes) -> Result<Self> {
        call::rich(|descriptor| Self::try_create(module, attributes, descriptor))
    }

    pub fn try_create(
        module: &LoadedModule,
        attributes: PluginAttributes,
        descriptor: &mut ErrorDescriptor,
    ) -> std::result::Result<Self, ErrorCode> {
        let path = attributes
            .persistence_path
            .to_str()
            .ok_or(ErrorCode::Logic(LogicErrc::InvalidArgument))?
            .to_owned();
        let inner = Arc::new(PluginInner {
            module: module.clone(),
            handle: OnceCell::new(),
            callbacks: Callbacks {
                on_event: attributes.on_event,
                on_error: attributes.on_error,
            },
        });

        let token = Weak::into_raw(Arc::downgrade(&inner)).cast_mut().cast::<c_void>();
        let created = Self::create_instance(module, &path, token, descriptor);
        match created {
            Ok(handle) => {
                // The token stays readable by the trampolines for as long as
                // the instance may notify, so it is never reclaimed.
                let _ = inner.handle.set(Some(handle));
                debug!(handle = handle.raw(), path = %path, "plugin created");
                Ok(Self(inner))
            }
            Err(code) => {
                // SAFETY: the instance was not created, nothing else holds the token.
                unsafe { drop(Weak::from_raw(token.cast_const().cast::<PluginInner>())) };
                let _ = inner.handle.set(None);
                Err(code)
            }
        }
    }

    fn create_instance(
        module: &LoadedModule,
        path: &str,
        token: *mut c_void,
        descriptor: &mut ErrorDescriptor,
    ) -> std::result::Result<PluginHandle, ErrorCode> {
        let functions = module.functions();
        let mut attr = PluginAttrHandle::NULL;
        call::try_invoke(descriptor, |err| unsafe {
            (functions.plugin_attr_create)(&mut attr, err)
        })?;

        let result = (|| -> std::result::Result<PluginHandle, ErrorCode> {
            let setters: [(_, ActionEventCallback); 3] = [
                (functions.plugin_attr_set_on_add, on_added),
                (functions.plugin_attr_set_on_modify, on_modified),
                (functions.plugin_attr_set_on_remove, on_removed),
            ];
            for (set, callback) in setters {
                call::try_invoke(descriptor, |err| unsafe {
                    set(attr, Some(callback), token, err)
                })?;
            }
            call::try_invoke(descriptor, |err| unsafe {
                (functions.plugin_attr_set_persistence_path)(attr, StringView::new(path), err)
            })?;

            let mut handle = PluginHandle::NULL;
            call::try_invoke(descriptor, |err| unsafe {
                (functions.plugin_create)(&mut handle, attr, err)
            })?;
            Ok(handle)
        })();

        // SAFETY: created above, destroyed exactly once.
        call::release(
            "plugin attributes",
            ErrorCode::check(unsafe { (functions.plugin_attr_destroy)(attr) }),
        );
        result
    }

    /// Another reference to the same instance, taken through the contract's
    /// reference count. The new wrapper receives no notifications.
    pub fn duplicate(&self) -> Result<Self> {
        let handle = self.handle()?;
        let functions = self.module().functions();
        // SAFETY: the handle is live while `self` is.
        call::invoke(|_| unsafe { (functions.plugin_addref)(handle) })?;
        let inner = PluginInner {
            module: self.module().clone(),
            handle: OnceCell::with_value(Some(handle)),
            callbacks: Callbacks::default(),
        };
        Ok(Self(Arc::new(inner)))
    }

    pub fn module(&self) -> &LoadedModule {
        &self.0.module
    }

    /// The contract handle. Blocks while creation is still in progress,
    /// which only happens inside notifications fired during creation.
    pub fn handle(&self) -> Result<PluginHandle> {
        self.try_handle().map_err(Error::from)
    }

    pub(crate) fn try_handle(&self) -> std::result::Result<PluginHandle, ErrorCode> {
        (*self.0.handle.wait()).ok_or(ErrorCode::Logic(LogicErrc::InvalidArgument))
    }

    pub fn version(&self) -> Result<PluginVersion> {
        PluginVersion::query(self.module())
    }

    pub fn descriptor(&self) -> Result<PluginDescriptor> {
        PluginDescriptor::query(self.module())
    }

    /// Snapshot of the plugin's current actions.
    pub fn actions(&self) -> Result<Vec<Action>> {
        call::rich(|descriptor| self.try_actions(descriptor))
    }

    pub fn try_actions(
        &self,
        descriptor: &mut ErrorDescriptor,
    ) -> std::result::Result<Vec<Action>, ErrorCode> {
        let plugin = self.try_handle()?;
        let functions = self.module().functions();
        let mut collection = ActionCollectionHandle::NULL;
        call::try_invoke(descriptor, |err| unsafe {
            (functions.action_collection_create)(&mut collection, err)
        })?;

        let result = (|| -> std::result::Result<Vec<Action>, ErrorCode> {
            call::try_invoke(descriptor, |err| unsafe {
                (functions.plugin_actions)(plugin, collection, err)
            })?;
            // SAFETY: the collection is live until destroyed below.
            let size = unsafe { (functions.action_collection_size)(collection) };
            let mut actions = Vec::with_capacity(usize::try_from(size).unwrap_or_default());
            for index in 0..size {
                let mut handle = ActionHandle::NULL;
                call::try_invoke(descriptor, |err| unsafe {
                    (functions.action_collection_at)(collection, index, &mut handle, err)
                })?;
                actions.push(Action::from_raw(self.clone(), handle));
            }
            Ok(actions)
        })();

        // SAFETY: created above, destroyed exactly once.
        call::release(
            "action collection",
            ErrorCode::check(unsafe { (functions.action_collection_destroy)(collection) }),
        );
        result
    }

    /// Rebuild an action from its serialized text.
    pub fn deserialize_action(&self, text: &str) -> Result<Action> {
        Action::deserialize(self, text)
    }

    /// Start a configuration session through the raw contract entry point.
    ///
    /// # Safety
    ///
    /// `user_data` must stay valid until `callback` has run.
    pub(crate) unsafe fn try_configure_raw(
        &self,
        mode: ConfigureMode,
        callback: ConfigFinishCallback,
        user_data: *mut c_void,
        descriptor: &mut ErrorDescriptor,
    ) -> std::result::Result<(), ErrorCode> {
        let plugin = self.try_handle()?;
        let functions = self.module().functions();
        let configure = match mode {
            ConfigureMode::Cli => functions.plugin_configure_cli,
            ConfigureMode::Gui => functions.plugin_configure_gui,
        };
        call::try_invoke(descriptor, |err| unsafe {
            configure(plugin, Some(callback), user_data, err)
        })
    }
}

impl PartialEq for Plugin {
    fn eq(&self, other: &Self) -> bool {
        self.0.module == other.0.module && self.0.handle.get() == other.0.handle.get()
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("module", &self.0.module.path())
            .field("handle", &self.0.handle.get())
            .finish()
    }
}

/// Front end a configuration session runs through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigureMode {
    Cli,
    Gui,
}

// ============================================================================
// Notification trampolines
// ============================================================================

unsafe extern "C" fn on_added(action: ActionHandle, user_data: *mut c_void) {
    // SAFETY: `user_data` is the token registered in `Plugin::try_create`.
    unsafe { dispatch(action, user_data, ActionEvent::Added) }
}

unsafe extern "C" fn on_modified(action: ActionHandle, user_data: *mut c_void) {
    // SAFETY: as above.
    unsafe { dispatch(action, user_data, ActionEvent::Modified) }
}

unsafe extern "C" fn on_removed(action: ActionHandle, user_data: *mut c_void) {
    // SAFETY: as above.
    unsafe { dispatch(action, user_data, ActionEvent::Removed) }
}

/// # Safety
///
/// `user_data` must be a token produced by `Weak::into_raw` on a
/// `PluginInner` and not yet reclaimed.
unsafe fn dispatch(action: ActionHandle, user_data: *mut c_void, event: ActionEvent) {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        // SAFETY: upheld by the caller; the token itself is never dropped here.
        let token = ManuallyDrop::new(unsafe {
            Weak::from_raw(user_data.cast_const().cast::<PluginInner>())
        });
        let Some(inner) = token.upgrade() else {
            debug!(action = action.raw(), %event, "notification for a dropped plugin");
            return;
        };
        let plugin = Plugin(inner);
        let action = Action::from_raw(plugin.clone(), action);
        plugin.0.callbacks.dispatch(action, event);
    }));
    if let Err(panic) = result {
        let message = panic_message(panic.as_ref());
        warn!(%event, panic = %message, "action callback panicked");
        notify::default_error_handler(&message, ErrorCode::Logic(LogicErrc::CallbackException));
    }
}
