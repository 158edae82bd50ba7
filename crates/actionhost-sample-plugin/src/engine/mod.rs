//! Plugin engine, independent of the binary contract.

pub mod action;
pub mod factory;
pub mod instance;
pub mod registry;

pub use action::{Action, ActionId, ActionInfo, IdGenerator};
pub use factory::PluginFactory;
pub use instance::{
    CompletionCallback, ConfigureCallback, EngineOptions, ExecutionLog, PluginInstance,
    PluginSettings,
};
pub use registry::{ActionRegistry, Notifications, Notify};
