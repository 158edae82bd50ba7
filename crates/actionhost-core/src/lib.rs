//! actionhost host library
//!
//! Loads plugin modules that implement the actionhost contract and exposes
//! them through owned, typed wrappers.
//!
//! ```rust,ignore
//! use actionhost_core::{ActionExecutor, LoadedModule, Plugin, PluginAttributes};
//!
//! let module = LoadedModule::load("libactionhost_sample_plugin.so")?;
//! let plugin = Plugin::create(&module, PluginAttributes::new("/tmp/actions"))?;
//! for action in plugin.actions()? {
//!     println!("{}: {}", action, action.descriptor()?.name);
//!     action.execute(42i32)?;
//! }
//! ```
//!
//! Every fallible operation comes in two forms. The plain form returns an
//! [`Error`] carrying the plugin's diagnostic text. The `try_` form writes
//! that text into a caller-provided [`ErrorDescriptor`] and returns only the
//! [`ErrorCode`], so it never allocates on the error path.

pub mod action;
pub mod config;
pub mod configurator;
pub mod descriptor;
pub mod error;
pub mod error_descriptor;
pub mod executor;
pub mod function_table;
pub mod module;
pub mod notify;
pub mod payload;
pub mod plugin;
pub mod version;

mod call;

pub use action::Action;
pub use configurator::{PluginConfigurator, PluginConfiguratorAsync};
pub use descriptor::{ActionDescriptor, BasicDescriptor, PluginDescriptor};
pub use error::{
    ActionErrc, Category, Error, ErrorCode, GenericErrc, LoadError, LogicErrc, PluginErrc, Result,
};
pub use error_descriptor::ErrorDescriptor;
pub use executor::ActionExecutor;
pub use function_table::FunctionTable;
pub use module::{LoadedModule, ModuleRegistry, StaticSymbols, SymbolResolver};
pub use notify::{default_error_handler, reset_default_error_handler, set_default_error_handler};
pub use payload::Payload;
pub use plugin::{ActionEvent, BoxError, ConfigureMode, Plugin, PluginAttributes};
pub use version::{LibraryVersion, PluginVersion};

pub use actionhost_plugin_sdk::ConfigStatus;
