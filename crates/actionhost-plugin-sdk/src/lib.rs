//! actionhost plugin SDK
//!
//! The binary contract shared by hosts and plugin modules, plus the helpers a
//! plugin needs to implement it safely.
//!
//! # Contract
//!
//! Everything that crosses the module boundary is defined in [`abi`] and
//! [`ffi`]: status codes, the payload union, string views, the error
//! descriptor buffer, typed handles and one function-pointer type per exported
//! operation. The layout of these items is frozen for a given
//! [`abi::ABI_VERSION_MAJOR`].
//!
//! # Writing a plugin
//!
//! ```rust,ignore
//! use actionhost_plugin_sdk::{abi, boundary, PluginError};
//!
//! #[no_mangle]
//! pub extern "C" fn ahp_version() -> u32 {
//!     abi::ABI_VERSION
//! }
//!
//! #[no_mangle]
//! pub extern "C" fn ahp_is_library_compatible(host: u32) -> i32 {
//!     abi::is_compatible(host) as i32
//! }
//!
//! #[no_mangle]
//! pub unsafe extern "C" fn ahp_plugin_addref(plugin: abi::PluginHandle) -> abi::RawStatus {
//!     boundary::guard(std::ptr::null_mut(), || {
//!         // look the instance up and bump its reference count
//!         Ok::<(), PluginError>(())
//!     })
//! }
//! ```
//!
//! Every export must go through [`boundary::guard`] (or
//! [`boundary::guard_value`]) so that no panic unwinds into the host.

pub mod abi;
pub mod boundary;
pub mod error;
pub mod error_descriptor;
pub mod ffi;
pub mod handle;
pub mod sync;

pub use abi::{
    ActionCollectionHandle, ActionDescriptorHandle, ActionHandle, ConfigStatus, PayloadData,
    PayloadTag, PayloadValue, PluginAttrHandle, PluginDescriptorHandle, PluginHandle,
    RawConfigStatus, RawErrorDescriptor, RawPayload, RawStatus, Status, StringView, TextVariant,
    VersionHandle,
};
pub use error::{PluginError, Result};
pub use handle::HandleTable;
pub use sync::BinarySemaphore;
