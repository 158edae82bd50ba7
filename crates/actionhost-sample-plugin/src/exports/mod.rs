//! `extern "C"` implementation of the contract.
//!
//! Plugin-owned objects handed to the host (versions, attribute sets,
//! descriptors, collections) live in generational handle tables, so a stale
//! or forged handle is rejected instead of dereferenced.

mod action;
mod plugin;

use std::ffi::{c_int, c_void};
use std::path::PathBuf;

use actionhost_plugin_sdk::abi::{self, TEXT_LONG};
use actionhost_plugin_sdk::boundary::{guard, guard_value};
use actionhost_plugin_sdk::ffi::{ActionEventCallback, UserData};
use actionhost_plugin_sdk::{
    ActionHandle, HandleTable, PluginAttrHandle, PluginDescriptorHandle, PluginError,
    RawErrorDescriptor, RawStatus, Result, StringView, TextVariant, VersionHandle,
};
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::engine::{EngineOptions, Notifications, Notify, PluginFactory, PluginSettings};
use crate::metadata::{DescriptorText, VersionInfo, PLUGIN_VERSION};

pub use action::*;
pub use plugin::*;

// ============================================================================
// Process-wide state
// ============================================================================

static FACTORY: Lazy<PluginFactory> = Lazy::new(|| PluginFactory::new(EngineOptions::from_env()));

static VERSIONS: HandleTable<VersionInfo> = HandleTable::new();
static ATTRIBUTES: HandleTable<Mutex<AttributeSet>> = HandleTable::new();
static PLUGIN_DESCRIPTORS: HandleTable<DescriptorText> = HandleTable::new();
static ACTION_DESCRIPTORS: HandleTable<DescriptorText> = HandleTable::new();

/// Host callback registered on an attribute set.
#[derive(Debug, Clone, Copy)]
struct HostEventCallback {
    func: ActionEventCallback,
    user_data: UserData,
}

impl HostEventCallback {
    fn into_notify(self) -> Notify {
        let Self { func, user_data } = self;
        Box::new(move |id| {
            // SAFETY: the host guarantees the callback and its user data stay
            // valid for the lifetime of the plugin instance.
            unsafe { func(ActionHandle::from_id(id), user_data.get()) }
        })
    }
}

#[derive(Debug, Clone, Default)]
struct AttributeSet {
    on_add: Option<HostEventCallback>,
    on_modify: Option<HostEventCallback>,
    on_remove: Option<HostEventCallback>,
    persistence_path: Option<PathBuf>,
}

impl AttributeSet {
    fn into_settings(self) -> Result<PluginSettings> {
        let persistence_path = self.persistence_path.ok_or_else(|| {
            PluginError::PersistencePath {
                path: PathBuf::new(),
                reason: "no persistence path was set".to_string(),
            }
        })?;
        Ok(PluginSettings {
            persistence_path,
            notifications: Notifications {
                on_added: self.on_add.map(HostEventCallback::into_notify),
                on_modified: self.on_modify.map(HostEventCallback::into_notify),
                on_removed: self.on_remove.map(HostEventCallback::into_notify),
            },
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Store `value` through a caller-provided output pointer.
unsafe fn write_out<T>(out: *mut T, value: T) -> Result<()> {
    // SAFETY: null or valid per the contract.
    let slot = unsafe { out.as_mut() }
        .ok_or_else(|| PluginError::invalid_argument("output pointer is null"))?;
    *slot = value;
    Ok(())
}

fn unknown(kind: &str, raw: u64) -> PluginError {
    PluginError::invalid_argument(format!("unknown {kind} handle {raw:#x}"))
}

/// Long or short text of a descriptor stored in `table`.
///
/// The view borrows from the table entry and stays valid until the
/// descriptor is destroyed.
fn descriptor_text(
    table: &HandleTable<DescriptorText>,
    raw: u64,
    variant: TextVariant,
    long: fn(&DescriptorText) -> &str,
    short: fn(&DescriptorText) -> &str,
) -> StringView {
    guard_value(StringView::EMPTY, || {
        table.get(raw).map_or(StringView::EMPTY, |text| {
            if variant == TEXT_LONG {
                StringView::new(long(&text))
            } else {
                StringView::new(short(&text))
            }
        })
    })
}

// ============================================================================
// Introspection
// ============================================================================

#[no_mangle]
pub extern "C" fn ahp_version() -> u32 {
    abi::ABI_VERSION
}

#[no_mangle]
pub extern "C" fn ahp_is_library_compatible(host: u32) -> c_int {
    c_int::from(abi::is_compatible(host))
}

// ============================================================================
// Version object
// ============================================================================

#[no_mangle]
pub unsafe extern "C" fn ahp_version_create(
    out: *mut VersionHandle,
    err: *mut RawErrorDescriptor,
) -> RawStatus {
    guard(err, || {
        let handle = VersionHandle(VERSIONS.insert(PLUGIN_VERSION));
        // SAFETY: forwarded from the caller.
        unsafe { write_out(out, handle) }
    })
}

#[no_mangle]
pub unsafe extern "C" fn ahp_version_destroy(version: VersionHandle) -> RawStatus {
    guard(std::ptr::null_mut(), || {
        VERSIONS
            .remove(version.raw())
            .map(drop)
            .ok_or_else(|| unknown("version", version.raw()))
    })
}

fn version_field(version: VersionHandle, field: fn(&VersionInfo) -> u16) -> u16 {
    guard_value(0, || VERSIONS.get(version.raw()).map_or(0, |info| field(&info)))
}

fn version_text(version: VersionHandle, field: fn(&VersionInfo) -> &'static str) -> StringView {
    guard_value(StringView::EMPTY, || {
        VERSIONS
            .get(version.raw())
            .map_or(StringView::EMPTY, |info| StringView::new(field(&info)))
    })
}

#[no_mangle]
pub extern "C" fn ahp_version_major(version: VersionHandle) -> u16 {
    version_field(version, |v| v.major)
}

#[no_mangle]
pub extern "C" fn ahp_version_minor(version: VersionHandle) -> u16 {
    version_field(version, |v| v.minor)
}

#[no_mangle]
pub extern "C" fn ahp_version_patch(version: VersionHandle) -> u16 {
    version_field(version, |v| v.patch)
}

#[no_mangle]
pub extern "C" fn ahp_version_pre_release(version: VersionHandle) -> StringView {
    version_text(version, |v| v.pre_release)
}

#[no_mangle]
pub extern "C" fn ahp_version_build(version: VersionHandle) -> StringView {
    version_text(version, |v| v.build)
}

// ============================================================================
// Plugin attributes
// ============================================================================

#[no_mangle]
pub unsafe extern "C" fn ahp_plugin_attr_create(
    out: *mut PluginAttrHandle,
    err: *mut RawErrorDescriptor,
) -> RawStatus {
    guard(err, || {
        let handle = PluginAttrHandle(ATTRIBUTES.insert(Mutex::new(AttributeSet::default())));
        // SAFETY: forwarded from the caller.
        unsafe { write_out(out, handle) }
    })
}

#[no_mangle]
pub unsafe extern "C" fn ahp_plugin_attr_destroy(attr: PluginAttrHandle) -> RawStatus {
    guard(std::ptr::null_mut(), || {
        ATTRIBUTES
            .remove(attr.raw())
            .map(drop)
            .ok_or_else(|| unknown("attribute", attr.raw()))
    })
}

unsafe fn set_event_callback(
    attr: PluginAttrHandle,
    callback: Option<ActionEventCallback>,
    user_data: *mut c_void,
    err: *mut RawErrorDescriptor,
    slot: fn(&mut AttributeSet) -> &mut Option<HostEventCallback>,
) -> RawStatus {
    guard(err, || {
        let attributes = ATTRIBUTES
            .get(attr.raw())
            .ok_or_else(|| unknown("attribute", attr.raw()))?;
        let mut attributes = attributes.lock();
        *slot(&mut attributes) = callback.map(|func| HostEventCallback {
            func,
            user_data: UserData(user_data),
        });
        Ok(())
    })
}

#[no_mangle]
pub unsafe extern "C" fn ahp_plugin_attr_set_on_add(
    attr: PluginAttrHandle,
    callback: Option<ActionEventCallback>,
    user_data: *mut c_void,
    err: *mut RawErrorDescriptor,
) -> RawStatus {
    // SAFETY: forwarded from the caller.
    unsafe { set_event_callback(attr, callback, user_data, err, |a| &mut a.on_add) }
}

#[no_mangle]
pub unsafe extern "C" fn ahp_plugin_attr_set_on_modify(
    attr: PluginAttrHandle,
    callback: Option<ActionEventCallback>,
    user_data: *mut c_void,
    err: *mut RawErrorDescriptor,
) -> RawStatus {
    // SAFETY: forwarded from the caller.
    unsafe { set_event_callback(attr, callback, user_data, err, |a| &mut a.on_modify) }
}

#[no_mangle]
pub unsafe extern "C" fn ahp_plugin_attr_set_on_remove(
    attr: PluginAttrHandle,
    callback: Option<ActionEventCallback>,
    user_data: *mut c_void,
    err: *mut RawErrorDescriptor,
) -> RawStatus {
    // SAFETY: forwarded from the caller.
    unsafe { set_event_callback(attr, callback, user_data, err, |a| &mut a.on_remove) }
}

#[no_mangle]
pub unsafe extern "C" fn ahp_plugin_attr_set_persistence_path(
    attr: PluginAttrHandle,
    path: StringView,
    err: *mut RawErrorDescriptor,
) -> RawStatus {
    guard(err, || {
        // SAFETY: the view is valid for the duration of the call.
        let bytes = unsafe { path.as_bytes() };
        let text = std::str::from_utf8(bytes)
            .map_err(|_| PluginError::invalid_argument("persistence path is not valid UTF-8"))?;
        let attributes = ATTRIBUTES
            .get(attr.raw())
            .ok_or_else(|| unknown("attribute", attr.raw()))?;
        attributes.lock().persistence_path = Some(PathBuf::from(text));
        Ok(())
    })
}

// ============================================================================
// Plugin descriptor
// ============================================================================

#[no_mangle]
pub unsafe extern "C" fn ahp_plugin_descriptor_create(
    out: *mut PluginDescriptorHandle,
    err: *mut RawErrorDescriptor,
) -> RawStatus {
    guard(err, || {
        let handle = PluginDescriptorHandle(PLUGIN_DESCRIPTORS.insert(DescriptorText::plugin()));
        // SAFETY: forwarded from the caller.
        unsafe { write_out(out, handle) }
    })
}

#[no_mangle]
pub unsafe extern "C" fn ahp_plugin_descriptor_destroy(
    descriptor: PluginDescriptorHandle,
) -> RawStatus {
    guard(std::ptr::null_mut(), || {
        PLUGIN_DESCRIPTORS
            .remove(descriptor.raw())
            .map(drop)
            .ok_or_else(|| unknown("plugin descriptor", descriptor.raw()))
    })
}

#[no_mangle]
pub extern "C" fn ahp_plugin_descriptor_name(
    descriptor: PluginDescriptorHandle,
    variant: TextVariant,
) -> StringView {
    descriptor_text(
        &PLUGIN_DESCRIPTORS,
        descriptor.raw(),
        variant,
        |d| d.name.as_str(),
        |d| d.short_name.as_str(),
    )
}

#[no_mangle]
pub extern "C" fn ahp_plugin_descriptor_description(
    descriptor: PluginDescriptorHandle,
    variant: TextVariant,
) -> StringView {
    descriptor_text(
        &PLUGIN_DESCRIPTORS,
        descriptor.raw(),
        variant,
        |d| d.description.as_str(),
        |d| d.short_description.as_str(),
    )
}
