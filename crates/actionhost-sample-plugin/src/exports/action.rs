//! Action handles: serialization, descriptors and execution.

use std::collections::hash_map::DefaultHasher;
use std::ffi::{c_char, c_int, c_void};
use std::hash::{Hash, Hasher};

use actionhost_plugin_sdk::boundary::guard;
use actionhost_plugin_sdk::ffi::{ActionFinishCallback, UserData};
use actionhost_plugin_sdk::{
    ActionDescriptorHandle, ActionHandle, PluginError, PluginHandle, RawErrorDescriptor,
    RawPayload, RawStatus, Status, StringView, TextVariant,
};

use super::{descriptor_text, unknown, write_out, ACTION_DESCRIPTORS, FACTORY};
use crate::engine::action::{decode_id, encode_id, MAX_SERIALIZED_LEN};
use crate::metadata::DescriptorText;

fn require_action(action: ActionHandle) -> Result<u64, PluginError> {
    match action.id() {
        0 => Err(PluginError::invalid_argument("null action handle")),
        id => Ok(id),
    }
}

// ============================================================================
// Serialization
// ============================================================================

/// With a null `buffer`, stores the maximum serialized length in `size`.
/// Otherwise writes at most `*size` bytes and stores the written length.
#[no_mangle]
pub unsafe extern "C" fn ahp_action_serialize(
    action: ActionHandle,
    buffer: *mut c_char,
    size: *mut u64,
    err: *mut RawErrorDescriptor,
) -> RawStatus {
    guard(err, || {
        // SAFETY: null or valid per the contract.
        let size = unsafe { size.as_mut() }
            .ok_or_else(|| PluginError::invalid_argument("size pointer is null"))?;
        let id = require_action(action)?;
        if buffer.is_null() {
            *size = MAX_SERIALIZED_LEN;
            return Ok(());
        }

        let text = encode_id(id);
        if text.len() as u64 > *size {
            return Err(PluginError::Serialization(format!(
                "buffer of {} bytes is too small for {} bytes",
                *size,
                text.len()
            )));
        }
        // SAFETY: the caller provides `*size` writable bytes.
        unsafe { std::ptr::copy_nonoverlapping(text.as_ptr(), buffer.cast::<u8>(), text.len()) };
        *size = text.len() as u64;
        Ok(())
    })
}

#[no_mangle]
pub unsafe extern "C" fn ahp_action_deserialize(
    out: *mut ActionHandle,
    buffer: *const c_char,
    size: u64,
    err: *mut RawErrorDescriptor,
) -> RawStatus {
    guard(err, || {
        let view = StringView { data: buffer, size };
        // SAFETY: the caller provides `size` readable bytes.
        let id = decode_id(unsafe { view.as_bytes() })?;
        // SAFETY: forwarded from the caller.
        unsafe { write_out(out, ActionHandle::from_id(id)) }
    })
}

/// Action handles carry no plugin-side resources.
#[no_mangle]
pub unsafe extern "C" fn ahp_action_destroy(action: ActionHandle) -> RawStatus {
    guard(std::ptr::null_mut(), || require_action(action).map(drop))
}

#[no_mangle]
pub extern "C" fn ahp_action_hash(action: ActionHandle) -> u64 {
    let mut hasher = DefaultHasher::new();
    action.id().hash(&mut hasher);
    hasher.finish()
}

#[no_mangle]
pub extern "C" fn ahp_action_equal(lhs: ActionHandle, rhs: ActionHandle) -> c_int {
    c_int::from(lhs.id() == rhs.id())
}

// ============================================================================
// Descriptors
// ============================================================================

#[no_mangle]
pub unsafe extern "C" fn ahp_action_descriptor_create(
    plugin: PluginHandle,
    action: ActionHandle,
    out: *mut ActionDescriptorHandle,
    err: *mut RawErrorDescriptor,
) -> RawStatus {
    guard(err, || {
        let id = require_action(action)?;
        let info = FACTORY.get(plugin)?.registry().retrieve(id)?.info();
        let handle = ActionDescriptorHandle(
            ACTION_DESCRIPTORS.insert(DescriptorText::long_only(info.name, info.description)),
        );
        // SAFETY: forwarded from the caller.
        unsafe { write_out(out, handle) }
    })
}

#[no_mangle]
pub unsafe extern "C" fn ahp_action_descriptor_destroy(
    descriptor: ActionDescriptorHandle,
) -> RawStatus {
    guard(std::ptr::null_mut(), || {
        ACTION_DESCRIPTORS
            .remove(descriptor.raw())
            .map(drop)
            .ok_or_else(|| unknown("action descriptor", descriptor.raw()))
    })
}

#[no_mangle]
pub extern "C" fn ahp_action_descriptor_name(
    descriptor: ActionDescriptorHandle,
    variant: TextVariant,
) -> StringView {
    descriptor_text(
        &ACTION_DESCRIPTORS,
        descriptor.raw(),
        variant,
        |d| d.name.as_str(),
        |d| d.short_name.as_str(),
    )
}

#[no_mangle]
pub extern "C" fn ahp_action_descriptor_description(
    descriptor: ActionDescriptorHandle,
    variant: TextVariant,
) -> StringView {
    descriptor_text(
        &ACTION_DESCRIPTORS,
        descriptor.raw(),
        variant,
        |d| d.description.as_str(),
        |d| d.short_description.as_str(),
    )
}

// ============================================================================
// Execution
// ============================================================================

#[no_mangle]
pub unsafe extern "C" fn ahp_action_execute(
    plugin: PluginHandle,
    action: ActionHandle,
    payload: RawPayload,
    err: *mut RawErrorDescriptor,
) -> RawStatus {
    guard(err, || {
        let id = require_action(action)?;
        // SAFETY: the payload is valid for the duration of the call.
        let payload = unsafe { payload.decode() }.ok_or_else(|| {
            PluginError::InvalidPayload(format!("unknown tag {} or missing data", payload.tag))
        })?;
        FACTORY.get(plugin)?.execute(id, payload)
    })
}

/// On success the completion callback runs exactly once on a plugin thread.
/// On failure it is never invoked.
#[no_mangle]
pub unsafe extern "C" fn ahp_action_execute_async(
    plugin: PluginHandle,
    action: ActionHandle,
    payload: RawPayload,
    callback: Option<ActionFinishCallback>,
    user_data: *mut c_void,
    err: *mut RawErrorDescriptor,
) -> RawStatus {
    guard(err, || {
        let callback =
            callback.ok_or_else(|| PluginError::invalid_argument("callback must not be null"))?;
        let id = require_action(action)?;
        // SAFETY: the payload is valid for the duration of the call.
        let payload = unsafe { payload.decode() }.ok_or_else(|| {
            PluginError::InvalidPayload(format!("unknown tag {} or missing data", payload.tag))
        })?;
        let user_data = UserData(user_data);

        FACTORY.get(plugin)?.execute_async(
            id,
            payload,
            Box::new(move |outcome| {
                let (status, message) = match outcome {
                    Ok(()) => (Status::Success, String::new()),
                    Err(e) => (e.status(), e.to_string()),
                };
                // SAFETY: the host keeps the callback target alive until it
                // has been invoked; the message outlives the call.
                unsafe { callback(status.raw(), StringView::new(&message), user_data.get()) }
            }),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(buffer: &mut [u8]) -> RawErrorDescriptor {
        RawErrorDescriptor {
            what: buffer.as_mut_ptr().cast(),
            size: buffer.len() as u64,
        }
    }

    #[test]
    fn test_serialize_size_query() {
        let mut size = 0u64;
        let status = unsafe {
            ahp_action_serialize(
                ActionHandle::from_id(7),
                std::ptr::null_mut(),
                &mut size,
                std::ptr::null_mut(),
            )
        };
        assert_eq!(status, Status::Success.raw());
        assert_eq!(size, MAX_SERIALIZED_LEN);
    }

    #[test]
    fn test_serialize_then_deserialize() {
        let action = ActionHandle::from_id(0xabc);
        let mut buffer = [0u8; 16];
        let mut size = buffer.len() as u64;
        let status = unsafe {
            ahp_action_serialize(
                action,
                buffer.as_mut_ptr().cast(),
                &mut size,
                std::ptr::null_mut(),
            )
        };
        assert_eq!(status, Status::Success.raw());
        assert_eq!(&buffer[..size as usize], b"abc");

        let mut restored = ActionHandle::NULL;
        let status = unsafe {
            ahp_action_deserialize(
                &mut restored,
                buffer.as_ptr().cast(),
                size,
                std::ptr::null_mut(),
            )
        };
        assert_eq!(status, Status::Success.raw());
        assert_eq!(ahp_action_equal(action, restored), 1);
        assert_eq!(ahp_action_hash(action), ahp_action_hash(restored));
    }

    #[test]
    fn test_serialize_into_small_buffer_fails() {
        let mut buffer = [0u8; 2];
        let mut size = buffer.len() as u64;
        let mut text = [0u8; 128];
        let mut err = descriptor(&mut text);
        let status = unsafe {
            ahp_action_serialize(
                ActionHandle::from_id(0xabcdef),
                buffer.as_mut_ptr().cast(),
                &mut size,
                &mut err,
            )
        };
        assert_eq!(status, Status::ActionSerialization.raw());
        assert!(text.starts_with(b"buffer of 2 bytes"));
    }

    #[test]
    fn test_deserialize_rejects_garbage() {
        let mut out = ActionHandle::NULL;
        let input = b"not-hex";
        let status = unsafe {
            ahp_action_deserialize(
                &mut out,
                input.as_ptr().cast(),
                input.len() as u64,
                std::ptr::null_mut(),
            )
        };
        assert_eq!(status, Status::ActionSerialization.raw());
        assert!(out.is_null());
    }

    #[test]
    fn test_execute_unknown_plugin_is_invalid_argument() {
        let data = actionhost_plugin_sdk::PayloadData { int32: 1 };
        let payload = RawPayload {
            tag: actionhost_plugin_sdk::PayloadTag::Int32.raw(),
            data: &data,
        };
        let status = unsafe {
            ahp_action_execute(
                PluginHandle(u64::MAX),
                ActionHandle::from_id(1),
                payload,
                std::ptr::null_mut(),
            )
        };
        assert_eq!(status, Status::InvalidArgument.raw());
    }

    unsafe extern "C" fn ignore_completion(_: RawStatus, _: StringView, _: *mut c_void) {}

    #[test]
    fn test_execute_rejects_unknown_payload_tag() {
        let data = actionhost_plugin_sdk::PayloadData { int32: 1 };
        let bogus = RawPayload {
            tag: 99,
            data: &data,
        };

        let mut text = [0u8; 128];
        let mut err = descriptor(&mut text);
        let status = unsafe {
            ahp_action_execute(PluginHandle(u64::MAX), ActionHandle::from_id(1), bogus, &mut err)
        };
        assert_eq!(status, Status::PayloadInvalid.raw());
        assert!(String::from_utf8_lossy(&text).contains("unknown tag 99"));

        let status = unsafe {
            ahp_action_execute_async(
                PluginHandle(u64::MAX),
                ActionHandle::from_id(1),
                bogus,
                Some(ignore_completion),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            )
        };
        assert_eq!(status, Status::PayloadInvalid.raw());
    }

    #[test]
    fn test_configure_gui_not_implemented() {
        let mut text = [0u8; 128];
        let mut err = descriptor(&mut text);
        let status = unsafe {
            super::super::ahp_plugin_configure_gui(
                PluginHandle::NULL,
                None,
                std::ptr::null_mut(),
                &mut err,
            )
        };
        assert_eq!(status, Status::NotImplemented.raw());
        assert!(text.starts_with(b"GUI configuration is currently not implemented\0"));
    }
}
