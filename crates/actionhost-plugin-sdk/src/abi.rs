//! Binary contract definitions.
//!
//! Every type in this module has a fixed C layout. Changing any of them in an
//! incompatible way requires bumping [`ABI_VERSION_MAJOR`].

use std::ffi::{c_char, c_int};
use std::fmt;
use std::ptr;

// ============================================================================
// Versioning
// ============================================================================

/// Major protocol version. Modules with a different major are rejected.
pub const ABI_VERSION_MAJOR: u16 = 1;

/// Minor protocol version. Minor bumps only add to the contract.
pub const ABI_VERSION_MINOR: u16 = 0;

/// Packed protocol version implemented by this crate.
pub const ABI_VERSION: u32 = pack_version(ABI_VERSION_MAJOR, ABI_VERSION_MINOR);

/// Pack `(major, minor)` as `(major << 16) | minor`.
pub const fn pack_version(major: u16, minor: u16) -> u32 {
    ((major as u32) << 16) | minor as u32
}

/// Split a packed version into `(major, minor)`.
pub const fn unpack_version(packed: u32) -> (u16, u16) {
    ((packed >> 16) as u16, (packed & 0xffff) as u16)
}

/// Two packed versions are compatible iff their majors are equal.
pub const fn versions_compatible(module: u32, host: u32) -> bool {
    unpack_version(module).0 == unpack_version(host).0
}

/// Compatibility predicate a module built against this crate exports.
pub const fn is_compatible(host: u32) -> bool {
    versions_compatible(ABI_VERSION, host)
}

// ============================================================================
// Status codes
// ============================================================================

/// Status code as it crosses the boundary.
///
/// Kept as a plain integer so that a misbehaving module returning an unknown
/// value cannot produce an invalid enum on the host side.
pub type RawStatus = i32;

/// Flat status enumeration shared by every contract operation.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Success = 0,
    Unknown = 1,
    NotImplemented = 2,
    Unavailable = 3,
    InvalidStatus = 4,
    InvalidArgument = 5,
    Alloc = 6,
    Fatal = 7,
    System = 8,
    Truncated = 9,
    Other = 10,
    PersistencePath = 11,
    Plugin = 12,
    ActionNotFound = 13,
    ActionExecution = 14,
    ActionOther = 15,
    ActionSerialization = 16,
    PayloadInvalid = 17,
}

impl Status {
    /// All codes, indexed by their raw value.
    pub const ALL: [Status; 18] = [
        Status::Success,
        Status::Unknown,
        Status::NotImplemented,
        Status::Unavailable,
        Status::InvalidStatus,
        Status::InvalidArgument,
        Status::Alloc,
        Status::Fatal,
        Status::System,
        Status::Truncated,
        Status::Other,
        Status::PersistencePath,
        Status::Plugin,
        Status::ActionNotFound,
        Status::ActionExecution,
        Status::ActionOther,
        Status::ActionSerialization,
        Status::PayloadInvalid,
    ];

    /// Raw value sent across the boundary.
    pub const fn raw(self) -> RawStatus {
        self as RawStatus
    }

    /// Decode a raw value, `None` if it is outside the enumeration.
    pub fn from_raw(raw: RawStatus) -> Option<Self> {
        usize::try_from(raw)
            .ok()
            .and_then(|index| Self::ALL.get(index).copied())
    }

    pub const fn is_success(self) -> bool {
        matches!(self, Status::Success)
    }

    /// Stable lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::Unknown => "unknown",
            Status::NotImplemented => "not_implemented",
            Status::Unavailable => "unavailable",
            Status::InvalidStatus => "invalid_status",
            Status::InvalidArgument => "invalid_argument",
            Status::Alloc => "error_alloc",
            Status::Fatal => "error_fatal",
            Status::System => "error_system",
            Status::Truncated => "error_truncated",
            Status::Other => "error_other",
            Status::PersistencePath => "error_persistence_path",
            Status::Plugin => "error_plugin",
            Status::ActionNotFound => "error_action_not_found",
            Status::ActionExecution => "error_action_execution",
            Status::ActionOther => "error_action_other",
            Status::ActionSerialization => "error_action_serialization",
            Status::PayloadInvalid => "error_payload_invalid",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome reported to a configuration completion callback.
pub type RawConfigStatus = u32;

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigStatus {
    Success = 0,
    Cancel = 1,
}

impl ConfigStatus {
    pub const fn raw(self) -> RawConfigStatus {
        self as RawConfigStatus
    }

    pub fn from_raw(raw: RawConfigStatus) -> Option<Self> {
        match raw {
            0 => Some(ConfigStatus::Success),
            1 => Some(ConfigStatus::Cancel),
            _ => None,
        }
    }
}

/// Selects the long (`0`) or short (non-zero) variant of descriptor text.
pub type TextVariant = c_int;

pub const TEXT_LONG: TextVariant = 0;
pub const TEXT_SHORT: TextVariant = 1;

// ============================================================================
// Strings and error descriptors
// ============================================================================

/// Borrowed byte span. Not null-terminated; `size` is authoritative.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct StringView {
    pub data: *const c_char,
    pub size: u64,
}

impl StringView {
    pub const EMPTY: StringView = StringView {
        data: ptr::null(),
        size: 0,
    };

    /// Borrow `text`. The view is only valid while `text` is.
    pub fn new(text: &str) -> Self {
        Self::from_bytes(text.as_bytes())
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            return Self::EMPTY;
        }
        Self {
            data: bytes.as_ptr().cast(),
            size: bytes.len() as u64,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_null() || self.size == 0
    }

    /// # Safety
    ///
    /// `data` must point to `size` readable bytes that stay valid for `'a`.
    pub unsafe fn as_bytes<'a>(&self) -> &'a [u8] {
        if self.is_empty() {
            return &[];
        }
        // SAFETY: upheld by the caller.
        unsafe { std::slice::from_raw_parts(self.data.cast::<u8>(), self.size as usize) }
    }

    /// # Safety
    ///
    /// Same as [`StringView::as_bytes`].
    pub unsafe fn to_string_lossy(&self) -> String {
        // SAFETY: upheld by the caller.
        String::from_utf8_lossy(unsafe { self.as_bytes() }).into_owned()
    }
}

/// Caller-owned text buffer a callee may fill with a diagnostic.
///
/// `what == null` or `size == 0` means no message is wanted. On every write
/// the callee decrements `size` by the number of bytes it used, so a caller
/// that knows the original capacity can tell how much was written.
#[repr(C)]
#[derive(Debug)]
pub struct RawErrorDescriptor {
    pub what: *mut c_char,
    pub size: u64,
}

// ============================================================================
// Payload
// ============================================================================

pub type RawPayloadTag = u32;

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadTag {
    None = 0,
    Int32 = 1,
    Int64 = 2,
    UInt32 = 3,
    UInt64 = 4,
    Float = 5,
    Double = 6,
    String = 7,
}

impl PayloadTag {
    pub const fn raw(self) -> RawPayloadTag {
        self as RawPayloadTag
    }

    pub fn from_raw(raw: RawPayloadTag) -> Option<Self> {
        Some(match raw {
            0 => PayloadTag::None,
            1 => PayloadTag::Int32,
            2 => PayloadTag::Int64,
            3 => PayloadTag::UInt32,
            4 => PayloadTag::UInt64,
            5 => PayloadTag::Float,
            6 => PayloadTag::Double,
            7 => PayloadTag::String,
            _ => return None,
        })
    }
}

/// Storage of a payload. Only the member named by the tag may be read.
#[repr(C)]
#[derive(Clone, Copy)]
pub union PayloadData {
    pub int32: i32,
    pub int64: i64,
    pub uint32: u32,
    pub uint64: u64,
    pub float: f32,
    pub double: f64,
    pub string: StringView,
}

/// Tagged payload. Memory is owned by the caller for the duration of the call.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawPayload {
    pub tag: RawPayloadTag,
    pub data: *const PayloadData,
}

impl RawPayload {
    pub const NONE: RawPayload = RawPayload {
        tag: PayloadTag::None as RawPayloadTag,
        data: ptr::null(),
    };

    /// Decode the payload.
    ///
    /// Returns `None` for an unknown tag or a missing data pointer on a
    /// non-empty tag.
    ///
    /// # Safety
    ///
    /// `data` must be null or point to a `PayloadData` whose active member
    /// matches `tag`; a string member must itself be valid for `'a`.
    pub unsafe fn decode<'a>(&self) -> Option<PayloadValue<'a>> {
        let tag = PayloadTag::from_raw(self.tag)?;
        if tag == PayloadTag::None {
            return Some(PayloadValue::None);
        }
        if self.data.is_null() {
            return None;
        }
        // SAFETY: non-null and tagged as checked above, the rest is upheld by the caller.
        let data = unsafe { &*self.data };
        let value = unsafe {
            match tag {
                PayloadTag::None => PayloadValue::None,
                PayloadTag::Int32 => PayloadValue::Int32(data.int32),
                PayloadTag::Int64 => PayloadValue::Int64(data.int64),
                PayloadTag::UInt32 => PayloadValue::UInt32(data.uint32),
                PayloadTag::UInt64 => PayloadValue::UInt64(data.uint64),
                PayloadTag::Float => PayloadValue::Float(data.float),
                PayloadTag::Double => PayloadValue::Double(data.double),
                PayloadTag::String => PayloadValue::String(data.string.as_bytes()),
            }
        };
        Some(value)
    }
}

/// Decoded view of a [`RawPayload`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PayloadValue<'a> {
    None,
    Int32(i32),
    Int64(i64),
    UInt32(u32),
    UInt64(u64),
    Float(f32),
    Double(f64),
    String(&'a [u8]),
}

impl PayloadValue<'_> {
    pub fn tag(&self) -> PayloadTag {
        match self {
            PayloadValue::None => PayloadTag::None,
            PayloadValue::Int32(_) => PayloadTag::Int32,
            PayloadValue::Int64(_) => PayloadTag::Int64,
            PayloadValue::UInt32(_) => PayloadTag::UInt32,
            PayloadValue::UInt64(_) => PayloadTag::UInt64,
            PayloadValue::Float(_) => PayloadTag::Float,
            PayloadValue::Double(_) => PayloadTag::Double,
            PayloadValue::String(_) => PayloadTag::String,
        }
    }
}

// ============================================================================
// Handles
// ============================================================================

macro_rules! contract_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[repr(transparent)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name(pub u64);

        impl $name {
            /// The null handle; never refers to a live object.
            pub const NULL: Self = Self(0);

            pub const fn is_null(self) -> bool {
                self.0 == 0
            }

            pub const fn raw(self) -> u64 {
                self.0
            }
        }
    };
}

contract_handle!(
    /// Plugin-owned version object.
    VersionHandle
);
contract_handle!(
    /// Plugin-owned attribute set used to create a plugin instance.
    PluginAttrHandle
);
contract_handle!(
    /// Reference-counted plugin instance.
    PluginHandle
);
contract_handle!(
    /// Plugin-owned descriptor of the plugin itself.
    PluginDescriptorHandle
);
contract_handle!(
    /// Plugin-owned snapshot of an action's descriptor.
    ActionDescriptorHandle
);
contract_handle!(
    /// Plugin-owned list of action handles.
    ActionCollectionHandle
);
contract_handle!(
    /// Identity of an action inside the plugin that produced it.
    ActionHandle
);

impl ActionHandle {
    /// The top bit is reserved and cleared by every reader.
    pub const RESERVED_BIT: u64 = 1 << 63;

    pub const fn from_id(id: u64) -> Self {
        Self(id & !Self::RESERVED_BIT)
    }

    /// Identity with the reserved bit masked off.
    pub const fn id(self) -> u64 {
        self.0 & !Self::RESERVED_BIT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_packing() {
        assert_eq!(pack_version(1, 2), 0x0001_0002);
        assert_eq!(unpack_version(0x0003_0004), (3, 4));
        assert_eq!(unpack_version(ABI_VERSION), (ABI_VERSION_MAJOR, ABI_VERSION_MINOR));
    }

    #[test]
    fn test_compatibility_depends_on_major_only() {
        for host_major in 0..4u16 {
            for module_major in 0..4u16 {
                for minor in [0u16, 1, 7, u16::MAX] {
                    let host = pack_version(host_major, 0);
                    let module = pack_version(module_major, minor);
                    assert_eq!(
                        versions_compatible(module, host),
                        host_major == module_major,
                        "host {host_major} module {module_major}.{minor}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_status_roundtrip_and_unknown_values() {
        for status in Status::ALL {
            assert_eq!(Status::from_raw(status.raw()), Some(status));
        }
        assert_eq!(Status::from_raw(-1), None);
        assert_eq!(Status::from_raw(18), None);
    }

    #[test]
    fn test_action_handle_reserved_bit() {
        let handle = ActionHandle(ActionHandle::RESERVED_BIT | 42);
        assert_eq!(handle.id(), 42);
        assert_eq!(ActionHandle::from_id(u64::MAX).id(), u64::MAX >> 1);
    }

    #[test]
    fn test_payload_decode() {
        let data = PayloadData { int32: -5 };
        let raw = RawPayload {
            tag: PayloadTag::Int32.raw(),
            data: &data,
        };
        assert_eq!(unsafe { raw.decode() }, Some(PayloadValue::Int32(-5)));

        let dangling_tag = RawPayload { tag: 99, data: &data };
        assert_eq!(unsafe { dangling_tag.decode() }, None);

        let missing = RawPayload {
            tag: PayloadTag::Int64.raw(),
            data: ptr::null(),
        };
        assert_eq!(unsafe { missing.decode() }, None);
        assert_eq!(unsafe { RawPayload::NONE.decode() }, Some(PayloadValue::None));
    }

    #[test]
    fn test_string_view() {
        let text = String::from("hello");
        let view = StringView::new(&text);
        assert_eq!(unsafe { view.as_bytes() }, b"hello");
        assert!(StringView::new("").is_empty());
        assert_eq!(unsafe { StringView::EMPTY.to_string_lossy() }, "");
    }
}
