//! Caller side of the error descriptor protocol.

use std::borrow::Cow;

use actionhost_plugin_sdk::RawErrorDescriptor;

use crate::config;

/// Caller-owned buffer a plugin may fill with diagnostic text.
///
/// A descriptor without capacity asks the plugin for no text at all. Because
/// the plugin decrements the remaining capacity by the number of bytes it
/// copied, a descriptor whose remaining capacity dropped to zero received a
/// message that was cut short: see [`ErrorDescriptor::was_truncated`].
#[derive(Debug, Clone)]
pub struct ErrorDescriptor {
    buffer: Vec<u8>,
    remaining: u64,
}

impl ErrorDescriptor {
    /// Descriptor with the configured default capacity.
    pub fn new() -> Self {
        Self::with_capacity(config::env_vars::error_buffer_capacity())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: vec![0; capacity],
            remaining: capacity as u64,
        }
    }

    /// Descriptor that never receives text.
    pub fn null() -> Self {
        Self::with_capacity(0)
    }

    pub fn is_null(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Capacity left after the last call.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Forget any previous text.
    pub fn clear(&mut self) {
        self.buffer.fill(0);
        self.remaining = self.buffer.len() as u64;
    }

    /// Text written so far, up to the first NUL.
    pub fn view(&self) -> Cow<'_, str> {
        let end = self
            .buffer
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.buffer.len());
        String::from_utf8_lossy(&self.buffer[..end])
    }

    /// Owned copy of the text, `None` when empty.
    pub fn message(&self) -> Option<String> {
        let view = self.view();
        (!view.is_empty()).then(|| view.into_owned())
    }

    /// Whether the last message did not fit into the buffer.
    pub fn was_truncated(&self) -> bool {
        !self.is_null() && self.remaining == 0
    }

    /// Replace the text with a host-side message, using the same truncation
    /// rules as a plugin.
    pub(crate) fn write(&mut self, message: &str) {
        self.clear();
        // SAFETY: `with_raw` hands out a descriptor over this buffer or null.
        self.with_raw(|raw| unsafe { actionhost_plugin_sdk::error_descriptor::fill(raw, message) });
    }

    /// Run `f` with a raw descriptor pointing at this buffer and record the
    /// capacity the callee left.
    pub(crate) fn with_raw<R>(&mut self, f: impl FnOnce(*mut RawErrorDescriptor) -> R) -> R {
        if self.is_null() {
            return f(std::ptr::null_mut());
        }
        let mut raw = RawErrorDescriptor {
            what: self.buffer.as_mut_ptr().cast(),
            size: self.remaining,
        };
        let result = f(&mut raw);
        self.remaining = raw.size.min(self.buffer.len() as u64);
        result
    }
}

impl Default for ErrorDescriptor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_fits() {
        let mut descriptor = ErrorDescriptor::with_capacity(32);
        descriptor.write("action 4 not found");
        assert_eq!(descriptor.view(), "action 4 not found");
        assert_eq!(descriptor.message().as_deref(), Some("action 4 not found"));
        assert!(!descriptor.was_truncated());
    }

    #[test]
    fn test_message_truncated() {
        let mut descriptor = ErrorDescriptor::with_capacity(8);
        descriptor.write("a rather long message");
        assert_eq!(descriptor.view(), "a rathe");
        assert!(descriptor.was_truncated());

        descriptor.clear();
        assert_eq!(descriptor.message(), None);
        assert!(!descriptor.was_truncated());
        assert_eq!(descriptor.remaining(), 8);
    }

    #[test]
    fn test_null_descriptor_receives_nothing() {
        let mut descriptor = ErrorDescriptor::null();
        descriptor.with_raw(|raw| assert!(raw.is_null()));
        descriptor.write("ignored");
        assert!(descriptor.is_null());
        assert_eq!(descriptor.message(), None);
        assert!(!descriptor.was_truncated());
    }
}
