//! Callee side of the error descriptor protocol.

use crate::abi::RawErrorDescriptor;

/// Copy `message` into the caller's descriptor.
///
/// Nothing is written when `err` is null, its buffer is null or its remaining
/// capacity is zero. Otherwise `min(capacity, message.len())` bytes are
/// copied, the text is null-terminated inside the buffer (the last byte is
/// overwritten when the message does not fit) and `size` is decremented by the
/// number of bytes copied. Returns that number.
///
/// # Safety
///
/// `err` must be null or point to a valid descriptor whose `what` is null or
/// points to at least `size` writable bytes.
pub unsafe fn fill(err: *mut RawErrorDescriptor, message: &str) -> u64 {
    // SAFETY: null or valid per the contract.
    let Some(descriptor) = (unsafe { err.as_mut() }) else {
        return 0;
    };
    if descriptor.what.is_null() || descriptor.size == 0 {
        return 0;
    }

    let capacity = usize::try_from(descriptor.size).unwrap_or(usize::MAX);
    let copied = capacity.min(message.len());
    let buffer = descriptor.what.cast::<u8>();

    // SAFETY: `copied <= capacity` and the buffer holds `capacity` bytes.
    unsafe {
        std::ptr::copy_nonoverlapping(message.as_ptr(), buffer, copied);
        let terminator = if copied == capacity { copied - 1 } else { copied };
        *buffer.add(terminator) = 0;
    }

    descriptor.size -= copied as u64;
    copied as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::c_char;

    fn descriptor(buffer: &mut [u8]) -> RawErrorDescriptor {
        RawErrorDescriptor {
            what: buffer.as_mut_ptr().cast::<c_char>(),
            size: buffer.len() as u64,
        }
    }

    #[test]
    fn test_fill_fits() {
        let mut buffer = [0xffu8; 16];
        let mut err = descriptor(&mut buffer);
        let written = unsafe { fill(&mut err, "not found") };
        assert_eq!(written, 9);
        assert_eq!(err.size, 7);
        assert_eq!(&buffer[..10], b"not found\0");
    }

    #[test]
    fn test_fill_truncates_and_terminates() {
        let mut buffer = [0xffu8; 4];
        let mut err = descriptor(&mut buffer);
        let written = unsafe { fill(&mut err, "overflowing") };
        assert_eq!(written, 4);
        assert_eq!(err.size, 0);
        assert_eq!(&buffer, b"ove\0");
    }

    #[test]
    fn test_fill_ignores_null_and_empty() {
        assert_eq!(unsafe { fill(std::ptr::null_mut(), "x") }, 0);

        let mut null_buffer = RawErrorDescriptor {
            what: std::ptr::null_mut(),
            size: 32,
        };
        assert_eq!(unsafe { fill(&mut null_buffer, "x") }, 0);
        assert_eq!(null_buffer.size, 32);

        let mut buffer = [0u8; 4];
        let mut exhausted = RawErrorDescriptor {
            what: buffer.as_mut_ptr().cast(),
            size: 0,
        };
        assert_eq!(unsafe { fill(&mut exhausted, "x") }, 0);
    }
}
