//! Synchronization primitives used by the handshake protocols.

use parking_lot::{Condvar, Mutex};

/// A semaphore whose count saturates at one.
///
/// Provides exclusion plus hand-off: one side releases a token, the other
/// acquires it. Releasing an already available token has no effect.
#[derive(Debug, Default)]
pub struct BinarySemaphore {
    available: Mutex<bool>,
    signal: Condvar,
}

impl BinarySemaphore {
    pub fn new(available: bool) -> Self {
        Self {
            available: Mutex::new(available),
            signal: Condvar::new(),
        }
    }

    /// Block until the token is available, then take it.
    pub fn acquire(&self) {
        let mut available = self.available.lock();
        while !*available {
            self.signal.wait(&mut available);
        }
        *available = false;
    }

    /// Take the token if it is available, without blocking.
    pub fn try_acquire(&self) -> bool {
        let mut available = self.available.lock();
        std::mem::replace(&mut *available, false)
    }

    /// Make the token available and wake one waiter.
    pub fn release(&self) {
        *self.available.lock() = true;
        self.signal.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_try_acquire_is_single_shot() {
        let semaphore = BinarySemaphore::new(true);
        assert!(semaphore.try_acquire());
        assert!(!semaphore.try_acquire());
        semaphore.release();
        semaphore.release();
        assert!(semaphore.try_acquire());
        assert!(!semaphore.try_acquire());
    }

    #[test]
    fn test_hand_off_between_threads() {
        let semaphore = Arc::new(BinarySemaphore::new(false));
        let waiter = {
            let semaphore = Arc::clone(&semaphore);
            thread::spawn(move || semaphore.acquire())
        };
        semaphore.release();
        waiter.join().unwrap();
        assert!(!semaphore.try_acquire());
    }
}
