//! Single-instance plugin factory.
//!
//! The first `create` starts an instance with a reference count of one; every
//! further `create` (and every `add_ref`) bumps the count and hands out the
//! same handle. The instance is torn down when `release` brings the count back
//! to zero. Attributes passed to a `create` that reuses the live instance are
//! ignored.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use actionhost_plugin_sdk::{PluginError, PluginHandle, Result};
use parking_lot::Mutex;
use tracing::debug;

use super::action::IdGenerator;
use super::instance::{EngineOptions, PluginInstance, PluginSettings};

struct Live {
    handle: PluginHandle,
    instance: Arc<PluginInstance>,
    refs: usize,
}

/// Owns the (at most one) live plugin instance.
pub struct PluginFactory {
    live: Mutex<Option<Live>>,
    ids: Arc<IdGenerator>,
    options: EngineOptions,
    next_handle: AtomicU64,
}

impl PluginFactory {
    pub fn new(options: EngineOptions) -> Self {
        Self {
            live: Mutex::new(None),
            ids: Arc::new(IdGenerator::new()),
            options,
            next_handle: AtomicU64::new(1),
        }
    }

    /// Return the live instance with one more reference, or start a new one.
    pub fn create(&self, settings: PluginSettings) -> Result<PluginHandle> {
        let mut live = self.live.lock();
        if let Some(live) = live.as_mut() {
            live.refs += 1;
            debug!(refs = live.refs, "reusing live plugin instance");
            return Ok(live.handle);
        }

        let instance = PluginInstance::new(settings, Arc::clone(&self.ids), &self.options)?;
        let handle = PluginHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        *live = Some(Live {
            handle,
            instance: Arc::new(instance),
            refs: 1,
        });
        debug!(handle = handle.raw(), "plugin instance created");
        Ok(handle)
    }

    /// Resolve `handle` to the live instance.
    pub fn get(&self, handle: PluginHandle) -> Result<Arc<PluginInstance>> {
        match self.live.lock().as_ref() {
            Some(live) if live.handle == handle => Ok(Arc::clone(&live.instance)),
            _ => Err(unknown_handle(handle)),
        }
    }

    pub fn add_ref(&self, handle: PluginHandle) -> Result<()> {
        match self.live.lock().as_mut() {
            Some(live) if live.handle == handle => {
                live.refs += 1;
                Ok(())
            }
            _ => Err(unknown_handle(handle)),
        }
    }

    /// Drop one reference; the last one stops the instance.
    pub fn release(&self, handle: PluginHandle) -> Result<()> {
        let retired = {
            let mut guard = self.live.lock();
            match guard.as_mut() {
                Some(live) if live.handle == handle => {
                    live.refs -= 1;
                    if live.refs == 0 {
                        guard.take()
                    } else {
                        None
                    }
                }
                _ => return Err(unknown_handle(handle)),
            }
        };
        // Stopping joins the instance threads; their callbacks may call back
        // into the factory, so the lock must already be released here.
        if let Some(live) = retired {
            debug!(handle = handle.raw(), "releasing last plugin reference");
            drop(live);
        }
        Ok(())
    }

    /// Current reference count, `0` when no instance is live.
    pub fn ref_count(&self) -> usize {
        self.live.lock().as_ref().map_or(0, |live| live.refs)
    }
}

fn unknown_handle(handle: PluginHandle) -> PluginError {
    PluginError::invalid_argument(format!("unknown plugin handle {:#x}", handle.raw()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::registry::Notifications;

    fn settings(dir: &tempfile::TempDir) -> PluginSettings {
        PluginSettings {
            persistence_path: dir.path().to_path_buf(),
            notifications: Notifications::default(),
        }
    }

    fn quiet_factory() -> PluginFactory {
        PluginFactory::new(EngineOptions {
            scripted_mutations: false,
            ..EngineOptions::default()
        })
    }

    #[test]
    fn test_second_create_returns_same_instance() {
        let dir = tempfile::tempdir().unwrap();
        let factory = quiet_factory();

        let first = factory.create(settings(&dir)).unwrap();
        let second = factory.create(settings(&dir)).unwrap();
        assert_eq!(first, second);
        assert_eq!(factory.ref_count(), 2);
        assert!(Arc::ptr_eq(&factory.get(first).unwrap(), &factory.get(second).unwrap()));

        factory.release(first).unwrap();
        assert!(factory.get(first).is_ok());
        factory.release(second).unwrap();
        assert_eq!(factory.ref_count(), 0);
        assert!(factory.get(first).is_err());
    }

    #[test]
    fn test_new_instance_after_full_release_gets_new_handle() {
        let dir = tempfile::tempdir().unwrap();
        let factory = quiet_factory();

        let first = factory.create(settings(&dir)).unwrap();
        factory.add_ref(first).unwrap();
        factory.release(first).unwrap();
        factory.release(first).unwrap();
        assert!(factory.release(first).is_err());

        let second = factory.create(settings(&dir)).unwrap();
        assert_ne!(first, second);
        factory.release(second).unwrap();
    }

    #[test]
    fn test_create_rejects_bad_persistence_path() {
        let dir = tempfile::tempdir().unwrap();
        let factory = quiet_factory();
        let result = factory.create(PluginSettings {
            persistence_path: dir.path().join("absent"),
            notifications: Notifications::default(),
        });
        assert!(matches!(result, Err(PluginError::PersistencePath { .. })));
        assert_eq!(factory.ref_count(), 0);
    }
}
