//! Concurrent action registry.
//!
//! Writers (`insert`, `modify`, `remove`) hold the exclusive lock while they
//! invoke the matching notification, so the host observes notifications in
//! exactly the order the mutations happened. A notification callback must
//! therefore never call back into the registry of the same plugin: doing so
//! deadlocks on the lock the writer still holds.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use actionhost_plugin_sdk::{PluginError, Result};
use parking_lot::RwLock;
use tracing::debug;

use super::action::{Action, ActionId, ActionInfo};

/// Notification invoked with the id of the affected action.
pub type Notify = Box<dyn Fn(ActionId) + Send + Sync>;

/// Host notifications for registry mutations. Missing entries are skipped.
#[derive(Default)]
pub struct Notifications {
    pub on_added: Option<Notify>,
    pub on_modified: Option<Notify>,
    pub on_removed: Option<Notify>,
}

impl std::fmt::Debug for Notifications {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifications")
            .field("on_added", &self.on_added.is_some())
            .field("on_modified", &self.on_modified.is_some())
            .field("on_removed", &self.on_removed.is_some())
            .finish()
    }
}

fn notify(callback: &Option<Notify>, id: ActionId) {
    if let Some(callback) = callback {
        callback(id);
    }
}

/// Set of actions keyed by id.
#[derive(Debug, Default)]
pub struct ActionRegistry {
    actions: RwLock<HashMap<ActionId, Arc<Action>>>,
    notifications: Notifications,
}

impl ActionRegistry {
    pub fn new(notifications: Notifications) -> Self {
        Self {
            actions: RwLock::new(HashMap::new()),
            notifications,
        }
    }

    /// Add `action` and notify the host before releasing the lock.
    pub fn insert(&self, action: Action) -> Result<ActionId> {
        let id = action.id();
        let mut actions = self.actions.write();
        if actions.contains_key(&id) {
            return Err(PluginError::ActionExists(id));
        }
        actions.insert(id, Arc::new(action));
        debug!(action_id = id, "action added");
        notify(&self.notifications.on_added, id);
        Ok(id)
    }

    /// Replace the metadata of an existing action.
    pub fn modify(&self, id: ActionId, info: ActionInfo) -> Result<()> {
        let actions = self.actions.write();
        let action = actions.get(&id).ok_or(PluginError::ActionNotFound(id))?;
        action.set_info(info);
        debug!(action_id = id, "action modified");
        notify(&self.notifications.on_modified, id);
        Ok(())
    }

    pub fn remove(&self, id: ActionId) -> Result<Arc<Action>> {
        let mut actions = self.actions.write();
        let action = actions.remove(&id).ok_or(PluginError::ActionNotFound(id))?;
        debug!(action_id = id, "action removed");
        notify(&self.notifications.on_removed, id);
        Ok(action)
    }

    pub fn retrieve(&self, id: ActionId) -> Result<Arc<Action>> {
        self.actions
            .read()
            .get(&id)
            .cloned()
            .ok_or(PluginError::ActionNotFound(id))
    }

    pub fn contains(&self, id: ActionId) -> bool {
        self.actions.read().contains_key(&id)
    }

    /// Ids of all current actions, ascending.
    pub fn snapshot(&self) -> Vec<ActionId> {
        let mut ids: Vec<_> = self.actions.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Run action `id` on `value` while holding the shared lock.
    pub fn execute(&self, id: ActionId, value: i32, out: &mut dyn Write) -> Result<()> {
        let actions = self.actions.read();
        let action = actions.get(&id).ok_or(PluginError::ActionNotFound(id))?;
        action.execute(value, out)
    }

    pub fn len(&self) -> usize {
        self.actions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Added(ActionId),
        Modified(ActionId),
        Removed(ActionId),
    }

    fn recording_registry() -> (ActionRegistry, Arc<Mutex<Vec<Event>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let added = Arc::clone(&events);
        let modified = Arc::clone(&events);
        let removed = Arc::clone(&events);
        let registry = ActionRegistry::new(Notifications {
            on_added: Some(Box::new(move |id| added.lock().push(Event::Added(id)))),
            on_modified: Some(Box::new(move |id| modified.lock().push(Event::Modified(id)))),
            on_removed: Some(Box::new(move |id| removed.lock().push(Event::Removed(id)))),
        });
        (registry, events)
    }

    #[test]
    fn test_mutations_notify_in_order() {
        let (registry, events) = recording_registry();
        registry.insert(Action::new(1, ActionInfo::new("a", "x"))).unwrap();
        registry.modify(1, ActionInfo::new("b", "y")).unwrap();
        registry.remove(1).unwrap();

        assert_eq!(
            *events.lock(),
            vec![Event::Added(1), Event::Modified(1), Event::Removed(1)]
        );
    }

    #[test]
    fn test_failed_mutations_do_not_notify() {
        let (registry, events) = recording_registry();
        registry.insert(Action::new(1, ActionInfo::default())).unwrap();
        assert!(matches!(
            registry.insert(Action::new(1, ActionInfo::default())),
            Err(PluginError::ActionExists(1))
        ));
        assert!(matches!(registry.remove(2), Err(PluginError::ActionNotFound(2))));
        assert!(matches!(
            registry.modify(2, ActionInfo::default()),
            Err(PluginError::ActionNotFound(2))
        ));
        assert_eq!(*events.lock(), vec![Event::Added(1)]);
    }

    #[test]
    fn test_retrieve_snapshot_execute() {
        let registry = ActionRegistry::default();
        for id in [3, 1, 2] {
            registry.insert(Action::new(id, ActionInfo::default())).unwrap();
        }
        assert_eq!(registry.snapshot(), vec![1, 2, 3]);
        assert_eq!(registry.retrieve(2).unwrap().id(), 2);

        let mut out = Vec::new();
        registry.execute(1, 4, &mut out).unwrap();
        assert_eq!(out, b"positive value 4\n");
        assert!(matches!(
            registry.execute(9, 4, &mut out),
            Err(PluginError::ActionNotFound(9))
        ));
    }
}
