//! Dirty-key tracking
//!
//! Membership is advisory. [`DirtyTracker::drain_snapshot`] copies the current
//! members and then removes exactly those, without a lock spanning both steps,
//! so a key re-marked in between is removed too and only picked up once it is
//! marked again. The flusher's period bounds how long that can leave a change
//! unsaved.

use chestvault_core::EntityKey;
use dashmap::DashSet;

#[derive(Debug, Default)]
pub struct DirtyTracker {
    keys: DashSet<EntityKey>,
}

impl DirtyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a key dirty. Returns `false` if it already was.
    pub fn mark(&self, key: EntityKey) -> bool {
        self.keys.insert(key)
    }

    /// Forget a key. Returns `false` if it was not dirty.
    pub fn clear(&self, key: &EntityKey) -> bool {
        self.keys.remove(key).is_some()
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Take the current members out of the set.
    pub fn drain_snapshot(&self) -> Vec<EntityKey> {
        let snapshot: Vec<EntityKey> = self.keys.iter().map(|key| *key).collect();
        for key in &snapshot {
            self.keys.remove(key);
        }
        snapshot
    }
}
