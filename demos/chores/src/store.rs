//! In-memory chore storage.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// A stored chore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chore {
    pub id: u64,
    pub title: String,
    pub done: bool,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    chores: BTreeMap<u64, Chore>,
}

/// Shared chore list. Clones see the same data.
#[derive(Debug, Clone, Default)]
pub struct ChoreStore {
    inner: Arc<Mutex<Inner>>,
}

impl ChoreStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self) -> Vec<Chore> {
        self.inner.lock().chores.values().cloned().collect()
    }

    pub fn get(&self, id: u64) -> Option<Chore> {
        self.inner.lock().chores.get(&id).cloned()
    }

    pub fn insert(&self, title: impl Into<String>) -> Chore {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let chore = Chore {
            id: inner.next_id,
            title: title.into(),
            done: false,
        };
        inner.chores.insert(chore.id, chore.clone());
        chore
    }

    /// Marks a chore done. Returns the updated chore.
    pub fn complete(&self, id: u64) -> Option<Chore> {
        let mut inner = self.inner.lock();
        let chore = inner.chores.get_mut(&id)?;
        chore.done = true;
        Some(chore.clone())
    }

    pub fn remove(&self, id: u64) -> Option<Chore> {
        self.inner.lock().chores.remove(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_sequential_and_stable() {
        let store = ChoreStore::new();
        let first = store.insert("sweep");
        let second = store.insert("dust");
        assert_eq!((first.id, second.id), (1, 2));

        store.remove(1);
        assert_eq!(store.insert("mop").id, 3);
        assert_eq!(store.list().len(), 2);
    }

    #[test]
    fn test_complete() {
        let store = ChoreStore::new();
        let chore = store.insert("sweep");
        assert!(store.complete(chore.id).unwrap().done);
        assert!(store.get(chore.id).unwrap().done);
        assert!(store.complete(99).is_none());
    }
}
