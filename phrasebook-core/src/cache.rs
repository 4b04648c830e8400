//! Read-through note cache
//!
//! The cache owns its records; every read hands out a clone so callers can
//! mutate what they get without touching cached state.

use dashmap::DashMap;

use crate::note::{NoteKey, NoteRecord};

/// In-memory mirror of note records read from or written to the store
#[derive(Debug, Default)]
pub struct NoteCache {
    notes: DashMap<NoteKey, NoteRecord>,
}

impl NoteCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a cached note
    pub fn get(&self, key: &NoteKey) -> Option<NoteRecord> {
        self.notes.get(key).map(|entry| entry.clone())
    }

    pub fn contains(&self, key: &NoteKey) -> bool {
        self.notes.contains_key(key)
    }

    /// Store a copy of `note`
    pub fn set(&self, key: NoteKey, note: NoteRecord) {
        self.notes.insert(key, note);
    }

    pub fn delete(&self, key: &NoteKey) -> Option<NoteRecord> {
        self.notes.remove(key).map(|(_, note)| note)
    }

    /// Drop every note belonging to `project`
    pub fn delete_project(&self, project: u32) {
        self.notes.retain(|key, _| key.project() != project);
    }

    pub fn clear(&self) {
        self.notes.clear();
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_returned_snapshot_does_not_alias_cache() {
        let cache = NoteCache::new();
        let key = NoteKey::new(0, 0);
        cache.set(key, NoteRecord::new().tag("animal"));

        let mut copy = cache.get(&key).unwrap();
        copy.tags.insert("pet".to_string());
        copy.starred = true;

        let cached = cache.get(&key).unwrap();
        assert_eq!(cached.tags.len(), 1);
        assert!(!cached.starred);
    }

    #[test]
    fn test_delete_project() {
        let cache = NoteCache::new();
        cache.set(NoteKey::new(0, 0), NoteRecord::new());
        cache.set(NoteKey::new(1, 0), NoteRecord::new());
        cache.set(NoteKey::new(1, 1), NoteRecord::new());

        cache.delete_project(1);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&NoteKey::new(0, 0)));

        cache.clear();
        assert!(cache.is_empty());
    }
}
