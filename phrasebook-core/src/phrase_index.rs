//! Per-project phrase index
//!
//! Maps a normalized phrase to the note's primary key within one project.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Normalized phrase -> note pk, for a single project
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhraseIndex {
    entries: BTreeMap<String, u32>,
}

impl PhraseIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, phrase: &str) -> Option<u32> {
        self.entries.get(phrase).copied()
    }

    /// Key the next new note receives: one past the largest in use
    pub fn next_key(&self) -> u32 {
        self.entries
            .values()
            .max()
            .map_or(0, |max| max.saturating_add(1))
    }

    pub fn insert(&mut self, phrase: impl Into<String>, note: u32) {
        self.entries.insert(phrase.into(), note);
    }

    pub fn remove(&mut self, phrase: &str) -> Option<u32> {
        self.entries.remove(phrase)
    }

    /// Remove every phrase mapped to `note`, returning the removed phrases
    pub fn remove_note(&mut self, note: u32) -> Vec<String> {
        let phrases: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, pk)| **pk == note)
            .map(|(phrase, _)| phrase.clone())
            .collect();
        for phrase in &phrases {
            self.entries.remove(phrase);
        }
        phrases
    }

    /// Phrase stored for `note`, if any
    pub fn phrase_of(&self, note: u32) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, pk)| **pk == note)
            .map(|(phrase, _)| phrase.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.entries.iter().map(|(phrase, pk)| (phrase.as_str(), *pk))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_key_starts_at_zero_and_follows_max() {
        let mut index = PhraseIndex::new();
        assert_eq!(index.next_key(), 0);
        index.insert("cat", 0);
        index.insert("dog", 4);
        assert_eq!(index.next_key(), 5);
        index.remove("cat");
        assert_eq!(index.next_key(), 5);
    }

    #[test]
    fn test_remove_note_drops_all_aliases() {
        let mut index = PhraseIndex::new();
        index.insert("colour", 2);
        index.insert("color", 2);
        index.insert("hue", 3);

        let mut removed = index.remove_note(2);
        removed.sort();
        assert_eq!(removed, vec!["color", "colour"]);
        assert_eq!(index.len(), 1);
        assert_eq!(index.phrase_of(3), Some("hue"));
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let mut index = PhraseIndex::new();
        index.insert("cat", 0);
        assert_eq!(serde_json::to_string(&index).unwrap(), r#"{"cat":0}"#);
        let back: PhraseIndex = serde_json::from_str(r#"{"dog":3}"#).unwrap();
        assert_eq!(back.get("dog"), Some(3));
    }
}
