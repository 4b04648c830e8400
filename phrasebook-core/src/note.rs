//! Note and project records
//!
//! Core types persisted in the key-value store.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Relation type every new project declares unless told otherwise
pub const SEE_ALSO: &str = "see also";

/// Name of project zero
pub const DEFAULT_PROJECT: &str = "default";

/// Composite identity of a note: `(project pk, note pk)`
///
/// Encoded as `"<project>:<note>"` for store and cache keys, and as a
/// two-element array inside relation lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NoteKey(pub u32, pub u32);

impl NoteKey {
    pub fn new(project: u32, note: u32) -> Self {
        Self(project, note)
    }

    /// Primary key of the owning project
    pub fn project(&self) -> u32 {
        self.0
    }

    /// Primary key of the note within its project
    pub fn note(&self) -> u32 {
        self.1
    }
}

impl std::fmt::Display for NoteKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.0, self.1)
    }
}

impl std::str::FromStr for NoteKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (project, note) = s
            .split_once(':')
            .ok_or_else(|| Error::InvalidKey(s.to_string()))?;
        let project = project
            .parse()
            .map_err(|_| Error::InvalidKey(s.to_string()))?;
        let note = note.parse().map_err(|_| Error::InvalidKey(s.to_string()))?;
        Ok(Self(project, note))
    }
}

/// One place a phrase was seen
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// Page the phrase was found on
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Text preceding the occurrence
    #[serde(default)]
    pub before: String,
    /// The occurrence itself, as written on the page
    #[serde(default)]
    pub phrase: String,
    /// Text following the occurrence
    #[serde(default)]
    pub after: String,
    /// Every time this citation was recorded
    #[serde(default)]
    pub when: Vec<DateTime<Utc>>,
}

impl Citation {
    pub fn new(url: impl Into<String>, phrase: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            phrase: phrase.into(),
            ..Default::default()
        }
    }

    pub fn at(mut self, when: DateTime<Utc>) -> Self {
        self.when.push(when);
        self
    }

    pub fn with_context(mut self, before: impl Into<String>, after: impl Into<String>) -> Self {
        self.before = before.into();
        self.after = after.into();
        self
    }
}

/// Payload stored for one phrase in one project
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoteRecord {
    #[serde(default)]
    pub starred: bool,
    /// Short definition or translation
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub gist: String,
    /// Free-form notes
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub details: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub citations: Vec<Citation>,
    /// Relation type -> notes on the other end
    #[serde(default)]
    pub relations: BTreeMap<String, Vec<NoteKey>>,
}

impl NoteRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starred(mut self, starred: bool) -> Self {
        self.starred = starred;
        self
    }

    pub fn gist(mut self, gist: impl Into<String>) -> Self {
        self.gist = gist.into();
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn citation(mut self, citation: Citation) -> Self {
        self.citations.push(citation);
        self
    }

    /// Add an outgoing relation, ignoring duplicates
    pub fn relate(mut self, relation: impl Into<String>, target: NoteKey) -> Self {
        self.add_relation(&relation.into(), target);
        self
    }

    /// Whether `target` is listed under `relation`
    pub fn has_relation(&self, relation: &str, target: NoteKey) -> bool {
        self.relations
            .get(relation)
            .is_some_and(|targets| targets.contains(&target))
    }

    /// Append `target` under `relation` unless present; returns whether it was added
    pub fn add_relation(&mut self, relation: &str, target: NoteKey) -> bool {
        let targets = self.relations.entry(relation.to_string()).or_default();
        if targets.contains(&target) {
            return false;
        }
        targets.push(target);
        true
    }

    /// Remove `target` from `relation`, dropping the list once empty
    pub fn remove_relation(&mut self, relation: &str, target: NoteKey) -> bool {
        let Some(targets) = self.relations.get_mut(relation) else {
            return false;
        };
        let before = targets.len();
        targets.retain(|k| *k != target);
        let removed = targets.len() != before;
        if targets.is_empty() {
            self.relations.remove(relation);
        }
        removed
    }

    /// Keep only the relation entries `keep` accepts; returns whether anything changed
    pub fn retain_relations(&mut self, mut keep: impl FnMut(&NoteKey) -> bool) -> bool {
        let mut changed = false;
        self.relations.retain(|_, targets| {
            let before = targets.len();
            targets.retain(|k| keep(k));
            changed |= targets.len() != before;
            !targets.is_empty()
        });
        changed
    }

    /// Every timestamp across all citations
    pub fn timestamps(&self) -> impl Iterator<Item = &DateTime<Utc>> {
        self.citations.iter().flat_map(|c| c.when.iter())
    }
}

/// Configuration of one project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub pk: u32,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Normalizer registry key; empty selects the default
    #[serde(default)]
    pub normalizer: String,
    /// Declared relation pairs; a pair with equal sides is symmetric
    #[serde(default)]
    pub relations: Vec<(String, String)>,
    /// Note pk the next new phrase receives; only ever grows
    #[serde(default, rename = "nextNote")]
    pub next_note: u32,
}

impl ProjectInfo {
    /// The catch-all project that always exists
    pub fn default_project() -> Self {
        Self {
            pk: 0,
            name: DEFAULT_PROJECT.to_string(),
            description: String::new(),
            normalizer: String::new(),
            relations: vec![(SEE_ALSO.to_string(), SEE_ALSO.to_string())],
            next_note: 0,
        }
    }

    /// Paired relation type for `relation`, if declared
    pub fn reverse_relation(&self, relation: &str) -> Option<&str> {
        self.relations.iter().find_map(|(a, b)| {
            if a == relation {
                Some(b.as_str())
            } else if b == relation {
                Some(a.as_str())
            } else {
                None
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_key_display_and_parse() {
        let key = NoteKey::new(3, 17);
        assert_eq!(key.to_string(), "3:17");
        assert_eq!("3:17".parse::<NoteKey>().unwrap(), key);
        assert!("3-17".parse::<NoteKey>().is_err());
        assert!("x:1".parse::<NoteKey>().is_err());
    }

    #[test]
    fn test_note_key_serializes_as_pair() {
        let json = serde_json::to_string(&NoteKey::new(1, 2)).unwrap();
        assert_eq!(json, "[1,2]");
    }

    #[test]
    fn test_remove_relation_drops_empty_list() {
        let mut note = NoteRecord::new().relate("synonym", NoteKey::new(0, 1));
        assert!(note.has_relation("synonym", NoteKey::new(0, 1)));
        assert!(note.remove_relation("synonym", NoteKey::new(0, 1)));
        assert!(!note.relations.contains_key("synonym"));
        assert!(!note.remove_relation("synonym", NoteKey::new(0, 1)));
    }

    #[test]
    fn test_add_relation_ignores_duplicates() {
        let mut note = NoteRecord::new();
        assert!(note.add_relation(SEE_ALSO, NoteKey::new(0, 4)));
        assert!(!note.add_relation(SEE_ALSO, NoteKey::new(0, 4)));
        assert_eq!(note.relations[SEE_ALSO].len(), 1);
    }

    #[test]
    fn test_retain_relations_across_types() {
        let mut note = NoteRecord::new()
            .relate(SEE_ALSO, NoteKey::new(2, 0))
            .relate("part", NoteKey::new(2, 1))
            .relate("part", NoteKey::new(0, 5));
        assert!(note.retain_relations(|k| k.project() != 2));
        assert!(!note.relations.contains_key(SEE_ALSO));
        assert_eq!(note.relations["part"], vec![NoteKey::new(0, 5)]);
        assert!(!note.retain_relations(|k| k.project() != 2));
    }

    #[test]
    fn test_reverse_relation() {
        let project = ProjectInfo {
            relations: vec![
                ("part".into(), "whole".into()),
                ("synonym".into(), "synonym".into()),
            ],
            ..ProjectInfo::default_project()
        };
        assert_eq!(project.reverse_relation("part"), Some("whole"));
        assert_eq!(project.reverse_relation("whole"), Some("part"));
        assert_eq!(project.reverse_relation("synonym"), Some("synonym"));
        assert_eq!(project.reverse_relation(SEE_ALSO), None);
    }

    #[test]
    fn test_note_record_tolerates_missing_fields() {
        let note: NoteRecord = serde_json::from_str(r#"{"starred":true}"#).unwrap();
        assert!(note.starred);
        assert!(note.tags.is_empty());
        assert!(note.relations.is_empty());
    }
}
