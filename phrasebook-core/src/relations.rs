//! Relation manager
//!
//! Relations are stored on both ends: when note A lists B under relation R,
//! B lists A under the reverse of R declared by A's project. Everything here
//! keeps the two sides in step.

use std::collections::{BTreeSet, HashMap};

use crate::book::PhraseBook;
use crate::error::{Error, Result};
use crate::note::{NoteKey, NoteRecord, ProjectInfo};
use crate::project::ProjectRef;

impl PhraseBook {
    /// Add the mirror of every outgoing relation of `record`
    ///
    /// Targets already in `pending` are edited there; the rest are read
    /// cache-first. Returns every changed target, `pending` included. A
    /// relation of the note to itself is mirrored on `record` directly.
    pub(crate) async fn mirror_relations(
        &self,
        key: NoteKey,
        record: &mut NoteRecord,
        project: &ProjectInfo,
        pending: HashMap<NoteKey, NoteRecord>,
    ) -> Result<HashMap<NoteKey, NoteRecord>> {
        let mut pairs = Vec::with_capacity(record.relations.len());
        for relation in record.relations.keys() {
            let reverse = project
                .reverse_relation(relation)
                .ok_or_else(|| Error::no_reverse(relation.clone(), project.name.clone()))?;
            pairs.push((relation.clone(), reverse.to_string()));
        }

        let mut touched = pending;
        let targets: BTreeSet<NoteKey> = record
            .relations
            .values()
            .flatten()
            .copied()
            .filter(|target| *target != key && !touched.contains_key(target))
            .collect();
        let targets: Vec<NoteKey> = targets.into_iter().collect();
        let mut neighbours = self.fetch_notes(&targets).await?;
        if let Some(missing) = targets.iter().find(|t| !neighbours.contains_key(t)) {
            return Err(Error::unreachable(format!(
                "related note {} is neither cached nor stored",
                missing
            )));
        }

        for (relation, reverse) in pairs {
            let outgoing = record.relations.get(&relation).cloned().unwrap_or_default();
            for target in outgoing {
                if target == key {
                    record.add_relation(&reverse, key);
                    continue;
                }
                if let Some(neighbour) = touched.get_mut(&target) {
                    neighbour.add_relation(&reverse, key);
                    continue;
                }
                let Some(neighbour) = neighbours.get_mut(&target) else {
                    continue;
                };
                if neighbour.add_relation(&reverse, key) {
                    touched.insert(target, neighbour.clone());
                }
            }
        }
        Ok(touched)
    }

    /// Drop the mirrors of relations `previous` had and `record` no longer has
    ///
    /// Used when a note is overwritten. A dropped relation whose type the
    /// project no longer declares strips the note from the target entirely,
    /// unless `record` still points at that target. Targets that no longer
    /// exist are skipped.
    pub(crate) async fn release_stale_relations(
        &self,
        key: NoteKey,
        previous: &NoteRecord,
        record: &NoteRecord,
        project: &ProjectInfo,
    ) -> Result<HashMap<NoteKey, NoteRecord>> {
        let stale: Vec<(&str, NoteKey)> = previous
            .relations
            .iter()
            .flat_map(|(relation, targets)| targets.iter().map(move |t| (relation.as_str(), *t)))
            .filter(|(relation, target)| *target != key && !record.has_relation(relation, *target))
            .collect();
        if stale.is_empty() {
            return Ok(HashMap::new());
        }

        let targets: BTreeSet<NoteKey> = stale.iter().map(|(_, target)| *target).collect();
        let targets: Vec<NoteKey> = targets.into_iter().collect();
        let mut neighbours = self.fetch_notes(&targets).await?;

        let mut touched = HashMap::new();
        for (relation, target) in stale {
            let Some(neighbour) = neighbours.get_mut(&target) else {
                log::debug!("Stale relation target {} of {} is gone", target, key);
                continue;
            };
            let changed = match project.reverse_relation(relation) {
                Some(reverse) => neighbour.remove_relation(reverse, key),
                None => {
                    let still_linked = record.relations.values().flatten().any(|t| *t == target);
                    !still_linked && neighbour.retain_relations(|k| *k != key)
                }
            };
            if changed {
                touched.insert(target, neighbour.clone());
            }
        }
        Ok(touched)
    }

    /// Strip `key` from every relation list of every note `note` points at
    ///
    /// Returns the neighbours that changed. Neighbours that no longer exist
    /// are skipped.
    pub(crate) async fn unlink_note(
        &self,
        key: NoteKey,
        note: &NoteRecord,
    ) -> Result<HashMap<NoteKey, NoteRecord>> {
        let targets: BTreeSet<NoteKey> = note
            .relations
            .values()
            .flatten()
            .copied()
            .filter(|target| *target != key)
            .collect();
        let targets: Vec<NoteKey> = targets.into_iter().collect();
        let neighbours = self.fetch_notes(&targets).await?;

        Ok(neighbours
            .into_iter()
            .filter_map(|(target, mut neighbour)| {
                neighbour
                    .retain_relations(|k| *k != key)
                    .then_some((target, neighbour))
            })
            .collect())
    }

    /// Remove the relation `relation` from `phrase` to `target`, on both ends
    ///
    /// Both notes are written in one batch. Fails when `relation` has no
    /// declared reverse in the project or `phrase` is not indexed there.
    pub async fn delete_relation<'a>(
        &mut self,
        phrase: &str,
        project: impl Into<ProjectRef<'a>>,
        relation: &str,
        target: NoteKey,
    ) -> Result<()> {
        let project = self.projects.find(project).clone();
        let reverse = project
            .reverse_relation(relation)
            .ok_or_else(|| Error::no_reverse(relation, project.name.clone()))?
            .to_string();
        let key = self
            .key(phrase, &project)
            .ok_or_else(|| Error::phrase_not_found(phrase, project.name.clone()))?;

        let mut notes = self.fetch_notes(&[key, target]).await?;
        let mut source = notes
            .remove(&key)
            .ok_or_else(|| Error::unreachable(format!("note {} is indexed but not stored", key)))?;

        let mut writes = HashMap::new();
        source.remove_relation(relation, target);
        if target == key {
            source.remove_relation(&reverse, key);
        } else {
            let mut other = notes.remove(&target).ok_or_else(|| {
                Error::unreachable(format!("related note {} is neither cached nor stored", target))
            })?;
            other.remove_relation(&reverse, key);
            writes.insert(target, other);
        }
        writes.insert(key, source);

        let blobs = writes
            .iter()
            .map(|(k, note)| Ok((k.to_string(), serde_json::to_value(note)?)))
            .collect::<Result<HashMap<_, _>>>()?;
        self.store.set(blobs).await?;

        log::debug!("Deleted relation {:?} between {} and {}", relation, key, target);
        for (k, note) in writes {
            self.cache.set(k, note);
        }
        Ok(())
    }
}
