//! Adding and deleting notes

use std::collections::HashMap;

use crate::book::{index_key, PhraseBook, PROJECTS_KEY, TAGS_KEY};
use crate::error::{Error, Result};
use crate::note::{NoteKey, NoteRecord, ProjectInfo};
use crate::project::ProjectRef;

impl PhraseBook {
    /// Store `data` as the note for `phrase` in `project`
    ///
    /// A phrase not yet indexed gets the project's next note pk, which is
    /// never handed out twice even after deletes. New tags join the tag set
    /// and every outgoing relation is mirrored on its target. Overwriting a
    /// note also drops the mirrors of relations the new data no longer has.
    /// The note, a new index entry, the bumped project, the tag set and all
    /// changed targets are written in a single batch; in-memory state
    /// changes only once that write succeeds.
    pub async fn add<'a>(
        &mut self,
        phrase: &str,
        project: impl Into<ProjectRef<'a>>,
        data: NoteRecord,
    ) -> Result<NoteKey> {
        let project = self.projects.find(project).clone();
        let normalized = self.normalizers.normalize(phrase, &project.normalizer);

        let mut index = self.indices.get(&project.pk).cloned().unwrap_or_default();
        let existing = index.get(&normalized);
        let note = existing.unwrap_or_else(|| project.next_note.max(index.next_key()));
        let key = NoteKey::new(project.pk, note);

        let previous = match existing {
            Some(_) => self.get(key).await?,
            None => None,
        };
        let mut record = data;
        let released = match &previous {
            Some(previous) => {
                self.release_stale_relations(key, previous, &record, &project)
                    .await?
            }
            None => HashMap::new(),
        };
        let neighbours = self
            .mirror_relations(key, &mut record, &project, released)
            .await?;

        let mut writes = HashMap::new();
        writes.insert(key.to_string(), serde_json::to_value(&record)?);
        for (target, neighbour) in &neighbours {
            writes.insert(target.to_string(), serde_json::to_value(neighbour)?);
        }
        let mut registry = None;
        if existing.is_none() {
            index.insert(normalized.clone(), key.note());
            writes.insert(index_key(project.pk), serde_json::to_value(&index)?);

            let mut projects = self.projects.clone();
            projects.upsert(ProjectInfo {
                next_note: note.saturating_add(1),
                ..project.clone()
            });
            writes.insert(
                PROJECTS_KEY.to_string(),
                serde_json::to_value(projects.to_list())?,
            );
            registry = Some(projects);
        }
        let new_tags: Vec<String> = record
            .tags
            .iter()
            .filter(|t| !self.tags.contains(*t))
            .cloned()
            .collect();
        if !new_tags.is_empty() {
            let mut tags = self.tags.clone();
            tags.extend(new_tags.iter().cloned());
            writes.insert(TAGS_KEY.to_string(), serde_json::to_value(&tags)?);
        }

        self.store.set(writes).await?;

        log::debug!(
            "Added {:?} as {} ({} new tags, {} neighbours changed)",
            normalized,
            key,
            new_tags.len(),
            neighbours.len()
        );
        if let Some(projects) = registry {
            self.indices.insert(project.pk, index);
            self.projects = projects;
        }
        self.tags.extend(new_tags);
        self.cache.set(key, record);
        for (target, neighbour) in neighbours {
            self.cache.set(target, neighbour);
        }
        Ok(key)
    }

    /// Delete the note for `phrase` in `project`
    ///
    /// Every index entry of the note goes, and every related note loses all
    /// relation entries pointing at it. Index and neighbours are written
    /// first; if removing the note blob afterwards fails the error is
    /// [`Error::PartialFailure`].
    pub async fn delete<'a>(
        &mut self,
        phrase: &str,
        project: impl Into<ProjectRef<'a>>,
    ) -> Result<NoteKey> {
        let project = self.projects.find(project).clone();
        let key = self
            .key(phrase, &project)
            .ok_or_else(|| Error::phrase_not_found(phrase, project.name.clone()))?;

        let note = self.get(key).await?.unwrap_or_default();
        let neighbours = self.unlink_note(key, &note).await?;

        let mut index = self.indices.get(&project.pk).cloned().unwrap_or_default();
        let phrases = index.remove_note(key.note());

        let mut writes = HashMap::new();
        writes.insert(index_key(project.pk), serde_json::to_value(&index)?);
        for (target, neighbour) in &neighbours {
            writes.insert(target.to_string(), serde_json::to_value(neighbour)?);
        }
        self.store.set(writes).await?;

        self.indices.insert(project.pk, index);
        for (target, neighbour) in neighbours {
            self.cache.set(target, neighbour);
        }

        let removed = self.store.remove(&[key.to_string()]).await;
        self.cache.delete(&key);
        log::debug!("Deleted {} (phrases {:?})", key, phrases);
        removed.map_err(|e| e.after(format!("unindexed and unlinked note {}", key)))?;
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use crate::kv::MemoryKv;
    use crate::note::SEE_ALSO;
    use std::sync::Arc;

    async fn book_with_store() -> (PhraseBook, Arc<MemoryKv>) {
        let kv = Arc::new(MemoryKv::new());
        let book = PhraseBook::load(kv.clone(), IndexConfig::default())
            .await
            .unwrap();
        (book, kv)
    }

    #[tokio::test]
    async fn test_add_assigns_sequential_keys() {
        let (mut book, _) = book_with_store().await;
        let a = book.add("alpha", 0u32, NoteRecord::new()).await.unwrap();
        let b = book.add("beta", 0u32, NoteRecord::new()).await.unwrap();
        let a_again = book.add("  ALPHA ", 0u32, NoteRecord::new().starred(true)).await.unwrap();
        assert_eq!(a, NoteKey::new(0, 0));
        assert_eq!(b, NoteKey::new(0, 1));
        assert_eq!(a_again, a);
        assert!(book.get(a).await.unwrap().unwrap().starred);
    }

    #[tokio::test]
    async fn test_add_writes_note_index_and_tags() {
        let (mut book, kv) = book_with_store().await;
        let key = book
            .add("cat", 0u32, NoteRecord::new().tag("animal"))
            .await
            .unwrap();

        assert!(kv.peek(&key.to_string()).is_some());
        assert_eq!(kv.peek("0"), Some(serde_json::json!({"cat": 0})));
        assert_eq!(kv.peek(TAGS_KEY), Some(serde_json::json!(["animal"])));
        assert!(book.tags().contains("animal"));
    }

    #[tokio::test]
    async fn test_failed_add_leaves_state_untouched() {
        let (mut book, kv) = book_with_store().await;
        kv.fail_next_set("quota exceeded");
        let err = book
            .add("cat", 0u32, NoteRecord::new().tag("animal"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Store error: quota exceeded");
        assert!(book.key("cat", 0u32).is_none());
        assert!(book.tags().is_empty());
        assert_eq!(book.cached_notes(), 0);
    }

    #[tokio::test]
    async fn test_delete_unlinks_neighbours() {
        let (mut book, kv) = book_with_store().await;
        let cat = book.add("cat", 0u32, NoteRecord::new()).await.unwrap();
        let dog = book
            .add("dog", 0u32, NoteRecord::new().relate(SEE_ALSO, cat))
            .await
            .unwrap();

        book.delete("cat", 0u32).await.unwrap();
        assert!(book.key("cat", 0u32).is_none());
        assert!(kv.peek(&cat.to_string()).is_none());
        assert!(book.get(dog).await.unwrap().unwrap().relations.is_empty());
    }

    #[tokio::test]
    async fn test_delete_unknown_phrase() {
        let (mut book, _) = book_with_store().await;
        let err = book.delete("ghost", 0u32).await.unwrap_err();
        assert!(matches!(err, Error::PhraseNotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete_reports_partial_failure() {
        let (mut book, kv) = book_with_store().await;
        book.add("cat", 0u32, NoteRecord::new()).await.unwrap();
        kv.fail_next_remove("io error");
        let err = book.delete("cat", 0u32).await.unwrap_err();
        assert!(err.is_partial());
        assert!(book.key("cat", 0u32).is_none());
    }

    #[tokio::test]
    async fn test_deleted_highest_key_is_not_reused() {
        let (mut book, kv) = book_with_store().await;
        book.add("a", 0u32, NoteRecord::new()).await.unwrap();
        let b = book.add("b", 0u32, NoteRecord::new()).await.unwrap();
        book.delete("b", 0u32).await.unwrap();
        let c = book.add("c", 0u32, NoteRecord::new()).await.unwrap();
        assert_eq!(b, NoteKey::new(0, 1));
        assert_eq!(c, NoteKey::new(0, 2));

        // the high-water mark survives a reload
        book.delete("c", 0u32).await.unwrap();
        let mut book = PhraseBook::load(kv, IndexConfig::default()).await.unwrap();
        let d = book.add("d", 0u32, NoteRecord::new()).await.unwrap();
        assert_eq!(d, NoteKey::new(0, 3));
    }

    #[tokio::test]
    async fn test_overwrite_does_not_advance_key() {
        let (mut book, _) = book_with_store().await;
        book.add("a", 0u32, NoteRecord::new()).await.unwrap();
        book.add("a", 0u32, NoteRecord::new().starred(true)).await.unwrap();
        assert_eq!(book.current_project().next_note, 1);
    }
}
