//! The phrasebook context
//!
//! [`PhraseBook`] owns every piece of in-memory state (project registry,
//! phrase indices, tag set, note cache) and the store they are loaded from.
//! All operations go through it; there is no global state.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::cache::NoteCache;
use crate::config::IndexConfig;
use crate::error::Result;
use crate::kv::{Blob, KvStore};
use crate::normalize::NormalizerRegistry;
use crate::note::{NoteKey, NoteRecord, ProjectInfo};
use crate::phrase_index::PhraseIndex;
use crate::project::{ProjectRef, ProjectRegistry};

/// Store key of the project list
pub const PROJECTS_KEY: &str = "projects";
/// Store key of the selected project's pk
pub const CURRENT_PROJECT_KEY: &str = "currentProject";
/// Store key of the tag set
pub const TAGS_KEY: &str = "tags";

/// Store key of a project's phrase index
pub fn index_key(project: u32) -> String {
    project.to_string()
}

/// Index and storage engine for project-scoped notes
pub struct PhraseBook {
    pub(crate) store: Arc<dyn KvStore>,
    pub(crate) config: IndexConfig,
    pub(crate) normalizers: NormalizerRegistry,
    pub(crate) projects: ProjectRegistry,
    pub(crate) indices: HashMap<u32, PhraseIndex>,
    pub(crate) tags: BTreeSet<String>,
    pub(crate) current_project: u32,
    pub(crate) cache: NoteCache,
}

impl PhraseBook {
    /// Load the registry, tag set and every phrase index from `store`
    ///
    /// An empty store is bootstrapped with the default project, which is
    /// persisted before this returns.
    pub async fn load(store: Arc<dyn KvStore>, config: IndexConfig) -> Result<Self> {
        Self::load_with(store, config, NormalizerRegistry::new()).await
    }

    /// [`load`](Self::load) with a custom normalizer registry
    pub async fn load_with(
        store: Arc<dyn KvStore>,
        config: IndexConfig,
        normalizers: NormalizerRegistry,
    ) -> Result<Self> {
        let mut stored = store
            .get(&[
                PROJECTS_KEY.to_string(),
                CURRENT_PROJECT_KEY.to_string(),
                TAGS_KEY.to_string(),
            ])
            .await?;

        let mut writes = HashMap::new();
        let stored_projects: Option<Vec<ProjectInfo>> = decode(stored.remove(PROJECTS_KEY));
        let bootstrap = stored_projects
            .as_ref()
            .map_or(true, |list| !list.iter().any(|p| p.pk == 0));
        let projects = ProjectRegistry::from_list(stored_projects.unwrap_or_default());
        if bootstrap {
            log::info!("Bootstrapping default project");
            writes.insert(
                PROJECTS_KEY.to_string(),
                serde_json::to_value(projects.to_list())?,
            );
        }

        let current_project = decode::<u32>(stored.remove(CURRENT_PROJECT_KEY))
            .filter(|pk| projects.contains(*pk))
            .unwrap_or(0);
        if bootstrap {
            writes.insert(
                CURRENT_PROJECT_KEY.to_string(),
                serde_json::to_value(current_project)?,
            );
        }
        let tags: BTreeSet<String> = decode(stored.remove(TAGS_KEY)).unwrap_or_default();

        let index_keys: Vec<String> = projects.iter().map(|p| index_key(p.pk)).collect();
        let mut stored_indices = store.get(&index_keys).await?;
        let indices: HashMap<u32, PhraseIndex> = projects
            .iter()
            .map(|p| {
                let index = decode(stored_indices.remove(&index_key(p.pk))).unwrap_or_default();
                (p.pk, index)
            })
            .collect();

        if !writes.is_empty() {
            store.set(writes).await?;
        }

        log::info!(
            "Loaded {} projects, {} phrases, {} tags",
            projects.len(),
            indices.values().map(PhraseIndex::len).sum::<usize>(),
            tags.len()
        );

        Ok(Self {
            store,
            config,
            normalizers,
            projects,
            indices,
            tags,
            current_project,
            cache: NoteCache::new(),
        })
    }

    /// Write the registry, current project, tag set and all indices back
    pub async fn flush(&self) -> Result<()> {
        let mut writes = HashMap::new();
        writes.insert(
            PROJECTS_KEY.to_string(),
            serde_json::to_value(self.projects.to_list())?,
        );
        writes.insert(
            CURRENT_PROJECT_KEY.to_string(),
            serde_json::to_value(self.current_project)?,
        );
        writes.insert(TAGS_KEY.to_string(), serde_json::to_value(&self.tags)?);
        for (pk, index) in &self.indices {
            writes.insert(index_key(*pk), serde_json::to_value(index)?);
        }
        self.store.set(writes).await
    }

    /// Wipe the store and all in-memory state, leaving only the default project
    pub async fn clear(&mut self) -> Result<()> {
        self.store.clear().await?;
        self.cache.clear();
        self.tags.clear();
        self.projects = ProjectRegistry::new();
        self.indices = HashMap::from([(0, PhraseIndex::new())]);
        self.current_project = 0;

        let mut writes = HashMap::new();
        writes.insert(
            PROJECTS_KEY.to_string(),
            serde_json::to_value(self.projects.to_list())?,
        );
        writes.insert(
            CURRENT_PROJECT_KEY.to_string(),
            serde_json::to_value(self.current_project)?,
        );
        self.store.set(writes).await?;
        log::info!("Cleared phrasebook");
        Ok(())
    }

    /// Fetch notes cache-first, reading all misses from the store in one batch
    ///
    /// Keys with no stored note are absent from the result. Everything read
    /// from the store is cached before it is returned.
    pub(crate) async fn fetch_notes(&self, keys: &[NoteKey]) -> Result<HashMap<NoteKey, NoteRecord>> {
        let mut found = HashMap::with_capacity(keys.len());
        let mut misses = Vec::new();
        for key in keys {
            match self.cache.get(key) {
                Some(note) => {
                    found.insert(*key, note);
                }
                None => misses.push(key.to_string()),
            }
        }
        if misses.is_empty() {
            return Ok(found);
        }

        misses.sort();
        misses.dedup();
        log::debug!("Fetching {} notes from store", misses.len());
        for (raw_key, blob) in self.store.get(&misses).await? {
            let key: NoteKey = match raw_key.parse() {
                Ok(key) => key,
                Err(e) => {
                    log::warn!("Unexpected key {} in note batch: {}", raw_key, e);
                    continue;
                }
            };
            match serde_json::from_value::<NoteRecord>(blob) {
                Ok(note) => {
                    self.cache.set(key, note.clone());
                    found.insert(key, note);
                }
                Err(e) => log::warn!("Failed to deserialize note {}: {}. Skipping.", key, e),
            }
        }
        Ok(found)
    }

    /// Read a single note
    pub async fn get(&self, key: NoteKey) -> Result<Option<NoteRecord>> {
        Ok(self.fetch_notes(&[key]).await?.remove(&key))
    }

    /// Resolve any project representation, falling back to the default project
    pub fn find_project<'a>(&self, project: impl Into<ProjectRef<'a>>) -> (String, ProjectInfo) {
        let info = self.projects.find(project).clone();
        (info.name.clone(), info)
    }

    /// All projects, ordered by primary key
    pub fn all_projects(&self) -> Vec<&ProjectInfo> {
        self.projects.iter().collect()
    }

    /// Relation pairs declared for a project
    pub fn relations_for_project<'a>(&self, project: impl Into<ProjectRef<'a>>) -> &[(String, String)] {
        &self.projects.find(project).relations
    }

    /// Paired relation type of `relation` in `project`, if declared
    pub fn reverse_relation<'a>(
        &self,
        project: impl Into<ProjectRef<'a>>,
        relation: &str,
    ) -> Option<&str> {
        self.projects.find(project).reverse_relation(relation)
    }

    /// Normalize `phrase` the way `project` indexes it
    pub fn normalize<'a>(&self, phrase: &str, project: impl Into<ProjectRef<'a>>) -> String {
        let project = self.projects.find(project);
        self.normalizers.normalize(phrase, &project.normalizer)
    }

    /// Composite key of `phrase` in `project`, if indexed
    pub fn key<'a>(&self, phrase: &str, project: impl Into<ProjectRef<'a>>) -> Option<NoteKey> {
        let project = self.projects.find(project);
        let normalized = self.normalizers.normalize(phrase, &project.normalizer);
        self.indices
            .get(&project.pk)?
            .get(&normalized)
            .map(|note| NoteKey::new(project.pk, note))
    }

    /// Phrase index of `project`
    pub fn project_index<'a>(&self, project: impl Into<ProjectRef<'a>>) -> Option<&PhraseIndex> {
        self.indices.get(&self.projects.find(project).pk)
    }

    /// Every tag ever used
    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    /// The project selected as current
    pub fn current_project(&self) -> &ProjectInfo {
        self.projects.find(self.current_project)
    }

    /// Select and persist the current project
    pub async fn set_current_project<'a>(&mut self, project: impl Into<ProjectRef<'a>>) -> Result<u32> {
        let pk = self.projects.find(project).pk;
        self.store
            .set(HashMap::from([(
                CURRENT_PROJECT_KEY.to_string(),
                serde_json::to_value(pk)?,
            )]))
            .await?;
        self.current_project = pk;
        Ok(pk)
    }

    /// Bytes left in the storage budget; negative once the store overruns it
    pub async fn memfree(&self) -> Result<i64> {
        let used = self.store.bytes_in_use().await?;
        Ok(self.config.byte_budget as i64 - used as i64)
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Normalizers available to projects
    pub fn normalizers(&self) -> &NormalizerRegistry {
        &self.normalizers
    }

    /// Notes currently held in the cache
    pub fn cached_notes(&self) -> usize {
        self.cache.len()
    }
}

/// Decode an optional stored blob, treating undecodable values as absent
fn decode<T: DeserializeOwned>(blob: Option<Blob>) -> Option<T> {
    let blob = blob?;
    match serde_json::from_value(blob) {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("Ignoring undecodable stored value: {}", e);
            None
        }
    }
}
