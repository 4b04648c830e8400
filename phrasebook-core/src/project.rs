//! Project registry
//!
//! Projects are looked up by name, primary key, or an existing
//! [`ProjectInfo`]. Resolution never fails: anything unresolvable maps to
//! project zero so callers always have a project to work with.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::book::{index_key, PhraseBook, CURRENT_PROJECT_KEY, PROJECTS_KEY};
use crate::error::{Error, Result};
use crate::normalize::collapse_whitespace;
use crate::note::{NoteKey, ProjectInfo};
use crate::phrase_index::PhraseIndex;

/// Any way of naming a project
#[derive(Debug, Clone, Copy)]
pub enum ProjectRef<'a> {
    Name(&'a str),
    Pk(u32),
    Info(&'a ProjectInfo),
}

impl<'a> From<&'a str> for ProjectRef<'a> {
    fn from(name: &'a str) -> Self {
        Self::Name(name)
    }
}

impl<'a> From<&'a String> for ProjectRef<'a> {
    fn from(name: &'a String) -> Self {
        Self::Name(name)
    }
}

impl From<u32> for ProjectRef<'_> {
    fn from(pk: u32) -> Self {
        Self::Pk(pk)
    }
}

impl<'a> From<&'a ProjectInfo> for ProjectRef<'a> {
    fn from(info: &'a ProjectInfo) -> Self {
        Self::Info(info)
    }
}

/// Fields accepted by [`PhraseBook::save_project`]
///
/// `None` keeps the stored value of an existing project, or the default for
/// a new one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectDraft {
    pub name: String,
    pub description: Option<String>,
    pub normalizer: Option<String>,
    pub relations: Option<Vec<(String, String)>>,
}

impl ProjectDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn normalizer(mut self, normalizer: impl Into<String>) -> Self {
        self.normalizer = Some(normalizer.into());
        self
    }

    pub fn relation(mut self, a: impl Into<String>, b: impl Into<String>) -> Self {
        self.relations
            .get_or_insert_with(Vec::new)
            .push((a.into(), b.into()));
        self
    }
}

/// Projects keyed by primary key; project zero is always present
#[derive(Debug, Clone)]
pub struct ProjectRegistry {
    projects: BTreeMap<u32, ProjectInfo>,
}

impl Default for ProjectRegistry {
    fn default() -> Self {
        Self::from_list(Vec::new())
    }
}

impl ProjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a stored list, adding project zero if it is missing
    pub fn from_list(list: Vec<ProjectInfo>) -> Self {
        let mut projects: BTreeMap<u32, ProjectInfo> =
            list.into_iter().map(|p| (p.pk, p)).collect();
        projects
            .entry(0)
            .or_insert_with(ProjectInfo::default_project);
        Self { projects }
    }

    /// Resolve any representation, falling back to project zero
    pub fn find<'a>(&self, project: impl Into<ProjectRef<'a>>) -> &ProjectInfo {
        let found = match project.into() {
            ProjectRef::Name(name) => self.by_name(name),
            ProjectRef::Pk(pk) => self.get(pk),
            ProjectRef::Info(info) => self.get(info.pk).or_else(|| self.by_name(&info.name)),
        };
        found.unwrap_or_else(|| self.default_project())
    }

    pub fn get(&self, pk: u32) -> Option<&ProjectInfo> {
        self.projects.get(&pk)
    }

    pub fn by_name(&self, name: &str) -> Option<&ProjectInfo> {
        self.projects.values().find(|p| p.name == name)
    }

    pub fn default_project(&self) -> &ProjectInfo {
        // from_list guarantees the entry; the fallback only keeps this total
        self.projects.get(&0).unwrap_or(&*DEFAULT_PROJECT)
    }

    pub fn contains(&self, pk: u32) -> bool {
        self.projects.contains_key(&pk)
    }

    /// One past the largest primary key in use
    pub fn next_pk(&self) -> u32 {
        self.projects
            .keys()
            .next_back()
            .map_or(0, |max| max.saturating_add(1))
    }

    pub fn upsert(&mut self, info: ProjectInfo) {
        self.projects.insert(info.pk, info);
    }

    /// Remove a project; project zero is never removed
    pub fn remove(&mut self, pk: u32) -> Option<ProjectInfo> {
        if pk == 0 {
            return None;
        }
        self.projects.remove(&pk)
    }

    /// Projects ordered by primary key
    pub fn iter(&self) -> impl Iterator<Item = &ProjectInfo> {
        self.projects.values()
    }

    pub fn to_list(&self) -> Vec<ProjectInfo> {
        self.projects.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }
}

static DEFAULT_PROJECT: std::sync::LazyLock<ProjectInfo> =
    std::sync::LazyLock::new(ProjectInfo::default_project);

impl PhraseBook {
    /// Create or update a project, returning its primary key
    ///
    /// The whitespace-normalized name is the lookup key: saving under an
    /// existing name overwrites that project. Changing the normalizer of an
    /// existing project re-keys its phrase index before anything is written.
    pub async fn save_project(&mut self, draft: ProjectDraft) -> Result<u32> {
        let name = collapse_whitespace(&draft.name);
        if name.is_empty() {
            return Err(Error::InvalidProject("project name is empty".into()));
        }
        let description = draft.description.as_deref().map(collapse_whitespace);

        let mut writes = HashMap::new();
        let mut registry = self.projects.clone();
        let mut new_index = None;

        let info = match self.projects.by_name(&name).cloned() {
            Some(existing) => {
                let info = ProjectInfo {
                    pk: existing.pk,
                    name,
                    description: description.unwrap_or(existing.description.clone()),
                    normalizer: draft.normalizer.unwrap_or(existing.normalizer.clone()),
                    relations: draft.relations.unwrap_or(existing.relations.clone()),
                    next_note: existing.next_note,
                };
                if info.normalizer != existing.normalizer {
                    let index = self.rekey_index(&info)?;
                    writes.insert(index_key(info.pk), serde_json::to_value(&index)?);
                    new_index = Some(index);
                }
                info
            }
            None => {
                let info = ProjectInfo {
                    pk: self.projects.next_pk(),
                    name,
                    description: description.unwrap_or_default(),
                    normalizer: draft.normalizer.unwrap_or_default(),
                    relations: draft
                        .relations
                        .unwrap_or_else(|| self.config.default_relations()),
                    next_note: 0,
                };
                let index = PhraseIndex::new();
                writes.insert(index_key(info.pk), serde_json::to_value(&index)?);
                new_index = Some(index);
                info
            }
        };

        let pk = info.pk;
        registry.upsert(info);
        writes.insert(
            PROJECTS_KEY.to_string(),
            serde_json::to_value(registry.to_list())?,
        );
        self.store.set(writes).await?;

        log::debug!("Saved project {}", pk);
        self.projects = registry;
        if let Some(index) = new_index {
            self.indices.insert(pk, index);
        }
        Ok(pk)
    }

    /// Build the phrase index `project` would have under its (new) normalizer
    fn rekey_index(&self, project: &ProjectInfo) -> Result<PhraseIndex> {
        let Some(old) = self.indices.get(&project.pk) else {
            return Ok(PhraseIndex::new());
        };
        let mut index = PhraseIndex::new();
        for (phrase, note) in old.iter() {
            let key = self.normalizers.normalize(phrase, &project.normalizer);
            match index.get(&key) {
                Some(other) if other != note => {
                    return Err(Error::NormalizerCollision {
                        project: project.name.clone(),
                        key,
                    });
                }
                _ => index.insert(key, note),
            }
        }
        log::info!(
            "Re-keyed {} phrases of project \"{}\" for normalizer {:?}",
            index.len(),
            project.name,
            project.normalizer
        );
        Ok(index)
    }

    /// Delete a project with all of its notes
    ///
    /// Notes elsewhere lose every relation entry pointing into the removed
    /// project. If that cleanup fails after the notes are gone the error is
    /// [`Error::PartialFailure`].
    pub async fn remove_project<'a>(&mut self, project: impl Into<ProjectRef<'a>>) -> Result<()> {
        let project = self.projects.find(project).clone();
        if project.pk == 0 {
            return Err(Error::ProtectedProject);
        }

        let index = self.indices.get(&project.pk).cloned().unwrap_or_default();
        let mut doomed: Vec<NoteKey> = index
            .iter()
            .map(|(_, note)| NoteKey::new(project.pk, note))
            .collect();
        doomed.sort();
        doomed.dedup();
        let mut keys: Vec<String> = doomed.iter().map(NoteKey::to_string).collect();
        keys.push(index_key(project.pk));
        self.store.remove(&keys).await?;

        self.cache.delete_project(project.pk);
        self.indices.remove(&project.pk);
        self.projects.remove(project.pk);
        if self.current_project == project.pk {
            self.current_project = 0;
        }

        let completed = format!(
            "deleted {} notes of project \"{}\"",
            doomed.len(),
            project.name
        );
        log::info!("Removed project {}: {}", project.pk, completed);

        match self.scrub_project_references(project.pk).await {
            Ok(touched) => {
                log::debug!("Stripped references to project {} from {} notes", project.pk, touched);
                Ok(())
            }
            Err(e) => {
                log::warn!("Cleanup after removing project {} failed: {}", project.pk, e);
                Err(e.after(completed))
            }
        }
    }

    /// Strip relations into `removed` from every surviving note and persist
    /// them together with the registry
    async fn scrub_project_references(&self, removed: u32) -> Result<usize> {
        let survivors: Vec<NoteKey> = self
            .indices
            .iter()
            .flat_map(|(pk, index)| index.iter().map(move |(_, note)| NoteKey::new(*pk, note)))
            .collect();
        let mut notes = self.fetch_notes(&survivors).await?;

        let mut writes = HashMap::new();
        let mut touched = Vec::new();
        for (key, note) in notes.iter_mut() {
            if note.retain_relations(|target| target.project() != removed) {
                writes.insert(key.to_string(), serde_json::to_value(&*note)?);
                touched.push(*key);
            }
        }
        writes.insert(
            PROJECTS_KEY.to_string(),
            serde_json::to_value(self.projects.to_list())?,
        );
        writes.insert(
            CURRENT_PROJECT_KEY.to_string(),
            serde_json::to_value(self.current_project)?,
        );
        self.store.set(writes).await?;

        for key in &touched {
            if let Some(note) = notes.remove(key) {
                self.cache.set(*key, note);
            }
        }
        Ok(touched.len())
    }
}
