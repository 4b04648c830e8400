//! Query engine
//!
//! Two query shapes are supported: an exact lookup of one phrase, and an ad
//! hoc search combining a phrase match (exact, substring or fuzzy) with
//! filters on the note payload. Both resolve candidates through the phrase
//! indices, then read notes cache-first with a single batched store read.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::book::PhraseBook;
use crate::error::{Error, Result};
use crate::note::{NoteKey, NoteRecord, ProjectInfo};

/// How the query phrase is compared with indexed phrases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    /// Normalized forms are equal
    Exact,
    /// Normalized query is a substring of the normalized phrase
    Substring,
    /// Query characters appear in order, with arbitrary gaps
    #[default]
    Fuzzy,
}

/// A request from a UI collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Query {
    /// Find one phrase, in one project or across all of them
    #[serde(rename = "lookup")]
    Lookup {
        phrase: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        project: Option<String>,
    },
    /// Filtered search
    #[serde(rename = "ad hoc")]
    AdHoc(AdHocQuery),
}

impl Query {
    /// Look `phrase` up in every project
    pub fn lookup(phrase: impl Into<String>) -> Self {
        Self::Lookup {
            phrase: phrase.into(),
            project: None,
        }
    }

    /// Look `phrase` up in one project
    pub fn lookup_in(phrase: impl Into<String>, project: impl Into<String>) -> Self {
        Self::Lookup {
            phrase: phrase.into(),
            project: Some(project.into()),
        }
    }
}

impl From<AdHocQuery> for Query {
    fn from(query: AdHocQuery) -> Self {
        Self::AdHoc(query)
    }
}

/// Criteria of an ad hoc search; every field is optional and independent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdHocQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phrase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strictness: Option<Strictness>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starred: Option<bool>,
    /// Tags that must all be present
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tag_required: Vec<String>,
    /// Tags that must all be absent
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tag_forbidden: Vec<String>,
    /// Substring some citation URL must contain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Some citation timestamp must be earlier than this
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<DateTime<Utc>>,
    /// Some citation timestamp must be later than this
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<DateTime<Utc>>,
}

impl AdHocQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phrase(mut self, phrase: impl Into<String>) -> Self {
        self.phrase = Some(phrase.into());
        self
    }

    pub fn strictness(mut self, strictness: Strictness) -> Self {
        self.strictness = Some(strictness);
        self
    }

    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn starred(mut self, starred: bool) -> Self {
        self.starred = Some(starred);
        self
    }

    pub fn require_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag_required.push(tag.into());
        self
    }

    pub fn forbid_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag_forbidden.push(tag.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn before(mut self, before: DateTime<Utc>) -> Self {
        self.before = Some(before);
        self
    }

    pub fn after(mut self, after: DateTime<Utc>) -> Self {
        self.after = Some(after);
        self
    }

    /// Whether at least one criterion is given
    pub fn has_criteria(&self) -> bool {
        self.phrase.is_some()
            || self.project.is_some()
            || self.starred.is_some()
            || !self.tag_required.is_empty()
            || !self.tag_forbidden.is_empty()
            || self.url.is_some()
            || self.before.is_some()
            || self.after.is_some()
    }

    /// Apply the payload filters; each one only constrains when present
    pub fn accepts(&self, note: &NoteRecord) -> bool {
        if let Some(starred) = self.starred {
            if note.starred != starred {
                return false;
            }
        }
        if !self.tag_required.iter().all(|t| note.tags.contains(t)) {
            return false;
        }
        if self.tag_forbidden.iter().any(|t| note.tags.contains(t)) {
            return false;
        }
        if let Some(url) = &self.url {
            if !note.citations.iter().any(|c| c.url.contains(url.as_str())) {
                return false;
            }
        }
        if self.before.is_some() || self.after.is_some() {
            let in_range = note.timestamps().any(|t| {
                self.after.map_or(true, |after| *t > after)
                    && self.before.map_or(true, |before| *t < before)
            });
            if !in_range {
                return false;
            }
        }
        true
    }
}

/// A note found by a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteMatch {
    /// Name of the owning project
    pub project: String,
    /// Normalized phrase the note is indexed under
    pub phrase: String,
    pub key: NoteKey,
    pub note: NoteRecord,
}

/// Outcome of a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum FindResponse {
    Found {
        #[serde(rename = "match")]
        found: NoteMatch,
    },
    Ambiguous {
        matches: Vec<NoteMatch>,
    },
    None,
}

impl FindResponse {
    /// Classify matches by count, ordering ambiguous ones by project pk,
    /// then phrase
    pub fn from_matches(mut matches: Vec<NoteMatch>) -> Self {
        match matches.len() {
            0 => Self::None,
            1 => Self::Found {
                found: matches.remove(0),
            },
            _ => {
                matches.sort_by(|a, b| {
                    a.key
                        .project()
                        .cmp(&b.key.project())
                        .then_with(|| a.phrase.cmp(&b.phrase))
                        .then_with(|| a.key.cmp(&b.key))
                });
                Self::Ambiguous { matches }
            }
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// All matches, whatever the cardinality
    pub fn into_matches(self) -> Vec<NoteMatch> {
        match self {
            Self::Found { found } => vec![found],
            Self::Ambiguous { matches } => matches,
            Self::None => Vec::new(),
        }
    }
}

/// Compile a fuzzy (in-order subsequence) matcher for a normalized query
pub fn fuzzy_matcher(normalized: &str) -> Result<Regex> {
    let pattern = normalized
        .chars()
        .map(|c| regex::escape(c.encode_utf8(&mut [0; 4])))
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&pattern).map_err(|e| Error::Search(e.to_string()))
}

/// An index hit not yet resolved to a note
struct Candidate {
    project: String,
    phrase: String,
    key: NoteKey,
}

impl PhraseBook {
    /// Resolve a query
    pub async fn find(&self, query: &Query) -> Result<FindResponse> {
        match query {
            Query::Lookup { phrase, project } => self.lookup(phrase, project.as_deref()).await,
            Query::AdHoc(query) => self.search(query).await,
        }
    }

    /// Projects a query applies to
    fn scope(&self, project: Option<&str>) -> Vec<&ProjectInfo> {
        match project {
            Some(name) => vec![self.projects.find(name)],
            None => self.projects.iter().collect(),
        }
    }

    async fn lookup(&self, phrase: &str, project: Option<&str>) -> Result<FindResponse> {
        let mut candidates = Vec::new();
        for project in self.scope(project) {
            let normalized = self.normalizers.normalize(phrase, &project.normalizer);
            let hit = self
                .indices
                .get(&project.pk)
                .and_then(|index| index.get(&normalized));
            if let Some(note) = hit {
                candidates.push(Candidate {
                    project: project.name.clone(),
                    phrase: normalized,
                    key: NoteKey::new(project.pk, note),
                });
            }
        }
        let matches = self.resolve(candidates, |_| true).await?;
        Ok(FindResponse::from_matches(matches))
    }

    async fn search(&self, query: &AdHocQuery) -> Result<FindResponse> {
        if !query.has_criteria() {
            return Ok(FindResponse::None);
        }
        let strictness = query.strictness.unwrap_or_default();

        let mut candidates = Vec::new();
        for project in self.scope(query.project.as_deref()) {
            let Some(index) = self.indices.get(&project.pk) else {
                continue;
            };
            let make = |phrase: &str, note: u32| Candidate {
                project: project.name.clone(),
                phrase: phrase.to_string(),
                key: NoteKey::new(project.pk, note),
            };
            let Some(phrase) = &query.phrase else {
                candidates.extend(index.iter().map(|(p, note)| make(p, note)));
                continue;
            };

            let normalized = self.normalizers.normalize(phrase, &project.normalizer);
            match strictness {
                Strictness::Exact => {
                    if let Some(note) = index.get(&normalized) {
                        candidates.push(make(&normalized, note));
                    }
                }
                Strictness::Substring => candidates.extend(
                    index
                        .iter()
                        .filter(|(p, _)| p.contains(normalized.as_str()))
                        .map(|(p, note)| make(p, note)),
                ),
                Strictness::Fuzzy => {
                    let matcher = fuzzy_matcher(&normalized)?;
                    candidates.extend(
                        index
                            .iter()
                            .filter(|(p, _)| matcher.is_match(p))
                            .map(|(p, note)| make(p, note)),
                    );
                }
            }
        }

        log::debug!("Ad hoc search: {} candidates", candidates.len());
        let matches = self.resolve(candidates, |note| query.accepts(note)).await?;
        Ok(FindResponse::from_matches(matches))
    }

    /// Read candidate notes and keep those `keep` accepts
    async fn resolve(
        &self,
        candidates: Vec<Candidate>,
        keep: impl Fn(&NoteRecord) -> bool,
    ) -> Result<Vec<NoteMatch>> {
        let keys: Vec<NoteKey> = candidates.iter().map(|c| c.key).collect();
        let notes = self.fetch_notes(&keys).await?;

        let mut matches = Vec::new();
        for candidate in candidates {
            let Some(note) = notes.get(&candidate.key) else {
                log::warn!(
                    "Index entry {:?} -> {} has no stored note",
                    candidate.phrase,
                    candidate.key
                );
                continue;
            };
            if keep(note) {
                matches.push(NoteMatch {
                    project: candidate.project,
                    phrase: candidate.phrase,
                    key: candidate.key,
                    note: note.clone(),
                });
            }
        }
        Ok(matches)
    }
}
