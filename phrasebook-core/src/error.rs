//! Error types for phrasebook-core

use thiserror::Error;

/// Errors that can occur in the phrasebook index
#[derive(Debug, Error)]
pub enum Error {
    /// Key-value store failure, carrying the adapter's message verbatim
    #[error("Store error: {0}")]
    Store(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Phrase has no entry in the project's phrase index
    #[error("\"{phrase}\" not found in project \"{project}\"")]
    PhraseNotFound { phrase: String, project: String },

    /// Relation type is not declared for the project
    #[error("relation \"{relation}\" has no declared reverse in project \"{project}\"")]
    NoReverseRelation { relation: String, project: String },

    /// Index and store disagree about a note that must exist
    #[error("unreachable: {0}")]
    Unreachable(String),

    /// Project fields that cannot be saved
    #[error("Invalid project: {0}")]
    InvalidProject(String),

    /// Query that cannot be compiled into a matcher
    #[error("Search error: {0}")]
    Search(String),

    /// The default project can never be removed
    #[error("the default project cannot be removed")]
    ProtectedProject,

    /// Two phrases collapse onto one key under a new normalizer
    #[error("normalizer change for project \"{project}\" maps several phrases onto \"{key}\"")]
    NormalizerCollision { project: String, key: String },

    /// Malformed composite key
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Some steps of a multi-step operation were committed before a later step failed
    #[error("partial success: {completed}; then failed: {source}")]
    PartialFailure {
        completed: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create an unreachable-state error
    pub fn unreachable(msg: impl Into<String>) -> Self {
        Self::Unreachable(msg.into())
    }

    /// Create a phrase-not-found error
    pub fn phrase_not_found(phrase: impl Into<String>, project: impl Into<String>) -> Self {
        Self::PhraseNotFound {
            phrase: phrase.into(),
            project: project.into(),
        }
    }

    /// Create a missing-reverse-relation error
    pub fn no_reverse(relation: impl Into<String>, project: impl Into<String>) -> Self {
        Self::NoReverseRelation {
            relation: relation.into(),
            project: project.into(),
        }
    }

    /// Wrap `self` as the failing step after `completed` already committed
    pub fn after(self, completed: impl Into<String>) -> Self {
        Self::PartialFailure {
            completed: completed.into(),
            source: Box::new(self),
        }
    }

    /// Whether some part of the operation was committed
    pub fn is_partial(&self) -> bool {
        matches!(self, Self::PartialFailure { .. })
    }
}

/// Result type for phrasebook operations
pub type Result<T> = std::result::Result<T, Error>;
