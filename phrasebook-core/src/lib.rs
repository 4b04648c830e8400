//! Phrasebook core
//!
//! Persistence and retrieval layer for a personal vocabulary notebook.
//! Phrases are stored per project, normalized by the project's normalizer,
//! indexed for exact / substring / fuzzy lookup, and linked to each other by
//! typed reciprocal relations.
//!
//! ## Features
//!
//! - **Per-project phrase indices** - normalized phrase to note key, one index per project
//! - **Reciprocal relations** - every relation is mirrored on its target under the paired type
//! - **Read-through cache** - notes are read cache-first, misses fetched in one batch
//! - **Pluggable storage** - any async [`KvStore`]; RocksDB and in-memory adapters included
//!
//! ## Example
//!
//! ```ignore
//! use phrasebook_core::{IndexConfig, NoteRecord, PhraseBook, Query, RocksKv};
//!
//! let store = Arc::new(RocksKv::open(&db_path)?);
//! let mut book = PhraseBook::load(store, IndexConfig::default()).await?;
//!
//! book.add("cat", "default", NoteRecord::new().tag("animal")).await?;
//! let response = book.find(&Query::lookup("Cat")).await?;
//! ```

pub mod book;
pub mod cache;
pub mod config;
pub mod error;
pub mod kv;
mod mutation;
pub mod normalize;
pub mod note;
pub mod phrase_index;
pub mod project;
pub mod query;
mod relations;

// Re-exports for convenience
pub use book::PhraseBook;
pub use cache::NoteCache;
pub use config::{IndexConfig, DEFAULT_BYTE_BUDGET};
pub use error::{Error, Result};
pub use kv::{Blob, KvStore, MemoryKv, RocksKv};
pub use normalize::{NormalizeFn, NormalizerRegistry};
pub use note::{Citation, NoteKey, NoteRecord, ProjectInfo, DEFAULT_PROJECT, SEE_ALSO};
pub use phrase_index::PhraseIndex;
pub use project::{ProjectDraft, ProjectRef, ProjectRegistry};
pub use query::{AdHocQuery, FindResponse, NoteMatch, Query, Strictness};
