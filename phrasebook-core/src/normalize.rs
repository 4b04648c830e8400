//! Phrase normalizers
//!
//! A normalizer maps a raw phrase to the canonical key used by a project's
//! phrase index. Normalizers are plain functions looked up by name; the empty
//! name (and any unknown name) selects [`default_normalizer`].

use std::collections::BTreeMap;

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Signature every normalizer has
pub type NormalizeFn = fn(&str) -> String;

/// Name of the fallback normalizer
pub const DEFAULT_NORMALIZER: &str = "default";

/// Registry of named normalizers
#[derive(Debug, Clone)]
pub struct NormalizerRegistry {
    normalizers: BTreeMap<String, NormalizeFn>,
}

impl Default for NormalizerRegistry {
    fn default() -> Self {
        let mut registry = Self {
            normalizers: BTreeMap::new(),
        };
        registry.register(DEFAULT_NORMALIZER, default_normalizer);
        registry.register("German", german_normalizer);
        registry
    }
}

impl NormalizerRegistry {
    /// Registry holding the built-in normalizers
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a normalizer under `name`
    pub fn register(&mut self, name: impl Into<String>, normalizer: NormalizeFn) {
        self.normalizers.insert(name.into(), normalizer);
    }

    /// Whether `name` resolves to a registered normalizer
    pub fn contains(&self, name: &str) -> bool {
        name.is_empty() || self.normalizers.contains_key(name)
    }

    /// Registered normalizer names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.normalizers.keys().map(String::as_str).collect()
    }

    /// Normalize `phrase` with the normalizer registered as `name`
    pub fn normalize(&self, phrase: &str, name: &str) -> String {
        match self.normalizers.get(name) {
            Some(normalizer) => normalizer(phrase),
            None => {
                if !name.is_empty() {
                    log::debug!("Unknown normalizer {:?}, using default", name);
                }
                default_normalizer(phrase)
            }
        }
    }
}

/// Trim, collapse whitespace, strip diacritics and punctuation, lowercase.
pub fn default_normalizer(phrase: &str) -> String {
    let stripped: String = collapse_whitespace(phrase)
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '_' | '\'' | '-'))
        .flat_map(char::to_lowercase)
        .collect();
    // dropped punctuation can leave doubled or edge spaces behind
    collapse_whitespace(&stripped)
}

/// [`default_normalizer`] with `ß` spelled out as `ss`
pub fn german_normalizer(phrase: &str) -> String {
    let spelled = phrase.replace(['ß', 'ẞ'], "ss");
    default_normalizer(&spelled)
}

/// Trim and reduce every whitespace run to a single space
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
