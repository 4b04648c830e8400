//! Index configuration

use serde::{Deserialize, Serialize};

use crate::note::SEE_ALSO;

/// Storage budget of the backing store, in bytes (5 MiB)
pub const DEFAULT_BYTE_BUDGET: u64 = 5_242_880;

/// Tunables for a [`PhraseBook`](crate::PhraseBook)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IndexConfig {
    /// Total bytes the store may hold; `memfree` reports against this
    pub byte_budget: u64,
    /// Symmetric relation given to projects saved without a relation set
    pub default_relation: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            byte_budget: DEFAULT_BYTE_BUDGET,
            default_relation: SEE_ALSO.to_string(),
        }
    }
}

impl IndexConfig {
    /// Relation set for a project that did not declare one
    pub fn default_relations(&self) -> Vec<(String, String)> {
        vec![(self.default_relation.clone(), self.default_relation.clone())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = IndexConfig::default();
        assert_eq!(config.byte_budget, 5_242_880);
        assert_eq!(
            config.default_relations(),
            vec![(SEE_ALSO.to_string(), SEE_ALSO.to_string())]
        );
    }

    #[test]
    fn test_config_partial_json() {
        let config: IndexConfig = serde_json::from_str(r#"{"byteBudget": 1024}"#).unwrap();
        assert_eq!(config.byte_budget, 1024);
        assert_eq!(config.default_relation, SEE_ALSO);
    }
}
