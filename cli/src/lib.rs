//! Phrasebook command line
//!
//! Opens a RocksDB-backed [`PhraseBook`](phrasebook_core::PhraseBook) and runs
//! one subcommand against it, printing the result as JSON.

pub mod commands;
pub mod error;

pub use commands::{execute, Command};
pub use error::{CliError, CliResult};

use std::path::Path;

use phrasebook_core::IndexConfig;

/// Read an [`IndexConfig`] from a JSON file; missing fields take defaults
pub fn load_config(path: &Path) -> CliResult<IndexConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| CliError::Config {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_config_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"byteBudget": 2048}}"#).unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.byte_budget, 2048);
        assert_eq!(config.default_relation, "see also");
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(Path::new("/nonexistent/phrasebook.json")).unwrap_err();
        assert!(matches!(err, CliError::Config { .. }));
    }
}
