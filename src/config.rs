//! Deserializes the experiment harness's JSON configuration file.

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TableChoice {
    NarrowE,
    NarrowU,
    WideE,
    Strings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TestParams {
    pub selectivity: f32,
    pub predicate_column: i32,
    pub projection_width: i32,
    pub use_index: bool,
    pub sort_matches: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HarnessConfig {
    pub block_based: bool,
    pub table_choice: TableChoice,
    pub use_column_store: bool,
    pub use_compression: bool,
    pub column_store_sort_column: i32,
    pub use_index: bool,
    pub index_column: i32,
    pub num_tuples: u64,
    pub num_runs: u32,
    pub num_threads: u32,
    #[serde(default)]
    pub thread_affinities: Vec<i32>,
    pub measure_cache_misses: bool,
    #[serde(default)]
    pub block_size_slots: u32,
    pub test_params: Vec<TestParams>,
}

impl HarnessConfig {
    pub fn from_str(text: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &std::path::Path) -> crate::error::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_config() {
        let json = r#"{
            "block_based": true,
            "table_choice": "narrow-e",
            "use_column_store": true,
            "use_compression": false,
            "column_store_sort_column": 0,
            "use_index": true,
            "index_column": 0,
            "num_tuples": 1000,
            "num_runs": 3,
            "num_threads": 4,
            "measure_cache_misses": true,
            "test_params": [
                {"selectivity": 0.1, "predicate_column": 0, "projection_width": 1, "use_index": true, "sort_matches": false}
            ]
        }"#;
        let config = HarnessConfig::from_str(json).unwrap();
        assert_eq!(config.table_choice, TableChoice::NarrowE);
        assert_eq!(config.test_params.len(), 1);
        assert!(config.thread_affinities.is_empty());
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(HarnessConfig::from_str("{ not json").is_err());
    }
}
