//! Store configuration.
//!
//! Every field has a default so a partial JSON file (or no file at all) is a
//! valid configuration. Values are clamped into the ranges in
//! [`crate::query::guards`] before use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{LsifError, LsifResult};
use crate::query::guards::{
    clamp_rate, clamp_usize, MAX_CACHE_CAPACITY, MAX_CANDIDATE_DUMPS_PER_QUERY,
    MAX_CONNECTION_CACHE_CAPACITY, MAX_RESULTS_PER_CHUNK, MAX_RESULT_CHUNKS,
    MIN_CACHE_CAPACITY, MIN_CONNECTION_CACHE_CAPACITY, MIN_RESULTS_PER_CHUNK,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub storage_root: PathBuf,
    pub connection_cache_capacity: usize,
    pub document_cache_capacity: usize,
    pub result_chunk_cache_capacity: usize,
    pub filter_false_positive_rate: f64,
    pub max_candidate_dumps: usize,
    pub results_per_result_chunk: usize,
    pub max_result_chunks: usize,
    pub stale_temp_file_max_age_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("./lsif-storage"),
            connection_cache_capacity: 100,
            document_cache_capacity: 1_000_000,
            result_chunk_cache_capacity: 1_000_000,
            filter_false_positive_rate: 0.01,
            max_candidate_dumps: MAX_CANDIDATE_DUMPS_PER_QUERY as usize,
            results_per_result_chunk: 500,
            max_result_chunks: 1000,
            stale_temp_file_max_age_secs: 3600,
        }
    }
}

fn env_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl StoreConfig {
    pub fn with_storage_root(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
            ..Self::default()
        }
    }

    /// Build a configuration from `LSIF_*` environment variables. Unset or
    /// unparsable variables keep their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            storage_root: std::env::var_os("LSIF_STORAGE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_root),
            connection_cache_capacity: env_var("LSIF_CONNECTION_CACHE_CAPACITY")
                .unwrap_or(defaults.connection_cache_capacity),
            document_cache_capacity: env_var("LSIF_DOCUMENT_CACHE_CAPACITY")
                .unwrap_or(defaults.document_cache_capacity),
            result_chunk_cache_capacity: env_var("LSIF_RESULT_CHUNK_CACHE_CAPACITY")
                .unwrap_or(defaults.result_chunk_cache_capacity),
            filter_false_positive_rate: env_var("LSIF_FILTER_FALSE_POSITIVE_RATE")
                .unwrap_or(defaults.filter_false_positive_rate),
            max_candidate_dumps: env_var("LSIF_MAX_CANDIDATE_DUMPS")
                .unwrap_or(defaults.max_candidate_dumps),
            results_per_result_chunk: env_var("LSIF_RESULTS_PER_RESULT_CHUNK")
                .unwrap_or(defaults.results_per_result_chunk),
            max_result_chunks: env_var("LSIF_MAX_RESULT_CHUNKS")
                .unwrap_or(defaults.max_result_chunks),
            stale_temp_file_max_age_secs: env_var("LSIF_STALE_TEMP_FILE_MAX_AGE_SECS")
                .unwrap_or(defaults.stale_temp_file_max_age_secs),
        }
        .normalized()
    }

    pub fn from_json_file(path: &Path) -> LsifResult<Self> {
        let raw = std::fs::read(path)?;
        let config: Self = serde_json::from_slice(&raw)
            .map_err(|e| LsifError::Config(format!("{}: {e}", path.display())))?;
        Ok(config.normalized())
    }

    /// Clamp every numeric field into its guard range.
    pub fn normalized(mut self) -> Self {
        self.connection_cache_capacity = clamp_usize(
            self.connection_cache_capacity,
            MIN_CONNECTION_CACHE_CAPACITY,
            MAX_CONNECTION_CACHE_CAPACITY,
        );
        self.document_cache_capacity =
            clamp_usize(self.document_cache_capacity, MIN_CACHE_CAPACITY, MAX_CACHE_CAPACITY);
        self.result_chunk_cache_capacity = clamp_usize(
            self.result_chunk_cache_capacity,
            MIN_CACHE_CAPACITY,
            MAX_CACHE_CAPACITY,
        );
        self.filter_false_positive_rate = clamp_rate(self.filter_false_positive_rate);
        self.max_candidate_dumps =
            clamp_usize(self.max_candidate_dumps, 1, MAX_CANDIDATE_DUMPS_PER_QUERY);
        self.results_per_result_chunk = clamp_usize(
            self.results_per_result_chunk,
            MIN_RESULTS_PER_CHUNK,
            MAX_RESULTS_PER_CHUNK,
        );
        self.max_result_chunks = clamp_usize(self.max_result_chunks, 1, MAX_RESULT_CHUNKS);
        self
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.storage_root.join("tmp")
    }

    pub fn xrepo_path(&self) -> PathBuf {
        self.storage_root.join("xrepo.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"storage_root": "/var/lib/lsif", "max_candidate_dumps": 4}"#,
        )
        .unwrap();

        let config = StoreConfig::from_json_file(&path).unwrap();
        assert_eq!(config.storage_root, PathBuf::from("/var/lib/lsif"));
        assert_eq!(config.max_candidate_dumps, 4);
        assert_eq!(config.connection_cache_capacity, 100);
        assert_eq!(config.filter_false_positive_rate, 0.01);
    }

    #[test]
    fn invalid_json_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = StoreConfig::from_json_file(&path).unwrap_err();
        assert!(matches!(err, LsifError::Config(_)));
    }

    #[test]
    fn normalization_clamps_out_of_range_values() {
        let config = StoreConfig {
            connection_cache_capacity: 0,
            max_candidate_dumps: 10_000,
            filter_false_positive_rate: 2.0,
            ..StoreConfig::default()
        }
        .normalized();

        assert_eq!(config.connection_cache_capacity, 1);
        assert_eq!(
            config.max_candidate_dumps,
            MAX_CANDIDATE_DUMPS_PER_QUERY as usize
        );
        assert_eq!(config.filter_false_positive_rate, 0.5);
    }

    #[test]
    fn layout_paths_live_under_storage_root() {
        let config = StoreConfig::with_storage_root("/data");
        assert_eq!(config.scratch_dir(), PathBuf::from("/data/tmp"));
        assert_eq!(config.xrepo_path(), PathBuf::from("/data/xrepo.db"));
    }
}
