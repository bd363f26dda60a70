//! Storage layer: dump files, the cross-repository index, and the shared
//! pools and caches every open dump draws from.

pub mod database;
pub mod schema;
pub mod xrepo;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::cache::{
    document_weight, result_chunk_weight, ConnectionPool, DocumentCache, ResultChunkCache,
};
use crate::config::StoreConfig;
use crate::errors::LsifResult;
use crate::models::DumpKey;
use crate::observe::QueryObserver;
use crate::store::xrepo::XrepoDatabase;

pub use database::DumpDatabase;

/// Characters left as-is in dump file names.
const FILENAME_SET: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.');

pub const DUMP_FILE_SUFFIX: &str = ".lsif.db";

/// File name of the dump for `key`: `{repository}@{commit}.lsif.db`, both
/// parts percent-encoded so any repository name maps to one flat file.
pub fn make_filename(storage_root: &Path, key: &DumpKey) -> PathBuf {
    let name = format!(
        "{}@{}{}",
        utf8_percent_encode(&key.repository, FILENAME_SET),
        utf8_percent_encode(&key.commit, FILENAME_SET),
        DUMP_FILE_SUFFIX
    );
    storage_root.join(name)
}

/// Everything shared by the dumps of one storage root.
pub struct StoreContext {
    pub config: StoreConfig,
    pub xrepo: XrepoDatabase,
    pub connections: ConnectionPool,
    pub documents: DocumentCache,
    pub result_chunks: ResultChunkCache,
    pub observer: Arc<dyn QueryObserver>,
    /// Bumped on every promotion so open dumps re-read their `meta` row.
    generation: AtomicU64,
}

impl StoreContext {
    /// Create the storage directories and open the cross-repository index.
    pub fn open(config: StoreConfig, observer: Arc<dyn QueryObserver>) -> LsifResult<Self> {
        let config = config.normalized();
        std::fs::create_dir_all(&config.storage_root)?;
        std::fs::create_dir_all(config.scratch_dir())?;
        let xrepo = XrepoDatabase::open(
            &config.xrepo_path(),
            config.filter_false_positive_rate,
            config.max_candidate_dumps,
        )?;
        Ok(Self {
            connections: ConnectionPool::new(config.connection_cache_capacity),
            documents: DocumentCache::new(config.document_cache_capacity, document_weight),
            result_chunks: ResultChunkCache::new(config.result_chunk_cache_capacity, result_chunk_weight),
            xrepo,
            observer,
            config,
            generation: AtomicU64::new(0),
        })
    }

    pub fn dump_path(&self, key: &DumpKey) -> PathBuf {
        make_filename(&self.config.storage_root, key)
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Drop every pooled handle and cached slice for the dump at `path`.
    pub fn invalidate(&self, path: &Path) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.connections.evict(path);
        self.documents.invalidate(|(file, _)| file == path);
        self.result_chunks.invalidate(|(file, _)| file == path);
    }
}
