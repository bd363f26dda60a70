//! Bounded resource pools shared by every open dump.

pub mod lru;
pub mod pool;

use std::path::PathBuf;

use crate::models::{DocumentData, ResultChunkData};

pub use lru::LoadingCache;
pub use pool::{ConnectionPool, OpenMode, PooledConnection};

/// Per-document slices keyed by (dump file, document path). A `None` value
/// records that the dump has no such document.
pub type DocumentCache = LoadingCache<(PathBuf, String), Option<DocumentData>>;

/// Result chunks keyed by (dump file, chunk index).
pub type ResultChunkCache = LoadingCache<(PathBuf, u32), Option<ResultChunkData>>;

pub fn document_weight(document: &Option<DocumentData>) -> usize {
    document.as_ref().map_or(1, DocumentData::weight)
}

pub fn result_chunk_weight(chunk: &Option<ResultChunkData>) -> usize {
    chunk.as_ref().map_or(1, ResultChunkData::weight)
}
