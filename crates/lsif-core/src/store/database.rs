//! Per-dump query engine.
//!
//! A `DumpDatabase` is a thin handle: the file handle comes from the shared
//! [`ConnectionPool`](crate::cache::ConnectionPool) for the duration of each
//! read, and decoded documents and result chunks come from the shared caches.
//! Every public query is timed through the store's observer.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexSet;
use parking_lot::Mutex;
use rusqlite::{params, OptionalExtension};
use tracing::debug;

use crate::encoding::decode_json;
use crate::errors::{LsifError, LsifResult};
use crate::indexer::correlator::result_chunk_index;
use crate::models::{
    DocumentData, DocumentSymbol, DumpKey, FoldingRange, Hover, Location, MonikerKind, Package,
    Position, QualifiedRangeId, Range, RangeData, ResultChunkData,
};
use crate::observe::instrument;
use crate::query::position::find_ranges;
use crate::query::{resolve, CodeIntelligence};
use crate::store::schema::{self, MonikerTable};
use crate::store::xrepo::resolver;
use crate::store::StoreContext;

/// Result chunk count of the file at a dump's path, as of a store generation.
#[derive(Clone, Copy)]
struct ChunkCount {
    generation: u64,
    count: u32,
}

pub struct DumpDatabase {
    ctx: Arc<StoreContext>,
    key: DumpKey,
    path: PathBuf,
    lsif_version: String,
    chunks: Mutex<ChunkCount>,
    closed: AtomicBool,
}

impl DumpDatabase {
    /// Open the dump stored for `key` at its canonical path.
    pub fn open(ctx: Arc<StoreContext>, key: DumpKey) -> LsifResult<Self> {
        let path = ctx.dump_path(&key);
        Self::open_path(ctx, key, path)
    }

    /// Open a dump file at an explicit path. A missing file is `NoData`;
    /// every other failure propagates unchanged.
    pub fn open_path(ctx: Arc<StoreContext>, key: DumpKey, path: PathBuf) -> LsifResult<Self> {
        let no_data = || LsifError::no_data(&key.repository, &key.commit);
        match std::fs::metadata(&path) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(no_data()),
            Err(e) => return Err(e.into()),
        }
        let generation = ctx.generation();
        let meta = match ctx.connections.with_connection(&path, schema::read_meta) {
            Err(LsifError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(no_data())
            }
            other => other?,
        };
        debug!(dump = %key, path = %path.display(), chunks = meta.num_result_chunks, "opened dump");
        Ok(Self {
            ctx,
            key,
            path,
            lsif_version: meta.lsif_version,
            chunks: Mutex::new(ChunkCount {
                generation,
                count: meta.num_result_chunks,
            }),
            closed: AtomicBool::new(false),
        })
    }

    pub fn key(&self) -> &DumpKey {
        &self.key
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lsif_version(&self) -> &str {
        &self.lsif_version
    }

    // -----------------------------------------------------------------------
    // Cached reads
    // -----------------------------------------------------------------------

    fn document(&self, path: &str) -> LsifResult<Arc<Option<DocumentData>>> {
        let cache_key = (self.path.clone(), path.to_string());
        self.ctx.documents.get_or_load(cache_key, || {
            let blob: Option<Vec<u8>> = self.ctx.connections.with_connection(&self.path, |conn| {
                Ok(conn
                    .query_row(
                        "SELECT data FROM documents WHERE path = ?1;",
                        params![path],
                        |row| row.get(0),
                    )
                    .optional()?)
            })?;
            blob.map(|bytes| decode_json(&bytes)).transpose()
        })
    }

    /// Chunk count of the file now at `path`. A promotion since the last
    /// read may have replaced the file, so the `meta` row is read again.
    fn num_result_chunks(&self) -> LsifResult<u32> {
        let generation = self.ctx.generation();
        let mut chunks = self.chunks.lock();
        if chunks.generation != generation {
            let meta = self.ctx.connections.with_connection(&self.path, schema::read_meta)?;
            debug!(dump = %self.key, chunks = meta.num_result_chunks, "reloaded dump meta");
            *chunks = ChunkCount {
                generation,
                count: meta.num_result_chunks,
            };
        }
        Ok(chunks.count)
    }

    fn result_chunk(&self, index: u32) -> LsifResult<Arc<Option<ResultChunkData>>> {
        self.ctx.result_chunks.get_or_load((self.path.clone(), index), || {
            let blob: Option<Vec<u8>> = self.ctx.connections.with_connection(&self.path, |conn| {
                Ok(conn
                    .query_row(
                        "SELECT data FROM result_chunks WHERE id = ?1;",
                        params![i64::from(index)],
                        |row| row.get(0),
                    )
                    .optional()?)
            })?;
            blob.map(|bytes| decode_json(&bytes)).transpose()
        })
    }

    /// `(document path, range id)` pairs for qualified ranges of one chunk.
    fn qualify(chunk: &ResultChunkData, ids: &[QualifiedRangeId]) -> Vec<(String, String)> {
        ids.iter()
            .filter_map(|id| {
                let path = chunk.document_paths.get(&id.document_id)?;
                Some((path.clone(), id.range_id.clone()))
            })
            .collect()
    }

    fn definition_result(&self, id: &str) -> LsifResult<Vec<(String, String)>> {
        let chunk = self.result_chunk(result_chunk_index(id, self.num_result_chunks()?))?;
        let Some(chunk) = chunk.as_ref() else {
            return Ok(Vec::new());
        };
        Ok(chunk
            .definition_results
            .get(id)
            .map(|ids| Self::qualify(chunk, ids))
            .unwrap_or_default())
    }

    fn reference_result(&self, id: &str) -> LsifResult<Vec<(String, String)>> {
        let chunk = self.result_chunk(result_chunk_index(id, self.num_result_chunks()?))?;
        let Some(chunk) = chunk.as_ref() else {
            return Ok(Vec::new());
        };
        Ok(chunk
            .reference_results
            .get(id)
            .map(|result| {
                let mut ids = Self::qualify(chunk, &result.definitions);
                ids.extend(Self::qualify(chunk, &result.references));
                ids
            })
            .unwrap_or_default())
    }

    fn location(&self, path: &str, range: Range) -> Location {
        Location {
            repository: self.key.repository.clone(),
            commit: self.key.commit.clone(),
            path: path.to_string(),
            range,
        }
    }

    /// Resolve `(path, range id)` pairs into locations, in order.
    fn locations(&self, ids: Vec<(String, String)>) -> LsifResult<Vec<Location>> {
        let mut out = Vec::with_capacity(ids.len());
        for (path, range_id) in ids {
            let document = self.document(&path)?;
            if let Some(range) = document.as_ref().as_ref().and_then(|d| d.ranges.get(&range_id)) {
                out.push(self.location(&path, range.to_range()));
            }
        }
        Ok(out)
    }

    /// Rows of this dump's moniker table for `(scheme, identifier)`.
    pub(crate) fn moniker_locations(
        &self,
        table: MonikerTable,
        scheme: &str,
        identifier: &str,
    ) -> LsifResult<Vec<Location>> {
        let sql = format!(
            "SELECT document_path, start_line, start_character, end_line, end_character \
             FROM {} WHERE scheme = ?1 AND identifier = ?2 ORDER BY id;",
            table.sql_name()
        );
        self.ctx.connections.with_connection(&self.path, |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![scheme, identifier], |row| {
                let path: String = row.get(0)?;
                let range = Range::new(
                    Position::new(row.get(1)?, row.get(2)?),
                    Position::new(row.get(3)?, row.get(4)?),
                );
                Ok(self.location(&path, range))
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    // -----------------------------------------------------------------------
    // Query building blocks
    // -----------------------------------------------------------------------

    /// Package named by a moniker's package information, if any.
    fn moniker_package(document: &DocumentData, scheme: &str, info_id: Option<&String>) -> Option<Package> {
        let info = document.package_information.get(info_id?)?;
        Some(Package {
            scheme: scheme.to_string(),
            name: info.name.clone(),
            version: info.version.clone(),
        })
    }

    /// Definitions for one range. With `cross_repository`, import monikers
    /// resolve in the package's owning dump.
    fn definitions_for_range(
        &self,
        document: &DocumentData,
        range: &RangeData,
        cross_repository: bool,
    ) -> LsifResult<Vec<Location>> {
        if let Some(id) = resolve::definition_result(document, &range.links)? {
            let locations = self.locations(self.definition_result(id)?)?;
            if !locations.is_empty() {
                return Ok(locations);
            }
        }

        for moniker in resolve::monikers(document, &range.links)? {
            let locations = if moniker.kind == MonikerKind::Import {
                if !cross_repository {
                    continue;
                }
                let Some(package) = Self::moniker_package(
                    document,
                    &moniker.scheme,
                    moniker.package_information.as_ref(),
                ) else {
                    continue;
                };
                resolver::remote_definitions(&self.ctx, &package, &moniker.identifier)?
            } else {
                self.moniker_locations(MonikerTable::Definitions, &moniker.scheme, &moniker.identifier)?
            };
            if !locations.is_empty() {
                return Ok(locations);
            }
        }
        Ok(Vec::new())
    }

    fn references_for_range(&self, document: &DocumentData, range: &RangeData) -> LsifResult<Vec<Location>> {
        let mut locations: IndexSet<Location> = IndexSet::new();
        if let Some(id) = resolve::reference_result(document, &range.links)? {
            locations.extend(self.locations(self.reference_result(id)?)?);
        }

        let monikers = resolve::monikers(document, &range.links)?;
        for moniker in &monikers {
            locations.extend(self.moniker_locations(
                MonikerTable::References,
                &moniker.scheme,
                &moniker.identifier,
            )?);
        }
        for moniker in monikers.iter().filter(|m| m.is_cross_repository()) {
            let Some(package) = Self::moniker_package(
                document,
                &moniker.scheme,
                moniker.package_information.as_ref(),
            ) else {
                continue;
            };
            locations.extend(resolver::remote_references(
                &self.ctx,
                &package,
                &moniker.identifier,
                &self.key,
            )?);
        }
        Ok(locations.into_iter().collect())
    }

    /// Hover text for the innermost range at `position` that has one.
    fn hover_at(&self, path: &str, position: Position) -> LsifResult<Option<Hover>> {
        let document = self.document(path)?;
        let Some(document) = document.as_ref() else {
            return Ok(None);
        };
        for (_, range) in find_ranges(&document.ranges, position) {
            if let Some(id) = resolve::hover_result(document, &range.links)? {
                if let Some(contents) = document.hover_results.get(id) {
                    return Ok(Some(Hover {
                        contents: contents.clone(),
                        range: range.to_range(),
                    }));
                }
            }
        }
        Ok(None)
    }

    /// Hover at `location`, which may live in another dump.
    fn hover_at_location(&self, location: &Location) -> LsifResult<Option<Hover>> {
        if location.repository == self.key.repository && location.commit == self.key.commit {
            return self.hover_at(&location.path, location.range.start);
        }
        let key = DumpKey::new(location.repository.clone(), location.commit.clone());
        match DumpDatabase::open(Arc::clone(&self.ctx), key) {
            Ok(remote) => remote.hover_at(&location.path, location.range.start),
            Err(e) if e.is_no_data() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn first_non_empty<T, F>(&self, path: &str, position: Position, mut per_range: F) -> LsifResult<Vec<T>>
    where
        F: FnMut(&DocumentData, &RangeData) -> LsifResult<Vec<T>>,
    {
        let document = self.document(path)?;
        let Some(document) = document.as_ref() else {
            return Ok(Vec::new());
        };
        for (_, range) in find_ranges(&document.ranges, position) {
            let found = per_range(document, range)?;
            if !found.is_empty() {
                return Ok(found);
            }
        }
        Ok(Vec::new())
    }
}

impl CodeIntelligence for DumpDatabase {
    fn hover(&self, path: &str, position: Position) -> LsifResult<Option<Hover>> {
        instrument(self.ctx.observer.as_ref(), "hover", || {
            if let Some(hover) = self.hover_at(path, position)? {
                return Ok(Some(hover));
            }
            // Fall back to the hover at the definition, one hop only.
            let document = self.document(path)?;
            let Some(document) = document.as_ref() else {
                return Ok(None);
            };
            let Some((_, range)) = find_ranges(&document.ranges, position).into_iter().next() else {
                return Ok(None);
            };
            let definitions = self.first_non_empty(path, position, |doc, range| {
                self.definitions_for_range(doc, range, true)
            })?;
            match definitions.first() {
                Some(definition) => Ok(self.hover_at_location(definition)?.map(|hover| Hover {
                    contents: hover.contents,
                    range: range.to_range(),
                })),
                None => Ok(None),
            }
        })
    }

    fn definitions(&self, path: &str, position: Position) -> LsifResult<Vec<Location>> {
        instrument(self.ctx.observer.as_ref(), "definitions", || {
            self.first_non_empty(path, position, |document, range| {
                self.definitions_for_range(document, range, true)
            })
        })
    }

    fn references(&self, path: &str, position: Position) -> LsifResult<Vec<Location>> {
        instrument(self.ctx.observer.as_ref(), "references", || {
            self.first_non_empty(path, position, |document, range| {
                self.references_for_range(document, range)
            })
        })
    }

    fn declarations(&self, path: &str, position: Position) -> LsifResult<Vec<Location>> {
        instrument(self.ctx.observer.as_ref(), "declarations", || {
            self.first_non_empty(path, position, |document, range| {
                self.definitions_for_range(document, range, false)
            })
        })
    }

    fn document_symbols(&self, path: &str) -> LsifResult<Vec<DocumentSymbol>> {
        instrument(self.ctx.observer.as_ref(), "documentSymbols", || {
            let document = self.document(path)?;
            Ok(document
                .as_ref()
                .as_ref()
                .map(|d| d.document_symbols.clone())
                .unwrap_or_default())
        })
    }

    fn folding_ranges(&self, path: &str) -> LsifResult<Vec<FoldingRange>> {
        instrument(self.ctx.observer.as_ref(), "foldingRanges", || {
            let document = self.document(path)?;
            Ok(document
                .as_ref()
                .as_ref()
                .map(|d| d.folding_ranges.clone())
                .unwrap_or_default())
        })
    }

    fn exists(&self, path: &str) -> LsifResult<bool> {
        self.ctx.connections.with_connection(&self.path, |conn| {
            Ok(conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM documents WHERE path = ?1);",
                params![path],
                |row| row.get(0),
            )?)
        })
    }

    fn document_paths(&self) -> LsifResult<Vec<String>> {
        self.ctx.connections.with_connection(&self.path, |conn| {
            let mut stmt = conn.prepare("SELECT path FROM documents ORDER BY path;")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            Ok(rows.collect::<Result<Vec<String>, _>>()?)
        })
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.ctx.connections.evict(&self.path);
            debug!(dump = %self.key, "closed dump");
        }
    }
}
