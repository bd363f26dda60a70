//! SQLite schema DDL for dump files and the cross-repository index.
//!
//! Every statement uses `IF NOT EXISTS` so initialisation is safe to replay.

use rusqlite::{params, Connection, OptionalExtension};

use crate::errors::{LsifError, LsifResult};

/// Layout version written into every dump's `meta` row.
pub const SCHEMA_VERSION: i32 = 1;

/// Layout version of the cross-repository index, kept in `user_version`.
pub const XREPO_SCHEMA_VERSION: i32 = 2;

pub const DUMP_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS meta (
        id INTEGER PRIMARY KEY,
        lsif_version TEXT NOT NULL,
        schema_version INTEGER NOT NULL,
        num_result_chunks INTEGER NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS documents (
        path TEXT PRIMARY KEY,
        data BLOB NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS result_chunks (
        id INTEGER PRIMARY KEY,
        data BLOB NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS definitions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        scheme TEXT NOT NULL,
        identifier TEXT NOT NULL,
        document_path TEXT NOT NULL,
        start_line INTEGER NOT NULL,
        start_character INTEGER NOT NULL,
        end_line INTEGER NOT NULL,
        end_character INTEGER NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS \"references\" (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        scheme TEXT NOT NULL,
        identifier TEXT NOT NULL,
        document_path TEXT NOT NULL,
        start_line INTEGER NOT NULL,
        start_character INTEGER NOT NULL,
        end_line INTEGER NOT NULL,
        end_character INTEGER NOT NULL
    );",
    "CREATE INDEX IF NOT EXISTS idx_definitions_moniker ON definitions(scheme, identifier);",
    "CREATE INDEX IF NOT EXISTS idx_references_moniker ON \"references\"(scheme, identifier);",
];

pub const XREPO_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS packages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        scheme TEXT NOT NULL,
        name TEXT NOT NULL,
        version TEXT NOT NULL,
        repository TEXT NOT NULL,
        \"commit\" TEXT NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS package_references (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        scheme TEXT NOT NULL,
        name TEXT NOT NULL,
        version TEXT NOT NULL,
        repository TEXT NOT NULL,
        \"commit\" TEXT NOT NULL,
        filter BLOB NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS dumps (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        repository TEXT NOT NULL,
        \"commit\" TEXT NOT NULL,
        uploaded_at INTEGER NOT NULL
    );",
    "CREATE INDEX IF NOT EXISTS idx_packages_identity ON packages(scheme, name, version);",
    "CREATE INDEX IF NOT EXISTS idx_dumps_repository ON dumps(repository, \"commit\");",
    "CREATE INDEX IF NOT EXISTS idx_package_references_identity \
     ON package_references(scheme, name, version);",
];

/// Which moniker-keyed location table of a dump to read or write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MonikerTable {
    Definitions,
    References,
}

impl MonikerTable {
    /// Quoted table name, safe to splice into SQL.
    pub fn sql_name(self) -> &'static str {
        match self {
            Self::Definitions => "definitions",
            Self::References => "\"references\"",
        }
    }
}

/// Create the dump tables on a fresh (scratch) file.
pub fn init_dump_schema(conn: &Connection) -> LsifResult<()> {
    for stmt in DUMP_STATEMENTS {
        conn.execute_batch(stmt)?;
    }
    Ok(())
}

/// The single `meta` row of a dump file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DumpMeta {
    pub lsif_version: String,
    pub schema_version: i32,
    pub num_result_chunks: u32,
}

pub fn write_meta(conn: &Connection, meta: &DumpMeta) -> LsifResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO meta(id, lsif_version, schema_version, num_result_chunks) \
         VALUES(1, ?1, ?2, ?3);",
        params![meta.lsif_version, meta.schema_version, meta.num_result_chunks],
    )?;
    Ok(())
}

pub fn read_meta(conn: &Connection) -> LsifResult<DumpMeta> {
    let meta = conn
        .query_row(
            "SELECT lsif_version, schema_version, num_result_chunks FROM meta WHERE id = 1;",
            [],
            |row| {
                Ok(DumpMeta {
                    lsif_version: row.get(0)?,
                    schema_version: row.get(1)?,
                    num_result_chunks: row.get(2)?,
                })
            },
        )
        .optional()?;
    let meta = meta.ok_or_else(|| LsifError::Database("dump has no meta row".into()))?;
    if meta.schema_version > SCHEMA_VERSION {
        return Err(LsifError::Database(format!(
            "dump schema version {} is newer than supported {}",
            meta.schema_version, SCHEMA_VERSION
        )));
    }
    Ok(meta)
}

/// Create the cross-repository tables and switch the file to WAL mode so
/// readers see a consistent snapshot while a registration commits.
pub fn init_xrepo_schema(conn: &Connection) -> LsifResult<()> {
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if version > XREPO_SCHEMA_VERSION {
        return Err(LsifError::Database(format!(
            "cross-repository index version {version} is newer than supported {XREPO_SCHEMA_VERSION}"
        )));
    }
    for stmt in XREPO_STATEMENTS {
        conn.execute_batch(stmt)?;
    }
    if version < XREPO_SCHEMA_VERSION {
        conn.pragma_update(None, "user_version", XREPO_SCHEMA_VERSION)?;
    }
    Ok(())
}
