//! lsif-core — storage and query engine for LSIF code-intelligence dumps.
//!
//! An index stream produced by a language indexer is correlated into
//! per-document slices and paged result chunks, written to one SQLite file
//! per (repository, commit), and served through the [`CodeIntelligence`]
//! interface: hover, definitions, references, declarations, document
//! symbols, and folding ranges. Monikers link dumps to each other through a
//! cross-repository index of packages and bloom-filtered references.
//!
//! [`Backend`] is the entry point: `insert_dump` ingests, `create_database`
//! opens a dump for queries.

pub mod backend;
pub mod bloom;
pub mod cache;
pub mod config;
pub mod encoding;
pub mod errors;
pub mod indexer;
pub mod maintenance;
pub mod models;
pub mod observe;
pub mod query;
pub mod store;

pub use backend::Backend;
pub use config::StoreConfig;
pub use errors::{LsifError, LsifResult};
pub use observe::{QueryObserver, TracingObserver};
pub use query::comparison::{ComparisonDatabase, NamedDatabase};
pub use query::CodeIntelligence;
pub use store::DumpDatabase;
