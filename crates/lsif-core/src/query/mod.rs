//! Query layer: the capability interface shared by single-dump and
//! comparison engines, plus the pure helpers they are built from.

pub mod comparison;
pub mod guards;
pub mod position;
pub mod resolve;

use crate::errors::LsifResult;
use crate::models::{DocumentSymbol, FoldingRange, Hover, Location, Position};

/// Positional code-intelligence queries over one logical dump.
///
/// Paths are relative to the dump's project root.
pub trait CodeIntelligence: Send + Sync {
    fn hover(&self, path: &str, position: Position) -> LsifResult<Option<Hover>>;

    fn definitions(&self, path: &str, position: Position) -> LsifResult<Vec<Location>>;

    fn references(&self, path: &str, position: Position) -> LsifResult<Vec<Location>>;

    /// Definitions inside this dump only; never leaves the repository.
    fn declarations(&self, path: &str, position: Position) -> LsifResult<Vec<Location>>;

    fn document_symbols(&self, path: &str) -> LsifResult<Vec<DocumentSymbol>>;

    fn folding_ranges(&self, path: &str) -> LsifResult<Vec<FoldingRange>>;

    fn exists(&self, path: &str) -> LsifResult<bool>;

    fn document_paths(&self) -> LsifResult<Vec<String>>;

    /// Release any handle held for the dump. Closing twice is a no-op.
    fn close(&self);
}
