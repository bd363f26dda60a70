//! Ingestion: wire format, correlation, and dump writing.

pub mod correlator;
pub mod importer;
pub mod lsif;

pub use correlator::{correlate, CorrelatedDump, Correlator};
pub use importer::{import_lsif, ImportSummary};
