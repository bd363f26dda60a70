//! Shared typed models used across ingestion, storage, and query layers.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Identifier of a vertex in the external index format, normalized to a string.
pub type Id = String;

// ---------------------------------------------------------------------------
// 1. Dump identity
// ---------------------------------------------------------------------------

/// Identity of one dump: a repository at a commit.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DumpKey {
    pub repository: String,
    pub commit: String,
}

impl DumpKey {
    pub fn new(repository: impl Into<String>, commit: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            commit: commit.into(),
        }
    }
}

impl fmt::Display for DumpKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.repository, self.commit)
    }
}

/// A registered dump as listed by the cross-repository index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpRecord {
    pub key: DumpKey,
    /// Seconds since the Unix epoch of the latest registration.
    pub uploaded_at: i64,
}

// ---------------------------------------------------------------------------
// 2. Positions and query results
// ---------------------------------------------------------------------------

/// A zero-based line/character position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// A half-open `[start, end)` span.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }
}

/// A range inside a document of a specific dump.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub repository: String,
    pub commit: String,
    pub path: String,
    pub range: Range,
}

/// Rendered hover markdown and the range it applies to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hover {
    pub contents: String,
    pub range: Range,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoldingRange {
    pub start_line: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_character: Option<u32>,
    pub end_line: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_character: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSymbol {
    pub name: String,
    pub kind: u32,
    pub range: Range,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DocumentSymbol>,
}

// ---------------------------------------------------------------------------
// 3. Monikers and packages
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonikerKind {
    #[default]
    Local,
    Import,
    Export,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonikerData {
    pub kind: MonikerKind,
    pub scheme: String,
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_information: Option<Id>,
}

impl MonikerData {
    /// Only import/export monikers that name a package can leave their dump.
    pub fn is_cross_repository(&self) -> bool {
        self.kind != MonikerKind::Local && self.package_information.is_some()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInformationData {
    pub name: String,
    pub version: String,
}

/// A package declared by a dump: `(scheme, name, version)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Package {
    pub scheme: String,
    pub name: String,
    pub version: String,
}

/// The identifiers a dump uses from one package it depends on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolReferences {
    pub package: Package,
    pub identifiers: Vec<String>,
}

// ---------------------------------------------------------------------------
// 4. Query Representation records
// ---------------------------------------------------------------------------

/// The links shared by ranges and result sets.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultLinks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hover_result: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition_result: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_result: Option<Id>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub monikers: Vec<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<Id>,
}

pub type ResultSetData = ResultLinks;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeData {
    pub start_line: u32,
    pub start_character: u32,
    pub end_line: u32,
    pub end_character: u32,
    #[serde(flatten)]
    pub links: ResultLinks,
}

impl RangeData {
    pub fn start(&self) -> Position {
        Position::new(self.start_line, self.start_character)
    }

    pub fn end(&self) -> Position {
        Position::new(self.end_line, self.end_character)
    }

    pub fn to_range(&self) -> Range {
        Range::new(self.start(), self.end())
    }

    /// `[start, end)` containment.
    pub fn contains(&self, position: Position) -> bool {
        self.start() <= position && position < self.end()
    }

    /// `end - start` as (lines, characters); lines dominate.
    pub fn span(&self) -> (u32, i64) {
        let lines = self.end_line.saturating_sub(self.start_line);
        let characters = i64::from(self.end_character) - i64::from(self.start_character);
        (lines, characters)
    }
}

/// One document's slice of a dump.
///
/// `ranges` is kept sorted by `(start_line, start_character)` so positions can
/// be located by binary search.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentData {
    pub ranges: IndexMap<Id, RangeData>,
    pub result_sets: IndexMap<Id, ResultSetData>,
    pub hover_results: IndexMap<Id, String>,
    pub monikers: IndexMap<Id, MonikerData>,
    pub package_information: IndexMap<Id, PackageInformationData>,
    #[serde(default)]
    pub folding_ranges: Vec<FoldingRange>,
    #[serde(default)]
    pub document_symbols: Vec<DocumentSymbol>,
}

impl DocumentData {
    /// Approximate in-memory size used as the document cache weight.
    pub fn weight(&self) -> usize {
        1 + self.ranges.len()
            + self.result_sets.len()
            + self.hover_results.len()
            + self.monikers.len()
            + self.folding_ranges.len()
            + self.document_symbols.len()
    }
}

/// A range identifier together with the document that owns it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualifiedRangeId {
    pub document_id: Id,
    pub range_id: Id,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceResultData {
    pub definitions: Vec<QualifiedRangeId>,
    pub references: Vec<QualifiedRangeId>,
}

/// One page of definition and reference results.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultChunkData {
    pub document_paths: IndexMap<Id, String>,
    pub definition_results: IndexMap<Id, Vec<QualifiedRangeId>>,
    pub reference_results: IndexMap<Id, ReferenceResultData>,
}

impl ResultChunkData {
    pub fn weight(&self) -> usize {
        1 + self.document_paths.len()
            + self.definition_results.len()
            + self.reference_results.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(sl: u32, sc: u32, el: u32, ec: u32) -> RangeData {
        RangeData {
            start_line: sl,
            start_character: sc,
            end_line: el,
            end_character: ec,
            links: ResultLinks::default(),
        }
    }

    #[test]
    fn containment_is_half_open() {
        let r = range(1, 4, 1, 8);
        assert!(r.contains(Position::new(1, 4)));
        assert!(r.contains(Position::new(1, 7)));
        assert!(!r.contains(Position::new(1, 8)));
        assert!(!r.contains(Position::new(0, 5)));
    }

    #[test]
    fn multi_line_span_is_larger_than_single_line() {
        assert!(range(1, 0, 3, 0).span() > range(2, 0, 2, 80).span());
    }

    #[test]
    fn cross_repository_eligibility() {
        let mut moniker = MonikerData {
            kind: MonikerKind::Import,
            scheme: "npm".into(),
            identifier: "lodash:map".into(),
            package_information: Some("7".into()),
        };
        assert!(moniker.is_cross_repository());

        moniker.kind = MonikerKind::Local;
        assert!(!moniker.is_cross_repository());

        moniker.kind = MonikerKind::Export;
        moniker.package_information = None;
        assert!(!moniker.is_cross_repository());
    }

    #[test]
    fn dump_key_display() {
        assert_eq!(DumpKey::new("github.com/a/b", "abc").to_string(), "github.com/a/b@abc");
    }
}
