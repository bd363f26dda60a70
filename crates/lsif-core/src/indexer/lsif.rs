//! Wire records of the vertex/edge index format.
//!
//! Only the labels the correlator uses are modelled; any other vertex or
//! edge deserializes to `Unknown` and is skipped. Identifiers may be JSON
//! numbers or strings and are normalized to strings.

use std::io::{BufRead, Read};

use flate2::read::GzDecoder;
use serde::{Deserialize, Deserializer};

use crate::errors::{LsifError, LsifResult};
use crate::models::{FoldingRange, Id, MonikerKind};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(u64),
    Text(String),
}

impl From<RawId> for Id {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Number(n) => n.to_string(),
            RawId::Text(s) => s,
        }
    }
}

fn id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Id, D::Error> {
    RawId::deserialize(deserializer).map(Id::from)
}

fn opt_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Id>, D::Error> {
    Ok(Option::<RawId>::deserialize(deserializer)?.map(Id::from))
}

fn ids<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Id>, D::Error> {
    Ok(Vec::<RawId>::deserialize(deserializer)?
        .into_iter()
        .map(Id::from)
        .collect())
}

// ---------------------------------------------------------------------------
// Elements
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Element {
    Vertex(Vertex),
    Edge(Edge),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct WirePosition {
    pub line: u32,
    pub character: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct WireRange {
    pub start: WirePosition,
    pub end: WirePosition,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "label", rename_all = "camelCase")]
pub enum Vertex {
    MetaData(MetaDataVertex),
    Document(DocumentVertex),
    Range(RangeVertex),
    ResultSet(Bare),
    DefinitionResult(Bare),
    ReferenceResult(Bare),
    HoverResult(HoverResultVertex),
    Moniker(MonikerVertex),
    PackageInformation(PackageInformationVertex),
    FoldingRangeResult(FoldingRangeResultVertex),
    DocumentSymbolResult(DocumentSymbolResultVertex),
    #[serde(other)]
    Unknown,
}

/// A vertex whose only payload is its identifier.
#[derive(Debug, Deserialize)]
pub struct Bare {
    #[serde(deserialize_with = "id")]
    pub id: Id,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaDataVertex {
    #[serde(deserialize_with = "id")]
    pub id: Id,
    pub version: String,
    pub project_root: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentVertex {
    #[serde(deserialize_with = "id")]
    pub id: Id,
    pub uri: String,
    #[serde(default)]
    pub language_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RangeVertex {
    #[serde(deserialize_with = "id")]
    pub id: Id,
    pub start: WirePosition,
    pub end: WirePosition,
    #[serde(default)]
    pub tag: Option<RangeTag>,
}

/// Symbol information some emitters attach to ranges.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeTag {
    #[serde(rename = "type")]
    pub tag_type: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub kind: Option<u32>,
    #[serde(default)]
    pub full_range: Option<WireRange>,
}

#[derive(Debug, Deserialize)]
pub struct HoverResultVertex {
    #[serde(deserialize_with = "id")]
    pub id: Id,
    pub result: HoverBody,
}

#[derive(Debug, Deserialize)]
pub struct HoverBody {
    pub contents: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct MonikerVertex {
    #[serde(deserialize_with = "id")]
    pub id: Id,
    #[serde(default)]
    pub kind: MonikerKind,
    pub scheme: String,
    pub identifier: String,
}

#[derive(Debug, Deserialize)]
pub struct PackageInformationVertex {
    #[serde(deserialize_with = "id")]
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub manager: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FoldingRangeResultVertex {
    #[serde(deserialize_with = "id")]
    pub id: Id,
    pub result: Vec<FoldingRange>,
}

#[derive(Debug, Deserialize)]
pub struct DocumentSymbolResultVertex {
    #[serde(deserialize_with = "id")]
    pub id: Id,
    pub result: Vec<WireDocumentSymbol>,
}

/// Either a full symbol tree or one that points at tagged ranges.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum WireDocumentSymbol {
    RangeBased(RangeBasedSymbol),
    Full(FullSymbol),
}

#[derive(Debug, Deserialize)]
pub struct RangeBasedSymbol {
    #[serde(deserialize_with = "id")]
    pub id: Id,
    #[serde(default)]
    pub children: Vec<RangeBasedSymbol>,
}

#[derive(Debug, Deserialize)]
pub struct FullSymbol {
    pub name: String,
    pub kind: u32,
    pub range: WireRange,
    #[serde(default)]
    pub children: Vec<FullSymbol>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "label")]
pub enum Edge {
    #[serde(rename = "contains")]
    Contains(EdgeData),
    #[serde(rename = "next")]
    Next(EdgeData),
    #[serde(rename = "item")]
    Item(EdgeData),
    #[serde(rename = "textDocument/definition")]
    Definition(EdgeData),
    #[serde(rename = "textDocument/references")]
    References(EdgeData),
    #[serde(rename = "textDocument/hover")]
    Hover(EdgeData),
    #[serde(rename = "textDocument/foldingRange")]
    FoldingRange(EdgeData),
    #[serde(rename = "textDocument/documentSymbol")]
    DocumentSymbol(EdgeData),
    #[serde(rename = "moniker")]
    Moniker(EdgeData),
    #[serde(rename = "packageInformation")]
    PackageInformation(EdgeData),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeData {
    #[serde(deserialize_with = "id")]
    pub out_v: Id,
    #[serde(default, deserialize_with = "opt_id")]
    pub in_v: Option<Id>,
    #[serde(default, deserialize_with = "ids")]
    pub in_vs: Vec<Id>,
    #[serde(default, deserialize_with = "opt_id")]
    pub document: Option<Id>,
    #[serde(default)]
    pub property: Option<ItemProperty>,
}

impl EdgeData {
    /// Every in-vertex, whether given as `inV` or `inVs`.
    pub fn targets(&self) -> impl Iterator<Item = &Id> {
        self.in_v.iter().chain(self.in_vs.iter())
    }

    /// The single in-vertex of a one-to-one edge.
    pub fn target(&self) -> LsifResult<&Id> {
        self.targets().next().ok_or_else(|| {
            LsifError::Parse(format!("edge from {} has no in-vertex", self.out_v))
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemProperty {
    Definitions,
    References,
    ReferenceResults,
}

// ---------------------------------------------------------------------------
// Hover contents
// ---------------------------------------------------------------------------

pub const HOVER_SECTION_SEPARATOR: &str = "\n\n---\n\n";

/// Flatten markup content, marked strings, or lists of either into markdown.
pub fn normalize_hover_contents(contents: &serde_json::Value) -> String {
    use serde_json::Value;

    match contents {
        Value::String(text) => text.clone(),
        Value::Array(parts) => parts
            .iter()
            .map(normalize_hover_contents)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(HOVER_SECTION_SEPARATOR),
        Value::Object(fields) => {
            let value = fields.get("value").and_then(Value::as_str).unwrap_or_default();
            match fields.get("language").and_then(Value::as_str) {
                Some(language) => format!("```{language}\n{value}\n```"),
                None => value.to_string(),
            }
        }
        _ => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Streams
// ---------------------------------------------------------------------------

/// Parse a stream of whitespace-separated elements, gunzipping it first if it
/// starts with the gzip magic bytes.
pub fn read_elements<R, F>(mut input: R, mut visit: F) -> LsifResult<usize>
where
    R: BufRead,
    F: FnMut(Element) -> LsifResult<()>,
{
    let gzipped = input.fill_buf()?.starts_with(&[0x1f, 0x8b]);
    let reader: Box<dyn Read + '_> = if gzipped {
        Box::new(GzDecoder::new(input))
    } else {
        Box::new(input)
    };

    let mut count = 0usize;
    for element in serde_json::Deserializer::from_reader(reader).into_iter::<Element>() {
        let element =
            element.map_err(|e| LsifError::Parse(format!("element {}: {e}", count + 1)))?;
        visit(element)?;
        count += 1;
    }
    Ok(count)
}
