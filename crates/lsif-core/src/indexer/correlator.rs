//! In-memory correlation of one index stream.
//!
//! Elements are folded into id-keyed maps as they arrive; relationships are
//! recorded by id so edges may refer to vertices in any order. [`Correlator::finish`]
//! then validates the `next` relation, slices the data per document, pages
//! definition and reference results into chunks, and extracts the moniker
//! tables and package sets used for cross-repository lookups.

use std::collections::{HashMap, HashSet};

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, warn};

use crate::errors::{LsifError, LsifResult};
use crate::indexer::lsif::{
    normalize_hover_contents, read_elements, Edge, EdgeData, Element, FullSymbol, ItemProperty,
    RangeBasedSymbol, RangeTag, Vertex, WireDocumentSymbol, WirePosition, WireRange,
};
use crate::models::{
    DocumentData, DocumentSymbol, FoldingRange, Id, MonikerData, MonikerKind, Package,
    PackageInformationData, Position, QualifiedRangeId, Range, RangeData, ReferenceResultData,
    ResultChunkData, ResultLinks, SymbolReferences,
};
use crate::query::guards::{clamp_usize, MAX_RESULTS_PER_CHUNK, MAX_RESULT_CHUNKS, MIN_RESULTS_PER_CHUNK};
use crate::query::resolve;

/// A moniker-keyed location row of a dump.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MonikerLocation {
    pub scheme: String,
    pub identifier: String,
    pub document_path: String,
    pub range: Range,
}

/// Everything the importer writes for one dump.
#[derive(Debug, Default)]
pub struct CorrelatedDump {
    pub lsif_version: String,
    /// Document path -> slice, in path order.
    pub documents: IndexMap<String, DocumentData>,
    /// Chunk index -> chunk.
    pub result_chunks: Vec<ResultChunkData>,
    pub definitions: Vec<MonikerLocation>,
    pub references: Vec<MonikerLocation>,
    /// Packages this dump declares.
    pub packages: Vec<Package>,
    /// Identifiers this dump uses from packages it depends on.
    pub symbol_references: Vec<SymbolReferences>,
}

/// Number of result chunks for `results` results.
pub fn result_chunk_count(results: usize, results_per_chunk: usize, max_chunks: usize) -> u32 {
    let per_chunk = clamp_usize(results_per_chunk, MIN_RESULTS_PER_CHUNK, MAX_RESULTS_PER_CHUNK);
    let max_chunks = clamp_usize(max_chunks, 1, MAX_RESULT_CHUNKS);
    results.div_ceil(per_chunk).clamp(1, max_chunks) as u32
}

/// Chunk that holds the result `id`.
pub fn result_chunk_index(id: &str, num_chunks: u32) -> u32 {
    crc32fast::hash(id.as_bytes()) % num_chunks.max(1)
}

#[derive(Default)]
pub struct Correlator {
    lsif_version: Option<String>,
    project_root: String,
    documents: IndexMap<Id, String>,
    contains: HashMap<Id, Vec<Id>>,
    ranges: HashMap<Id, (Range, Option<RangeTag>)>,
    links: HashMap<Id, ResultLinks>,
    result_sets: HashSet<Id>,
    definition_results: HashMap<Id, Vec<Id>>,
    reference_results: HashMap<Id, (Vec<Id>, Vec<Id>)>,
    linked_reference_results: HashMap<Id, Vec<Id>>,
    hover_results: HashMap<Id, String>,
    monikers: HashMap<Id, MonikerData>,
    package_information: HashMap<Id, PackageInformationData>,
    folding_results: HashMap<Id, Vec<FoldingRange>>,
    symbol_results: HashMap<Id, Vec<WireDocumentSymbol>>,
    document_folding: HashMap<Id, Id>,
    document_symbols: HashMap<Id, Id>,
}

fn to_range(start: WirePosition, end: WirePosition) -> Range {
    Range::new(
        Position::new(start.line, start.character),
        Position::new(end.line, end.character),
    )
}

fn wire_range(range: WireRange) -> Range {
    to_range(range.start, range.end)
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Folding elements
    // -----------------------------------------------------------------------

    pub fn insert(&mut self, element: Element) -> LsifResult<()> {
        match element {
            Element::Vertex(vertex) => self.insert_vertex(vertex),
            Element::Edge(edge) => self.insert_edge(edge),
        }
    }

    fn insert_vertex(&mut self, vertex: Vertex) -> LsifResult<()> {
        match vertex {
            Vertex::MetaData(meta) => {
                self.lsif_version = Some(meta.version);
                self.project_root = meta.project_root;
            }
            Vertex::Document(doc) => {
                self.documents.insert(doc.id, doc.uri);
            }
            Vertex::Range(range) => {
                self.ranges
                    .insert(range.id, (to_range(range.start, range.end), range.tag));
            }
            Vertex::ResultSet(set) => {
                self.result_sets.insert(set.id);
            }
            Vertex::DefinitionResult(result) => {
                self.definition_results.entry(result.id).or_default();
            }
            Vertex::ReferenceResult(result) => {
                self.reference_results.entry(result.id).or_default();
            }
            Vertex::HoverResult(hover) => {
                self.hover_results
                    .insert(hover.id, normalize_hover_contents(&hover.result.contents));
            }
            Vertex::Moniker(moniker) => {
                let package_information = self
                    .monikers
                    .get(&moniker.id)
                    .and_then(|m| m.package_information.clone());
                self.monikers.insert(
                    moniker.id,
                    MonikerData {
                        kind: moniker.kind,
                        scheme: moniker.scheme,
                        identifier: moniker.identifier,
                        package_information,
                    },
                );
            }
            Vertex::PackageInformation(info) => {
                self.package_information.insert(
                    info.id,
                    PackageInformationData {
                        name: info.name,
                        version: info.version.unwrap_or_default(),
                    },
                );
            }
            Vertex::FoldingRangeResult(result) => {
                self.folding_results.insert(result.id, result.result);
            }
            Vertex::DocumentSymbolResult(result) => {
                self.symbol_results.insert(result.id, result.result);
            }
            Vertex::Unknown => {}
        }
        Ok(())
    }

    fn insert_edge(&mut self, edge: Edge) -> LsifResult<()> {
        match edge {
            Edge::Contains(data) => {
                self.contains
                    .entry(data.out_v.clone())
                    .or_default()
                    .extend(data.targets().cloned());
            }
            Edge::Next(data) => {
                let target = data.target()?.clone();
                self.links.entry(data.out_v).or_default().next = Some(target);
            }
            Edge::Item(data) => self.insert_item(data),
            Edge::Definition(data) => {
                let target = data.target()?.clone();
                self.links.entry(data.out_v).or_default().definition_result = Some(target);
            }
            Edge::References(data) => {
                let target = data.target()?.clone();
                self.links.entry(data.out_v).or_default().reference_result = Some(target);
            }
            Edge::Hover(data) => {
                let target = data.target()?.clone();
                self.links.entry(data.out_v).or_default().hover_result = Some(target);
            }
            Edge::Moniker(data) => {
                let targets: Vec<Id> = data.targets().cloned().collect();
                self.links.entry(data.out_v).or_default().monikers.extend(targets);
            }
            Edge::PackageInformation(data) => {
                let target = data.target()?.clone();
                match self.monikers.get_mut(&data.out_v) {
                    Some(moniker) => moniker.package_information = Some(target),
                    None => warn!(moniker = %data.out_v, "packageInformation edge from unknown moniker"),
                }
            }
            Edge::FoldingRange(data) => {
                let target = data.target()?.clone();
                self.document_folding.insert(data.out_v, target);
            }
            Edge::DocumentSymbol(data) => {
                let target = data.target()?.clone();
                self.document_symbols.insert(data.out_v, target);
            }
            Edge::Unknown => {}
        }
        Ok(())
    }

    fn insert_item(&mut self, data: EdgeData) {
        let targets: Vec<Id> = data.targets().cloned().collect();
        match data.property {
            None => self
                .definition_results
                .entry(data.out_v)
                .or_default()
                .extend(targets),
            Some(ItemProperty::Definitions) => self
                .reference_results
                .entry(data.out_v)
                .or_default()
                .0
                .extend(targets),
            Some(ItemProperty::References) => self
                .reference_results
                .entry(data.out_v)
                .or_default()
                .1
                .extend(targets),
            Some(ItemProperty::ReferenceResults) => self
                .linked_reference_results
                .entry(data.out_v)
                .or_default()
                .extend(targets),
        }
    }

    // -----------------------------------------------------------------------
    // Finishing
    // -----------------------------------------------------------------------

    pub fn finish(self, results_per_chunk: usize, max_chunks: usize) -> LsifResult<CorrelatedDump> {
        let lsif_version = self
            .lsif_version
            .clone()
            .ok_or_else(|| LsifError::Parse("stream has no metaData vertex".into()))?;
        self.check_next_chains()?;

        let paths: HashMap<&Id, String> = self
            .documents
            .iter()
            .map(|(id, uri)| (id, self.relative_path(uri)))
            .collect();
        let mut range_documents: HashMap<&Id, &Id> = HashMap::new();
        for (document_id, children) in &self.contains {
            if !self.documents.contains_key(document_id) {
                continue;
            }
            for child in children {
                if self.ranges.contains_key(child) {
                    range_documents.insert(child, document_id);
                }
            }
        }

        let qualify = |range_ids: &[Id]| -> Vec<QualifiedRangeId> {
            range_ids
                .iter()
                .filter_map(|range_id| {
                    range_documents.get(range_id).map(|document_id| QualifiedRangeId {
                        document_id: (*document_id).clone(),
                        range_id: range_id.clone(),
                    })
                })
                .collect()
        };

        // Result chunks.
        let reference_results = self.flatten_reference_results();
        let num_chunks = result_chunk_count(
            self.definition_results.len() + reference_results.len(),
            results_per_chunk,
            max_chunks,
        );
        let mut result_chunks = vec![ResultChunkData::default(); num_chunks as usize];
        let mut sorted_definition_results: Vec<(&Id, &Vec<Id>)> = self.definition_results.iter().collect();
        sorted_definition_results.sort_by(|a, b| a.0.cmp(b.0));
        for (id, range_ids) in sorted_definition_results {
            let chunk = &mut result_chunks[result_chunk_index(id, num_chunks) as usize];
            let qualified = qualify(range_ids);
            note_paths(chunk, &qualified, &paths);
            chunk.definition_results.insert(id.clone(), qualified);
        }
        for (id, (definitions, references)) in &reference_results {
            let chunk = &mut result_chunks[result_chunk_index(id, num_chunks) as usize];
            let data = ReferenceResultData {
                definitions: qualify(definitions),
                references: qualify(references),
            };
            note_paths(chunk, &data.definitions, &paths);
            note_paths(chunk, &data.references, &paths);
            chunk.reference_results.insert(id.clone(), data);
        }

        // Moniker tables.
        let mut definitions: IndexSet<MonikerLocation> = IndexSet::new();
        let mut references: IndexSet<MonikerLocation> = IndexSet::new();
        for range_ids in self.definition_results.values() {
            self.moniker_rows(range_ids, &range_documents, &paths, &mut definitions)?;
        }
        for (_, refs) in reference_results.values() {
            self.moniker_rows(refs, &range_documents, &paths, &mut references)?;
        }

        // Per-document slices.
        let mut documents: IndexMap<String, DocumentData> = IndexMap::new();
        for (document_id, uri) in &self.documents {
            let path = paths
                .get(document_id)
                .cloned()
                .unwrap_or_else(|| uri.clone());
            let data = self.document_slice(document_id)?;
            documents.insert(path, data);
        }
        documents.sort_keys();

        let (packages, symbol_references) = self.packages();
        debug!(
            documents = documents.len(),
            result_sets = self.result_sets.len(),
            chunks = num_chunks,
            definitions = definitions.len(),
            references = references.len(),
            packages = packages.len(),
            "correlated dump"
        );

        Ok(CorrelatedDump {
            lsif_version,
            documents,
            result_chunks,
            definitions: definitions.into_iter().collect(),
            references: references.into_iter().collect(),
            packages,
            symbol_references,
        })
    }

    fn relative_path(&self, uri: &str) -> String {
        let root = self.project_root.trim_end_matches('/');
        match uri.strip_prefix(root) {
            Some(rest) if !root.is_empty() => rest.trim_start_matches('/').to_string(),
            _ => uri.to_string(),
        }
    }

    fn lookup_links<'a>(&'a self) -> impl Fn(&str) -> Option<&'a ResultLinks> + 'a {
        move |id: &str| self.links.get(id)
    }

    /// Fail on any cycle in the `next` relation.
    fn check_next_chains(&self) -> LsifResult<()> {
        for start in self.links.values() {
            for step in resolve::chain(start, self.lookup_links()) {
                step?;
            }
        }
        Ok(())
    }

    /// Reference results with linked results folded in.
    fn flatten_reference_results(&self) -> IndexMap<Id, (Vec<Id>, Vec<Id>)> {
        let mut ids: Vec<&Id> = self.reference_results.keys().collect();
        ids.sort();
        let mut out = IndexMap::new();
        for id in ids {
            let mut definitions = IndexSet::new();
            let mut references = IndexSet::new();
            let mut visited = HashSet::new();
            let mut stack = vec![id];
            while let Some(current) = stack.pop() {
                if !visited.insert(current) {
                    continue;
                }
                if let Some((defs, refs)) = self.reference_results.get(current) {
                    definitions.extend(defs.iter().cloned());
                    references.extend(refs.iter().cloned());
                }
                if let Some(linked) = self.linked_reference_results.get(current) {
                    stack.extend(linked.iter().rev());
                }
            }
            out.insert(
                id.clone(),
                (definitions.into_iter().collect(), references.into_iter().collect()),
            );
        }
        out
    }

    /// Monikers reachable from a range (own links first, then its chain).
    fn range_monikers(&self, range_id: &Id) -> LsifResult<Vec<&MonikerData>> {
        let Some(start) = self.links.get(range_id) else {
            return Ok(Vec::new());
        };
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for step in resolve::chain(start, self.lookup_links()) {
            for moniker_id in &step?.monikers {
                if seen.insert(moniker_id) {
                    if let Some(moniker) = self.monikers.get(moniker_id) {
                        out.push(moniker);
                    }
                }
            }
        }
        Ok(out)
    }

    fn moniker_rows(
        &self,
        range_ids: &[Id],
        range_documents: &HashMap<&Id, &Id>,
        paths: &HashMap<&Id, String>,
        rows: &mut IndexSet<MonikerLocation>,
    ) -> LsifResult<()> {
        for range_id in range_ids {
            let (Some(document_id), Some((range, _))) =
                (range_documents.get(range_id), self.ranges.get(range_id))
            else {
                continue;
            };
            let Some(path) = paths.get(document_id) else {
                continue;
            };
            for moniker in self.range_monikers(range_id)? {
                rows.insert(MonikerLocation {
                    scheme: moniker.scheme.clone(),
                    identifier: moniker.identifier.clone(),
                    document_path: path.clone(),
                    range: *range,
                });
            }
        }
        Ok(())
    }

    fn document_slice(&self, document_id: &Id) -> LsifResult<DocumentData> {
        let mut data = DocumentData::default();
        let empty = Vec::new();
        let children = self.contains.get(document_id).unwrap_or(&empty);

        let mut ranges: Vec<(Id, RangeData)> = children
            .iter()
            .filter_map(|id| {
                let (range, _) = self.ranges.get(id)?;
                Some((
                    id.clone(),
                    RangeData {
                        start_line: range.start.line,
                        start_character: range.start.character,
                        end_line: range.end.line,
                        end_character: range.end.character,
                        links: self.links.get(id).cloned().unwrap_or_default(),
                    },
                ))
            })
            .collect();
        ranges.sort_by(|a, b| a.1.start().cmp(&b.1.start()).then_with(|| a.0.cmp(&b.0)));

        for (id, range) in ranges {
            let Some(start) = self.links.get(&id) else {
                data.ranges.insert(id, range);
                continue;
            };
            for step in resolve::chain(start, self.lookup_links()) {
                let links = step?;
                if let Some(hover_id) = &links.hover_result {
                    if let Some(text) = self.hover_results.get(hover_id) {
                        data.hover_results.insert(hover_id.clone(), text.clone());
                    }
                }
                for moniker_id in &links.monikers {
                    let Some(moniker) = self.monikers.get(moniker_id) else {
                        continue;
                    };
                    data.monikers.insert(moniker_id.clone(), moniker.clone());
                    if let Some(info_id) = &moniker.package_information {
                        if let Some(info) = self.package_information.get(info_id) {
                            data.package_information.insert(info_id.clone(), info.clone());
                        }
                    }
                }
                if let Some(next) = &links.next {
                    if let Some(set) = self.links.get(next) {
                        data.result_sets.insert(next.clone(), set.clone());
                    }
                }
            }
            data.ranges.insert(id, range);
        }

        if let Some(result) = self
            .document_folding
            .get(document_id)
            .and_then(|id| self.folding_results.get(id))
        {
            data.folding_ranges = result.clone();
        }
        if let Some(result) = self
            .document_symbols
            .get(document_id)
            .and_then(|id| self.symbol_results.get(id))
        {
            data.document_symbols = result
                .iter()
                .filter_map(|symbol| self.convert_symbol(symbol))
                .collect();
        }
        Ok(data)
    }

    fn convert_symbol(&self, symbol: &WireDocumentSymbol) -> Option<DocumentSymbol> {
        match symbol {
            WireDocumentSymbol::RangeBased(symbol) => self.convert_range_based(symbol),
            WireDocumentSymbol::Full(symbol) => Some(convert_full(symbol)),
        }
    }

    fn convert_range_based(&self, symbol: &RangeBasedSymbol) -> Option<DocumentSymbol> {
        let (range, tag) = self.ranges.get(&symbol.id)?;
        let tag = tag.as_ref()?;
        Some(DocumentSymbol {
            name: tag.text.clone().unwrap_or_default(),
            kind: tag.kind.unwrap_or_default(),
            range: tag.full_range.map(wire_range).unwrap_or(*range),
            children: symbol
                .children
                .iter()
                .filter_map(|child| self.convert_range_based(child))
                .collect(),
        })
    }

    /// Exported packages and, per imported package, the identifiers used.
    fn packages(&self) -> (Vec<Package>, Vec<SymbolReferences>) {
        let mut exported: IndexSet<Package> = IndexSet::new();
        let mut imported: IndexMap<Package, IndexSet<String>> = IndexMap::new();

        let mut monikers: Vec<&MonikerData> = self
            .monikers
            .values()
            .filter(|m| m.is_cross_repository())
            .collect();
        monikers.sort_by(|a, b| (&a.scheme, &a.identifier).cmp(&(&b.scheme, &b.identifier)));

        for moniker in monikers {
            let Some(info) = moniker
                .package_information
                .as_ref()
                .and_then(|id| self.package_information.get(id))
            else {
                continue;
            };
            let package = Package {
                scheme: moniker.scheme.clone(),
                name: info.name.clone(),
                version: info.version.clone(),
            };
            match moniker.kind {
                MonikerKind::Export => {
                    exported.insert(package);
                }
                MonikerKind::Import => {
                    imported
                        .entry(package)
                        .or_default()
                        .insert(moniker.identifier.clone());
                }
                MonikerKind::Local => {}
            }
        }

        let references = imported
            .into_iter()
            .map(|(package, identifiers)| SymbolReferences {
                package,
                identifiers: identifiers.into_iter().collect(),
            })
            .collect();
        (exported.into_iter().collect(), references)
    }
}

fn convert_full(symbol: &FullSymbol) -> DocumentSymbol {
    DocumentSymbol {
        name: symbol.name.clone(),
        kind: symbol.kind,
        range: wire_range(symbol.range),
        children: symbol.children.iter().map(convert_full).collect(),
    }
}

fn note_paths(chunk: &mut ResultChunkData, ids: &[QualifiedRangeId], paths: &HashMap<&Id, String>) {
    for qualified in ids {
        if let Some(path) = paths.get(&qualified.document_id) {
            chunk
                .document_paths
                .entry(qualified.document_id.clone())
                .or_insert_with(|| path.clone());
        }
    }
}

/// Correlate a whole stream.
pub fn correlate<R: std::io::BufRead>(
    input: R,
    results_per_chunk: usize,
    max_chunks: usize,
) -> LsifResult<CorrelatedDump> {
    let mut correlator = Correlator::new();
    let elements = read_elements(input, |element| correlator.insert(element))?;
    debug!(elements, "read index stream");
    correlator.finish(results_per_chunk, max_chunks)
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Small hand-written index streams shared by indexer and store tests.

    /// `lib.ts` exports `add` from npm package `calc@1.0.0`; `main.ts` calls it.
    pub const CALC: &str = r#"
{"id":1,"type":"vertex","label":"metaData","version":"0.4.3","projectRoot":"file:///src/calc"}
{"id":2,"type":"vertex","label":"document","uri":"file:///src/calc/lib.ts","languageId":"typescript"}
{"id":3,"type":"vertex","label":"document","uri":"file:///src/calc/main.ts","languageId":"typescript"}
{"id":4,"type":"vertex","label":"resultSet"}
{"id":5,"type":"vertex","label":"range","start":{"line":0,"character":16},"end":{"line":0,"character":19},"tag":{"type":"definition","text":"add","kind":12,"fullRange":{"start":{"line":0,"character":0},"end":{"line":2,"character":1}}}}
{"id":6,"type":"vertex","label":"range","start":{"line":1,"character":0},"end":{"line":1,"character":3}}
{"id":7,"type":"vertex","label":"range","start":{"line":1,"character":0},"end":{"line":1,"character":10}}
{"id":8,"type":"edge","label":"next","outV":5,"inV":4}
{"id":9,"type":"edge","label":"next","outV":6,"inV":4}
{"id":10,"type":"vertex","label":"hoverResult","result":{"contents":[{"language":"typescript","value":"function add(a: number, b: number): number"},"Adds two numbers."]}}
{"id":11,"type":"edge","label":"textDocument/hover","outV":4,"inV":10}
{"id":12,"type":"vertex","label":"definitionResult"}
{"id":13,"type":"edge","label":"textDocument/definition","outV":4,"inV":12}
{"id":14,"type":"edge","label":"item","outV":12,"inVs":[5],"document":2}
{"id":15,"type":"vertex","label":"referenceResult"}
{"id":16,"type":"edge","label":"textDocument/references","outV":4,"inV":15}
{"id":17,"type":"edge","label":"item","outV":15,"inVs":[5],"document":2,"property":"definitions"}
{"id":18,"type":"edge","label":"item","outV":15,"inVs":[6],"document":3,"property":"references"}
{"id":19,"type":"vertex","label":"moniker","kind":"export","scheme":"npm","identifier":"lib:add"}
{"id":20,"type":"vertex","label":"packageInformation","name":"calc","manager":"npm","version":"1.0.0"}
{"id":21,"type":"edge","label":"packageInformation","outV":19,"inV":20}
{"id":22,"type":"edge","label":"moniker","outV":4,"inV":19}
{"id":23,"type":"edge","label":"contains","outV":2,"inVs":[5]}
{"id":24,"type":"edge","label":"contains","outV":3,"inVs":[6,7]}
{"id":25,"type":"vertex","label":"foldingRangeResult","result":[{"startLine":0,"endLine":2,"kind":"region"}]}
{"id":26,"type":"edge","label":"textDocument/foldingRange","outV":2,"inV":25}
{"id":27,"type":"vertex","label":"documentSymbolResult","result":[{"id":5}]}
{"id":28,"type":"edge","label":"textDocument/documentSymbol","outV":2,"inV":27}
"#;

    /// `app.ts` imports `add` from `calc@1.0.0` and uses it twice.
    pub const APP: &str = r#"
{"id":1,"type":"vertex","label":"metaData","version":"0.4.3","projectRoot":"file:///src/app"}
{"id":2,"type":"vertex","label":"document","uri":"file:///src/app/app.ts","languageId":"typescript"}
{"id":3,"type":"vertex","label":"resultSet"}
{"id":4,"type":"vertex","label":"range","start":{"line":0,"character":9},"end":{"line":0,"character":12}}
{"id":5,"type":"vertex","label":"range","start":{"line":2,"character":0},"end":{"line":2,"character":3}}
{"id":6,"type":"edge","label":"next","outV":4,"inV":3}
{"id":7,"type":"edge","label":"next","outV":5,"inV":3}
{"id":8,"type":"vertex","label":"moniker","kind":"import","scheme":"npm","identifier":"lib:add"}
{"id":9,"type":"vertex","label":"packageInformation","name":"calc","manager":"npm","version":"1.0.0"}
{"id":10,"type":"edge","label":"packageInformation","outV":8,"inV":9}
{"id":11,"type":"edge","label":"moniker","outV":3,"inV":8}
{"id":12,"type":"vertex","label":"referenceResult"}
{"id":13,"type":"edge","label":"textDocument/references","outV":3,"inV":12}
{"id":14,"type":"edge","label":"item","outV":12,"inVs":[4,5],"document":2,"property":"references"}
{"id":15,"type":"edge","label":"contains","outV":2,"inVs":[4,5]}
"#;
}

#[cfg(test)]
mod tests {
    use super::fixtures::{APP, CALC};
    use super::*;

    fn correlate_str(text: &str) -> LsifResult<CorrelatedDump> {
        correlate(text.as_bytes(), 500, 1000)
    }

    #[test]
    fn chunk_count_is_bounded() {
        assert_eq!(result_chunk_count(0, 500, 1000), 1);
        assert_eq!(result_chunk_count(500, 500, 1000), 1);
        assert_eq!(result_chunk_count(501, 500, 1000), 2);
        assert_eq!(result_chunk_count(1_000_000, 10, 3), 3);
        assert!(result_chunk_index("anything", 7) < 7);
    }

    #[test]
    fn slices_documents_with_relative_paths() {
        let dump = correlate_str(CALC).unwrap();
        assert_eq!(dump.lsif_version, "0.4.3");
        assert_eq!(dump.documents.keys().collect::<Vec<_>>(), ["lib.ts", "main.ts"]);

        let lib = &dump.documents["lib.ts"];
        assert_eq!(lib.ranges.len(), 1);
        assert!(lib.result_sets.contains_key("4"));
        assert_eq!(
            lib.hover_results["10"],
            "```typescript\nfunction add(a: number, b: number): number\n```\n\n---\n\nAdds two numbers."
        );
        assert_eq!(lib.monikers["19"].package_information.as_deref(), Some("20"));
        assert_eq!(lib.package_information["20"].version, "1.0.0");
        assert_eq!(lib.folding_ranges.len(), 1);
        assert_eq!(lib.document_symbols[0].name, "add");
        assert_eq!(lib.document_symbols[0].range.end, Position::new(2, 1));

        let main = &dump.documents["main.ts"];
        let starts: Vec<&str> = main.ranges.keys().map(String::as_str).collect();
        assert_eq!(starts.len(), 2);
        assert!(main.ranges.values().all(|r| r.start_line == 1));
    }

    #[test]
    fn pages_results_into_chunks() {
        let dump = correlate_str(CALC).unwrap();
        assert_eq!(dump.result_chunks.len(), 1);
        let chunk = &dump.result_chunks[0];
        assert_eq!(chunk.definition_results["12"][0].range_id, "5");
        let refs = &chunk.reference_results["15"];
        assert_eq!(refs.definitions[0].document_id, "2");
        assert_eq!(refs.references[0].document_id, "3");
        assert_eq!(chunk.document_paths["2"], "lib.ts");
        assert_eq!(chunk.document_paths["3"], "main.ts");
    }

    #[test]
    fn extracts_moniker_rows_and_packages() {
        let calc = correlate_str(CALC).unwrap();
        assert_eq!(calc.definitions.len(), 1);
        assert_eq!(calc.definitions[0].identifier, "lib:add");
        assert_eq!(calc.definitions[0].document_path, "lib.ts");
        assert_eq!(calc.references.len(), 1);
        assert_eq!(calc.references[0].document_path, "main.ts");
        assert_eq!(
            calc.packages,
            vec![Package {
                scheme: "npm".into(),
                name: "calc".into(),
                version: "1.0.0".into(),
            }]
        );
        assert!(calc.symbol_references.is_empty());

        let app = correlate_str(APP).unwrap();
        assert!(app.packages.is_empty());
        assert_eq!(app.symbol_references.len(), 1);
        assert_eq!(app.symbol_references[0].package.name, "calc");
        assert_eq!(app.symbol_references[0].identifiers, ["lib:add"]);
        assert_eq!(app.references.len(), 2);
    }

    #[test]
    fn linked_reference_results_are_merged() {
        let text = r#"
{"id":1,"type":"vertex","label":"metaData","version":"0.4.3","projectRoot":"file:///r"}
{"id":2,"type":"vertex","label":"document","uri":"file:///r/a.ts"}
{"id":3,"type":"vertex","label":"range","start":{"line":0,"character":0},"end":{"line":0,"character":1}}
{"id":4,"type":"vertex","label":"range","start":{"line":1,"character":0},"end":{"line":1,"character":1}}
{"id":5,"type":"edge","label":"contains","outV":2,"inVs":[3,4]}
{"id":6,"type":"vertex","label":"referenceResult"}
{"id":7,"type":"vertex","label":"referenceResult"}
{"id":8,"type":"edge","label":"item","outV":6,"inVs":[3],"document":2,"property":"references"}
{"id":9,"type":"edge","label":"item","outV":7,"inVs":[4],"document":2,"property":"references"}
{"id":10,"type":"edge","label":"item","outV":6,"inVs":[7],"document":2,"property":"referenceResults"}
{"id":11,"type":"edge","label":"item","outV":7,"inVs":[6],"document":2,"property":"referenceResults"}
"#;
        let dump = correlate_str(text).unwrap();
        let merged = &dump.result_chunks[0].reference_results["6"];
        let ids: Vec<&str> = merged.references.iter().map(|q| q.range_id.as_str()).collect();
        assert_eq!(ids, ["3", "4"]);
    }

    #[test]
    fn next_cycle_fails_the_import() {
        let text = r#"
{"id":1,"type":"vertex","label":"metaData","version":"0.4.3","projectRoot":"file:///r"}
{"id":2,"type":"vertex","label":"resultSet"}
{"id":3,"type":"vertex","label":"resultSet"}
{"id":4,"type":"edge","label":"next","outV":2,"inV":3}
{"id":5,"type":"edge","label":"next","outV":3,"inV":2}
"#;
        assert!(matches!(
            correlate_str(text),
            Err(LsifError::ResultSetCycle { .. })
        ));
    }

    #[test]
    fn missing_metadata_is_a_parse_error() {
        let text = r#"{"id":2,"type":"vertex","label":"document","uri":"file:///r/a.ts"}"#;
        assert!(matches!(correlate_str(text), Err(LsifError::Parse(_))));
    }
}
