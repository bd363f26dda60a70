//! Writes a correlated dump into a fresh dump file.

use std::io::BufRead;
use std::time::Instant;

use rusqlite::{params, Connection};
use tracing::info;

use crate::encoding::encode_json;
use crate::errors::LsifResult;
use crate::indexer::correlator::{correlate, CorrelatedDump, MonikerLocation};
use crate::models::{Package, SymbolReferences};
use crate::store::schema::{self, DumpMeta, MonikerTable, SCHEMA_VERSION};

/// Packages a dump declares and references it makes, for registration in
/// the cross-repository index.
#[derive(Debug, Default)]
pub struct ImportSummary {
    pub packages: Vec<Package>,
    pub references: Vec<SymbolReferences>,
    pub documents: usize,
    pub result_chunks: usize,
}

/// Parse `input` and write it through `conn` (normally an open transaction).
pub fn import_lsif<R: BufRead>(
    conn: &Connection,
    input: R,
    results_per_chunk: usize,
    max_chunks: usize,
) -> LsifResult<ImportSummary> {
    let started = Instant::now();
    let dump = correlate(input, results_per_chunk, max_chunks)?;
    let summary = write_dump(conn, dump)?;
    info!(
        documents = summary.documents,
        result_chunks = summary.result_chunks,
        packages = summary.packages.len(),
        references = summary.references.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "imported dump"
    );
    Ok(summary)
}

pub fn write_dump(conn: &Connection, dump: CorrelatedDump) -> LsifResult<ImportSummary> {
    schema::init_dump_schema(conn)?;
    schema::write_meta(
        conn,
        &DumpMeta {
            lsif_version: dump.lsif_version.clone(),
            schema_version: SCHEMA_VERSION,
            num_result_chunks: dump.result_chunks.len() as u32,
        },
    )?;

    {
        let mut stmt = conn.prepare("INSERT INTO documents(path, data) VALUES(?1, ?2);")?;
        for (path, document) in &dump.documents {
            stmt.execute(params![path, encode_json(document)?])?;
        }
    }
    {
        let mut stmt = conn.prepare("INSERT INTO result_chunks(id, data) VALUES(?1, ?2);")?;
        for (index, chunk) in dump.result_chunks.iter().enumerate() {
            stmt.execute(params![index as i64, encode_json(chunk)?])?;
        }
    }
    insert_moniker_rows(conn, MonikerTable::Definitions, &dump.definitions)?;
    insert_moniker_rows(conn, MonikerTable::References, &dump.references)?;

    Ok(ImportSummary {
        documents: dump.documents.len(),
        result_chunks: dump.result_chunks.len(),
        packages: dump.packages,
        references: dump.symbol_references,
    })
}

fn insert_moniker_rows(conn: &Connection, table: MonikerTable, rows: &[MonikerLocation]) -> LsifResult<()> {
    let sql = format!(
        "INSERT INTO {}(scheme, identifier, document_path, start_line, start_character, end_line, end_character) \
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7);",
        table.sql_name()
    );
    let mut stmt = conn.prepare(&sql)?;
    for row in rows {
        stmt.execute(params![
            row.scheme,
            row.identifier,
            row.document_path,
            row.range.start.line,
            row.range.start.character,
            row.range.end.line,
            row.range.end.character,
        ])?;
    }
    Ok(())
}
