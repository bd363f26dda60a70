//! Cross-repository package and reference index.
//!
//! One SQLite file under the storage root records every registered dump,
//! which dump declares each package and, for every dump that depends on a
//! package, a bloom filter of the identifiers it uses from it. Rows are
//! appended inside one transaction per registered dump, so readers never see
//! half a dump. A registration whose dump then fails to become visible is
//! withdrawn by row id.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use indexmap::IndexSet;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracing::{debug, info};

use crate::bloom::BloomFilter;
use crate::errors::LsifResult;
use crate::models::{DumpKey, DumpRecord, Package, SymbolReferences};
use crate::query::guards::{
    clamp_rate, clamp_usize, MAX_CANDIDATE_DUMPS_PER_QUERY, MAX_DUMPS_PAGE_SIZE,
};
use crate::store::schema;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Row ids appended by one registration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Registration {
    pub dump_id: i64,
    pub package_ids: Vec<i64>,
    pub reference_ids: Vec<i64>,
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

fn delete_ids(tx: &Transaction<'_>, table: &str, ids: &[i64]) -> LsifResult<usize> {
    let mut stmt = tx.prepare(&format!("DELETE FROM {table} WHERE id = ?1;"))?;
    let mut removed = 0;
    for id in ids {
        removed += stmt.execute(params![id])?;
    }
    Ok(removed)
}

// ---------------------------------------------------------------------------
// XrepoDatabase
// ---------------------------------------------------------------------------

pub struct XrepoDatabase {
    db_path: PathBuf,
    false_positive_rate: f64,
    max_candidates: usize,
}

impl XrepoDatabase {
    /// Open (creating if needed) the index at `db_path`.
    pub fn open(db_path: &Path, false_positive_rate: f64, max_candidates: usize) -> LsifResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Self {
            db_path: db_path.to_path_buf(),
            false_positive_rate: clamp_rate(false_positive_rate),
            max_candidates: clamp_usize(max_candidates, 1, MAX_CANDIDATE_DUMPS_PER_QUERY),
        };
        let conn = db.connect()?;
        schema::init_xrepo_schema(&conn)?;
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    pub fn max_candidates(&self) -> usize {
        self.max_candidates
    }

    /// Every public method opens its own connection.
    fn connect(&self) -> LsifResult<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Append `key`, the packages it declares, and the references it makes.
    pub fn register_packages_and_references(
        &self,
        key: &DumpKey,
        packages: &[Package],
        references: &[SymbolReferences],
    ) -> LsifResult<Registration> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let mut registration = Registration::default();
        {
            tx.execute(
                "INSERT INTO dumps(repository, \"commit\", uploaded_at) VALUES(?1, ?2, ?3);",
                params![key.repository, key.commit, unix_now()],
            )?;
            registration.dump_id = tx.last_insert_rowid();

            let mut insert_package = tx.prepare(
                "INSERT INTO packages(scheme, name, version, repository, \"commit\") \
                 VALUES(?1, ?2, ?3, ?4, ?5);",
            )?;
            for package in packages {
                insert_package.execute(params![
                    package.scheme,
                    package.name,
                    package.version,
                    key.repository,
                    key.commit,
                ])?;
                registration.package_ids.push(tx.last_insert_rowid());
            }

            let mut insert_reference = tx.prepare(
                "INSERT INTO package_references(scheme, name, version, repository, \"commit\", filter) \
                 VALUES(?1, ?2, ?3, ?4, ?5, ?6);",
            )?;
            for reference in references {
                let filter =
                    BloomFilter::from_items(&reference.identifiers, self.false_positive_rate);
                insert_reference.execute(params![
                    reference.package.scheme,
                    reference.package.name,
                    reference.package.version,
                    key.repository,
                    key.commit,
                    filter.to_bytes(),
                ])?;
                registration.reference_ids.push(tx.last_insert_rowid());
            }
        }
        tx.commit()?;
        info!(
            dump = %key,
            packages = packages.len(),
            references = references.len(),
            "registered cross-repository entries"
        );
        Ok(registration)
    }

    /// Delete exactly the rows `registration` appended. Earlier registrations
    /// of the same dump are untouched.
    pub fn unregister(&self, registration: &Registration) -> LsifResult<()> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let mut removed = delete_ids(&tx, "dumps", &[registration.dump_id])?;
        removed += delete_ids(&tx, "packages", &registration.package_ids)?;
        removed += delete_ids(&tx, "package_references", &registration.reference_ids)?;
        tx.commit()?;
        info!(dump_id = registration.dump_id, removed, "withdrew cross-repository entries");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Listing
    // -----------------------------------------------------------------------

    /// One page of the dumps registered for `repository`, most recently
    /// registered first, and the total number of distinct commits.
    pub fn dumps(
        &self,
        repository: &str,
        limit: usize,
        offset: usize,
    ) -> LsifResult<(Vec<DumpRecord>, usize)> {
        let limit = clamp_usize(limit, 1, MAX_DUMPS_PAGE_SIZE) as i64;
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        let mut conn = self.connect()?;
        // Page and total come from one snapshot.
        let tx = conn.transaction()?;
        let total: i64 = tx.query_row(
            "SELECT COUNT(DISTINCT \"commit\") FROM dumps WHERE repository = ?1;",
            params![repository],
            |row| row.get(0),
        )?;
        let page = {
            // SQLite takes bare columns from the row that supplied MAX(id).
            let mut stmt = tx.prepare(
                "SELECT \"commit\", uploaded_at, MAX(id) AS latest FROM dumps \
                 WHERE repository = ?1 GROUP BY \"commit\" \
                 ORDER BY latest DESC LIMIT ?2 OFFSET ?3;",
            )?;
            let rows = stmt.query_map(params![repository, limit, offset], |row| {
                Ok(DumpRecord {
                    key: DumpKey::new(repository, row.get::<_, String>(0)?),
                    uploaded_at: row.get(1)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        tx.commit()?;
        Ok((page, usize::try_from(total).unwrap_or_default()))
    }

    /// The latest registration of `key`, if any.
    pub fn dump(&self, key: &DumpKey) -> LsifResult<Option<DumpRecord>> {
        let conn = self.connect()?;
        let uploaded_at = conn
            .query_row(
                "SELECT uploaded_at FROM dumps WHERE repository = ?1 AND \"commit\" = ?2 \
                 ORDER BY id DESC LIMIT 1;",
                params![key.repository, key.commit],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(uploaded_at.map(|uploaded_at| DumpRecord {
            key: key.clone(),
            uploaded_at,
        }))
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    /// The dump that most recently declared `(scheme, name, version)`.
    pub fn get_package(&self, scheme: &str, name: &str, version: &str) -> LsifResult<Option<DumpKey>> {
        let conn = self.connect()?;
        let owner = conn
            .query_row(
                "SELECT repository, \"commit\" FROM packages \
                 WHERE scheme = ?1 AND name = ?2 AND version = ?3 \
                 ORDER BY id DESC LIMIT 1;",
                params![scheme, name, version],
                |row| Ok(DumpKey::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        Ok(owner)
    }

    /// Dumps that may reference `identifier` from the given package.
    ///
    /// Candidates come back newest registration first, each at most once,
    /// with `exclude` left out, so superseded commits of one dependent are
    /// the ones that fall past `max_candidates`. A filter that fails
    /// validation is an error, not a silent skip.
    pub fn find_referencing_dumps(
        &self,
        package: &Package,
        identifier: &str,
        exclude: Option<&DumpKey>,
    ) -> LsifResult<Vec<DumpKey>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT repository, \"commit\", filter FROM package_references \
             WHERE scheme = ?1 AND name = ?2 AND version = ?3 \
             ORDER BY id DESC;",
        )?;
        let rows = stmt.query_map(
            params![package.scheme, package.name, package.version],
            |row| {
                Ok((
                    DumpKey::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?),
                    row.get::<_, Vec<u8>>(2)?,
                ))
            },
        )?;

        let mut candidates: IndexSet<DumpKey> = IndexSet::new();
        let mut scanned = 0usize;
        for row in rows {
            let (key, bytes) = row?;
            scanned += 1;
            if exclude == Some(&key) || candidates.contains(&key) {
                continue;
            }
            if BloomFilter::from_bytes(&bytes)?.contains(identifier) {
                candidates.insert(key);
                if candidates.len() == self.max_candidates {
                    debug!(
                        identifier,
                        cap = self.max_candidates,
                        "candidate dump cap reached"
                    );
                    break;
                }
            }
        }
        debug!(
            scheme = %package.scheme,
            name = %package.name,
            identifier,
            scanned,
            candidates = candidates.len(),
            "filtered referencing dumps"
        );
        Ok(candidates.into_iter().collect())
    }
}
