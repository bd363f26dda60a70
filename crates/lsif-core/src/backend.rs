//! Ingestion and database construction for one storage root.
//!
//! A dump is written to a scratch file, registered with the cross-repository
//! index, and only then renamed to its final path. Readers therefore see a
//! dump either fully or not at all.

use std::io::BufRead;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use rusqlite::Connection;
use tracing::{debug, error, info, warn};

use crate::config::StoreConfig;
use crate::errors::LsifResult;
use crate::indexer::importer::{import_lsif, ImportSummary};
use crate::maintenance::{self, AdvisoryLock};
use crate::models::{DumpKey, DumpRecord};
use crate::observe::{QueryObserver, TracingObserver};
use crate::query::comparison::{ComparisonDatabase, NamedDatabase};
use crate::store::database::DumpDatabase;
use crate::store::StoreContext;

/// Name under which stale scratch-file cleanup takes the advisory lock.
pub const CLEAN_TEMP_FILES_TASK: &str = "clean-stale-temp-files";

/// Bulk writes into a scratch file skip durability; the file is discarded on
/// any failure before it is promoted.
fn disable_durability(conn: &Connection) -> LsifResult<()> {
    conn.execute_batch("PRAGMA synchronous = OFF; PRAGMA journal_mode = OFF;")?;
    Ok(())
}

pub struct Backend {
    ctx: Arc<StoreContext>,
}

impl Backend {
    pub fn new(config: StoreConfig) -> LsifResult<Self> {
        Self::with_observer(config, Arc::new(TracingObserver))
    }

    pub fn with_observer(config: StoreConfig, observer: Arc<dyn QueryObserver>) -> LsifResult<Self> {
        let ctx = StoreContext::open(config, observer)?;
        info!(root = %ctx.config.storage_root.display(), "opened storage root");
        Ok(Self { ctx: Arc::new(ctx) })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.ctx.config
    }

    pub fn context(&self) -> &Arc<StoreContext> {
        &self.ctx
    }

    /// Parse `input` and store it as the dump for `repository@commit`,
    /// replacing any previous dump for that key.
    ///
    /// On failure the scratch file is removed and nothing becomes visible.
    pub fn insert_dump<R: BufRead>(
        &self,
        input: R,
        repository: &str,
        commit: &str,
    ) -> LsifResult<ImportSummary> {
        let started = Instant::now();
        let key = DumpKey::new(repository, commit);
        let config = &self.ctx.config;

        // Removed on drop unless persisted.
        let temp = tempfile::Builder::new()
            .prefix("dump-")
            .suffix(".db")
            .tempfile_in(config.scratch_dir())?
            .into_temp_path();
        debug!(dump = %key, temp = %temp.display(), "writing scratch dump");

        let summary = self.ctx.connections.with_transaction(&temp, disable_durability, |tx| {
            import_lsif(
                tx,
                input,
                config.results_per_result_chunk,
                config.max_result_chunks,
            )
        })?;

        let registration = self
            .ctx
            .xrepo
            .register_packages_and_references(&key, &summary.packages, &summary.references)?;

        let final_path = self.ctx.dump_path(&key);
        if let Err(err) = temp.persist(&final_path) {
            warn!(dump = %key, error = %err.error, "promotion failed, withdrawing registration");
            if let Err(undo) = self.ctx.xrepo.unregister(&registration) {
                error!(dump = %key, error = %undo, "failed to withdraw registration");
            }
            return Err(err.into());
        }
        self.ctx.invalidate(&final_path);

        info!(
            dump = %key,
            path = %final_path.display(),
            documents = summary.documents,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "inserted dump"
        );
        Ok(summary)
    }

    /// Open the dump for `repository@commit`. A dump that was never
    /// inserted is `NoData`.
    pub fn create_database(&self, repository: &str, commit: &str) -> LsifResult<DumpDatabase> {
        DumpDatabase::open(Arc::clone(&self.ctx), DumpKey::new(repository, commit))
    }

    /// Open every enabled variant of the dump for `repository@commit` side
    /// by side. Each variant lives next to the canonical file with its
    /// extension appended.
    pub fn create_comparison_database(
        &self,
        repository: &str,
        commit: &str,
        variants: &[NamedDatabase],
    ) -> LsifResult<ComparisonDatabase<DumpDatabase>> {
        let key = DumpKey::new(repository, commit);
        let base = self.ctx.dump_path(&key);
        ComparisonDatabase::load(
            &key,
            variants,
            &base,
            Arc::clone(&self.ctx.observer),
            |path| DumpDatabase::open_path(Arc::clone(&self.ctx), key.clone(), path.to_path_buf()),
        )
    }

    /// One page of the dumps stored for `repository`, most recently
    /// inserted first, with the total count.
    pub fn dumps(
        &self,
        repository: &str,
        limit: usize,
        offset: usize,
    ) -> LsifResult<(Vec<DumpRecord>, usize)> {
        self.ctx.xrepo.dumps(repository, limit, offset)
    }

    pub fn dump(&self, repository: &str, commit: &str) -> LsifResult<Option<DumpRecord>> {
        self.ctx.xrepo.dump(&DumpKey::new(repository, commit))
    }

    /// Remove abandoned scratch files, if `lock` grants this instance the
    /// cleanup task. Returns `None` when another instance holds it.
    pub fn clean_stale_temp_files(&self, lock: &dyn AdvisoryLock) -> LsifResult<Option<usize>> {
        let max_age = Duration::from_secs(self.ctx.config.stale_temp_file_max_age_secs);
        let scratch = self.ctx.config.scratch_dir();
        maintenance::try_with_lock(lock, CLEAN_TEMP_FILES_TASK, || {
            maintenance::clean_stale_temp_files(&scratch, max_age, SystemTime::now())
        })
    }

    /// Close every idle pooled handle.
    pub fn close(&self) {
        self.ctx.connections.close_idle();
        debug!("closed idle handles");
    }
}
