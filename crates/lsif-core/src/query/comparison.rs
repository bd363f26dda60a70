//! Side-by-side serving of several independently produced dumps of one
//! source.
//!
//! Every read is answered by all loaded sub-databases; the first one's answer
//! is served and any disagreement is reported to the observer. A differing
//! answer or a failing non-canonical sub-database never changes what the
//! caller receives.

use std::ffi::OsString;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{LsifError, LsifResult};
use crate::models::{DocumentSymbol, DumpKey, FoldingRange, Hover, Location, Position};
use crate::observe::{instrument, QueryObserver};
use crate::query::CodeIntelligence;

/// One variant of a dump, stored next to the canonical file with `ext`
/// appended to its name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedDatabase {
    pub name: String,
    pub enabled: bool,
    pub ext: String,
}

impl NamedDatabase {
    pub fn new(name: impl Into<String>, enabled: bool, ext: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled,
            ext: ext.into(),
        }
    }

    /// `base` with this variant's suffix appended to the file name.
    pub fn path_for(&self, base: &Path) -> PathBuf {
        let mut name = OsString::from(base.as_os_str());
        name.push(&self.ext);
        PathBuf::from(name)
    }
}

struct SubDatabase<D> {
    name: String,
    db: D,
}

pub struct ComparisonDatabase<D> {
    databases: Vec<SubDatabase<D>>,
    observer: Arc<dyn QueryObserver>,
}

impl<D> ComparisonDatabase<D>
where
    D: CodeIntelligence,
{
    /// Wrap already-open engines. The first one is canonical.
    pub fn new(
        key: &DumpKey,
        databases: Vec<(String, D)>,
        observer: Arc<dyn QueryObserver>,
    ) -> LsifResult<Self> {
        if databases.is_empty() {
            return Err(LsifError::no_data(&key.repository, &key.commit));
        }
        Ok(Self {
            databases: databases
                .into_iter()
                .map(|(name, db)| SubDatabase { name, db })
                .collect(),
            observer,
        })
    }

    /// Open every enabled variant of `base_path` in parallel.
    ///
    /// A variant whose file is missing (`NoData`) is dropped; any other
    /// failure aborts the load. Variant order is preserved, so the first
    /// enabled variant that loads is canonical.
    pub fn load<F>(
        key: &DumpKey,
        variants: &[NamedDatabase],
        base_path: &Path,
        observer: Arc<dyn QueryObserver>,
        open: F,
    ) -> LsifResult<Self>
    where
        D: Send,
        F: Fn(&Path) -> LsifResult<D> + Sync,
    {
        let loaded: Vec<Option<(String, D)>> = variants
            .par_iter()
            .filter(|variant| variant.enabled)
            .map(|variant| {
                let path = variant.path_for(base_path);
                let opened = instrument(observer.as_ref(), &format!("{}: load", variant.name), || {
                    open(&path)
                });
                match opened {
                    Ok(db) => Ok(Some((variant.name.clone(), db))),
                    Err(e) if e.is_no_data() => {
                        debug!(variant = %variant.name, path = %path.display(), "variant not present");
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            })
            .collect::<LsifResult<_>>()?;

        Self::new(key, loaded.into_iter().flatten().collect(), observer)
    }

    /// Names of the loaded sub-databases, canonical first.
    pub fn names(&self) -> Vec<&str> {
        self.databases.iter().map(|sub| sub.name.as_str()).collect()
    }

    fn canonical(&self) -> &SubDatabase<D> {
        // Non-empty by construction.
        &self.databases[0]
    }

    fn compare<T, F>(&self, operation: &str, query: F) -> LsifResult<T>
    where
        T: PartialEq + Debug,
        F: Fn(&D) -> LsifResult<T>,
    {
        let mut results: Vec<(&str, LsifResult<T>)> = self
            .databases
            .iter()
            .map(|sub| {
                let label = format!("{}: {}", sub.name, operation);
                let result = instrument(self.observer.as_ref(), &label, || query(&sub.db));
                (sub.name.as_str(), result)
            })
            .collect();

        let (canonical_name, canonical) = results.remove(0);
        let canonical = canonical?;
        for (name, result) in results {
            match result {
                Ok(answer) if answer == canonical => {}
                Ok(answer) => self.observer.divergence(
                    operation,
                    canonical_name,
                    name,
                    &format!("{canonical:?} != {answer:?}"),
                ),
                Err(e) => self
                    .observer
                    .divergence(operation, canonical_name, name, &e.to_string()),
            }
        }
        Ok(canonical)
    }
}

impl<D> CodeIntelligence for ComparisonDatabase<D>
where
    D: CodeIntelligence,
{
    fn hover(&self, path: &str, position: Position) -> LsifResult<Option<Hover>> {
        self.compare("hover", |db| db.hover(path, position))
    }

    fn definitions(&self, path: &str, position: Position) -> LsifResult<Vec<Location>> {
        self.compare("definitions", |db| db.definitions(path, position))
    }

    fn references(&self, path: &str, position: Position) -> LsifResult<Vec<Location>> {
        self.compare("references", |db| db.references(path, position))
    }

    fn declarations(&self, path: &str, position: Position) -> LsifResult<Vec<Location>> {
        self.canonical().db.declarations(path, position)
    }

    fn document_symbols(&self, path: &str) -> LsifResult<Vec<DocumentSymbol>> {
        self.canonical().db.document_symbols(path)
    }

    fn folding_ranges(&self, path: &str) -> LsifResult<Vec<FoldingRange>> {
        self.canonical().db.folding_ranges(path)
    }

    fn exists(&self, path: &str) -> LsifResult<bool> {
        self.canonical().db.exists(path)
    }

    fn document_paths(&self) -> LsifResult<Vec<String>> {
        self.canonical().db.document_paths()
    }

    fn close(&self) {
        for sub in &self.databases {
            sub.db.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Range;
    use crate::observe::testing::RecordingObserver;
    use crate::observe::Outcome;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeEngine {
        hover: LsifResult<Option<Hover>>,
        paths: Vec<String>,
        closed: AtomicBool,
    }

    impl FakeEngine {
        fn answering(text: &str) -> Self {
            Self {
                hover: Ok(Some(Hover {
                    contents: text.to_string(),
                    range: Range::default(),
                })),
                paths: vec![format!("{text}.ts")],
                closed: AtomicBool::new(false),
            }
        }

        fn failing() -> Self {
            Self {
                hover: Err(LsifError::Database("broken".into())),
                ..Self::answering("failing")
            }
        }
    }

    impl CodeIntelligence for FakeEngine {
        fn hover(&self, _path: &str, _position: Position) -> LsifResult<Option<Hover>> {
            match &self.hover {
                Ok(hover) => Ok(hover.clone()),
                Err(e) => Err(LsifError::Database(e.to_string())),
            }
        }

        fn definitions(&self, _path: &str, _position: Position) -> LsifResult<Vec<Location>> {
            Ok(Vec::new())
        }

        fn references(&self, _path: &str, _position: Position) -> LsifResult<Vec<Location>> {
            Ok(Vec::new())
        }

        fn declarations(&self, _path: &str, _position: Position) -> LsifResult<Vec<Location>> {
            Ok(Vec::new())
        }

        fn document_symbols(&self, _path: &str) -> LsifResult<Vec<DocumentSymbol>> {
            Ok(Vec::new())
        }

        fn folding_ranges(&self, _path: &str) -> LsifResult<Vec<FoldingRange>> {
            Ok(Vec::new())
        }

        fn exists(&self, path: &str) -> LsifResult<bool> {
            Ok(self.paths.iter().any(|p| p == path))
        }

        fn document_paths(&self) -> LsifResult<Vec<String>> {
            Ok(self.paths.clone())
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn key() -> DumpKey {
        DumpKey::new("github.com/acme/widgets", "c0ffee")
    }

    fn variants() -> Vec<NamedDatabase> {
        vec![
            NamedDatabase::new("a", true, ""),
            NamedDatabase::new("b", true, ".b"),
        ]
    }

    fn open_existing<'a>(
        present: &'a [&'a str],
    ) -> impl Fn(&Path) -> LsifResult<FakeEngine> + Sync + 'a {
        move |path: &Path| {
            let name = path.to_string_lossy().to_string();
            if present.iter().any(|p| *p == name) {
                Ok(FakeEngine::answering(&name))
            } else {
                Err(LsifError::no_data("github.com/acme/widgets", "c0ffee"))
            }
        }
    }

    #[test]
    fn variant_path_appends_extension() {
        let variant = NamedDatabase::new("b", true, ".b");
        assert_eq!(
            variant.path_for(Path::new("/data/x.lsif.db")),
            PathBuf::from("/data/x.lsif.db.b")
        );
    }

    #[test]
    fn missing_variant_is_dropped() {
        let observer = Arc::new(RecordingObserver::default());
        let db = ComparisonDatabase::load(
            &key(),
            &variants(),
            Path::new("dump.db"),
            observer.clone(),
            open_existing(&["dump.db"]),
        )
        .unwrap();

        assert_eq!(db.names(), ["a"]);
        assert_eq!(db.document_paths().unwrap(), ["dump.db.ts"]);
        let records = observer.records.lock();
        assert!(records.contains(&("a: load".to_string(), Outcome::Success)));
        assert!(records.contains(&("b: load".to_string(), Outcome::Failure)));
    }

    #[test]
    fn all_variants_missing_is_no_data() {
        let err = ComparisonDatabase::load(
            &key(),
            &variants(),
            Path::new("dump.db"),
            Arc::new(RecordingObserver::default()),
            open_existing(&[]),
        )
        .err()
        .unwrap();
        assert!(err.is_no_data());
    }

    #[test]
    fn disabled_variants_are_not_opened() {
        let variants = vec![
            NamedDatabase::new("a", false, ""),
            NamedDatabase::new("b", true, ".b"),
        ];
        let db = ComparisonDatabase::load(
            &key(),
            &variants,
            Path::new("dump.db"),
            Arc::new(RecordingObserver::default()),
            open_existing(&["dump.db", "dump.db.b"]),
        )
        .unwrap();
        assert_eq!(db.names(), ["b"]);
    }

    #[test]
    fn other_load_failures_propagate() {
        let result = ComparisonDatabase::<FakeEngine>::load(
            &key(),
            &variants(),
            Path::new("dump.db"),
            Arc::new(RecordingObserver::default()),
            |_path: &Path| Err(LsifError::Database("disk on fire".into())),
        );
        assert!(matches!(result, Err(LsifError::Database(_))));
    }

    #[test]
    fn divergent_hover_serves_canonical_answer() {
        let observer = Arc::new(RecordingObserver::default());
        let db = ComparisonDatabase::new(
            &key(),
            vec![
                ("a".to_string(), FakeEngine::answering("from a")),
                ("b".to_string(), FakeEngine::answering("from b")),
            ],
            observer.clone(),
        )
        .unwrap();

        let hover = db.hover("x.ts", Position::new(0, 0)).unwrap().unwrap();
        assert_eq!(hover.contents, "from a");
        assert_eq!(
            *observer.divergences.lock(),
            vec![("hover".to_string(), "a".to_string(), "b".to_string())]
        );
        let records = observer.records.lock();
        assert!(records.contains(&("a: hover".to_string(), Outcome::Success)));
        assert!(records.contains(&("b: hover".to_string(), Outcome::Success)));
    }

    #[test]
    fn agreeing_answers_report_no_divergence() {
        let observer = Arc::new(RecordingObserver::default());
        let db = ComparisonDatabase::new(
            &key(),
            vec![
                ("a".to_string(), FakeEngine::answering("same")),
                ("b".to_string(), FakeEngine::answering("same")),
            ],
            observer.clone(),
        )
        .unwrap();
        db.hover("x.ts", Position::new(1, 1)).unwrap();
        db.references("x.ts", Position::new(1, 1)).unwrap();
        assert!(observer.divergences.lock().is_empty());
    }

    #[test]
    fn failing_non_canonical_is_reported_not_raised() {
        let observer = Arc::new(RecordingObserver::default());
        let db = ComparisonDatabase::new(
            &key(),
            vec![
                ("a".to_string(), FakeEngine::answering("ok")),
                ("b".to_string(), FakeEngine::failing()),
            ],
            observer.clone(),
        )
        .unwrap();
        assert_eq!(
            db.hover("x.ts", Position::new(0, 0)).unwrap().unwrap().contents,
            "ok"
        );
        assert_eq!(observer.divergences.lock().len(), 1);
    }

    #[test]
    fn failing_canonical_propagates() {
        let db = ComparisonDatabase::new(
            &key(),
            vec![
                ("a".to_string(), FakeEngine::failing()),
                ("b".to_string(), FakeEngine::answering("ok")),
            ],
            Arc::new(RecordingObserver::default()),
        )
        .unwrap();
        assert!(db.hover("x.ts", Position::new(0, 0)).is_err());
    }

    #[test]
    fn close_reaches_every_sub_database() {
        let db = ComparisonDatabase::new(
            &key(),
            vec![
                ("a".to_string(), FakeEngine::answering("a")),
                ("b".to_string(), FakeEngine::answering("b")),
            ],
            Arc::new(RecordingObserver::default()),
        )
        .unwrap();
        db.close();
        assert!(db
            .databases
            .iter()
            .all(|sub| sub.db.closed.load(Ordering::SeqCst)));
    }
}
