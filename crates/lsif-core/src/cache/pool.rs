//! Bounded pool of open SQLite handles keyed by file path.
//!
//! At most `capacity` handles are open at once. A handle is lent to exactly
//! one caller at a time through [`PooledConnection`], which returns it on
//! drop, so every exit path (including `?` and unwinding) releases the slot.
//! When the pool is full, idle handles are closed least-recently-used first;
//! if none are idle the caller blocks until one is returned.

use std::ops::Deref;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use parking_lot::{Condvar, Mutex};
use rusqlite::{Connection, ErrorCode, OpenFlags, Transaction};
use tracing::debug;

use crate::errors::{LsifError, LsifResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenMode {
    /// Existing dump files; never creates.
    ReadOnly,
    /// Scratch files being written by ingestion.
    ReadWriteCreate,
}

enum Slot {
    Idle(Connection),
    Busy { evict_on_release: bool },
    Opening,
}

struct PoolState {
    slots: IndexMap<PathBuf, Slot>,
    open: usize,
}

pub struct ConnectionPool {
    capacity: usize,
    state: Mutex<PoolState>,
    available: Condvar,
}

/// Exclusive loan of a pooled connection.
pub struct PooledConnection<'a> {
    pool: &'a ConnectionPool,
    path: PathBuf,
    conn: Option<Connection>,
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn
            .as_ref()
            .expect("pooled connection is present until drop")
    }
}

impl PooledConnection<'_> {
    fn conn_mut(&mut self) -> &mut Connection {
        self.conn
            .as_mut()
            .expect("pooled connection is present until drop")
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.check_in(&self.path, conn);
        }
    }
}

fn open_connection(path: &Path, mode: OpenMode) -> LsifResult<Connection> {
    let flags = match mode {
        OpenMode::ReadOnly => OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        OpenMode::ReadWriteCreate => {
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX
        }
    };
    match Connection::open_with_flags(path, flags) {
        Ok(conn) => Ok(conn),
        Err(rusqlite::Error::SqliteFailure(err, _)) if err.code == ErrorCode::CannotOpen => {
            Err(LsifError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("cannot open {}", path.display()),
            )))
        }
        Err(e) => Err(e.into()),
    }
}

impl ConnectionPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(PoolState {
                slots: IndexMap::new(),
                open: 0,
            }),
            available: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of currently open handles (idle, lent, or opening).
    pub fn open_count(&self) -> usize {
        self.state.lock().open
    }

    pub fn acquire(&self, path: &Path, mode: OpenMode) -> LsifResult<PooledConnection<'_>> {
        {
            let mut state = self.state.lock();
            loop {
                match state.slots.get(path) {
                    Some(Slot::Idle(_)) => {
                        if let Some(Slot::Idle(conn)) = state.slots.shift_remove(path) {
                            state
                                .slots
                                .insert(path.to_path_buf(), Slot::Busy { evict_on_release: false });
                            return Ok(PooledConnection {
                                pool: self,
                                path: path.to_path_buf(),
                                conn: Some(conn),
                            });
                        }
                    }
                    Some(Slot::Busy { .. }) | Some(Slot::Opening) => self.available.wait(&mut state),
                    None => {
                        if state.open < self.capacity {
                            state.open += 1;
                            state.slots.insert(path.to_path_buf(), Slot::Opening);
                            break;
                        }
                        let idle = state
                            .slots
                            .iter()
                            .position(|(_, slot)| matches!(slot, Slot::Idle(_)));
                        match idle {
                            Some(index) => {
                                if let Some((evicted, _conn)) = state.slots.shift_remove_index(index) {
                                    debug!(path = %evicted.display(), "closing idle handle");
                                }
                                state.open -= 1;
                            }
                            None => self.available.wait(&mut state),
                        }
                    }
                }
            }
        }

        match open_connection(path, mode) {
            Ok(conn) => {
                let mut state = self.state.lock();
                state
                    .slots
                    .insert(path.to_path_buf(), Slot::Busy { evict_on_release: false });
                Ok(PooledConnection {
                    pool: self,
                    path: path.to_path_buf(),
                    conn: Some(conn),
                })
            }
            Err(e) => {
                let mut state = self.state.lock();
                state.slots.shift_remove(path);
                state.open -= 1;
                drop(state);
                self.available.notify_all();
                Err(e)
            }
        }
    }

    /// Borrow a read-only handle for the duration of `f`.
    pub fn with_connection<T, F>(&self, path: &Path, f: F) -> LsifResult<T>
    where
        F: FnOnce(&Connection) -> LsifResult<T>,
    {
        let conn = self.acquire(path, OpenMode::ReadOnly)?;
        f(&conn)
    }

    /// Open (creating if needed) `path`, run `prepare` on the raw handle, then
    /// run `f` inside one transaction. The handle is closed afterwards so the
    /// file can be renamed or removed.
    pub fn with_transaction<T, P, F>(&self, path: &Path, prepare: P, f: F) -> LsifResult<T>
    where
        P: FnOnce(&Connection) -> LsifResult<()>,
        F: FnOnce(&Transaction<'_>) -> LsifResult<T>,
    {
        let result = {
            let mut conn = self.acquire(path, OpenMode::ReadWriteCreate)?;
            prepare(&conn).and_then(|()| {
                let tx = conn.conn_mut().transaction()?;
                let value = f(&tx)?;
                tx.commit()?;
                Ok(value)
            })
        };
        self.evict(path);
        result
    }

    /// Close the handle for `path`. A lent handle is closed when returned.
    /// Evicting an absent path is a no-op.
    pub fn evict(&self, path: &Path) -> bool {
        let mut state = self.state.lock();
        let evicted = match state.slots.get_mut(path) {
            Some(Slot::Busy { evict_on_release }) => {
                *evict_on_release = true;
                false
            }
            Some(Slot::Idle(_)) => {
                state.slots.shift_remove(path);
                state.open -= 1;
                true
            }
            Some(Slot::Opening) | None => false,
        };
        drop(state);
        if evicted {
            self.available.notify_all();
        }
        evicted
    }

    /// Close every idle handle.
    pub fn close_idle(&self) {
        let mut state = self.state.lock();
        let before = state.slots.len();
        state.slots.retain(|_, slot| !matches!(slot, Slot::Idle(_)));
        let closed = before - state.slots.len();
        state.open -= closed;
        drop(state);
        self.available.notify_all();
    }

    fn check_in(&self, path: &Path, conn: Connection) {
        let mut state = self.state.lock();
        let evict = matches!(
            state.slots.get(path),
            Some(Slot::Busy {
                evict_on_release: true
            })
        );
        if evict {
            state.slots.shift_remove(path);
            state.open -= 1;
            drop(conn);
        } else {
            state.slots.shift_remove(path);
            state.slots.insert(path.to_path_buf(), Slot::Idle(conn));
        }
        drop(state);
        self.available.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn make_db(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (1);")
            .unwrap();
        path
    }

    #[test]
    fn reuses_idle_handles() {
        let dir = tempfile::tempdir().unwrap();
        let a = make_db(dir.path(), "a.db");
        let pool = ConnectionPool::new(2);

        for _ in 0..3 {
            let x: i64 = pool
                .with_connection(&a, |conn| {
                    Ok(conn.query_row("SELECT x FROM t", [], |row| row.get(0))?)
                })
                .unwrap();
            assert_eq!(x, 1);
        }
        assert_eq!(pool.open_count(), 1);
    }

    #[test]
    fn never_exceeds_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let paths: Vec<PathBuf> = (0..5)
            .map(|i| make_db(dir.path(), &format!("{i}.db")))
            .collect();
        let pool = ConnectionPool::new(2);

        for path in &paths {
            pool.with_connection(path, |_| Ok(())).unwrap();
            assert!(pool.open_count() <= 2);
        }
        assert_eq!(pool.open_count(), 2);
    }

    #[test]
    fn failed_open_releases_slot() {
        let dir = tempfile::tempdir().unwrap();
        let pool = ConnectionPool::new(1);

        let missing = dir.path().join("missing.db");
        let err = pool.with_connection(&missing, |_| Ok(())).unwrap_err();
        assert!(matches!(err, LsifError::Io(ref e) if e.kind() == std::io::ErrorKind::NotFound));
        assert_eq!(pool.open_count(), 0);

        let a = make_db(dir.path(), "a.db");
        pool.with_connection(&a, |_| Ok(())).unwrap();
    }

    #[test]
    fn failing_operation_returns_handle() {
        let dir = tempfile::tempdir().unwrap();
        let a = make_db(dir.path(), "a.db");
        let b = make_db(dir.path(), "b.db");
        let pool = ConnectionPool::new(1);

        let err = pool
            .with_connection(&a, |conn| {
                conn.execute_batch("SELECT * FROM no_such_table")?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, LsifError::Sqlite(_)));

        // The only slot must be reusable by another path.
        pool.with_connection(&b, |_| Ok(())).unwrap();
        assert_eq!(pool.open_count(), 1);
    }

    #[test]
    fn acquisition_blocks_at_capacity_until_release() {
        let dir = tempfile::tempdir().unwrap();
        let a = make_db(dir.path(), "a.db");
        let b = make_db(dir.path(), "b.db");
        let pool = Arc::new(ConnectionPool::new(1));
        let acquired = Arc::new(AtomicBool::new(false));

        let held = pool.acquire(&a, OpenMode::ReadOnly).unwrap();

        let waiter = {
            let pool = Arc::clone(&pool);
            let acquired = Arc::clone(&acquired);
            std::thread::spawn(move || {
                pool.with_connection(&b, |_| Ok(())).unwrap();
                acquired.store(true, Ordering::SeqCst);
            })
        };

        std::thread::sleep(Duration::from_millis(100));
        assert!(!acquired.load(Ordering::SeqCst));

        drop(held);
        waiter.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
        assert_eq!(pool.open_count(), 1);
    }

    #[test]
    fn evicting_lent_handle_closes_on_release() {
        let dir = tempfile::tempdir().unwrap();
        let a = make_db(dir.path(), "a.db");
        let pool = ConnectionPool::new(2);

        let held = pool.acquire(&a, OpenMode::ReadOnly).unwrap();
        assert!(!pool.evict(&a));
        assert_eq!(pool.open_count(), 1);
        drop(held);
        assert_eq!(pool.open_count(), 0);

        // Second eviction is a no-op.
        assert!(!pool.evict(&a));
    }

    #[test]
    fn transaction_commits_and_closes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("new.db");
        let pool = ConnectionPool::new(1);

        let rows = pool
            .with_transaction(
                &path,
                |conn| {
                    conn.execute_batch("PRAGMA synchronous = OFF;")?;
                    Ok(())
                },
                |tx| {
                    tx.execute_batch("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (5);")?;
                    Ok(1)
                },
            )
            .unwrap();
        assert_eq!(rows, 1);
        assert_eq!(pool.open_count(), 0);

        let x: i64 = Connection::open(&path)
            .unwrap()
            .query_row("SELECT x FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(x, 5);
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("new.db");
        let pool = ConnectionPool::new(1);

        let err = pool
            .with_transaction(
                &path,
                |_| Ok(()),
                |tx| -> LsifResult<()> {
                    tx.execute_batch("CREATE TABLE t (x INTEGER);")?;
                    Err(LsifError::Parse("bad input".into()))
                },
            )
            .unwrap_err();
        assert!(matches!(err, LsifError::Parse(_)));
        assert_eq!(pool.open_count(), 0);

        let tables: i64 = Connection::open(&path)
            .unwrap()
            .query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| row.get(0))
            .unwrap();
        assert_eq!(tables, 0);
    }
}
