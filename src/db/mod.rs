//! Local SQLite datastore holding history entries.

pub mod entries;

use crate::error::{DatastoreError, Result};
use crate::paths::HishtoryPaths;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Name of the secondary index on `history_entries.end_time`.
pub const END_TIME_INDEX: &str = "end_time_index";

/// Statements running at least this long are logged as warnings.
pub const SLOW_QUERY_THRESHOLD: Duration = Duration::from_millis(100);

/// Migration runs attempted before giving up on a schema another
/// connection is updating at the same time.
const MIGRATION_ATTEMPTS: u32 = 5;

/// Database handle wrapping a SQLite connection.
///
/// Clones share one connection. It is closed when the last clone is dropped,
/// or explicitly through [`Database::close`].
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// Open the datastore file inside the hishtory data directory.
    pub fn open_local(paths: &HishtoryPaths) -> Result<Self> {
        paths.ensure_data_dir()?;
        Self::open(paths.db_file())
    }

    /// Open or create the database at the given path.
    ///
    /// The connection runs in WAL mode so other processes can read while one
    /// writes. Migration and indexing are safe to repeat on a current schema.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let mut conn = Connection::open_with_flags(path, flags).map_err(|source| {
            DatastoreError::Open {
                path: path.to_path_buf(),
                source,
            }
        })?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|source| DatastoreError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .map_err(|source| DatastoreError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        if !mode.eq_ignore_ascii_case("wal") {
            warn!(path = %path.display(), mode = %mode, "DB did not switch to WAL journaling");
        }
        conn.profile(Some(log_slow_statement));

        let db = Self::bootstrap(conn)?;
        debug!(path = %path.display(), "Opened local DB");
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| DatastoreError::Open {
            path: ":memory:".into(),
            source,
        })?;
        Self::bootstrap(conn)
    }

    /// Ping, migrate and index a freshly opened connection.
    fn bootstrap(conn: Connection) -> Result<Self> {
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.ping()?;
        db.run_migrations()?;
        db.ensure_end_time_index()?;
        Ok(db)
    }

    /// Check that the connection answers queries.
    pub fn ping(&self) -> Result<()> {
        let conn = self.lock();
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(DatastoreError::Liveness)?;
        Ok(())
    }

    /// Apply pending migrations.
    ///
    /// Connections opening a fresh file at the same moment all see an empty
    /// history table and race to apply the same version; the losers fail on
    /// the history table's primary key or on a busy snapshot. A failed run
    /// counts as success once the schema is current, and is retried otherwise.
    fn run_migrations(&self) -> Result<()> {
        let mut conn = self.lock();
        let mut attempt = 1;
        loop {
            let err = match embedded::migrations::runner().run(&mut *conn) {
                Ok(_) => return Ok(()),
                Err(err) => err,
            };
            if schema_is_current(&mut conn) {
                debug!(error = %err, "Schema already migrated by another connection");
                return Ok(());
            }
            if attempt >= MIGRATION_ATTEMPTS {
                return Err(DatastoreError::Migration(err).into());
            }
            std::thread::sleep(Duration::from_millis(20 * u64::from(attempt)));
            attempt += 1;
        }
    }

    fn ensure_end_time_index(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute_batch(&format!(
            "CREATE INDEX IF NOT EXISTS {END_TIME_INDEX} ON history_entries(end_time)"
        ))
        .map_err(DatastoreError::Index)?;
        Ok(())
    }

    /// Execute a function with exclusive access to the connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = self.lock();
        f(&conn).map_err(|e| DatastoreError::Query(e).into())
    }

    /// Close the connection if this is the last handle to it.
    ///
    /// With other clones still alive the connection stays open and is closed
    /// when the last one is dropped.
    pub fn close(self) -> Result<()> {
        match Arc::try_unwrap(self.conn) {
            Ok(mutex) => {
                let conn = mutex.into_inner().unwrap_or_else(PoisonError::into_inner);
                conn.close()
                    .map_err(|(_, source)| DatastoreError::Query(source))?;
                Ok(())
            }
            Err(_) => Ok(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Whether every embedded migration has been applied.
fn schema_is_current(conn: &mut Connection) -> bool {
    let runner = embedded::migrations::runner();
    let latest = runner.get_migrations().iter().map(|m| m.version()).max();
    match runner.get_last_applied_migration(conn) {
        Ok(applied) => applied.map(|m| m.version()) >= latest,
        Err(_) => false,
    }
}

/// Profile hook routing slow statements into the hishtory log.
fn log_slow_statement(sql: &str, elapsed: Duration) {
    if elapsed >= SLOW_QUERY_THRESHOLD {
        warn!(
            from_sql = true,
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            sql,
            "Slow SQL statement"
        );
    }
}
