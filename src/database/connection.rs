use anyhow::{anyhow, bail, Context, Result as AnyhowResult};
use rusqlite::{Connection, OpenFlags, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

use super::migrations::MigrationManager;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared SQLite connection behind the session store.
///
/// Every call takes the connection mutex for its whole duration, so callers
/// must run on a blocking thread.
#[derive(Debug, Clone)]
pub struct DatabaseManager {
    path: Option<PathBuf>,
    connection: Arc<Mutex<Connection>>,
}

impl DatabaseManager {
    /// Open or create the database file, creating parent directories
    pub fn new(db_path: impl AsRef<Path>) -> AnyhowResult<Self> {
        let path = db_path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
        .with_context(|| format!("Failed to open session database {}", path.display()))?;
        let journal: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        info!(path = %path.display(), journal = %journal, "Session database ready");
        Self::prepare(conn, Some(path))
    }

    pub fn open_in_memory() -> AnyhowResult<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let manager = Self::prepare(conn, None)?;
        debug!("In-memory session database ready");
        Ok(manager)
    }

    fn prepare(mut conn: Connection, path: Option<PathBuf>) -> AnyhowResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let migrations = MigrationManager::new();
        migrations
            .migrate(&mut conn)
            .context("Failed to migrate session database")?;
        let missing = migrations.missing_tables(&conn)?;
        if !missing.is_empty() {
            bail!("Session database is missing tables: {}", missing.join(", "));
        }

        Ok(Self {
            path,
            connection: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> AnyhowResult<MutexGuard<'_, Connection>> {
        self.connection
            .lock()
            .map_err(|_| anyhow!("Session database lock poisoned"))
    }

    pub fn with_connection<F, R>(&self, f: F) -> AnyhowResult<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        let conn = self.lock()?;
        f(&conn).context("Session database query failed")
    }

    /// Run `f` in a transaction; any error rolls it back
    pub fn with_transaction<F, R>(&self, f: F) -> AnyhowResult<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction().context("Failed to begin transaction")?;
        let value = f(&tx).context("Session database transaction failed")?;
        tx.commit().context("Failed to commit transaction")?;
        Ok(value)
    }

    /// File backing this database; `None` when in memory
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}
