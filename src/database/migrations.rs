use anyhow::{bail, Context, Result};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

use super::schema::{create_schema, SCHEMA_VERSION};

const REQUIRED_TABLES: &[&str] = &["schema_versions", "sessions", "qa_turns"];

/// One forward-only schema step
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub apply: fn(&Connection) -> rusqlite::Result<()>,
}

/// Brings the session database up to `SCHEMA_VERSION`.
///
/// Applied versions are recorded in `schema_versions`. A database written by
/// a newer build is refused rather than silently reused.
pub struct MigrationManager {
    migrations: Vec<Migration>,
}

impl Default for MigrationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MigrationManager {
    pub fn new() -> Self {
        Self {
            migrations: vec![Migration {
                version: 1,
                description: "sessions and qa_turns",
                apply: create_schema,
            }],
        }
    }

    /// Highest recorded version, 0 for a fresh database
    pub fn current_version(&self, conn: &Connection) -> Result<u32> {
        let has_table = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_versions'",
                [],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !has_table {
            return Ok(0);
        }

        let version = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_versions",
            [],
            |row| row.get(0),
        )?;
        Ok(version)
    }

    /// Apply every pending migration in one transaction. Returns how many ran.
    pub fn migrate(&self, conn: &mut Connection) -> Result<usize> {
        let current = self.current_version(conn)?;
        if current > SCHEMA_VERSION {
            bail!(
                "session database has schema version {current}, newer than supported version {SCHEMA_VERSION}"
            );
        }

        let pending: Vec<&Migration> = self
            .migrations
            .iter()
            .filter(|m| m.version > current && m.version <= SCHEMA_VERSION)
            .collect();
        if pending.is_empty() {
            debug!(version = current, "Session database schema is current");
            return Ok(0);
        }

        let tx = conn.transaction()?;
        for migration in &pending {
            info!(
                version = migration.version,
                description = migration.description,
                "Applying session database migration"
            );
            (migration.apply)(&tx)
                .with_context(|| format!("migration {} failed", migration.version))?;
            tx.execute(
                "INSERT INTO schema_versions (version) VALUES (?1)",
                [migration.version],
            )?;
        }
        tx.commit()?;

        Ok(pending.len())
    }

    /// Tables the session store relies on that are missing
    pub fn missing_tables(&self, conn: &Connection) -> Result<Vec<&'static str>> {
        let mut missing = Vec::new();
        for table in REQUIRED_TABLES {
            let found = conn
                .query_row(
                    "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [table],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            if !found {
                missing.push(*table);
            }
        }
        Ok(missing)
    }
}
