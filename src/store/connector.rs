//! Connection ownership, schema creation and version-to-version migration

use rusqlite::Connection;
use std::path::Path;
use tracing::{debug, info};

use super::schema::{INDEXES, MIGRATIONS, SCHEMA_VERSION};
use crate::error::{ArchiveError, Result};

pub struct StorageConnector {
    conn: Connection,
    schema_version: u32,
}

impl StorageConnector {
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Bring an existing connection up to the current schema version
    pub fn from_connection(mut conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let found = read_version(&conn)?;
        if found > SCHEMA_VERSION {
            return Err(ArchiveError::IncompatibleSchema {
                found,
                supported: SCHEMA_VERSION,
            });
        }

        let schema_version = migrate(&mut conn, found)?;
        ensure_indexes(&conn)?;

        Ok(Self {
            conn,
            schema_version,
        })
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

fn read_version(conn: &Connection) -> Result<u32> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(u32::try_from(version).unwrap_or(0))
}

/// Apply every migration above `from` in one transaction; returns the new version
fn migrate(conn: &mut Connection, from: u32) -> Result<u32> {
    let pending: Vec<_> = MIGRATIONS.iter().filter(|m| m.version > from).collect();
    if pending.is_empty() {
        debug!(version = from, "schema up to date");
        return Ok(from);
    }

    let tx = conn.transaction()?;
    let mut version = from;
    for migration in pending {
        info!(
            version = migration.version,
            name = migration.name,
            "applying migration"
        );
        tx.execute_batch(migration.sql)?;
        if let Some(backfill) = migration.backfill {
            backfill(&tx)?;
        }
        tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
        version = migration.version;
    }
    tx.commit()?;

    Ok(version)
}

/// Create any declared index missing from an existing store
fn ensure_indexes(conn: &Connection) -> Result<()> {
    for sql in INDEXES {
        conn.execute(sql, [])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::schema::V1_INITIAL_SCHEMA;
    use rusqlite::params;

    fn index_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'index' AND name LIKE 'idx_%'")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<String>, _>>()
            .unwrap()
    }

    #[test]
    fn test_fresh_store_reaches_current_version() {
        let connector = StorageConnector::open_in_memory().unwrap();
        assert_eq!(connector.schema_version(), SCHEMA_VERSION);

        let names = index_names(connector.connection());
        assert_eq!(names.len(), INDEXES.len());
        assert!(names.contains(&"idx_conversation_tags_tag".to_string()));
    }

    #[test]
    fn test_v1_store_is_migrated_and_backfilled() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(V1_INITIAL_SCHEMA).unwrap();
        conn.execute_batch("PRAGMA user_version = 1;").unwrap();
        conn.execute(
            "INSERT INTO conversations (conversation_id, title, created_at, updated_at)
             VALUES (?, ?, ?, ?)",
            params!["legacy", "Old", "2023-01-01T00:00:00.000Z", "2023-01-01T00:00:00.000Z"],
        )
        .unwrap();

        let connector = StorageConnector::from_connection(conn).unwrap();
        assert_eq!(connector.schema_version(), 2);

        let (tags, starred, archived): (String, bool, bool) = connector
            .connection()
            .query_row(
                "SELECT tags, starred, archived FROM conversations WHERE conversation_id = 'legacy'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(tags, "[]");
        assert!(!starred);
        assert!(!archived);
    }

    #[test]
    fn test_missing_index_is_recreated() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested/dir/store.db");
        {
            let connector = StorageConnector::open(&path).unwrap();
            connector
                .connection()
                .execute_batch("DROP INDEX idx_conversations_model;")
                .unwrap();
        }

        let connector = StorageConnector::open(&path).unwrap();
        assert!(index_names(connector.connection()).contains(&"idx_conversations_model".to_string()));
        assert_eq!(connector.schema_version(), SCHEMA_VERSION);
    }

    #[test]
    fn test_newer_store_is_refused() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA user_version = 99;").unwrap();
        let err = StorageConnector::from_connection(conn).err().unwrap();
        assert!(matches!(
            err,
            ArchiveError::IncompatibleSchema { found: 99, .. }
        ));
    }
}
