//! Internal schema migrations of the SQLite store.
//!
//! # Responsibility
//! - Create the bookkeeping tables the store needs (sequence emulation).
//! - Apply pending migrations atomically.
//!
//! # Invariants
//! - `version` values must remain monotonic.
//! - The applied version lives in `RELMAP_META`; the host database's
//!   `PRAGMA user_version` is never read or written.
//! - Migrations never touch entity tables.

use super::{DbError, DbResult};
use rusqlite::{params, Connection, OptionalExtension};

const META_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS RELMAP_META (
    NAME TEXT PRIMARY KEY NOT NULL,
    NUM_VALUE INTEGER NOT NULL
);";
const VERSION_KEY: &str = "schema_version";

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: include_str!("0001_sequences.sql"),
}];

/// Returns the latest internal migration version known by this binary.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Applies all pending migrations on the provided connection.
pub(crate) fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(META_TABLE_SQL)?;
    let current_version = current_store_version(&tx)?;
    let latest = latest_version();

    if current_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current_version,
            latest_supported: latest,
        });
    }

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        tx.execute_batch(migration.sql)?;
        tx.execute(
            "INSERT INTO RELMAP_META (NAME, NUM_VALUE) VALUES (?1, ?2)
             ON CONFLICT (NAME) DO UPDATE SET NUM_VALUE = excluded.NUM_VALUE",
            params![VERSION_KEY, migration.version],
        )?;
    }
    tx.commit()?;

    Ok(())
}

/// Applied internal migration version, `0` for a database the store never opened.
pub(crate) fn current_store_version(conn: &Connection) -> DbResult<u32> {
    let version = conn
        .query_row(
            "SELECT NUM_VALUE FROM RELMAP_META WHERE NAME = ?1",
            params![VERSION_KEY],
            |row| row.get::<_, u32>(0),
        )
        .optional()?;
    Ok(version.unwrap_or(0))
}
