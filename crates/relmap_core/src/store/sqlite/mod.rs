//! SQLite implementation of the data store contract.
//!
//! # Responsibility
//! - Render structured queries to SQLite SQL and execute them.
//! - Emulate named sequences through an internal bookkeeping table.
//! - Serialize access to the single connection, honoring open transactions.
//!
//! # Invariants
//! - While a thread owns a transaction, other threads block until it ends.
//! - The owning thread re-enters the connection freely.
//!
//! # See also
//! - docs/architecture/data-store.md

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

use log::{debug, info, warn};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::config::SqliteConfig;
use crate::error::{PersistenceError, PersistenceResult};
use crate::query::{
    AuditEntryQuery, ChildrenQuery, Column, CountQuery, CreateIndexQuery, CreateTableQuery,
    DeleteQuery, FinderQuery, SaveOrUpdateQuery, SaveQuery, UpdateQuery,
};
use crate::value::StoreValue;

use super::{DataStore, SaveResult, StoreRow};
use render::Statement;

mod migrations;
mod open;
mod render;

pub use migrations::latest_version;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "store schema version {db_version} is newer than supported {latest_supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<DbError> for PersistenceError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Sqlite(err) => {
                PersistenceError::store("failed to open data store", "open", err)
            }
            other => PersistenceError::InvalidConfiguration(other.to_string()),
        }
    }
}

struct State {
    conn: Connection,
    owner: Option<ThreadId>,
}

/// Data store over one SQLite connection.
pub struct SqliteDataStore {
    state: Mutex<State>,
    released: Condvar,
    config: SqliteConfig,
}

impl SqliteDataStore {
    /// Opens (creating when missing) a file-backed store.
    pub fn open(path: impl AsRef<Path>, config: &SqliteConfig) -> PersistenceResult<Self> {
        let conn = open::open_db(path, config.busy_timeout())?;
        Ok(Self::from_connection(conn, config))
    }

    pub fn open_in_memory() -> PersistenceResult<Self> {
        Self::open_in_memory_with(&SqliteConfig::default())
    }

    pub fn open_in_memory_with(config: &SqliteConfig) -> PersistenceResult<Self> {
        let conn = open::open_db_in_memory(config.busy_timeout())?;
        Ok(Self::from_connection(conn, config))
    }

    fn from_connection(conn: Connection, config: &SqliteConfig) -> Self {
        Self {
            state: Mutex::new(State { conn, owner: None }),
            released: Condvar::new(),
            config: config.clone(),
        }
    }

    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    fn lock(&self) -> PersistenceResult<MutexGuard<'_, State>> {
        self.state.lock().map_err(|_| poisoned())
    }

    /// Waits until no other thread owns a transaction, then locks the connection.
    fn acquire(&self) -> PersistenceResult<MutexGuard<'_, State>> {
        let me = thread::current().id();
        let mut state = self.lock()?;
        while matches!(state.owner, Some(owner) if owner != me) {
            state = self.released.wait(state).map_err(|_| poisoned())?;
        }
        Ok(state)
    }

    fn with_connection<T>(
        &self,
        work: impl FnOnce(&Connection) -> PersistenceResult<T>,
    ) -> PersistenceResult<T> {
        let state = self.acquire()?;
        work(&state.conn)
    }

    fn finish(&self, verb: &str) -> PersistenceResult<()> {
        let me = thread::current().id();
        let mut state = self.lock()?;
        if state.owner != Some(me) {
            return Err(PersistenceError::execution(
                format!("no transaction owned by the current thread to {verb}"),
                verb,
            ));
        }
        let result = state.conn.execute_batch(verb);
        if result.is_err() && verb == "COMMIT" {
            if let Err(err) = state.conn.execute_batch("ROLLBACK") {
                warn!("event=tx_cleanup module=store status=error error={err}");
            }
        }
        state.owner = None;
        drop(state);
        self.released.notify_all();
        result.map_err(|err| PersistenceError::store(format!("failed to {verb}"), verb, err))
    }
}

fn poisoned() -> PersistenceError {
    PersistenceError::execution("data store lock poisoned", "-")
}

fn next_sequence_value(conn: &Connection, sequence: &str) -> PersistenceResult<StoreValue> {
    let sql = render::next_sequence_value();
    let next = conn
        .query_row(&sql, params![sequence], |row| row.get::<_, i64>(0))
        .optional()
        .map_err(|err| PersistenceError::store("failed to read sequence", sequence, err))?;
    match next {
        Some(value) => Ok(StoreValue::Integer(value)),
        None => Err(PersistenceError::execution(
            format!("sequence `{sequence}` does not exist"),
            sequence,
        )),
    }
}

/// Materializes sequence-backed columns; returns the last sequence value drawn.
fn resolve_columns(
    conn: &Connection,
    columns: &[Column],
) -> PersistenceResult<(Vec<(String, StoreValue)>, Option<StoreValue>)> {
    let mut generated = None;
    let mut resolved = Vec::with_capacity(columns.len());
    for column in columns {
        let value = match &column.sequence {
            Some(sequence) => {
                let value = next_sequence_value(conn, sequence)?;
                generated = Some(value.clone());
                value
            }
            None => column.value.clone(),
        };
        resolved.push((column.name.clone(), value));
    }
    Ok((resolved, generated))
}

fn execute(
    conn: &Connection,
    statement: &Statement,
    query: &dyn Display,
) -> PersistenceResult<usize> {
    debug!("event=store_execute module=store query={query}");
    conn.execute(&statement.sql, params_from_iter(statement.params.iter()))
        .map_err(|err| PersistenceError::store("failed to execute query", query, err))
}

fn execute_ddl(conn: &Connection, sql: &str, query: &dyn Display) -> PersistenceResult<()> {
    info!("event=store_ddl module=store query={query}");
    conn.execute_batch(sql)
        .map_err(|err| PersistenceError::store("failed to execute DDL", query, err))
}

impl DataStore for SqliteDataStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn column_names(&self, table: &str) -> PersistenceResult<Option<Vec<String>>> {
        self.with_connection(|conn| {
            let read = || -> rusqlite::Result<Vec<String>> {
                let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
                let rows = stmt.query_map(params![table], |row| row.get::<_, String>(0))?;
                rows.collect()
            };
            let columns = read().map_err(|err| {
                PersistenceError::store("failed to read table columns", table, err)
            })?;
            Ok((!columns.is_empty()).then_some(columns))
        })
    }

    fn check_and_create_sequence(&self, name: &str) -> PersistenceResult<()> {
        self.with_connection(|conn| {
            conn.execute(&render::create_sequence(), params![name])
                .map(|_| ())
                .map_err(|err| PersistenceError::store("failed to create sequence", name, err))
        })
    }

    fn create_table(&self, query: &CreateTableQuery) -> PersistenceResult<()> {
        let sql = render::create_table(query, self.config.native_foreign_keys);
        self.with_connection(|conn| execute_ddl(conn, &sql, query))
    }

    fn create_index(&self, query: &CreateIndexQuery) -> PersistenceResult<()> {
        let sql = render::create_index(query);
        self.with_connection(|conn| execute_ddl(conn, &sql, query))
    }

    fn drop_table(&self, table: &str) -> PersistenceResult<()> {
        let sql = format!("DROP TABLE IF EXISTS {}", render::quote(table));
        self.with_connection(|conn| execute_ddl(conn, &sql, &table))
    }

    fn count(&self, query: &CountQuery) -> PersistenceResult<i64> {
        let statement = render::count(query);
        self.with_connection(|conn| {
            conn.query_row(
                &statement.sql,
                params_from_iter(statement.params.iter()),
                |row| row.get::<_, i64>(0),
            )
            .map_err(|err| PersistenceError::store("failed to count rows", query, err))
        })
    }

    fn save(&self, query: &SaveQuery) -> PersistenceResult<SaveResult> {
        self.with_connection(|conn| {
            let (columns, sequence_value) = resolve_columns(conn, &query.columns)?;
            let statement = render::insert(&query.table, &columns);
            let affected = execute(conn, &statement, query)?;
            let generated_id = sequence_value
                .unwrap_or_else(|| StoreValue::Integer(conn.last_insert_rowid()));
            Ok(SaveResult {
                affected,
                generated_id: Some(generated_id),
            })
        })
    }

    fn update(&self, query: &UpdateQuery) -> PersistenceResult<usize> {
        let statement = render::update(query);
        self.with_connection(|conn| execute(conn, &statement, query))
    }

    fn save_or_update(&self, query: &SaveOrUpdateQuery) -> PersistenceResult<usize> {
        self.with_connection(|conn| {
            let (columns, _) = resolve_columns(conn, &query.insert_columns)?;
            let statement = render::upsert(query, &columns);
            execute(conn, &statement, query)
        })
    }

    fn delete(&self, query: &DeleteQuery) -> PersistenceResult<usize> {
        let statement = render::delete(query);
        self.with_connection(|conn| execute(conn, &statement, query))
    }

    fn find(&self, query: &FinderQuery) -> PersistenceResult<Vec<StoreRow>> {
        let statement = render::find(query);
        debug!("event=store_find module=store query={query}");
        self.with_connection(|conn| {
            let read = || -> rusqlite::Result<Vec<StoreRow>> {
                let mut stmt = conn.prepare(&statement.sql)?;
                let rows = stmt.query_map(params_from_iter(statement.params.iter()), |row| {
                    let mut out = StoreRow::new();
                    for (index, result) in query.results.iter().enumerate() {
                        out.insert(result.key.clone(), row.get::<_, StoreValue>(index)?);
                    }
                    Ok(out)
                })?;
                rows.collect()
            };
            read().map_err(|err| PersistenceError::store("failed to fetch rows", query, err))
        })
    }

    fn fetch_children_ids(&self, query: &ChildrenQuery) -> PersistenceResult<Vec<StoreValue>> {
        let statement = render::children_ids(query);
        self.with_connection(|conn| {
            let read = || -> rusqlite::Result<Vec<StoreValue>> {
                let mut stmt = conn.prepare(&statement.sql)?;
                let rows = stmt.query_map(params_from_iter(statement.params.iter()), |row| {
                    row.get::<_, StoreValue>(0)
                })?;
                rows.collect()
            };
            read().map_err(|err| PersistenceError::store("failed to fetch child ids", query, err))
        })
    }

    fn children_exist(&self, query: &ChildrenQuery) -> PersistenceResult<bool> {
        let statement = render::children_exist(query);
        self.with_connection(|conn| {
            conn.query_row(
                &statement.sql,
                params_from_iter(statement.params.iter()),
                |row| row.get::<_, bool>(0),
            )
            .map_err(|err| PersistenceError::store("failed to check child rows", query, err))
        })
    }

    fn add_audit_entries(&self, query: &AuditEntryQuery) -> PersistenceResult<usize> {
        let statement = render::audit_entries(query);
        self.with_connection(|conn| execute(conn, &statement, query))
    }

    fn begin(&self) -> PersistenceResult<()> {
        let me = thread::current().id();
        let mut state = self.acquire()?;
        if state.owner == Some(me) {
            return Err(PersistenceError::execution(
                "current thread already owns a store transaction",
                "BEGIN",
            ));
        }
        state
            .conn
            .execute_batch("BEGIN")
            .map_err(|err| PersistenceError::store("failed to begin transaction", "BEGIN", err))?;
        state.owner = Some(me);
        Ok(())
    }

    fn commit(&self) -> PersistenceResult<()> {
        self.finish("COMMIT")
    }

    fn rollback(&self) -> PersistenceResult<()> {
        self.finish("ROLLBACK")
    }

    fn owns_transaction(&self) -> bool {
        let me = thread::current().id();
        self.lock()
            .map(|state| state.owner == Some(me))
            .unwrap_or(false)
    }

    fn explicit_foreign_check_required(&self) -> bool {
        !self.config.native_foreign_keys
    }
}

#[cfg(test)]
mod tests {
    use super::SqliteDataStore;
    use crate::query::{Column, ColumnStructure, CountQuery, CreateTableQuery, SaveQuery};
    use crate::store::DataStore;
    use crate::value::{DataType, StoreValue};

    fn id_column(name: &str, auto: bool, sequence: Option<&str>) -> ColumnStructure {
        ColumnStructure {
            name: name.to_string(),
            data_type: DataType::Long,
            length: None,
            nullable: false,
            identifier: true,
            auto_increment: auto,
            sequence: sequence.map(str::to_string),
        }
    }

    fn text_column(name: &str) -> ColumnStructure {
        ColumnStructure {
            name: name.to_string(),
            data_type: DataType::String,
            length: None,
            nullable: true,
            identifier: false,
            auto_increment: false,
            sequence: None,
        }
    }

    #[test]
    fn missing_table_reports_no_columns() {
        let store = SqliteDataStore::open_in_memory().unwrap();
        assert_eq!(store.column_names("NOPE").unwrap(), None);
    }

    #[test]
    fn sequence_values_increase_per_insert() {
        let store = SqliteDataStore::open_in_memory().unwrap();
        store.check_and_create_sequence("SEQ_ITEM_ID").unwrap();
        store.check_and_create_sequence("SEQ_ITEM_ID").unwrap();
        store
            .create_table(&CreateTableQuery {
                table: "ITEM".to_string(),
                columns: vec![id_column("ID", false, Some("SEQ_ITEM_ID")), text_column("NAME")],
                unique_constraints: Vec::new(),
                foreign_constraints: Vec::new(),
            })
            .unwrap();

        let insert = |name: &str| {
            store
                .save(&SaveQuery {
                    table: "ITEM".to_string(),
                    columns: vec![
                        Column::from_sequence("ID", "SEQ_ITEM_ID"),
                        Column::new("NAME", StoreValue::Text(name.to_string())),
                    ],
                })
                .unwrap()
        };
        assert_eq!(insert("a").generated_id, Some(StoreValue::Integer(1)));
        assert_eq!(insert("b").generated_id, Some(StoreValue::Integer(2)));

        let columns = store.column_names("ITEM").unwrap().unwrap();
        assert_eq!(columns, vec!["ID".to_string(), "NAME".to_string()]);
        let count = store
            .count(&CountQuery {
                table: "ITEM".to_string(),
                conditions: Vec::new(),
            })
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn rollback_discards_writes_of_owning_thread() {
        let store = SqliteDataStore::open_in_memory().unwrap();
        store
            .create_table(&CreateTableQuery {
                table: "ITEM".to_string(),
                columns: vec![id_column("ID", true, None), text_column("NAME")],
                unique_constraints: Vec::new(),
                foreign_constraints: Vec::new(),
            })
            .unwrap();
        store.begin().unwrap();
        store
            .save(&SaveQuery {
                table: "ITEM".to_string(),
                columns: vec![Column::new("NAME", StoreValue::Text("x".to_string()))],
            })
            .unwrap();
        store.rollback().unwrap();

        let count = store
            .count(&CountQuery {
                table: "ITEM".to_string(),
                conditions: Vec::new(),
            })
            .unwrap();
        assert_eq!(count, 0);
        assert!(store.commit().is_err());
    }
}
