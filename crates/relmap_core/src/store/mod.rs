//! Data store collaborator contract.
//!
//! # Responsibility
//! - Define the narrow contract the engine uses to reach a relational store.
//! - Ship the SQLite implementation.
//!
//! # Invariants
//! - The engine never renders SQL; every operation goes through `DataStore`.
//! - Store failures surface as `PersistenceError::Persistence` with query context.
//!
//! # See also
//! - docs/architecture/data-store.md

pub mod sqlite;

use crate::error::{PersistenceError, PersistenceResult};
use crate::query::{
    AuditEntryQuery, ChildrenQuery, CountQuery, CreateIndexQuery, CreateTableQuery, DeleteQuery,
    FinderQuery, SaveOrUpdateQuery, SaveQuery, UpdateQuery,
};
use crate::value::StoreValue;
use std::collections::BTreeMap;

pub use sqlite::{DbError, DbResult, SqliteDataStore};

/// One result row, keyed by `ResultColumn::key`.
pub type StoreRow = BTreeMap<String, StoreValue>;

/// Outcome of an insert.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveResult {
    pub affected: usize,
    /// Identifier assigned by the store (auto-increment or sequence), if any.
    pub generated_id: Option<StoreValue>,
}

/// Relational store executing structured queries.
pub trait DataStore: Send + Sync {
    fn name(&self) -> &str;

    /// Column names of `table`, `None` when the table does not exist.
    fn column_names(&self, table: &str) -> PersistenceResult<Option<Vec<String>>>;

    fn check_and_create_sequence(&self, name: &str) -> PersistenceResult<()>;

    fn create_table(&self, query: &CreateTableQuery) -> PersistenceResult<()>;

    fn create_index(&self, query: &CreateIndexQuery) -> PersistenceResult<()>;

    fn drop_table(&self, table: &str) -> PersistenceResult<()>;

    fn count(&self, query: &CountQuery) -> PersistenceResult<i64>;

    fn save(&self, query: &SaveQuery) -> PersistenceResult<SaveResult>;

    fn update(&self, query: &UpdateQuery) -> PersistenceResult<usize>;

    fn save_or_update(&self, query: &SaveOrUpdateQuery) -> PersistenceResult<usize> {
        Err(PersistenceError::UnsupportedOperation(format!(
            "save-or-update is not supported by data store `{}` [query: {query}]",
            self.name()
        )))
    }

    fn delete(&self, query: &DeleteQuery) -> PersistenceResult<usize>;

    fn find(&self, query: &FinderQuery) -> PersistenceResult<Vec<StoreRow>>;

    fn fetch_children_ids(&self, query: &ChildrenQuery) -> PersistenceResult<Vec<StoreValue>>;

    fn children_exist(&self, query: &ChildrenQuery) -> PersistenceResult<bool>;

    fn add_audit_entries(&self, query: &AuditEntryQuery) -> PersistenceResult<usize>;

    /// Opens a store transaction owned by the calling thread.
    fn begin(&self) -> PersistenceResult<()>;

    fn commit(&self) -> PersistenceResult<()>;

    fn rollback(&self) -> PersistenceResult<()>;

    /// Whether the calling thread owns the open store transaction.
    fn owns_transaction(&self) -> bool;

    /// Whether foreign/child integrity must be checked by the engine.
    fn explicit_foreign_check_required(&self) -> bool;
}
