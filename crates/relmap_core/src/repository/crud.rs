use super::{
    Arg, ExecutorBindings, Outcome, RepositoryCore, RepositoryFactory, COUNT, DELETE_BY_ID,
    FIND_BY_ID, SAVE, SAVE_OR_UPDATE, UPDATE,
};
use crate::audit::{self, AuditEntry, AuditSearchQuery};
use crate::error::PersistenceResult;
use crate::model::{Entity, EntityDescriptor};
use crate::transaction::Transaction;
use crate::value::Value;
use chrono::{DateTime, Utc};
use std::marker::PhantomData;
use std::sync::Arc;

/// Typed handle over one repository of entity `E`.
pub struct CrudRepository<E: Entity> {
    factory: RepositoryFactory,
    core: Arc<RepositoryCore>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Clone for CrudRepository<E> {
    fn clone(&self) -> Self {
        Self {
            factory: self.factory.clone(),
            core: Arc::clone(&self.core),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> CrudRepository<E> {
    pub(crate) fn new(factory: RepositoryFactory, core: Arc<RepositoryCore>) -> Self {
        Self {
            factory,
            core,
            _entity: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        self.core.name()
    }

    pub fn entity_descriptor(&self) -> Arc<EntityDescriptor> {
        Arc::clone(self.core.descriptor())
    }

    /// Inserts `entity`, writing the generated identifier and auto-fetch
    /// fields back into it.
    pub fn save(&self, entity: &mut E) -> PersistenceResult<bool> {
        self.write_back(SAVE, entity)
    }

    pub fn update(&self, entity: &E) -> PersistenceResult<bool> {
        let outcome = self.call(UPDATE, vec![Arg::Record(entity.to_record())])?;
        Ok(outcome.as_bool().unwrap_or(false))
    }

    pub fn save_or_update(&self, entity: &mut E) -> PersistenceResult<bool> {
        self.write_back(SAVE_OR_UPDATE, entity)
    }

    pub fn delete_by_id(&self, id: impl Into<Value>) -> PersistenceResult<bool> {
        let outcome = self.call(DELETE_BY_ID, vec![Arg::Value(id.into())])?;
        Ok(outcome.as_bool().unwrap_or(false))
    }

    pub fn find_by_id(&self, id: impl Into<Value>) -> PersistenceResult<Option<E>> {
        self.find_one(FIND_BY_ID, vec![Arg::Value(id.into())])
    }

    /// Number of rows of the entity table.
    pub fn count(&self) -> PersistenceResult<i64> {
        Ok(self.call(COUNT, Vec::new())?.as_count().unwrap_or(0))
    }

    /// Invokes any method of this repository by name.
    pub fn call(&self, method: &str, mut args: Vec<Arg>) -> PersistenceResult<Outcome> {
        self.call_mut(method, &mut args)
    }

    /// Like [`call`](Self::call), leaving write-backs visible in `args`.
    pub fn call_mut(&self, method: &str, args: &mut [Arg]) -> PersistenceResult<Outcome> {
        self.core.call(self.factory.shared(), method, args)
    }

    /// Invokes a single-result finder returning entities.
    pub fn find_one(&self, method: &str, args: Vec<Arg>) -> PersistenceResult<Option<E>> {
        self.call(method, args)?
            .into_record()
            .map(|record| E::from_record(&record))
            .transpose()
    }

    /// Invokes a finder returning entities.
    pub fn find_all(&self, method: &str, args: Vec<Arg>) -> PersistenceResult<Vec<E>> {
        self.call(method, args)?
            .into_records()
            .iter()
            .map(E::from_record)
            .collect()
    }

    pub fn new_transaction(&self) -> PersistenceResult<Transaction> {
        self.factory.transactions().new_transaction()
    }

    pub fn new_or_existing_transaction(&self) -> PersistenceResult<Transaction> {
        self.factory.transactions().new_or_existing_transaction()
    }

    pub fn current_transaction(&self) -> PersistenceResult<Option<Transaction>> {
        self.factory.transactions().current_transaction()
    }

    pub fn drop_entity_table(&self) -> PersistenceResult<()> {
        self.factory
            .data_store()
            .drop_table(self.core.descriptor().table_name())
    }

    /// Audit rows of this entity type matching `query`.
    ///
    /// # Errors
    /// - `UnsupportedOperation` when the entity is not audited.
    pub fn audit_entries(&self, query: &AuditSearchQuery) -> PersistenceResult<Vec<AuditEntry>> {
        let shared = self.factory.shared();
        audit::search(
            shared.store.as_ref(),
            &shared.conversion,
            self.core.descriptor(),
            query,
        )
    }

    /// Deletes audit rows recorded at or before `till`; returns the count.
    pub fn clear_audit(&self, till: DateTime<Utc>) -> PersistenceResult<usize> {
        audit::clear(
            self.factory.shared().store.as_ref(),
            self.core.descriptor(),
            till,
        )
    }

    /// Templates resolved for `method`, if it exists.
    pub fn bindings(&self, method: &str) -> Option<ExecutorBindings> {
        self.core.bindings(method)
    }

    fn write_back(&self, method: &str, entity: &mut E) -> PersistenceResult<bool> {
        let mut args = [Arg::Record(entity.to_record())];
        let outcome = self.call_mut(method, &mut args)?;
        if let Some(record) = args[0].as_record() {
            *entity = E::from_record(record)?;
        }
        Ok(outcome.as_bool().unwrap_or(false))
    }
}

impl<E: Entity> std::fmt::Debug for CrudRepository<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrudRepository")
            .field("name", &self.core.name())
            .field("entity", &self.core.entity())
            .finish()
    }
}

