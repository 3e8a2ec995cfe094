//! Thread-bound transactions over the data store.
//!
//! # Responsibility
//! - Bind at most one active transaction to each thread.
//! - Hand out owned handles (begin/finish the store transaction) and borrowed
//!   handles (join the thread's open transaction).
//!
//! # Invariants
//! - Only an owned handle touches the store transaction and the thread binding.
//! - Commit or rollback on a borrowed handle is a no-op.
//! - Dropping an owned, unfinished handle rolls back.
//!
//! # See also
//! - docs/architecture/transactions.md

use crate::error::{PersistenceError, PersistenceResult};
use crate::store::DataStore;
use log::{error, info};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};
use std::time::Instant;
use uuid::Uuid;

/// Tracks the active transaction of every thread.
pub struct TransactionCoordinator {
    store: Arc<dyn DataStore>,
    active: Mutex<HashMap<ThreadId, Uuid>>,
}

impl TransactionCoordinator {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self {
            store,
            active: Mutex::new(HashMap::new()),
        }
    }

    fn bindings(&self) -> PersistenceResult<MutexGuard<'_, HashMap<ThreadId, Uuid>>> {
        self.active.lock().map_err(|_| {
            PersistenceError::InvalidConfiguration("transaction registry lock poisoned".to_string())
        })
    }

    /// Starts a transaction owned by the calling thread.
    ///
    /// # Errors
    /// - `InvalidConfiguration` when the thread already has an active transaction.
    pub fn new_transaction(self: &Arc<Self>) -> PersistenceResult<Transaction> {
        let me = thread::current().id();
        if let Some(existing) = self.bindings()?.get(&me) {
            return Err(PersistenceError::InvalidConfiguration(format!(
                "thread already has active transaction {existing}"
            )));
        }

        // The store may block on another thread's transaction; the binding
        // lock is not held across that wait.
        let id = Uuid::new_v4();
        let started_at = Instant::now();
        if let Err(err) = self.store.begin() {
            error!(
                "event=tx_begin module=transaction status=error tx_id={id} error={err}"
            );
            return Err(err);
        }
        self.bindings()?.insert(me, id);
        info!(
            "event=tx_begin module=transaction status=ok tx_id={id} duration_ms={}",
            started_at.elapsed().as_millis()
        );

        Ok(Transaction {
            coordinator: Arc::clone(self),
            id,
            owned: true,
            finished: false,
        })
    }

    /// Joins the thread's open transaction, or starts a new owned one.
    pub fn new_or_existing_transaction(self: &Arc<Self>) -> PersistenceResult<Transaction> {
        match self.current_transaction()? {
            Some(borrowed) => Ok(borrowed),
            None => self.new_transaction(),
        }
    }

    /// Borrowed handle of the thread's open transaction, if any.
    pub fn current_transaction(self: &Arc<Self>) -> PersistenceResult<Option<Transaction>> {
        let me = thread::current().id();
        let id = self.bindings()?.get(&me).copied();
        Ok(id.map(|id| Transaction {
            coordinator: Arc::clone(self),
            id,
            owned: false,
            finished: false,
        }))
    }

    pub fn has_active_transaction(&self) -> bool {
        let me = thread::current().id();
        self.bindings()
            .map(|active| active.contains_key(&me))
            .unwrap_or(false)
    }

    /// Runs `work` inside the thread's transaction, committing on success.
    ///
    /// Joins an already open transaction without finishing it.
    pub fn run_in_transaction<T>(
        self: &Arc<Self>,
        work: impl FnOnce() -> PersistenceResult<T>,
    ) -> PersistenceResult<T> {
        let transaction = self.new_or_existing_transaction()?;
        match work() {
            Ok(value) => {
                transaction.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = transaction.rollback() {
                    error!(
                        "event=tx_rollback module=transaction status=error error={rollback_err}"
                    );
                }
                Err(err)
            }
        }
    }

    fn finish(&self, id: Uuid, commit: bool) -> PersistenceResult<()> {
        let event = if commit { "tx_commit" } else { "tx_rollback" };
        let result = if commit {
            self.store.commit()
        } else {
            self.store.rollback()
        };
        self.bindings()?.remove(&thread::current().id());
        match &result {
            Ok(()) => info!("event={event} module=transaction status=ok tx_id={id}"),
            Err(err) => error!("event={event} module=transaction status=error tx_id={id} error={err}"),
        }
        result
    }
}

/// Handle of a thread's active transaction.
pub struct Transaction {
    coordinator: Arc<TransactionCoordinator>,
    id: Uuid,
    owned: bool,
    finished: bool,
}

impl Transaction {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Whether this handle joined a transaction owned elsewhere.
    pub fn is_borrowed(&self) -> bool {
        !self.owned
    }

    pub fn commit(mut self) -> PersistenceResult<()> {
        self.finish(true)
    }

    pub fn rollback(mut self) -> PersistenceResult<()> {
        self.finish(false)
    }

    fn finish(&mut self, commit: bool) -> PersistenceResult<()> {
        if !self.owned || self.finished {
            return Ok(());
        }
        self.finished = true;
        self.coordinator.finish(self.id, commit)
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if let Err(err) = self.finish(false) {
            error!(
                "event=tx_rollback module=transaction status=error tx_id={} error={err}",
                self.id
            );
        }
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("borrowed", &!self.owned)
            .field("finished", &self.finished)
            .finish()
    }
}
