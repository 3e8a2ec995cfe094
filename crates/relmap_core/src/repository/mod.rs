//! Declared repositories and their dispatch.
//!
//! # Responsibility
//! - Bind every declared method, plus the implicit CRUD methods, to one executor.
//! - Route calls to executors; writes run inside the thread's transaction.
//! - Expose the typed `CrudRepository` facade and the `RepositoryFactory`.
//!
//! # Invariants
//! - A repository is validated completely before it becomes callable.
//! - Framework method names cannot be redeclared.
//!
//! # See also
//! - docs/architecture/repositories.md

mod crud;
mod executor;
mod factory;
mod method;

use crate::error::{PersistenceError, PersistenceResult};
use crate::model::{EntityDescriptor, EntityRef};
use executor::{build_executor, ExecutionContext, QueryExecutor};
use factory::FactoryShared;
use log::{debug, error, info};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

pub use crud::CrudRepository;
pub use executor::ExecutorBindings;
pub use factory::{RepositoryFactory, RepositoryFactoryBuilder};
pub use method::{
    Arg, ConditionObject, ConditionProperty, ExecutorKind, MethodShape, Outcome, ParamRole,
    RepositoryDeclaration, ResultKind, ReturnShape, StructuredResult,
};

pub(crate) const SAVE: &str = "save";
pub(crate) const UPDATE: &str = "update";
pub(crate) const SAVE_OR_UPDATE: &str = "saveOrUpdate";
pub(crate) const DELETE_BY_ID: &str = "deleteById";
pub(crate) const FIND_BY_ID: &str = "findById";
pub(crate) const COUNT: &str = "count";

const RESERVED: [&str; 11] = [
    "entityDescriptor",
    "newTransaction",
    "newOrExistingTransaction",
    "currentTransaction",
    "dropEntityTable",
    SAVE,
    UPDATE,
    SAVE_OR_UPDATE,
    DELETE_BY_ID,
    FIND_BY_ID,
    COUNT,
];

fn crud_methods(descriptor: &EntityDescriptor) -> Vec<MethodShape> {
    let id = descriptor.id_field().name();
    vec![
        MethodShape::new(SAVE)
            .param(ParamRole::Entity)
            .returns(ReturnShape::Bool),
        MethodShape::new(UPDATE)
            .param(ParamRole::Entity)
            .returns(ReturnShape::Bool),
        MethodShape::new(SAVE_OR_UPDATE)
            .param(ParamRole::Entity)
            .returns(ReturnShape::Bool),
        MethodShape::new(DELETE_BY_ID)
            .param(ParamRole::eq(id))
            .returns(ReturnShape::Bool),
        MethodShape::new(FIND_BY_ID)
            .param(ParamRole::eq(id))
            .returns(ReturnShape::Single(ResultKind::Entity)),
        MethodShape::new(COUNT)
            .marker(ExecutorKind::Count)
            .returns(ReturnShape::Count),
    ]
}

/// Validated executors of one repository.
pub(crate) struct RepositoryCore {
    name: String,
    descriptor: Arc<EntityDescriptor>,
    executors: HashMap<String, Box<dyn QueryExecutor>>,
}

impl RepositoryCore {
    /// Resolves every method of `declaration` against `descriptor`.
    ///
    /// # Errors
    /// - `InvalidRepository` for reserved or duplicate names and malformed methods.
    pub(crate) fn build(
        descriptor: Arc<EntityDescriptor>,
        declaration: &RepositoryDeclaration,
    ) -> PersistenceResult<Self> {
        let name = declaration.name();
        let mut executors = HashMap::new();
        for method in crud_methods(&descriptor) {
            executors.insert(
                method.name().to_string(),
                build_executor(&descriptor, name, &method)?,
            );
        }

        for method in declaration.methods() {
            if RESERVED.contains(&method.name()) {
                return Err(PersistenceError::repository(
                    name,
                    format!("method name `{}` is reserved", method.name()),
                ));
            }
            if executors.contains_key(method.name()) {
                return Err(PersistenceError::repository(
                    name,
                    format!("duplicate method `{}`", method.name()),
                ));
            }
            executors.insert(
                method.name().to_string(),
                build_executor(&descriptor, name, method)?,
            );
        }

        info!(
            "event=repository_register module=repository status=ok repository={name} entity={} methods={}",
            descriptor.entity_name(),
            executors.len()
        );
        Ok(Self {
            name: name.to_string(),
            descriptor,
            executors,
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn entity(&self) -> EntityRef {
        self.descriptor.entity()
    }

    pub(crate) fn descriptor(&self) -> &Arc<EntityDescriptor> {
        &self.descriptor
    }

    pub(crate) fn bindings(&self, method: &str) -> Option<ExecutorBindings> {
        self.executors.get(method).map(|executor| executor.bindings())
    }

    /// Executes `method` with `args`; writes may update `args` in place.
    pub(crate) fn call(
        &self,
        shared: &FactoryShared,
        method: &str,
        args: &mut [Arg],
    ) -> PersistenceResult<Outcome> {
        let executor = self.executors.get(method).ok_or_else(|| {
            PersistenceError::UnsupportedOperation(format!(
                "repository `{}` has no method `{method}`",
                self.name
            ))
        })?;

        let persistence = shared.persistence_context();
        let ctx = ExecutionContext {
            store: shared.store.as_ref(),
            conversion: &shared.conversion,
            registry: &shared.registry,
            persistence: persistence.as_ref(),
            cascade: shared,
        };

        let kind = executor.kind();
        let started_at = Instant::now();
        let result = if kind.is_write() {
            shared
                .transactions
                .run_in_transaction(|| executor.execute(&ctx, args))
        } else {
            executor.execute(&ctx, args)
        };

        match &result {
            Ok(_) => debug!(
                "event=query_execute module=repository status=ok repository={} method={method} kind={kind:?} duration_ms={}",
                self.name,
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=query_execute module=repository status=error repository={} method={method} kind={kind:?} duration_ms={} error={err}",
                self.name,
                started_at.elapsed().as_millis()
            ),
        }
        result
    }
}
