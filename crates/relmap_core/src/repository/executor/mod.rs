//! Query executors bound to repository methods.
//!
//! # Responsibility
//! - Select the executor family of each method by marker, then by name prefix.
//! - Validate the method shape once, at registration.
//! - Turn one call's arguments into structured queries and an `Outcome`.
//!
//! # Invariants
//! - Executors hold only immutable templates; concurrent calls never share
//!   per-call state.
//! - Shape errors surface as `InvalidRepository` at registration, never at call time.
//!
//! # See also
//! - docs/architecture/repositories.md

mod count;
mod delete;
mod finder;
mod save;
mod save_or_update;
mod update;

use super::method::{Arg, ExecutorKind, MethodShape, Outcome, ParamRole, ReturnShape};
use crate::audit::PersistenceContext;
use crate::constraint::{CascadeDelete, ConstraintEnforcer};
use crate::conversion::ConversionService;
use crate::error::{PersistenceError, PersistenceResult};
use crate::model::EntityDescriptor;
use crate::query::{
    ColumnBinding, Condition, ConditionBinding, ConditionQueryBuilder, ResultBinding,
};
use crate::registry::EntityRegistry;
use crate::store::DataStore;
use crate::value::{Record, Value};
use std::sync::Arc;

/// Collaborators available to one executor call.
pub(crate) struct ExecutionContext<'a> {
    pub(crate) store: &'a dyn DataStore,
    pub(crate) conversion: &'a ConversionService,
    pub(crate) registry: &'a EntityRegistry,
    pub(crate) persistence: &'a dyn PersistenceContext,
    pub(crate) cascade: &'a dyn CascadeDelete,
}

impl ExecutionContext<'_> {
    pub(crate) fn enforcer(&self) -> ConstraintEnforcer<'_> {
        ConstraintEnforcer::new(self.store, self.conversion, self.registry)
    }
}

/// Templates an executor resolved at registration.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorBindings {
    pub kind: ExecutorKind,
    pub conditions: Vec<ConditionBinding>,
    pub columns: Vec<ColumnBinding>,
    pub results: Vec<ResultBinding>,
}

impl ExecutorBindings {
    fn new(kind: ExecutorKind) -> Self {
        Self {
            kind,
            conditions: Vec::new(),
            columns: Vec::new(),
            results: Vec::new(),
        }
    }
}

pub(crate) trait QueryExecutor: Send + Sync {
    fn kind(&self) -> ExecutorKind;

    fn execute(&self, ctx: &ExecutionContext<'_>, args: &mut [Arg]) -> PersistenceResult<Outcome>;

    fn bindings(&self) -> ExecutorBindings;
}

/// Executor family implied by the method-name prefix.
fn kind_from_prefix(name: &str) -> Option<ExecutorKind> {
    const PREFIXES: [(&str, ExecutorKind); 6] = [
        ("saveOrUpdate", ExecutorKind::SaveOrUpdate),
        ("save", ExecutorKind::Save),
        ("update", ExecutorKind::Update),
        ("delete", ExecutorKind::Delete),
        ("find", ExecutorKind::Finder),
        ("fetch", ExecutorKind::Finder),
    ];
    PREFIXES
        .iter()
        .find(|(prefix, _)| name.starts_with(prefix))
        .map(|(_, kind)| *kind)
}

/// Resolves and validates the executor of one method.
pub(crate) fn build_executor(
    descriptor: &Arc<EntityDescriptor>,
    repository: &str,
    method: &MethodShape,
) -> PersistenceResult<Box<dyn QueryExecutor>> {
    let builder = ConditionQueryBuilder::new(descriptor, repository, method);
    let kind = method
        .executor_marker()
        .or_else(|| kind_from_prefix(method.name()))
        .ok_or_else(|| builder.invalid("no executor matches the method marker or name prefix"))?;

    let executor: Box<dyn QueryExecutor> = match kind {
        ExecutorKind::Save => Box::new(save::SaveExecutor::new(descriptor, &builder, method)?),
        ExecutorKind::SaveOrUpdate => Box::new(save_or_update::SaveOrUpdateExecutor::new(
            descriptor, &builder, method,
        )?),
        ExecutorKind::Update => {
            Box::new(update::UpdateExecutor::new(descriptor, &builder, method)?)
        }
        ExecutorKind::Delete => {
            Box::new(delete::DeleteExecutor::new(descriptor, &builder, method)?)
        }
        ExecutorKind::Finder => {
            Box::new(finder::FinderExecutor::new(descriptor, &builder, method)?)
        }
        ExecutorKind::Count => Box::new(count::CountExecutor::new(descriptor, &builder, method)?),
    };
    Ok(executor)
}

/// Requires exactly one `Entity` parameter.
fn require_entity_param(
    builder: &ConditionQueryBuilder<'_>,
    method: &MethodShape,
) -> PersistenceResult<()> {
    match method.params() {
        [ParamRole::Entity] => Ok(()),
        _ => Err(builder.invalid("expected exactly one entity parameter")),
    }
}

/// Write-result shapes accepted by mutating executors.
fn require_write_return(
    builder: &ConditionQueryBuilder<'_>,
    method: &MethodShape,
    allow_count: bool,
) -> PersistenceResult<()> {
    match method.return_shape() {
        ReturnShape::Unit | ReturnShape::Bool => Ok(()),
        ReturnShape::Count if allow_count => Ok(()),
        other => Err(builder.invalid(format!("unsupported return shape {other:?}"))),
    }
}

fn write_outcome(returns: &ReturnShape, affected: usize) -> Outcome {
    match returns {
        ReturnShape::Bool => Outcome::Bool(affected > 0),
        ReturnShape::Count => Outcome::Count(i64::try_from(affected).unwrap_or(i64::MAX)),
        _ => Outcome::Unit,
    }
}

fn record_arg<'a>(args: &'a [Arg], descriptor: &EntityDescriptor) -> PersistenceResult<&'a Record> {
    args.first()
        .and_then(Arg::as_record)
        .ok_or_else(|| {
            PersistenceError::DataConversion(format!(
                "expected a `{}` record as first argument",
                descriptor.entity_name()
            ))
        })
}

fn resolve_conditions(
    ctx: &ExecutionContext<'_>,
    descriptor: &EntityDescriptor,
    bindings: &[ConditionBinding],
    args: &[Arg],
) -> PersistenceResult<Vec<Condition>> {
    bindings
        .iter()
        .map(|binding| binding.resolve(descriptor, ctx.conversion, args))
        .collect()
}

fn id_condition(
    ctx: &ExecutionContext<'_>,
    descriptor: &EntityDescriptor,
    id: &Value,
) -> PersistenceResult<Condition> {
    let id_field = descriptor.id_field();
    Ok(Condition::eq(
        id_field.column(),
        ctx.conversion.to_store(id, Some(id_field))?,
    ))
}
