use super::{
    require_write_return, resolve_conditions, write_outcome, ExecutionContext, ExecutorBindings,
    QueryExecutor,
};
use crate::audit::{self, ChangeType};
use crate::error::PersistenceResult;
use crate::model::EntityDescriptor;
use crate::query::{ConditionBinding, ConditionQueryBuilder, DeleteQuery};
use crate::repository::method::{Arg, ExecutorKind, MethodShape, Outcome, ReturnShape};
use std::sync::Arc;

/// Deletes matching rows after resolving their child constraints.
pub(crate) struct DeleteExecutor {
    descriptor: Arc<EntityDescriptor>,
    returns: ReturnShape,
    conditions: Vec<ConditionBinding>,
}

impl DeleteExecutor {
    pub(crate) fn new(
        descriptor: &Arc<EntityDescriptor>,
        builder: &ConditionQueryBuilder<'_>,
        method: &MethodShape,
    ) -> PersistenceResult<Self> {
        require_write_return(builder, method, true)?;
        Ok(Self {
            descriptor: Arc::clone(descriptor),
            returns: method.return_shape().clone(),
            conditions: builder.resolve_conditions(true)?,
        })
    }
}

impl QueryExecutor for DeleteExecutor {
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Delete
    }

    fn execute(&self, ctx: &ExecutionContext<'_>, args: &mut [Arg]) -> PersistenceResult<Outcome> {
        let descriptor = self.descriptor.as_ref();
        let conditions = resolve_conditions(ctx, descriptor, &self.conditions, args)?;

        ctx.enforcer()
            .process_children(descriptor, &conditions, ctx.cascade)?;
        // Snapshot before the rows disappear.
        audit::record_change(
            ctx.store,
            ctx.persistence,
            descriptor,
            ChangeType::Delete,
            conditions.clone(),
        )?;

        let affected = ctx.store.delete(&DeleteQuery {
            table: descriptor.table_name().to_string(),
            conditions,
        })?;
        Ok(write_outcome(&self.returns, affected))
    }

    fn bindings(&self) -> ExecutorBindings {
        let mut bindings = ExecutorBindings::new(ExecutorKind::Delete);
        bindings.conditions = self.conditions.clone();
        bindings
    }
}
