use super::{resolve_conditions, ExecutionContext, ExecutorBindings, QueryExecutor};
use crate::error::PersistenceResult;
use crate::model::EntityDescriptor;
use crate::query::{ConditionBinding, ConditionQueryBuilder, CountQuery};
use crate::repository::method::{Arg, ExecutorKind, MethodShape, Outcome, ReturnShape};
use std::sync::Arc;

/// Counts matching rows; selected only by the `Count` marker.
pub(crate) struct CountExecutor {
    descriptor: Arc<EntityDescriptor>,
    exists: bool,
    conditions: Vec<ConditionBinding>,
}

impl CountExecutor {
    pub(crate) fn new(
        descriptor: &Arc<EntityDescriptor>,
        builder: &ConditionQueryBuilder<'_>,
        method: &MethodShape,
    ) -> PersistenceResult<Self> {
        let exists = match method.return_shape() {
            ReturnShape::Count => false,
            ReturnShape::Bool => true,
            other => {
                return Err(builder.invalid(format!("unsupported return shape {other:?}")));
            }
        };
        Ok(Self {
            descriptor: Arc::clone(descriptor),
            exists,
            conditions: builder.resolve_conditions(true)?,
        })
    }
}

impl QueryExecutor for CountExecutor {
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Count
    }

    fn execute(&self, ctx: &ExecutionContext<'_>, args: &mut [Arg]) -> PersistenceResult<Outcome> {
        let descriptor = self.descriptor.as_ref();
        let count = ctx.store.count(&CountQuery {
            table: descriptor.table_name().to_string(),
            conditions: resolve_conditions(ctx, descriptor, &self.conditions, args)?,
        })?;
        Ok(if self.exists {
            Outcome::Bool(count > 0)
        } else {
            Outcome::Count(count)
        })
    }

    fn bindings(&self) -> ExecutorBindings {
        let mut bindings = ExecutorBindings::new(ExecutorKind::Count);
        bindings.conditions = self.conditions.clone();
        bindings
    }
}
