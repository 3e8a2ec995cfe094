use super::save::{complete_insert, insert_columns};
use super::{
    record_arg, require_entity_param, require_write_return, write_outcome, ExecutionContext,
    ExecutorBindings, QueryExecutor,
};
use crate::audit::ChangeType;
use crate::error::PersistenceResult;
use crate::model::EntityDescriptor;
use crate::query::{Column, ConditionQueryBuilder, SaveOrUpdateQuery};
use crate::repository::method::{Arg, ExecutorKind, MethodShape, Outcome, ReturnShape};
use std::sync::Arc;

/// Inserts a row, or updates it when it collides with an existing key.
pub(crate) struct SaveOrUpdateExecutor {
    descriptor: Arc<EntityDescriptor>,
    returns: ReturnShape,
    conflict_columns: Vec<String>,
}

impl SaveOrUpdateExecutor {
    pub(crate) fn new(
        descriptor: &Arc<EntityDescriptor>,
        builder: &ConditionQueryBuilder<'_>,
        method: &MethodShape,
    ) -> PersistenceResult<Self> {
        require_entity_param(builder, method)?;
        require_write_return(builder, method, false)?;

        // First unique key, else the identifier.
        let conflict_columns = descriptor
            .unique_constraints()
            .first()
            .map(|constraint| constraint.columns().to_vec())
            .unwrap_or_else(|| vec![descriptor.id_field().column().to_string()]);

        Ok(Self {
            descriptor: Arc::clone(descriptor),
            returns: method.return_shape().clone(),
            conflict_columns,
        })
    }
}

impl QueryExecutor for SaveOrUpdateExecutor {
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::SaveOrUpdate
    }

    fn execute(&self, ctx: &ExecutionContext<'_>, args: &mut [Arg]) -> PersistenceResult<Outcome> {
        let descriptor = self.descriptor.as_ref();
        let mut record = record_arg(args, descriptor)?.clone();
        ctx.enforcer().check_foreign(descriptor, &record)?;

        let insert = insert_columns(ctx, descriptor, &record)?;
        let update = descriptor
            .fields()
            .iter()
            .filter(|field| !field.is_identifier() && !field.is_read_only())
            .filter(|field| {
                !self
                    .conflict_columns
                    .iter()
                    .any(|column| column.eq_ignore_ascii_case(field.column()))
            })
            .map(|field| {
                let value = ctx
                    .conversion
                    .to_store(record.value(field.name()), Some(field))?;
                Ok(Column::new(field.column(), value))
            })
            .collect::<PersistenceResult<Vec<_>>>()?;

        let affected = ctx.store.save_or_update(&SaveOrUpdateQuery {
            table: descriptor.table_name().to_string(),
            insert_columns: insert,
            update_columns: update,
            conflict_columns: self.conflict_columns.clone(),
        })?;

        complete_insert(ctx, descriptor, &mut record, None, ChangeType::InsertOrUpdate)?;
        args[0] = Arg::Record(record);

        Ok(write_outcome(&self.returns, affected))
    }

    fn bindings(&self) -> ExecutorBindings {
        ExecutorBindings::new(ExecutorKind::SaveOrUpdate)
    }
}
