use super::{
    id_condition, record_arg, require_write_return, resolve_conditions, write_outcome,
    ExecutionContext, ExecutorBindings, QueryExecutor,
};
use crate::audit::{self, ChangeType};
use crate::error::{PersistenceError, PersistenceResult};
use crate::model::EntityDescriptor;
use crate::query::{
    Column, ColumnBinding, ConditionBinding, ConditionQueryBuilder, UpdateQuery,
};
use crate::repository::method::{Arg, ExecutorKind, MethodShape, Outcome, ParamRole, ReturnShape};
use std::sync::Arc;

enum UpdateMode {
    /// Every writable field of the entity argument, matched by identifier.
    Entity,
    /// Marked columns set on rows matching marked conditions.
    Conditional {
        columns: Vec<ColumnBinding>,
        conditions: Vec<ConditionBinding>,
    },
}

pub(crate) struct UpdateExecutor {
    descriptor: Arc<EntityDescriptor>,
    returns: ReturnShape,
    mode: UpdateMode,
}

impl UpdateExecutor {
    pub(crate) fn new(
        descriptor: &Arc<EntityDescriptor>,
        builder: &ConditionQueryBuilder<'_>,
        method: &MethodShape,
    ) -> PersistenceResult<Self> {
        require_write_return(builder, method, true)?;

        let mode = if matches!(method.params(), [ParamRole::Entity]) {
            UpdateMode::Entity
        } else {
            let bindings = builder.from_markers(true)?.ok_or_else(|| {
                builder.invalid(
                    "expected an entity parameter or marked column and condition parameters",
                )
            })?;
            if bindings.columns.is_empty() {
                return Err(builder.invalid("no column parameter is marked"));
            }
            if bindings.conditions.is_empty() {
                return Err(builder.invalid("no condition parameter is marked"));
            }
            for binding in &bindings.columns {
                let field = descriptor.field(&binding.field);
                if field.is_some_and(|field| field.is_identifier() || field.is_read_only()) {
                    return Err(builder.invalid(format!(
                        "field `{}` is an identifier or read-only and cannot be updated",
                        binding.field
                    )));
                }
            }
            UpdateMode::Conditional {
                columns: bindings.columns,
                conditions: bindings.conditions,
            }
        };

        Ok(Self {
            descriptor: Arc::clone(descriptor),
            returns: method.return_shape().clone(),
            mode,
        })
    }

    fn entity_query(
        &self,
        ctx: &ExecutionContext<'_>,
        args: &[Arg],
    ) -> PersistenceResult<UpdateQuery> {
        let descriptor = self.descriptor.as_ref();
        let record = record_arg(args, descriptor)?;
        let id = record.value(descriptor.id_field().name());
        if id.is_null() {
            return Err(PersistenceError::DataConversion(format!(
                "cannot update `{}` without an identifier",
                descriptor.entity_name()
            )));
        }

        let enforcer = ctx.enforcer();
        enforcer.check_unique(descriptor, record, Some(id))?;
        enforcer.check_foreign(descriptor, record)?;

        let columns = descriptor
            .fields()
            .iter()
            .filter(|field| !field.is_identifier() && !field.is_read_only())
            .map(|field| {
                let value = ctx
                    .conversion
                    .to_store(record.value(field.name()), Some(field))?;
                Ok(Column::new(field.column(), value))
            })
            .collect::<PersistenceResult<Vec<_>>>()?;

        Ok(UpdateQuery {
            table: descriptor.table_name().to_string(),
            columns,
            conditions: vec![id_condition(ctx, descriptor, id)?],
        })
    }
}

impl QueryExecutor for UpdateExecutor {
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Update
    }

    fn execute(&self, ctx: &ExecutionContext<'_>, args: &mut [Arg]) -> PersistenceResult<Outcome> {
        let descriptor = self.descriptor.as_ref();
        let query = match &self.mode {
            UpdateMode::Entity => self.entity_query(ctx, args)?,
            UpdateMode::Conditional {
                columns,
                conditions,
            } => UpdateQuery {
                table: descriptor.table_name().to_string(),
                columns: columns
                    .iter()
                    .map(|binding| binding.resolve(descriptor, ctx.conversion, args))
                    .collect::<PersistenceResult<Vec<_>>>()?,
                conditions: resolve_conditions(ctx, descriptor, conditions, args)?,
            },
        };

        let affected = ctx.store.update(&query)?;
        if affected > 0 {
            audit::record_change(
                ctx.store,
                ctx.persistence,
                descriptor,
                ChangeType::Update,
                query.conditions,
            )?;
        }
        Ok(write_outcome(&self.returns, affected))
    }

    fn bindings(&self) -> ExecutorBindings {
        let mut bindings = ExecutorBindings::new(ExecutorKind::Update);
        if let UpdateMode::Conditional {
            columns,
            conditions,
        } = &self.mode
        {
            bindings.columns = columns.clone();
            bindings.conditions = conditions.clone();
        }
        bindings
    }
}
