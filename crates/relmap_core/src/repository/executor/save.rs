use super::{
    id_condition, record_arg, require_entity_param, require_write_return, write_outcome,
    ExecutionContext, ExecutorBindings, QueryExecutor,
};
use crate::audit::{self, ChangeType};
use crate::error::PersistenceResult;
use crate::model::{EntityDescriptor, IdGeneration};
use crate::query::{Column, Condition, ConditionQueryBuilder, FinderQuery, ResultColumn, SaveQuery};
use crate::repository::method::{Arg, ExecutorKind, MethodShape, Outcome, ReturnShape};
use crate::value::{Record, StoreValue, Value};
use log::warn;
use std::sync::Arc;

pub(crate) struct SaveExecutor {
    descriptor: Arc<EntityDescriptor>,
    returns: ReturnShape,
}

impl SaveExecutor {
    pub(crate) fn new(
        descriptor: &Arc<EntityDescriptor>,
        builder: &ConditionQueryBuilder<'_>,
        method: &MethodShape,
    ) -> PersistenceResult<Self> {
        require_entity_param(builder, method)?;
        require_write_return(builder, method, false)?;
        Ok(Self {
            descriptor: Arc::clone(descriptor),
            returns: method.return_shape().clone(),
        })
    }
}

impl QueryExecutor for SaveExecutor {
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Save
    }

    fn execute(&self, ctx: &ExecutionContext<'_>, args: &mut [Arg]) -> PersistenceResult<Outcome> {
        let descriptor = self.descriptor.as_ref();
        let mut record = record_arg(args, descriptor)?.clone();

        let enforcer = ctx.enforcer();
        enforcer.check_unique(descriptor, &record, None)?;
        enforcer.check_foreign(descriptor, &record)?;

        let columns = insert_columns(ctx, descriptor, &record)?;
        let result = ctx.store.save(&SaveQuery {
            table: descriptor.table_name().to_string(),
            columns,
        })?;

        let id_field = descriptor.id_field();
        let generated = match id_field.generation() {
            IdGeneration::Auto | IdGeneration::Sequence
                if record.value(id_field.name()).is_null() =>
            {
                result.generated_id
            }
            _ => None,
        };
        complete_insert(ctx, descriptor, &mut record, generated, ChangeType::Insert)?;
        args[0] = Arg::Record(record);

        Ok(write_outcome(&self.returns, result.affected))
    }

    fn bindings(&self) -> ExecutorBindings {
        ExecutorBindings::new(ExecutorKind::Save)
    }
}

/// Insert columns of `record`; missing generated identifiers are left to the store.
pub(super) fn insert_columns(
    ctx: &ExecutionContext<'_>,
    descriptor: &EntityDescriptor,
    record: &Record,
) -> PersistenceResult<Vec<Column>> {
    let mut columns = Vec::with_capacity(descriptor.fields().len());
    for field in descriptor.fields() {
        if field.is_identifier() && record.value(field.name()).is_null() {
            match (field.generation(), field.sequence_name()) {
                (IdGeneration::Auto, _) => continue,
                (IdGeneration::Sequence, Some(sequence)) => {
                    columns.push(Column::from_sequence(field.column(), sequence));
                    continue;
                }
                _ => {}
            }
        }
        let value = record.value(field.name());
        if field.is_auto_fetch() && value.is_null() {
            continue;
        }
        columns.push(Column::new(
            field.column(),
            ctx.conversion.to_store(value, Some(field))?,
        ));
    }
    Ok(columns)
}

/// Settles the identifier of an inserted row, re-reads auto-fetch fields and
/// records the audit entry.
pub(super) fn complete_insert(
    ctx: &ExecutionContext<'_>,
    descriptor: &EntityDescriptor,
    record: &mut Record,
    generated: Option<StoreValue>,
    change: ChangeType,
) -> PersistenceResult<()> {
    let id_field = descriptor.id_field();
    let id = match generated {
        Some(value) if value != StoreValue::Null => {
            Some(ctx.conversion.to_domain(&value, id_field)?)
        }
        _ => None,
    };
    let id = match id {
        Some(id) => Some(id),
        None if !record.value(id_field.name()).is_null() => {
            Some(record.value(id_field.name()).clone())
        }
        None => refetch_id(ctx, descriptor, record)?,
    };

    let Some(id) = id else {
        warn!(
            "event=audit_skip module=repository status=skip entity={} reason=unknown_id",
            descriptor.entity_name()
        );
        return Ok(());
    };
    record.set(id_field.name(), id.clone());

    fetch_auto_fields(ctx, descriptor, record, &id)?;
    audit::record_change(
        ctx.store,
        ctx.persistence,
        descriptor,
        change,
        vec![id_condition(ctx, descriptor, &id)?],
    )?;
    Ok(())
}

/// Identifier of the row holding the first fully populated unique key of `record`.
fn refetch_id(
    ctx: &ExecutionContext<'_>,
    descriptor: &EntityDescriptor,
    record: &Record,
) -> PersistenceResult<Option<Value>> {
    let Some(constraint) = descriptor.unique_constraints().iter().find(|constraint| {
        constraint
            .fields()
            .iter()
            .all(|field| !record.value(field).is_null())
    }) else {
        return Ok(None);
    };

    let conditions = constraint
        .fields()
        .iter()
        .zip(constraint.columns())
        .map(|(field, column)| {
            let value = ctx
                .conversion
                .to_store(record.value(field), descriptor.field(field))?;
            Ok(Condition::eq(column.clone(), value))
        })
        .collect::<PersistenceResult<Vec<_>>>()?;

    let id_field = descriptor.id_field();
    let rows = ctx.store.find(&FinderQuery {
        table: descriptor.table_name().to_string(),
        results: vec![ResultColumn {
            column: id_field.column().to_string(),
            key: id_field.name().to_string(),
        }],
        conditions,
        order_by: Vec::new(),
    })?;
    rows.first()
        .and_then(|row| row.get(id_field.name()))
        .map(|value| ctx.conversion.to_domain(value, id_field))
        .transpose()
}

fn fetch_auto_fields(
    ctx: &ExecutionContext<'_>,
    descriptor: &EntityDescriptor,
    record: &mut Record,
    id: &Value,
) -> PersistenceResult<()> {
    let fields = descriptor
        .fields()
        .iter()
        .filter(|field| field.is_auto_fetch() && !field.is_identifier())
        .collect::<Vec<_>>();
    if fields.is_empty() {
        return Ok(());
    }

    let rows = ctx.store.find(&FinderQuery {
        table: descriptor.table_name().to_string(),
        results: fields
            .iter()
            .map(|field| ResultColumn {
                column: field.column().to_string(),
                key: field.name().to_string(),
            })
            .collect(),
        conditions: vec![id_condition(ctx, descriptor, id)?],
        order_by: Vec::new(),
    })?;
    if let Some(row) = rows.into_iter().next() {
        for field in fields {
            let value = row.get(field.name()).unwrap_or(&StoreValue::Null);
            record.set(field.name(), ctx.conversion.to_domain(value, field)?);
        }
    }
    Ok(())
}
