use super::{resolve_conditions, ExecutionContext, ExecutorBindings, QueryExecutor};
use crate::error::{PersistenceError, PersistenceResult};
use crate::model::EntityDescriptor;
use crate::query::{
    ConditionBinding, ConditionQueryBuilder, FinderQuery, ResultBinding, ResultColumn,
};
use crate::repository::method::{
    Arg, ExecutorKind, MethodShape, Outcome, ResultKind, ReturnShape,
};
use crate::store::StoreRow;
use crate::value::{Record, StoreValue, Value};
use std::sync::Arc;

pub(crate) struct FinderExecutor {
    descriptor: Arc<EntityDescriptor>,
    single: bool,
    kind: ResultKind,
    conditions: Vec<ConditionBinding>,
    results: Vec<ResultBinding>,
}

impl FinderExecutor {
    pub(crate) fn new(
        descriptor: &Arc<EntityDescriptor>,
        builder: &ConditionQueryBuilder<'_>,
        method: &MethodShape,
    ) -> PersistenceResult<Self> {
        if method.params().is_empty() {
            return Err(builder.invalid("finder methods take at least one parameter"));
        }
        let (single, kind) = match method.return_shape() {
            ReturnShape::Single(kind) => (true, kind.clone()),
            ReturnShape::Many(kind) => (false, kind.clone()),
            other => {
                return Err(builder.invalid(format!("unsupported return shape {other:?}")));
            }
        };

        Ok(Self {
            descriptor: Arc::clone(descriptor),
            single,
            conditions: builder.resolve_conditions(false)?,
            results: builder.result_bindings(&kind)?,
            kind,
        })
    }

    fn convert_value(
        &self,
        ctx: &ExecutionContext<'_>,
        binding: &ResultBinding,
        row: &StoreRow,
    ) -> PersistenceResult<Value> {
        let value = row.get(&binding.key).unwrap_or(&StoreValue::Null);
        match self.descriptor.field(&binding.field) {
            Some(field) => ctx.conversion.to_domain(value, field),
            None => Err(PersistenceError::DataConversion(format!(
                "result field `{}` does not exist on entity `{}`",
                binding.field,
                self.descriptor.entity_name()
            ))),
        }
    }

    fn convert_record(
        &self,
        ctx: &ExecutionContext<'_>,
        row: &StoreRow,
    ) -> PersistenceResult<Record> {
        let mut record = Record::new();
        for binding in &self.results {
            record.set(binding.key.as_str(), self.convert_value(ctx, binding, row)?);
        }
        Ok(record)
    }
}

impl QueryExecutor for FinderExecutor {
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Finder
    }

    fn execute(&self, ctx: &ExecutionContext<'_>, args: &mut [Arg]) -> PersistenceResult<Outcome> {
        let descriptor = self.descriptor.as_ref();
        let query = FinderQuery {
            table: descriptor.table_name().to_string(),
            results: self
                .results
                .iter()
                .map(|binding| ResultColumn {
                    column: binding.column.clone(),
                    key: binding.key.clone(),
                })
                .collect(),
            conditions: resolve_conditions(ctx, descriptor, &self.conditions, args)?,
            order_by: Vec::new(),
        };
        let rows = ctx.store.find(&query)?;
        if self.single && rows.len() > 1 {
            return Err(PersistenceError::execution(
                format!("multiple rows found ({}) for a single-result finder", rows.len()),
                &query,
            ));
        }

        match &self.kind {
            ResultKind::Field(_) => {
                let binding = &self.results[0];
                let values = rows
                    .iter()
                    .map(|row| self.convert_value(ctx, binding, row))
                    .collect::<PersistenceResult<Vec<_>>>()?;
                Ok(if self.single {
                    Outcome::Value(values.into_iter().next())
                } else {
                    Outcome::Values(values)
                })
            }
            ResultKind::Entity | ResultKind::Structured(_) => {
                let records = rows
                    .iter()
                    .map(|row| self.convert_record(ctx, row))
                    .collect::<PersistenceResult<Vec<_>>>()?;
                Ok(if self.single {
                    Outcome::Record(records.into_iter().next())
                } else {
                    Outcome::Records(records)
                })
            }
        }
    }

    fn bindings(&self) -> ExecutorBindings {
        let mut bindings = ExecutorBindings::new(ExecutorKind::Finder);
        bindings.conditions = self.conditions.clone();
        bindings.results = self.results.clone();
        bindings
    }
}
