//! Engine-side enforcement of unique, foreign and child constraints.
//!
//! # Responsibility
//! - Reject writes that would duplicate a unique key.
//! - Reject writes referencing missing parents the store does not check itself.
//! - Cascade or block parent deletes according to child constraints.
//!
//! # Invariants
//! - Unique checks skip constraints with any null participant.
//! - Foreign checks skip constraints whose mapped values are all null.
//! - Cascaded child deletes go through the child's own repository.
//!
//! # See also
//! - docs/architecture/constraints.md

use crate::conversion::ConversionService;
use crate::error::{PersistenceError, PersistenceResult};
use crate::model::{
    CascadePolicy, ChildConstraint, EntityDescriptor, EntityRef, FieldDescriptor,
    StaticCondition,
};
use crate::query::{ChildrenQuery, Condition, CountQuery, Operator};
use crate::registry::EntityRegistry;
use crate::store::DataStore;
use crate::value::{Record, Value};
use log::debug;

/// Deletes one child row through the child's repository.
pub(crate) trait CascadeDelete {
    fn delete_child(&self, child: EntityRef, id: Value) -> PersistenceResult<()>;
}

pub(crate) struct ConstraintEnforcer<'a> {
    store: &'a dyn DataStore,
    conversion: &'a ConversionService,
    registry: &'a EntityRegistry,
}

impl<'a> ConstraintEnforcer<'a> {
    pub(crate) fn new(
        store: &'a dyn DataStore,
        conversion: &'a ConversionService,
        registry: &'a EntityRegistry,
    ) -> Self {
        Self {
            store,
            conversion,
            registry,
        }
    }

    /// Fails when another row already holds any validated unique key of `record`.
    ///
    /// `exclude_id` skips the row being updated.
    pub(crate) fn check_unique(
        &self,
        descriptor: &EntityDescriptor,
        record: &Record,
        exclude_id: Option<&Value>,
    ) -> PersistenceResult<()> {
        for constraint in descriptor
            .unique_constraints()
            .iter()
            .filter(|constraint| constraint.is_validated())
        {
            if constraint
                .fields()
                .iter()
                .any(|field| record.value(field).is_null())
            {
                continue;
            }

            let mut conditions = constraint
                .fields()
                .iter()
                .map(|field| {
                    let descriptor_field = descriptor.field(field);
                    let column = descriptor_field.map_or(field.as_str(), FieldDescriptor::column);
                    let value = self.conversion.to_store(record.value(field), descriptor_field)?;
                    Ok(Condition::eq(column, value))
                })
                .collect::<PersistenceResult<Vec<_>>>()?;
            if let Some(id) = exclude_id.filter(|id| !id.is_null()) {
                let id_field = descriptor.id_field();
                conditions.push(Condition::new(
                    id_field.column(),
                    Operator::Ne,
                    self.conversion.to_store(id, Some(id_field))?,
                ));
            }

            let count = self.store.count(&CountQuery {
                table: descriptor.table_name().to_string(),
                conditions,
            })?;
            if count > 0 {
                debug!(
                    "event=constraint_check module=constraint status=violation kind=unique entity={} constraint={}",
                    descriptor.entity_name(),
                    constraint.name()
                );
                return Err(PersistenceError::UniqueConstraintViolation {
                    constraint: constraint.name().to_string(),
                    message: constraint.violation_message(record),
                });
            }
        }
        Ok(())
    }

    /// Fails when `record` references a parent row that does not exist.
    ///
    /// Unconditioned constraints are left to stores that enforce foreign keys.
    pub(crate) fn check_foreign(
        &self,
        descriptor: &EntityDescriptor,
        record: &Record,
    ) -> PersistenceResult<()> {
        let explicit = self.store.explicit_foreign_check_required();
        for constraint in descriptor
            .owned_foreign_constraints()
            .filter(|constraint| constraint.is_validated())
            .filter(|constraint| explicit || constraint.has_conditions())
        {
            if !self.owner_conditions_match(descriptor, constraint.owner_conditions(), record)? {
                continue;
            }
            if constraint
                .mappings()
                .iter()
                .all(|mapping| record.value(&mapping.owner_field).is_null())
            {
                continue;
            }

            let target = self.registry.get(constraint.target()).ok_or_else(|| {
                PersistenceError::mapping(
                    descriptor.entity_name(),
                    format!(
                        "target `{}` of foreign constraint `{}` is not registered",
                        constraint.target().simple_name(),
                        constraint.name()
                    ),
                )
            })?;

            let mut conditions = Vec::new();
            for mapping in constraint.mappings() {
                let value = self.conversion.to_store(
                    record.value(&mapping.owner_field),
                    target.field(&mapping.target_field),
                )?;
                conditions.push(Condition::eq(mapping.target_column.clone(), value));
            }
            conditions.extend(self.static_conditions(&target, constraint.target_conditions())?);

            let count = self.store.count(&CountQuery {
                table: constraint.target_table().to_string(),
                conditions,
            })?;
            if count <= 0 {
                debug!(
                    "event=constraint_check module=constraint status=violation kind=foreign entity={} constraint={}",
                    descriptor.entity_name(),
                    constraint.name()
                );
                return Err(PersistenceError::ForeignConstraintViolation {
                    constraint: constraint.name().to_string(),
                    message: constraint.violation_message(record),
                });
            }
        }
        Ok(())
    }

    fn owner_conditions_match(
        &self,
        descriptor: &EntityDescriptor,
        conditions: &[StaticCondition],
        record: &Record,
    ) -> PersistenceResult<bool> {
        for condition in conditions {
            let field = descriptor.field(&condition.field);
            let expected = self.conversion.to_store(&condition.value, field)?;
            let actual = self.conversion.to_store(record.value(&condition.field), field)?;
            if expected != actual {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn static_conditions(
        &self,
        descriptor: &EntityDescriptor,
        conditions: &[StaticCondition],
    ) -> PersistenceResult<Vec<Condition>> {
        conditions
            .iter()
            .map(|condition| {
                let value = self
                    .conversion
                    .to_store(&condition.value, descriptor.field(&condition.field))?;
                Ok(Condition::eq(condition.column.clone(), value))
            })
            .collect()
    }

    /// Applies every child constraint of `descriptor` to the parent rows
    /// matching `parent_conditions`, before those rows are deleted.
    pub(crate) fn process_children(
        &self,
        descriptor: &EntityDescriptor,
        parent_conditions: &[Condition],
        cascade: &dyn CascadeDelete,
    ) -> PersistenceResult<()> {
        let explicit = self.store.explicit_foreign_check_required();
        for child in descriptor.child_constraints() {
            // Unconditioned relations are declared natively when the store
            // enforces foreign keys.
            if !explicit && child.child_conditions().is_empty() {
                continue;
            }
            self.process_child(descriptor, &child, parent_conditions, cascade)?;
        }
        Ok(())
    }

    fn process_child(
        &self,
        parent: &EntityDescriptor,
        child: &ChildConstraint,
        parent_conditions: &[Condition],
        cascade: &dyn CascadeDelete,
    ) -> PersistenceResult<()> {
        let child_descriptor = self.registry.get(child.child()).ok_or_else(|| {
            PersistenceError::mapping(
                parent.entity_name(),
                format!("child entity `{}` is not registered", child.child().simple_name()),
            )
        })?;

        let query = ChildrenQuery {
            child_table: child.child_table().to_string(),
            child_id_column: child.child_id_column().to_string(),
            mappings: child
                .mappings()
                .iter()
                .map(|mapping| (mapping.owner_column.clone(), mapping.target_column.clone()))
                .collect(),
            child_conditions: self.static_conditions(&child_descriptor, child.child_conditions())?,
            parent_table: parent.table_name().to_string(),
            parent_conditions: parent_conditions.to_vec(),
        };

        match child.cascade() {
            CascadePolicy::DeleteWithParent => {
                let ids = self.store.fetch_children_ids(&query)?;
                debug!(
                    "event=cascade_delete module=constraint status=start parent={} child={} rows={}",
                    parent.entity_name(),
                    child.child().simple_name(),
                    ids.len()
                );
                for id in ids {
                    let id = self
                        .conversion
                        .to_domain(&id, child_descriptor.id_field())?;
                    cascade.delete_child(child.child(), id)?;
                }
                Ok(())
            }
            CascadePolicy::BlockIfChildrenExist => {
                if self.store.children_exist(&query)? {
                    return Err(PersistenceError::ChildConstraintViolation {
                        constraint: child.name().to_string(),
                        message: format!(
                            "Found child items of type '{}'",
                            child.child().simple_name()
                        ),
                    });
                }
                Ok(())
            }
        }
    }
}
