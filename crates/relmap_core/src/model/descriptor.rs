//! Validated entity and field descriptors.
//!
//! # Responsibility
//! - Expose the mapping of one entity type to its table, as built by the registry.
//!
//! # Invariants
//! - Field names and column names (case-insensitive) are unique per entity.
//! - Exactly one field is the identifier.
//! - Only child constraints change after publication.
//!
//! # See also
//! - docs/architecture/data-model.md

use super::{
    AuditDescriptor, ChildConstraint, EntityRef, ForeignConstraint, IdGeneration,
    IndexDescriptor, UniqueConstraint,
};
use crate::conversion::Converter;
use crate::value::DataType;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Mapping of one domain field onto one store column.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub(crate) name: String,
    pub(crate) column: String,
    pub(crate) data_type: DataType,
    pub(crate) identifier: bool,
    pub(crate) generation: IdGeneration,
    pub(crate) sequence: Option<String>,
    pub(crate) read_only: bool,
    pub(crate) auto_fetch: bool,
    pub(crate) nullable: bool,
    pub(crate) length: Option<u32>,
    pub(crate) enum_values: Vec<String>,
    pub(crate) converter: Option<Arc<dyn Converter>>,
    pub(crate) foreign_constraint: Option<String>,
    pub(crate) override_name: Option<String>,
}

impl FieldDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn is_identifier(&self) -> bool {
        self.identifier
    }

    pub fn generation(&self) -> IdGeneration {
        self.generation
    }

    pub fn sequence_name(&self) -> Option<&str> {
        self.sequence.as_deref()
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn is_auto_fetch(&self) -> bool {
        self.auto_fetch
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn length(&self) -> Option<u32> {
        self.length
    }

    pub fn enum_values(&self) -> &[String] {
        &self.enum_values
    }

    pub fn converter(&self) -> Option<&Arc<dyn Converter>> {
        self.converter.as_ref()
    }

    /// Name of the foreign constraint this field participates in, if any.
    pub fn foreign_constraint(&self) -> Option<&str> {
        self.foreign_constraint.as_deref()
    }

    pub fn override_name(&self) -> Option<&str> {
        self.override_name.as_deref()
    }

    /// Column holding this field in the audit shadow table.
    pub fn audit_column(&self) -> &str {
        self.override_name.as_deref().unwrap_or(&self.column)
    }
}

pub(crate) struct EntityParts {
    pub(crate) entity: EntityRef,
    pub(crate) table: String,
    pub(crate) fields: Vec<FieldDescriptor>,
    pub(crate) id_index: usize,
    pub(crate) unique_constraints: Vec<UniqueConstraint>,
    pub(crate) foreign_constraints: Vec<ForeignConstraint>,
    pub(crate) indexes: Vec<IndexDescriptor>,
    pub(crate) audit: Option<AuditDescriptor>,
}

/// Validated mapping of one entity type.
#[derive(Debug)]
pub struct EntityDescriptor {
    entity: EntityRef,
    table: String,
    fields: Vec<FieldDescriptor>,
    field_index: HashMap<String, usize>,
    column_index: HashMap<String, usize>,
    id_index: usize,
    unique_constraints: Vec<UniqueConstraint>,
    foreign_constraints: Vec<ForeignConstraint>,
    indexes: Vec<IndexDescriptor>,
    audit: Option<AuditDescriptor>,
    child_constraints: RwLock<Vec<ChildConstraint>>,
}

impl EntityDescriptor {
    pub(crate) fn from_parts(parts: EntityParts) -> Self {
        let field_index = parts
            .fields
            .iter()
            .enumerate()
            .map(|(position, field)| (field.name.clone(), position))
            .collect();
        let column_index = parts
            .fields
            .iter()
            .enumerate()
            .map(|(position, field)| (field.column.to_ascii_uppercase(), position))
            .collect();

        Self {
            entity: parts.entity,
            table: parts.table,
            fields: parts.fields,
            field_index,
            column_index,
            id_index: parts.id_index,
            unique_constraints: parts.unique_constraints,
            foreign_constraints: parts.foreign_constraints,
            indexes: parts.indexes,
            audit: parts.audit,
            child_constraints: RwLock::new(Vec::new()),
        }
    }

    pub fn entity(&self) -> EntityRef {
        self.entity
    }

    /// Simple type name of the entity.
    pub fn entity_name(&self) -> &'static str {
        self.entity.simple_name()
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.field_index
            .get(name)
            .map(|position| &self.fields[*position])
    }

    /// Looks up a field by column, ignoring case.
    pub fn field_by_column(&self, column: &str) -> Option<&FieldDescriptor> {
        self.column_index
            .get(&column.to_ascii_uppercase())
            .map(|position| &self.fields[*position])
    }

    pub fn id_field(&self) -> &FieldDescriptor {
        &self.fields[self.id_index]
    }

    /// Fields stored in this entity's own table.
    pub fn table_owned_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter()
    }

    pub fn columns(&self) -> Vec<&str> {
        self.fields.iter().map(FieldDescriptor::column).collect()
    }

    pub fn unique_constraints(&self) -> &[UniqueConstraint] {
        &self.unique_constraints
    }

    pub fn foreign_constraints(&self) -> &[ForeignConstraint] {
        &self.foreign_constraints
    }

    /// Foreign constraints for which this entity holds the key.
    pub fn owned_foreign_constraints(&self) -> impl Iterator<Item = &ForeignConstraint> {
        self.foreign_constraints
            .iter()
            .filter(|constraint| !constraint.mapped_by)
    }

    pub fn indexes(&self) -> &[IndexDescriptor] {
        &self.indexes
    }

    pub fn audit(&self) -> Option<&AuditDescriptor> {
        self.audit.as_ref()
    }

    /// Snapshot of the child constraints targeting this entity.
    pub fn child_constraints(&self) -> Vec<ChildConstraint> {
        match self.child_constraints.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub(crate) fn add_child_constraint(&self, constraint: ChildConstraint) {
        let mut guard = match self.child_constraints.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let exists = guard
            .iter()
            .any(|existing| existing.name == constraint.name && existing.child == constraint.child);
        if !exists {
            guard.push(constraint);
        }
    }
}
