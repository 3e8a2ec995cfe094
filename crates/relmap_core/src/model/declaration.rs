//! Builder-style metadata declarations supplied by entity types.
//!
//! # Responsibility
//! - Capture table, field, constraint, index and audit metadata as plain data.
//!
//! # Invariants
//! - Builders never validate; the registry rejects inconsistent declarations.
//!
//! # See also
//! - docs/architecture/data-model.md

use super::{CascadePolicy, Entity, EntityRef};
use crate::conversion::Converter;
use crate::value::{DataType, Value};
use std::sync::Arc;

/// Identifier generation strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IdGeneration {
    /// Caller supplies the identifier.
    #[default]
    None,
    /// Store assigns an auto-increment identifier.
    Auto,
    /// Identifier is drawn from a named sequence.
    Sequence,
}

/// Complete mapping declaration of one entity type.
#[derive(Debug, Clone)]
pub struct EntityDeclaration {
    pub(crate) entity: EntityRef,
    pub(crate) table: Option<String>,
    pub(crate) fields: Vec<FieldDeclaration>,
    pub(crate) unique_constraints: Vec<UniqueDeclaration>,
    pub(crate) foreign_constraints: Vec<ForeignDeclaration>,
    pub(crate) indexes: Vec<IndexDeclaration>,
    pub(crate) audit: Option<AuditDeclaration>,
}

impl EntityDeclaration {
    pub fn of<E: Entity>() -> Self {
        Self {
            entity: EntityRef::of::<E>(),
            table: None,
            fields: Vec::new(),
            unique_constraints: Vec::new(),
            foreign_constraints: Vec::new(),
            indexes: Vec::new(),
            audit: None,
        }
    }

    pub fn table(mut self, name: impl Into<String>) -> Self {
        self.table = Some(name.into());
        self
    }

    /// Prepends the fields and constraints of a base declaration.
    ///
    /// The base table name is ignored; the base audit declaration is used only
    /// when this declaration has none.
    pub fn inherit(mut self, base: EntityDeclaration) -> Self {
        let EntityDeclaration {
            fields,
            unique_constraints,
            foreign_constraints,
            indexes,
            audit,
            ..
        } = base;
        self.fields.splice(0..0, fields);
        self.unique_constraints.splice(0..0, unique_constraints);
        self.foreign_constraints.splice(0..0, foreign_constraints);
        self.indexes.splice(0..0, indexes);
        if self.audit.is_none() {
            self.audit = audit;
        }
        self
    }

    pub fn field(mut self, field: FieldDeclaration) -> Self {
        self.fields.push(field);
        self
    }

    pub fn unique(mut self, constraint: UniqueDeclaration) -> Self {
        self.unique_constraints.push(constraint);
        self
    }

    pub fn foreign(mut self, constraint: ForeignDeclaration) -> Self {
        self.foreign_constraints.push(constraint);
        self
    }

    pub fn index(mut self, index: IndexDeclaration) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn audited(mut self, audit: AuditDeclaration) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn entity(&self) -> EntityRef {
        self.entity
    }
}

/// Mapping declaration of one field.
#[derive(Debug, Clone)]
pub struct FieldDeclaration {
    pub(crate) name: String,
    pub(crate) data_type: DataType,
    pub(crate) column: Option<String>,
    pub(crate) identifier: bool,
    pub(crate) generation: IdGeneration,
    pub(crate) sequence: Option<String>,
    pub(crate) read_only: bool,
    pub(crate) auto_fetch: bool,
    pub(crate) nullable: bool,
    pub(crate) length: Option<u32>,
    pub(crate) unique: Option<(String, Option<String>)>,
    pub(crate) indexed: bool,
    pub(crate) enum_values: Vec<String>,
    pub(crate) converter: Option<Arc<dyn Converter>>,
}

impl FieldDeclaration {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            column: None,
            identifier: false,
            generation: IdGeneration::None,
            sequence: None,
            read_only: false,
            auto_fetch: false,
            nullable: true,
            length: None,
            unique: None,
            indexed: false,
            enum_values: Vec::new(),
            converter: None,
        }
    }

    /// Overrides the derived column name.
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    /// Marks this field as the entity identifier.
    pub fn id(mut self, generation: IdGeneration) -> Self {
        self.identifier = true;
        self.generation = generation;
        self
    }

    /// Marks this field as a sequence-generated identifier.
    pub fn sequence(mut self, name: impl Into<String>) -> Self {
        self.identifier = true;
        self.generation = IdGeneration::Sequence;
        self.sequence = Some(name.into());
        self
    }

    /// Excludes this field from entity updates.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Re-reads this field from the store after insert.
    pub fn auto_fetch(mut self) -> Self {
        self.auto_fetch = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    /// Declares a single-field unique constraint.
    pub fn unique(mut self, name: impl Into<String>) -> Self {
        self.unique = Some((name.into(), None));
        self
    }

    pub fn unique_with_message(
        mut self,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        self.unique = Some((name.into(), Some(message.into())));
        self
    }

    /// Declares a single-field index with a derived name.
    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    pub fn enum_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_values = values.into_iter().map(Into::into).collect();
        self
    }

    /// Uses `converter` exclusively for this field.
    pub fn converter(mut self, converter: Arc<dyn Converter>) -> Self {
        self.converter = Some(converter);
        self
    }
}

/// Entity-level unique constraint declaration.
#[derive(Debug, Clone)]
pub struct UniqueDeclaration {
    pub(crate) name: String,
    pub(crate) fields: Vec<String>,
    pub(crate) message: Option<String>,
    pub(crate) validate: bool,
}

impl UniqueDeclaration {
    pub fn new<I, S>(name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            message: None,
            validate: true,
        }
    }

    /// Message template; `${field}` placeholders are replaced by field values.
    pub fn message(mut self, template: impl Into<String>) -> Self {
        self.message = Some(template.into());
        self
    }

    /// Leaves enforcement to the store.
    pub fn skip_validation(mut self) -> Self {
        self.validate = false;
        self
    }
}

/// Foreign constraint declaration, owned by the declaring entity.
#[derive(Debug, Clone)]
pub struct ForeignDeclaration {
    pub(crate) name: String,
    pub(crate) target: EntityRef,
    pub(crate) mappings: Vec<(String, String)>,
    pub(crate) owner_conditions: Vec<(String, Value)>,
    pub(crate) target_conditions: Vec<(String, Value)>,
    pub(crate) cascade: CascadePolicy,
    pub(crate) message: Option<String>,
    pub(crate) validate: bool,
    pub(crate) mapped_by: bool,
}

impl ForeignDeclaration {
    pub fn to<T: Entity>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: EntityRef::of::<T>(),
            mappings: Vec::new(),
            owner_conditions: Vec::new(),
            target_conditions: Vec::new(),
            cascade: CascadePolicy::default(),
            message: None,
            validate: true,
            mapped_by: false,
        }
    }

    /// Maps an owner field onto a target field.
    pub fn map(mut self, owner_field: impl Into<String>, target_field: impl Into<String>) -> Self {
        self.mappings.push((owner_field.into(), target_field.into()));
        self
    }

    /// Scopes the relation to owner rows where `field == value`.
    pub fn owner_condition(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.owner_conditions.push((field.into(), value.into()));
        self
    }

    /// Scopes the relation to target rows where `field == value`.
    pub fn target_condition(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.target_conditions.push((field.into(), value.into()));
        self
    }

    pub fn cascade(mut self, policy: CascadePolicy) -> Self {
        self.cascade = policy;
        self
    }

    pub fn message(mut self, template: impl Into<String>) -> Self {
        self.message = Some(template.into());
        self
    }

    pub fn skip_validation(mut self) -> Self {
        self.validate = false;
        self
    }

    /// Declares the non-owning side of the relation.
    pub fn mapped_by(mut self) -> Self {
        self.mapped_by = true;
        self
    }
}

/// Index declaration.
#[derive(Debug, Clone)]
pub struct IndexDeclaration {
    pub(crate) name: Option<String>,
    pub(crate) fields: Vec<String>,
}

impl IndexDeclaration {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: None,
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Audit shadow-table declaration.
#[derive(Debug, Clone)]
pub struct AuditDeclaration {
    pub(crate) table: Option<String>,
    pub(crate) id_column: String,
    pub(crate) type_column: String,
    pub(crate) time_column: String,
    pub(crate) changed_by_column: String,
    pub(crate) remaps: Vec<(String, String)>,
}

impl Default for AuditDeclaration {
    fn default() -> Self {
        Self {
            table: None,
            id_column: "AUDIT_ID".to_string(),
            type_column: "AUDIT_CHANGE_TYPE".to_string(),
            time_column: "AUDIT_CHANGE_TIME".to_string(),
            changed_by_column: "AUDIT_CHANGED_BY".to_string(),
            remaps: Vec::new(),
        }
    }
}

impl AuditDeclaration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the default `AUDIT_<TABLE>` name.
    pub fn table(mut self, name: impl Into<String>) -> Self {
        self.table = Some(name.into());
        self
    }

    pub fn columns(
        mut self,
        id: impl Into<String>,
        change_type: impl Into<String>,
        time: impl Into<String>,
        changed_by: impl Into<String>,
    ) -> Self {
        self.id_column = id.into();
        self.type_column = change_type.into();
        self.time_column = time.into();
        self.changed_by_column = changed_by.into();
        self
    }

    /// Stores `field` under `column` in the shadow table.
    pub fn remap(mut self, field: impl Into<String>, column: impl Into<String>) -> Self {
        self.remaps.push((field.into(), column.into()));
        self
    }
}
