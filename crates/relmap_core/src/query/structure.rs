//! Structural (DDL) descriptions handed to the data store.

use crate::model::{
    AuditDescriptor, CascadePolicy, FieldDescriptor, ForeignConstraint, IdGeneration,
    UniqueConstraint,
};
use crate::value::DataType;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnStructure {
    pub name: String,
    pub data_type: DataType,
    pub length: Option<u32>,
    pub nullable: bool,
    pub identifier: bool,
    pub auto_increment: bool,
    pub sequence: Option<String>,
}

impl ColumnStructure {
    fn from_field(field: &FieldDescriptor) -> Self {
        Self {
            name: field.column().to_string(),
            data_type: field.data_type(),
            length: field.length(),
            nullable: field.is_nullable() && !field.is_identifier(),
            identifier: field.is_identifier(),
            auto_increment: field.is_identifier() && field.generation() == IdGeneration::Auto,
            sequence: field.sequence_name().map(str::to_string),
        }
    }

    fn plain(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            length: None,
            nullable,
            identifier: false,
            auto_increment: false,
            sequence: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueStructure {
    pub name: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignStructure {
    pub name: String,
    pub columns: Vec<String>,
    pub target_table: String,
    pub target_columns: Vec<String>,
    pub cascade: CascadePolicy,
}

/// Table to create, with its native constraints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTableQuery {
    pub table: String,
    pub columns: Vec<ColumnStructure>,
    pub unique_constraints: Vec<UniqueStructure>,
    /// Unconditioned, owned foreign constraints; the store decides whether to
    /// declare them natively.
    pub foreign_constraints: Vec<ForeignStructure>,
}

impl CreateTableQuery {
    pub fn for_entity(
        entity_name: &str,
        table: &str,
        fields: &[FieldDescriptor],
        unique_constraints: &[UniqueConstraint],
        foreign_constraints: &[ForeignConstraint],
    ) -> Self {
        let prefix = entity_name.to_ascii_uppercase();
        Self {
            table: table.to_string(),
            columns: fields.iter().map(ColumnStructure::from_field).collect(),
            unique_constraints: unique_constraints
                .iter()
                .map(|constraint| UniqueStructure {
                    name: format!("UQ_{prefix}_{}", constraint.name().to_ascii_uppercase()),
                    columns: constraint.columns().to_vec(),
                })
                .collect(),
            foreign_constraints: foreign_constraints
                .iter()
                .filter(|constraint| !constraint.is_mapped_by() && !constraint.has_conditions())
                .map(|constraint| ForeignStructure {
                    name: format!("FK_{prefix}_{}", constraint.name().to_ascii_uppercase()),
                    columns: constraint
                        .mappings()
                        .iter()
                        .map(|mapping| mapping.owner_column.clone())
                        .collect(),
                    target_table: constraint.target_table().to_string(),
                    target_columns: constraint
                        .mappings()
                        .iter()
                        .map(|mapping| mapping.target_column.clone())
                        .collect(),
                    cascade: constraint.cascade(),
                })
                .collect(),
        }
    }

    /// Shadow table: bookkeeping columns followed by every entity column.
    pub fn for_audit(audit: &AuditDescriptor, fields: &[FieldDescriptor]) -> Self {
        let mut columns = vec![
            ColumnStructure {
                identifier: true,
                auto_increment: true,
                ..ColumnStructure::plain(audit.id_column(), DataType::Long, false)
            },
            ColumnStructure::plain(audit.type_column(), DataType::String, false),
            ColumnStructure::plain(audit.time_column(), DataType::DateTime, false),
            ColumnStructure::plain(audit.changed_by_column(), DataType::String, true),
        ];
        columns.extend(fields.iter().map(|field| ColumnStructure {
            length: field.length(),
            ..ColumnStructure::plain(field.audit_column(), field.data_type(), true)
        }));

        Self {
            table: audit.table().to_string(),
            columns,
            unique_constraints: Vec::new(),
            foreign_constraints: Vec::new(),
        }
    }
}

impl Display for CreateTableQuery {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let columns = self
            .columns
            .iter()
            .map(|column| column.name.as_str())
            .collect::<Vec<_>>()
            .join(",");
        write!(f, "CreateTableQuery[table={} columns={}]", self.table, columns)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateIndexQuery {
    pub table: String,
    pub name: String,
    pub columns: Vec<String>,
}

impl Display for CreateIndexQuery {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CreateIndexQuery[table={} name={} columns={}]",
            self.table,
            self.name,
            self.columns.join(",")
        )
    }
}
