use super::{Column, Condition};
use std::fmt::{Display, Formatter};

fn column_names(columns: &[Column]) -> String {
    columns
        .iter()
        .map(|column| column.name.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

fn condition_list(conditions: &[Condition]) -> String {
    if conditions.is_empty() {
        return "-".to_string();
    }
    conditions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Insert of one row.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveQuery {
    pub table: String,
    pub columns: Vec<Column>,
}

impl Display for SaveQuery {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SaveQuery[table={} columns={}]",
            self.table,
            column_names(&self.columns)
        )
    }
}

/// Update of matching rows.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateQuery {
    pub table: String,
    pub columns: Vec<Column>,
    pub conditions: Vec<Condition>,
}

impl Display for UpdateQuery {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "UpdateQuery[table={} columns={} conditions={}]",
            self.table,
            column_names(&self.columns),
            condition_list(&self.conditions)
        )
    }
}

/// Delete of matching rows; no conditions deletes every row.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteQuery {
    pub table: String,
    pub conditions: Vec<Condition>,
}

impl Display for DeleteQuery {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "DeleteQuery[table={} conditions={}]",
            self.table,
            condition_list(&self.conditions)
        )
    }
}

/// Count of matching rows.
#[derive(Debug, Clone, PartialEq)]
pub struct CountQuery {
    pub table: String,
    pub conditions: Vec<Condition>,
}

impl Display for CountQuery {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CountQuery[table={} conditions={}]",
            self.table,
            condition_list(&self.conditions)
        )
    }
}

/// One selected column and the key it is returned under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultColumn {
    pub column: String,
    pub key: String,
}

/// Selection of result columns from matching rows.
#[derive(Debug, Clone, PartialEq)]
pub struct FinderQuery {
    pub table: String,
    pub results: Vec<ResultColumn>,
    pub conditions: Vec<Condition>,
    /// Columns ordering the result, ascending.
    pub order_by: Vec<String>,
}

impl Display for FinderQuery {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let results = self
            .results
            .iter()
            .map(|result| result.column.as_str())
            .collect::<Vec<_>>()
            .join(",");
        write!(
            f,
            "FinderQuery[table={} results={} conditions={}]",
            self.table,
            results,
            condition_list(&self.conditions)
        )
    }
}

/// Insert, or update on conflict over `conflict_columns`.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveOrUpdateQuery {
    pub table: String,
    pub insert_columns: Vec<Column>,
    pub update_columns: Vec<Column>,
    pub conflict_columns: Vec<String>,
}

impl Display for SaveOrUpdateQuery {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SaveOrUpdateQuery[table={} insert={} update={} conflict={}]",
            self.table,
            column_names(&self.insert_columns),
            column_names(&self.update_columns),
            self.conflict_columns.join(",")
        )
    }
}

/// Child rows of a foreign constraint whose parents match `parent_conditions`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildrenQuery {
    pub child_table: String,
    pub child_id_column: String,
    /// `(child column, parent column)` pairs.
    pub mappings: Vec<(String, String)>,
    pub child_conditions: Vec<Condition>,
    pub parent_table: String,
    pub parent_conditions: Vec<Condition>,
}

impl Display for ChildrenQuery {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mappings = self
            .mappings
            .iter()
            .map(|(child, parent)| format!("{child}->{parent}"))
            .collect::<Vec<_>>()
            .join(",");
        write!(
            f,
            "ChildrenQuery[child={} parent={} mappings={} child_conditions={} parent_conditions={}]",
            self.child_table,
            self.parent_table,
            mappings,
            condition_list(&self.child_conditions),
            condition_list(&self.parent_conditions)
        )
    }
}

/// Snapshot copy of matching entity rows into an audit shadow table.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntryQuery {
    pub table: String,
    pub audit_table: String,
    /// `(entity column, audit column)` pairs.
    pub columns: Vec<(String, String)>,
    /// Change type, time and user columns with their values.
    pub bookkeeping: Vec<Column>,
    pub conditions: Vec<Condition>,
}

impl Display for AuditEntryQuery {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "AuditEntryQuery[table={} audit_table={} conditions={}]",
            self.table,
            self.audit_table,
            condition_list(&self.conditions)
        )
    }
}
