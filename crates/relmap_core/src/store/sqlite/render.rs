//! SQLite dialect rendering of structured queries.
//!
//! # Invariants
//! - Identifiers are always double-quoted.
//! - Values are always bound as parameters, never inlined.
//! - Equality against null renders as `IS NULL` / `IS NOT NULL`.

use crate::model::CascadePolicy;
use crate::query::{
    AuditEntryQuery, ChildrenQuery, ColumnStructure, Condition, CountQuery, CreateIndexQuery,
    CreateTableQuery, DeleteQuery, FinderQuery, Operator, SaveOrUpdateQuery, UpdateQuery,
};
use crate::value::{DataType, StoreValue};

pub(super) const SEQUENCE_TABLE: &str = "RELMAP_SEQUENCES";

/// Rendered statement with its positional parameters.
pub(super) struct Statement {
    pub(super) sql: String,
    pub(super) params: Vec<StoreValue>,
}

pub(super) fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn qualified(alias: Option<&str>, column: &str) -> String {
    match alias {
        Some(alias) => format!("{alias}.{}", quote(column)),
        None => quote(column),
    }
}

fn predicates(
    conditions: &[Condition],
    alias: Option<&str>,
    params: &mut Vec<StoreValue>,
) -> Vec<String> {
    conditions
        .iter()
        .map(|condition| {
            let column = qualified(alias, &condition.column);
            match (&condition.value, condition.operator) {
                (StoreValue::Null, Operator::Eq) => format!("{column} IS NULL"),
                (StoreValue::Null, Operator::Ne) => format!("{column} IS NOT NULL"),
                (value, operator) => {
                    params.push(value.clone());
                    format!("{column} {} ?", operator.symbol())
                }
            }
        })
        .collect()
}

fn where_clause(
    conditions: &[Condition],
    alias: Option<&str>,
    params: &mut Vec<StoreValue>,
) -> String {
    if conditions.is_empty() {
        return String::new();
    }
    format!(" WHERE {}", predicates(conditions, alias, params).join(" AND "))
}

fn column_list<'a>(columns: impl Iterator<Item = &'a str>) -> String {
    columns.map(quote).collect::<Vec<_>>().join(", ")
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn sql_type(data_type: DataType) -> &'static str {
    match data_type {
        DataType::Boolean | DataType::Int | DataType::Long => "INTEGER",
        DataType::Float | DataType::Double => "REAL",
        DataType::Bytes => "BLOB",
        DataType::String
        | DataType::Text
        | DataType::Enum
        | DataType::DateTime
        | DataType::Json => "TEXT",
    }
}

fn column_definition(column: &ColumnStructure) -> String {
    let name = quote(&column.name);
    if column.auto_increment {
        return format!("{name} INTEGER PRIMARY KEY AUTOINCREMENT");
    }
    let mut definition = format!("{name} {}", sql_type(column.data_type));
    if column.identifier {
        definition.push_str(" PRIMARY KEY");
    }
    if !column.nullable {
        definition.push_str(" NOT NULL");
    }
    definition
}

pub(super) fn create_table(query: &CreateTableQuery, native_foreign_keys: bool) -> String {
    let mut parts = query
        .columns
        .iter()
        .map(column_definition)
        .collect::<Vec<_>>();

    for constraint in &query.unique_constraints {
        parts.push(format!(
            "CONSTRAINT {} UNIQUE ({})",
            quote(&constraint.name),
            column_list(constraint.columns.iter().map(String::as_str))
        ));
    }

    if native_foreign_keys {
        for constraint in &query.foreign_constraints {
            let on_delete = match constraint.cascade {
                CascadePolicy::DeleteWithParent => "CASCADE",
                CascadePolicy::BlockIfChildrenExist => "RESTRICT",
            };
            parts.push(format!(
                "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {on_delete}",
                quote(&constraint.name),
                column_list(constraint.columns.iter().map(String::as_str)),
                quote(&constraint.target_table),
                column_list(constraint.target_columns.iter().map(String::as_str))
            ));
        }
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote(&query.table),
        parts.join(", ")
    )
}

pub(super) fn create_index(query: &CreateIndexQuery) -> String {
    format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
        quote(&query.name),
        quote(&query.table),
        column_list(query.columns.iter().map(String::as_str))
    )
}

/// Insert of already-resolved column values.
pub(super) fn insert(table: &str, columns: &[(String, StoreValue)]) -> Statement {
    if columns.is_empty() {
        return Statement {
            sql: format!("INSERT INTO {} DEFAULT VALUES", quote(table)),
            params: Vec::new(),
        };
    }
    Statement {
        sql: format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote(table),
            column_list(columns.iter().map(|(name, _)| name.as_str())),
            placeholders(columns.len())
        ),
        params: columns.iter().map(|(_, value)| value.clone()).collect(),
    }
}

pub(super) fn upsert(
    query: &SaveOrUpdateQuery,
    insert_values: &[(String, StoreValue)],
) -> Statement {
    let mut statement = insert(&query.table, insert_values);
    let conflict = column_list(query.conflict_columns.iter().map(String::as_str));
    if query.update_columns.is_empty() {
        statement
            .sql
            .push_str(&format!(" ON CONFLICT ({conflict}) DO NOTHING"));
        return statement;
    }
    let assignments = query
        .update_columns
        .iter()
        .map(|column| format!("{} = ?", quote(&column.name)))
        .collect::<Vec<_>>()
        .join(", ");
    statement
        .sql
        .push_str(&format!(" ON CONFLICT ({conflict}) DO UPDATE SET {assignments}"));
    statement
        .params
        .extend(query.update_columns.iter().map(|column| column.value.clone()));
    statement
}

pub(super) fn update(query: &UpdateQuery) -> Statement {
    let mut params = query
        .columns
        .iter()
        .map(|column| column.value.clone())
        .collect::<Vec<_>>();
    let assignments = query
        .columns
        .iter()
        .map(|column| format!("{} = ?", quote(&column.name)))
        .collect::<Vec<_>>()
        .join(", ");
    let filter = where_clause(&query.conditions, None, &mut params);
    Statement {
        sql: format!("UPDATE {} SET {assignments}{filter}", quote(&query.table)),
        params,
    }
}

pub(super) fn delete(query: &DeleteQuery) -> Statement {
    let mut params = Vec::new();
    let filter = where_clause(&query.conditions, None, &mut params);
    Statement {
        sql: format!("DELETE FROM {}{filter}", quote(&query.table)),
        params,
    }
}

pub(super) fn count(query: &CountQuery) -> Statement {
    let mut params = Vec::new();
    let filter = where_clause(&query.conditions, None, &mut params);
    Statement {
        sql: format!("SELECT COUNT(*) FROM {}{filter}", quote(&query.table)),
        params,
    }
}

pub(super) fn find(query: &FinderQuery) -> Statement {
    let mut params = Vec::new();
    let filter = where_clause(&query.conditions, None, &mut params);
    let mut sql = format!(
        "SELECT {} FROM {}{filter}",
        column_list(query.results.iter().map(|result| result.column.as_str())),
        quote(&query.table)
    );
    if !query.order_by.is_empty() {
        sql.push_str(" ORDER BY ");
        sql.push_str(&column_list(query.order_by.iter().map(String::as_str)));
    }
    Statement { sql, params }
}

fn children_filter(query: &ChildrenQuery, params: &mut Vec<StoreValue>) -> String {
    let mut child_predicates = predicates(&query.child_conditions, Some("c"), params);
    let mut parent_predicates = query
        .mappings
        .iter()
        .map(|(child, parent)| format!("c.{} = p.{}", quote(child), quote(parent)))
        .collect::<Vec<_>>();
    parent_predicates.extend(predicates(&query.parent_conditions, Some("p"), params));
    child_predicates.push(format!(
        "EXISTS (SELECT 1 FROM {} p WHERE {})",
        quote(&query.parent_table),
        parent_predicates.join(" AND ")
    ));
    format!(
        "FROM {} c WHERE {}",
        quote(&query.child_table),
        child_predicates.join(" AND ")
    )
}

pub(super) fn children_ids(query: &ChildrenQuery) -> Statement {
    let mut params = Vec::new();
    let filter = children_filter(query, &mut params);
    Statement {
        sql: format!("SELECT c.{} {filter}", quote(&query.child_id_column)),
        params,
    }
}

pub(super) fn children_exist(query: &ChildrenQuery) -> Statement {
    let mut params = Vec::new();
    let filter = children_filter(query, &mut params);
    Statement {
        sql: format!("SELECT EXISTS (SELECT 1 {filter})"),
        params,
    }
}

pub(super) fn audit_entries(query: &AuditEntryQuery) -> Statement {
    let mut params = query
        .bookkeeping
        .iter()
        .map(|column| column.value.clone())
        .collect::<Vec<_>>();
    let target_columns = query
        .bookkeeping
        .iter()
        .map(|column| column.name.as_str())
        .chain(query.columns.iter().map(|(_, audit)| audit.as_str()));
    let source_columns = column_list(query.columns.iter().map(|(entity, _)| entity.as_str()));
    let filter = where_clause(&query.conditions, None, &mut params);
    let select_list = if source_columns.is_empty() {
        placeholders(query.bookkeeping.len())
    } else {
        format!("{}, {source_columns}", placeholders(query.bookkeeping.len()))
    };
    Statement {
        sql: format!(
            "INSERT INTO {} ({}) SELECT {select_list} FROM {}{filter}",
            quote(&query.audit_table),
            column_list(target_columns),
            quote(&query.table)
        ),
        params,
    }
}

pub(super) fn next_sequence_value() -> String {
    format!(
        "UPDATE {} SET \"NEXT_VALUE\" = \"NEXT_VALUE\" + 1 WHERE \"NAME\" = ?1 RETURNING \"NEXT_VALUE\" - 1",
        quote(SEQUENCE_TABLE)
    )
}

pub(super) fn create_sequence() -> String {
    format!(
        "INSERT OR IGNORE INTO {} (\"NAME\", \"NEXT_VALUE\") VALUES (?1, 1)",
        quote(SEQUENCE_TABLE)
    )
}

#[cfg(test)]
mod tests {
    use super::{count, delete, quote};
    use crate::query::{Condition, CountQuery, DeleteQuery, Operator};
    use crate::value::StoreValue;

    #[test]
    fn null_equality_renders_is_null_without_parameter() {
        let statement = count(&CountQuery {
            table: "EMPLOYEE".to_string(),
            conditions: vec![
                Condition::eq("EMP_NO", StoreValue::Null),
                Condition::new("ID", Operator::Ne, StoreValue::Integer(3)),
            ],
        });
        assert_eq!(
            statement.sql,
            "SELECT COUNT(*) FROM \"EMPLOYEE\" WHERE \"EMP_NO\" IS NULL AND \"ID\" != ?"
        );
        assert_eq!(statement.params, vec![StoreValue::Integer(3)]);
    }

    #[test]
    fn delete_without_conditions_targets_every_row() {
        let statement = delete(&DeleteQuery {
            table: "ORDERS".to_string(),
            conditions: Vec::new(),
        });
        assert_eq!(statement.sql, "DELETE FROM \"ORDERS\"");
    }

    #[test]
    fn quote_escapes_embedded_quotes() {
        assert_eq!(quote("A\"B"), "\"A\"\"B\"");
    }
}
