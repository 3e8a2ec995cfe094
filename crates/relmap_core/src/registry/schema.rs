//! Schema creation and validation issued during registration.

use super::naming::flatten;
use super::{Resolved, Stub};
use crate::error::{PersistenceError, PersistenceResult};
use crate::model::IdGeneration;
use crate::query::{CreateIndexQuery, CreateTableQuery};
use crate::store::DataStore;
use log::info;
use std::collections::{HashMap, HashSet};

/// Creates the sequence and table of a new entity, then re-reads the table's
/// columns and resets the field mapping to them.
///
/// Returns whether any column mapping changed.
pub(super) fn create_table(
    store: &dyn DataStore,
    stub: &mut Stub,
    resolved: &Resolved,
) -> PersistenceResult<bool> {
    let id = &stub.fields[stub.id_index];
    if id.generation() == IdGeneration::Sequence {
        if let Some(sequence) = id.sequence_name() {
            store.check_and_create_sequence(sequence)?;
        }
    }

    let query = CreateTableQuery::for_entity(
        stub.entity.simple_name(),
        &stub.table,
        &stub.fields,
        &resolved.unique_constraints,
        &resolved.foreign_constraints,
    );
    store.create_table(&query)?;
    info!(
        "event=schema_create module=registry status=ok entity={} table={}",
        stub.entity.simple_name(),
        stub.table
    );

    let Some(columns) = store.column_names(&stub.table)? else {
        return Err(PersistenceError::execution(
            "created table is not visible in the store",
            &query,
        ));
    };
    Ok(reset_column_mapping(stub, &columns))
}

fn reset_column_mapping(stub: &mut Stub, columns: &[String]) -> bool {
    let discovered = columns
        .iter()
        .map(|column| (flatten(column), column))
        .collect::<HashMap<_, _>>();
    let mut changed = false;
    for field in &mut stub.fields {
        if let Some(actual) = discovered.get(&flatten(&field.column)) {
            if **actual != field.column {
                field.column = (*actual).clone();
                changed = true;
            }
        }
    }
    changed
}

/// Creates the indexes and audit shadow table of a new entity.
pub(super) fn create_dependents(
    store: &dyn DataStore,
    stub: &Stub,
    resolved: &Resolved,
) -> PersistenceResult<()> {
    for index in &resolved.indexes {
        store.create_index(&CreateIndexQuery {
            table: stub.table.clone(),
            name: index.name().to_string(),
            columns: index.columns().to_vec(),
        })?;
    }
    if let Some(audit) = &stub.audit {
        store.create_table(&CreateTableQuery::for_audit(audit, &stub.fields))?;
    }
    Ok(())
}

/// Validates the audit shadow table of a pre-existing entity table,
/// creating it when missing and allowed.
pub(super) fn check_audit_table(
    store: &dyn DataStore,
    stub: &Stub,
    create_tables: bool,
) -> PersistenceResult<()> {
    let Some(audit) = &stub.audit else {
        return Ok(());
    };

    let Some(columns) = store.column_names(audit.table())? else {
        if !create_tables {
            return Err(PersistenceError::InvalidConfiguration(format!(
                "audit table `{}` of entity `{}` does not exist and table creation is disabled",
                audit.table(),
                stub.entity.simple_name()
            )));
        }
        store.create_table(&CreateTableQuery::for_audit(audit, &stub.fields))?;
        info!(
            "event=schema_create module=registry status=ok entity={} table={}",
            stub.entity.simple_name(),
            audit.table()
        );
        return Ok(());
    };

    let present = columns
        .iter()
        .map(|column| column.to_ascii_uppercase())
        .collect::<HashSet<_>>();
    let missing = audit
        .bookkeeping_columns()
        .into_iter()
        .chain(stub.fields.iter().map(|field| field.audit_column()))
        .filter(|column| !present.contains(&column.to_ascii_uppercase()))
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(PersistenceError::mapping(
            stub.entity.simple_name(),
            format!(
                "mandatory audit columns are missing in audit table `{}`: {}",
                audit.table(),
                missing.join(", ")
            ),
        ));
    }
    Ok(())
}
