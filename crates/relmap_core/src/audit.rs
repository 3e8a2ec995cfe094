//! Audit trail of entity changes.
//!
//! # Responsibility
//! - Supply the acting user and audit switch through `PersistenceContext`.
//! - Copy changed rows into the entity's audit shadow table.
//! - Query and prune audit rows.
//!
//! # Invariants
//! - Nothing is recorded unless the entity is audited and the context enables it.
//! - Audit times are fixed-width RFC 3339 UTC text; range filters compare lexically.
//! - Audit failures propagate like any other store failure.
//!
//! # See also
//! - docs/architecture/audit.md

use crate::conversion::{format_timestamp, parse_timestamp, ConversionService};
use crate::error::{PersistenceError, PersistenceResult};
use crate::model::{AuditDescriptor, EntityDescriptor};
use crate::query::{
    AuditEntryQuery, Column, Condition, DeleteQuery, FinderQuery, Operator, ResultColumn,
};
use crate::store::DataStore;
use crate::value::{Record, StoreValue, Value};
use chrono::{DateTime, Utc};
use log::debug;
use std::fmt::{Display, Formatter};

const TYPE_KEY: &str = "$changeType";
const TIME_KEY: &str = "$changeTime";
const USER_KEY: &str = "$changedBy";

/// Ambient information about the unit of work performing changes.
pub trait PersistenceContext: Send + Sync {
    /// Identifier of the acting user, if known.
    fn current_user(&self) -> Option<String>;

    fn is_audit_enabled(&self) -> bool;
}

/// Context with auditing disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuditContext;

impl PersistenceContext for NoAuditContext {
    fn current_user(&self) -> Option<String> {
        None
    }

    fn is_audit_enabled(&self) -> bool {
        false
    }
}

/// Context with a fixed user and audit switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticPersistenceContext {
    user: Option<String>,
    audit_enabled: bool,
}

impl StaticPersistenceContext {
    pub fn new(user: impl Into<String>, audit_enabled: bool) -> Self {
        Self {
            user: Some(user.into()),
            audit_enabled,
        }
    }

    pub fn anonymous(audit_enabled: bool) -> Self {
        Self {
            user: None,
            audit_enabled,
        }
    }
}

impl PersistenceContext for StaticPersistenceContext {
    fn current_user(&self) -> Option<String> {
        self.user.clone()
    }

    fn is_audit_enabled(&self) -> bool {
        self.audit_enabled
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeType {
    Insert,
    Update,
    Delete,
    InsertOrUpdate,
}

impl ChangeType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::InsertOrUpdate => "INSERT_OR_UPDATE",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        [Self::Insert, Self::Update, Self::Delete, Self::InsertOrUpdate]
            .into_iter()
            .find(|change| change.as_str().eq_ignore_ascii_case(raw.trim()))
    }
}

impl Display for ChangeType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filter over the audit rows of one entity type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditSearchQuery {
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    entity_id: Option<Value>,
    change_type: Option<ChangeType>,
}

impl AuditSearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inclusive lower bound of the change time.
    pub fn from(mut self, time: DateTime<Utc>) -> Self {
        self.from = Some(time);
        self
    }

    /// Inclusive upper bound of the change time.
    pub fn to(mut self, time: DateTime<Utc>) -> Self {
        self.to = Some(time);
        self
    }

    pub fn entity_id(mut self, id: impl Into<Value>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    pub fn change_type(mut self, change_type: ChangeType) -> Self {
        self.change_type = Some(change_type);
        self
    }
}

/// One audit row.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub change_type: ChangeType,
    pub time: DateTime<Utc>,
    pub changed_by: Option<String>,
    /// Entity field values captured by the change.
    pub record: Record,
}

fn audit_of(descriptor: &EntityDescriptor) -> PersistenceResult<&AuditDescriptor> {
    descriptor.audit().ok_or_else(|| {
        PersistenceError::UnsupportedOperation(format!(
            "entity `{}` does not declare an audit table",
            descriptor.entity_name()
        ))
    })
}

/// Copies the entity rows matching `conditions` into the audit table.
///
/// Returns the number of audit rows written; zero when auditing is off.
pub(crate) fn record_change(
    store: &dyn DataStore,
    context: &dyn PersistenceContext,
    descriptor: &EntityDescriptor,
    change: ChangeType,
    conditions: Vec<Condition>,
) -> PersistenceResult<usize> {
    let Some(audit) = descriptor.audit() else {
        return Ok(0);
    };
    if !context.is_audit_enabled() {
        return Ok(0);
    }

    let changed_by = context
        .current_user()
        .map_or(StoreValue::Null, StoreValue::Text);
    let query = AuditEntryQuery {
        table: descriptor.table_name().to_string(),
        audit_table: audit.table().to_string(),
        columns: descriptor
            .fields()
            .iter()
            .map(|field| (field.column().to_string(), field.audit_column().to_string()))
            .collect(),
        bookkeeping: vec![
            Column::new(audit.type_column(), StoreValue::Text(change.as_str().to_string())),
            Column::new(audit.time_column(), StoreValue::Text(format_timestamp(&Utc::now()))),
            Column::new(audit.changed_by_column(), changed_by),
        ],
        conditions,
    };
    let written = store.add_audit_entries(&query)?;
    debug!(
        "event=audit_record module=audit status=ok entity={} change={change} rows={written}",
        descriptor.entity_name()
    );
    Ok(written)
}

/// Audit rows of `descriptor` matching `search`, ordered by audit id.
pub(crate) fn search(
    store: &dyn DataStore,
    conversion: &ConversionService,
    descriptor: &EntityDescriptor,
    search: &AuditSearchQuery,
) -> PersistenceResult<Vec<AuditEntry>> {
    let audit = audit_of(descriptor)?;

    let mut conditions = Vec::new();
    if let Some(from) = &search.from {
        conditions.push(Condition::new(
            audit.time_column(),
            Operator::Ge,
            StoreValue::Text(format_timestamp(from)),
        ));
    }
    if let Some(to) = &search.to {
        conditions.push(Condition::new(
            audit.time_column(),
            Operator::Le,
            StoreValue::Text(format_timestamp(to)),
        ));
    }
    if let Some(id) = &search.entity_id {
        let id_field = descriptor.id_field();
        conditions.push(Condition::eq(
            id_field.audit_column(),
            conversion.to_store(id, Some(id_field))?,
        ));
    }
    if let Some(change) = search.change_type {
        conditions.push(Condition::eq(
            audit.type_column(),
            StoreValue::Text(change.as_str().to_string()),
        ));
    }

    let mut results = vec![
        ResultColumn {
            column: audit.type_column().to_string(),
            key: TYPE_KEY.to_string(),
        },
        ResultColumn {
            column: audit.time_column().to_string(),
            key: TIME_KEY.to_string(),
        },
        ResultColumn {
            column: audit.changed_by_column().to_string(),
            key: USER_KEY.to_string(),
        },
    ];
    results.extend(descriptor.fields().iter().map(|field| ResultColumn {
        column: field.audit_column().to_string(),
        key: field.name().to_string(),
    }));

    let query = FinderQuery {
        table: audit.table().to_string(),
        results,
        conditions,
        order_by: vec![audit.id_column().to_string()],
    };

    store
        .find(&query)?
        .into_iter()
        .map(|mut row| {
            let change_type = match row.remove(TYPE_KEY) {
                Some(StoreValue::Text(raw)) => ChangeType::parse(&raw),
                _ => None,
            }
            .ok_or_else(|| {
                PersistenceError::execution("audit row has an unknown change type", &query)
            })?;
            let time = match row.remove(TIME_KEY) {
                Some(StoreValue::Text(raw)) => parse_timestamp(&raw),
                _ => None,
            }
            .ok_or_else(|| {
                PersistenceError::execution("audit row has an unreadable change time", &query)
            })?;
            let changed_by = match row.remove(USER_KEY) {
                Some(StoreValue::Text(user)) => Some(user),
                _ => None,
            };

            let mut record = Record::new();
            for field in descriptor.fields() {
                let value = row.get(field.name()).unwrap_or(&StoreValue::Null);
                record.set(field.name(), conversion.to_domain(value, field)?);
            }
            Ok(AuditEntry {
                change_type,
                time,
                changed_by,
                record,
            })
        })
        .collect()
}

/// Deletes the audit rows of `descriptor` recorded at or before `till`.
pub(crate) fn clear(
    store: &dyn DataStore,
    descriptor: &EntityDescriptor,
    till: DateTime<Utc>,
) -> PersistenceResult<usize> {
    let audit = audit_of(descriptor)?;
    store.delete(&DeleteQuery {
        table: audit.table().to_string(),
        conditions: vec![Condition::new(
            audit.time_column(),
            Operator::Le,
            StoreValue::Text(format_timestamp(&till)),
        )],
    })
}
