//! Store-agnostic structured queries.
//!
//! # Responsibility
//! - Describe every operation the engine asks a data store to perform.
//! - Resolve repository method parameters into reusable condition/column templates.
//!
//! # Invariants
//! - Templates (`*Binding`) are immutable after registration; every call
//!   materializes fresh `Condition`/`Column` values from them.
//! - Queries never carry SQL text; rendering belongs to the data store.
//!
//! # See also
//! - docs/architecture/query-model.md

mod builder;
mod condition;
mod kinds;
mod structure;

pub(crate) use builder::{split_method_name, ConditionQueryBuilder, MarkerBindings};
pub use condition::{
    Column, ColumnBinding, Condition, ConditionBinding, Operator, ResultBinding, ValueSource,
};
pub use kinds::{
    AuditEntryQuery, ChildrenQuery, CountQuery, DeleteQuery, FinderQuery, ResultColumn,
    SaveOrUpdateQuery, SaveQuery, UpdateQuery,
};
pub use structure::{
    ColumnStructure, CreateIndexQuery, CreateTableQuery, ForeignStructure, UniqueStructure,
};
