//! Relational mapping engine for typed domain entities.
//! Entities declare their mapping; repositories turn declared methods into
//! validated, reusable queries over a pluggable data store.

pub mod audit;
pub mod config;
mod constraint;
pub mod conversion;
pub mod error;
pub mod logging;
pub mod model;
pub mod query;
pub mod registry;
pub mod repository;
pub mod store;
pub mod transaction;
pub mod value;

pub use audit::{
    AuditEntry, AuditSearchQuery, ChangeType, NoAuditContext, PersistenceContext,
    StaticPersistenceContext,
};
pub use config::{PersistenceConfig, SqliteConfig};
pub use conversion::{ConversionService, Converter, JsonConverter, PasswordHashConverter};
pub use error::{ErrorKind, PersistenceError, PersistenceResult};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::{
    AuditDeclaration, CascadePolicy, Entity, EntityDeclaration, EntityDescriptor, EntityRef,
    FieldDeclaration, ForeignDeclaration, IdGeneration, IndexDeclaration, UniqueDeclaration,
};
pub use query::Operator;
pub use registry::EntityRegistry;
pub use repository::{
    Arg, ConditionObject, CrudRepository, ExecutorKind, MethodShape, Outcome, ParamRole,
    RepositoryDeclaration, RepositoryFactory, ResultKind, ReturnShape, StructuredResult,
};
pub use store::{DataStore, SqliteDataStore};
pub use transaction::{Transaction, TransactionCoordinator};
pub use value::{DataType, Record, StoreValue, Value};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
