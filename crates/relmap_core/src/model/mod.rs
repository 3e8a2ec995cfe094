//! Entity metadata model.
//!
//! # Responsibility
//! - Define the declarations an entity type supplies about itself.
//! - Define the validated descriptors the registry derives from them.
//!
//! # Invariants
//! - Declarations are plain data; validation happens only in the registry.
//! - Descriptors are immutable once published, except for child constraints
//!   attached when another entity registers a foreign constraint.
//!
//! # See also
//! - docs/architecture/data-model.md

mod audit;
mod constraint;
mod declaration;
mod descriptor;

use crate::error::PersistenceResult;
use crate::value::Record;
use std::any::TypeId;
use std::fmt::{Debug, Formatter};
use std::hash::{Hash, Hasher};

pub use audit::AuditDescriptor;
pub use constraint::{
    CascadePolicy, ChildConstraint, FieldMapping, ForeignConstraint, IndexDescriptor,
    StaticCondition, UniqueConstraint,
};
pub use declaration::{
    AuditDeclaration, EntityDeclaration, FieldDeclaration, ForeignDeclaration, IdGeneration,
    IndexDeclaration, UniqueDeclaration,
};
pub use descriptor::{EntityDescriptor, FieldDescriptor};

pub(crate) use constraint::render_message;
pub(crate) use descriptor::EntityParts;

/// A domain type mapped to a relational table.
pub trait Entity: Sized + Send + Sync + 'static {
    /// Declares the mapping metadata of this type.
    fn declare() -> EntityDeclaration;

    fn to_record(&self) -> Record;

    fn from_record(record: &Record) -> PersistenceResult<Self>;
}

/// Type-erased handle of an entity type.
#[derive(Clone, Copy)]
pub struct EntityRef {
    type_id: TypeId,
    type_name: &'static str,
    declare: fn() -> EntityDeclaration,
}

impl EntityRef {
    pub fn of<E: Entity>() -> Self {
        Self {
            type_id: TypeId::of::<E>(),
            type_name: std::any::type_name::<E>(),
            declare: E::declare,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Type name without its module path.
    pub fn simple_name(&self) -> &'static str {
        self.type_name
            .rsplit("::")
            .next()
            .unwrap_or(self.type_name)
    }

    pub(crate) fn declaration(&self) -> EntityDeclaration {
        (self.declare)()
    }
}

impl PartialEq for EntityRef {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for EntityRef {}

impl Hash for EntityRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl Debug for EntityRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "EntityRef({})", self.simple_name())
    }
}
