//! Method-shape descriptions of repository interfaces.
//!
//! # Responsibility
//! - Describe each repository method: name, parameter roles and return shape.
//! - Define runtime arguments and outcomes exchanged with executors.
//!
//! # Invariants
//! - Shapes are plain data; the executor factory validates them.
//!
//! # See also
//! - docs/architecture/repositories.md

use crate::query::Operator;
use crate::value::{Record, Value};

/// Executor family a method resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutorKind {
    Save,
    SaveOrUpdate,
    Update,
    Delete,
    Finder,
    Count,
}

impl ExecutorKind {
    /// Whether executors of this kind modify rows.
    pub fn is_write(self) -> bool {
        !matches!(self, Self::Finder | Self::Count)
    }
}

/// One marked field inside a condition object.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionProperty {
    pub property: String,
    pub field: String,
    pub operator: Operator,
}

/// Parameter type whose marked properties each contribute one condition.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionObject {
    name: String,
    properties: Vec<ConditionProperty>,
}

impl ConditionObject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
        }
    }

    /// Marks `property`, compared against entity `field`.
    pub fn property(
        mut self,
        property: impl Into<String>,
        field: impl Into<String>,
        operator: Operator,
    ) -> Self {
        self.properties.push(ConditionProperty {
            property: property.into(),
            field: field.into(),
            operator,
        });
        self
    }

    /// Marks a property named like the entity field it is compared against.
    pub fn field(self, field: impl Into<String>, operator: Operator) -> Self {
        let field = field.into();
        self.property(field.clone(), field, operator)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn properties(&self) -> &[ConditionProperty] {
        &self.properties
    }
}

/// Role of one declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamRole {
    /// Unmarked value; conditions come from the method name.
    Value,
    /// Whole entity record.
    Entity,
    Condition { field: String, operator: Operator },
    ConditionObject(ConditionObject),
    /// Column assigned by an update.
    Column { field: String },
}

impl ParamRole {
    pub fn condition(field: impl Into<String>, operator: Operator) -> Self {
        Self::Condition {
            field: field.into(),
            operator,
        }
    }

    pub fn eq(field: impl Into<String>) -> Self {
        Self::condition(field, Operator::Eq)
    }

    pub fn column(field: impl Into<String>) -> Self {
        Self::Column {
            field: field.into(),
        }
    }
}

/// Result type with property to field mappings.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredResult {
    name: String,
    mappings: Vec<(String, String)>,
    type_fields: Vec<(String, String)>,
}

impl StructuredResult {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mappings: Vec::new(),
            type_fields: Vec::new(),
        }
    }

    /// Explicit method-level mapping; when present, type fields are ignored.
    pub fn mapping(mut self, property: impl Into<String>, field: impl Into<String>) -> Self {
        self.mappings.push((property.into(), field.into()));
        self
    }

    /// Field marked on the result type itself.
    pub fn type_field(mut self, property: impl Into<String>, field: impl Into<String>) -> Self {
        self.type_fields.push((property.into(), field.into()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mappings(&self) -> &[(String, String)] {
        &self.mappings
    }

    pub fn type_fields(&self) -> &[(String, String)] {
        &self.type_fields
    }
}

/// Element type returned by a finder.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultKind {
    Entity,
    /// Single-result-field marker.
    Field(String),
    Structured(StructuredResult),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReturnShape {
    Unit,
    Bool,
    Count,
    Single(ResultKind),
    Many(ResultKind),
}

/// Declared signature of one repository method.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodShape {
    name: String,
    marker: Option<ExecutorKind>,
    params: Vec<ParamRole>,
    returns: ReturnShape,
}

impl MethodShape {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            marker: None,
            params: Vec::new(),
            returns: ReturnShape::Unit,
        }
    }

    /// Selects the executor explicitly instead of by name prefix.
    pub fn marker(mut self, kind: ExecutorKind) -> Self {
        self.marker = Some(kind);
        self
    }

    pub fn param(mut self, role: ParamRole) -> Self {
        self.params.push(role);
        self
    }

    pub fn returns(mut self, shape: ReturnShape) -> Self {
        self.returns = shape;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn executor_marker(&self) -> Option<ExecutorKind> {
        self.marker
    }

    pub fn params(&self) -> &[ParamRole] {
        &self.params
    }

    pub fn return_shape(&self) -> &ReturnShape {
        &self.returns
    }
}

/// Declared repository interface over one entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryDeclaration {
    name: String,
    methods: Vec<MethodShape>,
}

impl RepositoryDeclaration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    pub fn method(mut self, method: MethodShape) -> Self {
        self.methods.push(method);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn methods(&self) -> &[MethodShape] {
        &self.methods
    }
}

/// Runtime argument of a repository call.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Value(Value),
    Record(Record),
}

impl Arg {
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Record(record) => Some(record),
            Self::Value(_) => None,
        }
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Record> for Arg {
    fn from(record: Record) -> Self {
        Self::Record(record)
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Self::Value(value.into())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Self::Value(value.into())
    }
}

impl From<i32> for Arg {
    fn from(value: i32) -> Self {
        Self::Value(value.into())
    }
}

impl From<i64> for Arg {
    fn from(value: i64) -> Self {
        Self::Value(value.into())
    }
}

impl From<bool> for Arg {
    fn from(value: bool) -> Self {
        Self::Value(value.into())
    }
}

/// Result of one repository call.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Unit,
    Bool(bool),
    Count(i64),
    Record(Option<Record>),
    Records(Vec<Record>),
    Value(Option<Value>),
    Values(Vec<Value>),
}

impl Outcome {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(flag) => Some(*flag),
            _ => None,
        }
    }

    pub fn as_count(&self) -> Option<i64> {
        match self {
            Self::Count(count) => Some(*count),
            _ => None,
        }
    }

    pub fn into_record(self) -> Option<Record> {
        match self {
            Self::Record(record) => record,
            _ => None,
        }
    }

    pub fn into_records(self) -> Vec<Record> {
        match self {
            Self::Records(records) => records,
            Self::Record(record) => record.into_iter().collect(),
            _ => Vec::new(),
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Value(value) => value,
            _ => None,
        }
    }

    pub fn into_values(self) -> Vec<Value> {
        match self {
            Self::Values(values) => values,
            Self::Value(value) => value.into_iter().collect(),
            _ => Vec::new(),
        }
    }
}
