use crate::conversion::ConversionService;
use crate::error::{PersistenceError, PersistenceResult};
use crate::model::EntityDescriptor;
use crate::repository::Arg;
use crate::value::{StoreValue, Value};
use std::fmt::{Display, Formatter};

/// Comparison operator of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
}

impl Operator {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Like => "LIKE",
        }
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

/// One materialized `column <op> value` filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: String,
    pub operator: Operator,
    pub value: StoreValue,
    /// Set when the condition came from a condition-object parameter.
    pub structural: bool,
}

impl Condition {
    pub fn new(column: impl Into<String>, operator: Operator, value: StoreValue) -> Self {
        Self {
            column: column.into(),
            operator,
            value,
            structural: false,
        }
    }

    pub fn eq(column: impl Into<String>, value: StoreValue) -> Self {
        Self::new(column, Operator::Eq, value)
    }
}

impl Display for Condition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} ?", self.column, self.operator)
    }
}

/// One materialized column assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub value: StoreValue,
    /// Sequence supplying the value at insert time.
    pub sequence: Option<String>,
}

impl Column {
    pub fn new(name: impl Into<String>, value: StoreValue) -> Self {
        Self {
            name: name.into(),
            value,
            sequence: None,
        }
    }

    pub fn from_sequence(name: impl Into<String>, sequence: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: StoreValue::Null,
            sequence: Some(sequence.into()),
        }
    }
}

/// Where a bound template takes its per-call value from.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueSource {
    /// Method parameter at this position.
    Param(usize),
    /// Property of the condition-object parameter at `index`.
    Property { index: usize, property: String },
    Fixed(Value),
}

impl ValueSource {
    fn pick(&self, args: &[Arg]) -> PersistenceResult<Value> {
        match self {
            Self::Param(index) => match args.get(*index) {
                Some(Arg::Value(value)) => Ok(value.clone()),
                Some(Arg::Record(_)) => Err(PersistenceError::DataConversion(format!(
                    "argument {index} must be a plain value, found a record"
                ))),
                None => Err(missing_argument(*index)),
            },
            Self::Property { index, property } => match args.get(*index) {
                Some(Arg::Record(record)) => Ok(record.value(property).clone()),
                Some(Arg::Value(Value::Null)) => Ok(Value::Null),
                Some(Arg::Value(_)) => Err(PersistenceError::DataConversion(format!(
                    "argument {index} must be a condition object record"
                ))),
                None => Err(missing_argument(*index)),
            },
            Self::Fixed(value) => Ok(value.clone()),
        }
    }
}

fn missing_argument(index: usize) -> PersistenceError {
    PersistenceError::DataConversion(format!("argument {index} is missing"))
}

/// Condition template bound at registration time.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionBinding {
    pub field: String,
    pub column: String,
    pub operator: Operator,
    pub source: ValueSource,
    pub structural: bool,
}

impl ConditionBinding {
    /// Materializes the condition for one call.
    pub(crate) fn resolve(
        &self,
        descriptor: &EntityDescriptor,
        conversion: &ConversionService,
        args: &[Arg],
    ) -> PersistenceResult<Condition> {
        let value = self.source.pick(args)?;
        let value = conversion.to_store(&value, descriptor.field(&self.field))?;
        Ok(Condition {
            column: self.column.clone(),
            operator: self.operator,
            value,
            structural: self.structural,
        })
    }
}

/// Column-assignment template bound at registration time.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnBinding {
    pub field: String,
    pub column: String,
    pub source: ValueSource,
}

impl ColumnBinding {
    pub(crate) fn resolve(
        &self,
        descriptor: &EntityDescriptor,
        conversion: &ConversionService,
        args: &[Arg],
    ) -> PersistenceResult<Column> {
        let value = self.source.pick(args)?;
        let value = conversion.to_store(&value, descriptor.field(&self.field))?;
        Ok(Column::new(self.column.clone(), value))
    }
}

/// Result column template of a finder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultBinding {
    pub field: String,
    pub column: String,
    /// Key of the value in the produced record.
    pub key: String,
}
