//! Value coercion between domain values and store-native values.
//!
//! # Responsibility
//! - Convert field values to store values before queries are executed.
//! - Convert store values back to the logical type of the target field.
//!
//! # Invariants
//! - A field-level custom converter is used exclusively for that field.
//! - The string converter is always the last entry of the chain.
//! - `to_domain` never returns a value of a type other than the target type.
//!
//! # See also
//! - docs/architecture/conversion.md

mod converters;
mod json;
mod password;

use crate::error::{PersistenceError, PersistenceResult};
use crate::model::FieldDescriptor;
use crate::value::{DataType, StoreValue, Value};
use std::fmt::Debug;
use std::sync::Arc;

pub use converters::{
    EnumConverter, LargeTextConverter, NumericConverter, StringConverter, TemporalConverter,
};
pub use json::JsonConverter;
pub use password::PasswordHashConverter;

pub(crate) use converters::{format_timestamp, parse_timestamp};

/// One pluggable conversion step.
///
/// Returning `None` means "not handled", letting the next converter try.
pub trait Converter: Debug + Send + Sync {
    fn to_store(&self, value: &Value, field: Option<&FieldDescriptor>) -> Option<StoreValue>;

    fn to_domain(
        &self,
        value: &StoreValue,
        target: DataType,
        field: Option<&FieldDescriptor>,
    ) -> Option<Value>;
}

/// Ordered converter chain plus per-field overrides.
#[derive(Debug, Clone)]
pub struct ConversionService {
    converters: Vec<Arc<dyn Converter>>,
}

impl Default for ConversionService {
    fn default() -> Self {
        Self {
            converters: vec![
                Arc::new(NumericConverter),
                Arc::new(LargeTextConverter),
                Arc::new(EnumConverter),
                Arc::new(TemporalConverter),
                Arc::new(StringConverter),
            ],
        }
    }
}

impl ConversionService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a converter ahead of the string catch-all.
    pub fn add_converter(&mut self, converter: Arc<dyn Converter>) {
        let position = self.converters.len().saturating_sub(1);
        self.converters.insert(position, converter);
    }

    /// Converts a domain value into its store representation.
    pub fn to_store(
        &self,
        value: &Value,
        field: Option<&FieldDescriptor>,
    ) -> PersistenceResult<StoreValue> {
        if let Some(converter) = field.and_then(FieldDescriptor::converter) {
            if value.is_null() {
                return Ok(StoreValue::Null);
            }
            return converter.to_store(value, field).ok_or_else(|| {
                PersistenceError::DataConversion(format!(
                    "custom converter {converter:?} rejected value of field `{}`",
                    field.map_or("", FieldDescriptor::name)
                ))
            });
        }

        if value.is_null() {
            return Ok(StoreValue::Null);
        }

        self.converters
            .iter()
            .find_map(|converter| converter.to_store(value, field))
            .ok_or_else(|| {
                PersistenceError::DataConversion(format!(
                    "no converter accepts domain value of type {:?}",
                    value.data_type()
                ))
            })
    }

    /// Converts a store value into the logical type of `field`.
    pub fn to_domain(
        &self,
        value: &StoreValue,
        field: &FieldDescriptor,
    ) -> PersistenceResult<Value> {
        if let Some(converter) = field.converter() {
            if matches!(value, StoreValue::Null) {
                return Ok(Value::Null);
            }
            return converter
                .to_domain(value, field.data_type(), Some(field))
                .ok_or_else(|| {
                    PersistenceError::DataConversion(format!(
                        "custom converter {converter:?} rejected store value of field `{}`",
                        field.name()
                    ))
                });
        }
        self.convert(value, field.data_type(), Some(field))
    }

    /// Converts a store value into `target` without field metadata.
    pub fn to_domain_as(&self, value: &StoreValue, target: DataType) -> PersistenceResult<Value> {
        self.convert(value, target, None)
    }

    fn convert(
        &self,
        value: &StoreValue,
        target: DataType,
        field: Option<&FieldDescriptor>,
    ) -> PersistenceResult<Value> {
        if matches!(value, StoreValue::Null) {
            return Ok(Value::Null);
        }
        if let Some(direct) = direct_match(value, target) {
            return Ok(direct);
        }
        if let StoreValue::Text(text) = value {
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
        }

        self.converters
            .iter()
            .find_map(|converter| converter.to_domain(value, target, field))
            .ok_or_else(|| {
                PersistenceError::DataConversion(format!(
                    "failed to convert store value {} into {target:?}{}",
                    describe_store_value(value),
                    field.map_or_else(String::new, |field| format!(" (field `{}`)", field.name()))
                ))
            })
    }
}

fn direct_match(value: &StoreValue, target: DataType) -> Option<Value> {
    match (value, target) {
        (StoreValue::Integer(number), DataType::Long) => Some(Value::Long(*number)),
        (StoreValue::Real(number), DataType::Double) => Some(Value::Double(*number)),
        (StoreValue::Text(text), DataType::String | DataType::Text) => {
            Some(Value::Text(text.clone()))
        }
        (StoreValue::Blob(bytes), DataType::Bytes) => Some(Value::Bytes(bytes.clone())),
        _ => None,
    }
}

pub(crate) fn describe_store_value(value: &StoreValue) -> &'static str {
    match value {
        StoreValue::Null => "null",
        StoreValue::Integer(_) => "integer",
        StoreValue::Real(_) => "real",
        StoreValue::Text(_) => "text",
        StoreValue::Blob(_) => "blob",
    }
}
