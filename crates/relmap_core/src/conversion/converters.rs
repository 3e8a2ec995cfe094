//! Built-in converter chain entries.

use super::Converter;
use crate::model::FieldDescriptor;
use crate::value::{DataType, StoreValue, Value};
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use std::io::{Cursor, Read};

/// Renders a timestamp as fixed-width RFC 3339 UTC text.
///
/// Nanosecond precision keeps every `DateTime` exact; fixed width keeps
/// lexical order equal to chronological order.
pub(crate) fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

/// Integral, floating point and boolean values.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumericConverter;

impl Converter for NumericConverter {
    fn to_store(&self, value: &Value, _field: Option<&FieldDescriptor>) -> Option<StoreValue> {
        match value {
            Value::Bool(flag) => Some(StoreValue::Integer(i64::from(*flag))),
            Value::Int(number) => Some(StoreValue::Integer(i64::from(*number))),
            Value::Long(number) => Some(StoreValue::Integer(*number)),
            Value::Float(number) => Some(StoreValue::Real(f64::from(*number))),
            Value::Double(number) => Some(StoreValue::Real(*number)),
            _ => None,
        }
    }

    fn to_domain(
        &self,
        value: &StoreValue,
        target: DataType,
        _field: Option<&FieldDescriptor>,
    ) -> Option<Value> {
        if !target.is_numeric() {
            return None;
        }
        match value {
            StoreValue::Integer(number) => narrow_integer(*number, target),
            StoreValue::Real(number) => narrow_real(*number, target),
            StoreValue::Text(text) => {
                let trimmed = text.trim();
                if target.is_integral() {
                    if let Ok(number) = trimmed.parse::<i64>() {
                        return narrow_integer(number, target);
                    }
                }
                if target == DataType::Boolean {
                    if let Ok(flag) = trimmed.parse::<bool>() {
                        return Some(Value::Bool(flag));
                    }
                }
                trimmed
                    .parse::<f64>()
                    .ok()
                    .and_then(|number| narrow_real(number, target))
            }
            _ => None,
        }
    }
}

fn narrow_integer(number: i64, target: DataType) -> Option<Value> {
    match target {
        DataType::Boolean => Some(Value::Bool(number != 0)),
        DataType::Int => i32::try_from(number).ok().map(Value::Int),
        DataType::Long => Some(Value::Long(number)),
        DataType::Float => Some(Value::Float(number as f32)),
        DataType::Double => Some(Value::Double(number as f64)),
        _ => None,
    }
}

fn narrow_real(number: f64, target: DataType) -> Option<Value> {
    if !number.is_finite() {
        return match target {
            DataType::Double => Some(Value::Double(number)),
            DataType::Float => Some(Value::Float(number as f32)),
            _ => None,
        };
    }
    match target {
        DataType::Boolean => Some(Value::Bool(number != 0.0)),
        DataType::Int => {
            let truncated = number.trunc();
            (truncated >= f64::from(i32::MIN) && truncated <= f64::from(i32::MAX))
                .then(|| Value::Int(truncated as i32))
        }
        DataType::Long => {
            let truncated = number.trunc();
            (truncated >= i64::MIN as f64 && truncated < i64::MAX as f64)
                .then(|| Value::Long(truncated as i64))
        }
        DataType::Float => {
            (number.abs() <= f64::from(f32::MAX)).then(|| Value::Float(number as f32))
        }
        DataType::Double => Some(Value::Double(number)),
        _ => None,
    }
}

/// Large text and binary payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct LargeTextConverter;

impl Converter for LargeTextConverter {
    fn to_store(&self, value: &Value, field: Option<&FieldDescriptor>) -> Option<StoreValue> {
        match value {
            Value::Bytes(bytes) => Some(StoreValue::Blob(bytes.clone())),
            Value::Text(text)
                if field.is_some_and(|field| field.data_type() == DataType::Text) =>
            {
                Some(StoreValue::Text(text.clone()))
            }
            _ => None,
        }
    }

    fn to_domain(
        &self,
        value: &StoreValue,
        target: DataType,
        _field: Option<&FieldDescriptor>,
    ) -> Option<Value> {
        match (value, target) {
            (StoreValue::Text(text), DataType::Text) => Some(Value::Text(text.clone())),
            (StoreValue::Blob(bytes), DataType::Text | DataType::String) => {
                drain_text(bytes).map(Value::Text)
            }
            (StoreValue::Text(text), DataType::Bytes) => {
                Some(Value::Bytes(text.as_bytes().to_vec()))
            }
            _ => None,
        }
    }
}

fn drain_text(bytes: &[u8]) -> Option<String> {
    let mut reader = Cursor::new(bytes);
    let mut buffer = String::new();
    reader.read_to_string(&mut buffer).ok()?;
    Some(buffer)
}

/// Enum values, stored by variant name.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnumConverter;

impl Converter for EnumConverter {
    fn to_store(&self, value: &Value, _field: Option<&FieldDescriptor>) -> Option<StoreValue> {
        match value {
            Value::Enum(name) => Some(StoreValue::Text(name.clone())),
            _ => None,
        }
    }

    fn to_domain(
        &self,
        value: &StoreValue,
        target: DataType,
        field: Option<&FieldDescriptor>,
    ) -> Option<Value> {
        if target != DataType::Enum {
            return None;
        }
        let StoreValue::Text(name) = value else {
            return None;
        };
        let name = name.trim();
        let allowed = field.map_or(&[][..], FieldDescriptor::enum_values);
        if !allowed.is_empty() && !allowed.iter().any(|variant| variant == name) {
            return None;
        }
        Some(Value::Enum(name.to_string()))
    }
}

/// Timestamps, stored as RFC 3339 text.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemporalConverter;

impl Converter for TemporalConverter {
    fn to_store(&self, value: &Value, _field: Option<&FieldDescriptor>) -> Option<StoreValue> {
        match value {
            Value::DateTime(timestamp) => Some(StoreValue::Text(format_timestamp(timestamp))),
            _ => None,
        }
    }

    fn to_domain(
        &self,
        value: &StoreValue,
        target: DataType,
        _field: Option<&FieldDescriptor>,
    ) -> Option<Value> {
        if target != DataType::DateTime {
            return None;
        }
        match value {
            StoreValue::Text(text) => parse_timestamp(text).map(Value::DateTime),
            StoreValue::Integer(millis) => Utc
                .timestamp_millis_opt(*millis)
                .single()
                .map(Value::DateTime),
            _ => None,
        }
    }
}

/// Catch-all text conversion.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringConverter;

impl Converter for StringConverter {
    fn to_store(&self, value: &Value, _field: Option<&FieldDescriptor>) -> Option<StoreValue> {
        match value {
            Value::Null => None,
            Value::Text(text) => Some(StoreValue::Text(text.clone())),
            other => Some(StoreValue::Text(other.to_string())),
        }
    }

    fn to_domain(
        &self,
        value: &StoreValue,
        target: DataType,
        _field: Option<&FieldDescriptor>,
    ) -> Option<Value> {
        if !matches!(target, DataType::String | DataType::Text) {
            return None;
        }
        match value {
            StoreValue::Text(text) => Some(Value::Text(text.clone())),
            StoreValue::Integer(number) => Some(Value::Text(number.to_string())),
            StoreValue::Real(number) => Some(Value::Text(number.to_string())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{format_timestamp, Converter, EnumConverter, NumericConverter, TemporalConverter};
    use crate::value::{DataType, StoreValue, Value};
    use chrono::{TimeZone, Utc};

    #[test]
    fn numeric_conversion_narrows_to_requested_width() {
        let converter = NumericConverter;
        assert_eq!(
            converter.to_domain(&StoreValue::Integer(42), DataType::Int, None),
            Some(Value::Int(42))
        );
        assert_eq!(
            converter.to_domain(&StoreValue::Real(7.9), DataType::Int, None),
            Some(Value::Int(7))
        );
        assert_eq!(
            converter.to_domain(&StoreValue::Text("12".to_string()), DataType::Long, None),
            Some(Value::Long(12))
        );
    }

    #[test]
    fn numeric_conversion_rejects_out_of_range_values() {
        let converter = NumericConverter;
        assert_eq!(
            converter.to_domain(&StoreValue::Integer(i64::MAX), DataType::Int, None),
            None
        );
    }

    #[test]
    fn enum_conversion_accepts_any_name_without_declared_variants() {
        let converter = EnumConverter;
        assert_eq!(
            converter.to_domain(&StoreValue::Text("OPEN".to_string()), DataType::Enum, None),
            Some(Value::Enum("OPEN".to_string()))
        );
        assert_eq!(
            converter.to_store(&Value::Enum("OPEN".to_string()), None),
            Some(StoreValue::Text("OPEN".to_string()))
        );
    }

    #[test]
    fn timestamps_render_with_fixed_width() {
        let timestamp = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(format_timestamp(&timestamp), "2024-03-09T07:05:01.000000000Z");
    }

    #[test]
    fn timestamps_keep_sub_millisecond_precision() {
        let converter = TemporalConverter;
        let timestamp = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let stored = converter
            .to_store(&Value::DateTime(timestamp), None)
            .unwrap();
        assert_eq!(
            stored,
            StoreValue::Text("2023-11-14T22:13:20.123456789Z".to_string())
        );
        assert_eq!(
            converter.to_domain(&stored, DataType::DateTime, None),
            Some(Value::DateTime(timestamp))
        );
    }
}
