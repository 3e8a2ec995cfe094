use super::Converter;
use crate::model::FieldDescriptor;
use crate::value::{DataType, StoreValue, Value};

/// Field converter persisting structured values as JSON text.
///
/// Attach with `FieldDeclaration::converter` on `DataType::Json` fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonConverter;

impl Converter for JsonConverter {
    fn to_store(&self, value: &Value, _field: Option<&FieldDescriptor>) -> Option<StoreValue> {
        match value {
            Value::Json(json) => serde_json::to_string(json).ok().map(StoreValue::Text),
            Value::Text(text) => serde_json::from_str::<serde_json::Value>(text)
                .ok()
                .map(|_| StoreValue::Text(text.clone())),
            _ => None,
        }
    }

    fn to_domain(
        &self,
        value: &StoreValue,
        target: DataType,
        _field: Option<&FieldDescriptor>,
    ) -> Option<Value> {
        let StoreValue::Text(text) = value else {
            return None;
        };
        let parsed = serde_json::from_str::<serde_json::Value>(text).ok()?;
        match target {
            DataType::Json => Some(Value::Json(parsed)),
            DataType::String | DataType::Text => Some(Value::Text(text.clone())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::JsonConverter;
    use crate::conversion::Converter;
    use crate::value::{DataType, StoreValue, Value};
    use serde_json::json;

    #[test]
    fn json_values_round_trip_through_text() {
        let converter = JsonConverter;
        let value = Value::Json(json!({"street": "MG Road", "floors": [1, 2]}));
        let stored = converter.to_store(&value, None).unwrap();
        assert!(matches!(stored, StoreValue::Text(_)));
        assert_eq!(converter.to_domain(&stored, DataType::Json, None), Some(value));
    }

    #[test]
    fn malformed_json_text_is_rejected() {
        let converter = JsonConverter;
        assert_eq!(
            converter.to_domain(&StoreValue::Text("{oops".to_string()), DataType::Json, None),
            None
        );
    }
}
