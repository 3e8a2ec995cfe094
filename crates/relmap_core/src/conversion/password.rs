use super::Converter;
use crate::model::FieldDescriptor;
use crate::value::{DataType, StoreValue, Value};
use sha2::{Digest, Sha256};

const DIGEST_PREFIX: &str = "sha256:";

/// Field converter storing a one-way SHA-256 digest of secret text.
///
/// Reads return the stored digest unchanged. Text that already carries the
/// digest prefix is written as is, so loading and re-saving an entity never
/// hashes twice.
#[derive(Debug, Clone, Copy, Default)]
pub struct PasswordHashConverter;

impl PasswordHashConverter {
    /// Digest of `secret` in its stored form.
    pub fn digest(secret: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        format!("{DIGEST_PREFIX}{:x}", hasher.finalize())
    }

    /// Whether `secret` hashes to the stored `digest`.
    pub fn matches(secret: &str, digest: &str) -> bool {
        Self::digest(secret) == digest
    }
}

impl Converter for PasswordHashConverter {
    fn to_store(&self, value: &Value, _field: Option<&FieldDescriptor>) -> Option<StoreValue> {
        let Value::Text(text) = value else {
            return None;
        };
        if text.starts_with(DIGEST_PREFIX) {
            return Some(StoreValue::Text(text.clone()));
        }
        Some(StoreValue::Text(Self::digest(text)))
    }

    fn to_domain(
        &self,
        value: &StoreValue,
        target: DataType,
        _field: Option<&FieldDescriptor>,
    ) -> Option<Value> {
        match (value, target) {
            (StoreValue::Text(digest), DataType::String | DataType::Text) => {
                Some(Value::Text(digest.clone()))
            }
            _ => None,
        }
    }
}
