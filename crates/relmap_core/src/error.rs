//! Error taxonomy shared by every persistence component.
//!
//! # Responsibility
//! - Provide one matchable error type for registration-time and call-time failures.
//! - Keep store failures wrapped together with the query context that caused them.
//!
//! # Invariants
//! - Registration-time kinds (`InvalidMapping`, `InvalidConfiguration`,
//!   `InvalidRepository`) are never produced by executor calls.
//! - Constraint violations always carry the violated constraint name.
//!
//! # See also
//! - docs/architecture/error-handling.md

use thiserror::Error;

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Coarse classification of [`PersistenceError`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidMapping,
    InvalidConfiguration,
    InvalidRepository,
    UniqueConstraintViolation,
    ForeignConstraintViolation,
    ChildConstraintViolation,
    DataConversion,
    Persistence,
    UnsupportedOperation,
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("invalid mapping for entity `{entity}`: {message}")]
    InvalidMapping { entity: String, message: String },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("invalid repository `{repository}`: {message}")]
    InvalidRepository { repository: String, message: String },

    #[error("{message}")]
    UniqueConstraintViolation { constraint: String, message: String },

    #[error("{message}")]
    ForeignConstraintViolation { constraint: String, message: String },

    #[error("{message}")]
    ChildConstraintViolation { constraint: String, message: String },

    #[error("data conversion failed: {0}")]
    DataConversion(String),

    #[error("{message} [query: {query}]")]
    Persistence {
        message: String,
        query: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
}

impl PersistenceError {
    pub(crate) fn mapping(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidMapping {
            entity: entity.into(),
            message: message.into(),
        }
    }

    pub(crate) fn repository(repository: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRepository {
            repository: repository.into(),
            message: message.into(),
        }
    }

    pub(crate) fn store(
        message: impl Into<String>,
        query: impl ToString,
        source: rusqlite::Error,
    ) -> Self {
        Self::Persistence {
            message: message.into(),
            query: query.to_string(),
            source: Some(source),
        }
    }

    pub(crate) fn execution(message: impl Into<String>, query: impl ToString) -> Self {
        Self::Persistence {
            message: message.into(),
            query: query.to_string(),
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidMapping { .. } => ErrorKind::InvalidMapping,
            Self::InvalidConfiguration(_) => ErrorKind::InvalidConfiguration,
            Self::InvalidRepository { .. } => ErrorKind::InvalidRepository,
            Self::UniqueConstraintViolation { .. } => ErrorKind::UniqueConstraintViolation,
            Self::ForeignConstraintViolation { .. } => ErrorKind::ForeignConstraintViolation,
            Self::ChildConstraintViolation { .. } => ErrorKind::ChildConstraintViolation,
            Self::DataConversion(_) => ErrorKind::DataConversion,
            Self::Persistence { .. } => ErrorKind::Persistence,
            Self::UnsupportedOperation(_) => ErrorKind::UnsupportedOperation,
        }
    }

    /// Returns the constraint name for constraint violations.
    pub fn constraint_name(&self) -> Option<&str> {
        match self {
            Self::UniqueConstraintViolation { constraint, .. }
            | Self::ForeignConstraintViolation { constraint, .. }
            | Self::ChildConstraintViolation { constraint, .. } => Some(constraint.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorKind, PersistenceError};

    #[test]
    fn persistence_error_renders_query_context() {
        let err = PersistenceError::execution("multiple rows found", "FinderQuery[table=EMPLOYEE]");
        assert_eq!(err.kind(), ErrorKind::Persistence);
        assert_eq!(
            err.to_string(),
            "multiple rows found [query: FinderQuery[table=EMPLOYEE]]"
        );
    }

    #[test]
    fn constraint_name_is_exposed_for_violations_only() {
        let err = PersistenceError::UniqueConstraintViolation {
            constraint: "EmpNo".to_string(),
            message: "Unique constraint violated: EmpNo".to_string(),
        };
        assert_eq!(err.constraint_name(), Some("EmpNo"));
        assert_eq!(
            PersistenceError::DataConversion("x".to_string()).constraint_name(),
            None
        );
    }
}
