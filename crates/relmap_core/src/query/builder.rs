//! Resolution of repository method shapes into condition/column templates.
//!
//! # Responsibility
//! - Derive condition bindings from explicit parameter markers or method names.
//! - Derive finder result bindings from the declared return shape.
//!
//! # Invariants
//! - When any parameter carries a marker, every parameter must carry one.
//! - Name-derived conditions match declared parameters one to one.
//! - Resolution is a pure function of (method shape, entity descriptor).
//!
//! # See also
//! - docs/architecture/query-model.md

use super::{ColumnBinding, ConditionBinding, Operator, ResultBinding, ValueSource};
use crate::error::{PersistenceError, PersistenceResult};
use crate::model::EntityDescriptor;
use crate::repository::{MethodShape, ParamRole, ResultKind};
use once_cell::sync::Lazy;
use regex::Regex;

static BY_CLAUSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z][A-Za-z0-9]*?By([A-Z][A-Za-z0-9]*)$")
        .expect("by-clause regex must compile")
});

/// Splits the `By` clause of a method name into field names.
///
/// `findByEmployeeNoAndName` yields `["employeeNo", "name"]`; names without a
/// `By` clause yield `None`.
pub(crate) fn split_method_name(method_name: &str) -> Option<Vec<String>> {
    let clause = BY_CLAUSE.captures(method_name)?.get(1)?.as_str();
    Some(split_on_and(clause).into_iter().map(decapitalize).collect())
}

fn split_on_and(clause: &str) -> Vec<&str> {
    let bytes = clause.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0;
    let mut position = 1;
    while position + 3 < bytes.len() {
        if &bytes[position..position + 3] == b"And" && bytes[position + 3].is_ascii_uppercase() {
            parts.push(&clause[start..position]);
            start = position + 3;
            position = start + 1;
            continue;
        }
        position += 1;
    }
    parts.push(&clause[start..]);
    parts
}

fn decapitalize(token: &str) -> String {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Templates produced from explicitly marked parameters.
#[derive(Debug, Default)]
pub(crate) struct MarkerBindings {
    pub(crate) conditions: Vec<ConditionBinding>,
    pub(crate) columns: Vec<ColumnBinding>,
}

pub(crate) struct ConditionQueryBuilder<'a> {
    descriptor: &'a EntityDescriptor,
    repository: &'a str,
    method: &'a MethodShape,
}

impl<'a> ConditionQueryBuilder<'a> {
    pub(crate) fn new(
        descriptor: &'a EntityDescriptor,
        repository: &'a str,
        method: &'a MethodShape,
    ) -> Self {
        Self {
            descriptor,
            repository,
            method,
        }
    }

    pub(crate) fn invalid(&self, message: impl AsRef<str>) -> PersistenceError {
        PersistenceError::repository(
            self.repository,
            format!("method `{}`: {}", self.method.name(), message.as_ref()),
        )
    }

    fn column_of(&self, field: &str) -> PersistenceResult<String> {
        self.descriptor
            .field(field)
            .map(|descriptor| descriptor.column().to_string())
            .ok_or_else(|| {
                self.invalid(format!(
                    "field `{field}` does not exist on entity `{}`",
                    self.descriptor.entity_name()
                ))
            })
    }

    /// Resolves templates from parameter markers.
    ///
    /// Returns `None` when no parameter is marked. `Column` markers are
    /// accepted only when `allow_columns` is set.
    pub(crate) fn from_markers(
        &self,
        allow_columns: bool,
    ) -> PersistenceResult<Option<MarkerBindings>> {
        let is_marker = |role: &ParamRole| match role {
            ParamRole::Condition { .. } | ParamRole::ConditionObject(_) => true,
            ParamRole::Column { .. } => allow_columns,
            ParamRole::Value | ParamRole::Entity => false,
        };
        if !self.method.params().iter().any(is_marker) {
            return Ok(None);
        }

        let mut bindings = MarkerBindings::default();
        for (index, role) in self.method.params().iter().enumerate() {
            match role {
                ParamRole::Condition { field, operator } => {
                    bindings.conditions.push(ConditionBinding {
                        field: field.clone(),
                        column: self.column_of(field)?,
                        operator: *operator,
                        source: ValueSource::Param(index),
                        structural: false,
                    });
                }
                ParamRole::ConditionObject(object) => {
                    if object.properties().is_empty() {
                        return Err(self.invalid(format!(
                            "condition object `{}` declares no condition fields",
                            object.name()
                        )));
                    }
                    for property in object.properties() {
                        bindings.conditions.push(ConditionBinding {
                            field: property.field.clone(),
                            column: self.column_of(&property.field)?,
                            operator: property.operator,
                            source: ValueSource::Property {
                                index,
                                property: property.property.clone(),
                            },
                            structural: true,
                        });
                    }
                }
                ParamRole::Column { field } if allow_columns => {
                    bindings.columns.push(ColumnBinding {
                        field: field.clone(),
                        column: self.column_of(field)?,
                        source: ValueSource::Param(index),
                    });
                }
                _ => {
                    return Err(self.invalid(format!(
                        "parameter {index} carries no condition marker while other parameters do"
                    )));
                }
            }
        }
        Ok(Some(bindings))
    }

    /// Resolves equality conditions from the `By` clause of the method name.
    pub(crate) fn from_method_name(&self) -> PersistenceResult<Option<Vec<ConditionBinding>>> {
        let Some(fields) = split_method_name(self.method.name()) else {
            return Ok(None);
        };
        let params = self.method.params();
        if fields.len() != params.len() {
            return Err(self.invalid(format!(
                "name derives {} condition(s) but {} parameter(s) are declared",
                fields.len(),
                params.len()
            )));
        }

        fields
            .into_iter()
            .enumerate()
            .map(|(index, field)| {
                if !matches!(params[index], ParamRole::Value) {
                    return Err(self.invalid(format!(
                        "parameter {index} must be a plain value for name-derived conditions"
                    )));
                }
                Ok(ConditionBinding {
                    column: self.column_of(&field)?,
                    field,
                    operator: Operator::Eq,
                    source: ValueSource::Param(index),
                    structural: false,
                })
            })
            .collect::<PersistenceResult<Vec<_>>>()
            .map(Some)
    }

    /// Markers first, then the method name; `allow_empty` accepts
    /// parameterless methods without conditions.
    pub(crate) fn resolve_conditions(
        &self,
        allow_empty: bool,
    ) -> PersistenceResult<Vec<ConditionBinding>> {
        if let Some(bindings) = self.from_markers(false)? {
            return Ok(bindings.conditions);
        }
        if let Some(conditions) = self.from_method_name()? {
            return Ok(conditions);
        }
        if allow_empty && self.method.params().is_empty() {
            return Ok(Vec::new());
        }
        Err(self.invalid(
            "conditions can be derived neither from parameter markers nor from the method name",
        ))
    }

    /// Resolves the result columns of a finder.
    pub(crate) fn result_bindings(
        &self,
        kind: &ResultKind,
    ) -> PersistenceResult<Vec<ResultBinding>> {
        match kind {
            ResultKind::Entity => Ok(self
                .descriptor
                .table_owned_fields()
                .map(|field| ResultBinding {
                    field: field.name().to_string(),
                    column: field.column().to_string(),
                    key: field.name().to_string(),
                })
                .collect()),
            ResultKind::Field(field) => Ok(vec![ResultBinding {
                field: field.clone(),
                column: self.column_of(field)?,
                key: field.clone(),
            }]),
            ResultKind::Structured(structured) => {
                let pairs = if structured.mappings().is_empty() {
                    structured.type_fields()
                } else {
                    structured.mappings()
                };
                if pairs.is_empty() {
                    return Err(self.invalid(format!(
                        "structured result `{}` maps no fields",
                        structured.name()
                    )));
                }
                pairs
                    .iter()
                    .map(|(property, field)| {
                        Ok(ResultBinding {
                            field: field.clone(),
                            column: self.column_of(field)?,
                            key: property.clone(),
                        })
                    })
                    .collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::split_method_name;

    #[test]
    fn method_names_split_into_field_names() {
        assert_eq!(
            split_method_name("findByEmployeeNoAndName"),
            Some(vec!["employeeNo".to_string(), "name".to_string()])
        );
        assert_eq!(
            split_method_name("deleteByBrandAndAndroidVersion"),
            Some(vec!["brand".to_string(), "androidVersion".to_string()])
        );
    }

    #[test]
    fn method_names_without_by_clause_yield_none() {
        assert_eq!(split_method_name("deleteAll"), None);
        assert_eq!(split_method_name("findBy"), None);
    }
}
