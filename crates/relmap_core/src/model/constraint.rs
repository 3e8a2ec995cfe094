//! Validated constraint and index descriptors.

use super::EntityRef;
use crate::value::{Record, Value};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static MESSAGE_VARIABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}")
        .expect("message variable regex must compile")
});

/// Renders `${field}` placeholders from `values`; unknown fields render empty.
pub(crate) fn render_message(template: &str, values: &Record) -> String {
    MESSAGE_VARIABLE
        .replace_all(template, |captures: &Captures<'_>| match values.get(&captures[1]) {
            Some(Value::Null) | None => String::new(),
            Some(value) => value.to_string(),
        })
        .into_owned()
}

/// What happens to child rows when their parent is deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CascadePolicy {
    #[default]
    BlockIfChildrenExist,
    DeleteWithParent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UniqueConstraint {
    pub(crate) name: String,
    pub(crate) fields: Vec<String>,
    pub(crate) columns: Vec<String>,
    pub(crate) message: Option<String>,
    pub(crate) validate: bool,
}

impl UniqueConstraint {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn is_validated(&self) -> bool {
        self.validate
    }

    /// Renders the violation message for the offending values.
    pub fn violation_message(&self, values: &Record) -> String {
        match &self.message {
            Some(template) => render_message(template, values),
            None => format!("Unique constraint violated: {}", self.name),
        }
    }
}

/// One owner-field to target-field pairing of a foreign constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub owner_field: String,
    pub owner_column: String,
    pub target_field: String,
    pub target_column: String,
}

/// Fixed `field == value` scope of a relation.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticCondition {
    pub field: String,
    pub column: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForeignConstraint {
    pub(crate) name: String,
    pub(crate) target: EntityRef,
    pub(crate) target_table: String,
    pub(crate) mappings: Vec<FieldMapping>,
    pub(crate) owner_conditions: Vec<StaticCondition>,
    pub(crate) target_conditions: Vec<StaticCondition>,
    pub(crate) cascade: CascadePolicy,
    pub(crate) message: Option<String>,
    pub(crate) validate: bool,
    pub(crate) mapped_by: bool,
}

impl ForeignConstraint {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> EntityRef {
        self.target
    }

    pub fn target_table(&self) -> &str {
        &self.target_table
    }

    pub fn mappings(&self) -> &[FieldMapping] {
        &self.mappings
    }

    pub fn owner_conditions(&self) -> &[StaticCondition] {
        &self.owner_conditions
    }

    pub fn target_conditions(&self) -> &[StaticCondition] {
        &self.target_conditions
    }

    pub fn cascade(&self) -> CascadePolicy {
        self.cascade
    }

    pub fn is_validated(&self) -> bool {
        self.validate
    }

    pub fn is_mapped_by(&self) -> bool {
        self.mapped_by
    }

    pub fn has_conditions(&self) -> bool {
        !self.owner_conditions.is_empty() || !self.target_conditions.is_empty()
    }

    pub fn violation_message(&self, values: &Record) -> String {
        match &self.message {
            Some(template) => render_message(template, values),
            None => format!("Foreign constraint violated: {}", self.name),
        }
    }
}

/// Reverse view of a foreign constraint, held by the target entity.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildConstraint {
    pub(crate) name: String,
    pub(crate) child: EntityRef,
    pub(crate) child_table: String,
    pub(crate) child_id_column: String,
    pub(crate) mappings: Vec<FieldMapping>,
    pub(crate) child_conditions: Vec<StaticCondition>,
    pub(crate) cascade: CascadePolicy,
}

impl ChildConstraint {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn child(&self) -> EntityRef {
        self.child
    }

    pub fn child_table(&self) -> &str {
        &self.child_table
    }

    pub fn child_id_column(&self) -> &str {
        &self.child_id_column
    }

    pub fn child_conditions(&self) -> &[StaticCondition] {
        &self.child_conditions
    }

    /// Mappings from child (owner) fields to parent (target) fields.
    pub fn mappings(&self) -> &[FieldMapping] {
        &self.mappings
    }

    pub fn cascade(&self) -> CascadePolicy {
        self.cascade
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescriptor {
    pub(crate) name: String,
    pub(crate) fields: Vec<String>,
    pub(crate) columns: Vec<String>,
}

impl IndexDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

#[cfg(test)]
mod tests {
    use super::render_message;
    use crate::value::Record;

    #[test]
    fn render_message_substitutes_field_values() {
        let values = Record::new().with("emailId", "kranti@kranti.com");
        assert_eq!(
            render_message("Specified email-id already exists: ${emailId}", &values),
            "Specified email-id already exists: kranti@kranti.com"
        );
    }

    #[test]
    fn render_message_blanks_unknown_variables() {
        assert_eq!(
            render_message("Invalid parent ${parentId}!", &Record::new()),
            "Invalid parent !"
        );
    }
}
