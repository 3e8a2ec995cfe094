/// Validated audit shadow-table metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditDescriptor {
    pub(crate) table: String,
    pub(crate) id_column: String,
    pub(crate) type_column: String,
    pub(crate) time_column: String,
    pub(crate) changed_by_column: String,
}

impl AuditDescriptor {
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn id_column(&self) -> &str {
        &self.id_column
    }

    pub fn type_column(&self) -> &str {
        &self.type_column
    }

    pub fn time_column(&self) -> &str {
        &self.time_column
    }

    pub fn changed_by_column(&self) -> &str {
        &self.changed_by_column
    }

    /// Audit bookkeeping columns, in shadow-table order.
    pub fn bookkeeping_columns(&self) -> [&str; 4] {
        [
            self.id_column.as_str(),
            self.type_column.as_str(),
            self.time_column.as_str(),
            self.changed_by_column.as_str(),
        ]
    }
}
