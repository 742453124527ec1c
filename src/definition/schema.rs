//! Dataset schema fields.

use serde::{Deserialize, Serialize};

use super::filter::FilterDefinition;

/// Column types a dataset schema can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Long,
    Double,
    Boolean,
    Date,
    #[serde(alias = "datetime")]
    DateTime,
    Time,
    Timestamp,
}

impl FieldType {
    /// Name used in error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Long => "long",
            FieldType::Double => "double",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::DateTime => "datetime",
            FieldType::Time => "time",
            FieldType::Timestamp => "timestamp",
        }
    }

    /// Whether values of this type are calendar dates or date-times.
    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            FieldType::Date | FieldType::DateTime | FieldType::Timestamp
        )
    }
}

/// A single column of a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub display: Option<String>,
    #[serde(default)]
    pub filter: Option<FilterDefinition>,
}

impl SchemaField {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            display: None,
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: FilterDefinition) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// Ordered field list of a dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub field: Vec<SchemaField>,
}

impl Schema {
    pub fn new(field: Vec<SchemaField>) -> Self {
        Self { field }
    }

    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.field.iter().find(|f| f.name == name)
    }
}
