//! Report definitions as read from the definition store.

use serde::{Deserialize, Serialize};

use super::filter::FilterDefinition;
use super::policy::Policy;
use super::schema::{Schema, SchemaField};

/// Prefix used by report fields that point at a schema field.
const REF_PREFIX: &str = "$ref:";

/// One statement of a multi-phase dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiphaseQuery {
    pub index: u32,
    pub query: String,
    /// Backend executing this phase; defaults to the report's datasource.
    #[serde(default)]
    pub datasource: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub query: String,
    #[serde(default)]
    pub schema: Schema,
    #[serde(default)]
    pub multiphase_query: Vec<MultiphaseQuery>,
}

impl Dataset {
    pub fn new(id: impl Into<String>, query: impl Into<String>, fields: Vec<SchemaField>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            query: query.into(),
            schema: Schema::new(fields),
            multiphase_query: vec![],
        }
    }

    /// Phases ordered by index, empty for single-statement datasets.
    pub fn phases(&self) -> Vec<&MultiphaseQuery> {
        let mut phases: Vec<_> = self.multiphase_query.iter().collect();
        phases.sort_by_key(|p| p.index);
        phases
    }
}

/// A display column of a report variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportField {
    pub name: String,
    #[serde(default)]
    pub display: Option<String>,
    #[serde(default)]
    pub formula: Option<String>,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub sortable: bool,
    #[serde(default)]
    pub default_sort: bool,
    #[serde(default)]
    pub filter: Option<FilterDefinition>,
}

fn default_true() -> bool {
    true
}

impl ReportField {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display: None,
            formula: None,
            visible: true,
            sortable: false,
            default_sort: false,
            filter: None,
        }
    }

    pub fn with_formula(mut self, formula: impl Into<String>) -> Self {
        self.formula = Some(formula.into());
        self
    }

    pub fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }

    /// Mark the field as the variant's default sort; implies sortable.
    pub fn default_sort(mut self) -> Self {
        self.sortable = true;
        self.default_sort = true;
        self
    }

    pub fn with_filter(mut self, filter: FilterDefinition) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Field name with any `$ref:` prefix removed.
    pub fn field_name(&self) -> &str {
        self.name.strip_prefix(REF_PREFIX).unwrap_or(&self.name)
    }
}

/// A derived aggregate over the result table of a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub id: String,
    #[serde(default)]
    pub template: String,
    /// Query over the result table, referenced as `${table_id}`.
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportVariant {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub fields: Vec<ReportField>,
    #[serde(default)]
    pub summaries: Vec<ReportSummary>,
    #[serde(default)]
    pub catalog: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
}

impl ReportVariant {
    pub fn new(id: impl Into<String>, fields: Vec<ReportField>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            fields,
            summaries: vec![],
            catalog: None,
            database: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDefinition {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Backend name the report's queries run against.
    pub datasource: String,
    pub dataset: Dataset,
    #[serde(default)]
    pub variants: Vec<ReportVariant>,
    #[serde(default)]
    pub policies: Vec<Policy>,
}

impl ReportDefinition {
    /// Select a variant, producing the view used by validation and execution.
    pub fn resolve(&self, variant_id: &str) -> Option<ResolvedReport<'_>> {
        let variant = self.variants.iter().find(|v| v.id == variant_id)?;
        Some(ResolvedReport {
            definition: self,
            variant,
        })
    }
}

/// A report definition narrowed to one variant.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedReport<'a> {
    pub definition: &'a ReportDefinition,
    pub variant: &'a ReportVariant,
}

impl<'a> ResolvedReport<'a> {
    pub fn schema(&self) -> &'a Schema {
        &self.definition.dataset.schema
    }

    pub fn datasource(&self) -> &'a str {
        &self.definition.datasource
    }

    pub fn report_field(&self, name: &str) -> Option<&'a ReportField> {
        self.variant.fields.iter().find(|f| f.field_name() == name)
    }

    /// Effective filter for a field: a report-level override wins over
    /// the dataset schema.
    pub fn filter_definition(&self, name: &str) -> Option<&'a FilterDefinition> {
        self.report_field(name)
            .and_then(|f| f.filter.as_ref())
            .or_else(|| self.schema().field(name).and_then(|f| f.filter.as_ref()))
    }

    /// Names of fields that carry a filter, in schema order followed by
    /// report-only fields.
    pub fn filterable_fields(&self) -> Vec<&'a str> {
        let mut names: Vec<&str> = self
            .schema()
            .field
            .iter()
            .map(|f| f.name.as_str())
            .filter(|n| self.filter_definition(n).is_some())
            .collect();
        for field in &self.variant.fields {
            let name = field.field_name();
            if field.filter.is_some() && !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    pub fn summary(&self, summary_id: &str) -> Option<&'a ReportSummary> {
        self.variant.summaries.iter().find(|s| s.id == summary_id)
    }

    /// Per-column formula templates declared by the variant.
    pub fn formulas(&self) -> std::collections::BTreeMap<String, String> {
        self.variant
            .fields
            .iter()
            .filter_map(|f| {
                f.formula
                    .as_ref()
                    .map(|formula| (f.field_name().to_string(), formula.clone()))
            })
            .collect()
    }
}
