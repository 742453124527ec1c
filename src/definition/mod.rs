//! Report definitions: datasets, schemas, filters, policies and variants.
//!
//! These types are deserialized from the definition store's JSON documents
//! and are read-only for the rest of the crate.

mod filter;
mod policy;
mod report;
mod schema;
mod store;

pub use filter::{
    is_date_token, resolve_date_token, DynamicOptions, FilterDefinition, FilterType,
    StaticOption, RANGE_END_SUFFIX, RANGE_START_SUFFIX,
};
pub use policy::{Condition, Effect, Policy, PolicyType, Rule};
pub use report::{
    Dataset, MultiphaseQuery, ReportDefinition, ReportField, ReportSummary, ReportVariant,
    ResolvedReport,
};
pub use schema::{FieldType, Schema, SchemaField};
pub use store::{DefinitionError, DefinitionStore, InMemoryDefinitionStore};
