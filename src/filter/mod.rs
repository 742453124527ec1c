//! Validated runtime filters.
//!
//! Client filters arrive as untyped `key → value` pairs. [`FilterValidator`]
//! checks them against the report's filter definitions and produces an
//! ordered list of typed [`Filter`]s that the query composer can render for
//! any backend.

mod validate;

pub use validate::{validate_and_map, FilterValidator};

use serde::Serialize;

use crate::definition::{RANGE_END_SUFFIX, RANGE_START_SUFFIX};

/// How a filter value is applied in the generated predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterTag {
    Standard,
    RangeStart,
    RangeEnd,
    DateRangeStart,
    DateRangeEnd,
    Boolean,
    Dynamic,
    Multiselect,
}

/// A validated filter: field, raw value and how to apply it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Filter {
    pub field: String,
    pub value: String,
    pub tag: FilterTag,
}

impl Filter {
    pub fn new(field: impl Into<String>, value: impl Into<String>, tag: FilterTag) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            tag,
        }
    }

    pub fn standard(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(field, value, FilterTag::Standard)
    }
}

/// Which end of a range a filter key addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum RangeBound {
    None,
    Start,
    End,
}

/// Strip a range suffix from a filter key to get the logical field name.
pub fn truncate_based_on_suffix(key: &str) -> &str {
    key.strip_suffix(RANGE_START_SUFFIX)
        .or_else(|| key.strip_suffix(RANGE_END_SUFFIX))
        .unwrap_or(key)
}

pub(crate) fn range_bound(key: &str) -> RangeBound {
    if key.ends_with(RANGE_START_SUFFIX) {
        RangeBound::Start
    } else if key.ends_with(RANGE_END_SUFFIX) {
        RangeBound::End
    } else {
        RangeBound::None
    }
}
