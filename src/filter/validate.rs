//! Filter validation and mapping.

use std::collections::{HashMap, HashSet};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;

use super::{range_bound, truncate_based_on_suffix, Filter, FilterTag, RangeBound};
use crate::definition::{resolve_date_token, FieldType, FilterDefinition, FilterType, ResolvedReport};
use crate::error::{ValidationError, ValidationErrorKind};

const MULTISELECT_SEPARATOR: char = ',';

/// Validate against today's date.
pub fn validate_and_map(
    report: ResolvedReport<'_>,
    raw_filters: &HashMap<String, String>,
    interactive_stage: Option<bool>,
    exempt_fields: Option<&HashSet<String>>,
) -> Result<Vec<Filter>, ValidationError> {
    FilterValidator::new(report).validate_and_map(raw_filters, interactive_stage, exempt_fields)
}

/// Validates client filters for one report variant.
#[derive(Debug, Clone, Copy)]
pub struct FilterValidator<'a> {
    report: ResolvedReport<'a>,
    today: NaiveDate,
}

/// A supplied filter after definition lookup.
struct Candidate<'a> {
    key: &'a str,
    field: &'a str,
    value: &'a str,
    bound: RangeBound,
    definition: &'a FilterDefinition,
}

impl<'a> FilterValidator<'a> {
    pub fn new(report: ResolvedReport<'a>) -> Self {
        Self {
            report,
            today: chrono::Local::now().date_naive(),
        }
    }

    /// Resolve `today(...)` bounds against a fixed date.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Validate raw filters and map them to typed filters.
    ///
    /// `interactive_stage` selects which mandatory filters are required and
    /// rejects filters belonging to the other stage. `exempt_fields` skips
    /// the mandatory check entirely and skips pattern checks for the listed
    /// fields.
    ///
    /// Empty values are treated as not supplied.
    pub fn validate_and_map(
        &self,
        raw_filters: &'a HashMap<String, String>,
        interactive_stage: Option<bool>,
        exempt_fields: Option<&HashSet<String>>,
    ) -> Result<Vec<Filter>, ValidationError> {
        let candidates = self.lookup(raw_filters)?;

        if exempt_fields.is_none() {
            self.check_mandatory(&candidates, interactive_stage)?;
        }

        if let Some(stage) = interactive_stage {
            if let Some(c) = candidates.iter().find(|c| c.definition.interactive != stage) {
                return Err(ValidationErrorKind::StageMismatch.error(&[c.key, &stage.to_string()]));
            }
        }

        let mut filters = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            let exempt = exempt_fields.is_some_and(|f| f.contains(candidate.field));
            filters.push(self.map_filter(candidate, exempt)?);
        }
        Ok(filters)
    }

    /// Build the single dynamic filter used for type-ahead lookups.
    pub fn dynamic_filter(&self, field: &str, prefix: &str) -> Result<Filter, ValidationError> {
        let definition = self
            .report
            .filter_definition(field)
            .ok_or_else(|| ValidationErrorKind::InvalidFilters.error(&[field]))?;
        let options = definition
            .dynamic_options
            .as_ref()
            .ok_or_else(|| ValidationErrorKind::InvalidDynamicFilter.error(&[field]))?;
        if prefix.chars().count() < options.minimum_length {
            return Err(ValidationErrorKind::InvalidDynamicOptions
                .error(&[field, &options.minimum_length.to_string()]));
        }
        Ok(Filter::new(field, prefix, FilterTag::Dynamic))
    }

    /// Find each key's definition and order candidates by field position,
    /// then plain/start/end.
    fn lookup(
        &self,
        raw_filters: &'a HashMap<String, String>,
    ) -> Result<Vec<Candidate<'a>>, ValidationError> {
        let positions: HashMap<&str, usize> = self
            .report
            .filterable_fields()
            .into_iter()
            .enumerate()
            .map(|(i, name)| (name, i))
            .collect();

        let mut keys: Vec<&String> = raw_filters.keys().collect();
        keys.sort();

        let mut candidates = Vec::with_capacity(keys.len());
        for key in keys {
            let value = raw_filters[key].as_str();
            let field = truncate_based_on_suffix(key);
            let definition = self
                .report
                .filter_definition(field)
                .ok_or_else(|| ValidationErrorKind::InvalidFilters.error(&[key.as_str()]))?;
            if value.trim().is_empty() {
                continue;
            }
            candidates.push(Candidate {
                key,
                field,
                value,
                bound: range_bound(key),
                definition,
            });
        }

        candidates.sort_by_key(|c| (positions.get(c.field).copied().unwrap_or(usize::MAX), c.bound));
        Ok(candidates)
    }

    fn check_mandatory(
        &self,
        candidates: &[Candidate<'_>],
        interactive_stage: Option<bool>,
    ) -> Result<(), ValidationError> {
        for field in self.report.filterable_fields() {
            let Some(definition) = self.report.filter_definition(field) else {
                continue;
            };
            let applies = interactive_stage.map_or(true, |stage| definition.interactive == stage);
            if definition.mandatory && applies && !candidates.iter().any(|c| c.field == field) {
                return Err(ValidationErrorKind::MissingMandatoryFilter.error(&[field]));
            }
        }
        Ok(())
    }

    fn map_filter(&self, c: &Candidate<'_>, exempt: bool) -> Result<Filter, ValidationError> {
        let field_type = self
            .report
            .schema()
            .field(c.field)
            .map(|f| f.field_type)
            .unwrap_or(FieldType::String);
        let multiselect = c.definition.filter_type == FilterType::Multiselect;

        let values: Vec<&str> = if multiselect {
            c.value.split(MULTISELECT_SEPARATOR).map(str::trim).collect()
        } else {
            vec![c.value]
        };

        for value in &values {
            validate_type(c.field, value, field_type)?;
            self.validate_bounds(c, value, field_type)?;
            validate_static_options(c.field, value, c.definition)?;
        }

        if !exempt {
            validate_pattern(c.field, c.value, c.definition)?;
        }

        let tag = match (field_type, c.bound, c.definition.filter_type) {
            (FieldType::Boolean, _, _) => FilterTag::Boolean,
            (_, RangeBound::Start, FilterType::DateRange) => FilterTag::DateRangeStart,
            (_, RangeBound::End, FilterType::DateRange) => FilterTag::DateRangeEnd,
            (_, RangeBound::Start, _) => FilterTag::RangeStart,
            (_, RangeBound::End, _) => FilterTag::RangeEnd,
            (_, RangeBound::None, FilterType::Multiselect) => FilterTag::Multiselect,
            _ => FilterTag::Standard,
        };

        Ok(Filter::new(c.field, c.value, tag))
    }

    fn validate_bounds(
        &self,
        c: &Candidate<'_>,
        value: &str,
        field_type: FieldType,
    ) -> Result<(), ValidationError> {
        let (min, max) = (c.definition.min.as_deref(), c.definition.max.as_deref());
        if min.is_none() && max.is_none() {
            return Ok(());
        }
        let out_of_range = || {
            ValidationErrorKind::OutOfRange.error(&[
                value,
                c.field,
                min.unwrap_or("-"),
                max.unwrap_or("-"),
            ])
        };

        if field_type.is_temporal() {
            let Some(date) = parse_date_prefix(value) else {
                return Ok(());
            };
            let below = min
                .and_then(|m| resolve_date_token(m, self.today))
                .is_some_and(|m| date < m);
            let above = max
                .and_then(|m| resolve_date_token(m, self.today))
                .is_some_and(|m| date > m);
            if below || above {
                return Err(out_of_range());
            }
        } else if matches!(field_type, FieldType::Long | FieldType::Double) {
            let Ok(number) = value.parse::<f64>() else {
                return Ok(());
            };
            let below = min
                .and_then(|m| m.parse::<f64>().ok())
                .is_some_and(|m| number < m);
            let above = max
                .and_then(|m| m.parse::<f64>().ok())
                .is_some_and(|m| number > m);
            if below || above {
                return Err(out_of_range());
            }
        }
        Ok(())
    }
}

fn validate_type(field: &str, value: &str, field_type: FieldType) -> Result<(), ValidationError> {
    let valid = match field_type {
        FieldType::String => true,
        FieldType::Long => value.parse::<i64>().is_ok(),
        FieldType::Double => value.parse::<f64>().is_ok(),
        FieldType::Boolean => {
            value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false")
        }
        FieldType::Date => NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok(),
        FieldType::DateTime | FieldType::Timestamp => {
            NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
                || NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").is_ok()
                || NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").is_ok()
        }
        FieldType::Time => {
            NaiveTime::parse_from_str(value, "%H:%M:%S").is_ok()
                || NaiveTime::parse_from_str(value, "%H:%M").is_ok()
        }
    };
    if valid {
        Ok(())
    } else {
        Err(ValidationErrorKind::InvalidValue.error(&[value, field, field_type.as_str()]))
    }
}

fn validate_static_options(
    field: &str,
    value: &str,
    definition: &FilterDefinition,
) -> Result<(), ValidationError> {
    match &definition.static_options {
        Some(options)
            if !options.is_empty() && !options.iter().any(|o| o.name.eq_ignore_ascii_case(value)) =>
        {
            Err(ValidationErrorKind::InvalidStaticOption.error(&[field, value]))
        }
        _ => Ok(()),
    }
}

fn validate_pattern(
    field: &str,
    value: &str,
    definition: &FilterDefinition,
) -> Result<(), ValidationError> {
    let Some(pattern) = &definition.pattern else {
        return Ok(());
    };
    let regex = Regex::new(&format!("^(?:{})$", pattern))
        .map_err(|_| ValidationErrorKind::InvalidPattern.error(&[field, pattern]))?;
    if regex.is_match(value) {
        Ok(())
    } else {
        Err(ValidationErrorKind::PatternMismatch.error(&[value, field, pattern]))
    }
}

fn parse_date_prefix(value: &str) -> Option<NaiveDate> {
    value
        .get(..10)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
}
