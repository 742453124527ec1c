use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;

use reportal::definition::ReportDefinition;
use reportal::error::ValidationErrorKind;
use reportal::filter::{validate_and_map, Filter, FilterTag, FilterValidator};

const DEFINITIONS: &str = include_str!("../fixtures/external_movements.json");

const PATTERNED: &str = r#"{
  "id": "prisoners",
  "datasource": "local",
  "dataset": {
    "id": "prisoners",
    "query": "SELECT * FROM prisoners",
    "schema": { "field": [
      { "name": "prison_number", "type": "string",
        "filter": { "type": "text", "mandatory": true, "pattern": "[A-Z][0-9]{4}[A-Z]{2}" } },
      { "name": "age", "type": "long",
        "filter": { "type": "numericRange", "min": "18", "max": "120" } },
      { "name": "released", "type": "datetime",
        "filter": { "type": "date", "max": "today()" } }
    ] }
  },
  "variants": [{ "id": "all", "fields": [
    { "name": "$ref:prison_number" },
    { "name": "$ref:age", "filter": { "type": "numericRange", "min": "21" } }
  ] }]
}"#;

fn movements() -> ReportDefinition {
    let all: Vec<ReportDefinition> = serde_json::from_str(DEFINITIONS).unwrap();
    all.into_iter().find(|d| d.id == "external-movements").unwrap()
}

fn prisoners() -> ReportDefinition {
    serde_json::from_str(PATTERNED).unwrap()
}

fn raw(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn test_date_range_maps_to_start_and_end() {
    let def = movements();
    let report = def.resolve("last-month").unwrap();
    let filters = validate_and_map(
        report,
        &raw(&[("date.end", "2023-04-30"), ("date.start", "2023-04-01")]),
        Some(false),
        None,
    )
    .unwrap();
    assert_eq!(
        filters,
        vec![
            Filter::new("date", "2023-04-01", FilterTag::DateRangeStart),
            Filter::new("date", "2023-04-30", FilterTag::DateRangeEnd),
        ]
    );
}

#[test]
fn test_filters_follow_schema_order() {
    let def = movements();
    let report = def.resolve("last-month").unwrap();
    let filters = validate_and_map(
        report,
        &raw(&[
            ("is_closed", "false"),
            ("reason", "Court,Transfer"),
            ("direction", "in"),
            ("date.start", "2023-04-01"),
        ]),
        None,
        None,
    )
    .unwrap();
    let tags: Vec<(&str, FilterTag)> = filters.iter().map(|f| (f.field.as_str(), f.tag)).collect();
    assert_eq!(
        tags,
        vec![
            ("date", FilterTag::DateRangeStart),
            ("direction", FilterTag::Standard),
            ("reason", FilterTag::Multiselect),
            ("is_closed", FilterTag::Boolean),
        ]
    );
}

#[test]
fn test_stages_split_mandatory_and_allowed_filters() {
    let def = movements();
    let report = def.resolve("last-month").unwrap();

    // Interactive stage: the non-interactive mandatory date is not required
    let interactive = validate_and_map(report, &raw(&[("direction", "out")]), Some(true), None).unwrap();
    assert_eq!(interactive, vec![Filter::standard("direction", "out")]);

    let err = validate_and_map(report, &raw(&[("date.start", "2023-04-01")]), Some(true), None)
        .unwrap_err();
    assert_eq!(err.kind, ValidationErrorKind::StageMismatch);

    let err = validate_and_map(report, &raw(&[("direction", "out")]), Some(false), None).unwrap_err();
    assert_eq!(err.kind, ValidationErrorKind::MissingMandatoryFilter);
    assert_eq!(err.message, "Mandatory filter value not provided: date");
}

#[test]
fn test_blank_values_count_as_missing() {
    let def = movements();
    let report = def.resolve("last-month").unwrap();
    let err = validate_and_map(report, &raw(&[("date.start", "  ")]), Some(false), None).unwrap_err();
    assert_eq!(err.kind, ValidationErrorKind::MissingMandatoryFilter);
}

#[test]
fn test_unknown_keys_are_rejected() {
    let def = movements();
    let report = def.resolve("last-month").unwrap();
    let err = validate_and_map(report, &raw(&[("origin_code", "LEI")]), None, None).unwrap_err();
    assert_eq!(err.kind, ValidationErrorKind::InvalidFilters);
    assert_eq!(err.message, "Invalid filters provided: origin_code");
    assert_eq!(err.kind.reason(), "INVALID_FILTERS");
}

#[test]
fn test_date_default_token() {
    let def = movements();
    let report = def.resolve("last-month").unwrap();
    let today = NaiveDate::from_ymd_opt(2023, 5, 15).unwrap();
    let date = report.filter_definition("date").unwrap();
    assert_eq!(date.resolved_default(today).as_deref(), Some("2023-04-15"));
}

#[test]
fn test_pattern_and_exemption() {
    let def = prisoners();
    let report = def.resolve("all").unwrap();

    let err = validate_and_map(report, &raw(&[("prison_number", "A12")]), None, None).unwrap_err();
    assert_eq!(err.kind, ValidationErrorKind::PatternMismatch);

    let ok = validate_and_map(report, &raw(&[("prison_number", "A1234BC")]), None, None).unwrap();
    assert_eq!(ok, vec![Filter::standard("prison_number", "A1234BC")]);

    // Exempt fields skip the pattern, and the mandatory check is skipped entirely
    let exempt = HashSet::from(["prison_number".to_string()]);
    let partial = validate_and_map(report, &raw(&[("prison_number", "A12")]), None, Some(&exempt)).unwrap();
    assert_eq!(partial, vec![Filter::standard("prison_number", "A12")]);

    let nothing = validate_and_map(report, &raw(&[]), None, Some(&exempt)).unwrap();
    assert!(nothing.is_empty());
}

#[test]
fn test_report_field_filter_overrides_schema() {
    let def = prisoners();
    let report = def.resolve("all").unwrap();
    let base = [("prison_number", "A1234BC")];

    let mut young = raw(&base);
    young.insert("age.start".into(), "19".into());
    let err = validate_and_map(report, &young, None, None).unwrap_err();
    assert_eq!(err.kind, ValidationErrorKind::OutOfRange);

    let mut old = raw(&base);
    old.insert("age.end".into(), "150".into());
    let filters = validate_and_map(report, &old, None, None).unwrap();
    assert_eq!(filters[1], Filter::new("age", "150", FilterTag::RangeEnd));
}

#[test]
fn test_date_upper_bound_uses_today() {
    let def = prisoners();
    let report = def.resolve("all").unwrap();
    let validator = FilterValidator::new(report).with_today(NaiveDate::from_ymd_opt(2023, 5, 15).unwrap());

    let past = raw(&[("prison_number", "A1234BC"), ("released", "2023-05-15")]);
    assert!(validator.validate_and_map(&past, None, None).is_ok());

    let future = raw(&[("prison_number", "A1234BC"), ("released", "2023-05-16T09:00:00")]);
    let err = validator.validate_and_map(&future, None, None).unwrap_err();
    assert_eq!(err.kind, ValidationErrorKind::OutOfRange);
}

#[test]
fn test_dynamic_filter_entry_point() {
    let def = movements();
    let report = def.resolve("last-month").unwrap();
    let validator = FilterValidator::new(report);

    assert_eq!(
        validator.dynamic_filter("name", "Ann").unwrap(),
        Filter::new("name", "Ann", FilterTag::Dynamic)
    );
    assert_eq!(
        validator.dynamic_filter("name", "A").unwrap_err().kind,
        ValidationErrorKind::InvalidDynamicOptions
    );
    assert_eq!(
        validator.dynamic_filter("reason", "Court").unwrap_err().kind,
        ValidationErrorKind::InvalidDynamicFilter
    );
}
