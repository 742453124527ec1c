mod support;

use std::sync::Arc;

use reportal::backend::{BackendRegistry, Vendor};
use reportal::error::{ReportError, ValidationErrorKind};
use reportal::execution::{Page, ReportRequest, SyncExecutionService};
use reportal::formula::FormulaEngine;
use reportal::policy::CallerContext;
use reportal::value::Value;

use support::{definitions, sqlite, ScriptedDriver};

const REPORT: &str = "external-movements";
const VARIANT: &str = "last-month";

fn service() -> SyncExecutionService {
    SyncExecutionService::new(definitions(), BackendRegistry::new().with_driver(sqlite()))
}

fn april() -> ReportRequest {
    ReportRequest::new(REPORT, VARIANT)
        .with_filter("date.start", "2023-04-01")
        .with_filter("date.end", "2023-04-30")
}

fn leeds() -> CallerContext {
    CallerContext::new().with_caseloads(&["LEI"])
}

fn validation_kind(err: ReportError) -> ValidationErrorKind {
    match err {
        ReportError::Validation(v) => v.kind,
        other => panic!("expected a validation error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_execute_applies_policy_filters_and_formulas() {
    let rows = service()
        .with_formula_engine(FormulaEngine::with_env(Some("dev".into())))
        .execute(&april(), Page::new(1, 20), Some(&leeds()))
        .await
        .unwrap();

    assert_eq!(rows.len(), 3);
    assert_eq!(
        rows[1]["name"],
        Value::from(r#"<a href=https://prisoner-dev.example/A1234AA target="_blank">Ann Smith</a>"#)
    );
    assert_eq!(rows[1]["date"], Value::from("25/04/2023"));
    assert_eq!(rows[2]["is_closed"], Value::Boolean(true));
    assert!(rows.iter().all(|r| !r.contains_key("origin_code")));
}

#[tokio::test]
async fn test_execute_accepts_filters_of_both_stages() {
    let svc = service();

    let inbound = april().with_filter("direction", "in");
    let rows = svc.execute(&inbound, Page::new(1, 20), Some(&leeds())).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["prison_number"], Value::from("A1234AA"));

    let reasons = april().with_filter("reason", "court, TRANSFER");
    let rows = svc.execute(&reasons, Page::new(1, 20), Some(&leeds())).await.unwrap();
    assert_eq!(rows.len(), 3);

    let court = april().with_filter("reason", "Court");
    assert_eq!(svc.count(&court, Some(&leeds())).await.unwrap(), 1);
}

#[tokio::test]
async fn test_execute_pages() {
    let svc = service();
    let second = svc
        .execute(&april().sorted_by("name", false), Page::new(2, 2), Some(&leeds()))
        .await
        .unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0]["prison_number"], Value::from("A1234AA"));

    let none = svc
        .execute(&april(), Page::new(0, 20), Some(&leeds()))
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_count_respects_policy() {
    let svc = service();
    assert_eq!(svc.count(&april(), Some(&leeds())).await.unwrap(), 3);
    assert_eq!(svc.count(&april(), None).await.unwrap(), 0);

    let brixton = CallerContext::new().with_caseloads(&["BXI"]);
    assert_eq!(svc.count(&april(), Some(&brixton)).await.unwrap(), 0);
}

#[tokio::test]
async fn test_filter_errors() {
    let svc = service();

    let bad_date = ReportRequest::new(REPORT, VARIANT).with_filter("date.start", "2023-13-01");
    let err = svc.execute(&bad_date, Page::new(1, 20), Some(&leeds())).await.unwrap_err();
    assert_eq!(validation_kind(err), ValidationErrorKind::InvalidValue);

    let too_early = april().with_filter("date.start", "2019-06-01");
    let err = svc.execute(&too_early, Page::new(1, 20), Some(&leeds())).await.unwrap_err();
    assert_eq!(validation_kind(err), ValidationErrorKind::OutOfRange);

    let sideways = april().with_filter("direction", "sideways");
    let err = svc.count(&sideways, Some(&leeds())).await.unwrap_err();
    assert_eq!(validation_kind(err), ValidationErrorKind::InvalidStaticOption);

    let missing = ReportRequest::new(REPORT, VARIANT);
    let err = svc.count(&missing, Some(&leeds())).await.unwrap_err();
    assert_eq!(validation_kind(err), ValidationErrorKind::MissingMandatoryFilter);

    let unknown = ReportRequest::new("no-such-report", VARIANT);
    let err = svc.count(&unknown, Some(&leeds())).await.unwrap_err();
    assert_eq!(err.reason(), "INVALID_REPORT_REFERENCE");
}

// =============================================================================
// Field values
// =============================================================================

#[tokio::test]
async fn test_field_values_skip_mandatory_filters() {
    let svc = service();
    let request = ReportRequest::new(REPORT, VARIANT);

    let values = svc.field_values(&request, "name", "an", Some(&leeds())).await.unwrap();
    assert_eq!(values, vec!["Ann Smith".to_string()]);

    let values = svc.field_values(&request, "name", "Da", Some(&leeds())).await.unwrap();
    assert!(values.is_empty());

    let values = svc.field_values(&request, "name", "an", None).await.unwrap();
    assert!(values.is_empty());
}

#[tokio::test]
async fn test_field_values_validation() {
    let svc = service();
    let request = ReportRequest::new(REPORT, VARIANT);

    let err = svc.field_values(&request, "name", "a", Some(&leeds())).await.unwrap_err();
    assert_eq!(validation_kind(err), ValidationErrorKind::InvalidDynamicOptions);

    let err = svc
        .field_values(&request, "direction", "in", Some(&leeds()))
        .await
        .unwrap_err();
    assert_eq!(validation_kind(err), ValidationErrorKind::InvalidDynamicFilter);
}

#[tokio::test]
async fn test_field_values_query_shape() {
    let driver = Arc::new(ScriptedDriver::new("local", Vendor::Redshift));
    let svc = SyncExecutionService::new(definitions(), BackendRegistry::new().with_driver(driver.clone()));

    let request = ReportRequest::new(REPORT, VARIANT)
        .with_filter("direction", "in")
        .with_filter("name", "ignored");
    let values = svc.field_values(&request, "name", "Jo", Some(&leeds())).await.unwrap();
    assert!(values.is_empty());

    let queries = driver.queries();
    assert_eq!(queries.len(), 1);
    assert!(queries[0].contains(
        "filter_ AS (SELECT * FROM policy_ WHERE lower(direction) = lower('in') AND name ILIKE 'Jo%')"
    ));
    assert!(queries[0].ends_with(
        " SELECT DISTINCT name FROM filter_ WHERE name IS NOT NULL ORDER BY name asc LIMIT 2"
    ));
}
