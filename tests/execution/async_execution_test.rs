mod support;

use std::sync::Arc;

use reportal::backend::{
    BackendDriver, BackendError, BackendRegistry, ExecutionState, StatementTarget, Vendor,
};
use reportal::definition::{InMemoryDefinitionStore, ReportDefinition};
use reportal::error::{ReportError, ValidationErrorKind};
use reportal::execution::{AsyncExecutionService, ExecutionHandle, Page, ReportRequest};
use reportal::policy::CallerContext;
use reportal::value::Value;

use support::{definitions, row, sqlite, ScriptedDriver};

const REPORT: &str = "external-movements";
const VARIANT: &str = "last-month";

fn april() -> ReportRequest {
    ReportRequest::new(REPORT, VARIANT)
        .with_filter("date.start", "2023-04-01")
        .with_filter("date.end", "2023-04-30")
}

fn leeds() -> CallerContext {
    CallerContext::new().with_caseloads(&["LEI"])
}

fn sqlite_service() -> AsyncExecutionService {
    AsyncExecutionService::new(definitions(), BackendRegistry::new().with_driver(sqlite()))
}

fn scripted_service(driver: Arc<ScriptedDriver>) -> AsyncExecutionService {
    AsyncExecutionService::new(definitions(), BackendRegistry::new().with_driver(driver))
}

// =============================================================================
// End to end against SQLite
// =============================================================================

#[tokio::test]
async fn test_submit_poll_and_page() {
    let service = sqlite_service();
    let caller = leeds();

    let handle = service.submit_report(&april(), Some(&caller)).await.unwrap();
    assert!(handle.table_id.starts_with('_'));

    let status = service
        .status(REPORT, VARIANT, ExecutionHandle::Execution(&handle.execution_id))
        .await
        .unwrap();
    assert_eq!(status.status, ExecutionState::Finished);

    let status = service
        .status(REPORT, VARIANT, ExecutionHandle::Table(&handle.table_id))
        .await
        .unwrap();
    assert_eq!(status.status, ExecutionState::Finished);

    let rows = service
        .report_result(&ReportRequest::new(REPORT, VARIANT), &handle.table_id, None)
        .await
        .unwrap();
    assert_eq!(rows.len(), 3);

    let first = &rows[0];
    assert_eq!(first["date"], Value::from("10/04/2023"));
    assert_eq!(first["direction"], Value::from("out"));
    assert_eq!(
        first["name"],
        Value::from(r#"<a href=https://prisoner.example/A1234AA target="_blank">Ann Smith</a>"#)
    );
    assert_eq!(first["is_closed"], Value::Boolean(false));
    assert!(!first.contains_key("origin_code"));
    assert!(!first.contains_key("destination_code"));

    let dates: Vec<String> = rows.iter().map(|r| r["date"].to_string()).collect();
    assert_eq!(dates, vec!["10/04/2023", "25/04/2023", "30/04/2023"]);
}

#[tokio::test]
async fn test_result_time_filters_sort_and_pages() {
    let service = sqlite_service();
    let handle = service.submit_report(&april(), Some(&leeds())).await.unwrap();

    let outbound = ReportRequest::new(REPORT, VARIANT).with_filter("direction", "OUT");
    let rows = service
        .report_result(&outbound, &handle.table_id, None)
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r["direction"] == Value::from("out")));
    assert_eq!(service.count(&outbound, &handle.table_id).await.unwrap(), 2);
    assert_eq!(
        service
            .count(&ReportRequest::new(REPORT, VARIANT), &handle.table_id)
            .await
            .unwrap(),
        3
    );

    let by_date_desc = ReportRequest::new(REPORT, VARIANT).sorted_by("date", false);
    let page = service
        .report_result(&by_date_desc, &handle.table_id, Some(Page::new(2, 2)))
        .await
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0]["date"], Value::from("10/04/2023"));

    let past_end = service
        .report_result(&by_date_desc, &handle.table_id, Some(Page::new(5, 2)))
        .await
        .unwrap();
    assert!(past_end.is_empty());
}

#[tokio::test]
async fn test_denied_caller_gets_no_rows() {
    let service = sqlite_service();
    let nobody = CallerContext::new().with_roles(&["ROLE_VIEWER"]);

    let handle = service.submit_report(&april(), Some(&nobody)).await.unwrap();
    let rows = service
        .report_result(&ReportRequest::new(REPORT, VARIANT), &handle.table_id, None)
        .await
        .unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn test_submission_rejects_bad_requests() {
    let service = sqlite_service();
    let caller = leeds();

    let err = service
        .submit_report(&ReportRequest::new(REPORT, VARIANT), Some(&caller))
        .await
        .unwrap_err();
    assert!(matches!(
        &err,
        ReportError::Validation(v) if v.kind == ValidationErrorKind::MissingMandatoryFilter
    ));
    assert_eq!(err.reason(), "MISSING_MANDATORY_FILTER");
    assert!(err.is_client_error());

    let interactive = april().with_filter("direction", "in");
    let err = service.submit_report(&interactive, Some(&caller)).await.unwrap_err();
    assert_eq!(err.reason(), "FILTER_STAGE_MISMATCH");

    let bad_sort = april().sorted_by("origin_code", true);
    let err = service.submit_report(&bad_sort, Some(&caller)).await.unwrap_err();
    assert_eq!(err.reason(), "INVALID_SORT_COLUMN");

    let unknown = ReportRequest::new(REPORT, "no-such-variant");
    let err = service.submit_report(&unknown, Some(&caller)).await.unwrap_err();
    assert!(matches!(err, ReportError::InvalidReportReference { .. }));
}

#[tokio::test]
async fn test_missing_result_table() {
    let service = sqlite_service();

    let err = service
        .status(REPORT, VARIANT, ExecutionHandle::Table("_gone"))
        .await
        .unwrap_err();
    assert!(matches!(err, ReportError::MissingTable(ref t) if t == "_gone"));

    let err = service
        .report_result(&ReportRequest::new(REPORT, VARIANT), "_gone", None)
        .await
        .unwrap_err();
    assert_eq!(err.reason(), "MISSING_TABLE");
}

#[tokio::test]
async fn test_summary_is_created_on_first_read() {
    let service = sqlite_service();
    let handle = service.submit_report(&april(), Some(&leeds())).await.unwrap();

    for _ in 0..2 {
        let rows = service
            .summary_result(REPORT, VARIANT, &handle.table_id, "summary-1")
            .await
            .unwrap();
        assert_eq!(
            rows,
            vec![
                row(&[("direction", "in".into()), ("total", Value::Long(1))]),
                row(&[("direction", "out".into()), ("total", Value::Long(2))]),
            ]
        );
    }

    let err = service
        .summary_result(REPORT, VARIANT, &handle.table_id, "summary-9")
        .await
        .unwrap_err();
    assert!(matches!(err, ReportError::UnknownSummary(ref s) if s == "summary-9"));
}

// =============================================================================
// Scripted backends
// =============================================================================

#[tokio::test]
async fn test_submitted_statement_shape() {
    let driver = Arc::new(ScriptedDriver::new("local", Vendor::Redshift).with_script(&["FINISHED"]));
    let service = scripted_service(driver.clone());

    let handle = service.submit_report(&april(), Some(&leeds())).await.unwrap();
    assert_eq!(handle.execution_id, "exec-0");

    let submitted = driver.submitted();
    assert_eq!(submitted.len(), 1);
    let sql = &submitted[0];
    assert!(sql.starts_with(&format!("CREATE TABLE reports.{} AS WITH dataset_ AS (", handle.table_id)));
    assert!(sql.contains("policy_ AS (SELECT * FROM dataset_ WHERE (origin_code='LEI' AND direction='out')"));
    assert!(sql.contains(
        "filter_ AS (SELECT * FROM policy_ WHERE date >= CAST('2023-04-01' AS timestamp) \
         AND date < (CAST('2023-04-30' AS timestamp) + INTERVAL '1 day'))"
    ));
    assert!(sql.ends_with("SELECT * FROM filter_ ORDER BY date asc"));
    assert!(!sql.contains("movements;"));
}

#[tokio::test]
async fn test_polling_never_moves_backwards() {
    let driver = Arc::new(ScriptedDriver::new("local", Vendor::Redshift).with_script(&[
        "STARTED", "SUBMITTED", "PICKED", "STARTED", "FINISHED", "STARTED",
    ]));
    let service = scripted_service(driver.clone());
    let handle = service.submit_report(&april(), Some(&leeds())).await.unwrap();

    let mut observed = Vec::new();
    for _ in 0..6 {
        let status = service
            .poll_status("local", ExecutionHandle::Execution(&handle.execution_id))
            .await
            .unwrap();
        observed.push(status.status);
    }
    assert_eq!(
        observed,
        vec![
            ExecutionState::Started,
            ExecutionState::Started,
            ExecutionState::Picked,
            ExecutionState::Picked,
            ExecutionState::Finished,
            ExecutionState::Finished,
        ]
    );
}

#[tokio::test]
async fn test_athena_states_are_translated() {
    let driver = Arc::new(
        ScriptedDriver::new("local", Vendor::Athena).with_script(&["QUEUED", "RUNNING", "SUCCEEDED"]),
    );
    let service = scripted_service(driver);
    let handle = service.submit_report(&april(), Some(&leeds())).await.unwrap();

    let mut observed = Vec::new();
    for _ in 0..3 {
        let status = service
            .poll_status("local", ExecutionHandle::Execution(&handle.execution_id))
            .await
            .unwrap();
        observed.push(status.status.as_str());
    }
    assert_eq!(observed, vec!["SUBMITTED", "STARTED", "FINISHED"]);
}

#[tokio::test]
async fn test_failed_and_unknown_states() {
    let driver = Arc::new(
        ScriptedDriver::new("local", Vendor::Redshift)
            .with_script(&["FAILED"])
            .with_script(&["EXPLODED"]),
    );
    let service = scripted_service(driver);

    let failed = service.submit_report(&april(), Some(&leeds())).await.unwrap();
    let status = service
        .poll_status("local", ExecutionHandle::Execution(&failed.execution_id))
        .await
        .unwrap();
    assert_eq!(status.status, ExecutionState::Failed);
    assert_eq!(status.error.as_deref(), Some("relation does not exist"));
    assert_eq!(status.error_category.as_deref(), Some("USER_ERROR"));

    // Later polls repeat the terminal status, details included
    let again = service
        .poll_status("local", ExecutionHandle::Execution(&failed.execution_id))
        .await
        .unwrap();
    assert_eq!(again, status);
    assert_eq!(again.error.as_deref(), Some("relation does not exist"));

    let weird = service.submit_report(&april(), Some(&leeds())).await.unwrap();
    let err = service
        .poll_status("local", ExecutionHandle::Execution(&weird.execution_id))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ReportError::Backend(BackendError::UnknownState { ref state, .. }) if state == "EXPLODED"
    ));
}

#[tokio::test]
async fn test_same_execution_id_on_two_backends() {
    let local = Arc::new(ScriptedDriver::new("local", Vendor::Redshift).with_script(&["FINISHED"]));
    let athena = Arc::new(ScriptedDriver::new("athena", Vendor::Athena).with_script(&["RUNNING"]));
    let service = AsyncExecutionService::new(
        definitions(),
        BackendRegistry::new()
            .with_driver(local.clone())
            .with_driver(athena.clone()),
    );

    let handle = service.submit_report(&april(), Some(&leeds())).await.unwrap();
    let other = athena
        .submit_statement("SELECT 1", &StatementTarget::default())
        .await
        .unwrap();
    assert_eq!(handle.execution_id, other);

    let statuses = service
        .statuses(&[("local", handle.execution_id.as_str()), ("athena", other.as_str())])
        .await;
    let states: Vec<_> = statuses.into_iter().map(|s| s.unwrap().status).collect();
    assert_eq!(states, vec![ExecutionState::Finished, ExecutionState::Started]);
}

#[tokio::test]
async fn test_busy_backend_is_retryable() {
    let driver = Arc::new(ScriptedDriver::new("local", Vendor::Redshift).busy());
    let service = scripted_service(driver);

    let err = service.submit_report(&april(), Some(&leeds())).await.unwrap_err();
    assert!(err.is_retryable());
    assert!(!err.is_client_error());
    assert_eq!(err.reason(), "BACKEND_BUSY");
}

#[tokio::test]
async fn test_summary_recreated_exactly_once() {
    let driver = Arc::new(
        ScriptedDriver::new("local", Vendor::Redshift)
            .with_missing_reads(1)
            .with_rows(vec![row(&[("direction", "in".into()), ("total", Value::Long(4))])]),
    );
    let service = scripted_service(driver.clone());

    let rows = service
        .summary_result(REPORT, VARIANT, "_abc", "summary-1")
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);

    assert_eq!(
        driver.created(),
        vec![(
            "reports._abc_summary_1".to_string(),
            "SELECT direction, COUNT(*) AS total FROM reports._abc GROUP BY direction ORDER BY direction"
                .to_string()
        )]
    );
    assert_eq!(
        driver.queries(),
        vec![
            "SELECT * FROM reports._abc_summary_1".to_string(),
            "SELECT * FROM reports._abc_summary_1".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_summary_still_missing_after_recreate() {
    let driver = Arc::new(ScriptedDriver::new("local", Vendor::Redshift).with_missing_reads(2));
    let service = scripted_service(driver.clone());

    let err = service
        .summary_result(REPORT, VARIANT, "_abc", "summary-1")
        .await
        .unwrap_err();
    assert!(matches!(err, ReportError::MissingTable(_)));
    assert_eq!(driver.created().len(), 1);
}

#[tokio::test]
async fn test_cancel() {
    let driver = Arc::new(ScriptedDriver::new("local", Vendor::Redshift).with_script(&["STARTED"]));
    let service = scripted_service(driver.clone());
    let handle = service.submit_report(&april(), Some(&leeds())).await.unwrap();

    let response = service.cancel(REPORT, VARIANT, &handle.execution_id).await.unwrap();
    assert!(response.cancelled);
    assert_eq!(driver.cancelled(), vec![handle.execution_id.clone()]);

    let status = service
        .poll_status("local", ExecutionHandle::Execution(&handle.execution_id))
        .await
        .unwrap();
    assert_eq!(status.status, ExecutionState::Aborted);
}

#[tokio::test]
async fn test_cancel_after_finish_is_not_an_error() {
    let driver = Arc::new(
        ScriptedDriver::new("local", Vendor::Redshift)
            .with_script(&["FINISHED"])
            .with_cancel_result(false),
    );
    let service = scripted_service(driver);
    let handle = service.submit_report(&april(), Some(&leeds())).await.unwrap();

    let response = service.cancel(REPORT, VARIANT, &handle.execution_id).await.unwrap();
    assert!(!response.cancelled);
}

#[tokio::test]
async fn test_batch_statuses() {
    let driver = Arc::new(
        ScriptedDriver::new("local", Vendor::Redshift)
            .with_script(&["FINISHED"])
            .with_script(&["STARTED"]),
    );
    let service = scripted_service(driver);
    let first = service.submit_report(&april(), Some(&leeds())).await.unwrap();
    let second = service.submit_report(&april(), Some(&leeds())).await.unwrap();

    let statuses = service
        .statuses(&[
            ("local", first.execution_id.as_str()),
            ("local", second.execution_id.as_str()),
            ("local", "exec-99"),
        ])
        .await;
    assert_eq!(statuses[0].as_ref().unwrap().status, ExecutionState::Finished);
    assert_eq!(statuses[1].as_ref().unwrap().status, ExecutionState::Started);
    assert!(statuses[2].is_err());
}

#[tokio::test]
async fn test_variant_target_is_passed_to_the_driver() {
    let mut reports: Vec<ReportDefinition> = serde_json::from_str(support::DEFINITIONS).unwrap();
    reports[0].variants[0].catalog = Some("nomis".into());
    reports[0].variants[0].database = Some("DIGITAL_PRISON_REPORTING".into());

    let driver = Arc::new(ScriptedDriver::new("local", Vendor::Athena).with_script(&["QUEUED"]));
    let service = AsyncExecutionService::new(
        Arc::new(InMemoryDefinitionStore::with_definitions(reports)),
        BackendRegistry::new().with_driver(driver.clone()),
    );
    service.submit_report(&april(), Some(&leeds())).await.unwrap();

    let targets = driver.targets.lock().unwrap().clone();
    assert_eq!(targets[0].catalog.as_deref(), Some("nomis"));
    assert_eq!(targets[0].database.as_deref(), Some("DIGITAL_PRISON_REPORTING"));
}
