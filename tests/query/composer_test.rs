use std::collections::HashMap;

use reportal::definition::ReportDefinition;
use reportal::filter::{validate_and_map, Filter, FilterTag};
use reportal::policy::{evaluate, CallerContext, PolicyResult};
use reportal::query::{resolve_sort, QueryComposer, SortOrder};
use reportal::Dialect;

const DEFINITIONS: &str = include_str!("../fixtures/external_movements.json");

fn definition(id: &str) -> ReportDefinition {
    let all: Vec<ReportDefinition> = serde_json::from_str(DEFINITIONS).unwrap();
    all.into_iter().find(|d| d.id == id).unwrap()
}

/// Validated filters, policy and sort for April's inbound open movements
/// seen from LEI, rendered for `dialect`.
fn april_inbound(dialect: Dialect) -> String {
    let def = definition("external-movements");
    let report = def.resolve("last-month").unwrap();
    let raw: HashMap<String, String> = [
        ("date.start", "2023-04-01"),
        ("date.end", "2023-04-30"),
        ("direction", "in"),
        ("is_closed", "false"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    let filters = validate_and_map(report, &raw, None, None).unwrap();
    let policy = evaluate(&def.policies, Some(&CallerContext::new().with_caseloads(&["LEI"])));
    let sort = resolve_sort(report, None, true).unwrap();

    QueryComposer::new(dialect, "")
        .layered_query(&def.dataset.query, &policy, &filters, sort.as_ref())
}

#[test]
fn test_layered_query_sqlite() {
    insta::assert_snapshot!(april_inbound(Dialect::Sqlite), @"WITH dataset_ AS (SELECT prison_number, name, date, direction, origin_code, destination_code, reason, is_closed FROM movements),policy_ AS (SELECT * FROM dataset_ WHERE (origin_code='LEI' AND direction='out') OR (destination_code='LEI' AND direction='in')),filter_ AS (SELECT * FROM policy_ WHERE date >= '2023-04-01' AND date < date('2023-04-30', '+1 day') AND lower(direction) = lower('in') AND is_closed = 0) SELECT * FROM filter_ ORDER BY date asc");
}

#[test]
fn test_layered_query_athena() {
    insta::assert_snapshot!(april_inbound(Dialect::Athena), @"WITH dataset_ AS (SELECT prison_number, name, date, direction, origin_code, destination_code, reason, is_closed FROM movements),policy_ AS (SELECT * FROM dataset_ WHERE (origin_code='LEI' AND direction='out') OR (destination_code='LEI' AND direction='in')),filter_ AS (SELECT * FROM policy_ WHERE date >= CAST('2023-04-01' AS timestamp) AND date < (CAST('2023-04-30' AS timestamp) + INTERVAL '1' DAY) AND lower(direction) = lower('in') AND is_closed = false) SELECT * FROM filter_ ORDER BY date asc");
}

#[test]
fn test_layered_query_redshift() {
    insta::assert_snapshot!(april_inbound(Dialect::Redshift), @"WITH dataset_ AS (SELECT prison_number, name, date, direction, origin_code, destination_code, reason, is_closed FROM movements),policy_ AS (SELECT * FROM dataset_ WHERE (origin_code='LEI' AND direction='out') OR (destination_code='LEI' AND direction='in')),filter_ AS (SELECT * FROM policy_ WHERE date >= CAST('2023-04-01' AS timestamp) AND date < (CAST('2023-04-30' AS timestamp) + INTERVAL '1 day') AND lower(direction) = lower('in') AND is_closed = false) SELECT * FROM filter_ ORDER BY date asc");
}

#[test]
fn test_denied_caller_still_gets_a_query() {
    let def = definition("external-movements");
    let policy = evaluate(&def.policies, None);
    let sql = QueryComposer::new(Dialect::Athena, "reports").layered_count_query(
        "SELECT * FROM movements",
        &policy,
        &[],
    );
    insta::assert_snapshot!(sql, @"WITH dataset_ AS (SELECT * FROM movements),policy_ AS (SELECT * FROM dataset_ WHERE FALSE),filter_ AS (SELECT * FROM policy_ WHERE TRUE) SELECT COUNT(1) AS total FROM filter_");
}

#[test]
fn test_result_table_pages() {
    let composer = QueryComposer::new(Dialect::Redshift, "reports");
    let table = composer.result_table("_a1");
    let filters = [
        Filter::new("reason", "Court, Transfer", FilterTag::Multiselect),
        Filter::new("name", "O'N", FilterTag::Dynamic),
    ];
    let sort = SortOrder::new("name", false);

    insta::assert_snapshot!(
        composer.page_query(&table, &filters, Some(&sort), 2, 25).unwrap(),
        @r#"SELECT * FROM reports._a1 WHERE lower(reason) IN (lower('Court'),lower('Transfer')) AND name ILIKE 'O''N%' ORDER BY name desc LIMIT 25 OFFSET 25"#
    );
    assert_eq!(composer.page_query(&table, &filters, None, 0, 25), None);
    assert_eq!(
        composer.count_query(&table, &[]),
        "SELECT COUNT(1) AS total FROM reports._a1 WHERE TRUE"
    );
}

#[test]
fn test_distinct_values_with_limit() {
    let composer = QueryComposer::new(Dialect::Sqlite, "");
    let sql = composer.distinct_values_query(
        "SELECT * FROM movements",
        &PolicyResult::permit(),
        &[Filter::new("name", "50%_", FilterTag::Dynamic)],
        "name",
        Some(5),
    );
    insta::assert_snapshot!(sql, @r#"WITH dataset_ AS (SELECT * FROM movements),policy_ AS (SELECT * FROM dataset_ WHERE TRUE),filter_ AS (SELECT * FROM policy_ WHERE lower(name) LIKE lower('50\%\_%') ESCAPE '\') SELECT DISTINCT name FROM filter_ WHERE name IS NOT NULL ORDER BY name asc LIMIT 5"#);
}

#[test]
fn test_summary_tables_from_definition() {
    let def = definition("external-movements");
    let report = def.resolve("last-month").unwrap();
    let summary = report.summary("summary-1").unwrap();
    let composer = QueryComposer::new(Dialect::Athena, "reports");

    assert_eq!(composer.summary_table("_a1", &summary.id), "reports._a1_summary_1");
    insta::assert_snapshot!(
        composer.create_summary_table("_a1", summary),
        @"CREATE TABLE reports._a1_summary_1 AS SELECT direction, COUNT(*) AS total FROM reports._a1 GROUP BY direction ORDER BY direction"
    );
    assert_eq!(
        composer.read_summary("_a1", "summary-1"),
        "SELECT * FROM reports._a1_summary_1"
    );
}

#[test]
fn test_phase_tables_from_definition() {
    let def = definition("staged-movements");
    let mut phases = def.dataset.multiphase_query.clone();
    phases.sort_by_key(|p| p.index);
    let composer = QueryComposer::new(Dialect::Redshift, "reports");

    insta::assert_snapshot!(
        composer.create_phase_table("_a1", 0, &phases[0].query),
        @"CREATE TABLE reports._a1_p0 AS SELECT prison_number, direction FROM movements WHERE is_closed = 0"
    );
    insta::assert_snapshot!(
        composer.phase_query("_a1", 1, &phases[1].query),
        @"SELECT prison_number, direction, COUNT(*) AS moves FROM reports._a1_p0 GROUP BY prison_number, direction"
    );
}
