//! Tests for query compilation and selection
//!
//! These tests verify:
//! - Compile errors name the position or the unknown tag
//! - Grouping normalisation
//! - Numeric, string and pattern match operators
//! - Nesting limit
//! - Header fields, tag prefixes and boolean combinators

use bytes::Bytes;
use vslog::query::{Grouping, Query, Transaction, TransactionKind};
use vslog::record::tags::tag_index;
use vslog::record::{encode_record, FormatVersion, Side};
use vslog::VslError;

// =============================================================================
// Helper Functions
// =============================================================================

fn record(tag: &str, payload: &str) -> Bytes {
    encode_record(
        FormatVersion::Current,
        tag_index(tag).unwrap(),
        100,
        Side::Client,
        payload.as_bytes(),
    )
}

/// One client request transaction
fn request(url: &str, status: &str, host: &str) -> Vec<Transaction> {
    vec![Transaction {
        vxid: 100,
        parent: 1,
        level: 1,
        kind: TransactionKind::Request,
        records: vec![
            record("Begin", "req 1 rxreq"),
            record("ReqMethod", "GET"),
            record("ReqURL", url),
            record("ReqHeader", &format!("Host: {}", host)),
            record("RespStatus", status),
            record("End", ""),
        ],
    }]
}

fn selects(query: &str, group: &[Transaction]) -> bool {
    Query::compile(query, Grouping::Vxid).unwrap().selects(group)
}

fn compile_error(query: &str) -> String {
    match Query::compile(query, Grouping::Vxid) {
        Err(VslError::QueryCompile(message)) => message,
        other => panic!("expected compile error for {:?}, got {:?}", query, other),
    }
}

// =============================================================================
// Compilation Tests
// =============================================================================

#[test]
fn test_empty_query_selects_everything() {
    let query = Query::compile("", Grouping::Request).unwrap();
    assert_eq!(query.text(), "");
    assert_eq!(query.grouping(), Grouping::Request);
    assert!(!query.has_cursor());
    assert!(query.selects(&request("/", "200", "a")));

    assert!(selects("   ", &request("/", "200", "a")));
}

#[test]
fn test_unknown_tag_is_rejected() {
    let message = compile_error("NoSuchTag ~ x");
    assert!(message.contains("NoSuchTag"), "{}", message);
    assert!(message.contains("position 0"), "{}", message);
}

#[test]
fn test_syntax_errors_report_position() {
    let message = compile_error("ReqURL ~ \"/api");
    assert!(message.starts_with("Syntax error at position 9"), "{}", message);

    let message = compile_error("ReqURL = x");
    assert!(message.starts_with("Syntax error at position 7"), "{}", message);

    let message = compile_error("(ReqURL ~ x");
    assert!(message.contains("expected ')'"), "{}", message);

    let message = compile_error("RespStatus == abc");
    assert!(message.contains("expected number"), "{}", message);

    let message = compile_error("ReqURL ~ x ReqURL");
    assert!(message.contains("trailing"), "{}", message);
}

#[test]
fn test_missing_operand_is_rejected() {
    compile_error("ReqURL ~");
    compile_error("and ReqURL");
    compile_error("ReqURL and");
    compile_error("ReqHeader: ~ x");
}

#[test]
fn test_out_of_range_grouping_means_vxid() {
    let query = Query::compile_raw("", 7).unwrap();
    assert_eq!(query.grouping(), Grouping::Vxid);

    let query = Query::compile_raw("", 3).unwrap();
    assert_eq!(query.grouping(), Grouping::Session);
}

#[test]
fn test_grouping_names() {
    assert_eq!("raw".parse::<Grouping>().unwrap(), Grouping::Raw);
    assert_eq!("req".parse::<Grouping>().unwrap(), Grouping::Request);
    assert_eq!("Session".parse::<Grouping>().unwrap(), Grouping::Session);
    assert!(matches!("tx".parse::<Grouping>(), Err(VslError::Config(_))));
    assert_eq!(Grouping::default(), Grouping::Vxid);
    assert_eq!(Grouping::Request.to_string(), "request");
}

// =============================================================================
// Operator Tests
// =============================================================================

#[test]
fn test_tag_presence() {
    let group = request("/", "200", "a");
    assert!(selects("ReqURL", &group));
    assert!(!selects("BereqURL", &group));
}

#[test]
fn test_numeric_operators() {
    let group = request("/", "503", "a");
    assert!(selects("RespStatus == 503", &group));
    assert!(selects("RespStatus != 200", &group));
    assert!(selects("RespStatus >= 500", &group));
    assert!(selects("RespStatus > 499.5", &group));
    assert!(!selects("RespStatus < 500", &group));
    assert!(selects("RespStatus <= 503", &group));
}

#[test]
fn test_numeric_operator_on_text_never_holds() {
    let group = request("/", "200", "a");
    assert!(!selects("ReqMethod == 1", &group));
    assert!(!selects("ReqMethod != 1", &group));
}

#[test]
fn test_string_operators() {
    let group = request("/api/v1", "200", "a");
    assert!(selects("ReqMethod eq GET", &group));
    assert!(selects("ReqMethod ne POST", &group));
    assert!(!selects("ReqMethod eq get", &group));
    assert!(selects("ReqURL eq \"/api/v1\"", &group));
}

#[test]
fn test_match_operators() {
    let group = request("/api/v1/users", "200", "a");
    assert!(selects("ReqURL ~ /api", &group));
    assert!(selects("ReqURL ~ 'v1/u'", &group));
    assert!(!selects("ReqURL ~ /static", &group));
    assert!(selects("ReqURL !~ /static", &group));
}

#[test]
fn test_match_operators_take_regular_expressions() {
    let group = request("/api/v1/users", "200", "a");
    assert!(selects("ReqURL ~ \"^/api\"", &group));
    assert!(!selects("ReqURL ~ \"^/v1\"", &group));
    assert!(selects("ReqURL ~ \"users$\"", &group));
    assert!(selects("ReqURL ~ \"/v[0-9]+/\"", &group));
    assert!(!selects("ReqURL ~ \"/v[2-9]/\"", &group));
    assert!(selects("ReqURL !~ \"^/static\"", &group));
    assert!(selects("RespStatus ~ \"^2..$\"", &group));
}

#[test]
fn test_invalid_pattern_is_rejected() {
    let message = compile_error("ReqURL ~ \"[unclosed\"");
    assert!(message.starts_with("Syntax error at position 9"), "{}", message);
    assert!(message.contains("invalid pattern"), "{}", message);
}

#[test]
fn test_deep_nesting_is_rejected() {
    let depth = 200_000;
    let text = format!("{}CLI{}", "(".repeat(depth), ")".repeat(depth));
    let message = compile_error(&text);
    assert!(message.contains("nested too deeply"), "{}", message);

    let text = format!("{}CLI", "not ".repeat(depth));
    let message = compile_error(&text);
    assert!(message.contains("nested too deeply"), "{}", message);

    assert!(Query::compile("((not (CLI)))", Grouping::Vxid).is_ok());
}

#[test]
fn test_header_field() {
    let group = request("/", "200", "example.com");
    assert!(selects("ReqHeader:Host eq example.com", &group));
    assert!(selects("ReqHeader:host ~ example", &group));
    assert!(!selects("ReqHeader:Accept", &group));
    assert!(selects("ReqHeader:Host", &group));
}

#[test]
fn test_tag_prefix() {
    let group = request("/", "200", "a");
    assert!(selects("Req* ~ GET", &group));
    assert!(selects("Resp*", &group));
    assert!(!selects("Bereq*", &group));
}

// =============================================================================
// Combinator Tests
// =============================================================================

#[test]
fn test_and_or_not() {
    let group = request("/api", "404", "a");
    assert!(selects("ReqURL ~ /api and RespStatus == 404", &group));
    assert!(!selects("ReqURL ~ /api and RespStatus == 200", &group));
    assert!(selects("RespStatus == 200 or RespStatus == 404", &group));
    assert!(selects("not RespStatus == 200", &group));
    assert!(!selects("not ReqURL", &group));
}

#[test]
fn test_and_binds_tighter_than_or() {
    let group = request("/api", "200", "a");
    // true or (false and false)
    assert!(selects("ReqURL ~ api or RespStatus == 1 and ReqMethod eq PUT", &group));
    // (true or false) and false
    assert!(!selects(
        "(ReqURL ~ api or RespStatus == 1) and ReqMethod eq PUT",
        &group
    ));
}

#[test]
fn test_keywords_are_case_insensitive() {
    let group = request("/api", "200", "a");
    assert!(selects("ReqURL ~ api AND NOT RespStatus == 500", &group));
}

#[test]
fn test_condition_matches_any_transaction_of_group() {
    let mut group = request("/", "200", "a");
    group.push(Transaction {
        vxid: 101,
        parent: 100,
        level: 2,
        kind: TransactionKind::BackendRequest,
        records: vec![record("BereqURL", "/origin"), record("End", "")],
    });

    assert!(selects("BereqURL ~ origin and ReqURL", &group));
}
