//! Unit tests for query maps

use serde_json::json;
use web_navigator::params::decode_uri_component;
use web_navigator::{Query, QueryValue};

#[test]
fn test_extend_prefers_incoming_values() {
    let mut base = Query::parse("a=1&b=2");
    base.extend(&Query::parse("b=3&c=4"));

    assert_eq!(base.len(), 3);
    assert_eq!(base.get_str("b"), Some("3"));
    assert_eq!(base.to_query_string(), "a=1&b=3&c=4");
}

#[test]
fn test_append_accumulates() {
    let mut query = Query::new();
    query.append("tag".into(), "x".into());
    assert_eq!(query.get("tag"), Some(&QueryValue::Single("x".into())));

    query.append("tag".into(), "y".into());
    query.append("tag".into(), "z".into());
    assert_eq!(
        query.get("tag"),
        Some(&QueryValue::Multi(vec!["x".into(), "y".into(), "z".into()]))
    );
    assert_eq!(query.get("tag").and_then(QueryValue::last), Some("z"));
}

#[test]
fn test_get_as_parse_failure() {
    let query = Query::parse("page=2&name=abc");
    assert_eq!(query.get_as::<u32>("page"), Some(2));
    assert_eq!(query.get_as::<u32>("name"), None);
    assert_eq!(query.get_as::<u32>("missing"), None);
}

#[test]
fn test_collect_from_pairs() {
    let query: Query = vec![("b", "2"), ("a", "1")].into_iter().collect();
    assert_eq!(query.keys().cloned().collect::<Vec<_>>(), vec!["a", "b"]);
    assert_eq!(query.to_query_string(), "a=1&b=2");
}

#[test]
fn test_parse_decodes_reserved_characters() {
    let query = Query::parse("q=a%26b&mark=%E2%9C%93");
    assert_eq!(query.get_str("q"), Some("a&b"));
    assert_eq!(query.get_str("mark"), Some("\u{2713}"));
}

#[test]
fn test_list_values_serialize_repeated() {
    let mut query = Query::new();
    query.insert("tags", vec!["a b".to_string(), "c".to_string()]);
    assert_eq!(query.to_query_string(), "tags=a+b&tags=c");
}

#[test]
fn test_remove_returns_value() {
    let mut query = Query::parse("a=1");
    assert_eq!(query.remove("a"), Some(QueryValue::Single("1".into())));
    assert!(query.is_empty());
    assert_eq!(query.remove("a"), None);
}

#[test]
fn test_empty_values() {
    assert!(QueryValue::Single(String::new()).is_empty());
    assert!(QueryValue::Multi(vec![]).is_empty());
    assert_eq!(QueryValue::Multi(vec![]).first(), None);
}

#[test]
fn test_malformed_escapes_kept() {
    assert_eq!(decode_uri_component("100%"), "100%");
    assert_eq!(decode_uri_component("%zz"), "%zz");
    assert_eq!(decode_uri_component("a%2"), "a%2");
}

#[test]
fn test_serializes_as_plain_object() {
    let query = Query::parse("a=1&t=x&t=y");
    assert_eq!(
        serde_json::to_value(&query).unwrap(),
        json!({ "a": "1", "t": ["x", "y"] })
    );

    let back: Query = serde_json::from_value(json!({ "a": "1", "t": ["x", "y"] })).unwrap();
    assert_eq!(back, query);
}
