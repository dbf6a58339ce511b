//! Unit tests for dynamic route compilation and interpolation

use web_navigator::matching::{interpolate_as, is_dynamic_route, RouteRegex};
use web_navigator::{Query, QueryValue};

#[test]
fn test_dynamic_route_detection_ignores_partial_brackets() {
    assert!(is_dynamic_route("/[org]/repos"));
    assert!(is_dynamic_route("/[[...rest]]"));
    assert!(!is_dynamic_route("/a[b]"));
    assert!(!is_dynamic_route("/[]"));
    assert!(!is_dynamic_route("/"));
}

#[test]
fn test_multiple_groups_keep_position() {
    let regex = RouteRegex::compile("/[org]/repos/[repo]").unwrap();
    assert_eq!(regex.param_names(), vec!["org".to_string(), "repo".to_string()]);
    assert_eq!(regex.group("org").map(|g| g.pos), Some(1));
    assert_eq!(regex.group("repo").map(|g| g.pos), Some(2));
    assert!(regex.group("missing").is_none());
}

#[test]
fn test_compiled_route_drops_trailing_slash() {
    let regex = RouteRegex::compile("/blog/[slug]/").unwrap();
    assert_eq!(regex.route(), "/blog/[slug]");
    assert!(regex.is_match("/blog/hello"));
    assert!(regex.is_match("/blog/hello/"));
    assert!(!regex.is_match("/blog/hello//"));
    assert!(!regex.is_match("/blog"));
}

#[test]
fn test_required_catch_all_needs_a_segment() {
    let regex = RouteRegex::compile("/docs/[...path]").unwrap();
    assert!(regex.match_path("/docs").is_none());
    assert!(regex.match_path("/docs/").is_none());
    assert!(regex.match_path("/docs/intro").is_some());
}

#[test]
fn test_interpolate_uses_matching_as_path() {
    let out = interpolate_as("/[org]/repos/[repo]", "/acme/repos/web", &Query::new()).unwrap();
    assert_eq!(out.result.as_deref(), Some("/acme/repos/web"));
}

#[test]
fn test_interpolate_falls_back_to_query_when_as_path_differs() {
    let query = Query::parse("org=acme&repo=api");
    let out = interpolate_as("/[org]/repos/[repo]", "/somewhere/else", &query).unwrap();
    assert_eq!(out.result.as_deref(), Some("/acme/repos/api"));

    let out = interpolate_as("/[org]/repos/[repo]", "/somewhere/else", &Query::new()).unwrap();
    assert_eq!(out.result, None);
    assert_eq!(out.params, vec!["org".to_string(), "repo".to_string()]);
}

#[test]
fn test_interpolate_catch_all_from_list() {
    let mut query = Query::new();
    query.insert("path", vec!["a b".to_string(), "c".to_string()]);
    let out = interpolate_as("/docs/[...path]", "/docs/[...path]", &query).unwrap();
    assert_eq!(out.result.as_deref(), Some("/docs/a%20b/c"));
}

#[test]
fn test_interpolate_root_optional_catch_all() {
    let out = interpolate_as("/[[...slug]]", "/[[...slug]]", &Query::new()).unwrap();
    assert_eq!(out.result.as_deref(), Some("/"));

    let mut query = Query::new();
    query.insert("slug", QueryValue::Multi(vec!["x".into(), "y".into()]));
    let out = interpolate_as("/[[...slug]]", "/[[...slug]]", &query).unwrap();
    assert_eq!(out.result.as_deref(), Some("/x/y"));
}
