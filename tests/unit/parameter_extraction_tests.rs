//! Parameter extraction from matched pathnames

use web_navigator::matching::RouteRegex;
use web_navigator::QueryValue;

#[test]
fn test_extract_typed_params() {
    let regex = RouteRegex::compile("/users/[id]/posts/[post]").unwrap();
    let params = regex.match_path("/users/42/posts/7").unwrap();

    assert_eq!(params.get_as::<u32>("id"), Some(42));
    assert_eq!(params.get_as::<u32>("post"), Some(7));
    assert_eq!(params.len(), 2);
}

#[test]
fn test_extracted_values_are_decoded() {
    let regex = RouteRegex::compile("/search/[term]").unwrap();
    let params = regex.match_path("/search/hello%20world").unwrap();
    assert_eq!(params.get_str("term"), Some("hello world"));
}

#[test]
fn test_catch_all_splits_before_decoding() {
    let regex = RouteRegex::compile("/files/[...path]").unwrap();
    let params = regex.match_path("/files/a/b%2Fc").unwrap();
    assert_eq!(
        params.get("path"),
        Some(&QueryValue::Multi(vec!["a".into(), "b/c".into()]))
    );
}

#[test]
fn test_single_segment_catch_all_is_a_list() {
    let regex = RouteRegex::compile("/files/[...path]").unwrap();
    let params = regex.match_path("/files/readme").unwrap();
    assert_eq!(
        params.get("path"),
        Some(&QueryValue::Multi(vec!["readme".into()]))
    );
}

#[test]
fn test_optional_catch_all_group_flags() {
    let regex = RouteRegex::compile("/shop/[[...filters]]").unwrap();
    let group = regex.group("filters").unwrap();
    assert!(group.repeat);
    assert!(group.optional);

    let params = regex.match_path("/shop").unwrap();
    assert!(!params.contains("filters"));
}

#[test]
fn test_literal_segment_mismatch() {
    let regex = RouteRegex::compile("/users/[id]/posts").unwrap();
    assert!(regex.match_path("/users/1/comments").is_none());
}
