//! Path normalization: trailing slash, base path, locale prefix

use web_navigator::path::{
    add_base_path, add_locale, has_base_path, normalize_locale_path,
    normalize_path_trailing_slash, remove_base_path, remove_locale, PathnameInfo,
};
use web_navigator::{I18nConfig, RouterConfig};

#[test]
fn test_trailing_slash_keeps_query_and_hash() {
    assert_eq!(
        normalize_path_trailing_slash("/about?x=1#h", true),
        "/about/?x=1#h"
    );
    assert_eq!(
        normalize_path_trailing_slash("/about/?x=1#h", false),
        "/about?x=1#h"
    );
}

#[test]
fn test_trailing_slash_files_and_root() {
    assert_eq!(normalize_path_trailing_slash("/robots.txt/", true), "/robots.txt");
    assert_eq!(normalize_path_trailing_slash("/", false), "/");
    assert_eq!(normalize_path_trailing_slash("/", true), "/");
    assert_eq!(normalize_path_trailing_slash("about", true), "about");
}

#[test]
fn test_base_path_round_trip() {
    let config = RouterConfig::new().with_base_path("/docs");
    assert_eq!(add_base_path("/about", &config), "/docs/about");
    assert_eq!(add_base_path("/", &config), "/docs");

    assert!(has_base_path("/docs/about", "/docs"));
    assert!(!has_base_path("/docsite", "/docs"));
    assert_eq!(remove_base_path("/docs/about", "/docs"), "/about");
    assert_eq!(remove_base_path("/docs", "/docs"), "/");
    assert_eq!(remove_base_path("/docs?x=1", "/docs"), "/?x=1");
}

#[test]
fn test_base_path_with_trailing_slash() {
    let config = RouterConfig::new()
        .with_base_path("/docs")
        .with_trailing_slash(true);
    assert_eq!(add_base_path("/about", &config), "/docs/about/");
}

#[test]
fn test_locale_prefix_rules() {
    assert_eq!(add_locale("/about", Some("fr"), Some("en")), "/fr/about");
    assert_eq!(add_locale("/about", Some("en"), Some("en")), "/about");
    assert_eq!(add_locale("/api/items", Some("fr"), Some("en")), "/api/items");
    assert_eq!(add_locale("/FR/about", Some("fr"), Some("en")), "/FR/about");
    assert_eq!(add_locale("/about", None, Some("en")), "/about");
}

#[test]
fn test_locale_removal_keeps_suffix() {
    assert_eq!(remove_locale("/fr/about?x=1", Some("fr")), "/about?x=1");
    assert_eq!(remove_locale("/fr", Some("fr")), "/");
    assert_eq!(remove_locale("/fr?x=1", Some("fr")), "/?x=1");
    assert_eq!(remove_locale("/french", Some("fr")), "/french");
}

#[test]
fn test_locale_detection_bare_and_unknown() {
    let locales = vec!["en".to_string(), "fr".to_string()];

    let bare = normalize_locale_path("/fr", &locales);
    assert_eq!(bare.pathname, "/");
    assert_eq!(bare.detected_locale.as_deref(), Some("fr"));

    let unknown = normalize_locale_path("/de/about", &locales);
    assert_eq!(unknown.pathname, "/de/about");
    assert_eq!(unknown.detected_locale, None);
}

#[test]
fn test_pathname_info_round_trip_with_base_and_locale() {
    let config = RouterConfig::new()
        .with_base_path("/docs")
        .with_i18n(I18nConfig::new(&["en", "fr"], "en"));

    let mut info = PathnameInfo::parse("/docs/fr/about/", &config, false);
    assert_eq!(info.pathname, "/about/");
    assert_eq!(info.base_path.as_deref(), Some("/docs"));
    assert_eq!(info.locale.as_deref(), Some("fr"));
    assert!(info.trailing_slash);

    info.default_locale = Some("en".into());
    assert_eq!(info.format(), "/docs/fr/about/");
}

#[test]
fn test_pathname_info_index_data_route() {
    let config = RouterConfig::new();

    let raw = PathnameInfo::parse("/_next/data/b1/index.json", &config, false);
    assert_eq!(raw.pathname, "/_next/data/b1/index.json");
    assert_eq!(raw.build_id.as_deref(), Some("b1"));

    let page = PathnameInfo::parse("/_next/data/b1/index.json", &config, true);
    assert_eq!(page.pathname, "/");
    assert_eq!(page.format(), "/_next/data/b1/index.json");
}
