//! Integration tests for href resolution, dynamic routes, and rewrites
//!
//! These exercise the resolution pipeline without a router: everything here
//! is pure and synchronous.

use web_navigator::cache::RouteRegexCache;
use web_navigator::middleware::{classify_headers, CompiledMatchers, HeaderDirective, MiddlewareMatcher};
use web_navigator::resolve::{prepare_url_as, resolve_dynamic_route, resolve_href, ResolveContext};
use web_navigator::rewrites::{
    resolve_rewrites, HasKind, RewriteContext, RewriteResolution, RewriteRule, RewriteTable, RouteHas,
};
use web_navigator::url::Url;
use web_navigator::{FetchResponse, I18nConfig, Query, RequestContext, RouterConfig};

fn location() -> Url {
    Url::parse("https://example.com/").unwrap()
}

fn ctx<'a>(location: &'a Url, config: &'a RouterConfig) -> ResolveContext<'a> {
    ResolveContext {
        pathname: "/blog/[slug]",
        as_path: "/blog/hello",
        location,
        config,
    }
}

fn pages(list: &[&str]) -> Vec<String> {
    list.iter().map(|p| (*p).to_string()).collect()
}

fn rewrite(
    as_path: &str,
    table: &RewriteTable,
    pages: &[String],
    request: &RequestContext,
    query: &mut Query,
) -> RewriteResolution {
    let location = location();
    let ctx = RewriteContext {
        pages,
        locales: &[],
        base_path: "",
        request,
        location: &location,
    };
    let mut regexes = RouteRegexCache::new();
    let mut resolver = |path: &str| resolve_dynamic_route(path, pages, &mut regexes);
    resolve_rewrites(as_path, &table.compile(false), query, &ctx, &mut resolver).unwrap()
}

// ---- resolve_href / prepare_url_as ----

#[test]
fn test_interpolation_keeps_hash() {
    let config = RouterConfig::new();
    let location = location();
    let out = resolve_href(&ctx(&location, &config), "/blog/[slug]?slug=hi#comments", true);

    assert_eq!(out.resolved, "/blog/[slug]?slug=hi#comments");
    assert_eq!(out.interpolated_as.as_deref(), Some("/blog/hi#comments"));
}

#[test]
fn test_static_href_interpolates_to_itself() {
    let config = RouterConfig::new();
    let location = location();
    let out = resolve_href(&ctx(&location, &config), "/about?tab=team", true);
    assert_eq!(out.interpolated_as.as_deref(), Some("/about?tab=team"));
}

#[test]
fn test_prepare_without_as_shows_interpolated_path() {
    let config = RouterConfig::new();
    let location = location();
    let prepared = prepare_url_as(&ctx(&location, &config), "/blog/[slug]?slug=hi", None);

    assert_eq!(prepared.url, "/blog/[slug]?slug=hi");
    assert_eq!(prepared.as_path, "/blog/hi");
}

#[test]
fn test_prepare_applies_trailing_slash_to_both() {
    let config = RouterConfig::new().with_trailing_slash(true);
    let location = location();
    let prepared = prepare_url_as(&ctx(&location, &config), "/about", None);

    assert_eq!(prepared.url, "/about/");
    assert_eq!(prepared.as_path, "/about/");
}

#[test]
fn test_cross_origin_href_is_not_resolved() {
    let config = RouterConfig::new();
    let location = location();
    let routing = ctx(&location, &config);

    assert!(!routing.is_locally_routable("https://other.org/blog/x"));
    assert!(routing.is_locally_routable("https://example.com/blog/x"));
    assert!(routing.is_locally_routable("relative/path"));
}

// ---- resolve_dynamic_route ----

#[test]
fn test_static_page_wins_over_dynamic() {
    let pages = pages(&["/blog/[slug]", "/blog/new"]);
    let mut regexes = RouteRegexCache::new();

    assert_eq!(resolve_dynamic_route("/blog/new", &pages, &mut regexes), "/blog/new");
    assert_eq!(resolve_dynamic_route("/blog/other/", &pages, &mut regexes), "/blog/[slug]");
}

#[test]
fn test_catch_all_page_and_unknown_path() {
    let pages = pages(&["/", "/docs/[...path]"]);
    let mut regexes = RouteRegexCache::new();

    assert_eq!(resolve_dynamic_route("/docs/a/b", &pages, &mut regexes), "/docs/[...path]");
    assert_eq!(resolve_dynamic_route("/nothing/", &pages, &mut regexes), "/nothing");
}

// ---- resolve_rewrites ----

#[test]
fn test_before_files_rewrite_to_static_page() {
    let table = RewriteTable {
        before_files: vec![RewriteRule::new("/home", "/")],
        ..Default::default()
    };
    let pages = pages(&["/"]);
    let mut query = Query::new();
    let result = rewrite("/home", &table, &pages, &RequestContext::default(), &mut query);

    assert!(result.matched_page);
    assert_eq!(result.as_path, "/");
    assert_eq!(result.resolved_href.as_deref(), Some("/"));
}

#[test]
fn test_fallback_only_for_unknown_paths() {
    let table = RewriteTable {
        fallback: vec![RewriteRule::new("/:path*", "/catch")],
        ..Default::default()
    };
    let pages = pages(&["/", "/about", "/catch"]);

    let mut query = Query::new();
    let known = rewrite("/about", &table, &pages, &RequestContext::default(), &mut query);
    assert!(known.matched_page);
    assert_eq!(known.as_path, "/about");
    assert!(query.is_empty());

    let mut query = Query::new();
    let unknown = rewrite("/missing", &table, &pages, &RequestContext::default(), &mut query);
    assert!(unknown.matched_page);
    assert_eq!(unknown.as_path, "/catch");
    assert!(query.contains("path"));
}

#[test]
fn test_header_condition_gates_rewrite() {
    let table = RewriteTable {
        after_files: vec![RewriteRule::new("/feature", "/beta").with_has(RouteHas {
            kind: HasKind::Header,
            key: "x-beta".into(),
            value: None,
        })],
        ..Default::default()
    };
    let pages = pages(&["/", "/beta"]);

    let mut request = RequestContext::default();
    request.headers.insert("x-beta".into(), "1".into());
    let mut query = Query::new();
    let gated = rewrite("/feature", &table, &pages, &request, &mut query);
    assert!(gated.matched_page);
    assert_eq!(gated.as_path, "/beta");

    let mut query = Query::new();
    let plain = rewrite("/feature", &table, &pages, &RequestContext::default(), &mut query);
    assert!(!plain.matched_page);
    assert_eq!(plain.as_path, "/feature");
}

// ---- middleware matchers and headers ----

#[test]
fn test_matcher_sees_base_path() {
    let config = RouterConfig::new().with_base_path("/docs");
    let matchers = CompiledMatchers::compile(&[MiddlewareMatcher::new("^/docs/about$")]);

    assert!(matchers.matches("/docs/about", None, &config));
    assert!(!matchers.matches("/docs/contact", None, &config));
}

#[test]
fn test_matcher_without_locale() {
    let config = RouterConfig::new().with_i18n(I18nConfig::new(&["en", "fr"], "en"));
    let matchers =
        CompiledMatchers::compile(&[MiddlewareMatcher::new("^/about$").without_locale()]);

    assert!(matchers.matches("/about", Some("fr"), &config));
    assert!(matchers.matches("/fr/about", Some("fr"), &config));
}

#[test]
fn test_legacy_matched_path_ignores_error_pages() {
    let not_found = FetchResponse::new(200, "").with_header("x-matched-path", "/404");
    assert_eq!(classify_headers(&not_found), HeaderDirective::Next);

    let page = FetchResponse::new(200, "").with_header("x-matched-path", "/blog/[slug]");
    assert_eq!(
        classify_headers(&page),
        HeaderDirective::Rewrite {
            target: "/blog/[slug]".into(),
            explicit: false,
        }
    );
}
