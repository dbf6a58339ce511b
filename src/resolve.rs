//! Route resolution pipeline
//!
//! Turns caller-supplied `(href, as)` pairs into the canonical strings the
//! navigation engine works with.
//!
//! # Architecture
//!
//! ```text
//! href ──► resolve_href ──► prepare_url_as ──► (url, as)
//!              │                  │
//!              │                  └─ base path added unless absolute
//!              └─ slash repair, relative resolution, trailing slash,
//!                 dynamic-route interpolation
//!
//! pathname ──► resolve_dynamic_route ──► page route
//! ```
//!
//! Nothing here fails on malformed input: an href that cannot be resolved is
//! returned unchanged, which makes it non-local and leads the engine to a
//! full page load.

use crate::cache::RouteRegexCache;
use crate::config::RouterConfig;
use crate::error_log;
use crate::matching::{interpolate_with, is_dynamic_route};
use crate::params::Query;
use crate::path::{add_base_path, normalize_path_trailing_slash, remove_trailing_slash};
use crate::url::{format_url, is_local_url, normalize_repeated_slashes, strip_origin, ParsedUrl, Url};
use crate::trace_log;

/// Synthetic origin relative hrefs are resolved against.
const RESOLVE_ORIGIN: &str = "http://n";

// ============================================================================
// Context
// ============================================================================

/// The parts of the current router state that resolution reads.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    /// Current route (`/blog/[slug]`), base for path-relative hrefs.
    pub pathname: &'a str,
    /// Current displayed path, base for hash-only hrefs.
    pub as_path: &'a str,
    pub location: &'a Url,
    pub config: &'a RouterConfig,
}

impl ResolveContext<'_> {
    /// Same-origin and under the base path (or relative).
    pub fn is_locally_routable(&self, url: &str) -> bool {
        is_local_url(url, self.location, &self.config.base_path)
    }
}

/// Result of [`resolve_href`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedHref {
    /// Resolved href; relative unless the input was absolute.
    pub resolved: String,
    /// With interpolation requested: the href with dynamic placeholders
    /// filled in, or `resolved` when there was nothing to fill. `None` for
    /// non-local hrefs or when interpolation was not requested.
    pub interpolated_as: Option<String>,
}

// ============================================================================
// Href resolution
// ============================================================================

/// Check for a `scheme://` prefix and return its length.
fn protocol_prefix_len(url: &str) -> Option<usize> {
    let colon = url.find("://")?;
    url[..colon]
        .chars()
        .all(|c| c.is_ascii_alphabetic())
        .then_some(colon + 3)
        .filter(|_| colon > 0)
}

/// Resolve `href` against the current route.
///
/// Repeated `//` and `\` before the query are reported and collapsed. A
/// hash-only href is resolved against the displayed path, anything else
/// against the current route. With `resolve_as`, a dynamic route href has
/// its placeholders filled from its own query, and those params are removed
/// from the query of the interpolated result.
///
/// ```
/// use web_navigator::resolve::{resolve_href, ResolveContext};
/// use web_navigator::{url::Url, RouterConfig};
///
/// let config = RouterConfig::default();
/// let location = Url::parse("https://example.com/").unwrap();
/// let ctx = ResolveContext {
///     pathname: "/",
///     as_path: "/",
///     location: &location,
///     config: &config,
/// };
///
/// let out = resolve_href(&ctx, "/blog/[slug]?slug=hello&ref=home", true);
/// assert_eq!(out.resolved, "/blog/[slug]?slug=hello&ref=home");
/// assert_eq!(out.interpolated_as.as_deref(), Some("/blog/hello?ref=home"));
/// ```
pub fn resolve_href(ctx: &ResolveContext<'_>, href: &str, resolve_as: bool) -> ResolvedHref {
    let mut url = href.to_string();
    let proto_len = protocol_prefix_len(&url).unwrap_or(0);
    let without_proto = &url[proto_len..];
    let before_query = without_proto.split('?').next().unwrap_or_default();

    if before_query.contains("//") || before_query.contains('\\') {
        error_log!(
            "Invalid href '{}' passed to router in page: '{}'. Repeated forward-slashes (//) or backslashes \\ are not valid in the href.",
            href,
            ctx.pathname
        );
        url = format!("{}{}", &url[..proto_len], normalize_repeated_slashes(without_proto));
    }

    let unresolved = |url: String| ResolvedHref {
        resolved: url,
        interpolated_as: None,
    };

    if !ctx.is_locally_routable(&url) {
        return unresolved(url);
    }

    let Some(origin) = Url::parse(RESOLVE_ORIGIN) else {
        return unresolved(url);
    };
    let base_path = if url.starts_with('#') {
        ctx.as_path
    } else {
        ctx.pathname
    };
    let base = origin.join(base_path).unwrap_or_else(|| origin.clone());

    let Some(mut final_url) = base.join(&url) else {
        return unresolved(url);
    };
    let pathname =
        normalize_path_trailing_slash(final_url.pathname(), ctx.config.trailing_slash).into_owned();
    final_url.set_pathname(&pathname);

    let resolved = if final_url.origin() == base.origin() {
        final_url.path_and_rest()
    } else {
        final_url.href()
    };

    if !resolve_as {
        return unresolved(resolved);
    }

    let mut interpolated_as = None;
    if is_dynamic_route(final_url.pathname()) {
        let query = Query::parse(&final_url.search());
        if let Ok(regex) = crate::matching::RouteRegex::compile(final_url.pathname()) {
            let interpolation = interpolate_with(&regex, final_url.pathname(), &query);
            if let Some(result) = interpolation.result {
                let mut parsed = ParsedUrl {
                    pathname: result,
                    hash: final_url.hash(),
                    ..Default::default()
                };
                parsed.set_query(query.without(&interpolation.params));
                interpolated_as = Some(format_url(&parsed));
            }
        }
    }

    trace_log!("Resolved href '{}' to '{}'", href, resolved);
    ResolvedHref {
        interpolated_as: Some(interpolated_as.unwrap_or_else(|| resolved.clone())),
        resolved,
    }
}

/// Canonical `(url, as)` pair for a navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedUrlAs {
    pub url: String,
    pub as_path: String,
}

/// Resolve `url` and `as` and add the base path.
///
/// Without an explicit `as`, the interpolated form of `url` is shown. The
/// base path is not added to inputs that were already absolute.
pub fn prepare_url_as(ctx: &ResolveContext<'_>, url: &str, as_path: Option<&str>) -> PreparedUrlAs {
    let ResolvedHref {
        resolved,
        interpolated_as,
    } = resolve_href(ctx, url, true);

    let origin = ctx.location.origin();
    let href_was_absolute = resolved.starts_with(&origin);
    let as_was_absolute = interpolated_as
        .as_deref()
        .is_some_and(|as_path| as_path.starts_with(&origin));

    let resolved = strip_origin(&resolved, ctx.location);
    let interpolated_as = interpolated_as.map(|as_path| strip_origin(&as_path, ctx.location));

    let prepared_url = if href_was_absolute {
        resolved.clone()
    } else {
        add_base_path(&resolved, ctx.config)
    };
    let prepared_as = match as_path {
        Some(as_path) => strip_origin(&resolve_href(ctx, as_path, false).resolved, ctx.location),
        None => interpolated_as.unwrap_or(resolved),
    };

    PreparedUrlAs {
        url: prepared_url,
        as_path: if as_was_absolute {
            prepared_as
        } else {
            add_base_path(&prepared_as, ctx.config)
        },
    }
}

// ============================================================================
// Dynamic route resolution
// ============================================================================

/// Map `/index` page paths back to their route.
fn denormalize_page_path(page: &str) -> &str {
    if page == "/index" {
        "/"
    } else if page.starts_with("/index/") && !is_dynamic_route(page) {
        &page[6..]
    } else {
        page
    }
}

/// Find the page that serves `pathname`.
///
/// An exact known page is returned as is; otherwise the first dynamic page,
/// in listed order, whose pattern matches. `/404` and `/_error` are never
/// remapped.
///
/// ```
/// use web_navigator::{cache::RouteRegexCache, resolve::resolve_dynamic_route};
///
/// let pages = vec!["/".to_string(), "/blog/[slug]".to_string()];
/// let mut regexes = RouteRegexCache::new();
/// assert_eq!(resolve_dynamic_route("/blog/hello/", &pages, &mut regexes), "/blog/[slug]");
/// assert_eq!(resolve_dynamic_route("/about", &pages, &mut regexes), "/about");
/// ```
pub fn resolve_dynamic_route(pathname: &str, pages: &[String], regexes: &mut RouteRegexCache) -> String {
    let clean = remove_trailing_slash(denormalize_page_path(pathname));
    if clean == "/404" || clean == "/_error" {
        return pathname.to_string();
    }

    if !pages.iter().any(|page| page == clean) {
        for page in pages.iter().filter(|page| is_dynamic_route(page)) {
            match regexes.get_or_compile(page) {
                Ok(regex) if regex.is_match(clean) => {
                    trace_log!("Dynamic page '{}' serves '{}'", page, clean);
                    return page.clone();
                }
                Ok(_) => {}
                Err(err) => {
                    error_log!("Skipping page '{}': {}", page, err);
                }
            }
        }
    }

    remove_trailing_slash(pathname).to_string()
}
