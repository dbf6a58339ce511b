//! Middleware interception.
//!
//! When the site runs middleware, a navigation whose path matches one of the
//! middleware matchers first fetches page data through the server. The
//! response headers then say what middleware decided:
//!
//! | Header (first present wins)          | Effect                        |
//! |--------------------------------------|-------------------------------|
//! | `x-nextjs-rewrite`                   | rewrite (or external redirect) |
//! | `x-nextjs-matched-path`              | rewrite (or external redirect) |
//! | `x-matched-path` (not a data catch-all, `/_error`, or `/404`) | rewrite |
//! | `x-nextjs-redirect` (3xx status)     | internal or external redirect |
//! | none of the above                    | continue normally             |
//!
//! Each row is one step of [`classify_headers`]; the first step that
//! produces a directive ends classification.

use crate::cache::RouteRegexCache;
use crate::config::RouterConfig;
use crate::error::Result;
use crate::fetch::{FetchResponse, FetchedData};
use crate::matching::is_dynamic_route;
use crate::params::Query;
use crate::path::{
    add_base_path, add_locale, normalize_locale_path, parse_path, remove_base_path,
    remove_trailing_slash, PathnameInfo,
};
use crate::resolve::resolve_dynamic_route;
use crate::rewrites::{resolve_rewrites, CompiledRewrites, RewriteContext};
use crate::url::{parse_relative_url, ParsedUrl, Url};
use crate::{debug_log, trace_log, warn_log};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;

// ============================================================================
// Matchers
// ============================================================================

/// One middleware matcher from the build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiddlewareMatcher {
    /// Regex tested against the locale- and base-path-prefixed pathname.
    pub regexp: String,
    /// `Some(false)`: match the pathname without locale prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<bool>,
}

impl MiddlewareMatcher {
    pub fn new(regexp: impl Into<String>) -> Self {
        Self {
            regexp: regexp.into(),
            locale: None,
        }
    }

    /// Match against the pathname without locale prefix.
    pub fn without_locale(mut self) -> Self {
        self.locale = Some(false);
        self
    }
}

/// Compiled matcher table, built once per matcher list.
#[derive(Debug, Clone, Default)]
pub struct CompiledMatchers {
    source: Vec<MiddlewareMatcher>,
    compiled: Vec<(bool, Option<Regex>)>,
}

impl CompiledMatchers {
    /// Compile `matchers`.
    ///
    /// A matcher the regex engine cannot express (lookaround, backrefs) is
    /// kept as one that matches every path, so the server decides.
    pub fn compile(matchers: &[MiddlewareMatcher]) -> Self {
        let compiled = matchers
            .iter()
            .map(|matcher| {
                let strip_locale = matcher.locale == Some(false);
                match Regex::new(&matcher.regexp) {
                    Ok(re) => (strip_locale, Some(re)),
                    Err(err) => {
                        warn_log!(
                            "Middleware matcher '{}' is not supported ({}); treating it as matching",
                            matcher.regexp,
                            err
                        );
                        (strip_locale, None)
                    }
                }
            })
            .collect();
        Self {
            source: matchers.to_vec(),
            compiled,
        }
    }

    pub fn is_compiled_from(&self, matchers: &[MiddlewareMatcher]) -> bool {
        self.source == matchers
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }

    /// Whether any matcher matches `as_path` shown in `locale`.
    ///
    /// ```
    /// use web_navigator::middleware::{CompiledMatchers, MiddlewareMatcher};
    /// use web_navigator::{I18nConfig, RouterConfig};
    ///
    /// let config = RouterConfig::new().with_i18n(I18nConfig::new(&["en", "fr"], "en"));
    /// let matchers = CompiledMatchers::compile(&[MiddlewareMatcher::new("^/en/about$")]);
    /// assert!(matchers.matches("/about", Some("en"), &config));
    /// assert!(!matchers.matches("/about", Some("fr"), &config));
    /// ```
    pub fn matches(&self, as_path: &str, locale: Option<&str>, config: &RouterConfig) -> bool {
        let pathname = parse_path(as_path).pathname;
        let cleaned = if config.base_path.is_empty() {
            pathname.to_string()
        } else {
            remove_base_path(pathname, &config.base_path)
        };
        let as_with_locale = add_base_path(&add_locale(&cleaned, locale, None), config);
        let mut as_without_locale = None;

        self.compiled.iter().any(|(strip_locale, re)| {
            let Some(re) = re else {
                return true;
            };
            if *strip_locale {
                let path = as_without_locale.get_or_insert_with(|| {
                    add_base_path(
                        &normalize_locale_path(&cleaned, config.locales()).pathname,
                        config,
                    )
                });
                re.is_match(path)
            } else {
                re.is_match(&as_with_locale)
            }
        })
    }
}

// ============================================================================
// Effects
// ============================================================================

/// What middleware decided for a navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MiddlewareEffect {
    /// Continue with the requested route.
    Next,
    /// Render `resolved_href` while showing `parsed_as`.
    Rewrite {
        resolved_href: String,
        parsed_as: ParsedUrl,
    },
    /// Navigate within the site.
    RedirectInternal { new_url: String, new_as: String },
    /// Leave the engine and load `destination` as a document.
    RedirectExternal { destination: String },
}

/// Page data fetched through middleware, with the decoded effect.
#[derive(Debug, Clone)]
pub struct MiddlewareData {
    pub data: Rc<FetchedData>,
    pub effect: MiddlewareEffect,
}

/// A header directive, before it is resolved against the page list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderDirective {
    Rewrite {
        target: String,
        /// Came from `x-nextjs-rewrite` rather than a matched-path header.
        explicit: bool,
    },
    Redirect(String),
    Next,
}

type ClassifyStep = fn(&FetchResponse) -> Option<HeaderDirective>;

const CLASSIFY_STEPS: [ClassifyStep; 4] = [
    rewrite_header,
    matched_path_header,
    legacy_matched_path_header,
    redirect_header,
];

fn rewrite_header(response: &FetchResponse) -> Option<HeaderDirective> {
    response
        .header("x-nextjs-rewrite")
        .map(|target| HeaderDirective::Rewrite {
            target: target.to_string(),
            explicit: true,
        })
}

fn matched_path_header(response: &FetchResponse) -> Option<HeaderDirective> {
    response
        .header("x-nextjs-matched-path")
        .map(|target| HeaderDirective::Rewrite {
            target: target.to_string(),
            explicit: false,
        })
}

fn legacy_matched_path_header(response: &FetchResponse) -> Option<HeaderDirective> {
    response
        .header("x-matched-path")
        .filter(|path| {
            !path.contains("__next_data_catchall")
                && !path.contains("/_error")
                && !path.contains("/404")
        })
        .map(|target| HeaderDirective::Rewrite {
            target: target.to_string(),
            explicit: false,
        })
}

fn redirect_header(response: &FetchResponse) -> Option<HeaderDirective> {
    response
        .header("x-nextjs-redirect")
        .map(|target| HeaderDirective::Redirect(target.to_string()))
}

/// Decode middleware response headers.
pub fn classify_headers(response: &FetchResponse) -> HeaderDirective {
    CLASSIFY_STEPS
        .iter()
        .find_map(|step| step(response))
        .unwrap_or(HeaderDirective::Next)
}

/// Everything effect resolution reads besides the response.
#[derive(Debug, Clone, Copy)]
pub struct EffectContext<'a> {
    pub config: &'a RouterConfig,
    pub location: &'a Url,
    pub pages: &'a [String],
    pub rewrites: &'a CompiledRewrites,
    pub regexes: &'a RefCell<RouteRegexCache>,
}

/// Turn the response for data URL `source` into an effect.
pub fn middleware_effect(
    source: &str,
    response: &FetchResponse,
    ctx: &EffectContext<'_>,
) -> Result<MiddlewareEffect> {
    match classify_headers(response) {
        HeaderDirective::Rewrite { target, explicit } if target.starts_with('/') => {
            rewrite_effect(source, &target, explicit, ctx)
        }
        HeaderDirective::Rewrite { .. } => Ok(MiddlewareEffect::RedirectExternal {
            destination: page_url(source, ctx.config),
        }),
        HeaderDirective::Redirect(_) if !response.is_redirect() => Ok(MiddlewareEffect::Next),
        HeaderDirective::Redirect(target) if target.starts_with('/') => {
            let url = page_url(&target, ctx.config);
            Ok(MiddlewareEffect::RedirectInternal {
                new_url: url.clone(),
                new_as: url,
            })
        }
        HeaderDirective::Redirect(destination) => {
            Ok(MiddlewareEffect::RedirectExternal { destination })
        }
        HeaderDirective::Next => Ok(MiddlewareEffect::Next),
    }
}

/// Page URL for a data URL or path: data prefix removed, default locale
/// elided, query and fragment kept.
fn page_url(source: &str, config: &RouterConfig) -> String {
    let parts = parse_path(source);
    let mut info = PathnameInfo::parse(parts.pathname, config, true);
    info.build_id = None;
    info.default_locale = config.default_locale().map(str::to_string);
    format!("{}{}{}", info.format(), parts.query, parts.hash)
}

fn rewrite_effect(
    source: &str,
    target: &str,
    explicit: bool,
    ctx: &EffectContext<'_>,
) -> Result<MiddlewareEffect> {
    let config = ctx.config;
    let locales = config.locales();
    let mut parsed_target = parse_relative_url(target, None, ctx.location)?;
    let info = PathnameInfo::parse(&parsed_target.pathname, config, true);
    let mut fs_pathname = remove_trailing_slash(&info.pathname).to_string();
    let mut regexes = ctx.regexes.borrow_mut();

    let mut as_path = add_locale(&info.pathname, info.locale.as_deref(), None);
    let lands_on_page = |path: &str| {
        let without_base = remove_base_path(path, &config.base_path);
        ctx.pages
            .contains(&normalize_locale_path(&without_base, locales).pathname)
    };
    if is_dynamic_route(&as_path) || (!explicit && lands_on_page(&as_path)) {
        let source_path = parse_relative_url(source, None, ctx.location)?.pathname;
        let source_info = PathnameInfo::parse(&source_path, config, true);
        as_path = add_base_path(&source_info.pathname, config);
        parsed_target.pathname = as_path.clone();
    }

    if config.has_rewrites {
        let rewrite_ctx = RewriteContext {
            pages: ctx.pages,
            locales,
            base_path: &config.base_path,
            request: &config.request,
            location: ctx.location,
        };
        let mut query = parsed_target.query.clone();
        let result = resolve_rewrites(&as_path, ctx.rewrites, &mut query, &rewrite_ctx, &mut |path| {
            resolve_dynamic_route(path, ctx.pages, &mut regexes)
        })?;
        if result.matched_page {
            parsed_target.pathname = result.parsed_as.pathname.clone();
            as_path = parsed_target.pathname.clone();
            let mut merged = parsed_target.query.clone();
            merged.extend(&result.parsed_as.query);
            parsed_target.set_query(merged);
        }
    } else if !ctx.pages.contains(&fs_pathname) {
        fs_pathname = resolve_dynamic_route(&fs_pathname, ctx.pages, &mut regexes);
    }

    let resolved_href = if ctx.pages.contains(&fs_pathname) {
        fs_pathname
    } else {
        let without_base = remove_base_path(&parsed_target.pathname, &config.base_path);
        resolve_dynamic_route(
            &normalize_locale_path(&without_base, locales).pathname,
            ctx.pages,
            &mut regexes,
        )
    };

    let known = ctx.pages.contains(&resolved_href);
    if !known {
        debug_log!(
            "Middleware rewrite to '{}' does not land on a page; loading '{}' as a document",
            target,
            source
        );
        return Ok(MiddlewareEffect::RedirectExternal {
            destination: page_url(source, config),
        });
    }

    if is_dynamic_route(&resolved_href) {
        let regex = regexes.get_or_compile(&resolved_href)?;
        let params = regex.match_path(&as_path).unwrap_or_default();
        let mut merged: Query = parsed_target.query.clone();
        merged.extend(&params);
        parsed_target.set_query(merged);
    }

    trace_log!("Middleware rewrite '{}' -> '{}'", target, resolved_href);
    Ok(MiddlewareEffect::Rewrite {
        resolved_href,
        parsed_as: parsed_target,
    })
}

/// Fetch data through middleware when `matches` holds and decode the effect.
///
/// Any failure (fetch or decoding) yields `None`, and the navigation carries
/// on without middleware.
pub async fn with_middleware_effects<F, Fut>(
    matches: bool,
    fetch_data: F,
    ctx: &EffectContext<'_>,
) -> Option<MiddlewareData>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Rc<FetchedData>>>,
{
    if !matches {
        return None;
    }
    let data = match fetch_data().await {
        Ok(data) => data,
        Err(err) => {
            debug_log!("Middleware data fetch failed: {}", err);
            return None;
        }
    };
    match middleware_effect(&data.data_href, &data.response, ctx) {
        Ok(effect) => Some(MiddlewareData { data, effect }),
        Err(err) => {
            debug_log!("Could not decode middleware effect: {}", err);
            None
        }
    }
}
