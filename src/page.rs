//! Page loading and rendering seams.
//!
//! The engine does not know how view code is bundled, loaded, or rendered.
//! It talks to those subsystems through the traits in this module:
//!
//! | Trait                | Provides                                           |
//! |----------------------|----------------------------------------------------|
//! | [`PageLoader`]       | page list, middleware matchers, view modules, data URLs |
//! | [`ManifestProvider`] | the client build manifest (rewrite table)          |
//! | [`PropsProvider`]    | `getInitialProps`-style props for views without data |
//! | [`RouteSubscriber`]  | the render callback, receives every committed route |
//!
//! All traits are `?Send`: the engine runs on a single-threaded executor.

use crate::config::RouterConfig;
use crate::error::{Result, RouterError};
use crate::matching::{interpolate_as, is_dynamic_route};
use crate::middleware::MiddlewareMatcher;
use crate::params::Query;
use crate::path::{add_locale, remove_trailing_slash, PathnameInfo};
use crate::rewrites::RewriteTable;
use crate::route_info::RouteInfo;
use crate::state::RouterState;
use crate::url::{parse_relative_url, Url};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::rc::Rc;

// ============================================================================
// Views
// ============================================================================

/// Opaque handle to a loaded view module.
///
/// The engine only compares and forwards views; the rendering layer
/// downcasts [`module`](Self::module) to whatever it registered.
#[derive(Clone)]
pub struct View {
    id: Rc<str>,
    module: Rc<dyn Any>,
}

impl View {
    pub fn new<T: Any>(id: impl Into<Rc<str>>, module: T) -> Self {
        Self {
            id: id.into(),
            module: Rc::new(module),
        }
    }

    /// A view without a module payload, identified by name only.
    pub fn named(id: impl Into<Rc<str>>) -> Self {
        Self::new(id, ())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn module(&self) -> &dyn Any {
        self.module.as_ref()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.module.downcast_ref()
    }
}

impl PartialEq for View {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Rc::ptr_eq(&self.module, &other.module)
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View").field("id", &self.id).finish()
    }
}

/// A stylesheet shipped with a view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleSheet {
    pub href: String,
    pub content: String,
}

/// Which kind of page data a view needs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataFlags {
    /// Statically generated props (cacheable).
    pub static_data: bool,
    /// Server-computed props on every request (one-shot).
    pub server_data: bool,
    /// Streamed component payload (never cached).
    pub streamed_data: bool,
}

impl DataFlags {
    pub fn needs_data(&self) -> bool {
        self.static_data || self.server_data || self.streamed_data
    }
}

/// A loaded page: view, styles, and data flags.
#[derive(Debug, Clone, PartialEq)]
pub struct PageModule {
    pub view: View,
    pub styles: Vec<StyleSheet>,
    pub flags: DataFlags,
}

impl PageModule {
    pub fn new(view: View) -> Self {
        Self {
            view,
            styles: Vec::new(),
            flags: DataFlags::default(),
        }
    }

    pub fn with_flags(mut self, flags: DataFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_style(mut self, style: StyleSheet) -> Self {
        self.styles.push(style);
        self
    }
}

// ============================================================================
// Loader and manifest
// ============================================================================

/// Arguments for [`PageLoader::data_href`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataHrefParams<'a> {
    /// `pathname?query` of the page route.
    pub href: &'a str,
    /// Displayed path.
    pub as_path: &'a str,
    pub locale: Option<&'a str>,
    /// The page uses static data.
    pub ssg: bool,
    /// Request the streamed payload instead of JSON.
    pub rsc: bool,
    /// Use `as_path` verbatim instead of interpolating the route.
    pub skip_interpolation: bool,
}

/// Code-loading subsystem.
#[async_trait(?Send)]
pub trait PageLoader {
    /// Every page route known to the build.
    async fn page_list(&self) -> Result<Vec<String>>;

    /// Middleware matchers, `None` when the site has no middleware.
    async fn middleware(&self) -> Result<Option<Vec<MiddlewareMatcher>>>;

    /// Load the view module for `route`.
    async fn load_page(&self, route: &str) -> Result<PageModule>;

    /// URL of the data document for a page.
    fn data_href(&self, params: &DataHrefParams<'_>) -> String;

    /// Whether `route` is statically generated.
    async fn is_ssg(&self, route: &str) -> bool;

    /// Warm the code cache for `route`.
    async fn prefetch(&self, route: &str) -> Result<()> {
        let _ = route;
        Ok(())
    }
}

/// Client build manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildManifest {
    #[serde(rename = "__rewrites", default)]
    pub rewrites: RewriteTable,
}

/// Source of the [`BuildManifest`].
#[async_trait(?Send)]
pub trait ManifestProvider {
    async fn client_build_manifest(&self) -> Result<BuildManifest>;
}

/// Build the conventional data URL
/// `<base>/_next/data/<build>/<locale>/<page>.json<search>`.
///
/// Helper for [`PageLoader::data_href`] implementations.
///
/// ```
/// use web_navigator::page::{data_href_for, DataHrefParams};
/// use web_navigator::{url::Url, RouterConfig};
///
/// let location = Url::parse("https://example.com/").unwrap();
/// let params = DataHrefParams {
///     href: "/blog/[slug]?slug=hello",
///     as_path: "/blog/hello",
///     locale: None,
///     ssg: true,
///     rsc: false,
///     skip_interpolation: false,
/// };
/// let href = data_href_for(&params, "b1", &RouterConfig::default(), &location).unwrap();
/// assert_eq!(href, "/_next/data/b1/blog/hello.json?slug=hello");
/// ```
pub fn data_href_for(
    params: &DataHrefParams<'_>,
    build_id: &str,
    config: &RouterConfig,
    location: &Url,
) -> Result<String> {
    let href = parse_relative_url(params.href, None, location)?;
    let as_path = parse_relative_url(params.as_path, None, location)?;
    let route = remove_trailing_slash(&href.pathname).to_string();
    if !route.starts_with('/') {
        return Err(RouterError::InvalidHref { href: route });
    }

    let page_path = if params.skip_interpolation {
        as_path.pathname.clone()
    } else if is_dynamic_route(&route) {
        interpolate_as(&href.pathname, &as_path.pathname, &href.query)?
            .result
            .unwrap_or_default()
    } else {
        route
    };

    let base = if config.base_path.is_empty() {
        None
    } else {
        Some(config.base_path.clone())
    };

    if params.rsc {
        let path = crate::path::add_path_prefix(
            &add_locale(&page_path, params.locale, None),
            &config.base_path,
        );
        let separator = if href.search.is_empty() { '?' } else { '&' };
        return Ok(format!("{path}{}{separator}__flight__", href.search));
    }

    let info = PathnameInfo {
        pathname: page_path,
        base_path: base,
        build_id: Some(build_id.to_string()),
        locale: params.locale.map(str::to_string),
        ..Default::default()
    };
    Ok(format!("{}{}", info.format(), href.search))
}

// ============================================================================
// Props and rendering
// ============================================================================

/// Context handed to [`PropsProvider::initial_props`].
#[derive(Debug, Clone, PartialEq)]
pub struct PropsContext {
    pub pathname: String,
    pub query: Query,
    pub as_path: String,
    pub locale: Option<String>,
    pub locales: Vec<String>,
    pub default_locale: Option<String>,
    /// Set when computing props for the error view.
    pub err: Option<RouterError>,
}

/// Initial-props capability for views that have no data route.
#[async_trait(?Send)]
pub trait PropsProvider {
    /// Compute the props object (`{"pageProps": …}`) for `view`.
    async fn initial_props(&self, view: &View, ctx: &PropsContext) -> Result<serde_json::Value>;
}

/// Props provider that always yields `{"pageProps": {}}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyProps;

#[async_trait(?Send)]
impl PropsProvider for EmptyProps {
    async fn initial_props(&self, _view: &View, _ctx: &PropsContext) -> Result<serde_json::Value> {
        Ok(serde_json::json!({ "pageProps": {} }))
    }
}

/// Scroll instruction attached to a published route.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollTarget {
    pub x: f64,
    pub y: f64,
}

/// A committed route, as handed to the rendering layer.
#[derive(Debug, Clone)]
pub struct RouteUpdate {
    pub state: RouterState,
    pub route_info: Rc<RouteInfo>,
    /// Where to scroll after rendering, `None` to leave the viewport alone.
    pub reset_scroll: Option<ScrollTarget>,
}

/// The rendering layer.
#[async_trait(?Send)]
pub trait RouteSubscriber {
    /// Render `update`. Errors fail the navigation.
    async fn publish(&self, update: RouteUpdate) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::I18nConfig;

    fn location() -> Url {
        Url::parse("https://example.com/").unwrap()
    }

    fn params<'a>(href: &'a str, as_path: &'a str, locale: Option<&'a str>) -> DataHrefParams<'a> {
        DataHrefParams {
            href,
            as_path,
            locale,
            ssg: true,
            rsc: false,
            skip_interpolation: false,
        }
    }

    #[test]
    fn test_view_identity() {
        let a = View::new("home", 1u8);
        let b = a.clone();
        let c = View::new("home", 1u8);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.downcast_ref::<u8>(), Some(&1));
    }

    #[test]
    fn test_data_href_index_and_locale() {
        let config = RouterConfig::default().with_i18n(I18nConfig::new(&["en", "fr"], "en"));
        let href = data_href_for(&params("/", "/", None), "b", &config, &location()).unwrap();
        assert_eq!(href, "/_next/data/b/index.json");

        let href =
            data_href_for(&params("/about", "/about", Some("fr")), "b", &config, &location())
                .unwrap();
        assert_eq!(href, "/_next/data/b/fr/about.json");
    }

    #[test]
    fn test_data_href_base_path() {
        let config = RouterConfig::default().with_base_path("/docs");
        let href =
            data_href_for(&params("/intro", "/intro", None), "b", &config, &location()).unwrap();
        assert_eq!(href, "/docs/_next/data/b/intro.json");
    }

    #[test]
    fn test_data_href_streamed() {
        let mut p = params("/feed?page=2", "/feed?page=2", None);
        p.rsc = true;
        let href = data_href_for(&p, "b", &RouterConfig::default(), &location()).unwrap();
        assert_eq!(href, "/feed?page=2&__flight__");
    }

    #[test]
    fn test_manifest_json() {
        let manifest: BuildManifest = serde_json::from_str(
            r#"{"__rewrites":{"beforeFiles":[],"afterFiles":[{"source":"/a","destination":"/b"}],"fallback":[]}}"#,
        )
        .unwrap();
        assert_eq!(manifest.rewrites.after_files.len(), 1);
    }
}
