//! Engine configuration.
//!
//! [`RouterConfig`] mirrors the subset of the site configuration that the
//! client needs at runtime: base path, trailing-slash policy, locales and
//! locale domains, build mode, and a snapshot of the request (host, headers,
//! cookies) used to evaluate rewrite conditions.
//!
//! The configuration is usually embedded in the page as JSON; use
//! [`RouterConfig::from_json`], which also runs [`RouterConfig::validate`].
//!
//! ```
//! use web_navigator::RouterConfig;
//!
//! let config = RouterConfig::from_json(r#"{
//!     "basePath": "/docs",
//!     "i18n": { "locales": ["en", "fr"], "defaultLocale": "en" }
//! }"#).unwrap();
//!
//! assert_eq!(config.base_path, "/docs");
//! assert_eq!(config.default_locale(), Some("en"));
//! assert_eq!(config.data_fetch_attempts, 3);
//! ```

use crate::error::{Result, RouterError};
use crate::params::Query;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Build flavour the engine runs in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    /// Hot-reloading development server: route info and data are never reused.
    Development,
    /// Production build.
    #[default]
    Production,
}

/// A domain that serves a fixed set of locales.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DomainLocale {
    /// Host name, optionally with a port.
    pub domain: String,
    /// Locale served at the domain root.
    pub default_locale: String,
    /// Further locales served on this domain.
    pub locales: Vec<String>,
    /// Use `http://` instead of `https://` when linking to this domain.
    pub http: bool,
}

impl DomainLocale {
    /// Host name without the port, lowercased.
    pub fn hostname(&self) -> String {
        self.domain
            .split(':')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase()
    }
}

/// Locale settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct I18nConfig {
    pub locales: Vec<String>,
    pub default_locale: String,
    pub domains: Vec<DomainLocale>,
}

impl I18nConfig {
    /// Create a locale config without domain routing.
    pub fn new(locales: &[&str], default_locale: &str) -> Self {
        Self {
            locales: locales.iter().map(|l| (*l).to_string()).collect(),
            default_locale: default_locale.to_string(),
            domains: Vec::new(),
        }
    }

    /// Add a locale domain.
    pub fn with_domain(mut self, domain: DomainLocale) -> Self {
        self.domains.push(domain);
        self
    }

    /// Check whether `locale` is configured (case-sensitive, as stored).
    pub fn has_locale(&self, locale: &str) -> bool {
        self.locales.iter().any(|l| l == locale)
    }
}

/// Snapshot of the current document request, used by rewrite `has` and
/// `missing` conditions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestContext {
    pub host: Option<String>,
    pub user_agent: Option<String>,
    /// Header values keyed by lowercase name.
    pub headers: BTreeMap<String, String>,
    pub cookies: BTreeMap<String, String>,
}

impl RequestContext {
    /// Look up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        if let Some(value) = self.headers.get(&name) {
            return Some(value);
        }
        match name.as_str() {
            "host" => self.host.as_deref(),
            "user-agent" => self.user_agent.as_deref(),
            _ => None,
        }
    }

    /// Look up a cookie by name.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Parse a `Cookie` header (`a=1; b=2`) into the cookie map.
    pub fn with_cookie_header(mut self, header: &str) -> Self {
        for pair in header.split(';') {
            if let Some((name, value)) = pair.split_once('=') {
                self.cookies
                    .insert(name.trim().to_string(), value.trim().to_string());
            }
        }
        self
    }
}

/// Runtime configuration for a [`Router`](crate::Router).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RouterConfig {
    /// Path prefix the site is mounted under (`""` or `/something`).
    pub base_path: String,
    /// Keep a trailing slash on page paths.
    pub trailing_slash: bool,
    pub i18n: Option<I18nConfig>,
    /// The current host is one of the configured locale domains.
    pub is_locale_domain: bool,
    pub build: BuildMode,
    /// The site defines rewrites; query strings may map to other pages.
    pub has_rewrites: bool,
    /// Save and restore scroll offsets across history traversal.
    pub scroll_restoration: bool,
    /// Attempts for data requests issued while hydrating.
    pub data_fetch_attempts: u32,
    pub request: RequestContext,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            base_path: String::new(),
            trailing_slash: false,
            i18n: None,
            is_locale_domain: false,
            build: BuildMode::Production,
            has_rewrites: false,
            scroll_restoration: false,
            data_fetch_attempts: 3,
            request: RequestContext::default(),
        }
    }
}

impl RouterConfig {
    /// Create a default production configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for inconsistencies.
    pub fn validate(&self) -> Result<()> {
        if !self.base_path.is_empty()
            && (!self.base_path.starts_with('/') || self.base_path.ends_with('/'))
        {
            return Err(RouterError::Config {
                message: format!(
                    "basePath \"{}\" must start with / and must not end with /",
                    self.base_path
                ),
            });
        }

        if let Some(i18n) = &self.i18n {
            if !i18n.has_locale(&i18n.default_locale) {
                return Err(RouterError::Config {
                    message: format!(
                        "defaultLocale \"{}\" is not listed in locales",
                        i18n.default_locale
                    ),
                });
            }
            for domain in &i18n.domains {
                if domain.domain.is_empty() {
                    return Err(RouterError::Config {
                        message: "locale domain must not be empty".to_string(),
                    });
                }
            }
        }

        if self.data_fetch_attempts == 0 {
            return Err(RouterError::Config {
                message: "dataFetchAttempts must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    pub fn with_trailing_slash(mut self, trailing_slash: bool) -> Self {
        self.trailing_slash = trailing_slash;
        self
    }

    pub fn with_i18n(mut self, i18n: I18nConfig) -> Self {
        self.i18n = Some(i18n);
        self
    }

    pub fn with_build(mut self, build: BuildMode) -> Self {
        self.build = build;
        self
    }

    pub fn with_scroll_restoration(mut self, enabled: bool) -> Self {
        self.scroll_restoration = enabled;
        self
    }

    pub fn with_request(mut self, request: RequestContext) -> Self {
        self.request = request;
        self
    }

    /// Configured locales, empty without i18n.
    pub fn locales(&self) -> &[String] {
        self.i18n
            .as_ref()
            .map(|i18n| i18n.locales.as_slice())
            .unwrap_or_default()
    }

    pub fn default_locale(&self) -> Option<&str> {
        self.i18n.as_ref().map(|i18n| i18n.default_locale.as_str())
    }

    pub fn domains(&self) -> &[DomainLocale] {
        self.i18n
            .as_ref()
            .map(|i18n| i18n.domains.as_slice())
            .unwrap_or_default()
    }

    pub fn is_development(&self) -> bool {
        self.build == BuildMode::Development
    }
}

/// Server-rendered payload the engine starts from.
///
/// ```
/// use web_navigator::InitialPage;
///
/// let page: InitialPage = serde_json::from_str(r#"{
///     "page": "/blog/[slug]",
///     "query": { "slug": "hello" },
///     "asPath": "/blog/hello",
///     "props": { "pageProps": { "title": "Hello" } },
///     "gsp": true
/// }"#).unwrap();
///
/// assert_eq!(page.query.get_str("slug"), Some("hello"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InitialPage {
    /// Route of the rendered page.
    pub page: String,
    pub query: Query,
    pub as_path: String,
    pub props: serde_json::Value,
    pub locale: Option<String>,
    pub is_fallback: bool,
    pub is_preview: bool,
    /// Page uses server-side props.
    pub gssp: bool,
    /// Page uses static props.
    pub gsp: bool,
    /// Page uses `getInitialProps`.
    pub gip: bool,
    /// The app wrapper uses `getInitialProps`.
    pub app_gip: bool,
    /// Page was automatically statically optimized.
    pub auto_export: bool,
    /// Serialized error the server rendered with, if any.
    pub err: Option<String>,
}

impl InitialPage {
    /// Decide whether the query is already final when the engine starts.
    ///
    /// Statically exported pages are rendered without the query, so they are
    /// only ready once a query update or navigation has run, unless nothing
    /// could have changed (no search string, no rewrites, not dynamic).
    pub fn is_ready(&self, search: &str, has_rewrites: bool) -> bool {
        let auto_export_dynamic =
            crate::matching::is_dynamic_route(&self.page) && self.auto_export;
        self.gssp
            || self.gip
            || (self.app_gip && !self.gsp)
            || (!auto_export_dynamic && search.is_empty() && !has_rewrites)
    }
}
