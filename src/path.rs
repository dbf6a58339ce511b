//! Path prefix, locale, and trailing-slash utilities.
//!
//! Every function here is pure and operates on *paths* (`/a/b?q#h`), not on
//! absolute URLs. Query and fragment are preserved untouched unless stated
//! otherwise.

use crate::config::{DomainLocale, RouterConfig};
use std::borrow::Cow;

/// A path split into its three components.
///
/// `query` keeps its leading `?` and `hash` its leading `#`, so that
/// concatenating the three fields reproduces the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathParts<'a> {
    pub pathname: &'a str,
    pub query: &'a str,
    pub hash: &'a str,
}

/// Split a path into pathname, query, and fragment.
///
/// A `?` that appears after `#` belongs to the fragment.
///
/// ```
/// use web_navigator::path::parse_path;
///
/// let parts = parse_path("/blog?page=2#top");
/// assert_eq!(parts.pathname, "/blog");
/// assert_eq!(parts.query, "?page=2");
/// assert_eq!(parts.hash, "#top");
/// ```
pub fn parse_path(path: &str) -> PathParts<'_> {
    let hash_index = path.find('#');
    let query_index = path.find('?').filter(|q| hash_index.map_or(true, |h| *q < h));

    let pathname_end = query_index.or(hash_index).unwrap_or(path.len());
    let query = match query_index {
        Some(q) => &path[q..hash_index.unwrap_or(path.len())],
        None => "",
    };
    let hash = hash_index.map_or("", |h| &path[h..]);

    PathParts {
        pathname: &path[..pathname_end],
        query,
        hash,
    }
}

/// Remove a single trailing slash; `/` is returned unchanged.
pub fn remove_trailing_slash(route: &str) -> &str {
    if route.len() > 1 {
        route.strip_suffix('/').unwrap_or(route)
    } else {
        route
    }
}

/// Apply the trailing-slash policy to a path.
///
/// With `trailing_slash`, page paths get a trailing `/` while file-like last
/// segments (`/robots.txt`) lose theirs. Without it, the trailing `/` is
/// removed. Paths that do not start with `/` are returned unchanged.
pub fn normalize_path_trailing_slash(path: &str, trailing_slash: bool) -> Cow<'_, str> {
    if !path.starts_with('/') {
        return Cow::Borrowed(path);
    }
    let PathParts {
        pathname,
        query,
        hash,
    } = parse_path(path);

    if trailing_slash {
        if has_file_extension(pathname) {
            Cow::Owned(format!("{}{query}{hash}", remove_trailing_slash(pathname)))
        } else if pathname.ends_with('/') {
            Cow::Borrowed(path)
        } else {
            Cow::Owned(format!("{pathname}/{query}{hash}"))
        }
    } else {
        let trimmed = remove_trailing_slash(pathname);
        if trimmed.len() == pathname.len() {
            Cow::Borrowed(path)
        } else {
            Cow::Owned(format!("{trimmed}{query}{hash}"))
        }
    }
}

fn has_file_extension(pathname: &str) -> bool {
    let last = pathname
        .strip_suffix('/')
        .unwrap_or(pathname)
        .rsplit('/')
        .next()
        .unwrap_or_default();
    last.find('.').is_some_and(|dot| dot + 1 < last.len())
}

/// Prefix the pathname of `path`.
pub fn add_path_prefix(path: &str, prefix: &str) -> String {
    if !path.starts_with('/') || prefix.is_empty() {
        return path.to_string();
    }
    let PathParts {
        pathname,
        query,
        hash,
    } = parse_path(path);
    format!("{prefix}{pathname}{query}{hash}")
}

/// Append `suffix` to the pathname of `path`.
pub fn add_path_suffix(path: &str, suffix: &str) -> String {
    if !path.starts_with('/') || suffix.is_empty() {
        return path.to_string();
    }
    let PathParts {
        pathname,
        query,
        hash,
    } = parse_path(path);
    format!("{pathname}{suffix}{query}{hash}")
}

/// Check whether the pathname equals `prefix` or continues it with `/`.
pub fn path_has_prefix(path: &str, prefix: &str) -> bool {
    let pathname = parse_path(path).pathname;
    pathname == prefix
        || pathname
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Remove `prefix` from the start of `path`, keeping a leading `/`.
pub fn remove_path_prefix(path: &str, prefix: &str) -> String {
    if prefix.is_empty() || !path_has_prefix(path, prefix) {
        return path.to_string();
    }
    let rest = &path[prefix.len()..];
    if rest.starts_with('/') {
        rest.to_string()
    } else {
        format!("/{rest}")
    }
}

/// Prefix with the base path and apply the trailing-slash policy.
pub fn add_base_path(path: &str, config: &RouterConfig) -> String {
    normalize_path_trailing_slash(
        &add_path_prefix(path, &config.base_path),
        config.trailing_slash,
    )
    .into_owned()
}

pub fn has_base_path(path: &str, base_path: &str) -> bool {
    path_has_prefix(path, base_path)
}

pub fn remove_base_path(path: &str, base_path: &str) -> String {
    remove_path_prefix(path, base_path)
}

/// Prefix `path` with `/<locale>`.
///
/// Nothing is added for the default locale, for `/api` paths, or when the
/// path already carries the locale (case-insensitive).
pub fn add_locale(path: &str, locale: Option<&str>, default_locale: Option<&str>) -> String {
    let Some(locale) = locale else {
        return path.to_string();
    };
    if Some(locale) == default_locale {
        return path.to_string();
    }
    let lower = path.to_lowercase();
    if path_has_prefix(&lower, "/api")
        || path_has_prefix(&lower, &format!("/{}", locale.to_lowercase()))
    {
        return path.to_string();
    }
    add_path_prefix(path, &format!("/{locale}"))
}

/// Strip a leading `/<locale>` segment, case-insensitively.
pub fn remove_locale(path: &str, locale: Option<&str>) -> String {
    let Some(locale) = locale else {
        return path.to_string();
    };
    let pathname = parse_path(path).pathname.to_lowercase();
    let prefix = format!("/{}", locale.to_lowercase());

    if pathname == prefix || pathname.starts_with(&format!("{prefix}/")) {
        let rest = &path[prefix.len()..];
        if pathname.len() == prefix.len() {
            format!("/{rest}")
        } else {
            rest.to_string()
        }
    } else {
        path.to_string()
    }
}

/// Result of [`normalize_locale_path`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalePath {
    pub pathname: String,
    /// The configured spelling of the locale found in the first segment.
    pub detected_locale: Option<String>,
}

/// Detect and strip a locale from the first path segment.
///
/// ```
/// use web_navigator::path::normalize_locale_path;
///
/// let locales = vec!["en-US".to_string(), "fr".to_string()];
/// let result = normalize_locale_path("/en-us/about", &locales);
/// assert_eq!(result.pathname, "/about");
/// assert_eq!(result.detected_locale.as_deref(), Some("en-US"));
/// ```
pub fn normalize_locale_path(pathname: &str, locales: &[String]) -> LocalePath {
    let mut parts: Vec<&str> = pathname.split('/').collect();

    if let Some(first) = parts.get(1).copied().filter(|s| !s.is_empty()) {
        if let Some(locale) = locales.iter().find(|l| l.eq_ignore_ascii_case(first)) {
            parts.remove(1);
            let joined = parts.join("/");
            return LocalePath {
                pathname: if joined.is_empty() {
                    "/".to_string()
                } else {
                    joined
                },
                detected_locale: Some(locale.clone()),
            };
        }
    }

    LocalePath {
        pathname: pathname.to_string(),
        detected_locale: None,
    }
}

/// Find the locale domain serving `hostname` or `detected_locale`.
pub fn detect_domain_locale<'a>(
    domains: &'a [DomainLocale],
    hostname: Option<&str>,
    detected_locale: Option<&str>,
) -> Option<&'a DomainLocale> {
    let detected = detected_locale.map(str::to_lowercase);
    let hostname = hostname.map(str::to_lowercase);

    domains.iter().find(|item| {
        hostname.as_deref() == Some(item.hostname().as_str())
            || detected.as_deref() == Some(item.default_locale.to_lowercase().as_str())
            || item
                .locales
                .iter()
                .any(|l| Some(l.to_lowercase()) == detected)
    })
}

const DATA_PREFIX: &str = "/_next/data/";

/// A pathname decomposed into base path, data-route prefix, and locale.
///
/// Data URLs look like `/<base>/_next/data/<build>/<locale>/<page>.json`;
/// `index.json` stands for `/`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathnameInfo {
    pub pathname: String,
    pub base_path: Option<String>,
    pub build_id: Option<String>,
    pub locale: Option<String>,
    /// Used by [`format`](Self::format) to elide the default locale.
    pub default_locale: Option<String>,
    pub trailing_slash: bool,
}

impl PathnameInfo {
    /// Decompose `pathname`. With `parse_data`, a data-route pathname is
    /// replaced by the page path it stands for.
    ///
    /// ```
    /// use web_navigator::{path::PathnameInfo, I18nConfig, RouterConfig};
    ///
    /// let config = RouterConfig::new().with_i18n(I18nConfig::new(&["en", "fr"], "en"));
    /// let info = PathnameInfo::parse("/_next/data/b1/fr/about.json", &config, true);
    /// assert_eq!(info.pathname, "/about");
    /// assert_eq!(info.build_id.as_deref(), Some("b1"));
    /// assert_eq!(info.locale.as_deref(), Some("fr"));
    /// ```
    pub fn parse(pathname: &str, config: &RouterConfig, parse_data: bool) -> Self {
        let mut info = PathnameInfo {
            pathname: pathname.to_string(),
            trailing_slash: if pathname == "/" {
                config.trailing_slash
            } else {
                pathname.ends_with('/')
            },
            ..Default::default()
        };

        if !config.base_path.is_empty() && path_has_prefix(&info.pathname, &config.base_path) {
            info.pathname = remove_path_prefix(&info.pathname, &config.base_path);
            info.base_path = Some(config.base_path.clone());
        }

        let mut page_pathname = info.pathname.clone();
        if let Some(rest) = info
            .pathname
            .strip_prefix(DATA_PREFIX)
            .and_then(|rest| rest.strip_suffix(".json"))
        {
            let mut segments = rest.split('/');
            let build_id = segments.next().unwrap_or_default().to_string();
            let page: Vec<&str> = segments.collect();
            page_pathname = if page.first() == Some(&"index") && page.len() == 1 {
                "/".to_string()
            } else {
                format!("/{}", page.join("/"))
            };
            info.build_id = Some(build_id);
            if parse_data {
                info.pathname = page_pathname.clone();
            }
        }

        if config.i18n.is_some() {
            let locales = config.locales();
            let result = normalize_locale_path(&info.pathname, locales);
            info.locale = result.detected_locale;
            info.pathname = result.pathname;

            if info.locale.is_none() && info.build_id.is_some() {
                info.locale = normalize_locale_path(&page_pathname, locales).detected_locale;
            }
        }

        info
    }

    /// Reassemble the pathname, re-adding locale, data prefix, and base path.
    pub fn format(&self) -> String {
        let default_locale = if self.build_id.is_some() {
            None
        } else {
            self.default_locale.as_deref()
        };
        let mut pathname = add_locale(&self.pathname, self.locale.as_deref(), default_locale);

        if self.build_id.is_some() || !self.trailing_slash {
            pathname = remove_trailing_slash(&pathname).to_string();
        }

        if let Some(build_id) = &self.build_id {
            let page = if pathname == "/" {
                "/index".to_string()
            } else {
                pathname
            };
            pathname = add_path_suffix(
                &add_path_prefix(&page, &format!("/_next/data/{build_id}")),
                ".json",
            );
        }

        if let Some(base_path) = &self.base_path {
            pathname = add_path_prefix(&pathname, base_path);
        }

        if self.build_id.is_none() && self.trailing_slash {
            if pathname.ends_with('/') {
                pathname
            } else {
                add_path_suffix(&pathname, "/")
            }
        } else {
            remove_trailing_slash(&pathname).to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::I18nConfig;

    #[test]
    fn test_parse_path_variants() {
        let parts = parse_path("/a");
        assert_eq!((parts.pathname, parts.query, parts.hash), ("/a", "", ""));

        let parts = parse_path("/a#h?x");
        assert_eq!((parts.pathname, parts.query, parts.hash), ("/a", "", "#h?x"));

        let parts = parse_path("/a?x=1");
        assert_eq!((parts.pathname, parts.query, parts.hash), ("/a", "?x=1", ""));
    }

    #[test]
    fn test_remove_trailing_slash() {
        assert_eq!(remove_trailing_slash("/"), "/");
        assert_eq!(remove_trailing_slash("/blog/"), "/blog");
        assert_eq!(remove_trailing_slash("/blog"), "/blog");
    }

    #[test]
    fn test_normalize_trailing_slash_off() {
        assert_eq!(normalize_path_trailing_slash("/blog/?a=1", false), "/blog?a=1");
        assert_eq!(normalize_path_trailing_slash("/", false), "/");
        assert_eq!(normalize_path_trailing_slash("blog/", false), "blog/");
    }

    #[test]
    fn test_normalize_trailing_slash_on() {
        assert_eq!(normalize_path_trailing_slash("/blog?a=1", true), "/blog/?a=1");
        assert_eq!(normalize_path_trailing_slash("/blog/", true), "/blog/");
        assert_eq!(normalize_path_trailing_slash("/robots.txt/", true), "/robots.txt");
    }

    #[test]
    fn test_path_prefix() {
        assert!(path_has_prefix("/docs", "/docs"));
        assert!(path_has_prefix("/docs/a?x", "/docs"));
        assert!(!path_has_prefix("/docsx", "/docs"));
        assert_eq!(add_path_prefix("/a?x#y", "/docs"), "/docs/a?x#y");
        assert_eq!(remove_path_prefix("/docs/a", "/docs"), "/a");
        assert_eq!(remove_path_prefix("/docs?x=1", "/docs"), "/?x=1");
        assert_eq!(remove_path_prefix("/other", "/docs"), "/other");
    }

    #[test]
    fn test_add_base_path() {
        let config = RouterConfig::new().with_base_path("/docs");
        assert_eq!(add_base_path("/", &config), "/docs");
        assert_eq!(add_base_path("/intro", &config), "/docs/intro");
    }

    #[test]
    fn test_add_locale() {
        assert_eq!(add_locale("/about", Some("fr"), Some("en")), "/fr/about");
        assert_eq!(add_locale("/about", Some("en"), Some("en")), "/about");
        assert_eq!(add_locale("/api/user", Some("fr"), Some("en")), "/api/user");
        assert_eq!(add_locale("/FR/about", Some("fr"), Some("en")), "/FR/about");
        assert_eq!(add_locale("/about", None, Some("en")), "/about");
    }

    #[test]
    fn test_remove_locale() {
        assert_eq!(remove_locale("/fr/about", Some("fr")), "/about");
        assert_eq!(remove_locale("/fr", Some("fr")), "/");
        assert_eq!(remove_locale("/fr?x=1", Some("fr")), "/?x=1");
        assert_eq!(remove_locale("/french", Some("fr")), "/french");
    }

    #[test]
    fn test_normalize_locale_path() {
        let locales = vec!["en".to_string(), "fr".to_string()];
        let root = normalize_locale_path("/fr", &locales);
        assert_eq!(root.pathname, "/");
        assert_eq!(root.detected_locale.as_deref(), Some("fr"));

        let none = normalize_locale_path("/about", &locales);
        assert_eq!(none.pathname, "/about");
        assert_eq!(none.detected_locale, None);
    }

    #[test]
    fn test_detect_domain_locale() {
        let domains = vec![
            DomainLocale {
                domain: "example.fr:8080".into(),
                default_locale: "fr".into(),
                ..Default::default()
            },
            DomainLocale {
                domain: "example.nl".into(),
                default_locale: "nl".into(),
                locales: vec!["nl-BE".into()],
                http: true,
            },
        ];

        assert_eq!(
            detect_domain_locale(&domains, Some("EXAMPLE.fr"), None).map(|d| d.domain.as_str()),
            Some("example.fr:8080")
        );
        assert_eq!(
            detect_domain_locale(&domains, None, Some("nl-be")).map(|d| d.domain.as_str()),
            Some("example.nl")
        );
        assert!(detect_domain_locale(&domains, None, Some("de")).is_none());
    }

    #[test]
    fn test_pathname_info_data_route() {
        let config = RouterConfig::new().with_base_path("/docs");
        let info = PathnameInfo::parse("/docs/_next/data/abc/index.json", &config, true);
        assert_eq!(info.pathname, "/");
        assert_eq!(info.base_path.as_deref(), Some("/docs"));
        assert_eq!(info.format(), "/docs/_next/data/abc/index.json");
    }

    #[test]
    fn test_pathname_info_redirect_format() {
        let config = RouterConfig::new().with_i18n(I18nConfig::new(&["en", "fr"], "en"));
        let mut info = PathnameInfo::parse("/en/login", &config, true);
        info.default_locale = Some("en".into());
        assert_eq!(info.locale.as_deref(), Some("en"));
        assert_eq!(info.format(), "/login");

        let mut info = PathnameInfo::parse("/fr/login", &config, true);
        info.default_locale = Some("en".into());
        assert_eq!(info.format(), "/fr/login");
    }
}
