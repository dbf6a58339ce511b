//! URL parsing, relative resolution, and formatting.
//!
//! [`Url`] wraps [`url::Url`] and exposes the browser `location` view of it
//! (`protocol`, `hostname`, `pathname`, `search`, `hash`). [`ParsedUrl`] is
//! the router-facing view of a possibly relative URL: pathname plus a decoded
//! [`Query`] and the raw search and fragment strings.

use crate::error::{Result, RouterError};
use crate::params::Query;
use crate::path::has_base_path;
use std::fmt;

const SPECIAL_SCHEMES: &[&str] = &["http:", "https:", "ws:", "wss:", "ftp:", "file:"];

/// An absolute URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Url(url::Url);

impl Url {
    /// Parse an absolute URL. Returns `None` for relative references.
    ///
    /// ```
    /// use web_navigator::url::Url;
    ///
    /// let url = Url::parse("HTTPS://Example.com:443/a/../b?x=1#top").unwrap();
    /// assert_eq!(url.origin(), "https://example.com");
    /// assert_eq!(url.pathname(), "/b");
    /// assert_eq!(url.href(), "https://example.com/b?x=1#top");
    /// ```
    pub fn parse(input: &str) -> Option<Url> {
        url::Url::parse(input.trim()).ok().map(Url)
    }

    /// Resolve `reference` against this URL.
    ///
    /// ```
    /// use web_navigator::url::Url;
    ///
    /// let base = Url::parse("https://example.com/blog/post?x=1").unwrap();
    /// assert_eq!(base.join("other").unwrap().pathname(), "/blog/other");
    /// assert_eq!(base.join("../about").unwrap().pathname(), "/about");
    /// assert_eq!(base.join("#top").unwrap().href(), "https://example.com/blog/post?x=1#top");
    /// ```
    pub fn join(&self, reference: &str) -> Option<Url> {
        self.0.join(reference.trim()).ok().map(Url)
    }

    /// Scheme including the trailing `:` (`https:`).
    pub fn protocol(&self) -> String {
        format!("{}:", self.0.scheme())
    }

    /// Host name, empty for opaque URLs.
    pub fn hostname(&self) -> &str {
        self.0.host_str().unwrap_or_default()
    }

    /// Port, `None` when it is the scheme default.
    pub fn port(&self) -> Option<u16> {
        self.0.port()
    }

    pub fn pathname(&self) -> &str {
        self.0.path()
    }

    pub fn set_pathname(&mut self, pathname: &str) {
        self.0.set_path(pathname);
    }

    /// `?…` or empty.
    pub fn search(&self) -> String {
        prefixed('?', self.0.query())
    }

    /// `#…` or empty.
    pub fn hash(&self) -> String {
        prefixed('#', self.0.fragment())
    }

    /// `host[:port]`.
    pub fn host(&self) -> String {
        match self.port() {
            Some(port) => format!("{}:{port}", self.hostname()),
            None => self.hostname().to_string(),
        }
    }

    /// `protocol//host` for hierarchical URLs, `"null"` otherwise.
    pub fn origin(&self) -> String {
        self.0.origin().ascii_serialization()
    }

    /// Path, search, and fragment.
    pub fn path_and_rest(&self) -> String {
        format!("{}{}{}", self.pathname(), self.search(), self.hash())
    }

    pub fn href(&self) -> String {
        self.0.as_str().to_string()
    }

    pub fn as_url(&self) -> &url::Url {
        &self.0
    }
}

impl From<url::Url> for Url {
    fn from(url: url::Url) -> Self {
        Url(url)
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

fn prefixed(prefix: char, part: Option<&str>) -> String {
    match part {
        Some(part) if !part.is_empty() => format!("{prefix}{part}"),
        _ => String::new(),
    }
}

fn is_scheme(scheme: &str) -> bool {
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn is_special(protocol: &str) -> bool {
    SPECIAL_SCHEMES.contains(&protocol)
}

/// Check for a scheme prefix (`https:`, `mailto:`).
pub fn is_absolute_url(url: &str) -> bool {
    url.find(':')
        .is_some_and(|colon| colon > 0 && is_scheme(&url[..colon]))
}

/// Check whether `url` can be handled without leaving the application:
/// relative URLs always can; absolute ones must share the origin of
/// `location` and live under `base_path`.
pub fn is_local_url(url: &str, location: &Url, base_path: &str) -> bool {
    if !is_absolute_url(url) {
        return true;
    }
    match location.join(url) {
        Some(resolved) => {
            resolved.origin() == location.origin() && has_base_path(resolved.pathname(), base_path)
        }
        None => false,
    }
}

/// Convert `\` to `/` and collapse runs of `/` before the query.
///
/// ```
/// use web_navigator::url::normalize_repeated_slashes;
///
/// assert_eq!(normalize_repeated_slashes("//a\\\\b?c=//d"), "/a/b?c=//d");
/// ```
pub fn normalize_repeated_slashes(url: &str) -> String {
    let (path, query) = match url.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (url, None),
    };

    let mut normalized = String::with_capacity(url.len());
    for ch in path.chars() {
        let ch = if ch == '\\' { '/' } else { ch };
        if ch == '/' && normalized.ends_with('/') {
            continue;
        }
        normalized.push(ch);
    }

    match query {
        Some(query) if !query.is_empty() => format!("{normalized}?{query}"),
        _ => normalized,
    }
}

/// Drop the origin of `location` from the start of `url`.
pub fn strip_origin(url: &str, location: &Url) -> String {
    let origin = location.origin();
    url.strip_prefix(origin.as_str()).unwrap_or(url).to_string()
}

/// A URL as the router sees it.
///
/// `search` takes precedence over `query` when formatting; use
/// [`set_query`](Self::set_query) after changing the query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedUrl {
    /// Present for URLs parsed from an absolute string.
    pub protocol: Option<String>,
    pub hostname: Option<String>,
    pub port: Option<String>,
    pub pathname: String,
    pub query: Query,
    pub search: String,
    pub hash: String,
}

impl ParsedUrl {
    pub fn from_url(url: &Url) -> Self {
        ParsedUrl {
            protocol: Some(url.protocol()),
            hostname: Some(url.hostname().to_string()),
            port: url.port().map(|port| port.to_string()),
            pathname: url.pathname().to_string(),
            query: Query::parse(&url.search()),
            search: url.search(),
            hash: url.hash(),
        }
    }

    /// Replace the query and drop the raw search string.
    pub fn set_query(&mut self, query: Query) {
        self.query = query;
        self.search = String::new();
    }

    /// Path, search, and fragment without any origin.
    pub fn href(&self) -> String {
        let mut relative = self.clone();
        relative.protocol = None;
        relative.hostname = None;
        relative.port = None;
        format_url(&relative)
    }
}

/// Parse `url` relative to `base` (or the current location).
///
/// Fails with [`RouterError::InvalidRelativeUrl`] when the result leaves the
/// origin of `location`.
///
/// ```
/// use web_navigator::url::{parse_relative_url, Url};
///
/// let location = Url::parse("https://example.com/blog/post").unwrap();
/// let parsed = parse_relative_url("/about?team=core#people", None, &location).unwrap();
/// assert_eq!(parsed.pathname, "/about");
/// assert_eq!(parsed.query.get_str("team"), Some("core"));
/// assert_eq!(parsed.href(), "/about?team=core#people");
/// ```
pub fn parse_relative_url(url: &str, base: Option<&str>, location: &Url) -> Result<ParsedUrl> {
    let invalid = || RouterError::InvalidRelativeUrl {
        url: url.to_string(),
    };
    let origin = Url::parse(&location.origin()).ok_or_else(invalid)?;

    let resolved_base = match base {
        Some(base) => origin.join(base).ok_or_else(invalid)?,
        None if url.starts_with('.') => location.clone(),
        None => origin.clone(),
    };
    let resolved = resolved_base.join(url).ok_or_else(invalid)?;
    if resolved.origin() != origin.origin() {
        return Err(invalid());
    }

    Ok(ParsedUrl {
        protocol: None,
        hostname: None,
        port: None,
        query: Query::parse(&resolved.search()),
        pathname: resolved.pathname().to_string(),
        search: resolved.search(),
        hash: resolved.hash(),
    })
}

/// Parse a root-relative or absolute URL.
pub fn parse_url(url: &str, location: &Url) -> Result<ParsedUrl> {
    if url.starts_with('/') {
        return parse_relative_url(url, None, location);
    }
    Url::parse(url)
        .map(|parsed| ParsedUrl::from_url(&parsed))
        .ok_or_else(|| RouterError::InvalidHref {
            href: url.to_string(),
        })
}

/// Format a [`ParsedUrl`] back into a string.
pub fn format_url(url: &ParsedUrl) -> String {
    let mut protocol = url.protocol.clone().unwrap_or_default();
    if !protocol.is_empty() && !protocol.ends_with(':') {
        protocol.push(':');
    }

    let host = url.hostname.as_ref().map(|hostname| {
        let hostname = if hostname.contains(':') && !hostname.starts_with('[') {
            format!("[{hostname}]")
        } else {
            hostname.clone()
        };
        match &url.port {
            Some(port) if !port.is_empty() => format!("{hostname}:{port}"),
            _ => hostname,
        }
    });

    let search = if url.search.is_empty() {
        let query = url.query.to_query_string();
        if query.is_empty() {
            String::new()
        } else {
            format!("?{query}")
        }
    } else if url.search.starts_with('?') {
        url.search.clone()
    } else {
        format!("?{}", url.search)
    };

    let mut pathname = url.pathname.clone();
    let host = match host {
        Some(host) if protocol.is_empty() || is_special(&protocol) => {
            if !pathname.is_empty() && !pathname.starts_with('/') {
                pathname.insert(0, '/');
            }
            format!("//{host}")
        }
        Some(host) => host,
        None => String::new(),
    };

    let hash = if url.hash.is_empty() || url.hash.starts_with('#') {
        url.hash.clone()
    } else {
        format!("#{}", url.hash)
    };

    let pathname = pathname.replace('?', "%3F").replace('#', "%23");
    let search = search.replacen('#', "%23", 1);
    format!("{protocol}{host}{pathname}{search}{hash}")
}
