//! Dynamic route patterns.
//!
//! Page routes may contain bracketed segments:
//!
//! | Segment        | Matches                        | Query value          |
//! |----------------|--------------------------------|----------------------|
//! | `[id]`         | exactly one segment            | `Single`             |
//! | `[...slug]`    | one or more segments           | `Multi`              |
//! | `[[...slug]]`  | zero or more segments          | `Multi` when present |
//!
//! [`RouteRegex::compile`] turns such a route into an anchored regex plus a
//! group table. [`RouteRegex::match_path`] extracts percent-decoded values,
//! and [`interpolate_as`] goes the other way, filling a route's placeholders
//! from a query.
//!
//! # Example
//!
//! ```
//! use web_navigator::matching::RouteRegex;
//!
//! let regex = RouteRegex::compile("/docs/[...slug]").unwrap();
//! let params = regex.match_path("/docs/guide/intro").unwrap();
//! assert_eq!(
//!     params.get("slug").unwrap().to_vec(),
//!     vec!["guide".to_string(), "intro".to_string()]
//! );
//! assert!(regex.match_path("/docs").is_none());
//! ```

use crate::error::{Result, RouterError};
use crate::params::{decode_uri_component, encode_uri_component, Query, QueryValue};
use crate::path::remove_trailing_slash;
use crate::trace_log;
use regex::Regex;

/// Check whether a route contains at least one dynamic segment.
pub fn is_dynamic_route(route: &str) -> bool {
    route.split('/').any(|segment| parse_segment(segment).is_some())
}

/// Placeholder metadata for one dynamic segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteGroup {
    /// Capture group index in the compiled regex.
    pub pos: usize,
    /// Catch-all (`[...x]`).
    pub repeat: bool,
    /// Optional catch-all (`[[...x]]`).
    pub optional: bool,
}

/// A compiled dynamic route.
#[derive(Debug, Clone)]
pub struct RouteRegex {
    route: String,
    re: Regex,
    groups: Vec<(String, RouteGroup)>,
}

impl RouteRegex {
    /// Compile a route such as `/blog/[slug]`.
    ///
    /// The resulting regex is `^…(?:/)?$`: one optional trailing slash is
    /// accepted.
    pub fn compile(route: &str) -> Result<Self> {
        let normalized = remove_trailing_slash(route);
        let mut groups = Vec::new();
        let mut source = String::from("^");

        for segment in normalized.split('/').skip(1) {
            match parse_segment(segment) {
                Some((key, repeat, optional)) => {
                    groups.push((
                        key.to_string(),
                        RouteGroup {
                            pos: groups.len() + 1,
                            repeat,
                            optional,
                        },
                    ));
                    source.push_str(match (repeat, optional) {
                        (true, true) => "(?:/(.+?))?",
                        (true, false) => "/(.+?)",
                        _ => "/([^/]+?)",
                    });
                }
                None => {
                    source.push('/');
                    source.push_str(&regex::escape(segment));
                }
            }
        }
        source.push_str("(?:/)?$");

        let re = Regex::new(&source).map_err(|err| RouterError::InvalidPattern {
            pattern: route.to_string(),
            message: err.to_string(),
        })?;
        trace_log!("Compiled route '{}' to /{}/", route, source);

        Ok(Self {
            route: normalized.to_string(),
            re,
            groups,
        })
    }

    /// The route this regex was compiled from, without trailing slash.
    pub fn route(&self) -> &str {
        &self.route
    }

    /// Placeholders in position order.
    pub fn groups(&self) -> &[(String, RouteGroup)] {
        &self.groups
    }

    pub fn group(&self, name: &str) -> Option<&RouteGroup> {
        self.groups
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, group)| group)
    }

    /// Names of the placeholders in position order.
    pub fn param_names(&self) -> Vec<String> {
        self.groups.iter().map(|(key, _)| key.clone()).collect()
    }

    pub fn is_match(&self, pathname: &str) -> bool {
        self.re.is_match(pathname)
    }

    /// Match `pathname`, returning the decoded placeholder values.
    ///
    /// Optional catch-alls that matched nothing are absent from the result.
    pub fn match_path(&self, pathname: &str) -> Option<Query> {
        let captures = self.re.captures(pathname)?;
        let mut params = Query::new();

        for (key, group) in &self.groups {
            let Some(value) = captures.get(group.pos) else {
                continue;
            };
            let value = value.as_str();
            let decoded = if value.contains('/') || group.repeat {
                QueryValue::Multi(value.split('/').map(decode_uri_component).collect())
            } else {
                QueryValue::Single(decode_uri_component(value))
            };
            params.insert(key.clone(), decoded);
        }

        Some(params)
    }
}

/// Parse `[x]`, `[...x]`, or `[[...x]]` into `(key, repeat, optional)`.
fn parse_segment(segment: &str) -> Option<(&str, bool, bool)> {
    let inner = segment.strip_prefix('[')?.strip_suffix(']')?;
    if inner.is_empty() {
        return None;
    }
    let (inner, optional) = match inner.strip_prefix('[').and_then(|i| i.strip_suffix(']')) {
        Some(stripped) => (stripped, true),
        None => (inner, false),
    };
    let (key, repeat) = match inner.strip_prefix("...") {
        Some(key) => (key, true),
        None => (inner, false),
    };
    if key.is_empty() || key.contains('/') {
        return None;
    }
    Some((key, repeat, optional))
}

/// Result of [`interpolate_as`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpolation {
    /// Every placeholder name of the route.
    pub params: Vec<String>,
    /// The filled-in path, or `None` if a required value was missing.
    pub result: Option<String>,
}

/// Fill the placeholders of `route`.
///
/// Values come from matching `as_pathname` against the route when the two
/// differ, otherwise (or when that match fails) from `query`. Catch-all
/// values are percent-encoded per segment and joined with `/`; an empty
/// optional catch-all collapses together with its leading slash.
///
/// ```
/// use web_navigator::{matching::interpolate_as, Query};
///
/// let query = Query::parse("slug=hello&ref=home");
/// let out = interpolate_as("/blog/[slug]", "/blog/[slug]", &query).unwrap();
/// assert_eq!(out.result.as_deref(), Some("/blog/hello"));
/// assert_eq!(out.params, vec!["slug".to_string()]);
/// ```
pub fn interpolate_as(route: &str, as_pathname: &str, query: &Query) -> Result<Interpolation> {
    let regex = RouteRegex::compile(route)?;
    Ok(interpolate_with(&regex, as_pathname, query))
}

/// [`interpolate_as`] with an already compiled route.
pub fn interpolate_with(regex: &RouteRegex, as_pathname: &str, query: &Query) -> Interpolation {
    let matched = if as_pathname == regex.route() {
        None
    } else {
        regex.match_path(as_pathname)
    };
    let values = matched.as_ref().unwrap_or(query);

    let mut interpolated = regex.route().to_string();
    let mut complete = true;

    for (key, group) in regex.groups() {
        let value = values.get(key);
        let is_empty = value.map_or(true, QueryValue::is_empty);

        let mut placeholder = format!("[{}{key}]", if group.repeat { "..." } else { "" });
        if group.optional {
            placeholder = format!("{}[{placeholder}]", if is_empty { "/" } else { "" });
        }

        if !group.optional && value.is_none() {
            complete = false;
            break;
        }

        let replacement = match value {
            Some(value) if group.repeat => value
                .to_vec()
                .iter()
                .map(|segment| encode_uri_component(segment))
                .collect::<Vec<_>>()
                .join("/"),
            Some(value) => encode_uri_component(value.first().unwrap_or_default()),
            None => String::new(),
        };

        interpolated = interpolated.replacen(&placeholder, &replacement, 1);
        if interpolated.is_empty() {
            interpolated = "/".to_string();
        }
    }

    Interpolation {
        params: regex.param_names(),
        result: complete.then_some(interpolated),
    }
}
