//! Rewrite rules.
//!
//! A rewrite maps a requested path onto a different page without changing
//! the address bar. Rules come from the build manifest in three ordered
//! phases:
//!
//! 1. `beforeFiles`: checked before the file system; every rule runs.
//! 2. `afterFiles`: checked when the path is not a page; first match wins.
//! 3. `fallback`: checked after dynamic routes failed; first match wins.
//!
//! Rule sources are path patterns:
//!
//! | Token         | Meaning                                  |
//! |---------------|------------------------------------------|
//! | `:name`       | one segment                              |
//! | `:name?`      | zero or one segment                      |
//! | `:name*`      | zero or more segments (list value)       |
//! | `:name+`      | one or more segments (list value)        |
//! | `:name(re)`   | one segment matching `re`                |
//! | `(re)`        | unnamed group, not reported as a param   |
//!
//! A rule may also carry `has`/`missing` conditions on headers, cookies,
//! query values, and the host. Named regex groups in a condition's value
//! become extra params.
//!
//! Rules whose destination is missing pointed outside the site at build
//! time; matching one means the navigation has to leave the application.

use crate::config::RequestContext;
use crate::error::{Result, RouterError};
use crate::params::{Query, QueryValue};
use crate::path::{normalize_locale_path, remove_base_path, remove_trailing_slash};
use crate::url::{is_absolute_url, parse_relative_url, ParsedUrl, Url};
use crate::{debug_log, trace_log, warn_log};
use regex::Regex;
use serde::{Deserialize, Serialize};

// ============================================================================
// Path patterns
// ============================================================================

const DEFAULT_SEGMENT: &str = r"[^/#\?]+?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Modifier {
    One,
    Optional,
    ZeroOrMore,
    OneOrMore,
}

impl Modifier {
    fn from_char(c: char) -> Option<Self> {
        match c {
            '?' => Some(Self::Optional),
            '*' => Some(Self::ZeroOrMore),
            '+' => Some(Self::OneOrMore),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::One => "",
            Self::Optional => "?",
            Self::ZeroOrMore => "*",
            Self::OneOrMore => "+",
        }
    }

    fn is_optional(self) -> bool {
        matches!(self, Self::Optional | Self::ZeroOrMore)
    }

    fn is_repeat(self) -> bool {
        matches!(self, Self::ZeroOrMore | Self::OneOrMore)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Text(String),
    Param {
        name: String,
        /// Unnamed `(re)` groups get numeric names and are dropped from
        /// match results.
        unnamed: bool,
        prefix: String,
        pattern: String,
        modifier: Modifier,
    },
}

/// A compiled path pattern such as `/blog/:slug*`.
#[derive(Debug, Clone)]
pub struct PathPattern {
    source: String,
    tokens: Vec<Token>,
    re: Regex,
}

impl PathPattern {
    /// Compile `source`. Matching is case-insensitive and anchored at both
    /// ends; no implicit trailing slash is accepted.
    pub fn compile(source: &str) -> Result<Self> {
        let tokens = tokenize(source)?;
        let mut route = String::from("(?i)^");

        for token in &tokens {
            match token {
                Token::Text(text) => route.push_str(&regex::escape(text)),
                Token::Param {
                    prefix,
                    pattern,
                    modifier,
                    ..
                } => {
                    let prefix = regex::escape(prefix);
                    if prefix.is_empty() {
                        if modifier.is_repeat() {
                            route.push_str(&format!("((?:{pattern}){})", modifier.as_str()));
                        } else {
                            route.push_str(&format!("({pattern}){}", modifier.as_str()));
                        }
                    } else if modifier.is_repeat() {
                        let optional = if *modifier == Modifier::ZeroOrMore { "?" } else { "" };
                        route.push_str(&format!(
                            "(?:{prefix}((?:{pattern})(?:{prefix}(?:{pattern}))*)){optional}"
                        ));
                    } else {
                        route.push_str(&format!("(?:{prefix}({pattern})){}", modifier.as_str()));
                    }
                }
            }
        }
        route.push('$');

        let re = Regex::new(&route).map_err(|err| RouterError::InvalidPattern {
            pattern: source.to_string(),
            message: err.to_string(),
        })?;
        trace_log!("Compiled path pattern '{}' to /{}/", source, route);

        Ok(Self {
            source: source.to_string(),
            tokens,
            re,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Names of the named params, in order.
    pub fn param_names(&self) -> Vec<String> {
        self.tokens
            .iter()
            .filter_map(|token| match token {
                Token::Param {
                    name,
                    unnamed: false,
                    ..
                } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Match `pathname`, returning the named params.
    pub fn match_path(&self, pathname: &str) -> Option<Query> {
        let captures = self.re.captures(pathname)?;
        let mut params = Query::new();
        let mut group = 0;

        for token in &self.tokens {
            let Token::Param {
                name,
                unnamed,
                prefix,
                modifier,
                ..
            } = token
            else {
                continue;
            };
            group += 1;
            let Some(value) = captures.get(group) else {
                continue;
            };
            if *unnamed {
                continue;
            }
            let value = value.as_str();
            if modifier.is_repeat() {
                let separator = if prefix.is_empty() { "/" } else { prefix };
                params.insert(
                    name.clone(),
                    QueryValue::Multi(value.split(separator).map(str::to_string).collect()),
                );
            } else {
                params.insert(name.clone(), value);
            }
        }

        Some(params)
    }

    /// Substitute `params` into the pattern.
    ///
    /// List values are only accepted by repeating params; missing values
    /// only by optional ones.
    pub fn compile_with(&self, params: &Query) -> Result<String> {
        let mut path = String::new();

        for token in &self.tokens {
            match token {
                Token::Text(text) => path.push_str(text),
                Token::Param {
                    name,
                    prefix,
                    modifier,
                    ..
                } => match params.get(name) {
                    Some(QueryValue::Multi(values)) => {
                        if !modifier.is_repeat() {
                            return Err(RouterError::InvalidPattern {
                                pattern: self.source.clone(),
                                message: format!(
                                    "To use a multi-match in the destination you must add `*` at the end of the param name ({name}) to signify it should repeat."
                                ),
                            });
                        }
                        if values.is_empty() && !modifier.is_optional() {
                            return Err(missing_param(&self.source, name));
                        }
                        for value in values {
                            path.push_str(prefix);
                            path.push_str(value);
                        }
                    }
                    Some(QueryValue::Single(value)) => {
                        path.push_str(prefix);
                        path.push_str(value);
                    }
                    None if modifier.is_optional() => {}
                    None => return Err(missing_param(&self.source, name)),
                },
            }
        }

        Ok(path)
    }
}

fn missing_param(source: &str, name: &str) -> RouterError {
    RouterError::InvalidPattern {
        pattern: source.to_string(),
        message: format!("Expected \"{name}\" to be provided"),
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>> {
    let invalid = |message: String| RouterError::InvalidPattern {
        pattern: source.to_string(),
        message,
    };
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut text = String::new();
    let mut unnamed = 0usize;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '\\' {
            if let Some(next) = chars.get(i + 1) {
                text.push(*next);
            }
            i += 2;
            continue;
        }

        let starts_name = c == ':'
            && chars
                .get(i + 1)
                .is_some_and(|n| n.is_ascii_alphanumeric() || *n == '_');
        if !starts_name && c != '(' {
            text.push(c);
            i += 1;
            continue;
        }

        let mut name = String::new();
        if starts_name {
            i += 1;
            while let Some(n) = chars.get(i).filter(|n| n.is_ascii_alphanumeric() || **n == '_') {
                name.push(*n);
                i += 1;
            }
        }

        let mut pattern = String::new();
        if chars.get(i) == Some(&'(') {
            let mut depth = 1;
            let mut j = i + 1;
            if chars.get(j) == Some(&'?') {
                return Err(invalid(format!("Pattern cannot start with \"?\" at {j}")));
            }
            while j < chars.len() {
                match chars[j] {
                    '\\' => {
                        pattern.push('\\');
                        if let Some(next) = chars.get(j + 1) {
                            pattern.push(*next);
                        }
                        j += 2;
                        continue;
                    }
                    ')' => {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    '(' => {
                        depth += 1;
                        if chars.get(j + 1) != Some(&'?') {
                            return Err(invalid(format!("Capturing groups are not allowed at {j}")));
                        }
                    }
                    _ => {}
                }
                pattern.push(chars[j]);
                j += 1;
            }
            if depth != 0 {
                return Err(invalid(format!("Unbalanced pattern at {i}")));
            }
            if pattern.is_empty() {
                return Err(invalid(format!("Missing pattern at {i}")));
            }
            i = j + 1;
        }

        // A directly preceding `/` or `.` becomes the param's prefix.
        let prefix = match text.chars().last() {
            Some(last @ ('/' | '.')) => {
                text.pop();
                last.to_string()
            }
            _ => String::new(),
        };
        if !text.is_empty() {
            tokens.push(Token::Text(std::mem::take(&mut text)));
        }

        let modifier = match chars.get(i).and_then(|m| Modifier::from_char(*m)) {
            Some(modifier) => {
                i += 1;
                modifier
            }
            None => Modifier::One,
        };

        let is_unnamed = name.is_empty();
        if is_unnamed {
            name = unnamed.to_string();
            unnamed += 1;
        }

        tokens.push(Token::Param {
            name,
            unnamed: is_unnamed,
            prefix,
            pattern: if pattern.is_empty() {
                DEFAULT_SEGMENT.to_string()
            } else {
                pattern
            },
            modifier,
        });
    }

    if !text.is_empty() {
        tokens.push(Token::Text(text));
    }
    Ok(tokens)
}

// ============================================================================
// Conditions
// ============================================================================

/// What a `has`/`missing` condition inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HasKind {
    Header,
    Cookie,
    Query,
    Host,
}

/// A `has` or `missing` condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteHas {
    #[serde(rename = "type")]
    pub kind: HasKind,
    /// Header, cookie, or query key. Unused for `host`.
    #[serde(default)]
    pub key: String,
    /// Regex the value must fully match; any value matches when absent.
    #[serde(default)]
    pub value: Option<String>,
}

/// Evaluate `has` and `missing` conditions.
///
/// Returns the params captured by the conditions, or `None` when a `has`
/// condition fails or a `missing` condition matches.
pub fn match_has(
    request: &RequestContext,
    query: &Query,
    has: &[RouteHas],
    missing: &[RouteHas],
) -> Option<Query> {
    let mut params = Query::new();

    for item in has {
        if !has_match(request, query, item, &mut params) {
            return None;
        }
    }
    let mut ignored = Query::new();
    for item in missing {
        if has_match(request, query, item, &mut ignored) {
            return None;
        }
    }
    Some(params)
}

fn has_match(request: &RequestContext, query: &Query, item: &RouteHas, params: &mut Query) -> bool {
    let value: Option<String> = match item.kind {
        HasKind::Header => request.header(&item.key).map(str::to_string),
        HasKind::Cookie => request.cookie(&item.key).map(str::to_string),
        HasKind::Query => query.get(&item.key).and_then(|v| v.last()).map(str::to_string),
        HasKind::Host => request
            .header("host")
            .and_then(|host| host.split(':').next())
            .map(str::to_ascii_lowercase),
    };
    let Some(value) = value.filter(|v| !v.is_empty()) else {
        return false;
    };

    let Some(expected) = &item.value else {
        let key = if item.kind == HasKind::Header {
            item.key.to_ascii_lowercase()
        } else {
            item.key.clone()
        };
        params.insert(safe_param_name(&key), value);
        return true;
    };

    let matcher = match Regex::new(&format!("^(?:{expected})$")) {
        Ok(matcher) => matcher,
        Err(err) => {
            warn_log!("Ignoring invalid condition value '{}': {}", expected, err);
            return false;
        }
    };
    let Some(captures) = matcher.captures(&value) else {
        return false;
    };

    let mut named = false;
    for name in matcher.capture_names().flatten() {
        named = true;
        if let Some(group) = captures.name(name) {
            params.insert(name, group.as_str());
        }
    }
    if !named && item.kind == HasKind::Host {
        params.insert("host", &captures[0]);
    }
    true
}

fn safe_param_name(name: &str) -> String {
    name.chars().filter(|c| c.is_ascii_alphabetic()).collect()
}

// ============================================================================
// Rules and destinations
// ============================================================================

/// One rewrite as shipped in the build manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteRule {
    pub source: String,
    /// `None` when the build pointed the rule outside the site.
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub has: Vec<RouteHas>,
    #[serde(default)]
    pub missing: Vec<RouteHas>,
}

impl RewriteRule {
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: Some(destination.into()),
            has: Vec::new(),
            missing: Vec::new(),
        }
    }

    /// A rule whose destination lives on another site.
    pub fn external(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: None,
            has: Vec::new(),
            missing: Vec::new(),
        }
    }

    pub fn with_has(mut self, has: RouteHas) -> Self {
        self.has.push(has);
        self
    }

    pub fn with_missing(mut self, missing: RouteHas) -> Self {
        self.missing.push(missing);
        self
    }

    fn local_destination(&self) -> Option<&str> {
        self.destination
            .as_deref()
            .filter(|dest| dest.starts_with('/') && !is_absolute_url(dest))
    }
}

/// The three rewrite phases.
///
/// Deserializes from either the phased object or a plain list (treated as
/// `afterFiles`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RewriteTableRepr")]
pub struct RewriteTable {
    #[serde(rename = "beforeFiles")]
    pub before_files: Vec<RewriteRule>,
    #[serde(rename = "afterFiles")]
    pub after_files: Vec<RewriteRule>,
    pub fallback: Vec<RewriteRule>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RewriteTableRepr {
    Phased {
        #[serde(default, rename = "beforeFiles")]
        before_files: Vec<RewriteRule>,
        #[serde(default, rename = "afterFiles")]
        after_files: Vec<RewriteRule>,
        #[serde(default)]
        fallback: Vec<RewriteRule>,
    },
    Flat(Vec<RewriteRule>),
}

impl From<RewriteTableRepr> for RewriteTable {
    fn from(repr: RewriteTableRepr) -> Self {
        match repr {
            RewriteTableRepr::Phased {
                before_files,
                after_files,
                fallback,
            } => Self {
                before_files,
                after_files,
                fallback,
            },
            RewriteTableRepr::Flat(after_files) => Self {
                after_files,
                ..Default::default()
            },
        }
    }
}

impl RewriteTable {
    pub fn is_empty(&self) -> bool {
        self.before_files.is_empty() && self.after_files.is_empty() && self.fallback.is_empty()
    }

    /// Compile every rule source. Rules that fail to compile are dropped
    /// with a warning.
    pub fn compile(&self, trailing_slash: bool) -> CompiledRewrites {
        let compile_phase = |rules: &[RewriteRule]| -> Vec<CompiledRule> {
            rules
                .iter()
                .filter_map(|rule| {
                    let source = if trailing_slash {
                        format!("{}(/)?", rule.source)
                    } else {
                        rule.source.clone()
                    };
                    match PathPattern::compile(&source) {
                        Ok(matcher) => Some(CompiledRule {
                            rule: rule.clone(),
                            matcher,
                        }),
                        Err(err) => {
                            warn_log!("Skipping rewrite '{}': {}", rule.source, err);
                            None
                        }
                    }
                })
                .collect()
        };

        CompiledRewrites {
            table: self.clone(),
            trailing_slash,
            before_files: compile_phase(&self.before_files),
            after_files: compile_phase(&self.after_files),
            fallback: compile_phase(&self.fallback),
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    rule: RewriteRule,
    matcher: PathPattern,
}

/// A [`RewriteTable`] with every source compiled.
#[derive(Debug, Clone)]
pub struct CompiledRewrites {
    table: RewriteTable,
    trailing_slash: bool,
    before_files: Vec<CompiledRule>,
    after_files: Vec<CompiledRule>,
    fallback: Vec<CompiledRule>,
}

impl CompiledRewrites {
    /// Check whether this was compiled from `table` with the same policy.
    pub fn is_compiled_from(&self, table: &RewriteTable, trailing_slash: bool) -> bool {
        self.trailing_slash == trailing_slash && self.table == *table
    }

    pub fn table(&self) -> &RewriteTable {
        &self.table
    }
}

impl Default for CompiledRewrites {
    fn default() -> Self {
        RewriteTable::default().compile(false)
    }
}

/// Output of [`prepare_destination`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedDestination {
    /// Destination path and fragment with params substituted.
    pub new_url: String,
    /// Destination query values, with unused params appended.
    pub dest_query: Query,
    /// Full destination: path, merged query, and host when absolute.
    pub parsed: ParsedUrl,
}

/// Substitute `params` into a rewrite destination.
///
/// `:name` placeholders are replaced in the path, the host, and query
/// values. With `append_params_to_query`, params the destination does not
/// reference are added to its query. The request `query` is merged under the
/// destination query.
pub fn prepare_destination(
    destination: &str,
    params: &Query,
    query: &Query,
    append_params_to_query: bool,
) -> Result<PreparedDestination> {
    let (origin, rest) = split_destination_origin(destination);
    let (path, search, hash) = split_destination(rest);

    let path_pattern = PathPattern::compile(&format!("{path}{hash}"))?;
    let host_pattern = match &origin {
        Some((_, hostname, _)) => Some(PathPattern::compile(hostname)?),
        None => None,
    };

    let mut dest_params = path_pattern.param_names();
    if let Some(host) = &host_pattern {
        dest_params.extend(host.param_names());
    }

    let mut dest_query = Query::new();
    for (key, value) in Query::parse(search).iter() {
        let compiled = match value {
            QueryValue::Single(v) => QueryValue::Single(compile_non_path(v, params)?),
            QueryValue::Multi(vs) => QueryValue::Multi(
                vs.iter()
                    .map(|v| compile_non_path(v, params))
                    .collect::<Result<Vec<_>>>()?,
            ),
        };
        dest_query.insert(key.clone(), compiled);
    }

    if append_params_to_query && !params.keys().any(|key| dest_params.contains(key)) {
        for (key, value) in params.iter() {
            if !dest_query.contains(key) {
                dest_query.insert(key.clone(), value.clone());
            }
        }
    }

    let new_url = path_pattern.compile_with(params)?;
    let (pathname, fragment) = match new_url.split_once('#') {
        Some((pathname, fragment)) => (pathname.to_string(), format!("#{fragment}")),
        None => (new_url.clone(), String::new()),
    };

    let mut merged = query.clone();
    merged.extend(&dest_query);

    let mut parsed = ParsedUrl {
        pathname,
        hash: fragment,
        ..Default::default()
    };
    parsed.set_query(merged);
    if let (Some((protocol, _, port)), Some(host)) = (origin, host_pattern) {
        parsed.protocol = Some(protocol);
        parsed.hostname = Some(host.compile_with(params)?);
        parsed.port = port;
    }

    Ok(PreparedDestination {
        new_url,
        dest_query,
        parsed,
    })
}

/// Split `scheme://host[:port]` off an absolute destination.
fn split_destination_origin(destination: &str) -> (Option<(String, String, Option<String>)>, &str) {
    if !is_absolute_url(destination) {
        return (None, destination);
    }
    let Some((scheme, rest)) = destination.split_once("://") else {
        return (None, destination);
    };
    let host_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let host = &rest[..host_end];
    // A `:param` in the host is not a port.
    let (hostname, port) = match host.rsplit_once(':') {
        Some((hostname, port)) if !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()) => {
            (hostname.to_string(), Some(port.to_string()))
        }
        _ => (host.to_string(), None),
    };
    (
        Some((format!("{}:", scheme.to_ascii_lowercase()), hostname, port)),
        &rest[host_end..],
    )
}

fn split_destination(rest: &str) -> (&str, &str, &str) {
    let hash_start = rest.find('#').unwrap_or(rest.len());
    let before_hash = &rest[..hash_start];
    let search_start = before_hash.find('?').unwrap_or(before_hash.len());
    let path = &before_hash[..search_start];
    (
        if path.is_empty() { "/" } else { path },
        &before_hash[search_start..],
        &rest[hash_start..],
    )
}

/// Replace `:name` references inside a query value.
fn compile_non_path(value: &str, params: &Query) -> Result<String> {
    if !value.contains(':') {
        return Ok(value.to_string());
    }
    let mut out = value.to_string();
    // Longest names first so `:id` does not clobber `:idx`.
    let mut keys: Vec<&String> = params.keys().collect();
    keys.sort_by_key(|key| std::cmp::Reverse(key.len()));

    for key in keys {
        let Some(param) = params.get(key) else {
            continue;
        };
        let replacement = param.to_vec().join("/");
        for modifier in ["*", "+", "?", ""] {
            out = out.replace(&format!(":{key}{modifier}"), &replacement);
        }
    }
    Ok(out)
}

// ============================================================================
// Resolution
// ============================================================================

/// Inputs that stay fixed while a path is rewritten.
#[derive(Debug, Clone, Copy)]
pub struct RewriteContext<'a> {
    /// Known page routes.
    pub pages: &'a [String],
    pub locales: &'a [String],
    pub base_path: &'a str,
    pub request: &'a RequestContext,
    /// Current document location.
    pub location: &'a Url,
}

/// Outcome of [`resolve_rewrites`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteResolution {
    /// Path after the last applied rewrite.
    pub as_path: String,
    pub parsed_as: ParsedUrl,
    /// The result is a known page (possibly after dynamic resolution).
    pub matched_page: bool,
    pub resolved_href: Option<String>,
    /// A matching rule points outside the site.
    pub external_dest: bool,
}

/// Run `as_path` through the rewrite phases.
///
/// `query` receives the params and destination query of every applied
/// rewrite. `resolve_href` maps a filesystem path onto a page (dynamic route
/// resolution).
pub fn resolve_rewrites(
    as_path: &str,
    rewrites: &CompiledRewrites,
    query: &mut Query,
    ctx: &RewriteContext<'_>,
    resolve_href: &mut dyn FnMut(&str) -> String,
) -> Result<RewriteResolution> {
    let mut state = RewriteState {
        as_path: as_path.to_string(),
        parsed_as: parse_relative_url(as_path, None, ctx.location)?,
        fs_pathname: String::new(),
        resolved_href: None,
        matched_page: false,
        external_dest: false,
    };
    state.fs_pathname = fs_pathname(&state.parsed_as.pathname, ctx);

    for rule in &rewrites.before_files {
        state.apply(rule, query, ctx, resolve_href);
    }

    state.matched_page = ctx.pages.contains(&state.fs_pathname);
    if !state.matched_page {
        let mut finished = rewrites
            .after_files
            .iter()
            .any(|rule| state.apply(rule, query, ctx, resolve_href));

        if !finished {
            let resolved = resolve_href(&state.fs_pathname);
            state.matched_page = ctx.pages.contains(&resolved);
            state.resolved_href = Some(resolved);
            finished = state.matched_page;
        }

        if !finished {
            rewrites
                .fallback
                .iter()
                .any(|rule| state.apply(rule, query, ctx, resolve_href));
        }
    }

    debug_log!(
        "Rewrites resolved '{}' to '{}' (matched page: {}, external: {})",
        as_path,
        state.as_path,
        state.matched_page,
        state.external_dest
    );

    Ok(RewriteResolution {
        as_path: state.as_path,
        parsed_as: state.parsed_as,
        matched_page: state.matched_page,
        resolved_href: state.resolved_href,
        external_dest: state.external_dest,
    })
}

fn fs_pathname(path: &str, ctx: &RewriteContext<'_>) -> String {
    let without_base = remove_base_path(path, ctx.base_path);
    remove_trailing_slash(&normalize_locale_path(&without_base, ctx.locales).pathname).to_string()
}

struct RewriteState {
    as_path: String,
    parsed_as: ParsedUrl,
    fs_pathname: String,
    resolved_href: Option<String>,
    matched_page: bool,
    external_dest: bool,
}

impl RewriteState {
    /// Apply one rule; `true` when resolution is finished.
    fn apply(
        &mut self,
        compiled: &CompiledRule,
        query: &mut Query,
        ctx: &RewriteContext<'_>,
        resolve_href: &mut dyn FnMut(&str) -> String,
    ) -> bool {
        let Some(mut params) = compiled.matcher.match_path(&self.parsed_as.pathname) else {
            return false;
        };
        let rule = &compiled.rule;

        if !rule.has.is_empty() || !rule.missing.is_empty() {
            let mut request = ctx.request.clone();
            if request.host.is_none() {
                request.host = Some(ctx.location.hostname().to_string());
            }
            match match_has(&request, &self.parsed_as.query, &rule.has, &rule.missing) {
                Some(has_params) => params.extend(&has_params),
                None => return false,
            }
        }

        let Some(destination) = rule.local_destination() else {
            debug_log!("Rewrite '{}' points outside the site", rule.source);
            self.external_dest = true;
            return true;
        };

        let prepared = match prepare_destination(destination, &params, query, true) {
            Ok(prepared) => prepared,
            Err(err) => {
                warn_log!("Skipping rewrite '{}': {}", rule.source, err);
                return false;
            }
        };
        trace_log!("Rewrite '{}' matched, destination '{}'", rule.source, prepared.new_url);

        query.extend(&prepared.parsed.query);
        self.as_path = prepared.new_url;
        self.parsed_as = prepared.parsed;
        self.fs_pathname = fs_pathname(&self.as_path, ctx);

        if ctx.pages.contains(&self.fs_pathname) {
            self.matched_page = true;
            self.resolved_href = Some(self.fs_pathname.clone());
            return true;
        }

        let resolved = resolve_href(&self.fs_pathname);
        let done = resolved != self.as_path && ctx.pages.contains(&resolved);
        self.resolved_href = Some(resolved);
        if done {
            self.matched_page = true;
        }
        done
    }
}
