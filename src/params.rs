//! Query maps and the URI component codec.
//!
//! - [`Query`]: the parsed `?key=value&...` portion of a URL, and also the
//!   carrier for dynamic route parameters once they are merged in. Keys map
//!   to a [`QueryValue`], which is either a single string or, for repeated
//!   keys and catch-all segments, a list.
//! - [`encode_uri_component`] / [`decode_uri_component`]: percent-encoding
//!   over UTF-8 bytes, matching what browsers do for path segments.
//!
//! Key order is irrelevant for equality; formatting is in key order so that
//! equal queries always serialize to the same string.
//!
//! # Example
//!
//! ```
//! use web_navigator::{Query, QueryValue};
//!
//! let query = Query::parse("page=1&tag=rust&tag=wasm");
//! assert_eq!(query.get_str("page"), Some("1"));
//! assert_eq!(
//!     query.get("tag"),
//!     Some(&QueryValue::Multi(vec!["rust".into(), "wasm".into()]))
//! );
//! assert_eq!(query.to_query_string(), "page=1&tag=rust&tag=wasm");
//! ```

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::form_urlencoded;

/// A single query value: `?a=1` or `?a=1&a=2`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryValue {
    /// One value.
    Single(String),
    /// Several values, in appearance order.
    Multi(Vec<String>),
}

impl QueryValue {
    /// The first value, if any.
    pub fn first(&self) -> Option<&str> {
        match self {
            QueryValue::Single(value) => Some(value),
            QueryValue::Multi(values) => values.first().map(String::as_str),
        }
    }

    /// The last value, if any.
    pub fn last(&self) -> Option<&str> {
        match self {
            QueryValue::Single(value) => Some(value),
            QueryValue::Multi(values) => values.last().map(String::as_str),
        }
    }

    /// All values as a list.
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            QueryValue::Single(value) => vec![value.clone()],
            QueryValue::Multi(values) => values.clone(),
        }
    }

    /// `true` for an empty string or an empty list.
    pub fn is_empty(&self) -> bool {
        match self {
            QueryValue::Single(value) => value.is_empty(),
            QueryValue::Multi(values) => values.is_empty(),
        }
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::Single(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        QueryValue::Single(value)
    }
}

impl From<Vec<String>> for QueryValue {
    fn from(values: Vec<String>) -> Self {
        QueryValue::Multi(values)
    }
}

/// Query parameters parsed from a URL query string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Query {
    params: BTreeMap<String, QueryValue>,
}

impl Query {
    /// Create an empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a query string, with or without the leading `?`.
    ///
    /// Decoding is `application/x-www-form-urlencoded`: `+` decodes to a
    /// space; a key without `=` gets an empty value; repeated keys
    /// accumulate into [`QueryValue::Multi`].
    pub fn parse(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut parsed = Query::new();

        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            parsed.append(key.into_owned(), value.into_owned());
        }

        parsed
    }

    /// Get the value stored for `key`.
    pub fn get(&self, key: &str) -> Option<&QueryValue> {
        self.params.get(key)
    }

    /// Get the first value stored for `key`.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.params.get(key)?.first()
    }

    /// Get the first value for `key`, parsed as type `T`.
    pub fn get_as<T>(&self, key: &str) -> Option<T>
    where
        T: std::str::FromStr,
    {
        self.get_str(key)?.parse().ok()
    }

    /// Insert or overwrite a value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<QueryValue>) {
        self.params.insert(key.into(), value.into());
    }

    /// Append a value; an existing key becomes [`QueryValue::Multi`].
    pub fn append(&mut self, key: String, value: String) {
        match self.params.remove(&key) {
            None => {
                self.params.insert(key, QueryValue::Single(value));
            }
            Some(QueryValue::Single(existing)) => {
                self.params
                    .insert(key, QueryValue::Multi(vec![existing, value]));
            }
            Some(QueryValue::Multi(mut values)) => {
                values.push(value);
                self.params.insert(key, QueryValue::Multi(values));
            }
        }
    }

    /// Remove a key, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<QueryValue> {
        self.params.remove(key)
    }

    /// Return `true` if the key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    /// Copy every entry of `other` into `self`; `other` wins on collision.
    pub fn extend(&mut self, other: &Query) {
        for (key, value) in other.iter() {
            self.params.insert(key.clone(), value.clone());
        }
    }

    /// Return a copy without the given keys.
    pub fn without(&self, keys: &[String]) -> Query {
        let mut copy = self.clone();
        for key in keys {
            copy.params.remove(key);
        }
        copy
    }

    /// Iterate over `(key, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &QueryValue)> {
        self.params.iter()
    }

    /// Iterate over the keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.params.keys()
    }

    /// Serialize into a query string without the leading `?`.
    ///
    /// # Example
    ///
    /// ```
    /// use web_navigator::Query;
    ///
    /// let mut query = Query::new();
    /// query.insert("q", "hello world");
    /// assert_eq!(query.to_query_string(), "q=hello+world");
    /// ```
    pub fn to_query_string(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in &self.params {
            for item in value.to_vec() {
                serializer.append_pair(key, &item);
            }
        }
        serializer.finish()
    }

    /// Return `true` if there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Return the number of unique keys.
    pub fn len(&self) -> usize {
        self.params.len()
    }
}

impl<K, V> FromIterator<(K, V)> for Query
where
    K: Into<String>,
    V: Into<QueryValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut query = Query::new();
        for (key, value) in iter {
            query.insert(key, value);
        }
        query
    }
}

/// Characters `encodeURIComponent` leaves untouched besides alphanumerics.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Percent-encode a URI component.
///
/// Leaves `A-Z a-z 0-9 - _ . ! ~ * ' ( )` untouched and encodes every other
/// UTF-8 byte as `%XX`.
pub fn encode_uri_component(s: &str) -> String {
    utf8_percent_encode(s, COMPONENT).to_string()
}

/// Decode `%XX` sequences into UTF-8.
///
/// Malformed escapes are kept verbatim; invalid UTF-8 is replaced with
/// U+FFFD.
pub fn decode_uri_component(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}
