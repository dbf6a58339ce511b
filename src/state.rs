//! Router state snapshot, transition options, and cancellation.

use crate::params::Query;
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

// ============================================================================
// RouterState
// ============================================================================

/// The current route, replaced wholesale after every committed transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterState {
    /// Page route, e.g. `/blog/[slug]`.
    pub route: String,
    /// Same as `route`, or `/404` / `/_error` while those are shown.
    pub pathname: String,
    pub query: Query,
    /// Displayed path, without base path.
    pub as_path: String,
    pub locale: Option<String>,
    pub is_fallback: bool,
    pub is_preview: bool,
}

// ============================================================================
// Transition options
// ============================================================================

/// Locale requested for a transition.
///
/// Stored in history entries as `undefined` / `false` / `"<tag>"`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LocaleOption {
    /// Keep the locale from the path or current state.
    #[default]
    Inherit,
    /// Switch to the default locale.
    Default,
    Tag(String),
}

impl LocaleOption {
    pub fn tag(&self) -> Option<&str> {
        match self {
            LocaleOption::Tag(tag) => Some(tag),
            _ => None,
        }
    }
}

impl From<&str> for LocaleOption {
    fn from(tag: &str) -> Self {
        LocaleOption::Tag(tag.to_string())
    }
}

impl Serialize for LocaleOption {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            LocaleOption::Inherit => serializer.serialize_none(),
            LocaleOption::Default => serializer.serialize_bool(false),
            LocaleOption::Tag(tag) => serializer.serialize_str(tag),
        }
    }
}

impl<'de> Deserialize<'de> for LocaleOption {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LocaleVisitor;

        impl<'de> de::Visitor<'de> for LocaleVisitor {
            type Value = LocaleOption;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a locale tag, false, or null")
            }

            fn visit_bool<E: de::Error>(self, value: bool) -> Result<LocaleOption, E> {
                if value {
                    Err(E::invalid_value(de::Unexpected::Bool(true), &self))
                } else {
                    Ok(LocaleOption::Default)
                }
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<LocaleOption, E> {
                Ok(LocaleOption::Tag(value.to_string()))
            }

            fn visit_none<E: de::Error>(self) -> Result<LocaleOption, E> {
                Ok(LocaleOption::Inherit)
            }

            fn visit_unit<E: de::Error>(self) -> Result<LocaleOption, E> {
                Ok(LocaleOption::Inherit)
            }

            fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<LocaleOption, D::Error> {
                d.deserialize_any(self)
            }
        }

        deserializer.deserialize_option(LocaleVisitor)
    }
}

/// Options for `push`, `replace`, and history restoration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransitionOptions {
    /// Update the URL without resolving data or view.
    pub shallow: bool,
    #[serde(skip_serializing_if = "is_inherit")]
    pub locale: LocaleOption,
    /// `Some(false)` keeps the scroll position.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scroll: Option<bool>,
    /// Run rewrite / dynamic resolution even when url and as differ.
    #[serde(rename = "_shouldResolveHref")]
    pub should_resolve_href: bool,
    /// Background query sync after hydration.
    #[serde(rename = "_h", with = "flag_as_number")]
    pub query_update: bool,
    pub unstable_skip_client_cache: bool,
}

fn is_inherit(locale: &LocaleOption) -> bool {
    *locale == LocaleOption::Inherit
}

mod flag_as_number {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(flag: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*flag))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(match value {
            serde_json::Value::Bool(b) => b,
            serde_json::Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
            _ => false,
        })
    }
}

impl TransitionOptions {
    pub fn shallow() -> Self {
        Self {
            shallow: true,
            ..Default::default()
        }
    }

    pub fn with_locale(mut self, locale: impl Into<LocaleOption>) -> Self {
        self.locale = locale.into();
        self
    }

    pub fn with_scroll(mut self, scroll: bool) -> Self {
        self.scroll = Some(scroll);
        self
    }
}

/// Options for [`Router::prefetch`](crate::Router::prefetch).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefetchOptions {
    /// Load the view module instead of only warming its cache.
    pub priority: bool,
    pub locale: LocaleOption,
    pub unstable_skip_client_cache: bool,
}

// ============================================================================
// Cancellation
// ============================================================================

/// Flag shared between the engine and one in-flight data operation.
///
/// The engine keeps at most one live token; cancelling it makes the
/// operation report [`RouterError::Cancelled`](crate::RouterError::Cancelled)
/// when it resumes.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Rc<Cell<bool>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }

    /// Whether both handles share one flag.
    pub fn same_as(&self, other: &CancellationToken) -> bool {
        Rc::ptr_eq(&self.cancelled, &other.cancelled)
    }
}

/// Monotonic navigation counter.
///
/// Every client-side transition takes the next id; a transition whose id is
/// no longer current when it reaches the commit step has been superseded.
#[derive(Debug, Clone, Default)]
pub struct NavigationSequence {
    current: Rc<Cell<usize>>,
}

impl NavigationSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current navigation id.
    pub fn current(&self) -> usize {
        self.current.get()
    }

    /// Start a new navigation and return its id.
    pub fn start(&self) -> usize {
        let next = self.current.get().wrapping_add(1);
        self.current.set(next);
        next
    }

    pub fn is_current(&self, id: usize) -> bool {
        self.current.get() == id
    }
}
