//! Browser history and scroll synchronization.
//!
//! Every entry the engine writes carries a [`HistoryState`] object. Its `key`
//! links the entry to the scroll offset saved when the user left it, so a
//! back/forward navigation can restore the position.

use crate::page::ScrollTarget;
use crate::state::TransitionOptions;
use crate::trace_log;
use crate::url::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hasher};

// ============================================================================
// Capabilities
// ============================================================================

/// The browser's history and location.
pub trait BrowserHistory {
    /// Current document location.
    fn location(&self) -> Url;

    fn push_state(&self, state: Value, url: &str);

    fn replace_state(&self, state: Value, url: &str);

    fn back(&self);

    fn forward(&self);

    /// Load `url` as a new document.
    fn assign(&self, url: &str);

    /// Reload the current document.
    fn reload(&self);
}

/// Scroll position and document metadata.
pub trait Viewport {
    fn scroll_offset(&self) -> ScrollTarget;

    fn scroll_to(&self, x: f64, y: f64);

    /// Scroll the element with `id` into view; `false` when absent.
    fn scroll_into_view_by_id(&self, id: &str) -> bool;

    /// Scroll the first element named `name` into view; `false` when absent.
    fn scroll_into_view_by_name(&self, name: &str) -> bool;

    fn set_document_lang(&self, lang: &str) {
        let _ = lang;
    }
}

// ============================================================================
// History entries
// ============================================================================

/// State object stored with every engine-written history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryState {
    pub url: String,
    #[serde(rename = "as")]
    pub as_path: String,
    #[serde(default)]
    pub options: TransitionOptions,
    #[serde(rename = "__N")]
    pub marker: bool,
    #[serde(default)]
    pub key: String,
}

impl HistoryState {
    pub fn new(url: &str, as_path: &str, options: TransitionOptions, key: &str) -> Self {
        Self {
            url: url.to_string(),
            as_path: as_path.to_string(),
            options,
            marker: true,
            key: key.to_string(),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// A popped history entry, by who wrote it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoppedEntry {
    /// No state: the entry was created outside the engine (hash link, manual
    /// `pushState` without state).
    Missing,
    /// Written by another history consumer sharing the document.
    ForeignConsumer,
    /// State without the engine marker.
    Unmarked,
    Engine(HistoryState),
}

impl PoppedEntry {
    pub fn classify(state: Option<&Value>) -> Self {
        let Some(state) = state.filter(|s| !s.is_null()) else {
            return PoppedEntry::Missing;
        };
        if is_truthy(state.get("__NA")) {
            return PoppedEntry::ForeignConsumer;
        }
        if !is_truthy(state.get("__N")) {
            return PoppedEntry::Unmarked;
        }
        match serde_json::from_value::<HistoryState>(state.clone()) {
            Ok(parsed) => PoppedEntry::Engine(parsed),
            Err(err) => {
                trace_log!("Ignoring malformed history state: {}", err);
                PoppedEntry::Unmarked
            }
        }
    }
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

/// Generate an 8-character base-36 history key.
pub fn create_key() -> String {
    thread_local! {
        static COUNTER: Cell<u64> = const { Cell::new(0) };
        static STATE: RandomState = RandomState::new();
    }

    let counter = COUNTER.with(|c| {
        let next = c.get().wrapping_add(1);
        c.set(next);
        next
    });
    let mut bits = STATE.with(|state| {
        let mut hasher = state.build_hasher();
        hasher.write_u64(counter);
        hasher.finish()
    });

    const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut key = String::with_capacity(8);
    for _ in 0..8 {
        key.push(char::from(ALPHABET[(bits % 36) as usize]));
        bits /= 36;
    }
    key
}

// ============================================================================
// Scroll restoration
// ============================================================================

/// Saved scroll offsets keyed by history key.
#[derive(Debug, Default)]
pub struct ScrollRestoration {
    offsets: RefCell<HashMap<String, ScrollTarget>>,
}

impl ScrollRestoration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save(&self, key: &str, offset: ScrollTarget) {
        trace_log!("Saving scroll ({}, {}) for entry '{}'", offset.x, offset.y, key);
        self.offsets.borrow_mut().insert(key.to_string(), offset);
    }

    /// Saved offset for `key`, the origin when none was saved.
    pub fn restore(&self, key: &str) -> ScrollTarget {
        self.offsets
            .borrow()
            .get(key)
            .copied()
            .unwrap_or(ScrollTarget { x: 0.0, y: 0.0 })
    }

    pub fn len(&self) -> usize {
        self.offsets.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
