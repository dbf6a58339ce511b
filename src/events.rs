//! Navigation events.
//!
//! | Event | Emitted |
//! |-------|---------|
//! | `routeChangeStart` | a client-side transition begins resolving |
//! | `beforeHistoryChange` | right before the history entry is written |
//! | `routeChangeComplete` | the new route has been published |
//! | `routeChangeError` | a transition failed or was cancelled |
//! | `hashChangeStart` / `hashChangeComplete` | around a hash-only change |
//!
//! Listeners run synchronously, in registration order. A listener may
//! register or remove listeners; the change applies to the next emit.

use crate::error::RouterError;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// The six named navigation events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouterEventKind {
    RouteChangeStart,
    BeforeHistoryChange,
    RouteChangeComplete,
    RouteChangeError,
    HashChangeStart,
    HashChangeComplete,
}

impl RouterEventKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            RouterEventKind::RouteChangeStart => "routeChangeStart",
            RouterEventKind::BeforeHistoryChange => "beforeHistoryChange",
            RouterEventKind::RouteChangeComplete => "routeChangeComplete",
            RouterEventKind::RouteChangeError => "routeChangeError",
            RouterEventKind::HashChangeStart => "hashChangeStart",
            RouterEventKind::HashChangeComplete => "hashChangeComplete",
        }
    }
}

impl fmt::Display for RouterEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload handed to listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterEvent {
    pub kind: RouterEventKind,
    /// Displayed URL of the transition, with base path.
    pub url: String,
    pub shallow: bool,
    /// Set for `routeChangeError`.
    pub error: Option<RouterError>,
}

/// Handle returned by [`RouterEvents::on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(usize);

type Listener = Rc<dyn Fn(&RouterEvent)>;

/// Event emitter owned by the router.
#[derive(Default)]
pub struct RouterEvents {
    listeners: RefCell<Vec<(ListenerId, RouterEventKind, Listener)>>,
    next_id: Cell<usize>,
}

impl fmt::Debug for RouterEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterEvents")
            .field("listeners", &self.listeners.borrow().len())
            .finish()
    }
}

impl RouterEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for `kind`.
    pub fn on<F>(&self, kind: RouterEventKind, listener: F) -> ListenerId
    where
        F: Fn(&RouterEvent) + 'static,
    {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.listeners
            .borrow_mut()
            .push((id, kind, Rc::new(listener)));
        id
    }

    /// Remove a listener; `false` when it was not registered.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(listener_id, _, _)| *listener_id != id);
        listeners.len() != before
    }

    pub fn emit(&self, event: &RouterEvent) {
        let matching: Vec<Listener> = self
            .listeners
            .borrow()
            .iter()
            .filter(|(_, kind, _)| *kind == event.kind)
            .map(|(_, _, listener)| Rc::clone(listener))
            .collect();
        for listener in matching {
            listener(event);
        }
    }

    pub(crate) fn emit_kind(&self, kind: RouterEventKind, url: &str, shallow: bool) {
        self.emit(&RouterEvent {
            kind,
            url: url.to_string(),
            shallow,
            error: None,
        });
    }

    pub(crate) fn emit_error(&self, error: &RouterError, url: &str, shallow: bool) {
        self.emit(&RouterEvent {
            kind: RouterEventKind::RouteChangeError,
            url: url.to_string(),
            shallow,
            error: Some(error.clone()),
        });
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_to_matching_kind() {
        let events = RouterEvents::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let log = Rc::clone(&seen);
        events.on(RouterEventKind::RouteChangeStart, move |e| {
            log.borrow_mut().push(e.url.clone());
        });

        events.emit_kind(RouterEventKind::RouteChangeStart, "/a", false);
        events.emit_kind(RouterEventKind::RouteChangeComplete, "/b", false);
        assert_eq!(*seen.borrow(), vec!["/a".to_string()]);
    }

    #[test]
    fn test_off() {
        let events = RouterEvents::new();
        let id = events.on(RouterEventKind::HashChangeStart, |_| {});
        assert!(events.off(id));
        assert!(!events.off(id));
        assert_eq!(events.listener_count(), 0);
    }

    #[test]
    fn test_listener_can_subscribe_during_emit() {
        let events = Rc::new(RouterEvents::new());
        let inner = Rc::clone(&events);
        events.on(RouterEventKind::RouteChangeError, move |_| {
            inner.on(RouterEventKind::RouteChangeError, |_| {});
        });
        events.emit_error(&RouterError::cancelled("/x"), "/x", false);
        assert_eq!(events.listener_count(), 2);
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(RouterEventKind::BeforeHistoryChange.to_string(), "beforeHistoryChange");
    }
}
