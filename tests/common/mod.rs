//! Test fixtures for navigation tests
//!
//! Scriptable stand-ins for every capability the router needs, plus helpers
//! to assemble a router around them and to record its events.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::channel::oneshot;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use web_navigator::page::data_href_for;
use web_navigator::url::Url;
use web_navigator::*;

pub const BUILD_ID: &str = "b1";
pub const ORIGIN: &str = "https://example.com";

/// Data URL the router requests for `page` (`/blog/hello`) with `search`.
pub fn data_url(page: &str, search: &str) -> String {
    format!("/_next/data/{BUILD_ID}{page}.json{search}")
}

// ============================================================================
// Loader
// ============================================================================

pub struct MockLoader {
    config: RouterConfig,
    pages: RefCell<Vec<String>>,
    modules: RefCell<HashMap<String, PageModule>>,
    middleware: RefCell<Option<Vec<MiddlewareMatcher>>>,
    gates: RefCell<HashMap<String, oneshot::Receiver<()>>>,
    pub loads: RefCell<Vec<String>>,
    pub prefetched: RefCell<Vec<String>>,
}

impl MockLoader {
    pub fn new(config: &RouterConfig) -> Rc<Self> {
        Rc::new(Self {
            config: config.clone(),
            pages: RefCell::new(Vec::new()),
            modules: RefCell::new(HashMap::new()),
            middleware: RefCell::new(None),
            gates: RefCell::new(HashMap::new()),
            loads: RefCell::new(Vec::new()),
            prefetched: RefCell::new(Vec::new()),
        })
    }

    /// Register a page without data.
    pub fn page(&self, route: &str) {
        self.page_with(route, DataFlags::default());
    }

    /// Register a page with static data.
    pub fn static_page(&self, route: &str) {
        self.page_with(
            route,
            DataFlags {
                static_data: true,
                ..Default::default()
            },
        );
    }

    pub fn page_with(&self, route: &str, flags: DataFlags) {
        self.pages.borrow_mut().push(route.to_string());
        self.modules.borrow_mut().insert(
            route.to_string(),
            PageModule::new(View::named(route)).with_flags(flags),
        );
    }

    /// A listed page whose module fails to load.
    pub fn list_only(&self, route: &str) {
        self.pages.borrow_mut().push(route.to_string());
    }

    /// A view module that exists without being a routable page.
    pub fn module(&self, route: &str) {
        self.modules
            .borrow_mut()
            .insert(route.to_string(), PageModule::new(View::named(route)));
    }

    pub fn set_middleware(&self, matchers: Vec<MiddlewareMatcher>) {
        *self.middleware.borrow_mut() = Some(matchers);
    }

    /// Hold the next load of `route` until the returned sender fires.
    pub fn gate(&self, route: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.borrow_mut().insert(route.to_string(), rx);
        tx
    }

    pub fn load_count(&self, route: &str) -> usize {
        self.loads.borrow().iter().filter(|r| *r == route).count()
    }
}

#[async_trait(?Send)]
impl PageLoader for MockLoader {
    async fn page_list(&self) -> Result<Vec<String>> {
        Ok(self.pages.borrow().clone())
    }

    async fn middleware(&self) -> Result<Option<Vec<MiddlewareMatcher>>> {
        Ok(self.middleware.borrow().clone())
    }

    async fn load_page(&self, route: &str) -> Result<PageModule> {
        self.loads.borrow_mut().push(route.to_string());
        let gate = self.gates.borrow_mut().remove(route);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.modules
            .borrow()
            .get(route)
            .cloned()
            .ok_or_else(|| RouterError::AssetLoad {
                route: route.to_string(),
                message: "no such module".to_string(),
            })
    }

    fn data_href(&self, params: &DataHrefParams<'_>) -> String {
        let location = Url::parse(ORIGIN).unwrap();
        data_href_for(params, BUILD_ID, &self.config, &location).unwrap()
    }

    async fn is_ssg(&self, route: &str) -> bool {
        self.modules
            .borrow()
            .get(route)
            .is_some_and(|module| module.flags.static_data)
    }

    async fn prefetch(&self, route: &str) -> Result<()> {
        self.prefetched.borrow_mut().push(route.to_string());
        Ok(())
    }
}

// ============================================================================
// Manifest
// ============================================================================

#[derive(Default)]
pub struct MockManifest {
    pub manifest: RefCell<BuildManifest>,
    pub fail: Cell<bool>,
}

impl MockManifest {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn with_rewrites(table: RewriteTable) -> Rc<Self> {
        let manifest = Self::default();
        manifest.manifest.borrow_mut().rewrites = table;
        Rc::new(manifest)
    }
}

#[async_trait(?Send)]
impl ManifestProvider for MockManifest {
    async fn client_build_manifest(&self) -> Result<BuildManifest> {
        if self.fail.get() {
            return Err(RouterError::Manifest {
                message: "manifest unavailable".to_string(),
            });
        }
        Ok(self.manifest.borrow().clone())
    }
}

// ============================================================================
// Fetcher
// ============================================================================

/// Answers by URL; unknown URLs get a plain 404.
#[derive(Default)]
pub struct MockFetcher {
    responses: RefCell<HashMap<String, VecDeque<FetchResponse>>>,
    sticky: RefCell<HashMap<String, FetchResponse>>,
    gates: RefCell<HashMap<String, oneshot::Receiver<()>>>,
    pub requests: RefCell<Vec<FetchRequest>>,
}

impl MockFetcher {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Answer every request for `url` with `response`.
    pub fn respond(&self, url: &str, response: FetchResponse) {
        self.sticky.borrow_mut().insert(url.to_string(), response);
    }

    pub fn respond_json(&self, url: &str, json: Value) {
        self.respond(url, FetchResponse::new(200, json.to_string()));
    }

    /// Answer the next request for `url` with `response`, before any sticky answer.
    pub fn respond_once(&self, url: &str, response: FetchResponse) {
        self.responses
            .borrow_mut()
            .entry(url.to_string())
            .or_default()
            .push_back(response);
    }

    /// Hold the next request for `url` until the returned sender fires.
    pub fn gate(&self, url: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.borrow_mut().insert(url.to_string(), rx);
        tx
    }

    pub fn count(&self, url: &str) -> usize {
        self.requests.borrow().iter().filter(|r| r.url == url).count()
    }

    pub fn count_method(&self, url: &str, method: Method) -> usize {
        self.requests
            .borrow()
            .iter()
            .filter(|r| r.url == url && r.method == method)
            .count()
    }
}

#[async_trait(?Send)]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse> {
        let url = request.url.clone();
        self.requests.borrow_mut().push(request);

        let gate = self.gates.borrow_mut().remove(&url);
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        let queued = self
            .responses
            .borrow_mut()
            .get_mut(&url)
            .and_then(VecDeque::pop_front);
        let response = queued
            .or_else(|| self.sticky.borrow().get(&url).cloned())
            .unwrap_or_else(|| FetchResponse::new(404, ""));
        Ok(response)
    }
}

// ============================================================================
// History and viewport
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum HistoryCall {
    Push(Value, String),
    Replace(Value, String),
}

impl HistoryCall {
    pub fn url(&self) -> &str {
        match self {
            HistoryCall::Push(_, url) | HistoryCall::Replace(_, url) => url,
        }
    }

    pub fn state(&self) -> &Value {
        match self {
            HistoryCall::Push(state, _) | HistoryCall::Replace(state, _) => state,
        }
    }

    pub fn is_push(&self) -> bool {
        matches!(self, HistoryCall::Push(..))
    }
}

pub struct MockHistory {
    location: RefCell<Url>,
    pub calls: RefCell<Vec<HistoryCall>>,
    pub assigned: RefCell<Vec<String>>,
    pub reloads: Cell<usize>,
    pub traversals: RefCell<Vec<&'static str>>,
}

impl MockHistory {
    pub fn at(path: &str) -> Rc<Self> {
        let location = Url::parse(&format!("{ORIGIN}{path}")).unwrap();
        Rc::new(Self {
            location: RefCell::new(location),
            calls: RefCell::new(Vec::new()),
            assigned: RefCell::new(Vec::new()),
            reloads: Cell::new(0),
            traversals: RefCell::new(Vec::new()),
        })
    }

    /// Move the location without recording a call, as a traversal would.
    pub fn set_location(&self, path: &str) {
        *self.location.borrow_mut() = Url::parse(&format!("{ORIGIN}{path}")).unwrap();
    }

    pub fn last(&self) -> Option<HistoryCall> {
        self.calls.borrow().last().cloned()
    }

    pub fn pushes(&self) -> usize {
        self.calls.borrow().iter().filter(|c| c.is_push()).count()
    }

    fn navigate(&self, url: &str) {
        let next = self.location.borrow().join(url);
        if let Some(next) = next {
            *self.location.borrow_mut() = next;
        }
    }
}

impl BrowserHistory for MockHistory {
    fn location(&self) -> Url {
        self.location.borrow().clone()
    }

    fn push_state(&self, state: Value, url: &str) {
        self.calls
            .borrow_mut()
            .push(HistoryCall::Push(state, url.to_string()));
        self.navigate(url);
    }

    fn replace_state(&self, state: Value, url: &str) {
        self.calls
            .borrow_mut()
            .push(HistoryCall::Replace(state, url.to_string()));
        self.navigate(url);
    }

    fn back(&self) {
        self.traversals.borrow_mut().push("back");
    }

    fn forward(&self) {
        self.traversals.borrow_mut().push("forward");
    }

    fn assign(&self, url: &str) {
        self.assigned.borrow_mut().push(url.to_string());
    }

    fn reload(&self) {
        self.reloads.set(self.reloads.get() + 1);
    }
}

#[derive(Default)]
pub struct MockViewport {
    pub offset: Cell<(f64, f64)>,
    pub scrolled_to: RefCell<Vec<(f64, f64)>>,
    pub ids: RefCell<Vec<String>>,
    pub names: RefCell<Vec<String>>,
    pub revealed: RefCell<Vec<String>>,
    pub lang: RefCell<Option<String>>,
}

impl MockViewport {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn with_ids(ids: &[&str]) -> Rc<Self> {
        let viewport = Self::default();
        *viewport.ids.borrow_mut() = ids.iter().map(|s| s.to_string()).collect();
        Rc::new(viewport)
    }
}

impl Viewport for MockViewport {
    fn scroll_offset(&self) -> ScrollTarget {
        let (x, y) = self.offset.get();
        ScrollTarget { x, y }
    }

    fn scroll_to(&self, x: f64, y: f64) {
        self.scrolled_to.borrow_mut().push((x, y));
    }

    fn scroll_into_view_by_id(&self, id: &str) -> bool {
        let found = self.ids.borrow().iter().any(|i| i == id);
        if found {
            self.revealed.borrow_mut().push(format!("#{id}"));
        }
        found
    }

    fn scroll_into_view_by_name(&self, name: &str) -> bool {
        let found = self.names.borrow().iter().any(|n| n == name);
        if found {
            self.revealed.borrow_mut().push(format!("@{name}"));
        }
        found
    }

    fn set_document_lang(&self, lang: &str) {
        *self.lang.borrow_mut() = Some(lang.to_string());
    }
}

// ============================================================================
// Props and rendering
// ============================================================================

/// Gives each view `{"pageProps": {"view": <id>}}`.
#[derive(Default)]
pub struct ViewProps {
    pub contexts: RefCell<Vec<PropsContext>>,
}

#[async_trait(?Send)]
impl PropsProvider for ViewProps {
    async fn initial_props(&self, view: &View, ctx: &PropsContext) -> Result<Value> {
        self.contexts.borrow_mut().push(ctx.clone());
        Ok(serde_json::json!({ "pageProps": { "view": view.id() } }))
    }
}

#[derive(Default)]
pub struct MockSubscriber {
    pub updates: RefCell<Vec<RouteUpdate>>,
}

impl MockSubscriber {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn last(&self) -> Option<RouteUpdate> {
        self.updates.borrow().last().cloned()
    }

    pub fn count(&self) -> usize {
        self.updates.borrow().len()
    }
}

#[async_trait(?Send)]
impl RouteSubscriber for MockSubscriber {
    async fn publish(&self, update: RouteUpdate) -> Result<()> {
        self.updates.borrow_mut().push(update);
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

/// A router wired to mocks, starting on a server-rendered page.
pub struct Harness {
    pub router: Router,
    pub loader: Rc<MockLoader>,
    pub manifest: Rc<MockManifest>,
    pub fetcher: Rc<MockFetcher>,
    pub history: Rc<MockHistory>,
    pub viewport: Rc<MockViewport>,
    pub props: Rc<ViewProps>,
    pub subscriber: Rc<MockSubscriber>,
    pub events: Rc<RefCell<Vec<(RouterEventKind, String)>>>,
}

/// Collaborators for a [`Harness`] before the router is built.
pub struct Setup {
    pub config: RouterConfig,
    pub initial: InitialPage,
    pub loader: Rc<MockLoader>,
    pub manifest: Rc<MockManifest>,
    pub fetcher: Rc<MockFetcher>,
    pub history: Rc<MockHistory>,
    pub viewport: Rc<MockViewport>,
}

impl Setup {
    /// Start on `page` shown at `as_path`.
    pub fn new(config: RouterConfig, page: &str, as_path: &str) -> Self {
        let loader = MockLoader::new(&config);
        Self {
            initial: InitialPage {
                page: page.to_string(),
                as_path: as_path.to_string(),
                props: serde_json::json!({ "pageProps": {} }),
                ..Default::default()
            },
            loader,
            manifest: MockManifest::new(),
            fetcher: MockFetcher::new(),
            history: MockHistory::at(as_path),
            viewport: MockViewport::new(),
            config,
        }
    }

    pub fn build(self) -> Harness {
        self.build_with(|builder| builder)
    }

    pub fn build_with(self, customize: impl FnOnce(RouterBuilder) -> RouterBuilder) -> Harness {
        let props = Rc::new(ViewProps::default());
        let subscriber = MockSubscriber::new();
        let view = View::named(self.initial.page.clone());

        let builder = Router::builder(self.config, self.initial, view)
            .with_loader(self.loader.clone())
            .with_manifest(self.manifest.clone())
            .with_fetcher(self.fetcher.clone())
            .with_history(self.history.clone())
            .with_viewport(self.viewport.clone())
            .with_props(props.clone())
            .with_subscriber(subscriber.clone());
        let router = customize(builder).build().unwrap();
        let events = record_events(&router);

        Harness {
            router,
            loader: self.loader,
            manifest: self.manifest,
            fetcher: self.fetcher,
            history: self.history,
            viewport: self.viewport,
            props,
            subscriber,
            events,
        }
    }
}

impl Harness {
    pub fn event_kinds(&self) -> Vec<RouterEventKind> {
        self.events.borrow().iter().map(|(kind, _)| *kind).collect()
    }

    pub fn events_of(&self, kind: RouterEventKind) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, url)| url.clone())
            .collect()
    }

    pub fn clear_events(&self) {
        self.events.borrow_mut().clear();
    }
}

const ALL_EVENTS: [RouterEventKind; 6] = [
    RouterEventKind::RouteChangeStart,
    RouterEventKind::BeforeHistoryChange,
    RouterEventKind::RouteChangeComplete,
    RouterEventKind::RouteChangeError,
    RouterEventKind::HashChangeStart,
    RouterEventKind::HashChangeComplete,
];

/// Record every event the router emits, in order.
pub fn record_events(router: &Router) -> Rc<RefCell<Vec<(RouterEventKind, String)>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    for kind in ALL_EVENTS {
        let log = Rc::clone(&log);
        router.events().on(kind, move |event| {
            log.borrow_mut().push((event.kind, event.url.clone()));
        });
    }
    log
}

/// Opt-in log output: `RUST_LOG=web_navigator=trace cargo test`.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
