//! The navigation engine.
//!
//! [`Router`] is a cheap handle around the shared engine state. Every
//! transition goes through one pipeline:
//!
//! ```text
//! push / replace / popstate
//!        │
//!        ▼
//!   local? ──no──► hard navigation
//!        │
//!   locale + hash-only check
//!        │
//!   rewrites ──► dynamic route ──► params
//!        │
//!   route info (view + data, middleware effects)
//!        │
//!   redirects / not found
//!        │
//!   history ──► publish ──► events
//! ```
//!
//! A newer transition cancels the data operation of the one in flight; the
//! superseded transition resolves to `Ok(false)`.
//!
//! # Example
//!
//! ```ignore
//! let router = Router::builder(config, initial_page, view)
//!     .with_loader(loader)
//!     .with_manifest(manifest)
//!     .with_fetcher(fetcher)
//!     .with_history(history)
//!     .with_viewport(viewport)
//!     .with_subscriber(renderer)
//!     .build()?;
//!
//! router.start().await;
//! router.push("/blog/[slug]", Some("/blog/hello"), TransitionOptions::default()).await?;
//! ```

use crate::cache::RouteRegexCache;
use crate::config::{InitialPage, RouterConfig};
use crate::error::{Result, RouterError};
use crate::events::{RouterEventKind, RouterEvents};
use crate::fetch::{DataCache, FetchDataParams, Fetcher};
use crate::history::{create_key, BrowserHistory, HistoryState, PoppedEntry, ScrollRestoration, Viewport};
use crate::matching::{interpolate_with, is_dynamic_route, RouteRegex};
use crate::middleware::{with_middleware_effects, CompiledMatchers, EffectContext, MiddlewareEffect};
use crate::page::{
    DataFlags, DataHrefParams, EmptyProps, ManifestProvider, PageLoader, PropsProvider, RouteSubscriber,
    RouteUpdate, ScrollTarget, View,
};
use crate::params::{decode_uri_component, Query, QueryValue};
use crate::path::{
    add_base_path, add_locale, detect_domain_locale, normalize_locale_path, parse_path, remove_base_path,
    remove_locale, remove_trailing_slash, PathnameInfo,
};
use crate::resolve::{prepare_url_as, resolve_dynamic_route, PreparedUrlAs, ResolveContext};
use crate::rewrites::{resolve_rewrites, CompiledRewrites, RewriteContext, RewriteTable};
use crate::route_info::{normalize_props, Resolution, RouteInfo, RouteInfoKind, RouteInfoRequest};
use crate::state::{
    CancellationToken, LocaleOption, NavigationSequence, PrefetchOptions, RouterState, TransitionOptions,
};
use crate::url::{format_url, is_local_url, parse_relative_url, ParsedUrl, Url};
use crate::{debug_log, info_log, trace_log, warn_log};
use futures::future::{FutureExt, LocalBoxFuture};
use futures::task::LocalSpawn;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Maximum chained redirects (middleware or `__N_REDIRECT`) per navigation.
const MAX_REDIRECT_DEPTH: usize = 5;

/// History method used to record a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HistoryMethod {
    Push,
    Replace,
}

/// Wait forever.
///
/// Used after a hard navigation: the document is being replaced, so the
/// transition never completes.
pub(crate) async fn hang<T>() -> T {
    futures::future::pending().await
}

type BeforePopState = Rc<dyn Fn(&HistoryState) -> bool>;

/// Clears the in-flight marker when the transition that set it ends,
/// unless a newer transition has taken over.
struct InFlightGuard {
    inner: Rc<RouterInner>,
    navigation: usize,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.inner.sequence.is_current(self.navigation) {
            self.inner.in_flight_route.borrow_mut().take();
        }
    }
}

// ============================================================================
// RouterInner
// ============================================================================

/// State shared by every [`Router`] handle.
pub(crate) struct RouterInner {
    pub(crate) config: RouterConfig,
    pub(crate) loader: Rc<dyn PageLoader>,
    pub(crate) manifest: Rc<dyn ManifestProvider>,
    pub(crate) history: Rc<dyn BrowserHistory>,
    pub(crate) viewport: Rc<dyn Viewport>,
    pub(crate) props: Rc<dyn PropsProvider>,
    pub(crate) subscriber: Rc<dyn RouteSubscriber>,
    pub(crate) spawner: Option<Rc<dyn LocalSpawn>>,
    /// Data for navigations and prefetches.
    pub(crate) data_cache: DataCache,
    /// Data for background revalidation and query updates.
    pub(crate) background_cache: DataCache,
    pub(crate) state: RefCell<RouterState>,
    /// Route info per route.
    pub(crate) components: RefCell<HashMap<String, Rc<RouteInfo>>>,
    pub(crate) regexes: RefCell<RouteRegexCache>,
    rewrites: RefCell<Rc<CompiledRewrites>>,
    middleware: RefCell<Option<Rc<CompiledMatchers>>>,
    pub(crate) events: RouterEvents,
    /// Token of the live data operation.
    pub(crate) clc: RefCell<Option<CancellationToken>>,
    /// Target of the transition that has not finished yet.
    in_flight_route: RefCell<Option<String>>,
    in_flight_query_update: Cell<bool>,
    pub(crate) sequence: NavigationSequence,
    /// Still hydrating the server-rendered page.
    pub(crate) is_ssr: Cell<bool>,
    is_first_pop_state: Cell<bool>,
    is_ready: Cell<bool>,
    last_shallow: Cell<bool>,
    /// Key of the current history entry.
    key: RefCell<String>,
    before_pop_state: RefCell<Option<BeforePopState>>,
    scroll: ScrollRestoration,
    /// Props the server rendered the first page with.
    pub(crate) initial_props: Value,
    /// `as` the server rendered the first page with.
    initial_as: String,
}

impl fmt::Debug for RouterInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterInner")
            .field("state", &self.state.borrow())
            .field("components", &self.components.borrow().len())
            .field("is_ready", &self.is_ready.get())
            .field("is_ssr", &self.is_ssr.get())
            .finish()
    }
}

impl RouterInner {
    // ========================================================================
    // Build data
    // ========================================================================

    /// Whether middleware runs for `as_path`. Loader failures count as no.
    pub(crate) async fn matches_middleware(&self, as_path: &str, locale: Option<&str>) -> bool {
        let matchers = match self.loader.middleware().await {
            Ok(Some(matchers)) => matchers,
            Ok(None) => return false,
            Err(err) => {
                debug_log!("Middleware table unavailable: {}", err);
                return false;
            }
        };

        let compiled = {
            let mut slot = self.middleware.borrow_mut();
            let stale = slot
                .as_ref()
                .map_or(true, |compiled| !compiled.is_compiled_from(&matchers));
            if stale {
                trace_log!("Compiling {} middleware matchers", matchers.len());
                *slot = Some(Rc::new(CompiledMatchers::compile(&matchers)));
            }
            slot.clone()
        };
        compiled.is_some_and(|compiled| compiled.matches(as_path, locale, &self.config))
    }

    /// Rewrites from the build manifest; the last good table when it fails.
    pub(crate) async fn compiled_rewrites(&self) -> Rc<CompiledRewrites> {
        match self.manifest.client_build_manifest().await {
            Ok(manifest) => self.rewrites_for(&manifest.rewrites),
            Err(err) => {
                debug_log!("Build manifest unavailable: {}", err);
                Rc::clone(&*self.rewrites.borrow())
            }
        }
    }

    fn rewrites_for(&self, table: &RewriteTable) -> Rc<CompiledRewrites> {
        let mut slot = self.rewrites.borrow_mut();
        if !slot.is_compiled_from(table, self.config.trailing_slash) {
            trace_log!("Compiling rewrite table");
            *slot = Rc::new(table.compile(self.config.trailing_slash));
        }
        Rc::clone(&*slot)
    }

    /// Page list, rewrites, and a validated middleware table.
    async fn load_build_data(&self) -> Result<(Vec<String>, Rc<CompiledRewrites>)> {
        let (pages, manifest, _) = futures::try_join!(
            self.loader.page_list(),
            self.manifest.client_build_manifest(),
            self.loader.middleware(),
        )?;
        Ok((pages, self.rewrites_for(&manifest.rewrites)))
    }

    fn route_regex(&self, route: &str) -> Result<Rc<RouteRegex>> {
        self.regexes.borrow_mut().get_or_compile(route)
    }

    fn prepare(&self, url: &str, as_path: Option<&str>) -> PreparedUrlAs {
        let location = self.history.location();
        let state = self.state.borrow();
        let ctx = ResolveContext {
            pathname: &state.pathname,
            as_path: &state.as_path,
            location: &location,
            config: &self.config,
        };
        prepare_url_as(&ctx, url, as_path)
    }

    // ========================================================================
    // Document and history
    // ========================================================================

    /// Load `url` as a new document.
    pub(crate) fn hard_navigate(&self, url: &str) -> Result<()> {
        let current = {
            let state = self.state.borrow();
            add_base_path(&add_locale(&state.as_path, state.locale.as_deref(), None), &self.config)
        };
        if url == current {
            return Err(RouterError::HardNavigationLoop {
                url: url.to_string(),
            });
        }
        info_log!("Hard navigation to '{}'", url);
        self.history.assign(url);
        Ok(())
    }

    /// Write a history entry for `as_path`.
    ///
    /// A push to the URL already shown is skipped. Pushes get a fresh key.
    fn change_state(&self, method: HistoryMethod, url: &str, as_path: &str, options: &TransitionOptions) {
        if method == HistoryMethod::Push && self.history.location().path_and_rest() == as_path {
            trace_log!("History already shows '{}'", as_path);
            return;
        }

        self.last_shallow.set(options.shallow);
        if method == HistoryMethod::Push {
            *self.key.borrow_mut() = create_key();
        }
        let entry = HistoryState::new(url, as_path, options.clone(), &self.key.borrow()).to_value();
        match method {
            HistoryMethod::Push => self.history.push_state(entry, as_path),
            HistoryMethod::Replace => self.history.replace_state(entry, as_path),
        }
    }

    /// Store `state` and hand `info` to the rendering layer.
    async fn set(
        &self,
        state: RouterState,
        info: Option<Rc<RouteInfo>>,
        reset_scroll: Option<ScrollTarget>,
    ) -> Result<()> {
        *self.state.borrow_mut() = state.clone();
        match info {
            Some(route_info) => {
                self.subscriber
                    .publish(RouteUpdate {
                        state,
                        route_info,
                        reset_scroll,
                    })
                    .await
            }
            None => Ok(()),
        }
    }

    fn only_a_hash_change(&self, as_path: &str) -> bool {
        let state = self.state.borrow();
        if state.as_path.is_empty() {
            return false;
        }
        let (old_url, old_hash) = split_hash(&state.as_path);
        let (new_url, new_hash) = split_hash(as_path);

        if new_hash.is_some_and(|hash| !hash.is_empty()) && old_url == new_url && old_hash == new_hash {
            return true;
        }
        if old_url != new_url {
            return false;
        }
        old_hash != new_hash
    }

    fn scroll_to_hash(&self, as_path: &str) {
        let hash = split_hash(as_path).1.unwrap_or_default();
        if hash.is_empty() || hash == "top" {
            self.viewport.scroll_to(0.0, 0.0);
            return;
        }
        let raw = decode_uri_component(hash);
        if !self.viewport.scroll_into_view_by_id(&raw) && !self.viewport.scroll_into_view_by_name(&raw) {
            trace_log!("No element for fragment '{}'", raw);
        }
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// Run one transition to completion.
    ///
    /// `Ok(false)` means the transition was abandoned (superseded, cancelled,
    /// or handed to a document load).
    pub(crate) async fn change(
        self: Rc<Self>,
        method: HistoryMethod,
        url: String,
        as_path: String,
        options: TransitionOptions,
        forced_scroll: Option<ScrollTarget>,
    ) -> Result<bool> {
        let is_query_updating = options.query_update;
        let shallow = options.shallow;
        let target = as_path.clone();

        match Rc::clone(&self)
            .transition(method, url, as_path, options, forced_scroll, 0)
            .await
        {
            Ok(done) => Ok(done),
            Err(err) if err.is_cancelled() => {
                debug_log!("Transition to '{}' cancelled", target);
                Ok(false)
            }
            Err(err) => {
                if !is_query_updating {
                    self.events.emit_error(&err, &target, shallow);
                }
                Err(err)
            }
        }
    }

    fn transition(
        self: Rc<Self>,
        method: HistoryMethod,
        url: String,
        as_path: String,
        options: TransitionOptions,
        forced_scroll: Option<ScrollTarget>,
        depth: usize,
    ) -> LocalBoxFuture<'static, Result<bool>> {
        async move {
            if depth > MAX_REDIRECT_DEPTH {
                return Err(RouterError::RedirectLoop { url: as_path });
            }
            self.run_transition(method, url, as_path, options, forced_scroll, depth)
                .await
        }
        .boxed_local()
    }

    async fn run_transition(
        self: Rc<Self>,
        mut method: HistoryMethod,
        mut url: String,
        mut as_path: String,
        mut options: TransitionOptions,
        forced_scroll: Option<ScrollTarget>,
        depth: usize,
    ) -> Result<bool> {
        let location = self.history.location();
        let base = self.config.base_path.clone();

        if !is_local_url(&url, &location, &base) {
            self.hard_navigate(&url)?;
            return Ok(false);
        }

        let is_query_updating = options.query_update;
        let mut should_resolve_href = is_query_updating
            || options.should_resolve_href
            || parse_path(&url).pathname == parse_path(&as_path).pathname;

        let mut next_state = self.state.borrow().clone();
        let ready_state_change = !self.is_ready.get();
        self.is_ready.set(true);
        let is_ssr = self.is_ssr.get();
        if !is_query_updating {
            self.is_ssr.set(false);
        }

        if is_query_updating && self.clc.borrow().is_some() {
            debug_log!("Dropping query update while a transition is in flight");
            return Ok(false);
        }

        let prev_locale = next_state.locale.clone();

        if self.config.i18n.is_some() {
            let inherit = options.locale == LocaleOption::Inherit;
            next_state.locale = match &options.locale {
                LocaleOption::Default => self.config.default_locale().map(str::to_string),
                LocaleOption::Tag(tag) => Some(tag.clone()),
                LocaleOption::Inherit => next_state.locale.clone(),
            };

            let mut parsed_as = parse_relative_url(&remove_base_path(&as_path, &base), None, &location)?;
            let detected = normalize_locale_path(&parsed_as.pathname, self.config.locales());
            if let Some(locale) = detected.detected_locale {
                next_state.locale = Some(locale);
                parsed_as.pathname = add_base_path(&parsed_as.pathname, &self.config);
                as_path = format_url(&parsed_as);
                url = add_base_path(
                    &normalize_locale_path(&remove_base_path(&url, &base), self.config.locales()).pathname,
                    &self.config,
                );
            }
            if inherit {
                options.locale = next_state.locale.clone().map_or(LocaleOption::Inherit, LocaleOption::Tag);
            }

            if self.leave_for_locale(&next_state, &parsed_as, &as_path, &location)? {
                return hang().await;
            }
        }

        let shallow = options.shallow;
        let scroll = options.scroll.unwrap_or(true);

        let superseded = self.in_flight_route.borrow_mut().take();
        if let Some(in_flight) = superseded {
            if !is_ssr && !self.in_flight_query_update.get() {
                self.events
                    .emit_error(&RouterError::cancelled(&in_flight), &in_flight, shallow);
            }
            if let Some(token) = self.clc.borrow_mut().take() {
                debug_log!("Cancelling transition to '{}'", in_flight);
                token.cancel();
            }
        }

        as_path = add_base_path(
            &add_locale(
                &remove_base_path(&as_path, &base),
                options.locale.tag(),
                self.config.default_locale(),
            ),
            &self.config,
        );
        let cleaned_as = remove_locale(&remove_base_path(&as_path, &base), next_state.locale.as_deref());
        *self.in_flight_route.borrow_mut() = Some(as_path.clone());
        self.in_flight_query_update.set(is_query_updating);
        let locale_change = prev_locale != next_state.locale;
        let navigation = self.sequence.start();
        let _in_flight = InFlightGuard {
            inner: Rc::clone(&self),
            navigation,
        };

        if !is_query_updating && self.only_a_hash_change(&cleaned_as) && !locale_change {
            next_state.as_path = cleaned_as.clone();
            self.events
                .emit_kind(RouterEventKind::HashChangeStart, &as_path, shallow);
            let hash_options = TransitionOptions {
                scroll: Some(false),
                ..options.clone()
            };
            self.change_state(method, &url, &as_path, &hash_options);
            if scroll {
                self.scroll_to_hash(&cleaned_as);
            }
            let info = self.components.borrow().get(&next_state.route).cloned();
            if let Err(err) = self.set(next_state, info, None).await {
                if err.is_cancelled() {
                    self.events.emit_error(&err, &cleaned_as, shallow);
                }
                return Err(err);
            }
            self.events
                .emit_kind(RouterEventKind::HashChangeComplete, &as_path, shallow);
            return Ok(true);
        }

        let mut parsed = parse_relative_url(&url, None, &location)?;
        let mut pathname = parsed.pathname.clone();
        let mut query = parsed.query.clone();

        let (pages, rewrites) = match self.load_build_data().await {
            Ok(data) => data,
            Err(err) => {
                debug_log!("Build data unavailable, loading '{}' as a document: {}", as_path, err);
                self.hard_navigate(&as_path)?;
                return Ok(false);
            }
        };

        if self.state.borrow().as_path == cleaned_as && !locale_change {
            method = HistoryMethod::Replace;
        }

        let mut resolved_as = as_path.clone();
        if !pathname.is_empty() {
            pathname = remove_trailing_slash(&remove_base_path(&pathname, &base)).to_string();
        }
        let mut route = remove_trailing_slash(&pathname).to_string();

        let is_middleware_rewrite = if as_path.starts_with('/') {
            let as_pathname = parse_relative_url(&as_path, None, &location)?.pathname;
            route != as_pathname
                && (!is_dynamic_route(&route) || !self.route_regex(&route)?.is_match(&as_pathname))
        } else {
            false
        };

        let is_middleware_match = !shallow
            && self
                .matches_middleware(&as_path, next_state.locale.as_deref())
                .await;
        if is_query_updating && is_middleware_match {
            should_resolve_href = false;
        }

        if should_resolve_href && pathname != "/_error" {
            options.should_resolve_href = true;

            if self.config.has_rewrites && as_path.starts_with('/') {
                let target = add_base_path(
                    &add_locale(&cleaned_as, next_state.locale.as_deref(), None),
                    &self.config,
                );
                let ctx = RewriteContext {
                    pages: &pages,
                    locales: self.config.locales(),
                    base_path: &base,
                    request: &self.config.request,
                    location: &location,
                };
                let result = {
                    let mut regexes = self.regexes.borrow_mut();
                    resolve_rewrites(&target, &rewrites, &mut query, &ctx, &mut |path| {
                        resolve_dynamic_route(path, &pages, &mut regexes)
                    })?
                };

                if result.external_dest {
                    debug_log!("'{}' rewrites outside the site", as_path);
                    self.hard_navigate(&as_path)?;
                    return Ok(true);
                }
                if !is_middleware_match {
                    resolved_as = result.as_path.clone();
                }
                if let Some(href) = result.resolved_href.filter(|_| result.matched_page) {
                    pathname = href;
                    parsed.pathname = add_base_path(&pathname, &self.config);
                    if !is_middleware_match {
                        url = format_with_query(&parsed, &query);
                    }
                }
            } else {
                let resolved = resolve_dynamic_route(&pathname, &pages, &mut self.regexes.borrow_mut());
                if resolved != pathname {
                    pathname = resolved;
                    parsed.pathname = add_base_path(&pathname, &self.config);
                    if !is_middleware_match {
                        url = format_with_query(&parsed, &query);
                    }
                }
            }
        }

        if !is_local_url(&as_path, &location, &base) {
            if self.config.is_development() {
                return Err(RouterError::InvalidHref { href: as_path });
            }
            self.hard_navigate(&as_path)?;
            return Ok(false);
        }

        resolved_as = remove_locale(&remove_base_path(&resolved_as, &base), next_state.locale.as_deref());
        route = remove_trailing_slash(&pathname).to_string();

        let mut route_match: Option<Query> = None;
        if is_dynamic_route(&route) {
            let parsed_as = parse_relative_url(&resolved_as, None, &location)?;
            let as_pathname = parsed_as.pathname.clone();
            let regex = self.route_regex(&route)?;
            route_match = regex.match_path(&as_pathname);
            let should_interpolate = route == as_pathname;
            let interpolated =
                should_interpolate.then(|| interpolate_with(&regex, &as_pathname, &query));

            let failed = interpolated.as_ref().is_some_and(|i| i.result.is_none());
            if route_match.is_none() || failed {
                let missing: Vec<String> = regex
                    .groups()
                    .iter()
                    .filter(|(name, group)| !group.optional && is_missing(query.get(name)))
                    .map(|(name, _)| name.clone())
                    .collect();

                if !missing.is_empty() && !is_middleware_match {
                    warn_log!(
                        "Route '{}' is missing params for '{}': {}",
                        route,
                        as_pathname,
                        missing.join(", ")
                    );
                    return Err(if should_interpolate {
                        RouterError::MissingRouteParams {
                            href: url,
                            missing,
                            interpolating: true,
                        }
                    } else {
                        RouterError::IncompatibleHref {
                            as_path: as_pathname,
                            route,
                        }
                    });
                }
            } else if let Some(interpolation) = interpolated {
                let mut out = parsed_as;
                out.pathname = interpolation.result.unwrap_or_default();
                out.set_query(query.without(&interpolation.params));
                as_path = format_url(&out);
            } else if let Some(matched) = &route_match {
                query.extend(matched);
            }
        }

        if !is_query_updating {
            info_log!("Navigating to '{}'", as_path);
            self.events
                .emit_kind(RouterEventKind::RouteChangeStart, &as_path, shallow);
        }

        let (is_error_route, is_fallback) = {
            let state = self.state.borrow();
            (
                state.pathname == "/404" || state.pathname == "/_error",
                state.is_fallback,
            )
        };

        let resolution = self
            .get_route_info(RouteInfoRequest {
                route: route.clone(),
                pathname: pathname.clone(),
                query: query.clone(),
                as_path: as_path.clone(),
                resolved_as: resolved_as.clone(),
                shallow,
                locale: next_state.locale.clone(),
                is_preview: next_state.is_preview,
                has_middleware: is_middleware_match,
                skip_client_cache: options.unstable_skip_client_cache,
                is_query_updating: is_query_updating && !is_fallback,
                is_middleware_rewrite,
                is_not_found: false,
            })
            .await?;

        let mut route_info = match resolution {
            Resolution::Info(info) => info,
            Resolution::Redirect(MiddlewareEffect::RedirectInternal { new_url, new_as }) => {
                self.in_flight_route.borrow_mut().take();
                return Rc::clone(&self)
                    .transition(method, new_url, new_as, options, None, depth + 1)
                    .await;
            }
            Resolution::Redirect(MiddlewareEffect::RedirectExternal { destination }) => {
                self.hard_navigate(&destination)?;
                return hang().await;
            }
            Resolution::Redirect(_) => {
                return Err(RouterError::UnexpectedMiddlewareEffect { route });
            }
        };

        if is_middleware_match {
            pathname = route_info.route.clone();
            route = pathname.clone();
            if !shallow {
                let mut merged = route_info.query.clone();
                merged.extend(&query);
                query = merged;
            }

            let cleaned_parsed_pathname = remove_base_path(&parsed.pathname, &base);
            if let Some(matched) = &route_match {
                if pathname != cleaned_parsed_pathname {
                    for (key, value) in matched.iter() {
                        if query.get(key) == Some(value) {
                            query.remove(key);
                        }
                    }
                }
            }

            if is_dynamic_route(&pathname) {
                let prefixed_as = if !shallow && !route_info.resolved_as.is_empty() {
                    route_info.resolved_as.clone()
                } else {
                    let as_pathname = location
                        .join(&as_path)
                        .map_or_else(|| as_path.clone(), |url| url.pathname().to_string());
                    add_base_path(
                        &add_locale(&as_pathname, next_state.locale.as_deref(), None),
                        &self.config,
                    )
                };

                let mut rewrite_as = remove_base_path(&prefixed_as, &base);
                if self.config.i18n.is_some() {
                    let detected = normalize_locale_path(&rewrite_as, self.config.locales());
                    if let Some(locale) = detected.detected_locale {
                        next_state.locale = Some(locale);
                    }
                    rewrite_as = detected.pathname;
                }
                let rewrite_pathname = location
                    .join(&rewrite_as)
                    .map_or(rewrite_as, |url| url.pathname().to_string());
                if let Some(params) = self.route_regex(&pathname)?.match_path(&rewrite_pathname) {
                    query.extend(&params);
                }
            }
        }

        if route_info.flags.static_data || route_info.flags.server_data {
            if let Some(destination) = route_info.redirect_destination().map(str::to_string) {
                options.locale = LocaleOption::Default;
                if destination.starts_with('/') && route_info.redirect_keeps_base_path() {
                    debug_log!("Page data redirects '{}' to '{}'", as_path, destination);
                    let prepared = self.prepare(&destination, Some(destination.as_str()));
                    self.in_flight_route.borrow_mut().take();
                    return Rc::clone(&self)
                        .transition(method, prepared.url, prepared.as_path, options, None, depth + 1)
                        .await;
                }
                self.hard_navigate(&destination)?;
                return hang().await;
            }

            next_state.is_preview = route_info.is_preview();

            if route_info.not_found {
                let not_found_route = match self.fetch_component("/404").await {
                    Ok(_) => "/404",
                    Err(err) => {
                        debug_log!("No 404 view, using the error view: {}", err);
                        "/_error"
                    }
                };
                pathname = not_found_route.to_string();
                route = not_found_route.to_string();

                let resolution = self
                    .get_route_info(RouteInfoRequest {
                        route: route.clone(),
                        pathname: pathname.clone(),
                        query: query.clone(),
                        as_path: as_path.clone(),
                        resolved_as: resolved_as.clone(),
                        shallow: false,
                        locale: next_state.locale.clone(),
                        is_preview: next_state.is_preview,
                        is_not_found: true,
                        ..Default::default()
                    })
                    .await?;
                route_info = match resolution {
                    Resolution::Info(info) => info,
                    Resolution::Redirect(_) => {
                        return Err(RouterError::UnexpectedMiddlewareEffect {
                            route: not_found_route.to_string(),
                        });
                    }
                };
            }
        }

        let is_valid_shallow_route = shallow && next_state.route == route_info.route;
        let should_scroll = options
            .scroll
            .unwrap_or(!is_query_updating && !is_valid_shallow_route);
        let reset_scroll = should_scroll.then_some(ScrollTarget { x: 0.0, y: 0.0 });
        let upcoming_scroll = forced_scroll.or(reset_scroll);

        let upcoming_state = RouterState {
            route: route.clone(),
            pathname: pathname.clone(),
            query: query.clone(),
            as_path: cleaned_as.clone(),
            is_fallback: false,
            ..next_state.clone()
        };

        if is_query_updating && is_error_route {
            let current = self.state.borrow().pathname.clone();
            let resolution = self
                .get_route_info(RouteInfoRequest {
                    route: current.clone(),
                    pathname: current.clone(),
                    query,
                    as_path: as_path.clone(),
                    resolved_as,
                    shallow: false,
                    locale: next_state.locale.clone(),
                    is_preview: next_state.is_preview,
                    is_query_updating: !is_fallback,
                    ..Default::default()
                })
                .await?;
            let Resolution::Info(info) = resolution else {
                return Err(RouterError::UnexpectedMiddlewareEffect { route: current });
            };
            self.set(upcoming_state, Some(info), upcoming_scroll).await?;
            return Ok(true);
        }

        if !self.sequence.is_current(navigation) {
            debug_log!("Transition to '{}' was superseded", as_path);
            return Ok(false);
        }

        self.events
            .emit_kind(RouterEventKind::BeforeHistoryChange, &as_path, shallow);
        self.change_state(method, &url, &as_path, &options);

        let can_skip_updating = is_query_updating
            && upcoming_scroll.is_none()
            && !ready_state_change
            && !locale_change
            && upcoming_state == *self.state.borrow();

        if can_skip_updating {
            trace_log!("Query update for '{}' changed nothing", as_path);
            *self.state.borrow_mut() = upcoming_state;
            return Ok(true);
        }

        let mut carried = route_info.error.clone();
        if let Err(err) = self
            .set(upcoming_state, Some(Rc::clone(&route_info)), upcoming_scroll)
            .await
        {
            if !err.is_cancelled() {
                return Err(err);
            }
            carried = carried.or(Some(err));
        }

        if let Some(err) = carried {
            if err.is_cancelled() && !is_query_updating {
                self.events.emit_error(&err, &cleaned_as, shallow);
            }
            return Err(err);
        }

        if self.config.i18n.is_some() {
            if let Some(locale) = &next_state.locale {
                self.viewport.set_document_lang(locale);
            }
        }

        if !is_query_updating {
            info_log!("Navigation to '{}' complete", as_path);
            self.events
                .emit_kind(RouterEventKind::RouteChangeComplete, &as_path, shallow);
        }

        if should_scroll && split_hash(&as_path).1.is_some_and(|hash| !hash.is_empty()) {
            self.scroll_to_hash(&as_path);
        }

        Ok(true)
    }

    /// Hard-navigate when the locale is not served here. `true` when the
    /// document is being replaced.
    fn leave_for_locale(
        &self,
        next_state: &RouterState,
        parsed_as: &ParsedUrl,
        as_path: &str,
        location: &Url,
    ) -> Result<bool> {
        let locale = next_state.locale.as_deref();

        if !locale.is_some_and(|locale| self.config.locales().iter().any(|l| l == locale)) {
            let mut target = parsed_as.clone();
            target.pathname = add_locale(&target.pathname, locale, None);
            warn_log!("Locale {:?} is not configured; loading a document", locale);
            self.hard_navigate(&format_url(&target))?;
            return Ok(true);
        }

        let Some(domain) = detect_domain_locale(self.config.domains(), None, locale) else {
            return Ok(false);
        };
        if !self.config.is_locale_domain || location.hostname() == domain.hostname() {
            return Ok(false);
        }

        let without_base = remove_base_path(as_path, &self.config.base_path);
        let prefix = if locale == Some(domain.default_locale.as_str()) {
            String::new()
        } else {
            format!("/{}", locale.unwrap_or_default())
        };
        let suffix = if without_base == "/" { "" } else { without_base.as_str() };
        let mut path = format!("{prefix}{suffix}");
        if path.is_empty() {
            path.push('/');
        }
        let scheme = if domain.http { "http" } else { "https" };
        let target = format!("{scheme}://{}{}", domain.domain, add_base_path(&path, &self.config));
        debug_log!("Locale {:?} is served by '{}'", locale, domain.domain);
        self.hard_navigate(&target)?;
        Ok(true)
    }

    // ========================================================================
    // Prefetch
    // ========================================================================

    async fn prefetch(&self, url: &str, as_path: &str, mut options: PrefetchOptions) -> Result<()> {
        let location = self.history.location();
        let mut url = url.to_string();
        let mut as_path = as_path.to_string();
        let mut parsed = parse_relative_url(&url, None, &location)?;
        let mut pathname = parsed.pathname.clone();
        let mut query = parsed.query.clone();
        let original_pathname = pathname.clone();

        if self.config.i18n.is_some() && options.locale == LocaleOption::Default {
            pathname = normalize_locale_path(&pathname, self.config.locales()).pathname;
            parsed.pathname = pathname.clone();
            url = format_with_query(&parsed, &query);

            let mut parsed_as = parse_relative_url(&as_path, None, &location)?;
            let detected = normalize_locale_path(&parsed_as.pathname, self.config.locales());
            parsed_as.pathname = detected.pathname;
            options.locale = detected
                .detected_locale
                .or_else(|| self.config.default_locale().map(str::to_string))
                .map_or(LocaleOption::Inherit, LocaleOption::Tag);
            as_path = format_url(&parsed_as);
        }

        let pages = self.loader.page_list().await?;
        let mut resolved_as = as_path.clone();
        let locale = match &options.locale {
            LocaleOption::Inherit => self.state.borrow().locale.clone(),
            LocaleOption::Default => None,
            LocaleOption::Tag(tag) => Some(tag.clone()),
        };
        let current_locale = self.state.borrow().locale.clone();

        let is_middleware_match = self.matches_middleware(&as_path, locale.as_deref()).await;
        let rewrites = self.compiled_rewrites().await;

        if self.config.has_rewrites && as_path.starts_with('/') {
            let target = add_base_path(&add_locale(&as_path, current_locale.as_deref(), None), &self.config);
            let ctx = RewriteContext {
                pages: &pages,
                locales: self.config.locales(),
                base_path: &self.config.base_path,
                request: &self.config.request,
                location: &location,
            };
            let result = {
                let mut regexes = self.regexes.borrow_mut();
                resolve_rewrites(&target, &rewrites, &mut query, &ctx, &mut |path| {
                    resolve_dynamic_route(path, &pages, &mut regexes)
                })?
            };
            if result.external_dest {
                return Ok(());
            }
            if !is_middleware_match {
                resolved_as = remove_locale(
                    &remove_base_path(&result.as_path, &self.config.base_path),
                    current_locale.as_deref(),
                );
            }
            if let Some(href) = result.resolved_href.filter(|_| result.matched_page) {
                pathname = href;
                parsed.pathname = pathname.clone();
                if !is_middleware_match {
                    url = format_with_query(&parsed, &query);
                }
            }
        }

        parsed.pathname = resolve_dynamic_route(&parsed.pathname, &pages, &mut self.regexes.borrow_mut());
        if is_dynamic_route(&parsed.pathname) {
            pathname = parsed.pathname.clone();
            let as_pathname = PathnameInfo::parse(&as_path, &self.config, false).pathname;
            if let Some(params) = self.route_regex(&pathname)?.match_path(&as_pathname) {
                query.extend(&params);
            }
            if !is_middleware_match {
                url = format_with_query(&parsed, &query);
            }
        }

        let mut original = ParsedUrl {
            pathname: original_pathname,
            ..Default::default()
        };
        original.set_query(query.clone());
        let original_href = format_url(&original);
        let params = FetchDataParams {
            data_href: self.loader.data_href(&DataHrefParams {
                href: &original_href,
                as_path: &resolved_as,
                locale: locale.as_deref(),
                ssg: false,
                rsc: false,
                skip_interpolation: true,
            }),
            has_middleware: true,
            is_server_render: self.is_ssr.get(),
            parse_json: true,
            persist_cache: !self.state.borrow().is_preview,
            is_prefetch: true,
            ..Default::default()
        };
        let ctx = EffectContext {
            config: &self.config,
            location: &location,
            pages: &pages,
            rewrites: &rewrites,
            regexes: &self.regexes,
        };
        let data = with_middleware_effects(
            is_middleware_match,
            || self.data_cache.fetch_data(params, &location),
            &ctx,
        )
        .await;

        match data.as_ref().map(|data| &data.effect) {
            Some(MiddlewareEffect::Rewrite {
                resolved_href,
                parsed_as,
            }) => {
                parsed.pathname = resolved_href.clone();
                pathname = resolved_href.clone();
                query.extend(&parsed_as.query);
                resolved_as = parsed_as.pathname.clone();
                url = format_with_query(&parsed, &query);
            }
            Some(MiddlewareEffect::RedirectExternal { .. }) => return Ok(()),
            _ => {}
        }

        let route = remove_trailing_slash(&pathname).to_string();
        trace_log!("Prefetching route '{}' for '{}'", route, as_path);

        let warm_data = async {
            if !self.loader.is_ssg(&route).await {
                return;
            }
            let data_href = match data.as_ref().filter(|data| data.data.json.is_some()) {
                Some(data) => data.data.data_href.clone(),
                None => self.loader.data_href(&DataHrefParams {
                    href: &url,
                    as_path: &resolved_as,
                    locale: locale.as_deref(),
                    ssg: true,
                    rsc: false,
                    skip_interpolation: false,
                }),
            };
            let params = FetchDataParams {
                data_href,
                is_server_render: false,
                parse_json: true,
                persist_cache: !self.state.borrow().is_preview,
                is_prefetch: true,
                skip_client_cache: options.unstable_skip_client_cache,
                ..Default::default()
            };
            if let Err(err) = self.data_cache.fetch_data(params, &location).await {
                debug_log!("Prefetching data for '{}' failed: {}", route, err);
            }
        };
        let load_code = async {
            if options.priority {
                self.loader.load_page(&route).await.map(|_| ())
            } else {
                self.loader.prefetch(&route).await
            }
        };
        let ((), loaded) = futures::join!(warm_data, load_code);
        loaded
    }
}

/// Format `parsed`, taking the query from `query` unless a raw search is set.
fn format_with_query(parsed: &ParsedUrl, query: &Query) -> String {
    if !parsed.search.is_empty() {
        return format_url(parsed);
    }
    let mut url = parsed.clone();
    url.query = query.clone();
    format_url(&url)
}

fn split_hash(path: &str) -> (&str, Option<&str>) {
    let mut parts = path.splitn(3, '#');
    let url = parts.next().unwrap_or_default();
    (url, parts.next())
}

fn is_missing(value: Option<&QueryValue>) -> bool {
    match value {
        None => true,
        Some(QueryValue::Single(value)) => value.is_empty(),
        Some(QueryValue::Multi(_)) => false,
    }
}

// ============================================================================
// Router
// ============================================================================

/// Handle to the navigation engine.
///
/// Clones share one engine. The engine is single-threaded; drive it from one
/// executor.
#[derive(Clone, Debug)]
pub struct Router {
    inner: Rc<RouterInner>,
}

impl Router {
    /// Start building a router for the server-rendered `initial` page.
    pub fn builder(config: RouterConfig, initial: InitialPage, view: View) -> RouterBuilder {
        RouterBuilder::new(config, initial, view)
    }

    /// Reconcile the current history entry with the engine.
    ///
    /// Call once after construction.
    pub async fn start(&self) {
        let inner = &self.inner;
        if inner.initial_as.starts_with("//") {
            return;
        }

        let (pathname, query, locale) = {
            let state = inner.state.borrow();
            (state.pathname.clone(), state.query.clone(), state.locale.clone())
        };
        let current = inner.history.location().path_and_rest();
        let matches = inner.matches_middleware(&current, locale.as_deref()).await;

        let options = TransitionOptions {
            locale: locale.map_or(LocaleOption::Inherit, LocaleOption::Tag),
            should_resolve_href: inner.initial_as != pathname,
            ..Default::default()
        };
        let url = if matches {
            current.clone()
        } else {
            let mut parsed = ParsedUrl {
                pathname: add_base_path(&pathname, &inner.config),
                ..Default::default()
            };
            parsed.set_query(query);
            format_url(&parsed)
        };
        inner.change_state(HistoryMethod::Replace, &url, &current, &options);
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    /// Navigate to `url`, shown as `as_path`, with a new history entry.
    ///
    /// Resolves to `false` when the transition was abandoned.
    pub async fn push(&self, url: &str, as_path: Option<&str>, options: TransitionOptions) -> Result<bool> {
        if self.inner.config.scroll_restoration {
            let key = self.inner.key.borrow().clone();
            self.inner.scroll.save(&key, self.inner.viewport.scroll_offset());
        }
        let PreparedUrlAs { url, as_path } = self.inner.prepare(url, as_path);
        Rc::clone(&self.inner)
            .change(HistoryMethod::Push, url, as_path, options, None)
            .await
    }

    /// Navigate to `url` replacing the current history entry.
    pub async fn replace(&self, url: &str, as_path: Option<&str>, options: TransitionOptions) -> Result<bool> {
        let PreparedUrlAs { url, as_path } = self.inner.prepare(url, as_path);
        Rc::clone(&self.inner)
            .change(HistoryMethod::Replace, url, as_path, options, None)
            .await
    }

    /// Reload the current document.
    pub fn reload(&self) {
        self.inner.history.reload();
    }

    /// Go one entry back in history.
    pub fn back(&self) {
        self.inner.history.back();
    }

    /// Go one entry forward in history.
    pub fn forward(&self) {
        self.inner.history.forward();
    }

    /// Warm caches for a likely navigation. Failures are logged, never
    /// reported.
    pub async fn prefetch(&self, url: &str, as_path: Option<&str>, options: PrefetchOptions) {
        if self.inner.config.is_development() {
            trace_log!("Prefetch of '{}' skipped in development", url);
            return;
        }
        let as_path = as_path.unwrap_or(url);
        if let Err(err) = self.inner.prefetch(url, as_path, options).await {
            debug_log!("Prefetch of '{}' failed: {}", url, err);
        }
    }

    /// Register a callback that can veto history restorations.
    pub fn before_pop_state<F>(&self, callback: F)
    where
        F: Fn(&HistoryState) -> bool + 'static,
    {
        *self.inner.before_pop_state.borrow_mut() = Some(Rc::new(callback));
    }

    /// Handle a browser `popstate` carrying `state`.
    pub async fn on_pop_state(&self, state: Option<Value>) -> Result<bool> {
        let inner = &self.inner;
        let is_first = inner.is_first_pop_state.replace(false);

        let entry = match PoppedEntry::classify(state.as_ref()) {
            PoppedEntry::Missing => {
                let (pathname, query) = {
                    let state = inner.state.borrow();
                    (state.pathname.clone(), state.query.clone())
                };
                let mut parsed = ParsedUrl {
                    pathname: add_base_path(&pathname, &inner.config),
                    ..Default::default()
                };
                parsed.set_query(query);
                let current = inner.history.location().path_and_rest();
                inner.change_state(
                    HistoryMethod::Replace,
                    &format_url(&parsed),
                    &current,
                    &TransitionOptions::default(),
                );
                return Ok(false);
            }
            PoppedEntry::ForeignConsumer => {
                debug_log!("History entry belongs to another router; reloading");
                inner.history.reload();
                return Ok(false);
            }
            PoppedEntry::Unmarked => return Ok(false),
            PoppedEntry::Engine(entry) => entry,
        };

        {
            let state = inner.state.borrow();
            if is_first && state.locale.as_deref() == entry.options.locale.tag() && entry.as_path == state.as_path {
                trace_log!("Ignoring initial popstate for '{}'", entry.as_path);
                return Ok(false);
            }
        }

        let mut forced_scroll = None;
        if inner.config.scroll_restoration {
            let current_key = inner.key.borrow().clone();
            if current_key != entry.key {
                inner.scroll.save(&current_key, inner.viewport.scroll_offset());
                forced_scroll = Some(inner.scroll.restore(&entry.key));
            }
        }
        *inner.key.borrow_mut() = entry.key.clone();

        let location = inner.history.location();
        let entry_pathname = parse_relative_url(&entry.url, None, &location)?.pathname;
        if inner.is_ssr.get() {
            let state = inner.state.borrow();
            if entry.as_path == add_base_path(&state.as_path, &inner.config)
                && entry_pathname == add_base_path(&state.pathname, &inner.config)
            {
                return Ok(false);
            }
        }

        let veto = inner.before_pop_state.borrow().clone();
        if let Some(callback) = veto {
            if !callback(&entry) {
                debug_log!("Restoration of '{}' vetoed", entry.as_path);
                return Ok(false);
            }
        }

        let locale = match &entry.options.locale {
            LocaleOption::Tag(tag) => LocaleOption::Tag(tag.clone()),
            _ => inner
                .config
                .default_locale()
                .map_or(LocaleOption::Inherit, |locale| LocaleOption::Tag(locale.to_string())),
        };
        let options = TransitionOptions {
            shallow: entry.options.shallow && inner.last_shallow.get(),
            locale,
            query_update: false,
            ..entry.options.clone()
        };
        Rc::clone(inner)
            .change(HistoryMethod::Replace, entry.url, entry.as_path, options, forced_scroll)
            .await
    }

    /// Whether middleware runs for `as_path` in `locale`.
    pub async fn matches_middleware(&self, as_path: &str, locale: Option<&str>) -> bool {
        self.inner.matches_middleware(as_path, locale).await
    }

    // ========================================================================
    // State
    // ========================================================================

    /// Navigation event bus.
    pub fn events(&self) -> &RouterEvents {
        &self.inner.events
    }

    /// Snapshot of the committed state.
    pub fn state(&self) -> RouterState {
        self.inner.state.borrow().clone()
    }

    /// Route pattern of the current page, e.g. `/blog/[slug]`.
    pub fn route(&self) -> String {
        self.inner.state.borrow().route.clone()
    }

    /// Page path, without base path or locale.
    pub fn pathname(&self) -> String {
        self.inner.state.borrow().pathname.clone()
    }

    /// Search parameters merged with dynamic route parameters.
    pub fn query(&self) -> Query {
        self.inner.state.borrow().query.clone()
    }

    /// Path shown in the address bar, without base path or locale.
    pub fn as_path(&self) -> String {
        self.inner.state.borrow().as_path.clone()
    }

    /// Active locale; `None` without i18n.
    pub fn locale(&self) -> Option<String> {
        self.inner.state.borrow().locale.clone()
    }

    /// Configured locales.
    pub fn locales(&self) -> &[String] {
        self.inner.config.locales()
    }

    pub fn default_locale(&self) -> Option<&str> {
        self.inner.config.default_locale()
    }

    /// The page is rendering its fallback while data loads.
    pub fn is_fallback(&self) -> bool {
        self.inner.state.borrow().is_fallback
    }

    /// Preview mode data is shown.
    pub fn is_preview(&self) -> bool {
        self.inner.state.borrow().is_preview
    }

    /// Whether the query reflects the URL.
    pub fn is_ready(&self) -> bool {
        self.inner.is_ready.get()
    }

    /// Prefix the site is mounted under.
    pub fn base_path(&self) -> &str {
        &self.inner.config.base_path
    }

    pub fn config(&self) -> &RouterConfig {
        &self.inner.config
    }

    /// Route info resolved for `route`, if any.
    pub fn route_info(&self, route: &str) -> Option<Rc<RouteInfo>> {
        self.inner.components.borrow().get(route).cloned()
    }

    /// Key of the current history entry.
    pub fn history_key(&self) -> String {
        self.inner.key.borrow().clone()
    }
}

// ============================================================================
// RouterBuilder
// ============================================================================

/// Assembles a [`Router`] from its collaborators.
pub struct RouterBuilder {
    config: RouterConfig,
    initial: InitialPage,
    view: View,
    loader: Option<Rc<dyn PageLoader>>,
    manifest: Option<Rc<dyn ManifestProvider>>,
    fetcher: Option<Rc<dyn Fetcher>>,
    history: Option<Rc<dyn BrowserHistory>>,
    viewport: Option<Rc<dyn Viewport>>,
    props: Rc<dyn PropsProvider>,
    subscriber: Option<Rc<dyn RouteSubscriber>>,
    spawner: Option<Rc<dyn LocalSpawn>>,
}

impl fmt::Debug for RouterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterBuilder")
            .field("config", &self.config)
            .field("page", &self.initial.page)
            .finish()
    }
}

impl RouterBuilder {
    /// Start with no collaborators; see [`Router::builder`].
    pub fn new(config: RouterConfig, initial: InitialPage, view: View) -> Self {
        Self {
            config,
            initial,
            view,
            loader: None,
            manifest: None,
            fetcher: None,
            history: None,
            viewport: None,
            props: Rc::new(EmptyProps),
            subscriber: None,
            spawner: None,
        }
    }

    /// Page modules, page list, and data URLs. Required.
    pub fn with_loader(mut self, loader: Rc<dyn PageLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Source of the client build manifest (rewrites). Required.
    pub fn with_manifest(mut self, manifest: Rc<dyn ManifestProvider>) -> Self {
        self.manifest = Some(manifest);
        self
    }

    /// Network access for page data. Required.
    pub fn with_fetcher(mut self, fetcher: Rc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Browser history and location. Required.
    pub fn with_history(mut self, history: Rc<dyn BrowserHistory>) -> Self {
        self.history = Some(history);
        self
    }

    /// Scrolling and document language. Required.
    pub fn with_viewport(mut self, viewport: Rc<dyn Viewport>) -> Self {
        self.viewport = Some(viewport);
        self
    }

    /// Initial props for views without a data route. Defaults to
    /// [`EmptyProps`].
    pub fn with_props(mut self, props: Rc<dyn PropsProvider>) -> Self {
        self.props = props;
        self
    }

    /// Receives every committed route. Required.
    pub fn with_subscriber(mut self, subscriber: Rc<dyn RouteSubscriber>) -> Self {
        self.subscriber = Some(subscriber);
        self
    }

    /// Executor for background revalidation. Without one, no background
    /// work is started.
    pub fn with_spawner(mut self, spawner: Rc<dyn LocalSpawn>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Validate the config and assemble the router.
    ///
    /// Fails with [`RouterError::Config`] when a required collaborator is
    /// missing or the config is invalid.
    pub fn build(self) -> Result<Router> {
        self.config.validate()?;

        let loader = self.loader.ok_or_else(|| missing("page loader"))?;
        let manifest = self.manifest.ok_or_else(|| missing("manifest provider"))?;
        let fetcher = self.fetcher.ok_or_else(|| missing("fetcher"))?;
        let history = self.history.ok_or_else(|| missing("history"))?;
        let viewport = self.viewport.ok_or_else(|| missing("viewport"))?;
        let subscriber = self.subscriber.ok_or_else(|| missing("route subscriber"))?;

        let config = self.config;
        let initial = self.initial;
        let production = !config.is_development();
        let attempts = config.data_fetch_attempts;

        let route = remove_trailing_slash(&initial.page).to_string();
        let auto_export_dynamic = is_dynamic_route(&initial.page) && initial.auto_export;
        let as_path = if auto_export_dynamic {
            initial.page.clone()
        } else {
            initial.as_path.clone()
        };

        let mut components = HashMap::new();
        if initial.page != "/_error" {
            components.insert(
                route.clone(),
                Rc::new(RouteInfo {
                    kind: RouteInfoKind::Initial,
                    view: self.view,
                    styles: Vec::new(),
                    flags: DataFlags {
                        static_data: initial.gsp,
                        server_data: initial.gssp,
                        streamed_data: false,
                    },
                    props: normalize_props(initial.props.clone()),
                    route: route.clone(),
                    query: initial.query.clone(),
                    resolved_as: as_path.clone(),
                    not_found: false,
                    error: None,
                }),
            );
        }

        let locale = if config.i18n.is_some() {
            initial.locale.clone()
        } else {
            None
        };
        let is_ready = initial.is_ready(&history.location().search(), config.has_rewrites);

        debug_log!(
            "Router starting on '{}' (route '{}', ready: {})",
            as_path,
            route,
            is_ready
        );

        let inner = RouterInner {
            data_cache: DataCache::new("data", Rc::clone(&fetcher), production, attempts),
            background_cache: DataCache::new("background", fetcher, production, attempts),
            state: RefCell::new(RouterState {
                route,
                pathname: initial.page.clone(),
                query: initial.query.clone(),
                as_path,
                locale,
                is_fallback: initial.is_fallback,
                is_preview: initial.is_preview,
            }),
            components: RefCell::new(components),
            regexes: RefCell::new(RouteRegexCache::new()),
            rewrites: RefCell::new(Rc::new(RewriteTable::default().compile(config.trailing_slash))),
            middleware: RefCell::new(None),
            events: RouterEvents::new(),
            clc: RefCell::new(None),
            in_flight_route: RefCell::new(None),
            in_flight_query_update: Cell::new(false),
            sequence: NavigationSequence::new(),
            is_ssr: Cell::new(true),
            is_first_pop_state: Cell::new(true),
            is_ready: Cell::new(is_ready),
            last_shallow: Cell::new(false),
            key: RefCell::new(create_key()),
            before_pop_state: RefCell::new(None),
            scroll: ScrollRestoration::new(),
            initial_props: initial.props,
            initial_as: initial.as_path,
            config,
            loader,
            manifest,
            history,
            viewport,
            props: self.props,
            subscriber,
            spawner: self.spawner,
        };

        Ok(Router {
            inner: Rc::new(inner),
        })
    }
}

fn missing(what: &str) -> RouterError {
    RouterError::Config {
        message: format!("no {what} configured"),
    }
}
