//! Route info resolution: view, data, and props for one route.
//!
//! # Flow
//!
//! ```text
//! request ──► shallow + cached? ──► reuse
//!    │
//!    ├─ middleware fetch ──► redirect effect ──► Resolution::Redirect
//!    │                  └──► rewrite effect  ──► switch route, re-check cache
//!    │
//!    ├─ load view (cached outside development unless middleware is involved)
//!    ├─ data: static / server / streamed, or initial props
//!    └─ store per route ──► Resolution::Info
//! ```
//!
//! Errors end in [`RouterInner::handle_route_info_error`]: cancellation is
//! passed through, asset failures become a hard navigation, everything else
//! renders the `/_error` view with the error attached.

use crate::error::{Result, RouterError};
use crate::fetch::FetchDataParams;
use crate::middleware::{with_middleware_effects, EffectContext, MiddlewareEffect};
use crate::page::{DataFlags, DataHrefParams, PageModule, PropsContext, StyleSheet, View};
use crate::params::Query;
use crate::path::{normalize_locale_path, remove_base_path, remove_trailing_slash};
use crate::router::RouterInner;
use crate::state::CancellationToken;
use crate::{debug_log, error_log, trace_log};
use serde_json::{Map, Value};
use std::rc::Rc;

// ============================================================================
// Types
// ============================================================================

/// Where a [`RouteInfo`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteInfoKind {
    /// Seeded from the server-rendered page. Never reused for a transition.
    Initial,
    /// Resolved on the client.
    Complete,
}

/// Everything needed to render one route.
#[derive(Debug, Clone)]
pub struct RouteInfo {
    pub kind: RouteInfoKind,
    pub view: View,
    pub styles: Vec<StyleSheet>,
    pub flags: DataFlags,
    /// `{"pageProps": {…}, …}`; `pageProps` is always an object.
    pub props: Value,
    pub route: String,
    pub query: Query,
    pub resolved_as: String,
    /// The page data reported that the page does not exist.
    pub not_found: bool,
    /// Error rendered by the `/_error` view.
    pub error: Option<RouterError>,
}

impl RouteInfo {
    pub(crate) fn complete(module: PageModule, route: &str) -> Self {
        Self {
            kind: RouteInfoKind::Complete,
            view: module.view,
            styles: module.styles,
            flags: module.flags,
            props: normalize_props(Value::Null),
            route: route.to_string(),
            query: Query::new(),
            resolved_as: String::new(),
            not_found: false,
            error: None,
        }
    }

    /// The `pageProps` object.
    pub fn page_props(&self) -> Option<&Map<String, Value>> {
        self.props.get("pageProps").and_then(Value::as_object)
    }

    /// Destination of a `__N_REDIRECT` page prop.
    pub fn redirect_destination(&self) -> Option<&str> {
        self.page_props()
            .and_then(|props| props.get("__N_REDIRECT"))
            .and_then(Value::as_str)
    }

    /// `__N_REDIRECT_BASE_PATH` is not explicitly `false`.
    pub fn redirect_keeps_base_path(&self) -> bool {
        self.page_props()
            .and_then(|props| props.get("__N_REDIRECT_BASE_PATH"))
            .and_then(Value::as_bool)
            != Some(false)
    }

    pub fn is_preview(&self) -> bool {
        self.props
            .get("__N_PREVIEW")
            .is_some_and(|v| !v.is_null() && v != &Value::Bool(false))
    }
}

/// Outcome of route info resolution.
#[derive(Debug, Clone)]
pub enum Resolution {
    Info(Rc<RouteInfo>),
    /// Middleware sent the navigation elsewhere.
    Redirect(MiddlewareEffect),
}

/// Make `props` an object whose `pageProps` is an object.
pub(crate) fn normalize_props(props: Value) -> Value {
    let mut props = match props {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    let page_props = match props.remove("pageProps") {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    props.insert("pageProps".to_string(), Value::Object(page_props));
    Value::Object(props)
}

/// Inputs of one route info resolution.
#[derive(Debug, Clone, Default)]
pub(crate) struct RouteInfoRequest {
    pub route: String,
    pub pathname: String,
    pub query: Query,
    pub as_path: String,
    pub resolved_as: String,
    pub shallow: bool,
    pub locale: Option<String>,
    pub is_preview: bool,
    pub has_middleware: bool,
    pub skip_client_cache: bool,
    pub is_query_updating: bool,
    pub is_middleware_rewrite: bool,
    pub is_not_found: bool,
}

/// Page data obtained before the view was known.
struct Prefetched {
    json: Value,
    cache_key: Option<String>,
    not_found: bool,
}

// ============================================================================
// Resolution
// ============================================================================

impl RouterInner {
    /// Install a fresh cancellation token and return a checker for it.
    ///
    /// The checker fails with [`RouterError::Cancelled`] once a newer
    /// transition cancelled the token, and releases the slot otherwise.
    pub(crate) fn cancel_handler(&self, route: &str) -> impl Fn() -> Result<()> + '_ {
        let token = CancellationToken::new();
        *self.clc.borrow_mut() = Some(token.clone());
        let route = route.to_string();
        move || {
            if token.is_cancelled() {
                return Err(RouterError::cancelled(route.clone()));
            }
            let mut slot = self.clc.borrow_mut();
            if slot.as_ref().is_some_and(|live| live.same_as(&token)) {
                *slot = None;
            }
            Ok(())
        }
    }

    /// Fail with [`RouterError::Cancelled`] once a newer transition started.
    fn ensure_current(&self, navigation: usize, route: &str) -> Result<()> {
        if self.sequence.is_current(navigation) {
            Ok(())
        } else {
            debug_log!("Route info for '{}' superseded", route);
            Err(RouterError::cancelled(route))
        }
    }

    /// Load the view module for `route`.
    pub(crate) async fn fetch_component(&self, route: &str) -> Result<PageModule> {
        let handle_cancelled = self.cancel_handler(route);
        let result = self.loader.load_page(route).await;
        handle_cancelled()?;
        result.map_err(|err| match err {
            RouterError::AssetLoad { .. } | RouterError::Network { .. } | RouterError::Cancelled { .. } => err,
            other => RouterError::AssetLoad {
                route: route.to_string(),
                message: other.to_string(),
            },
        })
    }

    pub(crate) async fn get_route_info(&self, request: RouteInfoRequest) -> Result<Resolution> {
        let pathname = request.pathname.clone();
        let query = request.query.clone();
        let as_path = request.as_path.clone();
        let shallow = request.shallow;

        match self.resolve_route_info(request).await {
            Ok(resolution) => Ok(resolution),
            Err(err) => self
                .handle_route_info_error(err, &pathname, &query, &as_path, shallow)
                .await
                .map(Resolution::Info),
        }
    }

    async fn resolve_route_info(&self, request: RouteInfoRequest) -> Result<Resolution> {
        let RouteInfoRequest {
            mut route,
            mut pathname,
            mut query,
            as_path,
            mut resolved_as,
            shallow,
            locale,
            is_preview,
            has_middleware,
            skip_client_cache,
            is_query_updating,
            is_middleware_rewrite,
            is_not_found,
        } = request;

        let navigation = self.sequence.current();
        let current_route = self.state.borrow().route.clone();
        let mut existing = self.components.borrow().get(&route).cloned();
        if shallow && current_route == route {
            if let Some(info) = existing {
                trace_log!("Shallow transition reuses route info for '{}'", route);
                return Ok(Resolution::Info(info));
            }
        }

        let handle_cancelled = self.cancel_handler(&route);
        if has_middleware {
            existing = None;
        }
        let cached = existing.filter(|info| {
            info.kind == RouteInfoKind::Complete && !self.config.is_development()
        });

        let lookup_as = if is_not_found {
            "/404".to_string()
        } else {
            resolved_as.clone()
        };
        let href = format_href(&pathname, &query);
        let data_params = FetchDataParams {
            data_href: self.loader.data_href(&DataHrefParams {
                href: &href,
                as_path: &lookup_as,
                locale: locale.as_deref(),
                ssg: false,
                rsc: false,
                skip_interpolation: true,
            }),
            has_middleware: true,
            is_server_render: self.is_ssr.get(),
            parse_json: true,
            persist_cache: !is_preview,
            is_prefetch: false,
            skip_client_cache,
            is_background: is_query_updating,
        };

        let mut middleware_data = None;
        if !is_query_updating || is_middleware_rewrite {
            let matches = self.matches_middleware(&lookup_as, locale.as_deref()).await;
            let pages = if matches {
                self.loader.page_list().await.unwrap_or_default()
            } else {
                Vec::new()
            };
            let rewrites = self.compiled_rewrites().await;
            let location = self.history.location();
            let cache = if is_query_updating {
                &self.background_cache
            } else {
                &self.data_cache
            };
            let ctx = EffectContext {
                config: &self.config,
                location: &location,
                pages: &pages,
                rewrites: &rewrites,
                regexes: &self.regexes,
            };
            middleware_data = with_middleware_effects(
                matches,
                || cache.fetch_data(data_params.clone(), &location),
                &ctx,
            )
            .await;
        }

        let mut effect = middleware_data.as_ref().map(|data| data.effect.clone());
        if pathname == "/_error" || pathname == "/404" {
            effect = None;
        }

        let mut prefetched = middleware_data.as_ref().and_then(|data| {
            if data.data.not_found {
                Some(Prefetched {
                    json: Value::Object(Map::new()),
                    cache_key: Some(data.data.cache_key.clone()),
                    not_found: true,
                })
            } else {
                data.data.json.clone().map(|json| Prefetched {
                    json,
                    cache_key: Some(data.data.cache_key.clone()),
                    not_found: false,
                })
            }
        });
        if is_query_updating {
            prefetched = Some(Prefetched {
                json: self.initial_props.clone(),
                cache_key: prefetched.and_then(|p| p.cache_key),
                not_found: false,
            });
        }

        handle_cancelled()?;

        match effect {
            Some(effect @ (MiddlewareEffect::RedirectInternal { .. } | MiddlewareEffect::RedirectExternal { .. })) => {
                debug_log!("Middleware redirects '{}': {:?}", as_path, effect);
                return Ok(Resolution::Redirect(effect));
            }
            Some(MiddlewareEffect::Rewrite {
                resolved_href,
                parsed_as,
            }) => {
                let resolved_route = remove_trailing_slash(&resolved_href).to_string();
                let pages = self.loader.page_list().await.unwrap_or_default();
                if !is_query_updating || pages.contains(&resolved_route) {
                    debug_log!("Middleware rewrites '{}' to route '{}'", as_path, resolved_route);
                    route = resolved_route;
                    pathname = resolved_href;
                    query.extend(&parsed_as.query);
                    resolved_as = remove_base_path(
                        &normalize_locale_path(&parsed_as.pathname, self.config.locales()).pathname,
                        &self.config.base_path,
                    );

                    let rewritten = self.components.borrow().get(&route).cloned();
                    if let Some(info) = rewritten {
                        if shallow && current_route == route && !has_middleware {
                            let mut info = (*info).clone();
                            info.route = route.clone();
                            return Ok(Resolution::Info(Rc::new(info)));
                        }
                    }
                }
            }
            Some(MiddlewareEffect::Next) | None => {}
        }

        if is_api_route(&route) {
            debug_log!("'{}' is an API route; loading it as a document", route);
            self.hard_navigate(&as_path)?;
            return crate::router::hang().await;
        }

        let mut info = match cached {
            Some(info) => (*info).clone(),
            None => RouteInfo::complete(self.fetch_component(&route).await?, &route),
        };

        let bailed_prefetch = middleware_data
            .as_ref()
            .is_some_and(|data| data.data.response.header("x-middleware-skip").is_some());
        if bailed_prefetch {
            if let Some(data) = &middleware_data {
                debug_log!("Middleware skipped data for '{}'; refetching", data.data.data_href);
                self.data_cache.evict(&data.data.cache_key);
            }
        }

        let should_fetch_data = info.flags.static_data || info.flags.server_data;
        let handle_data_cancelled = self.cancel_handler(&route);
        let (props, cache_key, not_found) = if should_fetch_data {
            match prefetched.filter(|_| !bailed_prefetch) {
                Some(prefetched) => (prefetched.json, prefetched.cache_key, prefetched.not_found),
                None => {
                    let location = self.history.location();
                    let data_href = match middleware_data.as_ref() {
                        Some(data) => data.data.data_href.clone(),
                        None => self.loader.data_href(&DataHrefParams {
                            href: &href,
                            as_path: &resolved_as,
                            locale: locale.as_deref(),
                            ssg: false,
                            rsc: false,
                            skip_interpolation: false,
                        }),
                    };
                    let params = FetchDataParams {
                        data_href,
                        has_middleware: false,
                        is_server_render: self.is_ssr.get(),
                        parse_json: true,
                        persist_cache: !is_preview,
                        is_prefetch: false,
                        skip_client_cache,
                        is_background: false,
                    };
                    let fetched = if bailed_prefetch {
                        self.data_cache.fetch_uncached(params, &location).await?
                    } else {
                        self.data_cache.fetch_data(params, &location).await?
                    };
                    (
                        fetched.json.clone().unwrap_or(Value::Null),
                        Some(fetched.cache_key.clone()),
                        fetched.not_found,
                    )
                }
            }
        } else {
            let ctx = PropsContext {
                pathname: pathname.clone(),
                query: query.clone(),
                as_path: as_path.clone(),
                locale: locale.clone(),
                locales: self.config.locales().to_vec(),
                default_locale: self.config.default_locale().map(str::to_string),
                err: None,
            };
            let props = self.props.initial_props(&info.view, &ctx).await?;
            (props, None, false)
        };
        handle_data_cancelled()?;

        if info.flags.server_data {
            if let Some(key) = &cache_key {
                trace_log!("Evicting one-shot data for '{}'", route);
                self.data_cache.evict(key);
            }
        }

        if !self.state.borrow().is_preview
            && info.flags.static_data
            && !self.config.is_development()
            && !is_query_updating
        {
            if let Some(spawner) = &self.spawner {
                self.background_cache.revalidate(
                    FetchDataParams {
                        is_background: true,
                        persist_cache: false,
                        ..data_params.clone()
                    },
                    &self.history.location(),
                    spawner.as_ref(),
                );
            }
        }

        let mut props = normalize_props(props);
        if info.flags.streamed_data {
            let flight = self.fetch_streamed(&route, &href, &resolved_as, locale.as_deref()).await?;
            self.ensure_current(navigation, &route)?;
            if let Value::Object(map) = &mut props {
                map.insert("__flight__".to_string(), Value::String(flight));
            }
        }

        info.kind = RouteInfoKind::Complete;
        info.props = props;
        info.route = route.clone();
        info.query = query;
        info.resolved_as = resolved_as;
        info.not_found = not_found;
        info.error = None;

        self.ensure_current(navigation, &route)?;
        let info = Rc::new(info);
        self.components
            .borrow_mut()
            .insert(route, Rc::clone(&info));
        Ok(Resolution::Info(info))
    }

    /// Fetch the streamed payload of `route`; never cached.
    async fn fetch_streamed(
        &self,
        route: &str,
        href: &str,
        resolved_as: &str,
        locale: Option<&str>,
    ) -> Result<String> {
        let data_href = self.loader.data_href(&DataHrefParams {
            href,
            as_path: resolved_as,
            locale,
            ssg: false,
            rsc: true,
            skip_interpolation: false,
        });
        trace_log!("Fetching streamed payload for '{}'", route);
        let params = FetchDataParams {
            data_href,
            is_server_render: self.is_ssr.get(),
            parse_json: false,
            persist_cache: false,
            ..Default::default()
        };
        let fetched = self
            .data_cache
            .fetch_data(params, &self.history.location())
            .await?;
        Ok(fetched.text.clone())
    }

    /// Recover from a route info failure.
    pub(crate) async fn handle_route_info_error(
        &self,
        err: RouterError,
        pathname: &str,
        query: &Query,
        as_path: &str,
        shallow: bool,
    ) -> Result<Rc<RouteInfo>> {
        if err.is_cancelled() {
            return Err(err);
        }
        if err.is_asset_error() {
            return Err(self.abandon_to_document(&err, as_path, shallow));
        }

        error_log!("Error resolving '{}': {}", as_path, err);
        let module = match self.fetch_component("/_error").await {
            Ok(module) => module,
            Err(load_err) if load_err.is_cancelled() => return Err(load_err),
            Err(load_err) => {
                error_log!("Failed to load the error view: {}", load_err);
                return Err(self.abandon_to_document(&load_err, as_path, shallow));
            }
        };

        let mut info = RouteInfo::complete(module, "/_error");
        let ctx = PropsContext {
            pathname: pathname.to_string(),
            query: query.clone(),
            as_path: as_path.to_string(),
            locale: self.state.borrow().locale.clone(),
            locales: self.config.locales().to_vec(),
            default_locale: self.config.default_locale().map(str::to_string),
            err: Some(err.clone()),
        };
        info.props = match self.props.initial_props(&info.view, &ctx).await {
            Ok(props) => normalize_props(props),
            Err(props_err) => {
                error_log!("Error in error page initial props: {}", props_err);
                normalize_props(Value::Null)
            }
        };
        info.query = query.clone();
        info.error = Some(err);
        Ok(Rc::new(info))
    }

    /// Report `err`, load `as_path` as a document, and cancel the transition.
    fn abandon_to_document(&self, err: &RouterError, as_path: &str, shallow: bool) -> RouterError {
        self.events.emit_error(err, as_path, shallow);
        match self.hard_navigate(as_path) {
            Ok(()) => RouterError::cancelled(as_path),
            Err(nav_err) => nav_err,
        }
    }
}

fn format_href(pathname: &str, query: &Query) -> String {
    let search = query.to_query_string();
    if search.is_empty() {
        pathname.to_string()
    } else {
        format!("{pathname}?{search}")
    }
}

fn is_api_route(route: &str) -> bool {
    route == "/api" || route.starts_with("/api/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_props() {
        assert_eq!(normalize_props(Value::Null), json!({ "pageProps": {} }));
        assert_eq!(
            normalize_props(json!({ "pageProps": 3, "x": 1 })),
            json!({ "pageProps": {}, "x": 1 })
        );
        assert_eq!(
            normalize_props(json!({ "pageProps": { "a": 1 } })),
            json!({ "pageProps": { "a": 1 } })
        );
    }

    #[test]
    fn test_redirect_props() {
        let mut info = RouteInfo::complete(PageModule::new(View::named("a")), "/a");
        info.props = json!({ "pageProps": { "__N_REDIRECT": "/login", "__N_REDIRECT_BASE_PATH": false }, "__N_PREVIEW": true });
        assert_eq!(info.redirect_destination(), Some("/login"));
        assert!(!info.redirect_keeps_base_path());
        assert!(info.is_preview());
    }

    #[test]
    fn test_api_route() {
        assert!(is_api_route("/api"));
        assert!(is_api_route("/api/users"));
        assert!(!is_api_route("/apis"));
    }

    #[test]
    fn test_format_href() {
        let query: Query = [("id", "7")].into_iter().collect();
        assert_eq!(format_href("/p/[id]", &query), "/p/[id]?id=7");
        assert_eq!(format_href("/", &Query::new()), "/");
    }
}
