//! Page-data fetching and the in-flight data cache.
//!
//! [`DataCache`] keys requests by absolute data URL and shares one future
//! between every caller that asks for the same URL while it is in flight.
//! Whether the settled entry stays around depends on the request:
//!
//! | Outcome | Entry kept when |
//! |---------|-----------------|
//! | success | production build, `persist_cache` set, and no `x-middleware-cache: no-cache` |
//! | failure | never (unless the request bypassed the cache) |
//!
//! The engine owns three caches: the main one, one for background
//! revalidation checks (`HEAD` requests whose failures are ignored), and the
//! RouteInfo cache in [`crate::router`].

use crate::error::{Result, RouterError};
use crate::url::Url;
use crate::{debug_log, trace_log};
use async_trait::async_trait;
use futures::future::{FutureExt, LocalBoxFuture, Shared};
use futures::task::{LocalSpawn, LocalSpawnExt};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

// ============================================================================
// Fetch primitive
// ============================================================================

/// HTTP method of a data request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
}

/// A request handed to the [`Fetcher`].
///
/// Data requests are always same-origin with credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub method: Method,
    /// Header names are lowercase.
    pub headers: Vec<(String, String)>,
}

impl FetchRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A response from the [`Fetcher`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    /// Header values keyed by lowercase name.
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl FetchResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Status in `200..300`.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Status is 301, 302, 307 or 308.
    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 301 | 302 | 307 | 308)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Network capability.
///
/// Transport failures (offline, DNS, CORS) should be reported as
/// [`RouterError::Network`]; any other error is wrapped into one.
#[async_trait(?Send)]
pub trait Fetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse>;
}

/// Options for [`fetch_with_retry`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryOptions {
    pub method: Option<Method>,
    pub headers: Vec<(String, String)>,
}

/// Issue a data request, retrying 5xx responses while attempts remain.
///
/// Every request carries `x-nextjs-data: 1`. Client errors and transport
/// failures are not retried.
pub async fn fetch_with_retry(
    fetcher: &dyn Fetcher,
    url: &str,
    attempts: u32,
    options: &RetryOptions,
) -> Result<FetchResponse> {
    let mut headers = options.headers.clone();
    headers.push(("x-nextjs-data".to_string(), "1".to_string()));
    let request = FetchRequest {
        url: url.to_string(),
        method: options.method.unwrap_or(Method::Get),
        headers,
    };

    let mut remaining = attempts.max(1);
    loop {
        let response = fetcher
            .fetch(request.clone())
            .await
            .map_err(|err| match err {
                RouterError::Network { .. } => err,
                other => RouterError::Network {
                    url: url.to_string(),
                    message: other.to_string(),
                },
            })?;

        if !response.ok() && remaining > 1 && response.status >= 500 {
            remaining -= 1;
            debug_log!(
                "Retrying '{}' after status {} ({} attempts left)",
                url,
                response.status,
                remaining
            );
            continue;
        }
        return Ok(response);
    }
}

// ============================================================================
// Fetched data
// ============================================================================

/// Outcome of a data request.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedData {
    /// URL as requested.
    pub data_href: String,
    /// Absolute URL, the cache key.
    pub cache_key: String,
    /// Parsed body, when requested and valid JSON.
    pub json: Option<Value>,
    pub text: String,
    pub response: FetchResponse,
    /// The page data reported that the page does not exist.
    pub not_found: bool,
}

/// Parameters for [`DataCache::fetch_data`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchDataParams {
    pub data_href: String,
    /// The site has middleware; redirect statuses are data, not failures.
    pub has_middleware: bool,
    /// The engine is still hydrating the server-rendered page.
    pub is_server_render: bool,
    pub parse_json: bool,
    /// Keep the settled entry (production only).
    pub persist_cache: bool,
    pub is_prefetch: bool,
    /// Bypass the shared entry and refresh it after success.
    pub skip_client_cache: bool,
    /// Issue a body-less `HEAD` request.
    pub is_background: bool,
}

type SharedFetch = Shared<LocalBoxFuture<'static, Result<Rc<FetchedData>>>>;

/// In-flight and settled data requests, keyed by absolute URL.
///
/// Cloning yields a handle to the same cache.
#[derive(Clone)]
pub struct DataCache {
    name: &'static str,
    entries: Rc<RefCell<HashMap<String, SharedFetch>>>,
    fetcher: Rc<dyn Fetcher>,
    production: bool,
    server_render_attempts: u32,
}

impl fmt::Debug for DataCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataCache")
            .field("name", &self.name)
            .field("entries", &self.entries.borrow().len())
            .field("production", &self.production)
            .finish()
    }
}

impl DataCache {
    /// Create a cache.
    ///
    /// `server_render_attempts` applies to requests made while hydrating;
    /// later requests get a single attempt.
    pub fn new(
        name: &'static str,
        fetcher: Rc<dyn Fetcher>,
        production: bool,
        server_render_attempts: u32,
    ) -> Self {
        Self {
            name,
            entries: Rc::new(RefCell::new(HashMap::new())),
            fetcher,
            production,
            server_render_attempts,
        }
    }

    /// Absolute cache key for `data_href`.
    pub fn cache_key(data_href: &str, location: &Url) -> String {
        location
            .join(data_href)
            .map_or_else(|| data_href.to_string(), |url| url.href())
    }

    /// Fetch page data, sharing in-flight requests for the same URL.
    pub fn fetch_data(
        &self,
        params: FetchDataParams,
        location: &Url,
    ) -> LocalBoxFuture<'static, Result<Rc<FetchedData>>> {
        let cache_key = Self::cache_key(&params.data_href, location);

        if params.skip_client_cache && params.persist_cache {
            let entries = Rc::clone(&self.entries);
            let fresh = self.request(params, cache_key.clone(), None);
            let name = self.name;
            return async move {
                let data = fresh.await?;
                if data.response.header("x-middleware-cache") != Some("no-cache") {
                    trace_log!("[{}] refreshed entry for '{}'", name, cache_key);
                    let settled: LocalBoxFuture<'static, Result<Rc<FetchedData>>> =
                        futures::future::ready(Ok(Rc::clone(&data))).boxed_local();
                    entries.borrow_mut().insert(cache_key, settled.shared());
                }
                Ok(data)
            }
            .boxed_local();
        }

        if let Some(existing) = self.entries.borrow().get(&cache_key) {
            trace_log!("[{}] sharing request for '{}'", self.name, cache_key);
            return existing.clone().boxed_local();
        }

        let method = if params.is_background {
            Method::Head
        } else {
            Method::Get
        };
        let shared = self
            .request(params, cache_key.clone(), Some(method))
            .shared();
        self.entries
            .borrow_mut()
            .insert(cache_key, shared.clone());
        shared.boxed_local()
    }

    fn request(
        &self,
        params: FetchDataParams,
        cache_key: String,
        method: Option<Method>,
    ) -> LocalBoxFuture<'static, Result<Rc<FetchedData>>> {
        let fetcher = Rc::clone(&self.fetcher);
        let entries = Rc::clone(&self.entries);
        let production = self.production;
        let attempts = if params.is_server_render {
            self.server_render_attempts
        } else {
            1
        };

        async move {
            let result = load(fetcher.as_ref(), &params, &cache_key, attempts, method).await;
            match &result {
                Ok(data) => {
                    let no_cache = data.response.header("x-middleware-cache") == Some("no-cache");
                    if !params.persist_cache || !production || no_cache {
                        entries.borrow_mut().remove(&cache_key);
                    }
                }
                // A refreshing request leaves the previous settled entry in place.
                Err(_) if params.skip_client_cache && params.persist_cache => {}
                Err(_) => {
                    entries.borrow_mut().remove(&cache_key);
                }
            }
            result.map(Rc::new)
        }
        .boxed_local()
    }

    /// Fetch without reading or writing any cache entry.
    pub fn fetch_uncached(
        &self,
        params: FetchDataParams,
        location: &Url,
    ) -> LocalBoxFuture<'static, Result<Rc<FetchedData>>> {
        let fetcher = Rc::clone(&self.fetcher);
        let cache_key = Self::cache_key(&params.data_href, location);
        let attempts = if params.is_server_render {
            self.server_render_attempts
        } else {
            1
        };
        async move {
            load(fetcher.as_ref(), &params, &cache_key, attempts, None)
                .await
                .map(Rc::new)
        }
        .boxed_local()
    }

    /// Remove the entry for `cache_key`.
    pub fn evict(&self, cache_key: &str) {
        if self.entries.borrow_mut().remove(cache_key).is_some() {
            trace_log!("[{}] evicted '{}'", self.name, cache_key);
        }
    }

    pub fn contains(&self, cache_key: &str) -> bool {
        self.entries.borrow().contains_key(cache_key)
    }

    /// Number of in-flight and retained entries.
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fire a background `HEAD` request on `spawner`; failures are ignored.
    pub fn revalidate(&self, params: FetchDataParams, location: &Url, spawner: &dyn LocalSpawn) {
        let check = self.fetch_data(
            FetchDataParams {
                is_background: true,
                persist_cache: false,
                ..params
            },
            location,
        );
        let name = self.name;
        let spawned = spawner.spawn_local(async move {
            if let Err(err) = check.await {
                debug_log!("[{}] background revalidation failed: {}", name, err);
            }
        });
        if let Err(err) = spawned {
            debug_log!("[{}] could not spawn revalidation: {}", name, err);
        }
    }
}

async fn load(
    fetcher: &dyn Fetcher,
    params: &FetchDataParams,
    cache_key: &str,
    attempts: u32,
    method: Option<Method>,
) -> Result<FetchedData> {
    let mut headers = Vec::new();
    if params.is_prefetch {
        headers.push(("purpose".to_string(), "prefetch".to_string()));
        if params.has_middleware {
            headers.push(("x-middleware-prefetch".to_string(), "1".to_string()));
        }
    }
    let options = RetryOptions { method, headers };
    let response = fetch_with_retry(fetcher, &params.data_href, attempts, &options).await?;

    let fetched = |json: Option<Value>, not_found: bool, response: FetchResponse| FetchedData {
        data_href: params.data_href.clone(),
        cache_key: cache_key.to_string(),
        json,
        text: response.body.clone(),
        response,
        not_found,
    };

    if response.ok() && method == Some(Method::Head) {
        return Ok(fetched(Some(Value::Object(Default::default())), false, response));
    }

    if !response.ok() {
        if params.has_middleware && response.is_redirect() {
            return Ok(fetched(Some(Value::Object(Default::default())), false, response));
        }
        if response.status == 404 && body_reports_not_found(&response.body) {
            debug_log!("Data for '{}' reports notFound", params.data_href);
            return Ok(fetched(None, true, response));
        }
        return Err(RouterError::DataFetch {
            url: params.data_href.clone(),
            status: response.status,
        });
    }

    let json = if params.parse_json {
        serde_json::from_str(&response.body).ok()
    } else {
        None
    };
    Ok(fetched(json, false, response))
}

fn body_reports_not_found(body: &str) -> bool {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| json.get("notFound").cloned())
        .is_some_and(|flag| match flag {
            Value::Bool(b) => b,
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
            _ => true,
        })
}
