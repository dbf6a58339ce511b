//! # web-navigator
//!
//! Client-side navigation engine for server-rendered, file-routed web
//! applications.
//!
//! The engine turns a navigation request (`push`, `replace`, back/forward)
//! into a committed route: it resolves rewrites and dynamic routes, consults
//! edge middleware, loads the page view and its data, keeps browser history
//! and scroll position in sync, and reports progress through named events.
//!
//! The environment is supplied through traits:
//!
//! | Capability | Trait |
//! |------------|-------|
//! | page list, view modules, data URLs | [`PageLoader`] |
//! | rewrite table | [`ManifestProvider`] |
//! | HTTP | [`Fetcher`] |
//! | history and location | [`BrowserHistory`] |
//! | scrolling, document language | [`Viewport`] |
//! | props for views without data | [`PropsProvider`] |
//! | rendering | [`RouteSubscriber`] |
//!
//! The engine is single-threaded (`Rc`-based) and runtime-agnostic; futures
//! can be driven by any local executor.
//!
//! # Quick start
//!
//! ```ignore
//! use web_navigator::{Router, RouterConfig, TransitionOptions};
//!
//! let router = Router::builder(RouterConfig::new(), initial_page, view)
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
//!
//! # Features
//!
//! - `log` (default): log through the `log` crate.
//! - `tracing`: log through the `tracing` crate instead.
//! - `cache` (default): LRU cache for compiled route patterns.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod logging;

pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod fetch;
pub mod history;
pub mod matching;
pub mod middleware;
pub mod page;
pub mod params;
pub mod path;
pub mod resolve;
pub mod rewrites;
pub mod route_info;
pub mod router;
pub mod state;
pub mod url;

pub use config::{BuildMode, DomainLocale, I18nConfig, InitialPage, RequestContext, RouterConfig};
pub use error::{Result, RouterError};
pub use events::{ListenerId, RouterEvent, RouterEventKind, RouterEvents};
pub use fetch::{FetchRequest, FetchResponse, Fetcher, Method};
pub use history::{BrowserHistory, HistoryState, Viewport};
pub use middleware::MiddlewareMatcher;
pub use page::{
    BuildManifest, DataFlags, DataHrefParams, EmptyProps, ManifestProvider, PageLoader, PageModule,
    PropsContext, PropsProvider, RouteSubscriber, RouteUpdate, ScrollTarget, StyleSheet, View,
};
pub use params::{Query, QueryValue};
pub use rewrites::{RewriteRule, RewriteTable};
pub use route_info::RouteInfo;
pub use router::{Router, RouterBuilder};
pub use state::{LocaleOption, PrefetchOptions, RouterState, TransitionOptions};
