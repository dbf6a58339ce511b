//! Error taxonomy for the navigation engine.
//!
//! [`RouterError`] covers every way a transition can fail. The variants fall
//! into a few families that the engine treats differently:
//!
//! | Family | Variants | Handling |
//! |--------|----------|----------|
//! | Cancellation | [`Cancelled`](RouterError::Cancelled) | silent, `push` resolves to `false` |
//! | Asset failure | [`AssetLoad`](RouterError::AssetLoad), [`Network`](RouterError::Network) | hard navigation |
//! | Data failure | [`DataFetch`](RouterError::DataFetch) | generic error view, error returned |
//! | Caller mistakes | [`MissingRouteParams`](RouterError::MissingRouteParams), [`IncompatibleHref`](RouterError::IncompatibleHref), [`InvalidHref`](RouterError::InvalidHref) | returned to the caller |
//! | Invariants | [`HardNavigationLoop`](RouterError::HardNavigationLoop), [`RedirectLoop`](RouterError::RedirectLoop), [`UnexpectedMiddlewareEffect`](RouterError::UnexpectedMiddlewareEffect) | returned to the caller |
//!
//! Redirects are not errors; they travel as
//! [`Resolution::Redirect`](crate::route_info::Resolution).
//!
//! # Examples
//!
//! ```
//! use web_navigator::RouterError;
//!
//! let err = RouterError::Cancelled { route: "/blog".into() };
//! assert!(err.is_cancelled());
//! assert_eq!(err.to_string(), "Abort fetching component for route: \"/blog\"");
//! ```

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RouterError>;

/// Detailed error variants that can occur during navigation.
///
/// The type is `Clone` because in-flight data fetches are shared between
/// every caller waiting on the same URL.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    /// The transition was superseded by a newer one.
    #[error("Abort fetching component for route: \"{route}\"")]
    Cancelled { route: String },

    /// A view module or its resources failed to load.
    #[error("Failed to load page module for route \"{route}\": {message}")]
    AssetLoad { route: String, message: String },

    /// The fetch primitive itself failed (offline, DNS, CORS).
    #[error("Failed to fetch {url}: {message}")]
    Network { url: String, message: String },

    /// A data request returned a non-ok status that is not a known benign case.
    #[error("Failed to load static props from {url} (status {status})")]
    DataFetch { url: String, status: u16 },

    /// The page data reported that the page does not exist.
    #[error("Page not found: {path}")]
    NotFound { path: String },

    /// Required dynamic segment values are absent from the query.
    #[error("{}", missing_params_message(.href, .missing, .interpolating))]
    MissingRouteParams {
        href: String,
        missing: Vec<String>,
        interpolating: bool,
    },

    /// The `as` path cannot be produced by the `href` route.
    #[error("The provided `as` value ({as_path}) is incompatible with the `href` value ({route}).")]
    IncompatibleHref { as_path: String, route: String },

    /// An href that cannot be navigated to client-side.
    #[error("Invalid href \"{href}\" passed to router")]
    InvalidHref { href: String },

    /// A relative URL resolved to a different origin.
    #[error("invariant: invalid relative URL, router received {url}")]
    InvalidRelativeUrl { url: String },

    /// A route, rewrite, or middleware pattern failed to compile.
    #[error("Invalid pattern \"{pattern}\": {message}")]
    InvalidPattern { pattern: String, message: String },

    /// A hard navigation was requested to the URL already displayed.
    #[error("Invariant: attempted to hard navigate to the same URL {url}")]
    HardNavigationLoop { url: String },

    /// Redirects kept chaining past the allowed depth.
    #[error("Too many redirects while navigating to {url}")]
    RedirectLoop { url: String },

    /// Middleware produced an effect where none is allowed.
    #[error("Unexpected middleware effect on {route}")]
    UnexpectedMiddlewareEffect { route: String },

    /// The page list or build manifest could not be loaded.
    #[error("Failed to load build manifest: {message}")]
    Manifest { message: String },

    /// The initial-props capability failed.
    #[error("Failed to compute initial props: {message}")]
    Props { message: String },

    /// The rendering subscriber rejected an update.
    #[error("Failed to render route: {message}")]
    Render { message: String },

    /// The router configuration is inconsistent.
    #[error("Invalid router configuration: {message}")]
    Config { message: String },

    /// A JSON document could not be decoded.
    #[error("Invalid JSON: {message}")]
    Json { message: String },
}

fn missing_params_message(href: &str, missing: &[String], interpolating: &bool) -> String {
    if *interpolating {
        format!(
            "The provided `href` ({href}) value is missing query values ({}) to be interpolated properly.",
            missing.join(", ")
        )
    } else {
        format!(
            "The provided `href` ({href}) is missing route parameters: {}",
            missing.join(", ")
        )
    }
}

impl RouterError {
    /// Build the error that aborts a superseded transition.
    pub fn cancelled(route: impl Into<String>) -> Self {
        Self::Cancelled {
            route: route.into(),
        }
    }

    /// Check whether this error marks a superseded transition.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RouterError::Cancelled { .. })
    }

    /// Check whether this error means the page's code or network is
    /// unusable, so only a full page load can recover.
    pub fn is_asset_error(&self) -> bool {
        matches!(
            self,
            RouterError::AssetLoad { .. } | RouterError::Network { .. }
        )
    }
}

impl From<serde_json::Error> for RouterError {
    fn from(err: serde_json::Error) -> Self {
        RouterError::Json {
            message: err.to_string(),
        }
    }
}

impl From<regex::Error> for RouterError {
    fn from(err: regex::Error) -> Self {
        RouterError::InvalidPattern {
            pattern: String::new(),
            message: err.to_string(),
        }
    }
}
