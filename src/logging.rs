//! Logging facade.
//!
//! The engine logs through five crate-local macros that forward to either
//! [`log`](https://docs.rs/log) or [`tracing`](https://docs.rs/tracing),
//! selected by feature flag. Enable at most one of the two.
//!
//! | Feature    | Backend         | Default |
//! |------------|-----------------|---------|
//! | `log`      | `log` crate     | yes     |
//! | `tracing`  | `tracing` crate | no      |
//!
//! Every record is emitted under the `web_navigator` target so applications
//! can filter engine output independently of their own, e.g.
//! `RUST_LOG=web_navigator=debug`.
//!
//! Level conventions used across the crate:
//!
//! - `info_log!`: a navigation started, completed, or fell back to a hard
//!   page load.
//! - `debug_log!`: pipeline decisions (rewrite matched, middleware effect,
//!   cache hit, cancellation).
//! - `trace_log!`: per-step detail (regex compiled, header inspected).
//! - `warn_log!`: recoverable misconfiguration (bad matcher, unknown locale).
//! - `error_log!`: invalid hrefs and failures inside error recovery.
//!
//! ```ignore
//! use web_navigator::{debug_log, info_log};
//!
//! info_log!("Navigation to '{}' complete", as_path);
//! debug_log!("Rewrite matched page '{}'", resolved_href);
//! ```

/// Emit a **trace**-level record under the `web_navigator` target.
#[macro_export]
macro_rules! trace_log {
    ($($arg:tt)*) => {
        #[cfg(feature = "tracing")]
        ::tracing::trace!(target: "web_navigator", $($arg)*);
        #[cfg(feature = "log")]
        ::log::trace!(target: "web_navigator", $($arg)*);
    };
}

/// Emit a **debug**-level record under the `web_navigator` target.
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        #[cfg(feature = "tracing")]
        ::tracing::debug!(target: "web_navigator", $($arg)*);
        #[cfg(feature = "log")]
        ::log::debug!(target: "web_navigator", $($arg)*);
    };
}

/// Emit an **info**-level record under the `web_navigator` target.
#[macro_export]
macro_rules! info_log {
    ($($arg:tt)*) => {
        #[cfg(feature = "tracing")]
        ::tracing::info!(target: "web_navigator", $($arg)*);
        #[cfg(feature = "log")]
        ::log::info!(target: "web_navigator", $($arg)*);
    };
}

/// Emit a **warn**-level record under the `web_navigator` target.
#[macro_export]
macro_rules! warn_log {
    ($($arg:tt)*) => {
        #[cfg(feature = "tracing")]
        ::tracing::warn!(target: "web_navigator", $($arg)*);
        #[cfg(feature = "log")]
        ::log::warn!(target: "web_navigator", $($arg)*);
    };
}

/// Emit an **error**-level record under the `web_navigator` target.
#[macro_export]
macro_rules! error_log {
    ($($arg:tt)*) => {
        #[cfg(feature = "tracing")]
        ::tracing::error!(target: "web_navigator", $($arg)*);
        #[cfg(feature = "log")]
        ::log::error!(target: "web_navigator", $($arg)*);
    };
}
