//! Compiled route-pattern caching.
//!
//! Resolving a navigation compiles the regex of every dynamic page it
//! considers, and the same handful of pages is considered on every
//! navigation. [`RouteRegexCache`] memoizes [`RouteRegex`] values behind an
//! LRU (the [`lru`] crate, feature `cache`). Without the feature every lookup
//! compiles afresh; the counters still work so callers need not care.
//!
//! # Examples
//!
//! ```
//! use web_navigator::cache::RouteRegexCache;
//!
//! let mut cache = RouteRegexCache::new();
//! let first = cache.get_or_compile("/blog/[slug]").unwrap();
//! let second = cache.get_or_compile("/blog/[slug]").unwrap();
//!
//! assert_eq!(first.route(), second.route());
//! assert_eq!(cache.stats().misses, 1);
//! # #[cfg(feature = "cache")]
//! assert_eq!(cache.stats().hits, 1);
//! ```

use crate::error::Result;
use crate::matching::RouteRegex;
use crate::{debug_log, trace_log};
#[cfg(feature = "cache")]
use lru::LruCache;
#[cfg(feature = "cache")]
use std::num::NonZeroUsize;
use std::rc::Rc;

/// Counters tracking cache effectiveness.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups served from the cache.
    pub hits: usize,
    /// Lookups that had to compile.
    pub misses: usize,
    /// Number of full invalidations (via [`RouteRegexCache::clear`]).
    pub invalidations: usize,
}

impl CacheStats {
    /// Return the hit rate as a value in `0.0..=1.0`.
    ///
    /// Returns `0.0` if no lookups have been performed.
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// LRU memo of compiled route regexes, keyed by route.
#[derive(Debug)]
pub struct RouteRegexCache {
    #[cfg(feature = "cache")]
    entries: LruCache<String, Rc<RouteRegex>>,
    stats: CacheStats,
}

impl RouteRegexCache {
    const DEFAULT_CAPACITY: usize = 256;

    /// Create a cache with the default capacity (256 routes).
    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    /// Create a cache holding at most `capacity` routes (minimum one).
    #[cfg_attr(not(feature = "cache"), allow(unused_variables))]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            #[cfg(feature = "cache")]
            entries: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
            stats: CacheStats::default(),
        }
    }

    /// Return the compiled regex for `route`, compiling on a miss.
    pub fn get_or_compile(&mut self, route: &str) -> Result<Rc<RouteRegex>> {
        #[cfg(feature = "cache")]
        if let Some(regex) = self.entries.get(route) {
            self.stats.hits += 1;
            trace_log!("Route regex cache hit for '{}'", route);
            return Ok(Rc::clone(regex));
        }

        self.stats.misses += 1;
        trace_log!("Route regex cache miss for '{}'", route);
        let regex = Rc::new(RouteRegex::compile(route)?);

        #[cfg(feature = "cache")]
        self.entries.push(route.to_string(), Rc::clone(&regex));

        Ok(regex)
    }

    /// Drop every entry and increment the invalidation counter.
    pub fn clear(&mut self) {
        #[cfg(feature = "cache")]
        self.entries.clear();
        self.stats.invalidations += 1;
        debug_log!(
            "Route regex cache cleared ({} invalidations, hit rate {:.1}%)",
            self.stats.invalidations,
            self.stats.hit_rate() * 100.0
        );
    }

    pub const fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Number of cached routes.
    pub fn len(&self) -> usize {
        #[cfg(feature = "cache")]
        {
            self.entries.len()
        }
        #[cfg(not(feature = "cache"))]
        {
            0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RouteRegexCache {
    fn default() -> Self {
        Self::new()
    }
}
