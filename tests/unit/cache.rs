//! Unit tests for the compiled route-pattern cache

use web_navigator::cache::RouteRegexCache;

#[test]
fn test_compiles_on_first_lookup() {
    let mut cache = RouteRegexCache::new();
    assert!(cache.is_empty());

    let regex = cache.get_or_compile("/users/[id]").unwrap();
    assert!(regex.is_match("/users/42"));
    assert_eq!(cache.stats().misses, 1);
    assert_eq!(cache.stats().hits, 0);
}

#[test]
fn test_static_route_has_no_groups() {
    let mut cache = RouteRegexCache::new();
    let regex = cache.get_or_compile("/static/page").unwrap();
    assert!(regex.groups().is_empty());
    assert!(regex.is_match("/static/page/"));
}

#[cfg(feature = "cache")]
#[test]
fn test_repeat_lookup_hits() {
    let mut cache = RouteRegexCache::new();
    let first = cache.get_or_compile("/blog/[slug]").unwrap();
    let second = cache.get_or_compile("/blog/[slug]").unwrap();

    assert!(std::rc::Rc::ptr_eq(&first, &second));
    assert_eq!(cache.stats().hits, 1);
    assert_eq!(cache.len(), 1);
    assert!((cache.stats().hit_rate() - 0.5).abs() < f64::EPSILON);
}

#[cfg(feature = "cache")]
#[test]
fn test_least_recently_used_is_evicted() {
    let mut cache = RouteRegexCache::with_capacity(2);
    cache.get_or_compile("/a/[x]").unwrap();
    cache.get_or_compile("/b/[x]").unwrap();
    // Touch "/a/[x]" so "/b/[x]" becomes the oldest entry.
    cache.get_or_compile("/a/[x]").unwrap();
    cache.get_or_compile("/c/[x]").unwrap();

    assert_eq!(cache.len(), 2);
    let misses = cache.stats().misses;
    cache.get_or_compile("/a/[x]").unwrap();
    assert_eq!(cache.stats().misses, misses, "recently used entry survives");
    cache.get_or_compile("/b/[x]").unwrap();
    assert_eq!(cache.stats().misses, misses + 1, "oldest entry was evicted");
}

#[test]
fn test_clear_counts_invalidations() {
    let mut cache = RouteRegexCache::new();
    cache.get_or_compile("/a/[x]").unwrap();
    cache.clear();
    cache.clear();

    assert!(cache.is_empty());
    assert_eq!(cache.stats().invalidations, 2);
}
