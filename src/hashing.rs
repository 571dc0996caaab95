//! This module provides a deterministic hasher and `HashMap` and `HashSet` variants that use
//! it. The hashing data structures in the standard library are not deterministic, which would
//! make the iteration order of per-type tables (and therefore the order in which random numbers
//! are drawn) differ between runs with the same seed.
//!
//! The standard library `HashMap` has a `new` method, but `HashMap<K, V, S>` does not have a `new`
//! method by default. Use `HashMap::default()` instead to create a new hashmap with the default
//! hasher. If you really need to keep the API the same across implementations, we provide the
//! `HashMapExt` trait extension. Similarly, for `HashSet` and `HashSetExt`. The traits need only be
//! in scope.
//!
//! The `hash_str` free function is used to derive per-stream seeds in `crate::random`.

use rustc_hash::FxBuildHasher;
use xxhash_rust::xxh3::xxh3_64;

pub type HashMap<K, V> = std::collections::HashMap<K, V, FxBuildHasher>;
pub type HashSet<T> = std::collections::HashSet<T, FxBuildHasher>;

pub trait HashMapExt {
    fn new() -> Self;
    fn with_capacity(capacity: usize) -> Self;
}

impl<K, V> HashMapExt for HashMap<K, V> {
    fn new() -> Self {
        HashMap::default()
    }

    fn with_capacity(capacity: usize) -> Self {
        HashMap::with_capacity_and_hasher(capacity, FxBuildHasher)
    }
}

pub trait HashSetExt {
    fn new() -> Self;
}

impl<T> HashSetExt for HashSet<T> {
    fn new() -> Self {
        HashSet::default()
    }
}

/// A convenience method to compute the hash of a `&str`.
#[must_use]
pub fn hash_str(data: &str) -> u64 {
    xxh3_64(data.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_str_is_stable() {
        assert_eq!(hash_str("PersonRng"), hash_str("PersonRng"));
        assert_ne!(hash_str("PersonRng"), hash_str("PlannerRng"));
    }

    #[test]
    fn map_ext_constructors() {
        let mut map: HashMap<u32, &str> = HashMap::new();
        map.insert(1, "one");
        let set: HashSet<u32> = HashSet::new();
        assert_eq!(map.len(), 1);
        assert!(set.is_empty());
    }
}
