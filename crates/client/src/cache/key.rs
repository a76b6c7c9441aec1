//! Content-addressed cache key generation.

use sha2::{Digest, Sha256};
use sift_core::PageQuery;

/// Compute the cache key of a page query.
///
/// Covers every set parameter, the page id and the page size, so the same page
/// under different parameters never collides.
pub fn cache_key(query: &PageQuery) -> String {
    let mut hasher = Sha256::new();
    hasher.update((query.params.len() as u64).to_be_bytes());
    for (name, value) in &query.params {
        // Length prefixes keep "a" = "b=c" apart from "a=b" = "c".
        hasher.update((name.len() as u64).to_be_bytes());
        hasher.update(name.as_bytes());
        hasher.update((value.len() as u64).to_be_bytes());
        hasher.update(value.as_bytes());
    }
    hasher.update(query.page_id.to_be_bytes());
    hasher.update((query.page_size as u64).to_be_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn query(params: &[(&str, &str)], page_id: u64, page_size: usize) -> PageQuery {
        PageQuery {
            params: params.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect::<BTreeMap<_, _>>(),
            page_id,
            page_size,
        }
    }

    #[test]
    fn test_key_stability() {
        let key1 = cache_key(&query(&[("a", "abc"), ("b", "1")], 1, 20));
        let key2 = cache_key(&query(&[("b", "1"), ("a", "abc")], 1, 20));
        assert_eq!(key1, key2);
    }

    #[test]
    fn test_key_different_page() {
        assert_ne!(cache_key(&query(&[], 1, 20)), cache_key(&query(&[], 2, 20)));
        assert_ne!(cache_key(&query(&[], 1, 20)), cache_key(&query(&[], 1, 10)));
    }

    #[test]
    fn test_key_different_params() {
        assert_ne!(cache_key(&query(&[("a", "abc")], 1, 20)), cache_key(&query(&[("a", "abcd")], 1, 20)));
        assert_ne!(cache_key(&query(&[("a", "b=c")], 1, 20)), cache_key(&query(&[("a=b", "c")], 1, 20)));
        assert_ne!(cache_key(&query(&[], 1, 20)), cache_key(&query(&[("a", "")], 1, 20)));
    }

    #[test]
    fn test_key_format() {
        let key = cache_key(&query(&[("a", "abc")], 1, 20));
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
