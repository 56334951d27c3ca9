use crate::logging;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

lazy_static! {
    static ref REGEX_CACHE: RwLock<HashMap<String, Arc<Regex>>> = RwLock::new(HashMap::new());
}

/// Compiles and caches the given pattern, keyed by the raw pattern string.
/// Returns false for empty patterns and for patterns that fail to compile;
/// a failed addition never mutates the cache. Re-adding a cached pattern
/// succeeds without recompiling.
pub fn add_regex_pattern(pattern: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }
    if REGEX_CACHE.read().unwrap().contains_key(pattern) {
        return true;
    }
    match Regex::new(pattern) {
        Ok(compiled) => {
            REGEX_CACHE
                .write()
                .unwrap()
                .entry(pattern.into())
                .or_insert_with(|| Arc::new(compiled));
            true
        }
        Err(err) => {
            logging::warn!(
                "[ParamRegexCache] Failed to compile regex pattern, pattern {}, reason: {:?}",
                pattern,
                err
            );
            false
        }
    }
}

/// Pure lookup. Absent when the pattern was never added or failed to compile.
pub fn get_regex_pattern(pattern: &str) -> Option<Arc<Regex>> {
    REGEX_CACHE.read().unwrap().get(pattern).cloned()
}

pub fn clear() {
    REGEX_CACHE.write().unwrap().clear();
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn add_and_get() {
        assert!(!add_regex_pattern("\\"));
        assert!(!add_regex_pattern(""));
        assert!(get_regex_pattern("\\").is_none());

        let good_pattern = "\\d+";
        assert!(add_regex_pattern(good_pattern));
        let compiled = get_regex_pattern(good_pattern).unwrap();
        assert!(compiled.is_match("123"));
        assert!(!compiled.is_match("abc"));
    }

    #[test]
    fn idempotent_add() {
        let pattern = "[a-z]{3}\\d*";
        assert!(add_regex_pattern(pattern));
        let first = get_regex_pattern(pattern).unwrap();
        assert!(add_regex_pattern(pattern));
        let second = get_regex_pattern(pattern).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
