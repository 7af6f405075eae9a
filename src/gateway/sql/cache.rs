//! Bounded cache of translated statements, keyed on the raw client SQL
//! text. Translation is pure (same input always produces the same output)
//! so it's safe to share one cache across all sessions.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use super::{Translated, Translator};

pub struct TranslationCache {
    inner: Mutex<LruCache<String, Translated>>,
}

impl TranslationCache {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self { inner: Mutex::new(LruCache::new(cap)) }
    }

    /// Returns the cached translation for `sql`, or runs `translator` and
    /// caches the result.
    pub fn get_or_translate(&self, sql: &str, translator: &Translator) -> Translated {
        if let Some(hit) = self.inner.lock().unwrap().get(sql) {
            return hit.clone();
        }
        let translated = translator.translate(sql);
        self.inner.lock().unwrap().put(sql.to_string(), translated.clone());
        translated
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caches_repeated_statements() {
        let cache = TranslationCache::new(8);
        let translator = Translator::new();
        let a = cache.get_or_translate("select 1", &translator);
        let b = cache.get_or_translate("select 1", &translator);
        assert_eq!(a.sql, b.sql);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn evicts_least_recently_used_past_capacity() {
        let cache = TranslationCache::new(1);
        let translator = Translator::new();
        cache.get_or_translate("select 1", &translator);
        cache.get_or_translate("select 2", &translator);
        assert_eq!(cache.len(), 1);
    }
}
