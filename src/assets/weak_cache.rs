use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// Key -> `Weak<V>` map behind a single mutex.
///
/// The cache never keeps a value alive. While any `Arc` handed out for a key is held,
/// lookups for that key return the same allocation; once the last holder drops it the
/// entry is dead and the next lookup loads again.
pub struct WeakCache<K, V> {
    entries: Mutex<HashMap<K, Weak<V>>>,
}

impl<K, V> Default for WeakCache<K, V> {
    fn default() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }
}

impl<K: Eq + Hash + Clone, V> WeakCache<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the live value for `key`, or runs `load` and caches a weak handle to it.
    ///
    /// The lock is held across `load`, so concurrent callers for any key serialize and
    /// a path is never loaded twice at once.
    pub fn get_or_try_insert_with<E>(&self, key: &K, load: impl FnOnce() -> Result<Arc<V>, E>) -> Result<Arc<V>, E> {
        let mut entries = self.lock();
        if let Some(live) = entries.get(key).and_then(Weak::upgrade) {
            return Ok(live);
        }
        let value = load()?;
        entries.insert(key.clone(), Arc::downgrade(&value));
        Ok(value)
    }

    pub fn get<Q>(&self, key: &Q) -> Option<Arc<V>>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.lock().get(key).and_then(Weak::upgrade)
    }

    /// Drops entries whose value is gone. Returns how many were removed.
    pub fn purge(&self) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, weak| weak.strong_count() > 0);
        before - entries.len()
    }

    /// Number of entries still backed by a live value.
    pub fn live_count(&self) -> usize {
        self.lock().values().filter(|weak| weak.strong_count() > 0).count()
    }

    /// Number of entries including dead ones awaiting `purge`.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // A panic while loading leaves the map itself consistent, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, HashMap<K, Weak<V>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::convert::Infallible;

    #[test]
    fn live_entries_are_shared() {
        let cache: WeakCache<String, u32> = WeakCache::new();
        let loads = Cell::new(0);
        let load = || {
            loads.set(loads.get() + 1);
            Ok::<_, Infallible>(Arc::new(7))
        };
        let a = cache.get_or_try_insert_with(&"a".to_string(), load).unwrap();
        let b = cache.get_or_try_insert_with(&"a".to_string(), load).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(loads.get(), 1);
        assert_eq!(cache.live_count(), 1);
    }

    #[test]
    fn dropped_entries_lapse_and_reload() {
        let cache: WeakCache<&'static str, String> = WeakCache::new();
        let first = cache.get_or_try_insert_with(&"k", || Ok::<_, Infallible>(Arc::new("one".into()))).unwrap();
        drop(first);
        assert!(cache.get("k").is_none());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.purge(), 1);
        assert!(cache.is_empty());

        let second = cache.get_or_try_insert_with(&"k", || Ok::<_, Infallible>(Arc::new("two".into()))).unwrap();
        assert_eq!(second.as_str(), "two");
    }

    #[test]
    fn failed_load_leaves_no_entry() {
        let cache: WeakCache<u8, u8> = WeakCache::new();
        let err = cache.get_or_try_insert_with(&1, || Err::<Arc<u8>, _>("boom")).unwrap_err();
        assert_eq!(err, "boom");
        assert!(cache.is_empty());
    }

    #[test]
    fn purge_keeps_live_entries() {
        let cache: WeakCache<u8, u8> = WeakCache::new();
        let keep = cache.get_or_try_insert_with(&1, || Ok::<_, Infallible>(Arc::new(1))).unwrap();
        let gone = cache.get_or_try_insert_with(&2, || Ok::<_, Infallible>(Arc::new(2))).unwrap();
        drop(gone);
        assert_eq!(cache.purge(), 1);
        assert_eq!(cache.get(&1u8).as_deref(), Some(&1));
        drop(keep);
    }
}
