use std::{
    collections::HashMap,
    hash::Hash,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::{error::DbError, utils::HandyRwLock};

// Type alias, not a new type, so the underlying Arc/RwLock api stays
// available to callers.
pub type Pod<T> = Arc<RwLock<T>>;

pub type ResultPod<T> = Result<Pod<T>, DbError>;
pub type DbResult = Result<(), DbError>;

/// A HashMap behind a RwLock.
///
/// Read-mostly callers go through `get`; insertion/removal serialize on the
/// write lock. The map hands out clones of its values, so values are
/// expected to be cheap-to-clone pointers (`Pod<...>`).
pub struct ConcurrentHashMap<K, V> {
    inner: RwLock<HashMap<K, V>>,
}

impl<K: Eq + Hash + Clone, V: Clone> ConcurrentHashMap<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.rl().get(key).cloned()
    }

    /// Return the cached value for `key`, or build one with `f` and cache
    /// it. The write lock is held across `f` so concurrent callers cannot
    /// both load the same page.
    pub fn get_or_insert(
        &self,
        key: &K,
        f: impl FnOnce(&K) -> Result<V, DbError>,
    ) -> Result<V, DbError> {
        let mut inner = self.inner.wl();
        if let Some(v) = inner.get(key) {
            return Ok(v.clone());
        }

        let v = f(key)?;
        inner.insert(key.clone(), v.clone());
        Ok(v)
    }

    pub fn insert(&self, key: K, value: V) {
        self.inner.wl().insert(key, value);
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.inner.wl().remove(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.rl().contains_key(key)
    }

    pub fn keys(&self) -> Vec<K> {
        self.inner.rl().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.rl().len()
    }

    pub fn clear(&self) {
        self.inner.wl().clear();
    }

    pub fn get_inner_rl(&self) -> RwLockReadGuard<'_, HashMap<K, V>> {
        self.inner.rl()
    }

    pub fn get_inner_wl(&self) -> RwLockWriteGuard<'_, HashMap<K, V>> {
        self.inner.wl()
    }
}
