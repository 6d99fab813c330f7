//! In-memory object cache.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::core::informer::Store;
use crate::core::key::ResourceKey;
use crate::core::object::ObjectMeta;

/// Object cache keyed by namespace/name, for development and testing.
pub struct InMemoryStore<O> {
    objects: RwLock<BTreeMap<ResourceKey, O>>,
}

impl<O> Default for InMemoryStore<O> {
    fn default() -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<O> InMemoryStore<O>
where
    O: ObjectMeta + Clone,
{
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an object. Returns the previous version.
    pub fn upsert(&self, obj: O) -> Option<O> {
        self.objects.write().insert(ResourceKey::from_object(&obj), obj)
    }

    /// Remove an object. Returns it if it was present.
    pub fn remove(&self, key: &ResourceKey) -> Option<O> {
        self.objects.write().remove(key)
    }

    /// Fetch an object by key.
    #[must_use]
    pub fn get(&self, key: &ResourceKey) -> Option<O> {
        self.objects.read().get(key).cloned()
    }

    /// Number of cached objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

impl<O> Store<O> for InMemoryStore<O>
where
    O: ObjectMeta + Clone + Send + Sync,
{
    fn list(&self) -> Vec<O> {
        self.objects.read().values().cloned().collect()
    }
}

impl<O> FromIterator<O> for InMemoryStore<O>
where
    O: ObjectMeta + Clone,
{
    fn from_iter<I: IntoIterator<Item = O>>(iter: I) -> Self {
        let store = Self::new();
        for obj in iter {
            store.upsert(obj);
        }
        store
    }
}
