//! Build-phase accessor store
//!
//! Mutable map filled by the realization pipeline while it is still private
//! to the building thread. It has one writer and no concurrent readers, so
//! it needs no synchronization.

use crate::{Accessor, ServiceKey};
use ahash::RandomState;
use std::collections::HashMap;

/// Initial capacity; most applications register a few dozen services
const INITIAL_CAPACITY: usize = 50;

pub(crate) struct BuildTimeAccessorStore<S> {
    accessors: HashMap<ServiceKey, Accessor<S>, RandomState>,
}

impl<S> BuildTimeAccessorStore<S> {
    pub(crate) fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            accessors: HashMap::with_capacity_and_hasher(capacity, RandomState::new()),
        }
    }

    /// Store `accessor`, replacing any earlier one for `key`
    #[inline]
    pub(crate) fn insert(&mut self, key: ServiceKey, accessor: Accessor<S>) {
        self.accessors.insert(key, accessor);
    }

    #[inline]
    pub(crate) fn get(&self, key: &ServiceKey) -> Option<&Accessor<S>> {
        self.accessors.get(key)
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.accessors.len()
    }

    /// Hand the entries over to the snapshot
    pub(crate) fn into_entries(self) -> impl Iterator<Item = (ServiceKey, Accessor<S>)> {
        self.accessors.into_iter()
    }
}

impl<S> Default for BuildTimeAccessorStore<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Instance;
    use std::sync::Arc;

    fn constant(value: u32) -> Accessor<()> {
        Arc::new(move |_: &()| Ok(Arc::new(value) as Instance))
    }

    #[test]
    fn test_insert_replaces() {
        let mut store = BuildTimeAccessorStore::new();
        let key = ServiceKey::of::<u32>();

        store.insert(key, constant(1));
        store.insert(key, constant(2));

        assert_eq!(store.len(), 1);
        let value = store.get(&key).unwrap()(&()).unwrap();
        assert_eq!(*value.downcast::<u32>().unwrap(), 2);
    }

    #[test]
    fn test_into_entries() {
        let mut store = BuildTimeAccessorStore::with_capacity(2);
        store.insert(ServiceKey::of::<u32>(), constant(1));
        store.insert(ServiceKey::of::<u64>(), constant(2));

        assert_eq!(store.into_entries().count(), 2);
    }
}
