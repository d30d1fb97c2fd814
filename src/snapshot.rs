//! Immutable accessor snapshot
//!
//! A fixed-size table from [`ServiceKey`] to accessor, built once from a
//! finished set of entries and never mutated afterwards. Lookups perform no
//! writes and take no locks, so the snapshot can be shared freely once it has
//! been published to other threads.
//!
//! By default entries live in singly-linked chains over a prime number of
//! buckets. With the `perfect-hash` feature a minimal perfect hash function
//! maps every key to its own slot instead.

use crate::{Accessor, ServiceKey};

#[cfg(not(feature = "perfect-hash"))]
use ahash::RandomState;

#[cfg(feature = "perfect-hash")]
use boomphf::Mphf;

/// Default bucket count: prime, above the registration count of typical
/// applications, small enough to stay cheap for tiny ones.
pub const DEFAULT_BUCKET_COUNT: usize = 101;

#[cfg(not(feature = "perfect-hash"))]
struct Entry<S> {
    hash: u64,
    key: ServiceKey,
    accessor: Accessor<S>,
    next: Option<Box<Entry<S>>>,
}

/// Read-only table from service key to precompiled accessor.
///
/// # Examples
///
/// ```rust
/// use dependency_realizer::{Accessor, AccessorSnapshot, Instance, ServiceKey};
/// use std::sync::Arc;
///
/// let answer: Accessor<()> = Arc::new(|_: &()| Ok(Arc::new(42u32) as Instance));
/// let snapshot = AccessorSnapshot::new([(ServiceKey::of::<u32>(), answer)]);
///
/// assert!(snapshot.get(&ServiceKey::of::<u32>()).is_some());
/// assert!(snapshot.get(&ServiceKey::of::<u64>()).is_none());
/// ```
pub struct AccessorSnapshot<S> {
    #[cfg(not(feature = "perfect-hash"))]
    buckets: Box<[Option<Box<Entry<S>>>]>,
    #[cfg(not(feature = "perfect-hash"))]
    hasher: RandomState,

    #[cfg(feature = "perfect-hash")]
    index: Option<Mphf<ServiceKey>>,
    #[cfg(feature = "perfect-hash")]
    slots: Box<[(ServiceKey, Accessor<S>)]>,

    len: usize,
}

impl<S> AccessorSnapshot<S> {
    /// Build a snapshot with [`DEFAULT_BUCKET_COUNT`] buckets
    pub fn new<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (ServiceKey, Accessor<S>)>,
    {
        Self::with_bucket_count(entries, DEFAULT_BUCKET_COUNT)
    }

    /// Build a snapshot over exactly `bucket_count` buckets (at least one).
    ///
    /// Keys are expected to be unique; if one repeats, the entry given last
    /// shadows the earlier ones.
    #[cfg(not(feature = "perfect-hash"))]
    pub fn with_bucket_count<I>(entries: I, bucket_count: usize) -> Self
    where
        I: IntoIterator<Item = (ServiceKey, Accessor<S>)>,
    {
        let bucket_count = bucket_count.max(1);
        let hasher = RandomState::new();
        let mut buckets: Vec<Option<Box<Entry<S>>>> = Vec::with_capacity(bucket_count);
        buckets.resize_with(bucket_count, || None);

        let mut len = 0;
        for (key, accessor) in entries {
            let hash = hasher.hash_one(key);
            let bucket = &mut buckets[(hash % bucket_count as u64) as usize];
            let next = bucket.take();
            *bucket = Some(Box::new(Entry {
                hash,
                key,
                accessor,
                next,
            }));
            len += 1;
        }

        Self {
            buckets: buckets.into_boxed_slice(),
            hasher,
            len,
        }
    }

    /// Build a snapshot indexed by a minimal perfect hash function.
    ///
    /// `bucket_count` is ignored: every key gets its own slot.
    #[cfg(feature = "perfect-hash")]
    pub fn with_bucket_count<I>(entries: I, _bucket_count: usize) -> Self
    where
        I: IntoIterator<Item = (ServiceKey, Accessor<S>)>,
    {
        use std::collections::HashMap;

        // The MPHF construction requires distinct keys
        let unique: HashMap<ServiceKey, Accessor<S>, ahash::RandomState> = entries.into_iter().collect();
        if unique.is_empty() {
            return Self {
                index: None,
                slots: Box::new([]),
                len: 0,
            };
        }

        let keys: Vec<ServiceKey> = unique.keys().copied().collect();
        let index = Mphf::new(1.7, &keys);

        let mut slots: Vec<Option<(ServiceKey, Accessor<S>)>> = Vec::with_capacity(keys.len());
        slots.resize_with(keys.len(), || None);
        for (key, accessor) in unique {
            let slot = index.hash(&key) as usize;
            slots[slot] = Some((key, accessor));
        }

        let slots: Box<[(ServiceKey, Accessor<S>)]> = slots.into_iter().flatten().collect();
        let len = slots.len();
        Self {
            index: Some(index),
            slots,
            len,
        }
    }

    /// Look up the accessor for `key`; `None` is a plain miss, not an error
    #[cfg(not(feature = "perfect-hash"))]
    #[inline]
    pub fn get(&self, key: &ServiceKey) -> Option<&Accessor<S>> {
        let hash = self.hasher.hash_one(key);
        let mut entry = self.buckets[(hash % self.buckets.len() as u64) as usize].as_deref();
        while let Some(current) = entry {
            if current.hash == hash && current.key == *key {
                return Some(&current.accessor);
            }
            entry = current.next.as_deref();
        }
        None
    }

    /// Look up the accessor for `key`; `None` is a plain miss, not an error
    #[cfg(feature = "perfect-hash")]
    #[inline]
    pub fn get(&self, key: &ServiceKey) -> Option<&Accessor<S>> {
        // Unknown keys still hash somewhere, so confirm the stored key
        let slot = self.index.as_ref()?.try_hash(key)? as usize;
        match self.slots.get(slot) {
            Some((stored, accessor)) if stored == key => Some(accessor),
            _ => None,
        }
    }

    /// Check whether `key` has a precompiled accessor
    #[inline]
    pub fn contains_key(&self, key: &ServiceKey) -> bool {
        self.get(key).is_some()
    }

    /// Number of entries
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of buckets (slots, with `perfect-hash`)
    #[inline]
    pub fn bucket_count(&self) -> usize {
        #[cfg(not(feature = "perfect-hash"))]
        {
            self.buckets.len()
        }
        #[cfg(feature = "perfect-hash")]
        {
            self.slots.len()
        }
    }
}

impl<S> std::fmt::Debug for AccessorSnapshot<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessorSnapshot")
            .field("len", &self.len)
            .field("bucket_count", &self.bucket_count())
            .finish()
    }
}
