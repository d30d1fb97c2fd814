//! Scopes
//!
//! A scope bounds the lifetime of scoped instances. Every provider owns one
//! root scope, which also holds singletons; request scopes are created from
//! it and dropped when the request ends.

use crate::container::ProviderCore;
use crate::{DiError, Injectable, Instance, Result, ServiceKey, ServiceProvider};
use ahash::RandomState;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// Unique scope identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u64);

impl ScopeId {
    /// Generate a new unique scope ID.
    #[inline]
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    #[inline]
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl Default for ScopeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ScopeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "scope-{}", self.0)
    }
}

/// Instance cache owned by one scope.
///
/// Each key gets its own cell, so a service is created at most once per
/// scope even when several threads ask for it at the same time.
pub(crate) struct ScopeState {
    id: ScopeId,
    instances: DashMap<ServiceKey, Arc<OnceCell<Instance>>, RandomState>,
}

impl ScopeState {
    pub(crate) fn new() -> Self {
        Self {
            id: ScopeId::new(),
            instances: DashMap::with_capacity_and_hasher_and_shard_amount(0, RandomState::new(), 8),
        }
    }

    #[inline]
    pub(crate) fn get(&self, key: &ServiceKey) -> Option<Instance> {
        self.instances
            .get(key)
            .and_then(|cell| cell.get().map(Arc::clone))
    }

    /// Return the cached instance or run `create` once to fill the slot.
    ///
    /// `create` runs outside the map lock. A factory that re-enters its own
    /// slot on the same thread will block forever.
    pub(crate) fn get_or_try_init<F>(&self, key: &ServiceKey, create: F) -> Result<Instance>
    where
        F: FnOnce() -> Result<Instance>,
    {
        let cell = Arc::clone(&self.instances.entry(*key).or_default());
        cell.get_or_try_init(create).map(Arc::clone)
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.instances.iter().filter(|entry| entry.value().get().is_some()).count()
    }
}

/// A resolution scope.
///
/// Cloning is cheap and yields a handle to the same scope.
///
/// # Examples
///
/// ```rust
/// use dependency_realizer::{ServiceCollection, ServiceProvider};
///
/// struct RequestContext { id: u64 }
///
/// let mut services = ServiceCollection::new();
/// services.add_scoped_factory(|scope| Ok(RequestContext { id: scope.id().id() }));
///
/// let provider = ServiceProvider::build(services).unwrap();
///
/// let request = provider.create_scope();
/// let a = request.get::<RequestContext>().unwrap();
/// let b = request.get::<RequestContext>().unwrap();
/// assert_eq!(a.id, b.id);
/// assert!(!request.is_root());
/// ```
#[derive(Clone)]
pub struct ServiceScope {
    core: Arc<ProviderCore>,
    state: Arc<ScopeState>,
}

impl ServiceScope {
    /// The root scope of `core`
    pub(crate) fn root_of(core: Arc<ProviderCore>) -> Self {
        let state = Arc::clone(core.root_state());
        Self { core, state }
    }

    /// A fresh child scope of `core`
    pub(crate) fn child_of(core: Arc<ProviderCore>) -> Self {
        let state = Arc::new(ScopeState::new());

        #[cfg(feature = "logging")]
        debug!(
            target: "dependency_realizer",
            scope_id = state.id.id(),
            "Creating service scope"
        );

        Self { core, state }
    }

    /// The scope identifier
    #[inline]
    pub fn id(&self) -> ScopeId {
        self.state.id
    }

    /// True for the provider's root scope
    #[inline]
    pub fn is_root(&self) -> bool {
        Arc::ptr_eq(&self.state, self.core.root_state())
    }

    /// Create a new scope from the same provider
    #[inline]
    pub fn create_scope(&self) -> ServiceScope {
        Self::child_of(Arc::clone(&self.core))
    }

    /// The provider this scope belongs to
    #[inline]
    pub fn provider(&self) -> ServiceProvider {
        ServiceProvider::from_core(Arc::clone(&self.core))
    }

    /// Resolve a service by key
    pub fn get_key(&self, key: &ServiceKey) -> Result<Instance> {
        #[cfg(feature = "logging")]
        trace!(
            target: "dependency_realizer",
            service = key.name(),
            scope_id = self.state.id.id(),
            "Resolving service"
        );

        let accessor = self.core.accessor(key)?;
        accessor(self)
    }

    /// Resolve a service by type
    #[inline]
    pub fn get<T: Injectable>(&self) -> Result<Arc<T>> {
        self.get_typed(&ServiceKey::of::<T>())
    }

    /// Resolve a closing of the open generic family `definition`
    ///
    /// An exact registration for `T` takes precedence over the family.
    #[inline]
    pub fn get_closed<T: Injectable>(&self, definition: &'static str) -> Result<Arc<T>> {
        self.get_typed(&ServiceKey::closed::<T>(definition))
    }

    /// Try to resolve, returning None on any error
    #[inline]
    pub fn try_get<T: Injectable>(&self) -> Option<Arc<T>> {
        self.get::<T>().ok()
    }

    /// Number of instances cached in this scope
    #[inline]
    pub fn cached_instances(&self) -> usize {
        self.state.len()
    }

    fn get_typed<T: Injectable>(&self, key: &ServiceKey) -> Result<Arc<T>> {
        self.get_key(key)?
            .downcast::<T>()
            .map_err(|_| DiError::type_mismatch::<T>())
    }

    #[inline]
    pub(crate) fn state(&self) -> &ScopeState {
        &self.state
    }

    #[inline]
    pub(crate) fn root_state(&self) -> &ScopeState {
        self.core.root_state()
    }

    #[inline]
    pub(crate) fn root(&self) -> ServiceScope {
        Self::root_of(Arc::clone(&self.core))
    }

    #[inline]
    pub(crate) fn scope_factory(&self) -> ScopeFactory {
        ScopeFactory {
            core: Arc::downgrade(&self.core),
        }
    }
}

impl std::fmt::Debug for ServiceScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceScope")
            .field("id", &self.state.id)
            .field("is_root", &self.is_root())
            .field("cached_instances", &self.cached_instances())
            .finish()
    }
}

/// Creates scopes; always resolvable from any provider.
///
/// Holds the provider weakly, so storing one inside a singleton does not
/// keep the provider alive.
#[derive(Clone)]
pub struct ScopeFactory {
    core: Weak<ProviderCore>,
}

impl ScopeFactory {
    /// Create a new scope, failing if the provider is gone
    pub fn create_scope(&self) -> Result<ServiceScope> {
        let core = self.core.upgrade().ok_or(DiError::ParentDropped)?;
        Ok(ServiceScope::child_of(core))
    }
}

impl std::fmt::Debug for ScopeFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeFactory")
            .field("alive", &(self.core.strong_count() > 0))
            .finish()
    }
}
