//! Fallback resolver contract and its default implementation
//!
//! The realization pipeline never builds plans or compiles accessors itself.
//! It asks a [`FallbackResolver`] to do so, and hands it every lookup the
//! frozen snapshot cannot answer.

use crate::call_site::{self, CallSite, CallSiteFactory, PlanKey};
use crate::{DiError, Result, ServiceDescriptor, ServiceKey, ServiceScope};
use ahash::RandomState;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// A type-erased service instance
pub type Instance = Arc<dyn Any + Send + Sync>;

/// A compiled, reusable function producing an instance for a scope.
///
/// Accessors close over immutable compiled state only, so any number of
/// threads may invoke one against any number of scopes.
pub type Accessor<S> = Arc<dyn Fn(&S) -> Result<Instance> + Send + Sync>;

/// Plan creation, compilation and post-build realization.
///
/// Implementations own their concurrency discipline: the pipeline calls
/// [`get_or_create_accessor`](Self::get_or_create_accessor) and
/// [`realize`](Self::realize) from arbitrary threads once frozen.
pub trait FallbackResolver: Send + Sync {
    /// A resolution plan for one key
    type Plan;

    /// The scope accessors run against
    type Scope;

    /// Build the plan for `key`, or report that none exists.
    ///
    /// Missing dependencies and cycles are errors; an unknown key is `None`.
    fn create_plan(&self, key: &ServiceKey) -> Result<Option<Self::Plan>>;

    /// Materialize `plan` immediately against `root`
    fn force_resolve(&self, plan: &Self::Plan, root: &Self::Scope) -> Result<Instance>;

    /// Turn `plan` into a reusable accessor
    fn compile(&self, plan: &Self::Plan) -> Accessor<Self::Scope>;

    /// Cached accessor for keys the snapshot does not hold.
    ///
    /// At most one compilation per key runs under concurrent callers.
    fn get_or_create_accessor(&self, key: &ServiceKey) -> Result<Accessor<Self::Scope>>;

    /// Realize `plan` once the snapshot is frozen, caching in the resolver
    fn realize(&self, key: &ServiceKey, plan: &Self::Plan) -> Accessor<Self::Scope>;
}

/// Default resolver: call-site plans, a runtime interpreter for eager
/// resolution, and closure compilation cached per key.
pub struct CallSiteResolver {
    plans: CallSiteFactory,
    accessors: DashMap<PlanKey, Arc<OnceCell<Accessor<ServiceScope>>>, RandomState>,
    fallback_lookups: AtomicUsize,
}

impl CallSiteResolver {
    /// Create a resolver over a finalized set of registrations
    pub fn new(descriptors: &[ServiceDescriptor]) -> Self {
        Self {
            plans: CallSiteFactory::new(descriptors),
            accessors: DashMap::with_hasher(RandomState::new()),
            fallback_lookups: AtomicUsize::new(0),
        }
    }

    /// Number of `get_or_create_accessor` calls so far
    #[inline]
    pub fn fallback_lookups(&self) -> usize {
        self.fallback_lookups.load(Ordering::Relaxed)
    }

    /// Number of plans actually built (memoized plans are not counted twice)
    #[inline]
    pub fn plans_built(&self) -> usize {
        self.plans.plans_built()
    }

    /// Number of accessors cached on the fallback path
    #[inline]
    pub fn cached_accessors(&self) -> usize {
        self.accessors
            .iter()
            .filter(|entry| entry.value().get().is_some())
            .count()
    }

    #[inline]
    fn cell(&self, plan_key: PlanKey) -> Arc<OnceCell<Accessor<ServiceScope>>> {
        Arc::clone(&self.accessors.entry(plan_key).or_default())
    }
}

impl FallbackResolver for CallSiteResolver {
    type Plan = Arc<CallSite>;
    type Scope = ServiceScope;

    #[inline]
    fn create_plan(&self, key: &ServiceKey) -> Result<Option<Arc<CallSite>>> {
        self.plans.create_plan(key)
    }

    #[inline]
    fn force_resolve(&self, plan: &Arc<CallSite>, root: &ServiceScope) -> Result<Instance> {
        call_site::resolve(plan, root)
    }

    #[inline]
    fn compile(&self, plan: &Arc<CallSite>) -> Accessor<ServiceScope> {
        call_site::compile(plan)
    }

    fn get_or_create_accessor(&self, key: &ServiceKey) -> Result<Accessor<ServiceScope>> {
        self.fallback_lookups.fetch_add(1, Ordering::Relaxed);

        // The map entry is released before compiling; the cell serializes
        // concurrent compilations of the same key.
        let plan_key = self.plans.plan_key(key);
        let cell = self.cell(plan_key);
        let result = cell.get_or_try_init(|| {
            #[cfg(feature = "logging")]
            debug!(
                target: "dependency_realizer",
                service = key.name(),
                "Realizing service on the fallback path"
            );

            match self.plans.create_plan(key)? {
                Some(plan) => Ok(call_site::compile(&plan)),
                None => Err(DiError::NotFound {
                    type_name: key.name(),
                }),
            }
        });

        match result {
            Ok(accessor) => Ok(Arc::clone(accessor)),
            Err(err) => {
                // Plan failures are deterministic; keep no empty slot behind
                self.accessors.remove_if(&plan_key, |_, cell| cell.get().is_none());
                Err(err)
            }
        }
    }

    fn realize(&self, key: &ServiceKey, plan: &Arc<CallSite>) -> Accessor<ServiceScope> {
        #[cfg(feature = "logging")]
        trace!(
            target: "dependency_realizer",
            service = key.name(),
            "Realizing service after freeze"
        );

        let cell = self.cell(self.plans.plan_key(key));
        Arc::clone(cell.get_or_init(|| call_site::compile(plan)))
    }
}

impl std::fmt::Debug for CallSiteResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSiteResolver")
            .field("plans_built", &self.plans_built())
            .field("fallback_lookups", &self.fallback_lookups())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Lifetime;
    use std::marker::PhantomData;

    struct Repository<T>(PhantomData<T>);
    struct User;

    fn open_repository() -> ServiceDescriptor {
        ServiceDescriptor::open_generic("Repository", Lifetime::Transient, |key, _| {
            Err(DiError::NotFound { type_name: key.name() })
        })
    }

    #[test]
    fn test_plain_lookup_independent_of_closed_lookup() {
        let resolver = CallSiteResolver::new(&[open_repository()]);
        let plain = ServiceKey::of::<Repository<User>>();
        let closed = ServiceKey::closed::<Repository<User>>("Repository");

        assert!(resolver.get_or_create_accessor(&plain).is_err());
        assert!(resolver.get_or_create_accessor(&closed).is_ok());
        assert!(resolver.get_or_create_accessor(&plain).is_err());
        assert!(resolver.get_or_create_accessor(&closed).is_ok());

        assert_eq!(resolver.plans_built(), 1);
        assert_eq!(resolver.cached_accessors(), 1);
    }

    #[test]
    fn test_failed_lookup_leaves_no_slot() {
        let resolver = CallSiteResolver::new(&[open_repository()]);

        for _ in 0..3 {
            let err = resolver.get_or_create_accessor(&ServiceKey::of::<User>()).err();
            assert_eq!(err, Some(DiError::not_found::<User>()));
        }

        assert!(resolver.accessors.is_empty());
        assert_eq!(resolver.fallback_lookups(), 3);
    }

    #[test]
    fn test_realize_shares_fallback_cell() {
        let resolver = CallSiteResolver::new(&[open_repository()]);
        let closed = ServiceKey::closed::<Repository<User>>("Repository");

        let plan = resolver.create_plan(&closed).unwrap().unwrap();
        let realized = resolver.realize(&closed, &plan);
        let looked_up = resolver.get_or_create_accessor(&closed).unwrap();

        assert!(Arc::ptr_eq(&realized, &looked_up));
        assert_eq!(resolver.accessors.len(), 1);
    }
}
