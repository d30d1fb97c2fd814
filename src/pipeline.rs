//! Two-phase realization pipeline
//!
//! Startup runs in two phases before the provider is handed to callers:
//!
//! 1. **Singleton pre-resolution** - the implicit provider and scope-factory
//!    services, then every closed singleton, are resolved against the root
//!    scope so configuration errors surface immediately.
//! 2. **Realization** - every closed registration gets a compiled accessor,
//!    collected in a build-time store and finally frozen into an
//!    [`AccessorSnapshot`].
//!
//! The pipeline is either [`Building`](PipelineState::Building) or
//! [`Frozen`](PipelineState::Frozen), and only ever moves forward. Once
//! frozen it is never mutated; anything the snapshot misses goes to the
//! [`FallbackResolver`].

use crate::snapshot::DEFAULT_BUCKET_COUNT;
use crate::store::BuildTimeAccessorStore;
use crate::{
    Accessor, AccessorSnapshot, FallbackResolver, Lifetime, Result, ScopeFactory, ServiceDescriptor,
    ServiceKey, ServiceProvider,
};
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// Identities every provider serves without a registration
#[inline]
pub fn implicit_keys() -> [ServiceKey; 2] {
    [ServiceKey::of::<ServiceProvider>(), ServiceKey::of::<ScopeFactory>()]
}

enum PipelineState<S> {
    /// Still inside `initialize`, owned by a single thread
    Building(BuildTimeAccessorStore<S>),
    /// Published; read-only for the rest of the pipeline's life
    Frozen(AccessorSnapshot<S>),
}

/// Eager-build accessor cache and its realization protocol.
pub struct RealizationPipeline<R: FallbackResolver> {
    resolver: Arc<R>,
    state: PipelineState<R::Scope>,
}

impl<R: FallbackResolver> RealizationPipeline<R> {
    /// Run both startup phases and freeze the snapshot.
    ///
    /// `registrations` is the finalized registration set. Any plan error
    /// aborts initialization; no partially built pipeline is returned.
    pub fn initialize(resolver: Arc<R>, registrations: &[ServiceDescriptor], root: &R::Scope) -> Result<Self> {
        Self::with_bucket_count(resolver, registrations, root, DEFAULT_BUCKET_COUNT)
    }

    /// [`initialize`](Self::initialize) with an explicit snapshot bucket count
    pub fn with_bucket_count(
        resolver: Arc<R>,
        registrations: &[ServiceDescriptor],
        root: &R::Scope,
        bucket_count: usize,
    ) -> Result<Self> {
        #[cfg(feature = "logging")]
        debug!(
            target: "dependency_realizer",
            registrations = registrations.len(),
            "Initializing realization pipeline"
        );

        let mut pipeline = Self {
            resolver,
            state: PipelineState::Building(BuildTimeAccessorStore::with_capacity(registrations.len() + 2)),
        };

        pipeline.resolve_singletons(registrations, root)?;
        pipeline.realize_closed_services(registrations)?;
        pipeline.freeze(bucket_count);

        Ok(pipeline)
    }

    /// Accessor for `key`: the snapshot entry if there is one, otherwise
    /// whatever the fallback resolver produces (including its errors).
    #[inline]
    pub fn get_accessor(&self, key: &ServiceKey) -> Result<Accessor<R::Scope>> {
        let hit = match &self.state {
            PipelineState::Frozen(snapshot) => snapshot.get(key),
            PipelineState::Building(store) => store.get(key),
        };

        if let Some(accessor) = hit {
            #[cfg(feature = "logging")]
            trace!(
                target: "dependency_realizer",
                service = key.name(),
                location = "snapshot",
                "Accessor served from snapshot"
            );
            return Ok(Arc::clone(accessor));
        }

        #[cfg(feature = "logging")]
        trace!(
            target: "dependency_realizer",
            service = key.name(),
            "Snapshot miss, delegating to fallback resolver"
        );

        self.resolver.get_or_create_accessor(key)
    }

    /// Turn `plan` into the accessor for `key`.
    ///
    /// While building, the plan is compiled and recorded for the snapshot.
    /// Once frozen the snapshot is left alone and the resolver's own
    /// post-build realization path is used instead.
    pub fn realize_accessor(&mut self, key: &ServiceKey, plan: &R::Plan) -> Accessor<R::Scope> {
        match &mut self.state {
            PipelineState::Building(store) => {
                let accessor = self.resolver.compile(plan);
                store.insert(*key, Arc::clone(&accessor));
                accessor
            }
            PipelineState::Frozen(_) => self.resolver.realize(key, plan),
        }
    }

    /// True once the snapshot exists
    #[inline]
    pub fn is_frozen(&self) -> bool {
        matches!(self.state, PipelineState::Frozen(_))
    }

    /// The frozen snapshot, if initialization has finished
    #[inline]
    pub fn snapshot(&self) -> Option<&AccessorSnapshot<R::Scope>> {
        match &self.state {
            PipelineState::Frozen(snapshot) => Some(snapshot),
            PipelineState::Building(_) => None,
        }
    }

    /// The resolver used for plans and fallback lookups
    #[inline]
    pub fn resolver(&self) -> &Arc<R> {
        &self.resolver
    }

    fn resolve_singletons(&self, registrations: &[ServiceDescriptor], root: &R::Scope) -> Result<()> {
        #[cfg(feature = "logging")]
        let mut resolved = 0usize;

        let singletons = registrations
            .iter()
            .filter(|d| d.lifetime() == Lifetime::Singleton && !d.is_generic_definition())
            .map(ServiceDescriptor::key);

        for key in implicit_keys().into_iter().chain(singletons) {
            // No plan means the key is served some other way; nothing to do
            if let Some(plan) = self.resolver.create_plan(&key)? {
                self.resolver.force_resolve(&plan, root)?;

                #[cfg(feature = "logging")]
                {
                    resolved += 1;
                }
            }
        }

        #[cfg(feature = "logging")]
        debug!(
            target: "dependency_realizer",
            resolved,
            "Singleton pre-resolution complete"
        );

        Ok(())
    }

    fn realize_closed_services(&mut self, registrations: &[ServiceDescriptor]) -> Result<()> {
        let closed = registrations
            .iter()
            .filter(|d| !d.is_generic_definition())
            .map(ServiceDescriptor::key);

        for key in closed.chain(implicit_keys()) {
            if let Some(plan) = self.resolver.create_plan(&key)? {
                self.realize_accessor(&key, &plan);
            }
        }

        Ok(())
    }

    fn freeze(&mut self, bucket_count: usize) {
        if let PipelineState::Building(store) = &mut self.state {
            let store = std::mem::take(store);

            #[cfg(feature = "logging")]
            debug!(
                target: "dependency_realizer",
                entries = store.len(),
                bucket_count,
                "Freezing accessor snapshot"
            );

            self.state = PipelineState::Frozen(AccessorSnapshot::with_bucket_count(store.into_entries(), bucket_count));
        }
    }
}

impl<R: FallbackResolver> std::fmt::Debug for RealizationPipeline<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = match &self.state {
            PipelineState::Building(store) => store.len(),
            PipelineState::Frozen(snapshot) => snapshot.len(),
        };
        f.debug_struct("RealizationPipeline")
            .field("frozen", &self.is_frozen())
            .field("entries", &entries)
            .finish()
    }
}
