//! Resolution plans ("call sites")
//!
//! A [`CallSite`] describes how to produce one service: where its instance
//! is cached and what it is built from. The [`CallSiteFactory`] turns keys
//! into call-site trees, rejecting cycles and missing dependencies. A tree
//! can then be interpreted directly ([`resolve`]) or compiled into an
//! accessor closure ([`compile`]).

use crate::collection::{ConstructFn, FactoryFn, Strategy};
use crate::{
    Accessor, DiError, Instance, Lifetime, Result, ScopeFactory, ServiceDescriptor, ServiceKey,
    ServiceProvider, ServiceScope,
};
use ahash::RandomState;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(feature = "logging")]
use tracing::trace;

/// Where a resolved instance is kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLocation {
    /// Root scope (singletons)
    Root,
    /// The requesting scope (scoped services)
    Scope,
    /// Not cached (transients, constants, implicit handles)
    None,
}

impl From<Lifetime> for CacheLocation {
    fn from(lifetime: Lifetime) -> Self {
        match lifetime {
            Lifetime::Singleton => CacheLocation::Root,
            Lifetime::Scoped => CacheLocation::Scope,
            Lifetime::Transient => CacheLocation::None,
        }
    }
}

pub(crate) enum CallSiteKind {
    Constant(Instance),
    Constructor {
        construct: ConstructFn,
        dependencies: Vec<Arc<CallSite>>,
    },
    Factory(FactoryFn),
    ServiceProvider,
    ScopeFactory,
}

/// A resolution plan for a single key
pub struct CallSite {
    key: ServiceKey,
    cache: CacheLocation,
    kind: CallSiteKind,
}

impl CallSite {
    /// The key this plan produces
    #[inline]
    pub fn key(&self) -> ServiceKey {
        self.key
    }

    /// Where the produced instance is cached
    #[inline]
    pub fn cache(&self) -> CacheLocation {
        self.cache
    }

    /// Plans this one is built from
    pub fn dependencies(&self) -> &[Arc<CallSite>] {
        match &self.kind {
            CallSiteKind::Constructor { dependencies, .. } => dependencies,
            _ => &[],
        }
    }
}

impl std::fmt::Debug for CallSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            CallSiteKind::Constant(_) => "constant",
            CallSiteKind::Constructor { .. } => "constructor",
            CallSiteKind::Factory(_) => "factory",
            CallSiteKind::ServiceProvider => "service_provider",
            CallSiteKind::ScopeFactory => "scope_factory",
        };
        f.debug_struct("CallSite")
            .field("key", &self.key)
            .field("cache", &self.cache)
            .field("kind", &kind)
            .field("dependencies", &self.dependencies().len())
            .finish()
    }
}

/// Keys whose plans are currently being built, in request order
struct CallSiteChain {
    keys: Vec<ServiceKey>,
}

impl CallSiteChain {
    fn new() -> Self {
        Self { keys: Vec::new() }
    }

    fn enter(&mut self, key: &ServiceKey) -> Result<()> {
        if self.keys.contains(key) {
            let mut path: Vec<&'static str> = self.keys.iter().map(ServiceKey::name).collect();
            path.push(key.name());
            return Err(DiError::CircularDependency { path });
        }
        self.keys.push(*key);
        Ok(())
    }

    fn leave(&mut self) {
        self.keys.pop();
    }
}

/// Memo identity of a plan: the key plus the family it may be closed from.
///
/// Keys compare equal regardless of family, but a request without a family
/// must never be answered by a plan closed from an open generic.
pub(crate) type PlanKey = (ServiceKey, Option<&'static str>);

/// Builds and memoizes call-site trees from registrations.
pub struct CallSiteFactory {
    descriptors: HashMap<ServiceKey, ServiceDescriptor, RandomState>,
    plans: DashMap<PlanKey, Arc<CallSite>, RandomState>,
    plans_built: AtomicUsize,
}

impl CallSiteFactory {
    /// Index registrations by key; the last registration for a key wins
    pub fn new(descriptors: &[ServiceDescriptor]) -> Self {
        let mut index = HashMap::with_capacity_and_hasher(descriptors.len(), RandomState::new());
        for descriptor in descriptors {
            index.insert(descriptor.key(), descriptor.clone());
        }

        Self {
            descriptors: index,
            plans: DashMap::with_hasher(RandomState::new()),
            plans_built: AtomicUsize::new(0),
        }
    }

    /// Plan for `key`, `None` if nothing can produce it
    pub fn create_plan(&self, key: &ServiceKey) -> Result<Option<Arc<CallSite>>> {
        self.create(key, &mut CallSiteChain::new())
    }

    /// Number of plans built so far
    #[inline]
    pub fn plans_built(&self) -> usize {
        self.plans_built.load(Ordering::Relaxed)
    }

    /// Memo identity for `key`. Exact registrations and implicit services
    /// ignore the family, so both request forms share one plan.
    pub(crate) fn plan_key(&self, key: &ServiceKey) -> PlanKey {
        let exact = self.descriptors.contains_key(key)
            || *key == ServiceKey::of::<ServiceProvider>()
            || *key == ServiceKey::of::<ScopeFactory>();
        if exact { (*key, None) } else { (*key, key.family()) }
    }

    fn create(&self, key: &ServiceKey, chain: &mut CallSiteChain) -> Result<Option<Arc<CallSite>>> {
        let plan_key = self.plan_key(key);
        if let Some(plan) = self.plans.get(&plan_key) {
            return Ok(Some(Arc::clone(&plan)));
        }

        chain.enter(key)?;
        let built = self.build(key, chain);
        chain.leave();

        let Some(site) = built? else {
            return Ok(None);
        };

        // Another thread may have finished the same plan first; keep theirs.
        let plan = match self.plans.entry(plan_key) {
            Entry::Occupied(existing) => Arc::clone(existing.get()),
            Entry::Vacant(slot) => {
                self.plans_built.fetch_add(1, Ordering::Relaxed);

                #[cfg(feature = "logging")]
                trace!(
                    target: "dependency_realizer",
                    service = key.name(),
                    cache = ?site.cache,
                    "Built resolution plan"
                );

                Arc::clone(slot.insert(Arc::new(site)).value())
            }
        };
        Ok(Some(plan))
    }

    fn build(&self, key: &ServiceKey, chain: &mut CallSiteChain) -> Result<Option<CallSite>> {
        if *key == ServiceKey::of::<ServiceProvider>() {
            return Ok(Some(CallSite {
                key: *key,
                cache: CacheLocation::None,
                kind: CallSiteKind::ServiceProvider,
            }));
        }
        if *key == ServiceKey::of::<ScopeFactory>() {
            return Ok(Some(CallSite {
                key: *key,
                cache: CacheLocation::None,
                kind: CallSiteKind::ScopeFactory,
            }));
        }
        if key.is_generic_definition() {
            return Ok(None);
        }

        if let Some(descriptor) = self.descriptors.get(key) {
            return self.build_exact(key, descriptor, chain);
        }

        Ok(self.build_open_generic(key))
    }

    fn build_exact(
        &self,
        key: &ServiceKey,
        descriptor: &ServiceDescriptor,
        chain: &mut CallSiteChain,
    ) -> Result<Option<CallSite>> {
        let cache = CacheLocation::from(descriptor.lifetime());
        let kind = match &descriptor.strategy {
            Strategy::Instance(instance) => {
                return Ok(Some(CallSite {
                    key: *key,
                    cache: CacheLocation::None,
                    kind: CallSiteKind::Constant(Arc::clone(instance)),
                }));
            }
            Strategy::Constructor {
                dependencies,
                construct,
            } => {
                let mut sites = Vec::with_capacity(dependencies.len());
                for dependency in dependencies {
                    match self.create(dependency, chain)? {
                        Some(site) => sites.push(site),
                        None => {
                            return Err(DiError::MissingDependency {
                                type_name: dependency.name(),
                                required_by: key.name(),
                            });
                        }
                    }
                }
                CallSiteKind::Constructor {
                    construct: Arc::clone(construct),
                    dependencies: sites,
                }
            }
            Strategy::Factory(factory) => CallSiteKind::Factory(Arc::clone(factory)),
            // Only ever indexed under a definition key, which never gets here
            Strategy::OpenGeneric(_) => return Ok(None),
        };

        Ok(Some(CallSite {
            key: *key,
            cache,
            kind,
        }))
    }

    fn build_open_generic(&self, key: &ServiceKey) -> Option<CallSite> {
        let family = key.family()?;
        let descriptor = self.descriptors.get(&ServiceKey::definition(family))?;
        let Strategy::OpenGeneric(factory) = &descriptor.strategy else {
            return None;
        };

        let closed = *key;
        let factory = Arc::clone(factory);
        Some(CallSite {
            key: closed,
            cache: CacheLocation::from(descriptor.lifetime()),
            kind: CallSiteKind::Factory(Arc::new(move |scope: &ServiceScope| {
                factory(&closed, scope)
            })),
        })
    }
}

/// Fetch from, or populate, the cache slot for `key` at `location`.
///
/// Root-cached services are built against the root scope so they never
/// capture a shorter-lived scope.
fn cached<F>(key: &ServiceKey, location: CacheLocation, scope: &ServiceScope, create: F) -> Result<Instance>
where
    F: FnOnce(&ServiceScope) -> Result<Instance>,
{
    match location {
        CacheLocation::None => create(scope),
        CacheLocation::Scope => scope.state().get_or_try_init(key, || create(scope)),
        CacheLocation::Root => {
            if let Some(instance) = scope.root_state().get(key) {
                return Ok(instance);
            }
            if scope.is_root() {
                return scope.state().get_or_try_init(key, || create(scope));
            }
            let root = scope.root();
            root.state().get_or_try_init(key, || create(&root))
        }
    }
}

/// Interpret a call-site tree against `scope` without compiling it
pub(crate) fn resolve(site: &CallSite, scope: &ServiceScope) -> Result<Instance> {
    match &site.kind {
        CallSiteKind::Constant(instance) => Ok(Arc::clone(instance)),
        CallSiteKind::ServiceProvider => Ok(Arc::new(scope.provider()) as Instance),
        CallSiteKind::ScopeFactory => Ok(Arc::new(scope.scope_factory()) as Instance),
        CallSiteKind::Factory(factory) => cached(&site.key, site.cache, scope, |s| factory(s)),
        CallSiteKind::Constructor {
            construct,
            dependencies,
        } => cached(&site.key, site.cache, scope, |s| {
            let instances = dependencies
                .iter()
                .map(|dependency| resolve(dependency, s))
                .collect::<Result<Vec<_>>>()?;
            construct(&instances)
        }),
    }
}

/// Compile a call-site tree into an accessor
pub(crate) fn compile(site: &Arc<CallSite>) -> Accessor<ServiceScope> {
    let body: Accessor<ServiceScope> = match &site.kind {
        CallSiteKind::Constant(instance) => {
            let instance = Arc::clone(instance);
            return Arc::new(move |_: &ServiceScope| Ok(Arc::clone(&instance)));
        }
        CallSiteKind::ServiceProvider => {
            return Arc::new(|scope: &ServiceScope| Ok(Arc::new(scope.provider()) as Instance));
        }
        CallSiteKind::ScopeFactory => {
            return Arc::new(|scope: &ServiceScope| Ok(Arc::new(scope.scope_factory()) as Instance));
        }
        CallSiteKind::Factory(factory) => {
            let factory = Arc::clone(factory);
            Arc::new(move |scope: &ServiceScope| factory(scope))
        }
        CallSiteKind::Constructor {
            construct,
            dependencies,
        } => {
            let construct = Arc::clone(construct);
            let dependencies: Vec<Accessor<ServiceScope>> = dependencies.iter().map(compile).collect();
            Arc::new(move |scope: &ServiceScope| {
                let instances = dependencies
                    .iter()
                    .map(|dependency| dependency(scope))
                    .collect::<Result<Vec<_>>>()?;
                construct(&instances)
            })
        }
    };

    let key = site.key;
    match site.cache {
        CacheLocation::None => body,
        location => Arc::new(move |scope: &ServiceScope| cached(&key, location, scope, |s| body(s))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Service;

    struct Config;
    struct Cache(Arc<Config>);
    struct Left(#[allow(dead_code)] Arc<Right>);
    struct Right(#[allow(dead_code)] Arc<Left>);
    struct Orphan(#[allow(dead_code)] Arc<Config>);

    impl Service for Config {
        type Dependencies = ();
        fn create(_: ()) -> Self {
            Config
        }
    }

    impl Service for Cache {
        type Dependencies = Arc<Config>;
        fn create(config: Arc<Config>) -> Self {
            Cache(config)
        }
    }

    impl Service for Left {
        type Dependencies = Arc<Right>;
        fn create(right: Arc<Right>) -> Self {
            Left(right)
        }
    }

    impl Service for Right {
        type Dependencies = Arc<Left>;
        fn create(left: Arc<Left>) -> Self {
            Right(left)
        }
    }

    impl Service for Orphan {
        type Dependencies = Arc<Config>;
        fn create(config: Arc<Config>) -> Self {
            Orphan(config)
        }
    }

    #[test]
    fn test_plan_tree_and_cache_locations() {
        let factory = CallSiteFactory::new(&[
            ServiceDescriptor::service::<Config>(Lifetime::Singleton),
            ServiceDescriptor::service::<Cache>(Lifetime::Scoped),
        ]);

        let plan = factory.create_plan(&ServiceKey::of::<Cache>()).unwrap().unwrap();
        assert_eq!(plan.cache(), CacheLocation::Scope);
        assert_eq!(plan.dependencies().len(), 1);
        assert_eq!(plan.dependencies()[0].key(), ServiceKey::of::<Config>());
        assert_eq!(plan.dependencies()[0].cache(), CacheLocation::Root);
    }

    #[test]
    fn test_plans_are_memoized() {
        let factory = CallSiteFactory::new(&[ServiceDescriptor::service::<Config>(Lifetime::Transient)]);

        let first = factory.create_plan(&ServiceKey::of::<Config>()).unwrap().unwrap();
        let second = factory.create_plan(&ServiceKey::of::<Config>()).unwrap().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(factory.plans_built(), 1);
    }

    #[test]
    fn test_cycle_reports_path() {
        let factory = CallSiteFactory::new(&[
            ServiceDescriptor::service::<Left>(Lifetime::Transient),
            ServiceDescriptor::service::<Right>(Lifetime::Transient),
        ]);

        let err = factory.create_plan(&ServiceKey::of::<Left>()).unwrap_err();
        match err {
            DiError::CircularDependency { path } => {
                assert_eq!(path.len(), 3);
                assert_eq!(path.first(), path.last());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_dependency() {
        let factory = CallSiteFactory::new(&[ServiceDescriptor::service::<Orphan>(Lifetime::Scoped)]);

        let err = factory.create_plan(&ServiceKey::of::<Orphan>()).unwrap_err();
        assert_eq!(
            err,
            DiError::MissingDependency {
                type_name: std::any::type_name::<Config>(),
                required_by: std::any::type_name::<Orphan>(),
            }
        );
    }

    #[test]
    fn test_unknown_and_definition_keys_have_no_plan() {
        let factory = CallSiteFactory::new(&[ServiceDescriptor::open_generic(
            "Repository",
            Lifetime::Transient,
            |key, _| Err(DiError::NotFound { type_name: key.name() }),
        )]);

        assert!(factory.create_plan(&ServiceKey::of::<Config>()).unwrap().is_none());
        assert!(factory.create_plan(&ServiceKey::definition("Repository")).unwrap().is_none());
        assert!(factory.create_plan(&ServiceKey::closed::<Config>("Repository")).unwrap().is_some());
    }

    #[test]
    fn test_family_plan_not_served_to_plain_request() {
        let factory = CallSiteFactory::new(&[ServiceDescriptor::open_generic(
            "Repository",
            Lifetime::Transient,
            |key, _| Err(DiError::NotFound { type_name: key.name() }),
        )]);
        let plain = ServiceKey::of::<Config>();
        let closed = ServiceKey::closed::<Config>("Repository");

        assert!(factory.create_plan(&plain).unwrap().is_none());
        assert!(factory.create_plan(&closed).unwrap().is_some());
        assert!(factory.create_plan(&plain).unwrap().is_none());
        assert_eq!(factory.plans_built(), 1);
    }

    #[test]
    fn test_exact_registration_shared_with_closed_request() {
        let factory = CallSiteFactory::new(&[
            ServiceDescriptor::service::<Config>(Lifetime::Singleton),
            ServiceDescriptor::open_generic("Repository", Lifetime::Transient, |key, _| {
                Err(DiError::NotFound { type_name: key.name() })
            }),
        ]);

        let closed = factory.create_plan(&ServiceKey::closed::<Config>("Repository")).unwrap().unwrap();
        let plain = factory.create_plan(&ServiceKey::of::<Config>()).unwrap().unwrap();

        assert!(Arc::ptr_eq(&closed, &plain));
        assert_eq!(plain.cache(), CacheLocation::Root);
        assert_eq!(factory.plans_built(), 1);
    }

    #[test]
    fn test_implicit_keys_always_planned() {
        let factory = CallSiteFactory::new(&[]);

        let provider = factory.create_plan(&ServiceKey::of::<ServiceProvider>()).unwrap().unwrap();
        let scopes = factory.create_plan(&ServiceKey::of::<ScopeFactory>()).unwrap().unwrap();

        assert_eq!(provider.cache(), CacheLocation::None);
        assert_eq!(scopes.cache(), CacheLocation::None);
    }

    #[test]
    fn test_last_registration_wins() {
        let factory = CallSiteFactory::new(&[
            ServiceDescriptor::service::<Config>(Lifetime::Transient),
            ServiceDescriptor::service::<Config>(Lifetime::Singleton),
        ]);

        let plan = factory.create_plan(&ServiceKey::of::<Config>()).unwrap().unwrap();
        assert_eq!(plan.cache(), CacheLocation::Root);
    }
}
