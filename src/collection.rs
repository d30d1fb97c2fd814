//! Registration model
//!
//! A [`ServiceCollection`] is the finalized list of registrations a provider
//! is built from. It is consumed by [`ServiceProvider::build`](crate::ServiceProvider::build);
//! nothing can be registered afterwards.

use crate::{Injectable, Instance, Lifetime, Result, Service, ServiceKey, ServiceScope};
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::debug;

/// Builds a service from the instances resolved for its declared dependencies
pub(crate) type ConstructFn = Arc<dyn Fn(&[Instance]) -> Result<Instance> + Send + Sync>;

/// Builds a service from the requesting scope
pub(crate) type FactoryFn = Arc<dyn Fn(&ServiceScope) -> Result<Instance> + Send + Sync>;

/// Builds any closing of an open generic family; receives the closed key
pub(crate) type GenericFn =
    Arc<dyn Fn(&ServiceKey, &ServiceScope) -> Result<Instance> + Send + Sync>;

/// How a registration produces its instance
#[derive(Clone)]
pub(crate) enum Strategy {
    /// Pre-built instance
    Instance(Instance),
    /// [`Service`] constructor with declared dependencies
    Constructor {
        dependencies: Vec<ServiceKey>,
        construct: ConstructFn,
    },
    /// Closure over the requesting scope
    Factory(FactoryFn),
    /// Open generic family
    OpenGeneric(GenericFn),
}

/// A single registration: identity, lifetime and construction strategy.
#[derive(Clone)]
pub struct ServiceDescriptor {
    key: ServiceKey,
    lifetime: Lifetime,
    pub(crate) strategy: Strategy,
}

impl ServiceDescriptor {
    /// Register a pre-built instance (always a singleton)
    pub fn instance<T: Injectable>(value: T) -> Self {
        Self {
            key: ServiceKey::of::<T>(),
            lifetime: Lifetime::Singleton,
            strategy: Strategy::Instance(Arc::new(value)),
        }
    }

    /// Register a [`Service`] built from its declared dependencies
    pub fn service<T: Service>(lifetime: Lifetime) -> Self {
        use crate::Dependencies;

        let construct: ConstructFn = Arc::new(|instances: &[Instance]| {
            let deps = T::Dependencies::from_instances(instances)?;
            Ok(Arc::new(T::create(deps)) as Instance)
        });

        Self {
            key: ServiceKey::of::<T>(),
            lifetime,
            strategy: Strategy::Constructor {
                dependencies: T::Dependencies::keys(),
                construct,
            },
        }
    }

    /// Register a factory closure over the requesting scope.
    ///
    /// Dependencies fetched inside the closure are not visible to the plan
    /// factory, so they are only checked when the closure runs.
    pub fn factory<T, F>(lifetime: Lifetime, factory: F) -> Self
    where
        T: Injectable,
        F: Fn(&ServiceScope) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            key: ServiceKey::of::<T>(),
            lifetime,
            strategy: Strategy::Factory(Arc::new(move |scope: &ServiceScope| {
                factory(scope).map(|value| Arc::new(value) as Instance)
            })),
        }
    }

    /// Register an open generic family under `definition`.
    ///
    /// The closure is called with the closed key being resolved, e.g.
    /// `ServiceKey::closed::<Repository<u32>>("Repository")`, and must return
    /// an instance of exactly that type.
    pub fn open_generic<F>(definition: &'static str, lifetime: Lifetime, factory: F) -> Self
    where
        F: Fn(&ServiceKey, &ServiceScope) -> Result<Instance> + Send + Sync + 'static,
    {
        Self {
            key: ServiceKey::definition(definition),
            lifetime,
            strategy: Strategy::OpenGeneric(Arc::new(factory)),
        }
    }

    /// The registered identity
    #[inline]
    pub fn key(&self) -> ServiceKey {
        self.key
    }

    /// The registered lifetime
    #[inline]
    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    /// True when this registration is an open generic definition
    #[inline]
    pub fn is_generic_definition(&self) -> bool {
        self.key.is_generic_definition()
    }
}

impl std::fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let strategy = match self.strategy {
            Strategy::Instance(_) => "instance",
            Strategy::Constructor { .. } => "constructor",
            Strategy::Factory(_) => "factory",
            Strategy::OpenGeneric(_) => "open_generic",
        };
        f.debug_struct("ServiceDescriptor")
            .field("key", &self.key)
            .field("lifetime", &self.lifetime)
            .field("strategy", &strategy)
            .finish()
    }
}

/// Ordered collection of registrations.
///
/// When several registrations share a key, the last one wins.
///
/// # Examples
///
/// ```rust
/// use dependency_realizer::{Lifetime, ServiceCollection};
///
/// #[derive(Clone)]
/// struct Config { debug: bool }
///
/// struct RequestId(u64);
///
/// let mut services = ServiceCollection::new();
/// services
///     .add_instance(Config { debug: true })
///     .add_transient_factory(|_| Ok(RequestId(7)));
///
/// assert_eq!(services.len(), 2);
/// ```
#[derive(Clone, Default, Debug)]
pub struct ServiceCollection {
    descriptors: Vec<ServiceDescriptor>,
}

impl ServiceCollection {
    /// Create an empty collection
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a descriptor
    pub fn add(&mut self, descriptor: ServiceDescriptor) -> &mut Self {
        #[cfg(feature = "logging")]
        debug!(
            target: "dependency_realizer",
            service = descriptor.key().name(),
            lifetime = descriptor.lifetime().as_str(),
            service_count = self.descriptors.len() + 1,
            "Registering service"
        );

        self.descriptors.push(descriptor);
        self
    }

    /// Register a pre-built singleton instance
    #[inline]
    pub fn add_instance<T: Injectable>(&mut self, value: T) -> &mut Self {
        self.add(ServiceDescriptor::instance(value))
    }

    /// Register a [`Service`] as a singleton
    #[inline]
    pub fn add_singleton<T: Service>(&mut self) -> &mut Self {
        self.add(ServiceDescriptor::service::<T>(Lifetime::Singleton))
    }

    /// Register a [`Service`] once per scope
    #[inline]
    pub fn add_scoped<T: Service>(&mut self) -> &mut Self {
        self.add(ServiceDescriptor::service::<T>(Lifetime::Scoped))
    }

    /// Register a [`Service`] created on every resolve
    #[inline]
    pub fn add_transient<T: Service>(&mut self) -> &mut Self {
        self.add(ServiceDescriptor::service::<T>(Lifetime::Transient))
    }

    /// Register a singleton factory
    #[inline]
    pub fn add_singleton_factory<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Injectable,
        F: Fn(&ServiceScope) -> Result<T> + Send + Sync + 'static,
    {
        self.add(ServiceDescriptor::factory(Lifetime::Singleton, factory))
    }

    /// Register a scoped factory
    #[inline]
    pub fn add_scoped_factory<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Injectable,
        F: Fn(&ServiceScope) -> Result<T> + Send + Sync + 'static,
    {
        self.add(ServiceDescriptor::factory(Lifetime::Scoped, factory))
    }

    /// Register a transient factory
    #[inline]
    pub fn add_transient_factory<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Injectable,
        F: Fn(&ServiceScope) -> Result<T> + Send + Sync + 'static,
    {
        self.add(ServiceDescriptor::factory(Lifetime::Transient, factory))
    }

    /// Register an open generic family
    #[inline]
    pub fn add_open_generic<F>(
        &mut self,
        definition: &'static str,
        lifetime: Lifetime,
        factory: F,
    ) -> &mut Self
    where
        F: Fn(&ServiceKey, &ServiceScope) -> Result<Instance> + Send + Sync + 'static,
    {
        self.add(ServiceDescriptor::open_generic(definition, lifetime, factory))
    }

    /// Check whether any registration uses `key`
    pub fn contains(&self, key: &ServiceKey) -> bool {
        self.descriptors.iter().any(|d| d.key() == *key)
    }

    /// All registrations, in registration order
    #[inline]
    pub fn descriptors(&self) -> &[ServiceDescriptor] {
        &self.descriptors
    }

    /// Number of registrations
    #[inline]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Check if empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

impl Extend<ServiceDescriptor> for ServiceCollection {
    fn extend<I: IntoIterator<Item = ServiceDescriptor>>(&mut self, iter: I) {
        for descriptor in iter {
            self.add(descriptor);
        }
    }
}

impl FromIterator<ServiceDescriptor> for ServiceCollection {
    fn from_iter<I: IntoIterator<Item = ServiceDescriptor>>(iter: I) -> Self {
        let mut collection = Self::new();
        collection.extend(iter);
        collection
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Clock;

    impl Service for Clock {
        type Dependencies = ();

        fn create(_: ()) -> Self {
            Clock
        }
    }

    #[test]
    fn test_descriptor_kinds() {
        let instance = ServiceDescriptor::instance(5u8);
        assert_eq!(instance.lifetime(), Lifetime::Singleton);
        assert_eq!(instance.key(), ServiceKey::of::<u8>());

        let service = ServiceDescriptor::service::<Clock>(Lifetime::Scoped);
        assert_eq!(service.lifetime(), Lifetime::Scoped);
        assert!(!service.is_generic_definition());

        let open = ServiceDescriptor::open_generic("Repository", Lifetime::Transient, |key, _| {
            Err(crate::DiError::NotFound { type_name: key.name() })
        });
        assert!(open.is_generic_definition());
    }

    #[test]
    fn test_collection_chaining() {
        let mut services = ServiceCollection::new();
        services
            .add_instance(1u32)
            .add_transient::<Clock>()
            .add_scoped_factory(|_| Ok(String::from("scoped")));

        assert_eq!(services.len(), 3);
        assert!(services.contains(&ServiceKey::of::<Clock>()));
        assert!(!services.contains(&ServiceKey::of::<u64>()));
    }

    #[test]
    fn test_from_iterator() {
        let services: ServiceCollection = vec![
            ServiceDescriptor::instance(1u32),
            ServiceDescriptor::service::<Clock>(Lifetime::Singleton),
        ]
        .into_iter()
        .collect();

        assert_eq!(services.descriptors()[1].key(), ServiceKey::of::<Clock>());
    }
}
