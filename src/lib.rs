//! # Dependency Realizer - Precompiled Service Resolution
//!
//! Turns a finished table of service registrations into compiled accessor
//! functions, once, at startup. Steady-state resolution is a lock-free lookup
//! in an immutable snapshot followed by a call to the accessor.
//!
//! ## Features
//!
//! - **Eager build** - Singletons are created and every closed registration is
//!   compiled before the provider is handed out; configuration errors fail the
//!   build instead of the first request
//! - **Immutable snapshot** - Fixed-bucket table, never resized, never mutated
//!   after construction
//! - **Lifetimes** - Singleton, scoped and transient services with per-scope
//!   instance caches
//! - **Open generics** - Generic families resolved on demand through the
//!   fallback resolver
//! - **Observable** - Optional tracing integration with JSON or pretty output
//!
//! ## Quick Start
//!
//! ```rust
//! use dependency_realizer::{Service, ServiceCollection, ServiceProvider};
//! use std::sync::Arc;
//!
//! struct Config {
//!     url: String,
//! }
//!
//! struct Database {
//!     config: Arc<Config>,
//! }
//!
//! impl Service for Database {
//!     type Dependencies = Arc<Config>;
//!
//!     fn create(config: Arc<Config>) -> Self {
//!         Database { config }
//!     }
//! }
//!
//! let mut services = ServiceCollection::new();
//! services
//!     .add_instance(Config { url: "postgres://localhost".into() })
//!     .add_singleton::<Database>();
//!
//! // Database is created here, during the build
//! let provider = ServiceProvider::build(services).unwrap();
//!
//! let db = provider.get::<Database>().unwrap();
//! assert_eq!(db.config.url, "postgres://localhost");
//! ```
//!
//! ## Scopes
//!
//! ```rust
//! use dependency_realizer::{ServiceCollection, ServiceProvider};
//! use std::sync::Arc;
//!
//! struct RequestContext {
//!     scope: u64,
//! }
//!
//! let mut services = ServiceCollection::new();
//! services.add_scoped_factory(|scope| Ok(RequestContext { scope: scope.id().id() }));
//!
//! let provider = ServiceProvider::build(services).unwrap();
//!
//! let first = provider.create_scope();
//! let second = provider.create_scope();
//! let a = first.get::<RequestContext>().unwrap();
//! assert!(Arc::ptr_eq(&a, &first.get::<RequestContext>().unwrap()));
//! assert_ne!(a.scope, second.get::<RequestContext>().unwrap().scope);
//! ```
//!
//! ## Open Generics
//!
//! ```rust
//! use dependency_realizer::{Instance, Lifetime, ServiceCollection, ServiceKey, ServiceProvider};
//! use std::marker::PhantomData;
//! use std::sync::Arc;
//!
//! struct Repository<T> {
//!     table: &'static str,
//!     _entity: PhantomData<T>,
//! }
//!
//! struct User;
//!
//! let mut services = ServiceCollection::new();
//! services.add_open_generic("Repository", Lifetime::Singleton, |key, _| {
//!     if *key == ServiceKey::of::<Repository<User>>() {
//!         return Ok(Arc::new(Repository::<User> { table: "users", _entity: PhantomData }) as Instance);
//!     }
//!     Err(dependency_realizer::DiError::NotFound { type_name: key.name() })
//! });
//!
//! let provider = ServiceProvider::build(services).unwrap();
//! let users = provider.get_closed::<Repository<User>>("Repository").unwrap();
//! assert_eq!(users.table, "users");
//! ```

mod call_site;
mod collection;
mod container;
mod error;
mod key;
#[cfg(feature = "logging")]
pub mod logging;
mod pipeline;
mod provider;
mod resolver;
mod scope;
mod service;
mod snapshot;
mod store;

pub use call_site::{CacheLocation, CallSite, CallSiteFactory};
pub use collection::{ServiceCollection, ServiceDescriptor};
pub use container::{ProviderDiagnostics, ProviderMode, ProviderOptions, ServiceProvider};
pub use error::*;
pub use key::*;
pub use pipeline::{RealizationPipeline, implicit_keys};
pub use provider::*;
pub use resolver::{Accessor, CallSiteResolver, FallbackResolver, Instance};
pub use scope::{ScopeFactory, ScopeId, ServiceScope};
pub use service::*;
pub use snapshot::{AccessorSnapshot, DEFAULT_BUCKET_COUNT};

// Re-export tracing macros for convenience when logging feature is enabled
#[cfg(feature = "logging")]
pub use tracing::{debug, error, info, trace, warn};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        DiError, Injectable, Lifetime, ProviderOptions, Result, ScopeFactory, Service, ServiceCollection,
        ServiceKey, ServiceProvider, ServiceScope,
    };
    pub use std::sync::Arc;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::marker::PhantomData;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    struct Alpha;
    struct Beta;
    struct Gamma;

    macro_rules! leaf_service {
        ($($t:ident),+) => {$(
            impl Service for $t {
                type Dependencies = ();
                fn create(_: ()) -> Self {
                    $t
                }
            }
        )+};
    }

    leaf_service!(Alpha, Beta, Gamma);

    fn lifetimes() -> ServiceCollection {
        let mut services = ServiceCollection::new();
        services
            .add_singleton::<Alpha>()
            .add_scoped::<Beta>()
            .add_transient::<Gamma>();
        services
    }

    #[test]
    fn test_lifetime_scenario() {
        let provider = ServiceProvider::build(lifetimes()).unwrap();
        let s1 = provider.create_scope();
        let s2 = provider.create_scope();

        let alpha = provider.accessor(&ServiceKey::of::<Alpha>()).unwrap();
        assert!(Arc::ptr_eq(&alpha(&s1).unwrap(), &alpha(&s2).unwrap()));

        let beta = provider.accessor(&ServiceKey::of::<Beta>()).unwrap();
        assert!(Arc::ptr_eq(&beta(&s1).unwrap(), &beta(&s1).unwrap()));
        assert!(!Arc::ptr_eq(&beta(&s1).unwrap(), &beta(&s2).unwrap()));

        let gamma = provider.accessor(&ServiceKey::of::<Gamma>()).unwrap();
        assert!(!Arc::ptr_eq(&gamma(&s1).unwrap(), &gamma(&s1).unwrap()));
    }

    #[test]
    fn test_closed_services_skip_fallback() {
        let provider = ServiceProvider::build(lifetimes()).unwrap();
        let before = provider.diagnostics().fallback_lookups;

        let scope = provider.create_scope();
        for _ in 0..3 {
            scope.get::<Alpha>().unwrap();
            scope.get::<Beta>().unwrap();
            scope.get::<Gamma>().unwrap();
            scope.get::<ServiceProvider>().unwrap();
            scope.get::<ScopeFactory>().unwrap();
        }

        assert_eq!(provider.diagnostics().fallback_lookups, before);
        assert_eq!(provider.diagnostics().snapshot_entries, 5);
    }

    struct Repository<T> {
        entity: &'static str,
        _entity: PhantomData<T>,
    }

    #[derive(Debug)]
    struct User;
    struct Order;

    fn repository<T: Send + Sync + 'static>(entity: &'static str) -> Instance {
        Arc::new(Repository::<T> {
            entity,
            _entity: PhantomData,
        })
    }

    #[test]
    fn test_open_generic_served_by_fallback() {
        let mut services = lifetimes();
        services.add_open_generic("Repository", Lifetime::Singleton, |key, _| {
            if *key == ServiceKey::of::<Repository<User>>() {
                Ok(repository::<User>("user"))
            } else if *key == ServiceKey::of::<Repository<Order>>() {
                Ok(repository::<Order>("order"))
            } else {
                Err(DiError::NotFound { type_name: key.name() })
            }
        });

        let provider = ServiceProvider::build(services).unwrap();
        let before = provider.diagnostics();

        let users = provider.get_closed::<Repository<User>>("Repository").unwrap();
        assert_eq!(users.entity, "user");
        let after_first = provider.diagnostics();
        assert_eq!(after_first.fallback_lookups, before.fallback_lookups + 1);
        assert_eq!(after_first.plans_built, before.plans_built + 1);

        // Served from the fallback cache without planning again
        let again = provider.create_scope().get_closed::<Repository<User>>("Repository").unwrap();
        assert!(Arc::ptr_eq(&users, &again));
        let after_second = provider.diagnostics();
        assert_eq!(after_second.fallback_lookups, before.fallback_lookups + 2);
        assert_eq!(after_second.plans_built, after_first.plans_built);

        let orders = provider.get_closed::<Repository<Order>>("Repository").unwrap();
        assert_eq!(orders.entity, "order");

        // The snapshot never grows after the build
        assert_eq!(provider.diagnostics().snapshot_entries, before.snapshot_entries);
    }

    #[test]
    fn test_plain_request_never_uses_family() {
        let mut services = ServiceCollection::new();
        services.add_open_generic("Repository", Lifetime::Scoped, |key, _| {
            if *key == ServiceKey::of::<Repository<User>>() {
                Ok(repository::<User>("user"))
            } else {
                Err(DiError::NotFound { type_name: key.name() })
            }
        });
        let provider = ServiceProvider::build(services).unwrap();
        let scope = provider.create_scope();

        assert!(scope.get::<Repository<User>>().is_err());
        assert!(scope.get_closed::<Repository<User>>("Repository").is_ok());
        assert!(scope.get::<Repository<User>>().is_err());
        assert!(scope.get_closed::<Repository<User>>("Repository").is_ok());
    }

    struct Repositories;

    impl Family for Repositories {
        const DEFINITION: &'static str = "Repository";
    }

    struct Checkout {
        users: Closed<Repository<User>, Repositories>,
        orders: Closed<Repository<Order>, Repositories>,
    }

    impl Service for Checkout {
        type Dependencies = (Closed<Repository<User>, Repositories>, Closed<Repository<Order>, Repositories>);

        fn create((users, orders): Self::Dependencies) -> Self {
            Checkout { users, orders }
        }
    }

    struct PlainConsumer;

    impl Service for PlainConsumer {
        type Dependencies = Arc<Repository<User>>;

        fn create(_: Arc<Repository<User>>) -> Self {
            PlainConsumer
        }
    }

    fn repositories() -> ServiceCollection {
        let mut services = ServiceCollection::new();
        services.add_open_generic(Repositories::DEFINITION, Lifetime::Singleton, |key, _| {
            if *key == ServiceKey::of::<Repository<User>>() {
                Ok(repository::<User>("user"))
            } else if *key == ServiceKey::of::<Repository<Order>>() {
                Ok(repository::<Order>("order"))
            } else {
                Err(DiError::NotFound { type_name: key.name() })
            }
        });
        services
    }

    #[test]
    fn test_constructor_depends_on_closed_generic() {
        let mut services = repositories();
        services.add_singleton::<Checkout>();

        let provider = ServiceProvider::build(services).unwrap();
        let checkout = provider.get::<Checkout>().unwrap();
        assert_eq!(checkout.users.entity, "user");
        assert_eq!(checkout.orders.entity, "order");

        // Same singleton as a direct closed request
        let users = provider.get_closed::<Repository<User>>("Repository").unwrap();
        assert!(Arc::ptr_eq(&checkout.users.clone().into_inner(), &users));
    }

    #[test]
    fn test_plain_dependency_on_generic_is_missing() {
        let mut services = repositories();
        services.add_transient::<PlainConsumer>();

        match ServiceProvider::build(services) {
            Err(DiError::MissingDependency { type_name, .. }) => {
                assert_eq!(type_name, std::any::type_name::<Repository<User>>());
            }
            other => panic!("expected a missing dependency, got {:?}", other),
        }
    }

    #[test]
    fn test_unregistered_is_configuration_error() {
        let provider = ServiceProvider::build(lifetimes()).unwrap();

        let err = provider.get::<User>().unwrap_err();
        assert_eq!(err, DiError::not_found::<User>());
        assert!(err.is_configuration_error());
        assert!(provider.try_get::<User>().is_none());

        // Not cached as a success; asking again reports the same error
        assert_eq!(provider.get::<User>().unwrap_err(), err);
    }

    struct Left;
    struct Right;

    impl Service for Left {
        type Dependencies = Arc<Right>;
        fn create(_: Arc<Right>) -> Self {
            Left
        }
    }

    impl Service for Right {
        type Dependencies = Arc<Left>;
        fn create(_: Arc<Left>) -> Self {
            Right
        }
    }

    #[test]
    fn test_cycle_fails_build() {
        let mut services = lifetimes();
        services.add_transient::<Left>().add_scoped::<Right>();

        match ServiceProvider::build(services) {
            Err(DiError::CircularDependency { path }) => {
                assert_eq!(path.first(), path.last());
                assert!(path.len() >= 3);
            }
            other => panic!("expected a cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_root_scope_is_per_provider() {
        static CREATED: AtomicUsize = AtomicUsize::new(0);

        struct Counted(usize);

        let build = || {
            let mut services = ServiceCollection::new();
            services.add_singleton_factory(|_| Ok(Counted(CREATED.fetch_add(1, Ordering::SeqCst))));
            ServiceProvider::build(services).unwrap()
        };

        let first = build();
        let second = build();

        assert_ne!(first.get::<Counted>().unwrap().0, second.get::<Counted>().unwrap().0);
        assert_ne!(first.root_scope().id(), second.root_scope().id());
    }

    #[test]
    fn test_concurrent_resolution() {
        let provider = ServiceProvider::build(lifetimes()).unwrap();
        let expected = provider.get::<Alpha>().unwrap();
        let lookups = provider.diagnostics().fallback_lookups;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let provider = provider.clone();
                thread::spawn(move || {
                    let scope = provider.create_scope();
                    let mut singletons = Vec::new();
                    for _ in 0..250 {
                        singletons.push(scope.get::<Alpha>().unwrap());
                        scope.get::<Beta>().unwrap();
                        scope.get::<Gamma>().unwrap();
                    }
                    singletons
                })
            })
            .collect();

        for handle in handles {
            for alpha in handle.join().unwrap() {
                assert!(Arc::ptr_eq(&alpha, &expected));
            }
        }
        assert_eq!(provider.diagnostics().fallback_lookups, lookups);
    }

    #[test]
    fn test_concurrent_first_use_lazy() {
        static CREATED: AtomicUsize = AtomicUsize::new(0);

        struct Expensive;

        let mut services = ServiceCollection::new();
        services.add_singleton_factory(|_| {
            CREATED.fetch_add(1, Ordering::SeqCst);
            thread::sleep(std::time::Duration::from_millis(5));
            Ok(Expensive)
        });
        let provider = ServiceProvider::build_with(services, ProviderOptions::lazy()).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let provider = provider.clone();
                thread::spawn(move || provider.create_scope().get::<Expensive>().unwrap())
            })
            .collect();

        let instances: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(CREATED.load(Ordering::SeqCst), 1);
        assert!(instances.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn test_factory_resolves_through_scope() {
        struct Greeting(String);

        let mut services = ServiceCollection::new();
        services
            .add_instance(String::from("world"))
            .add_transient_factory(|scope| {
                let name = scope.get::<String>()?;
                Ok(Greeting(format!("hello {}", name)))
            });

        let provider = ServiceProvider::build(services).unwrap();
        assert_eq!(provider.create_scope().get::<Greeting>().unwrap().0, "hello world");
    }

    #[test]
    fn test_scope_factory_service() {
        let provider = ServiceProvider::build(lifetimes()).unwrap();
        let factory = provider.get::<ScopeFactory>().unwrap();

        let scope = factory.create_scope().unwrap();
        let beta = scope.get::<Beta>().unwrap();
        assert!(Arc::ptr_eq(&beta, &scope.get::<Beta>().unwrap()));
        assert!(!Arc::ptr_eq(&beta, &provider.create_scope().get::<Beta>().unwrap()));
    }
}
