//! Services that declare their dependencies
//!
//! A [`Service`] names what it needs through its `Dependencies` type. The
//! plan factory reads those keys to detect missing and cyclic dependencies at
//! build time, and the compiled accessor hands the resolved instances back
//! to [`Service::create`].
//!
//! # Example
//!
//! ```rust
//! use dependency_realizer::{Service, ServiceCollection, ServiceProvider};
//! use std::sync::Arc;
//!
//! struct Database {
//!     url: String,
//! }
//!
//! impl Service for Database {
//!     type Dependencies = ();
//!
//!     fn create(_: ()) -> Self {
//!         Database { url: "postgres://localhost".into() }
//!     }
//! }
//!
//! struct UserRepository {
//!     db: Arc<Database>,
//! }
//!
//! impl Service for UserRepository {
//!     type Dependencies = Arc<Database>;
//!
//!     fn create(db: Arc<Database>) -> Self {
//!         UserRepository { db }
//!     }
//! }
//!
//! let mut services = ServiceCollection::new();
//! services.add_singleton::<Database>().add_scoped::<UserRepository>();
//!
//! let provider = ServiceProvider::build(services).unwrap();
//! let scope = provider.create_scope();
//! let repo = scope.get::<UserRepository>().unwrap();
//! assert_eq!(repo.db.url, "postgres://localhost");
//! ```

use crate::{DiError, Injectable, Instance, Result, ServiceKey};
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

/// A service that declares its dependencies at compile time.
pub trait Service: Injectable + Sized {
    /// The dependencies required to create this service.
    ///
    /// Use `()` for no dependencies, `Arc<T>` for one, or tuples for multiple.
    type Dependencies: Dependencies;

    /// Create a new instance given the resolved dependencies.
    fn create(deps: Self::Dependencies) -> Self;
}

/// A set of dependencies that can be listed as keys and rebuilt from
/// resolved instances.
///
/// Implemented for:
/// - `()` - No dependencies
/// - any single [`Dependency`] (`Arc<T>` or [`Closed<T, F>`])
/// - Tuples of dependencies (up to 8)
pub trait Dependencies: Sized {
    /// Keys in the order `from_instances` expects them
    fn keys() -> Vec<ServiceKey>;

    /// Rebuild from instances resolved for `keys()`, in order
    fn from_instances(instances: &[Instance]) -> Result<Self>;
}

/// A single declared dependency
pub trait Dependency: Sized {
    /// The key the plan factory resolves for this dependency
    fn key() -> ServiceKey;

    /// Convert the resolved instance
    fn from_instance(instance: &Instance) -> Result<Self>;
}

impl<T: Injectable> Dependency for Arc<T> {
    #[inline]
    fn key() -> ServiceKey {
        ServiceKey::of::<T>()
    }

    #[inline]
    fn from_instance(instance: &Instance) -> Result<Self> {
        Arc::clone(instance)
            .downcast::<T>()
            .map_err(|_| DiError::type_mismatch::<T>())
    }
}

/// Names an open generic family registered with
/// [`ServiceCollection::add_open_generic`](crate::ServiceCollection::add_open_generic).
pub trait Family: 'static {
    /// The definition name the family is registered under
    const DEFINITION: &'static str;
}

/// Dependency on `T` served by the open generic family `F` when `T` has no
/// registration of its own.
///
/// # Examples
///
/// ```rust
/// use dependency_realizer::{
///     Closed, Family, Instance, Lifetime, Service, ServiceCollection, ServiceKey, ServiceProvider,
/// };
/// use std::marker::PhantomData;
/// use std::sync::Arc;
///
/// struct Repository<T>(PhantomData<T>);
/// struct Repositories;
///
/// impl Family for Repositories {
///     const DEFINITION: &'static str = "Repository";
/// }
///
/// struct User;
///
/// struct UserService {
///     users: Closed<Repository<User>, Repositories>,
/// }
///
/// impl Service for UserService {
///     type Dependencies = Closed<Repository<User>, Repositories>;
///
///     fn create(users: Self::Dependencies) -> Self {
///         UserService { users }
///     }
/// }
///
/// let mut services = ServiceCollection::new();
/// services
///     .add_open_generic(Repositories::DEFINITION, Lifetime::Singleton, |key, _| {
///         assert_eq!(*key, ServiceKey::of::<Repository<User>>());
///         Ok(Arc::new(Repository::<User>(PhantomData)) as Instance)
///     })
///     .add_scoped::<UserService>();
///
/// let provider = ServiceProvider::build(services).unwrap();
/// let users = provider.create_scope().get::<UserService>().unwrap();
/// let repository: &Repository<User> = &users.users;
/// # let _ = repository;
/// ```
pub struct Closed<T, F> {
    inner: Arc<T>,
    _family: PhantomData<fn() -> F>,
}

impl<T, F> Closed<T, F> {
    /// The shared instance
    #[inline]
    pub fn into_inner(self) -> Arc<T> {
        self.inner
    }
}

impl<T, F> Clone for Closed<T, F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _family: PhantomData,
        }
    }
}

impl<T, F> Deref for Closed<T, F> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T: Injectable, F: Family> Dependency for Closed<T, F> {
    #[inline]
    fn key() -> ServiceKey {
        ServiceKey::closed::<T>(F::DEFINITION)
    }

    #[inline]
    fn from_instance(instance: &Instance) -> Result<Self> {
        Ok(Self {
            inner: Arc::<T>::from_instance(instance)?,
            _family: PhantomData,
        })
    }
}

impl Dependencies for () {
    #[inline]
    fn keys() -> Vec<ServiceKey> {
        Vec::new()
    }

    #[inline]
    fn from_instances(_instances: &[Instance]) -> Result<Self> {
        Ok(())
    }
}

impl<D: Dependency> Dependencies for D {
    #[inline]
    fn keys() -> Vec<ServiceKey> {
        vec![D::key()]
    }

    #[inline]
    fn from_instances(instances: &[Instance]) -> Result<Self> {
        take::<D>(&mut instances.iter())
    }
}

fn take<D: Dependency>(iter: &mut std::slice::Iter<'_, Instance>) -> Result<D> {
    let key = D::key();
    let instance = iter.next().ok_or(DiError::NotFound { type_name: key.name() })?;
    D::from_instance(instance)
}

macro_rules! impl_dependencies_tuple {
    ($($T:ident),+) => {
        impl<$($T: Dependency),+> Dependencies for ($($T,)+) {
            #[inline]
            fn keys() -> Vec<ServiceKey> {
                vec![$($T::key()),+]
            }

            #[inline]
            fn from_instances(instances: &[Instance]) -> Result<Self> {
                let mut iter = instances.iter();
                Ok(($(take::<$T>(&mut iter)?,)+))
            }
        }
    };
}

impl_dependencies_tuple!(A, B);
impl_dependencies_tuple!(A, B, C);
impl_dependencies_tuple!(A, B, C, D);
impl_dependencies_tuple!(A, B, C, D, E);
impl_dependencies_tuple!(A, B, C, D, E, F);
impl_dependencies_tuple!(A, B, C, D, E, F, G);
impl_dependencies_tuple!(A, B, C, D, E, F, G, H);

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Config(u32);
    struct Logger(&'static str);

    #[test]
    fn test_tuple_keys_in_order() {
        let keys = <(Arc<Config>, Arc<Logger>)>::keys();
        assert_eq!(keys, vec![ServiceKey::of::<Config>(), ServiceKey::of::<Logger>()]);
    }

    #[test]
    fn test_from_instances() {
        let instances: Vec<Instance> = vec![Arc::new(Config(7)), Arc::new(Logger("info"))];
        let (config, logger) = <(Arc<Config>, Arc<Logger>)>::from_instances(&instances).unwrap();
        assert_eq!(config.0, 7);
        assert_eq!(logger.0, "info");
    }

    struct Repository<T>(std::marker::PhantomData<T>);
    struct Repositories;

    impl Family for Repositories {
        const DEFINITION: &'static str = "Repository";
    }

    #[test]
    fn test_closed_dependency_carries_family() {
        type Deps = (Arc<Config>, Closed<Repository<Logger>, Repositories>);

        let keys = Deps::keys();
        assert_eq!(keys[0].family(), None);
        assert_eq!(keys[1].family(), Some("Repository"));
        assert_eq!(keys[1], ServiceKey::of::<Repository<Logger>>());

        let instances: Vec<Instance> = vec![
            Arc::new(Config(1)),
            Arc::new(Repository::<Logger>(std::marker::PhantomData)),
        ];
        let (config, repository) = Deps::from_instances(&instances).unwrap();
        assert_eq!(config.0, 1);
        assert!(Arc::ptr_eq(&repository.clone().into_inner(), &repository.into_inner()));
    }

    #[test]
    fn test_missing_instance_reported() {
        let err = <(Arc<Config>, Arc<Logger>)>::from_instances(&[Arc::new(Config(1)) as Instance]).err();
        assert_eq!(err, Some(DiError::not_found::<Logger>()));
    }

    #[test]
    fn test_from_instances_type_mismatch() {
        let instances: Vec<Instance> = vec![Arc::new(Logger("info"))];
        let err = <Arc<Config>>::from_instances(&instances).unwrap_err();
        assert!(matches!(err, DiError::TypeMismatch { .. }));
    }
}
