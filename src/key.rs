//! Service identities
//!
//! A [`ServiceKey`] names what a caller asks for. Concrete types are keyed by
//! their `TypeId`; open generic families (a registration that can serve any
//! closing of, say, `Repository<T>`) are keyed by a static definition name.

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum KeyId {
    Type(TypeId),
    Definition(&'static str),
}

/// Identity used to register, plan and look up services.
///
/// Equality and hashing only consider the underlying id; the display name
/// and family are carried for diagnostics and open generic matching.
///
/// # Examples
///
/// ```rust
/// use dependency_realizer::ServiceKey;
///
/// struct Repository<T>(std::marker::PhantomData<T>);
///
/// let open = ServiceKey::definition("Repository");
/// let closed = ServiceKey::closed::<Repository<u32>>("Repository");
///
/// assert!(open.is_generic_definition());
/// assert!(!closed.is_generic_definition());
/// assert_eq!(closed.family(), Some("Repository"));
/// assert_eq!(closed, ServiceKey::of::<Repository<u32>>());
/// ```
#[derive(Clone, Copy)]
pub struct ServiceKey {
    id: KeyId,
    name: &'static str,
    family: Option<&'static str>,
}

impl ServiceKey {
    /// Key for a concrete type
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: KeyId::Type(TypeId::of::<T>()),
            name: std::any::type_name::<T>(),
            family: None,
        }
    }

    /// Key for a concrete closing of the generic family `definition`.
    ///
    /// Equal to `ServiceKey::of::<T>()`; the family only steers planning
    /// towards an open generic registration when no exact one exists.
    #[inline]
    pub fn closed<T: ?Sized + 'static>(definition: &'static str) -> Self {
        Self {
            family: Some(definition),
            ..Self::of::<T>()
        }
    }

    /// Key for an open generic definition
    #[inline]
    pub const fn definition(name: &'static str) -> Self {
        Self {
            id: KeyId::Definition(name),
            name,
            family: None,
        }
    }

    /// True for open generic definitions, which can never be precompiled
    #[inline]
    pub fn is_generic_definition(&self) -> bool {
        matches!(self.id, KeyId::Definition(_))
    }

    /// Human-readable name
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The open generic family this closed key belongs to, if known
    #[inline]
    pub fn family(&self) -> Option<&'static str> {
        self.family
    }

    /// The `TypeId` behind a closed key
    #[inline]
    pub fn type_id(&self) -> Option<TypeId> {
        match self.id {
            KeyId::Type(id) => Some(id),
            KeyId::Definition(_) => None,
        }
    }
}

impl PartialEq for ServiceKey {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ServiceKey {}

impl Hash for ServiceKey {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            KeyId::Type(_) => write!(f, "ServiceKey({})", self.name),
            KeyId::Definition(name) => write!(f, "ServiceKey({name}<_>)"),
        }
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
