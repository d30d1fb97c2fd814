//! Injectable marker and service lifetimes

use crate::ServiceKey;

/// Marker trait for types that can be registered and resolved.
///
/// Automatically implemented for all types that are `Send + Sync + 'static`.
pub trait Injectable: Send + Sync + 'static {
    /// Returns the service key of this type
    #[inline]
    fn key_of() -> ServiceKey
    where
        Self: Sized,
    {
        ServiceKey::of::<Self>()
    }
}

impl<T: Send + Sync + 'static> Injectable for T {}

/// How long a resolved instance lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Lifetime {
    /// One instance for the whole provider, cached in the root scope
    #[default]
    Singleton,

    /// One instance per scope
    Scoped,

    /// New instance created on every resolve
    Transient,
}

impl Lifetime {
    /// Lowercase name used in log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            Lifetime::Singleton => "singleton",
            Lifetime::Scoped => "scoped",
            Lifetime::Transient => "transient",
        }
    }
}

impl std::fmt::Display for Lifetime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
