//! Error types for service realization and resolution

use thiserror::Error;

/// Errors that can occur while building or resolving from a provider
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiError {
    /// No registration and no open generic family satisfies the key
    #[error("Service not found: {type_name}")]
    NotFound { type_name: &'static str },

    /// Circular dependency detected while building a resolution plan
    #[error("Circular dependency detected: {}", path.join(" -> "))]
    CircularDependency { path: Vec<&'static str> },

    /// A constructor registration depends on a service nobody registered
    #[error("Unable to resolve {type_name} while building {required_by}")]
    MissingDependency {
        type_name: &'static str,
        required_by: &'static str,
    },

    /// Factory failed to create service
    #[error("Failed to create service {type_name}: {reason}")]
    CreationFailed {
        type_name: &'static str,
        reason: String,
    },

    /// Resolved instance is not of the requested type
    #[error("Resolved instance for {type_name} has an unexpected type")]
    TypeMismatch { type_name: &'static str },

    /// The provider owning a scope factory was dropped
    #[error("Service provider has been dropped")]
    ParentDropped,
}

impl DiError {
    /// Create a NotFound error for a type
    #[inline]
    pub fn not_found<T: ?Sized + 'static>() -> Self {
        Self::NotFound {
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Create a CreationFailed error
    #[inline]
    pub fn creation_failed<T: ?Sized + 'static>(reason: impl Into<String>) -> Self {
        Self::CreationFailed {
            type_name: std::any::type_name::<T>(),
            reason: reason.into(),
        }
    }

    /// Create a TypeMismatch error
    #[inline]
    pub fn type_mismatch<T: ?Sized + 'static>() -> Self {
        Self::TypeMismatch {
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Whether this error is a deterministic configuration problem
    /// (retrying without changing registrations cannot succeed).
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::CircularDependency { .. } | Self::MissingDependency { .. }
        )
    }
}

/// Result type alias for DI operations
pub type Result<T> = std::result::Result<T, DiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circular_message_lists_path() {
        let err = DiError::CircularDependency {
            path: vec!["A", "B", "A"],
        };
        assert_eq!(err.to_string(), "Circular dependency detected: A -> B -> A");
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_creation_failed_is_not_configuration() {
        let err = DiError::creation_failed::<u32>("boom");
        assert_eq!(err.to_string(), "Failed to create service u32: boom");
        assert!(!err.is_configuration_error());
    }
}
