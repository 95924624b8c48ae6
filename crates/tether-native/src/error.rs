//! Error types for handle, slot and id operations.

use std::borrow::Cow;
use std::fmt;
use std::panic::Location;

/// Errors raised by the handle engine.
///
/// Every variant is fatal: the engine never retries and never catches its
/// own errors. A marshaling boundary above the adapters is expected to turn
/// them into caller-visible codes.
#[derive(Debug, Clone)]
pub enum HandleError {
    /// The operation is not valid in the current state (double create,
    /// destroy while absent, native access while not backed, missing owner).
    InvalidOperation {
        /// What went wrong.
        message: Cow<'static, str>,
        /// Call site that raised the error.
        origin: &'static Location<'static>,
    },

    /// A scarce resource ran out.
    ResourceExhausted {
        /// Name of the exhausted resource.
        resource: &'static str,
        /// Call site that raised the error.
        origin: &'static Location<'static>,
    },

    /// An adapter factory hook failed to build or drive the native resource.
    Native {
        /// Message reported by the adapter.
        message: String,
    },
}

impl HandleError {
    /// Build an [`HandleError::InvalidOperation`] tagged with the caller's location.
    #[track_caller]
    pub fn invalid_operation(message: impl Into<Cow<'static, str>>) -> Self {
        HandleError::InvalidOperation {
            message: message.into(),
            origin: Location::caller(),
        }
    }

    /// Build an [`HandleError::ResourceExhausted`] tagged with the caller's location.
    #[track_caller]
    pub fn exhausted(resource: &'static str) -> Self {
        HandleError::ResourceExhausted {
            resource,
            origin: Location::caller(),
        }
    }

    /// Build an [`HandleError::Native`] from an adapter message.
    pub fn native(message: impl Into<String>) -> Self {
        HandleError::Native {
            message: message.into(),
        }
    }

    /// Always `true`; kept so boundary code can branch on it explicitly.
    pub fn is_fatal(&self) -> bool {
        true
    }

    /// Returns true for [`HandleError::InvalidOperation`].
    pub fn is_invalid_operation(&self) -> bool {
        matches!(self, HandleError::InvalidOperation { .. })
    }

    /// Returns true for [`HandleError::ResourceExhausted`].
    pub fn is_exhausted(&self) -> bool {
        matches!(self, HandleError::ResourceExhausted { .. })
    }

    /// Source location that raised the error, when known.
    pub fn origin(&self) -> Option<&'static Location<'static>> {
        match self {
            HandleError::InvalidOperation { origin, .. }
            | HandleError::ResourceExhausted { origin, .. } => Some(origin),
            HandleError::Native { .. } => None,
        }
    }
}

impl fmt::Display for HandleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandleError::InvalidOperation { message, origin } => {
                write!(f, "Invalid operation: {} (at {})", message, origin)
            }
            HandleError::ResourceExhausted { resource, origin } => {
                write!(f, "Resource exhausted: {} (at {})", resource, origin)
            }
            HandleError::Native { message } => write!(f, "Native error: {}", message),
        }
    }
}

impl std::error::Error for HandleError {}

/// Result type for handle operations.
pub type HandleResult<T> = Result<T, HandleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_operation_records_caller() {
        let line = line!() + 1;
        let err = HandleError::invalid_operation("handle is not created");
        let origin = err.origin().expect("origin is recorded");
        assert_eq!(origin.line(), line);
        assert!(origin.file().ends_with("error.rs"));
        assert!(err.is_invalid_operation());
        assert!(err.is_fatal());
    }

    #[test]
    fn test_display() {
        let err = HandleError::exhausted("native command ids");
        let text = err.to_string();
        assert!(text.starts_with("Resource exhausted: native command ids"));

        let err = HandleError::native("CreateWindowEx failed");
        assert_eq!(err.to_string(), "Native error: CreateWindowEx failed");
        assert!(err.origin().is_none());
    }
}
