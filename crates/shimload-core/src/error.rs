//! Error types for shim resolution and loading.

use thiserror::Error;

/// Errors that can occur while resolving, loading, or executing shims.
#[derive(Debug, Error)]
pub enum ShimError {
    /// The run configuration is malformed or missing a required value.
    #[error("Invalid configuration for {field}: {message}")]
    Configuration {
        /// Dotted name of the offending option.
        field: String,
        /// What was wrong with it.
        message: String,
    },

    /// A capability name is not present in the registry.
    #[error("Unknown capability: {0}")]
    UnknownCapability(String),

    /// A capability with the same name was registered twice.
    #[error("Capability already registered: {0}")]
    DuplicateCapability(String),

    /// A dependency edge points at a capability registered later.
    #[error("Capability {dependent} depends on {dependency}, which is registered after it")]
    RegistryOrder {
        /// The capability declaring or computing the edge.
        dependent: String,
        /// The prerequisite registered too late.
        dependency: String,
    },

    /// Dependency expansion revisited a capability it was still expanding.
    #[error("Dependency cycle detected: {}", path.join(" -> "))]
    DependencyCycle {
        /// The capabilities on the cycle, starting and ending with the same name.
        path: Vec<String>,
    },

    /// A direct fetch returned a non-success status.
    #[error("Fetching {locator} returned status {status}")]
    HttpStatus {
        /// The fetched locator.
        locator: String,
        /// The HTTP status code.
        status: u16,
    },

    /// A fetched resource did not declare a script content type.
    #[error("Resource {locator} is not a script (content type: {content_type})")]
    NotScript {
        /// The fetched locator.
        locator: String,
        /// The declared content type, or `<none>`.
        content_type: String,
    },

    /// A resource could not be acquired at all.
    #[error("Failed to acquire {locator}: {message}")]
    Acquisition {
        /// The locator being acquired.
        locator: String,
        /// The transport or host failure.
        message: String,
    },

    /// The registration channel was used in a way the run never asked for.
    #[error("Registration channel misuse: {0}")]
    ChannelMisuse(String),

    /// The registration channel went away before the awaited signal arrived.
    #[error("Registration channel closed while waiting for {0}")]
    ChannelClosed(String),

    /// A named completion callback does not exist in the host.
    #[error("Completion callback not found: {0}")]
    UnresolvedCallback(String),

    /// The host failed to evaluate or inject something.
    #[error("Host error: {0}")]
    Host(String),
}

impl ShimError {
    /// Shorthand for a [`ShimError::Configuration`] error.
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Whether this error was raised before anything asynchronous started.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }
}

/// A specialized Result type for shim operations.
pub type ShimResult<T> = Result<T, ShimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_display_joins_path() {
        let err = ShimError::DependencyCycle {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Dependency cycle detected: a -> b -> a");
    }

    #[test]
    fn test_config_shorthand() {
        let err = ShimError::config("always_load", "must not be empty");
        assert!(err.is_configuration());
        assert_eq!(
            err.to_string(),
            "Invalid configuration for always_load: must not be empty"
        );
    }
}
