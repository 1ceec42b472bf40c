//! The runtime environment that shims patch and payloads run in.

use crate::channel::RegistrationChannel;
use crate::error::ShimResult;

/// A runtime environment the orchestrator patches and executes payloads in.
///
/// All methods are synchronous and must return promptly. Anything that takes
/// time (loading an injected resource) happens in the background and reports
/// back through the [`RegistrationChannel`] handed to [`Host::inject`].
pub trait Host: Send + Sync {
    /// Whether a global binding exists, addressed by a dotted path such as
    /// `Array.prototype.indexOf`.
    ///
    /// Must be free of side effects; it backs capability need detection.
    fn has_global(&self, path: &str) -> bool;

    /// Inject `url` as a loadable unit into the execution context.
    ///
    /// Returns once the load has been started. A capability implementation
    /// signals readiness with [`RegistrationChannel::capability_ready`]; an
    /// indirect payload delivers its text with [`RegistrationChannel::deliver`].
    ///
    /// # Errors
    ///
    /// Returns an error if the load cannot even be started.
    fn inject(&self, url: &str, channel: &RegistrationChannel) -> ShimResult<()>;

    /// Evaluate source text in the shared top-level scope.
    ///
    /// # Errors
    ///
    /// Returns an error if evaluation fails.
    fn evaluate(&self, source: &str) -> ShimResult<()>;

    /// Invoke a zero-argument procedure bound to a global name.
    ///
    /// # Errors
    ///
    /// Returns [`ShimError::UnresolvedCallback`](crate::ShimError::UnresolvedCallback)
    /// if no such procedure exists.
    fn invoke_global(&self, name: &str) -> ShimResult<()>;
}
