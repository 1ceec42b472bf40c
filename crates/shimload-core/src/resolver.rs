//! Dynamic dependency resolution.
//!
//! Prerequisites are not a static graph: each descriptor computes them at
//! resolution time against the partial load state of the current phase. That
//! lets a capability skip a shared prerequisite another capability has already
//! requested, without the registry encoding every combination.

use tracing::{debug, trace};

use crate::capability::{CapabilityName, DependencyContext};
use crate::error::{ShimError, ShimResult};
use crate::host::Host;
use crate::load_state::{LoadState, LoadStatus};
use crate::registry::CapabilityRegistry;

/// Expands requested capabilities into the full prerequisite set.
///
/// Expansion is depth-first and left-to-right. A capability is marked pending
/// only after its prerequisites, so the acquisition queue lists prerequisites
/// before the capabilities that need them.
pub struct Resolver<'a> {
    registry: &'a CapabilityRegistry,
    host: &'a dyn Host,
    /// Capabilities whose prerequisites are currently being expanded.
    in_progress: Vec<CapabilityName>,
}

impl<'a> Resolver<'a> {
    /// Create a resolver over `registry` for `host`.
    #[must_use]
    pub fn new(registry: &'a CapabilityRegistry, host: &'a dyn Host) -> Self {
        Self {
            registry,
            host,
            in_progress: Vec::new(),
        }
    }

    /// Request `name`, expanding its prerequisites into `state`.
    ///
    /// Every capability newly marked pending is appended to `queue`, which is
    /// the order acquisitions must be started in. Already requested names are
    /// a no-op, which is what keeps shared prerequisites from loading twice.
    ///
    /// # Errors
    ///
    /// Returns [`ShimError::UnknownCapability`] if `name` or a computed
    /// prerequisite is not registered, [`ShimError::DependencyCycle`] if
    /// expansion reaches a capability that is still being expanded, and
    /// [`ShimError::RegistryOrder`] if a computed prerequisite the host lacks
    /// is registered after the capability that needs it.
    pub fn resolve(
        &mut self,
        name: &str,
        state: &mut LoadState,
        queue: &mut Vec<CapabilityName>,
    ) -> ShimResult<()> {
        if state.status(name) != LoadStatus::Absent {
            trace!(capability = name, "Already requested");
            return Ok(());
        }

        if let Some(start) = self.in_progress.iter().position(|n| n.as_str() == name) {
            let mut path: Vec<String> = self.in_progress[start..]
                .iter()
                .map(ToString::to_string)
                .collect();
            path.push(name.to_string());
            return Err(ShimError::DependencyCycle { path });
        }

        let registry = self.registry;
        let descriptor = registry.lookup(name)?;
        let dependencies = {
            let ctx = DependencyContext::new(state, registry, self.host);
            descriptor.dependencies(&ctx)
        };

        self.in_progress.push(descriptor.name().clone());
        let expanded = self.expand(descriptor.name(), &dependencies, state, queue);
        self.in_progress.pop();
        expanded?;

        state.mark_pending(descriptor.name().clone());
        queue.push(descriptor.name().clone());
        debug!(
            capability = %descriptor.name(),
            dependencies = dependencies.len(),
            "Capability requested"
        );
        Ok(())
    }

    /// Resolve several names in order and return the acquisition queue.
    ///
    /// # Errors
    ///
    /// See [`Resolver::resolve`].
    pub fn resolve_all<'n>(
        &mut self,
        names: impl IntoIterator<Item = &'n CapabilityName>,
        state: &mut LoadState,
    ) -> ShimResult<Vec<CapabilityName>> {
        let mut queue = Vec::new();
        for name in names {
            self.resolve(name.as_str(), state, &mut queue)?;
        }
        Ok(queue)
    }

    /// Prerequisites the host lacks must be registered before `dependent`.
    /// Edges back into the in-progress stack are left to `resolve`, which
    /// reports them as cycles.
    fn expand(
        &mut self,
        dependent: &CapabilityName,
        dependencies: &[CapabilityName],
        state: &mut LoadState,
        queue: &mut Vec<CapabilityName>,
    ) -> ShimResult<()> {
        let registry = self.registry;
        let dependent_position = registry.position(dependent.as_str());
        for dependency in dependencies {
            let dep_descriptor = registry.lookup(dependency.as_str())?;
            if !dep_descriptor.environment_needs(self.host) {
                trace!(capability = %dependency, "Prerequisite already provided by host");
                continue;
            }

            let on_stack = self.in_progress.contains(dependency);
            if !on_stack
                && let (Some(dep_position), Some(position)) =
                    (registry.position(dependency.as_str()), dependent_position)
                && dep_position >= position
            {
                return Err(ShimError::RegistryOrder {
                    dependent: dependent.to_string(),
                    dependency: dependency.to_string(),
                });
            }
            self.resolve(dependency.as_str(), state, queue)?;
        }
        Ok(())
    }
}
