//! Ready-made registries and orchestrators.

use std::sync::Arc;

use shimload_core::{
    CapabilityDescriptor, CapabilityRegistry, DependencyRule, EnvironmentProbe, Orchestrator,
    ShimResult, UsageMatcher,
};

use crate::mocks::{MockFetcher, MockHost};

/// A capability that is needed while the host lacks `global` and is used by
/// any text containing `marker`.
///
/// # Errors
///
/// Returns an error if `name` is not a valid capability name.
pub fn probed_capability(
    name: &str,
    locator: &str,
    global: &str,
    marker: &str,
) -> ShimResult<CapabilityDescriptor> {
    Ok(CapabilityDescriptor::new(name, locator)?
        .with_environment(EnvironmentProbe::MissingGlobal(global.to_string()))
        .with_usage(UsageMatcher::Contains(marker.to_string())))
}

/// Two capabilities: `A`, and `B` which requires `A`.
///
/// `A` lives at `a.js`, probes global `A`, and is used by `useA`; `B` lives at
/// `b.js`, probes `B`, and is used by `useB`.
///
/// # Errors
///
/// Never fails in practice; propagates registry construction errors.
pub fn chain_registry() -> ShimResult<CapabilityRegistry> {
    CapabilityRegistry::builder()
        .register(probed_capability("A", "a.js", "A", "useA")?)?
        .register(
            probed_capability("B", "b.js", "B", "useB")?
                .with_dependencies(DependencyRule::fixed(["A"])?),
        )?
        .build()
}

/// A host implementing both capabilities of [`chain_registry`]. Activating
/// either one defines its global.
#[must_use]
pub fn chain_host() -> MockHost {
    MockHost::new()
        .with_patching_capability("a.js", "A", "A")
        .with_patching_capability("b.js", "B", "B")
}

/// Wire an orchestrator over mocks.
#[must_use]
pub fn mock_orchestrator(
    registry: CapabilityRegistry,
    host: &MockHost,
    fetcher: &MockFetcher,
) -> Orchestrator {
    Orchestrator::new(
        Arc::new(registry),
        Arc::new(host.clone()),
        Arc::new(fetcher.clone()),
    )
}
