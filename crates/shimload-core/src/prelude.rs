//! Prelude module - commonly used types for convenient import.
//!
//! Use `use shimload_core::prelude::*;` to import all essential types.

// Errors
pub use crate::{ShimError, ShimResult};

// Registry
pub use crate::{
    CapabilityDescriptor, CapabilityName, CapabilityRegistry, DependencyContext, DependencyRule,
    EnvironmentProbe, Locator, UsageMatcher,
};

// Host and transport
pub use crate::{FetchedResource, Fetcher, Host, RegistrationChannel};
#[cfg(feature = "http")]
pub use crate::HttpFetcher;

// Running
pub use crate::{
    CompletionCallback, Invocation, LoadPlan, Orchestrator, PayloadSpec, PositionalArg, RunOptions,
    RunPhase, RunReport,
};

// Built-in capabilities
pub use crate::catalog;
