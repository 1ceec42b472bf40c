#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Shimload Core - shim resolution and load orchestration.
//!
//! This crate decides which platform capabilities ("shims") a host is missing
//! and which of those a batch of payload scripts actually uses, loads only
//! that intersection in dependency-respecting order, and runs the payloads
//! once every loaded capability has been activated.
//!
//! # Architecture
//!
//! - [`CapabilityRegistry`]: ordered, immutable set of [`CapabilityDescriptor`]s
//! - [`Resolver`]: expands a capability into its prerequisites against the
//!   partial [`LoadState`] of the current phase
//! - [`LoadBarrier`]: completes once every requested capability registered
//! - [`RegistrationChannel`]: per-run entry point loaded resources call back into
//! - [`Acquirer`]: direct fetches and indirect (callback) deliveries
//! - [`Orchestrator`]: the phase state machine tying it all together
//!
//! The runtime environment is abstracted by [`Host`], transport by [`Fetcher`].
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use shimload_core::prelude::*;
//!
//! let registry = Arc::new(catalog::builtin()?);
//! let orchestrator = Orchestrator::new(registry, host, Arc::new(HttpFetcher::new()?))
//!     .with_bootstrap(catalog::BOOTSTRAP)?;
//!
//! let report = orchestrator
//!     .run(RunOptions::new().execute("app.js").always("JSON"))
//!     .await?;
//! ```

pub mod prelude;

pub mod acquisition;
pub mod barrier;
pub mod capability;
pub mod catalog;
pub mod channel;
pub mod error;
pub mod fetch;
pub mod host;
pub mod load_state;
pub mod options;
pub mod orchestrator;
pub mod registry;
pub mod resolver;
pub mod run_config;

pub use acquisition::{Acquirer, mint_callback_id, validate_script};
pub use barrier::{BarrierStatus, BarrierWait, LoadBarrier};
pub use capability::{
    CapabilityDescriptor, CapabilityName, DependencyContext, DependencyRule, EnvironmentProbe,
    Locator, UsageMatcher,
};
pub use channel::{DeliveryWait, RegistrationChannel};
pub use error::{ShimError, ShimResult};
pub use fetch::{FetchedResource, Fetcher};
#[cfg(feature = "http")]
pub use fetch::{HttpFetcher, HttpFetcherConfig};
pub use host::Host;
pub use load_state::{Activation, LoadState, LoadStatus};
pub use options::{
    CompletionCallback, Invocation, OneOrMany, PayloadKind, PayloadSpec, PositionalArg, RunOptions,
};
pub use orchestrator::{LoadPlan, Orchestrator, PlannedPayload, RunPhase, RunReport};
pub use registry::{CapabilityRegistry, RegistryBuilder};
pub use resolver::Resolver;
pub use run_config::{CallbackPattern, ExecutionMode, PayloadDescriptor, Retrieval, RunConfig};
