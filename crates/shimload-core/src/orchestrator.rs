//! Execution orchestrator.
//!
//! Drives one run through its phases:
//!
//! ```text
//! Validating -> Bootstrapping -> AcquiringPayloads -> AnalyzingAndResolving
//!   -> LoadingCapabilities -> Activating -> ExecutingPayloads -> Done
//! ```
//!
//! Any error moves the run to `Failed` and aborts it: no payload executes and
//! no completion callback fires. Bootstrapping is skipped when the host
//! already has every bootstrap capability.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use futures::future::try_join_all;
use serde::Serialize;
use tracing::{Instrument, debug, error, info, info_span};
use url::Url;
use uuid::Uuid;

use crate::acquisition::Acquirer;
use crate::capability::CapabilityName;
use crate::channel::RegistrationChannel;
use crate::error::ShimResult;
use crate::fetch::Fetcher;
use crate::host::Host;
use crate::load_state::LoadState;
use crate::options::{CompletionCallback, Invocation};
use crate::registry::CapabilityRegistry;
use crate::resolver::Resolver;
use crate::run_config::{ExecutionMode, RunConfig};

/// A state of the run state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// Normalizing the invocation.
    Validating,
    /// Loading the capabilities the orchestrator itself relies on.
    Bootstrapping,
    /// Fetching or receiving payload text.
    AcquiringPayloads,
    /// Selecting capabilities and expanding prerequisites.
    AnalyzingAndResolving,
    /// Waiting for every requested capability to register.
    LoadingCapabilities,
    /// Invoking activations in registry order.
    Activating,
    /// Running payloads and completion callbacks.
    ExecutingPayloads,
    /// Finished successfully.
    Done,
    /// Aborted.
    Failed,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validating => "validating",
            Self::Bootstrapping => "bootstrapping",
            Self::AcquiringPayloads => "acquiring_payloads",
            Self::AnalyzingAndResolving => "analyzing_and_resolving",
            Self::LoadingCapabilities => "loading_capabilities",
            Self::Activating => "activating",
            Self::ExecutingPayloads => "executing_payloads",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Summary of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Correlation id of the run, also attached to its log span.
    pub run_id: Uuid,
    /// Phases in the order they were entered.
    pub phases: Vec<RunPhase>,
    /// Capabilities activated while bootstrapping.
    pub bootstrapped: Vec<CapabilityName>,
    /// Capabilities activated for the payloads, in activation order.
    pub activated: Vec<CapabilityName>,
    /// Payloads executed.
    pub executed: usize,
    /// Completion callbacks invoked.
    pub callbacks_invoked: usize,
}

impl RunReport {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            phases: Vec::new(),
            bootstrapped: Vec::new(),
            activated: Vec::new(),
            executed: 0,
            callbacks_invoked: 0,
        }
    }

    fn enter(&mut self, phase: RunPhase) {
        info!(phase = %phase, "Entering phase");
        self.phases.push(phase);
    }

    /// The phase the run ended in.
    #[must_use]
    pub fn final_phase(&self) -> Option<RunPhase> {
        self.phases.last().copied()
    }
}

/// A payload as seen by [`Orchestrator::plan`].
#[derive(Debug, Clone, Serialize)]
pub struct PlannedPayload {
    /// Locator as configured.
    pub locator: String,
    /// Whether the payload is retrieved indirectly.
    pub indirect: bool,
    /// Whether the payload would only be analyzed.
    pub analyze_only: bool,
    /// Size of the acquired text in bytes.
    pub bytes: usize,
}

/// What a run would load, computed without loading anything.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadPlan {
    /// Bootstrap capabilities, in load order.
    pub bootstrap: Vec<CapabilityName>,
    /// Capabilities selected directly by the selection rule, in registry order.
    pub selected: Vec<CapabilityName>,
    /// Capabilities to load for the payloads, prerequisites first.
    pub load_order: Vec<CapabilityName>,
    /// The same capabilities in registry (activation) order.
    pub activation_order: Vec<CapabilityName>,
    /// Acquired payloads, in slot order.
    pub payloads: Vec<PlannedPayload>,
}

/// Ties acquisition, analysis, loading, and execution together.
///
/// The registry, host, and fetcher are shared; everything else is per run.
pub struct Orchestrator {
    registry: Arc<CapabilityRegistry>,
    host: Arc<dyn Host>,
    fetcher: Arc<dyn Fetcher>,
    base_url: Option<Url>,
    bootstrap: Vec<CapabilityName>,
}

impl Orchestrator {
    /// Create an orchestrator with no base URL and no bootstrap capabilities.
    #[must_use]
    pub fn new(registry: Arc<CapabilityRegistry>, host: Arc<dyn Host>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            registry,
            host,
            fetcher,
            base_url: None,
            bootstrap: Vec::new(),
        }
    }

    /// Resolve relative locators against `base`.
    #[must_use]
    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base_url = Some(base);
        self
    }

    /// Capabilities to load before any payload is fetched.
    ///
    /// # Errors
    ///
    /// Returns [`ShimError::UnknownCapability`](crate::ShimError::UnknownCapability)
    /// for names the registry lacks.
    pub fn with_bootstrap<I, S>(mut self, names: I) -> ShimResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.bootstrap = names
            .into_iter()
            .map(|name| self.registry.lookup(name.as_ref()).map(|d| d.name().clone()))
            .collect::<ShimResult<_>>()?;
        Ok(self)
    }

    /// The shared registry.
    #[must_use]
    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Base URL relative locators resolve against.
    #[must_use]
    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    /// Run an invocation to completion.
    ///
    /// # Errors
    ///
    /// Configuration errors are returned before anything is fetched. Any
    /// later error aborts the run; see [`ShimError`](crate::ShimError).
    pub async fn run(&self, invocation: impl Into<Invocation>) -> ShimResult<RunReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!("shimload_run", run_id = %run_id);
        let mut report = RunReport::new(run_id);

        let result = self
            .run_phases(invocation.into(), &mut report)
            .instrument(span)
            .await;

        match result {
            Ok(()) => {
                report.phases.push(RunPhase::Done);
                info!(
                    run_id = %run_id,
                    activated = report.activated.len(),
                    executed = report.executed,
                    "Run complete"
                );
                Ok(report)
            },
            Err(e) => {
                let phase = report.final_phase().unwrap_or(RunPhase::Validating);
                report.phases.push(RunPhase::Failed);
                error!(
                    run_id = %run_id,
                    phase = %phase,
                    phases = ?report.phases,
                    error = %e,
                    "Run failed"
                );
                Err(e)
            },
        }
    }

    /// Compute what a run would load without loading or executing anything.
    ///
    /// Payloads are still acquired, since selection depends on their text;
    /// indirect payloads are therefore injected into the host.
    ///
    /// # Errors
    ///
    /// Same as [`Orchestrator::run`] up to resolution.
    pub async fn plan(&self, invocation: impl Into<Invocation>) -> ShimResult<LoadPlan> {
        let config = RunConfig::from_invocation(invocation.into(), &self.registry)?;
        let channel = RegistrationChannel::new();
        let acquirer = self.acquirer(&channel);

        let mut state = LoadState::new();
        let bootstrap = self.resolve(self.bootstrap_needed(), &mut state)?;

        let texts = Self::acquire_payloads(&acquirer, &config).await?;
        let selected = self.select(&config, &texts);

        let mut state = LoadState::new();
        for name in &bootstrap {
            state.mark_loaded(name.clone());
        }
        let load_order = self.resolve(selected.iter(), &mut state)?;

        let queued: HashSet<&CapabilityName> = load_order.iter().collect();
        let activation_order = self
            .registry
            .iter()
            .map(|d| d.name())
            .filter(|name| queued.contains(name))
            .cloned()
            .collect();

        let execute_count = config.execute_payloads().len();
        let payloads = config
            .all_payloads()
            .zip(&texts)
            .enumerate()
            .map(|(slot, (payload, text))| PlannedPayload {
                locator: payload.locator().to_string(),
                indirect: payload.is_indirect(),
                analyze_only: slot >= execute_count,
                bytes: text.len(),
            })
            .collect();

        Ok(LoadPlan {
            bootstrap,
            selected,
            load_order,
            activation_order,
            payloads,
        })
    }

    async fn run_phases(&self, invocation: Invocation, report: &mut RunReport) -> ShimResult<()> {
        report.enter(RunPhase::Validating);
        let config = RunConfig::from_invocation(invocation, &self.registry)?;
        let channel = RegistrationChannel::new();
        let acquirer = self.acquirer(&channel);

        let mut loaded = Vec::new();
        let bootstrap: Vec<&CapabilityName> = self.bootstrap_needed().collect();
        if !bootstrap.is_empty() {
            report.enter(RunPhase::Bootstrapping);
            let mut state = LoadState::new();
            let queue = self.resolve(bootstrap, &mut state)?;
            let state = self.load(&acquirer, &channel, state, &queue).await?;
            report.bootstrapped = self.activate(state);
            loaded = queue;
        }

        report.enter(RunPhase::AcquiringPayloads);
        let texts = Self::acquire_payloads(&acquirer, &config).await?;

        report.enter(RunPhase::AnalyzingAndResolving);
        let selected = self.select(&config, &texts);
        let mut state = LoadState::new();
        for name in loaded {
            state.mark_loaded(name);
        }
        let queue = self.resolve(selected.iter(), &mut state)?;
        debug!(
            selected = selected.len(),
            to_load = queue.len(),
            "Resolved capabilities"
        );

        report.enter(RunPhase::LoadingCapabilities);
        let state = self.load(&acquirer, &channel, state, &queue).await?;

        report.enter(RunPhase::Activating);
        report.activated = self.activate(state);

        report.enter(RunPhase::ExecutingPayloads);
        for (payload, text) in config.execute_payloads().iter().zip(&texts) {
            match config.mode() {
                ExecutionMode::Attach if !payload.is_indirect() => acquirer.attach_payload(payload)?,
                // Indirect payloads have no fetchable locator to attach.
                ExecutionMode::Attach | ExecutionMode::Evaluate => self.host.evaluate(text)?,
            }
            report.executed = report.executed.saturating_add(1);
        }

        for callback in config.callbacks() {
            match callback {
                CompletionCallback::Procedure(f) => f(),
                CompletionCallback::Named(name) => self.host.invoke_global(name)?,
            }
            report.callbacks_invoked = report.callbacks_invoked.saturating_add(1);
        }
        Ok(())
    }

    fn acquirer<'a>(&'a self, channel: &'a RegistrationChannel) -> Acquirer<'a> {
        Acquirer::new(
            self.fetcher.as_ref(),
            self.host.as_ref(),
            channel,
            self.base_url.as_ref(),
        )
    }

    /// Bootstrap capabilities the host lacks.
    fn bootstrap_needed(&self) -> impl Iterator<Item = &CapabilityName> {
        self.bootstrap.iter().filter(|name| {
            self.registry
                .get(name.as_str())
                .is_some_and(|d| d.environment_needs(self.host.as_ref()))
        })
    }

    fn select(&self, config: &RunConfig, texts: &[String]) -> Vec<CapabilityName> {
        self.registry
            .iter()
            .filter(|d| config.selects(d, self.host.as_ref(), texts))
            .map(|d| d.name().clone())
            .collect()
    }

    fn resolve<'n>(
        &self,
        names: impl IntoIterator<Item = &'n CapabilityName>,
        state: &mut LoadState,
    ) -> ShimResult<Vec<CapabilityName>> {
        Resolver::new(&self.registry, self.host.as_ref()).resolve_all(names, state)
    }

    /// Every payload's text, in slot order. All or nothing.
    async fn acquire_payloads(acquirer: &Acquirer<'_>, config: &RunConfig) -> ShimResult<Vec<String>> {
        try_join_all(config.all_payloads().map(|p| acquirer.acquire_payload(p))).await
    }

    /// Arm the barrier, start every queued load, and wait for the phase.
    async fn load(
        &self,
        acquirer: &Acquirer<'_>,
        channel: &RegistrationChannel,
        state: LoadState,
        queue: &[CapabilityName],
    ) -> ShimResult<LoadState> {
        let wait = channel.arm(state);
        for name in queue {
            acquirer.load_capability(self.registry.lookup(name.as_str())?)?;
        }
        wait.wait().await
    }

    /// Invoke every stored activation in registry order.
    fn activate(&self, mut state: LoadState) -> Vec<CapabilityName> {
        let mut activated = Vec::new();
        for descriptor in self.registry.iter() {
            if let Some(activation) = state.take_activation(descriptor.name().as_str()) {
                debug!(capability = %descriptor.name(), "Activating capability");
                activation();
                activated.push(descriptor.name().clone());
            }
        }
        activated
    }
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("capabilities", &self.registry.len())
            .field("base_url", &self.base_url.as_ref().map(Url::as_str))
            .field("bootstrap", &self.bootstrap)
            .finish_non_exhaustive()
    }
}
