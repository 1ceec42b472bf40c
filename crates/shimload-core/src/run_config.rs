//! Validated, normalized run configuration.

use std::collections::BTreeSet;

use regex::{NoExpand, Regex};
use tracing::warn;

use crate::capability::{CapabilityDescriptor, CapabilityName, Locator};
use crate::error::{ShimError, ShimResult};
use crate::host::Host;
use crate::options::{CompletionCallback, Invocation, PayloadKind, PayloadSpec, PositionalArg, RunOptions};
use crate::registry::CapabilityRegistry;

/// Where the callback identifier goes in an indirect payload's locator.
#[derive(Debug, Clone)]
pub enum CallbackPattern {
    /// First literal occurrence of this placeholder.
    Literal(String),
    /// First match of this expression.
    Pattern(Regex),
}

impl CallbackPattern {
    /// Replace the first placeholder occurrence in `locator` with `callback_id`.
    #[must_use]
    pub fn substitute(&self, locator: &str, callback_id: &str) -> String {
        match self {
            Self::Literal(placeholder) => locator.replacen(placeholder.as_str(), callback_id, 1),
            Self::Pattern(re) => re.replacen(locator, 1, NoExpand(callback_id)).into_owned(),
        }
    }

    fn occurs_in(&self, locator: &str) -> bool {
        match self {
            Self::Literal(placeholder) => locator.contains(placeholder.as_str()),
            Self::Pattern(re) => re.is_match(locator),
        }
    }
}

/// How a payload's text is retrieved.
#[derive(Debug, Clone)]
pub enum Retrieval {
    /// Fetched with validation.
    Direct,
    /// Injected; delivers its text through the registration channel.
    Indirect(CallbackPattern),
}

/// A validated payload.
#[derive(Debug, Clone)]
pub struct PayloadDescriptor {
    locator: Locator,
    retrieval: Retrieval,
}

impl PayloadDescriptor {
    /// A directly fetched payload.
    pub fn direct(locator: impl Into<Locator>) -> Self {
        Self {
            locator: locator.into(),
            retrieval: Retrieval::Direct,
        }
    }

    /// The payload locator.
    #[must_use]
    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    /// How the payload is retrieved.
    #[must_use]
    pub fn retrieval(&self) -> &Retrieval {
        &self.retrieval
    }

    /// Whether the payload is retrieved indirectly.
    #[must_use]
    pub fn is_indirect(&self) -> bool {
        matches!(self.retrieval, Retrieval::Indirect(_))
    }

    fn from_spec(spec: PayloadSpec, field: &str) -> ShimResult<Self> {
        let (url, kind, callback, callback_pattern) = match spec {
            PayloadSpec::Url(url) => (url, PayloadKind::Direct, None, None),
            PayloadSpec::Detailed {
                url,
                kind,
                callback,
                callback_pattern,
            } => (url, kind, callback, callback_pattern),
        };

        if url.trim().is_empty() {
            return Err(ShimError::config(field, "payload url must not be empty"));
        }

        let retrieval = match (kind, callback, callback_pattern) {
            (PayloadKind::Direct, None, None) => Retrieval::Direct,
            (PayloadKind::Direct, _, _) => {
                return Err(ShimError::config(
                    field,
                    format!("{url}: callback placeholders only apply to indirect payloads"),
                ));
            },
            (PayloadKind::Indirect, Some(placeholder), None) => {
                if placeholder.is_empty() {
                    return Err(ShimError::config(field, format!("{url}: empty callback placeholder")));
                }
                Retrieval::Indirect(CallbackPattern::Literal(placeholder))
            },
            (PayloadKind::Indirect, None, Some(expr)) => {
                let re = Regex::new(&expr)
                    .map_err(|e| ShimError::config(field, format!("{url}: bad callback_pattern: {e}")))?;
                Retrieval::Indirect(CallbackPattern::Pattern(re))
            },
            (PayloadKind::Indirect, None, None) => {
                return Err(ShimError::config(
                    field,
                    format!("{url}: indirect payloads need a callback or callback_pattern"),
                ));
            },
            (PayloadKind::Indirect, Some(_), Some(_)) => {
                return Err(ShimError::config(
                    field,
                    format!("{url}: give either callback or callback_pattern, not both"),
                ));
            },
        };

        if let Retrieval::Indirect(pattern) = &retrieval
            && !pattern.occurs_in(&url)
        {
            return Err(ShimError::config(
                field,
                format!("{url}: callback placeholder does not occur in the url"),
            ));
        }

        Ok(Self {
            locator: Locator::new(url),
            retrieval,
        })
    }
}

/// What happens to payload text once capabilities are active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Evaluate the text in the host's top-level scope.
    #[default]
    Evaluate,
    /// Inject the payload again as a resource.
    Attach,
}

/// A normalized, validated run configuration.
#[derive(Debug, Clone)]
pub struct RunConfig {
    execute: Vec<PayloadDescriptor>,
    analyze_only: Vec<PayloadDescriptor>,
    analyze: bool,
    always_load: BTreeSet<CapabilityName>,
    never_load: BTreeSet<CapabilityName>,
    callbacks: Vec<CompletionCallback>,
    mode: ExecutionMode,
}

impl RunConfig {
    /// Validate and normalize an invocation.
    ///
    /// Names in `always_load`/`never_load` that the registry does not know are
    /// logged and ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ShimError::Configuration`] for any malformed field.
    pub fn from_invocation(invocation: Invocation, registry: &CapabilityRegistry) -> ShimResult<Self> {
        match invocation {
            Invocation::Options(options) => Self::from_options(options, registry),
            Invocation::Positional(args) => Self::from_positional(args),
        }
    }

    fn from_options(options: RunOptions, registry: &CapabilityRegistry) -> ShimResult<Self> {
        let execute = payloads(options.execute_payloads.into_vec(), "execute_payloads")?;
        let analyze_only = payloads(options.analyze_only_payloads.into_vec(), "analyze_only_payloads")?;

        Ok(Self {
            execute,
            analyze_only,
            analyze: options.analyze.unwrap_or(true),
            always_load: capability_set(options.always_load.into_vec(), "always_load", registry)?,
            never_load: capability_set(options.never_load.into_vec(), "never_load", registry)?,
            callbacks: options.on_complete.into_vec(),
            mode: if options.attach_as_resource {
                ExecutionMode::Attach
            } else {
                ExecutionMode::Evaluate
            },
        })
    }

    fn from_positional(args: Vec<PositionalArg>) -> ShimResult<Self> {
        if args.is_empty() {
            return Err(ShimError::config("arguments", "at least one argument is required"));
        }

        let mut callbacks = Vec::new();
        let mut execute = Vec::new();
        for (index, arg) in args.into_iter().enumerate() {
            match arg {
                PositionalArg::Callback(callback) if index == 0 => callbacks.push(callback),
                PositionalArg::Callback(_) => {
                    return Err(ShimError::config(
                        "arguments",
                        format!("argument {index}: all scripts must be locators; only the first argument may be a callback"),
                    ));
                },
                PositionalArg::Script(url) => {
                    execute.push(PayloadDescriptor::from_spec(PayloadSpec::Url(url), "arguments")?);
                },
            }
        }

        Ok(Self {
            execute,
            analyze_only: Vec::new(),
            analyze: true,
            always_load: BTreeSet::new(),
            never_load: BTreeSet::new(),
            callbacks,
            mode: ExecutionMode::Evaluate,
        })
    }

    /// Payloads that run after activation, in order.
    #[must_use]
    pub fn execute_payloads(&self) -> &[PayloadDescriptor] {
        &self.execute
    }

    /// Payloads that are analyzed but never run.
    #[must_use]
    pub fn analyze_only_payloads(&self) -> &[PayloadDescriptor] {
        &self.analyze_only
    }

    /// Every payload in acquisition slot order: execute payloads first.
    pub fn all_payloads(&self) -> impl Iterator<Item = &PayloadDescriptor> {
        self.execute.iter().chain(self.analyze_only.iter())
    }

    /// Whether payload text is analyzed.
    #[must_use]
    pub fn analyze(&self) -> bool {
        self.analyze
    }

    /// Capabilities forced on when the host lacks them.
    #[must_use]
    pub fn always_load(&self) -> &BTreeSet<CapabilityName> {
        &self.always_load
    }

    /// Capabilities excluded from analysis-driven selection.
    #[must_use]
    pub fn never_load(&self) -> &BTreeSet<CapabilityName> {
        &self.never_load
    }

    /// Completion callbacks, in order.
    #[must_use]
    pub fn callbacks(&self) -> &[CompletionCallback] {
        &self.callbacks
    }

    /// What happens to payload text after activation.
    #[must_use]
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Whether `descriptor` should be loaded for payloads with text `sources`.
    ///
    /// The host must lack the capability; then either it is forced with
    /// `always_load`, or analysis is on, it is not excluded with `never_load`,
    /// and at least one payload appears to use it.
    #[must_use]
    pub fn selects(&self, descriptor: &CapabilityDescriptor, host: &dyn Host, sources: &[String]) -> bool {
        if !descriptor.environment_needs(host) {
            return false;
        }
        let name = descriptor.name();
        self.always_load.contains(name)
            || (!self.never_load.contains(name)
                && self.analyze
                && sources.iter().any(|text| descriptor.script_needs(text)))
    }
}

fn payloads(specs: Vec<PayloadSpec>, field: &str) -> ShimResult<Vec<PayloadDescriptor>> {
    specs
        .into_iter()
        .map(|spec| PayloadDescriptor::from_spec(spec, field))
        .collect()
}

fn capability_set(
    names: Vec<String>,
    field: &str,
    registry: &CapabilityRegistry,
) -> ShimResult<BTreeSet<CapabilityName>> {
    let mut set = BTreeSet::new();
    for name in names {
        let name = CapabilityName::new(name).map_err(|e| ShimError::config(field, e.to_string()))?;
        if !registry.contains(name.as_str()) {
            warn!(field, capability = %name, "Ignoring unknown capability");
            continue;
        }
        set.insert(name);
    }
    Ok(set)
}
