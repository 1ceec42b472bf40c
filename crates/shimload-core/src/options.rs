//! Caller-facing run options.
//!
//! These types mirror what a caller writes by hand (or in TOML/JSON): lists
//! may be given as a single value, payloads as a bare URL string, and
//! completion callbacks as a global name. They are checked and normalized
//! into a [`RunConfig`](crate::RunConfig) before anything runs.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer};

/// A single value or a list of values.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    /// A list of values. Tried first so a list is never read as one value.
    Many(Vec<T>),
    /// A lone value, treated as a one-element list.
    One(T),
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl<T> OneOrMany<T> {
    /// Append a value, promoting a lone value to a list.
    pub fn push(&mut self, value: T) {
        match std::mem::take(self) {
            Self::One(first) => *self = Self::Many(vec![first, value]),
            Self::Many(mut values) => {
                values.push(value);
                *self = Self::Many(values);
            },
        }
    }

    /// Number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::One(_) => 1,
            Self::Many(values) => values.len(),
        }
    }

    /// Whether there are no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flatten into a list.
    #[must_use]
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::One(value) => vec![value],
            Self::Many(values) => values,
        }
    }
}

impl<T> From<Vec<T>> for OneOrMany<T> {
    fn from(values: Vec<T>) -> Self {
        Self::Many(values)
    }
}

/// How a payload's text is retrieved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadKind {
    /// Plain GET with content validation.
    #[default]
    Direct,
    /// The resource is injected and delivers its text through a callback.
    Indirect,
}

/// A payload as written by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PayloadSpec {
    /// Bare locator, fetched directly.
    Url(String),
    /// Full form.
    Detailed {
        /// Locator of the payload.
        url: String,
        /// Retrieval kind.
        #[serde(default)]
        kind: PayloadKind,
        /// Literal placeholder replaced by the callback identifier.
        #[serde(default)]
        callback: Option<String>,
        /// Regular expression whose first match is replaced by the callback
        /// identifier.
        #[serde(default)]
        callback_pattern: Option<String>,
    },
}

impl PayloadSpec {
    /// An indirect payload whose callback identifier replaces `placeholder`.
    pub fn indirect(url: impl Into<String>, placeholder: impl Into<String>) -> Self {
        Self::Detailed {
            url: url.into(),
            kind: PayloadKind::Indirect,
            callback: Some(placeholder.into()),
            callback_pattern: None,
        }
    }

    /// An indirect payload whose callback identifier replaces the first
    /// match of `pattern`.
    pub fn indirect_pattern(url: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::Detailed {
            url: url.into(),
            kind: PayloadKind::Indirect,
            callback: None,
            callback_pattern: Some(pattern.into()),
        }
    }
}

impl From<&str> for PayloadSpec {
    fn from(url: &str) -> Self {
        Self::Url(url.to_string())
    }
}

impl From<String> for PayloadSpec {
    fn from(url: String) -> Self {
        Self::Url(url)
    }
}

/// Procedure type for [`CompletionCallback::Procedure`].
pub type CallbackFn = Arc<dyn Fn() + Send + Sync>;

/// Invoked after all payloads have executed.
#[derive(Clone)]
pub enum CompletionCallback {
    /// A procedure supplied by the caller.
    Procedure(CallbackFn),
    /// The name of a global procedure in the host.
    Named(String),
}

impl CompletionCallback {
    /// Wrap a closure.
    pub fn procedure(f: impl Fn() + Send + Sync + 'static) -> Self {
        Self::Procedure(Arc::new(f))
    }

    /// Refer to a host global by name.
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }
}

impl fmt::Debug for CompletionCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Procedure(_) => f.write_str("Procedure(..)"),
            Self::Named(name) => f.debug_tuple("Named").field(name).finish(),
        }
    }
}

impl<'de> Deserialize<'de> for CompletionCallback {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Self::Named)
    }
}

/// Options for a single run.
///
/// Every field is optional. `analyze` defaults to `true`; a name listed in
/// both `always_load` and `never_load` is loaded.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunOptions {
    /// Payloads analyzed and then executed, in order.
    pub execute_payloads: OneOrMany<PayloadSpec>,
    /// Payloads analyzed but never executed.
    pub analyze_only_payloads: OneOrMany<PayloadSpec>,
    /// Whether payload text is scanned for capability usage.
    pub analyze: Option<bool>,
    /// Capabilities loaded whenever the host lacks them.
    pub always_load: OneOrMany<String>,
    /// Capabilities never loaded on the strength of analysis alone.
    pub never_load: OneOrMany<String>,
    /// Completion callbacks, invoked in order.
    pub on_complete: OneOrMany<CompletionCallback>,
    /// Re-inject payloads as resources instead of evaluating their text.
    pub attach_as_resource: bool,
}

impl RunOptions {
    /// Empty options: analysis on, nothing to run.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a payload to analyze and execute.
    #[must_use]
    pub fn execute(mut self, payload: impl Into<PayloadSpec>) -> Self {
        self.execute_payloads.push(payload.into());
        self
    }

    /// Add a payload that is analyzed only.
    #[must_use]
    pub fn analyze_only(mut self, payload: impl Into<PayloadSpec>) -> Self {
        self.analyze_only_payloads.push(payload.into());
        self
    }

    /// Turn payload analysis on or off.
    #[must_use]
    pub fn with_analyze(mut self, analyze: bool) -> Self {
        self.analyze = Some(analyze);
        self
    }

    /// Load `name` whenever the host lacks it.
    #[must_use]
    pub fn always(mut self, name: impl Into<String>) -> Self {
        self.always_load.push(name.into());
        self
    }

    /// Do not load `name` on the strength of analysis.
    #[must_use]
    pub fn never(mut self, name: impl Into<String>) -> Self {
        self.never_load.push(name.into());
        self
    }

    /// Add a completion callback.
    #[must_use]
    pub fn on_complete(mut self, callback: CompletionCallback) -> Self {
        self.on_complete.push(callback);
        self
    }

    /// Re-inject payloads instead of evaluating their text.
    #[must_use]
    pub fn attach_as_resource(mut self, attach: bool) -> Self {
        self.attach_as_resource = attach;
        self
    }
}

/// One positional argument of a legacy invocation.
#[derive(Debug, Clone)]
pub enum PositionalArg {
    /// Completion callback; only valid as the first argument.
    Callback(CompletionCallback),
    /// Locator of a directly fetched script.
    Script(String),
}

impl From<&str> for PositionalArg {
    fn from(url: &str) -> Self {
        Self::Script(url.to_string())
    }
}

impl From<CompletionCallback> for PositionalArg {
    fn from(callback: CompletionCallback) -> Self {
        Self::Callback(callback)
    }
}

/// How a run was invoked.
#[derive(Debug, Clone)]
pub enum Invocation {
    /// A single options record.
    Options(RunOptions),
    /// Legacy form: an optional leading callback, then script locators.
    Positional(Vec<PositionalArg>),
}

impl From<RunOptions> for Invocation {
    fn from(options: RunOptions) -> Self {
        Self::Options(options)
    }
}
