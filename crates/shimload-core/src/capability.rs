//! Capability descriptors and the predicates attached to them.
//!
//! A [`CapabilityDescriptor`] is pure data: a name, a locator for its
//! implementation, and three predicates. [`EnvironmentProbe`] decides whether
//! the host lacks the capability, [`UsageMatcher`] decides whether a payload
//! appears to use it, and [`DependencyRule`] computes its prerequisites against
//! the in-progress load state.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ShimError, ShimResult};
use crate::host::Host;
use crate::load_state::{LoadState, LoadStatus};
use crate::registry::CapabilityRegistry;

/// Unique, stable capability identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CapabilityName(String);

impl<'de> Deserialize<'de> for CapabilityName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

impl CapabilityName {
    /// Create a validated capability name.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the name is empty or contains whitespace.
    pub fn new(name: impl Into<String>) -> ShimResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(ShimError::config(
                "capability",
                "capability name must not be empty",
            ));
        }
        if name.chars().any(char::is_whitespace) {
            return Err(ShimError::config(
                "capability",
                format!("capability name must not contain whitespace, got: {name:?}"),
            ));
        }
        Ok(Self(name))
    }

    /// The name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CapabilityName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CapabilityName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for CapabilityName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Opaque reference to a loadable resource, usually a URL or a path
/// relative to the configured base URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locator(String);

impl Locator {
    /// Wrap a locator string.
    #[must_use]
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    /// The locator as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolve this locator against an optional base URL.
    ///
    /// Absolute locators are returned unchanged in meaning; without a base the
    /// locator is passed through verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`ShimError::Acquisition`] if the locator cannot be joined onto
    /// the base URL.
    pub fn resolve(&self, base: Option<&Url>) -> ShimResult<String> {
        match base {
            Some(base) => base
                .join(&self.0)
                .map(String::from)
                .map_err(|e| ShimError::Acquisition {
                    locator: self.0.clone(),
                    message: format!("cannot resolve against {base}: {e}"),
                }),
            None => Ok(self.0.clone()),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Locator {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Locator {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Probe function type for [`EnvironmentProbe::Custom`].
pub type ProbeFn = Arc<dyn Fn(&dyn Host) -> bool + Send + Sync>;

/// Matcher function type for [`UsageMatcher::Custom`].
pub type MatchFn = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Rule function type for [`DependencyRule::Dynamic`].
pub type DependencyFn = Arc<dyn Fn(&DependencyContext<'_>) -> Vec<CapabilityName> + Send + Sync>;

/// Decides whether the host lacks a capability.
#[derive(Clone)]
pub enum EnvironmentProbe {
    /// The host always needs the capability.
    Always,
    /// The host never needs the capability.
    Never,
    /// Needed when the given global path is absent from the host.
    MissingGlobal(String),
    /// Arbitrary side-effect-free probe.
    Custom(ProbeFn),
}

impl EnvironmentProbe {
    /// Wrap a closure as a custom probe.
    pub fn custom(f: impl Fn(&dyn Host) -> bool + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }

    /// Whether the host lacks the capability.
    #[must_use]
    pub fn needs(&self, host: &dyn Host) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::MissingGlobal(path) => !host.has_global(path),
            Self::Custom(f) => f(host),
        }
    }
}

impl fmt::Debug for EnvironmentProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => f.write_str("Always"),
            Self::Never => f.write_str("Never"),
            Self::MissingGlobal(path) => f.debug_tuple("MissingGlobal").field(path).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Decides whether a payload's source text appears to use a capability.
///
/// False negatives are tolerated; false positives only cause extra loading.
#[derive(Clone)]
pub enum UsageMatcher {
    /// No payload ever references the capability.
    Never,
    /// Referenced when the text contains the literal.
    Contains(String),
    /// Referenced when the expression matches anywhere in the text.
    Pattern(Regex),
    /// Arbitrary pure predicate.
    Custom(MatchFn),
}

impl UsageMatcher {
    /// Compile a regular expression matcher.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the expression does not compile.
    pub fn pattern(expr: &str) -> ShimResult<Self> {
        Regex::new(expr)
            .map(Self::Pattern)
            .map_err(|e| ShimError::config("usage.pattern", e.to_string()))
    }

    /// Wrap a closure as a custom matcher.
    pub fn custom(f: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }

    /// Whether `source` appears to reference the capability.
    #[must_use]
    pub fn matches(&self, source: &str) -> bool {
        match self {
            Self::Never => false,
            Self::Contains(needle) => source.contains(needle.as_str()),
            Self::Pattern(re) => re.is_match(source),
            Self::Custom(f) => f(source),
        }
    }
}

impl fmt::Debug for UsageMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Never => f.write_str("Never"),
            Self::Contains(needle) => f.debug_tuple("Contains").field(needle).finish(),
            Self::Pattern(re) => f.debug_tuple("Pattern").field(&re.as_str()).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Computes the prerequisites of a capability.
#[derive(Clone)]
pub enum DependencyRule {
    /// No prerequisites.
    None,
    /// A static, ordered list of prerequisites.
    Fixed(Vec<CapabilityName>),
    /// Prerequisites computed from the in-progress load state.
    Dynamic(DependencyFn),
}

impl DependencyRule {
    /// Build a fixed rule from plain names.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if any name is invalid.
    pub fn fixed<I, S>(names: I) -> ShimResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names
            .into_iter()
            .map(CapabilityName::new)
            .collect::<ShimResult<Vec<_>>>()
            .map(Self::Fixed)
    }

    /// Wrap a closure as a dynamic rule.
    pub fn dynamic(
        f: impl Fn(&DependencyContext<'_>) -> Vec<CapabilityName> + Send + Sync + 'static,
    ) -> Self {
        Self::Dynamic(Arc::new(f))
    }

    fn evaluate(&self, ctx: &DependencyContext<'_>) -> Vec<CapabilityName> {
        match self {
            Self::None => Vec::new(),
            Self::Fixed(names) => names.clone(),
            Self::Dynamic(f) => f(ctx),
        }
    }
}

impl fmt::Debug for DependencyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Fixed(names) => f.debug_tuple("Fixed").field(names).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// Read-only view handed to [`DependencyRule::Dynamic`] rules.
///
/// Exposes the partial load state of the current phase so a rule can drop a
/// prerequisite that something else has already requested.
pub struct DependencyContext<'a> {
    state: &'a LoadState,
    registry: &'a CapabilityRegistry,
    host: &'a dyn Host,
}

impl<'a> DependencyContext<'a> {
    pub(crate) fn new(
        state: &'a LoadState,
        registry: &'a CapabilityRegistry,
        host: &'a dyn Host,
    ) -> Self {
        Self {
            state,
            registry,
            host,
        }
    }

    /// Whether `name` has been requested (pending or ready) in this phase.
    #[must_use]
    pub fn is_requested(&self, name: &str) -> bool {
        self.state.status(name) != LoadStatus::Absent
    }

    /// Whether the host lacks `name`. Unknown names are reported as not needed.
    #[must_use]
    pub fn environment_needs(&self, name: &str) -> bool {
        self.registry
            .get(name)
            .is_some_and(|descriptor| descriptor.environment_needs(self.host))
    }

    /// The partial load state of the current phase.
    #[must_use]
    pub fn load_state(&self) -> &LoadState {
        self.state
    }
}

/// Describes one patchable capability.
#[derive(Debug, Clone)]
pub struct CapabilityDescriptor {
    name: CapabilityName,
    locator: Locator,
    environment: EnvironmentProbe,
    usage: UsageMatcher,
    dependencies: DependencyRule,
}

impl CapabilityDescriptor {
    /// Create a descriptor that is always needed, never referenced, and has no
    /// prerequisites. Use the `with_*` builders to refine it.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the name is invalid.
    pub fn new(name: impl Into<String>, locator: impl Into<Locator>) -> ShimResult<Self> {
        Ok(Self {
            name: CapabilityName::new(name)?,
            locator: locator.into(),
            environment: EnvironmentProbe::Always,
            usage: UsageMatcher::Never,
            dependencies: DependencyRule::None,
        })
    }

    /// Set the environment probe.
    #[must_use]
    pub fn with_environment(mut self, probe: EnvironmentProbe) -> Self {
        self.environment = probe;
        self
    }

    /// Set the usage matcher.
    #[must_use]
    pub fn with_usage(mut self, matcher: UsageMatcher) -> Self {
        self.usage = matcher;
        self
    }

    /// Set the dependency rule.
    #[must_use]
    pub fn with_dependencies(mut self, rule: DependencyRule) -> Self {
        self.dependencies = rule;
        self
    }

    /// The capability name.
    #[must_use]
    pub fn name(&self) -> &CapabilityName {
        &self.name
    }

    /// Where the implementation is loaded from.
    #[must_use]
    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    /// The raw dependency rule.
    #[must_use]
    pub fn dependency_rule(&self) -> &DependencyRule {
        &self.dependencies
    }

    /// Whether the host lacks this capability.
    #[must_use]
    pub fn environment_needs(&self, host: &dyn Host) -> bool {
        self.environment.needs(host)
    }

    /// Whether `source` appears to use this capability.
    #[must_use]
    pub fn script_needs(&self, source: &str) -> bool {
        self.usage.matches(source)
    }

    /// Prerequisites of this capability given the current partial load state.
    #[must_use]
    pub fn dependencies(&self, ctx: &DependencyContext<'_>) -> Vec<CapabilityName> {
        self.dependencies.evaluate(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::RegistrationChannel;

    struct Globals(&'static [&'static str]);

    impl Host for Globals {
        fn has_global(&self, path: &str) -> bool {
            self.0.contains(&path)
        }
        fn inject(&self, _url: &str, _channel: &RegistrationChannel) -> ShimResult<()> {
            Ok(())
        }
        fn evaluate(&self, _source: &str) -> ShimResult<()> {
            Ok(())
        }
        fn invoke_global(&self, name: &str) -> ShimResult<()> {
            Err(ShimError::UnresolvedCallback(name.to_string()))
        }
    }

    #[test]
    fn test_name_validation() {
        assert!(CapabilityName::new("arrayIndexOf").is_ok());
        assert!(CapabilityName::new("Element-Prototype").is_ok());
        assert!(CapabilityName::new("").is_err());
        assert!(CapabilityName::new("array index").is_err());
    }

    #[test]
    fn test_name_deserialize_rejects_empty() {
        let parsed: Result<CapabilityName, _> = serde_json::from_str("\"\"");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_missing_global_probe() {
        let host = Globals(&["JSON"]);
        assert!(!EnvironmentProbe::MissingGlobal("JSON".into()).needs(&host));
        assert!(EnvironmentProbe::MissingGlobal("Array.isArray".into()).needs(&host));
        assert!(EnvironmentProbe::Always.needs(&host));
        assert!(!EnvironmentProbe::Never.needs(&host));
    }

    #[test]
    fn test_probe_is_idempotent() {
        let host = Globals(&[]);
        let probe = EnvironmentProbe::MissingGlobal("XMLHttpRequest".into());
        let first = probe.needs(&host);
        for _ in 0..5 {
            assert_eq!(probe.needs(&host), first);
        }
    }

    #[test]
    fn test_usage_matchers() {
        assert!(UsageMatcher::Contains("JSON.".into()).matches("var x = JSON.parse(s);"));
        assert!(!UsageMatcher::Contains("JSON.".into()).matches("var x = 1;"));
        assert!(!UsageMatcher::Never.matches("anything"));

        let pattern = UsageMatcher::pattern(r"\.trim\(").unwrap();
        assert!(pattern.matches("name.trim()"));
        assert!(!pattern.matches("trimmed"));

        let custom = UsageMatcher::custom(|s| s.len() > 3);
        assert!(custom.matches("long"));
    }

    #[test]
    fn test_bad_pattern_is_configuration_error() {
        let err = UsageMatcher::pattern("(unclosed").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_locator_resolution() {
        let base = Url::parse("https://cdn.example.com/shims/").unwrap();
        let loc = Locator::new("isArray.js");
        assert_eq!(
            loc.resolve(Some(&base)).unwrap(),
            "https://cdn.example.com/shims/isArray.js"
        );
        assert_eq!(loc.resolve(None).unwrap(), "isArray.js");

        let absolute = Locator::new("https://other.example.org/x.js");
        assert_eq!(
            absolute.resolve(Some(&base)).unwrap(),
            "https://other.example.org/x.js"
        );
    }

    #[test]
    fn test_descriptor_defaults() {
        let host = Globals(&[]);
        let d = CapabilityDescriptor::new("createElement", "createElement.js").unwrap();
        assert!(d.environment_needs(&host));
        assert!(!d.script_needs("document.createElement('x')"));
        assert!(matches!(d.dependency_rule(), DependencyRule::None));
    }
}
