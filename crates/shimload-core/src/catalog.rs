//! Built-in capability catalog for browser-style hosts.
//!
//! Environment probes are expressed as global paths, so any [`Host`] that can
//! answer [`Host::has_global`] can be planned against this catalog.
//!
//! [`Host`]: crate::Host
//! [`Host::has_global`]: crate::Host::has_global

use crate::capability::{
    CapabilityDescriptor, CapabilityName, DependencyContext, DependencyRule, EnvironmentProbe,
    UsageMatcher,
};
use crate::error::ShimResult;
use crate::registry::CapabilityRegistry;

/// Capabilities the orchestrator relies on before it can fetch payloads.
pub const BOOTSTRAP: &[&str] = &["xmlHttpRequest", "arrayIndexOf", "isArray", "typeOf"];

/// Matches a call to `method` through `.m(`, `.m.call(`, `.m.apply(`, or
/// bracket access such as `x["m"](`.
fn method_call_pattern(method: &str) -> String {
    let m = regex::escape(method);
    let access = format!(r#"(?:[\w\]]\[(?:"{m}"|'{m}')\]|\w\.{m})"#);
    let invoke = r#"(?:\(|\.call\(|\.apply\(|\[(?:"call"|'call')\]\(|\[(?:"apply"|'apply')\]\()"#;
    format!("{access}{invoke}")
}

/// Matches use of `Type.prototype` as a statement-level expression.
fn prototype_pattern(type_name: &str) -> String {
    format!(r"(?:\s|;|^|window\.){}\.prototype(?:\.\w|\[)", regex::escape(type_name))
}

/// `addEventListener` needs an element prototype to patch, unless one is
/// already requested in this phase or the host has both natively.
fn event_listener_dependencies(ctx: &DependencyContext<'_>) -> Vec<CapabilityName> {
    let mut deps = Vec::with_capacity(2);
    let prototype_available = ctx.is_requested("Element-Prototype")
        || ctx.is_requested("HTMLElement-Prototype")
        || !ctx.environment_needs("Element-Prototype")
        || !ctx.environment_needs("HTMLElement-Prototype");
    if !prototype_available && let Ok(name) = CapabilityName::new("Element-Prototype") {
        deps.push(name);
    }
    if let Ok(name) = CapabilityName::new("arrayIndexOf") {
        deps.push(name);
    }
    deps
}

fn probe(path: &str) -> EnvironmentProbe {
    EnvironmentProbe::MissingGlobal(path.to_string())
}

fn contains(needle: &str) -> UsageMatcher {
    UsageMatcher::Contains(needle.to_string())
}

/// Build the built-in registry.
///
/// Registration order is activation order: the element prototypes and
/// `arrayIndexOf` come before `addEventListener`, which patches through them.
///
/// # Errors
///
/// Only fails if a built-in pattern does not compile.
pub fn builtin() -> ShimResult<CapabilityRegistry> {
    CapabilityRegistry::builder()
        .register(
            CapabilityDescriptor::new("Element-Prototype", "Element-Prototype.js")?
                .with_environment(probe("Element"))
                .with_usage(UsageMatcher::pattern(&prototype_pattern("Element"))?),
        )?
        .register(
            CapabilityDescriptor::new("HTMLElement-Prototype", "HTMLElement-Prototype.js")?
                .with_environment(probe("HTMLElement"))
                .with_usage(UsageMatcher::pattern(&prototype_pattern("HTMLElement"))?),
        )?
        .register(
            CapabilityDescriptor::new("arrayIndexOf", "arrayIndexOf.js")?
                .with_environment(probe("Array.prototype.indexOf"))
                .with_usage(UsageMatcher::pattern(&method_call_pattern("indexOf"))?),
        )?
        .register(
            CapabilityDescriptor::new("addEventListener", "addEventListener.js")?
                .with_environment(probe("Element.prototype.addEventListener"))
                .with_usage(UsageMatcher::pattern(&method_call_pattern("addEventListener"))?)
                .with_dependencies(DependencyRule::dynamic(event_listener_dependencies)),
        )?
        .register(
            CapabilityDescriptor::new("xmlHttpRequest", "xmlHttpRequest.js")?
                .with_environment(probe("XMLHttpRequest"))
                .with_usage(contains("new XMLHttpRequest()")),
        )?
        .register(
            CapabilityDescriptor::new("isArray", "isArray.js")?
                .with_environment(probe("Array.isArray"))
                .with_usage(contains("Array.isArray")),
        )?
        .register(
            CapabilityDescriptor::new("typeOf", "typeOf.js")?
                .with_environment(probe("typeOf"))
                .with_usage(contains("typeOf")),
        )?
        .register(
            CapabilityDescriptor::new("JSON", "json2.js")?
                .with_environment(probe("JSON"))
                .with_usage(contains("JSON.")),
        )?
        .register(
            CapabilityDescriptor::new("canvas", "canvas.js")?
                .with_environment(probe("HTMLCanvasElement.prototype.getContext"))
                .with_usage(contains("getContext")),
        )?
        // Always needed, never detected: only loaded through `always_load`.
        .register(CapabilityDescriptor::new("createElement", "createElement.js")?)?
        .register(
            CapabilityDescriptor::new("stringTrim", "stringTrim.js")?
                .with_environment(probe("String.prototype.trim"))
                .with_usage(UsageMatcher::pattern(r"\.trim\(")?),
        )?
        .build()
}
