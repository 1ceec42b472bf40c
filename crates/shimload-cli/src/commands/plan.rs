//! `shimload plan`: what a run would load, without loading it.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use shimload_config::Config;
use shimload_core::{LoadPlan, Orchestrator, RunOptions};
use shimload_telemetry::{RunContext, RunGuard};
use tracing::debug;

use crate::profile::{LocalFetcher, ProfileHost};
use crate::theme::Theme;
use crate::{OutputFormat, PlanArgs, config_bridge};

/// Plan a run for the given payloads against the configured host profile.
pub(crate) async fn run_plan(args: PlanArgs, config: &Config, format: OutputFormat) -> Result<()> {
    let options = build_options(&args, config)?;
    let base_url = config_bridge::base_url(config, args.base_url.as_deref())?;

    let host = ProfileHost::new(
        config
            .environment
            .globals
            .iter()
            .chain(&args.globals)
            .cloned(),
    );
    let fetcher = LocalFetcher::new(&config_bridge::to_http_config(config))?;
    let registry = shimload_core::catalog::builtin()?;

    let mut orchestrator = Orchestrator::new(Arc::new(registry), Arc::new(host), Arc::new(fetcher))
        .with_bootstrap(&config.orchestrator.bootstrap)?;
    if let Some(base) = base_url {
        orchestrator = orchestrator.with_base_url(base);
    }

    let payloads = options
        .execute_payloads
        .len()
        .saturating_add(options.analyze_only_payloads.len());
    debug!(payloads, base_url = ?orchestrator.base_url(), "Planning run");
    let guard = RunGuard::new(RunContext::new("plan").with_label("payloads", payloads.to_string()));
    let result = orchestrator.plan(options).await;
    guard.finish(result.is_ok());
    let plan = result?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
        OutputFormat::Pretty => print!("{}", render(&plan)),
    }
    Ok(())
}

/// Options from `--options` (or the configured defaults), plus flags.
fn build_options(args: &PlanArgs, config: &Config) -> Result<RunOptions> {
    let mut options = match &args.options {
        Some(path) => read_options(path)?,
        None => config_bridge::default_options(config),
    };
    for payload in &args.execute {
        options = options.execute(payload.as_str());
    }
    for payload in &args.analyze_only {
        options = options.analyze_only(payload.as_str());
    }
    for name in &args.always {
        options = options.always(name.clone());
    }
    for name in &args.never {
        options = options.never(name.clone());
    }
    if args.no_analyze {
        options = options.with_analyze(false);
    }
    Ok(options)
}

fn read_options(path: &Path) -> Result<RunOptions> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let options = if path.extension().is_some_and(|e| e == "json") {
        serde_json::from_str(&content).with_context(|| format!("invalid JSON in {}", path.display()))?
    } else {
        toml::from_str(&content).with_context(|| format!("invalid TOML in {}", path.display()))?
    };
    Ok(options)
}

fn render(plan: &LoadPlan) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", Theme::header("Load plan"));
    let _ = writeln!(out, "{}", Theme::separator());
    let _ = writeln!(out, "  Bootstrap:   {}", Theme::list(&plan.bootstrap));
    let _ = writeln!(out, "  Selected:    {}", Theme::list(&plan.selected));
    let _ = writeln!(out, "  Load order:  {}", Theme::list(&plan.load_order));
    let _ = writeln!(out, "  Activation:  {}", Theme::list(&plan.activation_order));

    let _ = writeln!(out, "\n{}", Theme::header("Payloads"));
    if plan.payloads.is_empty() {
        let _ = writeln!(out, "  {}", Theme::dimmed("(none)"));
    }
    for (i, payload) in plan.payloads.iter().enumerate() {
        let mut notes = vec![format!("{} bytes", payload.bytes)];
        if payload.indirect {
            notes.push("indirect".to_owned());
        }
        if payload.analyze_only {
            notes.push("analyze only".to_owned());
        }
        let _ = writeln!(
            out,
            "  {}. {} {}",
            i.saturating_add(1),
            payload.locator,
            Theme::dimmed(&format!("({})", notes.join(", ")))
        );
    }
    out
}
