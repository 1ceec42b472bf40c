//! End-to-end runs: loading, gating, ordering, and aborts.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use shimload_core::{
    CapabilityDescriptor, CapabilityName, CapabilityRegistry, CompletionCallback, DependencyRule,
    FetchedResource, Host, RunOptions, RunPhase, ShimError,
};
use shimload_test::{
    HostEvent, MockFetcher, MockHost, chain_host, chain_registry, init_test_logging,
    mock_orchestrator, probed_capability,
};

fn names(list: &[&str]) -> Vec<CapabilityName> {
    list.iter().map(|n| CapabilityName::new(*n).unwrap()).collect()
}

/// `P` computes a dependency on `Q`; `order` fixes which one registers first.
/// With `cyclic`, `Q` computes a dependency on `P` as well.
fn pair_registry(order: [&str; 2], cyclic: bool) -> CapabilityRegistry {
    let mut builder = CapabilityRegistry::builder();
    for name in order {
        let descriptor = if name == "P" {
            probed_capability("P", "p.js", "P", "useP")
                .unwrap()
                .with_dependencies(DependencyRule::dynamic(|_| names(&["Q"])))
        } else if cyclic {
            probed_capability("Q", "q.js", "Q", "useQ")
                .unwrap()
                .with_dependencies(DependencyRule::dynamic(|_| names(&["P"])))
        } else {
            probed_capability("Q", "q.js", "Q", "useQ").unwrap()
        };
        builder = builder.register(descriptor).unwrap();
    }
    builder.build().unwrap()
}

#[tokio::test]
async fn test_dependency_chain_end_to_end() {
    init_test_logging();
    let host = chain_host();
    let fetcher = MockFetcher::new().with_script("page.js", "useB()");
    let orchestrator = mock_orchestrator(chain_registry().unwrap(), &host, &fetcher);

    let report = orchestrator
        .run(RunOptions::new().execute("page.js"))
        .await
        .unwrap();

    assert_eq!(host.injected(), vec!["a.js", "b.js"]);
    assert_eq!(host.inject_count("a.js"), 1);
    assert_eq!(host.inject_count("b.js"), 1);
    assert_eq!(host.activated(), vec!["A", "B"]);
    assert_eq!(host.evaluated(), vec!["useB()"]);

    let activate_b = host.position(&HostEvent::Activate("B".into())).unwrap();
    let evaluate = host.position(&HostEvent::Evaluate("useB()".into())).unwrap();
    assert!(activate_b < evaluate);

    assert_eq!(report.activated, names(&["A", "B"]));
    assert_eq!(report.executed, 1);
    assert_eq!(report.final_phase(), Some(RunPhase::Done));
    assert!(host.has_global("A") && host.has_global("B"));
}

#[tokio::test]
async fn test_missing_payload_aborts_before_anything_runs() {
    let host = chain_host();
    let fetcher = MockFetcher::new().with_script("ok.js", "useA()");
    let orchestrator = mock_orchestrator(chain_registry().unwrap(), &host, &fetcher);

    let called = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&called);
    let err = orchestrator
        .run(
            RunOptions::new()
                .execute("ok.js")
                .execute("missing.js")
                .on_complete(CompletionCallback::procedure(move || flag.store(true, Ordering::SeqCst))),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ShimError::HttpStatus { ref locator, status: 404 } if locator == "missing.js"
    ));
    assert!(host.injected().is_empty());
    assert!(host.evaluated().is_empty());
    assert!(!called.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_non_script_payload_rejected() {
    let host = chain_host();
    let fetcher = MockFetcher::new().with_response(
        "page.html",
        FetchedResource::script("<html>").with_content_type("text/html"),
    );
    let orchestrator = mock_orchestrator(chain_registry().unwrap(), &host, &fetcher);

    let err = orchestrator
        .run(RunOptions::new().execute("page.html"))
        .await
        .unwrap_err();
    assert!(matches!(err, ShimError::NotScript { .. }));
    assert!(host.evaluated().is_empty());
}

#[tokio::test]
async fn test_transport_failure_is_all_or_nothing() {
    let host = chain_host();
    let fetcher = MockFetcher::new()
        .with_script("one.js", "useA()")
        .with_refused("two.js", "connection reset");
    let orchestrator = mock_orchestrator(chain_registry().unwrap(), &host, &fetcher);

    let err = orchestrator
        .run(RunOptions::new().execute("one.js").execute("two.js"))
        .await
        .unwrap_err();

    assert!(matches!(err, ShimError::Acquisition { ref locator, .. } if locator == "two.js"));
    assert!(host.injected().is_empty());
    assert!(host.evaluated().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_activation_waits_for_slowest_capability() {
    let host = MockHost::new()
        .with_capability("a.js", "A")
        .with_delayed_capability("b.js", "B", Duration::from_millis(250));
    let fetcher = MockFetcher::new().with_script("page.js", "useA(); useB()");
    let orchestrator = mock_orchestrator(chain_registry().unwrap(), &host, &fetcher);

    orchestrator
        .run(RunOptions::new().execute("page.js"))
        .await
        .unwrap();

    let ready_a = host.position(&HostEvent::Ready("A".into())).unwrap();
    let ready_b = host.position(&HostEvent::Ready("B".into())).unwrap();
    let activate_a = host.position(&HostEvent::Activate("A".into())).unwrap();
    let evaluate = host
        .position(&HostEvent::Evaluate("useA(); useB()".into()))
        .unwrap();

    assert!(ready_a < ready_b);
    assert!(ready_b < activate_a, "A activated before B registered");
    assert!(activate_a < evaluate);
}

#[tokio::test(start_paused = true)]
async fn test_activation_follows_registry_order() {
    // P registers first; Q is its prerequisite and registers last.
    let host = MockHost::new()
        .with_capability("p.js", "P")
        .with_delayed_capability("q.js", "Q", Duration::from_millis(100));
    let fetcher = MockFetcher::new().with_script("page.js", "useP()");
    let orchestrator = mock_orchestrator(pair_registry(["Q", "P"], false), &host, &fetcher);

    let report = orchestrator
        .run(RunOptions::new().execute("page.js"))
        .await
        .unwrap();

    let ready_p = host.position(&HostEvent::Ready("P".into())).unwrap();
    let ready_q = host.position(&HostEvent::Ready("Q".into())).unwrap();
    assert!(ready_p < ready_q);
    assert_eq!(host.injected(), vec!["q.js", "p.js"]);
    assert_eq!(host.activated(), vec!["Q", "P"]);
    assert_eq!(report.activated, names(&["Q", "P"]));
}

#[tokio::test]
async fn test_computed_dependency_on_later_capability_rejected() {
    let host = MockHost::new()
        .with_capability("p.js", "P")
        .with_capability("q.js", "Q");
    let fetcher = MockFetcher::new().with_script("page.js", "useP()");
    let orchestrator = mock_orchestrator(pair_registry(["P", "Q"], false), &host, &fetcher);

    let err = orchestrator
        .run(RunOptions::new().execute("page.js"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ShimError::RegistryOrder { ref dependent, ref dependency } if dependent == "P" && dependency == "Q"
    ));
    assert!(host.injected().is_empty());
    assert!(host.activated().is_empty());
    assert!(host.evaluated().is_empty());
}

#[tokio::test]
async fn test_dependency_cycle_fails_before_loading() {
    let host = MockHost::new()
        .with_capability("p.js", "P")
        .with_capability("q.js", "Q");
    let fetcher = MockFetcher::new().with_script("page.js", "useP()");
    let orchestrator = mock_orchestrator(pair_registry(["Q", "P"], true), &host, &fetcher);

    let err = orchestrator
        .run(RunOptions::new().execute("page.js"))
        .await
        .unwrap_err();

    match err {
        ShimError::DependencyCycle { path } => assert_eq!(path, vec!["P", "Q", "P"]),
        other => panic!("expected a cycle, got {other}"),
    }
    assert!(host.injected().is_empty());
}

#[tokio::test]
async fn test_bootstrap_loaded_once() {
    // A's activation does not define its global, so only the load state
    // keeps it from being requested again.
    let host = MockHost::new()
        .with_capability("a.js", "A")
        .with_patching_capability("b.js", "B", "B");
    let fetcher = MockFetcher::new().with_script("page.js", "useA(); useB()");
    let orchestrator = mock_orchestrator(chain_registry().unwrap(), &host, &fetcher)
        .with_bootstrap(["A"])
        .unwrap();

    let report = orchestrator
        .run(RunOptions::new().execute("page.js"))
        .await
        .unwrap();

    assert_eq!(host.inject_count("a.js"), 1);
    assert_eq!(host.inject_count("b.js"), 1);
    assert_eq!(report.bootstrapped, names(&["A"]));
    assert_eq!(report.activated, names(&["B"]));
    assert_eq!(
        report.phases,
        vec![
            RunPhase::Validating,
            RunPhase::Bootstrapping,
            RunPhase::AcquiringPayloads,
            RunPhase::AnalyzingAndResolving,
            RunPhase::LoadingCapabilities,
            RunPhase::Activating,
            RunPhase::ExecutingPayloads,
            RunPhase::Done,
        ]
    );

    // Bootstrap activation precedes the payload fetch.
    let activate_a = host.position(&HostEvent::Activate("A".into())).unwrap();
    let inject_b = host.position(&HostEvent::Inject("b.js".into())).unwrap();
    assert!(activate_a < inject_b);
}

#[tokio::test]
async fn test_bootstrap_skipped_when_host_is_complete() {
    let host = chain_host().with_global("A");
    let fetcher = MockFetcher::new().with_script("page.js", "run()");
    let orchestrator = mock_orchestrator(chain_registry().unwrap(), &host, &fetcher)
        .with_bootstrap(["A"])
        .unwrap();

    let report = orchestrator
        .run(RunOptions::new().execute("page.js"))
        .await
        .unwrap();

    assert!(!report.phases.contains(&RunPhase::Bootstrapping));
    assert!(report.bootstrapped.is_empty());
    assert!(host.injected().is_empty());
}

#[tokio::test]
async fn test_unknown_bootstrap_name_rejected() {
    let host = chain_host();
    let fetcher = MockFetcher::new();
    let err = mock_orchestrator(chain_registry().unwrap(), &host, &fetcher)
        .with_bootstrap(["Z"])
        .unwrap_err();
    assert!(matches!(err, ShimError::UnknownCapability(ref name) if name == "Z"));
}

#[tokio::test]
async fn test_wrong_registration_name_is_misuse() {
    let host = MockHost::new().with_capability("a.js", "Z");
    let fetcher = MockFetcher::new().with_script("page.js", "useA()");
    let orchestrator = mock_orchestrator(chain_registry().unwrap(), &host, &fetcher);

    let err = orchestrator
        .run(RunOptions::new().execute("page.js"))
        .await
        .unwrap_err();

    assert!(matches!(err, ShimError::ChannelMisuse(_)));
    assert!(host.events().contains(&HostEvent::Rejected("Z".into())));
    assert!(host.activated().is_empty());
    assert!(host.evaluated().is_empty());
}

#[tokio::test]
async fn test_refused_injection_aborts() {
    let host = MockHost::new()
        .with_broken("a.js", "blocked by policy")
        .with_patching_capability("b.js", "B", "B");
    let fetcher = MockFetcher::new().with_script("page.js", "useB()");
    let orchestrator = mock_orchestrator(chain_registry().unwrap(), &host, &fetcher);

    let err = orchestrator
        .run(RunOptions::new().execute("page.js"))
        .await
        .unwrap_err();

    assert!(matches!(err, ShimError::Host(ref m) if m == "blocked by policy"));
    assert_eq!(host.inject_count("b.js"), 0);
    assert!(host.evaluated().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_silent_capability_never_completes() {
    let host = MockHost::new().with_silent("a.js");
    let fetcher = MockFetcher::new().with_script("page.js", "useA()");
    let orchestrator = mock_orchestrator(chain_registry().unwrap(), &host, &fetcher);

    let outcome = tokio::time::timeout(
        Duration::from_secs(30),
        orchestrator.run(RunOptions::new().execute("page.js")),
    )
    .await;

    assert!(outcome.is_err());
    assert!(host.evaluated().is_empty());
}

#[tokio::test]
async fn test_failing_payload_stops_later_payloads() {
    let host = chain_host().with_failing_source("throw()");
    let fetcher = MockFetcher::new()
        .with_script("first.js", "throw()")
        .with_script("second.js", "run()");
    let orchestrator = mock_orchestrator(chain_registry().unwrap(), &host, &fetcher);

    let err = orchestrator
        .run(RunOptions::new().execute("first.js").execute("second.js"))
        .await
        .unwrap_err();

    assert!(matches!(err, ShimError::Host(_)));
    assert_eq!(host.evaluated(), vec!["throw()"]);
}

#[tokio::test]
async fn test_base_url_applies_to_capabilities_and_payloads() {
    let base = url::Url::parse("https://cdn.example.test/shims/").unwrap();
    let host = MockHost::new()
        .with_patching_capability("https://cdn.example.test/shims/a.js", "A", "A");
    let fetcher = MockFetcher::new()
        .with_script("https://cdn.example.test/shims/app/page.js", "useA()");
    let orchestrator =
        mock_orchestrator(chain_registry().unwrap(), &host, &fetcher).with_base_url(base);

    orchestrator
        .run(RunOptions::new().execute("app/page.js"))
        .await
        .unwrap();

    assert_eq!(host.injected(), vec!["https://cdn.example.test/shims/a.js"]);
    assert_eq!(
        fetcher.requests(),
        vec!["https://cdn.example.test/shims/app/page.js"]
    );
}

#[tokio::test]
async fn test_plan_loads_nothing() {
    let host = chain_host();
    let fetcher = MockFetcher::new().with_script("page.js", "useB()");
    let orchestrator = mock_orchestrator(chain_registry().unwrap(), &host, &fetcher);

    let plan = orchestrator
        .plan(RunOptions::new().execute("page.js"))
        .await
        .unwrap();

    assert_eq!(plan.selected, names(&["B"]));
    assert_eq!(plan.load_order, names(&["A", "B"]));
    assert_eq!(plan.activation_order, names(&["A", "B"]));
    assert_eq!(plan.payloads.len(), 1);
    assert_eq!(plan.payloads[0].bytes, "useB()".len());
    assert!(host.injected().is_empty());
    assert!(host.evaluated().is_empty());
}

#[tokio::test]
async fn test_plan_orders_by_registry() {
    let host = MockHost::new();
    let fetcher = MockFetcher::new().with_script("page.js", "useP()");
    let orchestrator = mock_orchestrator(pair_registry(["Q", "P"], false), &host, &fetcher);

    let plan = orchestrator
        .plan(RunOptions::new().execute("page.js"))
        .await
        .unwrap();

    assert_eq!(plan.selected, names(&["P"]));
    assert_eq!(plan.load_order, names(&["Q", "P"]));
    assert_eq!(plan.activation_order, names(&["Q", "P"]));
}

#[tokio::test]
async fn test_plan_rejects_computed_dependency_on_later_capability() {
    let host = MockHost::new();
    let fetcher = MockFetcher::new().with_script("page.js", "useP()");
    let orchestrator = mock_orchestrator(pair_registry(["P", "Q"], false), &host, &fetcher);

    let err = orchestrator
        .plan(RunOptions::new().execute("page.js"))
        .await
        .unwrap_err();

    assert!(matches!(err, ShimError::RegistryOrder { .. }));
}

#[test]
fn test_fixed_dependency_on_later_capability_rejected() {
    let err = CapabilityRegistry::builder()
        .register(
            CapabilityDescriptor::new("B", "b.js")
                .unwrap()
                .with_dependencies(DependencyRule::fixed(["A"]).unwrap()),
        )
        .unwrap()
        .register(CapabilityDescriptor::new("A", "a.js").unwrap())
        .and_then(shimload_core::RegistryBuilder::build)
        .unwrap_err();
    assert!(matches!(
        err,
        ShimError::RegistryOrder { ref dependent, ref dependency } if dependent == "B" && dependency == "A"
    ));
}
