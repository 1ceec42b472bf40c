//! Indirect delivery, attach mode, positional invocation, and completion
//! callbacks.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use shimload_core::{
    CompletionCallback, Invocation, PayloadSpec, PositionalArg, RunOptions, ShimError,
};
use shimload_test::{
    CALLBACK_PREFIX, HostEvent, MockFetcher, chain_host, chain_registry, mock_orchestrator,
};

#[tokio::test]
async fn test_indirect_payload_delivered_through_callback() {
    let host = chain_host().with_indirect("feed.js?cb={callback}", "useA()");
    let fetcher = MockFetcher::new();
    let orchestrator = mock_orchestrator(chain_registry().unwrap(), &host, &fetcher);

    let report = orchestrator
        .run(RunOptions::new().execute(PayloadSpec::indirect("feed.js?cb=CALLBACK", "CALLBACK")))
        .await
        .unwrap();

    assert!(fetcher.requests().is_empty());
    assert_eq!(host.injected(), vec!["feed.js?cb={callback}", "a.js"]);
    assert_eq!(host.activated(), vec!["A"]);
    assert_eq!(host.evaluated(), vec!["useA()"]);
    assert_eq!(report.executed, 1);
}

#[tokio::test]
async fn test_indirect_payload_by_pattern() {
    // The whole match is replaced, parameter name included.
    let host = chain_host().with_indirect("data.js?{callback}&v=2", "useB()");
    let fetcher = MockFetcher::new();
    let orchestrator = mock_orchestrator(chain_registry().unwrap(), &host, &fetcher);

    let report = orchestrator
        .run(RunOptions::new().analyze_only(PayloadSpec::indirect_pattern(
            "data.js?callback=fn&v=2",
            r"callback=\w+",
        )))
        .await
        .unwrap();

    assert_eq!(report.activated.len(), 2);
    assert_eq!(report.executed, 0);
    assert!(host.evaluated().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_mixed_payloads_keep_slot_order() {
    let host = chain_host().with_delayed_indirect(
        "slow.js?cb={callback}",
        "second()",
        Duration::from_millis(500),
    );
    let fetcher = MockFetcher::new()
        .with_delayed_script("first.js", "first()", Duration::from_millis(50))
        .with_script("third.js", "third()");
    let orchestrator = mock_orchestrator(chain_registry().unwrap(), &host, &fetcher);

    orchestrator
        .run(
            RunOptions::new()
                .execute("first.js")
                .execute(PayloadSpec::indirect("slow.js?cb=CB", "CB"))
                .execute("third.js"),
        )
        .await
        .unwrap();

    assert_eq!(host.evaluated(), vec!["first()", "second()", "third()"]);
}

#[tokio::test]
async fn test_each_indirect_payload_gets_its_own_callback() {
    let host = chain_host()
        .with_indirect("one.js?cb={callback}", "one()")
        .with_indirect("two.js?cb={callback}", "two()");
    let fetcher = MockFetcher::new();
    let orchestrator = mock_orchestrator(chain_registry().unwrap(), &host, &fetcher);

    orchestrator
        .run(
            RunOptions::new()
                .execute(PayloadSpec::indirect("one.js?cb=X", "X"))
                .execute(PayloadSpec::indirect("two.js?cb=X", "X")),
        )
        .await
        .unwrap();

    assert_eq!(host.evaluated(), vec!["one()", "two()"]);
}

#[test]
fn test_callback_ids_are_unique() {
    let first = shimload_core::mint_callback_id();
    let second = shimload_core::mint_callback_id();
    assert!(first.starts_with(CALLBACK_PREFIX));
    assert_ne!(first, second);
}

#[tokio::test]
async fn test_placeholder_must_occur_in_url() {
    let host = chain_host();
    let fetcher = MockFetcher::new();
    let orchestrator = mock_orchestrator(chain_registry().unwrap(), &host, &fetcher);

    let err = orchestrator
        .run(RunOptions::new().execute(PayloadSpec::indirect("feed.js", "CALLBACK")))
        .await
        .unwrap_err();

    assert!(err.is_configuration());
    assert!(host.injected().is_empty());
}

#[tokio::test]
async fn test_direct_payload_with_placeholder_is_configuration_error() {
    let options: RunOptions = serde_json::from_str(
        r#"{"execute_payloads": {"url": "feed.js?cb=CB", "callback": "CB"}}"#,
    )
    .unwrap();
    let host = chain_host();
    let fetcher = MockFetcher::new();
    let orchestrator = mock_orchestrator(chain_registry().unwrap(), &host, &fetcher);

    let err = orchestrator.run(options).await.unwrap_err();
    assert!(err.is_configuration());
}

#[tokio::test]
async fn test_attach_mode_injects_direct_payloads() {
    let host = chain_host().with_indirect("feed.js?cb={callback}", "fromFeed()");
    let fetcher = MockFetcher::new().with_script("page.js", "useA()");
    let orchestrator = mock_orchestrator(chain_registry().unwrap(), &host, &fetcher);

    let report = orchestrator
        .run(
            RunOptions::new()
                .execute("page.js")
                .execute(PayloadSpec::indirect("feed.js?cb=CB", "CB"))
                .attach_as_resource(true),
        )
        .await
        .unwrap();

    assert_eq!(
        host.injected(),
        vec!["feed.js?cb={callback}", "a.js", "page.js"]
    );
    assert_eq!(host.evaluated(), vec!["fromFeed()"]);
    assert_eq!(report.executed, 2);
    assert_eq!(fetcher.fetch_count("page.js"), 1);
}

#[tokio::test]
async fn test_positional_invocation() {
    let host = chain_host().with_procedure("done");
    let fetcher = MockFetcher::new()
        .with_script("one.js", "useA()")
        .with_script("two.js", "two()");
    let orchestrator = mock_orchestrator(chain_registry().unwrap(), &host, &fetcher);

    let report = orchestrator
        .run(Invocation::Positional(vec![
            CompletionCallback::named("done").into(),
            "one.js".into(),
            "two.js".into(),
        ]))
        .await
        .unwrap();

    assert_eq!(report.activated.len(), 1);
    assert_eq!(host.evaluated(), vec!["useA()", "two()"]);
    assert_eq!(host.invoked(), vec!["done"]);
    let last_eval = host.position(&HostEvent::Evaluate("two()".into())).unwrap();
    let invoke = host.position(&HostEvent::Invoke("done".into())).unwrap();
    assert!(last_eval < invoke);
}

#[tokio::test]
async fn test_positional_callback_alone_runs_without_payloads() {
    let host = chain_host().with_procedure("done");
    let fetcher = MockFetcher::new();
    let orchestrator = mock_orchestrator(chain_registry().unwrap(), &host, &fetcher);

    let report = orchestrator
        .run(Invocation::Positional(vec![CompletionCallback::named("done").into()]))
        .await
        .unwrap();

    assert_eq!(report.executed, 0);
    assert!(report.activated.is_empty());
    assert_eq!(report.callbacks_invoked, 1);
    assert_eq!(host.invoked(), vec!["done"]);
    assert!(host.injected().is_empty());
    assert!(fetcher.requests().is_empty());
}

#[tokio::test]
async fn test_positional_misuse_rejected() {
    let host = chain_host();
    let fetcher = MockFetcher::new().with_script("one.js", "one()");
    let orchestrator = mock_orchestrator(chain_registry().unwrap(), &host, &fetcher);

    let cases: Vec<Vec<PositionalArg>> = vec![
        Vec::new(),
        vec![
            "one.js".into(),
            CompletionCallback::named("done").into(),
        ],
    ];
    for args in cases {
        let err = orchestrator
            .run(Invocation::Positional(args))
            .await
            .unwrap_err();
        assert!(matches!(err, ShimError::Configuration { ref field, .. } if field == "arguments"));
    }
    assert!(fetcher.requests().is_empty());
}

#[tokio::test]
async fn test_callbacks_run_in_order_after_payloads() {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    let host = chain_host().with_procedure("after");
    let fetcher = MockFetcher::new().with_script("page.js", "page()");
    let orchestrator = mock_orchestrator(chain_registry().unwrap(), &host, &fetcher);
    let observed = host.clone();

    let report = orchestrator
        .run(
            RunOptions::new()
                .execute("page.js")
                .on_complete(CompletionCallback::procedure(move || {
                    assert_eq!(observed.evaluated(), vec!["page()"]);
                    assert!(observed.invoked().is_empty());
                    counter.fetch_add(1, Ordering::SeqCst);
                }))
                .on_complete(CompletionCallback::named("after")),
        )
        .await
        .unwrap();

    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(host.invoked(), vec!["after"]);
    assert_eq!(report.callbacks_invoked, 2);
}

#[tokio::test]
async fn test_unresolved_named_callback_fails_run() {
    let host = chain_host();
    let fetcher = MockFetcher::new().with_script("page.js", "page()");
    let orchestrator = mock_orchestrator(chain_registry().unwrap(), &host, &fetcher);

    let err = orchestrator
        .run(
            RunOptions::new()
                .execute("page.js")
                .on_complete(CompletionCallback::named("missing")),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ShimError::UnresolvedCallback(ref name) if name == "missing"));
    assert_eq!(host.evaluated(), vec!["page()"]);
}
