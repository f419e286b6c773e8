//! Fixture ordering, failure isolation and assertion accounting across
//! whole runs.

use std::sync::{Arc, Mutex};

use classtap_core::{
    ClassDecl, ConfigError, ExitStatus, InvocationState, MethodDescriptor, ProtocolViolation,
    RecordingHarness, RegistrationError, Registry, RunConfig, RunError, Suite, TestContext,
};

type Log = Arc<Mutex<Vec<String>>>;

fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// A body that only records that it ran.
fn logged(
    log: &Log,
    entry: &'static str,
) -> impl Fn(&mut TestContext<'_, '_>) -> Result<(), String> + Send + Sync + 'static {
    let log = Arc::clone(log);
    move |_cx: &mut TestContext<'_, '_>| {
        log.lock().unwrap().push(entry.to_string());
        Ok(())
    }
}

fn build(classes: Vec<(ClassDecl, Vec<MethodDescriptor>)>) -> Suite {
    let mut reg = Registry::new();
    for (decl, methods) in classes {
        reg.add_class(decl, methods).unwrap();
    }
    reg.freeze().unwrap()
}

fn run(suite: &Suite, config: &RunConfig) -> (classtap_core::RunReport, RecordingHarness) {
    let mut harness = RecordingHarness::new();
    let report = suite.run(config, &mut harness).unwrap();
    (report, harness)
}

// ── Fixture ordering ─────────────────────────────────────────────────

#[test]
fn setup_runs_base_first_and_teardown_derived_first() {
    let log = new_log();
    let suite = build(vec![
        (
            ClassDecl::new("Base"),
            vec![
                MethodDescriptor::setup("base_setup", 0, {
                    let log = Arc::clone(&log);
                    move |cx| {
                        log.lock().unwrap().push("base_setup".to_string());
                        cx.fixture_mut().set("value", 1u32);
                        Ok(())
                    }
                }),
                MethodDescriptor::teardown("base_teardown", 0, logged(&log, "base_teardown")),
            ],
        ),
        (
            ClassDecl::new("Derived").extends("Base"),
            vec![
                MethodDescriptor::setup("derived_setup", 1, {
                    let log = Arc::clone(&log);
                    move |cx| {
                        log.lock().unwrap().push("derived_setup".to_string());
                        let seen = *cx.fixture().require::<u32>("value")?;
                        cx.is(seen, 1, "base setup ran first");
                        cx.fixture_mut().set("value", 2u32);
                        Ok(())
                    }
                }),
                MethodDescriptor::teardown(
                    "derived_teardown",
                    0,
                    logged(&log, "derived_teardown"),
                ),
                MethodDescriptor::test("observes", 1, {
                    let log = Arc::clone(&log);
                    move |cx| {
                        log.lock().unwrap().push("observes".to_string());
                        let seen = *cx.fixture().require::<u32>("value")?;
                        cx.is(seen, 2, "derived setup ran last");
                        Ok(())
                    }
                }),
            ],
        ),
    ]);

    let config = RunConfig::default().only_classes(["Derived"]);
    let (report, harness) = run(&suite, &config);

    assert_eq!(
        entries(&log),
        vec![
            "base_setup",
            "derived_setup",
            "observes",
            "derived_teardown",
            "base_teardown"
        ]
    );
    assert_eq!(harness.planned, Some(2));
    assert_eq!(report.exit_status(), ExitStatus::Success);
    // fixture assertions are attributed to the test method they wrap
    assert_eq!(report.results_for("Derived", "observes").count(), 2);
}

#[test]
fn same_class_fixtures_follow_order_keys() {
    let log = new_log();
    let suite = build(vec![(
        ClassDecl::new("Keyed"),
        vec![
            MethodDescriptor::setup("alpha", 0, logged(&log, "alpha")).with_order_key(2i64),
            MethodDescriptor::setup("zeta", 0, logged(&log, "zeta")).with_order_key(1i64),
            MethodDescriptor::setup("named", 0, logged(&log, "named")),
            MethodDescriptor::test("t", 0, logged(&log, "t")),
        ],
    )]);

    run(&suite, &RunConfig::default());
    assert_eq!(entries(&log), vec!["zeta", "alpha", "named", "t"]);
}

#[test]
fn every_invocation_gets_a_fresh_fixture() {
    let suite = build(vec![(
        ClassDecl::new("Fresh"),
        vec![
            MethodDescriptor::test("first", 1, |cx| {
                let clean = cx.fixture().is_empty();
                cx.fixture_mut().set("dirty", true);
                cx.ok(clean, "nothing left over");
                Ok(())
            }),
            MethodDescriptor::test("second", 1, |cx| {
                let clean = !cx.fixture().contains("dirty");
                cx.ok(clean, "nothing left over");
                Ok(())
            }),
        ],
    )]);

    let (report, _) = run(&suite, &RunConfig::default());
    assert!(report.exit_status().is_success());
}

// ── Overrides ────────────────────────────────────────────────────────

#[test]
fn overridden_test_runs_once_per_class() {
    let log = new_log();
    let suite = build(vec![
        (
            ClassDecl::new("Base"),
            vec![MethodDescriptor::test("shared", 0, logged(&log, "Base::shared"))],
        ),
        (
            ClassDecl::new("Derived").extends("Base"),
            vec![MethodDescriptor::test("shared", 0, logged(&log, "Derived::shared"))],
        ),
    ]);

    let (report, _) = run(&suite, &RunConfig::default().only_classes(["Derived"]));
    assert_eq!(entries(&log), vec!["Derived::shared"]);
    assert_eq!(report.invocations.len(), 1);

    let log_all = new_log();
    let suite = build(vec![
        (
            ClassDecl::new("Base"),
            vec![MethodDescriptor::test("shared", 0, logged(&log_all, "Base::shared"))],
        ),
        (
            ClassDecl::new("Derived").extends("Base"),
            vec![MethodDescriptor::test("shared", 0, logged(&log_all, "Derived::shared"))],
        ),
    ]);
    run(&suite, &RunConfig::default());
    assert_eq!(entries(&log_all), vec!["Base::shared", "Derived::shared"]);
}

// ── Failure isolation ────────────────────────────────────────────────

#[test]
fn failing_and_panicking_bodies_do_not_stop_the_run() {
    let suite = build(vec![
        (
            ClassDecl::new("Fragile"),
            vec![
                MethodDescriptor::test("a_dies", 2, |cx| {
                    cx.ok(true, "got this far");
                    Err("lost the connection".to_string())
                }),
                MethodDescriptor::test("b_panics", 1, |_cx| panic!("index out of range")),
                MethodDescriptor::test("c_fine", 1, |cx| {
                    cx.ok(true, "still running");
                    Ok(())
                }),
            ],
        ),
        (
            ClassDecl::new("Sturdy"),
            vec![MethodDescriptor::test("t", 1, |cx| {
                cx.ok(true, "later class runs");
                Ok(())
            })],
        ),
    ]);

    let (report, harness) = run(&suite, &RunConfig::default());

    assert_eq!(harness.sequences(), vec![1, 2, 3, 4, 5]);
    let died: Vec<_> = harness.matching("died").collect();
    assert_eq!(died.len(), 2);
    assert_eq!(died[0].description, "Fragile->a_dies died");
    assert_eq!(died[0].diagnostic.as_deref(), Some("lost the connection"));
    assert_eq!(
        died[1].diagnostic.as_deref(),
        Some("panicked: index out of range")
    );
    // a body that died is not also charged with an under-count
    assert_eq!(harness.matching("fewer").count(), 0);

    assert_eq!(report.results_for("Fragile", "c_fine").count(), 1);
    assert_eq!(report.results_for("Sturdy", "t").count(), 1);
    assert_eq!(report.invocation("Fragile", "a_dies").unwrap().failed, 1);
    assert_eq!(
        report.invocation("Fragile", "b_panics").unwrap().state,
        InvocationState::Done
    );
    assert_eq!(report.exit_status().code(), 2);
}

#[test]
fn failed_setup_skips_the_body_but_runs_teardown() {
    let log = new_log();
    let suite = build(vec![(
        ClassDecl::new("BrokenSetup"),
        vec![
            MethodDescriptor::setup("prepare", 0, |_cx| Err("no database".to_string())),
            MethodDescriptor::teardown("cleanup", 0, logged(&log, "cleanup")),
            MethodDescriptor::test("t1", 1, logged(&log, "t1")),
            MethodDescriptor::test("t2", 1, logged(&log, "t2")),
        ],
    )]);

    let (report, harness) = run(&suite, &RunConfig::default());

    assert_eq!(entries(&log), vec!["cleanup", "cleanup"]);
    assert_eq!(harness.records.len(), 2);
    assert_eq!(
        harness.records[0].description,
        "BrokenSetup->t1 not run: setup prepare failed"
    );
    assert_eq!(harness.records[0].diagnostic.as_deref(), Some("no database"));
    for method in ["t1", "t2"] {
        assert_eq!(
            report.invocation("BrokenSetup", method).unwrap().state,
            InvocationState::AbortedByFixtureFailure
        );
    }
}

#[test]
fn failed_teardown_is_reported_and_the_run_continues() {
    let suite = build(vec![
        (
            ClassDecl::new("BrokenTeardown"),
            vec![
                MethodDescriptor::teardown("cleanup", 0, |_cx| Err("disk full".to_string())),
                MethodDescriptor::test("t", 1, |cx| {
                    cx.ok(true, "body passed");
                    Ok(())
                }),
            ],
        ),
        (
            ClassDecl::new("Healthy"),
            vec![MethodDescriptor::test("t", 1, |cx| {
                cx.ok(true, "unaffected");
                Ok(())
            })],
        ),
    ]);

    let (report, harness) = run(&suite, &RunConfig::default());

    let descriptions: Vec<&str> = harness
        .records
        .iter()
        .map(|r| r.description.as_str())
        .collect();
    assert_eq!(
        descriptions,
        vec![
            "body passed",
            "BrokenTeardown->t: teardown cleanup failed",
            "unaffected"
        ]
    );
    assert_eq!(
        report.invocation("BrokenTeardown", "t").unwrap().state,
        InvocationState::AbortedByFixtureFailure
    );
    assert_eq!(
        report.invocation("Healthy", "t").unwrap().state,
        InvocationState::Done
    );
}

#[test]
fn teardown_failure_does_not_stop_later_teardowns() {
    let log = new_log();
    let suite = build(vec![
        (
            ClassDecl::new("Base"),
            vec![MethodDescriptor::teardown("base_close", 0, logged(&log, "base_close"))],
        ),
        (
            ClassDecl::new("Derived").extends("Base"),
            vec![
                MethodDescriptor::teardown("a_close", 0, |_cx| Err("socket reset".to_string())),
                MethodDescriptor::teardown("b_release", 0, logged(&log, "b_release")),
                MethodDescriptor::test("t", 0, logged(&log, "t")),
            ],
        ),
    ]);

    let (report, harness) = run(&suite, &RunConfig::default().only_classes(["Derived"]));

    assert_eq!(entries(&log), vec!["t", "b_release", "base_close"]);
    assert_eq!(harness.records.len(), 1);
    assert_eq!(
        harness.records[0].description,
        "Derived->t: teardown a_close failed"
    );
    assert_eq!(
        report.invocation("Derived", "t").unwrap().state,
        InvocationState::AbortedByFixtureFailure
    );
}

#[test]
fn teardowns_observe_state_left_by_more_derived_teardowns() {
    let suite = build(vec![
        (
            ClassDecl::new("Base"),
            vec![
                MethodDescriptor::setup("base_setup", 0, |cx| {
                    cx.fixture_mut().set("value", 1u32);
                    Ok(())
                }),
                MethodDescriptor::teardown("base_teardown", 1, |cx| {
                    let seen = *cx.fixture().require::<u32>("value")?;
                    cx.is(seen, 3, "derived teardown ran first");
                    Ok(())
                }),
            ],
        ),
        (
            ClassDecl::new("Derived").extends("Base"),
            vec![
                MethodDescriptor::setup("derived_setup", 1, |cx| {
                    let seen = *cx.fixture().require::<u32>("value")?;
                    cx.is(seen, 1, "base setup ran first");
                    cx.fixture_mut().set("value", 2u32);
                    Ok(())
                }),
                MethodDescriptor::teardown("derived_teardown", 1, |cx| {
                    let seen = *cx.fixture().require::<u32>("value")?;
                    cx.is(seen, 2, "test left the derived value");
                    cx.fixture_mut().set("value", 3u32);
                    Ok(())
                }),
                MethodDescriptor::test("observes", 1, |cx| {
                    let seen = *cx.fixture().require::<u32>("value")?;
                    cx.is(seen, 2, "derived setup ran last");
                    Ok(())
                }),
            ],
        ),
    ]);

    let (report, harness) = run(&suite, &RunConfig::default().only_classes(["Derived"]));

    let descriptions: Vec<&str> = harness
        .records
        .iter()
        .map(|r| r.description.as_str())
        .collect();
    assert_eq!(
        descriptions,
        vec![
            "base setup ran first",
            "derived setup ran last",
            "test left the derived value",
            "derived teardown ran first",
        ]
    );
    assert_eq!(harness.planned, Some(4));
    assert_eq!(report.exit_status(), ExitStatus::Success);
}

#[test]
fn panicking_setup_skips_the_body_but_runs_teardown() {
    let log = new_log();
    let suite = build(vec![(
        ClassDecl::new("PanickySetup"),
        vec![
            MethodDescriptor::setup("prepare", 0, |_cx| panic!("pool exhausted")),
            MethodDescriptor::teardown("cleanup", 0, logged(&log, "cleanup")),
            MethodDescriptor::test("t", 1, logged(&log, "t")),
        ],
    )]);

    let (report, harness) = run(&suite, &RunConfig::default());

    assert_eq!(entries(&log), vec!["cleanup"]);
    assert_eq!(harness.records.len(), 1);
    assert_eq!(
        harness.records[0].description,
        "PanickySetup->t not run: setup prepare failed"
    );
    assert_eq!(
        harness.records[0].diagnostic.as_deref(),
        Some("panicked: pool exhausted")
    );
    assert_eq!(
        report.invocation("PanickySetup", "t").unwrap().state,
        InvocationState::AbortedByFixtureFailure
    );
}

// ── Class-level fixtures ─────────────────────────────────────────────

#[test]
fn class_fixture_is_shared_by_every_invocation() {
    let log = new_log();
    let suite = build(vec![(
        ClassDecl::new("WithServer"),
        vec![
            MethodDescriptor::setup_for_class("start_server", 0, |cx| {
                cx.fixture_mut().set("addr", "127.0.0.1:8080".to_string());
                Ok(())
            }),
            MethodDescriptor::teardown_for_class("stop_server", 1, |cx| {
                let still_there = cx.fixture().contains("addr");
                cx.ok(still_there, "server address survives the class");
                Ok(())
            }),
            MethodDescriptor::setup("connect", 0, logged(&log, "connect")),
            MethodDescriptor::test("first", 1, |cx| {
                let addr = cx
                    .class_fixture()
                    .and_then(|f| f.get::<String>("addr"))
                    .cloned();
                cx.is(addr.as_deref(), Some("127.0.0.1:8080"), "sees the server");
                Ok(())
            }),
            MethodDescriptor::test("second", 1, |cx| {
                let shared = cx.class_fixture().is_some_and(|f| f.contains("addr"));
                cx.ok(shared, "still sees the server");
                Ok(())
            }),
        ],
    )]);

    let (report, harness) = run(&suite, &RunConfig::default());

    assert_eq!(harness.planned, Some(3));
    assert_eq!(entries(&log), vec!["connect", "connect"]);
    assert_eq!(report.exit_status(), ExitStatus::Success);
    assert_eq!(
        report.results_for("WithServer", "stop_server").count(),
        1
    );
}

#[test]
fn failed_class_setup_leaves_tests_pending() {
    let log = new_log();
    let suite = build(vec![(
        ClassDecl::new("NeedsServer"),
        vec![
            MethodDescriptor::setup_for_class("start_server", 0, |_cx| {
                Err("port in use".to_string())
            }),
            MethodDescriptor::teardown_for_class("stop_server", 0, logged(&log, "stop_server")),
            MethodDescriptor::test("t1", 1, logged(&log, "t1")),
            MethodDescriptor::test("t2", 1, logged(&log, "t2")),
        ],
    )]);

    let (report, harness) = run(&suite, &RunConfig::default());

    assert_eq!(entries(&log), vec!["stop_server"]);
    assert_eq!(harness.records.len(), 1);
    assert_eq!(
        harness.records[0].description,
        "NeedsServer->start_server failed, no test methods run"
    );
    for method in ["t1", "t2"] {
        let inv = report.invocation("NeedsServer", method).unwrap();
        assert_eq!(inv.state, InvocationState::Pending);
        assert_eq!(inv.assertions, 0);
    }
    match report.exit_status() {
        ExitStatus::Failure { planned, ran, .. } => {
            assert_eq!(planned, Some(2));
            assert_eq!(ran, 1);
        }
        ExitStatus::Success => panic!("class setup failure must fail the run"),
    }
}

// ── Assertion accounting ─────────────────────────────────────────────

#[test]
fn upfront_plan_matches_assertions_run() {
    let suite = build(vec![
        (
            ClassDecl::new("One"),
            vec![
                MethodDescriptor::setup("s", 1, |cx| {
                    cx.ok(true, "setup check");
                    Ok(())
                }),
                MethodDescriptor::test("a", 2, |cx| {
                    cx.ok(true, "a1");
                    cx.ok(true, "a2");
                    Ok(())
                }),
                MethodDescriptor::test("b", 1, |cx| {
                    cx.ok(true, "b1");
                    Ok(())
                }),
            ],
        ),
        (
            ClassDecl::new("Two").extends("One"),
            vec![MethodDescriptor::test("c", 3, |cx| {
                for i in 0..3 {
                    cx.ok(true, format!("c{}", i));
                }
                Ok(())
            })],
        ),
    ]);

    let (report, harness) = run(&suite, &RunConfig::default());

    // One: (1+2) + (1+1) = 5; Two: 5 inherited + (1+3) = 9
    assert_eq!(harness.planned, Some(14));
    assert_eq!(harness.records.len(), 14);
    assert_eq!(harness.sequences(), (1..=14).collect::<Vec<_>>());
    assert!(report.exit_status().is_success());
}

#[test]
fn overrun_is_flagged_when_it_happens() {
    let suite = build(vec![(
        ClassDecl::new("Over"),
        vec![MethodDescriptor::test("greedy", 2, |cx| {
            cx.ok(true, "one");
            cx.ok(true, "two");
            cx.ok(true, "three");
            Ok(())
        })],
    )]);

    let (report, harness) = run(&suite, &RunConfig::default());

    assert_eq!(harness.planned, Some(2));
    assert_eq!(harness.records.len(), 4);
    assert!(harness.records[2].passed);
    assert!(!harness.records[3].passed);
    assert_eq!(
        harness.records[3].description,
        "Over->greedy emitted more assertions than declared"
    );
    assert_eq!(report.exit_status().code(), 1);
}

#[test]
fn under_count_is_flagged_once_the_method_returns() {
    let suite = build(vec![(
        ClassDecl::new("Under"),
        vec![MethodDescriptor::test("stingy", 3, |cx| {
            cx.ok(true, "only one");
            Ok(())
        })],
    )]);

    let (_, harness) = run(&suite, &RunConfig::default());

    assert_eq!(harness.records.len(), 2);
    assert_eq!(
        harness.records[1].description,
        "Under->stingy emitted fewer assertions than declared"
    );
    assert_eq!(
        harness.records[1].diagnostic.as_deref(),
        Some("expected 3 assertion(s), 1 completed")
    );
}

#[test]
fn indeterminate_run_ends_with_a_summary() {
    let suite = build(vec![(
        ClassDecl::new("Open"),
        vec![
            MethodDescriptor::test("counted", 1, |cx| {
                cx.ok(true, "fixed");
                Ok(())
            }),
            MethodDescriptor::test("whatever", 0, |cx| {
                cx.ok(true, "x");
                cx.ok(true, "y");
                Ok(())
            })
            .indeterminate(),
        ],
    )]);

    let (report, harness) = run(&suite, &RunConfig::default());

    assert_eq!(harness.planned, None);
    assert_eq!(harness.summarized, Some(3));
    assert_eq!(report.exit_status(), ExitStatus::Success);
}

#[test]
fn skip_rest_fills_the_declared_count() {
    let suite = build(vec![(
        ClassDecl::new("Network"),
        vec![MethodDescriptor::test("fetch", 3, |cx| {
            cx.ok(true, "resolver configured");
            cx.skip_rest("no network");
            Ok(())
        })],
    )]);

    let (report, harness) = run(&suite, &RunConfig::default());

    assert_eq!(harness.records.len(), 3);
    assert_eq!(harness.records[1].skip.as_deref(), Some("no network"));
    assert_eq!(harness.records[2].skip.as_deref(), Some("no network"));
    assert!(report.exit_status().is_success());
}

// ── Selection and skipping ───────────────────────────────────────────

#[test]
fn skipped_class_is_announced_not_run() {
    let log = new_log();
    let suite = build(vec![
        (
            ClassDecl::new("Later").skip("needs a database"),
            vec![MethodDescriptor::test("t", 1, logged(&log, "Later::t"))],
        ),
        (
            ClassDecl::new("Now"),
            vec![MethodDescriptor::test("t", 0, logged(&log, "Now::t"))],
        ),
    ]);

    let (_, harness) = run(&suite, &RunConfig::default());

    assert_eq!(entries(&log), vec!["Now::t"]);
    assert_eq!(harness.diagnostics, vec!["skipping Later: needs a database"]);
}

// ── Fatal conditions ─────────────────────────────────────────────────

#[test]
fn assertion_in_no_test_method_stops_the_body_and_the_run() {
    let log = new_log();
    let suite = build(vec![
        (
            ClassDecl::new("Open"),
            vec![MethodDescriptor::test("first", 0, logged(&log, "Open::first")).indeterminate()],
        ),
        (
            ClassDecl::new("Quiet"),
            vec![MethodDescriptor::test("silent", 0, {
                let log = Arc::clone(&log);
                move |cx| {
                    cx.ok(true, "should not be here");
                    log.lock().unwrap().push("Quiet::after_violation".to_string());
                    Ok(())
                }
            })
            .no_test()],
        ),
        (
            ClassDecl::new("Zed"),
            vec![MethodDescriptor::test("t", 0, logged(&log, "Zed::t"))],
        ),
    ]);

    let mut harness = RecordingHarness::new();
    let err = suite.run(&RunConfig::default(), &mut harness).unwrap_err();
    assert!(matches!(
        err,
        RunError::Protocol(ProtocolViolation::AssertionInNoTestMethod { .. })
    ));
    assert_eq!(entries(&log), vec!["Open::first"]);
    assert!(harness.records.is_empty());
    // an aborted run never closes the stream with a summary
    assert_eq!(harness.planned, None);
    assert_eq!(harness.summarized, None);
}

#[test]
fn unknown_class_and_bad_filter_are_fatal() {
    let suite = build(vec![(
        ClassDecl::new("Only"),
        vec![MethodDescriptor::test("t", 0, |_cx| Ok(()))],
    )]);
    let mut harness = RecordingHarness::new();

    let err = suite
        .run(&RunConfig::default().only_classes(["Missing"]), &mut harness)
        .unwrap_err();
    assert!(matches!(
        err,
        RunError::Registration(RegistrationError::UnknownClass { .. })
    ));

    let err = suite
        .run(&RunConfig::default().filter_methods("("), &mut harness)
        .unwrap_err();
    assert!(matches!(
        err,
        RunError::Config(ConfigError::InvalidFilter { .. })
    ));
}

#[test]
fn conflicting_registration_is_rejected() {
    let mut reg = Registry::new();
    reg.declare(ClassDecl::new("Dup")).unwrap();
    reg.register("Dup", MethodDescriptor::test("check", 1, |_cx| Ok(())))
        .unwrap();
    let err = reg
        .register("Dup", MethodDescriptor::setup("check", 0, |_cx| Ok(())))
        .unwrap_err();
    assert!(matches!(
        err,
        RegistrationError::DuplicateRegistration { .. }
    ));
}
