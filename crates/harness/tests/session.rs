//! Whole test sessions: fixture, hook and reporting together

mod common;

use serial_test::serial;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use common::{fake_project, free_port, server_config, Reply, ScriptedSink};
use storefront_harness::runner::Verdict;
use storefront_harness::{ExecutionStatus, HarnessConfig, TestCase, TestSession};

fn session_config(project: &std::path::Path, port: u16, output: &std::path::Path) -> HarnessConfig {
    let mut config = HarnessConfig {
        server: server_config(project, port),
        output_dir: output.to_path_buf(),
        ..Default::default()
    };
    config.reporting.timeout_ms = 500;
    config
}

#[test]
#[serial]
fn reports_once_per_tracked_test() {
    let project = fake_project(common::CRASHING_SERVER);
    let output = tempfile::tempdir().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let sink = Arc::new(ScriptedSink::new(Reply::Ack));
    let mut session =
        TestSession::with_sink(session_config(project.path(), port, output.path()), sink.clone())
            .unwrap();

    let expected_url = format!("http://127.0.0.1:{}", port);
    let summary = session.run(vec![
        TestCase::new("test_product_edit::test_edit_title", move |ctx| {
            assert_eq!(ctx.server_url()?, expected_url);
            Ok(())
        })
        .tracked("TC-101"),
        TestCase::new("test_product_edit::test_missing_button", |_| {
            anyhow::bail!("Locator '#save' not found")
        })
        .tracked("TC-102"),
        TestCase::new("test_product_edit::test_untracked", |_| Ok(())),
        TestCase::new("test_product_edit::test_panics", |_| panic!("unexpected dialog"))
            .tracked("TC-103"),
    ]);

    assert_eq!(summary.total, 4);
    assert_eq!(summary.passed, 2);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.skipped, 0);

    let reports = sink.reports();
    assert_eq!(reports.len(), 3);
    assert_eq!(reports[0].issue_key, "TC-101");
    assert_eq!(reports[0].status, ExecutionStatus::Passed);
    assert_eq!(
        reports[0].evidence,
        "Automated Playwright test: test_product_edit::test_edit_title"
    );
    assert_eq!(reports[1].status, ExecutionStatus::Failed);
    assert!(reports[1].evidence.ends_with(" | Error: Locator '#save' not found"));
    assert_eq!(reports[2].issue_key, "TC-103");
    assert!(reports[2].evidence.contains("unexpected dialog"));

    let untracked = &summary.results[2];
    assert_eq!(untracked.verdict, Verdict::Passed);
    assert_eq!(untracked.report, None);

    let path = session.write_results(&summary).unwrap();
    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(written["failed"], 2);
    assert_eq!(written["results"][1]["verdict"], "failed");
}

#[test]
#[serial]
fn broken_fixture_skips_dependent_tests_without_reporting() {
    let project = fake_project(common::CRASHING_SERVER);
    let output = tempfile::tempdir().unwrap();
    let before = std::env::current_dir().unwrap();

    let sink = Arc::new(ScriptedSink::new(Reply::Ack));
    let mut session = TestSession::with_sink(
        session_config(project.path(), free_port(), output.path()),
        sink.clone(),
    )
    .unwrap();

    let summary = session.run(vec![
        TestCase::new("test_category::test_list", |_| Ok(())).tracked("TC-201"),
        TestCase::new("test_category::test_pagination", |_| Ok(())).tracked("TC-202"),
        TestCase::new("test_settings::test_offline", |ctx| {
            assert!(ctx.base_url.is_none());
            Ok(())
        })
        .without_server()
        .tracked("TC-203"),
    ]);

    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.passed, 1);
    let skipped = summary.results[0].message.as_deref().unwrap();
    assert!(skipped.contains("That port is already in use"), "message: {}", skipped);
    assert_eq!(summary.results[1].message, summary.results[0].message);

    let reports = sink.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].issue_key, "TC-203");
    assert_eq!(std::env::current_dir().unwrap(), before);
}

#[test]
#[serial]
fn slow_reporting_does_not_change_verdicts() {
    let project = fake_project(common::CRASHING_SERVER);
    let output = tempfile::tempdir().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let sink = Arc::new(ScriptedSink::new(Reply::Delay(Duration::from_secs(10))));
    let mut session =
        TestSession::with_sink(session_config(project.path(), port, output.path()), sink).unwrap();

    let summary = session.run(vec![
        TestCase::new("test_product_edit::test_slow_report", |_| Ok(())).tracked("TC-301"),
    ]);

    assert_eq!(summary.passed, 1);
    assert_eq!(summary.results[0].report.as_deref(), Some("timed out"));
}

#[test]
#[serial]
fn reporting_disabled_never_calls_out() {
    let project = fake_project(common::CRASHING_SERVER);
    let output = tempfile::tempdir().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut config = session_config(project.path(), port, output.path());
    config.reporting.enabled = false;
    let mut session = TestSession::new(config).unwrap();

    let summary = session.run(vec![TestCase::new("t::a", |_| Ok(())).tracked("TC-1")]);

    assert_eq!(summary.passed, 1);
    assert_eq!(summary.results[0].report, None);
}

#[test]
#[serial]
fn session_owned_server_is_stopped_after_run() {
    let project = fake_project(common::IDLE_SERVER);
    let output = tempfile::tempdir().unwrap();
    let port = free_port();
    let before = std::env::current_dir().unwrap();

    let listener = common::listen_after(port, Duration::from_millis(300));
    let sink = Arc::new(ScriptedSink::new(Reply::Ack));
    let mut session =
        TestSession::with_sink(session_config(project.path(), port, output.path()), sink).unwrap();

    let summary = session.run(vec![TestCase::new("t::a", |_| Ok(()))]);
    let _listener = listener.join().unwrap();

    assert_eq!(summary.passed, 1);
    assert!(session.server().is_none());
    assert_eq!(std::env::current_dir().unwrap(), before);
}
