//! Test session runner: one supervised server per session, sequential test
//! bodies, one report per tracked test

use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::bridge::{ReportState, ReportingBridge};
use crate::config::HarnessConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::hook::{normalize_case_id, LifecycleHook, TestOutcome};
use crate::report::{ExecutionStatus, KualiteeClient, ReportSink};
use crate::server::ServerHandle;

/// What a test body gets to see
#[derive(Debug, Clone)]
pub struct TestContext {
    /// Server URL, when the test depends on the server
    pub base_url: Option<String>,
}

impl TestContext {
    /// Server URL, or an error for tests that asked to run without one
    pub fn server_url(&self) -> anyhow::Result<&str> {
        self.base_url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("test was registered without a server"))
    }
}

type TestBody = Box<dyn FnOnce(&TestContext) -> anyhow::Result<()> + Send>;

/// A registered test
pub struct TestCase {
    node_id: String,
    case_id: Option<String>,
    requires_server: bool,
    body: TestBody,
}

impl TestCase {
    pub fn new<F>(node_id: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(&TestContext) -> anyhow::Result<()> + Send + 'static,
    {
        Self {
            node_id: node_id.into(),
            case_id: None,
            requires_server: true,
            body: Box::new(body),
        }
    }

    /// Attach the external test case identifier
    pub fn tracked(mut self, case_id: impl AsRef<str>) -> Self {
        self.case_id = normalize_case_id(Some(case_id.as_ref()));
        self
    }

    pub fn without_server(mut self) -> Self {
        self.requires_server = false;
        self
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn case_id(&self) -> Option<&str> {
        self.case_id.as_deref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Passed,
    Failed,
    Skipped,
}

/// Result of running a single test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseResult {
    pub node_id: String,
    pub case_id: Option<String>,
    pub verdict: Verdict,
    pub duration_ms: u64,
    pub message: Option<String>,
    /// Terminal state of the Kualitee report, if one was attempted
    pub report: Option<String>,
}

/// Result of running all tests
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub results: Vec<CaseResult>,
}

impl SessionSummary {
    pub fn success(&self) -> bool {
        self.failed == 0
    }

    fn record(&mut self, result: CaseResult) {
        self.total += 1;
        match result.verdict {
            Verdict::Passed => self.passed += 1,
            Verdict::Failed => self.failed += 1,
            Verdict::Skipped => self.skipped += 1,
        }
        self.results.push(result);
    }
}

enum Fixture {
    Pending,
    Ready(ServerHandle),
    Failed(String),
}

/// Runs tests against a supervised storefront server
pub struct TestSession {
    config: HarnessConfig,
    runtime: tokio::runtime::Runtime,
    hook: LifecycleHook,
    fixture: Fixture,
}

impl TestSession {
    /// Session reporting to Kualitee per `config.reporting`
    pub fn new(config: HarnessConfig) -> HarnessResult<Self> {
        let hook = if config.reporting.enabled {
            let client = KualiteeClient::new(&config.reporting)
                .map_err(|e| HarnessError::Config(format!("Kualitee client: {}", e)))?;
            LifecycleHook::new(bridge_for(&config, Arc::new(client)))
        } else {
            LifecycleHook::disabled()
        };
        Self::with_hook(config, hook)
    }

    /// Session reporting to a custom sink
    pub fn with_sink(config: HarnessConfig, sink: Arc<dyn ReportSink>) -> HarnessResult<Self> {
        let hook = LifecycleHook::new(bridge_for(&config, sink));
        Self::with_hook(config, hook)
    }

    pub fn with_hook(config: HarnessConfig, hook: LifecycleHook) -> HarnessResult<Self> {
        config.validate()?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()?;

        Ok(Self {
            config,
            runtime,
            hook,
            fixture: Fixture::Pending,
        })
    }

    /// The supervised server, once acquired
    pub fn server(&self) -> Option<&ServerHandle> {
        match &self.fixture {
            Fixture::Ready(server) => Some(server),
            _ => None,
        }
    }

    /// Acquire the server once per session. A failure is remembered so that
    /// every dependent test is skipped with the same diagnostic.
    fn ensure_server(&mut self) -> Result<String, String> {
        if let Fixture::Pending = self.fixture {
            self.fixture = match self.runtime.block_on(ServerHandle::acquire(&self.config.server)) {
                Ok(server) => Fixture::Ready(server),
                Err(e) => {
                    error!("Server fixture failed: {}", e);
                    Fixture::Failed(e.to_string())
                }
            };
        }

        match &self.fixture {
            Fixture::Ready(server) => Ok(server.base_url().to_string()),
            Fixture::Failed(reason) => Err(reason.clone()),
            Fixture::Pending => Err("server was not acquired".to_string()),
        }
    }

    /// Run tests in order and tear the server down afterwards
    pub fn run(&mut self, cases: Vec<TestCase>) -> SessionSummary {
        let start = Instant::now();
        let mut summary = SessionSummary::default();

        info!("Running {} test(s)...", cases.len());

        for case in cases {
            let result = self.run_case(case);
            match result.verdict {
                Verdict::Passed => info!("✓ {} ({} ms)", result.node_id, result.duration_ms),
                Verdict::Failed => error!(
                    "✗ {} - {}",
                    result.node_id,
                    result.message.as_deref().unwrap_or("unknown error")
                ),
                Verdict::Skipped => warn!(
                    "- {} skipped: {}",
                    result.node_id,
                    result.message.as_deref().unwrap_or("")
                ),
            }
            summary.record(result);
        }

        self.teardown();

        summary.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Test Results: {} passed, {} failed, {} skipped ({} ms)",
            summary.passed, summary.failed, summary.skipped, summary.duration_ms
        );
        summary
    }

    fn run_case(&mut self, case: TestCase) -> CaseResult {
        let start = Instant::now();
        let TestCase {
            node_id,
            case_id,
            requires_server,
            body,
        } = case;

        let base_url = if requires_server {
            match self.ensure_server() {
                Ok(url) => Some(url),
                Err(reason) => {
                    return CaseResult {
                        node_id,
                        case_id,
                        verdict: Verdict::Skipped,
                        duration_ms: 0,
                        message: Some(format!("server fixture unavailable: {}", reason)),
                        report: None,
                    };
                }
            }
        } else {
            None
        };

        debug!(node_id = %node_id, "Running test");
        let context = TestContext { base_url };
        let result = match std::panic::catch_unwind(AssertUnwindSafe(|| body(&context))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(format!("{:#}", e)),
            Err(payload) => Err(panic_text(&*payload)),
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        let outcome = TestOutcome::new(node_id, case_id.as_deref(), result);
        let report = self.hook.on_test_finished(&outcome).map(describe_report);

        let (verdict, message) = match outcome.status {
            ExecutionStatus::Passed => (Verdict::Passed, None),
            ExecutionStatus::Failed => (Verdict::Failed, Some(outcome.evidence.clone())),
        };

        CaseResult {
            node_id: outcome.node_id,
            case_id: outcome.case_id,
            verdict,
            duration_ms,
            message,
            report,
        }
    }

    /// Stop the server if this session started it
    pub fn teardown(&mut self) {
        if let Fixture::Ready(mut server) = std::mem::replace(&mut self.fixture, Fixture::Pending) {
            server.teardown();
        }
    }

    /// Write test results to JSON file
    pub fn write_results(&self, summary: &SessionSummary) -> HarnessResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(summary)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

impl Drop for TestSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn bridge_for(config: &HarnessConfig, sink: Arc<dyn ReportSink>) -> ReportingBridge {
    ReportingBridge::new(sink, config.reporting.project_id.clone())
        .with_timeout(config.reporting.timeout())
}

fn describe_report(state: ReportState) -> String {
    match state {
        ReportState::Acked => "acked".to_string(),
        ReportState::Rejected(detail) => format!("rejected: {}", detail),
        ReportState::TimedOut => "timed out".to_string(),
        ReportState::Errored(detail) => format!("error: {}", detail),
    }
}

fn panic_text(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts() {
        let mut summary = SessionSummary::default();
        for verdict in [Verdict::Passed, Verdict::Failed, Verdict::Skipped, Verdict::Passed] {
            summary.record(CaseResult {
                node_id: "t".into(),
                case_id: None,
                verdict,
                duration_ms: 0,
                message: None,
                report: None,
            });
        }
        assert_eq!(summary.total, 4);
        assert_eq!(summary.passed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert!(!summary.success());
    }

    #[test]
    fn test_tracked_marker_is_normalized() {
        let case = TestCase::new("t", |_| Ok(())).tracked("  TC-3 ");
        assert_eq!(case.case_id(), Some("TC-3"));
        assert!(TestCase::new("t", |_| Ok(())).tracked("").case_id().is_none());
    }

    #[test]
    fn test_context_without_server() {
        let context = TestContext { base_url: None };
        assert!(context.server_url().is_err());
    }
}
