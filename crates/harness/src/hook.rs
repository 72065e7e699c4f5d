//! Test lifecycle hook: turns finished tests into Kualitee reports

use serde::{Deserialize, Serialize};

use crate::bridge::{ReportState, ReportingBridge};
use crate::report::ExecutionStatus;

/// Result of one executed test, consumed once by the hook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    /// Fully qualified test name
    pub node_id: String,
    /// External test case identifier; `None` means not tracked externally
    pub case_id: Option<String>,
    pub status: ExecutionStatus,
    pub evidence: String,
}

impl TestOutcome {
    pub fn new(
        node_id: impl Into<String>,
        case_id: Option<&str>,
        result: Result<(), String>,
    ) -> Self {
        let node_id = node_id.into();
        let mut evidence = format!("Automated Playwright test: {}", node_id);
        let status = match result {
            Ok(()) => ExecutionStatus::Passed,
            Err(message) => {
                evidence.push_str(" | Error: ");
                evidence.push_str(&message);
                ExecutionStatus::Failed
            }
        };

        Self {
            node_id,
            case_id: normalize_case_id(case_id),
            status,
            evidence,
        }
    }

    pub fn is_tracked(&self) -> bool {
        self.case_id.is_some()
    }
}

/// Blank identifiers are treated as no marker at all
pub fn normalize_case_id(case_id: Option<&str>) -> Option<String> {
    case_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Called by the runner after each test body finishes
#[derive(Clone)]
pub struct LifecycleHook {
    bridge: Option<ReportingBridge>,
}

impl LifecycleHook {
    pub fn new(bridge: ReportingBridge) -> Self {
        Self { bridge: Some(bridge) }
    }

    /// A hook that never reports
    pub fn disabled() -> Self {
        Self { bridge: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.bridge.is_some()
    }

    pub fn on_test_finished(&self, outcome: &TestOutcome) -> Option<ReportState> {
        let bridge = self.bridge.as_ref()?;
        bridge.report(outcome.case_id.as_deref(), outcome.status, &outcome.evidence)
    }
}
