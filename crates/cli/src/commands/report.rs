//! One-off Kualitee execution report

use clap::{Args, ValueEnum};
use std::sync::Arc;

use storefront_harness::{
    ExecutionStatus, HarnessConfig, KualiteeClient, ReportState, ReportingBridge,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StatusArg {
    Passed,
    Failed,
}

impl From<StatusArg> for ExecutionStatus {
    fn from(status: StatusArg) -> Self {
        match status {
            StatusArg::Passed => ExecutionStatus::Passed,
            StatusArg::Failed => ExecutionStatus::Failed,
        }
    }
}

#[derive(Args)]
pub struct ReportArgs {
    /// Kualitee test case identifier
    #[arg(long = "case")]
    pub case_id: String,

    /// Execution status
    #[arg(long, value_enum)]
    pub status: StatusArg,

    /// Free-text evidence
    #[arg(long, default_value = "Reported manually from storefront-e2e")]
    pub evidence: String,

    /// Print the outcome as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: ReportArgs, config: HarnessConfig) -> anyhow::Result<()> {
    config.validate()?;
    let client = KualiteeClient::new(&config.reporting)?;
    let bridge = ReportingBridge::new(Arc::new(client), config.reporting.project_id.clone())
        .with_timeout(config.reporting.timeout());

    let state = bridge.report(Some(&args.case_id), args.status.into(), &args.evidence);

    let (delivered, detail) = match &state {
        Some(ReportState::Acked) => (true, None),
        Some(ReportState::Rejected(detail)) | Some(ReportState::Errored(detail)) => {
            (false, Some(detail.clone()))
        }
        Some(ReportState::TimedOut) => (false, Some("timed out".to_string())),
        None => (false, Some("no test case id".to_string())),
    };

    if args.json {
        println!(
            "{}",
            serde_json::json!({
                "case": args.case_id,
                "delivered": delivered,
                "detail": detail,
            })
        );
    }

    if !delivered {
        anyhow::bail!(
            "Report for {} was not delivered: {}",
            args.case_id,
            detail.unwrap_or_default()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undelivered_report_is_an_error() {
        let port = storefront_harness::server::find_free_port().unwrap();
        let mut config = HarnessConfig::default();
        config.reporting.base_url = format!("http://127.0.0.1:{}", port);
        config.reporting.timeout_ms = 1000;

        let args = ReportArgs {
            case_id: "TC-1".to_string(),
            status: StatusArg::Passed,
            evidence: "manual".to_string(),
            json: false,
        };

        let err = execute(args, config).unwrap_err();
        assert!(err.to_string().contains("TC-1 was not delivered"), "{}", err);
    }
}
