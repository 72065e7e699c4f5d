//! Kualitee reporting endpoint

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::debug;

use crate::config::ReportingConfig;
use crate::error::ReportError;

/// Execution status as Kualitee spells it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Passed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Passed => "Passed",
            ExecutionStatus::Failed => "Failed",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One status report for one test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub project_id: String,
    /// External test case identifier
    pub issue_key: String,
    pub status: ExecutionStatus,
    pub evidence: String,
}

/// Acknowledgment returned by the endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportAck {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl ReportAck {
    pub fn ok() -> Self {
        Self { success: true, error: None }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Anything that accepts execution reports
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn report_execution(&self, report: &ExecutionReport) -> Result<ReportAck, ReportError>;
}

/// HTTP client for the Kualitee execution API
pub struct KualiteeClient {
    http: reqwest::Client,
    endpoint: String,
    api_token: Option<String>,
}

impl KualiteeClient {
    pub fn new(config: &ReportingConfig) -> Result<Self, ReportError> {
        // The bridge enforces its own bound on the wait; this one only keeps
        // abandoned requests from lingering forever.
        let http = reqwest::Client::builder()
            .timeout(config.timeout() + Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            endpoint: format!(
                "{}{}",
                config.base_url.trim_end_matches('/'),
                config.execution_path
            ),
            api_token: config.api_token.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ReportSink for KualiteeClient {
    async fn report_execution(&self, report: &ExecutionReport) -> Result<ReportAck, ReportError> {
        debug!(issue_key = %report.issue_key, status = %report.status, "Posting execution");

        let mut request = self.http.post(&self.endpoint).json(report);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReportError::Endpoint {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<ReportAck>().await?)
    }
}
