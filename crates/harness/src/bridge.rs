//! Reporting bridge
//!
//! Test completion hooks are plain synchronous calls. The report itself is an
//! async request. The bridge works out which runtime context the hook was
//! called from and drives the request to completion the matching way:
//!
//! | Context          | Strategy                                               |
//! |------------------|--------------------------------------------------------|
//! | `NoScheduler`    | private current-thread runtime, `block_on`             |
//! | `IdleScheduler`  | helper thread with its own runtime, bounded join       |
//! | `BusyScheduler`  | spawn onto the running runtime, bounded channel wait   |
//!
//! Every strategy waits at most the configured bound. A report that outlives
//! the bound is abandoned, not cancelled on the endpoint side.
//!
//! Known limitation: a `BusyScheduler` on a current-thread runtime cannot run
//! the spawned request while its only thread is blocked in the hook, so the
//! wait always elapses. The request may still complete once the caller yields.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, error, info, warn};

use crate::error::ReportError;
use crate::report::{ExecutionReport, ExecutionStatus, ReportAck, ReportSink};

pub const DEFAULT_REPORT_TIMEOUT: Duration = Duration::from_secs(5);

/// Runtime context the bridge was called from
#[derive(Debug, Clone)]
pub enum DispatchContext {
    /// No tokio runtime is reachable from this thread
    NoScheduler,
    /// A runtime is reachable but this thread is not running one of its tasks
    IdleScheduler(Handle),
    /// This thread is currently executing a task of the runtime
    BusyScheduler(Handle),
}

impl DispatchContext {
    pub fn detect() -> Self {
        match Handle::try_current() {
            Err(_) => DispatchContext::NoScheduler,
            Ok(handle) if tokio::task::try_id().is_some() => {
                DispatchContext::BusyScheduler(handle)
            }
            Ok(handle) => DispatchContext::IdleScheduler(handle),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DispatchContext::NoScheduler => "no-scheduler",
            DispatchContext::IdleScheduler(_) => "idle-scheduler",
            DispatchContext::BusyScheduler(_) => "busy-scheduler",
        }
    }
}

/// Terminal state of one report attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportState {
    Acked,
    Rejected(String),
    TimedOut,
    Errored(String),
}

/// Pushes test outcomes to a [`ReportSink`] without ever failing the caller
#[derive(Clone)]
pub struct ReportingBridge {
    sink: Arc<dyn ReportSink>,
    project_id: String,
    timeout: Duration,
}

impl ReportingBridge {
    pub fn new(sink: Arc<dyn ReportSink>, project_id: impl Into<String>) -> Self {
        Self {
            sink,
            project_id: project_id.into(),
            timeout: DEFAULT_REPORT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Report one finished test.
    ///
    /// Untracked tests (`case_id` is `None`) make no call and return `None`.
    /// Otherwise exactly one line is logged and the terminal state returned.
    pub fn report(
        &self,
        case_id: Option<&str>,
        status: ExecutionStatus,
        evidence: &str,
    ) -> Option<ReportState> {
        let case_id = case_id?;

        let report = ExecutionReport {
            project_id: self.project_id.clone(),
            issue_key: case_id.to_string(),
            status,
            evidence: evidence.to_string(),
        };

        let state = match self.deliver(&report) {
            Ok(ack) if ack.success => {
                info!(case_id, %status, "[Kualitee] Reported {} for {}", status, case_id);
                ReportState::Acked
            }
            Ok(ack) => {
                let detail = ack.error.unwrap_or_else(|| "no error detail".to_string());
                error!(case_id, "[Kualitee] Failed to report {}: {}", case_id, detail);
                ReportState::Rejected(detail)
            }
            Err(ReportError::TimedOut(bound)) => {
                warn!(
                    case_id,
                    "Kualitee reporting timed out for {} after {:?}", case_id, bound
                );
                ReportState::TimedOut
            }
            Err(e) => {
                warn!(case_id, "Failed to report {} to Kualitee: {}", case_id, e);
                ReportState::Errored(e.to_string())
            }
        };

        Some(state)
    }

    /// Send one report and wait, bounded, for the acknowledgment
    pub fn deliver(&self, report: &ExecutionReport) -> Result<ReportAck, ReportError> {
        let context = DispatchContext::detect();
        debug!(context = context.name(), issue_key = %report.issue_key, "Dispatching report");

        let sink = Arc::clone(&self.sink);
        let report = report.clone();
        let operation = async move { sink.report_execution(&report).await };

        let timeout = self.timeout;
        std::panic::catch_unwind(AssertUnwindSafe(move || match context {
            DispatchContext::NoScheduler => run_owned(operation, timeout),
            // The caller may be the thread driving its runtime (inside
            // `block_on`), so that runtime is never blocked on here
            DispatchContext::IdleScheduler(_) => run_on_helper_thread(operation, timeout),
            DispatchContext::BusyScheduler(handle) => run_busy(&handle, operation, timeout),
        }))
        .unwrap_or_else(|payload| Err(ReportError::Aborted(panic_message(&*payload))))
    }
}

/// No runtime around: build one and own the wait
fn run_owned<F>(operation: F, timeout: Duration) -> Result<ReportAck, ReportError>
where
    F: Future<Output = Result<ReportAck, ReportError>> + Send + 'static,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(ReportError::Runtime)?;

    // The timer must be created inside the runtime it registers with
    runtime
        .block_on(async move { tokio::time::timeout(timeout, operation).await })
        .map_err(|_| ReportError::TimedOut(timeout))?
}

/// This thread is inside a task: enqueue onto the runtime and block, bounded
fn run_busy<F>(
    handle: &Handle,
    operation: F,
    timeout: Duration,
) -> Result<ReportAck, ReportError>
where
    F: Future<Output = Result<ReportAck, ReportError>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    handle.spawn(async move {
        let _ = tx.send(operation.await);
    });

    let received = match handle.runtime_flavor() {
        RuntimeFlavor::MultiThread => tokio::task::block_in_place(|| rx.recv_timeout(timeout)),
        _ => {
            debug!("Blocking the only scheduler thread, the report runs after the wait");
            rx.recv_timeout(timeout)
        }
    };

    flatten(received, timeout)
}

/// Run the report on a dedicated thread with its own runtime and wait for it,
/// bounded. Used whenever the calling thread's runtime must not be blocked.
fn run_on_helper_thread<F>(operation: F, timeout: Duration) -> Result<ReportAck, ReportError>
where
    F: Future<Output = Result<ReportAck, ReportError>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    std::thread::Builder::new()
        .name("kualitee-report".into())
        .spawn(move || {
            let result = run_owned(operation, timeout);
            let _ = tx.send(result);
        })
        .map_err(ReportError::Runtime)?;

    flatten(rx.recv_timeout(timeout), timeout)
}

fn flatten(
    received: Result<Result<ReportAck, ReportError>, mpsc::RecvTimeoutError>,
    timeout: Duration,
) -> Result<ReportAck, ReportError> {
    match received {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(ReportError::TimedOut(timeout)),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(ReportError::Aborted(
            "report task ended without a result".to_string(),
        )),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
