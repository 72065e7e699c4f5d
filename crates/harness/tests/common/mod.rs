//! Shared fixtures for the harness integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::net::TcpListener;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

use storefront_harness::{ExecutionReport, ReportAck, ReportError, ReportSink, ServerConfig};

/// Entry point that dies immediately with a diagnostic on stderr
pub const CRASHING_SERVER: &str = "echo \"Error: That port is already in use.\" >&2\nexit 1\n";

/// Entry point that stays alive and never listens
pub const IDLE_SERVER: &str = "exec sleep 30\n";

/// Entry point that ignores SIGTERM
pub const STUBBORN_SERVER: &str = "trap '' TERM\nwhile true; do sleep 1; done\n";

/// Temporary project root whose `manage.py` is a shell script
pub fn fake_project(script: &str) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("manage.py"), script).unwrap();
    dir
}

/// Supervisor config that runs `sh manage.py` from `root` with short timings
pub fn server_config(root: &Path, port: u16) -> ServerConfig {
    ServerConfig {
        search_roots: vec![root.to_path_buf()],
        max_depth: 3,
        interpreter: "sh".to_string(),
        bind_address: "127.0.0.1".to_string(),
        probe_host: "127.0.0.1".to_string(),
        port,
        startup_timeout_ms: 2_000,
        poll_interval_ms: 100,
        grace_period_ms: 1_000,
        ..Default::default()
    }
}

pub fn free_port() -> u16 {
    storefront_harness::server::find_free_port().unwrap()
}

/// Start listening on `port` after `delay`, standing in for a server that
/// takes a moment to come up
pub fn listen_after(port: u16, delay: Duration) -> std::thread::JoinHandle<TcpListener> {
    std::thread::spawn(move || {
        std::thread::sleep(delay);
        TcpListener::bind(("127.0.0.1", port)).unwrap()
    })
}

/// How a [`ScriptedSink`] answers
#[derive(Debug, Clone)]
pub enum Reply {
    Ack,
    Reject(&'static str),
    Fail,
    Delay(Duration),
}

/// Report sink that records every call and answers from a script
pub struct ScriptedSink {
    reply: Reply,
    calls: AtomicUsize,
    reports: Mutex<Vec<ExecutionReport>>,
}

impl ScriptedSink {
    pub fn new(reply: Reply) -> Self {
        Self {
            reply,
            calls: AtomicUsize::new(0),
            reports: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn reports(&self) -> Vec<ExecutionReport> {
        self.reports.lock().clone()
    }
}

#[async_trait]
impl ReportSink for ScriptedSink {
    async fn report_execution(&self, report: &ExecutionReport) -> Result<ReportAck, ReportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reports.lock().push(report.clone());

        match &self.reply {
            Reply::Ack => Ok(ReportAck::ok()),
            Reply::Reject(detail) => Ok(ReportAck::rejected(*detail)),
            Reply::Fail => Err(ReportError::Endpoint {
                status: 502,
                body: "bad gateway".to_string(),
            }),
            Reply::Delay(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(ReportAck::ok())
            }
        }
    }
}
