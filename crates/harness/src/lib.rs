//! Storefront E2E harness
//!
//! Test infrastructure for the storefront browser tests:
//! - Locates the storefront project and supervises its dev server, reusing a
//!   server that is already listening
//! - Pushes one pass/fail report per tracked test to Kualitee, from whatever
//!   runtime context the completion hook fires in
//! - Runs registered test bodies sequentially and writes a JSON summary
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  TestSession                                                │
//! │    ├── ServerHandle::acquire() -> Ready | Reused            │
//! │    ├── run(cases) -> SessionSummary                         │
//! │    │     └── LifecycleHook::on_test_finished(outcome)       │
//! │    │           └── ReportingBridge::report()                │
//! │    │                 ├── NoScheduler   -> own runtime       │
//! │    │                 ├── IdleScheduler -> helper thread     │
//! │    │                 └── BusyScheduler -> spawn + wait      │
//! │    └── teardown() -> Stopped                                │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod bridge;
pub mod config;
pub mod discovery;
pub mod error;
pub mod hook;
pub mod report;
pub mod runner;
pub mod server;
pub mod workdir;

pub use bridge::{DispatchContext, ReportState, ReportingBridge};
pub use config::{HarnessConfig, ReportingConfig, ServerConfig};
pub use error::{HarnessError, HarnessResult, ReportError};
pub use hook::{LifecycleHook, TestOutcome};
pub use report::{ExecutionReport, ExecutionStatus, KualiteeClient, ReportAck, ReportSink};
pub use runner::{SessionSummary, TestCase, TestContext, TestSession};
pub use server::{ServerHandle, ServerState};
