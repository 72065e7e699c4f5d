//! Server supervision - locating, spawning, health checking and stopping the
//! storefront dev server

use parking_lot::Mutex;
use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::discovery::discover_root;
use crate::error::{HarnessError, HarnessResult};
use crate::workdir::WorkdirGuard;

const PROBE_TIMEOUT: Duration = Duration::from_millis(500);
const FINISH_TIMEOUT: Duration = Duration::from_secs(1);

/// Lifecycle of a supervised server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    NotStarted,
    Starting,
    Ready,
    Stopping,
    Stopped,
    /// Another process was already serving the port; nothing is owned
    Reused,
}

/// Handle to the server the test session runs against
pub struct ServerHandle {
    root: PathBuf,
    port: u16,
    base_url: String,
    state: ServerState,
    grace_period: Duration,
    child: Option<Child>,
    stdout: OutputCapture,
    stderr: OutputCapture,
}

impl ServerHandle {
    /// Find the project root and make sure a server is listening on the
    /// configured port, starting one if needed.
    ///
    /// The working directory is restored before this returns, whether or not
    /// startup succeeded.
    pub async fn acquire(config: &ServerConfig) -> HarnessResult<Self> {
        let root = discover_root(config)?;

        let mut handle = ServerHandle {
            root,
            port: config.port,
            base_url: config.base_url(),
            state: ServerState::NotStarted,
            grace_period: config.grace_period(),
            child: None,
            stdout: OutputCapture::new(config.capture_limit),
            stderr: OutputCapture::new(config.capture_limit),
        };

        if is_serving(&config.probe_host, config.port, PROBE_TIMEOUT).await {
            info!(port = config.port, "Server already running - reusing it");
            handle.state = ServerState::Reused;
            return Ok(handle);
        }

        let _cwd = if config.change_dir {
            Some(WorkdirGuard::enter(&handle.root)?)
        } else {
            None
        };

        handle.spawn(config)?;

        if let Err(e) = handle.wait_for_ready(config).await {
            handle.kill_quietly();
            return Err(e);
        }

        Ok(handle)
    }

    fn spawn(&mut self, config: &ServerConfig) -> HarnessResult<()> {
        let bind = format!("{}:{}", config.bind_address, config.port);
        info!(root = %self.root.display(), %bind, "Starting server");

        let mut cmd = Command::new(&config.interpreter);
        cmd.arg(&config.entry_point)
            .arg("runserver")
            .arg(&bind)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        self.state = ServerState::Starting;
        let mut child = cmd.spawn().map_err(|source| HarnessError::Spawn {
            program: config.interpreter.clone(),
            source,
        })?;

        if let Some(out) = child.stdout.take() {
            self.stdout.drain(out, "stdout");
        }
        if let Some(err) = child.stderr.take() {
            self.stderr.drain(err, "stderr");
        }

        debug!(pid = child.id(), "Server process spawned");
        self.child = Some(child);
        Ok(())
    }

    /// Poll the health probe until it passes, the process exits, or the
    /// startup timeout elapses
    async fn wait_for_ready(&mut self, config: &ServerConfig) -> HarnessResult<()> {
        let start = Instant::now();
        let timeout_duration = config.startup_timeout();
        let interval = config.poll_interval();

        loop {
            if is_serving(&config.probe_host, config.port, PROBE_TIMEOUT).await {
                self.state = ServerState::Ready;
                info!(
                    port = self.port,
                    "Server started successfully (waited {:.1}s)",
                    start.elapsed().as_secs_f64()
                );
                return Ok(());
            }

            if let Some(status) = self.try_exit_status()? {
                self.state = ServerState::Stopped;
                self.child = None;
                let stderr = self.stderr.finish();
                return Err(HarnessError::Startup {
                    status: status.to_string(),
                    stderr: if stderr.trim().is_empty() {
                        "Unknown error".to_string()
                    } else {
                        stderr
                    },
                });
            }

            if start.elapsed() >= timeout_duration {
                return Err(HarnessError::StartupTimeout {
                    port: self.port,
                    waited: start.elapsed(),
                });
            }

            sleep(interval).await;
        }
    }

    fn try_exit_status(&mut self) -> HarnessResult<Option<std::process::ExitStatus>> {
        match self.child.as_mut() {
            Some(child) => Ok(child.try_wait()?),
            None => Ok(None),
        }
    }

    fn kill_quietly(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        self.state = ServerState::Stopped;
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn is_reused(&self) -> bool {
        self.state == ServerState::Reused
    }

    /// Discovered project root
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get the base URL for this server
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// PID of the owned process, if any
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// Captured stdout so far
    pub fn stdout(&self) -> String {
        self.stdout.text()
    }

    /// Captured stderr so far
    pub fn stderr(&self) -> String {
        self.stderr.text()
    }

    /// Stop the owned server. Errors are logged, never returned.
    pub fn teardown(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        info!(pid = child.id(), "Stopping server");
        self.state = ServerState::Stopping;

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let pid = Pid::from_raw(child.id() as i32);
            if let Err(e) = kill(pid, Signal::SIGTERM) {
                warn!(pid = child.id(), "Failed to send SIGTERM: {}", e);
            }
        }
        #[cfg(not(unix))]
        {
            if let Err(e) = child.kill() {
                warn!(pid = child.id(), "Failed to stop server: {}", e);
            }
        }

        let deadline = Instant::now() + self.grace_period;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!(%status, "Server exited");
                    break;
                }
                Ok(None) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(50));
                }
                Ok(None) => {
                    warn!(pid = child.id(), "Server ignored SIGTERM, killing");
                    if let Err(e) = child.kill() {
                        warn!("Error stopping server: {}", e);
                    }
                    let _ = child.wait();
                    break;
                }
                Err(e) => {
                    warn!("Error stopping server: {}", e);
                    let _ = child.kill();
                    break;
                }
            }
        }

        self.state = ServerState::Stopped;
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("root", &self.root)
            .field("port", &self.port)
            .field("state", &self.state)
            .field("pid", &self.pid())
            .finish()
    }
}

/// Blocking TCP connect for synchronous callers; success means something is
/// serving the port. Async code uses [`is_serving`].
pub fn probe(host: &str, port: u16, timeout: Duration) -> bool {
    let addrs = match (host, port).to_socket_addrs() {
        Ok(addrs) => addrs,
        Err(e) => {
            debug!(host, "Could not resolve probe host: {}", e);
            return false;
        }
    };
    addrs
        .into_iter()
        .any(|addr| TcpStream::connect_timeout(&addr, timeout).is_ok())
}

/// Async health check: true when a TCP connection to `host:port` opens within
/// `timeout` for any resolved address
pub async fn is_serving(host: &str, port: u16, timeout: Duration) -> bool {
    let addrs = match tokio::net::lookup_host((host, port)).await {
        Ok(addrs) => addrs,
        Err(e) => {
            debug!(host, "Could not resolve probe host: {}", e);
            return false;
        }
    };
    for addr in addrs {
        let connect = tokio::net::TcpStream::connect(addr);
        if let Ok(Ok(_)) = tokio::time::timeout(timeout, connect).await {
            return true;
        }
    }
    false
}

/// Find a free port to use
pub fn find_free_port() -> std::io::Result<u16> {
    use std::net::TcpListener;

    Ok(TcpListener::bind("127.0.0.1:0")?.local_addr()?.port())
}

/// Tail of a child output stream, drained on a background thread so the pipe
/// never fills up
struct OutputCapture {
    buf: Arc<Mutex<Vec<u8>>>,
    limit: usize,
    reader: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl OutputCapture {
    fn new(limit: usize) -> Self {
        Self {
            buf: Arc::new(Mutex::new(Vec::new())),
            limit,
            reader: Arc::new(Mutex::new(None)),
        }
    }

    fn drain<R: Read + Send + 'static>(&self, mut source: R, name: &'static str) {
        let buf = Arc::clone(&self.buf);
        let limit = self.limit;
        let spawned = std::thread::Builder::new()
            .name(format!("server-{}", name))
            .spawn(move || {
                let mut chunk = [0u8; 4096];
                loop {
                    match source.read(&mut chunk) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            let mut buf = buf.lock();
                            buf.extend_from_slice(&chunk[..n]);
                            if buf.len() > limit {
                                let excess = buf.len() - limit;
                                buf.drain(..excess);
                            }
                        }
                    }
                }
            });

        match spawned {
            Ok(handle) => *self.reader.lock() = Some(handle),
            Err(e) => warn!(stream = name, "Could not capture server output: {}", e),
        }
    }

    /// Wait briefly for the stream to close, then return everything captured.
    /// A grandchild may keep the pipe open, so the wait is bounded.
    fn finish(&self) -> String {
        if let Some(handle) = self.reader.lock().take() {
            let deadline = Instant::now() + FINISH_TIMEOUT;
            while !handle.is_finished() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(10));
            }
            if handle.is_finished() {
                let _ = handle.join();
            }
        }
        self.text()
    }

    fn text(&self) -> String {
        String::from_utf8_lossy(&self.buf.lock()).into_owned()
    }
}
