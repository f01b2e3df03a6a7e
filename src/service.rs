//! Lifecycle of the profiled service.
//!
//! [`ServiceGuard::acquire`] either finds a running service or starts one, and
//! remembers which so that release only stops a service this run started.
//! Release happens on drop too, so early returns and panics still shut down a
//! server we spawned.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ProfilerError, Result};

/// Maximum allowed startup wait (safety limit)
const MAX_STARTUP_TIMEOUT_SECS: u64 = 120;

/// Delay between reachability probes while waiting for startup or shutdown
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Timeout for a single reachability probe
const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Where the service lives and how to start it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    host: String,
    port: u16,

    /// Start a local server when none is reachable
    auto_start: bool,

    /// Server binary, resolved through `PATH` when it has no directory part
    server_bin: PathBuf,

    /// Table module loaded at startup
    module_path: Option<PathBuf>,

    startup_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            auto_start: true,
            server_bin: PathBuf::from("redis-server"),
            module_path: None,
            startup_timeout_secs: 10,
        }
    }
}

impl ServiceConfig {
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub const fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    #[must_use]
    pub fn with_server_bin(mut self, server_bin: PathBuf) -> Self {
        self.server_bin = server_bin;
        self
    }

    #[must_use]
    pub fn with_module_path(mut self, module_path: PathBuf) -> Self {
        self.module_path = Some(module_path);
        self
    }

    #[must_use]
    pub const fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout_secs = timeout.as_secs();
        self
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub const fn auto_start(&self) -> bool {
        self.auto_start
    }

    #[must_use]
    pub fn server_bin(&self) -> &Path {
        &self.server_bin
    }

    #[must_use]
    pub fn module_path(&self) -> Option<&Path> {
        self.module_path.as_deref()
    }

    #[must_use]
    pub const fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    /// Connection URL for the service
    #[must_use]
    pub fn url(&self) -> String {
        format!("redis://{}:{}/", self.host, self.port)
    }

    /// Validate the service section
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the host is empty, the port is 0, or the
    /// startup timeout is 0 or above the safety limit.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(ProfilerError::InvalidConfig(
                "service host cannot be empty".to_string(),
            ));
        }
        if self.port == 0 {
            return Err(ProfilerError::InvalidConfig(
                "service port must be non-zero".to_string(),
            ));
        }
        if self.startup_timeout_secs == 0 || self.startup_timeout_secs > MAX_STARTUP_TIMEOUT_SECS {
            return Err(ProfilerError::InvalidConfig(format!(
                "startup_timeout_secs must be between 1 and {MAX_STARTUP_TIMEOUT_SECS}, got {}",
                self.startup_timeout_secs
            )));
        }
        Ok(())
    }
}

/// Start/stop capability for the target service.
pub trait ServiceLifecycle {
    fn is_reachable(&mut self) -> bool;

    /// Start the service and block until it is reachable.
    ///
    /// # Errors
    ///
    /// Returns `ServiceUnreachable` if the service cannot be started or does
    /// not become reachable in time.
    fn start(&mut self, config: &ServiceConfig) -> Result<()>;

    /// # Errors
    ///
    /// Returns error if the stop request fails.
    fn stop(&mut self) -> Result<()>;
}

/// Result of the connect-or-start step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    AlreadyRunning,
    Started,
    Failed(String),
}

/// Probe the service, starting it when allowed and nothing answers.
pub fn connect_or_start<L: ServiceLifecycle>(
    lifecycle: &mut L,
    config: &ServiceConfig,
) -> ConnectOutcome {
    if lifecycle.is_reachable() {
        info!(url = %config.url(), "connected to existing service");
        return ConnectOutcome::AlreadyRunning;
    }

    if !config.auto_start() {
        return ConnectOutcome::Failed(format!(
            "nothing is listening on {} and auto-start is disabled",
            config.url()
        ));
    }

    info!(url = %config.url(), "service not running, starting it");
    match lifecycle.start(config) {
        Ok(()) => ConnectOutcome::Started,
        Err(e) => ConnectOutcome::Failed(e.to_string()),
    }
}

/// Whether this run owns the service it is talking to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Someone else started it; leave it running.
    Borrowed,
    /// Started by this run; stop it on release.
    Owned,
}

/// Scoped hold on the service.
pub struct ServiceGuard<L: ServiceLifecycle> {
    lifecycle: L,
    ownership: Ownership,
    released: bool,
}

impl<L: ServiceLifecycle> ServiceGuard<L> {
    /// Connect to or start the service.
    ///
    /// # Errors
    ///
    /// Returns `ServiceUnreachable` when neither succeeds.
    pub fn acquire(mut lifecycle: L, config: &ServiceConfig) -> Result<Self> {
        let ownership = match connect_or_start(&mut lifecycle, config) {
            ConnectOutcome::AlreadyRunning => Ownership::Borrowed,
            ConnectOutcome::Started => Ownership::Owned,
            ConnectOutcome::Failed(reason) => {
                return Err(ProfilerError::service_unreachable(reason));
            }
        };

        Ok(Self {
            lifecycle,
            ownership,
            released: false,
        })
    }

    #[must_use]
    pub const fn ownership(&self) -> Ownership {
        self.ownership
    }

    /// Stop the service if this run started it.
    ///
    /// # Errors
    ///
    /// Returns the lifecycle's stop error.
    pub fn release(mut self) -> Result<()> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        match self.ownership {
            Ownership::Borrowed => Ok(()),
            Ownership::Owned => {
                info!("stopping service started by this run");
                self.lifecycle.stop()
            }
        }
    }
}

impl<L: ServiceLifecycle> Drop for ServiceGuard<L> {
    fn drop(&mut self) {
        if let Err(e) = self.release_inner() {
            warn!(error = %e, "failed to stop service");
        }
    }
}

/// A local `redis-server` with the table module loaded
pub struct RedisServer {
    config: ServiceConfig,
}

impl RedisServer {
    #[must_use]
    pub const fn new(config: ServiceConfig) -> Self {
        Self { config }
    }

    fn connect(&self) -> redis::RedisResult<redis::Connection> {
        redis::Client::open(self.config.url())?.get_connection_with_timeout(PROBE_TIMEOUT)
    }

    /// Build the daemonizing start command
    fn start_command(config: &ServiceConfig, module: &Path) -> Command {
        let mut cmd = Command::new(config.server_bin());
        cmd.arg("--loadmodule")
            .arg(module)
            .args(["--daemonize", "yes"])
            .arg("--port")
            .arg(config.port().to_string())
            .args(["--save", ""])
            .args(["--appendonly", "no"]);
        cmd
    }

    /// Verify the server binary exists, on `PATH` or at the given location
    fn verify_server_installed(server_bin: &Path) -> Result<()> {
        let found = if server_bin.components().count() > 1 {
            server_bin.is_file()
        } else {
            Command::new("which")
                .arg(server_bin)
                .output()
                .is_ok_and(|output| output.status.success())
        };

        if found {
            Ok(())
        } else {
            Err(ProfilerError::service_unreachable(format!(
                "server binary not found: {}",
                server_bin.display()
            )))
        }
    }

    fn wait_until(&mut self, reachable: bool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_reachable() == reachable {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl ServiceLifecycle for RedisServer {
    fn is_reachable(&mut self) -> bool {
        self.connect()
            .and_then(|mut conn| redis::cmd("PING").query::<String>(&mut conn))
            .is_ok()
    }

    fn start(&mut self, config: &ServiceConfig) -> Result<()> {
        let module = config.module_path().ok_or_else(|| {
            ProfilerError::service_unreachable("module path is required to start the server")
        })?;
        if !module.is_file() {
            return Err(ProfilerError::service_unreachable(format!(
                "module not found at {}",
                module.display()
            )));
        }
        Self::verify_server_installed(config.server_bin())?;

        let output = Self::start_command(config, module).output().map_err(|e| {
            ProfilerError::service_unreachable(format!(
                "failed to spawn {}: {e}",
                config.server_bin().display()
            ))
        })?;
        if !output.status.success() {
            return Err(ProfilerError::service_unreachable(format!(
                "server exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        self.config = config.clone();
        if self.wait_until(true, config.startup_timeout()) {
            info!(port = config.port(), "service started");
            Ok(())
        } else {
            Err(ProfilerError::service_unreachable(format!(
                "server started but {} is not answering after {}s",
                config.url(),
                config.startup_timeout().as_secs()
            )))
        }
    }

    fn stop(&mut self) -> Result<()> {
        let mut conn = self
            .connect()
            .map_err(|e| ProfilerError::command("SHUTDOWN", e.to_string()))?;

        // The server drops the connection instead of replying.
        match redis::cmd("SHUTDOWN").arg("NOSAVE").query::<()>(&mut conn) {
            Ok(()) => {}
            Err(e) if e.is_io_error() || e.is_connection_dropped() => {
                debug!("connection closed by shutdown");
            }
            Err(e) => return Err(ProfilerError::command("SHUTDOWN", e.to_string())),
        }

        if self.wait_until(false, self.config.startup_timeout()) {
            info!("service stopped");
            Ok(())
        } else {
            Err(ProfilerError::command(
                "SHUTDOWN",
                "service still reachable after shutdown",
            ))
        }
    }
}
