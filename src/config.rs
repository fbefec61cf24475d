//! Start-up configuration.
//!
//! Built once in `main` and handed to the transport and orchestrator by
//! value; nothing here is mutated after start-up.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default listen address.
pub const DEFAULT_LISTEN: &str = "0.0.0.0:18060";

/// How concurrent tool calls relate to the single logged-in account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallPolicy {
    /// Calls run independently; the account constraint is owned externally.
    #[default]
    Concurrent,
    /// At most one automation session exists at a time.
    Serialized,
}

/// Browser launch options.
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Run without a visible window.
    pub headless: bool,
    /// Explicit browser binary; looked up on `PATH` when absent.
    pub binary: Option<PathBuf>,
    /// Externally managed cookie file loaded into every session.
    pub cookies_path: Option<PathBuf>,
    /// How long to wait for the DevTools endpoint after spawning the browser.
    pub launch_timeout: Duration,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            binary: None,
            cookies_path: None,
            launch_timeout: Duration::from_secs(20),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Socket the HTTP server binds to.
    pub listen: SocketAddr,
    /// Browser launch options.
    pub browser: BrowserConfig,
    /// Upper bound for one domain operation.
    pub call_timeout: Duration,
    /// Drain window granted to in-flight calls on shutdown.
    pub shutdown_timeout: Duration,
    /// Whether tool calls are serialized against the account.
    pub call_policy: CallPolicy,
    /// Methods answered as an event stream when the client accepts one.
    pub streamable_methods: Vec<String>,
    /// Account label reported by the health endpoint.
    pub account: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 18060)),
            browser: BrowserConfig::default(),
            call_timeout: Duration::from_secs(120),
            shutdown_timeout: Duration::from_secs(10),
            call_policy: CallPolicy::Concurrent,
            streamable_methods: Vec::new(),
            account: "ai-report".into(),
        }
    }
}

impl Config {
    /// Whether `method` may be answered with an event stream.
    pub fn is_streamable(&self, method: &str) -> bool {
        self.streamable_methods.iter().any(|m| m == method)
    }
}
