//! Chromium-backed automation sessions.
//!
//! Every session is a separate browser process with its own throwaway
//! profile, so nothing leaks between calls except the cookies loaded from the
//! externally managed cookie file.

mod cdp;

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::process::{Child, Command};

use crate::config::BrowserConfig;
use crate::error::{Error, Result};
use crate::session::{AutomationSession, SessionFactory};

pub use cdp::CdpClient;

const PAGE_LOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Launches one browser per session.
pub struct ChromeSessionFactory {
    config: BrowserConfig,
}

impl ChromeSessionFactory {
    /// Create a factory; the binary is resolved on first use.
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }

    async fn launch(&self) -> Result<CdpSession> {
        let binary = match &self.config.binary {
            Some(path) => path.clone(),
            None => find_browser_binary()
                .ok_or_else(|| Error::Setup("no Chrome or Chromium binary found; pass --bin".into()))?,
        };
        let profile = tempfile::Builder::new()
            .prefix("xiaohongshu-mcp-")
            .tempdir()?;
        let port = find_free_port().await?;

        let id = uuid::Uuid::new_v4().to_string();
        tracing::info!(
            session = %id,
            binary = %binary.display(),
            port,
            headless = self.config.headless,
            "launching browser"
        );

        let process = Command::new(&binary)
            .args(browser_args(port, profile.path(), self.config.headless))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Setup(format!("failed to launch {}: {e}", binary.display())))?;

        wait_for_devtools(port, self.config.launch_timeout).await?;
        let ws_url = page_ws_url(port).await?;
        let cdp = CdpClient::connect(&ws_url).await?;
        for domain in ["Page", "Runtime", "DOM", "Network"] {
            cdp.enable_domain(domain).await?;
        }

        if let Some(path) = &self.config.cookies_path {
            load_cookies(&cdp, path).await?;
        }

        Ok(CdpSession {
            id,
            cdp,
            process,
            _profile: profile,
        })
    }
}

#[async_trait::async_trait]
impl SessionFactory for ChromeSessionFactory {
    async fn open(&self) -> Result<Box<dyn AutomationSession>> {
        let session = self.launch().await.map_err(|e| match e {
            Error::Setup(_) => e,
            other => Error::Setup(other.to_string()),
        })?;
        Ok(Box::new(session))
    }
}

/// A live browser with one page.
pub struct CdpSession {
    id: String,
    cdp: CdpClient,
    process: Child,
    _profile: TempDir,
}

impl CdpSession {
    async fn run_on_element(&self, selector: &str, body: &str) -> Result<()> {
        let selector_literal = serde_json::to_string(selector)?;
        let expression = format!(
            "(() => {{ const el = document.querySelector({selector_literal}); \
             if (!el) return false; el.scrollIntoView({{block: 'center'}}); {body} return true; }})()"
        );
        match self.cdp.evaluate(&expression).await? {
            Value::Bool(true) => Ok(()),
            _ => Err(Error::Operation(format!("element `{selector}` not found"))),
        }
    }
}

#[async_trait::async_trait]
impl AutomationSession for CdpSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        tracing::debug!(session = %self.id, url, "navigate");
        let result = self
            .cdp
            .send_command("Page.navigate", json!({ "url": url }))
            .await?;
        if let Some(error) = result.get("errorText").and_then(Value::as_str) {
            return Err(Error::Operation(format!("could not load {url}: {error}")));
        }

        let deadline = Instant::now() + PAGE_LOAD_TIMEOUT;
        loop {
            if self.cdp.evaluate("document.readyState").await? == json!("complete") {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::Operation(format!("{url} did not finish loading")));
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }

    async fn evaluate(&self, expression: &str) -> Result<Value> {
        self.cdp.evaluate(expression).await
    }

    async fn exists(&self, selector: &str) -> Result<bool> {
        let expression = format!(
            "document.querySelector({}) !== null",
            serde_json::to_string(selector)?
        );
        Ok(self.cdp.evaluate(&expression).await? == Value::Bool(true))
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.run_on_element(selector, "el.click();").await
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<()> {
        self.run_on_element(selector, "el.focus();").await?;
        self.cdp.insert_text(text).await
    }

    async fn set_files(&self, selector: &str, paths: &[PathBuf]) -> Result<()> {
        let node = self
            .cdp
            .query_selector(selector)
            .await?
            .ok_or_else(|| Error::Operation(format!("file input `{selector}` not found")))?;
        let files = paths.iter().map(|p| p.display().to_string()).collect();
        self.cdp.set_file_input_files(node, files).await
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let mut this = *self;
        if let Err(e) = this.cdp.send_command("Browser.close", json!({})).await {
            tracing::debug!(session = %this.id, error = %e, "Browser.close failed; killing process");
        }
        match this.process.kill().await {
            Ok(()) => Ok(()),
            // Already exited after Browser.close.
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn browser_args(port: u16, profile: &Path, headless: bool) -> Vec<String> {
    let mut args = vec![
        format!("--remote-debugging-port={port}"),
        format!("--user-data-dir={}", profile.display()),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--disable-background-networking".to_string(),
        "--disable-extensions".to_string(),
        "--disable-sync".to_string(),
        "--password-store=basic".to_string(),
    ];
    if headless {
        args.push("--headless=new".to_string());
    }
    args.push("--window-size=1280,900".to_string());
    args.push("about:blank".to_string());
    args
}

/// Find a Chromium-family browser on this machine.
pub fn find_browser_binary() -> Option<PathBuf> {
    let candidates: &[&str] = if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ]
    } else if cfg!(target_os = "windows") {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ]
    } else {
        &[
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
        ]
    };

    candidates.iter().find_map(|candidate| {
        let path = Path::new(candidate);
        if path.is_absolute() {
            path.exists().then(|| path.to_path_buf())
        } else {
            which::which(candidate).ok()
        }
    })
}

async fn find_free_port() -> Result<u16> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    Ok(listener.local_addr()?.port())
}

async fn wait_for_devtools(port: u16, timeout: Duration) -> Result<()> {
    let url = format!("http://127.0.0.1:{port}/json/version");
    let deadline = Instant::now() + timeout;
    loop {
        if let Ok(response) = reqwest::get(&url).await {
            if let Ok(body) = response.json::<Value>().await {
                if body.get("webSocketDebuggerUrl").is_some() {
                    return Ok(());
                }
            }
        }
        if Instant::now() >= deadline {
            return Err(Error::Setup(format!(
                "browser DevTools endpoint not ready after {}s",
                timeout.as_secs()
            )));
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

async fn page_ws_url(port: u16) -> Result<String> {
    let url = format!("http://127.0.0.1:{port}/json/list");
    for attempt in 0..10 {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        let Ok(response) = reqwest::get(&url).await else {
            continue;
        };
        let Ok(targets) = response.json::<Vec<Value>>().await else {
            continue;
        };
        let page = targets.iter().find_map(|target| {
            (target.get("type").and_then(Value::as_str) == Some("page"))
                .then(|| target.get("webSocketDebuggerUrl").and_then(Value::as_str))
                .flatten()
        });
        if let Some(ws_url) = page {
            return Ok(ws_url.to_string());
        }
    }
    Err(Error::Setup("browser exposed no page target".into()))
}

async fn load_cookies(cdp: &CdpClient, path: &Path) -> Result<()> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "no cookie file; session starts logged out");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    let cookies: Vec<Value> = serde_json::from_slice(&raw)
        .map_err(|e| Error::Setup(format!("cookie file {} is not a JSON array: {e}", path.display())))?;
    tracing::debug!(count = cookies.len(), "loading cookies");
    cdp.set_cookies(cookies).await
}
