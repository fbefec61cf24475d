//! Automation sessions and their per-call scope.
//!
//! A session is one browser context that lives for exactly one domain
//! operation. [`SessionScope`] owns it for the duration of the call and
//! guarantees a single release on every exit path: explicit release after the
//! operation, or a background release when the scope is dropped early because
//! the caller went away or the operation panicked. A lock handed to the scope
//! is only let go once that release has finished.

use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::OwnedMutexGuard;

use crate::error::{Error, Result};

/// Primitive page operations the domain layer is written against.
#[async_trait::async_trait]
pub trait AutomationSession: Send + Sync {
    /// Identifier used in logs.
    fn id(&self) -> &str;

    /// Navigate the page and wait for it to load.
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Evaluate a JavaScript expression and return its JSON value.
    async fn evaluate(&self, expression: &str) -> Result<Value>;

    /// Whether an element matches `selector` right now.
    async fn exists(&self, selector: &str) -> Result<bool>;

    /// Click the first element matching `selector`.
    async fn click(&self, selector: &str) -> Result<()>;

    /// Focus the element matching `selector` and insert `text`.
    async fn type_text(&self, selector: &str, text: &str) -> Result<()>;

    /// Attach local files to a file input.
    async fn set_files(&self, selector: &str, paths: &[PathBuf]) -> Result<()>;

    /// Tear the session down. Called exactly once by [`SessionScope`].
    async fn close(self: Box<Self>) -> Result<()>;

    /// Poll until `selector` matches or `timeout` elapses.
    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.exists(selector).await? {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::Operation(format!(
                    "element `{selector}` did not appear within {}s",
                    timeout.as_secs()
                )));
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }
}

/// Creates fresh, unshared automation sessions.
#[async_trait::async_trait]
pub trait SessionFactory: Send + Sync {
    /// Start a new session. Failures are reported as [`Error::Setup`].
    async fn open(&self) -> Result<Box<dyn AutomationSession>>;
}

/// Scoped ownership of one session for one call.
pub struct SessionScope {
    session: Option<Box<dyn AutomationSession>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl SessionScope {
    /// Acquire a fresh session from `factory`.
    pub async fn acquire(factory: &dyn SessionFactory) -> Result<Self> {
        let session = factory.open().await.map_err(|e| match e {
            Error::Setup(_) => e,
            other => Error::Setup(other.to_string()),
        })?;
        tracing::debug!(session = session.id(), "automation session acquired");
        Ok(Self {
            session: Some(session),
            guard: None,
        })
    }

    /// Keep `guard` locked until the session has been closed.
    pub fn hold(&mut self, guard: OwnedMutexGuard<()>) {
        self.guard = Some(guard);
    }

    /// The owned session.
    pub fn session(&self) -> &dyn AutomationSession {
        self.session
            .as_deref()
            .expect("session is present until the scope is released")
    }

    /// Release the session now and wait for teardown to finish.
    pub async fn release(mut self) {
        if let Some(session) = self.session.take() {
            close_session(session, self.guard.take()).await;
        }
    }
}

impl Drop for SessionScope {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!(session = session.id(), "releasing abandoned session");
                handle.spawn(close_session(session, self.guard.take()));
            }
            Err(_) => {
                tracing::warn!(
                    session = session.id(),
                    "no runtime to release session; browser process is killed on drop"
                );
            }
        }
    }
}

async fn close_session(session: Box<dyn AutomationSession>, guard: Option<OwnedMutexGuard<()>>) {
    let id = session.id().to_string();
    match session.close().await {
        Ok(()) => tracing::debug!(session = %id, "automation session released"),
        Err(e) => tracing::warn!(session = %id, error = %e, "session release reported an error"),
    }
    drop(guard);
}
