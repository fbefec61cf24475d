//! Per-call orchestration: validate, acquire, invoke, release, map.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};

use crate::config::{CallPolicy, Config};
use crate::error::{Error, ErrorKind, Result};
use crate::formatter;
use crate::operations::{DomainOperations, DomainOutcome, DomainRequest};
use crate::protocol::{JsonRpcNotification, ToolCallParams, ToolCallResult};
use crate::session::{SessionFactory, SessionScope};
use crate::tools::ToolRegistry;

/// Producer for intermediate frames on a streamed response.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    tx: mpsc::Sender<JsonRpcNotification>,
    token: Value,
}

impl ProgressSink {
    /// Create a sink that tags every notification with `token`.
    pub fn new(tx: mpsc::Sender<JsonRpcNotification>, token: Value) -> Self {
        Self { tx, token }
    }

    /// Push a progress notification; dropped if the consumer is gone or lagging.
    pub fn notify(&self, progress: u32, total: u32, message: &str) {
        let notification = JsonRpcNotification::new(
            "notifications/progress",
            json!({
                "progressToken": self.token,
                "progress": progress,
                "total": total,
                "message": message,
            }),
        );
        if self.tx.try_send(notification).is_err() {
            tracing::trace!("progress notification dropped");
        }
    }
}

/// Runs tool calls against fresh automation sessions.
pub struct ActionOrchestrator {
    registry: Arc<ToolRegistry>,
    sessions: Arc<dyn SessionFactory>,
    operations: Arc<dyn DomainOperations>,
    call_timeout: Duration,
    account_lock: Option<Arc<Mutex<()>>>,
}

impl ActionOrchestrator {
    /// Create an orchestrator.
    pub fn new(
        registry: Arc<ToolRegistry>,
        sessions: Arc<dyn SessionFactory>,
        operations: Arc<dyn DomainOperations>,
        config: &Config,
    ) -> Self {
        let account_lock = match config.call_policy {
            CallPolicy::Concurrent => None,
            CallPolicy::Serialized => Some(Arc::new(Mutex::new(()))),
        };
        Self {
            registry,
            sessions,
            operations,
            call_timeout: config.call_timeout,
            account_lock,
        }
    }

    /// The tool registry used for validation.
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Handle a `tools/call`.
    ///
    /// Usage, setup and operation failures come back as a tool result with
    /// `is_error` set. `Err` is reserved for internal faults, which the
    /// dispatcher reports as protocol errors.
    pub async fn call_tool(
        &self,
        params: ToolCallParams,
        progress: Option<&ProgressSink>,
    ) -> Result<ToolCallResult> {
        let request = match self.registry.prepare(&params.name, &params.arguments) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(tool = %params.name, error = %e, "rejected tool call");
                return Ok(formatter::failure(&params.name, &e));
            }
        };

        match self.perform(request, progress).await {
            Ok(outcome) => Ok(formatter::tool_result(&params.name, Ok(outcome))),
            Err(e) if e.kind() == ErrorKind::Internal => Err(e),
            Err(e) => Ok(formatter::failure(&params.name, &e)),
        }
    }

    /// Run one validated request in its own session.
    pub async fn perform(
        &self,
        request: DomainRequest,
        progress: Option<&ProgressSink>,
    ) -> Result<DomainOutcome> {
        let tool = request.tool_name();
        let account = match &self.account_lock {
            Some(lock) => Some(lock.clone().lock_owned().await),
            None => None,
        };

        if let Some(progress) = progress {
            progress.notify(0, 2, "starting automation session");
        }
        let mut scope = SessionScope::acquire(self.sessions.as_ref()).await.map_err(|e| {
            tracing::error!(tool, error = %e, "could not start automation session");
            e
        })?;
        // The account stays locked until the session is closed, even when
        // this call is abandoned and the close runs in the background.
        if let Some(account) = account {
            scope.hold(account);
        }

        if let Some(progress) = progress {
            progress.notify(1, 2, "running");
        }
        tracing::info!(tool, session = scope.session().id(), "invoking domain operation");
        let started = Instant::now();
        let invocation = request.invoke(self.operations.as_ref(), scope.session());
        let outcome = AssertUnwindSafe(tokio::time::timeout(self.call_timeout, invocation))
            .catch_unwind()
            .await;
        scope.release().await;

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::Timeout(self.call_timeout)),
            Err(panic) => Err(Error::Internal(format!(
                "{tool} panicked: {}",
                panic_message(panic.as_ref())
            ))),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => tracing::info!(tool, elapsed_ms, "domain operation finished"),
            Err(e) => tracing::warn!(tool, elapsed_ms, error = %e, "domain operation failed"),
        }
        if let Some(progress) = progress {
            progress.notify(2, 2, "finished");
        }
        result
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
