//! Minimal Chrome DevTools Protocol client over WebSocket.
//!
//! One reader task dispatches command responses by id; one writer task owns
//! the sink. Events are not consumed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::error::{Error, Result};

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;

/// Upper bound for a single CDP round trip.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// A CDP connection to one page target.
pub struct CdpClient {
    ws_tx: mpsc::Sender<String>,
    pending: Pending,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl CdpClient {
    /// Connect to a target's `webSocketDebuggerUrl`.
    pub async fn connect(ws_url: &str) -> Result<Self> {
        let (stream, _) = connect_async(ws_url)
            .await
            .map_err(|e| Error::Browser(format!("failed to connect to {ws_url}: {e}")))?;
        let (mut sink, mut source) = stream.split();

        let (ws_tx, mut ws_rx) = mpsc::channel::<String>(64);
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));

        let writer = tokio::spawn(async move {
            while let Some(text) = ws_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(text)).await {
                    tracing::warn!(error = %e, "CDP write failed");
                    break;
                }
            }
        });

        let responses = pending.clone();
        let reader = tokio::spawn(async move {
            while let Some(message) = source.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        let Ok(value) = serde_json::from_str::<Value>(&text) else {
                            continue;
                        };
                        if let Some(id) = value.get("id").and_then(Value::as_u64) {
                            if let Some(tx) = responses.lock().await.remove(&id) {
                                let _ = tx.send(value);
                            }
                        }
                    }
                    Ok(Message::Close(_)) => {
                        tracing::debug!("CDP connection closed by browser");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "CDP read failed");
                        break;
                    }
                    _ => {}
                }
            }
            // Wake up everyone still waiting.
            responses.lock().await.clear();
        });

        Ok(Self {
            ws_tx,
            pending,
            next_id: AtomicU64::new(1),
            reader,
            writer,
        })
    }

    /// Send a command and wait for its `result`.
    pub async fn send_command(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let message = json!({ "id": id, "method": method, "params": params });
        if self.ws_tx.send(message.to_string()).await.is_err() {
            self.pending.lock().await.remove(&id);
            return Err(Error::Browser(format!("{method}: connection closed")));
        }

        match tokio::time::timeout(COMMAND_TIMEOUT, rx).await {
            Ok(Ok(response)) => match response.get("error") {
                Some(error) => Err(Error::Browser(format!("{method}: {error}"))),
                None => Ok(response.get("result").cloned().unwrap_or(Value::Null)),
            },
            Ok(Err(_)) => Err(Error::Browser(format!("{method}: connection closed"))),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(Error::Browser(format!(
                    "{method}: no response after {}s",
                    COMMAND_TIMEOUT.as_secs()
                )))
            }
        }
    }

    /// Enable a domain such as `Page` or `Network`.
    pub async fn enable_domain(&self, domain: &str) -> Result<()> {
        self.send_command(&format!("{domain}.enable"), json!({}))
            .await?;
        Ok(())
    }

    /// Evaluate an expression, awaiting promises, and return the remote object.
    pub async fn evaluate(&self, expression: &str) -> Result<Value> {
        let result = self
            .send_command(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;

        if let Some(details) = result.get("exceptionDetails") {
            let text = details
                .pointer("/exception/description")
                .or_else(|| details.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("unknown exception");
            return Err(Error::Browser(format!("script failed: {text}")));
        }
        Ok(result
            .pointer("/result/value")
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Node id of the first match for `selector`, if any.
    pub async fn query_selector(&self, selector: &str) -> Result<Option<i64>> {
        let document = self
            .send_command("DOM.getDocument", json!({ "depth": 0 }))
            .await?;
        let root = document
            .pointer("/root/nodeId")
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::Browser("DOM.getDocument returned no root".into()))?;

        let found = self
            .send_command(
                "DOM.querySelector",
                json!({ "nodeId": root, "selector": selector }),
            )
            .await?;
        Ok(found
            .get("nodeId")
            .and_then(Value::as_i64)
            .filter(|&id| id != 0))
    }

    /// Attach files to the file input `node_id`.
    pub async fn set_file_input_files(&self, node_id: i64, files: Vec<String>) -> Result<()> {
        self.send_command(
            "DOM.setFileInputFiles",
            json!({ "files": files, "nodeId": node_id }),
        )
        .await?;
        Ok(())
    }

    /// Insert text at the focused element.
    pub async fn insert_text(&self, text: &str) -> Result<()> {
        self.send_command("Input.insertText", json!({ "text": text }))
            .await?;
        Ok(())
    }

    /// Install cookies (CDP `CookieParam` objects).
    pub async fn set_cookies(&self, cookies: Vec<Value>) -> Result<()> {
        self.send_command("Network.setCookies", json!({ "cookies": cookies }))
            .await?;
        Ok(())
    }
}

impl Drop for CdpClient {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}
