//! Upstream session: one per configured upstream server (spec §4.2).
//!
//! Owns the child process's stdin/stdout, a background reader task, a
//! monotonically increasing request-id counter, and a pending-request table.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::BufReader;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::UpstreamServer;
use crate::error::SessionError;
use crate::frame::{self, Frame};
use crate::protocol::{Envelope, JsonRpcId, JsonRpcRequest};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_RETRIES: u32 = 0;

type Waiter = oneshot::Sender<Result<Envelope, SessionError>>;

struct Running {
    child: Child,
    stdin: Mutex<ChildStdin>,
    next_id: AtomicI64,
    pending: Arc<Mutex<HashMap<i64, Waiter>>>,
    reader_task: JoinHandle<()>,
}

enum State {
    NotStarted,
    Running(Box<Running>),
    Closed,
}

/// One live (or not-yet-started) connection to an upstream MCP server.
pub struct UpstreamSession {
    pub id: String,
    cfg: UpstreamServer,
    state: Mutex<State>,
}

impl UpstreamSession {
    pub fn new(cfg: UpstreamServer) -> Self {
        Self {
            id: cfg.id.clone(),
            cfg,
            state: Mutex::new(State::NotStarted),
        }
    }

    pub fn include_tools(&self) -> Option<&[String]> {
        self.cfg.include_tools.as_deref()
    }

    pub fn exclude_tools(&self) -> Option<&[String]> {
        self.cfg.exclude_tools.as_deref()
    }

    /// Idempotent: spawns the child process and reader task on first call.
    pub async fn start(&self) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        if matches!(*state, State::Running(_)) {
            return Ok(());
        }
        if matches!(*state, State::Closed) {
            return Err(SessionError::Closed);
        }

        let mut command = Command::new(&self.cfg.command[0]);
        command
            .args(&self.cfg.command[1..])
            .envs(&self.cfg.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(SessionError::Spawn)?;
        let stdin = child.stdin.take().ok_or(SessionError::Pipe("stdin"))?;
        let stdout = child.stdout.take().ok_or(SessionError::Pipe("stdout"))?;
        let stderr = child.stderr.take();

        let pending: Arc<Mutex<HashMap<i64, Waiter>>> = Arc::new(Mutex::new(HashMap::new()));
        let upstream_id = self.id.clone();

        if let Some(stderr) = stderr {
            let upstream_id = upstream_id.clone();
            tokio::spawn(async move {
                use tokio::io::AsyncBufReadExt;
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(upstream = %upstream_id, "stderr: {line}");
                }
            });
        }

        let reader_task = spawn_reader(upstream_id, BufReader::new(stdout), pending.clone());

        *state = State::Running(Box::new(Running {
            child,
            stdin: Mutex::new(stdin),
            next_id: AtomicI64::new(1),
            pending,
            reader_task,
        }));
        Ok(())
    }

    /// Sends `initialize` with empty params and returns the raw envelope.
    pub async fn initialize(&self) -> Result<Envelope, SessionError> {
        self.send("initialize", Some(serde_json::json!({})), DEFAULT_TIMEOUT, DEFAULT_RETRIES)
            .await
    }

    /// Correlated request/response with timeout and timeout-triggered retry.
    ///
    /// Each retry allocates a fresh id (spec §4.2): a late reply for an
    /// earlier, abandoned id is simply dropped by the reader task. Only a
    /// timeout is transient; any other error stops the retry immediately.
    pub async fn send(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
        retries: u32,
    ) -> Result<Envelope, SessionError> {
        self.start().await?;

        use tokio_retry::strategy::ExponentialBackoff;
        use tokio_retry::Retry;

        // 2^n * 50ms = 100, 200, 400, 800, ..., capped at 1s.
        let retry_strategy = ExponentialBackoff::from_millis(2).factor(50).max_delay(Duration::from_secs(1)).take(retries as usize);

        Retry::start(retry_strategy, || async {
            let result = self.send_once(method, params.clone(), timeout).await;
            match &result {
                Ok(_) => Ok(result),
                Err(e) if e.is_transient() => {
                    warn!(upstream = %self.id, method, "request timed out, retrying");
                    Err(result)
                }
                Err(_) => Ok(result),
            }
        })
        .await
        .unwrap_or_else(|e| e)
    }

    async fn send_once(&self, method: &str, params: Option<Value>, timeout: Duration) -> Result<Envelope, SessionError> {
        let state = self.state.lock().await;
        let running = match &*state {
            State::Running(r) => r,
            State::Closed => return Err(SessionError::Closed),
            State::NotStarted => return Err(SessionError::Disconnected),
        };

        let id = running.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        // Register before writing: spec invariant, required so a reply
        // arriving immediately after flush is never missed.
        running.pending.lock().await.insert(id, tx);

        let request = JsonRpcRequest::new(JsonRpcId::Number(id), method, params);
        let value = match serde_json::to_value(&request) {
            Ok(v) => v,
            Err(e) => {
                running.pending.lock().await.remove(&id);
                return Err(SessionError::Write(std::io::Error::other(e.to_string())));
            }
        };

        let write_result = {
            let mut stdin = running.stdin.lock().await;
            frame::write_message(&mut *stdin, &value).await
        };
        if let Err(e) = write_result {
            running.pending.lock().await.remove(&id);
            return Err(SessionError::Write(std::io::Error::new(std::io::ErrorKind::BrokenPipe, e.to_string())));
        }
        drop(state);

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SessionError::Disconnected),
            Err(_) => {
                // Never deliver late: remove our own waiter before returning.
                if let State::Running(running) = &*self.state.lock().await {
                    running.pending.lock().await.remove(&id);
                }
                Err(SessionError::Timeout)
            }
        }
    }

    /// Cancels the reader task, fails all outstanding waiters, releases the
    /// transport. Idempotent.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        let running = match std::mem::replace(&mut *state, State::Closed) {
            State::Running(r) => r,
            _ => return,
        };
        running.reader_task.abort();
        let mut pending = running.pending.lock().await;
        for (_, waiter) in pending.drain() {
            let _ = waiter.send(Err(SessionError::Closed));
        }
        drop(pending);
        drop(running.stdin);
        let mut child = running.child;
        let _ = child.start_kill();
    }
}

fn spawn_reader(
    upstream_id: String,
    mut reader: BufReader<tokio::process::ChildStdout>,
    pending: Arc<Mutex<HashMap<i64, Waiter>>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match frame::read_message(&mut reader).await {
                Ok(Frame::Message(value)) => dispatch(&upstream_id, &pending, value).await,
                Ok(Frame::Closed) => {
                    debug!(upstream = %upstream_id, "upstream closed stdout");
                    break;
                }
                Err(e) => {
                    warn!(upstream = %upstream_id, error = %e, "fatal frame error, ending reader");
                    break;
                }
            }
        }
        let mut pending = pending.lock().await;
        for (_, waiter) in pending.drain() {
            let _ = waiter.send(Err(SessionError::Disconnected));
        }
    })
}

async fn dispatch(upstream_id: &str, pending: &Arc<Mutex<HashMap<i64, Waiter>>>, value: Value) {
    let Some(obj) = value.as_object() else {
        warn!(upstream = %upstream_id, "dropping non-object frame");
        return;
    };
    let has_result_or_error = obj.contains_key("result") || obj.contains_key("error");
    let id = obj.get("id").and_then(|v| v.as_i64());
    let (Some(id), true) = (id, has_result_or_error) else {
        debug!(upstream = %upstream_id, "dropping frame without id or result/error");
        return;
    };

    let waiter = pending.lock().await.remove(&id);
    match waiter {
        Some(waiter) => {
            let envelope = Envelope::from_response(obj.get("result").cloned(), obj.get("error").cloned());
            let _ = waiter.send(Ok(envelope));
        }
        None => {
            debug!(upstream = %upstream_id, id, "dropping frame for unknown or late id");
        }
    }
}
