//! Error taxonomy (spec §7) for failures surfaced by a single upstream
//! session. The controller maps these straight onto `JsonRpcError` at the
//! point it already has the request context (tool name, method) needed to
//! build a useful message; see `JsonRpcError::upstream_request_failed`.

use thiserror::Error;

/// Errors surfaced by a single upstream session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to spawn upstream process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("upstream transport write failed: {0}")]
    Write(#[source] std::io::Error),

    #[error("failed to capture upstream {0}")]
    Pipe(&'static str),

    #[error("upstream disconnected")]
    Disconnected,

    #[error("request timed out")]
    Timeout,

    #[error("session closed")]
    Closed,
}

impl SessionError {
    /// Only a request timeout (error class 3) is worth a retry; transport
    /// failures and closed sessions are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, SessionError::Timeout)
    }
}
