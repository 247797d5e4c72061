//! Stdout discipline (spec §4.6), grounded in `utils/stdout_guard.py`'s
//! `StdoutGuard` context manager.
//!
//! Rust has no equivalent of reassigning `sys.stdout`: a `tokio::io::stdout`
//! handle and a `tracing` subscriber simply write to different file
//! descriptors, and nothing in the standard library lets arbitrary code
//! accidentally acquire the framer's handle. The invariant this guard
//! encodes is therefore "no code in this binary ever constructs a stdout
//! handle outside the framer" — enforced by discipline, with this type
//! marking the scope in which that discipline applies and idempotently
//! installing the stderr-bound subscriber.

use std::sync::Once;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Installs the global `tracing` subscriber (stderr-bound, level from
/// `ORCH_LOG_LEVEL`, default `info`) exactly once, no matter how many guards
/// are constructed.
pub fn init_logging() {
    INIT.call_once(|| {
        let level = std::env::var("ORCH_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"));
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    });
}

/// Marks the lifetime of a stdio session. Holding one is the contract: while
/// it is alive, stdout belongs exclusively to the frame codec.
pub struct StdoutGuard {
    _private: (),
}

impl StdoutGuard {
    pub fn enter() -> Self {
        init_logging();
        Self { _private: () }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn init_logging_is_idempotent() {
        init_logging();
        init_logging();
    }

    #[test]
    fn guard_enter_does_not_panic() {
        let _guard = StdoutGuard::enter();
    }
}
