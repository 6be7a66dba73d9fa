//! Graceful shutdown support via atomic flags

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

/// Cloneable cancellation flag shared between the orchestrator and its workers.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Set the flag, returning whether it was already set (for double-signal handling)
    pub fn swap_cancel(&self) -> bool {
        self.0.swap(true, Ordering::Relaxed)
    }
}

/// Global shutdown token, set by the SIGTERM/SIGINT handler
static SHUTDOWN: LazyLock<CancelToken> = LazyLock::new(CancelToken::new);

/// Handle on the process-wide shutdown token
pub fn shutdown_token() -> CancelToken {
    SHUTDOWN.clone()
}

/// Check if shutdown was requested
pub fn is_shutdown_requested() -> bool {
    SHUTDOWN.is_cancelled()
}

/// Request shutdown (for signal handlers)
pub fn request_shutdown() {
    SHUTDOWN.cancel();
}
