//! Restart signal shared by one generation of control loops
//!
//! Watch registrations cannot change while a loop runs, so any change to the
//! set of definitions or their dependency types is handled by cancelling the
//! whole generation and bootstrapping a new one.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::{debug, info};

/// One-shot, idempotent "restart requested" flag
#[derive(Debug, Clone, Default)]
pub struct RestartSignal {
    token: CancellationToken,
    requested: Arc<AtomicBool>,
}

impl RestartSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a restart; only the first request is logged
    pub fn request(&self, reason: &str) {
        if self.requested.swap(true, Ordering::SeqCst) {
            debug!(reason, "Restart already requested");
        } else {
            info!(reason, "Restart requested");
        }
        self.token.cancel();
    }

    /// Whether a restart has been requested
    pub fn is_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token cancelled when a restart is requested
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Future resolving once a restart is requested
    pub fn requested(&self) -> WaitForCancellationFutureOwned {
        self.token.clone().cancelled_owned()
    }
}
