//! Process-wide shutdown coordination.
//!
//! The guard moves through `Armed -> Triggered -> Draining -> Exited`. Every
//! long-lived task receives a child of the guard's cancellation token at
//! construction, so triggering the guard stops listeners, the cache watch
//! loop and the metrics server at their own blocking points.


use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ShutdownState {
    Armed = 0,
    Triggered = 1,
    Draining = 2,
    Exited = 3,
}

impl ShutdownState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ShutdownState::Armed,
            1 => ShutdownState::Triggered,
            2 => ShutdownState::Draining,
            _ => ShutdownState::Exited,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShutdownGuard {
    token: CancellationToken,
    state: Arc<AtomicU8>,
}

impl Default for ShutdownGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownGuard {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            state: Arc::new(AtomicU8::new(ShutdownState::Armed as u8)),
        }
    }

    /// Token cancelled once the guard triggers. Hand a child to each task.
    pub fn token(&self) -> CancellationToken {
        self.token.child_token()
    }

    pub fn state(&self) -> ShutdownState {
        ShutdownState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Triggers the guard. Returns `false` if it was already triggered.
    pub fn shutdown(&self) -> bool {
        let first = self
            .state
            .compare_exchange(
                ShutdownState::Armed as u8,
                ShutdownState::Triggered as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        if first {
            info!("shutdown triggered");
            self.token.cancel();
        }
        first
    }

    /// Blocks until the guard triggers.
    pub async fn wait(&self) {
        self.token.cancelled().await
    }

    pub fn mark_draining(&self) {
        self.advance(ShutdownState::Draining);
    }

    pub fn mark_exited(&self) {
        self.advance(ShutdownState::Exited);
    }

    fn advance(
        &self,
        next: ShutdownState,
    ) {
        let _ = self
            .state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current < next as u8).then_some(next as u8)
            });
    }

    /// Triggers the guard on SIGINT, SIGTERM or Ctrl+C.
    pub fn listen_for_signals(&self) -> JoinHandle<()> {
        let guard = self.clone();
        tokio::spawn(async move {
            if let Err(e) = guard.wait_for_signal().await {
                error!("failed to install signal handlers: {:?}", e);
                guard.shutdown();
            }
        })
    }

    async fn wait_for_signal(&self) -> Result<()> {
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = sigint.recv() => {
                info!("SIGINT detected.");
            },
            _ = sigterm.recv() => {
                info!("SIGTERM detected.");
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C detected.");
            },
            _ = self.token.cancelled() => {
                return Ok(());
            },
        }
        self.shutdown();
        Ok(())
    }
}
