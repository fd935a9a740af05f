//! Cooperative cancellation signal shared between stream consumers and the
//! producers driving model/retrieval calls.
//!
//! Built on `tokio::sync::watch` so producers can both poll the flag between
//! token-generation steps and await a change while suspended.

use tokio::sync::watch;

/// Sender half. Dropping the handle does NOT cancel; call [`CancelHandle::cancel`].
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

/// Receiver half, cloned into producer tasks.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

/// Create a linked cancel handle/token pair.
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

impl CancelHandle {
    /// Signal cancellation to all tokens.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl CancelToken {
    /// Non-blocking check, used between token-generation steps.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Suspend until cancellation is signalled. Resolves immediately if the
    /// handle side was dropped without cancelling (nothing left to wait for).
    pub async fn cancelled(&mut self) {
        if *self.rx.borrow() {
            return;
        }
        while self.rx.changed().await.is_ok() {
            if *self.rx.borrow() {
                return;
            }
        }
    }
}
