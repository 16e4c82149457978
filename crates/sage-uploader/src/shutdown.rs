//! Cooperative shutdown broadcast

use std::sync::Arc;
use tokio::sync::watch;

/// Create a shutdown trigger and the signal observed by workers
pub fn shutdown_channel() -> (Shutdown, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (Shutdown { tx: Arc::new(tx) }, ShutdownSignal { rx })
}

/// Trigger side
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    pub fn trigger(&self) {
        // send_replace succeeds even when every signal has been dropped
        self.tx.send_replace(true);
    }
}

/// Observer side, one clone per task
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Non-blocking check
    pub fn is_set(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown has been triggered (or the trigger is gone)
    pub async fn wait(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}
