//! Cooperative cancellation shared by the scheduler, encoders, and benchmark.
//!
//! A [`CancelHandle`] flips a `watch` channel once; every [`CancelSignal`]
//! clone observes the flip. Cancellation is one-way.

use log::warn;
use std::sync::Arc;
use tokio::sync::watch;

/// Sending side; cancels every associated [`CancelSignal`].
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

/// Receiving side, cheap to clone into each worker.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
    // Held only by `never()` signals so the channel stays open
    _keepalive: Option<Arc<watch::Sender<bool>>>,
}

/// Creates a connected handle/signal pair.
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (
        CancelHandle { tx: Arc::new(tx) },
        CancelSignal {
            rx,
            _keepalive: None,
        },
    )
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// A new signal observing this handle
    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
            _keepalive: None,
        }
    }
}

impl CancelSignal {
    /// A signal that is never cancelled
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            rx,
            _keepalive: Some(Arc::new(tx)),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested.
    ///
    /// If the handle is dropped without cancelling, this never resolves.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Cancels `handle` when the process receives Ctrl-C.
pub fn cancel_on_ctrl_c(handle: CancelHandle) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling outstanding work");
            handle.cancel();
        }
    })
}
