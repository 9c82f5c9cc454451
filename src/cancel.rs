/*============================================================
  Synavera Project: Syn-Patch
  Module: synpatch_core::cancel
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1
  ------------------------------------------------------------
  Purpose:
    Single-shot cancellation signal threaded from the caller
    through to the build engine call.

  Security / Safety Notes:
    None; in-process signalling only.

  Dependencies:
    tokio::sync::watch.

  Operational Scope:
    Callers create one pair per patch run and keep the handle
    wherever shutdown is decided.

  Revision History:
    2025-11-12 COD  Added cancellation signal.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Cancellation observed before and during engine calls
============================================================*/

use tokio::sync::watch;

/// Trigger side of a cancellation pair.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    sender: std::sync::Arc<watch::Sender<bool>>,
}

/// Observer side; cheap to clone.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    receiver: watch::Receiver<bool>,
}

/// Create a linked handle and signal.
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (sender, receiver) = watch::channel(false);
    (
        CancelHandle {
            sender: std::sync::Arc::new(sender),
        },
        CancelSignal { receiver },
    )
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (handle, signal) = cancel_pair();
        // Receivers outlive a dropped sender; `cancelled` then pends forever.
        drop(handle);
        signal
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolve once cancellation is requested. Pends forever if the
    /// handle is dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        let closed = receiver.wait_for(|cancelled| *cancelled).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }
}
