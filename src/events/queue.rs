use tokio::sync::{mpsc, oneshot};

use crate::models::call::{BatchResponseEntry, CallId, PendingCall, TransactionId};

/// Everything the dispatch worker reacts to. All registry mutation happens
/// while handling one of these, on the worker task.
#[derive(Debug)]
pub enum DispatcherEvent {
    Register(PendingCall),
    Cancel {
        id: CallId,
    },
    BufferElapsed {
        url: String,
        window: u64,
    },
    BatchFinished {
        transaction_id: TransactionId,
        outcome: Result<Vec<BatchResponseEntry>, String>,
    },
    Stats {
        reply: oneshot::Sender<DispatcherStats>,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatcherStats {
    /// Registered and not yet sent.
    pub buffered_calls: usize,
    /// Sent, waiting on their batch response.
    pub in_flight_calls: usize,
    pub armed_endpoints: usize,
    pub in_flight_batches: usize,
}

#[derive(Clone)]
pub struct EventBus {
    tx: mpsc::UnboundedSender<DispatcherEvent>,
}

impl EventBus {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DispatcherEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Returns false once the worker is gone.
    pub fn emit(&self, event: DispatcherEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn downgrade(&self) -> WeakEventBus {
        WeakEventBus {
            tx: self.tx.downgrade(),
        }
    }
}

/// Handle for timer and network tasks; it never keeps the worker alive.
#[derive(Clone)]
pub struct WeakEventBus {
    tx: mpsc::WeakUnboundedSender<DispatcherEvent>,
}

impl WeakEventBus {
    pub fn emit(&self, event: DispatcherEvent) -> bool {
        match self.tx.upgrade() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }
}
