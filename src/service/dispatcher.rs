//! Client side of the batched RPC protocol.
//!
//! [`Dispatcher::dispatch`] registers a call and hands back a [`CallHandle`].
//! Calls routed to the same URL within one buffering window are sent together
//! as a single batch; every handle still resolves with only its own result.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::clients::transport::Transport;
use crate::config::DispatcherConfig;
use crate::error::DispatchError;
use crate::events::queue::{DispatcherEvent, DispatcherStats, EventBus};
use crate::events::worker::{DispatchWorker, run_dispatch_worker};
use crate::models::call::{CallDescriptor, CallId, CallResult, PendingCall};
use crate::service::routing::RoutingTable;

pub struct Dispatcher {
    routes: Arc<RoutingTable>,
    bus: EventBus,
    next_call_id: Mutex<CallId>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Spawns the dispatch worker on the current tokio runtime.
    pub fn create(
        config: DispatcherConfig,
        routes: RoutingTable,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let (bus, rx) = EventBus::new();
        let worker = DispatchWorker::new(config.request_buffer, transport, bus.downgrade());
        let handle = tokio::spawn(run_dispatch_worker(rx, worker));
        tracing::debug!(request_buffer = ?config.request_buffer, "dispatcher started");
        Self {
            routes: Arc::new(routes),
            bus,
            next_call_id: Mutex::new(1),
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Registers `call` for the next batch to its endpoint. Unroutable calls
    /// fail here and never reach the buffer.
    pub fn dispatch(&self, call: CallDescriptor) -> Result<CallHandle, DispatchError> {
        let Some(url) = self.routes.resolve(&call.service, &call.method) else {
            return Err(DispatchError::Routing {
                service: call.service,
                method: call.method,
            });
        };
        let url = url.to_string();
        let (responder, receiver) = oneshot::channel();

        // Ids are handed out under the same lock that queues the registration,
        // so the worker sees them in increasing order.
        let mut next_call_id = self
            .next_call_id
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let id = *next_call_id;
        if !self
            .bus
            .emit(DispatcherEvent::Register(PendingCall::new(id, call, url, responder)))
        {
            return Err(DispatchError::Shutdown);
        }
        *next_call_id += 1;
        drop(next_call_id);

        Ok(CallHandle {
            id,
            receiver,
            bus: self.bus.clone(),
            finished: false,
        })
    }

    /// Typed wrapper around [`Dispatcher::dispatch`].
    pub async fn call<P, T>(&self, service: &str, method: &str, params: &P) -> Result<T, DispatchError>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let params =
            serde_json::to_value(params).map_err(|e| DispatchError::Codec(e.to_string()))?;
        let value = self
            .dispatch(CallDescriptor::new(service, method, params))?
            .await?;
        serde_json::from_value(value).map_err(|e| DispatchError::Codec(e.to_string()))
    }

    pub async fn stats(&self) -> Result<DispatcherStats, DispatchError> {
        let (reply, rx) = oneshot::channel();
        if !self.bus.emit(DispatcherEvent::Stats { reply }) {
            return Err(DispatchError::Shutdown);
        }
        rx.await.map_err(|_| DispatchError::Shutdown)
    }

    /// Rejects every unfinished call with [`DispatchError::Shutdown`] and stops
    /// the worker. Later dispatches fail with the same error.
    pub async fn shutdown(&self) {
        let (done, rx) = oneshot::channel();
        if self.bus.emit(DispatcherEvent::Shutdown { done }) {
            let _ = rx.await;
        }
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = worker {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "dispatch worker ended abnormally");
            }
        }
        tracing::debug!("dispatcher stopped");
    }
}

/// Pending result of one dispatched call.
///
/// Dropping an unfinished handle cancels the call: before its batch is sent it
/// is removed from the buffer, afterwards its result is discarded.
#[must_use = "dropping a CallHandle cancels the call"]
pub struct CallHandle {
    id: CallId,
    receiver: oneshot::Receiver<CallResult>,
    bus: EventBus,
    finished: bool,
}

impl CallHandle {
    pub fn id(&self) -> CallId {
        self.id
    }

    /// Consuming the handle sends the cancellation.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Future for CallHandle {
    type Output = CallResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(result) => {
                this.finished = true;
                Poll::Ready(result.unwrap_or(Err(DispatchError::Shutdown)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for CallHandle {
    fn drop(&mut self) {
        if !self.finished {
            self.bus.emit(DispatcherEvent::Cancel { id: self.id });
        }
    }
}
