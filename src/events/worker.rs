use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::sleep;

use crate::clients::transport::Transport;
use crate::error::DispatchError;
use crate::events::queue::{DispatcherEvent, DispatcherStats, WeakEventBus};
use crate::models::call::{BatchResponseEntry, CallId, PendingCall, TransactionId};

/// Calls for one URL waiting for their window to close.
struct EndpointBuffer {
    window: u64,
    call_ids: Vec<CallId>,
    timer: JoinHandle<()>,
}

struct InFlightBatch {
    url: String,
    call_ids: Vec<CallId>,
    task: JoinHandle<()>,
    send: AbortHandle,
}

pub struct DispatchWorker {
    calls: BTreeMap<CallId, PendingCall>,
    endpoints: HashMap<String, EndpointBuffer>,
    in_flight: HashMap<TransactionId, InFlightBatch>,
    next_transaction_id: TransactionId,
    next_window: u64,
    request_buffer: Duration,
    transport: Arc<dyn Transport>,
    events: WeakEventBus,
}

impl DispatchWorker {
    pub fn new(request_buffer: Duration, transport: Arc<dyn Transport>, events: WeakEventBus) -> Self {
        Self {
            calls: BTreeMap::new(),
            endpoints: HashMap::new(),
            in_flight: HashMap::new(),
            next_transaction_id: 1,
            next_window: 1,
            request_buffer,
            transport,
            events,
        }
    }

    fn register(&mut self, call: PendingCall) {
        let id = call.id;
        let url = call.url.clone();
        tracing::trace!(call_id = id, %url, service = %call.service, method = %call.method, "registered call");
        self.calls.insert(id, call);

        match self.endpoints.entry(url) {
            Entry::Occupied(mut buffer) => buffer.get_mut().call_ids.push(id),
            Entry::Vacant(slot) => {
                let window = self.next_window;
                self.next_window += 1;
                let timer = arm_buffer_timer(
                    self.events.clone(),
                    slot.key().clone(),
                    window,
                    self.request_buffer,
                );
                slot.insert(EndpointBuffer {
                    window,
                    call_ids: vec![id],
                    timer,
                });
            }
        }
    }

    fn cancel(&mut self, id: CallId) {
        let Some(call) = self.calls.get(&id) else {
            return;
        };
        if call.is_flushed() {
            // Already on the wire; the batch result for it is dropped on arrival.
            tracing::debug!(call_id = id, transaction_id = call.transaction_id, "cancelled after flush");
            return;
        }
        if let Some(call) = self.calls.remove(&id) {
            if let Some(buffer) = self.endpoints.get_mut(&call.url) {
                buffer.call_ids.retain(|buffered| *buffered != id);
            }
            tracing::debug!(call_id = id, url = %call.url, "cancelled before flush");
        }
    }

    fn flush(&mut self, url: String, window: u64) {
        let Some(buffer) = self.endpoints.remove(&url) else {
            return;
        };
        if buffer.window != window {
            self.endpoints.insert(url, buffer);
            return;
        }

        let call_ids: Vec<CallId> = buffer
            .call_ids
            .into_iter()
            .filter(|id| self.calls.get(id).is_some_and(|call| !call.is_flushed()))
            .collect();
        if call_ids.is_empty() {
            tracing::debug!(%url, "buffer window closed empty, nothing to send");
            return;
        }

        let transaction_id = self.next_transaction_id;
        self.next_transaction_id += 1;

        let mut batch = Vec::with_capacity(call_ids.len());
        for id in &call_ids {
            if let Some(call) = self.calls.get_mut(id) {
                call.transaction_id = transaction_id;
                batch.push(call.to_request_entry());
            }
        }

        tracing::info!(%url, transaction_id, calls = batch.len(), "flushing batch");
        let transport = self.transport.clone();
        let events = self.events.clone();
        let target = url.clone();
        // A panicking transport still has to finish its batch.
        let send = tokio::spawn(async move { transport.send(&target, &batch).await });
        let send_abort = send.abort_handle();
        let task = tokio::spawn(async move {
            let outcome = match send.await {
                Ok(outcome) => outcome,
                Err(err) => Err(format!("transport task failed: {}", err)),
            };
            events.emit(DispatcherEvent::BatchFinished {
                transaction_id,
                outcome,
            });
        });

        self.in_flight.insert(
            transaction_id,
            InFlightBatch {
                url,
                call_ids,
                task,
                send: send_abort,
            },
        );
    }

    fn finish_batch(
        &mut self,
        transaction_id: TransactionId,
        outcome: Result<Vec<BatchResponseEntry>, String>,
    ) {
        let Some(batch) = self.in_flight.remove(&transaction_id) else {
            tracing::warn!(transaction_id, "result for unknown transaction");
            return;
        };

        match outcome {
            Ok(entries) => {
                let mut by_id: HashMap<CallId, BatchResponseEntry> =
                    HashMap::with_capacity(entries.len());
                for entry in entries {
                    match by_id.entry(entry.id) {
                        Entry::Occupied(_) => {
                            tracing::warn!(transaction_id, call_id = entry.id, "duplicate result ignored");
                        }
                        Entry::Vacant(slot) => {
                            slot.insert(entry);
                        }
                    }
                }

                for id in &batch.call_ids {
                    let Some(call) = self.calls.remove(id) else {
                        continue;
                    };
                    let result = match by_id.remove(id) {
                        Some(entry) => entry.into_result(),
                        None => Err(DispatchError::MissingResponse {
                            transaction_id,
                            call_id: *id,
                        }),
                    };
                    if !call.complete(result) {
                        tracing::debug!(call_id = id, "caller stopped waiting");
                    }
                }

                if !by_id.is_empty() {
                    let mut stray: Vec<CallId> = by_id.into_keys().collect();
                    stray.sort_unstable();
                    tracing::warn!(transaction_id, url = %batch.url, ?stray, "results for calls outside the batch");
                }
                tracing::debug!(transaction_id, url = %batch.url, calls = batch.call_ids.len(), "batch completed");
            }
            Err(cause) => {
                tracing::warn!(transaction_id, url = %batch.url, %cause, "batch failed");
                for id in &batch.call_ids {
                    if let Some(call) = self.calls.remove(id) {
                        call.reject(DispatchError::Transport {
                            transaction_id,
                            cause: cause.clone(),
                        });
                    }
                }
            }
        }
    }

    fn stats(&self) -> DispatcherStats {
        let buffered_calls = self.calls.values().filter(|call| !call.is_flushed()).count();
        DispatcherStats {
            buffered_calls,
            in_flight_calls: self.calls.len() - buffered_calls,
            armed_endpoints: self.endpoints.len(),
            in_flight_batches: self.in_flight.len(),
        }
    }

    fn teardown(&mut self) {
        for (_, buffer) in self.endpoints.drain() {
            buffer.timer.abort();
        }
        for (_, batch) in self.in_flight.drain() {
            batch.send.abort();
            batch.task.abort();
        }
        let calls = std::mem::take(&mut self.calls);
        if !calls.is_empty() {
            tracing::info!(calls = calls.len(), "rejecting unfinished calls on shutdown");
        }
        for (_, call) in calls {
            call.reject(DispatchError::Shutdown);
        }
    }
}

fn arm_buffer_timer(
    events: WeakEventBus,
    url: String,
    window: u64,
    delay: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        sleep(delay).await;
        events.emit(DispatcherEvent::BufferElapsed { url, window });
    })
}

pub async fn run_dispatch_worker(
    mut rx: mpsc::UnboundedReceiver<DispatcherEvent>,
    mut worker: DispatchWorker,
) {
    while let Some(event) = rx.recv().await {
        match event {
            DispatcherEvent::Register(call) => worker.register(call),
            DispatcherEvent::Cancel { id } => worker.cancel(id),
            DispatcherEvent::BufferElapsed { url, window } => worker.flush(url, window),
            DispatcherEvent::BatchFinished {
                transaction_id,
                outcome,
            } => worker.finish_batch(transaction_id, outcome),
            DispatcherEvent::Stats { reply } => {
                let _ = reply.send(worker.stats());
            }
            DispatcherEvent::Shutdown { done } => {
                rx.close();
                worker.teardown();
                while let Ok(event) = rx.try_recv() {
                    if let DispatcherEvent::Register(call) = event {
                        call.reject(DispatchError::Shutdown);
                    }
                }
                let _ = done.send(());
                return;
            }
        }
    }
    worker.teardown();
}
