use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rpcBatcher::clients::transport::Transport;
use rpcBatcher::config::DispatcherConfig;
use rpcBatcher::models::call::{BatchRequestEntry, BatchResponseEntry, CallDescriptor};
use rpcBatcher::service::dispatcher::Dispatcher;
use rpcBatcher::service::routing::RoutingTable;
use serde_json::{Value, json};
use tokio::sync::oneshot;
use tokio::time::{Duration, sleep};

type Reply = oneshot::Sender<Result<Vec<BatchResponseEntry>, String>>;

/// Holds every batch until the test answers it.
struct GatedTransport {
    waiting: Mutex<Vec<(Vec<BatchRequestEntry>, Reply)>>,
}

impl GatedTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            waiting: Mutex::new(Vec::new()),
        })
    }

    fn take(&self) -> Vec<(Vec<BatchRequestEntry>, Reply)> {
        std::mem::take(&mut *self.waiting.lock().unwrap())
    }
}

#[async_trait]
impl Transport for GatedTransport {
    async fn send(
        &self,
        _url: &str,
        batch: &[BatchRequestEntry],
    ) -> Result<Vec<BatchResponseEntry>, String> {
        let (tx, rx) = oneshot::channel();
        self.waiting.lock().unwrap().push((batch.to_vec(), tx));
        rx.await.unwrap_or_else(|_| Err("gate dropped".to_string()))
    }
}

fn answer(batch: &[BatchRequestEntry], tag: &str) -> Vec<BatchResponseEntry> {
    batch
        .iter()
        .map(|entry| BatchResponseEntry::value(entry.id, json!({"id": entry.id, "tag": tag})))
        .collect()
}

fn dispatcher(transport: Arc<GatedTransport>) -> Dispatcher {
    let mut routes = RoutingTable::new();
    routes.register_service("cal", "/rpc/cal");
    Dispatcher::create(DispatcherConfig::default(), routes, transport)
}

#[tokio::test(start_paused = true)]
async fn dispatch_during_flight_opens_second_batch() {
    let transport = GatedTransport::new();
    let dispatcher = dispatcher(transport.clone());

    let first = dispatcher
        .dispatch(CallDescriptor::new("cal", "list", Value::Null))
        .unwrap();
    sleep(Duration::from_millis(25)).await;

    let second = dispatcher
        .dispatch(CallDescriptor::new("cal", "list", Value::Null))
        .unwrap();
    sleep(Duration::from_millis(25)).await;

    let stats = dispatcher.stats().await.unwrap();
    assert_eq!(stats.in_flight_batches, 2);
    assert_eq!(stats.in_flight_calls, 2);

    let mut waiting = transport.take();
    assert_eq!(waiting.len(), 2);
    let (second_batch, second_reply) = waiting.pop().unwrap();
    let (first_batch, first_reply) = waiting.pop().unwrap();
    assert_eq!(first_batch[0].id, 1);
    assert_eq!(second_batch[0].id, 2);

    // Answer the later transaction first.
    second_reply.send(Ok(answer(&second_batch, "second"))).unwrap();
    let second = second.await.unwrap();
    assert_eq!(second, json!({"id": 2, "tag": "second"}));

    first_reply.send(Ok(answer(&first_batch, "first"))).unwrap();
    let first = first.await.unwrap();
    assert_eq!(first, json!({"id": 1, "tag": "first"}));
}

#[tokio::test(start_paused = true)]
async fn results_are_matched_by_id_not_position() {
    let transport = GatedTransport::new();
    let dispatcher = dispatcher(transport.clone());

    let handles: Vec<_> = (0..4)
        .map(|n| {
            dispatcher
                .dispatch(CallDescriptor::new("cal", "get", json!({"n": n})))
                .unwrap()
        })
        .collect();
    sleep(Duration::from_millis(25)).await;

    let (batch, reply) = transport.take().pop().unwrap();
    assert_eq!(batch.len(), 4);
    let shuffled: Vec<BatchResponseEntry> = [3usize, 0, 2, 1]
        .iter()
        .map(|idx| {
            let entry = &batch[*idx];
            BatchResponseEntry::value(entry.id, entry.params.clone())
        })
        .collect();
    reply.send(Ok(shuffled)).unwrap();

    for (n, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.await.unwrap(), json!({"n": n}));
    }
}
