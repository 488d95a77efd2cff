use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rpcBatcher::clients::transport::Transport;
use rpcBatcher::config::DispatcherConfig;
use rpcBatcher::models::call::{BatchRequestEntry, BatchResponseEntry, CallDescriptor};
use rpcBatcher::service::dispatcher::Dispatcher;
use rpcBatcher::service::routing::RoutingTable;
use serde_json::{Value, json};
use tokio::time::{Duration, sleep};

/// Echoes every call back, answering in reverse request order.
struct RecordingTransport {
    batches: Mutex<Vec<(String, Vec<BatchRequestEntry>)>>,
}

impl RecordingTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            batches: Mutex::new(Vec::new()),
        })
    }

    fn batches(&self) -> Vec<(String, Vec<BatchRequestEntry>)> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(
        &self,
        url: &str,
        batch: &[BatchRequestEntry],
    ) -> Result<Vec<BatchResponseEntry>, String> {
        self.batches
            .lock()
            .unwrap()
            .push((url.to_string(), batch.to_vec()));
        Ok(batch
            .iter()
            .rev()
            .map(|entry| {
                BatchResponseEntry::value(
                    entry.id,
                    json!({"method": entry.method, "params": entry.params}),
                )
            })
            .collect())
    }
}

fn routes() -> RoutingTable {
    let mut routes = RoutingTable::new();
    routes
        .register_service("cal", "/rpc/cal")
        .register_service("user", "/rpc/user");
    routes
}

fn call(service: &str, method: &str, params: Value) -> CallDescriptor {
    CallDescriptor::new(service, method, params)
}

#[tokio::test(start_paused = true)]
async fn calls_within_one_window_share_a_batch() {
    let transport = RecordingTransport::new();
    let dispatcher = Dispatcher::create(DispatcherConfig::default(), routes(), transport.clone());

    let first = dispatcher.dispatch(call("cal", "list", Value::Null)).unwrap();
    let second = dispatcher.dispatch(call("cal", "get", json!({"id": 5}))).unwrap();
    let third = dispatcher.dispatch(call("cal", "get", json!({"id": 6}))).unwrap();
    assert_eq!((first.id(), second.id(), third.id()), (1, 2, 3));

    let first = first.await.unwrap();
    let second = second.await.unwrap();
    let third = third.await.unwrap();
    assert_eq!(first["method"], "list");
    assert_eq!(second["params"], json!({"id": 5}));
    assert_eq!(third["params"], json!({"id": 6}));

    let batches = transport.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].0, "/rpc/cal");
    let ids: Vec<u64> = batches[0].1.iter().map(|entry| entry.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn later_calls_open_a_new_window() {
    let transport = RecordingTransport::new();
    let dispatcher = Dispatcher::create(DispatcherConfig::default(), routes(), transport.clone());

    let a = dispatcher.dispatch(call("cal", "list", Value::Null)).unwrap();
    let b = dispatcher.dispatch(call("cal", "list", Value::Null)).unwrap();
    a.await.unwrap();
    b.await.unwrap();

    sleep(Duration::from_millis(100)).await;
    let c = dispatcher.dispatch(call("cal", "list", Value::Null)).unwrap();
    c.await.unwrap();

    let batches = transport.batches();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].1.len(), 2);
    assert_eq!(batches[1].1.len(), 1);
    assert_eq!(batches[1].1[0].id, 3);
}

#[tokio::test(start_paused = true)]
async fn each_endpoint_gets_its_own_batch() {
    let transport = RecordingTransport::new();
    let dispatcher = Dispatcher::create(DispatcherConfig::default(), routes(), transport.clone());

    let mut handles = Vec::new();
    for n in 0..3 {
        handles.push(dispatcher.dispatch(call("cal", "get", json!({"n": n}))).unwrap());
    }
    for n in 0..2 {
        handles.push(dispatcher.dispatch(call("user", "get", json!({"n": n}))).unwrap());
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let mut sizes: Vec<(String, usize)> = transport
        .batches()
        .into_iter()
        .map(|(url, batch)| (url, batch.len()))
        .collect();
    sizes.sort();
    assert_eq!(
        sizes,
        vec![("/rpc/cal".to_string(), 3), ("/rpc/user".to_string(), 2)]
    );
}

#[tokio::test(start_paused = true)]
async fn reversed_responses_reach_their_own_callers() {
    let transport = RecordingTransport::new();
    let dispatcher = Dispatcher::create(DispatcherConfig::default(), routes(), transport.clone());

    let list = dispatcher.dispatch(call("cal", "list", Value::Null)).unwrap();
    let get = dispatcher.dispatch(call("cal", "get", json!({"id": 5}))).unwrap();

    let get = get.await.unwrap();
    let list = list.await.unwrap();
    assert_eq!(list, json!({"method": "list", "params": null}));
    assert_eq!(get, json!({"method": "get", "params": {"id": 5}}));
}

#[tokio::test(start_paused = true)]
async fn window_length_follows_config() {
    let transport = RecordingTransport::new();
    let dispatcher = Dispatcher::create(
        DispatcherConfig::with_request_buffer(Duration::from_millis(200)),
        routes(),
        transport.clone(),
    );

    let early = dispatcher.dispatch(call("cal", "list", Value::Null)).unwrap();
    sleep(Duration::from_millis(150)).await;
    assert!(transport.batches().is_empty());
    let late = dispatcher.dispatch(call("cal", "list", Value::Null)).unwrap();

    early.await.unwrap();
    late.await.unwrap();
    let batches = transport.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].1.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn typed_calls_round_trip_params() {
    let transport = RecordingTransport::new();
    let dispatcher = Dispatcher::create(DispatcherConfig::default(), routes(), transport.clone());

    #[derive(serde::Deserialize)]
    struct Echo {
        method: String,
        params: Value,
    }

    let echo: Echo = dispatcher
        .call("user", "rename", &json!({"name": "ada"}))
        .await
        .unwrap();
    assert_eq!(echo.method, "rename");
    assert_eq!(echo.params, json!({"name": "ada"}));

    let stats = dispatcher.stats().await.unwrap();
    assert_eq!(stats.buffered_calls, 0);
    assert_eq!(stats.in_flight_calls, 0);
    assert_eq!(stats.armed_endpoints, 0);
}
