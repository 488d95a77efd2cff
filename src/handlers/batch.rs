use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use warp::Filter;
use warp::path::FullPath;

use crate::models::call::{BatchRequestEntry, BatchResponseEntry, RemoteError};

pub const METHOD_NOT_FOUND: i64 = -32601;
const MAX_BATCH_BYTES: u64 = 1024 * 1024;

pub type HandlerResult = Result<Value, RemoteError>;

#[async_trait]
pub trait CallHandler: Send + Sync {
    async fn handle(&self, params: Value) -> HandlerResult;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> CallHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, params: Value) -> HandlerResult {
        (self.0)(params).await
    }
}

/// Server-side table of `service.method` handlers answering batches.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn CallHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        service: &str,
        method: &str,
        handler: Arc<dyn CallHandler>,
    ) -> &mut Self {
        self.handlers
            .insert(format!("{}.{}", service, method), handler);
        self
    }

    pub fn register_fn<F, Fut>(&mut self, service: &str, method: &str, handler: F) -> &mut Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register(service, method, Arc::new(FnHandler(handler)))
    }

    /// Answers every entry of `batch`, in request order. Unknown methods fail
    /// only their own entry.
    pub async fn execute(&self, batch: Vec<BatchRequestEntry>) -> Vec<BatchResponseEntry> {
        let mut responses = Vec::with_capacity(batch.len());
        for entry in batch {
            let key = format!("{}.{}", entry.service, entry.method);
            let response = match self.handlers.get(&key) {
                Some(handler) => match handler.handle(entry.params).await {
                    Ok(value) => BatchResponseEntry::value(entry.id, value),
                    Err(error) => BatchResponseEntry::error(entry.id, error),
                },
                None => BatchResponseEntry::error(
                    entry.id,
                    RemoteError::with_code(METHOD_NOT_FOUND, format!("Unknown method {}", key)),
                ),
            };
            responses.push(response);
        }
        responses
    }
}

/// `POST /rpc/...` with a JSON batch body.
pub fn batch_filter(
    registry: Arc<HandlerRegistry>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::post()
        .and(warp::path("rpc"))
        .and(warp::path::full())
        .and(warp::body::content_length_limit(MAX_BATCH_BYTES))
        .and(warp::body::json())
        .and(warp::any().map(move || registry.clone()))
        .and_then(handle_batch)
}

async fn handle_batch(
    path: FullPath,
    batch: Vec<BatchRequestEntry>,
    registry: Arc<HandlerRegistry>,
) -> Result<impl warp::Reply, warp::Rejection> {
    tracing::debug!(path = path.as_str(), calls = batch.len(), "received batch");
    let responses = registry.execute(batch).await;
    Ok(warp::reply::json(&responses))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_registry() -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();
        registry.register_fn("echo", "say", |params| async move { Ok::<_, RemoteError>(params) });
        registry.register_fn("echo", "fail", |_| async move {
            Err::<Value, _>(RemoteError::with_code(500, "boom"))
        });
        registry
    }

    fn entry(id: u64, method: &str) -> BatchRequestEntry {
        BatchRequestEntry {
            id,
            service: "echo".to_string(),
            method: method.to_string(),
            params: json!({"n": id}),
        }
    }

    #[tokio::test]
    async fn execute_answers_each_entry_independently() {
        let registry = echo_registry();
        let responses = registry
            .execute(vec![entry(1, "say"), entry(2, "fail"), entry(3, "missing")])
            .await;

        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0], BatchResponseEntry::value(1, json!({"n": 1})));
        assert_eq!(responses[1].error.as_ref().unwrap().code, Some(500));
        assert_eq!(
            responses[2].error.as_ref().unwrap().code,
            Some(METHOD_NOT_FOUND)
        );
    }

    #[tokio::test]
    async fn filter_serves_batches_under_rpc_prefix() {
        let filter = batch_filter(Arc::new(echo_registry()));

        let response = warp::test::request()
            .method("POST")
            .path("/rpc/echo")
            .json(&vec![entry(4, "say")])
            .reply(&filter)
            .await;
        assert_eq!(response.status(), 200);
        let body: Vec<BatchResponseEntry> = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body, vec![BatchResponseEntry::value(4, json!({"n": 4}))]);

        let outside = warp::test::request()
            .method("POST")
            .path("/other")
            .json(&vec![entry(5, "say")])
            .reply(&filter)
            .await;
        assert_eq!(outside.status(), 404);
    }
}
