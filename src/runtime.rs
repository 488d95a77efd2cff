use std::net::SocketAddr;
use std::sync::Arc;

use crate::clients::transport::HttpTransport;
use crate::config::{AppConfig, DEFAULT_BASE_URL, DispatcherConfig};
use crate::handlers::batch::{HandlerRegistry, batch_filter};
use crate::models::call::{CallDescriptor, CallResult};
use crate::service::calendar_service::{CALENDAR_SERVICE, CalendarStore, register_calendar_handlers};
use crate::service::dispatcher::Dispatcher;
use crate::service::routing::RoutingTable;

pub const DEFAULT_CALENDAR_URL: &str = "/rpc/cal";

/// Routes from `RPC_ROUTES_FILE`, or every `cal` method on `/rpc/cal`.
pub fn load_routes(config: &AppConfig) -> Result<RoutingTable, String> {
    match config.get_prop("RPC_ROUTES_FILE") {
        Some(path) => {
            let routes = RoutingTable::from_config(&AppConfig::from_file(&path)?)?;
            if routes.is_empty() {
                return Err(format!("No routes defined in {}", path));
            }
            Ok(routes)
        }
        None => {
            let mut routes = RoutingTable::new();
            routes.register_service(CALENDAR_SERVICE, DEFAULT_CALENDAR_URL);
            Ok(routes)
        }
    }
}

pub fn build_dispatcher(config: &AppConfig) -> Result<Dispatcher, String> {
    let dispatcher_config = DispatcherConfig::from_app_config(config)?;
    let routes = load_routes(config)?;
    let base_url = config
        .get_prop("RPC_BASE_URL")
        .unwrap_or(DEFAULT_BASE_URL.to_string());
    tracing::debug!(%base_url, "using http transport");
    let transport = Arc::new(HttpTransport::new(&base_url));
    Ok(Dispatcher::create(dispatcher_config, routes, transport))
}

pub fn calendar_registry(store: Arc<CalendarStore>) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    register_calendar_handlers(&mut registry, store);
    registry
}

pub async fn run_server(addr: SocketAddr, store: Arc<CalendarStore>) {
    let routes = batch_filter(Arc::new(calendar_registry(store)));
    tracing::info!(%addr, "serving rpc batches");
    warp::serve(routes).run(addr).await;
}

/// Dispatches every call before awaiting any of them, so calls sharing an
/// endpoint go out in one batch. Results come back in argument order.
pub async fn run_calls(
    dispatcher: &Dispatcher,
    calls: Vec<CallDescriptor>,
) -> Vec<(String, CallResult)> {
    let mut pending = Vec::with_capacity(calls.len());
    for call in calls {
        let route = call.route_key();
        pending.push((route, dispatcher.dispatch(call)));
    }

    let mut results = Vec::with_capacity(pending.len());
    for (route, handle) in pending {
        let result = match handle {
            Ok(handle) => handle.await,
            Err(err) => Err(err),
        };
        results.push((route, result));
    }
    results
}
