use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::handlers::batch::{HandlerRegistry, HandlerResult};
use crate::models::calendar::{CalendarEvent, NewCalendarEvent};
use crate::models::call::RemoteError;

pub const CALENDAR_SERVICE: &str = "cal";

const BAD_PARAMS: i64 = 400;
const NOT_FOUND: i64 = 404;

#[derive(Debug, Default, Deserialize)]
struct ListParams {
    #[serde(default)]
    day: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
struct GetParams {
    id: String,
}

/// In-memory calendar served as `cal.list`, `cal.get` and `cal.create`.
#[derive(Default)]
pub struct CalendarStore {
    events: Mutex<HashMap<String, CalendarEvent>>,
}

impl CalendarStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, draft: NewCalendarEvent) -> Result<CalendarEvent, RemoteError> {
        if draft.title.trim().is_empty() {
            return Err(RemoteError::with_code(BAD_PARAMS, "Event title is empty"));
        }
        if draft.end_time < draft.start_time {
            return Err(RemoteError::with_code(
                BAD_PARAMS,
                "Event ends before it starts",
            ));
        }
        let event = CalendarEvent::create(draft);
        let mut events = self.events.lock().await;
        events.insert(event.id.clone(), event.clone());
        Ok(event)
    }

    pub async fn list(&self, day: Option<NaiveDate>) -> Vec<CalendarEvent> {
        let events = self.events.lock().await;
        let mut matching: Vec<CalendarEvent> = events
            .values()
            .filter(|event| day.is_none_or(|day| event.overlaps_day(day)))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));
        matching
    }

    pub async fn get(&self, id: &str) -> Option<CalendarEvent> {
        let events = self.events.lock().await;
        events.get(id).cloned()
    }

    async fn handle_list(&self, params: Value) -> HandlerResult {
        let params: ListParams = if params.is_null() {
            ListParams::default()
        } else {
            parse_params(params)?
        };
        to_value(self.list(params.day).await)
    }

    async fn handle_get(&self, params: Value) -> HandlerResult {
        let params: GetParams = parse_params(params)?;
        match self.get(&params.id).await {
            Some(event) => to_value(event),
            None => Err(RemoteError::with_code(
                NOT_FOUND,
                format!("No event with id {}", params.id),
            )),
        }
    }

    async fn handle_create(&self, params: Value) -> HandlerResult {
        let draft: NewCalendarEvent = parse_params(params)?;
        to_value(self.insert(draft).await?)
    }
}

pub fn register_calendar_handlers(registry: &mut HandlerRegistry, store: Arc<CalendarStore>) {
    let list_store = store.clone();
    registry.register_fn(CALENDAR_SERVICE, "list", move |params| {
        let store = list_store.clone();
        async move { store.handle_list(params).await }
    });
    let get_store = store.clone();
    registry.register_fn(CALENDAR_SERVICE, "get", move |params| {
        let store = get_store.clone();
        async move { store.handle_get(params).await }
    });
    registry.register_fn(CALENDAR_SERVICE, "create", move |params| {
        let store = store.clone();
        async move { store.handle_create(params).await }
    });
}

fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, RemoteError> {
    serde_json::from_value(params)
        .map_err(|e| RemoteError::with_code(BAD_PARAMS, format!("Invalid params: {}", e)))
}

fn to_value<T: serde::Serialize>(value: T) -> HandlerResult {
    serde_json::to_value(value)
        .map_err(|e| RemoteError::new(format!("Failed to encode result: {}", e)))
}
