use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::json;

use crate::error::DispatchError;
use crate::models::calendar::{CalendarEvent, NewCalendarEvent};
use crate::service::calendar_service::CALENDAR_SERVICE;
use crate::service::dispatcher::Dispatcher;

#[async_trait]
pub trait CalendarClient: Send + Sync {
    async fn get_events_for_day(&self, day: NaiveDate) -> Result<Vec<CalendarEvent>, DispatchError>;
    async fn get_event(&self, id: &str) -> Result<CalendarEvent, DispatchError>;
    async fn create_event(&self, event: NewCalendarEvent) -> Result<CalendarEvent, DispatchError>;
}

/// Calendar calls made through the batching dispatcher, so lookups issued
/// together travel in one request.
pub struct RpcCalendarClient {
    dispatcher: Arc<Dispatcher>,
}

impl RpcCalendarClient {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl CalendarClient for RpcCalendarClient {
    async fn get_events_for_day(&self, day: NaiveDate) -> Result<Vec<CalendarEvent>, DispatchError> {
        self.dispatcher
            .call(CALENDAR_SERVICE, "list", &json!({ "day": day }))
            .await
    }

    async fn get_event(&self, id: &str) -> Result<CalendarEvent, DispatchError> {
        self.dispatcher
            .call(CALENDAR_SERVICE, "get", &json!({ "id": id }))
            .await
    }

    async fn create_event(&self, event: NewCalendarEvent) -> Result<CalendarEvent, DispatchError> {
        self.dispatcher.call(CALENDAR_SERVICE, "create", &event).await
    }
}
