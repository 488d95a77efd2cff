use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Parameters accepted by `cal.create`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NewCalendarEvent {
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub description: Option<String>,
}

impl CalendarEvent {
    pub fn create(draft: NewCalendarEvent) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: draft.title,
            start_time: draft.start_time,
            end_time: draft.end_time,
            description: draft.description,
        }
    }

    // Day boundaries are UTC; an event ending exactly at midnight does not spill over.
    pub fn overlaps_day(&self, day: NaiveDate) -> bool {
        let Some(day_start) = day.and_hms_opt(0, 0, 0) else {
            return false;
        };
        let day_start = day_start.and_utc();
        let day_end = day_start + Duration::days(1);
        if self.start_time == self.end_time {
            return self.start_time >= day_start && self.start_time < day_end;
        }
        self.start_time < day_end && self.end_time > day_start
    }
}
