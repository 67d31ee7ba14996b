//! Public types for the calendar API
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::models::{CalendarAnalytics, CalendarAvailability, CalendarEvent};

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventsPreset {
    Today,
    Week,
    Upcoming,
}

#[derive(Deserialize)]
pub struct EventsQuery {
    #[serde(rename = "timeMin")]
    pub time_min: Option<DateTime<Utc>>,
    #[serde(rename = "timeMax")]
    pub time_max: Option<DateTime<Utc>>,
    #[serde(rename = "maxResults")]
    pub max_results: Option<u32>,
    pub preset: Option<EventsPreset>,
    /// Number of events for the `upcoming` preset.
    pub count: Option<u32>,
}

#[derive(Serialize)]
pub struct EventsResponse {
    pub events: Vec<CalendarEvent>,
    pub count: usize,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct AvailabilityQuery {
    pub date: Option<NaiveDate>,
    pub days: Option<u32>,
}

#[derive(Serialize)]
pub struct AvailabilityResponse {
    #[serde(flatten)]
    pub availability: CalendarAvailability,
    pub generated_at: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilitySummary {
    pub total_days: u32,
    pub average_free_time: f64,
    pub average_busy_time: f64,
}

#[derive(Serialize)]
pub struct MultiDayAvailabilityResponse {
    pub availabilities: Vec<CalendarAvailability>,
    pub summary: AvailabilitySummary,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyticsPreset {
    Today,
    Week,
    Month,
}

#[derive(Deserialize)]
pub struct AnalyticsQuery {
    #[serde(rename = "startDate")]
    pub start_date: Option<NaiveDate>,
    #[serde(rename = "endDate")]
    pub end_date: Option<NaiveDate>,
    pub preset: Option<AnalyticsPreset>,
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum AnalyticsPeriod {
    Range {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    Label(String),
}

#[derive(Serialize)]
pub struct AnalyticsResponse {
    #[serde(flatten)]
    pub analytics: CalendarAnalytics,
    pub period: AnalyticsPeriod,
    pub generated_at: DateTime<Utc>,
}
