//! Canonical calendar data model shared by the gateway, the
//! availability engine, and the API surface. Wire names match the
//! Google Calendar v3 shapes the client consumes.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Either a precise instant or an all-day date. At least one of
/// `date_time`/`date` is set on every normalized event.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EventDateTime {
    #[serde(rename = "dateTime", skip_serializing_if = "Option::is_none")]
    pub date_time: Option<DateTime<FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(rename = "timeZone", skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl EventDateTime {
    pub fn at_instant(date_time: DateTime<FixedOffset>) -> Self {
        Self {
            date_time: Some(date_time),
            date: None,
            time_zone: None,
        }
    }

    pub fn all_day(date: NaiveDate) -> Self {
        Self {
            date_time: None,
            date: Some(date),
            time_zone: None,
        }
    }

    pub fn is_all_day(&self) -> bool {
        self.date_time.is_none() && self.date.is_some()
    }

    /// Resolve to an instant for ordering and window comparisons.
    /// All-day dates resolve to midnight in the viewing zone.
    pub fn instant_in(&self, tz: Tz) -> Option<DateTime<Utc>> {
        if let Some(dt) = self.date_time {
            return Some(dt.with_timezone(&Utc));
        }
        let date = self.date?;
        tz.from_local_datetime(&date.and_time(NaiveTime::MIN))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttendeeResponseStatus {
    NeedsAction,
    Declined,
    Tentative,
    Accepted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attendee {
    pub email: String,
    #[serde(rename = "displayName", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(rename = "responseStatus", skip_serializing_if = "Option::is_none")]
    pub response_status: Option<AttendeeResponseStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Confirmed,
    Tentative,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventActor {
    pub email: String,
    #[serde(rename = "displayName", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConferenceSolution {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConferenceEntryPoint {
    #[serde(rename = "entryPointType")]
    pub entry_point_type: String,
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConferenceData {
    #[serde(rename = "conferenceSolution", skip_serializing_if = "Option::is_none")]
    pub conference_solution: Option<ConferenceSolution>,
    #[serde(rename = "entryPoints", skip_serializing_if = "Option::is_none")]
    pub entry_points: Option<Vec<ConferenceEntryPoint>>,
}

/// One normalized calendar entry. `summary` is never empty; the
/// gateway substitutes a placeholder when the provider omits it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start: EventDateTime,
    pub end: EventDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendees: Option<Vec<Attendee>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<EventActor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organizer: Option<EventActor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<EventStatus>,
    pub recurring: bool,
    #[serde(rename = "recurringEventId", skip_serializing_if = "Option::is_none")]
    pub recurring_event_id: Option<String>,
    #[serde(rename = "hangoutLink", skip_serializing_if = "Option::is_none")]
    pub hangout_link: Option<String>,
    #[serde(rename = "conferenceData", skip_serializing_if = "Option::is_none")]
    pub conference_data: Option<ConferenceData>,
}

impl CalendarEvent {
    /// Duration in fractional minutes when both endpoints are precise
    /// instants. All-day events have no duration.
    pub fn duration_minutes(&self) -> Option<f64> {
        let start = self.start.date_time?;
        let end = self.end.date_time?;
        Some((end - start).num_seconds() as f64 / 60.0)
    }

    pub fn is_virtual(&self) -> bool {
        self.hangout_link.is_some() || self.conference_data.is_some()
    }
}

/// A contiguous free or busy interval. `duration` is fractional
/// minutes and always equals `end - start`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilitySlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration: f64,
}

impl AvailabilitySlot {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            duration: (end - start).num_seconds() as f64 / 60.0,
        }
    }
}

/// Working-hours window interpreted as wall-clock times in the
/// viewing user's zone. Serialized as "HH:MM" strings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorkingHours {
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
}

impl WorkingHours {
    pub fn duration_minutes(&self) -> f64 {
        (self.end - self.start).num_seconds() as f64 / 60.0
    }

    pub fn duration_hours(&self) -> f64 {
        self.duration_minutes() / 60.0
    }
}

impl Default for WorkingHours {
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        }
    }
}

mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&raw, "%H:%M").map_err(Error::custom)
    }
}

/// Free/busy partition of one working day. Both slot lists are
/// chronological and non-overlapping; free and busy coverage together
/// span the working-hours window exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarAvailability {
    pub date: NaiveDate,
    pub free_slots: Vec<AvailabilitySlot>,
    pub busy_slots: Vec<AvailabilitySlot>,
    pub total_free_time: f64,
    pub total_busy_time: f64,
    pub working_hours: WorkingHours,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendeeStats {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub meeting_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingTypes {
    pub in_person: u32,
    pub r#virtual: u32,
    pub unknown: u32,
}

/// Aggregate meeting-load statistics over an event window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarAnalytics {
    pub total_events: u32,
    pub total_meeting_hours: f64,
    /// Minutes, averaged over every event in the window.
    pub average_meeting_length: f64,
    pub busy_hours_today: f64,
    pub free_hours_today: f64,
    pub upcoming_events: Vec<CalendarEvent>,
    pub meetings_by_day: std::collections::BTreeMap<String, u32>,
    pub top_attendees: Vec<AttendeeStats>,
    pub meeting_types: MeetingTypes,
}
