//! Google Calendar v3 gateway. Fetches raw events for a time window,
//! normalizes provider shapes into [`CalendarEvent`], and classifies
//! credential failures so callers can trigger re-authentication.

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use chrono_tz::Tz;
use http::StatusCode;
use serde::Deserialize;
use thiserror::Error;

use super::models::{
    Attendee, AttendeeResponseStatus, CalendarEvent, ConferenceData, ConferenceEntryPoint,
    ConferenceSolution, EventActor, EventDateTime, EventStatus,
};
use super::time_window::{today_bounds, week_bounds, yesterday_bounds};

/// Provider-side default page size.
pub const DEFAULT_MAX_RESULTS: u32 = 250;

const NO_TITLE: &str = "No title";

#[derive(Debug, Error)]
pub enum CalendarError {
    /// The calendar credential is expired or invalid. Surfaced as 401
    /// so the client can re-authenticate.
    #[error("Authentication expired - Please sign in again")]
    Unauthorized,
    #[error("Failed to fetch calendar events")]
    Fetch(#[source] anyhow::Error),
}

/// Provider error bodies do not carry a stable machine-readable code
/// for expired credentials, so match the known message fragments.
fn is_credential_error(body: &str) -> bool {
    let body = body.to_lowercase();
    [
        "invalid_grant",
        "invalid authentication credentials",
        "expected oauth 2 access token",
        "authentication credential",
    ]
    .iter()
    .any(|fragment| body.contains(fragment))
}

/// The calendar read interface. `fetch_events` is the single
/// primitive; the derived queries are pure compositions of it with
/// the time-window helpers and exist so the assembler and routes
/// share one vocabulary.
#[async_trait]
pub trait CalendarGateway: Send + Sync {
    /// Fetch events overlapping `[time_min, time_max)`, ascending by
    /// start time, at most `max_results`. Callers supply the
    /// reference instant as the lower bound.
    async fn fetch_events(
        &self,
        time_min: DateTime<Utc>,
        time_max: Option<DateTime<Utc>>,
        max_results: u32,
    ) -> Result<Vec<CalendarEvent>, CalendarError>;

    async fn events_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, CalendarError> {
        self.fetch_events(start, Some(end), DEFAULT_MAX_RESULTS)
            .await
    }

    async fn yesterdays_events(
        &self,
        now: DateTime<Utc>,
        tz: Tz,
    ) -> Result<Vec<CalendarEvent>, CalendarError> {
        let (start, end) = yesterday_bounds(now, tz);
        self.events_between(start, end).await
    }

    async fn todays_events(
        &self,
        now: DateTime<Utc>,
        tz: Tz,
    ) -> Result<Vec<CalendarEvent>, CalendarError> {
        let (start, end) = today_bounds(now, tz);
        self.events_between(start, end).await
    }

    async fn this_weeks_events(
        &self,
        now: DateTime<Utc>,
        tz: Tz,
    ) -> Result<Vec<CalendarEvent>, CalendarError> {
        let (start, end) = week_bounds(now, tz);
        self.events_between(start, end).await
    }

    /// The next `count` events starting at or after `now`. The
    /// provider window already begins at `now`, but in-progress
    /// events still come back from it, so filter before truncating.
    async fn upcoming_events(
        &self,
        now: DateTime<Utc>,
        tz: Tz,
        count: u32,
    ) -> Result<Vec<CalendarEvent>, CalendarError> {
        let events = self.fetch_events(now, None, count).await?;
        Ok(events
            .into_iter()
            .filter(|event| {
                event
                    .start
                    .instant_in(tz)
                    .is_some_and(|start| start >= now)
            })
            .take(count as usize)
            .collect())
    }
}

/// REST client for the primary calendar of the authenticated user.
pub struct GoogleCalendarClient {
    http: reqwest::Client,
    api_hostname: String,
    access_token: String,
}

impl GoogleCalendarClient {
    pub fn new(api_hostname: &str, access_token: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_hostname: api_hostname.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
        }
    }
}

#[async_trait]
impl CalendarGateway for GoogleCalendarClient {
    async fn fetch_events(
        &self,
        time_min: DateTime<Utc>,
        time_max: Option<DateTime<Utc>>,
        max_results: u32,
    ) -> Result<Vec<CalendarEvent>, CalendarError> {
        let url = format!(
            "{}/calendar/v3/calendars/primary/events",
            self.api_hostname
        );

        let mut query: Vec<(&str, String)> = vec![
            ("timeMin", time_min.to_rfc3339()),
            ("maxResults", max_results.to_string()),
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
        ];
        if let Some(time_max) = time_max {
            query.push(("timeMax", time_max.to_rfc3339()));
        }

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(&query)
            .send()
            .await
            .map_err(|e| CalendarError::Fetch(e.into()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status == StatusCode::UNAUTHORIZED || is_credential_error(&body) {
                return Err(CalendarError::Unauthorized);
            }
            return Err(CalendarError::Fetch(anyhow!(
                "calendar API returned {status}: {body}"
            )));
        }

        let list: EventsListResponse = response
            .json()
            .await
            .map_err(|e| CalendarError::Fetch(e.into()))?;

        // Provider returns events ascending by start time
        // (orderBy=startTime). Items without an id or without a usable
        // start/end are dropped here so the engine never sees them.
        Ok(list
            .items
            .into_iter()
            .flatten()
            .filter_map(format_event)
            .collect())
    }
}

// Raw provider shapes. Only the fields the normalization consumes.

#[derive(Deserialize)]
struct EventsListResponse {
    items: Option<Vec<RawEvent>>,
}

#[derive(Deserialize, Default)]
struct RawEventDateTime {
    #[serde(rename = "dateTime")]
    date_time: Option<DateTime<FixedOffset>>,
    date: Option<NaiveDate>,
    #[serde(rename = "timeZone")]
    time_zone: Option<String>,
}

#[derive(Deserialize)]
struct RawAttendee {
    email: Option<String>,
    #[serde(rename = "displayName")]
    display_name: Option<String>,
    #[serde(rename = "responseStatus")]
    response_status: Option<String>,
}

#[derive(Deserialize)]
struct RawActor {
    email: Option<String>,
    #[serde(rename = "displayName")]
    display_name: Option<String>,
}

#[derive(Deserialize)]
struct RawConferenceSolution {
    name: Option<String>,
}

#[derive(Deserialize)]
struct RawEntryPoint {
    #[serde(rename = "entryPointType")]
    entry_point_type: Option<String>,
    uri: Option<String>,
    label: Option<String>,
}

#[derive(Deserialize)]
struct RawConferenceData {
    #[serde(rename = "conferenceSolution")]
    conference_solution: Option<RawConferenceSolution>,
    #[serde(rename = "entryPoints")]
    entry_points: Option<Vec<RawEntryPoint>>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawEvent {
    id: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    start: Option<RawEventDateTime>,
    end: Option<RawEventDateTime>,
    location: Option<String>,
    attendees: Option<Vec<RawAttendee>>,
    creator: Option<RawActor>,
    organizer: Option<RawActor>,
    status: Option<String>,
    #[serde(rename = "recurringEventId")]
    recurring_event_id: Option<String>,
    #[serde(rename = "hangoutLink")]
    hangout_link: Option<String>,
    #[serde(rename = "conferenceData")]
    conference_data: Option<RawConferenceData>,
}

fn format_date_time(raw: Option<RawEventDateTime>) -> Option<EventDateTime> {
    let raw = raw?;
    if raw.date_time.is_none() && raw.date.is_none() {
        return None;
    }
    Some(EventDateTime {
        date_time: raw.date_time,
        date: raw.date,
        time_zone: raw.time_zone,
    })
}

fn format_status(raw: Option<String>) -> Option<EventStatus> {
    match raw.as_deref() {
        Some("confirmed") => Some(EventStatus::Confirmed),
        Some("tentative") => Some(EventStatus::Tentative),
        Some("cancelled") => Some(EventStatus::Cancelled),
        _ => None,
    }
}

fn format_response_status(raw: Option<String>) -> Option<AttendeeResponseStatus> {
    match raw.as_deref() {
        Some("needsAction") => Some(AttendeeResponseStatus::NeedsAction),
        Some("declined") => Some(AttendeeResponseStatus::Declined),
        Some("tentative") => Some(AttendeeResponseStatus::Tentative),
        Some("accepted") => Some(AttendeeResponseStatus::Accepted),
        _ => None,
    }
}

fn format_actor(raw: Option<RawActor>) -> Option<EventActor> {
    let raw = raw?;
    Some(EventActor {
        email: raw.email?,
        display_name: raw.display_name,
    })
}

/// Normalize one raw provider event. Returns `None` for entries that
/// violate the canonical invariants (no id, or an endpoint carrying
/// neither a date-time nor a date).
fn format_event(raw: RawEvent) -> Option<CalendarEvent> {
    let id = raw.id?;
    let start = format_date_time(raw.start)?;
    let end = format_date_time(raw.end)?;

    let attendees = raw.attendees.map(|attendees| {
        attendees
            .into_iter()
            .filter_map(|attendee| {
                Some(Attendee {
                    email: attendee.email?,
                    display_name: attendee.display_name,
                    response_status: format_response_status(attendee.response_status),
                })
            })
            .collect::<Vec<_>>()
    });

    let conference_data = raw.conference_data.map(|data| ConferenceData {
        conference_solution: data
            .conference_solution
            .and_then(|solution| solution.name)
            .map(|name| ConferenceSolution { name }),
        entry_points: data.entry_points.map(|entries| {
            entries
                .into_iter()
                .map(|entry| ConferenceEntryPoint {
                    entry_point_type: entry.entry_point_type.unwrap_or_default(),
                    uri: entry.uri.unwrap_or_default(),
                    label: entry.label,
                })
                .collect()
        }),
    });

    Some(CalendarEvent {
        id,
        summary: raw.summary.unwrap_or_else(|| NO_TITLE.to_string()),
        description: raw.description,
        start,
        end,
        location: raw.location,
        attendees,
        creator: format_actor(raw.creator),
        organizer: format_actor(raw.organizer),
        status: format_status(raw.status),
        recurring: raw.recurring_event_id.is_some(),
        recurring_event_id: raw.recurring_event_id,
        hangout_link: raw.hangout_link,
        conference_data,
    })
}
