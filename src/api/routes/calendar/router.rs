//! Router for the calendar API

use std::sync::{Arc, RwLock};

use axum::{
    Router,
    extract::State,
    response::{IntoResponse, Json, Response},
    routing::get,
};
use axum_extra::extract::Query;
use chrono::{Duration, Utc};
use http::HeaderMap;

use super::public;
use crate::api::public::{ApiError, bearer_token, check_admission, user_identifier};
use crate::api::state::AppState;
use crate::calendar::gcal::{CalendarGateway, GoogleCalendarClient};
use crate::calendar::time_window::{
    day_bounds, local_date, month_bounds, today_bounds, week_bounds, working_hours_bounds,
};
use crate::calendar::{compute_analytics, compute_availability};
use crate::core::AppConfig;

type SharedState = Arc<RwLock<AppState>>;

const DEFAULT_EVENTS_MAX_RESULTS: u32 = 50;
const DEFAULT_UPCOMING_COUNT: u32 = 10;
const ANALYTICS_UPCOMING_COUNT: u32 = 5;

/// Snapshot config and run the admission check shared by every
/// calendar handler.
fn admit(
    state: &SharedState,
    headers: &HeaderMap,
) -> Result<(AppConfig, String), ApiError> {
    let token = bearer_token(headers)?;
    let (config, gate) = {
        let shared_state = state.read().expect("Unable to read shared state");
        (shared_state.config.clone(), shared_state.calendar_gate.clone())
    };
    check_admission(gate.as_ref(), &user_identifier(headers))?;
    Ok((config, token))
}

/// List events for a time window or one of the query presets.
async fn events_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(params): Query<public::EventsQuery>,
) -> Result<Json<public::EventsResponse>, ApiError> {
    let (config, token) = admit(&state, &headers)?;
    let now = Utc::now();
    let tz = config.timezone;
    let client = GoogleCalendarClient::new(&config.google_api_hostname, &token);

    let events = match params.preset {
        Some(public::EventsPreset::Today) => client.todays_events(now, tz).await,
        Some(public::EventsPreset::Week) => client.this_weeks_events(now, tz).await,
        Some(public::EventsPreset::Upcoming) => {
            let count = params.count.unwrap_or(DEFAULT_UPCOMING_COUNT);
            client.upcoming_events(now, tz, count).await
        }
        None => {
            client
                .fetch_events(
                    params.time_min.unwrap_or(now),
                    params.time_max,
                    params.max_results.unwrap_or(DEFAULT_EVENTS_MAX_RESULTS),
                )
                .await
        }
    }
    .map_err(ApiError::from_calendar)?;

    Ok(Json(public::EventsResponse {
        count: events.len(),
        events,
        fetched_at: now,
    }))
}

/// Free/busy partition for one day or a run of consecutive days.
async fn availability_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(params): Query<public::AvailabilityQuery>,
) -> Result<Response, ApiError> {
    let (config, token) = admit(&state, &headers)?;
    let now = Utc::now();
    let tz = config.timezone;
    let client = GoogleCalendarClient::new(&config.google_api_hostname, &token);

    let target_date = params.date.unwrap_or_else(|| local_date(now, tz));
    let days = params.days.unwrap_or(1);

    if days <= 1 {
        let (work_start, work_end) =
            working_hours_bounds(target_date, &config.working_hours, tz);
        let events = client
            .events_between(work_start, work_end)
            .await
            .map_err(ApiError::from_calendar)?;
        let availability =
            compute_availability(target_date, &events, &config.working_hours, tz);

        return Ok(Json(public::AvailabilityResponse {
            availability,
            generated_at: now,
        })
        .into_response());
    }

    let mut availabilities = Vec::with_capacity(days as usize);
    for offset in 0..days {
        let date = target_date + Duration::days(offset as i64);
        let (work_start, work_end) = working_hours_bounds(date, &config.working_hours, tz);
        let events = client
            .events_between(work_start, work_end)
            .await
            .map_err(ApiError::from_calendar)?;
        availabilities.push(compute_availability(date, &events, &config.working_hours, tz));
    }

    let total_free: f64 = availabilities.iter().map(|day| day.total_free_time).sum();
    let total_busy: f64 = availabilities.iter().map(|day| day.total_busy_time).sum();
    let summary = public::AvailabilitySummary {
        total_days: days,
        average_free_time: total_free / days as f64,
        average_busy_time: total_busy / days as f64,
    };

    Ok(Json(public::MultiDayAvailabilityResponse {
        availabilities,
        summary,
        generated_at: now,
    })
    .into_response())
}

/// Meeting-load analytics for an explicit range, a preset window, or
/// the default week.
async fn analytics_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(params): Query<public::AnalyticsQuery>,
) -> Result<Json<public::AnalyticsResponse>, ApiError> {
    let (config, token) = admit(&state, &headers)?;
    let now = Utc::now();
    let tz = config.timezone;
    let client = GoogleCalendarClient::new(&config.google_api_hostname, &token);

    let range = match (params.start_date, params.end_date, params.preset) {
        (Some(start), Some(end), _) => {
            Some((day_bounds(start, tz).0, day_bounds(end, tz).0))
        }
        (_, _, Some(public::AnalyticsPreset::Today)) => Some(today_bounds(now, tz)),
        (_, _, Some(public::AnalyticsPreset::Week)) => Some(week_bounds(now, tz)),
        (_, _, Some(public::AnalyticsPreset::Month)) => Some(month_bounds(now, tz)),
        _ => None,
    };

    let today = local_date(now, tz);
    let (work_start, work_end) = working_hours_bounds(today, &config.working_hours, tz);

    let (window_events, working_day_events, upcoming) = tokio::join!(
        async {
            match range {
                Some((start, end)) => client.events_between(start, end).await,
                None => client.this_weeks_events(now, tz).await,
            }
        },
        client.events_between(work_start, work_end),
        client.upcoming_events(now, tz, ANALYTICS_UPCOMING_COUNT),
    );

    let window_events = window_events.map_err(ApiError::from_calendar)?;
    let working_day_events = working_day_events.map_err(ApiError::from_calendar)?;
    let upcoming = upcoming.map_err(ApiError::from_calendar)?;

    let availability = compute_availability(today, &working_day_events, &config.working_hours, tz);
    let analytics = compute_analytics(
        &window_events,
        upcoming,
        availability.total_busy_time,
        &config.working_hours,
    );

    let period = match range {
        Some((start, end)) => public::AnalyticsPeriod::Range { start, end },
        None => public::AnalyticsPeriod::Label("default_week".to_string()),
    };

    Ok(Json(public::AnalyticsResponse {
        analytics,
        period,
        generated_at: now,
    }))
}

/// Create the calendar router
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/events", get(events_handler))
        .route("/availability", get(availability_handler))
        .route("/analytics", get(analytics_handler))
}
