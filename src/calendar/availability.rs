//! Availability & analytics engine. Everything here is pure: event
//! lists in, derived values out. Fetching and error handling live in
//! the gateway; malformed events are rejected during normalization
//! and never reach these functions.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use itertools::Itertools;

use super::models::{
    AttendeeStats, AvailabilitySlot, CalendarAnalytics, CalendarAvailability, CalendarEvent,
    MeetingTypes, WorkingHours,
};
use super::time_window::working_hours_bounds;

/// Partition one working day into free and busy slots.
///
/// Busy intervals come from events with precise start and end
/// instants, clipped to the working-hours window and merged where
/// they overlap so overlapping meetings never double-count busy
/// time. Free slots are what a single cursor sweep leaves uncovered.
/// Together the two lists cover the window exactly.
pub fn compute_availability(
    date: NaiveDate,
    events: &[CalendarEvent],
    working_hours: &WorkingHours,
    tz: Tz,
) -> CalendarAvailability {
    let (window_start, window_end) = working_hours_bounds(date, working_hours, tz);

    let mut intervals: Vec<(DateTime<Utc>, DateTime<Utc>)> = events
        .iter()
        .filter_map(|event| {
            let start = event.start.date_time?.with_timezone(&Utc);
            let end = event.end.date_time?.with_timezone(&Utc);
            let clipped = (start.max(window_start), end.min(window_end));
            // Zero-length events and events outside the window
            // contribute no busy time and must not fragment free time.
            (clipped.0 < clipped.1).then_some(clipped)
        })
        .collect();
    intervals.sort_by_key(|(start, _)| *start);

    // Merge strictly overlapping intervals; back-to-back meetings
    // stay as separate busy slots.
    let mut busy_slots: Vec<AvailabilitySlot> = Vec::new();
    for (start, end) in intervals {
        match busy_slots.last_mut() {
            Some(last) if start < last.end => {
                if end > last.end {
                    *last = AvailabilitySlot::new(last.start, end);
                }
            }
            _ => busy_slots.push(AvailabilitySlot::new(start, end)),
        }
    }

    let mut free_slots: Vec<AvailabilitySlot> = Vec::new();
    let mut cursor = window_start;
    for busy in &busy_slots {
        if cursor < busy.start {
            free_slots.push(AvailabilitySlot::new(cursor, busy.start));
        }
        cursor = cursor.max(busy.end);
    }
    if cursor < window_end {
        free_slots.push(AvailabilitySlot::new(cursor, window_end));
    }

    let total_busy_time = busy_slots.iter().map(|slot| slot.duration).sum();
    let total_free_time = free_slots.iter().map(|slot| slot.duration).sum();

    CalendarAvailability {
        date,
        free_slots,
        busy_slots,
        total_free_time,
        total_busy_time,
        working_hours: *working_hours,
    }
}

/// Aggregate meeting-load statistics over an event window.
///
/// `busy_minutes_today` is the merged busy total from today's
/// availability partition; the nominal workday used for
/// `free_hours_today` is the same working-hours window, so the two
/// figures can never drift apart.
pub fn compute_analytics(
    events: &[CalendarEvent],
    upcoming_events: Vec<CalendarEvent>,
    busy_minutes_today: f64,
    working_hours: &WorkingHours,
) -> CalendarAnalytics {
    let total_events = events.len() as u32;
    let mut total_meeting_minutes = 0.0;
    let mut meetings_by_day: BTreeMap<String, u32> = BTreeMap::new();
    // Attendees are keyed by email plus display name so two people
    // sharing a name never collapse into one entry. Encounter order
    // is kept for the stable tie-break.
    let mut attendee_order: Vec<(String, Option<String>)> = Vec::new();
    let mut attendee_counts: HashMap<(String, String), (usize, u32)> = HashMap::new();
    let mut virtual_meetings = 0u32;
    let mut in_person_meetings = 0u32;

    for event in events {
        if let (Some(start), Some(duration)) = (event.start.date_time, event.duration_minutes()) {
            total_meeting_minutes += duration;

            // Bucket by the calendar day of the start instant in the
            // zone implied by its stored offset.
            let day_key = start.date_naive().format("%Y-%m-%d").to_string();
            *meetings_by_day.entry(day_key).or_insert(0) += 1;
        }

        for attendee in event.attendees.iter().flatten() {
            let name = attendee
                .display_name
                .clone()
                .unwrap_or_else(|| attendee.email.clone());
            let key = (attendee.email.clone(), name);
            match attendee_counts.get_mut(&key) {
                Some((_, count)) => *count += 1,
                None => {
                    let display_name = attendee
                        .display_name
                        .clone()
                        .filter(|name| *name != attendee.email);
                    attendee_order.push((attendee.email.clone(), display_name));
                    attendee_counts.insert(key, (attendee_order.len() - 1, 1));
                }
            }
        }

        if event.is_virtual() {
            virtual_meetings += 1;
        } else if event.location.is_some() {
            in_person_meetings += 1;
        }
    }

    let top_attendees: Vec<AttendeeStats> = attendee_counts
        .into_values()
        .sorted_by_key(|(order, count)| (std::cmp::Reverse(*count), *order))
        .take(10)
        .map(|(order, count)| {
            let (email, display_name) = attendee_order[order].clone();
            AttendeeStats {
                email,
                display_name,
                meeting_count: count,
            }
        })
        .collect();

    let busy_hours_today = busy_minutes_today / 60.0;
    let free_hours_today = (working_hours.duration_hours() - busy_hours_today).max(0.0);
    let average_meeting_length = if total_events > 0 {
        total_meeting_minutes / total_events as f64
    } else {
        0.0
    };

    CalendarAnalytics {
        total_events,
        total_meeting_hours: total_meeting_minutes / 60.0,
        average_meeting_length,
        busy_hours_today,
        free_hours_today,
        upcoming_events,
        meetings_by_day,
        top_attendees,
        meeting_types: MeetingTypes {
            in_person: in_person_meetings,
            r#virtual: virtual_meetings,
            unknown: total_events - virtual_meetings - in_person_meetings,
        },
    }
}
