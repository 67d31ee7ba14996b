//! Conversation context assembly: concurrent calendar fetches merged
//! into one text block the model is grounded with, plus the prompt
//! construction around it.

use chrono::{DateTime, FixedOffset, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::api::public::chat::{ChatMessage, ChatRole};
use crate::calendar::gcal::CalendarGateway;
use crate::calendar::models::{
    CalendarAnalytics, CalendarAvailability, CalendarEvent, WorkingHours,
};
use crate::calendar::time_window::{local_date, tomorrow_bounds, working_hours_bounds};
use crate::calendar::{CalendarError, compute_analytics, compute_availability};
use crate::openai::{Message, Role};

/// History turns included in the prompt, newest last. Bounds prompt
/// growth independent of session length.
const MAX_HISTORY: usize = 10;

/// Upcoming events fetched for context.
const UPCOMING_COUNT: u32 = 5;

/// Free slots listed in the availability section.
const MAX_LISTED_FREE_SLOTS: usize = 3;

/// Live calendar data for one assistant turn. Built fresh per
/// request and discarded with it; never cached, so every turn sees
/// current data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatCalendarContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events_yesterday: Option<Vec<CalendarEvent>>,
    pub events_today: Vec<CalendarEvent>,
    pub upcoming_events: Vec<CalendarEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analytics: Option<CalendarAnalytics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability: Option<CalendarAvailability>,
    pub last_updated: DateTime<Utc>,
}

impl ChatCalendarContext {
    /// The minimal context used when calendar fetches fail: the
    /// assistant still answers, just without calendar grounding.
    pub fn fallback(now: DateTime<Utc>) -> Self {
        Self {
            events_yesterday: None,
            events_today: vec![],
            upcoming_events: vec![],
            analytics: None,
            availability: None,
            last_updated: now,
        }
    }
}

async fn try_build_context(
    gateway: &dyn CalendarGateway,
    now: DateTime<Utc>,
    tz: Tz,
    working_hours: &WorkingHours,
) -> Result<ChatCalendarContext, CalendarError> {
    let today = local_date(now, tz);
    let (work_start, work_end) = working_hours_bounds(today, working_hours, tz);

    let (yesterday, events_today, upcoming, week_events, working_day_events) = tokio::join!(
        gateway.yesterdays_events(now, tz),
        gateway.todays_events(now, tz),
        gateway.upcoming_events(now, tz, UPCOMING_COUNT),
        gateway.this_weeks_events(now, tz),
        gateway.events_between(work_start, work_end),
    );

    let upcoming = upcoming?;
    let availability = compute_availability(today, &working_day_events?, working_hours, tz);
    let analytics = compute_analytics(
        &week_events?,
        upcoming.clone(),
        availability.total_busy_time,
        working_hours,
    );

    Ok(ChatCalendarContext {
        events_yesterday: Some(yesterday?),
        events_today: events_today?,
        upcoming_events: upcoming,
        analytics: Some(analytics),
        availability: Some(availability),
        last_updated: now,
    })
}

/// Fetch the five context inputs concurrently and derive analytics
/// and availability from them. Never fails: any fetch error degrades
/// to the minimal fallback context so the turn can proceed.
pub async fn build_context(
    gateway: &dyn CalendarGateway,
    now: DateTime<Utc>,
    tz: Tz,
    working_hours: &WorkingHours,
) -> ChatCalendarContext {
    match try_build_context(gateway, now, tz, working_hours).await {
        Ok(context) => context,
        Err(e) => {
            tracing::error!("Error fetching calendar context: {}", e);
            ChatCalendarContext::fallback(now)
        }
    }
}

fn format_time_utc(instant: DateTime<Utc>, tz: Tz) -> String {
    instant.with_timezone(&tz).format("%-I:%M %p").to_string()
}

fn format_time(instant: DateTime<FixedOffset>, tz: Tz) -> String {
    format_time_utc(instant.with_timezone(&Utc), tz)
}

/// `"h:mm AM/PM - h:mm AM/PM"` when both endpoints are precise, the
/// bare start time when only the start is, `"All day"` otherwise.
fn time_range(event: &CalendarEvent, tz: Tz) -> String {
    match (event.start.date_time, event.end.date_time) {
        (Some(start), Some(end)) => {
            format!("{} - {}", format_time(start, tz), format_time(end, tz))
        }
        (Some(start), None) => format_time(start, tz),
        _ => "All day".to_string(),
    }
}

/// An event is done when its end (or its start, if it has no precise
/// end) is behind the reference instant.
fn is_past(event: &CalendarEvent, now: DateTime<Utc>) -> bool {
    match (event.end.date_time, event.start.date_time) {
        (Some(end), _) => end.with_timezone(&Utc) < now,
        (None, Some(start)) => start.with_timezone(&Utc) < now,
        _ => false,
    }
}

fn status_tag(event: &CalendarEvent, now: DateTime<Utc>) -> &'static str {
    if is_past(event, now) { "[DONE]" } else { "[PENDING]" }
}

fn location_suffix(event: &CalendarEvent) -> String {
    event
        .location
        .as_ref()
        .map(|location| format!(" ({location})"))
        .unwrap_or_default()
}

/// Render the context into the deterministic text block the system
/// prompt embeds. Sections appear only when they have data, matching
/// what the model is told to rely on.
pub fn build_summary(context: &ChatCalendarContext, now: DateTime<Utc>, tz: Tz) -> String {
    let mut summary = String::new();
    let (tomorrow_start, day_after_start) = tomorrow_bounds(now, tz);

    if let Some(events_yesterday) = context
        .events_yesterday
        .as_ref()
        .filter(|events| !events.is_empty())
    {
        summary += &format!(
            "YESTERDAY'S SCHEDULE ({} events):\n",
            events_yesterday.len()
        );
        for event in events_yesterday {
            summary += &format!(
                "- [DONE] {}: {}{}\n",
                time_range(event, tz),
                event.summary,
                location_suffix(event)
            );
        }
        summary += "\n";
    }

    if context.events_today.is_empty() {
        summary += "TODAY: No scheduled events\n\n";
    } else {
        summary += &format!("TODAY'S SCHEDULE ({} events):\n", context.events_today.len());
        for event in &context.events_today {
            summary += &format!(
                "- {} {}: {}{}\n",
                status_tag(event, now),
                time_range(event, tz),
                event.summary,
                location_suffix(event)
            );
        }
        summary += "\n";
    }

    // Tomorrow's events are carved out of the upcoming list.
    let starts_within = |event: &&CalendarEvent, from: DateTime<Utc>, until: Option<DateTime<Utc>>| {
        event
            .start
            .date_time
            .map(|start| start.with_timezone(&Utc))
            .is_some_and(|start| start >= from && until.is_none_or(|until| start < until))
    };

    let tomorrow_events: Vec<&CalendarEvent> = context
        .upcoming_events
        .iter()
        .filter(|event| starts_within(event, tomorrow_start, Some(day_after_start)))
        .collect();

    if tomorrow_events.is_empty() {
        summary += "TOMORROW: No scheduled events\n\n";
    } else {
        summary += &format!("TOMORROW'S SCHEDULE ({} events):\n", tomorrow_events.len());
        for event in &tomorrow_events {
            summary += &format!(
                "- [PENDING] {}: {}{}\n",
                time_range(event, tz),
                event.summary,
                location_suffix(event)
            );
        }
        summary += "\n";
    }

    let later_events: Vec<&CalendarEvent> = context
        .upcoming_events
        .iter()
        .filter(|event| starts_within(event, day_after_start, None))
        .collect();

    if !later_events.is_empty() {
        summary += "UPCOMING EVENTS (after tomorrow):\n";
        for event in &later_events {
            // The filter guarantees a precise start.
            let date = event
                .start
                .date_time
                .map(|start| {
                    start
                        .with_timezone(&tz)
                        .format("%b %-d")
                        .to_string()
                })
                .unwrap_or_else(|| "TBD".to_string());
            // Tagged for robustness against clock skew even though
            // these should all be pending.
            summary += &format!(
                "- {} {} {}: {}\n",
                status_tag(event, now),
                date,
                time_range(event, tz),
                event.summary
            );
        }
        summary += "\n";
    }

    if let Some(analytics) = &context.analytics {
        summary += "WEEKLY SUMMARY:\n";
        summary += &format!("- Total meetings this week: {}\n", analytics.total_events);
        summary += &format!(
            "- Total meeting hours: {:.1}h\n",
            analytics.total_meeting_hours
        );
        summary += &format!(
            "- Today: {:.1}h busy, {:.1}h free\n\n",
            analytics.busy_hours_today, analytics.free_hours_today
        );
    }

    if let Some(availability) = &context.availability {
        summary += "TODAY'S AVAILABILITY:\n";
        summary += &format!("- Free time: {:.1}h\n", availability.total_free_time / 60.0);
        summary += &format!("- Busy time: {:.1}h\n", availability.total_busy_time / 60.0);

        if !availability.free_slots.is_empty() {
            let slots = availability
                .free_slots
                .iter()
                .take(MAX_LISTED_FREE_SLOTS)
                .map(|slot| {
                    format!(
                        "{}-{}",
                        format_time_utc(slot.start, tz),
                        format_time_utc(slot.end, tz)
                    )
                })
                .collect::<Vec<_>>()
                .join(", ");
            summary += &format!("- Next free slots: {slots}\n");
        }
    }

    summary
}

/// Assemble the full message sequence for the model: the system
/// prompt, then the most recent non-system history turns, then the
/// new user message.
pub fn build_prompt(
    system_prompt: &str,
    history: &[ChatMessage],
    new_message: &str,
) -> Vec<Message> {
    let mut messages = vec![Message::new(Role::System, system_prompt)];

    // System entries in client history are assembler-owned; never
    // replay them.
    let recent: Vec<&ChatMessage> = history
        .iter()
        .filter(|message| message.role != ChatRole::System)
        .collect();
    let start = recent.len().saturating_sub(MAX_HISTORY);
    for message in &recent[start..] {
        let role = match message.role {
            ChatRole::User => Role::User,
            ChatRole::Assistant => Role::Assistant,
            ChatRole::System => continue,
        };
        messages.push(Message::new(role, &message.content));
    }

    messages.push(Message::new(Role::User, new_message));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use chrono_tz::UTC;

    use crate::calendar::models::EventDateTime;

    fn instant(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn event(id: &str, start: &str, end: &str) -> CalendarEvent {
        CalendarEvent {
            id: id.into(),
            summary: format!("Event {id}"),
            description: None,
            start: EventDateTime::at_instant(DateTime::parse_from_rfc3339(start).unwrap()),
            end: EventDateTime::at_instant(DateTime::parse_from_rfc3339(end).unwrap()),
            location: None,
            attendees: None,
            creator: None,
            organizer: None,
            status: None,
            recurring: false,
            recurring_event_id: None,
            hangout_link: None,
            conference_data: None,
        }
    }

    /// Serves a fixed event list filtered by the requested window.
    struct FakeGateway {
        events: Vec<CalendarEvent>,
    }

    #[async_trait]
    impl CalendarGateway for FakeGateway {
        async fn fetch_events(
            &self,
            time_min: DateTime<Utc>,
            time_max: Option<DateTime<Utc>>,
            max_results: u32,
        ) -> Result<Vec<CalendarEvent>, CalendarError> {
            Ok(self
                .events
                .iter()
                .filter(|event| {
                    event.start.instant_in(UTC).is_some_and(|start| {
                        start >= time_min && time_max.is_none_or(|max| start < max)
                    })
                })
                .take(max_results as usize)
                .cloned()
                .collect())
        }
    }

    /// Fails the open-ended (upcoming) fetch, succeeds otherwise.
    struct PartiallyFailingGateway;

    #[async_trait]
    impl CalendarGateway for PartiallyFailingGateway {
        async fn fetch_events(
            &self,
            _time_min: DateTime<Utc>,
            time_max: Option<DateTime<Utc>>,
            _max_results: u32,
        ) -> Result<Vec<CalendarEvent>, CalendarError> {
            if time_max.is_none() {
                return Err(CalendarError::Fetch(anyhow!("boom")));
            }
            Ok(vec![])
        }
    }

    const NOW: &str = "2025-03-12T15:30:00Z";

    #[tokio::test]
    async fn test_build_context_populates_all_sections() {
        let gateway = FakeGateway {
            events: vec![
                event("y", "2025-03-11T10:00:00Z", "2025-03-11T11:00:00Z"),
                event("t", "2025-03-12T10:00:00Z", "2025-03-12T11:00:00Z"),
                event("u", "2025-03-13T10:00:00Z", "2025-03-13T11:00:00Z"),
            ],
        };
        let context =
            build_context(&gateway, instant(NOW), UTC, &WorkingHours::default()).await;

        assert_eq!(
            context.events_yesterday.as_ref().map(Vec::len),
            Some(1)
        );
        assert_eq!(context.events_today.len(), 1);
        assert_eq!(context.upcoming_events.len(), 1);
        assert!(context.analytics.is_some());
        let availability = context.availability.unwrap();
        assert_eq!(availability.total_busy_time, 60.0);
        assert_eq!(context.last_updated, instant(NOW));
    }

    #[tokio::test]
    async fn test_build_context_falls_back_when_a_fetch_fails() {
        let context = build_context(
            &PartiallyFailingGateway,
            instant(NOW),
            UTC,
            &WorkingHours::default(),
        )
        .await;

        assert!(context.events_yesterday.is_none());
        assert!(context.events_today.is_empty());
        assert!(context.upcoming_events.is_empty());
        assert!(context.analytics.is_none());
        assert!(context.availability.is_none());
        assert_eq!(context.last_updated, instant(NOW));
    }

    #[test]
    fn test_summary_marks_done_and_pending() {
        let mut context = ChatCalendarContext::fallback(instant(NOW));
        context.events_today = vec![
            event("past", "2025-03-12T09:00:00Z", "2025-03-12T10:00:00Z"),
            event("future", "2025-03-12T16:00:00Z", "2025-03-12T17:00:00Z"),
        ];

        let summary = build_summary(&context, instant(NOW), UTC);
        assert!(summary.contains("TODAY'S SCHEDULE (2 events):"));
        assert!(summary.contains("- [DONE] 9:00 AM - 10:00 AM: Event past"));
        assert!(summary.contains("- [PENDING] 4:00 PM - 5:00 PM: Event future"));
    }

    #[test]
    fn test_summary_renders_all_day_and_location() {
        let mut context = ChatCalendarContext::fallback(instant(NOW));
        let mut offsite = event("offsite", NOW, NOW);
        offsite.start = EventDateTime::all_day("2025-03-12".parse().unwrap());
        offsite.end = EventDateTime::all_day("2025-03-13".parse().unwrap());
        let mut standup = event("standup", "2025-03-12T09:00:00Z", "2025-03-12T09:15:00Z");
        standup.location = Some("Room 4".into());
        context.events_today = vec![offsite, standup];

        let summary = build_summary(&context, instant(NOW), UTC);
        assert!(summary.contains("All day: Event offsite"));
        assert!(summary.contains("Event standup (Room 4)"));
    }

    #[test]
    fn test_summary_splits_tomorrow_from_later_upcoming() {
        let mut context = ChatCalendarContext::fallback(instant(NOW));
        context.upcoming_events = vec![
            event("tmrw", "2025-03-13T10:00:00Z", "2025-03-13T11:00:00Z"),
            event("later", "2025-03-15T10:00:00Z", "2025-03-15T11:00:00Z"),
        ];

        let summary = build_summary(&context, instant(NOW), UTC);
        assert!(summary.contains("TOMORROW'S SCHEDULE (1 events):"));
        assert!(summary.contains("- [PENDING] 10:00 AM - 11:00 AM: Event tmrw"));
        assert!(summary.contains("UPCOMING EVENTS (after tomorrow):"));
        assert!(summary.contains("- [PENDING] Mar 15 10:00 AM - 11:00 AM: Event later"));
    }

    #[test]
    fn test_summary_placeholders_for_empty_days() {
        let context = ChatCalendarContext::fallback(instant(NOW));
        let summary = build_summary(&context, instant(NOW), UTC);
        assert!(summary.contains("TODAY: No scheduled events"));
        assert!(summary.contains("TOMORROW: No scheduled events"));
        assert!(!summary.contains("YESTERDAY'S SCHEDULE"));
        assert!(!summary.contains("WEEKLY SUMMARY"));
        assert!(!summary.contains("TODAY'S AVAILABILITY"));
    }

    #[test]
    fn test_summary_availability_lists_up_to_three_slots() {
        let mut context = ChatCalendarContext::fallback(instant(NOW));
        let events = [
            event("1", "2025-03-12T09:30:00Z", "2025-03-12T10:00:00Z"),
            event("2", "2025-03-12T11:00:00Z", "2025-03-12T12:00:00Z"),
            event("3", "2025-03-12T13:00:00Z", "2025-03-12T14:00:00Z"),
            event("4", "2025-03-12T15:00:00Z", "2025-03-12T16:00:00Z"),
        ];
        context.availability = Some(compute_availability(
            "2025-03-12".parse().unwrap(),
            &events,
            &WorkingHours::default(),
            UTC,
        ));

        let summary = build_summary(&context, instant(NOW), UTC);
        assert!(summary.contains("- Free time: 4.5h"));
        assert!(summary.contains("- Busy time: 3.5h"));
        assert!(summary.contains(
            "- Next free slots: 9:00 AM-9:30 AM, 10:00 AM-11:00 AM, 12:00 PM-1:00 PM"
        ));
    }

    fn history_message(id: usize, role: ChatRole) -> ChatMessage {
        ChatMessage {
            id: id.to_string(),
            role,
            content: format!("message {id}"),
            timestamp: NOW.to_string(),
            metadata: None,
        }
    }

    #[test]
    fn test_build_prompt_keeps_last_ten_non_system_turns() {
        let mut history: Vec<ChatMessage> = (0..15)
            .map(|i| {
                history_message(
                    i,
                    if i % 2 == 0 {
                        ChatRole::User
                    } else {
                        ChatRole::Assistant
                    },
                )
            })
            .collect();
        history.push(history_message(99, ChatRole::System));

        let messages = build_prompt("system prompt", &history, "new message");

        // One system prompt + the last 10 history turns + the new
        // user message.
        assert_eq!(messages.len(), 12);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content, "message 5");
        assert_eq!(messages[10].content, "message 14");
        assert_eq!(messages[11].content, "new message");
        assert!(
            messages[1..]
                .iter()
                .all(|message| message.role != Role::System)
        );
    }

    #[test]
    fn test_build_prompt_with_short_history() {
        let history = vec![history_message(0, ChatRole::User)];
        let messages = build_prompt("system prompt", &history, "hello");
        assert_eq!(messages.len(), 3);
    }
}
