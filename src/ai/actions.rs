//! Follow-up action suggestions derived from the user's message.
//! A pure keyword classifier: category checks run in a fixed order,
//! so the same message always yields the same ordered list.

use serde::{Deserialize, Serialize};

const MAX_SUGGESTIONS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedActionType {
    CalendarQuery,
    Scheduling,
    Analytics,
    Availability,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestedAction {
    pub id: String,
    pub r#type: SuggestedActionType,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The canned message sent when the user picks this suggestion.
    pub action: String,
}

impl SuggestedAction {
    fn new(
        id: &str,
        r#type: SuggestedActionType,
        label: &str,
        description: Option<&str>,
        action: &str,
    ) -> Self {
        Self {
            id: id.to_string(),
            r#type,
            label: label.to_string(),
            description: description.map(str::to_string),
            action: action.to_string(),
        }
    }
}

fn contains_any(message: &str, terms: &[&str]) -> bool {
    terms.iter().any(|term| message.contains(term))
}

/// Suggest up to four follow-up actions for a message. Matching
/// categories each contribute one suggestion in check order; a
/// message matching nothing gets two generic suggestions.
pub fn suggest_actions(message: &str) -> Vec<SuggestedAction> {
    let mut actions = Vec::new();
    let message = message.to_lowercase();

    if contains_any(&message, &["free", "available", "schedule"]) {
        actions.push(SuggestedAction::new(
            "check-availability",
            SuggestedActionType::Availability,
            "Check detailed availability",
            Some("View your free time slots for scheduling"),
            "What are my available time slots for the rest of the week?",
        ));
    }

    if contains_any(&message, &["meeting", "busy", "analytics"]) {
        actions.push(SuggestedAction::new(
            "meeting-analytics",
            SuggestedActionType::Analytics,
            "Meeting analytics",
            Some("Get insights on your meeting patterns"),
            "Show me my meeting analytics and patterns",
        ));
    }

    if contains_any(&message, &["today", "schedule"]) {
        actions.push(SuggestedAction::new(
            "todays-schedule",
            SuggestedActionType::CalendarQuery,
            "Today's schedule",
            Some("View your complete schedule for today"),
            "What does my schedule look like today?",
        ));
    }

    if contains_any(&message, &["tomorrow", "next", "upcoming"]) {
        actions.push(SuggestedAction::new(
            "upcoming-events",
            SuggestedActionType::CalendarQuery,
            "Upcoming events",
            Some("See your next scheduled events"),
            "What are my upcoming events?",
        ));
    }

    // General helpful actions when nothing specific was triggered
    if actions.is_empty() {
        actions.push(SuggestedAction::new(
            "schedule-overview",
            SuggestedActionType::CalendarQuery,
            "Schedule overview",
            None,
            "Give me an overview of my schedule",
        ));
        actions.push(SuggestedAction::new(
            "find-meeting-time",
            SuggestedActionType::Scheduling,
            "Find meeting time",
            None,
            "When would be a good time for a 1-hour meeting this week?",
        ));
    }

    actions.truncate(MAX_SUGGESTIONS);
    actions
}
