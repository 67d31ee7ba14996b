//! The system prompt, rendered with Handlebars. Handlebars adds
//! additional security controls since it can't do much out of the box
//! without registering your own helpers, which is ideal when the
//! rendered output feeds an LLM.

use std::fmt;

use anyhow::Result;
use handlebars::Handlebars;
use serde_json::json;

#[derive(Debug)]
pub enum Prompt {
    System,
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

const SYSTEM_PROMPT: &str = r#"
{{#if timestamp}}The current time is {{timestamp}}.{{/if}}

You are Calvin, an intelligent calendar assistant powered by real-time Google Calendar data. You help users understand their schedule, manage their time, and make informed decisions about their calendar.

Your capabilities include:
- Analyzing calendar patterns and meeting load
- Providing availability insights and scheduling recommendations
- Offering time management advice based on actual calendar data
- Answering questions about upcoming events and schedules
- Identifying meeting patterns and productivity insights

You should produce responses in markdown format with double newlines.

When presenting calendar events in your responses, you can use a special markdown format for better visualization:
```event
{
  "summary": "Event Title",
  "start": "Start Time (e.g., 2:00 PM)",
  "end": "End Time (e.g., 3:00 PM)"
}
```

This will render as a formatted event component. Use this format when displaying individual events to the user for better readability.

If you are asked to draft one or more emails:
- Draft the emails separately
- Make them concise
- Recommend times for meetings based on the user's availability

Always provide helpful, concise, and actionable responses. Use the real-time calendar data provided to give accurate, personalized advice.
{{#if context_summary}}

CURRENT CALENDAR CONTEXT ({{last_updated}}):
{{context_summary}}

Use this real-time data to provide accurate, personalized responses about the user's schedule and availability.
{{else}}

Note: Calendar data is not available for this request.
{{/if}}
"#;

pub fn templates<'a>() -> Handlebars<'a> {
    let mut registry = Handlebars::new();
    registry.set_strict_mode(true);
    registry
        .register_template_string(&Prompt::System.to_string(), SYSTEM_PROMPT)
        .expect("Failed to register template");
    registry
}

/// Render the system prompt. `context_summary` and `last_updated`
/// travel together: both present when calendar data was fetched,
/// both absent otherwise.
pub fn render_system_prompt(
    timestamp: Option<&str>,
    context_summary: Option<&str>,
    last_updated: Option<&str>,
) -> Result<String> {
    let registry = templates();
    let rendered = registry.render(
        &Prompt::System.to_string(),
        &json!({
            "timestamp": timestamp,
            "context_summary": context_summary,
            "last_updated": last_updated,
        }),
    )?;
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_without_calendar_context() {
        let prompt = render_system_prompt(None, None, None).unwrap();
        assert!(prompt.contains("You are Calvin"));
        assert!(prompt.contains("Calendar data is not available"));
        assert!(!prompt.contains("CURRENT CALENDAR CONTEXT"));
    }

    #[test]
    fn test_render_with_calendar_context() {
        let prompt = render_system_prompt(
            Some("2025-03-12T15:30:00Z"),
            Some("TODAY: No scheduled events"),
            Some("2025-03-12T15:30:00Z"),
        )
        .unwrap();
        assert!(prompt.contains("The current time is 2025-03-12T15:30:00Z."));
        assert!(prompt.contains("CURRENT CALENDAR CONTEXT (2025-03-12T15:30:00Z):"));
        assert!(prompt.contains("TODAY: No scheduled events"));
        assert!(!prompt.contains("Calendar data is not available"));
    }

    #[test]
    fn test_event_block_format_is_included() {
        let prompt = render_system_prompt(None, None, None).unwrap();
        assert!(prompt.contains("```event"));
    }
}
