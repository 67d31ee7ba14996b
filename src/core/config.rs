use std::env;
use std::time::Duration;

use chrono::NaiveTime;
use chrono_tz::Tz;

use crate::calendar::WorkingHours;

#[derive(Clone, Copy, Debug)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub google_api_hostname: String,
    pub openai_api_hostname: String,
    pub openai_api_key: String,
    pub openai_model: String,
    /// The viewing user's zone. Day boundaries, working hours, and
    /// summary timestamps are all interpreted here.
    pub timezone: Tz,
    pub working_hours: WorkingHours,
    pub chat_rate_limit: RateLimitConfig,
    pub calendar_rate_limit: RateLimitConfig,
}

fn parse_working_hours(raw: &str) -> Option<WorkingHours> {
    let (start, end) = raw.split_once('-')?;
    Some(WorkingHours {
        start: NaiveTime::parse_from_str(start.trim(), "%H:%M").ok()?,
        end: NaiveTime::parse_from_str(end.trim(), "%H:%M").ok()?,
    })
}

impl Default for AppConfig {
    fn default() -> Self {
        let google_api_hostname = env::var("CALVIN_GOOGLE_API_HOSTNAME")
            .unwrap_or_else(|_| "https://www.googleapis.com".to_string());
        let openai_api_hostname = env::var("CALVIN_LLM_HOST")
            .unwrap_or_else(|_| "https://api.openai.com".to_string());
        let openai_api_key =
            env::var("OPENAI_API_KEY").unwrap_or_else(|_| "thiswontworkforopenai".to_string());
        let openai_model =
            env::var("CALVIN_LLM_MODEL").unwrap_or_else(|_| "gpt-4-turbo-preview".to_string());
        let timezone = env::var("CALVIN_TIMEZONE")
            .ok()
            .and_then(|name| name.parse::<Tz>().ok())
            .unwrap_or(chrono_tz::UTC);
        let working_hours = env::var("CALVIN_WORKING_HOURS")
            .ok()
            .and_then(|raw| parse_working_hours(&raw))
            .unwrap_or_default();

        Self {
            google_api_hostname,
            openai_api_hostname,
            openai_api_key,
            openai_model,
            timezone,
            working_hours,
            // 30 requests per minute for the chat API
            chat_rate_limit: RateLimitConfig {
                max_requests: 30,
                window: Duration::from_secs(60),
            },
            // 5000 requests per 15 minutes for the calendar APIs
            calendar_rate_limit: RateLimitConfig {
                max_requests: 5000,
                window: Duration::from_secs(15 * 60),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_working_hours() {
        let wh = parse_working_hours("08:30-16:00").unwrap();
        assert_eq!(wh.start, NaiveTime::from_hms_opt(8, 30, 0).unwrap());
        assert_eq!(wh.end, NaiveTime::from_hms_opt(16, 0, 0).unwrap());
        assert!(parse_working_hours("not a range").is_none());
        assert!(parse_working_hours("09:00").is_none());
    }
}
