//! Calendar domain: canonical data model, time-window helpers, the
//! Google Calendar gateway, and the availability/analytics engine.

pub mod availability;
pub mod gcal;
pub mod models;
pub mod time_window;

pub use availability::{compute_analytics, compute_availability};
pub use gcal::{CalendarError, CalendarGateway, GoogleCalendarClient};
pub use models::{
    Attendee, AvailabilitySlot, CalendarAnalytics, CalendarAvailability, CalendarEvent,
    EventDateTime, WorkingHours,
};
