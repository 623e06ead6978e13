use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{
    CALENDAR_FEED_SOURCE, DEFAULT_WINDOW_DAYS, KEYWORD_SEARCH_SOURCE, TICKETING_SOURCE,
};

/// Everything the pipeline needs to know about the city a request is for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CityContext {
    pub key: String,
    pub name: String,
    pub state_code: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_miles: f64,
    pub time_zone: Tz,
    pub calendar_feed_urls: Vec<String>,
    pub search_terms: Vec<String>,
}

/// Which provider family a record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    CalendarFeed,
    TicketingApi,
    KeywordSearchApi,
}

impl EventSource {
    /// Prefix used for event ids so ids from different providers never collide
    pub fn id_prefix(&self) -> &'static str {
        match self {
            EventSource::CalendarFeed => "ics",
            EventSource::TicketingApi => "tm",
            EventSource::KeywordSearchApi => "eb",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::CalendarFeed => CALENDAR_FEED_SOURCE,
            EventSource::TicketingApi => TICKETING_SOURCE,
            EventSource::KeywordSearchApi => KEYWORD_SEARCH_SOURCE,
        }
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider-agnostic event record before any date parsing.
///
/// `start_raw` and `end_raw` hold the provider's own timestamp strings. When a
/// provider reports a wall-clock time together with a zone (calendar `TZID`,
/// ticketing venue timezone) the zone name travels in `time_zone`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEventRecord {
    pub external_id: Option<String>,
    pub title: String,
    pub start_raw: String,
    pub end_raw: Option<String>,
    pub time_zone: Option<String>,
    pub venue: Option<String>,
    pub address: Option<String>,
    pub url: Option<String>,
    pub source: EventSource,
    pub is_free: Option<bool>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl RawEventRecord {
    pub fn new(source: EventSource, title: impl Into<String>, start_raw: impl Into<String>) -> Self {
        Self {
            external_id: None,
            title: title.into(),
            start_raw: start_raw.into(),
            end_raw: None,
            time_zone: None,
            venue: None,
            address: None,
            url: None,
            source,
            is_free: None,
            latitude: None,
            longitude: None,
        }
    }
}

/// Canonical event shape the rest of the pipeline operates on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub venue: Option<String>,
    pub address: Option<String>,
    pub url: Option<String>,
    pub source: EventSource,
    pub is_free: Option<bool>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// All events of one city-local calendar day, sorted by start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayBucket {
    pub date_key: String,
    pub events: Vec<NormalizedEvent>,
}

/// Calendar-cell view of a day: up to two top events and a remainder count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaySummary {
    pub date: String,
    pub tops: Vec<NormalizedEvent>,
    pub more_count: usize,
}

/// Absolute time range of an aggregation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateWindow {
    /// Build a window, swapping the bounds if they arrive reversed
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        if end < start {
            Self { start: end, end: start }
        } else {
            Self { start, end }
        }
    }

    pub fn with_default_span(start: DateTime<Utc>) -> Self {
        Self::new(start, shift_days(start, DEFAULT_WINDOW_DAYS))
    }

    pub fn padded(&self, days: i64) -> Self {
        Self {
            start: shift_days(self.start, -days),
            end: shift_days(self.end, days),
        }
    }

    /// Cap the window so it spans at most `max_days`, keeping the start
    pub fn clamped(&self, max_days: i64) -> Self {
        let max_end = shift_days(self.start, max_days);
        Self {
            start: self.start,
            end: self.end.min(max_end),
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant <= self.end
    }
}

/// Move `instant` by whole days, saturating at the representable range
fn shift_days(instant: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    let bound = if days < 0 { DateTime::<Utc>::MIN_UTC } else { DateTime::<Utc>::MAX_UTC };
    Duration::try_days(days)
        .and_then(|delta| instant.checked_add_signed(delta))
        .unwrap_or(bound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_window_clamps_to_max_span() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap();
        let window = DateWindow::new(start, end).clamped(365);

        assert_eq!(window.start, start);
        assert_eq!(window.end, Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_window_swaps_reversed_bounds() {
        let a = Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap();
        let window = DateWindow::new(a, b);
        assert_eq!(window.start, b);
        assert!(window.contains(a));
        assert!(!window.padded(0).contains(a + Duration::seconds(1)));
    }

    #[test]
    fn test_window_saturates_at_the_latest_instant() {
        let start = DateTime::<Utc>::MAX_UTC - Duration::days(10);
        let window = DateWindow::new(start, DateTime::<Utc>::MAX_UTC);

        let clamped = window.clamped(365);
        assert_eq!(clamped.start, start);
        assert_eq!(clamped.end, DateTime::<Utc>::MAX_UTC);

        let padded = window.padded(1);
        assert_eq!(padded.start, start - Duration::days(1));
        assert_eq!(padded.end, DateTime::<Utc>::MAX_UTC);

        let open = DateWindow::with_default_span(start);
        assert_eq!(open.end, DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_window_saturates_at_the_earliest_instant() {
        let end = DateTime::<Utc>::MIN_UTC + Duration::days(2);
        let padded = DateWindow::new(DateTime::<Utc>::MIN_UTC, end).padded(1);

        assert_eq!(padded.start, DateTime::<Utc>::MIN_UTC);
        assert_eq!(padded.end, end + Duration::days(1));
        assert!(padded.contains(DateTime::<Utc>::MIN_UTC));
    }

    #[test]
    fn test_source_prefixes_are_distinct() {
        assert_eq!(EventSource::CalendarFeed.id_prefix(), "ics");
        assert_eq!(EventSource::TicketingApi.id_prefix(), "tm");
        assert_eq!(EventSource::KeywordSearchApi.id_prefix(), "eb");
        assert_eq!(EventSource::TicketingApi.to_string(), "ticketing_api");
    }
}
