use std::collections::HashMap;

use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::constants::MAX_TOP_EVENTS;
use crate::pipeline::processing::conflation::normalize_title;
use crate::types::{DateWindow, DayBucket, DaySummary, NormalizedEvent};

static PRIORITY_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:arena|stadium|ballpark|amphitheater|amphitheatre|fieldhouse|nba|wnba|nfl|mlb|nhl|mls|ncaa|basketball|football|soccer|hockey|baseball|softball|volleyball|rugby|wrestling|ufc|boxing|jazz|concert|tour|festival|live music|symphony|orchestra|philharmonic|opera|rock|hip hop|rap|country|bluegrass|edm|dj|band|punk|metal|indie|blues|folk)\b",
    )
    .expect("valid priority regex")
});

/// Sports or concert/music listing, judged from title and venue
pub fn is_priority(event: &NormalizedEvent) -> bool {
    let mut haystack = normalize_title(&event.title);
    if let Some(venue) = &event.venue {
        haystack.push(' ');
        haystack.push_str(&normalize_title(venue));
    }
    PRIORITY_KEYWORDS.is_match(&haystack)
}

/// Builds calendar-cell summaries from day buckets
#[derive(Debug, Default, Clone, Copy)]
pub struct DaySummarizer;

impl DaySummarizer {
    pub fn new() -> Self {
        Self
    }

    pub fn summarize_day(&self, bucket: &DayBucket) -> DaySummary {
        let mut ordered: Vec<&NormalizedEvent> = bucket.events.iter().collect();
        ordered.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));

        let priority: Vec<&NormalizedEvent> = ordered.iter().copied().filter(|e| is_priority(e)).collect();
        let tops: Vec<NormalizedEvent> = if priority.is_empty() {
            ordered.first().map(|e| (*e).clone()).into_iter().collect()
        } else {
            priority.into_iter().take(MAX_TOP_EVENTS).cloned().collect()
        };

        DaySummary {
            date: bucket.date_key.clone(),
            more_count: bucket.events.len().saturating_sub(tops.len()),
            tops,
        }
    }

    /// One summary per local day of `window`, empty days included
    pub fn summarize_range(&self, buckets: &[DayBucket], window: &DateWindow, zone: Tz) -> Vec<DaySummary> {
        let by_date: HashMap<&str, &DayBucket> =
            buckets.iter().map(|b| (b.date_key.as_str(), b)).collect();

        let first = window.start.with_timezone(&zone).date_naive();
        let last = window.end.with_timezone(&zone).date_naive();

        first
            .iter_days()
            .take_while(|day| *day <= last)
            .map(|day| {
                let key = day.format("%Y-%m-%d").to_string();
                match by_date.get(key.as_str()) {
                    Some(bucket) => self.summarize_day(bucket),
                    None => DaySummary {
                        date: key,
                        tops: Vec::new(),
                        more_count: 0,
                    },
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventSource;
    use chrono::{DateTime, TimeZone, Utc};

    fn event(id: &str, title: &str, hour: u32) -> NormalizedEvent {
        NormalizedEvent {
            id: id.to_string(),
            title: title.to_string(),
            start: Utc.with_ymd_and_hms(2025, 11, 25, hour, 0, 0).unwrap(),
            end: None,
            venue: None,
            address: None,
            url: None,
            source: EventSource::CalendarFeed,
            is_free: None,
            latitude: None,
            longitude: None,
        }
    }

    fn bucket(events: Vec<NormalizedEvent>) -> DayBucket {
        DayBucket {
            date_key: "2025-11-25".to_string(),
            events,
        }
    }

    fn top_ids(summary: &DaySummary) -> Vec<&str> {
        summary.tops.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn test_priority_classification() {
        assert!(is_priority(&event("1", "Utah Jazz vs Lakers", 1)));
        assert!(is_priority(&event("2", "Taylor Swift: The Eras Tour", 1)));
        let mut at_arena = event("3", "Disney on Ice", 1);
        at_arena.venue = Some("Delta Center Arena".to_string());
        assert!(is_priority(&at_arena));
        assert!(!is_priority(&event("4", "City Council Meeting", 1)));
        assert!(!is_priority(&event("5", "Rockwell Painting Class", 1)));
    }

    #[test]
    fn test_two_earliest_priority_events_win() {
        let summary = DaySummarizer::new().summarize_day(&bucket(vec![
            event("o1", "Library Story Time", 14),
            event("p3", "Symphony Holiday Pops", 22),
            event("o2", "Farmers Market", 15),
            event("p1", "Jazz vs Mavericks", 19),
            event("o3", "Council Meeting", 16),
            event("p2", "Indie Rock Showcase", 20),
            event("o4", "Yoga in the Park", 17),
            event("o5", "Book Club", 18),
        ]));
        assert_eq!(top_ids(&summary), vec!["p1", "p2"]);
        assert_eq!(summary.more_count, 6);
    }

    #[test]
    fn test_single_priority_event_stands_alone() {
        let summary = DaySummarizer::new().summarize_day(&bucket(vec![
            event("o1", "Library Story Time", 14),
            event("p1", "Country Music Night", 20),
        ]));
        assert_eq!(top_ids(&summary), vec!["p1"]);
        assert_eq!(summary.more_count, 1);
    }

    #[test]
    fn test_falls_back_to_earliest_ordinary_event() {
        let summary = DaySummarizer::new().summarize_day(&bucket(vec![
            event("o2", "Farmers Market", 15),
            event("o1", "Library Story Time", 14),
        ]));
        assert_eq!(top_ids(&summary), vec!["o1"]);
        assert_eq!(summary.more_count, 1);
    }

    #[test]
    fn test_summarize_range_includes_empty_days() {
        let zone = chrono_tz::America::Denver;
        // 2025-11-25 19:00 UTC is noon in Denver
        let buckets = vec![bucket(vec![event("o1", "Library Story Time", 19)])];
        let start: DateTime<Utc> = Utc.with_ymd_and_hms(2025, 11, 24, 7, 0, 0).unwrap();
        let end: DateTime<Utc> = Utc.with_ymd_and_hms(2025, 11, 27, 6, 59, 0).unwrap();

        let summaries = DaySummarizer::new().summarize_range(&buckets, &DateWindow::new(start, end), zone);
        let dates: Vec<&str> = summaries.iter().map(|s| s.date.as_str()).collect();
        assert_eq!(dates, vec!["2025-11-24", "2025-11-25", "2025-11-26"]);
        assert!(summaries[0].tops.is_empty());
        assert_eq!(top_ids(&summaries[1]), vec!["o1"]);
        assert_eq!(summaries[2].more_count, 0);
    }
}
