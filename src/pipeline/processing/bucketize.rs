use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::types::{DayBucket, NormalizedEvent};

/// `YYYY-MM-DD` of `start` on the civil calendar of `zone`
pub fn local_day_key(start: &DateTime<Utc>, zone: Tz) -> String {
    start.with_timezone(&zone).format("%Y-%m-%d").to_string()
}

/// Groups events into city-local calendar days
#[derive(Debug, Clone, Copy)]
pub struct LocalDayBucketizer {
    zone: Tz,
}

impl LocalDayBucketizer {
    pub fn new(zone: Tz) -> Self {
        Self { zone }
    }

    /// Buckets ascend by date; events inside a bucket ascend by start, then id
    pub fn bucketize(&self, events: Vec<NormalizedEvent>) -> Vec<DayBucket> {
        let mut days: BTreeMap<String, Vec<NormalizedEvent>> = BTreeMap::new();
        for event in events {
            days.entry(local_day_key(&event.start, self.zone))
                .or_default()
                .push(event);
        }

        days.into_iter()
            .map(|(date_key, mut events)| {
                events.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
                DayBucket { date_key, events }
            })
            .collect()
    }
}
