use async_trait::async_trait;

use crate::types::{CityContext, DateWindow, EventSource, RawEventRecord};

/// Core trait that every event source implements.
///
/// `collect` is infallible by signature: a source that cannot be reached or
/// returns garbage contributes zero records, and the failure stays in its logs.
#[async_trait]
pub trait EventCollector: Send + Sync {
    /// Which provider family this collector speaks for
    fn source(&self) -> EventSource;

    /// Fetch and parse every raw record the source has for this city and window
    async fn collect(&self, city: &CityContext, window: &DateWindow) -> Vec<RawEventRecord>;
}

/// Provider timestamps must not carry sub-second precision
pub fn format_query_instant(instant: &chrono::DateTime<chrono::Utc>) -> String {
    instant.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_query_instant_has_no_millis() {
        let instant = Utc.with_ymd_and_hms(2025, 3, 1, 7, 0, 0).unwrap()
            + chrono::Duration::milliseconds(123);
        assert_eq!(format_query_instant(&instant), "2025-03-01T07:00:00Z");
    }
}
