use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

use crate::apis::base::EventCollector;
use crate::apis::eventbrite::EventbriteCollector;
use crate::apis::ics::IcsFeedCollector;
use crate::apis::ticketmaster::TicketmasterCollector;
use crate::app::ports::HttpClientPort;
use crate::config::ProviderSettings;
use crate::constants::{FETCH_PADDING_DAYS, MAX_WINDOW_DAYS};
use crate::infra::http_client::ReqwestHttp;
use crate::observability::metrics;
use crate::pipeline::processing::bucketize::LocalDayBucketizer;
use crate::pipeline::processing::conflation::{DefaultDeduplicator, Deduplicator};
use crate::pipeline::processing::normalize::{within_city_radius, DefaultNormalizer};
use crate::pipeline::processing::summary::DaySummarizer;
use crate::types::{CityContext, DateWindow, DayBucket, DaySummary, NormalizedEvent};

/// Use case that fans out to every source family and folds the results into
/// one deduplicated, day-bucketed timeline for a city.
pub struct EventAggregator {
    calendar: Arc<dyn EventCollector>,
    ticketing: Arc<dyn EventCollector>,
    keyword_search: Arc<dyn EventCollector>,
    normalizer: DefaultNormalizer,
    deduplicator: Box<dyn Deduplicator + Send + Sync>,
    summarizer: DaySummarizer,
}

impl EventAggregator {
    /// Build with reqwest-backed clients, one per source so each gets its own timeout
    pub fn new(settings: &ProviderSettings) -> Self {
        let http = |secs: u64| -> Arc<dyn HttpClientPort> {
            Arc::new(ReqwestHttp::new(Duration::from_secs(secs)))
        };
        Self::with_collectors(
            Arc::new(IcsFeedCollector::new(http(settings.calendar.timeout_seconds))),
            Arc::new(TicketmasterCollector::new(
                http(settings.ticketing.timeout_seconds),
                settings.ticketing.clone(),
            )),
            Arc::new(EventbriteCollector::new(
                http(settings.keyword_search.timeout_seconds),
                settings.keyword_search.clone(),
            )),
        )
    }

    /// Build with a single shared HTTP port
    pub fn with_http(http: Arc<dyn HttpClientPort>, settings: &ProviderSettings) -> Self {
        Self::with_collectors(
            Arc::new(IcsFeedCollector::new(http.clone())),
            Arc::new(TicketmasterCollector::new(http.clone(), settings.ticketing.clone())),
            Arc::new(EventbriteCollector::new(http, settings.keyword_search.clone())),
        )
    }

    pub fn with_collectors(
        calendar: Arc<dyn EventCollector>,
        ticketing: Arc<dyn EventCollector>,
        keyword_search: Arc<dyn EventCollector>,
    ) -> Self {
        Self {
            calendar,
            ticketing,
            keyword_search,
            normalizer: DefaultNormalizer::new(),
            deduplicator: Box::new(DefaultDeduplicator::new()),
            summarizer: DaySummarizer::new(),
        }
    }

    /// Replace the deduplication strategy
    pub fn with_deduplicator(mut self, deduplicator: Box<dyn Deduplicator + Send + Sync>) -> Self {
        self.deduplicator = deduplicator;
        self
    }

    /// Deduplicated events of the window, ordered by start.
    ///
    /// Sources are queried with the window padded by a day on each side; the
    /// padding is filtered back out before deduplication.
    pub async fn collect_events(
        &self,
        city: &CityContext,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<NormalizedEvent> {
        let window = request_window(start, end);
        let span = info_span!("aggregate", run_id = %Uuid::new_v4(), city = %city.key);
        self.run(city, &window).instrument(span).await
    }

    pub async fn aggregate_events(
        &self,
        city: &CityContext,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<DayBucket> {
        let events = self.collect_events(city, start, end).await;
        LocalDayBucketizer::new(city.time_zone).bucketize(events)
    }

    /// One summary per local day of the window, days without events included
    pub async fn aggregate_summaries(
        &self,
        city: &CityContext,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<DaySummary> {
        let window = request_window(start, end);
        let buckets = self.aggregate_events(city, window.start, window.end).await;
        self.summarizer.summarize_range(&buckets, &window, city.time_zone)
    }

    async fn run(&self, city: &CityContext, window: &DateWindow) -> Vec<NormalizedEvent> {
        let started = Instant::now();
        let fetch_window = window.padded(FETCH_PADDING_DAYS);

        let (calendar, ticketing, keyword_search) = tokio::join!(
            self.calendar.collect(city, &fetch_window),
            self.ticketing.collect(city, &fetch_window),
            self.keyword_search.collect(city, &fetch_window),
        );
        for (source, count) in [
            (self.calendar.source(), calendar.len()),
            (self.ticketing.source(), ticketing.len()),
            (self.keyword_search.source(), keyword_search.len()),
        ] {
            info!(source = %source, records = count, "Collected raw records");
        }

        let mut raw = ticketing;
        raw.extend(calendar);
        raw.extend(keyword_search);

        let normalized = self.normalizer.normalize_all(&raw);
        let before_filter = normalized.len();
        let in_scope: Vec<NormalizedEvent> = normalized
            .into_iter()
            .filter(|e| window.contains(e.start) && within_city_radius(e, city))
            .collect();
        debug!(
            outside = before_filter - in_scope.len(),
            "Filtered events outside the window or radius"
        );

        let (events, report) = self.deduplicator.dedupe(in_scope, city.time_zone);
        metrics::dedup::report(&report);
        info!(
            input = report.input,
            blocked = report.blocked,
            sports_merged = report.sports_merged,
            fuzzy_merged = report.fuzzy_merged,
            kept = report.kept,
            "Deduplication complete"
        );

        let elapsed = started.elapsed().as_secs_f64();
        metrics::aggregation::completed(elapsed);
        info!(events = events.len(), elapsed_secs = elapsed, "Aggregation complete");
        events
    }
}

/// Requested window with reversed bounds swapped and the span capped
pub fn request_window(start: DateTime<Utc>, end: DateTime<Utc>) -> DateWindow {
    DateWindow::new(start, end).clamped(MAX_WINDOW_DAYS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventSource, RawEventRecord};
    use async_trait::async_trait;
    use chrono::TimeZone;

    struct StaticCollector {
        source: EventSource,
        records: Vec<RawEventRecord>,
    }

    #[async_trait]
    impl EventCollector for StaticCollector {
        fn source(&self) -> EventSource {
            self.source
        }

        async fn collect(&self, _city: &CityContext, _window: &DateWindow) -> Vec<RawEventRecord> {
            self.records.clone()
        }
    }

    fn collector(source: EventSource, records: Vec<RawEventRecord>) -> Arc<dyn EventCollector> {
        Arc::new(StaticCollector { source, records })
    }

    fn city() -> CityContext {
        CityContext {
            key: "slc".to_string(),
            name: "Salt Lake City".to_string(),
            state_code: Some("UT".to_string()),
            latitude: 40.7608,
            longitude: -111.8910,
            radius_miles: 25.0,
            time_zone: chrono_tz::America::Denver,
            calendar_feed_urls: vec![],
            search_terms: vec![],
        }
    }

    #[test]
    fn test_request_window_is_clamped() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let window = request_window(end, start);
        assert_eq!(window.start, start);
        assert_eq!((window.end - window.start).num_days(), MAX_WINDOW_DAYS);
    }

    #[tokio::test]
    async fn test_padding_is_filtered_before_dedup() {
        // The out-of-window listing starts earlier and would otherwise win the group
        let early = RawEventRecord::new(EventSource::TicketingApi, "Jazz vs Suns", "2025-11-25T06:30:00Z");
        let inside = RawEventRecord::new(EventSource::KeywordSearchApi, "Suns at Jazz", "2025-11-25T07:30:00Z");

        let aggregator = EventAggregator::with_collectors(
            collector(EventSource::CalendarFeed, vec![]),
            collector(EventSource::TicketingApi, vec![early]),
            collector(EventSource::KeywordSearchApi, vec![inside]),
        );
        let start = Utc.with_ymd_and_hms(2025, 11, 25, 7, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 11, 26, 7, 0, 0).unwrap();

        let events = aggregator.collect_events(&city(), start, end).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source, EventSource::KeywordSearchApi);
    }

    #[tokio::test]
    async fn test_custom_deduplicator_replaces_default() {
        let sale = || RawEventRecord::new(EventSource::CalendarFeed, "Holiday Sale", "2025-11-25T18:00:00Z");
        let build = || {
            EventAggregator::with_collectors(
                collector(EventSource::CalendarFeed, vec![sale()]),
                collector(EventSource::TicketingApi, vec![]),
                collector(EventSource::KeywordSearchApi, vec![]),
            )
        };
        let start = Utc.with_ymd_and_hms(2025, 11, 25, 7, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 11, 26, 7, 0, 0).unwrap();

        assert!(build().collect_events(&city(), start, end).await.is_empty());

        let lenient = DefaultDeduplicator {
            drop_promotional: false,
            ..DefaultDeduplicator::new()
        };
        let events = build()
            .with_deduplicator(Box::new(lenient))
            .collect_events(&city(), start, end)
            .await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "Holiday Sale");
    }

    #[tokio::test]
    async fn test_window_at_the_end_of_time_returns_empty() {
        let aggregator = EventAggregator::with_collectors(
            collector(EventSource::CalendarFeed, vec![]),
            collector(EventSource::TicketingApi, vec![]),
            collector(EventSource::KeywordSearchApi, vec![]),
        );
        let end = DateTime::<Utc>::MAX_UTC;
        let start = end - chrono::Duration::days(10);

        let buckets = aggregator.aggregate_events(&city(), start, end).await;
        assert!(buckets.is_empty());
        let summaries = aggregator.aggregate_summaries(&city(), start, end).await;
        assert!(!summaries.is_empty());
        assert!(summaries.iter().all(|s| s.tops.is_empty()));
    }

    #[tokio::test]
    async fn test_summaries_cover_every_day() {
        let aggregator = EventAggregator::with_collectors(
            collector(EventSource::CalendarFeed, vec![RawEventRecord::new(
                EventSource::CalendarFeed,
                "Winter Concert",
                "2025-12-02T02:00:00Z",
            )]),
            collector(EventSource::TicketingApi, vec![]),
            collector(EventSource::KeywordSearchApi, vec![]),
        );
        let start = Utc.with_ymd_and_hms(2025, 11, 30, 7, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 12, 3, 6, 59, 59).unwrap();

        let summaries = aggregator.aggregate_summaries(&city(), start, end).await;
        let dates: Vec<&str> = summaries.iter().map(|s| s.date.as_str()).collect();
        assert_eq!(dates, vec!["2025-11-30", "2025-12-01", "2025-12-02"]);
        assert_eq!(summaries[1].tops.len(), 1);
        assert_eq!(summaries[1].tops[0].title, "Winter Concert");
    }
}
