use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::apis::base::{format_query_instant, EventCollector};
use crate::app::ports::HttpClientPort;
use crate::config::TicketingSettings;
use crate::constants::{TICKETING_MAX_PAGES, TICKETING_MAX_SPAN_DAYS, TICKETING_PAGE_SIZE, TICKETING_SOURCE};
use crate::error::{AggregatorError, Result};
use crate::observability::metrics;
use crate::types::{CityContext, DateWindow, EventSource, RawEventRecord};

/// Geographic query mode for the ticketing search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    LatLong,
    CityName,
}

/// Result of one complete paginated fetch
#[derive(Debug, Clone)]
pub struct TicketingFetch {
    pub events: Vec<RawEventRecord>,
    pub strategy: SearchStrategy,
    pub pages_fetched: u32,
}

/// One decoded search page
#[derive(Debug, Clone)]
pub struct TicketingPage {
    pub events: Vec<RawEventRecord>,
    /// Events the provider listed, including ones that failed to decode
    pub listed: usize,
    pub total_pages: u32,
}

// Provider wire schema. Only the fields the pipeline reads are declared.

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "_embedded")]
    embedded: Option<EmbeddedEvents>,
    page: Option<PageInfo>,
}

/// Error envelope returned alongside non-2xx statuses
#[derive(Debug, Deserialize)]
struct FaultResponse {
    fault: Fault,
}

#[derive(Debug, Deserialize)]
struct Fault {
    faultstring: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddedEvents {
    #[serde(default)]
    events: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    total_pages: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TicketingEvent {
    id: Option<String>,
    name: String,
    url: Option<String>,
    dates: EventDates,
    #[serde(rename = "_embedded")]
    embedded: Option<EventEmbedded>,
    #[serde(default)]
    price_ranges: Vec<PriceRange>,
}

#[derive(Debug, Deserialize)]
struct EventDates {
    start: Option<DatePoint>,
    end: Option<DatePoint>,
    timezone: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatePoint {
    date_time: Option<String>,
    local_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventEmbedded {
    #[serde(default)]
    venues: Vec<VenueInfo>,
}

#[derive(Debug, Deserialize)]
struct VenueInfo {
    name: Option<String>,
    address: Option<AddressInfo>,
    city: Option<NamedInfo>,
    state: Option<StateInfo>,
    location: Option<LocationInfo>,
}

#[derive(Debug, Deserialize)]
struct AddressInfo {
    line1: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NamedInfo {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StateInfo {
    state_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LocationInfo {
    latitude: Option<Coordinate>,
    longitude: Option<Coordinate>,
}

/// The provider sends coordinates as strings; accept numbers too
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Coordinate {
    Text(String),
    Number(f64),
}

impl Coordinate {
    fn value(&self) -> Option<f64> {
        match self {
            Coordinate::Text(s) => s.trim().parse().ok(),
            Coordinate::Number(n) => Some(*n),
        }
        .filter(|v: &f64| v.is_finite())
    }
}

#[derive(Debug, Deserialize)]
struct PriceRange {
    min: Option<f64>,
}

impl TicketingEvent {
    fn into_raw(self, fallback_zone: &str) -> Option<RawEventRecord> {
        let start = self.dates.start.as_ref()?;
        let start_raw = start.date_time.clone().or_else(|| start.local_date.clone())?;

        let mut record = RawEventRecord::new(EventSource::TicketingApi, self.name, start_raw);
        record.external_id = self.id;
        record.url = self.url;
        record.time_zone = Some(self.dates.timezone.unwrap_or_else(|| fallback_zone.to_string()));
        record.end_raw = self.dates.end.and_then(|end| end.date_time);

        if let Some(venue) = self.embedded.and_then(|e| e.venues.into_iter().next()) {
            let parts: Vec<String> = [
                venue.address.and_then(|a| a.line1),
                venue.city.and_then(|c| c.name),
                venue.state.and_then(|s| s.state_code),
            ]
            .into_iter()
            .flatten()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
            if !parts.is_empty() {
                record.address = Some(parts.join(", "));
            }
            record.venue = venue.name;
            if let Some(location) = venue.location {
                record.latitude = location.latitude.and_then(|c| c.value());
                record.longitude = location.longitude.and_then(|c| c.value());
            }
        }

        if !self.price_ranges.is_empty() {
            record.is_free = Some(self.price_ranges.iter().any(|p| p.min == Some(0.0)));
        }

        Some(record)
    }
}

/// Decode one search response. Events that do not match the schema are dropped
/// individually; an undecodable envelope is an error.
pub fn decode_page(bytes: &[u8], fallback_zone: &str) -> Result<TicketingPage> {
    let response: SearchResponse = serde_json::from_slice(bytes)?;
    let raw_events = response.embedded.map(|e| e.events).unwrap_or_default();
    let listed = raw_events.len();

    let events: Vec<RawEventRecord> = raw_events
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<TicketingEvent>(value) {
            Ok(event) => event.into_raw(fallback_zone),
            Err(e) => {
                debug!(error = %e, "Dropping ticketing event that failed to decode");
                None
            }
        })
        .collect();

    let total_pages = response.page.and_then(|p| p.total_pages).unwrap_or(0);
    Ok(TicketingPage { events, listed, total_pages })
}

/// Paginated client for the ticketing search API
pub struct TicketmasterCollector {
    http: Arc<dyn HttpClientPort>,
    settings: TicketingSettings,
}

impl TicketmasterCollector {
    pub fn new(http: Arc<dyn HttpClientPort>, settings: TicketingSettings) -> Self {
        Self { http, settings }
    }

    pub fn build_url(
        &self,
        api_key: &str,
        strategy: SearchStrategy,
        city: &CityContext,
        window: &DateWindow,
        page: u32,
    ) -> Result<String> {
        let window = window.clamped(TICKETING_MAX_SPAN_DAYS);
        let mut params: Vec<(&str, String)> = vec![
            ("apikey", api_key.to_string()),
            ("sort", "date,asc".to_string()),
            ("size", TICKETING_PAGE_SIZE.to_string()),
            ("page", page.to_string()),
            ("startDateTime", format_query_instant(&window.start)),
            ("endDateTime", format_query_instant(&window.end)),
        ];
        match strategy {
            SearchStrategy::LatLong => {
                params.push(("latlong", format!("{},{}", city.latitude, city.longitude)));
                params.push(("radius", format!("{}", city.radius_miles)));
                params.push(("unit", "miles".to_string()));
            }
            SearchStrategy::CityName => {
                params.push(("city", city.name.clone()));
                if let Some(state) = &city.state_code {
                    params.push(("stateCode", state.clone()));
                }
            }
        }

        let url = reqwest::Url::parse_with_params(&self.settings.base_url, &params)
            .map_err(|e| AggregatorError::Config(format!("Invalid ticketing base URL: {}", e)))?;
        Ok(url.to_string())
    }

    /// Fetch every page for the city, retrying once with the city-name strategy
    /// when the coordinate query yields nothing usable.
    #[instrument(skip(self, city, window), fields(city = %city.key))]
    pub async fn fetch_all(&self, city: &CityContext, window: &DateWindow) -> TicketingFetch {
        let Some(api_key) = self.settings.api_key.as_deref().filter(|k| !k.is_empty()) else {
            debug!("No ticketing API key configured, skipping");
            return TicketingFetch {
                events: Vec::new(),
                strategy: SearchStrategy::LatLong,
                pages_fetched: 0,
            };
        };

        let first = self.fetch_strategy(api_key, SearchStrategy::LatLong, city, window).await;
        if !first.events.is_empty() {
            return first;
        }

        info!("Coordinate search returned no events, retrying by city name");
        metrics::sources::ticketing_fallback();
        self.fetch_strategy(api_key, SearchStrategy::CityName, city, window).await
    }

    async fn fetch_strategy(
        &self,
        api_key: &str,
        strategy: SearchStrategy,
        city: &CityContext,
        window: &DateWindow,
    ) -> TicketingFetch {
        let zone = city.time_zone.name();
        let delay = Duration::from_millis(self.settings.page_delay_ms);
        let mut events = Vec::new();
        let mut pages_fetched = 0;

        for page in 0..TICKETING_MAX_PAGES {
            if page > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let result = match self.build_url(api_key, strategy, city, window, page) {
                Ok(url) => self.fetch_page(&url, zone).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(decoded) => {
                    metrics::sources::request_success(TICKETING_SOURCE);
                    pages_fetched += 1;
                    debug!(page, listed = decoded.listed, total_pages = decoded.total_pages, "Fetched ticketing page");
                    events.extend(decoded.events);
                    if decoded.listed == 0 || page + 1 >= decoded.total_pages {
                        break;
                    }
                }
                Err(e) => {
                    metrics::sources::request_error(TICKETING_SOURCE);
                    warn!(page, ?strategy, error = %e, "Ticketing page failed, keeping partial results");
                    break;
                }
            }
        }

        info!(?strategy, pages_fetched, count = events.len(), "Ticketing search complete");
        TicketingFetch { events, strategy, pages_fetched }
    }

    async fn fetch_page(&self, url: &str, fallback_zone: &str) -> Result<TicketingPage> {
        let resp = self.http.get(url, None).await.map_err(AggregatorError::Http)?;
        if !resp.is_success() {
            return Err(match serde_json::from_slice::<FaultResponse>(&resp.bytes) {
                Ok(body) => AggregatorError::Api {
                    message: format!("{} ({})", body.fault.faultstring, resp.status),
                },
                Err(_) => AggregatorError::UnexpectedStatus { status: resp.status },
            });
        }
        decode_page(&resp.bytes, fallback_zone)
    }
}

#[async_trait]
impl EventCollector for TicketmasterCollector {
    fn source(&self) -> EventSource {
        EventSource::TicketingApi
    }

    async fn collect(&self, city: &CityContext, window: &DateWindow) -> Vec<RawEventRecord> {
        let fetch = self.fetch_all(city, window).await;
        metrics::sources::records_collected(TICKETING_SOURCE, fetch.events.len());
        fetch.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_page_maps_fields() {
        let body = json!({
            "_embedded": {
                "events": [
                    {
                        "id": "vvG1",
                        "name": "Utah Jazz vs. Dallas Mavericks",
                        "url": "https://tickets.example/vvG1",
                        "dates": {
                            "start": { "localDate": "2025-11-25", "dateTime": "2025-11-26T02:00:00Z" },
                            "timezone": "America/Denver"
                        },
                        "priceRanges": [ { "min": 0.0 }, { "min": 45.5 } ],
                        "_embedded": {
                            "venues": [{
                                "name": "Delta Center",
                                "address": { "line1": "301 S Temple" },
                                "city": { "name": "Salt Lake City" },
                                "state": { "stateCode": "UT" },
                                "location": { "latitude": "40.7683", "longitude": "-111.9011" }
                            }]
                        }
                    },
                    {
                        "id": "dateOnly",
                        "name": "Holiday Market",
                        "dates": { "start": { "localDate": "2025-12-01" } }
                    },
                    { "id": "broken", "dates": { "start": { "localDate": "2025-12-01" } } },
                    { "id": "noStart", "name": "TBA", "dates": {} }
                ]
            },
            "page": { "size": 200, "totalElements": 4, "totalPages": 1, "number": 0 }
        });

        let page = decode_page(body.to_string().as_bytes(), "America/Denver").unwrap();
        assert_eq!(page.listed, 4);
        assert_eq!(page.total_pages, 1);
        assert_eq!(page.events.len(), 2);

        let game = &page.events[0];
        assert_eq!(game.external_id.as_deref(), Some("vvG1"));
        assert_eq!(game.start_raw, "2025-11-26T02:00:00Z");
        assert_eq!(game.venue.as_deref(), Some("Delta Center"));
        assert_eq!(game.address.as_deref(), Some("301 S Temple, Salt Lake City, UT"));
        assert_eq!(game.is_free, Some(true));
        assert_eq!(game.latitude, Some(40.7683));

        let market = &page.events[1];
        assert_eq!(market.start_raw, "2025-12-01");
        assert_eq!(market.time_zone.as_deref(), Some("America/Denver"));
        assert_eq!(market.is_free, None);
    }

    #[test]
    fn test_decode_page_without_events() {
        let page = decode_page(br#"{"page":{"totalPages":0}}"#, "UTC").unwrap();
        assert!(page.events.is_empty());
        assert_eq!(page.listed, 0);
        assert!(decode_page(b"<html>", "UTC").is_err());
    }
}
