use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::apis::base::{format_query_instant, EventCollector};
use crate::app::ports::HttpClientPort;
use crate::config::KeywordSearchSettings;
use crate::constants::{KEYWORD_SEARCH_MAX_TERMS, KEYWORD_SEARCH_PAGE_SIZE, KEYWORD_SEARCH_SOURCE};
use crate::error::{AggregatorError, Result};
use crate::observability::metrics;
use crate::types::{CityContext, DateWindow, EventSource, RawEventRecord};

const UNTITLED: &str = "Untitled";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    events: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SearchEvent {
    id: Option<String>,
    name: Option<TextField>,
    url: Option<String>,
    start: Option<InstantField>,
    end: Option<InstantField>,
    is_free: Option<bool>,
    venue: Option<Venue>,
}

#[derive(Debug, Deserialize)]
struct TextField {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InstantField {
    utc: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Venue {
    name: Option<String>,
    address: Option<VenueAddress>,
}

#[derive(Debug, Deserialize)]
struct VenueAddress {
    localized_address_display: Option<String>,
    localized_area_display: Option<String>,
    latitude: Option<String>,
    longitude: Option<String>,
}

fn parse_coordinate(value: Option<String>) -> Option<f64> {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

impl SearchEvent {
    fn into_raw(self) -> Option<RawEventRecord> {
        let start_raw = self.start.and_then(|s| s.utc)?;
        let title = self
            .name
            .and_then(|n| n.text)
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| UNTITLED.to_string());

        let mut record = RawEventRecord::new(EventSource::KeywordSearchApi, title, start_raw);
        record.external_id = self.id;
        record.url = self.url;
        record.end_raw = self.end.and_then(|e| e.utc);
        record.is_free = self.is_free;

        if let Some(venue) = self.venue {
            record.venue = venue.name;
            if let Some(address) = venue.address {
                record.address = address
                    .localized_address_display
                    .filter(|a| !a.trim().is_empty())
                    .or(address.localized_area_display);
                record.latitude = parse_coordinate(address.latitude);
                record.longitude = parse_coordinate(address.longitude);
            }
        }
        Some(record)
    }
}

/// Decode a keyword search response, dropping events that do not fit the schema
pub fn decode_search(bytes: &[u8]) -> Result<Vec<RawEventRecord>> {
    let response: SearchResponse = serde_json::from_slice(bytes)?;
    Ok(response
        .events
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<SearchEvent>(value) {
            Ok(event) => event.into_raw(),
            Err(e) => {
                debug!(error = %e, "Dropping keyword search event that failed to decode");
                None
            }
        })
        .collect())
}

/// Terms searched for a city: its configured terms capped, else the city name
pub fn search_terms(city: &CityContext) -> Vec<String> {
    let terms: Vec<String> = city
        .search_terms
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .take(KEYWORD_SEARCH_MAX_TERMS)
        .map(str::to_string)
        .collect();
    if terms.is_empty() {
        vec![city.name.clone()]
    } else {
        terms
    }
}

pub struct EventbriteCollector {
    http: Arc<dyn HttpClientPort>,
    settings: KeywordSearchSettings,
}

impl EventbriteCollector {
    pub fn new(http: Arc<dyn HttpClientPort>, settings: KeywordSearchSettings) -> Self {
        Self { http, settings }
    }

    pub fn build_url(&self, term: &str, window: &DateWindow) -> Result<String> {
        let params = [
            ("q", term.to_string()),
            ("sort_by", "date".to_string()),
            ("expand", "venue".to_string()),
            ("include_all_series_instances", "true".to_string()),
            ("start_date.range_start", format_query_instant(&window.start)),
            ("start_date.range_end", format_query_instant(&window.end)),
            ("page_size", KEYWORD_SEARCH_PAGE_SIZE.to_string()),
        ];
        let url = reqwest::Url::parse_with_params(&self.settings.base_url, &params)
            .map_err(|e| AggregatorError::Config(format!("Invalid keyword search base URL: {}", e)))?;
        Ok(url.to_string())
    }

    async fn search(&self, token: &str, term: &str, window: &DateWindow) -> Result<Vec<RawEventRecord>> {
        let url = self.build_url(term, window)?;
        let resp = self
            .http
            .get(&url, Some(token))
            .await
            .map_err(AggregatorError::Http)?;
        if !resp.is_success() {
            return Err(AggregatorError::UnexpectedStatus { status: resp.status });
        }
        decode_search(&resp.bytes)
    }
}

#[async_trait]
impl EventCollector for EventbriteCollector {
    fn source(&self) -> EventSource {
        EventSource::KeywordSearchApi
    }

    #[instrument(skip(self, city, window), fields(city = %city.key))]
    async fn collect(&self, city: &CityContext, window: &DateWindow) -> Vec<RawEventRecord> {
        let Some(token) = self.settings.token.as_deref().filter(|t| !t.is_empty()) else {
            debug!("No keyword search token configured, skipping");
            return Vec::new();
        };

        let mut records = Vec::new();
        for term in search_terms(city) {
            match self.search(token, &term, window).await {
                Ok(found) => {
                    metrics::sources::request_success(KEYWORD_SEARCH_SOURCE);
                    debug!(term = %term, count = found.len(), "Keyword search complete");
                    records.extend(found);
                }
                Err(e) => {
                    metrics::sources::request_error(KEYWORD_SEARCH_SOURCE);
                    warn!(term = %term, error = %e, "Keyword search failed");
                }
            }
        }

        metrics::sources::records_collected(KEYWORD_SEARCH_SOURCE, records.len());
        info!(count = records.len(), "Collected keyword search events");
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn city(terms: &[&str]) -> CityContext {
        CityContext {
            key: "slc".to_string(),
            name: "Salt Lake City".to_string(),
            state_code: Some("UT".to_string()),
            latitude: 40.7608,
            longitude: -111.8910,
            radius_miles: 25.0,
            time_zone: chrono_tz::America::Denver,
            calendar_feed_urls: vec![],
            search_terms: terms.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn test_search_terms_default_to_city_name() {
        assert_eq!(search_terms(&city(&[])), vec!["Salt Lake City".to_string()]);
        assert_eq!(search_terms(&city(&["  "])), vec!["Salt Lake City".to_string()]);
    }

    #[test]
    fn test_search_terms_are_capped() {
        let terms = search_terms(&city(&["jazz", "rock", "comedy", "film", "food", "art", "yoga"]));
        assert_eq!(terms.len(), KEYWORD_SEARCH_MAX_TERMS);
        assert_eq!(terms[0], "jazz");
        assert_eq!(terms[4], "food");
    }

    #[test]
    fn test_decode_search_maps_fields() {
        let body = json!({
            "pagination": { "page_count": 1 },
            "events": [
                {
                    "id": "771",
                    "name": { "text": "Jazz at the Library" },
                    "url": "https://tickets.example/e/771",
                    "start": { "utc": "2025-11-26T02:00:00Z", "local": "2025-11-25T19:00:00", "timezone": "America/Denver" },
                    "end": { "utc": "2025-11-26T04:00:00Z" },
                    "is_free": true,
                    "venue": {
                        "name": "Main Library",
                        "address": {
                            "localized_address_display": "",
                            "localized_area_display": "Salt Lake City, UT",
                            "latitude": "40.7606",
                            "longitude": "-111.8881"
                        }
                    }
                },
                { "id": "772", "name": { "text": "No start" } },
                { "id": "773", "start": { "utc": "2025-11-27T02:00:00Z" } },
                { "id": 774, "start": "bogus" }
            ]
        });

        let records = decode_search(body.to_string().as_bytes()).unwrap();
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.external_id.as_deref(), Some("771"));
        assert_eq!(first.start_raw, "2025-11-26T02:00:00Z");
        assert_eq!(first.end_raw.as_deref(), Some("2025-11-26T04:00:00Z"));
        assert_eq!(first.address.as_deref(), Some("Salt Lake City, UT"));
        assert_eq!(first.is_free, Some(true));
        assert_eq!(first.longitude, Some(-111.8881));

        assert_eq!(records[1].title, "Untitled");
    }
}
