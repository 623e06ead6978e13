pub mod timestamp;

use tracing::debug;

use crate::observability::metrics;
use crate::types::{CityContext, NormalizedEvent, RawEventRecord};

pub use timestamp::{parse_timestamp, to_iso_millis};

const EARTH_RADIUS_MILES: f64 = 3958.8;

/// Trait for mapping provider records into the canonical event shape
pub trait Normalizer {
    /// Returns `None` when the record lacks a usable title or start
    fn normalize(&self, record: &RawEventRecord) -> Option<NormalizedEvent>;
}

/// Default normalizer applying the shared timestamp grammar to every source
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultNormalizer;

impl DefaultNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalize a batch, silently dropping malformed records
    pub fn normalize_all(&self, records: &[RawEventRecord]) -> Vec<NormalizedEvent> {
        let normalized: Vec<NormalizedEvent> =
            records.iter().filter_map(|r| self.normalize(r)).collect();

        let dropped = records.len() - normalized.len();
        metrics::normalize::records_accepted(normalized.len());
        if dropped > 0 {
            metrics::normalize::records_dropped(dropped);
            debug!(dropped, kept = normalized.len(), "Dropped malformed raw records");
        }
        normalized
    }

    fn build_id(&self, record: &RawEventRecord, event: &NormalizedEvent) -> String {
        let prefix = record.source.id_prefix();
        match clean(record.external_id.as_deref()) {
            Some(external_id) => format!("{}:{}", prefix, external_id),
            None => format!("{}:{}:{}", prefix, to_iso_millis(&event.start), event.title),
        }
    }
}

impl Normalizer for DefaultNormalizer {
    fn normalize(&self, record: &RawEventRecord) -> Option<NormalizedEvent> {
        let title = record.title.trim();
        if title.is_empty() {
            return None;
        }
        let zone = record.time_zone.as_deref();
        let start = parse_timestamp(&record.start_raw, zone)?;
        let end = record
            .end_raw
            .as_deref()
            .and_then(|raw| parse_timestamp(raw, zone));

        let mut event = NormalizedEvent {
            id: String::new(),
            title: title.to_string(),
            start,
            end,
            venue: clean(record.venue.as_deref()),
            address: clean(record.address.as_deref()),
            url: clean(record.url.as_deref()),
            source: record.source,
            is_free: record.is_free,
            latitude: record.latitude.filter(|v| v.is_finite()),
            longitude: record.longitude.filter(|v| v.is_finite()),
        };
        event.id = self.build_id(record, &event);
        Some(event)
    }
}

fn clean(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Great-circle distance in miles
pub fn haversine_miles(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_MILES * c
}

/// Events without coordinates are always in range
pub fn within_city_radius(event: &NormalizedEvent, city: &CityContext) -> bool {
    match (event.latitude, event.longitude) {
        (Some(lat), Some(lng)) => {
            haversine_miles(city.latitude, city.longitude, lat, lng) <= city.radius_miles
        }
        _ => true,
    }
}
