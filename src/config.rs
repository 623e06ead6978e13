use std::fs;
use std::path::Path;

use chrono_tz::Tz;
use serde::Deserialize;
use tracing::debug;

use crate::constants::{
    DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_RADIUS_MILES, KEYWORD_SEARCH_DEFAULT_BASE_URL,
    TICKETING_DEFAULT_BASE_URL, TICKETING_DEFAULT_PAGE_DELAY_MS,
};
use crate::error::{AggregatorError, Result};
use crate::types::CityContext;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub providers: ProviderSettings,
    #[serde(default)]
    pub cities: Vec<CityConfig>,
}

/// Credentials and endpoints for every provider, injected by the caller
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderSettings {
    #[serde(default)]
    pub ticketing: TicketingSettings,
    #[serde(default)]
    pub keyword_search: KeywordSearchSettings,
    #[serde(default)]
    pub calendar: CalendarSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TicketingSettings {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_ticketing_base_url")]
    pub base_url: String,
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeywordSearchSettings {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_keyword_search_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalendarSettings {
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CityConfig {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub state: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default = "default_radius_miles")]
    pub radius_miles: f64,
    pub time_zone: Tz,
    #[serde(default)]
    pub calendar_feeds: Vec<String>,
    #[serde(default)]
    pub search_terms: Vec<String>,
}

fn default_ticketing_base_url() -> String {
    TICKETING_DEFAULT_BASE_URL.to_string()
}

fn default_keyword_search_base_url() -> String {
    KEYWORD_SEARCH_DEFAULT_BASE_URL.to_string()
}

fn default_page_delay_ms() -> u64 {
    TICKETING_DEFAULT_PAGE_DELAY_MS
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

fn default_radius_miles() -> f64 {
    DEFAULT_RADIUS_MILES
}

impl Default for TicketingSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_ticketing_base_url(),
            page_delay_ms: default_page_delay_ms(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl Default for KeywordSearchSettings {
    fn default() -> Self {
        Self {
            token: None,
            base_url: default_keyword_search_base_url(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl Default for CalendarSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl From<&CityConfig> for CityContext {
    fn from(city: &CityConfig) -> Self {
        CityContext {
            key: city.key.clone(),
            name: city.name.clone(),
            state_code: city.state.clone(),
            latitude: city.latitude,
            longitude: city.longitude,
            radius_miles: city.radius_miles,
            time_zone: city.time_zone,
            calendar_feed_urls: city.calendar_feeds.clone(),
            search_terms: city.search_terms.clone(),
        }
    }
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading configuration");
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for city in &self.cities {
            if city.key.trim().is_empty() {
                return Err(AggregatorError::Config("City key must not be empty".to_string()));
            }
            if !(-90.0..=90.0).contains(&city.latitude) || !(-180.0..=180.0).contains(&city.longitude) {
                return Err(AggregatorError::Config(format!(
                    "City '{}' has out-of-range coordinates",
                    city.key
                )));
            }
            if !(city.radius_miles.is_finite() && city.radius_miles > 0.0) {
                return Err(AggregatorError::Config(format!(
                    "City '{}' radius must be positive",
                    city.key
                )));
            }
        }
        Ok(())
    }

    pub fn city(&self, key: &str) -> Option<CityContext> {
        self.cities
            .iter()
            .find(|c| c.key.eq_ignore_ascii_case(key))
            .map(CityContext::from)
    }
}
