pub mod apis;
pub mod config;
pub mod constants;
pub mod error;
pub mod observability;
pub mod pipeline;
pub mod types;

// Layered boundaries for application and infrastructure
pub mod app;
pub mod infra;

pub use app::aggregate_use_case::EventAggregator;
pub use config::{AppConfig, ProviderSettings};
pub use types::{CityContext, DayBucket, DaySummary, NormalizedEvent};
