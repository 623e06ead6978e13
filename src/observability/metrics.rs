//! Metrics for the aggregation pipeline
//!
//! Recording goes through the `metrics` facade; without an installed recorder
//! every call is a no-op, so library users pay nothing unless they opt in.

use std::fmt;
use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{info, warn};

/// Enum representing all metric names used in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Sources
    SourcesRequestsSuccess,
    SourcesRequestsError,
    SourcesRecordsCollected,
    SourcesTicketingFallback,

    // Normalize
    NormalizeRecordsAccepted,
    NormalizeRecordsDropped,

    // Deduplication
    DedupRecordsBlocked,
    DedupSportsMerged,
    DedupFuzzyMerged,
    DedupRecordsKept,

    // Aggregation
    AggregationRuns,
    AggregationDuration,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::SourcesRequestsSuccess => "events_sources_requests_success_total",
            MetricName::SourcesRequestsError => "events_sources_requests_error_total",
            MetricName::SourcesRecordsCollected => "events_sources_records_collected_total",
            MetricName::SourcesTicketingFallback => "events_sources_ticketing_fallback_total",

            MetricName::NormalizeRecordsAccepted => "events_normalize_records_accepted_total",
            MetricName::NormalizeRecordsDropped => "events_normalize_records_dropped_total",

            MetricName::DedupRecordsBlocked => "events_dedup_records_blocked_total",
            MetricName::DedupSportsMerged => "events_dedup_sports_merged_total",
            MetricName::DedupFuzzyMerged => "events_dedup_fuzzy_merged_total",
            MetricName::DedupRecordsKept => "events_dedup_records_kept_total",

            MetricName::AggregationRuns => "events_aggregation_runs_total",
            MetricName::AggregationDuration => "events_aggregation_duration_seconds",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install a Prometheus recorder for in-process rendering. Idempotent.
pub fn init() {
    if HANDLE.get().is_some() {
        return;
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if HANDLE.set(handle).is_ok() {
                info!("Prometheus recorder installed");
            }
        }
        Err(e) => warn!("Failed to install Prometheus recorder: {}", e),
    }
}

/// Render the current metric snapshot in Prometheus text format
pub fn render() -> Option<String> {
    HANDLE.get().map(|handle| handle.render())
}

pub mod sources {
    use super::MetricName;

    pub fn request_success(source: &'static str) {
        ::metrics::counter!(MetricName::SourcesRequestsSuccess.as_str(), "source" => source).increment(1);
    }

    pub fn request_error(source: &'static str) {
        ::metrics::counter!(MetricName::SourcesRequestsError.as_str(), "source" => source).increment(1);
    }

    pub fn records_collected(source: &'static str, count: usize) {
        ::metrics::counter!(MetricName::SourcesRecordsCollected.as_str(), "source" => source)
            .increment(count as u64);
    }

    pub fn ticketing_fallback() {
        ::metrics::counter!(MetricName::SourcesTicketingFallback.as_str()).increment(1);
    }
}

pub mod normalize {
    use super::MetricName;

    pub fn records_accepted(count: usize) {
        ::metrics::counter!(MetricName::NormalizeRecordsAccepted.as_str()).increment(count as u64);
    }

    pub fn records_dropped(count: usize) {
        ::metrics::counter!(MetricName::NormalizeRecordsDropped.as_str()).increment(count as u64);
    }
}

pub mod dedup {
    use super::MetricName;
    use crate::pipeline::processing::conflation::DedupReport;

    pub fn report(report: &DedupReport) {
        ::metrics::counter!(MetricName::DedupRecordsBlocked.as_str()).increment(report.blocked as u64);
        ::metrics::counter!(MetricName::DedupSportsMerged.as_str()).increment(report.sports_merged as u64);
        ::metrics::counter!(MetricName::DedupFuzzyMerged.as_str()).increment(report.fuzzy_merged as u64);
        ::metrics::counter!(MetricName::DedupRecordsKept.as_str()).increment(report.kept as u64);
    }
}

pub mod aggregation {
    use super::MetricName;

    pub fn completed(duration_secs: f64) {
        ::metrics::counter!(MetricName::AggregationRuns.as_str()).increment(1);
        ::metrics::histogram!(MetricName::AggregationDuration.as_str()).record(duration_secs);
    }
}
