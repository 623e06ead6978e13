// Pipeline processing: normalization, deduplication, day bucketing and summaries

pub mod normalize;
pub mod conflation;
pub mod bucketize;
pub mod summary;

pub use bucketize::{local_day_key, LocalDayBucketizer};
pub use conflation::{DedupReport, DefaultDeduplicator, Deduplicator};
pub use normalize::{DefaultNormalizer, Normalizer};
pub use summary::DaySummarizer;
