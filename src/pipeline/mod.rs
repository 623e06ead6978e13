// Event processing pipeline: normalize, deduplicate, bucket and summarize

pub mod processing;
