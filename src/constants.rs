/// Provider constants shared by the collectors and the aggregation use case.

// Source labels (used in logs, metrics and serialized events)
pub const CALENDAR_FEED_SOURCE: &str = "calendar_feed";
pub const TICKETING_SOURCE: &str = "ticketing_api";
pub const KEYWORD_SEARCH_SOURCE: &str = "keyword_search_api";

// Ticketing search API
pub const TICKETING_DEFAULT_BASE_URL: &str = "https://app.ticketmaster.com/discovery/v2/events.json";
pub const TICKETING_PAGE_SIZE: u32 = 200;
pub const TICKETING_MAX_PAGES: u32 = 5;
pub const TICKETING_DEFAULT_PAGE_DELAY_MS: u64 = 50;
pub const TICKETING_MAX_SPAN_DAYS: i64 = 365;

// Keyword search API
pub const KEYWORD_SEARCH_DEFAULT_BASE_URL: &str = "https://www.eventbriteapi.com/v3/events/search/";
pub const KEYWORD_SEARCH_PAGE_SIZE: u32 = 50;
pub const KEYWORD_SEARCH_MAX_TERMS: usize = 5;

// Aggregation window
pub const DEFAULT_WINDOW_DAYS: i64 = 90;
pub const MAX_WINDOW_DAYS: i64 = 366;
pub const FETCH_PADDING_DAYS: i64 = 1;

pub const DEFAULT_RADIUS_MILES: f64 = 25.0;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

// Deduplication and summaries
pub const FUZZY_DUPLICATE_THRESHOLD: f64 = 0.9;
pub const MAX_TOP_EVENTS: usize = 2;
