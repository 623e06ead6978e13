use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::apis::base::EventCollector;
use crate::app::ports::HttpClientPort;
use crate::constants::CALENDAR_FEED_SOURCE;
use crate::error::{AggregatorError, Result};
use crate::observability::metrics;
use crate::types::{CityContext, DateWindow, EventSource, RawEventRecord};

static URL_IN_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)https?://[^\s<>"]+"#).expect("valid url regex"));

/// One content line of a calendar file: value plus upper-cased parameters
#[derive(Debug, Clone, Default, PartialEq)]
struct IcsProperty {
    value: String,
    params: HashMap<String, String>,
}

/// Join folded lines: a line starting with a space or tab continues the previous one
pub fn unfold_lines(raw: &str) -> Vec<String> {
    let mut unfolded: Vec<String> = Vec::new();
    for line in raw.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(last) = unfolded.last_mut() {
                last.push_str(&line[1..]);
            }
            continue;
        }
        unfolded.push(line.to_string());
    }
    unfolded
}

/// Parse a calendar document into raw records. Blocks lacking SUMMARY or
/// DTSTART are skipped; the function never fails.
pub fn parse_calendar(raw: &str) -> Vec<RawEventRecord> {
    let mut events = Vec::new();
    let mut current: Option<HashMap<String, IcsProperty>> = None;
    // Depth of nested components (VALARM etc.) inside the current VEVENT
    let mut nested = 0usize;

    for line in unfold_lines(raw) {
        let marker = line.trim().to_ascii_uppercase();
        if marker == "BEGIN:VEVENT" {
            current = Some(HashMap::new());
            nested = 0;
            continue;
        }
        if marker == "END:VEVENT" {
            if let Some(props) = current.take() {
                if let Some(record) = build_record(&props) {
                    events.push(record);
                }
            }
            continue;
        }
        let Some(props) = current.as_mut() else {
            continue;
        };
        if marker.starts_with("BEGIN:") {
            nested += 1;
            continue;
        }
        if marker.starts_with("END:") {
            nested = nested.saturating_sub(1);
            continue;
        }
        if nested > 0 {
            continue;
        }
        if let Some((name, prop)) = parse_property(&line) {
            props.entry(name).or_insert(prop);
        }
    }

    events
}

fn build_record(props: &HashMap<String, IcsProperty>) -> Option<RawEventRecord> {
    let title = props
        .get("SUMMARY")
        .map(|p| unescape_text(&p.value).trim().to_string())
        .filter(|s| !s.is_empty())?;
    let dtstart = props.get("DTSTART").filter(|p| !p.value.trim().is_empty())?;

    let mut record = RawEventRecord::new(EventSource::CalendarFeed, title, dtstart.value.trim());
    record.time_zone = dtstart.params.get("TZID").cloned();
    record.end_raw = props.get("DTEND").map(|p| p.value.trim().to_string());
    record.external_id = props
        .get("UID")
        .map(|p| p.value.trim().to_string())
        .filter(|s| !s.is_empty());

    if let Some(location) = props.get("LOCATION") {
        let text = unescape_text(&location.value);
        let lines: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        record.venue = lines.first().map(|l| l.to_string());
        if !lines.is_empty() {
            record.address = Some(lines.join(", "));
        }
    }

    record.url = props
        .get("URL")
        .map(|p| p.value.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            props
                .get("DESCRIPTION")
                .and_then(|p| first_url(&unescape_text(&p.value)))
        });

    Some(record)
}

/// Split `NAME;PARAM=x;PARAM="y:z":value` at the first colon outside quotes
fn parse_property(line: &str) -> Option<(String, IcsProperty)> {
    let mut in_quotes = false;
    let mut split_at = None;
    for (idx, ch) in line.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ':' if !in_quotes => {
                split_at = Some(idx);
                break;
            }
            _ => {}
        }
    }
    let idx = split_at?;
    let (head, value) = (&line[..idx], &line[idx + 1..]);

    let mut parts = split_unquoted(head, ';').into_iter();
    let name = parts.next()?.trim().to_ascii_uppercase();
    if name.is_empty() {
        return None;
    }
    let mut params = HashMap::new();
    for part in parts {
        if let Some((key, val)) = part.split_once('=') {
            let key = key.trim().to_ascii_uppercase();
            let val = val.trim().trim_matches('"').to_string();
            if !key.is_empty() && !val.is_empty() {
                params.insert(key, val);
            }
        }
    }

    Some((name, IcsProperty { value: value.to_string(), params }))
}

fn split_unquoted(input: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (idx, ch) in input.char_indices() {
        if ch == '"' {
            in_quotes = !in_quotes;
        } else if ch == sep && !in_quotes {
            parts.push(&input[start..idx]);
            start = idx + ch.len_utf8();
        }
    }
    parts.push(&input[start..]);
    parts
}

/// Undo calendar text escaping (`\n`, `\,`, `\;`, `\\`)
fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(',') => out.push(','),
            Some(';') => out.push(';'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn first_url(text: &str) -> Option<String> {
    URL_IN_TEXT.find(text).map(|m| {
        m.as_str()
            .trim_end_matches(|c: char| matches!(c, '.' | ',' | ';' | ')' | ']'))
            .to_string()
    })
}

/// Fetch one feed and parse it; any failure yields an empty list
pub async fn fetch_feed(http: &dyn HttpClientPort, url: &str) -> Vec<RawEventRecord> {
    match try_fetch_feed(http, url).await {
        Ok(events) => {
            metrics::sources::request_success(CALENDAR_FEED_SOURCE);
            debug!(url, count = events.len(), "Parsed calendar feed");
            events
        }
        Err(e) => {
            metrics::sources::request_error(CALENDAR_FEED_SOURCE);
            warn!(url, error = %e, "Calendar feed unavailable, contributing no events");
            Vec::new()
        }
    }
}

async fn try_fetch_feed(http: &dyn HttpClientPort, url: &str) -> Result<Vec<RawEventRecord>> {
    let resp = http.get(url, None).await.map_err(AggregatorError::Http)?;
    if !resp.is_success() {
        return Err(AggregatorError::UnexpectedStatus { status: resp.status });
    }
    Ok(parse_calendar(&resp.text()))
}

/// Collector for a city's public calendar feeds; feeds are fetched concurrently
pub struct IcsFeedCollector {
    http: Arc<dyn HttpClientPort>,
}

impl IcsFeedCollector {
    pub fn new(http: Arc<dyn HttpClientPort>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl EventCollector for IcsFeedCollector {
    fn source(&self) -> EventSource {
        EventSource::CalendarFeed
    }

    #[instrument(skip(self, city, _window), fields(city = %city.key, feeds = city.calendar_feed_urls.len()))]
    async fn collect(&self, city: &CityContext, _window: &DateWindow) -> Vec<RawEventRecord> {
        let mut tasks = JoinSet::new();
        for (index, url) in city.calendar_feed_urls.iter().cloned().enumerate() {
            let http = Arc::clone(&self.http);
            tasks.spawn(async move { (index, fetch_feed(http.as_ref(), &url).await) });
        }

        let mut per_feed = Vec::with_capacity(city.calendar_feed_urls.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => per_feed.push(result),
                Err(e) => warn!(error = %e, "Calendar feed task aborted"),
            }
        }
        // Keep feed order stable regardless of completion order
        per_feed.sort_by_key(|(index, _)| *index);

        let events: Vec<RawEventRecord> = per_feed.into_iter().flat_map(|(_, ev)| ev).collect();
        metrics::sources::records_collected(CALENDAR_FEED_SOURCE, events.len());
        info!("Collected {} calendar feed events", events.len());
        events
    }
}
