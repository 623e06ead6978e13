use std::collections::{BTreeMap, HashSet};

use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::FUZZY_DUPLICATE_THRESHOLD;
use crate::pipeline::processing::bucketize::local_day_key;
use crate::types::NormalizedEvent;

static SPORTS_MATCHUP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+?)\s+(?:vs|at)\s+(.+)$").expect("valid matchup regex"));

static PROMOTIONAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:sales?|discounts?|coupons?|grand opening|doorbusters?|clearance|bogo|promo|promotions?)\b",
    )
    .expect("valid promotional regex")
});

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "of", "in", "at", "on", "for", "with", "to", "from", "by", "live",
    "tour", "show", "concert", "game", "match", "vs", "night", "festival", "dj", "band",
    "orchestra", "symphony", "present", "presents",
];

/// Counters describing one deduplication pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupReport {
    pub input: usize,
    pub blocked: usize,
    pub sports_merged: usize,
    pub fuzzy_merged: usize,
    pub kept: usize,
}

/// How an incoming event matched one already kept for its day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateMatch {
    Sports,
    Fuzzy,
}

/// Trait for collapsing listings of the same real-world event
pub trait Deduplicator {
    /// Remove promotional noise and duplicates. Days are local to `zone`.
    fn dedupe(&self, events: Vec<NormalizedEvent>, zone: Tz) -> (Vec<NormalizedEvent>, DedupReport);
}

/// Sports-signature and token-Jaccard deduplicator
#[derive(Debug, Clone)]
pub struct DefaultDeduplicator {
    pub threshold: f64,
    pub drop_promotional: bool,
}

impl Default for DefaultDeduplicator {
    fn default() -> Self {
        Self {
            threshold: FUZZY_DUPLICATE_THRESHOLD,
            drop_promotional: true,
        }
    }
}

/// Per-event signatures computed once per pass
struct Candidate {
    event: NormalizedEvent,
    sports: Option<String>,
    tokens: HashSet<String>,
}

impl Candidate {
    fn new(event: NormalizedEvent) -> Self {
        let sports = sports_signature(&event.title);
        let tokens = tokenize(&event.title);
        Self { event, sports, tokens }
    }
}

impl DefaultDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    fn match_kind(&self, kept: &Candidate, incoming: &Candidate) -> Option<DuplicateMatch> {
        if let (Some(a), Some(b)) = (&kept.sports, &incoming.sports) {
            if a == b {
                return Some(DuplicateMatch::Sports);
            }
        }
        if jaccard(&kept.tokens, &incoming.tokens) >= self.threshold {
            return Some(DuplicateMatch::Fuzzy);
        }
        None
    }

    fn dedupe_day(&self, mut day: Vec<Candidate>, report: &mut DedupReport) -> Vec<NormalizedEvent> {
        day.sort_by(|a, b| canonical_order(&a.event, &b.event));

        let mut kept: Vec<Candidate> = Vec::with_capacity(day.len());
        for incoming in day {
            let found = kept
                .iter()
                .enumerate()
                .find_map(|(i, k)| self.match_kind(k, &incoming).map(|m| (i, m)));
            match found {
                Some((i, kind)) => {
                    match kind {
                        DuplicateMatch::Sports => report.sports_merged += 1,
                        DuplicateMatch::Fuzzy => report.fuzzy_merged += 1,
                    }
                    debug!(kept = %kept[i].event.id, duplicate = %incoming.event.id, ?kind, "Merged duplicate listing");
                    // Never true after the canonical sort above, which puts the earliest start first
                    if incoming.event.start < kept[i].event.start {
                        kept[i] = incoming;
                    }
                }
                None => kept.push(incoming),
            }
        }
        kept.into_iter().map(|c| c.event).collect()
    }
}

impl Deduplicator for DefaultDeduplicator {
    fn dedupe(&self, events: Vec<NormalizedEvent>, zone: Tz) -> (Vec<NormalizedEvent>, DedupReport) {
        let mut report = DedupReport {
            input: events.len(),
            ..DedupReport::default()
        };

        let mut days: BTreeMap<String, Vec<Candidate>> = BTreeMap::new();
        for event in events {
            if self.drop_promotional && is_promotional(&event.title) {
                report.blocked += 1;
                continue;
            }
            days.entry(local_day_key(&event.start, zone))
                .or_default()
                .push(Candidate::new(event));
        }

        let mut kept: Vec<NormalizedEvent> = days
            .into_values()
            .flat_map(|day| self.dedupe_day(day, &mut report))
            .collect();
        kept.sort_by(canonical_order);

        report.kept = kept.len();
        (kept, report)
    }
}

/// Total order used to make deduplication independent of arrival order
pub fn canonical_order(a: &NormalizedEvent, b: &NormalizedEvent) -> std::cmp::Ordering {
    a.start
        .cmp(&b.start)
        .then_with(|| a.source.cmp(&b.source))
        .then_with(|| a.id.cmp(&b.id))
        .then_with(|| a.title.cmp(&b.title))
        .then_with(|| a.end.cmp(&b.end))
        .then_with(|| a.venue.cmp(&b.venue))
        .then_with(|| a.address.cmp(&b.address))
        .then_with(|| a.url.cmp(&b.url))
        .then_with(|| a.is_free.cmp(&b.is_free))
        .then_with(|| cmp_coordinate(a.latitude, b.latitude))
        .then_with(|| cmp_coordinate(a.longitude, b.longitude))
}

fn cmp_coordinate(a: Option<f64>, b: Option<f64>) -> std::cmp::Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        _ => a.is_some().cmp(&b.is_some()),
    }
}

/// Lowercase, unify `&`, strip quotes and punctuation, collapse whitespace
pub fn normalize_title(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.to_lowercase().chars() {
        match c {
            '&' => out.push_str(" and "),
            '\'' | '\u{2019}' | '"' => {}
            '.' | ',' | '!' | '?' | ':' | ';' | '(' | ')' | '[' | ']' | '{' | '}' => out.push(' '),
            _ => out.push(c),
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `sports:<a>__<b>` with the two sides sorted, when the title reads as a matchup
pub fn sports_signature(title: &str) -> Option<String> {
    let normalized = normalize_title(title);
    let caps = SPORTS_MATCHUP.captures(&normalized)?;
    let mut sides = [caps[1].trim().to_string(), caps[2].trim().to_string()];
    sides.sort();
    Some(format!("sports:{}__{}", sides[0], sides[1]))
}

/// Significant title tokens: alphanumeric, longer than two chars, not stopwords
pub fn tokenize(title: &str) -> HashSet<String> {
    let cleaned: String = normalize_title(title)
        .chars()
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace() { c } else { ' ' })
        .collect();
    cleaned
        .split_whitespace()
        .filter(|w| w.len() > 2 && !STOP_WORDS.contains(w))
        .map(str::to_string)
        .collect()
}

/// Jaccard similarity; two empty sets are identical
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

pub fn is_promotional(title: &str) -> bool {
    PROMOTIONAL.is_match(&normalize_title(title))
}
