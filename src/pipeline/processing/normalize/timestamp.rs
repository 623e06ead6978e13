//! Provider timestamp grammar
//!
//! Every collector hands its native date string to [`parse_timestamp`], so all
//! sources share one set of rules:
//!
//! | form                     | meaning                                     |
//! |--------------------------|---------------------------------------------|
//! | `YYYYMMDD`               | midnight UTC of that date                   |
//! | `YYYYMMDDTHHMMSSZ`       | that UTC instant                            |
//! | `YYYYMMDDTHHMMSS`        | wall-clock in `zone`, UTC when absent       |
//! | RFC 3339                 | that instant                                |
//! | `YYYY-MM-DDTHH:MM:SS`    | wall-clock in `zone`, UTC when absent       |
//! | `YYYY-MM-DD`             | local midnight in `zone`, UTC when absent   |

use chrono::{
    DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Offset, SecondsFormat, TimeZone, Utc,
};
use chrono_tz::Tz;
use tracing::debug;

pub fn parse_timestamp(raw: &str, zone: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Some(date) = compact_date(raw) {
        return Some(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)));
    }

    if let Some((naive, is_utc)) = compact_date_time(raw) {
        return if is_utc {
            Some(Utc.from_utc_datetime(&naive))
        } else {
            wall_clock_to_utc(naive, zone)
        };
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return wall_clock_to_utc(naive, zone);
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return wall_clock_to_utc(date.and_time(NaiveTime::MIN), zone);
    }

    None
}

/// ISO string with millisecond precision, used in synthetic event ids
pub fn to_iso_millis(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Interpret `naive` as wall-clock time in the named zone.
///
/// The offset is looked up for that exact local date. Ambiguous times (DST
/// fall-back) resolve to the earlier instant. Times inside a spring-forward gap
/// use the offset in effect at the naive instant read as UTC. An unknown or
/// missing zone reads the digits as UTC.
pub fn wall_clock_to_utc(naive: NaiveDateTime, zone: Option<&str>) -> Option<DateTime<Utc>> {
    let Some(zone_name) = zone.map(str::trim).filter(|z| !z.is_empty()) else {
        return Some(Utc.from_utc_datetime(&naive));
    };
    let tz: Tz = match zone_name.parse() {
        Ok(tz) => tz,
        Err(_) => {
            debug!(zone = zone_name, "Unknown time zone, reading wall-clock value as UTC");
            return Some(Utc.from_utc_datetime(&naive));
        }
    };

    let local = tz.from_local_datetime(&naive);
    if let Some(dt) = local.earliest().or_else(|| local.latest()) {
        return Some(dt.with_timezone(&Utc));
    }

    let offset_secs = tz.offset_from_utc_datetime(&naive).fix().local_minus_utc();
    Some(Utc.from_utc_datetime(&(naive - Duration::seconds(offset_secs as i64))))
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn compact_date(raw: &str) -> Option<NaiveDate> {
    if raw.len() != 8 || !all_digits(raw) {
        return None;
    }
    let year = raw[0..4].parse().ok()?;
    let month = raw[4..6].parse().ok()?;
    let day = raw[6..8].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// `YYYYMMDDTHHMMSS` with an optional trailing `Z`; the flag reports the `Z`
fn compact_date_time(raw: &str) -> Option<(NaiveDateTime, bool)> {
    let (body, is_utc) = match raw.strip_suffix('Z').or_else(|| raw.strip_suffix('z')) {
        Some(body) => (body, true),
        None => (raw, false),
    };
    if body.len() != 15 || body.as_bytes()[8] != b'T' {
        return None;
    }
    let date = compact_date(&body[0..8])?;
    let time_part = &body[9..];
    if !all_digits(time_part) {
        return None;
    }
    let hour = time_part[0..2].parse().ok()?;
    let minute = time_part[2..4].parse().ok()?;
    let second = time_part[4..6].parse().ok()?;
    let time = NaiveTime::from_hms_opt(hour, minute, second)?;
    Some((date.and_time(time), is_utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_compact_date_only_is_midnight_utc() {
        assert_eq!(parse_timestamp("20251125", None), Some(utc(2025, 11, 25, 0, 0, 0)));
        // The zone does not move date-only values
        assert_eq!(
            parse_timestamp("20251125", Some("America/Denver")),
            Some(utc(2025, 11, 25, 0, 0, 0))
        );
    }

    #[test]
    fn test_compact_utc_date_time() {
        assert_eq!(parse_timestamp("20251125T190000Z", None), Some(utc(2025, 11, 25, 19, 0, 0)));
    }

    #[test]
    fn test_compact_wall_clock_uses_zone_offset_for_that_date() {
        // MST (UTC-7) in November, MDT (UTC-6) in July
        assert_eq!(
            parse_timestamp("20251125T190000", Some("America/Denver")),
            Some(utc(2025, 11, 26, 2, 0, 0))
        );
        assert_eq!(
            parse_timestamp("20250704T190000", Some("America/Denver")),
            Some(utc(2025, 7, 5, 1, 0, 0))
        );
    }

    #[test]
    fn test_compact_wall_clock_without_zone_is_utc() {
        assert_eq!(parse_timestamp("20251125T190000", None), Some(utc(2025, 11, 25, 19, 0, 0)));
        assert_eq!(
            parse_timestamp("20251125T190000", Some("Not/AZone")),
            Some(utc(2025, 11, 25, 19, 0, 0))
        );
    }

    #[test]
    fn test_spring_forward_gap_still_resolves() {
        // 02:30 does not exist in Denver on 2025-03-09
        let parsed = parse_timestamp("20250309T023000", Some("America/Denver"));
        assert_eq!(parsed, Some(utc(2025, 3, 9, 9, 30, 0)));
    }

    #[test]
    fn test_iso_forms() {
        assert_eq!(
            parse_timestamp("2025-11-25T19:00:00Z", None),
            Some(utc(2025, 11, 25, 19, 0, 0))
        );
        assert_eq!(
            parse_timestamp("2025-11-25T12:00:00-07:00", None),
            Some(utc(2025, 11, 25, 19, 0, 0))
        );
        assert_eq!(
            parse_timestamp("2025-11-25", Some("America/Denver")),
            Some(utc(2025, 11, 25, 7, 0, 0))
        );
        assert_eq!(
            parse_timestamp("2025-11-25T20:00:00", Some("America/New_York")),
            Some(utc(2025, 11, 26, 1, 0, 0))
        );
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert_eq!(parse_timestamp("", None), None);
        assert_eq!(parse_timestamp("TBA", None), None);
        assert_eq!(parse_timestamp("20251340", None), None);
        assert_eq!(parse_timestamp("20251125T250000Z", None), None);
    }

    #[test]
    fn test_iso_millis_format() {
        assert_eq!(to_iso_millis(&utc(2025, 11, 25, 19, 0, 0)), "2025-11-25T19:00:00.000Z");
    }
}
