//! Timestamp recognition.
//!
//! The set of recognized formats is fixed:
//!
//! - syslog-style `Mon DD HH:MM:SS[.ffffff]` (single- and double-digit day,
//!   year assumed to be the current UTC year),
//! - RFC 3339 / ISO 8601 with optional fractional seconds and zone,
//! - `YYYY-MM-DD HH:MM:SS[.fff]` (naive, treated as UTC),
//! - Unix epoch seconds or milliseconds, but only via the `ts`/`time` field
//!   keys (see [`parse_epoch`]).
//!
//! Anything else leaves the entry's timestamp empty; the verbatim text stays
//! in `raw`.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, TimeZone, Utc};

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// A timestamp recognized at the start of a string slice.
#[derive(Debug, Clone, PartialEq)]
pub struct Scan {
    /// Number of bytes consumed from the input.
    pub len: usize,
    pub instant: DateTime<Utc>,
}

/// Try to recognize a timestamp at the very start of `text`.
pub fn scan(text: &str) -> Option<Scan> {
    scan_iso(text).or_else(|| scan_syslog(text))
}

/// True when a recognizable timestamp starts anywhere within the first
/// `limit` bytes. Used by the line assembler's entry-boundary heuristic.
pub fn appears_within(text: &str, limit: usize) -> bool {
    let end = text.len().min(limit);
    for start in 0..end {
        if !text.is_char_boundary(start) {
            continue;
        }
        if scan(&text[start..]).is_some() {
            return true;
        }
    }
    false
}

/// Parse a free-standing timestamp string (JSON `time`/`timestamp` values).
/// The whole string must be consumed.
pub fn parse_text(text: &str) -> Option<DateTime<Utc>> {
    let trimmed = text.trim();
    match scan(trimmed) {
        Some(s) if s.len == trimmed.len() => Some(s.instant),
        _ => None,
    }
}

/// Epoch seconds or milliseconds. Values above 10^12 are milliseconds,
/// everything else seconds.
pub fn parse_epoch(value: i64) -> Option<DateTime<Utc>> {
    if value > 1_000_000_000_000 {
        DateTime::from_timestamp_millis(value)
    } else {
        DateTime::from_timestamp(value, 0)
    }
}

fn digits(bytes: &[u8], at: usize, n: usize) -> bool {
    bytes.len() >= at + n && bytes[at..at + n].iter().all(|b| b.is_ascii_digit())
}

fn num(bytes: &[u8], at: usize, n: usize) -> u32 {
    bytes[at..at + n]
        .iter()
        .fold(0, |acc, b| acc * 10 + (b - b'0') as u32)
}

/// `YYYY-MM-DD[T ]HH:MM:SS[.frac][Z|±HH:MM|±HHMM]`
fn scan_iso(text: &str) -> Option<Scan> {
    let b = text.as_bytes();
    if !(digits(b, 0, 4) && b.get(4) == Some(&b'-') && digits(b, 5, 2) && b.get(7) == Some(&b'-') && digits(b, 8, 2)) {
        return None;
    }
    let sep = *b.get(10)?;
    if sep != b'T' && sep != b' ' {
        return None;
    }
    if !(digits(b, 11, 2) && b.get(13) == Some(&b':') && digits(b, 14, 2) && b.get(16) == Some(&b':') && digits(b, 17, 2)) {
        return None;
    }

    let mut end = 19;
    if b.get(end) == Some(&b'.') {
        let frac_start = end + 1;
        let mut i = frac_start;
        while i < b.len() && b[i].is_ascii_digit() {
            i += 1;
        }
        if i == frac_start {
            return None;
        }
        end = i;
    }

    // Optional zone: Z, ±HH:MM, or ±HHMM
    let zone_len = match b.get(end) {
        Some(&b'Z') => 1,
        Some(&sign) if sign == b'+' || sign == b'-' => {
            if digits(b, end + 1, 2) && b.get(end + 3) == Some(&b':') && digits(b, end + 4, 2) {
                6
            } else if digits(b, end + 1, 4) {
                5
            } else {
                0
            }
        }
        _ => 0,
    };

    let slice = &text[..end + zone_len];
    let instant = if zone_len > 0 {
        // Normalize the separator so the RFC 3339 parser accepts it.
        let normalized;
        let parseable = if sep == b' ' {
            normalized = slice.replacen(' ', "T", 1);
            normalized.as_str()
        } else {
            slice
        };
        DateTime::<FixedOffset>::parse_from_rfc3339(parseable)
            .ok()?
            .with_timezone(&Utc)
    } else {
        let fmt = if sep == b'T' { "%Y-%m-%dT%H:%M:%S%.f" } else { "%Y-%m-%d %H:%M:%S%.f" };
        let naive = chrono::NaiveDateTime::parse_from_str(slice, fmt).ok()?;
        Utc.from_utc_datetime(&naive)
    };

    Some(Scan { len: end + zone_len, instant })
}

/// `Mon DD HH:MM:SS[.ffffff]`, e.g. `Oct  3 19:57:52.076536`.
fn scan_syslog(text: &str) -> Option<Scan> {
    let b = text.as_bytes();
    if b.len() < 3 {
        return None;
    }
    let month = MONTHS.iter().position(|m| text.starts_with(m))? as u32 + 1;

    let mut i = 3;
    if b.get(i) != Some(&b' ') {
        return None;
    }
    while i < b.len() && b[i] == b' ' {
        i += 1;
    }
    let day_start = i;
    while i < b.len() && b[i].is_ascii_digit() {
        i += 1;
    }
    let day_len = i - day_start;
    if day_len == 0 || day_len > 2 {
        return None;
    }
    let day = num(b, day_start, day_len);

    if b.get(i) != Some(&b' ') {
        return None;
    }
    i += 1;
    if !(digits(b, i, 2) && b.get(i + 2) == Some(&b':') && digits(b, i + 3, 2) && b.get(i + 5) == Some(&b':') && digits(b, i + 6, 2)) {
        return None;
    }
    let (hour, min, sec) = (num(b, i, 2), num(b, i + 3, 2), num(b, i + 6, 2));
    i += 8;

    let mut nanos: u32 = 0;
    if b.get(i) == Some(&b'.') {
        let frac_start = i + 1;
        let mut j = frac_start;
        while j < b.len() && b[j].is_ascii_digit() && j - frac_start < 9 {
            j += 1;
        }
        if j == frac_start {
            return None;
        }
        let frac_len = j - frac_start;
        nanos = num(b, frac_start, frac_len) * 10u32.pow(9 - frac_len as u32);
        i = j;
    }

    // No year on the wire; assume the current one.
    let date = NaiveDate::from_ymd_opt(Utc::now().year(), month, day)?;
    let time = chrono::NaiveTime::from_hms_nano_opt(hour, min, sec, nanos)?;
    Some(Scan {
        len: i,
        instant: Utc.from_utc_datetime(&date.and_time(time)),
    })
}
