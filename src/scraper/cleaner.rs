use crate::models::UNKNOWN_VOLUME;
use chrono::{DateTime, NaiveDate, NaiveDateTime};

// ── Prices ────────────────────────────────────────────────────────────────────

/// Parse price: keep digits, dots and a leading minus, drop everything else.
/// "LKR 1,234.56" → 1234.56 | "9.50\u{a0}" → 9.5 | "N/A" → None
pub fn clean_price(s: &str) -> Option<f64> {
    let mut cleaned = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_ascii_digit() || c == '.' {
            cleaned.push(c);
        } else if c == '-' && cleaned.is_empty() {
            cleaned.push(c);
        }
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

// ── Volume ────────────────────────────────────────────────────────────────────

/// Volume stays a display string; blanks become "unknown".
pub fn clean_volume(s: &str) -> String {
    let s = s.trim();
    if s.is_empty() || s == "N/A" || s == "-" || s == "—" {
        UNKNOWN_VOLUME.to_string()
    } else {
        s.to_string()
    }
}

/// Parse volume with K/M/B suffixes.
/// "1.2M" → 1,200,000 | "345K" → 345,000 | "12,345" → 12345
pub fn parse_volume_shorthand(s: &str) -> Option<i64> {
    let s = s.trim().to_uppercase().replace(',', "");

    if s.is_empty() || s == "N/A" || s == "-" || s == "—" || s == "UNKNOWN" {
        return None;
    }

    let (num_str, multiplier) = if let Some(n) = s.strip_suffix('B') {
        (n, 1_000_000_000.0)
    } else if let Some(n) = s.strip_suffix('M') {
        (n, 1_000_000.0)
    } else if let Some(n) = s.strip_suffix('K') {
        (n, 1_000.0)
    } else {
        return s.parse().ok();
    };

    let num: f64 = num_str.trim().parse().ok()?;
    Some((num * multiplier) as i64)
}

// ── Dates ─────────────────────────────────────────────────────────────────────

const DATE_FORMATS: &[&str] = &[
    "%b %d, %Y", // May 22, 2025
    "%Y-%m-%d",
    "%m/%d/%Y", // US order before day-first
    "%d/%m/%Y",
    "%d %b %Y",
    "%d.%m.%Y",
];

/// Normalise a table date cell to a calendar date.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }

    // "2025-05-22 00:00:00", "2025-05-22T00:00:00Z"
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.date());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    s.get(..10)
        .and_then(|head| NaiveDate::parse_from_str(head, "%Y-%m-%d").ok())
}

/// Unix seconds (or milliseconds) as found in embedded page state.
pub fn date_from_timestamp(ts: i64) -> Option<NaiveDate> {
    let secs = if ts > 100_000_000_000 { ts / 1000 } else { ts };
    DateTime::from_timestamp(secs, 0).map(|dt| dt.date_naive())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
