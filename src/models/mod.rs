use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::scraper::cleaner::parse_volume_shorthand;

/// Display value for a volume the source did not expose.
pub const UNKNOWN_VOLUME: &str = "unknown";

// ── Daily record ──────────────────────────────────────────────────────────────

/// One validated trading day. Only `validator::validate` builds these.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyRecord {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: String,
}

impl DailyRecord {
    /// Export row: Date, Open, High, Low, Close, Volume.
    pub fn export_row(&self) -> [String; 6] {
        [
            self.date.format("%Y-%m-%d").to_string(),
            format!("{:.2}", self.open),
            format!("{:.2}", self.high),
            format!("{:.2}", self.low),
            format!("{:.2}", self.close),
            self.volume.clone(),
        ]
    }

    /// Volume as a share count when the display string is readable ("2.5M", "2,200,000").
    pub fn volume_units(&self) -> Option<i64> {
        parse_volume_shorthand(&self.volume)
    }
}

/// Unvalidated fields for one day, as cleaned from a page or a table row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordCandidate {
    pub date: Option<NaiveDate>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<String>,
}

// ── Current-day extraction ────────────────────────────────────────────────────

/// Partial quote fields produced by one backend attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentFields {
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub previous_close: Option<f64>,
    pub volume: Option<String>,
    pub fetched_at: NaiveDateTime,
}

impl CurrentFields {
    pub fn empty(fetched_at: NaiveDateTime) -> Self {
        Self {
            open: None,
            high: None,
            low: None,
            close: None,
            previous_close: None,
            volume: None,
            fetched_at,
        }
    }

    pub fn set(&mut self, field: Field, text: &str) {
        use crate::scraper::cleaner::{clean_price, clean_volume};
        match field {
            Field::Close => self.close = clean_price(text),
            Field::Open => self.open = clean_price(text),
            Field::High => self.high = clean_price(text),
            Field::Low => self.low = clean_price(text),
            Field::PreviousClose => self.previous_close = clean_price(text),
            Field::Volume => self.volume = Some(clean_volume(text)),
        }
    }

    pub fn has_close(&self) -> bool {
        self.close.is_some()
    }

    pub fn to_candidate(&self) -> RecordCandidate {
        RecordCandidate {
            date: Some(self.fetched_at.date()),
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume.clone(),
        }
    }
}

/// Validated current-day record plus the context it was extracted with.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CurrentQuote {
    pub record: DailyRecord,
    pub previous_close: Option<f64>,
    pub fetched_at: NaiveDateTime,
    pub backend: BackendKind,
}

impl CurrentQuote {
    pub fn change(&self) -> Option<f64> {
        self.previous_close.map(|prev| self.record.close - prev)
    }

    pub fn change_pct(&self) -> Option<f64> {
        match self.previous_close {
            Some(prev) if prev != 0.0 => Some((self.record.close - prev) / prev * 100.0),
            _ => None,
        }
    }
}

// ── Locators ──────────────────────────────────────────────────────────────────

/// Logical quote field resolved through a locator chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Close,
    Open,
    High,
    Low,
    Volume,
    PreviousClose,
}

impl Field {
    pub const ALL: [Field; 6] = [
        Field::Close,
        Field::Open,
        Field::High,
        Field::Low,
        Field::Volume,
        Field::PreviousClose,
    ];
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Close => "close",
            Field::Open => "open",
            Field::High => "high",
            Field::Low => "low",
            Field::Volume => "volume",
            Field::PreviousClose => "previous_close",
        };
        f.write_str(name)
    }
}

/// Ordered candidate selectors for one field; earlier entries win.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldLocator {
    pub field: Field,
    pub candidates: Vec<String>,
}

impl FieldLocator {
    pub fn new(field: Field, candidates: &[&str]) -> Self {
        Self {
            field,
            candidates: candidates.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// The locators a backend walks, one per field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(transparent)]
pub struct LocatorSet(pub Vec<FieldLocator>);

impl LocatorSet {
    pub fn get(&self, field: Field) -> Option<&FieldLocator> {
        self.0.iter().find(|l| l.field == field)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldLocator> {
        self.0.iter()
    }
}

/// First non-empty text found for a field, plus the candidate that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFieldMatch {
    pub field: Field,
    pub selector: String,
    pub text: String,
}

// ── Backends & policy ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Lightweight,
    Browser,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Lightweight => f.write_str("lightweight"),
            BackendKind::Browser => f.write_str("browser"),
        }
    }
}

/// Which backends the current-day fetch may use, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FetchPolicy {
    LightweightOnly,
    BrowserOnly,
    #[default]
    LightweightThenBrowser,
}

impl FetchPolicy {
    pub fn order(self) -> &'static [BackendKind] {
        match self {
            FetchPolicy::LightweightOnly => &[BackendKind::Lightweight],
            FetchPolicy::BrowserOnly => &[BackendKind::Browser],
            FetchPolicy::LightweightThenBrowser => &[BackendKind::Lightweight, BackendKind::Browser],
        }
    }
}

// ── Series ────────────────────────────────────────────────────────────────────

/// Date-unique records, newest first. Built by `pipeline::merge`.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct OhlcvSeries {
    records: Vec<DailyRecord>,
    #[serde(skip)]
    current_date: Option<NaiveDate>,
}

impl OhlcvSeries {
    pub(crate) fn from_sorted(records: Vec<DailyRecord>, current_date: Option<NaiveDate>) -> Self {
        Self { records, current_date }
    }

    pub fn records(&self) -> &[DailyRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn latest(&self) -> Option<&DailyRecord> {
        self.records.first()
    }

    pub fn oldest(&self) -> Option<&DailyRecord> {
        self.records.last()
    }

    /// The entry contributed by the current-day fetch, if one was merged.
    pub fn current(&self) -> Option<&DailyRecord> {
        let date = self.current_date?;
        self.records.iter().find(|r| r.date == date)
    }

    /// Everything except the current-day entry.
    pub fn historical(&self) -> impl Iterator<Item = &DailyRecord> {
        let current = self.current_date;
        self.records.iter().filter(move |r| Some(r.date) != current)
    }

    pub fn summary(&self) -> SeriesSummary {
        let average_close = if self.records.is_empty() {
            None
        } else {
            Some(self.records.iter().map(|r| r.close).sum::<f64>() / self.records.len() as f64)
        };

        let volumes: Vec<i64> = self.records.iter().filter_map(|r| r.volume_units()).collect();
        // None when nothing parsed or the sum leaves i64
        let total_volume = if volumes.is_empty() {
            None
        } else {
            volumes.iter().try_fold(0i64, |acc, v| acc.checked_add(*v))
        };

        SeriesSummary {
            records: self.records.len(),
            latest: self.latest().map(|r| r.date),
            oldest: self.oldest().map(|r| r.date),
            average_close,
            total_volume,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SeriesSummary {
    pub records: usize,
    pub latest: Option<NaiveDate>,
    pub oldest: Option<NaiveDate>,
    pub average_close: Option<f64>,
    pub total_volume: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(date: &str, close: f64, volume: &str) -> DailyRecord {
        DailyRecord {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            open: close,
            high: close + 0.2,
            low: close - 0.1,
            close,
            volume: volume.to_string(),
        }
    }

    #[test]
    fn export_row_rounds_to_two_places() {
        let r = DailyRecord {
            date: NaiveDate::from_ymd_opt(2025, 5, 22).unwrap(),
            open: 9.4,
            high: 9.6049,
            low: 9.35,
            close: 9.5,
            volume: "2.50M".into(),
        };
        assert_eq!(
            r.export_row(),
            ["2025-05-22", "9.40", "9.60", "9.35", "9.50", "2.50M"].map(String::from)
        );
    }

    #[test]
    fn change_against_previous_close() {
        let quote = CurrentQuote {
            record: record("2025-05-22", 10.0, UNKNOWN_VOLUME),
            previous_close: Some(8.0),
            fetched_at: NaiveDate::from_ymd_opt(2025, 5, 22)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
            backend: BackendKind::Lightweight,
        };
        assert_eq!(quote.change(), Some(2.0));
        assert_eq!(quote.change_pct(), Some(25.0));
    }

    #[test]
    fn summary_skips_unreadable_volumes() {
        let series = OhlcvSeries::from_sorted(
            vec![
                record("2025-05-22", 9.5, "2.5M"),
                record("2025-05-21", 9.4, UNKNOWN_VOLUME),
                record("2025-05-20", 9.3, "500K"),
            ],
            Some(NaiveDate::from_ymd_opt(2025, 5, 22).unwrap()),
        );
        let s = series.summary();
        assert_eq!(s.records, 3);
        assert_eq!(s.latest, NaiveDate::from_ymd_opt(2025, 5, 22));
        assert_eq!(s.oldest, NaiveDate::from_ymd_opt(2025, 5, 20));
        assert_eq!(s.total_volume, Some(3_000_000));
        assert!((s.average_close.unwrap() - 9.4).abs() < 1e-9);
        assert_eq!(series.historical().count(), 2);
        assert_eq!(series.current().map(|r| r.close), Some(9.5));
    }

    #[test]
    fn summary_total_volume_overflow_is_unknown() {
        let series = OhlcvSeries::from_sorted(
            vec![
                record("2025-05-22", 9.5, "6000000000B"),
                record("2025-05-21", 9.4, "6000000000B"),
            ],
            None,
        );
        let s = series.summary();
        assert_eq!(s.records, 2);
        assert_eq!(s.total_volume, None);
    }

    #[test]
    fn fallback_policy_tries_lightweight_first() {
        assert_eq!(
            FetchPolicy::LightweightThenBrowser.order(),
            &[BackendKind::Lightweight, BackendKind::Browser]
        );
        assert_eq!(FetchPolicy::BrowserOnly.order(), &[BackendKind::Browser]);
    }
}
