use crate::models::{DailyRecord, RecordCandidate};
use crate::scraper::cleaner::{clean_price, clean_volume, date_from_timestamp, parse_date};
use crate::scraper::selectors::{element_text, HtmlPage};
use crate::validator::validate;
use regex::Regex;
use scraper::{ElementRef, Selector};
use serde_json::Value;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

// ── Column layouts ────────────────────────────────────────────────────────────

/// Positional column orders seen on the historical table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnLayout {
    /// Date, Close, Open, High, Low, Volume
    CloseFirst,
    /// Date, Open, High, Low, Close, Volume
    OpenFirst,
}

impl ColumnLayout {
    /// Trial order for every row.
    pub const TRIAL_ORDER: [ColumnLayout; 2] = [ColumnLayout::CloseFirst, ColumnLayout::OpenFirst];

    fn candidate(self, cells: &[String]) -> RecordCandidate {
        let num = |i: usize| cells.get(i).and_then(|c| clean_price(c));
        let (open, high, low, close) = match self {
            ColumnLayout::CloseFirst => (num(2), num(3), num(4), num(1)),
            ColumnLayout::OpenFirst => (num(1), num(2), num(3), num(4)),
        };
        RecordCandidate {
            date: cells.first().and_then(|c| parse_date(c)),
            open,
            high,
            low,
            close,
            volume: cells.get(5).map(|v| clean_volume(v)),
        }
    }
}

const MIN_POPULATED_CELLS: usize = 5;

/// Accept a row under the first layout that validates.
pub fn parse_row(cells: &[String]) -> Option<(ColumnLayout, DailyRecord)> {
    let populated = cells.iter().filter(|c| !c.trim().is_empty()).count();
    if populated < MIN_POPULATED_CELLS {
        return None;
    }

    for layout in ColumnLayout::TRIAL_ORDER {
        match validate(&layout.candidate(cells)) {
            Ok(record) => return Some((layout, record)),
            Err(e) => debug!("row {:?} rejected as {:?}: {}", cells.first(), layout, e),
        }
    }
    None
}

/// Accept rows in order until `max_days` records validate.
pub fn parse_rows<I>(rows: I, max_days: usize) -> Vec<DailyRecord>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut records = Vec::new();
    if max_days == 0 {
        return records;
    }
    for cells in rows {
        if let Some((_, record)) = parse_row(&cells) {
            records.push(record);
            if records.len() >= max_days {
                break;
            }
        }
    }
    records
}

// ── Parser ────────────────────────────────────────────────────────────────────

/// Locates the historical table (or its embedded-data stand-in) and turns it into records.
pub struct HistoricalTableParser<'a> {
    table_locators: &'a [String],
    keywords: &'a [String],
    quorum: usize,
}

impl<'a> HistoricalTableParser<'a> {
    pub fn new(table_locators: &'a [String], keywords: &'a [String], quorum: usize) -> Self {
        Self {
            table_locators,
            keywords,
            quorum,
        }
    }

    pub fn parse(&self, page: &HtmlPage, max_days: usize) -> Vec<DailyRecord> {
        if let Some(table) = self.locate_table(page) {
            let (Ok(tr_sel), Ok(cell_sel)) = (Selector::parse("tr"), Selector::parse("td")) else {
                return Vec::new();
            };
            let records = parse_rows(table_rows(table, &tr_sel, &cell_sel), max_days);
            info!("historical table: {} valid records", records.len());
            return records;
        }

        warn!("could not find historical data table");
        match embedded_records(page.markup(), max_days) {
            Some(records) => {
                info!("embedded page data: {} valid records", records.len());
                records
            }
            None => Vec::new(),
        }
    }

    fn locate_table<'p>(&self, page: &'p HtmlPage) -> Option<ElementRef<'p>> {
        for candidate in self.table_locators {
            if let Some(el) = page.first(candidate) {
                if !element_text(&el).is_empty() {
                    debug!("found table using selector {:?}", candidate);
                    return Some(el);
                }
            }
        }

        let sel = Selector::parse("table").ok()?;
        let found = page
            .document()
            .select(&sel)
            .find(|t| self.keyword_hits(&element_text(t).to_lowercase()) >= self.quorum);
        if found.is_some() {
            debug!("found table by keyword quorum");
        }
        found
    }

    fn keyword_hits(&self, text: &str) -> usize {
        self.keywords
            .iter()
            .filter(|k| text.contains(k.to_lowercase().as_str()))
            .count()
    }
}

/// Cell texts per row, header row excluded. Rows are read only as they are pulled.
fn table_rows<'a>(
    table: ElementRef<'a>,
    tr_sel: &'a Selector,
    cell_sel: &'a Selector,
) -> impl Iterator<Item = Vec<String>> + 'a {
    table
        .select(tr_sel)
        .skip(1)
        .map(move |tr| tr.select(cell_sel).map(|td| element_text(&td)).collect())
}

// ── Embedded data recovery ────────────────────────────────────────────────────

static EMBEDDED_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"(?s)"historical"\s*:\s*(\[.*?\])"#,
        r#"(?s)"data"\s*:\s*(\[.*?\])"#,
        r#"(?s)window\.__INITIAL_STATE__\s*=\s*(\{.*?\});"#,
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

const DATE_KEYS: &[&str] = &["date", "rowDate", "rowDateTimestamp", "rowDateRaw", "Date"];
const OPEN_KEYS: &[&str] = &["open", "last_open", "last_openRaw", "Open"];
const HIGH_KEYS: &[&str] = &["high", "last_max", "last_maxRaw", "High"];
const LOW_KEYS: &[&str] = &["low", "last_min", "last_minRaw", "Low"];
const CLOSE_KEYS: &[&str] = &["close", "last_close", "last_closeRaw", "price", "Close", "Price"];
const VOLUME_KEYS: &[&str] = &["volume", "volumeRaw", "Volume"];

/// Rows recovered from a JSON block in the raw markup. `Some(empty)` means a
/// block parsed but held nothing usable; `None` means no block parsed.
pub fn embedded_records(markup: &str, max_days: usize) -> Option<Vec<DailyRecord>> {
    for re in EMBEDDED_PATTERNS.iter() {
        for caps in re.captures_iter(markup) {
            let Some(block) = caps.get(1) else { continue };
            let Ok(value) = serde_json::from_str::<Value>(block.as_str()) else { continue };
            debug!("embedded block matched {:?}", re.as_str());
            return Some(records_from_json(&value, max_days));
        }
    }
    None
}

fn records_from_json(value: &Value, max_days: usize) -> Vec<DailyRecord> {
    let Some(items) = find_rows_array(value) else {
        return Vec::new();
    };

    let mut records = Vec::new();
    for item in items {
        if records.len() >= max_days {
            break;
        }
        let accepted = match item {
            Value::Object(_) => validate(&keyed_candidate(item)).ok(),
            Value::Array(cells) => {
                let cells: Vec<String> = cells.iter().map(json_text).collect();
                parse_row(&cells).map(|(_, r)| r)
            }
            _ => None,
        };
        records.extend(accepted);
    }
    records
}

/// The array itself, or the first nested "historical"/"data" array of an object.
fn find_rows_array(value: &Value) -> Option<&Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        Value::Object(map) => {
            for key in ["historical", "historicalData", "data"] {
                if let Some(Value::Array(items)) = map.get(key) {
                    return Some(items);
                }
            }
            map.values().find_map(|v| match v {
                Value::Object(_) => find_rows_array(v),
                _ => None,
            })
        }
        _ => None,
    }
}

fn keyed_candidate(item: &Value) -> RecordCandidate {
    let lookup = |keys: &[&str]| keys.iter().find_map(|k| item.get(*k)).filter(|v| !v.is_null());
    let price = |keys: &[&str]| lookup(keys).and_then(|v| clean_price(&json_text(v)));

    let date = lookup(DATE_KEYS).and_then(|v| match v {
        Value::Number(n) => n.as_i64().and_then(date_from_timestamp),
        other => parse_date(&json_text(other)),
    });

    RecordCandidate {
        date,
        open: price(OPEN_KEYS),
        high: price(HIGH_KEYS),
        low: price(LOW_KEYS),
        close: price(CLOSE_KEYS),
        volume: lookup(VOLUME_KEYS).map(|v| clean_volume(&json_text(v))),
    }
}

fn json_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn cells(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    fn keywords() -> Vec<String> {
        ["date", "open", "high", "low", "close", "price"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn table_html(class: &str, rows: usize) -> String {
        let mut html = format!(
            "<html><body><table class=\"{class}\"><tr><th>Date</th><th>Price</th><th>Open</th>\
             <th>High</th><th>Low</th><th>Vol.</th></tr>"
        );
        let start = NaiveDate::from_ymd_opt(2025, 5, 22).unwrap();
        for i in 0..rows {
            let date = start - chrono::Duration::days(i as i64);
            html.push_str(&format!(
                "<tr><td>{}</td><td>9.40</td><td>9.30</td><td>9.60</td><td>9.25</td><td>2.20M</td></tr>",
                date.format("%b %d, %Y")
            ));
        }
        html.push_str("</table></body></html>");
        html
    }

    #[test]
    fn close_first_layout_is_tried_first() {
        let row = cells(&["2025-05-21", "9.40", "9.30", "9.60", "9.25", "2,200,000"]);
        let (layout, r) = parse_row(&row).unwrap();
        assert_eq!(layout, ColumnLayout::CloseFirst);
        assert_eq!((r.open, r.high, r.low, r.close), (9.30, 9.60, 9.25, 9.40));
        assert_eq!(r.volume, "2,200,000");
        assert_eq!(r.date, NaiveDate::from_ymd_opt(2025, 5, 21).unwrap());
    }

    #[test]
    fn open_first_layout_when_only_it_validates() {
        // As close-first: high 9.25 < low 9.45, rejected.
        let row = cells(&["2025-05-20", "9.30", "9.60", "9.25", "9.45", "1.1M"]);
        let (layout, r) = parse_row(&row).unwrap();
        assert_eq!(layout, ColumnLayout::OpenFirst);
        assert_eq!((r.open, r.high, r.low, r.close), (9.30, 9.60, 9.25, 9.45));
    }

    #[test]
    fn row_valid_under_neither_layout_is_skipped() {
        let row = cells(&["2025-05-20", "1", "2", "3", "4", "5"]);
        // close-first: high 3 < low 4. open-first: high 2 < low 3.
        assert!(parse_row(&row).is_none());
    }

    #[test]
    fn short_rows_are_skipped() {
        assert!(parse_row(&cells(&["2025-05-20", "9.4", "9.3", "9.6"])).is_none());
        assert!(parse_row(&cells(&["2025-05-20", "9.4", "", "9.6", "9.25", ""])).is_none());
    }

    #[test]
    fn five_cells_without_volume_are_enough() {
        let (_, r) = parse_row(&cells(&["2025-05-21", "9.40", "9.30", "9.60", "9.25"])).unwrap();
        assert_eq!(r.volume, crate::models::UNKNOWN_VOLUME);
    }

    #[test]
    fn max_days_bounds_accepted_records() {
        let html = table_html("historical-data-table", 200);
        let page = HtmlPage::parse(&html);
        let locators = vec!["table.historical-data-table".to_string()];
        let kw = keywords();
        let records = HistoricalTableParser::new(&locators, &kw, 3).parse(&page, 5);
        assert_eq!(records.len(), 5);
        assert_eq!(records[0].date, NaiveDate::from_ymd_opt(2025, 5, 22).unwrap());
        assert_eq!(records[4].date, NaiveDate::from_ymd_opt(2025, 5, 18).unwrap());
    }

    #[test]
    fn row_scan_stops_at_bound() {
        let html = table_html("historical-data-table", 200);
        let page = HtmlPage::parse(&html);
        let table = page.first("table.historical-data-table").unwrap();
        let (tr, td) = (Selector::parse("tr").unwrap(), Selector::parse("td").unwrap());

        let pulled = std::cell::Cell::new(0);
        let rows = table_rows(table, &tr, &td).inspect(|_| pulled.set(pulled.get() + 1));
        assert_eq!(parse_rows(rows, 5).len(), 5);
        assert_eq!(pulled.get(), 5);
    }

    #[test]
    fn keyword_scan_finds_unlabelled_table() {
        let html = format!(
            "<html><body><table><tr><td>nav</td></tr></table>{}</body></html>",
            table_html("renamed-xyz", 3)
        );
        let page = HtmlPage::parse(&html);
        let locators = vec!["table.historical-data-table".to_string()];
        let kw = keywords();
        let records = HistoricalTableParser::new(&locators, &kw, 3).parse(&page, 30);
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn embedded_json_is_used_when_no_table() {
        let html = r#"<html><body><script>
            var x = {"historical": [
              {"rowDate": "May 22, 2025", "last_close": "9.50", "last_open": "9.40",
               "last_max": "9.60", "last_min": "9.35", "volume": "2.5M"},
              {"rowDate": "May 21, 2025", "last_close": "9.40", "last_open": "9.30",
               "last_max": "9.10", "last_min": "9.25", "volume": "2.2M"}
            ]};
        </script></body></html>"#;
        let page = HtmlPage::parse(html);
        let locators = vec!["table.historical-data-table".to_string()];
        let kw = keywords();
        let records = HistoricalTableParser::new(&locators, &kw, 3).parse(&page, 30);
        // Second entry breaks the invariant and is dropped.
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].close, 9.5);
        assert_eq!(records[0].volume, "2.5M");
    }

    #[test]
    fn embedded_patterns_all_compile() {
        assert_eq!(EMBEDDED_PATTERNS.len(), 3);
    }

    #[test]
    fn unusable_embedded_block_yields_empty() {
        let html = r#"<script>window.__INITIAL_STATE__ = {"quote": {"name": "x"}};</script>"#;
        let page = HtmlPage::parse(html);
        let kw = keywords();
        let records = HistoricalTableParser::new(&[], &kw, 3).parse(&page, 30);
        assert!(records.is_empty());
        assert_eq!(embedded_records(html, 30), Some(Vec::new()));
        assert_eq!(embedded_records("<p>nothing</p>", 30), None);
    }
}
