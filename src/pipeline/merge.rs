use crate::models::{DailyRecord, OhlcvSeries};
use std::collections::HashSet;

/// Current record first, then history; first occurrence per date wins; newest first.
pub fn merge(current: Option<DailyRecord>, historical: Vec<DailyRecord>) -> OhlcvSeries {
    let current_date = current.as_ref().map(|r| r.date);

    let mut seen = HashSet::new();
    let mut records: Vec<DailyRecord> = current
        .into_iter()
        .chain(historical)
        .filter(|r| seen.insert(r.date))
        .collect();

    records.sort_by(|a, b| b.date.cmp(&a.date));
    OhlcvSeries::from_sorted(records, current_date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn rec(date: &str, close: f64) -> DailyRecord {
        DailyRecord {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            open: close,
            high: close + 0.5,
            low: close - 0.5,
            close,
            volume: "1M".into(),
        }
    }

    fn dates(s: &OhlcvSeries) -> Vec<String> {
        s.records().iter().map(|r| r.date.to_string()).collect()
    }

    #[test]
    fn current_record_wins_same_date() {
        let current = rec("2025-05-22", 9.50);
        let series = merge(
            Some(current.clone()),
            vec![rec("2025-05-22", 9.10), rec("2025-05-21", 9.40)],
        );
        let same_day: Vec<_> = series
            .records()
            .iter()
            .filter(|r| r.date.to_string() == "2025-05-22")
            .collect();
        assert_eq!(same_day, vec![&current]);
        assert_eq!(series.len(), 2);
    }

    #[test]
    fn output_is_date_descending() {
        let series = merge(
            None,
            vec![rec("2025-05-20", 9.0), rec("2025-05-22", 9.2), rec("2025-05-21", 9.1)],
        );
        assert_eq!(dates(&series), ["2025-05-22", "2025-05-21", "2025-05-20"]);
    }

    #[test]
    fn historical_duplicates_keep_first_seen() {
        let series = merge(None, vec![rec("2025-05-21", 9.4), rec("2025-05-21", 9.9)]);
        assert_eq!(series.len(), 1);
        assert_eq!(series.records()[0].close, 9.4);
    }

    #[test]
    fn older_current_record_still_sorted() {
        let series = merge(Some(rec("2025-05-19", 8.9)), vec![rec("2025-05-21", 9.4)]);
        assert_eq!(dates(&series), ["2025-05-21", "2025-05-19"]);
        assert_eq!(series.current().map(|r| r.close), Some(8.9));
    }

    #[test]
    fn empty_inputs_give_empty_series() {
        let series = merge(None, Vec::new());
        assert!(series.is_empty());
        assert!(series.current().is_none());
    }
}
