pub mod browser;
pub mod cleaner;
pub mod http_client;
pub mod lightweight;
pub mod parsers;
pub mod selectors;

use crate::error::ExtractError;
use crate::models::{BackendKind, CurrentFields, DailyRecord, Field, LocatorSet};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use tracing::debug;

use self::selectors::{resolve, HtmlPage};

pub use self::browser::BrowserBackend;
pub use self::lightweight::LightweightBackend;

// ── Backend trait ─────────────────────────────────────────────────────────────

/// Swappable extraction strategy. Every fault stays inside the backend:
/// callers only ever see data or `None`.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Quote fields from the instrument page. May lack a close price.
    async fn fetch_current(&self) -> Option<CurrentFields>;

    /// Validated rows from the historical page, at most `max_days`.
    /// Backends that cannot render the page return `None`.
    async fn fetch_historical_rows(&self, _max_days: usize) -> Option<Vec<DailyRecord>> {
        None
    }
}

/// Run every field's locator chain against one page.
pub fn extract_fields(
    page: &HtmlPage,
    locators: &LocatorSet,
    fetched_at: NaiveDateTime,
) -> CurrentFields {
    let mut fields = CurrentFields::empty(fetched_at);
    for field in Field::ALL {
        let found = locators.get(field).and_then(|l| resolve(l, page));
        match found {
            Some(m) => fields.set(field, &m.text),
            None => debug!("{}", ExtractError::FieldUnavailable(field)),
        }
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::selectors::default_static_locators;
    use chrono::NaiveDate;

    #[test]
    fn extracts_every_located_field() {
        let page = HtmlPage::parse(
            r#"<div>
                 <span data-test="instrument-price-last">9.50</span>
                 <dd data-test="prev-close">1,009.40</dd>
                 <dd data-test="open">LKR 9.40</dd>
                 <dd data-test="dailyHigh">9.60</dd>
                 <dd data-test="dailyLow">9.35</dd>
                 <dd data-test="volume"> 2.5M </dd>
               </div>"#,
        );
        let at = NaiveDate::from_ymd_opt(2025, 5, 22)
            .unwrap()
            .and_hms_opt(14, 30, 0)
            .unwrap();
        let f = extract_fields(&page, &default_static_locators(), at);
        assert_eq!(f.close, Some(9.5));
        assert_eq!(f.previous_close, Some(1009.4));
        assert_eq!(f.open, Some(9.4));
        assert_eq!(f.high, Some(9.6));
        assert_eq!(f.low, Some(9.35));
        assert_eq!(f.volume.as_deref(), Some("2.5M"));
        assert_eq!(f.fetched_at, at);
    }

    #[test]
    fn missing_fields_stay_empty() {
        let page = HtmlPage::parse("<p class=\"price\">9.50</p>");
        let at = NaiveDate::from_ymd_opt(2025, 5, 22)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let f = extract_fields(&page, &default_static_locators(), at);
        assert!(!f.has_close());
        assert_eq!(f, CurrentFields::empty(at));
    }
}
