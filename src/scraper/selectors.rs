//! Selector chains: first-match-wins resolution of a field against an
//! ordered candidate list, plus the default candidate lists for the quote
//! page.

use crate::models::{Field, FieldLocator, LocatorSet, RawFieldMatch};
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

// ── Page snapshot ─────────────────────────────────────────────────────────────

/// A parsed page. Static responses and rendered browser DOMs both end up here.
pub struct HtmlPage {
    doc: Html,
    markup: String,
}

impl HtmlPage {
    pub fn parse(markup: &str) -> Self {
        Self {
            doc: Html::parse_document(markup),
            markup: markup.to_string(),
        }
    }

    pub fn document(&self) -> &Html {
        &self.doc
    }

    pub fn markup(&self) -> &str {
        &self.markup
    }

    /// First element matching `selector`, or None for no match or an unparseable selector.
    pub fn first(&self, selector: &str) -> Option<ElementRef<'_>> {
        let sel = match Selector::parse(selector) {
            Ok(sel) => sel,
            Err(e) => {
                debug!("skipping selector {:?}: {:?}", selector, e);
                return None;
            }
        };
        self.doc.select(&sel).next()
    }
}

/// Visible text of an element, whitespace-collapsed.
pub fn element_text(el: &ElementRef<'_>) -> String {
    el.text()
        .flat_map(|t| t.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Resolution ────────────────────────────────────────────────────────────────

/// Walk `locator` in declared order; the first candidate with non-empty text wins.
pub fn resolve(locator: &FieldLocator, page: &HtmlPage) -> Option<RawFieldMatch> {
    for candidate in &locator.candidates {
        let Some(el) = page.first(candidate) else { continue };
        let text = element_text(&el);
        if text.is_empty() {
            continue;
        }
        debug!("{}: matched {:?} -> {:?}", locator.field, candidate, text);
        return Some(RawFieldMatch {
            field: locator.field,
            selector: candidate.clone(),
            text,
        });
    }
    None
}

// ── Defaults ──────────────────────────────────────────────────────────────────

const CLOSE_STATIC: &[&str] = &[
    r#"[data-test="instrument-price-last"]"#,
    ".text-2xl",
    ".instrument-price_last__KQzyA",
    "#last_last",
    ".pid-178-last",
];
const CLOSE_RENDERED_EXTRA: &[&str] = &[
    ".text-5xl",
    r#"[data-reactid*="last"]"#,
    ".price",
    ".last-price",
];

const PREV_CLOSE_STATIC: &[&str] = &[r#"[data-test="prev-close"]"#, ".prev-close", "#pid-178-pc"];
const PREV_CLOSE_RENDERED_EXTRA: &[&str] = &[
    r#"[data-test="PREV_CLOSE-value"]"#,
    ".prev",
    r#"[data-field="previousClose"]"#,
];

const OPEN_STATIC: &[&str] = &[r#"[data-test="open"]"#, ".open", "#pid-178-open"];
const OPEN_RENDERED_EXTRA: &[&str] = &[
    r#"[data-test="OPEN-value"]"#,
    r#"[data-field="regularMarketOpen"]"#,
];

const HIGH_STATIC: &[&str] = &[r#"[data-test="dailyHigh"]"#, ".high", "#pid-178-high"];
const HIGH_RENDERED_EXTRA: &[&str] = &[
    r#"[data-test="HIGH-value"]"#,
    r#"[data-field="regularMarketDayHigh"]"#,
];

const LOW_STATIC: &[&str] = &[r#"[data-test="dailyLow"]"#, ".low", "#pid-178-low"];
const LOW_RENDERED_EXTRA: &[&str] = &[
    r#"[data-test="LOW-value"]"#,
    r#"[data-field="regularMarketDayLow"]"#,
];

const VOLUME_STATIC: &[&str] = &[r#"[data-test="volume"]"#, ".volume", "#pid-178-volume"];
const VOLUME_RENDERED_EXTRA: &[&str] = &[
    r#"[data-test="TD_VOLUME-value"]"#,
    r#"[data-field="regularMarketVolume"]"#,
];

fn chain(field: Field, base: &[&str], extra: &[&str]) -> FieldLocator {
    let all: Vec<&str> = base.iter().chain(extra).copied().collect();
    FieldLocator::new(field, &all)
}

/// Candidates for the static HTML the lightweight backend sees.
pub fn default_static_locators() -> LocatorSet {
    LocatorSet(vec![
        chain(Field::Close, CLOSE_STATIC, &[]),
        chain(Field::PreviousClose, PREV_CLOSE_STATIC, &[]),
        chain(Field::Open, OPEN_STATIC, &[]),
        chain(Field::High, HIGH_STATIC, &[]),
        chain(Field::Low, LOW_STATIC, &[]),
        chain(Field::Volume, VOLUME_STATIC, &[]),
    ])
}

/// Candidates for the rendered DOM; the static list followed by late-binding fallbacks.
pub fn default_rendered_locators() -> LocatorSet {
    LocatorSet(vec![
        chain(Field::Close, CLOSE_STATIC, CLOSE_RENDERED_EXTRA),
        chain(Field::PreviousClose, PREV_CLOSE_STATIC, PREV_CLOSE_RENDERED_EXTRA),
        chain(Field::Open, OPEN_STATIC, OPEN_RENDERED_EXTRA),
        chain(Field::High, HIGH_STATIC, HIGH_RENDERED_EXTRA),
        chain(Field::Low, LOW_STATIC, LOW_RENDERED_EXTRA),
        chain(Field::Volume, VOLUME_STATIC, VOLUME_RENDERED_EXTRA),
    ])
}

/// Table candidates for the historical page, most specific first.
pub fn default_table_locators() -> Vec<String> {
    [
        "table.historical-data-table",
        r#"table[data-test="historical-data-table"]"#,
        "table.genTbl",
        "table.common-table",
        "table.datatable",
        ".historical-data table",
        r#"[data-test="historical-data"] table"#,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <div class="a">  </div>
          <span id="b">9.50</span>
          <span class="c">9.75</span>
          <span class="d">LKR&nbsp;10.00</span>
        </body></html>"#;

    fn locator(candidates: &[&str]) -> FieldLocator {
        FieldLocator::new(Field::Close, candidates)
    }

    #[test]
    fn first_matching_candidate_wins() {
        let page = HtmlPage::parse(PAGE);
        let m = resolve(&locator(&["#b", ".c", ".d"]), &page).unwrap();
        assert_eq!(m.selector, "#b");
        assert_eq!(m.text, "9.50");

        let m = resolve(&locator(&[".c", "#b"]), &page).unwrap();
        assert_eq!(m.text, "9.75");
    }

    #[test]
    fn empty_and_missing_candidates_are_skipped() {
        let page = HtmlPage::parse(PAGE);
        let m = resolve(&locator(&[".missing", ".a", ".d"]), &page).unwrap();
        assert_eq!(m.selector, ".d");
        assert_eq!(m.text, "LKR 10.00");
    }

    #[test]
    fn invalid_selector_does_not_abort_chain() {
        let page = HtmlPage::parse(PAGE);
        let m = resolve(&locator(&["[[nope", ".c"]), &page).unwrap();
        assert_eq!(m.selector, ".c");
    }

    #[test]
    fn exhausted_chain_is_absent() {
        let page = HtmlPage::parse(PAGE);
        assert!(resolve(&locator(&[".x", "#y"]), &page).is_none());
    }

    #[test]
    fn rendered_chain_extends_static_chain() {
        let stat = default_static_locators();
        let rend = default_rendered_locators();
        for field in Field::ALL {
            let s = &stat.get(field).unwrap().candidates;
            let r = &rend.get(field).unwrap().candidates;
            assert!(r.len() > s.len());
            assert_eq!(&r[..s.len()], &s[..]);
        }
    }
}
