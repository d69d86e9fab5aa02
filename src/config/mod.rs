use crate::models::{FetchPolicy, LocatorSet};
use crate::scraper::selectors::{
    default_rendered_locators, default_static_locators, default_table_locators,
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub scraper: ScraperConfig,
    pub browser: BrowserConfig,
    pub selectors: SelectorConfig,
    pub pipeline: PipelineConfig,
}

/// HTTP side: target pages and request behaviour.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScraperConfig {
    #[serde(default = "default_current_url")]
    pub current_url: String,

    #[serde(default = "default_historical_url")]
    pub historical_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_accept_language")]
    pub accept_language: String,
}

/// Headless browser launch and wait behaviour.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrowserConfig {
    #[serde(default = "default_true")]
    pub headless: bool,

    #[serde(default = "default_window_size")]
    pub window_size: (u32, u32),

    /// Tried in order when default discovery fails.
    #[serde(default = "default_binary_paths")]
    pub binary_paths: Vec<PathBuf>,

    /// DevTools websocket of an externally managed browser.
    #[serde(default)]
    pub debugger_url: Option<String>,

    #[serde(default = "default_readiness_timeout_secs")]
    pub readiness_timeout_secs: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    #[serde(default = "default_historical_settle_ms")]
    pub historical_settle_ms: u64,

    /// Degraded-mode markup price scan when no close selector matches.
    #[serde(default = "default_true")]
    pub price_scan: bool,

    /// Bounds for the markup price scan.
    #[serde(default = "default_plausible_price")]
    pub plausible_price: Option<PriceRange>,
}

impl BrowserConfig {
    /// Range for the markup price scan, or `None` when the scan is off.
    pub fn price_scan_range(&self) -> Option<PriceRange> {
        self.plausible_price.filter(|_| self.price_scan)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

impl PriceRange {
    pub fn contains(&self, price: f64) -> bool {
        price >= self.min && price <= self.max
    }
}

/// Locator chains. Markup revisions on the target site are handled here.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SelectorConfig {
    #[serde(default = "default_static_locators")]
    pub static_page: LocatorSet,

    #[serde(default = "default_rendered_locators")]
    pub rendered_page: LocatorSet,

    #[serde(default = "default_table_locators")]
    pub historical_table: Vec<String>,

    #[serde(default = "default_table_keywords")]
    pub table_keywords: Vec<String>,

    #[serde(default = "default_keyword_quorum")]
    pub keyword_quorum: usize,
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub policy: FetchPolicy,

    #[serde(default = "default_historical_days")]
    pub historical_days: usize,

    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_current_url() -> String {
    "https://www.investing.com/equities/dialog-axiata".to_string()
}
fn default_historical_url() -> String {
    "https://www.investing.com/equities/dialog-axiata-historical-data".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    2
}
fn default_retry_base_ms() -> u64 {
    500
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0.0.0 Safari/537.36"
        .to_string()
}
fn default_accept_language() -> String {
    "en-US,en;q=0.5".to_string()
}
fn default_true() -> bool {
    true
}
fn default_window_size() -> (u32, u32) {
    (1920, 1080)
}
fn default_binary_paths() -> Vec<PathBuf> {
    [
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        r"C:\Program Files\Google\Chrome\Application\chrome.exe",
        r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
    ]
    .iter()
    .map(PathBuf::from)
    .collect()
}
fn default_readiness_timeout_secs() -> u64 {
    15
}
fn default_poll_interval_ms() -> u64 {
    250
}
fn default_settle_ms() -> u64 {
    3000
}
fn default_historical_settle_ms() -> u64 {
    5000
}
fn default_plausible_price() -> Option<PriceRange> {
    Some(PriceRange { min: 5.0, max: 50.0 })
}
fn default_table_keywords() -> Vec<String> {
    ["date", "open", "high", "low", "close", "price"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_keyword_quorum() -> usize {
    3
}
fn default_historical_days() -> usize {
    30
}
fn default_refresh_interval_secs() -> u64 {
    30
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            current_url: default_current_url(),
            historical_url: default_historical_url(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_base_ms: default_retry_base_ms(),
            user_agent: default_user_agent(),
            accept_language: default_accept_language(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_size: default_window_size(),
            binary_paths: default_binary_paths(),
            debugger_url: None,
            readiness_timeout_secs: default_readiness_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            settle_ms: default_settle_ms(),
            historical_settle_ms: default_historical_settle_ms(),
            price_scan: true,
            plausible_price: default_plausible_price(),
        }
    }
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            static_page: default_static_locators(),
            rendered_page: default_rendered_locators(),
            historical_table: default_table_locators(),
            table_keywords: default_table_keywords(),
            keyword_quorum: default_keyword_quorum(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            policy: FetchPolicy::default(),
            historical_days: default_historical_days(),
            refresh_interval_secs: default_refresh_interval_secs(),
        }
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let built = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("OHLCV").separator("__"))
            .build();

        let app_cfg = built
            .and_then(|cfg| cfg.try_deserialize())
            .unwrap_or_else(|e| {
                warn!("Invalid configuration ({}), falling back to defaults", e);
                AppConfig::default()
            });
        Ok(app_cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Field;

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let cfg: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(
                r##"
                [pipeline]
                policy = "browser_only"
                historical_days = 90

                [browser]
                plausible_price = { min = 1.0, max = 2.0 }

                [selectors]
                static_page = [
                  { field = "close", candidates = ["#price", ".last"] },
                ]
                "##,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(cfg.pipeline.policy, FetchPolicy::BrowserOnly);
        assert_eq!(cfg.pipeline.historical_days, 90);
        assert_eq!(cfg.pipeline.refresh_interval_secs, 30);
        assert_eq!(cfg.browser.plausible_price, Some(PriceRange { min: 1.0, max: 2.0 }));
        assert_eq!(cfg.browser.settle_ms, 3000);
        assert_eq!(
            cfg.selectors.static_page.get(Field::Close).unwrap().candidates,
            vec!["#price", ".last"]
        );
        assert!(cfg.selectors.static_page.get(Field::Open).is_none());
        assert!(cfg.selectors.rendered_page.get(Field::Open).is_some());
        assert_eq!(cfg.scraper.current_url, default_current_url());
    }

    #[test]
    fn price_scan_can_be_switched_off() {
        let cfg: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(
                "[browser]\nprice_scan = false\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert!(!cfg.browser.price_scan);
        assert_eq!(cfg.browser.plausible_price, default_plausible_price());
        assert_eq!(cfg.browser.price_scan_range(), None);
        assert_eq!(
            AppConfig::default().browser.price_scan_range(),
            Some(PriceRange { min: 5.0, max: 50.0 })
        );
    }

    #[test]
    fn price_range_is_inclusive() {
        let r = PriceRange { min: 5.0, max: 50.0 };
        assert!(r.contains(5.0) && r.contains(50.0) && r.contains(9.5));
        assert!(!r.contains(4.99) && !r.contains(1234.0));
    }
}
