//! Headless-browser extraction.
//!
//! All browser work is blocking and runs on tokio's blocking pool. A
//! [`BrowserSession`] owns at most one browser for one fetch and releases it
//! on drop, so every return path (and an unwinding panic) shuts it down.
//!
//! Launch strategies, tried in order until one starts a browser:
//!   1. default discovery of a local Chrome/Chromium
//!   2. each configured `binary_paths` entry that exists on disk
//!   3. an externally managed browser at `debugger_url`

use crate::config::{AppConfig, BrowserConfig, PriceRange};
use crate::error::ExtractError;
use crate::models::{BackendKind, CurrentFields, DailyRecord, LocatorSet};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Local;
use headless_chrome::{Browser, LaunchOptions, Tab};
use regex::Regex;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use url::Url;

use super::parsers::HistoricalTableParser;
use super::selectors::HtmlPage;
use super::{extract_fields, ExtractionBackend};

// ── Session seam ──────────────────────────────────────────────────────────────

/// One live page in a running browser.
pub trait BrowserSession {
    fn navigate(&mut self, url: &str) -> Result<()>;
    fn ready_state(&self) -> Result<String>;
    fn page_source(&self) -> Result<String>;
}

/// Starts sessions. `Err` means no strategy produced a browser.
pub trait BrowserLauncher: Send + Sync {
    fn launch(&self) -> Result<Box<dyn BrowserSession>, ExtractError>;
}

// ── Chrome ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum LaunchStrategy {
    Default,
    BinaryPath(PathBuf),
    Remote(String),
}

impl fmt::Display for LaunchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaunchStrategy::Default => f.write_str("default discovery"),
            LaunchStrategy::BinaryPath(p) => write!(f, "binary {}", p.display()),
            LaunchStrategy::Remote(url) => write!(f, "remote {}", url),
        }
    }
}

pub struct ChromeLauncher {
    config: BrowserConfig,
    args: Vec<OsString>,
}

impl ChromeLauncher {
    pub fn new(config: &BrowserConfig, user_agent: &str) -> Self {
        let mut args: Vec<OsString> = [
            // no images, media, popups or notifications
            "--blink-settings=imagesEnabled=false",
            "--autoplay-policy=user-gesture-required",
            "--mute-audio",
            "--block-new-web-contents",
            "--disable-notifications",
            // hide automation markers
            "--disable-blink-features=AutomationControlled",
            "--disable-dev-shm-usage",
            "--disable-gpu",
            "--disable-extensions",
            "--disable-background-timer-throttling",
            "--disable-renderer-backgrounding",
            "--disable-backgrounding-occluded-windows",
        ]
        .iter()
        .map(OsString::from)
        .collect();
        args.push(OsString::from(format!("--user-agent={}", user_agent)));

        Self {
            config: config.clone(),
            args,
        }
    }

    pub fn strategies(&self) -> Vec<LaunchStrategy> {
        let mut strategies = vec![LaunchStrategy::Default];
        strategies.extend(
            self.config
                .binary_paths
                .iter()
                .filter(|p| p.exists())
                .cloned()
                .map(LaunchStrategy::BinaryPath),
        );
        if let Some(url) = &self.config.debugger_url {
            strategies.push(LaunchStrategy::Remote(url.clone()));
        }
        strategies
    }

    fn launch_options(&self, path: Option<PathBuf>) -> Result<LaunchOptions<'_>> {
        LaunchOptions::default_builder()
            .headless(self.config.headless)
            .sandbox(false)
            .window_size(Some(self.config.window_size))
            .path(path)
            .args(self.args.iter().map(|a| a.as_os_str()).collect::<Vec<&OsStr>>())
            .build()
            .map_err(|e| anyhow!("launch options: {}", e))
    }

    fn try_launch(&self, strategy: &LaunchStrategy) -> Result<ChromeSession> {
        let browser = match strategy {
            LaunchStrategy::Default => Browser::new(self.launch_options(None)?)?,
            LaunchStrategy::BinaryPath(p) => Browser::new(self.launch_options(Some(p.clone()))?)?,
            LaunchStrategy::Remote(url) => Browser::connect(url.clone())?,
        };
        let tab = browser.new_tab().context("could not open tab")?;
        tab.set_default_timeout(Duration::from_secs(self.config.readiness_timeout_secs.max(1)));

        Ok(ChromeSession {
            tab,
            _browser: browser,
            strategy: strategy.to_string(),
        })
    }

    /// The first strategy that starts a browser, for diagnostics.
    pub fn probe(&self) -> Option<LaunchStrategy> {
        self.strategies()
            .into_iter()
            .find(|s| self.try_launch(s).is_ok())
    }
}

impl BrowserLauncher for ChromeLauncher {
    fn launch(&self) -> Result<Box<dyn BrowserSession>, ExtractError> {
        for strategy in self.strategies() {
            match self.try_launch(&strategy) {
                Ok(session) => {
                    info!("browser started via {}", strategy);
                    return Ok(Box::new(session));
                }
                Err(e) => warn!("browser strategy '{}' failed: {:#}", strategy, e),
            }
        }
        Err(ExtractError::BackendUnavailable(BackendKind::Browser))
    }
}

struct ChromeSession {
    tab: Arc<Tab>,
    // Dropped after the tab; kills a launched process.
    _browser: Browser,
    strategy: String,
}

impl BrowserSession for ChromeSession {
    fn navigate(&mut self, url: &str) -> Result<()> {
        self.tab.navigate_to(url)?;
        Ok(())
    }

    fn ready_state(&self) -> Result<String> {
        let obj = self.tab.evaluate("document.readyState", false)?;
        Ok(obj
            .value
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_default())
    }

    fn page_source(&self) -> Result<String> {
        self.tab.get_content()
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        if let Err(e) = self.tab.close(false) {
            debug!("tab close failed: {:#}", e);
        }
        debug!("released browser ({})", self.strategy);
    }
}

// ── Waiting ───────────────────────────────────────────────────────────────────

/// Poll `document.readyState` until "complete" or the deadline passes.
pub fn wait_until_ready(session: &dyn BrowserSession, timeout: Duration, poll: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        match session.ready_state() {
            Ok(state) if state == "complete" => return true,
            Ok(state) => debug!("readyState = {:?}", state),
            Err(e) => debug!("readyState probe failed: {:#}", e),
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        thread::sleep(poll.min(deadline - now));
    }
}

// ── Degraded-mode price scan ──────────────────────────────────────────────────

static PRICE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#""regularMarketPrice":\s*([0-9]+\.?[0-9]*)"#,
        r#""price":\s*([0-9]+\.?[0-9]*)"#,
        r#""last":\s*([0-9]+\.?[0-9]*)"#,
        r#"data-test="instrument-price-last"[^>]*>([0-9]+\.?[0-9]*)"#,
        r#">([0-9]+\.?[0-9]*)</span>"#,
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Last resort for the close price: the first price-shaped number in the raw
/// markup that falls inside the configured range.
pub fn scan_markup_price(markup: &str, range: PriceRange) -> Option<f64> {
    for re in PRICE_PATTERNS.iter() {
        let found = re
            .captures_iter(markup)
            .filter_map(|c| c.get(1)?.as_str().parse::<f64>().ok())
            .find(|p| range.contains(*p));
        if found.is_some() {
            return found;
        }
    }
    None
}

// ── Backend ───────────────────────────────────────────────────────────────────

struct BrowserSettings {
    current_url: Url,
    historical_url: Url,
    locators: LocatorSet,
    table_locators: Vec<String>,
    table_keywords: Vec<String>,
    keyword_quorum: usize,
    readiness_timeout: Duration,
    poll_interval: Duration,
    settle: Duration,
    historical_settle: Duration,
    plausible_price: Option<PriceRange>,
}

/// Full page rendering through a headless browser.
#[derive(Clone)]
pub struct BrowserBackend {
    launcher: Arc<dyn BrowserLauncher>,
    settings: Arc<BrowserSettings>,
}

impl BrowserBackend {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let launcher = ChromeLauncher::new(&config.browser, &config.scraper.user_agent);
        Self::with_launcher(config, Arc::new(launcher))
    }

    pub fn with_launcher(config: &AppConfig, launcher: Arc<dyn BrowserLauncher>) -> Result<Self> {
        let parse = |raw: &str| Url::parse(raw).with_context(|| format!("Invalid URL {:?}", raw));
        let b = &config.browser;

        let settings = BrowserSettings {
            current_url: parse(&config.scraper.current_url)?,
            historical_url: parse(&config.scraper.historical_url)?,
            locators: config.selectors.rendered_page.clone(),
            table_locators: config.selectors.historical_table.clone(),
            table_keywords: config.selectors.table_keywords.clone(),
            keyword_quorum: config.selectors.keyword_quorum,
            readiness_timeout: Duration::from_secs(b.readiness_timeout_secs),
            poll_interval: Duration::from_millis(b.poll_interval_ms.max(1)),
            settle: Duration::from_millis(b.settle_ms),
            historical_settle: Duration::from_millis(b.historical_settle_ms),
            plausible_price: b.price_scan_range(),
        };

        Ok(Self {
            launcher,
            settings: Arc::new(settings),
        })
    }

    fn load_page(&self, session: &mut dyn BrowserSession, url: &Url, settle: Duration) -> Result<HtmlPage> {
        session
            .navigate(url.as_str())
            .with_context(|| format!("navigation to {} failed", url))?;

        let s = &self.settings;
        if !wait_until_ready(&*session, s.readiness_timeout, s.poll_interval) {
            warn!(
                "page not ready after {:?}; continuing with the current DOM",
                s.readiness_timeout
            );
        }
        thread::sleep(settle);

        let markup = session.page_source().context("could not read page source")?;
        Ok(HtmlPage::parse(&markup))
    }

    fn open(&self) -> Option<Box<dyn BrowserSession>> {
        match self.launcher.launch() {
            Ok(session) => Some(session),
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    }

    fn current_blocking(&self) -> Option<CurrentFields> {
        let s = &self.settings;
        let mut session = self.open()?;

        let page = match self.load_page(session.as_mut(), &s.current_url, s.settle) {
            Ok(page) => page,
            Err(e) => {
                warn!("{}", ExtractError::unreachable(s.current_url.as_str(), format!("{:#}", e), false));
                return None;
            }
        };

        let mut fields = extract_fields(&page, &s.locators, Local::now().naive_local());

        if !fields.has_close() {
            if let Some(range) = s.plausible_price {
                fields.close = scan_markup_price(page.markup(), range);
                if let Some(price) = fields.close {
                    warn!(
                        "degraded mode: close {} taken from raw markup scan within [{}, {}]",
                        price, range.min, range.max
                    );
                }
            }
        }

        if !fields.has_close() {
            warn!("browser loaded the page but found no close price");
            return None;
        }
        info!("browser: close {:?}", fields.close);
        Some(fields)
    }

    fn historical_blocking(&self, max_days: usize) -> Option<Vec<DailyRecord>> {
        let s = &self.settings;
        let mut session = self.open()?;

        let page = match self.load_page(session.as_mut(), &s.historical_url, s.historical_settle) {
            Ok(page) => page,
            Err(e) => {
                warn!("{}", ExtractError::unreachable(s.historical_url.as_str(), format!("{:#}", e), false));
                return None;
            }
        };

        let parser = HistoricalTableParser::new(&s.table_locators, &s.table_keywords, s.keyword_quorum);
        Some(parser.parse(&page, max_days))
    }
}

#[async_trait]
impl ExtractionBackend for BrowserBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Browser
    }

    async fn fetch_current(&self) -> Option<CurrentFields> {
        let this = self.clone();
        match tokio::task::spawn_blocking(move || this.current_blocking()).await {
            Ok(fields) => fields,
            Err(e) => {
                error!("browser task failed: {}", e);
                None
            }
        }
    }

    async fn fetch_historical_rows(&self, max_days: usize) -> Option<Vec<DailyRecord>> {
        let this = self.clone();
        match tokio::task::spawn_blocking(move || this.historical_blocking(max_days)).await {
            Ok(rows) => rows,
            Err(e) => {
                error!("browser task failed: {}", e);
                None
            }
        }
    }
}
