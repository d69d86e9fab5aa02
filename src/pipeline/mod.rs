//! Pipeline orchestrator: current-day fetch → historical table → merge.
//!
//! One `run()` is one independent invocation. Steps run strictly in
//! sequence and nothing is carried between runs; the caller owns the
//! returned snapshot.
//!
//! Only `PipelineError::NoDataExtracted` ever reaches the caller. Every
//! other fault is absorbed by the backend or the validator and turns into a
//! fallback decision here.

pub mod merge;

use crate::config::AppConfig;
use crate::error::PipelineError;
use crate::models::{BackendKind, CurrentQuote, DailyRecord, FetchPolicy, OhlcvSeries};
use crate::scraper::{BrowserBackend, ExtractionBackend, LightweightBackend};
use crate::utils::Timer;
use crate::validator::validate;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

pub use self::merge::merge;

// ── Current day ───────────────────────────────────────────────────────────────

/// Produces at most one validated record for today.
pub struct CurrentDayFetcher<'a> {
    backends: &'a [Arc<dyn ExtractionBackend>],
}

impl<'a> CurrentDayFetcher<'a> {
    pub fn new(backends: &'a [Arc<dyn ExtractionBackend>]) -> Self {
        Self { backends }
    }

    fn backend(&self, kind: BackendKind) -> Option<&'a Arc<dyn ExtractionBackend>> {
        self.backends.iter().find(|b| b.kind() == kind)
    }

    /// Walk the policy's backends until one yields a close price, then validate.
    pub async fn fetch(&self, policy: FetchPolicy) -> Option<CurrentQuote> {
        for &kind in policy.order() {
            let Some(backend) = self.backend(kind) else {
                warn!("{} backend not configured", kind);
                continue;
            };

            info!("Fetching current-day data ({})", kind);
            let Some(fields) = backend.fetch_current().await else {
                continue;
            };
            if !fields.has_close() {
                info!("{}: no usable close price", kind);
                continue;
            }

            return match validate(&fields.to_candidate()) {
                Ok(record) => Some(CurrentQuote {
                    record,
                    previous_close: fields.previous_close,
                    fetched_at: fields.fetched_at,
                    backend: kind,
                }),
                Err(e) => {
                    warn!("current-day record from {} rejected: {}", kind, e);
                    None
                }
            };
        }
        None
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

pub struct Pipeline {
    backends: Vec<Arc<dyn ExtractionBackend>>,
}

/// Everything one invocation produced.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub series: OhlcvSeries,
    pub current: Option<CurrentQuote>,
    pub historical_count: usize,
}

impl Pipeline {
    pub fn new(backends: Vec<Arc<dyn ExtractionBackend>>) -> Self {
        Self { backends }
    }

    /// Lightweight + Chrome backends built from configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let lightweight =
            LightweightBackend::new(config).context("Failed to build lightweight backend")?;
        let browser = BrowserBackend::new(config).context("Failed to build browser backend")?;
        Ok(Self::new(vec![Arc::new(lightweight), Arc::new(browser)]))
    }

    pub async fn run(
        &self,
        policy: FetchPolicy,
        historical_days: usize,
    ) -> Result<OhlcvSeries, PipelineError> {
        self.run_detailed(policy, historical_days).await.map(|r| r.series)
    }

    pub async fn run_detailed(
        &self,
        policy: FetchPolicy,
        historical_days: usize,
    ) -> Result<PipelineRun, PipelineError> {
        let _t = Timer::start(format!("Pipeline run ({:?}, {} days)", policy, historical_days));

        // ── 1. Current day ────────────────────────────────────────────────────
        info!("=== Step 1: Current-day quote ===");
        let current = CurrentDayFetcher::new(&self.backends).fetch(policy).await;
        match &current {
            Some(q) => info!("Current: {} close {:.2} via {}", q.record.date, q.record.close, q.backend),
            None => warn!("No current-day data"),
        }

        // ── 2. Historical table ───────────────────────────────────────────────
        info!("=== Step 2: Historical table ({} days) ===", historical_days);
        let historical = self.fetch_historical(policy, historical_days).await;
        let historical_count = historical.len();

        // ── 3. Merge ──────────────────────────────────────────────────────────
        if current.is_none() && historical.is_empty() {
            warn!("{}", PipelineError::NoDataExtracted);
            return Err(PipelineError::NoDataExtracted);
        }

        let series = merge(current.as_ref().map(|q| q.record.clone()), historical);
        info!(
            "=== Done: {} records ({} historical) | {:?} → {:?} ===",
            series.len(),
            historical_count,
            series.oldest().map(|r| r.date),
            series.latest().map(|r| r.date),
        );

        Ok(PipelineRun {
            series,
            current,
            historical_count,
        })
    }

    /// First backend in the policy's order that can render the historical page.
    async fn fetch_historical(&self, policy: FetchPolicy, max_days: usize) -> Vec<DailyRecord> {
        for &kind in policy.order() {
            let Some(backend) = self.backends.iter().find(|b| b.kind() == kind) else {
                continue;
            };
            if let Some(rows) = backend.fetch_historical_rows(max_days).await {
                info!("{} historical records via {}", rows.len(), kind);
                return rows;
            }
        }
        info!("No backend in {:?} produced historical data", policy);
        Vec::new()
    }
}
