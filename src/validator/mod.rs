//! The single gate every record passes before it can enter a series.

use crate::models::{DailyRecord, RecordCandidate, UNKNOWN_VOLUME};
use thiserror::Error;

/// Why a candidate was turned away. Nothing is ever corrected.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InvalidRecord {
    #[error("field '{0}' is missing")]
    Missing(&'static str),
    #[error("field '{0}' must be finite")]
    NonFinite(&'static str),
    #[error("field '{0}' must be non-negative")]
    Negative(&'static str),
    #[error("high {high} is below low {low}")]
    HighBelowLow { high: f64, low: f64 },
    #[error("high {high} is below open {open}")]
    HighBelowOpen { high: f64, open: f64 },
    #[error("high {high} is below close {close}")]
    HighBelowClose { high: f64, close: f64 },
}

fn price(value: Option<f64>, name: &'static str) -> Result<f64, InvalidRecord> {
    let v = value.ok_or(InvalidRecord::Missing(name))?;
    if !v.is_finite() {
        return Err(InvalidRecord::NonFinite(name));
    }
    if v < 0.0 {
        return Err(InvalidRecord::Negative(name));
    }
    Ok(v)
}

/// Build a `DailyRecord` if the candidate is complete and `high` bounds low, open and close.
pub fn validate(candidate: &RecordCandidate) -> Result<DailyRecord, InvalidRecord> {
    let date = candidate.date.ok_or(InvalidRecord::Missing("date"))?;
    let open = price(candidate.open, "open")?;
    let high = price(candidate.high, "high")?;
    let low = price(candidate.low, "low")?;
    let close = price(candidate.close, "close")?;

    if high < low {
        return Err(InvalidRecord::HighBelowLow { high, low });
    }
    if high < open {
        return Err(InvalidRecord::HighBelowOpen { high, open });
    }
    if high < close {
        return Err(InvalidRecord::HighBelowClose { high, close });
    }

    Ok(DailyRecord {
        date,
        open,
        high,
        low,
        close,
        volume: candidate
            .volume
            .clone()
            .unwrap_or_else(|| UNKNOWN_VOLUME.to_string()),
    })
}
