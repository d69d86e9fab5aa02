//! Single-instrument OHLCV extraction: a current-day quote from the live
//! instrument page plus a bounded historical table, merged into one
//! date-unique series.

pub mod config;
pub mod error;
pub mod export;
pub mod models;
pub mod pipeline;
pub mod scraper;
pub mod utils;
pub mod validator;
