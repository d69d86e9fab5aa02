use crate::models::{BackendKind, Field};
use thiserror::Error;

/// Faults absorbed inside the pipeline; each one only steers fallback.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("field '{0}' unavailable: no locator candidate matched")]
    FieldUnavailable(Field),

    #[error("{0} backend unavailable: every initialization strategy failed")]
    BackendUnavailable(BackendKind),

    #[error("source unreachable ({url}): {reason}")]
    SourceUnreachable {
        url: String,
        reason: String,
        transient: bool,
    },
}

impl ExtractError {
    pub fn unreachable(url: impl Into<String>, reason: impl ToString, transient: bool) -> Self {
        ExtractError::SourceUnreachable {
            url: url.into(),
            reason: reason.to_string(),
            transient,
        }
    }

    /// Worth another attempt against the same source.
    pub fn is_transient(&self) -> bool {
        matches!(self, ExtractError::SourceUnreachable { transient: true, .. })
    }
}

/// The only failure a pipeline caller ever sees.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("no data extracted: neither a current-day nor a historical record could be produced")]
    NoDataExtracted,
}
