use super::types::TranscodeJobResult;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Request-level failure that stopped the scheduler before dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum FatalError {
    #[error("no supported video encoder found on this host")]
    EncoderUnavailable,
}

/// Aggregate outcome of one transcode request
#[derive(Debug, Clone, Default, Serialize)]
pub struct TranscodeReport {
    pub input: PathBuf,
    pub encoder: Option<String>,
    pub produced: Vec<TranscodeJobResult>,
    pub failures: Vec<TranscodeJobResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatal: Option<FatalError>,
    pub total_duration_ms: u128,
}

impl TranscodeReport {
    /// Split results into produced outputs and failures. Order follows the
    /// input order, which for the scheduler is completion order.
    pub fn aggregate(results: impl IntoIterator<Item = TranscodeJobResult>) -> Self {
        let (produced, failures) = results.into_iter().partition(|r| r.success);
        Self {
            produced,
            failures,
            ..Self::default()
        }
    }

    /// Empty report for a request that never dispatched
    pub fn fatal(input: impl Into<PathBuf>, reason: FatalError) -> Self {
        Self {
            input: input.into(),
            fatal: Some(reason),
            ..Self::default()
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal.is_some()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Number of job results (successes and failures)
    pub fn len(&self) -> usize {
        self.produced.len() + self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn results(&self) -> impl Iterator<Item = &TranscodeJobResult> {
        self.produced.iter().chain(self.failures.iter())
    }

    pub fn produced_paths(&self) -> Vec<&Path> {
        self.produced.iter().map(|r| r.output_path.as_path()).collect()
    }
}

/// Free-function form of [`TranscodeReport::aggregate`]
pub fn aggregate(results: impl IntoIterator<Item = TranscodeJobResult>) -> TranscodeReport {
    TranscodeReport::aggregate(results)
}
