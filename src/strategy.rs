use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::Doi;
use crate::error::AcquireError;

/// Result of one acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyOutcome {
    Acquired { path: PathBuf },
    Failed { reason: AcquireError },
}

impl StrategyOutcome {
    pub fn acquired(path: impl Into<PathBuf>) -> Self {
        StrategyOutcome::Acquired { path: path.into() }
    }

    pub fn failed(reason: AcquireError) -> Self {
        StrategyOutcome::Failed { reason }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self, StrategyOutcome::Acquired { .. })
    }

    pub fn artifact_path(&self) -> Option<&Path> {
        match self {
            StrategyOutcome::Acquired { path } => Some(path.as_path()),
            StrategyOutcome::Failed { .. } => None,
        }
    }

    pub fn failure_reason(&self) -> Option<&AcquireError> {
        match self {
            StrategyOutcome::Acquired { .. } => None,
            StrategyOutcome::Failed { reason } => Some(reason),
        }
    }
}

impl From<Result<PathBuf, AcquireError>> for StrategyOutcome {
    fn from(value: Result<PathBuf, AcquireError>) -> Self {
        match value {
            Ok(path) => StrategyOutcome::acquired(path),
            Err(reason) => StrategyOutcome::failed(reason),
        }
    }
}

/// A way of turning a DOI into a PDF at `destination`.
///
/// Implementations report every failure through the returned outcome, leave
/// nothing at `destination` when they fail, and only ever place a complete
/// file there.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn acquire(&self, doi: &Doi, destination: &Path, timeout: Duration) -> StrategyOutcome;
}
