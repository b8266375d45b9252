use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Errors that stop a run before (or after) rows are processed.
#[derive(Debug, Error, Diagnostic)]
pub enum HarvestError {
    #[error("invalid DOI: {0}")]
    InvalidDoi(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config value: {0}")]
    ConfigValue(String),

    #[error("failed to read catalog {path}: {message}")]
    CatalogRead { path: PathBuf, message: String },

    #[error("failed to write catalog {path}: {message}")]
    CatalogWrite { path: PathBuf, message: String },

    #[error("catalog has no `{0}` column")]
    #[diagnostic(help("pass --doi-column or set doi_column in doi-harvest.json"))]
    MissingDoiColumn(String),

    #[error("save directory {path} is not writable: {message}")]
    SaveDirUnwritable { path: PathBuf, message: String },

    #[error("HTTP client setup failed: {0}")]
    HttpClient(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

/// Why a single acquisition attempt did not produce an artifact.
///
/// These never abort a batch; they end up in a [`crate::strategy::StrategyOutcome`]
/// and in the per-row record.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AcquireError {
    #[error("external tool failed: {0}")]
    ProcessFailure(String),

    #[error("no PDF produced: {0}")]
    ArtifactNotProduced(String),

    #[error("DOI resolution failed: {0}")]
    ResolutionError(String),

    #[error("no PDF link found on {0}")]
    LinkNotFound(String),

    #[error("PDF fetch failed: {0}")]
    FetchError(String),

    #[error("could not place artifact: {0}")]
    PlacementError(String),

    #[error("invalid catalog row: {0}")]
    InvalidInput(String),

    #[error("run cancelled before this row started")]
    Cancelled,
}

impl AcquireError {
    pub fn kind(&self) -> &'static str {
        match self {
            AcquireError::ProcessFailure(_) => "process_failure",
            AcquireError::ArtifactNotProduced(_) => "artifact_not_produced",
            AcquireError::ResolutionError(_) => "resolution_error",
            AcquireError::LinkNotFound(_) => "link_not_found",
            AcquireError::FetchError(_) => "fetch_error",
            AcquireError::PlacementError(_) => "placement_error",
            AcquireError::InvalidInput(_) => "invalid_input",
            AcquireError::Cancelled => "cancelled",
        }
    }
}
