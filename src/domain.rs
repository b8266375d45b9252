use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HarvestError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Doi(String);

impl Doi {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Doi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Doi {
    type Err = HarvestError;

    /// Keeps the cell verbatim; padding is part of the canonical filename.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.trim().is_empty() {
            return Err(HarvestError::InvalidDoi(value.to_string()));
        }
        Ok(Self(value.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcquisitionStatus {
    Pending,
    Success,
    Failed,
}

impl AcquisitionStatus {
    /// Value written to the catalog's status column. Pending rows never reach
    /// the output, but map to `N` so a partially filled column is still valid.
    pub fn as_flag(self) -> &'static str {
        match self {
            AcquisitionStatus::Success => "Y",
            AcquisitionStatus::Pending | AcquisitionStatus::Failed => "N",
        }
    }
}

impl fmt::Display for AcquisitionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquisitionStatus::Pending => write!(f, "pending"),
            AcquisitionStatus::Success => write!(f, "success"),
            AcquisitionStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Where a successful artifact came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactSource {
    Existing,
    Strategy(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct AcquisitionRecord {
    pub row: usize,
    pub doi: Option<Doi>,
    pub canonical_filename: Option<String>,
    pub status: AcquisitionStatus,
    pub source: Option<ArtifactSource>,
    pub failure: Option<String>,
}

impl AcquisitionRecord {
    pub fn pending(row: usize, doi: Option<Doi>, canonical_filename: Option<String>) -> Self {
        Self {
            row,
            doi,
            canonical_filename,
            status: AcquisitionStatus::Pending,
            source: None,
            failure: None,
        }
    }

    pub fn succeed(mut self, source: ArtifactSource) -> Self {
        self.status = AcquisitionStatus::Success;
        self.source = Some(source);
        self
    }

    pub fn fail(mut self, reason: impl fmt::Display) -> Self {
        self.status = AcquisitionStatus::Failed;
        self.failure = Some(reason.to_string());
        self
    }
}
