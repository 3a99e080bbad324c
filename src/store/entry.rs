//! The persistent record the State Store owns: one row per model version
//! known to this run, plus its lifecycle state.

use serde::{Deserialize, Serialize};

use crate::model::{Creator, File, ModelImage, ModelType, VersionStats};

/// Lifecycle state of a [`DatabaseEntry`].
///
/// Transitions are monotonic within a run: `Pending -> {Downloaded, Error}`.
/// `Error -> Pending` only happens when a later fetch pass re-enqueues the
/// version (handled by the Fetch-Queue Stage, not by the store itself).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Pending,
    Downloaded,
    Error,
}

impl Status {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Downloaded => "Downloaded",
            Self::Error => "Error",
        }
    }
}

impl std::str::FromStr for Status {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Pending" => Ok(Self::Pending),
            "Downloaded" => Ok(Self::Downloaded),
            "Error" => Ok(Self::Error),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The State Store's persistent unit, keyed by `versionId`.
///
/// Embeds a trimmed-down `ModelVersion` (files/images are the ones selected
/// for this entry, not the full set the API returned) plus the bookkeeping
/// the Downloader needs: where the file landed on disk and whether the
/// transfer succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseEntry {
    pub version_id: u64,
    pub model_id: u64,
    pub model_name: String,
    pub model_type: ModelType,
    pub creator: Creator,
    pub base_model: String,
    pub version_name: String,
    pub files: Vec<File>,
    pub images: Vec<ModelImage>,
    pub stats: VersionStats,
    pub folder: String,
    pub filename: String,
    pub status: Status,
    pub error_details: Option<String>,
    pub updated_at: String,
}

impl DatabaseEntry {
    /// The State Store key this entry is addressed by.
    #[must_use]
    pub fn key(&self) -> String {
        format!("v_{}", self.version_id)
    }
}

/// Builds the `v_<versionId>` key for a lookup without needing an entry in hand.
#[must_use]
pub fn version_key(version_id: u64) -> String {
    format!("v_{version_id}")
}
