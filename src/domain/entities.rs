//! Remote resource payloads
//!
//! Field names follow the platform's JSON. Optional fields default so that
//! older or trimmed responses still decode.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A database within an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Database {
    pub name: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub region: Option<Region>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub slug: String,
    #[serde(default)]
    pub display_name: String,
}

/// A named, independently modifiable copy of a database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    #[serde(default)]
    pub parent_branch: Option<String>,
    #[serde(default)]
    pub production: bool,
    #[serde(default)]
    pub ready: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Lifecycle of a backup as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupState {
    Pending,
    Running,
    Success,
    Failed,
    Canceled,
    #[serde(other)]
    Unknown,
}

impl BackupState {
    /// No further state changes will happen.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BackupState::Success | BackupState::Failed | BackupState::Canceled
        )
    }
}

impl fmt::Display for BackupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackupState::Pending => "pending",
            BackupState::Running => "running",
            BackupState::Success => "success",
            BackupState::Failed => "failed",
            BackupState::Canceled => "canceled",
            BackupState::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Point-in-time capture of a branch's schema and data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backup {
    pub id: String,
    pub name: String,
    pub state: BackupState,
    #[serde(default)]
    pub size: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Status of an external database being imported into the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataImport {
    #[serde(default)]
    pub id: String,
    pub state: String,
    #[serde(default)]
    pub import_check_errors: String,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Envelope used by every list endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
}

/// Body of a branch creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateBranchRequest {
    pub name: String,
    pub parent_branch: String,
}

/// Body of a backup creation request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CreateBackupRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Error body returned by the platform on non-2xx responses.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    #[serde(default)]
    pub message: String,
}
