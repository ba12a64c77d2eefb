use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeFile {
    pub id: String,
    #[serde(default)]
    pub project_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub content: String,
    pub language: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only content snapshot of a [`CodeFile`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileVersion {
    pub id: String,
    pub file_id: String,
    pub content: String,
    /// Assigned by the backend, increasing per file.
    pub version_number: i64,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl FileVersion {
    pub fn line_count(&self) -> usize {
        self.content.split('\n').count()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SharePermission {
    View,
    Edit,
}

impl fmt::Display for SharePermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            SharePermission::View => "view",
            SharePermission::Edit => "edit",
        })
    }
}

impl FromStr for SharePermission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "view" => Ok(SharePermission::View),
            "edit" => Ok(SharePermission::Edit),
            other => Err(format!("unknown permission: {other} (expected view|edit)")),
        }
    }
}

/// Project-level share link.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Share {
    pub id: String,
    pub project_id: String,
    pub share_token: String,
    pub permission: SharePermission,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

/// Read-only copy of a single file, addressed by `share_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SharedSnippet {
    pub id: String,
    pub share_id: String,
    #[serde(default)]
    pub file_id: Option<String>,
    pub file_name: String,
    pub content: String,
    pub language: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub view_count: i64,
    pub created_at: DateTime<Utc>,
}

impl SharedSnippet {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    Log,
    Error,
    Warn,
    Info,
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OutputKind::Log => "log",
            OutputKind::Error => "error",
            OutputKind::Warn => "warn",
            OutputKind::Info => "info",
        };
        f.pad(s)
    }
}

/// One console line produced by a run. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsoleOutput {
    #[serde(rename = "type")]
    pub kind: OutputKind,
    pub message: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl ConsoleOutput {
    pub fn now(kind: OutputKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub output: String,
    pub exit_code: i32,
    #[serde(rename = "executionTime", skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
}

impl ExecutionResult {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            stderr: message.into(),
            exit_code: 1,
            ..Default::default()
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}
