//! Paper generation domain: wire events, record model, tracker, and the
//! status-polling fallback.

pub mod poller;
pub mod tracker;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The known pipeline stages, in execution order.
///
/// The server may emit stages outside this list (e.g. `revising`); those are
/// displayed verbatim but do not reorder progress.
pub const STAGES: [&str; 5] = [
    "researching",
    "planning",
    "writing",
    "formatting",
    "compiling",
];

/// Returns the position of a stage in the known pipeline, if any.
pub fn stage_position(stage: &str) -> Option<usize> {
    STAGES.iter().position(|s| *s == stage)
}

/// Lifecycle status of a paper record.
///
/// Serialized as the verbatim status string so unknown server statuses
/// survive a round-trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaperStatus {
    Researching,
    Planning,
    Writing,
    Formatting,
    Compiling,
    Completed,
    Failed,
    /// A status string this client does not know; preserved verbatim.
    Other(String),
}

impl PaperStatus {
    pub fn as_str(&self) -> &str {
        match self {
            PaperStatus::Researching => "researching",
            PaperStatus::Planning => "planning",
            PaperStatus::Writing => "writing",
            PaperStatus::Formatting => "formatting",
            PaperStatus::Compiling => "compiling",
            PaperStatus::Completed => "completed",
            PaperStatus::Failed => "failed",
            PaperStatus::Other(s) => s,
        }
    }

    /// Terminal statuses admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaperStatus::Completed | PaperStatus::Failed)
    }
}

impl From<&str> for PaperStatus {
    fn from(s: &str) -> Self {
        match s {
            "researching" => PaperStatus::Researching,
            "planning" => PaperStatus::Planning,
            "writing" => PaperStatus::Writing,
            "formatting" => PaperStatus::Formatting,
            "compiling" => PaperStatus::Compiling,
            "completed" => PaperStatus::Completed,
            "failed" => PaperStatus::Failed,
            other => PaperStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for PaperStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for PaperStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PaperStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(PaperStatus::from(s.as_str()))
    }
}

/// One paper-generation project, as persisted locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperRecord {
    pub id: String,
    pub topic: String,
    pub status: PaperStatus,
    #[serde(default)]
    pub pdf_url: Option<String>,
    #[serde(default)]
    pub progress_detail: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl PaperRecord {
    /// Creates a fresh record for a newly started generation.
    pub fn new(id: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            topic: topic.into(),
            status: PaperStatus::Researching,
            pdf_url: None,
            progress_detail: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Wire event for paper generation and revision streams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaperEvent {
    /// The server created a record for this generation.
    SessionCreated { session_id: String },

    /// Pipeline progress update.
    Progress {
        #[serde(default)]
        stage: String,
        #[serde(default)]
        detail: String,
    },

    /// Generation finished; terminates the stream.
    Completed {
        #[serde(default)]
        pdf_url: Option<String>,
        #[serde(default)]
        session_id: Option<String>,
    },

    /// Generation failed; terminates the stream.
    Error {
        #[serde(default)]
        message: String,
        #[serde(default)]
        session_id: Option<String>,
    },
}

impl PaperEvent {
    /// Returns true if this event terminates the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaperEvent::Completed { .. } | PaperEvent::Error { .. })
    }
}

/// Snapshot returned by the status query, used only for polling recovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperStatusSnapshot {
    pub status: PaperStatus,
    #[serde(default)]
    pub progress_detail: Option<String>,
    #[serde(default)]
    pub pdf_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}
