//! Issue aggregate types.

use chrono::{DateTime, Utc};
use pipeline_core::{EventType, Severity};
use serde::{Deserialize, Serialize};

/// Issue lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueStatus {
    Open,
    Resolved,
    Ignored,
}

impl IssueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Resolved => "resolved",
            Self::Ignored => "ignored",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "resolved" => Some(Self::Resolved),
            "ignored" => Some(Self::Ignored),
            _ => None,
        }
    }
}

/// Aggregate record for all occurrences sharing a fingerprint within a
/// project.
///
/// `public_id`, `project_id`, `fingerprint`, and `first_seen_at` are
/// immutable once set. `occurrence_count` only ever grows; issues are
/// never physically deleted by the ingestion path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    /// Opaque external identifier.
    pub public_id: String,
    pub project_id: String,
    /// Grouping key, unique within the project.
    pub fingerprint: String,
    pub issue_type: EventType,
    pub status: IssueStatus,
    pub title: String,
    pub culprit: Option<String>,
    pub severity: Option<Severity>,
    pub occurrence_count: u64,
    /// Approximate distinct-user count (HLL estimate, ~6.5% error).
    pub affected_users: u64,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}
