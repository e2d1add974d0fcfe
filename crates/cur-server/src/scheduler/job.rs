//! Job types for the single-flight scheduler.

use chrono::{DateTime, Utc};
use cur_core::{Error, JobId, LibraryId, Result, SourceId};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// JobKind
// ---------------------------------------------------------------------------

/// Kind of scheduled work. One [`TaskRunner`](super::runners::TaskRunner)
/// implementation exists per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    LibraryScan,
    SourceScan,
    MusicScan,
    SeriesCompleteness,
    CollectionCompleteness,
    MusicCompleteness,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LibraryScan => "library-scan",
            Self::SourceScan => "source-scan",
            Self::MusicScan => "music-scan",
            Self::SeriesCompleteness => "series-completeness",
            Self::CollectionCompleteness => "collection-completeness",
            Self::MusicCompleteness => "music-completeness",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "library-scan" => Some(Self::LibraryScan),
            "source-scan" => Some(Self::SourceScan),
            "music-scan" => Some(Self::MusicScan),
            "series-completeness" => Some(Self::SeriesCompleteness),
            "collection-completeness" => Some(Self::CollectionCompleteness),
            "music-completeness" => Some(Self::MusicCompleteness),
            _ => None,
        }
    }

    /// Reject a malformed scope at enqueue time, before a job is ever queued.
    pub fn validate_scope(&self, scope: &JobScope) -> Result<()> {
        match self {
            Self::SourceScan => {
                if scope.source_id.is_none() {
                    return Err(Error::Validation(format!(
                        "{self} requires scope.source_id"
                    )));
                }
            }
            Self::LibraryScan
            | Self::MusicScan
            | Self::SeriesCompleteness
            | Self::CollectionCompleteness
            | Self::MusicCompleteness => {
                if scope.library_id.is_none() {
                    return Err(Error::Validation(format!(
                        "{self} requires scope.library_id"
                    )));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a job. Exactly one job is `Running` at a time,
/// system-wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

// ---------------------------------------------------------------------------
// Scope, progress, summary
// ---------------------------------------------------------------------------

/// What a job operates on.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct JobScope {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub source_id: Option<SourceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub library_id: Option<LibraryId>,
}

/// In-flight progress, present only while a job is running.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct JobProgress {
    pub current: u64,
    pub total: u64,
    pub percentage: f32,
    pub phase: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_item: Option<String>,
}

/// Result counts from a successful scan job.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ScanSummary {
    pub items_scanned: u64,
    pub items_added: u64,
    pub items_updated: u64,
    pub items_removed: u64,
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// Caller-supplied description of work to enqueue.
#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct JobDescription {
    pub kind: JobKind,
    /// Display label; defaults to the kind's name.
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub scope: JobScope,
}

/// One unit of scheduled work.
///
/// Terminal jobs are never mutated again except for removal from history.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct Job {
    #[schema(value_type = String)]
    pub id: JobId,
    pub kind: JobKind,
    pub label: String,
    pub scope: JobScope,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<JobProgress>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<ScanSummary>,
}

impl Job {
    /// Build a fresh `Queued` job from a description. Fails with a
    /// validation error when the scope is malformed for the kind.
    pub fn from_description(desc: JobDescription) -> Result<Self> {
        desc.kind.validate_scope(&desc.scope)?;
        let label = desc
            .label
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| desc.kind.as_str().to_string());
        Ok(Self {
            id: JobId::new(),
            kind: desc.kind,
            label,
            scope: desc.scope,
            status: JobStatus::Queued,
            progress: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
            summary: None,
        })
    }
}
