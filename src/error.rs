// ABOUTME: Error kinds surfaced by a sync run and the stage they occurred in
// ABOUTME: Every failure is reported with its stage; nothing is retried internally

use std::fmt;

use reqwest::StatusCode;

/// Stages of a sync run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    InitSchema,
    ResolveWatermark,
    FetchIssues,
    FetchChangelog,
    Shape,
    Load,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::InitSchema => "init_schema",
            Stage::ResolveWatermark => "resolve_watermark",
            Stage::FetchIssues => "fetch_issues",
            Stage::FetchChangelog => "fetch_changelog",
            Stage::Shape => "shape",
            Stage::Load => "load",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Non-2xx answer from the tracker or the sink.
    #[error("{service} returned HTTP {status}: {body}")]
    Transport {
        service: &'static str,
        status: StatusCode,
        body: String,
    },

    /// The request never produced a response (connect, TLS, timeout, decode).
    #[error("{service} request failed: {source}")]
    Request {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// Pagination metadata is missing or inconsistent while more data is expected.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("cannot shape column '{column}' of record '{record}': {reason}")]
    Shape {
        record: String,
        column: String,
        reason: String,
    },

    /// One bulk load succeeded and the other did not.
    #[error("partial load: {loaded} loaded ({rows} rows) but {failed} failed: {source}")]
    PartialLoad {
        loaded: String,
        rows: usize,
        failed: String,
        #[source]
        source: Box<SyncError>,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("run aborted during {stage}: {reason}")]
    Deadline { stage: Stage, reason: String },
}

impl SyncError {
    pub fn shape(record: impl Into<String>, column: impl Into<String>, reason: impl Into<String>) -> Self {
        SyncError::Shape {
            record: record.into(),
            column: column.into(),
            reason: reason.into(),
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, SyncError::Transport { .. } | SyncError::Request { .. })
    }
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
