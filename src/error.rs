//! Error types for the sync engine.

use thiserror::Error;

use crate::model::Endpoint;

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    /// A pager or embed-code call failed.
    #[error("remote fetch failed for group {group_id} ({target}): {source:#}")]
    RemoteFetch {
        group_id: String,
        target: String,
        #[source]
        source: anyhow::Error,
    },

    /// Insert/update/delete against the local store failed.
    #[error("store write failed: {0}")]
    StoreWrite(#[from] sqlx::Error),

    #[error("continuation request failed: {0:#}")]
    Continuation(anyhow::Error),

    #[error("continuation token missing or does not match")]
    InvalidToken,

    #[error("unknown group {0}")]
    UnknownGroup(String),

    #[error("stored state is corrupt: {0}")]
    CorruptState(#[from] serde_json::Error),
}

impl SyncError {
    pub fn pager(group_id: &str, endpoint: Endpoint, source: anyhow::Error) -> Self {
        SyncError::RemoteFetch {
            group_id: group_id.to_string(),
            target: endpoint.as_str().to_string(),
            source,
        }
    }

    pub fn embed(group_id: &str, href: &str, source: anyhow::Error) -> Self {
        SyncError::RemoteFetch {
            group_id: group_id.to_string(),
            target: href.to_string(),
            source,
        }
    }
}
