use serde::{Deserialize, Serialize};
use std::fmt;

/// Queue state derived from row counts. Never stored as a source of truth.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum QueueStatus {
    Empty,
    Processing,
    Complete,
}

impl QueueStatus {
    pub fn from_counts(total: i64, processed: i64) -> Self {
        if total == 0 {
            QueueStatus::Empty
        } else if total == processed {
            QueueStatus::Complete
        } else {
            QueueStatus::Processing
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Empty => "empty",
            QueueStatus::Processing => "processing",
            QueueStatus::Complete => "complete",
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the queue used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub status: QueueStatus,
    pub total: i64,
    pub processed: i64,
}

impl QueueSnapshot {
    pub fn new(total: i64, processed: i64) -> Self {
        Self {
            status: QueueStatus::from_counts(total, processed),
            total,
            processed,
        }
    }

    pub fn type_text(&self) -> String {
        format!("API Sync queue is {}", self.status)
    }

    pub fn processing_text(&self) -> String {
        format!("{} of {} items processed.", self.processed, self.total)
    }
}
