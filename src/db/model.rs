//! Row-level view models returned by repositories.
//!
//! Keep these structs focused on the data returned by queries. Decoding into
//! domain types happens here; business logic lives in the engine.

use crate::model::{Endpoint, QueueItem};

/// Raw `sync_queue` row as selected for processing.
#[derive(Debug, Clone)]
pub struct QueueRow {
    pub id: i64,
    pub resource: String,
    pub endpoint: String,
    pub g_id: String,
    pub processed: bool,
}

impl QueueRow {
    /// Decode into a typed [`QueueItem`]. A payload that is not valid JSON
    /// decodes as `Null` (mapped later to empty defaults); an unknown
    /// endpoint cannot be mapped at all and yields `None`.
    pub fn into_item(self) -> Option<QueueItem> {
        let endpoint = Endpoint::parse_endpoint(&self.endpoint)?;
        let resource = serde_json::from_str(&self.resource).unwrap_or(serde_json::Value::Null);
        Some(QueueItem {
            id: self.id,
            resource,
            endpoint,
            group_id: self.g_id,
            processed: self.processed,
        })
    }
}
