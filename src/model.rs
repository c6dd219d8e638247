use serde::{Deserialize, Serialize};

/// Collection types listed by the Action Network API, in traversal order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Petitions,
    Events,
    FundraisingPages,
    AdvocacyCampaigns,
    Forms,
}

impl Endpoint {
    pub const ALL: [Endpoint; 5] = [
        Endpoint::Petitions,
        Endpoint::Events,
        Endpoint::FundraisingPages,
        Endpoint::AdvocacyCampaigns,
        Endpoint::Forms,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Petitions => "petitions",
            Endpoint::Events => "events",
            Endpoint::FundraisingPages => "fundraising_pages",
            Endpoint::AdvocacyCampaigns => "advocacy_campaigns",
            Endpoint::Forms => "forms",
        }
    }

    pub fn parse_endpoint(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.as_str() == s)
    }

    /// Key of the HAL `_embedded` array holding this collection's resources.
    pub fn embedded_key(&self) -> String {
        format!("osdi:{}", self.as_str())
    }

    /// Action type tag: the endpoint name without its pluralizing "s".
    pub fn type_tag(&self) -> &'static str {
        let s = self.as_str();
        s.strip_suffix('s').unwrap_or(s)
    }
}

/// Remote account whose API key scopes every call made on its behalf.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Group {
    pub group_id: String,
    pub api_key: String,
    pub name: String,
}

/// One queued resource awaiting normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem {
    pub id: i64,
    pub resource: serde_json::Value,
    pub endpoint: Endpoint,
    pub group_id: String,
    pub processed: bool,
}

/// Tri-state `enabled` column of the actions table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Enabled {
    Active,
    Suppressed,
    PendingDeletion,
}

impl Enabled {
    pub fn as_i64(&self) -> i64 {
        match self {
            Enabled::Active => 1,
            Enabled::Suppressed => 0,
            Enabled::PendingDeletion => -1,
        }
    }

    pub fn from_i64(v: i64) -> Option<Self> {
        match v {
            1 => Some(Enabled::Active),
            0 => Some(Enabled::Suppressed),
            -1 => Some(Enabled::PendingDeletion),
            _ => None,
        }
    }
}

/// The six embed snippet variants captured on first insert.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmbedCodes {
    pub embed_standard_layout_only_styles: String,
    pub embed_full_layout_only_styles: String,
    pub embed_standard_no_styles: String,
    pub embed_full_no_styles: String,
    pub embed_standard_default_styles: String,
    pub embed_full_default_styles: String,
}

impl EmbedCodes {
    pub const KEYS: [&'static str; 6] = [
        "embed_standard_layout_only_styles",
        "embed_full_layout_only_styles",
        "embed_standard_no_styles",
        "embed_full_no_styles",
        "embed_standard_default_styles",
        "embed_full_default_styles",
    ];

    /// Normalize an embed API response: keep the six known variants, empty
    /// string for any that is missing or not a string.
    pub fn from_raw(raw: &serde_json::Map<String, serde_json::Value>) -> Self {
        let get = |key: &str| {
            raw.get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        Self {
            embed_standard_layout_only_styles: get(Self::KEYS[0]),
            embed_full_layout_only_styles: get(Self::KEYS[1]),
            embed_standard_no_styles: get(Self::KEYS[2]),
            embed_full_no_styles: get(Self::KEYS[3]),
            embed_standard_default_styles: get(Self::KEYS[4]),
            embed_full_default_styles: get(Self::KEYS[5]),
        }
    }
}

/// Normalized, persisted representation of a remote resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Action {
    pub an_id: Option<String>,
    pub g_id: String,
    pub created_date: Option<i64>,
    pub modified_date: Option<i64>,
    pub start_date: Option<i64>,
    pub browser_url: String,
    pub title: String,
    pub name: String,
    pub description: String,
    /// JSON re-serialization of the resource's OSDI `location` object.
    pub location: String,
    pub enabled: Enabled,
    pub action_type: String,
    pub hidden: bool,
    pub featured_image_url: String,
    pub embed_codes: EmbedCodes,
}

/// Counters accumulated over a sync run, carried across continuation handoffs.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncRunState {
    pub inserted: u64,
    pub updated: u64,
    pub deleted: u64,
}

impl SyncRunState {
    pub fn summary(&self) -> String {
        format!(
            "Action Network API Sync Completed. {} actions inserted. {} actions updated. {} actions deleted.",
            self.inserted, self.updated, self.deleted
        )
    }
}
