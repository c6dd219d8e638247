//! Projection of raw API resources into typed [`Action`] records.
//!
//! Raw resources arrive as loosely-typed JSON documents. Nothing past this
//! module sees them: malformed or missing fields map to empty/null defaults
//! so a bad document never stalls the queue.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::model::{Action, EmbedCodes, Enabled, Endpoint};

/// Namespace marker of Action Network's own identifier in `identifiers`.
pub const AN_ID_PREFIX: &str = "action_network:";

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// Map a raw resource into an [`Action`]. `now` is the epoch second used to
/// decide whether a start date lies in the past. Embed codes are left empty;
/// they are only attached on first insert.
pub fn map_action(resource: &Value, endpoint: Endpoint, group_id: &str, now: i64) -> Action {
    let start_date = date_field(resource, "start_date");
    let hidden = resource
        .get("action_network:hidden")
        .is_some_and(is_truthy);
    let cancelled = resource.get("status").and_then(Value::as_str) == Some("cancelled");
    let started = start_date.is_some_and(|start| start < now);

    let enabled = if hidden || cancelled || started {
        Enabled::Suppressed
    } else {
        Enabled::Active
    };

    Action {
        an_id: extract_an_id(resource),
        g_id: group_id.to_string(),
        created_date: date_field(resource, "created_date"),
        modified_date: date_field(resource, "modified_date"),
        start_date,
        browser_url: text_field(resource, "browser_url"),
        title: text_field(resource, "title"),
        name: text_field(resource, "name"),
        description: text_field(resource, "description"),
        location: resource
            .get("location")
            .filter(|v| !v.is_null())
            .map(Value::to_string)
            .unwrap_or_default(),
        enabled,
        action_type: endpoint.type_tag().to_string(),
        hidden,
        featured_image_url: text_field(resource, "featured_image_url"),
        embed_codes: EmbedCodes::default(),
    }
}

/// Suffix of the first `action_network:`-prefixed identifier, if any.
pub fn extract_an_id(resource: &Value) -> Option<String> {
    resource
        .get("identifiers")?
        .as_array()?
        .iter()
        .filter_map(Value::as_str)
        .find_map(|id| id.strip_prefix(AN_ID_PREFIX))
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Link to the resource's embed-code document.
pub fn embed_href(resource: &Value) -> Option<String> {
    resource
        .pointer("/_links/action_network:embed/href")
        .and_then(Value::as_str)
        .filter(|href| !href.trim().is_empty())
        .map(str::to_string)
}

/// Parse an API date string into epoch seconds. Naive values are UTC.
pub fn parse_date(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp());
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.and_utc().timestamp());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
}

fn date_field(resource: &Value, key: &str) -> Option<i64> {
    resource.get(key).and_then(Value::as_str).and_then(parse_date)
}

/// Flags sometimes arrive as `"true"` or `1` instead of a JSON bool.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => s.eq_ignore_ascii_case("true") || s == "1",
        _ => false,
    }
}

fn text_field(resource: &Value, key: &str) -> String {
    resource
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
