use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Deserialize, Debug, Clone)]
pub struct Link {
    pub href: String,
}

#[derive(Deserialize, Debug, Default)]
pub struct CollectionLinks {
    pub next: Option<Link>,
}

/// HAL collection page as returned by the OSDI listing endpoints.
#[derive(Deserialize, Debug, Default)]
pub struct CollectionResponse {
    #[serde(rename = "_embedded", default)]
    pub embedded: Map<String, Value>,
    #[serde(rename = "_links", default)]
    pub links: CollectionLinks,
}

/// One page of raw resources plus the link to the following page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionPage {
    pub resources: Vec<Value>,
    pub next: Option<String>,
}
