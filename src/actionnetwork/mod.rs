use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Config;
use crate::model::{Endpoint, Group};

pub mod model;

pub use model::CollectionPage;
use model::CollectionResponse;

pub const ACTION_NETWORK_API_BASE: &str = "https://actionnetwork.org/api/v2/";

const API_TOKEN_HEADER: &str = "OSDI-API-Token";

/// Remote capabilities the sync engine needs: paged collection listing and
/// embed-code lookup, both scoped by a group's API key.
#[async_trait]
pub trait ActionNetworkService: Send + Sync {
    /// Fetch one page of `endpoint`. `page_url` is the `next` link of the
    /// previous page, or `None` for the first page.
    async fn fetch_page(
        &self,
        group: &Group,
        endpoint: Endpoint,
        page_url: Option<&str>,
    ) -> Result<CollectionPage>;

    /// Fetch the raw embed-code document behind a resource's embed link.
    async fn fetch_embed_codes(&self, group: &Group, href: &str) -> Result<Map<String, Value>>;
}

#[derive(Clone)]
pub struct ActionNetworkClient {
    http: Client,
    base_url: Url,
}

impl fmt::Debug for ActionNetworkClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionNetworkClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ActionNetworkClient {
    pub fn new() -> Result<Self> {
        let base_url = Url::parse(ACTION_NETWORK_API_BASE).context("invalid default API URL")?;
        Self::with_base_url(base_url, Duration::from_secs(30))
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        let base_url = Url::parse(&cfg.actionnetwork.base_url)
            .with_context(|| format!("invalid API base URL {}", cfg.actionnetwork.base_url))?;
        Self::with_base_url(
            base_url,
            Duration::from_secs(cfg.actionnetwork.request_timeout_seconds),
        )
    }

    pub fn with_base_url(base_url: Url, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("actionnetwork-sync/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http, base_url })
    }

    pub fn collection_url(&self, endpoint: Endpoint) -> Result<Url> {
        self.base_url
            .join(endpoint.as_str())
            .context("invalid API base URL")
    }

    pub fn build_request(&self, url: Url, group: &Group) -> Result<reqwest::Request> {
        self.http
            .get(url)
            .header(API_TOKEN_HEADER, &group.api_key)
            .header("Accept", "application/hal+json")
            .build()
            .context("failed to build Action Network request")
    }

    async fn get_json(&self, url: Url, group: &Group) -> Result<Value> {
        let request = self.build_request(url, group)?;
        debug!(url = %request.url(), group = %group.group_id, "GET");
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach Action Network")?;

        let status = res.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            warn!("Rate limited by Action Network: {}", body);
            return Err(anyhow!("received 429 from Action Network: {}", body));
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!(%status, "Action Network API error: {}", body);
            return Err(anyhow!("action network error {}: {}", status, body));
        }

        res.json::<Value>()
            .await
            .context("invalid Action Network response JSON")
    }
}

#[async_trait]
impl ActionNetworkService for ActionNetworkClient {
    async fn fetch_page(
        &self,
        group: &Group,
        endpoint: Endpoint,
        page_url: Option<&str>,
    ) -> Result<CollectionPage> {
        let url = match page_url {
            Some(href) => Url::parse(href).with_context(|| format!("invalid next link {}", href))?,
            None => self.collection_url(endpoint)?,
        };
        let body = self.get_json(url, group).await?;
        parse_collection_page(body, endpoint)
    }

    async fn fetch_embed_codes(&self, group: &Group, href: &str) -> Result<Map<String, Value>> {
        let url = Url::parse(href).with_context(|| format!("invalid embed link {}", href))?;
        match self.get_json(url, group).await? {
            Value::Object(map) => Ok(map),
            other => Err(anyhow!("embed response is not an object: {}", other)),
        }
    }
}

/// Extract the resources of `endpoint` and the `next` link from a HAL page.
pub fn parse_collection_page(body: Value, endpoint: Endpoint) -> Result<CollectionPage> {
    let mut page: CollectionResponse =
        serde_json::from_value(body).context("unexpected collection page shape")?;
    let resources = match page.embedded.remove(&endpoint.embedded_key()) {
        Some(Value::Array(items)) => items,
        Some(Value::Null) | None => Vec::new(),
        Some(other) => return Err(anyhow!("embedded resources are not an array: {}", other)),
    };
    Ok(CollectionPage {
        resources,
        next: page
            .links
            .next
            .map(|l| l.href)
            .filter(|href| !href.trim().is_empty()),
    })
}
