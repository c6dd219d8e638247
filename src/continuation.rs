//! Continuation handoff: ask for a fresh process to resume the drain.
//!
//! Both triggers are fire-and-forget. The spawned process, or whatever
//! answers the HTTP request, is never awaited to completion.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::{Config, ContinuationMode};
use crate::model::SyncRunState;

/// Counters to carry forward plus the one-time token the new process must
/// present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationRequest {
    pub state: SyncRunState,
    pub token: String,
}

impl ContinuationRequest {
    /// Arguments for `actionnetwork-sync resume`.
    pub fn resume_args(&self) -> Vec<String> {
        vec![
            "resume".into(),
            "--inserted".into(),
            self.state.inserted.to_string(),
            "--updated".into(),
            self.state.updated.to_string(),
            "--deleted".into(),
            self.state.deleted.to_string(),
            "--token".into(),
            self.token.clone(),
        ]
    }

    /// Form body for an HTTP continuation endpoint.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("action", "actionnetwork_process_queue".into()),
            ("queue_action", "continue".into()),
            ("updated", self.state.updated.to_string()),
            ("inserted", self.state.inserted.to_string()),
            ("deleted", self.state.deleted.to_string()),
            ("token", self.token.clone()),
        ]
    }
}

#[async_trait]
pub trait ContinuationTrigger: Send + Sync {
    async fn request_continuation(&self, request: &ContinuationRequest) -> Result<()>;
}

/// Fresh one-time token for a continuation request.
pub fn issue_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Re-executes the current binary as a detached `resume` process.
#[derive(Debug, Clone)]
pub struct SpawnContinuation {
    exe: PathBuf,
    config_path: PathBuf,
}

impl SpawnContinuation {
    pub fn new(exe: PathBuf, config_path: PathBuf) -> Self {
        Self { exe, config_path }
    }

    pub fn current_exe(config_path: PathBuf) -> Result<Self> {
        let exe = std::env::current_exe().context("cannot locate current executable")?;
        Ok(Self::new(exe, config_path))
    }
}

#[async_trait]
impl ContinuationTrigger for SpawnContinuation {
    async fn request_continuation(&self, request: &ContinuationRequest) -> Result<()> {
        let child = Command::new(&self.exe)
            .arg("--config")
            .arg(&self.config_path)
            .args(request.resume_args())
            .stdin(Stdio::null())
            .kill_on_drop(false)
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.exe.display()))?;
        info!(pid = child.id(), "spawned continuation process");
        Ok(())
    }
}

/// POSTs the counters to a continuation endpoint.
#[derive(Debug, Clone)]
pub struct HttpContinuation {
    http: Client,
    url: Url,
}

impl HttpContinuation {
    pub fn new(url: Url) -> Result<Self> {
        Self::with_timeout(url, Duration::from_secs(5))
    }

    /// The connect phase gets half of `timeout`, so a timeout reported after
    /// that point means the request reached the endpoint.
    pub fn with_timeout(url: Url, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("actionnetwork-sync/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(timeout / 2)
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http, url })
    }
}

#[async_trait]
impl ContinuationTrigger for HttpContinuation {
    async fn request_continuation(&self, request: &ContinuationRequest) -> Result<()> {
        let sent = self
            .http
            .post(self.url.clone())
            .form(&request.form_fields())
            .send()
            .await;
        let res = match sent {
            Ok(res) => res,
            // the endpoint may run the drain before answering
            Err(err) if err.is_timeout() && !err.is_connect() => {
                warn!(url = %self.url, "continuation endpoint did not answer in time; assuming accepted");
                return Ok(());
            }
            Err(err) => {
                return Err(anyhow::Error::new(err)
                    .context(format!("failed to reach continuation endpoint {}", self.url)));
            }
        };
        if !res.status().is_success() {
            return Err(anyhow!("continuation endpoint answered {}", res.status()));
        }
        info!(url = %self.url, "continuation requested");
        Ok(())
    }
}

/// Build the trigger selected by `continuation.mode`.
pub fn from_config(cfg: &Config, config_path: PathBuf) -> Result<Arc<dyn ContinuationTrigger>> {
    match cfg.continuation.mode {
        ContinuationMode::Spawn => Ok(Arc::new(SpawnContinuation::current_exe(config_path)?)),
        ContinuationMode::Http => {
            let url = Url::parse(&cfg.continuation.url)
                .with_context(|| format!("invalid continuation url {}", cfg.continuation.url))?;
            Ok(Arc::new(HttpContinuation::new(url)?))
        }
    }
}
