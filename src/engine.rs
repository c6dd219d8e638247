//! Queue-based, resumable sync of Action Network resources.
//!
//! A full cycle is [`SyncEngine::init`] (mark existing actions for deletion,
//! walk every group's collections into the queue) followed by one or more
//! [`SyncEngine::process_queue`] calls, each in its own process, until the
//! queue is complete and [`SyncEngine::finalize`] commits the deletions.

use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::actionnetwork::ActionNetworkService;
use crate::budget::{self, BudgetDecision, BudgetLimits, StopReason};
use crate::continuation::{issue_token, ContinuationRequest, ContinuationTrigger};
use crate::db::{self, Pool};
use crate::error::{SyncError, SyncResult};
use crate::mapper;
use crate::model::{Action, EmbedCodes, Endpoint, Group, QueueItem, SyncRunState};
use crate::status::{QueueSnapshot, QueueStatus};

/// Result of populating the queue.
#[derive(Debug, Default)]
pub struct InitReport {
    /// Existing actions tentatively marked for deletion.
    pub marked: u64,
    pub enqueued: u64,
    /// One entry per (group, endpoint) whose listing failed.
    pub failures: Vec<SyncError>,
}

/// How a drain invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Nothing queued.
    Empty,
    /// Every item processed and the run finalized.
    Completed(SyncRunState),
    /// Budget exhausted; a continuation was requested.
    HandedOff {
        state: SyncRunState,
        reason: StopReason,
    },
    /// Only items that failed in this process remain.
    Stalled {
        state: SyncRunState,
        failed: Vec<i64>,
    },
}

/// What happened to a single queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Inserted,
    Updated,
    /// Known and unchanged: only `enabled` refreshed.
    Refreshed,
    /// No Action Network id or unknown endpoint; marked processed untouched.
    Skipped,
}

pub struct SyncEngine {
    pool: Pool,
    api: Arc<dyn ActionNetworkService>,
    continuation: Arc<dyn ContinuationTrigger>,
    groups: Vec<Group>,
    limits: BudgetLimits,
    started: Instant,
    memory_reader: fn() -> u64,
}

impl SyncEngine {
    /// Load the configured groups. Failure to read them is fatal.
    pub async fn new(
        pool: Pool,
        api: Arc<dyn ActionNetworkService>,
        continuation: Arc<dyn ContinuationTrigger>,
        limits: BudgetLimits,
    ) -> SyncResult<Self> {
        let groups = db::load_groups(&pool).await?;
        info!(groups = groups.len(), "sync engine ready");
        Ok(Self {
            pool,
            api,
            continuation,
            groups,
            limits,
            started: Instant::now(),
            memory_reader: budget::current_memory_usage,
        })
    }

    pub fn with_memory_reader(mut self, reader: fn() -> u64) -> Self {
        self.memory_reader = reader;
        self
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Mark existing actions for deletion and enqueue every remote resource.
    #[instrument(skip_all)]
    pub async fn init(&self) -> SyncResult<InitReport> {
        let purged = db::purge_processed_queue(&self.pool).await?;
        if purged > 0 {
            debug!(purged, "processed rows left by an unfinished cycle removed");
        }
        let mut report = InitReport {
            marked: db::mark_all_for_deletion(&self.pool).await?,
            ..Default::default()
        };
        db::save_run_state(&self.pool, &SyncRunState::default()).await?;

        for group in &self.groups {
            for endpoint in Endpoint::ALL {
                self.enqueue_collection(group, endpoint, &mut report).await?;
            }
        }

        info!(
            marked = report.marked,
            enqueued = report.enqueued,
            failures = report.failures.len(),
            "sync queue populated"
        );
        Ok(report)
    }

    /// Follow one collection's pages to exhaustion, enqueuing as we go. A
    /// listing failure is recorded in `report` and stops only this
    /// collection; store failures are fatal.
    async fn enqueue_collection(
        &self,
        group: &Group,
        endpoint: Endpoint,
        report: &mut InitReport,
    ) -> SyncResult<()> {
        let mut page_url: Option<String> = None;
        loop {
            let page = match self
                .api
                .fetch_page(group, endpoint, page_url.as_deref())
                .await
            {
                Ok(page) => page,
                Err(err) => {
                    let err = SyncError::pager(&group.group_id, endpoint, err);
                    error!(group = %group.group_id, endpoint = endpoint.as_str(), %err, "collection listing failed");
                    let released = db::release_deletion_marks(
                        &self.pool,
                        &group.group_id,
                        endpoint.type_tag(),
                        Utc::now().timestamp(),
                    )
                    .await?;
                    debug!(released, "deletion marks lifted for unlisted collection");
                    report.failures.push(err);
                    return Ok(());
                }
            };

            for resource in page.resources.iter().filter(|r| !is_blank(r)) {
                db::enqueue_resource(&self.pool, resource, endpoint, &group.group_id).await?;
                report.enqueued += 1;
            }

            match page.next {
                Some(next) if page_url.as_deref() != Some(next.as_str()) => page_url = Some(next),
                _ => return Ok(()),
            }
        }
    }

    /// Current queue counts; also records the status text for reporting.
    pub async fn snapshot(&self) -> SyncResult<QueueSnapshot> {
        let (total, processed) = db::queue_counts(&self.pool).await?;
        let snap = QueueSnapshot::new(total, processed);
        db::set_option(&self.pool, db::OPT_QUEUE_STATUS, &snap.type_text()).await?;
        Ok(snap)
    }

    /// Drain the queue one item at a time until it is empty or complete, the
    /// budget runs out, or only failed items remain.
    #[instrument(skip_all, fields(inserted = state.inserted, updated = state.updated))]
    pub async fn process_queue(&self, mut state: SyncRunState) -> SyncResult<DrainOutcome> {
        let cache_ts = db::cache_timestamp(&self.pool).await?;
        let mut failed: Vec<i64> = Vec::new();
        let mut depth: u32 = 0;

        loop {
            let snap = self.snapshot().await?;
            match snap.status {
                QueueStatus::Empty => return Ok(DrainOutcome::Empty),
                QueueStatus::Complete => {
                    let state = self.finalize(state).await?;
                    return Ok(DrainOutcome::Completed(state));
                }
                QueueStatus::Processing => {}
            }

            let decision = budget::evaluate(
                self.started.elapsed(),
                depth,
                (self.memory_reader)(),
                &self.limits,
            );
            if let BudgetDecision::Stop(reason) = decision {
                return self.hand_off(state, reason).await;
            }

            let Some(row) = db::next_unprocessed(&self.pool, &failed).await? else {
                warn!(failed = failed.len(), "only failed items remain; stopping drain");
                db::save_run_state(&self.pool, &state).await?;
                return Ok(DrainOutcome::Stalled { state, failed });
            };

            let item_id = row.id;
            let result = match row.into_item() {
                Some(item) => self.process_one_item(&item, &mut state, cache_ts).await,
                None => {
                    warn!(item_id, "queue item has unknown endpoint; skipping");
                    db::mark_processed(&self.pool, item_id)
                        .await
                        .map(|_| ItemOutcome::Skipped)
                }
            };
            match result {
                Ok(outcome) => debug!(item_id, ?outcome, "queue item processed"),
                Err(err) => {
                    error!(item_id, %err, "queue item failed; left for a later run");
                    failed.push(item_id);
                }
            }

            depth += 1;
        }
    }

    /// Apply the insert / full update / enabled-only decision for one item.
    /// The item is marked processed in the same transaction as the write.
    #[instrument(skip_all, fields(item_id = item.id, endpoint = item.endpoint.as_str()))]
    pub async fn process_one_item(
        &self,
        item: &QueueItem,
        state: &mut SyncRunState,
        cache_ts: i64,
    ) -> SyncResult<ItemOutcome> {
        let action = mapper::map_action(
            &item.resource,
            item.endpoint,
            &item.group_id,
            Utc::now().timestamp(),
        );
        let Some(an_id) = action.an_id.clone() else {
            warn!("resource has no action_network identifier; skipping");
            db::mark_processed(&self.pool, item.id).await?;
            return Ok(ItemOutcome::Skipped);
        };

        if db::action_exists(&self.pool, &an_id).await? {
            if action.modified_date.is_some_and(|modified| cache_ts < modified) {
                db::update_action_and_mark(&self.pool, &an_id, &action, item.id).await?;
                state.updated += 1;
                return Ok(ItemOutcome::Updated);
            }
            db::update_enabled_and_mark(&self.pool, &an_id, action.enabled, item.id).await?;
            return Ok(ItemOutcome::Refreshed);
        }

        // an embed failure never blocks the insert
        let embed_codes = match self.fetch_embed_codes(item).await {
            Ok(codes) => codes,
            Err(err) => {
                error!(an_id = %an_id, %err, "embed codes unavailable; inserting without them");
                EmbedCodes::default()
            }
        };
        let action = Action {
            embed_codes,
            ..action
        };
        db::insert_action_and_mark(&self.pool, &action, item.id).await?;
        state.inserted += 1;
        Ok(ItemOutcome::Inserted)
    }

    async fn fetch_embed_codes(&self, item: &QueueItem) -> SyncResult<EmbedCodes> {
        let Some(href) = mapper::embed_href(&item.resource) else {
            return Ok(EmbedCodes::default());
        };
        let group = self
            .groups
            .iter()
            .find(|g| g.group_id == item.group_id)
            .ok_or_else(|| SyncError::UnknownGroup(item.group_id.clone()))?;
        let raw = self
            .api
            .fetch_embed_codes(group, &href)
            .await
            .map_err(|err| SyncError::embed(&group.group_id, &href, err))?;
        Ok(EmbedCodes::from_raw(&raw))
    }

    /// Purge the processed queue, delete actions that did not reappear,
    /// stamp the sync time and publish the summary notice.
    #[instrument(skip_all)]
    pub async fn finalize(&self, mut state: SyncRunState) -> SyncResult<SyncRunState> {
        let purged = db::purge_processed_queue(&self.pool).await?;
        state.deleted += db::delete_marked_actions(&self.pool).await?;
        db::set_cache_timestamp(&self.pool, Utc::now().timestamp()).await?;
        db::set_notice(&self.pool, db::NOTICE_SYNC_COMPLETED, &state.summary()).await?;
        db::delete_option(&self.pool, db::OPT_RUN_STATE).await?;
        info!(
            purged,
            inserted = state.inserted,
            updated = state.updated,
            deleted = state.deleted,
            "sync completed"
        );
        Ok(state)
    }

    async fn hand_off(&self, state: SyncRunState, reason: StopReason) -> SyncResult<DrainOutcome> {
        db::save_run_state(&self.pool, &state).await?;
        let token = issue_token();
        db::set_option(&self.pool, db::OPT_CONTINUATION_TOKEN, &token).await?;
        info!(%reason, inserted = state.inserted, updated = state.updated, "budget reached; handing off");
        self.continuation
            .request_continuation(&ContinuationRequest { state, token })
            .await
            .map_err(SyncError::Continuation)?;
        Ok(DrainOutcome::HandedOff { state, reason })
    }

    /// Continue draining in a fresh process. Counters carried over from the
    /// process that handed off are accepted only with its one-time token.
    /// Without counters the persisted run state is used, which is how an
    /// operator retries a stalled drain by hand.
    #[instrument(skip_all)]
    pub async fn resume(
        &self,
        counters: Option<SyncRunState>,
        token: Option<&str>,
    ) -> SyncResult<DrainOutcome> {
        match token {
            Some(token) => self.accept_continuation(token).await?,
            None if counters.is_some() => return Err(SyncError::InvalidToken),
            None => {}
        }
        let state = match counters {
            Some(state) => state,
            None => db::load_run_state(&self.pool).await?,
        };
        self.process_queue(state).await
    }

    /// Validate and consume the one-time continuation token.
    pub async fn accept_continuation(&self, token: &str) -> SyncResult<()> {
        match db::get_option(&self.pool, db::OPT_CONTINUATION_TOKEN).await? {
            Some(stored) if !token.is_empty() && stored == token => {
                db::delete_option(&self.pool, db::OPT_CONTINUATION_TOKEN).await?;
                Ok(())
            }
            _ => Err(SyncError::InvalidToken),
        }
    }
}

fn is_blank(resource: &serde_json::Value) -> bool {
    match resource {
        serde_json::Value::Null => true,
        serde_json::Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
