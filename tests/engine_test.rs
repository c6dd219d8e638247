use anyhow::{anyhow, Result};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use actionnetwork_sync::actionnetwork::{ActionNetworkService, CollectionPage};
use actionnetwork_sync::budget::{BudgetLimits, StopReason, UNLIMITED_MEMORY_BYTES};
use actionnetwork_sync::continuation::{ContinuationRequest, ContinuationTrigger};
use actionnetwork_sync::db;
use actionnetwork_sync::model::{EmbedCodes, Enabled, Endpoint, Group, SyncRunState};
use actionnetwork_sync::{DrainOutcome, ItemOutcome, SyncEngine, SyncError};

async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    db::upsert_group(
        &pool,
        &Group {
            group_id: "g1".into(),
            api_key: "key-1".into(),
            name: "Group One".into(),
        },
    )
    .await
    .unwrap();
    pool
}

fn resource(an_id: &str, modified: &str) -> Value {
    json!({
        "identifiers": [format!("action_network:{}", an_id)],
        "title": format!("Title {}", an_id),
        "modified_date": modified,
        "_links": {
            "action_network:embed": { "href": format!("https://embed.test/{}", an_id) }
        }
    })
}

fn embed_doc(tag: &str) -> Map<String, Value> {
    json!({
        "embed_full_no_styles": format!("<div>{}</div>", tag),
        "embed_standard_default_styles": format!("<p>{}</p>", tag),
    })
    .as_object()
    .unwrap()
    .clone()
}

/// In-memory Action Network: per (group, endpoint) list of pages, linked by
/// `page-N` next links.
#[derive(Default)]
struct FakeActionNetwork {
    pages: Mutex<HashMap<(String, Endpoint), Vec<Vec<Value>>>>,
    failing: Mutex<HashSet<(String, Endpoint)>>,
    embed: Mutex<Option<Map<String, Value>>>,
    embed_calls: Mutex<Vec<String>>,
}

impl FakeActionNetwork {
    async fn set_pages(&self, endpoint: Endpoint, pages: Vec<Vec<Value>>) {
        self.pages
            .lock()
            .await
            .insert(("g1".to_string(), endpoint), pages);
    }

    async fn fail_listing(&self, endpoint: Endpoint) {
        self.failing.lock().await.insert(("g1".to_string(), endpoint));
    }

    async fn set_embed(&self, doc: Option<Map<String, Value>>) {
        *self.embed.lock().await = doc;
    }

    async fn embed_calls(&self) -> Vec<String> {
        self.embed_calls.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl ActionNetworkService for FakeActionNetwork {
    async fn fetch_page(
        &self,
        group: &Group,
        endpoint: Endpoint,
        page_url: Option<&str>,
    ) -> Result<CollectionPage> {
        let key = (group.group_id.clone(), endpoint);
        if self.failing.lock().await.contains(&key) {
            return Err(anyhow!("listing {} failed", endpoint.as_str()));
        }
        let index: usize = match page_url {
            Some(url) => url.trim_start_matches("page-").parse()?,
            None => 0,
        };
        let pages = self.pages.lock().await;
        let Some(all) = pages.get(&key) else {
            return Ok(CollectionPage::default());
        };
        Ok(CollectionPage {
            resources: all.get(index).cloned().unwrap_or_default(),
            next: (index + 1 < all.len()).then(|| format!("page-{}", index + 1)),
        })
    }

    async fn fetch_embed_codes(&self, _group: &Group, href: &str) -> Result<Map<String, Value>> {
        self.embed_calls.lock().await.push(href.to_string());
        self.embed
            .lock()
            .await
            .clone()
            .ok_or_else(|| anyhow!("embed service unavailable"))
    }
}

#[derive(Default)]
struct RecordingContinuation {
    requests: Mutex<Vec<ContinuationRequest>>,
}

impl RecordingContinuation {
    async fn requests(&self) -> Vec<ContinuationRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl ContinuationTrigger for RecordingContinuation {
    async fn request_continuation(&self, request: &ContinuationRequest) -> Result<()> {
        self.requests.lock().await.push(request.clone());
        Ok(())
    }
}

fn roomy_limits() -> BudgetLimits {
    BudgetLimits {
        max_elapsed: Duration::from_secs(600),
        max_depth: 10_000,
        memory_ceiling_bytes: UNLIMITED_MEMORY_BYTES,
        memory_headroom: 0.9,
    }
}

async fn engine_with(
    pool: &sqlx::SqlitePool,
    api: &Arc<FakeActionNetwork>,
    cont: &Arc<RecordingContinuation>,
    limits: BudgetLimits,
) -> SyncEngine {
    SyncEngine::new(pool.clone(), api.clone(), cont.clone(), limits)
        .await
        .unwrap()
        .with_memory_reader(|| 0)
}

async fn full_sync(engine: &SyncEngine) -> SyncRunState {
    let report = engine.init().await.unwrap();
    assert!(report.failures.is_empty());
    match engine.process_queue(SyncRunState::default()).await.unwrap() {
        DrainOutcome::Completed(state) => state,
        other => panic!("expected completion, got {:?}", other),
    }
}

async fn action_count(pool: &sqlx::SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM actions")
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn scenario_insert_full_update_and_enabled_refresh() {
    let pool = setup_pool().await;
    let api = Arc::new(FakeActionNetwork::default());
    api.set_embed(Some(embed_doc("new"))).await;
    let cont = Arc::new(RecordingContinuation::default());

    db::set_cache_timestamp(&pool, 1_705_000_000).await.unwrap();
    for an_id in ["stale", "fresh"] {
        sqlx::query(
            "INSERT INTO actions (an_id, g_id, title, enabled, type, embed_full_no_styles) \
             VALUES (?, 'g1', 'old title', 1, 'event', 'old-embed')",
        )
        .bind(an_id)
        .execute(&pool)
        .await
        .unwrap();
    }

    let mut fresh = resource("fresh", "2024-01-01T00:00:00Z");
    fresh["status"] = json!("cancelled");
    for res in [
        resource("stale", "2024-01-15T10:00:00Z"),
        fresh,
        resource("brand-new", "2024-01-15T10:00:00Z"),
    ] {
        db::enqueue_resource(&pool, &res, Endpoint::Events, "g1")
            .await
            .unwrap();
    }

    let engine = engine_with(&pool, &api, &cont, roomy_limits()).await;
    let cache_ts = db::cache_timestamp(&pool).await.unwrap();
    let mut state = SyncRunState::default();
    let mut outcomes = Vec::new();
    while let Some(row) = db::next_unprocessed(&pool, &[]).await.unwrap() {
        let item = row.into_item().unwrap();
        outcomes.push(
            engine
                .process_one_item(&item, &mut state, cache_ts)
                .await
                .unwrap(),
        );
    }

    assert_eq!(outcomes.len(), 3);
    assert!(outcomes.contains(&ItemOutcome::Inserted));
    assert!(outcomes.contains(&ItemOutcome::Updated));
    assert!(outcomes.contains(&ItemOutcome::Refreshed));
    assert_eq!(state.inserted, 1);
    assert_eq!(state.updated, 1);
    assert_eq!(db::queue_counts(&pool).await.unwrap(), (3, 3));

    let stale = db::fetch_action(&pool, "stale").await.unwrap().unwrap();
    assert_eq!(stale.title, "Title stale");
    assert_eq!(stale.modified_date, Some(1_705_312_800));
    assert_eq!(stale.embed_codes.embed_full_no_styles, "old-embed");

    let fresh = db::fetch_action(&pool, "fresh").await.unwrap().unwrap();
    assert_eq!(fresh.title, "old title");
    assert_eq!(fresh.enabled, Enabled::Suppressed);

    let inserted = db::fetch_action(&pool, "brand-new").await.unwrap().unwrap();
    assert_eq!(inserted.action_type, "event");
    assert_eq!(inserted.embed_codes.embed_full_no_styles, "<div>new</div>");
    assert_eq!(inserted.embed_codes.embed_full_default_styles, "");
    assert_eq!(api.embed_calls().await, vec!["https://embed.test/brand-new"]);

    match engine.process_queue(state).await.unwrap() {
        DrainOutcome::Completed(done) => {
            assert_eq!((done.inserted, done.updated, done.deleted), (1, 1, 0))
        }
        other => panic!("expected completion, got {:?}", other),
    }
    assert_eq!(db::queue_counts(&pool).await.unwrap(), (0, 0));
}

#[tokio::test]
async fn second_run_without_upstream_changes_is_idempotent() {
    let pool = setup_pool().await;
    let api = Arc::new(FakeActionNetwork::default());
    api.set_embed(Some(embed_doc("v1"))).await;
    api.set_pages(
        Endpoint::Petitions,
        vec![vec![
            resource("p1", "2024-01-15T10:00:00Z"),
            resource("p2", "2024-02-01T00:00:00Z"),
        ]],
    )
    .await;
    api.set_pages(
        Endpoint::Forms,
        vec![vec![resource("f1", "2024-03-01T00:00:00Z")]],
    )
    .await;
    let cont = Arc::new(RecordingContinuation::default());
    let engine = engine_with(&pool, &api, &cont, roomy_limits()).await;

    let first = full_sync(&engine).await;
    assert_eq!((first.inserted, first.updated, first.deleted), (3, 0, 0));
    let mut before = Vec::new();
    for an_id in ["p1", "p2", "f1"] {
        before.push(db::fetch_action(&pool, an_id).await.unwrap().unwrap());
    }

    let second = full_sync(&engine).await;
    assert_eq!((second.inserted, second.updated, second.deleted), (0, 0, 0));
    let mut after = Vec::new();
    for an_id in ["p1", "p2", "f1"] {
        after.push(db::fetch_action(&pool, an_id).await.unwrap().unwrap());
    }
    assert_eq!(before, after);
    assert_eq!(action_count(&pool).await, 3);
    assert_eq!(api.embed_calls().await.len(), 3);

    let notices = db::notices(&pool).await.unwrap();
    assert_eq!(
        notices[db::NOTICE_SYNC_COMPLETED],
        "Action Network API Sync Completed. 0 actions inserted. 0 actions updated. 0 actions deleted."
    );
}

#[tokio::test]
async fn vanished_action_is_deleted_and_counted() {
    let pool = setup_pool().await;
    let api = Arc::new(FakeActionNetwork::default());
    api.set_embed(Some(embed_doc("x"))).await;
    api.set_pages(
        Endpoint::Events,
        vec![vec![resource("kept", "2024-01-15T10:00:00Z")]],
    )
    .await;
    let cont = Arc::new(RecordingContinuation::default());

    sqlx::query(
        "INSERT INTO actions (an_id, g_id, title, enabled, type) VALUES \
         ('kept', 'g1', 'Kept', 1, 'event'), ('gone', 'g1', 'Gone', 1, 'event'), \
         ('', '', 'Manual', 1, 'petition')",
    )
    .execute(&pool)
    .await
    .unwrap();

    let engine = engine_with(&pool, &api, &cont, roomy_limits()).await;
    let state = full_sync(&engine).await;

    assert_eq!(state.deleted, 1);
    assert!(db::fetch_action(&pool, "gone").await.unwrap().is_none());
    let kept = db::fetch_action(&pool, "kept").await.unwrap().unwrap();
    assert_eq!(kept.enabled, Enabled::Active);
    assert_eq!(action_count(&pool).await, 2);
}

#[tokio::test]
async fn embed_codes_are_captured_once() {
    let pool = setup_pool().await;
    let api = Arc::new(FakeActionNetwork::default());
    api.set_embed(Some(embed_doc("first"))).await;
    api.set_pages(
        Endpoint::Petitions,
        vec![vec![resource("p1", "2024-01-15T10:00:00Z")]],
    )
    .await;
    let cont = Arc::new(RecordingContinuation::default());
    let engine = engine_with(&pool, &api, &cont, roomy_limits()).await;
    full_sync(&engine).await;

    // upstream edit after the last sync forces a full update
    let mut edited = resource("p1", "2099-01-01T00:00:00Z");
    edited["title"] = json!("Edited");
    api.set_pages(Endpoint::Petitions, vec![vec![edited]]).await;
    api.set_embed(Some(embed_doc("second"))).await;

    let state = full_sync(&engine).await;
    assert_eq!((state.inserted, state.updated), (0, 1));

    let action = db::fetch_action(&pool, "p1").await.unwrap().unwrap();
    assert_eq!(action.title, "Edited");
    assert_eq!(action.embed_codes.embed_full_no_styles, "<div>first</div>");
    assert_eq!(api.embed_calls().await.len(), 1);
}

#[tokio::test]
async fn follows_pagination_to_exhaustion() {
    let pool = setup_pool().await;
    let api = Arc::new(FakeActionNetwork::default());
    api.set_pages(
        Endpoint::AdvocacyCampaigns,
        vec![
            vec![resource("a1", "2024-01-01T00:00:00Z"), Value::Null],
            vec![resource("a2", "2024-01-01T00:00:00Z")],
            vec![json!({}), resource("a3", "2024-01-01T00:00:00Z")],
        ],
    )
    .await;
    let cont = Arc::new(RecordingContinuation::default());
    let engine = engine_with(&pool, &api, &cont, roomy_limits()).await;

    let report = engine.init().await.unwrap();
    assert_eq!(report.enqueued, 3);
    assert_eq!(db::queue_counts(&pool).await.unwrap(), (3, 0));
}

#[tokio::test]
async fn budget_exhaustion_hands_off_with_counters() {
    let pool = setup_pool().await;
    let api = Arc::new(FakeActionNetwork::default());
    api.set_embed(Some(embed_doc("x"))).await;
    api.set_pages(
        Endpoint::Forms,
        vec![(1..=5)
            .map(|i| resource(&format!("f{}", i), "2024-01-01T00:00:00Z"))
            .collect()],
    )
    .await;
    let cont = Arc::new(RecordingContinuation::default());
    let limits = BudgetLimits {
        max_depth: 1,
        ..roomy_limits()
    };
    let engine = engine_with(&pool, &api, &cont, limits).await;
    engine.init().await.unwrap();

    let outcome = engine.process_queue(SyncRunState::default()).await.unwrap();
    let expected = SyncRunState {
        inserted: 2,
        updated: 0,
        deleted: 0,
    };
    assert_eq!(
        outcome,
        DrainOutcome::HandedOff {
            state: expected,
            reason: StopReason::Depth
        }
    );
    assert_eq!(db::queue_counts(&pool).await.unwrap(), (5, 2));
    assert_eq!(db::load_run_state(&pool).await.unwrap(), expected);

    let requests = cont.requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].state, expected);

    // the next process presents the token once, then drains the rest
    let next = engine_with(&pool, &api, &cont, roomy_limits()).await;
    next.accept_continuation(&requests[0].token).await.unwrap();
    assert!(matches!(
        next.accept_continuation(&requests[0].token).await,
        Err(SyncError::InvalidToken)
    ));
    match next.process_queue(requests[0].state).await.unwrap() {
        DrainOutcome::Completed(state) => assert_eq!(state.inserted, 5),
        other => panic!("expected completion, got {:?}", other),
    }
}

#[tokio::test]
async fn memory_pressure_hands_off_before_any_item() {
    let pool = setup_pool().await;
    let api = Arc::new(FakeActionNetwork::default());
    db::enqueue_resource(&pool, &resource("e1", "2024-01-01T00:00:00Z"), Endpoint::Events, "g1")
        .await
        .unwrap();
    let cont = Arc::new(RecordingContinuation::default());
    let engine = engine_with(&pool, &api, &cont, roomy_limits())
        .await
        .with_memory_reader(|| u64::MAX);

    let outcome = engine.process_queue(SyncRunState::default()).await.unwrap();
    assert!(matches!(
        outcome,
        DrainOutcome::HandedOff {
            reason: StopReason::Memory,
            ..
        }
    ));
    assert_eq!(db::queue_counts(&pool).await.unwrap(), (1, 0));
}

#[tokio::test]
async fn listing_failure_is_isolated_and_keeps_existing_rows() {
    let pool = setup_pool().await;
    let api = Arc::new(FakeActionNetwork::default());
    api.set_embed(Some(embed_doc("x"))).await;
    api.set_pages(
        Endpoint::Petitions,
        vec![vec![resource("p1", "2024-01-01T00:00:00Z")]],
    )
    .await;
    api.fail_listing(Endpoint::Forms).await;
    let cont = Arc::new(RecordingContinuation::default());

    sqlx::query(
        "INSERT INTO actions (an_id, g_id, title, enabled, type) VALUES ('old-form', 'g1', 'Form', 1, 'form')",
    )
    .execute(&pool)
    .await
    .unwrap();

    let engine = engine_with(&pool, &api, &cont, roomy_limits()).await;
    let report = engine.init().await.unwrap();
    assert_eq!(report.enqueued, 1);
    assert_eq!(report.failures.len(), 1);
    assert!(matches!(report.failures[0], SyncError::RemoteFetch { .. }));

    match engine.process_queue(SyncRunState::default()).await.unwrap() {
        DrainOutcome::Completed(state) => assert_eq!((state.inserted, state.deleted), (1, 0)),
        other => panic!("expected completion, got {:?}", other),
    }
    let form = db::fetch_action(&pool, "old-form").await.unwrap().unwrap();
    assert_eq!(form.enabled, Enabled::Active);
}

#[tokio::test]
async fn failed_item_stays_queued_until_a_later_run() {
    let pool = setup_pool().await;
    let api = Arc::new(FakeActionNetwork::default());
    api.set_embed(Some(embed_doc("x"))).await;
    let cont = Arc::new(RecordingContinuation::default());

    for an_id in ["n1", "n2"] {
        db::enqueue_resource(&pool, &resource(an_id, "2024-01-01T00:00:00Z"), Endpoint::Events, "g1")
            .await
            .unwrap();
    }
    sqlx::query(
        "CREATE TRIGGER reject_n1 BEFORE INSERT ON actions WHEN NEW.an_id = 'n1' \
         BEGIN SELECT RAISE(ABORT, 'disk full'); END",
    )
    .execute(&pool)
    .await
    .unwrap();

    let engine = engine_with(&pool, &api, &cont, roomy_limits()).await;
    let outcome = engine.process_queue(SyncRunState::default()).await.unwrap();
    let DrainOutcome::Stalled { state, failed } = outcome else {
        panic!("expected stall, got {:?}", outcome);
    };
    assert_eq!(state.inserted, 1);
    assert_eq!(failed.len(), 1);
    assert_eq!(db::queue_counts(&pool).await.unwrap(), (2, 1));
    assert!(db::fetch_action(&pool, "n1").await.unwrap().is_none());

    sqlx::query("DROP TRIGGER reject_n1")
        .execute(&pool)
        .await
        .unwrap();
    let retry = engine_with(&pool, &api, &cont, roomy_limits()).await;
    match retry.resume(None, None).await.unwrap() {
        DrainOutcome::Completed(done) => assert_eq!(done.inserted, 2),
        other => panic!("expected completion, got {:?}", other),
    }
    assert!(db::fetch_action(&pool, "n1").await.unwrap().is_some());
}

#[tokio::test]
async fn failing_embed_endpoint_does_not_block_the_cycle() {
    let pool = setup_pool().await;
    let api = Arc::new(FakeActionNetwork::default());
    api.set_embed(None).await;
    api.set_pages(
        Endpoint::Events,
        vec![vec![resource("e1", "2024-01-01T00:00:00Z")]],
    )
    .await;
    let cont = Arc::new(RecordingContinuation::default());
    sqlx::query(
        "INSERT INTO actions (an_id, g_id, title, enabled, type) VALUES ('gone', 'g1', 'Gone', 1, 'petition')",
    )
    .execute(&pool)
    .await
    .unwrap();

    let engine = engine_with(&pool, &api, &cont, roomy_limits()).await;
    let first = full_sync(&engine).await;
    assert_eq!((first.inserted, first.deleted), (1, 1));
    assert!(db::fetch_action(&pool, "gone").await.unwrap().is_none());
    let e1 = db::fetch_action(&pool, "e1").await.unwrap().unwrap();
    assert_eq!(e1.embed_codes, EmbedCodes::default());
    assert!(db::cache_timestamp(&pool).await.unwrap() > 0);

    let second = full_sync(&engine).await;
    assert_eq!((second.inserted, second.updated, second.deleted), (0, 0, 0));
    assert_eq!(db::queue_counts(&pool).await.unwrap(), (0, 0));
}

#[tokio::test]
async fn init_drops_processed_rows_of_an_unfinished_cycle() {
    let pool = setup_pool().await;
    let api = Arc::new(FakeActionNetwork::default());
    let cont = Arc::new(RecordingContinuation::default());
    let stale = db::enqueue_resource(&pool, &resource("old", "2024-01-01T00:00:00Z"), Endpoint::Forms, "g1")
        .await
        .unwrap();
    db::mark_processed(&pool, stale).await.unwrap();
    db::enqueue_resource(&pool, &resource("pending", "2024-01-01T00:00:00Z"), Endpoint::Forms, "g1")
        .await
        .unwrap();

    let engine = engine_with(&pool, &api, &cont, roomy_limits()).await;
    engine.init().await.unwrap();
    assert_eq!(db::queue_counts(&pool).await.unwrap(), (1, 0));
}

#[tokio::test]
async fn unlisted_cancelled_event_stays_suppressed() {
    let pool = setup_pool().await;
    let api = Arc::new(FakeActionNetwork::default());
    api.set_embed(Some(embed_doc("x"))).await;
    api.set_pages(
        Endpoint::Petitions,
        vec![vec![resource("p1", "2024-01-01T00:00:00Z")]],
    )
    .await;
    api.fail_listing(Endpoint::Events).await;
    let cont = Arc::new(RecordingContinuation::default());

    let next_week = chrono::Utc::now().timestamp() + 7 * 86_400;
    sqlx::query(
        "INSERT INTO actions (an_id, g_id, title, enabled, type, start_date) VALUES \
         ('called-off', 'g1', 'Rally', 0, 'event', ?), ('rally', 'g1', 'Rally', 1, 'event', ?)",
    )
    .bind(next_week)
    .bind(next_week)
    .execute(&pool)
    .await
    .unwrap();

    let engine = engine_with(&pool, &api, &cont, roomy_limits()).await;
    let report = engine.init().await.unwrap();
    assert_eq!(report.failures.len(), 1);
    match engine.process_queue(SyncRunState::default()).await.unwrap() {
        DrainOutcome::Completed(state) => assert_eq!(state.deleted, 0),
        other => panic!("expected completion, got {:?}", other),
    }

    let called_off = db::fetch_action(&pool, "called-off").await.unwrap().unwrap();
    assert_eq!(called_off.enabled, Enabled::Suppressed);
    let rally = db::fetch_action(&pool, "rally").await.unwrap().unwrap();
    assert_eq!(rally.enabled, Enabled::Active);
}

#[tokio::test]
async fn resume_with_counters_requires_the_token() {
    let pool = setup_pool().await;
    let api = Arc::new(FakeActionNetwork::default());
    let cont = Arc::new(RecordingContinuation::default());
    db::enqueue_resource(&pool, &json!({ "title": "orphan" }), Endpoint::Forms, "g1")
        .await
        .unwrap();
    db::set_option(&pool, db::OPT_CONTINUATION_TOKEN, "issued")
        .await
        .unwrap();
    let carried = SyncRunState {
        inserted: 7,
        updated: 3,
        deleted: 0,
    };

    let engine = engine_with(&pool, &api, &cont, roomy_limits()).await;
    assert!(matches!(
        engine.resume(Some(carried), None).await,
        Err(SyncError::InvalidToken)
    ));
    assert!(matches!(
        engine.resume(Some(carried), Some("forged")).await,
        Err(SyncError::InvalidToken)
    ));
    assert_eq!(db::queue_counts(&pool).await.unwrap(), (1, 0));

    let outcome = engine.resume(Some(carried), Some("issued")).await.unwrap();
    assert_eq!(outcome, DrainOutcome::Completed(carried));
    assert!(db::get_option(&pool, db::OPT_CONTINUATION_TOKEN)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn resource_without_identifier_is_skipped() {
    let pool = setup_pool().await;
    let api = Arc::new(FakeActionNetwork::default());
    let cont = Arc::new(RecordingContinuation::default());
    db::enqueue_resource(&pool, &json!({ "title": "orphan" }), Endpoint::Forms, "g1")
        .await
        .unwrap();

    let engine = engine_with(&pool, &api, &cont, roomy_limits()).await;
    let outcome = engine.process_queue(SyncRunState::default()).await.unwrap();
    assert_eq!(outcome, DrainOutcome::Completed(SyncRunState::default()));
    assert_eq!(action_count(&pool).await, 0);
}

#[tokio::test]
async fn empty_queue_is_a_no_op() {
    let pool = setup_pool().await;
    let api = Arc::new(FakeActionNetwork::default());
    let cont = Arc::new(RecordingContinuation::default());
    let engine = engine_with(&pool, &api, &cont, roomy_limits()).await;

    let outcome = engine.process_queue(SyncRunState::default()).await.unwrap();
    assert_eq!(outcome, DrainOutcome::Empty);
    assert!(cont.requests().await.is_empty());
    assert_eq!(db::cache_timestamp(&pool).await.unwrap(), 0);
}
