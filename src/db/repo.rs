use super::model::QueueRow;
use crate::error::SyncResult;
use crate::model::{Action, EmbedCodes, Enabled, Endpoint, Group, SyncRunState};
use anyhow::Result;
use serde_json::{Map, Value};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool, Transaction};
use tracing::instrument;

pub type Pool = SqlitePool;

pub const OPT_CACHE_TIMESTAMP: &str = "cache_timestamp";
pub const OPT_RUN_STATE: &str = "run_state";
pub const OPT_QUEUE_STATUS: &str = "queue_status";
pub const OPT_CONTINUATION_TOKEN: &str = "continuation_token";
pub const OPT_NOTICES: &str = "notices";

/// Notice slot holding the summary of the last completed sync.
pub const NOTICE_SYNC_COMPLETED: &str = "api_sync_completed";

const ACTION_COLUMNS: &str = "an_id, g_id, created_date, modified_date, start_date, browser_url, \
     title, name, description, location, enabled, type, hidden, featured_image_url, \
     embed_standard_layout_only_styles, embed_full_layout_only_styles, \
     embed_standard_no_styles, embed_full_no_styles, \
     embed_standard_default_styles, embed_full_default_styles";

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// For a file-backed SQLite URL, expand a leading `~/`, make sure the parent
/// directory exists and ask SQLite to create the file. In-memory URLs pass
/// through untouched.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    match query_part {
        Some(q) => format!("sqlite://{}?{}", expanded_path, q),
        None => format!("sqlite://{}?mode=rwc", expanded_path),
    }
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

// --- groups ---------------------------------------------------------------

#[instrument(skip_all)]
pub async fn load_groups(pool: &Pool) -> SyncResult<Vec<Group>> {
    let rows = sqlx::query("SELECT group_id, api_key, name FROM groups ORDER BY group_id")
        .fetch_all(pool)
        .await?;
    Ok(rows
        .into_iter()
        .map(|row| Group {
            group_id: row.get("group_id"),
            api_key: row.get("api_key"),
            name: row.get("name"),
        })
        .collect())
}

#[instrument(skip_all, fields(group = %group.group_id))]
pub async fn upsert_group(pool: &Pool, group: &Group) -> SyncResult<()> {
    sqlx::query(
        "INSERT INTO groups (group_id, api_key, name) VALUES (?, ?, ?) \
         ON CONFLICT(group_id) DO UPDATE SET api_key = excluded.api_key, name = excluded.name",
    )
    .bind(&group.group_id)
    .bind(&group.api_key)
    .bind(&group.name)
    .execute(pool)
    .await?;
    Ok(())
}

// --- queue ----------------------------------------------------------------

#[instrument(skip_all, fields(endpoint = endpoint.as_str()))]
pub async fn enqueue_resource(
    pool: &Pool,
    resource: &Value,
    endpoint: Endpoint,
    group_id: &str,
) -> SyncResult<i64> {
    let rec = sqlx::query(
        "INSERT INTO sync_queue (resource, endpoint, g_id, processed) VALUES (?, ?, ?, 0) RETURNING id",
    )
    .bind(resource.to_string())
    .bind(endpoint.as_str())
    .bind(group_id)
    .fetch_one(pool)
    .await?;
    Ok(rec.get("id"))
}

/// First available unprocessed row, skipping the ids in `exclude`.
#[instrument(skip_all)]
pub async fn next_unprocessed(pool: &Pool, exclude: &[i64]) -> SyncResult<Option<QueueRow>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT id, resource, endpoint, g_id, processed FROM sync_queue WHERE processed = 0",
    );
    if !exclude.is_empty() {
        qb.push(" AND id NOT IN (");
        let mut sep = qb.separated(", ");
        for id in exclude {
            sep.push_bind(*id);
        }
        sep.push_unseparated(")");
    }
    qb.push(" LIMIT 1");

    let row = qb.build().fetch_optional(pool).await?;
    Ok(row.map(|row| QueueRow {
        id: row.get("id"),
        resource: row.get("resource"),
        endpoint: row.get("endpoint"),
        g_id: row.get("g_id"),
        processed: row.get::<i64, _>("processed") != 0,
    }))
}

/// Returns `(total, processed)` row counts.
#[instrument(skip_all)]
pub async fn queue_counts(pool: &Pool) -> SyncResult<(i64, i64)> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS total, COALESCE(SUM(processed = 1), 0) AS processed FROM sync_queue",
    )
    .fetch_one(pool)
    .await?;
    Ok((row.get("total"), row.get("processed")))
}

#[instrument(skip_all)]
pub async fn mark_processed(pool: &Pool, item_id: i64) -> SyncResult<()> {
    sqlx::query("UPDATE sync_queue SET processed = 1 WHERE id = ? AND processed = 0")
        .bind(item_id)
        .execute(pool)
        .await?;
    Ok(())
}

async fn mark_processed_tx(tx: &mut Transaction<'_, Sqlite>, item_id: i64) -> SyncResult<()> {
    sqlx::query("UPDATE sync_queue SET processed = 1 WHERE id = ? AND processed = 0")
        .bind(item_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn purge_processed_queue(pool: &Pool) -> SyncResult<u64> {
    let res = sqlx::query("DELETE FROM sync_queue WHERE processed = 1")
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

// --- actions --------------------------------------------------------------

/// Tentatively mark every synced action for deletion, remembering the prior
/// `enabled` value. Rows already marked by an interrupted cycle keep theirs.
#[instrument(skip_all)]
pub async fn mark_all_for_deletion(pool: &Pool) -> SyncResult<u64> {
    let res = sqlx::query(
        "UPDATE actions SET \
             enabled_before_mark = CASE WHEN enabled = -1 THEN enabled_before_mark ELSE enabled END, \
             enabled = -1 \
         WHERE an_id != ''",
    )
    .execute(pool)
    .await?;
    Ok(res.rows_affected())
}

/// Physically delete synced actions still carrying the deletion mark.
#[instrument(skip_all)]
pub async fn delete_marked_actions(pool: &Pool) -> SyncResult<u64> {
    let res = sqlx::query("DELETE FROM actions WHERE an_id != '' AND enabled = -1")
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

/// Lift the deletion mark from one group's actions of one type, restoring the
/// value held before marking. A start date that has since passed still
/// suppresses the row. Used when that collection could not be listed, so its
/// rows are not purged as vanished.
#[instrument(skip_all, fields(group = %group_id, action_type = %action_type))]
pub async fn release_deletion_marks(
    pool: &Pool,
    group_id: &str,
    action_type: &str,
    now: i64,
) -> SyncResult<u64> {
    let res = sqlx::query(
        "UPDATE actions SET enabled = CASE \
             WHEN COALESCE(enabled_before_mark, 1) = 0 OR hidden != 0 \
                  OR (start_date IS NOT NULL AND start_date < ?) THEN 0 ELSE 1 END \
         WHERE an_id != '' AND enabled = -1 AND g_id = ? AND type = ?",
    )
    .bind(now)
    .bind(group_id)
    .bind(action_type)
    .execute(pool)
    .await?;
    Ok(res.rows_affected())
}

#[instrument(skip_all)]
pub async fn action_exists(pool: &Pool, an_id: &str) -> SyncResult<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM actions WHERE an_id = ?")
        .bind(an_id)
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}

/// Insert a new action and mark its queue item processed, atomically.
#[instrument(skip_all, fields(item_id = item_id))]
pub async fn insert_action_and_mark(pool: &Pool, action: &Action, item_id: i64) -> SyncResult<()> {
    let mut tx = pool.begin().await?;
    let sql = format!(
        "INSERT INTO actions ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        ACTION_COLUMNS
    );
    let e = &action.embed_codes;
    sqlx::query(&sql)
        .bind(action.an_id.as_deref().unwrap_or_default())
        .bind(&action.g_id)
        .bind(action.created_date)
        .bind(action.modified_date)
        .bind(action.start_date)
        .bind(&action.browser_url)
        .bind(&action.title)
        .bind(&action.name)
        .bind(&action.description)
        .bind(&action.location)
        .bind(action.enabled.as_i64())
        .bind(&action.action_type)
        .bind(action.hidden)
        .bind(&action.featured_image_url)
        .bind(&e.embed_standard_layout_only_styles)
        .bind(&e.embed_full_layout_only_styles)
        .bind(&e.embed_standard_no_styles)
        .bind(&e.embed_full_no_styles)
        .bind(&e.embed_standard_default_styles)
        .bind(&e.embed_full_default_styles)
        .execute(&mut *tx)
        .await?;
    mark_processed_tx(&mut tx, item_id).await?;
    tx.commit().await?;
    Ok(())
}

/// Full field update of an existing action (embed codes untouched), then mark
/// the queue item processed, atomically.
#[instrument(skip_all, fields(item_id = item_id, an_id = %an_id))]
pub async fn update_action_and_mark(
    pool: &Pool,
    an_id: &str,
    action: &Action,
    item_id: i64,
) -> SyncResult<()> {
    let mut tx = pool.begin().await?;
    sqlx::query(
        "UPDATE actions SET g_id = ?, created_date = ?, modified_date = ?, start_date = ?, \
         browser_url = ?, title = ?, name = ?, description = ?, location = ?, enabled = ?, \
         type = ?, hidden = ?, featured_image_url = ? WHERE an_id = ?",
    )
    .bind(&action.g_id)
    .bind(action.created_date)
    .bind(action.modified_date)
    .bind(action.start_date)
    .bind(&action.browser_url)
    .bind(&action.title)
    .bind(&action.name)
    .bind(&action.description)
    .bind(&action.location)
    .bind(action.enabled.as_i64())
    .bind(&action.action_type)
    .bind(action.hidden)
    .bind(&action.featured_image_url)
    .bind(an_id)
    .execute(&mut *tx)
    .await?;
    mark_processed_tx(&mut tx, item_id).await?;
    tx.commit().await?;
    Ok(())
}

/// Refresh only the `enabled` flag, then mark the queue item processed.
#[instrument(skip_all, fields(item_id = item_id, an_id = %an_id))]
pub async fn update_enabled_and_mark(
    pool: &Pool,
    an_id: &str,
    enabled: Enabled,
    item_id: i64,
) -> SyncResult<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE actions SET enabled = ? WHERE an_id = ?")
        .bind(enabled.as_i64())
        .bind(an_id)
        .execute(&mut *tx)
        .await?;
    mark_processed_tx(&mut tx, item_id).await?;
    tx.commit().await?;
    Ok(())
}

pub async fn fetch_action(pool: &Pool, an_id: &str) -> SyncResult<Option<Action>> {
    let sql = format!("SELECT {} FROM actions WHERE an_id = ?", ACTION_COLUMNS);
    let row = sqlx::query(&sql).bind(an_id).fetch_optional(pool).await?;
    let Some(row) = row else {
        return Ok(None);
    };

    let an_id: String = row.get("an_id");
    let enabled: i64 = row.get("enabled");
    Ok(Some(Action {
        an_id: Some(an_id).filter(|s| !s.is_empty()),
        g_id: row.get("g_id"),
        created_date: row.get("created_date"),
        modified_date: row.get("modified_date"),
        start_date: row.get("start_date"),
        browser_url: row.get("browser_url"),
        title: row.get("title"),
        name: row.get("name"),
        description: row.get("description"),
        location: row.get("location"),
        enabled: Enabled::from_i64(enabled).unwrap_or(Enabled::Suppressed),
        action_type: row.get("type"),
        hidden: row.get::<i64, _>("hidden") != 0,
        featured_image_url: row.get("featured_image_url"),
        embed_codes: EmbedCodes {
            embed_standard_layout_only_styles: row.get("embed_standard_layout_only_styles"),
            embed_full_layout_only_styles: row.get("embed_full_layout_only_styles"),
            embed_standard_no_styles: row.get("embed_standard_no_styles"),
            embed_full_no_styles: row.get("embed_full_no_styles"),
            embed_standard_default_styles: row.get("embed_standard_default_styles"),
            embed_full_default_styles: row.get("embed_full_default_styles"),
        },
    }))
}

// --- options --------------------------------------------------------------

pub async fn get_option(pool: &Pool, key: &str) -> SyncResult<Option<String>> {
    let value = sqlx::query_scalar::<_, String>("SELECT value FROM sync_options WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(value)
}

pub async fn set_option(pool: &Pool, key: &str, value: &str) -> SyncResult<()> {
    sqlx::query(
        "INSERT INTO sync_options (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_option(pool: &Pool, key: &str) -> SyncResult<()> {
    sqlx::query("DELETE FROM sync_options WHERE key = ?")
        .bind(key)
        .execute(pool)
        .await?;
    Ok(())
}

/// Epoch second at which the last sync completed; 0 if never.
pub async fn cache_timestamp(pool: &Pool) -> SyncResult<i64> {
    Ok(get_option(pool, OPT_CACHE_TIMESTAMP)
        .await?
        .and_then(|v| v.parse().ok())
        .unwrap_or(0))
}

pub async fn set_cache_timestamp(pool: &Pool, ts: i64) -> SyncResult<()> {
    set_option(pool, OPT_CACHE_TIMESTAMP, &ts.to_string()).await
}

pub async fn load_run_state(pool: &Pool) -> SyncResult<SyncRunState> {
    match get_option(pool, OPT_RUN_STATE).await? {
        Some(raw) => Ok(serde_json::from_str(&raw)?),
        None => Ok(SyncRunState::default()),
    }
}

#[instrument(skip_all, fields(inserted = state.inserted, updated = state.updated, deleted = state.deleted))]
pub async fn save_run_state(pool: &Pool, state: &SyncRunState) -> SyncResult<()> {
    set_option(pool, OPT_RUN_STATE, &serde_json::to_string(state)?).await
}

pub async fn notices(pool: &Pool) -> SyncResult<Map<String, Value>> {
    match get_option(pool, OPT_NOTICES).await? {
        Some(raw) => Ok(serde_json::from_str(&raw)?),
        None => Ok(Map::new()),
    }
}

/// Write `message` into the notice `slot`, keeping other slots.
pub async fn set_notice(pool: &Pool, slot: &str, message: &str) -> SyncResult<()> {
    let mut all = notices(pool).await?;
    all.insert(slot.to_string(), Value::String(message.to_string()));
    set_option(pool, OPT_NOTICES, &Value::Object(all).to_string()).await
}
