use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use actionnetwork_sync::actionnetwork::ActionNetworkClient;
use actionnetwork_sync::config::Config;
use actionnetwork_sync::model::{Group, SyncRunState};
use actionnetwork_sync::status::QueueSnapshot;
use actionnetwork_sync::{config, continuation, db, DrainOutcome, SyncEngine};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Incrementally sync Action Network actions into the local store"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, global = true, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Register a group, or replace its API key and name
    AddGroup {
        #[arg(long)]
        group_id: String,
        #[arg(long)]
        api_key: String,
        #[arg(long, default_value = "")]
        name: String,
    },
    /// Start a full sync cycle: mark, enqueue every collection, then drain
    Sync,
    /// Continue draining the queue after a handoff
    Resume {
        #[arg(long)]
        inserted: Option<u64>,
        #[arg(long)]
        updated: Option<u64>,
        #[arg(long)]
        deleted: Option<u64>,
        /// One-time token issued by the process that handed off; required
        /// whenever counters are passed
        #[arg(long)]
        token: Option<String>,
    },
    /// Print queue status and the last sync notice
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let outcome = match args.command {
        Command::AddGroup {
            group_id,
            api_key,
            name,
        } => {
            let group = Group {
                group_id,
                api_key,
                name,
            };
            db::upsert_group(&pool, &group).await?;
            info!(group = %group.group_id, "group saved");
            return Ok(());
        }
        Command::Status => {
            let (total, processed) = db::queue_counts(&pool).await?;
            let snap = QueueSnapshot::new(total, processed);
            db::set_option(&pool, db::OPT_QUEUE_STATUS, &snap.type_text()).await?;
            println!("{}", snap.type_text());
            println!("{}", snap.processing_text());
            for (slot, message) in db::notices(&pool).await? {
                println!("[{}] {}", slot, message.as_str().unwrap_or_default());
            }
            return Ok(());
        }
        Command::Sync => {
            let engine = build_engine(&cfg, &args.config, &pool).await?;
            let report = engine.init().await?;
            for failure in &report.failures {
                warn!(%failure, "collection skipped this cycle");
            }
            engine.process_queue(SyncRunState::default()).await?
        }
        Command::Resume {
            inserted,
            updated,
            deleted,
            token,
        } => {
            let engine = build_engine(&cfg, &args.config, &pool).await?;
            let counters = (inserted.is_some() || updated.is_some() || deleted.is_some()).then(|| {
                SyncRunState {
                    inserted: inserted.unwrap_or(0),
                    updated: updated.unwrap_or(0),
                    deleted: deleted.unwrap_or(0),
                }
            });
            engine.resume(counters, token.as_deref()).await?
        }
    };

    match outcome {
        DrainOutcome::Empty => info!("queue is empty; nothing to do"),
        DrainOutcome::Completed(state) => info!("{}", state.summary()),
        DrainOutcome::HandedOff { state, reason } => info!(
            %reason,
            inserted = state.inserted,
            updated = state.updated,
            "continuation requested; exiting"
        ),
        DrainOutcome::Stalled { failed, .. } => {
            return Err(anyhow!(
                "{} queue items failed and remain unprocessed; rerun `resume` to retry",
                failed.len()
            ));
        }
    }
    Ok(())
}

async fn build_engine(cfg: &Config, config_path: &Path, pool: &db::Pool) -> Result<SyncEngine> {
    let api = Arc::new(ActionNetworkClient::from_config(cfg)?);
    let trigger = continuation::from_config(cfg, config_path.to_path_buf())?;
    let engine = SyncEngine::new(pool.clone(), api, trigger, cfg.budget_limits()?).await?;
    Ok(engine)
}
