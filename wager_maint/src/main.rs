//! Maintenance sweeps for the wager engine.
//!
//! Periodically locks open wagers whose deadline has passed and applies the
//! inactivity decay policy to every ledger account.

mod config;
mod logging;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Error};
use chrono::Utc;
use pico_args::Arguments;
use tracing::{error, info};
use wager_engine::{Database, SettlementEngine, SystemClock};

use crate::config::MaintConfig;

const HELP: &str = "\
Run wager engine maintenance sweeps

USAGE:
  wager_maint [OPTIONS]

OPTIONS:
  --db-url         URL     Database connection string  [default: env DATABASE_URL]
  --interval-secs  N       Seconds between sweeps      [default: env SWEEP_INTERVAL_SECS or 300]

FLAGS:
  --once                   Run one sweep and exit
  --migrate                Apply database migrations before sweeping
  -h, --help               Print help information

ENVIRONMENT:
  DATABASE_URL             PostgreSQL connection string
  DECAY_IDLE_DAYS          Days without activity before decay applies
  DECAY_RATE_PERCENT       Share of the balance removed per sweep
  DECAY_FLOOR              Balance decay never goes below
  DECAY_EXEMPT_USERS       Comma-separated user ids never decayed
  RUST_LOG                 Log filter [default: info,sqlx=warn]
";

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        return Ok(());
    }

    let once = pargs.contains("--once");
    let migrate = pargs.contains("--migrate");
    let db_url: Option<String> = pargs.opt_value_from_str("--db-url")?;
    let interval: Option<u64> = pargs.opt_value_from_str("--interval-secs")?;

    let mut config = MaintConfig::from_env(db_url, interval);
    config.once = once;
    config.migrate = migrate;
    config.validate()?;

    logging::init();
    info!(
        interval_secs = config.interval_secs,
        once = config.once,
        "Starting wager maintenance"
    );

    let db = Database::new(&config.database)
        .await
        .context("Failed to connect to database")?;
    info!("Database connected successfully");

    if config.migrate {
        db.migrate().await.context("Failed to apply migrations")?;
        info!("Migrations applied");
    }

    let engine = SettlementEngine::new(
        Arc::new(db.store()),
        Arc::new(db.membership()),
        Arc::new(SystemClock),
        config.engine.clone(),
    );

    if config.once {
        sweep(&engine).await?;
        db.close().await;
        return Ok(());
    }

    let mut ticker = tokio::time::interval(config.interval());
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // A failed sweep is retried on the next tick
                if let Err(e) = sweep(&engine).await {
                    error!("Sweep failed: {e:#}");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down maintenance...");
                break;
            }
        }
    }

    db.close().await;
    Ok(())
}

/// Run one pass: lock overdue wagers, then decay idle balances
async fn sweep(engine: &SettlementEngine) -> Result<(), Error> {
    let started = Instant::now();
    info!(at = %Utc::now(), "Sweep started");

    let locked = engine
        .lock_expired_wagers()
        .await
        .context("Locking expired wagers")?;
    for wager in &locked {
        info!(
            wager_id = wager.id,
            group_id = wager.group_id,
            "Locked wager past its deadline"
        );
    }

    let decayed = engine
        .decay_idle_accounts()
        .await
        .context("Applying balance decay")?;

    logging::log_sweep(
        locked.len(),
        decayed.len(),
        started.elapsed().as_millis() as u64,
    );
    Ok(())
}
