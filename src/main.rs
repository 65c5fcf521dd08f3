//! DIPBUYER — simulated dip-buying investment session
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores the session from the state directory (or starts fresh),
//! generates the session's opportunities and runs the auto-invest loop
//! with graceful shutdown.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use dipbuyer::config::AppConfig;
use dipbuyer::engine::auto_invest::{AutoInvestor, CycleReport};
use dipbuyer::engine::OpportunityEngine;
use dipbuyer::sources::{ChaChaRandom, SystemClock, UuidIds};
use dipbuyer::storage::FileStore;

const BANNER: &str = r#"
 ____ ___ ____  ____  _   ___   _______ ____
|  _ \_ _|  _ \| __ )| | | \ \ / / ____|  _ \
| | | | || |_) |  _ \| | | |\ V /|  _| | |_) |
| |_| | ||  __/| |_) | |_| | | | | |___|  _ <
|____/___|_|   |____/ \___/  |_| |_____|_| \_\

  Simulated dip-buying session
  v0.1.0
"#;

/// Opportunities logged at startup.
const TOP_OPPORTUNITIES: usize = 5;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    init_logging();

    let config_path =
        std::env::var("DIPBUYER_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = if Path::new(&config_path).exists() {
        AppConfig::load(&config_path)?
    } else {
        warn!(path = %config_path, "Config file not found, using defaults");
        AppConfig::default()
    };

    println!("{BANNER}");
    info!(
        session = %cfg.session.name,
        initial_balance = format!("${:.2}", cfg.session.initial_balance),
        cycle_interval_secs = cfg.session.cycle_interval_secs,
        seed = ?cfg.market.seed,
        "DIPBUYER starting up"
    );

    // -- Restore session -------------------------------------------------

    let store = Arc::new(FileStore::open(&cfg.session.state_dir)?);
    let rng = ChaChaRandom::from_seed_option(cfg.market.seed);
    let mut engine = OpportunityEngine::restore(
        cfg.clone(),
        store,
        Arc::new(SystemClock),
        Arc::new(UuidIds),
        rng,
    );

    engine.generate_opportunities();
    for o in engine.visible().into_iter().take(TOP_OPPORTUNITIES) {
        info!(
            symbol = %o.symbol,
            price = format!("${:.2}", o.price),
            score = format!("{:.1}", o.score),
            valuation = %o.valuation,
            risk = %o.risk_level,
            "{}",
            o.rationale.summary
        );
    }

    // -- Main loop -------------------------------------------------------

    let mut investor = AutoInvestor::new();
    let mut cycle = tokio::time::interval(Duration::from_secs(cfg.session.cycle_interval_secs.max(1)));
    let mut history_tick =
        tokio::time::interval(Duration::from_millis(cfg.portfolio.history_debounce_ms.max(100)));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.session.cycle_interval_secs,
        auto_invest = engine.settings().auto_invest,
        "Entering main loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = cycle.tick() => {
                let report = investor.run_cycle(&mut engine);
                log_cycle_report(&report);
            }
            _ = history_tick.tick() => {
                engine.poll_history();
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    engine.flush_history();
    let summary = engine.summary();
    info!(
        cycles = investor.cycles(),
        balance = format!("${:.2}", summary.balance),
        value = format!("${:.2}", summary.totals.total_value),
        pnl = format!("${:.2}", summary.totals.total_profit_loss),
        net_worth = format!("${:.2}", summary.net_worth),
        "DIPBUYER shut down cleanly."
    );

    Ok(())
}

/// Log a human-readable cycle summary.
fn log_cycle_report(report: &CycleReport) {
    if !report.enabled {
        return;
    }
    info!(
        cycle = report.cycle_number,
        bought = report.bought(),
        skipped = report.skipped(),
        rejected = report.rejected(),
        spent = format!("${:.2}", report.total_spent),
        balance = format!("${:.2}", report.balance_after),
        remaining = format!("${:.2}", report.remaining_in_period),
        "Cycle complete"
    );
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("dipbuyer=info"));

    let json_logging = std::env::var("DIPBUYER_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
