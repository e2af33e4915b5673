//! # Address Monitor CLI
//!
//! Operator front end for the watch-list: add and remove addresses, refresh balances
//! through the resolution cascade, and keep refreshing in the background.
//!
//! ## Usage
//!
//! ```bash
//! echo "Cold wallet,bc1qxy2kgdygjrsqtzq2n0yrf2493p83kkfjhx0wlh" | cargo run --bin addr_monitor -- add
//! cargo run --bin addr_monitor -- refresh --limit 50
//! cargo run --bin addr_monitor -- watch --interval 600
//! ```
//!
//! `watch` stops gracefully on Ctrl+C.

use addr_balance_monitor::{
    database::{BalanceStore, PgBalanceStore},
    orchestrator::ResolutionOrchestrator,
    primary_source::NodeRpcClient,
    refresh::{self, RefreshSummary},
    settings::Settings,
    types::ResolutionOutcome,
    watchlist::parse_watchlist_input,
};
use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::io::Read;
use std::path::PathBuf;
use tokio::signal;
use tokio::time::{interval, Duration, MissedTickBehavior};

#[derive(Parser, Debug)]
#[command(
    name = "addr_monitor",
    version,
    about = "Watch-list balance monitor: full node first, public explorers as fallback"
)]
struct Cli {
    /// Configuration file (defaults to ./Config.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Add addresses, one `Label,Address` or `Address` per line (stdin unless --input)
    Add {
        #[arg(long)]
        input: Option<String>,
    },
    /// List the watch-list
    List,
    /// Remove an address by id
    Remove { id: i64 },
    /// Refresh one address by id
    Update { id: i64 },
    /// One refresh pass over the stalest addresses
    Refresh {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Refresh periodically until Ctrl+C
    Watch {
        /// Seconds between passes
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Node and watch-list summary
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => Settings::from_path(path)?,
        None => Settings::new()?,
    };

    init_logging(&settings)?;
    init_metrics(&settings)?;

    match cli.command {
        Commands::Add { input } => add(&settings, input).await,
        Commands::List => list(&settings).await,
        Commands::Remove { id } => remove(&settings, id).await,
        Commands::Update { id } => update(&settings, id).await,
        Commands::Refresh { limit } => {
            let limit = limit.unwrap_or(settings.refresh.batch_limit);
            run_refresh(&settings, limit).await
        }
        Commands::Watch { interval } => {
            let seconds = interval.unwrap_or(settings.refresh.interval_seconds);
            watch(&settings, seconds).await
        }
        Commands::Status => status(&settings).await,
    }
}

#[cfg(not(feature = "observability"))]
fn init_logging(settings: &Settings) -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(settings.log.level.as_str()),
    )
    .init();
    Ok(())
}

#[cfg(feature = "observability")]
fn init_logging(settings: &Settings) -> Result<()> {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log.level))?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if settings.log.json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

#[cfg(not(feature = "observability"))]
fn init_metrics(settings: &Settings) -> Result<()> {
    if settings.metrics.enabled {
        log::warn!("⚠️ [metrics] enabled but the binary was built without the `observability` feature");
    }
    Ok(())
}

#[cfg(feature = "observability")]
fn init_metrics(settings: &Settings) -> Result<()> {
    if settings.metrics.enabled {
        use addr_balance_monitor::metrics;

        metrics::install_prometheus_exporter(&settings.metrics.listen_addr)?;
        metrics::describe_metrics();
    }
    Ok(())
}

async fn add(settings: &Settings, input: Option<String>) -> Result<()> {
    let text = match input {
        Some(text) => text,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let entries = parse_watchlist_input(&text);
    if entries.is_empty() {
        bail!("no addresses found in input");
    }

    let store = PgBalanceStore::connect(&settings.database).await?;
    let added = store.add_addresses(&entries).await?;
    println!(
        "{} Added {} of {} addresses ({} already watched)",
        "✅".green(),
        added,
        entries.len(),
        entries.len() as u64 - added
    );
    Ok(())
}

async fn list(settings: &Settings) -> Result<()> {
    let store = PgBalanceStore::connect(&settings.database).await?;
    let rows = store.list_addresses().await?;
    if rows.is_empty() {
        println!("No addresses in database.");
        return Ok(());
    }

    println!(
        "{:>6}  {:<20}  {:<62}  {:>18}  {:<22}  {}",
        "ID".bold(),
        "LABEL".bold(),
        "ADDRESS".bold(),
        "BALANCE (BTC)".bold(),
        "METHOD".bold(),
        "UPDATED".bold()
    );
    for row in rows {
        let updated = row
            .last_updated
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "never".dimmed().to_string());
        println!(
            "{:>6}  {:<20}  {:<62}  {:>18}  {:<22}  {}",
            row.id,
            row.label,
            row.address,
            row.balance.to_string().yellow(),
            row.method.as_deref().unwrap_or("-"),
            updated
        );
    }
    Ok(())
}

async fn remove(settings: &Settings, id: i64) -> Result<()> {
    let store = PgBalanceStore::connect(&settings.database).await?;
    if store.delete_address(id).await? {
        println!("{} Removed address {}", "✅".green(), id);
        Ok(())
    } else {
        bail!("address id {} not found", id)
    }
}

async fn update(settings: &Settings, id: i64) -> Result<()> {
    let store = PgBalanceStore::connect(&settings.database).await?;
    let orchestrator = ResolutionOrchestrator::from_settings(settings)?;

    let outcome = refresh::refresh_one(&store, &orchestrator, id).await?;
    match outcome.outcome {
        ResolutionOutcome::Resolved { balance, method } => println!(
            "{} {}: {} BTC via {}",
            "✅".green(),
            outcome.address.address,
            balance.to_string().yellow(),
            method
        ),
        ResolutionOutcome::Unresolved => println!(
            "{} {}: no source could provide a balance",
            "❌".red(),
            outcome.address.address
        ),
    }
    Ok(())
}

async fn run_refresh(settings: &Settings, limit: usize) -> Result<()> {
    let store = PgBalanceStore::connect(&settings.database).await?;
    let orchestrator = ResolutionOrchestrator::from_settings(settings)?;
    let summary = refresh::refresh_batch(&store, &orchestrator, limit).await?;
    print_summary(&summary);
    Ok(())
}

async fn watch(settings: &Settings, seconds: u64) -> Result<()> {
    let store = PgBalanceStore::connect(&settings.database).await?;
    let orchestrator = ResolutionOrchestrator::from_settings(settings)?;
    let limit = settings.effective_refresh_limit();

    println!("💡 Service running:");
    println!("   - Refresh passes of up to {} addresses every {} seconds", limit, seconds);
    println!("   - Cascade tiers: {}", orchestrator.tier_names().join(" → "));
    println!("   - Press Ctrl+C to stop");

    let mut ticker = interval(Duration::from_secs(seconds.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match refresh_pass(&store, &orchestrator, limit).await {
                    Ok(summary) => print_summary(&summary),
                    Err(e) => eprintln!("{} Refresh pass failed: {:#}", "⚠️".yellow(), e),
                }
            }
            result = signal::ctrl_c() => {
                result?;
                println!("\n🛑 Shutdown signal received, stopping...");
                break;
            }
        }
    }
    Ok(())
}

async fn refresh_pass(
    store: &dyn BalanceStore,
    orchestrator: &ResolutionOrchestrator,
    limit: usize,
) -> Result<RefreshSummary> {
    println!("🔄 Running refresh pass...");
    refresh::refresh_batch(store, orchestrator, limit).await
}

async fn status(settings: &Settings) -> Result<()> {
    let client = NodeRpcClient::new(&settings.rpc)?;
    println!("{}", "Node".bold());
    println!("   endpoint: {}", client.endpoint());
    match client.blockchain_info().await {
        Ok(info) => {
            println!("   chain:    {}", info.chain);
            println!("   blocks:   {} / {} headers", info.blocks, info.headers);
            println!("   synced:   {:.2}%", info.verification_progress * 100.0);
        }
        Err(e) => println!("   {} {}", "unreachable:".red(), e),
    }
    println!(
        "   fallback: {}",
        if settings.fallback.allow_fallback {
            "enabled".green()
        } else {
            "disabled".yellow()
        }
    );

    let store = PgBalanceStore::connect(&settings.database).await?;
    let stats = store.stats().await?;
    println!("{}", "Watch-list".bold());
    println!("   addresses: {}", stats.count);
    println!("   total:     {} BTC", stats.total_balance.to_string().yellow());
    Ok(())
}

fn print_summary(summary: &RefreshSummary) {
    let marker = if summary.failed == 0 && summary.write_errors == 0 {
        "✅".green()
    } else {
        "⚠️".yellow()
    };
    println!(
        "{} {} requested, {} updated, {} unresolved, {} write errors",
        marker, summary.requested, summary.updated, summary.failed, summary.write_errors
    );
}
