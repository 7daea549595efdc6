//! Solpilot - Autonomous launchpad trading and market intelligence
//!
//! # WARNING
//! - This bot trades with real money in live mode. Only use funds you
//!   can afford to lose.
//! - Most launchpad tokens go to zero (rug pulls, abandonment).
//! - Simulation results do NOT predict live results.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use solpilot::agent::TradingAgent;
use solpilot::alerts::AlertEngine;
use solpilot::analysis::{AnalysisCache, Analyzer};
use solpilot::backend::HttpBackend;
use solpilot::config::{Config, TradingMode};
use solpilot::engine::ai_overlay::AiAnalyzer;
use solpilot::engine::{EngineEvent, Strategy, TradingEngine};
use solpilot::market::HttpMarketData;
use solpilot::providers::FallbackOrchestrator;
use solpilot::scanner::HttpLaunchpadScanner;
use solpilot::store::JsonStore;

/// Solpilot - autonomous launchpad trading
#[derive(Parser)]
#[command(name = "solpilot")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the engine, agent and alert supervisor
    Start {
        /// Starting capital for the decision agent (SOL)
        #[arg(long, default_value = "10.0")]
        capital: f64,

        /// Skip the live-mode confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Show the last persisted agent snapshot and strategy
    Status,

    /// Show current configuration (secrets masked)
    Config,

    /// Check provider, market-data and backend reachability
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Start { capital, yes } => cmd_start(config, capital, yes).await,
        Commands::Status => cmd_status(config).await,
        Commands::Config => {
            println!("{}", config.masked_display());
            Ok(())
        }
        Commands::Health => cmd_health(config).await,
    }
}

async fn cmd_start(config: Config, capital: f64, yes: bool) -> Result<()> {
    if config.engine.mode == TradingMode::Live {
        warn!("Live mode trades with real funds");
        if !yes {
            let confirmed = dialoguer::Confirm::new()
                .with_prompt("Start in LIVE mode?")
                .default(false)
                .interact()?;
            if !confirmed {
                info!("Aborted");
                return Ok(());
            }
        }
    }

    let signing_key = config.signing_key();
    let strategy = Arc::new(RwLock::new(Strategy::from_engine_config(&config.engine)));
    let store = Arc::new(JsonStore::new(&config.store));

    let orchestrator = Arc::new(FallbackOrchestrator::from_config(
        &config.providers,
        Duration::from_millis(config.timeouts.provider_chat_ms),
    ));
    let ai = if config.engine.use_ai_analysis && orchestrator.available_count() > 0 {
        Some(Arc::new(AiAnalyzer::new(orchestrator.clone())))
    } else {
        if config.engine.use_ai_analysis {
            warn!("AI analysis enabled but no providers configured; using risk-score rule only");
        }
        None
    };

    let scanner = Arc::new(HttpLaunchpadScanner::new(
        config.scanner.indexer_url.clone(),
        Duration::from_millis(config.timeouts.market_data_ms),
    ));
    let backend = Arc::new(HttpBackend::new(
        config.backend.base_url.clone(),
        signing_key.clone(),
        Duration::from_millis(config.timeouts.execution_ms),
    ));

    let engine = Arc::new(TradingEngine::new(
        config.engine.clone(),
        config.timeouts.clone(),
        strategy.clone(),
        scanner,
        backend,
        ai,
        signing_key,
    ));

    let agent = Arc::new(TradingAgent::new(
        config.agent.clone(),
        strategy.clone(),
        store.clone(),
    ));

    let market = Arc::new(HttpMarketData::new(
        config.market.base_url.clone(),
        std::env::var(&config.market.api_key_env).ok(),
        Duration::from_millis(config.timeouts.market_data_ms),
    ));
    let alerts = Arc::new(AlertEngine::new(
        config.alerts.clone(),
        market,
        Analyzer::default(),
        Arc::new(AnalysisCache::new()),
    ));

    // Surface engine events as log lines
    if let Some(mut events) = engine.take_event_receiver() {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    EngineEvent::TokenDiscovered(token) => {
                        info!(token = %token.address, platform = %token.platform, "Token discovered");
                    }
                    EngineEvent::TradeExecuted { trade, .. } => {
                        info!(token = %trade.token_address, amount = trade.amount_sol, "Trade executed");
                    }
                    EngineEvent::PositionClosed { reason, pnl, .. } => {
                        info!(%reason, pnl, "Position closed");
                    }
                    EngineEvent::Error(message) => {
                        warn!(%message, "Engine error");
                    }
                }
            }
        });
    }
    if let Some(mut notifications) = alerts.take_notification_receiver() {
        tokio::spawn(async move {
            while let Some(notification) = notifications.recv().await {
                info!(symbol = %notification.symbol, "{}", notification.message);
            }
        });
    }

    let report = engine.clone().start().await?;
    info!(mode = %report.mode, platforms = ?report.platforms, "Engine running");

    agent.clone().start(config.engine.mode, capital).await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    match agent.stop().await {
        Ok(summary) => info!(
            roi = summary.roi,
            trades = summary.total_trades,
            win_rate = summary.win_rate,
            "Agent summary"
        ),
        Err(e) => error!(error = %e, "Agent stop failed"),
    }

    match engine.stop().await {
        Ok(stats) => info!(
            scanned = stats.tokens_scanned,
            executed = stats.trades_executed,
            net_pnl = stats.net_pnl_sol(),
            win_rate = stats.win_rate(),
            "Engine summary"
        ),
        Err(e) => error!(error = %e, "Engine stop failed"),
    }

    alerts.clear_all().await;

    Ok(())
}

async fn cmd_status(config: Config) -> Result<()> {
    let store = JsonStore::new(&config.store);
    match store.load_agent_snapshot().await {
        Ok(Some(snapshot)) => {
            println!("Agent snapshot:");
            println!("  capital: {:.4} SOL", snapshot.metrics.capital);
            println!(
                "  trades: {} ({} wins, {} losses)",
                snapshot.metrics.total_trades,
                snapshot.metrics.winning_trades,
                snapshot.metrics.losing_trades
            );
            println!("  win rate: {:.1}%", snapshot.metrics.win_rate() * 100.0);
            println!("  roi: {:.2}%", snapshot.metrics.roi() * 100.0);
            println!("  learned entries: {}", snapshot.qtable.len());
            println!("  epsilon: {:.3}", snapshot.epsilon);
            println!(
                "  strategy: stop {:.0}%, take {:.0}%, base {} SOL",
                snapshot.strategy.exit.stop_loss_frac * 100.0,
                snapshot.strategy.exit.take_profit_frac * 100.0,
                snapshot.strategy.sizing.base_amount_sol
            );
        }
        Ok(None) => println!("No agent snapshot found (run `solpilot start` first)"),
        Err(e) => error!(error = %e, "Snapshot unreadable"),
    }
    Ok(())
}

async fn cmd_health(config: Config) -> Result<()> {
    println!("Providers configured: {}", config.providers.len());
    for provider in &config.providers {
        let key_present = !provider.api_key_env.is_empty()
            && std::env::var(&provider.api_key_env).is_ok();
        println!(
            "  {} ({}) key: {}",
            provider.name,
            provider.tier,
            if key_present { "present" } else { "MISSING" }
        );
    }

    let backend = HttpBackend::new(
        config.backend.base_url.clone(),
        config.signing_key(),
        Duration::from_millis(config.timeouts.execution_ms),
    );
    use solpilot::backend::ExecutionBackend;
    let mev = backend.mev_protection_active().await;
    println!("Backend: {} (mev protection: {})", config.backend.base_url, mev);

    let market = HttpMarketData::new(
        config.market.base_url.clone(),
        std::env::var(&config.market.api_key_env).ok(),
        Duration::from_millis(config.timeouts.market_data_ms),
    );
    use solpilot::market::MarketData;
    match market.get_global_metrics().await {
        Ok(metrics) => println!(
            "Market data: ok (btc dominance {:.1}%)",
            metrics.btc_dominance
        ),
        Err(e) => println!("Market data: unreachable ({e})"),
    }

    Ok(())
}
