use clap::Parser;
use eyre::Result;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use whale_titan::core::gateway::{EthersConnector, StrikeSigner, WalletSigner};
use whale_titan::core::types::StrikeStatistics;
use whale_titan::core::WhaleEngine;
use whale_titan::strategy::config::{ConfigManager, ExecutionMode};
use whale_titan::strategy::sequencer::SequencingManager;
use whale_titan::strategy::StrikePipeline;

#[derive(clap::Parser)]
#[command(name = "whale-titan", about = "Whale-triggered flash-loan strike bot")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Clone, Debug, Parser)]
pub struct RunArgs {
    /// Run the full pipeline but never reserve a nonce or broadcast
    #[arg(long, env = "DRY_RUN", default_value_t = false)]
    pub dry_run: bool,
}

#[derive(clap::Subcommand)]
pub enum Command {
    /// Watch new blocks and fire strikes
    Run(RunArgs),
    /// Load, validate and print the configuration
    ShowConfig,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("whale_titan=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}

async fn run(args: RunArgs) -> Result<()> {
    let mut config = ConfigManager::load_from_env()?;
    if args.dry_run {
        config.strike.execution_mode = ExecutionMode::SimulationOnly;
    }
    ConfigManager::print_config_summary(&config);

    let signer = Arc::new(WalletSigner::new(&config.private_key, config.network.chain_id)?);
    let operator = signer.address();
    info!("Operator account: {:?}", operator);

    let sequencer = Arc::new(SequencingManager::new(operator));
    let stats = Arc::new(StrikeStatistics::default());
    let pipeline = StrikePipeline::from_config(&config, signer, sequencer.clone(), stats.clone());
    let mut engine = WhaleEngine::new(
        pipeline,
        sequencer,
        stats.clone(),
        config.network.clone(),
        config.engine.clone(),
    );

    let connector = EthersConnector::new(&config.network.ws_url, config.network.inclusion_timeout);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
            return;
        }
        info!("Ctrl-C received, shutting down");
        let _ = shutdown_tx.send(true);
    });

    engine.run_forever(&connector, shutdown_rx).await?;
    info!("Final stats: {}", stats.snapshot());
    Ok(())
}

fn show_config() -> Result<()> {
    let config = ConfigManager::load_from_env()?;
    ConfigManager::print_config_summary(&config);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    match args.command {
        Command::Run(args) => run(args).await,
        Command::ShowConfig => show_config(),
    }
}
