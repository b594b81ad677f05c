mod registered_modules;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use tokio_util::sync::CancellationToken;

use hearthkit::reload::{ReloadHandler, Watcher};
use hearthkit::{AppContext, ConfigPipeline, LifecycleCoordinator, Registry};
use hearthkit_bootstrap::{logging, signals, BootConfig, CliArgs};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";

#[derive(Parser)]
#[command(name = "hearthkit")]
#[command(about = "Hearthkit - module kernel for failover-aware AI agents")]
#[command(version)]
struct Cli {
    /// Log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Boot every configured module and run until a shutdown signal arrives.
    Start {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Configuration-related subcommands.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Print the kernel version and exit.
    Version,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate a configuration document without starting anything.
    Check { path: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Version => {
            println!("hearthkit {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Config { action: ConfigAction::Check { path } } => check_config(&path),
        Commands::Start { config } => {
            start(config.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)), cli.verbose).await
        }
    }
}

fn check_config(path: &PathBuf) -> Result<()> {
    let registry = Registry::discover()?;
    match ConfigPipeline::load_and_resolve(path, &registry) {
        Ok((_config, order)) => {
            for id in &order {
                println!("{id}");
            }
            println!("configuration is valid, {} module(s) to load", order.len());
            Ok(())
        }
        Err(err) => {
            eprintln!("configuration is invalid: {err}");
            std::process::exit(1);
        }
    }
}

async fn start(config_path: PathBuf, verbose: u8) -> Result<()> {
    let mut boot = BootConfig::load_or_default(Some(&config_path))?;
    boot.apply_cli_overrides(&CliArgs {
        config: Some(config_path.to_string_lossy().to_string()),
        verbose,
    });
    let home_dir = PathBuf::from(&boot.home_dir);

    logging::init_logging_unified(&boot.logging.clone().unwrap_or_default(), &home_dir);
    tracing::info!(home_dir = %home_dir.display(), "hearthkit starting");

    let registry = Arc::new(Registry::discover()?);
    let (config, order) = ConfigPipeline::load_and_resolve(&config_path, &registry)?;

    let root_span = tracing::info_span!("hearthkit");
    let ctx = AppContext::new(root_span, home_dir.join("data"), home_dir.clone(), registry.clone())
        .with_module_configs(config.modules.clone());

    let mut coordinator = LifecycleCoordinator::new(ctx.clone());
    coordinator.load(&order).await?;

    let cancel = CancellationToken::new();
    let shutdown_cancel = cancel.clone();
    tokio::spawn(async move {
        if let Err(err) = signals::wait_for_shutdown().await {
            tracing::error!(error = %err, "error waiting for shutdown signal");
        }
        shutdown_cancel.cancel();
    });

    coordinator.start(&cancel).await?;

    let watcher = Watcher::new(&config_path);
    watcher.start();
    let reload_events = watcher.events();
    let reload_handler = ReloadHandler::new(&config_path, registry);
    reload_handler.run(reload_events, &mut coordinator, &ctx, cancel.clone()).await;
    watcher.stop().await;

    coordinator.stop(&cancel).await;
    tracing::info!("hearthkit stopped");
    Ok(())
}
