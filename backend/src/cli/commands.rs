use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use crate::backend::CoinBackend;
use crate::cli::{Args, Commands};
use crate::config::Config;
use crate::dispatcher::ClientDispatcher;
use crate::node::bitcoin::BitcoinRpcClient;
use crate::services::api::{self, ApiState};
use crate::services::database::DatabaseService;

pub async fn execute(args: Args) -> Result<()> {
    setup_logging(&args)?;

    match args.command {
        Commands::Start { config } => start_server(config).await,
        Commands::Config { file, show } => validate_config(file, show),
        Commands::Init { output, force } => write_example(output, force),
    }
}

async fn start_server(config_path: PathBuf) -> Result<()> {
    let config = Config::load_from_file(&config_path)?;
    config.validate()?;
    info!(
        config = %config_path.display(),
        coins = config.coins.len(),
        "configuration validated"
    );

    let database = Arc::new(DatabaseService::new(&config.server.database_url).await?);
    database.migrate().await?;

    let rpc_timeout = Duration::from_secs(config.server.rpc_timeout_seconds);

    let mut backends = Vec::new();
    let mut dispatchers = Vec::new();
    for coin_config in &config.coins {
        let coin = coin_config.coin_info()?;
        let backend_config = coin_config.to_backend_config()?;

        let mut dispatcher = ClientDispatcher::with_timeout(coin, rpc_timeout);
        for node in &coin_config.nodes {
            match node.kind.as_str() {
                "bitcoinrpc" => dispatcher.add_client(Arc::new(BitcoinRpcClient::with_timeout(
                    coin,
                    &node.url,
                    &node.login,
                    &node.password,
                    rpc_timeout,
                ))),
                other => anyhow::bail!("unknown node type: {other}"),
            }
        }
        let dispatcher = Arc::new(dispatcher);

        let backend = CoinBackend::new(
            coin,
            backend_config,
            Arc::clone(&dispatcher),
            Arc::clone(&database),
        )
        .await?;
        backend.start();

        dispatchers.push(dispatcher);
        backends.push(backend);
    }

    let poll_interval = Duration::from_secs(config.server.node_poll_seconds);
    let poll_handles: Vec<_> = dispatchers
        .iter()
        .map(|dispatcher| dispatcher.poll(poll_interval))
        .collect();

    let api_handle = api::serve(config.server.api_bind, ApiState::new(backends.iter().cloned())).await?;

    info!("orepool started");

    tokio::signal::ctrl_c().await?;
    info!("interrupted, shutting down");

    for backend in &backends {
        backend.stop().await;
    }
    for handle in poll_handles {
        handle.abort();
    }
    api_handle.abort();

    info!("orepool stopped");
    Ok(())
}

fn validate_config(file: PathBuf, show: bool) -> Result<()> {
    let config = Config::load_from_file(&file)?;
    config.validate()?;

    println!(
        "{}: OK ({} coin{})",
        file.display(),
        config.coins.len(),
        if config.coins.len() == 1 { "" } else { "s" }
    );

    if show {
        println!("{}", toml::to_string_pretty(&config)?);
    }

    Ok(())
}

fn write_example(output: PathBuf, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!("{} already exists, pass --force to overwrite", output.display());
    }

    std::fs::write(&output, toml::to_string_pretty(&Config::example())?)?;
    println!("Wrote example configuration to {}", output.display());

    Ok(())
}

fn setup_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let log_level = match args.verbose {
        0 => args.log_level.as_str(),
        1 => "debug",
        _ => "trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    if args.log_format == "json" {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().compact())
            .init();
    }

    Ok(())
}
