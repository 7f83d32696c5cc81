//! CLI entry point.
//!
//! Grounded in the teacher's `rustpress-server/src/main.rs` (`Cli` via
//! `clap::Parser`, `init_tracing`, config-driven `run_app`) and
//! `original_source/app/cmd/goaws.go` (`--config`/`--debug`/`--hot-reload`
//! flags, positional environment argument, one-or-two-port binding, the
//! background ticker spawned alongside the listener).

use std::path::PathBuf;

use clap::Parser;
use emu_server::{build_app, config, hot_reload, spawn_ticker};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "emu-server", about = "Local SQS/SNS-compatible emulator")]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Verbose logging.
    #[arg(long)]
    debug: bool,

    /// Watch the config file for new queue/topic definitions.
    #[arg(long)]
    hot_reload: bool,

    /// Environment name selecting a section of the config file.
    #[arg(default_value = "Local")]
    env: String,
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run_app(cli: Cli) -> anyhow::Result<()> {
    let app_config = config::load(&cli.config, &cli.env)?;
    tracing::info!(env = %cli.env, path = %cli.config.display(), "loaded configuration");

    let (state, app, registry) = build_app(app_config);

    if cli.hot_reload {
        hot_reload::spawn(cli.config.clone(), cli.env.clone(), state.clone());
    }

    let (shutdown_tx, _ticker) = spawn_ticker(registry);

    let primary_addr = state.config.server.address();
    let secondary_addr = state.config.server.second_address();

    let primary_listener = tokio::net::TcpListener::bind(&primary_addr).await?;
    tracing::info!(addr = %primary_addr, "listening");

    let primary_server = axum::serve(primary_listener, app.clone());

    if let Some(secondary_addr) = secondary_addr {
        let secondary_listener = tokio::net::TcpListener::bind(&secondary_addr).await?;
        tracing::info!(addr = %secondary_addr, "listening (second port)");
        let secondary_server = axum::serve(secondary_listener, app);

        tokio::select! {
            res = primary_server => res?,
            res = secondary_server => res?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
            }
        }
    } else {
        tokio::select! {
            res = primary_server => res?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
            }
        }
    }

    let _ = shutdown_tx.send(true);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);
    run_app(cli).await
}
