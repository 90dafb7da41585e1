//! Jongleur Proxy
//!
//! Binary entrypoint: parses the command line, installs logging, and runs the proxy until
//! SIGINT or SIGTERM.

#![deny(missing_docs)]

mod cli;

use clap::{CommandFactory, Parser};
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use jongleur_proxy::ProxyError;

use cli::Cli;

/// Exit code for invalid configuration.
const USAGE_EXIT_CODE: i32 = 2;
/// Exit code for any other fatal error.
const FATAL_EXIT_CODE: i32 = 255;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.command.args().verbose);

    let config = match cli.command.config() {
        Ok(config) => config,
        Err(err) => exit_with(&err, cli.command.name()),
    };
    let loader = cli.command.args().loader();

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_termination(shutdown.clone()));

    if let Err(err) = jongleur_proxy::run(config, loader, shutdown).await {
        exit_with(&err, cli.command.name());
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "jongleur_proxy=debug,jongleur_core=debug,info"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Cancel `shutdown` on SIGINT or SIGTERM.
async fn wait_for_termination(shutdown: CancellationToken) {
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate => {}
    }

    info!("Termination signal received");
    shutdown.cancel();
}

fn exit_with(err: &ProxyError, subcommand: &str) -> ! {
    if err.is_usage() {
        eprintln!("{err}");
        eprintln!();
        let mut command = Cli::command();
        if let Some(sub) = command.find_subcommand_mut(subcommand) {
            let _ = sub.print_help();
        }
        std::process::exit(USAGE_EXIT_CODE);
    }

    error!(error = %err, "Proxy failed");
    std::process::exit(FATAL_EXIT_CODE);
}
