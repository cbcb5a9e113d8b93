//! `Memoria` - terminal client for a physical light-pattern memory game

use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

use clap::Parser;
use tokio_util::sync::CancellationToken;

use memoria::cli::args::Cli;
use memoria::cli::commands;
use memoria::error::ExitCode;
use memoria::observability::init_logging;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if !cli.quiet {
        init_logging(cli.log_format, cli.verbose, cli.color);
    }

    let cancel = CancellationToken::new();
    let signal_exit = Arc::new(AtomicI32::new(ExitCode::SUCCESS));
    tokio::spawn(handle_signals(cancel.clone(), Arc::clone(&signal_exit)));

    let result = commands::dispatch(cli, cancel).await;

    match result {
        Ok(()) => std::process::exit(signal_exit.load(Ordering::SeqCst)),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(e.exit_code());
        }
    }
}

/// First SIGINT/SIGTERM cancels `cancel` so commands can wind down; a
/// second one exits immediately.
async fn handle_signals(cancel: CancellationToken, exit_code: Arc<AtomicI32>) {
    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(signal) => Some(signal),
        Err(e) => {
            tracing::warn!(error = %e, "failed to register SIGTERM handler");
            None
        }
    };

    let code = tokio::select! {
        _ = tokio::signal::ctrl_c() => ExitCode::INTERRUPTED,
        () = terminated(&mut sigterm) => ExitCode::TERMINATED,
    };
    exit_code.store(code, Ordering::SeqCst);

    eprintln!("\nShutting down gracefully... (press Ctrl+C again to force)");
    cancel.cancel();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => std::process::exit(ExitCode::INTERRUPTED),
        () = terminated(&mut sigterm) => std::process::exit(ExitCode::TERMINATED),
    }
}

async fn terminated(signal: &mut Option<tokio::signal::unix::Signal>) {
    match signal {
        Some(signal) => {
            signal.recv().await;
        }
        None => std::future::pending().await,
    }
}
