//! CLI command dispatch and handlers
//!
//! Routes parsed CLI arguments to the appropriate command handler.

pub mod config;
pub mod device;
pub mod play;
pub mod simulate;
pub mod version;

use tokio_util::sync::CancellationToken;

use crate::cli::args::{Cli, Commands, ConfigSubcommand};
use crate::error::MemoriaError;

/// Dispatch a parsed CLI invocation to the appropriate command handler.
///
/// `cancel` is triggered by the process signal handler.
///
/// # Errors
///
/// Returns an error if the dispatched command handler fails.
pub async fn dispatch(cli: Cli, cancel: CancellationToken) -> Result<(), MemoriaError> {
    match cli.command {
        Commands::Play(args) => play::run(&args, cli.quiet, cancel).await,
        Commands::Status(args) => device::status(&args).await,
        Commands::Reset(args) => device::reset(&args).await,
        Commands::Simulate(args) => simulate::run(&args, cancel).await,
        Commands::Config(cmd) => match cmd.subcommand {
            ConfigSubcommand::Validate(args) => config::validate(&args),
        },
        Commands::Version(args) => {
            version::run(&args);
            Ok(())
        }
    }
}
