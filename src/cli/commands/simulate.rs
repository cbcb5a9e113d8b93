//! `simulate`: serve the device simulator until interrupted.

use tokio_util::sync::CancellationToken;

use crate::cli::args::SimulateArgs;
use crate::device::{DeviceSimulator, SimulatorOptions};
use crate::error::MemoriaError;

/// Run the device simulator.
///
/// # Errors
///
/// Returns an I/O error if the listener cannot bind.
pub async fn run(args: &SimulateArgs, cancel: CancellationToken) -> Result<(), MemoriaError> {
    let options = SimulatorOptions {
        bind_addr: args.bind.clone(),
        pattern_length: usize::from(args.pattern_length),
        advance_after: args.advance_after,
        seed: args.seed,
        ..SimulatorOptions::default()
    };

    let (simulator, bound_addr) = DeviceSimulator::bind(options, cancel.clone()).await?;
    eprintln!("simulated device listening on http://{bound_addr}");

    cancel.cancelled().await;
    simulator.shutdown();
    simulator.join().await;
    Ok(())
}
