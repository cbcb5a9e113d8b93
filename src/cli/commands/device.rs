//! One-shot device commands: `status` and `reset`.

use crate::cli::args::DeviceArgs;
use crate::device::{DeviceControl, HttpDevice, StatusSource};
use crate::engine::machine::RemoteCommand;
use crate::error::MemoriaError;

/// Print the device status as pretty JSON on stdout.
///
/// # Errors
///
/// Returns a device error if the device is unreachable or answers badly.
pub async fn status(args: &DeviceArgs) -> Result<(), MemoriaError> {
    let device = HttpDevice::new(&args.device, args.timeout)?;
    let snapshot = device.status().await?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

/// Send the reset command.
///
/// # Errors
///
/// Returns a device error if the device does not acknowledge the reset.
pub async fn reset(args: &DeviceArgs) -> Result<(), MemoriaError> {
    let device = HttpDevice::new(&args.device, args.timeout)?;
    device.send(RemoteCommand::Reset).await?;
    tracing::info!(device = %args.device, "device reset");
    Ok(())
}
