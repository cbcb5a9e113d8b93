//! Device and predictor collaborators
//!
//! The engine driver talks to the game device and the difficulty predictor
//! only through the traits below. [`http`] implements them over plain HTTP
//! JSON; [`sim`] serves the same API from an in-memory device model.

use async_trait::async_trait;

use crate::engine::machine::RemoteCommand;
use crate::engine::prediction::{PredictionRequest, PredictionResponse};
use crate::engine::sync::StatusSnapshot;
use crate::error::DeviceError;

pub mod http;
pub mod sim;

pub use http::{HttpDevice, HttpPredictor};
pub use sim::{DeviceSimulator, SimulatorOptions};

/// Source of device status snapshots.
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Fetches the current status.
    ///
    /// # Errors
    ///
    /// Returns a [`DeviceError`] on network, status or decode failure.
    async fn status(&self) -> Result<StatusSnapshot, DeviceError>;
}

/// Sink for device commands.
#[async_trait]
pub trait DeviceControl: Send + Sync {
    /// Sends one command.
    ///
    /// # Errors
    ///
    /// Returns a [`DeviceError`] if the device did not acknowledge it.
    async fn send(&self, command: RemoteCommand) -> Result<(), DeviceError>;
}

/// Adaptive-difficulty predictor.
#[async_trait]
pub trait Predictor: Send + Sync {
    /// Asks for a level adjustment.
    ///
    /// # Errors
    ///
    /// Returns a [`DeviceError`] on network, status or decode failure.
    async fn predict(&self, request: &PredictionRequest) -> Result<PredictionResponse, DeviceError>;
}
