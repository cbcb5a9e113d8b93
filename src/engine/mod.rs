//! Round flow engine
//!
//! Pure game logic: the [`RoundEngine`] state machine and the types it is
//! built from. The only asynchronous piece here is the [`countdown`]
//! primitive that the driver uses to implement timer effects.

pub mod countdown;
pub mod machine;
pub mod prediction;
pub mod score;
pub mod state;
pub mod sync;

pub use countdown::{Countdown, CountdownHandle, CountdownSlot};
pub use machine::{Effect, Event, RemoteCommand, RoundEngine, TimerSlot};
pub use prediction::{LevelAdvice, PredictionRequest, PredictionResponse, RoundTelemetry};
pub use state::{EngineSnapshot, Level, Mode, Phase};
pub use sync::{DeviceStatus, StatusSnapshot};
