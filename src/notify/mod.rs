//! Player feedback sinks: audio cues and overlay messages.

pub mod audio;
pub mod overlay;

pub use audio::{AudioCue, AudioSink, Silent, ToneSynth};
pub use overlay::{ConsoleNotifier, LogNotifier, Notifier};
