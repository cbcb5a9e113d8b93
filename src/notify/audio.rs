//! Audio cues
//!
//! The engine asks for named cues; [`ToneSynth`] expands them into tones
//! and plays them on a [`ToneOutput`]. The output is opened lazily on first
//! use and kept for the lifetime of the synth.

use std::io::Write;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, trace};

/// Default tone length.
const DEFAULT_TONE: Duration = Duration::from_millis(180);

/// Named sound the engine can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioCue {
    /// Open the audio output without playing anything.
    Unlock,
    /// Round flow started (523.25 Hz).
    Start,
    /// Round won (700 Hz, then 1000 Hz 120 ms later).
    Success,
    /// Round lost (250 Hz for 250 ms).
    Error,
    /// Turn timed out (880 Hz sweeping to 440 Hz over 500 ms).
    Alarm,
    /// Level went up (950 Hz).
    LevelUp,
    /// Level went down (300 Hz).
    LevelDown,
}

/// Oscillator shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    /// Soft cue tone.
    Triangle,
    /// Harsh alarm tone.
    Sawtooth,
}

/// A single scheduled tone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tone {
    /// Start frequency.
    pub frequency_hz: f32,
    /// End frequency for a linear sweep.
    pub sweep_to_hz: Option<f32>,
    /// Tone length.
    pub duration: Duration,
    /// Delay from the cue start.
    pub offset: Duration,
    /// Oscillator shape.
    pub waveform: Waveform,
}

impl Tone {
    const fn plain(frequency_hz: f32, duration: Duration, offset: Duration) -> Self {
        Self {
            frequency_hz,
            sweep_to_hz: None,
            duration,
            offset,
            waveform: Waveform::Triangle,
        }
    }
}

impl AudioCue {
    /// Tones making up the cue, in start order.
    #[must_use]
    pub fn tones(self) -> Vec<Tone> {
        match self {
            Self::Unlock => Vec::new(),
            Self::Start => vec![Tone::plain(523.25, DEFAULT_TONE, Duration::ZERO)],
            Self::Success => vec![
                Tone::plain(700.0, DEFAULT_TONE, Duration::ZERO),
                Tone::plain(1000.0, DEFAULT_TONE, Duration::from_millis(120)),
            ],
            Self::Error => vec![Tone::plain(250.0, Duration::from_millis(250), Duration::ZERO)],
            Self::Alarm => vec![Tone {
                frequency_hz: 880.0,
                sweep_to_hz: Some(440.0),
                duration: Duration::from_millis(500),
                offset: Duration::ZERO,
                waveform: Waveform::Sawtooth,
            }],
            Self::LevelUp => vec![Tone::plain(950.0, DEFAULT_TONE, Duration::ZERO)],
            Self::LevelDown => vec![Tone::plain(300.0, DEFAULT_TONE, Duration::ZERO)],
        }
    }
}

// ============================================================================
// Sinks
// ============================================================================

/// Fire-and-forget consumer of audio cues.
pub trait AudioSink: Send + Sync {
    /// Plays `cue`. Never fails from the caller's point of view.
    fn play(&self, cue: AudioCue);
}

/// Device that renders tones.
pub trait ToneOutput: Send + Sync {
    /// Renders one tone.
    fn tone(&self, tone: &Tone);
}

type OutputFactory = Box<dyn Fn() -> Box<dyn ToneOutput> + Send + Sync>;

/// Opened audio output plus bookkeeping.
struct AudioContext {
    output: Box<dyn ToneOutput>,
    played: AtomicU64,
}

/// Audio sink that owns a lazily opened [`ToneOutput`].
///
/// The output is created by the factory on the first cue (including
/// [`AudioCue::Unlock`]) and is never recreated.
pub struct ToneSynth {
    factory: OutputFactory,
    context: OnceLock<AudioContext>,
}

impl std::fmt::Debug for ToneSynth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToneSynth")
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl ToneSynth {
    /// Creates a synth whose output is built by `factory` on first use.
    #[must_use]
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Box<dyn ToneOutput> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            context: OnceLock::new(),
        }
    }

    /// Synth that rings the terminal bell.
    #[must_use]
    pub fn terminal() -> Self {
        Self::new(|| Box::new(TerminalBell))
    }

    /// Whether the output has been opened.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.context.get().is_some()
    }

    /// Number of tones played so far.
    #[must_use]
    pub fn tones_played(&self) -> u64 {
        self.context
            .get()
            .map_or(0, |ctx| ctx.played.load(Ordering::Relaxed))
    }

    fn context(&self) -> &AudioContext {
        self.context.get_or_init(|| {
            debug!("opening audio output");
            AudioContext {
                output: (self.factory)(),
                played: AtomicU64::new(0),
            }
        })
    }
}

impl AudioSink for ToneSynth {
    fn play(&self, cue: AudioCue) {
        let ctx = self.context();
        for tone in cue.tones() {
            trace!(?cue, hz = tone.frequency_hz, "tone");
            ctx.output.tone(&tone);
            ctx.played.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Rings the terminal bell once per tone.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalBell;

impl ToneOutput for TerminalBell {
    fn tone(&self, _tone: &Tone) {
        let mut stderr = std::io::stderr();
        let _ = stderr.write_all(b"\x07");
        let _ = stderr.flush();
    }
}

/// Discards all cues.
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;

impl AudioSink for Silent {
    fn play(&self, _cue: AudioCue) {}
}
