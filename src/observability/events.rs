//! Structured game event stream.
//!
//! Discrete, typed events emitted while a session runs. Events are
//! serialized as newline-delimited JSON (JSONL) with a monotonically
//! increasing sequence number.

use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::engine::score::MotivationKind;

// ---------------------------------------------------------------------------
// Event variants
// ---------------------------------------------------------------------------

/// A discrete event emitted during a play session.
///
/// Each variant is tagged with `"type"` when serialized to JSON so consumers
/// can dispatch on the event kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    /// The player started a round flow.
    SessionStarted {
        /// When the flow started.
        timestamp: DateTime<Utc>,
        /// Level the flow starts at.
        level: u8,
    },

    /// A round phase was entered.
    PhaseEntered {
        /// When the phase was entered.
        timestamp: DateTime<Utc>,
        /// Phase name (e.g. `"memorizing"`).
        phase: String,
        /// Level being played.
        level: u8,
    },

    /// The device reported a won round.
    RoundWon {
        /// When the outcome was observed.
        timestamp: DateTime<Utc>,
        /// Hits reported by the device.
        hits: u32,
        /// Score after the round.
        score: u32,
        /// Signed streak after the round.
        streak: i32,
    },

    /// The device reported a lost round.
    RoundLost {
        /// When the outcome was observed.
        timestamp: DateTime<Utc>,
        /// Errors reported by the device.
        errors: u32,
        /// Score after the round.
        score: u32,
        /// Signed streak after the round.
        streak: i32,
        /// Consecutive losses.
        loss_streak: u32,
    },

    /// The turn timer ran out before an outcome arrived.
    TurnTimedOut {
        /// When the timer expired.
        timestamp: DateTime<Utc>,
        /// Score after the penalty.
        score: u32,
        /// Signed streak after the timeout.
        streak: i32,
        /// Consecutive losses.
        loss_streak: u32,
    },

    /// The displayed level changed.
    LevelChanged {
        /// When the level changed.
        timestamp: DateTime<Utc>,
        /// Previous level.
        from: u8,
        /// New level.
        to: u8,
        /// What caused the change (`"predictor"` or `"device"`).
        source: String,
    },

    /// A motivational or outcome overlay was shown.
    MotivationShown {
        /// When the overlay was shown.
        timestamp: DateTime<Utc>,
        /// Selection reason.
        kind: MotivationKind,
        /// Overlay text.
        message: String,
        /// Whether round progression is held.
        holds: bool,
    },

    /// The session was hard-reset.
    SessionReset {
        /// When the reset happened.
        timestamp: DateTime<Utc>,
    },

    /// The session ended.
    SessionStopped {
        /// When the session ended.
        timestamp: DateTime<Utc>,
        /// Final score.
        score: u32,
        /// Final level.
        level: u8,
    },
}

impl Event {
    /// The `type` tag of the event.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SessionStarted { .. } => "SessionStarted",
            Self::PhaseEntered { .. } => "PhaseEntered",
            Self::RoundWon { .. } => "RoundWon",
            Self::RoundLost { .. } => "RoundLost",
            Self::TurnTimedOut { .. } => "TurnTimedOut",
            Self::LevelChanged { .. } => "LevelChanged",
            Self::MotivationShown { .. } => "MotivationShown",
            Self::SessionReset { .. } => "SessionReset",
            Self::SessionStopped { .. } => "SessionStopped",
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope (adds sequence number via serde flatten)
// ---------------------------------------------------------------------------

/// Wraps an [`Event`] with a monotonically increasing sequence number.
#[derive(Debug, Serialize)]
struct EventEnvelope {
    sequence: u64,
    #[serde(flatten)]
    event: Event,
}

// ---------------------------------------------------------------------------
// Emitter
// ---------------------------------------------------------------------------

/// Thread-safe, buffered JSONL event writer.
///
/// Each call to [`emit`](Self::emit) increments the sequence counter,
/// serializes the event as one JSON line and flushes. Serialization or I/O
/// failures are dropped; the event stream never interrupts a session.
pub struct EventEmitter {
    writer: Mutex<BufWriter<Box<dyn Write + Send>>>,
    sequence: AtomicU64,
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("sequence", &self.sequence.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl EventEmitter {
    /// Creates an emitter that writes to the given writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(BufWriter::new(writer)),
            sequence: AtomicU64::new(0),
        }
    }

    /// Creates an emitter that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self::new(Box::new(std::io::stderr()))
    }

    /// Creates an emitter that discards all events.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(Box::new(std::io::sink()))
    }

    /// Creates an emitter that writes to a file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be created.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::new(Box::new(file)))
    }

    /// Emits an event as a single JSONL line.
    pub fn emit(&self, event: Event) {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let envelope = EventEnvelope {
            sequence: seq,
            event,
        };

        if let Ok(mut w) = self.writer.lock()
            && let Ok(line) = serde_json::to_string(&envelope)
        {
            let _ = writeln!(w, "{line}");
            let _ = w.flush();
        }
    }

    /// Returns the number of events emitted so far.
    #[must_use]
    pub fn event_count(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
