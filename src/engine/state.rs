//! Engine state types
//!
//! Plain data owned by the [`RoundEngine`](super::machine::RoundEngine):
//! level, mode, scoreboard, per-round statistics, the active phase and the
//! announcements projected from them.

use std::fmt;

use serde::Serialize;

// ============================================================================
// Level
// ============================================================================

/// Difficulty level, always within `Level::MIN..=Level::MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Level(u8);

impl Level {
    /// Easiest level.
    pub const MIN: u8 = 1;
    /// Hardest level.
    pub const MAX: u8 = 5;

    /// Creates a level, clamping out-of-range values.
    #[must_use]
    pub const fn new(raw: u8) -> Self {
        if raw < Self::MIN {
            Self(Self::MIN)
        } else if raw > Self::MAX {
            Self(Self::MAX)
        } else {
            Self(raw)
        }
    }

    /// Creates a level from an untrusted wire integer, clamping it.
    #[must_use]
    pub fn from_wire(raw: i64) -> Self {
        let clamped = raw.clamp(i64::from(Self::MIN), i64::from(Self::MAX));
        Self::new(u8::try_from(clamped).unwrap_or(Self::MIN))
    }

    /// Returns the numeric level.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// One level harder, saturating at `MAX`.
    #[must_use]
    pub const fn raised(self) -> Self {
        Self::new(self.0.saturating_add(1))
    }

    /// One level easier, saturating at `MIN`.
    #[must_use]
    pub const fn lowered(self) -> Self {
        Self::new(self.0.saturating_sub(1))
    }
}

impl Default for Level {
    fn default() -> Self {
        Self(Self::MIN)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Mode
// ============================================================================

/// Top-level session mode, orthogonal to the round phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// No round flow is running.
    #[default]
    Idle,
    /// A round flow is running and the device is polled.
    Playing,
    /// The player froze the round flow.
    Paused,
}

// ============================================================================
// Scoreboard
// ============================================================================

/// Score and streak bookkeeping.
///
/// `streak` is signed: positive values count consecutive wins, negative
/// values count consecutive losses. A win after a loss run restarts at
/// `+1`; a loss after a win run restarts at `-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Scoreboard {
    /// Current score, never negative.
    pub score: u32,
    /// Signed win/loss streak.
    pub streak: i32,
    /// Consecutive losses (including turn timeouts).
    pub loss_streak: u32,
}

impl Scoreboard {
    /// Applies a won round.
    pub const fn record_win(&mut self, reward: u32) {
        self.score = self.score.saturating_add(reward);
        self.streak = if self.streak < 0 {
            1
        } else {
            self.streak.saturating_add(1)
        };
        self.loss_streak = 0;
    }

    /// Applies a lost or timed-out round. The score floors at zero.
    pub const fn record_loss(&mut self, penalty: u32) {
        self.score = self.score.saturating_sub(penalty);
        self.streak = if self.streak > 0 {
            -1
        } else {
            self.streak.saturating_sub(1)
        };
        self.loss_streak = self.loss_streak.saturating_add(1);
    }

    /// Current win streak, zero during a loss run.
    #[must_use]
    pub fn win_streak(&self) -> u32 {
        u32::try_from(self.streak).unwrap_or(0)
    }
}

// ============================================================================
// Round statistics
// ============================================================================

/// Hit and error counts derived from the device status feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RoundStats {
    /// Hits in the current round.
    pub current_hits: u32,
    /// Errors in the current round.
    pub current_errors: u32,
    /// Hits across the whole session.
    pub total_hits: u32,
    /// Errors across the whole session.
    pub total_errors: u32,
}

impl RoundStats {
    /// Folds one device observation into the counters.
    ///
    /// Only increases relative to the current round feed the totals, so
    /// the totals never decrease, even if the device resets its counters
    /// mid-round.
    pub fn observe(&mut self, hits: u32, errors: u32) {
        self.total_hits = self
            .total_hits
            .saturating_add(hits.saturating_sub(self.current_hits));
        self.total_errors = self
            .total_errors
            .saturating_add(errors.saturating_sub(self.current_errors));
        self.current_hits = hits;
        self.current_errors = errors;
    }

    /// Clears the per-round counters at round start.
    pub const fn reset_round(&mut self) {
        self.current_hits = 0;
        self.current_errors = 0;
    }
}

// ============================================================================
// Phase
// ============================================================================

/// The single active round phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    /// No round in progress.
    #[default]
    Idle,
    /// Prepare countdown running.
    Preparing {
        /// Countdown value currently displayed.
        remaining: u32,
    },
    /// The device is showing the pattern.
    Memorizing,
    /// The player reproduces the pattern while the turn timer runs.
    PlayerTurn {
        /// Bumped on every (re)arm of the turn timer.
        timer_key: u64,
    },
    /// Waiting for the device to begin the next round.
    Evaluating,
}

impl Phase {
    /// Stable name for logs, events and metric labels.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Preparing { .. } => "preparing",
            Self::Memorizing => "memorizing",
            Self::PlayerTurn { .. } => "player_turn",
            Self::Evaluating => "evaluating",
        }
    }
}

// ============================================================================
// Announcements / snapshot
// ============================================================================

/// Transient player-facing text, projected from engine state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Announcements {
    /// Auto-expiring overlay message.
    pub overlay: Option<String>,
    /// Phase prompt.
    pub prompt: Option<String>,
    /// Prepare countdown value.
    pub countdown: Option<u32>,
    /// Result of the latest prediction.
    pub result: Option<String>,
}

/// Turn timer as shown to the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TurnTimer {
    /// Identity of the current arm; changes on every restart.
    pub key: u64,
    /// Ticks left.
    pub remaining: u32,
    /// Ticks at arm time.
    pub total: u32,
}

/// Read-only view of the whole engine.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct EngineSnapshot {
    /// Session mode.
    pub mode: Mode,
    /// Displayed level.
    pub level: Level,
    /// Score and streaks.
    #[serde(flatten)]
    pub board: Scoreboard,
    /// Hit/error counters.
    pub stats: RoundStats,
    /// Active phase.
    pub phase: Phase,
    /// Turn timer, while armed.
    pub turn: Option<TurnTimer>,
    /// Player-facing text.
    pub announcements: Announcements,
    /// Whether a motivational message currently holds progression.
    pub paused_for_message: bool,
    /// Whether a new-round transition is waiting for the hold to end.
    pub pending_round: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_clamps() {
        assert_eq!(Level::new(0).get(), 1);
        assert_eq!(Level::new(9).get(), 5);
        assert_eq!(Level::from_wire(-3).get(), 1);
        assert_eq!(Level::from_wire(1_000).get(), 5);
        assert_eq!(Level::new(5).raised().get(), 5);
        assert_eq!(Level::new(1).lowered().get(), 1);
        assert_eq!(Level::new(3).raised().get(), 4);
    }

    #[test]
    fn win_after_losses_restarts_at_one() {
        let mut board = Scoreboard::default();
        board.record_loss(5);
        board.record_loss(5);
        assert_eq!(board.streak, -2);
        assert_eq!(board.loss_streak, 2);

        board.record_win(10);
        assert_eq!(board.streak, 1);
        assert_eq!(board.loss_streak, 0);
        assert_eq!(board.score, 10);
    }

    #[test]
    fn loss_after_wins_flips_sign() {
        let mut board = Scoreboard::default();
        board.record_win(10);
        board.record_win(10);
        board.record_loss(5);
        assert_eq!(board.streak, -1);
        assert_eq!(board.score, 15);
        assert_eq!(board.win_streak(), 0);
    }

    #[test]
    fn score_floors_at_zero() {
        let mut board = Scoreboard::default();
        board.record_loss(5);
        assert_eq!(board.score, 0);
    }

    #[test]
    fn stats_totals_only_grow() {
        let mut stats = RoundStats::default();
        stats.observe(2, 0);
        stats.observe(3, 1);
        assert_eq!((stats.total_hits, stats.total_errors), (3, 1));

        // Device reset its counters; totals hold.
        stats.observe(0, 0);
        assert_eq!((stats.total_hits, stats.total_errors), (3, 1));

        stats.reset_round();
        stats.observe(2, 0);
        assert_eq!(stats.total_hits, 5);
        assert_eq!(stats.current_hits, 2);
    }

    #[test]
    fn snapshot_serializes_flat_board() {
        let json = serde_json::to_value(EngineSnapshot::default()).unwrap();
        assert_eq!(json["mode"], "idle");
        assert_eq!(json["level"], 1);
        assert_eq!(json["score"], 0);
        assert_eq!(json["phase"]["phase"], "idle");
    }
}
