//! Round flow state machine
//!
//! [`RoundEngine::handle`] takes one [`Event`] and returns the [`Effect`]s
//! the driver must perform, in order. The engine never touches the network,
//! the clock or a timer directly: timers are requested as effects and come
//! back as events tagged with the generation they were armed with, so a
//! late tick from a cancelled timer is recognised and ignored.
//!
//! Phases run `idle → preparing → memorizing → player_turn`, then
//! `evaluating` until the device starts the next round. A motivational
//! message can hold progression; a new round detected during the hold is
//! latched in a single slot and replayed once the hold ends.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, trace};

use crate::config::{GameConfig, MessageConfig};
use crate::notify::AudioCue;
use crate::observability::events::Event as GameEvent;

use super::prediction::{PredictionRequest, PredictionResponse, RoundTelemetry};
use super::score::{self, Motivation, OutcomeOverlay};
use super::state::{
    Announcements, EngineSnapshot, Level, Mode, Phase, RoundStats, Scoreboard, TurnTimer,
};
use super::sync::{PendingRound, StatusSnapshot, StatusTracker, SyncEvent};

// ============================================================================
// Events and effects
// ============================================================================

/// Timers the engine can have outstanding, at most one per slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerSlot {
    /// Prepare countdown, memorize delay or timeout grace.
    Phase,
    /// Player turn countdown.
    Turn,
    /// Motivational hold.
    Hold,
    /// Overlay expiry.
    Overlay,
}

impl TimerSlot {
    /// Every slot.
    pub const ALL: [Self; 4] = [Self::Phase, Self::Turn, Self::Hold, Self::Overlay];

    /// Position of the slot in per-slot arrays.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Phase => 0,
            Self::Turn => 1,
            Self::Hold => 2,
            Self::Overlay => 3,
        }
    }
}

/// Command sent to the game device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RemoteCommand {
    /// `POST start_game {level}`
    StartGame {
        /// Level to play.
        level: Level,
    },
    /// `POST start_turn`
    StartTurn,
    /// `POST pause`
    Pause,
    /// `POST reset`
    Reset,
}

impl RemoteCommand {
    /// Endpoint path, also used as metric label.
    #[must_use]
    pub const fn endpoint(&self) -> &'static str {
        match self {
            Self::StartGame { .. } => "start_game",
            Self::StartTurn => "start_turn",
            Self::Pause => "pause",
            Self::Reset => "reset",
        }
    }
}

/// Input to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Player asked to start a round flow.
    Start,
    /// Player toggled pause.
    TogglePause,
    /// Abandon everything and return to the initial state.
    HardReset,
    /// Session is ending.
    Shutdown,
    /// A countdown emitted a value.
    TimerTick {
        /// Slot the countdown was armed in.
        slot: TimerSlot,
        /// Generation the countdown was armed with.
        generation: u64,
        /// Value emitted.
        remaining: u32,
    },
    /// A countdown or delay completed.
    TimerElapsed {
        /// Slot the timer was armed in.
        slot: TimerSlot,
        /// Generation the timer was armed with.
        generation: u64,
    },
    /// A status poll returned.
    PollSucceeded {
        /// Polling generation the poll ran under.
        generation: u64,
        /// Device status.
        snapshot: StatusSnapshot,
    },
    /// A status poll failed.
    PollFailed {
        /// Polling generation the poll ran under.
        generation: u64,
        /// Failure description.
        reason: String,
    },
    /// The predictor answered.
    PredictionResolved {
        /// Session epoch the request was made in.
        epoch: u64,
        /// Response body.
        response: PredictionResponse,
    },
    /// The predictor call failed.
    PredictionFailed {
        /// Session epoch the request was made in.
        epoch: u64,
        /// Failure description.
        reason: String,
    },
}

/// Side effect requested by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Send a device command.
    Remote(RemoteCommand),
    /// Play an audio cue.
    Audio(AudioCue),
    /// Show an overlay message.
    Overlay {
        /// Message text.
        message: String,
        /// Display time.
        display: Duration,
    },
    /// Start a ticking countdown in `slot`, replacing any previous one.
    StartCountdown {
        /// Slot to arm.
        slot: TimerSlot,
        /// First value.
        from: u32,
        /// Time between values.
        interval: Duration,
        /// Generation to tag events with.
        generation: u64,
    },
    /// Start a one-shot delay in `slot`, replacing any previous timer.
    Schedule {
        /// Slot to arm.
        slot: TimerSlot,
        /// Delay.
        after: Duration,
        /// Generation to tag the event with.
        generation: u64,
    },
    /// Cancel the timer in `slot`.
    Cancel(TimerSlot),
    /// Cancel every timer.
    CancelAll,
    /// Begin polling the device status; results carry `generation`.
    StartPolling {
        /// Generation to tag poll results with.
        generation: u64,
    },
    /// Stop polling the device status.
    StopPolling,
    /// Ask the predictor for a level adjustment.
    RequestPrediction {
        /// Request body.
        request: PredictionRequest,
        /// Session epoch to echo back.
        epoch: u64,
    },
    /// Record a game event.
    Emit(GameEvent),
}

// ============================================================================
// Internal bookkeeping
// ============================================================================

/// What the phase slot is currently timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PhaseTimer {
    Prepare,
    Memorize,
    Grace,
}

/// Generation of the timer armed in each slot.
#[derive(Debug, Default)]
struct Timers {
    armed: [Option<u64>; 4],
    next: u64,
}

impl Timers {
    fn arm(&mut self, slot: TimerSlot) -> u64 {
        self.next += 1;
        self.armed[slot.index()] = Some(self.next);
        self.next
    }

    fn disarm(&mut self, slot: TimerSlot) -> bool {
        self.armed[slot.index()].take().is_some()
    }

    fn is_armed(&self, slot: TimerSlot) -> bool {
        self.armed[slot.index()].is_some()
    }

    fn is_current(&self, slot: TimerSlot, generation: u64) -> bool {
        self.armed[slot.index()] == Some(generation)
    }

    fn clear(&mut self) {
        self.armed = [None; 4];
    }
}

/// Timers remembered across a player pause.
#[derive(Debug, Default, Clone, Copy)]
struct Frozen {
    phase: Option<(PhaseTimer, u32)>,
    turn: Option<u32>,
}

// ============================================================================
// Engine
// ============================================================================

/// Round flow controller, status synchronizer and score keeper in one
/// exclusively owned value.
#[derive(Debug)]
pub struct RoundEngine {
    config: Arc<GameConfig>,
    initial_level: Level,
    mode: Mode,
    level: Level,
    board: Scoreboard,
    stats: RoundStats,
    phase: Phase,
    announcements: Announcements,
    tracker: StatusTracker,
    pending: PendingRound,
    timers: Timers,
    phase_timer: Option<PhaseTimer>,
    turn: Option<TurnTimer>,
    frozen: Option<Frozen>,
    timer_key: u64,
    epoch: u64,
    poll_generation: u64,
    round_started_at: Option<Instant>,
}

impl RoundEngine {
    /// Creates an idle engine at the configured initial level.
    #[must_use]
    pub fn new(config: Arc<GameConfig>) -> Self {
        let initial_level = Level::new(config.initial_level);
        Self {
            config,
            initial_level,
            mode: Mode::Idle,
            level: initial_level,
            board: Scoreboard::default(),
            stats: RoundStats::default(),
            phase: Phase::Idle,
            announcements: Announcements::default(),
            tracker: StatusTracker::new(),
            pending: PendingRound::default(),
            timers: Timers::default(),
            phase_timer: None,
            turn: None,
            frozen: None,
            timer_key: 0,
            epoch: 0,
            poll_generation: 0,
            round_started_at: None,
        }
    }

    /// Current mode.
    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    /// Displayed level.
    #[must_use]
    pub const fn level(&self) -> Level {
        self.level
    }

    /// Active phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Session epoch; bumped by every hard reset.
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Whether a motivational message holds progression.
    #[must_use]
    pub fn paused_for_message(&self) -> bool {
        self.timers.is_armed(TimerSlot::Hold)
    }

    /// Read-only view of the engine.
    #[must_use]
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            mode: self.mode,
            level: self.level,
            board: self.board,
            stats: self.stats,
            phase: self.phase,
            turn: self.turn,
            announcements: self.announcements.clone(),
            paused_for_message: self.paused_for_message(),
            pending_round: self.pending.is_set(),
        }
    }

    /// Applies one event and returns the effects to perform, in order.
    pub fn handle(&mut self, event: Event, now: Instant) -> Vec<Effect> {
        let mut out = Vec::new();
        match event {
            Event::Start => self.on_start(now, &mut out),
            Event::TogglePause => self.on_toggle_pause(now, &mut out),
            Event::HardReset => self.on_hard_reset(&mut out),
            Event::Shutdown => self.on_shutdown(&mut out),
            Event::TimerTick {
                slot,
                generation,
                remaining,
            } => self.on_tick(slot, generation, remaining),
            Event::TimerElapsed { slot, generation } => {
                self.on_elapsed(slot, generation, now, &mut out);
            }
            Event::PollSucceeded {
                generation,
                snapshot,
            } => {
                if self.is_current_poll(generation) {
                    self.on_poll(&snapshot, now, &mut out);
                }
            }
            Event::PollFailed { generation, reason } => {
                if self.is_current_poll(generation) {
                    debug!(%reason, "status poll failed; waiting for next cycle");
                }
            }
            Event::PredictionResolved { epoch, response } => {
                self.on_prediction(epoch, &response, &mut out);
            }
            Event::PredictionFailed { epoch, reason } => {
                debug!(epoch, %reason, "prediction failed; level unchanged");
            }
        }
        out
    }

    // ------------------------------------------------------------------
    // Player commands
    // ------------------------------------------------------------------

    fn on_start(&mut self, now: Instant, out: &mut Vec<Effect>) {
        if self.mode != Mode::Idle {
            debug!(mode = ?self.mode, "start ignored; round flow already running");
            return;
        }
        self.mode = Mode::Playing;
        self.announcements.result = None;
        self.round_started_at = Some(now);
        self.tracker.reset();
        info!(level = self.level.get(), "round flow started");

        out.push(Effect::Audio(AudioCue::Unlock));
        out.push(Effect::Audio(AudioCue::Start));
        out.push(Effect::Emit(GameEvent::SessionStarted {
            timestamp: Utc::now(),
            level: self.level.get(),
        }));
        self.start_polling(out);

        let ticks = self.config.timing.prepare_ticks;
        self.announcements.prompt = Some(self.config.messages.preparing.clone());
        self.announcements.countdown = Some(ticks);
        self.enter_phase(Phase::Preparing { remaining: ticks }, out);
        self.start_phase_countdown(PhaseTimer::Prepare, ticks, out);
    }

    fn on_toggle_pause(&mut self, now: Instant, out: &mut Vec<Effect>) {
        match self.mode {
            Mode::Idle => debug!("pause ignored while idle"),
            Mode::Playing => {
                let phase = self.phase_timer.take().map(|kind| {
                    let remaining = match (kind, self.phase) {
                        (PhaseTimer::Prepare, Phase::Preparing { remaining }) => remaining,
                        _ => 0,
                    };
                    (kind, remaining)
                });
                if self.timers.disarm(TimerSlot::Phase) {
                    out.push(Effect::Cancel(TimerSlot::Phase));
                }
                let turn = self.turn.map(|t| t.remaining);
                if self.timers.disarm(TimerSlot::Turn) {
                    out.push(Effect::Cancel(TimerSlot::Turn));
                }
                self.frozen = Some(Frozen { phase, turn });
                self.mode = Mode::Paused;
                info!(phase = self.phase.name(), "paused");

                self.stop_polling(out);
                out.push(Effect::Remote(RemoteCommand::Pause));
            }
            Mode::Paused => {
                let frozen = self.frozen.take().unwrap_or_default();
                self.mode = Mode::Playing;
                info!(phase = self.phase.name(), "resumed");

                if let Some((kind, remaining)) = frozen.phase {
                    match kind {
                        PhaseTimer::Prepare => self.start_phase_countdown(kind, remaining, out),
                        PhaseTimer::Memorize => {
                            let after = self.config.timing.memorize_for(self.level.get());
                            self.schedule_phase(kind, after, out);
                        }
                        PhaseTimer::Grace => {
                            self.schedule_phase(kind, self.config.timing.timeout_grace, out);
                        }
                    }
                }
                if let Some(remaining) = frozen.turn
                    && let Some(turn) = self.turn.as_mut()
                {
                    self.timer_key += 1;
                    turn.key = self.timer_key;
                    turn.remaining = remaining;
                    self.phase = Phase::PlayerTurn {
                        timer_key: self.timer_key,
                    };
                    self.start_turn_countdown(remaining, out);
                }

                self.start_polling(out);
                out.push(Effect::Remote(RemoteCommand::Pause));
                self.replay_pending(now, out);
            }
        }
    }

    fn on_hard_reset(&mut self, out: &mut Vec<Effect>) {
        out.push(Effect::CancelAll);
        self.stop_polling(out);
        out.push(Effect::Remote(RemoteCommand::Reset));

        self.timers.clear();
        self.mode = Mode::Idle;
        self.level = self.initial_level;
        self.board = Scoreboard::default();
        self.stats = RoundStats::default();
        self.phase = Phase::Idle;
        self.announcements = Announcements::default();
        self.tracker.reset();
        self.pending.clear();
        self.phase_timer = None;
        self.turn = None;
        self.frozen = None;
        self.round_started_at = None;
        self.epoch += 1;
        info!(epoch = self.epoch, "hard reset");

        out.push(Effect::Emit(GameEvent::SessionReset {
            timestamp: Utc::now(),
        }));
    }

    fn on_shutdown(&mut self, out: &mut Vec<Effect>) {
        out.push(Effect::CancelAll);
        self.stop_polling(out);
        self.timers.clear();
        self.phase_timer = None;
        self.mode = Mode::Idle;
        out.push(Effect::Emit(GameEvent::SessionStopped {
            timestamp: Utc::now(),
            score: self.board.score,
            level: self.level.get(),
        }));
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    fn on_tick(&mut self, slot: TimerSlot, generation: u64, remaining: u32) {
        if !self.timers.is_current(slot, generation) {
            trace!(?slot, generation, "stale tick ignored");
            return;
        }
        match slot {
            TimerSlot::Phase => {
                if let Phase::Preparing { .. } = self.phase {
                    self.phase = Phase::Preparing { remaining };
                    self.announcements.countdown = Some(remaining);
                }
            }
            TimerSlot::Turn => {
                if let Some(turn) = self.turn.as_mut() {
                    turn.remaining = remaining;
                }
            }
            TimerSlot::Hold | TimerSlot::Overlay => {}
        }
    }

    fn on_elapsed(&mut self, slot: TimerSlot, generation: u64, now: Instant, out: &mut Vec<Effect>) {
        if !self.timers.is_current(slot, generation) {
            trace!(?slot, generation, "stale timer ignored");
            return;
        }
        self.timers.disarm(slot);

        match slot {
            TimerSlot::Phase => match self.phase_timer.take() {
                Some(PhaseTimer::Prepare) => {
                    self.announcements.countdown = None;
                    out.push(Effect::Remote(RemoteCommand::StartGame { level: self.level }));
                    self.show_overlay(
                        &self.config.messages.game_started.clone(),
                        self.config.timing.overlay,
                        out,
                    );
                    self.begin_memorize(now, out);
                }
                Some(PhaseTimer::Memorize) => self.begin_turn(out),
                Some(PhaseTimer::Grace) => {
                    out.push(Effect::Remote(RemoteCommand::StartGame { level: self.level }));
                    self.begin_memorize(now, out);
                }
                None => {}
            },
            TimerSlot::Turn => self.turn_timeout(now, out),
            TimerSlot::Hold => {
                debug!("motivational hold ended");
                self.replay_pending(now, out);
            }
            TimerSlot::Overlay => self.announcements.overlay = None,
        }
    }

    // ------------------------------------------------------------------
    // Phases
    // ------------------------------------------------------------------

    fn begin_memorize(&mut self, now: Instant, out: &mut Vec<Effect>) {
        self.cancel_slot(TimerSlot::Phase, out);
        self.disarm_turn(out);
        self.stats.reset_round();
        self.tracker.reset();
        self.round_started_at = Some(now);

        self.announcements.prompt = Some(self.config.messages.memorize.clone());
        self.announcements.countdown = None;
        self.enter_phase(Phase::Memorizing, out);

        let after = self.config.timing.memorize_for(self.level.get());
        self.schedule_phase(PhaseTimer::Memorize, after, out);
    }

    fn begin_turn(&mut self, out: &mut Vec<Effect>) {
        out.push(Effect::Remote(RemoteCommand::StartTurn));

        self.timer_key += 1;
        let ticks = self.config.timing.turn_ticks();
        self.turn = Some(TurnTimer {
            key: self.timer_key,
            remaining: ticks,
            total: ticks,
        });
        self.announcements.prompt = Some(self.config.messages.your_turn.clone());
        self.announcements.result = Some(self.config.messages.result_pending.clone());
        self.enter_phase(
            Phase::PlayerTurn {
                timer_key: self.timer_key,
            },
            out,
        );
        self.start_turn_countdown(ticks, out);
    }

    fn turn_timeout(&mut self, now: Instant, out: &mut Vec<Effect>) {
        if !matches!(self.phase, Phase::PlayerTurn { .. }) {
            return;
        }
        self.turn = None;
        self.board.record_loss(self.config.scoring.penalty);
        info!(
            score = self.board.score,
            streak = self.board.streak,
            "turn timed out"
        );

        out.push(Effect::Audio(AudioCue::Alarm));
        out.push(Effect::Emit(GameEvent::TurnTimedOut {
            timestamp: Utc::now(),
            score: self.board.score,
            streak: self.board.streak,
            loss_streak: self.board.loss_streak,
        }));

        self.announcements.prompt = Some(self.config.messages.evaluating.clone());
        self.enter_phase(Phase::Evaluating, out);

        let config = Arc::clone(&self.config);
        let motivation = score::after_loss(
            &config,
            &self.board,
            OutcomeOverlay {
                message: &config.messages.time_up,
                display: config.timing.timeout_overlay,
            },
        );
        self.present(motivation, out);
        self.schedule_phase(PhaseTimer::Grace, config.timing.timeout_grace, out);
        self.request_prediction(now, out);
    }

    // ------------------------------------------------------------------
    // Status synchronization
    // ------------------------------------------------------------------

    fn on_poll(&mut self, snapshot: &StatusSnapshot, now: Instant, out: &mut Vec<Effect>) {
        if self.mode != Mode::Playing {
            debug!(mode = ?self.mode, "status ignored outside play");
            return;
        }
        self.stats.observe(snapshot.hits(), snapshot.errors);

        for event in self.tracker.observe(snapshot) {
            match event {
                SyncEvent::RoundWon { hits } => self.round_won(hits, now, out),
                SyncEvent::RoundLost { errors } => self.round_lost(errors, now, out),
                SyncEvent::NewRoundDetected { level } => {
                    if self.paused_for_message() {
                        let coalesced = self.pending.latch(level);
                        debug!(level = level.get(), coalesced, "new round deferred by hold");
                    } else {
                        self.start_detected_round(level, now, out);
                    }
                }
            }
        }

        self.replay_pending(now, out);
    }

    fn replay_pending(&mut self, now: Instant, out: &mut Vec<Effect>) {
        if self.mode != Mode::Playing || self.paused_for_message() {
            return;
        }
        if let Some(level) = self.pending.take() {
            info!(level = level.get(), "replaying deferred new round");
            self.start_detected_round(level, now, out);
        }
    }

    fn start_detected_round(&mut self, level: Level, now: Instant, out: &mut Vec<Effect>) {
        if level != self.level {
            self.change_level(level, "device", out);
        }
        self.begin_memorize(now, out);
    }

    // ------------------------------------------------------------------
    // Outcomes
    // ------------------------------------------------------------------

    fn round_won(&mut self, hits: u32, now: Instant, out: &mut Vec<Effect>) {
        self.end_round(out);
        let before = self.board.score;
        self.board.record_win(self.config.scoring.reward);
        info!(hits, score = self.board.score, streak = self.board.streak, "round won");

        out.push(Effect::Audio(AudioCue::Success));
        out.push(Effect::Emit(GameEvent::RoundWon {
            timestamp: Utc::now(),
            hits,
            score: self.board.score,
            streak: self.board.streak,
        }));

        let config = Arc::clone(&self.config);
        if let Some(message) = score::score_milestone(&config, before, self.board.score) {
            self.show_overlay(message, config.timing.overlay, out);
        }
        let motivation = score::after_win(
            &config,
            &self.board,
            OutcomeOverlay {
                message: &config.messages.round_won,
                display: config.timing.overlay,
            },
        );
        self.present(motivation, out);
        self.request_prediction(now, out);
    }

    fn round_lost(&mut self, errors: u32, now: Instant, out: &mut Vec<Effect>) {
        self.end_round(out);
        self.board.record_loss(self.config.scoring.penalty);
        info!(errors, score = self.board.score, streak = self.board.streak, "round lost");

        out.push(Effect::Audio(AudioCue::Error));
        out.push(Effect::Emit(GameEvent::RoundLost {
            timestamp: Utc::now(),
            errors,
            score: self.board.score,
            streak: self.board.streak,
            loss_streak: self.board.loss_streak,
        }));

        let config = Arc::clone(&self.config);
        let motivation = score::after_loss(
            &config,
            &self.board,
            OutcomeOverlay {
                message: &config.messages.round_lost,
                display: config.timing.overlay,
            },
        );
        self.present(motivation, out);
        self.request_prediction(now, out);
    }

    /// Disarms round timers and moves to `evaluating`.
    fn end_round(&mut self, out: &mut Vec<Effect>) {
        self.cancel_slot(TimerSlot::Phase, out);
        self.disarm_turn(out);
        self.announcements.prompt = Some(self.config.messages.evaluating.clone());
        if self.phase != Phase::Evaluating {
            self.enter_phase(Phase::Evaluating, out);
        }
    }

    fn present(&mut self, motivation: Motivation, out: &mut Vec<Effect>) {
        out.push(Effect::Emit(GameEvent::MotivationShown {
            timestamp: Utc::now(),
            kind: motivation.kind,
            message: motivation.message.clone(),
            holds: motivation.holds,
        }));
        if motivation.holds {
            let generation = self.timers.arm(TimerSlot::Hold);
            info!(message = %motivation.message, "progression held for message");
            out.push(Effect::Schedule {
                slot: TimerSlot::Hold,
                after: motivation.display,
                generation,
            });
        }
        self.show_overlay(&motivation.message, motivation.display, out);
    }

    // ------------------------------------------------------------------
    // Prediction
    // ------------------------------------------------------------------

    fn request_prediction(&self, now: Instant, out: &mut Vec<Effect>) {
        if !self.config.predictor.enabled {
            return;
        }
        let elapsed = self
            .round_started_at
            .map_or(Duration::ZERO, |t| now.saturating_duration_since(t));
        let telemetry = RoundTelemetry::collect(self.level, &self.stats, &self.board, elapsed);
        out.push(Effect::RequestPrediction {
            request: telemetry.into(),
            epoch: self.epoch,
        });
    }

    fn on_prediction(&mut self, epoch: u64, response: &PredictionResponse, out: &mut Vec<Effect>) {
        if epoch != self.epoch {
            debug!(epoch, current = self.epoch, "prediction from before reset dropped");
            return;
        }
        let Some(advice) = response.advice(self.config.predictor.source) else {
            debug!(?response, "prediction carried no usable advice");
            return;
        };
        self.announcements.result = Some(advice.label());

        let next = advice.apply(self.level);
        if next != self.level {
            self.change_level(next, "predictor", out);
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn enter_phase(&mut self, phase: Phase, out: &mut Vec<Effect>) {
        debug!(from = self.phase.name(), to = phase.name(), "phase transition");
        self.phase = phase;
        out.push(Effect::Emit(GameEvent::PhaseEntered {
            timestamp: Utc::now(),
            phase: phase.name().to_string(),
            level: self.level.get(),
        }));
    }

    /// Moves the displayed level with audio and overlay feedback.
    fn change_level(&mut self, next: Level, source: &str, out: &mut Vec<Effect>) {
        let from = self.level;
        self.level = next;
        info!(from = from.get(), to = next.get(), source, "level changed");

        let messages = &self.config.messages;
        let (cue, template) = if next > from {
            (AudioCue::LevelUp, messages.level_up.clone())
        } else {
            (AudioCue::LevelDown, messages.level_down.clone())
        };
        out.push(Effect::Audio(cue));
        self.show_overlay(
            &MessageConfig::render_level(&template, next.get()),
            self.config.timing.overlay,
            out,
        );
        out.push(Effect::Emit(GameEvent::LevelChanged {
            timestamp: Utc::now(),
            from: from.get(),
            to: next.get(),
            source: source.to_string(),
        }));
    }

    fn show_overlay(&mut self, message: &str, display: Duration, out: &mut Vec<Effect>) {
        self.announcements.overlay = Some(message.to_string());
        let generation = self.timers.arm(TimerSlot::Overlay);
        out.push(Effect::Overlay {
            message: message.to_string(),
            display,
        });
        out.push(Effect::Schedule {
            slot: TimerSlot::Overlay,
            after: display,
            generation,
        });
    }

    fn start_phase_countdown(&mut self, kind: PhaseTimer, from: u32, out: &mut Vec<Effect>) {
        let generation = self.timers.arm(TimerSlot::Phase);
        self.phase_timer = Some(kind);
        out.push(Effect::StartCountdown {
            slot: TimerSlot::Phase,
            from,
            interval: self.config.timing.tick_interval,
            generation,
        });
    }

    fn schedule_phase(&mut self, kind: PhaseTimer, after: Duration, out: &mut Vec<Effect>) {
        let generation = self.timers.arm(TimerSlot::Phase);
        self.phase_timer = Some(kind);
        out.push(Effect::Schedule {
            slot: TimerSlot::Phase,
            after,
            generation,
        });
    }

    fn start_turn_countdown(&mut self, from: u32, out: &mut Vec<Effect>) {
        let generation = self.timers.arm(TimerSlot::Turn);
        out.push(Effect::StartCountdown {
            slot: TimerSlot::Turn,
            from,
            interval: self.config.timing.tick_interval,
            generation,
        });
    }

    fn start_polling(&mut self, out: &mut Vec<Effect>) {
        self.poll_generation += 1;
        out.push(Effect::StartPolling {
            generation: self.poll_generation,
        });
    }

    /// Results still in flight from the stopped poller become stale.
    fn stop_polling(&mut self, out: &mut Vec<Effect>) {
        self.poll_generation += 1;
        out.push(Effect::StopPolling);
    }

    fn is_current_poll(&self, generation: u64) -> bool {
        let current = generation == self.poll_generation;
        if !current {
            trace!(generation, current = self.poll_generation, "stale poll result dropped");
        }
        current
    }

    fn cancel_slot(&mut self, slot: TimerSlot, out: &mut Vec<Effect>) {
        if slot == TimerSlot::Phase {
            self.phase_timer = None;
        }
        if self.timers.disarm(slot) {
            out.push(Effect::Cancel(slot));
        }
    }

    fn disarm_turn(&mut self, out: &mut Vec<Effect>) {
        self.cancel_slot(TimerSlot::Turn, out);
        self.turn = None;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::engine::score::MotivationKind;
    use crate::engine::sync::DeviceStatus;

    struct Harness {
        engine: RoundEngine,
        now: Instant,
        armed: HashMap<TimerSlot, u64>,
        polling: u64,
    }

    impl Harness {
        fn new(config: GameConfig) -> Self {
            Self {
                engine: RoundEngine::new(Arc::new(config)),
                now: Instant::now(),
                armed: HashMap::new(),
                polling: 0,
            }
        }

        fn send(&mut self, event: Event) -> Vec<Effect> {
            let effects = self.engine.handle(event, self.now);
            for effect in &effects {
                match effect {
                    Effect::StartCountdown {
                        slot, generation, ..
                    }
                    | Effect::Schedule {
                        slot, generation, ..
                    } => {
                        self.armed.insert(*slot, *generation);
                    }
                    Effect::Cancel(slot) => {
                        self.armed.remove(slot);
                    }
                    Effect::CancelAll => self.armed.clear(),
                    Effect::StartPolling { generation } => self.polling = *generation,
                    _ => {}
                }
            }
            effects
        }

        fn elapse(&mut self, slot: TimerSlot) -> Vec<Effect> {
            let generation = self.armed.remove(&slot).expect("slot not armed");
            self.send(Event::TimerElapsed { slot, generation })
        }

        fn poll(&mut self, status: DeviceStatus, level: i64) -> Vec<Effect> {
            self.send(Event::PollSucceeded {
                generation: self.polling,
                snapshot: StatusSnapshot {
                    status,
                    level,
                    ..StatusSnapshot::default()
                },
            })
        }

        /// Start → prepare → memorize → player turn.
        fn to_player_turn(&mut self) {
            self.send(Event::Start);
            self.elapse(TimerSlot::Phase);
            self.elapse(TimerSlot::Phase);
            assert!(matches!(self.engine.phase(), Phase::PlayerTurn { .. }));
        }

        /// Win the current round and have the device start the next one.
        fn win_and_continue(&mut self, level: i64) -> Vec<Effect> {
            let mut effects = self.poll(DeviceStatus::Success, level);
            effects.extend(self.poll(DeviceStatus::Playing, level));
            effects
        }
    }

    fn entered(effects: &[Effect], phase: &str) -> usize {
        effects
            .iter()
            .filter(|e| matches!(e, Effect::Emit(GameEvent::PhaseEntered { phase: p, .. }) if p == phase))
            .count()
    }

    fn has_remote(effects: &[Effect], command: RemoteCommand) -> bool {
        effects.contains(&Effect::Remote(command))
    }

    #[test]
    fn start_runs_prepare_memorize_turn() {
        let mut h = Harness::new(GameConfig::default());

        let effects = h.send(Event::Start);
        assert!(effects.contains(&Effect::Audio(AudioCue::Start)));
        assert!(effects.iter().any(|e| matches!(e, Effect::StartPolling { .. })));
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::StartCountdown { slot: TimerSlot::Phase, from: 3, .. }
        )));
        assert_eq!(h.engine.phase(), Phase::Preparing { remaining: 3 });

        let generation = h.armed[&TimerSlot::Phase];
        h.send(Event::TimerTick {
            slot: TimerSlot::Phase,
            generation,
            remaining: 2,
        });
        assert_eq!(h.engine.snapshot().announcements.countdown, Some(2));

        let effects = h.elapse(TimerSlot::Phase);
        assert!(has_remote(&effects, RemoteCommand::StartGame { level: Level::new(1) }));
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::Schedule { slot: TimerSlot::Phase, after, .. } if *after == Duration::from_secs(3)
        )));
        assert_eq!(h.engine.phase(), Phase::Memorizing);

        let effects = h.elapse(TimerSlot::Phase);
        assert!(has_remote(&effects, RemoteCommand::StartTurn));
        assert_eq!(h.engine.phase(), Phase::PlayerTurn { timer_key: 1 });
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::StartCountdown { slot: TimerSlot::Turn, from: 10, .. }
        )));
        let snapshot = h.engine.snapshot();
        assert_eq!(snapshot.announcements.result.as_deref(), Some("Pendiente..."));
    }

    #[test]
    fn start_while_playing_is_rejected() {
        let mut h = Harness::new(GameConfig::default());
        h.send(Event::Start);
        assert!(h.send(Event::Start).is_empty());
    }

    #[test]
    fn new_round_without_hold_starts_memorize_immediately() {
        let mut h = Harness::new(GameConfig {
            initial_level: 2,
            ..GameConfig::default()
        });
        h.to_player_turn();

        let effects = h.poll(DeviceStatus::Success, 2);
        assert!(effects.iter().any(|e| matches!(e, Effect::Emit(GameEvent::RoundWon { .. }))));
        assert!(effects.contains(&Effect::Cancel(TimerSlot::Turn)));
        assert!(!h.engine.paused_for_message());

        let effects = h.poll(DeviceStatus::Playing, 2);
        assert_eq!(entered(&effects, "memorizing"), 1);
        assert_eq!(h.engine.phase(), Phase::Memorizing);
        assert!(!h.engine.snapshot().pending_round);
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::Schedule { slot: TimerSlot::Phase, after, .. } if *after == Duration::from_secs(4)
        )));
    }

    #[test]
    fn milestone_hold_defers_new_round_exactly_once() {
        let mut config = GameConfig::default();
        config.scoring.streak_milestones = vec![5];
        let mut h = Harness::new(config);
        h.to_player_turn();

        for _ in 0..4 {
            h.win_and_continue(1);
        }
        let effects = h.poll(DeviceStatus::Success, 1);
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::Emit(GameEvent::MotivationShown { kind: MotivationKind::Milestone, holds: true, .. })
        )));
        assert!(h.engine.paused_for_message());

        let effects = h.poll(DeviceStatus::Playing, 1);
        assert_eq!(entered(&effects, "memorizing"), 0);
        assert!(h.engine.snapshot().pending_round);
        assert_eq!(h.engine.phase(), Phase::Evaluating);

        // Sustained status does not add anything while held.
        assert!(h.poll(DeviceStatus::Playing, 1).is_empty());

        let effects = h.elapse(TimerSlot::Hold);
        assert_eq!(entered(&effects, "memorizing"), 1);
        assert!(!h.engine.snapshot().pending_round);

        let effects = h.poll(DeviceStatus::Playing, 1);
        assert_eq!(entered(&effects, "memorizing"), 0);
    }

    #[test]
    fn deferred_round_adopts_device_level() {
        let mut config = GameConfig::default();
        config.scoring.streak_milestones = vec![1];
        let mut h = Harness::new(config);
        h.to_player_turn();

        h.poll(DeviceStatus::Success, 3);
        h.poll(DeviceStatus::Playing, 3);
        assert!(h.engine.snapshot().pending_round);

        let effects = h.elapse(TimerSlot::Hold);
        assert_eq!(entered(&effects, "memorizing"), 1);
        assert_eq!(h.engine.level(), Level::new(3));
    }

    #[test]
    fn held_new_rounds_coalesce_to_last_level() {
        let mut config = GameConfig::default();
        config.scoring.streak_milestones = vec![1];
        let mut h = Harness::new(config);
        h.to_player_turn();

        h.poll(DeviceStatus::Success, 1);
        assert!(h.engine.paused_for_message());
        let mut held = h.poll(DeviceStatus::Playing, 2);
        held.extend(h.poll(DeviceStatus::Success, 2));
        held.extend(h.poll(DeviceStatus::Playing, 3));
        assert_eq!(entered(&held, "memorizing"), 0);
        assert!(h.engine.snapshot().pending_round);
        assert_eq!(h.engine.level(), Level::new(1));

        let effects = h.elapse(TimerSlot::Hold);
        assert_eq!(entered(&effects, "memorizing"), 1);
        assert_eq!(h.engine.level(), Level::new(3));
        assert!(!h.engine.snapshot().pending_round);
        assert!(h.poll(DeviceStatus::Playing, 3).is_empty());
    }

    #[test]
    fn device_level_change_gives_feedback() {
        let mut h = Harness::new(GameConfig::default());
        h.to_player_turn();
        h.poll(DeviceStatus::Success, 1);

        let effects = h.poll(DeviceStatus::Playing, 3);
        assert!(effects.contains(&Effect::Audio(AudioCue::LevelUp)));
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::Overlay { message, .. } if message == "🚀 Subiste a nivel 3"
        )));
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::Emit(GameEvent::LevelChanged { from: 1, to: 3, source, .. }) if source == "device"
        )));
        assert_eq!(entered(&effects, "memorizing"), 1);

        h.elapse(TimerSlot::Phase);
        h.poll(DeviceStatus::Failed, 3);
        let effects = h.poll(DeviceStatus::Memorizing, 2);
        assert!(effects.contains(&Effect::Audio(AudioCue::LevelDown)));
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::Overlay { message, .. } if message.contains("nivel 2")
        )));
    }

    #[test]
    fn poll_from_before_reset_is_dropped() {
        let mut h = Harness::new(GameConfig::default());
        h.to_player_turn();
        let before_reset = h.polling;

        h.send(Event::HardReset);
        h.send(Event::Start);
        assert_ne!(h.polling, before_reset);

        for status in [DeviceStatus::Success, DeviceStatus::Failed] {
            let effects = h.send(Event::PollSucceeded {
                generation: before_reset,
                snapshot: StatusSnapshot {
                    status,
                    level: 1,
                    errors: 1,
                    user_input: vec![1, 2, 3],
                    ..StatusSnapshot::default()
                },
            });
            assert!(effects.is_empty());
        }
        let snapshot = h.engine.snapshot();
        assert_eq!(snapshot.board.score, 0);
        assert_eq!(snapshot.board.streak, 0);
        assert_eq!(snapshot.stats.total_hits, 0);
        assert_eq!(snapshot.phase, Phase::Preparing { remaining: 3 });

        // Live polls still count.
        let effects = h.poll(DeviceStatus::Success, 1);
        assert!(effects.iter().any(|e| matches!(e, Effect::Emit(GameEvent::RoundWon { .. }))));
    }

    #[test]
    fn pause_stales_in_flight_polls() {
        let mut h = Harness::new(GameConfig::default());
        h.to_player_turn();
        let before_pause = h.polling;
        h.send(Event::TogglePause);
        h.send(Event::TogglePause);

        let effects = h.send(Event::PollSucceeded {
            generation: before_pause,
            snapshot: StatusSnapshot {
                status: DeviceStatus::Failed,
                errors: 1,
                ..StatusSnapshot::default()
            },
        });
        assert!(effects.is_empty());
        assert_eq!(h.engine.snapshot().board.streak, 0);
    }

    #[test]
    fn turn_timeout_penalizes_and_restarts_after_grace() {
        let mut h = Harness::new(GameConfig::default());
        h.to_player_turn();

        let effects = h.elapse(TimerSlot::Turn);
        assert!(effects.contains(&Effect::Audio(AudioCue::Alarm)));
        assert!(effects.iter().any(|e| matches!(e, Effect::Emit(GameEvent::TurnTimedOut { .. }))));
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::Overlay { message, display } if message == "⏰ ¡Tiempo Agotado!" && *display == Duration::from_millis(1500)
        )));
        assert!(!has_remote(&effects, RemoteCommand::StartGame { level: Level::new(1) }));

        let snapshot = h.engine.snapshot();
        assert_eq!(snapshot.board.score, 0);
        assert_eq!(snapshot.board.streak, -1);
        assert_eq!(snapshot.board.loss_streak, 1);

        let effects = h.elapse(TimerSlot::Phase);
        assert!(has_remote(&effects, RemoteCommand::StartGame { level: Level::new(1) }));
        assert_eq!(h.engine.phase(), Phase::Memorizing);
    }

    #[test]
    fn turn_timer_key_bumps_on_every_arm() {
        let mut h = Harness::new(GameConfig::default());
        h.to_player_turn();
        h.elapse(TimerSlot::Turn);
        h.elapse(TimerSlot::Phase);
        h.elapse(TimerSlot::Phase);
        assert_eq!(h.engine.phase(), Phase::PlayerTurn { timer_key: 2 });
    }

    #[test]
    fn stale_timer_events_are_ignored() {
        let mut h = Harness::new(GameConfig::default());
        h.send(Event::Start);
        let stale = h.armed[&TimerSlot::Phase];
        h.send(Event::HardReset);

        let effects = h.send(Event::TimerElapsed {
            slot: TimerSlot::Phase,
            generation: stale,
        });
        assert!(effects.is_empty());
        assert_eq!(h.engine.phase(), Phase::Idle);
    }

    #[test]
    fn hard_reset_restores_initial_snapshot() {
        let mut h = Harness::new(GameConfig {
            initial_level: 2,
            ..GameConfig::default()
        });
        h.to_player_turn();
        h.poll(DeviceStatus::Success, 2);
        h.send(Event::PredictionResolved {
            epoch: 0,
            response: PredictionResponse {
                accion: Some("SUBIR".into()),
                nuevo_nivel: None,
            },
        });
        assert_eq!(h.engine.level(), Level::new(3));

        let effects = h.send(Event::HardReset);
        assert_eq!(effects[0], Effect::CancelAll);
        assert!(has_remote(&effects, RemoteCommand::Reset));
        assert!(h.armed.is_empty());

        let expected = EngineSnapshot {
            level: Level::new(2),
            ..EngineSnapshot::default()
        };
        assert_eq!(h.engine.snapshot(), expected);
    }

    #[test]
    fn prediction_raises_level_with_feedback() {
        let mut h = Harness::new(GameConfig::default());
        h.to_player_turn();
        let effects = h.poll(DeviceStatus::Success, 1);
        let Some(Effect::RequestPrediction { request, epoch }) = effects
            .iter()
            .find(|e| matches!(e, Effect::RequestPrediction { .. }))
            .cloned()
        else {
            panic!("no prediction requested");
        };
        assert_eq!(request.nivel, 1);
        assert_eq!(request.racha, 1);

        let effects = h.send(Event::PredictionResolved {
            epoch,
            response: PredictionResponse {
                accion: Some("SUBIR".into()),
                nuevo_nivel: None,
            },
        });
        assert!(effects.contains(&Effect::Audio(AudioCue::LevelUp)));
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::Overlay { message, .. } if message == "🚀 Subiste a nivel 2"
        )));
        assert_eq!(h.engine.level(), Level::new(2));
        assert_eq!(h.engine.snapshot().announcements.result.as_deref(), Some("SUBIR"));
    }

    #[test]
    fn prediction_from_previous_epoch_is_dropped() {
        let mut h = Harness::new(GameConfig::default());
        h.send(Event::HardReset);
        let effects = h.send(Event::PredictionResolved {
            epoch: 0,
            response: PredictionResponse {
                accion: None,
                nuevo_nivel: Some(4),
            },
        });
        assert!(effects.is_empty());
        assert_eq!(h.engine.level(), Level::new(1));
    }

    #[test]
    fn disabled_predictor_is_not_called() {
        let mut config = GameConfig::default();
        config.predictor.enabled = false;
        let mut h = Harness::new(config);
        h.to_player_turn();
        let effects = h.poll(DeviceStatus::Failed, 1);
        assert!(!effects.iter().any(|e| matches!(e, Effect::RequestPrediction { .. })));
    }

    #[test]
    fn two_losses_show_holding_consolation() {
        let mut h = Harness::new(GameConfig::default());
        h.to_player_turn();
        h.poll(DeviceStatus::Failed, 1);
        h.poll(DeviceStatus::Playing, 1);
        assert!(!h.engine.paused_for_message());

        let effects = h.poll(DeviceStatus::Failed, 1);
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::Emit(GameEvent::MotivationShown { kind: MotivationKind::Consolation, holds: true, .. })
        )));
        assert!(h.engine.paused_for_message());
        assert_eq!(h.engine.snapshot().board.streak, -2);
    }

    #[test]
    fn pause_freezes_turn_and_resume_continues_from_remaining() {
        let mut h = Harness::new(GameConfig::default());
        h.to_player_turn();
        let generation = h.armed[&TimerSlot::Turn];
        h.send(Event::TimerTick {
            slot: TimerSlot::Turn,
            generation,
            remaining: 6,
        });

        let effects = h.send(Event::TogglePause);
        assert!(effects.contains(&Effect::Cancel(TimerSlot::Turn)));
        assert!(effects.contains(&Effect::StopPolling));
        assert!(has_remote(&effects, RemoteCommand::Pause));
        assert_eq!(h.engine.mode(), Mode::Paused);

        // Polls arriving late are ignored while paused.
        assert!(h.poll(DeviceStatus::Success, 1).is_empty());

        let effects = h.send(Event::TogglePause);
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::StartCountdown { slot: TimerSlot::Turn, from: 6, .. }
        )));
        assert_eq!(h.engine.phase(), Phase::PlayerTurn { timer_key: 2 });
        let turn = h.engine.snapshot().turn.expect("turn still running");
        assert_eq!((turn.key, turn.remaining), (2, 6));
        assert!(effects.iter().any(|e| matches!(e, Effect::StartPolling { .. })));
        assert!(has_remote(&effects, RemoteCommand::Pause));
        assert_eq!(h.engine.mode(), Mode::Playing);
    }

    #[test]
    fn pause_during_prepare_resumes_countdown() {
        let mut h = Harness::new(GameConfig::default());
        h.send(Event::Start);
        let generation = h.armed[&TimerSlot::Phase];
        h.send(Event::TimerTick {
            slot: TimerSlot::Phase,
            generation,
            remaining: 1,
        });
        h.send(Event::TogglePause);
        let effects = h.send(Event::TogglePause);
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::StartCountdown { slot: TimerSlot::Phase, from: 1, .. }
        )));
    }

    #[test]
    fn poll_failure_does_not_advance_tracker() {
        let mut h = Harness::new(GameConfig::default());
        h.to_player_turn();
        h.poll(DeviceStatus::Success, 1);
        assert!(
            h.send(Event::PollFailed {
                generation: h.polling,
                reason: "timeout".into()
            })
            .is_empty()
        );
        let effects = h.poll(DeviceStatus::Playing, 1);
        assert_eq!(entered(&effects, "memorizing"), 1);
    }

    #[test]
    fn overlay_expiry_clears_announcement() {
        let mut h = Harness::new(GameConfig::default());
        h.send(Event::Start);
        h.elapse(TimerSlot::Phase);
        assert_eq!(
            h.engine.snapshot().announcements.overlay.as_deref(),
            Some("🎮 Juego iniciado")
        );
        h.elapse(TimerSlot::Overlay);
        assert_eq!(h.engine.snapshot().announcements.overlay, None);
    }

    #[test]
    fn score_milestone_overlay_on_crossing() {
        let mut config = GameConfig::default();
        config.scoring.streak_milestones.clear();
        config.scoring.score_milestones[0].score = 20;
        let mut h = Harness::new(config);
        h.to_player_turn();
        h.win_and_continue(1);
        let effects = h.poll(DeviceStatus::Success, 1);
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::Overlay { message, .. } if message.contains("50 puntos")
        )));
    }
}
