//! Session driver
//!
//! Owns a [`RoundEngine`] and performs the effects it returns: timers,
//! device polling, device commands, predictor calls, audio, overlays and
//! the game event stream. Everything asynchronous reports back through
//! one internal channel, so the engine only ever sees one event at a time.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, trace, warn};
use uuid::Uuid;

use crate::config::GameConfig;
use crate::device::{DeviceControl, Predictor, StatusSource};
use crate::engine::countdown::{Countdown, CountdownHandle, CountdownSlot};
use crate::engine::machine::{Effect, Event, RemoteCommand, RoundEngine, TimerSlot};
use crate::engine::prediction::PredictionRequest;
use crate::engine::state::EngineSnapshot;
use crate::error::EngineError;
use crate::notify::{AudioSink, Notifier};
use crate::observability::events::EventEmitter;
use crate::observability::metrics;

/// How long shutdown waits for queued device commands.
const COMMAND_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// External collaborators of a session.
#[derive(Clone)]
pub struct Collaborators {
    /// Device status endpoint.
    pub status: Arc<dyn StatusSource>,
    /// Device command endpoint.
    pub control: Arc<dyn DeviceControl>,
    /// Difficulty predictor; `None` disables predictions.
    pub predictor: Option<Arc<dyn Predictor>>,
    /// Audio cue player.
    pub audio: Arc<dyn AudioSink>,
    /// Overlay display.
    pub notifier: Arc<dyn Notifier>,
    /// Game event stream.
    pub emitter: Arc<EventEmitter>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("predictor", &self.predictor.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Handle to a running session.
///
/// Dropping the handle shuts the session down.
#[derive(Debug)]
pub struct SessionHandle {
    session_id: Uuid,
    inputs: mpsc::UnboundedSender<Event>,
    snapshots: watch::Receiver<EngineSnapshot>,
    task: JoinHandle<EngineSnapshot>,
}

impl SessionHandle {
    /// Identifier attached to this session's log lines.
    #[must_use]
    pub const fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Sends an event to the engine.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DriverStopped`] if the session has ended.
    pub fn send(&self, event: Event) -> Result<(), EngineError> {
        self.inputs
            .send(event)
            .map_err(|_| EngineError::DriverStopped)
    }

    /// Starts the round flow.
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send).
    pub fn start(&self) -> Result<(), EngineError> {
        self.send(Event::Start)
    }

    /// Pauses or resumes.
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send).
    pub fn toggle_pause(&self) -> Result<(), EngineError> {
        self.send(Event::TogglePause)
    }

    /// Abandons the session and returns to the initial state.
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send).
    pub fn hard_reset(&self) -> Result<(), EngineError> {
        self.send(Event::HardReset)
    }

    /// Latest engine snapshot.
    #[must_use]
    pub fn snapshot(&self) -> EngineSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver notified after every processed event.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<EngineSnapshot> {
        self.snapshots.clone()
    }

    /// Ends the session and returns its final snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DriverFailed`] if the driver task panicked.
    pub async fn shutdown(self) -> Result<EngineSnapshot, EngineError> {
        // Already stopped is fine; the join below reports the outcome.
        let _ = self.inputs.send(Event::Shutdown);
        self.task
            .await
            .map_err(|e| EngineError::DriverFailed(e.to_string()))
    }
}

// ============================================================================
// Driver
// ============================================================================

/// Spawns a session driver for `config`.
#[must_use]
pub fn spawn(config: Arc<GameConfig>, collaborators: Collaborators) -> SessionHandle {
    let session_id = Uuid::new_v4();
    let (inputs_tx, inputs_rx) = mpsc::unbounded_channel();
    let (internal_tx, internal_rx) = mpsc::unbounded_channel();
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();

    let engine = RoundEngine::new(Arc::clone(&config));
    let (snapshot_tx, snapshot_rx) = watch::channel(engine.snapshot());

    let worker = tokio::spawn(command_worker(
        Arc::clone(&collaborators.control),
        commands_rx,
    ));

    let driver = Driver {
        engine,
        config,
        collaborators,
        internal_tx,
        slots: std::array::from_fn(|_| CountdownSlot::new()),
        polling: None,
        commands: Some(commands_tx),
        worker: Some(worker),
        snapshots: snapshot_tx,
    };

    let span = info_span!("session", id = %session_id);
    let task = tokio::spawn(driver.run(inputs_rx, internal_rx).instrument(span));

    SessionHandle {
        session_id,
        inputs: inputs_tx,
        snapshots: snapshot_rx,
        task,
    }
}

struct Driver {
    engine: RoundEngine,
    config: Arc<GameConfig>,
    collaborators: Collaborators,
    internal_tx: mpsc::UnboundedSender<Event>,
    slots: [CountdownSlot; 4],
    polling: Option<CancellationToken>,
    commands: Option<mpsc::UnboundedSender<RemoteCommand>>,
    worker: Option<JoinHandle<()>>,
    snapshots: watch::Sender<EngineSnapshot>,
}

impl Driver {
    async fn run(
        mut self,
        mut inputs: mpsc::UnboundedReceiver<Event>,
        mut internal: mpsc::UnboundedReceiver<Event>,
    ) -> EngineSnapshot {
        info!(level = %self.engine.level(), "session driver started");

        loop {
            let event = tokio::select! {
                biased;
                input = inputs.recv() => input.unwrap_or_else(|| {
                    debug!("session handle dropped");
                    Event::Shutdown
                }),
                Some(event) = internal.recv() => event,
            };

            let stop = matches!(event, Event::Shutdown);
            trace!(?event, "engine event");
            let effects = self.engine.handle(event, Instant::now());
            for effect in effects {
                self.perform(effect);
            }

            let snapshot = self.engine.snapshot();
            metrics::set_engine_gauges(&snapshot);
            self.snapshots.send_replace(snapshot);

            if stop {
                break;
            }
        }

        self.finish().await
    }

    fn perform(&mut self, effect: Effect) {
        match effect {
            Effect::Remote(command) => {
                if let Some(commands) = &self.commands
                    && commands.send(command).is_err()
                {
                    warn!(command = command.endpoint(), "command worker gone; command dropped");
                }
            }
            Effect::Audio(cue) => self.collaborators.audio.play(cue),
            Effect::Overlay { message, display } => {
                self.collaborators.notifier.show(&message, display);
            }
            Effect::StartCountdown {
                slot,
                from,
                interval,
                generation,
            } => {
                let handle = self.countdown(slot, from, interval, generation);
                self.slots[slot.index()].replace(handle);
            }
            Effect::Schedule {
                slot,
                after,
                generation,
            } => {
                let tx = self.internal_tx.clone();
                let handle = Countdown::once(after, move || {
                    let _ = tx.send(Event::TimerElapsed { slot, generation });
                });
                self.slots[slot.index()].replace(handle);
            }
            Effect::Cancel(slot) => self.slots[slot.index()].cancel(),
            Effect::CancelAll => {
                for slot in TimerSlot::ALL {
                    self.slots[slot.index()].cancel();
                }
            }
            Effect::StartPolling { generation } => self.start_polling(generation),
            Effect::StopPolling => self.stop_polling(),
            Effect::RequestPrediction { request, epoch } => self.request_prediction(request, epoch),
            Effect::Emit(event) => {
                metrics::record_game_event(&event);
                self.collaborators.emitter.emit(event);
            }
        }
    }

    fn countdown(&self, slot: TimerSlot, from: u32, interval: Duration, generation: u64) -> CountdownHandle {
        let tick_tx = self.internal_tx.clone();
        let done_tx = self.internal_tx.clone();
        Countdown::start(
            from,
            interval,
            move |remaining| {
                let _ = tick_tx.send(Event::TimerTick {
                    slot,
                    generation,
                    remaining,
                });
            },
            move || {
                let _ = done_tx.send(Event::TimerElapsed { slot, generation });
            },
        )
    }

    fn start_polling(&mut self, generation: u64) {
        self.stop_polling();
        let cancel = CancellationToken::new();
        tokio::spawn(poll_loop(
            Arc::clone(&self.collaborators.status),
            self.config.timing.poll_interval,
            generation,
            self.internal_tx.clone(),
            cancel.clone(),
        ));
        self.polling = Some(cancel);
        debug!(generation, "status polling started");
    }

    fn stop_polling(&mut self) {
        if let Some(cancel) = self.polling.take() {
            cancel.cancel();
            debug!("status polling stopped");
        }
    }

    fn request_prediction(&self, request: PredictionRequest, epoch: u64) {
        let tx = self.internal_tx.clone();
        let Some(predictor) = self.collaborators.predictor.clone() else {
            let _ = tx.send(Event::PredictionFailed {
                epoch,
                reason: "no predictor configured".to_string(),
            });
            return;
        };
        tokio::spawn(async move {
            let event = match predictor.predict(&request).await {
                Ok(response) => {
                    metrics::record_prediction("ok");
                    Event::PredictionResolved { epoch, response }
                }
                Err(e) => {
                    metrics::record_prediction(e.category());
                    warn!(error = %e, "prediction request failed");
                    Event::PredictionFailed {
                        epoch,
                        reason: e.to_string(),
                    }
                }
            };
            let _ = tx.send(event);
        });
    }

    async fn finish(mut self) -> EngineSnapshot {
        self.stop_polling();
        for slot in &mut self.slots {
            slot.cancel();
        }

        // Closing the queue lets the worker drain what is already queued.
        self.commands = None;
        if let Some(worker) = self.worker.take() {
            match tokio::time::timeout(COMMAND_DRAIN_TIMEOUT, worker).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "command worker panicked"),
                Err(_) => warn!("command worker did not drain within 2s"),
            }
        }

        let snapshot = self.engine.snapshot();
        info!(
            score = snapshot.board.score,
            level = %snapshot.level,
            events = self.collaborators.emitter.event_count(),
            "session driver stopped"
        );
        snapshot
    }
}

/// Polls the device until cancelled.
///
/// A slow response delays the next poll rather than queueing a burst.
/// Results are tagged with `generation` so the engine can drop those
/// that arrive after polling was stopped.
async fn poll_loop(
    source: Arc<dyn StatusSource>,
    every: Duration,
    generation: u64,
    tx: mpsc::UnboundedSender<Event>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = source.status() => result,
        };
        let event = match result {
            Ok(snapshot) => {
                metrics::record_poll("ok");
                Event::PollSucceeded {
                    generation,
                    snapshot,
                }
            }
            Err(e) => {
                metrics::record_poll(e.category());
                Event::PollFailed {
                    generation,
                    reason: e.to_string(),
                }
            }
        };
        if tx.send(event).is_err() {
            break;
        }
    }
    trace!("poll loop exited");
}

/// Sends device commands one at a time, in the order queued.
async fn command_worker(control: Arc<dyn DeviceControl>, mut commands: mpsc::UnboundedReceiver<RemoteCommand>) {
    while let Some(command) = commands.recv().await {
        match control.send(command).await {
            Ok(()) => {
                metrics::record_command(&command, true);
                debug!(command = command.endpoint(), "device command sent");
            }
            Err(e) => {
                metrics::record_command(&command, false);
                warn!(command = command.endpoint(), error = %e, "device command failed");
            }
        }
    }
}
