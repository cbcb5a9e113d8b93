//! In-memory device simulator
//!
//! Serves the device HTTP API (plus the predictor's `predecir`) from a
//! small model of the physical game, so the client can be exercised
//! without hardware. Two extra routes stand in for the player's hands:
//! `GET /pattern` reveals the lit sequence and `POST /press` presses a
//! button.
//!
//! After a round ends the model starts the next one on its own once
//! `advance_after` has passed, which the client observes as a new round.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::engine::prediction::{PredictionRequest, PredictionResponse};
use crate::engine::state::Level;
use crate::engine::sync::{DeviceStatus, StatusSnapshot};
use crate::error::MemoriaError;

/// Default bind address.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";

/// Simulator settings.
#[derive(Debug, Clone)]
pub struct SimulatorOptions {
    /// Address to listen on.
    pub bind_addr: String,
    /// Pattern length at level 1; each level adds one.
    pub pattern_length: usize,
    /// Number of buttons on the device.
    pub buttons: u8,
    /// Time between a round outcome and the next round starting.
    pub advance_after: Duration,
    /// Pattern RNG seed; random when unset.
    pub seed: Option<u64>,
}

impl Default for SimulatorOptions {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            pattern_length: 3,
            buttons: 4,
            advance_after: Duration::from_millis(1500),
            seed: None,
        }
    }
}

// ============================================================================
// Device model
// ============================================================================

/// Result of one button press.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PressOutcome {
    /// Correct button, pattern not finished.
    Accepted,
    /// Correct button, pattern finished.
    Completed,
    /// Wrong button.
    Mistake,
    /// Device was not waiting for input.
    Ignored,
}

#[derive(Debug)]
struct DeviceModel {
    status: DeviceStatus,
    level: Level,
    streak: i64,
    errors: u32,
    pattern: Vec<i64>,
    user_input: Vec<i64>,
    paused: bool,
    outcome_at: Option<Instant>,
    pattern_length: usize,
    buttons: u8,
    advance_after: Duration,
    rng: u64,
}

impl DeviceModel {
    fn new(options: &SimulatorOptions) -> Self {
        let seed = options
            .seed
            .unwrap_or_else(|| uuid::Uuid::new_v4().as_u64_pair().0);
        Self {
            status: DeviceStatus::Idle,
            level: Level::default(),
            streak: 0,
            errors: 0,
            pattern: Vec::new(),
            user_input: Vec::new(),
            paused: false,
            outcome_at: None,
            pattern_length: options.pattern_length.max(1),
            buttons: options.buttons.max(1),
            advance_after: options.advance_after,
            // xorshift must never hold zero
            rng: seed | 1,
        }
    }

    fn next_button(&mut self) -> i64 {
        self.rng ^= self.rng << 13;
        self.rng ^= self.rng >> 7;
        self.rng ^= self.rng << 17;
        i64::try_from(self.rng % u64::from(self.buttons)).unwrap_or(0) + 1
    }

    fn begin_round(&mut self) {
        let length = self.pattern_length + usize::from(self.level.get()) - 1;
        self.pattern = (0..length).map(|_| self.next_button()).collect();
        self.user_input.clear();
        self.errors = 0;
        self.outcome_at = None;
        self.status = DeviceStatus::Memorizing;
        debug!(level = %self.level, length, "simulated round started");
    }

    fn start_game(&mut self, level: Level) {
        self.level = level;
        self.paused = false;
        self.begin_round();
    }

    fn start_turn(&mut self) {
        if self.status == DeviceStatus::Memorizing {
            self.status = DeviceStatus::Playing;
        }
    }

    fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }

    fn reset(&mut self) {
        self.status = DeviceStatus::Idle;
        self.level = Level::default();
        self.streak = 0;
        self.errors = 0;
        self.pattern.clear();
        self.user_input.clear();
        self.paused = false;
        self.outcome_at = None;
    }

    fn press(&mut self, button: i64, now: Instant) -> PressOutcome {
        if self.paused || self.status != DeviceStatus::Playing {
            return PressOutcome::Ignored;
        }
        let expected = self.pattern.get(self.user_input.len()).copied();
        if expected == Some(button) {
            self.user_input.push(button);
            if self.user_input.len() == self.pattern.len() {
                self.status = DeviceStatus::Success;
                self.streak += 1;
                self.outcome_at = Some(now);
                PressOutcome::Completed
            } else {
                PressOutcome::Accepted
            }
        } else {
            self.errors += 1;
            self.status = DeviceStatus::Failed;
            self.streak = 0;
            self.outcome_at = Some(now);
            PressOutcome::Mistake
        }
    }

    /// Starts the next round once the outcome has been shown long enough.
    fn advance(&mut self, now: Instant) {
        if self.paused {
            return;
        }
        if let Some(at) = self.outcome_at
            && now.duration_since(at) >= self.advance_after
        {
            self.begin_round();
        }
    }

    fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            status: self.status,
            level: i64::from(self.level.get()),
            streak: self.streak,
            errors: self.errors,
            user_input: self.user_input.clone(),
        }
    }
}

/// Advice from the simulated predictor.
fn simulated_advice(request: &PredictionRequest) -> &'static str {
    if request.racha >= 3 && request.errores == 0 {
        "SUBIR"
    } else if request.racha <= -2 {
        "BAJAR"
    } else {
        "MANTENER"
    }
}

// ============================================================================
// HTTP surface
// ============================================================================

type SharedModel = Arc<Mutex<DeviceModel>>;

#[derive(Debug, Deserialize)]
struct StartGameBody {
    level: i64,
}

#[derive(Debug, Deserialize)]
struct PressBody {
    button: i64,
}

fn build_router(model: SharedModel) -> Router {
    Router::new()
        .route("/status", get(handle_status))
        .route("/start_game", post(handle_start_game))
        .route("/start_turn", post(handle_start_turn))
        .route("/pause", post(handle_pause))
        .route("/reset", post(handle_reset))
        .route("/pattern", get(handle_pattern))
        .route("/press", post(handle_press))
        .route("/predecir", post(handle_predict))
        .with_state(model)
}

async fn handle_status(State(model): State<SharedModel>) -> Json<StatusSnapshot> {
    let mut model = model.lock().await;
    model.advance(Instant::now());
    Json(model.snapshot())
}

async fn handle_start_game(
    State(model): State<SharedModel>,
    Json(body): Json<StartGameBody>,
) -> Response {
    let level = Level::from_wire(body.level);
    model.lock().await.start_game(level);
    Json(json!({ "ok": true, "level": level })).into_response()
}

async fn handle_start_turn(State(model): State<SharedModel>) -> Response {
    let mut model = model.lock().await;
    model.start_turn();
    Json(json!({ "ok": true, "status": model.status })).into_response()
}

async fn handle_pause(State(model): State<SharedModel>) -> Response {
    let mut model = model.lock().await;
    model.toggle_pause();
    Json(json!({ "ok": true, "paused": model.paused })).into_response()
}

async fn handle_reset(State(model): State<SharedModel>) -> Response {
    model.lock().await.reset();
    Json(json!({ "ok": true })).into_response()
}

async fn handle_pattern(State(model): State<SharedModel>) -> Response {
    let model = model.lock().await;
    Json(json!({ "pattern": model.pattern })).into_response()
}

async fn handle_press(State(model): State<SharedModel>, Json(body): Json<PressBody>) -> Response {
    let mut model = model.lock().await;
    let outcome = model.press(body.button, Instant::now());
    let status = if outcome == PressOutcome::Ignored {
        StatusCode::CONFLICT
    } else {
        StatusCode::OK
    };
    (
        status,
        Json(json!({ "outcome": outcome, "status": model.status })),
    )
        .into_response()
}

async fn handle_predict(Json(request): Json<PredictionRequest>) -> Json<PredictionResponse> {
    let action = simulated_advice(&request);
    debug!(?request, action, "simulated prediction");
    Json(PredictionResponse {
        accion: Some(action.to_string()),
        nuevo_nivel: None,
    })
}

// ============================================================================
// Server
// ============================================================================

/// Running simulator.
pub struct DeviceSimulator {
    model: SharedModel,
    cancel: CancellationToken,
    server: JoinHandle<()>,
}

impl DeviceSimulator {
    /// Binds the simulator and starts serving.
    ///
    /// Returns the simulator and the bound address (useful with port 0).
    ///
    /// # Errors
    ///
    /// Returns [`MemoriaError::Io`] if the listener cannot bind.
    pub async fn bind(
        options: SimulatorOptions,
        cancel: CancellationToken,
    ) -> Result<(Self, SocketAddr), MemoriaError> {
        let listener = TcpListener::bind(&options.bind_addr).await?;
        let bound_addr = listener.local_addr()?;
        let model = Arc::new(Mutex::new(DeviceModel::new(&options)));
        let router = build_router(Arc::clone(&model));

        let server_cancel = cancel.clone();
        let server = tokio::spawn(async move {
            info!(%bound_addr, "device simulator started");
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    server_cancel.cancelled().await;
                })
                .await
                .ok();
            debug!("device simulator shut down");
        });

        Ok((
            Self {
                model,
                cancel,
                server,
            },
            bound_addr,
        ))
    }

    /// Current device status.
    pub async fn status(&self) -> StatusSnapshot {
        let mut model = self.model.lock().await;
        model.advance(Instant::now());
        model.snapshot()
    }

    /// Pattern of the current round.
    pub async fn pattern(&self) -> Vec<i64> {
        self.model.lock().await.pattern.clone()
    }

    /// Presses a button as the player would.
    pub async fn press(&self, button: i64) -> PressOutcome {
        self.model.lock().await.press(button, Instant::now())
    }

    /// Stops serving.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Waits for the server task to finish.
    pub async fn join(self) {
        self.server.await.ok();
    }
}

impl std::fmt::Debug for DeviceSimulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSimulator")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}
