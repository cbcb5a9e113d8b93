//! Prediction adapter types
//!
//! Wire format of the difficulty predictor and the rules that turn its
//! answer into a level change.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::AdviceSource;

use super::state::{Level, RoundStats, Scoreboard};

/// Telemetry gathered for one round outcome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundTelemetry {
    /// Level being played.
    pub level: Level,
    /// Session hit count.
    pub hits: u32,
    /// Session error count.
    pub errors: u32,
    /// Time since the device was told to start the round.
    pub elapsed: Duration,
    /// Signed streak after the outcome.
    pub streak: i32,
}

impl RoundTelemetry {
    /// Collects cumulative telemetry from engine state.
    #[must_use]
    pub const fn collect(level: Level, stats: &RoundStats, board: &Scoreboard, elapsed: Duration) -> Self {
        Self {
            level,
            hits: stats.total_hits,
            errors: stats.total_errors,
            elapsed,
            streak: board.streak,
        }
    }
}

/// `POST predecir` request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    /// Current level.
    pub nivel: u8,
    /// Hits.
    pub aciertos: u32,
    /// Errors.
    pub errores: u32,
    /// Elapsed seconds.
    pub tiempo: f64,
    /// Signed streak.
    pub racha: i32,
}

impl From<RoundTelemetry> for PredictionRequest {
    fn from(t: RoundTelemetry) -> Self {
        Self {
            nivel: t.level.get(),
            aciertos: t.hits,
            errores: t.errors,
            tiempo: t.elapsed.as_secs_f64(),
            racha: t.streak,
        }
    }
}

/// `POST predecir` response body.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionResponse {
    /// `SUBIR`, `BAJAR` or `MANTENER`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accion: Option<String>,
    /// Absolute next level.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nuevo_nivel: Option<i64>,
}

impl PredictionResponse {
    /// Interprets the response, preferring the field named by `source`
    /// and falling back to the other one.
    #[must_use]
    pub fn advice(&self, source: AdviceSource) -> Option<LevelAdvice> {
        let from_action = || self.accion.as_deref().and_then(LevelAdvice::from_action);
        let from_level = || self.nuevo_nivel.map(|n| LevelAdvice::Set(Level::from_wire(n)));
        match source {
            AdviceSource::Action => from_action().or_else(from_level),
            AdviceSource::Level => from_level().or_else(from_action),
        }
    }
}

/// Level change suggested by the predictor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelAdvice {
    /// One level up.
    Raise,
    /// One level down.
    Lower,
    /// Stay.
    Keep,
    /// Jump to a given level.
    Set(Level),
}

impl LevelAdvice {
    /// Parses an `accion` value, case-insensitively.
    #[must_use]
    pub fn from_action(action: &str) -> Option<Self> {
        match action.trim().to_ascii_uppercase().as_str() {
            "SUBIR" => Some(Self::Raise),
            "BAJAR" => Some(Self::Lower),
            "MANTENER" => Some(Self::Keep),
            _ => None,
        }
    }

    /// Level after applying the advice to `current`.
    #[must_use]
    pub const fn apply(self, current: Level) -> Level {
        match self {
            Self::Raise => current.raised(),
            Self::Lower => current.lowered(),
            Self::Keep => current,
            Self::Set(level) => level,
        }
    }

    /// Text for the result announcement.
    #[must_use]
    pub fn label(self) -> String {
        match self {
            Self::Raise => "SUBIR".to_string(),
            Self::Lower => "BAJAR".to_string(),
            Self::Keep => "MANTENER".to_string(),
            Self::Set(level) => format!("Nivel {level}"),
        }
    }
}
