//! Configuration schema
//!
//! Typed representation of a `Memoria` YAML configuration file. Every
//! field has a default, so an empty document yields a playable setup
//! against a device on `localhost:8000`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ============================================================================
// Root
// ============================================================================

/// Root configuration for a play session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GameConfig {
    /// Level the session starts at (clamped to `1..=5` at use).
    pub initial_level: u8,

    /// Game device endpoint settings.
    pub device: DeviceConfig,

    /// Difficulty predictor settings.
    pub predictor: PredictorConfig,

    /// Phase, polling and overlay timings.
    pub timing: TimingConfig,

    /// Score and streak rules.
    pub scoring: ScoringConfig,

    /// Player-facing messages.
    pub messages: MessageConfig,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            initial_level: 1,
            device: DeviceConfig::default(),
            predictor: PredictorConfig::default(),
            timing: TimingConfig::default(),
            scoring: ScoringConfig::default(),
            messages: MessageConfig::default(),
        }
    }
}

// ============================================================================
// Device / Predictor
// ============================================================================

/// Where the game device lives and how long to wait for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceConfig {
    /// Base URL of the device HTTP API.
    pub base_url: String,

    /// Per-request timeout for status polls and commands.
    #[serde(with = "duration_str")]
    pub request_timeout: Duration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            request_timeout: Duration::from_secs(2),
        }
    }
}

/// Which field of a predictor response decides the next level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdviceSource {
    /// Read `accion` (`SUBIR` / `BAJAR` / `MANTENER`), fall back to `nuevo_nivel`.
    #[default]
    Action,
    /// Read `nuevo_nivel`, fall back to `accion`.
    Level,
}

/// Adaptive-difficulty predictor settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PredictorConfig {
    /// Whether round telemetry is sent to the predictor at all.
    pub enabled: bool,

    /// Base URL of the predictor; the device base URL when absent.
    pub url: Option<String>,

    /// Which response field drives the level change.
    pub source: AdviceSource,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: None,
            source: AdviceSource::Action,
        }
    }
}

// ============================================================================
// Timing
// ============================================================================

/// Phase, polling and overlay timings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimingConfig {
    /// Status poll period while playing.
    #[serde(with = "duration_str")]
    pub poll_interval: Duration,

    /// Number of ticks in the prepare countdown.
    pub prepare_ticks: u32,

    /// Interval between countdown ticks.
    #[serde(with = "duration_str")]
    pub tick_interval: Duration,

    /// Memorize duration per level, index 0 is level 1. The last entry
    /// covers any level beyond the list.
    #[serde(with = "duration_list")]
    pub memorize: Vec<Duration>,

    /// Length of the player turn.
    #[serde(with = "duration_str")]
    pub turn_duration: Duration,

    /// Delay between a turn timeout and the restarted round.
    #[serde(with = "duration_str")]
    pub timeout_grace: Duration,

    /// How long a motivational message holds round progression.
    #[serde(with = "duration_str")]
    pub motivation_hold: Duration,

    /// Default overlay display time.
    #[serde(with = "duration_str")]
    pub overlay: Duration,

    /// Overlay display time for the time-up message.
    #[serde(with = "duration_str")]
    pub timeout_overlay: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(300),
            prepare_ticks: 3,
            tick_interval: Duration::from_secs(1),
            memorize: vec![
                Duration::from_secs(3),
                Duration::from_secs(4),
                Duration::from_secs(5),
                Duration::from_secs(6),
                Duration::from_secs(7),
            ],
            turn_duration: Duration::from_secs(10),
            timeout_grace: Duration::from_secs(2),
            motivation_hold: Duration::from_secs(3),
            overlay: Duration::from_secs(2),
            timeout_overlay: Duration::from_millis(1500),
        }
    }
}

impl TimingConfig {
    /// Memorize duration for a 1-based level.
    #[must_use]
    pub fn memorize_for(&self, level: u8) -> Duration {
        let index = usize::from(level.saturating_sub(1));
        self.memorize
            .get(index)
            .or_else(|| self.memorize.last())
            .copied()
            .unwrap_or(Duration::from_secs(5))
    }

    /// Turn duration in whole countdown ticks (at least one).
    #[must_use]
    pub fn turn_ticks(&self) -> u32 {
        let tick = self.tick_interval.as_millis().max(1);
        let ticks = self.turn_duration.as_millis().div_ceil(tick);
        u32::try_from(ticks).unwrap_or(u32::MAX).max(1)
    }
}

// ============================================================================
// Scoring
// ============================================================================

/// A score value that triggers a congratulatory overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScoreMilestone {
    /// Score that triggers the message.
    pub score: u32,
    /// Overlay text.
    pub message: String,
}

/// Score and streak rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScoringConfig {
    /// Points added for a won round.
    pub reward: u32,

    /// Points removed for a lost or timed-out round.
    pub penalty: u32,

    /// Win-streak values that show a milestone message and hold progression.
    pub streak_milestones: Vec<u32>,

    /// Scores that show a congratulatory overlay.
    pub score_milestones: Vec<ScoreMilestone>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            reward: 10,
            penalty: 5,
            streak_milestones: vec![3, 5, 10, 15, 20],
            score_milestones: vec![
                ScoreMilestone {
                    score: 50,
                    message: "🎉 Llegaste a 50 puntos".to_string(),
                },
                ScoreMilestone {
                    score: 100,
                    message: "🏆 ¡100 puntos!".to_string(),
                },
            ],
        }
    }
}

// ============================================================================
// Messages
// ============================================================================

/// Player-facing text. `{level}` is replaced in the level templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MessageConfig {
    /// Win-streak milestone messages, ordered by streak size.
    pub milestone: Vec<String>,
    /// Loss-streak consolation messages, ordered by loss count.
    pub consolation: Vec<String>,
    /// Default overlay after a won round.
    pub round_won: String,
    /// Default overlay after a lost round.
    pub round_lost: String,
    /// Overlay when the turn timer runs out.
    pub time_up: String,
    /// Toast shown when the device is told to start.
    pub game_started: String,
    /// Prompt during the prepare countdown.
    pub preparing: String,
    /// Prompt during the memorize phase.
    pub memorize: String,
    /// Prompt during the player turn.
    pub your_turn: String,
    /// Prompt while a round result is being evaluated.
    pub evaluating: String,
    /// Result announcement while the prediction is outstanding.
    pub result_pending: String,
    /// Overlay template when the level rises.
    pub level_up: String,
    /// Overlay template when the level falls.
    pub level_down: String,
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            milestone: vec![
                "🔥 ¡Vas en racha!".to_string(),
                "⚡ ¡Imparable! Cinco seguidas".to_string(),
                "🌟 ¡Diez aciertos seguidos!".to_string(),
                "🏅 ¡Memoria de élite!".to_string(),
                "👑 ¡Leyenda de los patrones!".to_string(),
            ],
            consolation: vec![
                "💪 No te rindas, tú puedes".to_string(),
                "🧘 Respira y observa con calma".to_string(),
                "🎯 Concéntrate en el primer color".to_string(),
            ],
            round_won: "✅ Ronda completada".to_string(),
            round_lost: "❌ Fallaste el patrón".to_string(),
            time_up: "⏰ ¡Tiempo Agotado!".to_string(),
            game_started: "🎮 Juego iniciado".to_string(),
            preparing: "Preparando...".to_string(),
            memorize: "Memoriza el patrón".to_string(),
            your_turn: "¡Repite el patrón!".to_string(),
            evaluating: "Evaluando...".to_string(),
            result_pending: "Pendiente...".to_string(),
            level_up: "🚀 Subiste a nivel {level}".to_string(),
            level_down: "💪 Puedes recuperar el nivel {level}".to_string(),
        }
    }
}

impl MessageConfig {
    /// Renders a level template.
    #[must_use]
    pub fn render_level(template: &str, level: u8) -> String {
        template.replace("{level}", &level.to_string())
    }
}

// ============================================================================
// Duration (de)serialization
// ============================================================================

/// Serde adapter for human-readable durations (`"300ms"`, `"10s"`).
pub mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    /// Serializes a duration as a humantime string.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    /// Deserializes a duration from a humantime string.
    ///
    /// # Errors
    ///
    /// Returns a custom error when the string is not a valid duration.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(raw.trim())
            .map_err(|e| serde::de::Error::custom(format!("invalid duration '{raw}': {e}")))
    }
}

/// Serde adapter for lists of human-readable durations.
pub mod duration_list {
    use std::time::Duration;

    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serializes durations as a list of humantime strings.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(values: &[Duration], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for value in values {
            seq.serialize_element(&humantime::format_duration(*value).to_string())?;
        }
        seq.end()
    }

    /// Deserializes a list of humantime strings.
    ///
    /// # Errors
    ///
    /// Returns a custom error naming the first invalid entry.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Duration>, D::Error> {
        Vec::<String>::deserialize(deserializer)?
            .iter()
            .map(|raw| {
                humantime::parse_duration(raw.trim()).map_err(|e| {
                    serde::de::Error::custom(format!("invalid duration '{raw}': {e}"))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config: GameConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, GameConfig::default());
        assert_eq!(config.timing.poll_interval, Duration::from_millis(300));
        assert_eq!(config.scoring.streak_milestones, vec![3, 5, 10, 15, 20]);
    }

    #[test]
    fn durations_parse_from_strings() {
        let yaml = r"
timing:
  poll_interval: 250ms
  turn_duration: 15s
  memorize: [2s, 2500ms]
";
        let config: GameConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.timing.poll_interval, Duration::from_millis(250));
        assert_eq!(config.timing.turn_duration, Duration::from_secs(15));
        assert_eq!(
            config.timing.memorize,
            vec![Duration::from_secs(2), Duration::from_millis(2500)]
        );
    }

    #[test]
    fn invalid_duration_is_rejected() {
        let yaml = "timing:\n  poll_interval: soon\n";
        let err = serde_yaml::from_str::<GameConfig>(yaml).unwrap_err();
        assert!(err.to_string().contains("invalid duration"));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let yaml = "device:\n  base_ur: http://x\n";
        assert!(serde_yaml::from_str::<GameConfig>(yaml).is_err());
    }

    #[test]
    fn memorize_grows_with_level() {
        let timing = TimingConfig::default();
        assert!(timing.memorize_for(1) < timing.memorize_for(5));
        assert_eq!(timing.memorize_for(1), Duration::from_secs(3));
    }

    #[test]
    fn memorize_reuses_last_entry_past_the_list() {
        let timing = TimingConfig {
            memorize: vec![Duration::from_secs(2), Duration::from_secs(4)],
            ..TimingConfig::default()
        };
        assert_eq!(timing.memorize_for(5), Duration::from_secs(4));
        assert_eq!(timing.memorize_for(0), Duration::from_secs(2));
    }

    #[test]
    fn turn_ticks_rounds_up() {
        let timing = TimingConfig {
            turn_duration: Duration::from_millis(10_500),
            ..TimingConfig::default()
        };
        assert_eq!(timing.turn_ticks(), 11);
        assert_eq!(TimingConfig::default().turn_ticks(), 10);
    }

    #[test]
    fn advice_source_parses_snake_case() {
        let yaml = "predictor:\n  source: level\n";
        let config: GameConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.predictor.source, AdviceSource::Level);
    }

    #[test]
    fn level_template_renders() {
        assert_eq!(
            MessageConfig::render_level("🚀 Subiste a nivel {level}", 3),
            "🚀 Subiste a nivel 3"
        );
    }

    #[test]
    fn config_round_trips_through_yaml() {
        let yaml = serde_yaml::to_string(&GameConfig::default()).unwrap();
        let parsed: GameConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, GameConfig::default());
    }
}
