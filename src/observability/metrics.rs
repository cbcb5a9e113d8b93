//! Metrics collection.
//!
//! Prometheus-compatible metrics through the `metrics` facade. Every
//! recording function is a no-op until [`init_metrics`] installs a
//! recorder.

use std::sync::atomic::{AtomicBool, Ordering};

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::engine::machine::RemoteCommand;
use crate::engine::state::EngineSnapshot;
use crate::error::MemoriaError;
use crate::observability::events::Event;

/// Guard to prevent double-initialization of the metrics recorder.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initializes the global metrics recorder.
///
/// With `Some(port)` a Prometheus HTTP listener is started on
/// `127.0.0.1:<port>`; with `None` metrics are only recorded in-process.
///
/// # Errors
///
/// Returns `MemoriaError::Io` if the recorder or listener cannot be
/// installed (e.g. port already in use).
pub fn init_metrics(port: Option<u16>) -> Result<(), MemoriaError> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        tracing::debug!("metrics already initialized, skipping");
        return Ok(());
    }
    port.map_or_else(
        || PrometheusBuilder::new().install_recorder().map(|_| ()),
        |p| {
            PrometheusBuilder::new()
                .with_http_listener(([127, 0, 0, 1], p))
                .install()
        },
    )
    .map_err(|e| MemoriaError::Io(std::io::Error::other(e.to_string())))?;

    describe_metrics();
    Ok(())
}

fn describe_metrics() {
    describe_counter!("memoria_polls_total", "Device status polls by outcome");
    describe_counter!("memoria_rounds_total", "Finished rounds by outcome");
    describe_counter!(
        "memoria_commands_total",
        "Device commands sent by command and status"
    );
    describe_counter!("memoria_predictions_total", "Predictor calls by outcome");
    describe_counter!(
        "memoria_phase_transitions_total",
        "Round phase transitions by target phase"
    );
    describe_gauge!("memoria_score", "Current score");
    describe_gauge!("memoria_level", "Current level");
    describe_gauge!("memoria_streak", "Current signed streak");
}

/// Records a status poll. `outcome` is `"ok"` or an error category.
pub fn record_poll(outcome: &'static str) {
    counter!("memoria_polls_total", "outcome" => outcome).increment(1);
}

/// Records a device command result.
pub fn record_command(command: &RemoteCommand, success: bool) {
    let status = if success { "ok" } else { "error" };
    counter!(
        "memoria_commands_total",
        "command" => command.endpoint(),
        "status" => status,
    )
    .increment(1);
}

/// Records a predictor call. `outcome` is `"ok"` or an error category.
pub fn record_prediction(outcome: &'static str) {
    counter!("memoria_predictions_total", "outcome" => outcome).increment(1);
}

/// Updates counters derived from a game event.
pub fn record_game_event(event: &Event) {
    match event {
        Event::RoundWon { .. } => {
            counter!("memoria_rounds_total", "outcome" => "won").increment(1);
        }
        Event::RoundLost { .. } => {
            counter!("memoria_rounds_total", "outcome" => "lost").increment(1);
        }
        Event::TurnTimedOut { .. } => {
            counter!("memoria_rounds_total", "outcome" => "timeout").increment(1);
        }
        Event::PhaseEntered { phase, .. } => {
            counter!(
                "memoria_phase_transitions_total",
                "to" => sanitize_phase_label(phase)
            )
            .increment(1);
        }
        _ => {}
    }
}

/// Sets the score, level and streak gauges.
pub fn set_engine_gauges(snapshot: &EngineSnapshot) {
    gauge!("memoria_score").set(f64::from(snapshot.board.score));
    gauge!("memoria_level").set(f64::from(snapshot.level.get()));
    gauge!("memoria_streak").set(f64::from(snapshot.board.streak));
}

/// Known phase names; anything else is bucketed as `"__unknown__"`.
const KNOWN_PHASES: [&str; 5] = ["idle", "preparing", "memorizing", "player_turn", "evaluating"];

fn sanitize_phase_label(name: &str) -> &'static str {
    KNOWN_PHASES
        .iter()
        .find(|known| **known == name)
        .copied()
        .unwrap_or("__unknown__")
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn phase_labels_are_bounded() {
        assert_eq!(sanitize_phase_label("memorizing"), "memorizing");
        assert_eq!(sanitize_phase_label(&"x".repeat(500)), "__unknown__");
    }

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        record_poll("ok");
        record_poll("timeout");
        record_command(&RemoteCommand::StartTurn, true);
        record_prediction("decode");
        record_game_event(&Event::PhaseEntered {
            timestamp: Utc::now(),
            phase: "player_turn".to_owned(),
            level: 2,
        });
        set_engine_gauges(&EngineSnapshot::default());
    }
}
