//! Score & motivation rules
//!
//! Decides which overlay follows a round outcome and whether it holds
//! round progression while it is displayed.

use std::time::Duration;

use serde::Serialize;

use crate::config::GameConfig;

use super::state::Scoreboard;

/// Why a motivational overlay was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MotivationKind {
    /// Win streak hit a configured milestone.
    Milestone,
    /// Loss streak reached a positive even count.
    Consolation,
    /// No threshold hit; plain outcome overlay.
    Outcome,
}

/// Overlay chosen after a round outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Motivation {
    /// Selection reason.
    pub kind: MotivationKind,
    /// Overlay text.
    pub message: String,
    /// Display time.
    pub display: Duration,
    /// Whether round progression is held for `display`.
    pub holds: bool,
}

/// The overlay used when no threshold is hit.
#[derive(Debug, Clone, Copy)]
pub struct OutcomeOverlay<'a> {
    /// Overlay text.
    pub message: &'a str,
    /// Display time.
    pub display: Duration,
}

/// Chooses the overlay after a win. `board` is already updated.
#[must_use]
pub fn after_win(config: &GameConfig, board: &Scoreboard, fallback: OutcomeOverlay<'_>) -> Motivation {
    let streak = board.win_streak();
    if config.scoring.streak_milestones.contains(&streak)
        && let Some(message) = pick(&config.messages.milestone, streak)
    {
        return holding(MotivationKind::Milestone, message, config.timing.motivation_hold);
    }
    outcome(fallback)
}

/// Chooses the overlay after a loss or timeout. `board` is already updated.
#[must_use]
pub fn after_loss(config: &GameConfig, board: &Scoreboard, fallback: OutcomeOverlay<'_>) -> Motivation {
    let losses = board.loss_streak;
    if losses > 0
        && losses % 2 == 0
        && let Some(message) = pick(&config.messages.consolation, losses)
    {
        return holding(MotivationKind::Consolation, message, config.timing.motivation_hold);
    }
    outcome(fallback)
}

/// Returns the message of the first score milestone crossed going from
/// `before` to `after`.
#[must_use]
pub fn score_milestone(config: &GameConfig, before: u32, after: u32) -> Option<&str> {
    config
        .scoring
        .score_milestones
        .iter()
        .find(|m| before < m.score && m.score <= after)
        .map(|m| m.message.as_str())
}

/// `messages[min(count / 5, len - 1)]`
fn pick(messages: &[String], count: u32) -> Option<&str> {
    let last = messages.len().checked_sub(1)?;
    let index = usize::try_from(count / 5).unwrap_or(usize::MAX).min(last);
    messages.get(index).map(String::as_str)
}

fn holding(kind: MotivationKind, message: &str, hold: Duration) -> Motivation {
    Motivation {
        kind,
        message: message.to_string(),
        display: hold,
        holds: true,
    }
}

fn outcome(fallback: OutcomeOverlay<'_>) -> Motivation {
    Motivation {
        kind: MotivationKind::Outcome,
        message: fallback.message.to_string(),
        display: fallback.display,
        holds: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FALLBACK: OutcomeOverlay<'static> = OutcomeOverlay {
        message: "ok",
        display: Duration::from_secs(2),
    };

    fn board_after_wins(n: u32) -> Scoreboard {
        let mut board = Scoreboard::default();
        for _ in 0..n {
            board.record_win(10);
        }
        board
    }

    fn board_after_losses(n: u32) -> Scoreboard {
        let mut board = Scoreboard::default();
        for _ in 0..n {
            board.record_loss(5);
        }
        board
    }

    #[test]
    fn milestone_index_follows_streak() {
        let config = GameConfig::default();
        let msgs = &config.messages.milestone;

        let at3 = after_win(&config, &board_after_wins(3), FALLBACK);
        assert_eq!(at3.kind, MotivationKind::Milestone);
        assert_eq!(at3.message, msgs[0]);
        assert!(at3.holds);

        assert_eq!(after_win(&config, &board_after_wins(5), FALLBACK).message, msgs[1]);
        assert_eq!(after_win(&config, &board_after_wins(10), FALLBACK).message, msgs[2]);
        assert_eq!(after_win(&config, &board_after_wins(20), FALLBACK).message, msgs[4]);
    }

    #[test]
    fn index_is_capped_at_list_end() {
        let mut config = GameConfig::default();
        config.messages.milestone.truncate(2);
        config.scoring.streak_milestones = vec![20];
        let m = after_win(&config, &board_after_wins(20), FALLBACK);
        assert_eq!(m.message, config.messages.milestone[1]);
    }

    #[test]
    fn non_milestone_win_is_plain_overlay() {
        let config = GameConfig::default();
        let m = after_win(&config, &board_after_wins(4), FALLBACK);
        assert_eq!(m.kind, MotivationKind::Outcome);
        assert_eq!(m.message, "ok");
        assert!(!m.holds);
    }

    #[test]
    fn consolation_on_even_loss_streak() {
        let config = GameConfig::default();
        assert!(!after_loss(&config, &board_after_losses(1), FALLBACK).holds);

        let two = after_loss(&config, &board_after_losses(2), FALLBACK);
        assert_eq!(two.kind, MotivationKind::Consolation);
        assert_eq!(two.message, config.messages.consolation[0]);

        assert!(!after_loss(&config, &board_after_losses(3), FALLBACK).holds);
        let ten = after_loss(&config, &board_after_losses(10), FALLBACK);
        assert_eq!(ten.message, config.messages.consolation[2]);
    }

    #[test]
    fn empty_message_lists_fall_back() {
        let mut config = GameConfig::default();
        config.messages.milestone.clear();
        config.messages.consolation.clear();
        assert!(!after_win(&config, &board_after_wins(3), FALLBACK).holds);
        assert!(!after_loss(&config, &board_after_losses(2), FALLBACK).holds);
    }

    #[test]
    fn score_milestones_trigger_on_crossing() {
        let config = GameConfig::default();
        assert!(score_milestone(&config, 40, 50).is_some());
        assert!(score_milestone(&config, 45, 55).is_some());
        assert!(score_milestone(&config, 50, 60).is_none());
        assert_eq!(score_milestone(&config, 95, 105), Some("🏆 ¡100 puntos!"));
    }
}
