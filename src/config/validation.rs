//! Configuration validation
//!
//! Semantic checks run on a fully deserialized [`GameConfig`]. Validation
//! collects every issue instead of stopping at the first one.

use std::collections::HashSet;
use std::time::Duration;

use crate::config::schema::GameConfig;
use crate::engine::state::Level;
use crate::error::{Severity, ValidationIssue};

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Validation errors (prevent loading).
    pub errors: Vec<ValidationIssue>,

    /// Validation warnings (informational).
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Returns `true` if validation passed (no errors).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Configuration validator.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
}

impl Validator {
    /// Creates a new validator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates a configuration and returns the result.
    pub fn validate(&mut self, config: &GameConfig) -> ValidationResult {
        self.errors.clear();
        self.warnings.clear();

        self.validate_level(config);
        self.validate_endpoints(config);
        self.validate_timing(config);
        self.validate_scoring(config);

        ValidationResult {
            errors: std::mem::take(&mut self.errors),
            warnings: std::mem::take(&mut self.warnings),
        }
    }

    fn validate_level(&mut self, config: &GameConfig) {
        let level = config.initial_level;
        if !(Level::MIN..=Level::MAX).contains(&level) {
            self.add_warning(
                "initial_level",
                format!(
                    "level {level} is outside {}..={} and will be clamped to {}",
                    Level::MIN,
                    Level::MAX,
                    Level::new(level).get()
                ),
            );
        }
    }

    fn validate_endpoints(&mut self, config: &GameConfig) {
        if !is_http_url(&config.device.base_url) {
            self.add_error(
                "device.base_url",
                format!("'{}' must be an http:// or https:// URL", config.device.base_url),
            );
        }
        if config.device.request_timeout.is_zero() {
            self.add_error("device.request_timeout", "timeout must be greater than zero");
        }
        if let Some(url) = &config.predictor.url
            && !is_http_url(url)
        {
            self.add_error(
                "predictor.url",
                format!("'{url}' must be an http:// or https:// URL"),
            );
        }
    }

    fn validate_timing(&mut self, config: &GameConfig) {
        let timing = &config.timing;
        self.require_nonzero("timing.poll_interval", timing.poll_interval);
        self.require_nonzero("timing.tick_interval", timing.tick_interval);
        self.require_nonzero("timing.turn_duration", timing.turn_duration);

        if timing.memorize.is_empty() {
            self.add_error("timing.memorize", "at least one memorize duration is required");
        } else if timing.memorize.len() < usize::from(Level::MAX) {
            self.add_warning(
                "timing.memorize",
                format!(
                    "{} entries for {} levels; the last entry covers the rest",
                    timing.memorize.len(),
                    Level::MAX
                ),
            );
        }

        if timing.poll_interval > timing.turn_duration {
            self.add_warning(
                "timing.poll_interval",
                "poll interval is longer than the player turn; outcomes may be missed",
            );
        }
    }

    fn validate_scoring(&mut self, config: &GameConfig) {
        let scoring = &config.scoring;
        if !scoring.streak_milestones.is_empty() && config.messages.milestone.is_empty() {
            self.add_error(
                "messages.milestone",
                "streak milestones are configured but no milestone messages exist",
            );
        }
        if config.messages.consolation.is_empty() {
            self.add_warning(
                "messages.consolation",
                "no consolation messages; loss streaks fall back to the default overlay",
            );
        }
        if scoring.streak_milestones.contains(&0) {
            self.add_error("scoring.streak_milestones", "milestones must be positive");
        }

        let mut seen = HashSet::new();
        for (i, milestone) in scoring.score_milestones.iter().enumerate() {
            if !seen.insert(milestone.score) {
                self.add_warning(
                    format!("scoring.score_milestones[{i}]"),
                    format!("duplicate score milestone {}", milestone.score),
                );
            }
        }
    }

    fn require_nonzero(&mut self, path: &str, value: Duration) {
        if value.is_zero() {
            self.add_error(path, "duration must be greater than zero");
        }
    }

    fn add_error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationIssue {
            path: path.into(),
            message: message.into(),
            severity: Severity::Error,
        });
    }

    fn add_warning(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ValidationIssue {
            path: path.into(),
            message: message.into(),
            severity: Severity::Warning,
        });
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ScoreMilestone;

    fn validate(config: &GameConfig) -> ValidationResult {
        Validator::new().validate(config)
    }

    #[test]
    fn default_config_is_valid_without_warnings() {
        let result = validate(&GameConfig::default());
        assert!(result.is_valid(), "{:?}", result.errors);
        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
    }

    #[test]
    fn out_of_range_level_warns() {
        let config = GameConfig {
            initial_level: 0,
            ..GameConfig::default()
        };
        let result = validate(&config);
        assert!(result.is_valid());
        assert_eq!(result.warnings[0].path, "initial_level");
    }

    #[test]
    fn bad_device_url_is_error() {
        let mut config = GameConfig::default();
        config.device.base_url = "localhost:8000".to_string();
        config.predictor.url = Some("ftp://x".to_string());
        let result = validate(&config);
        let paths: Vec<_> = result.errors.iter().map(|e| e.path.as_str()).collect();
        assert!(paths.contains(&"device.base_url"));
        assert!(paths.contains(&"predictor.url"));
    }

    #[test]
    fn zero_durations_are_errors() {
        let mut config = GameConfig::default();
        config.timing.tick_interval = Duration::ZERO;
        config.timing.turn_duration = Duration::ZERO;
        let result = validate(&config);
        assert_eq!(result.errors.len(), 2);
    }

    #[test]
    fn empty_memorize_is_error_and_short_list_warns() {
        let mut config = GameConfig::default();
        config.timing.memorize.clear();
        assert!(!validate(&config).is_valid());

        config.timing.memorize = vec![Duration::from_secs(4)];
        let result = validate(&config);
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.path == "timing.memorize"));
    }

    #[test]
    fn milestones_without_messages_is_error() {
        let mut config = GameConfig::default();
        config.messages.milestone.clear();
        let result = validate(&config);
        assert!(result.errors.iter().any(|e| e.path == "messages.milestone"));
    }

    #[test]
    fn duplicate_score_milestones_warn() {
        let mut config = GameConfig::default();
        config.scoring.score_milestones.push(ScoreMilestone {
            score: 50,
            message: "again".to_string(),
        });
        let result = validate(&config);
        assert!(result.is_valid());
        assert!(
            result
                .warnings
                .iter()
                .any(|w| w.path == "scoring.score_milestones[2]")
        );
    }
}
