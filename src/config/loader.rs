//! Configuration loader
//!
//! Loading pipeline:
//! 1. Size check and UTF-8 BOM strip
//! 2. Environment variable expansion (pre-parse, on raw text)
//! 3. YAML parsing and deserialization to [`GameConfig`]
//! 4. Validation
//! 5. Freeze with `Arc`

use std::path::Path;
use std::sync::Arc;

use crate::config::schema::GameConfig;
use crate::config::validation::Validator;
use crate::error::ConfigError;

// ============================================================================
// Public API
// ============================================================================

/// Default maximum configuration file size in bytes (1 MB).
pub const DEFAULT_MAX_CONFIG_SIZE: usize = 1024 * 1024;

/// Options for the configuration loader.
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    /// Maximum configuration file size in bytes.
    pub max_config_size: usize,

    /// Treat validation warnings as errors.
    pub strict: bool,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            max_config_size: env_or("MEMORIA_MAX_CONFIG_SIZE", DEFAULT_MAX_CONFIG_SIZE),
            strict: false,
        }
    }
}

/// Result of loading a configuration file.
#[derive(Debug)]
pub struct LoadResult {
    /// The loaded and validated configuration.
    pub config: Arc<GameConfig>,

    /// Warnings encountered during loading.
    pub warnings: Vec<LoadWarning>,
}

/// Warning during configuration loading.
#[derive(Debug, Clone)]
pub struct LoadWarning {
    /// Warning message.
    pub message: String,

    /// Location where the warning occurred.
    pub location: Option<String>,
}

/// Configuration loader.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: LoaderOptions,
}

impl ConfigLoader {
    /// Creates a new configuration loader with the given options.
    #[must_use]
    pub const fn new(options: LoaderOptions) -> Self {
        Self { options }
    }

    /// Loads a configuration file and returns the frozen configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read or exceeds the size limit
    /// - An environment reference with `:?` is unset
    /// - YAML parsing fails
    /// - Validation fails
    pub fn load(&self, path: &Path) -> Result<LoadResult, ConfigError> {
        let metadata = std::fs::metadata(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })?;

        let file_size = usize::try_from(metadata.len()).unwrap_or(usize::MAX);
        if file_size > self.options.max_config_size {
            return Err(ConfigError::InvalidValue {
                field: "file_size".to_string(),
                value: format!("{file_size} bytes"),
                expected: format!("at most {} bytes", self.options.max_config_size),
            });
        }

        let raw_content = std::fs::read_to_string(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })?;

        self.load_str(&raw_content, path)
    }

    /// Loads configuration from an in-memory document.
    ///
    /// `source_path` is only used for error messages.
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load), minus file access.
    pub fn load_str(&self, raw: &str, source_path: &Path) -> Result<LoadResult, ConfigError> {
        let mut warnings = Vec::new();

        let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);

        let mut env_sub = EnvSubstitution::new();
        let substituted = env_sub.substitute(raw, source_path)?;
        warnings.extend(env_sub.warnings);

        // An empty document is a valid, all-defaults configuration.
        let config: GameConfig = if substituted.trim().is_empty() {
            GameConfig::default()
        } else {
            serde_yaml::from_str(&substituted).map_err(|e| ConfigError::ParseError {
                path: source_path.to_path_buf(),
                line: e.location().map(|l| l.line()),
                message: e.to_string(),
            })?
        };

        let result = Validator::new().validate(&config);
        let mut errors = result.errors;
        if self.options.strict {
            errors.extend(result.warnings.iter().cloned());
        } else {
            warnings.extend(result.warnings.iter().map(|issue| LoadWarning {
                message: issue.message.clone(),
                location: Some(issue.path.clone()),
            }));
        }

        if !errors.is_empty() {
            return Err(ConfigError::ValidationError {
                path: source_path.display().to_string(),
                errors,
            });
        }

        Ok(LoadResult {
            config: Arc::new(config),
            warnings,
        })
    }
}

// ============================================================================
// Environment Variable Substitution
// ============================================================================

struct EnvSubstitution {
    warnings: Vec<LoadWarning>,
}

impl EnvSubstitution {
    const fn new() -> Self {
        Self {
            warnings: Vec::new(),
        }
    }

    /// Substitutes environment variables in raw YAML text.
    ///
    /// Supports:
    /// - `${VAR}` - expand to value (empty string if unset with warning)
    /// - `${VAR:-default}` - expand to default if unset
    /// - `${VAR:?message}` - fail if unset
    /// - `$$` - literal `$`
    fn substitute(&mut self, raw_yaml: &str, source_path: &Path) -> Result<String, ConfigError> {
        let mut result = String::with_capacity(raw_yaml.len());
        let mut chars = raw_yaml.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '$' {
                result.push(c);
                continue;
            }
            match chars.peek() {
                Some('$') => {
                    chars.next();
                    result.push('$');
                }
                Some('{') => {
                    chars.next();
                    let spec = Self::parse_var_spec(&mut chars, source_path)?;
                    match std::env::var(&spec.name) {
                        Ok(value) => result.push_str(&value),
                        Err(_) => {
                            if let Some(default_val) = spec.default {
                                result.push_str(&default_val);
                            } else if let Some(msg) = spec.error_message {
                                return Err(ConfigError::EnvVarNotSet {
                                    var: spec.name,
                                    location: msg,
                                });
                            } else {
                                self.warnings.push(LoadWarning {
                                    message: format!(
                                        "Environment variable '{}' is not set, using empty string",
                                        spec.name
                                    ),
                                    location: Some(source_path.display().to_string()),
                                });
                            }
                        }
                    }
                }
                _ => result.push(c),
            }
        }

        Ok(result)
    }

    /// Parses a variable specification from `${...}`.
    fn parse_var_spec(
        chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
        source_path: &Path,
    ) -> Result<VarSpec, ConfigError> {
        let mut name = String::new();

        while let Some(c) = chars.next() {
            match c {
                '}' => {
                    return Ok(VarSpec {
                        name,
                        default: None,
                        error_message: None,
                    });
                }
                ':' => match chars.peek() {
                    Some('-') => {
                        chars.next();
                        let default = Self::read_until_close(chars, &name, source_path)?;
                        return Ok(VarSpec {
                            name,
                            default: Some(default),
                            error_message: None,
                        });
                    }
                    Some('?') => {
                        chars.next();
                        let msg = Self::read_until_close(chars, &name, source_path)?;
                        return Ok(VarSpec {
                            name,
                            default: None,
                            error_message: Some(msg),
                        });
                    }
                    _ => name.push(':'),
                },
                _ => name.push(c),
            }
        }

        Err(unclosed(&name, source_path))
    }

    fn read_until_close(
        chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
        name: &str,
        source_path: &Path,
    ) -> Result<String, ConfigError> {
        let mut value = String::new();
        for c in chars.by_ref() {
            if c == '}' {
                return Ok(value);
            }
            value.push(c);
        }
        Err(unclosed(name, source_path))
    }
}

struct VarSpec {
    name: String,
    default: Option<String>,
    error_message: Option<String>,
}

fn unclosed(name: &str, source_path: &Path) -> ConfigError {
    ConfigError::ParseError {
        path: source_path.to_path_buf(),
        line: None,
        message: format!("Unclosed environment variable reference: ${{{name}"),
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use super::*;

    fn load(yaml: &str) -> Result<LoadResult, ConfigError> {
        ConfigLoader::default().load_str(yaml, Path::new("test.yaml"))
    }

    #[test]
    fn loads_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "initial_level: 3\ntiming:\n  turn_duration: 12s").unwrap();

        let result = ConfigLoader::default().load(file.path()).unwrap();
        assert_eq!(result.config.initial_level, 3);
        assert_eq!(result.config.timing.turn_duration, Duration::from_secs(12));
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn missing_file_is_reported() {
        let err = ConfigLoader::default()
            .load(Path::new("/definitely/not/here.yaml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingFile { .. }));
    }

    #[test]
    fn oversized_file_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "initial_level: 2").unwrap();
        let loader = ConfigLoader::new(LoaderOptions {
            max_config_size: 4,
            strict: false,
        });
        let err = loader.load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn empty_document_is_default() {
        let result = load("").unwrap();
        assert_eq!(*result.config, GameConfig::default());
    }

    #[test]
    fn bom_is_stripped() {
        let result = load("\u{feff}initial_level: 2\n").unwrap();
        assert_eq!(result.config.initial_level, 2);
    }

    #[test]
    fn env_default_is_used_when_unset() {
        let yaml = "device:\n  base_url: ${MEMORIA_TEST_SURELY_UNSET_URL:-http://10.0.0.7:8000}\n";
        let result = load(yaml).unwrap();
        assert_eq!(result.config.device.base_url, "http://10.0.0.7:8000");
    }

    #[test]
    fn env_required_fails_when_unset() {
        let yaml = "device:\n  base_url: ${MEMORIA_TEST_SURELY_UNSET_URL:?device.base_url}\n";
        let err = load(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::EnvVarNotSet { .. }));
    }

    #[test]
    fn env_unset_without_default_warns() {
        let yaml = "messages:\n  round_won: \"ok${MEMORIA_TEST_SURELY_UNSET_SUFFIX}\"\n";
        let result = load(yaml).unwrap();
        assert_eq!(result.config.messages.round_won, "ok");
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn dollar_escape_is_literal() {
        let yaml = "messages:\n  round_won: \"$$10\"\n";
        let result = load(yaml).unwrap();
        assert_eq!(result.config.messages.round_won, "$10");
    }

    #[test]
    fn unclosed_reference_is_parse_error() {
        let err = load("device:\n  base_url: ${OOPS\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn yaml_error_carries_line() {
        let err = load("timing:\n  poll_interval: [\n").unwrap_err();
        let ConfigError::ParseError { line, .. } = err else {
            panic!("expected parse error, got {err:?}");
        };
        assert!(line.is_some());
    }

    #[test]
    fn validation_errors_fail_the_load() {
        let err = load("timing:\n  poll_interval: 0s\n").unwrap_err();
        let ConfigError::ValidationError { errors, .. } = err else {
            panic!("expected validation error, got {err:?}");
        };
        assert!(errors.iter().any(|e| e.path == "timing.poll_interval"));
    }

    #[test]
    fn strict_mode_promotes_warnings() {
        let loader = ConfigLoader::new(LoaderOptions {
            strict: true,
            ..LoaderOptions::default()
        });
        let err = loader
            .load_str("initial_level: 9\n", Path::new("strict.yaml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));

        let lenient = load("initial_level: 9\n").unwrap();
        assert_eq!(lenient.warnings.len(), 1);
    }
}
