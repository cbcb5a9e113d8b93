//! `config validate`

use crate::cli::args::ConfigValidateArgs;
use crate::config::loader::{ConfigLoader, LoaderOptions};
use crate::error::MemoriaError;

/// Validate configuration files.
///
/// Stops at the first invalid file.
///
/// # Errors
///
/// Returns an I/O error if a file does not exist, or a config error if
/// validation fails.
pub fn validate(args: &ConfigValidateArgs) -> Result<(), MemoriaError> {
    let loader = ConfigLoader::new(LoaderOptions {
        strict: args.strict,
        ..LoaderOptions::default()
    });

    for path in &args.files {
        if !path.exists() {
            return Err(MemoriaError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("file not found: {}", path.display()),
            )));
        }
        tracing::info!(file = %path.display(), "validating configuration");

        let load_result = loader.load(path)?;
        for warning in &load_result.warnings {
            tracing::warn!(
                location = warning.location.as_deref().unwrap_or("<unknown>"),
                "{}",
                warning.message
            );
        }

        tracing::info!(file = %path.display(), "configuration valid");
    }

    Ok(())
}
