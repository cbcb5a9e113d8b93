//! `play`: interactive terminal session
//!
//! Reads single-key commands from stdin (one per line) and renders a status
//! line whenever the engine snapshot changes. Ctrl-C hard-resets the device
//! before the process exits.

use std::fmt::Write as _;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::cli::args::PlayArgs;
use crate::config::GameConfig;
use crate::config::loader::{ConfigLoader, LoaderOptions};
use crate::device::{HttpDevice, HttpPredictor, Predictor};
use crate::driver::{self, Collaborators};
use crate::engine::state::{EngineSnapshot, Mode};
use crate::error::MemoriaError;
use crate::notify::{AudioSink, ConsoleNotifier, Silent, ToneSynth};
use crate::observability::events::EventEmitter;

const HELP: &str = "Enter: start   p: pause/resume   r: reset   q: quit";

/// Player command typed on stdin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlayerCommand {
    Start,
    TogglePause,
    Reset,
    Quit,
}

fn parse_command(line: &str) -> Option<PlayerCommand> {
    match line.trim().to_ascii_lowercase().as_str() {
        "" | "s" | "start" => Some(PlayerCommand::Start),
        "p" | "pause" => Some(PlayerCommand::TogglePause),
        "r" | "reset" => Some(PlayerCommand::Reset),
        "q" | "quit" | "exit" => Some(PlayerCommand::Quit),
        _ => None,
    }
}

/// Run an interactive session.
///
/// # Errors
///
/// Returns a config error if the configuration is invalid, a device error
/// if a client cannot be built, or an I/O error if the events file cannot
/// be created.
pub async fn run(args: &PlayArgs, quiet: bool, cancel: CancellationToken) -> Result<(), MemoriaError> {
    if let Some(port) = args.metrics_port {
        crate::observability::init_metrics(Some(port))?;
        tracing::info!(port, "Prometheus metrics endpoint started");
    }

    let config = load_config(args)?;
    let collaborators = build_collaborators(&config, args)?;
    let handle = driver::spawn(Arc::new(config), collaborators);
    tracing::info!(session = %handle.session_id(), "session ready");

    if !quiet {
        eprintln!("{HELP}");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut snapshots = handle.subscribe();
    let mut last_line = String::new();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::info!("interrupted; resetting device");
                handle.hard_reset()?;
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    tracing::debug!("stdin closed");
                    break;
                };
                match parse_command(&line) {
                    Some(PlayerCommand::Start) => handle.start()?,
                    Some(PlayerCommand::TogglePause) => handle.toggle_pause()?,
                    Some(PlayerCommand::Reset) => handle.hard_reset()?,
                    Some(PlayerCommand::Quit) => break,
                    None => eprintln!("{HELP}"),
                }
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let rendered = render_status(&snapshots.borrow_and_update());
                if !quiet && rendered != last_line {
                    eprintln!("{rendered}");
                    last_line = rendered;
                }
            }
        }
    }

    let last = handle.shutdown().await?;
    if !quiet {
        eprintln!("final score {} at level {}", last.board.score, last.level);
    }
    Ok(())
}

fn load_config(args: &PlayArgs) -> Result<GameConfig, MemoriaError> {
    let base = if let Some(ref path) = args.config {
        tracing::info!(config = %path.display(), "loading configuration");
        let load_result = ConfigLoader::new(LoaderOptions::default()).load(path)?;
        for warning in &load_result.warnings {
            tracing::warn!(
                location = warning.location.as_deref().unwrap_or("<unknown>"),
                "{}",
                warning.message
            );
        }
        Arc::unwrap_or_clone(load_result.config)
    } else {
        GameConfig::default()
    };
    Ok(apply_overrides(base, args))
}

/// Applies CLI flags on top of the file configuration.
fn apply_overrides(mut config: GameConfig, args: &PlayArgs) -> GameConfig {
    if let Some(ref url) = args.device {
        config.device.base_url.clone_from(url);
    }
    if let Some(ref url) = args.predictor {
        config.predictor.url = Some(url.clone());
        config.predictor.enabled = true;
    }
    if args.no_predictor {
        config.predictor.enabled = false;
    }
    if let Some(level) = args.level {
        config.initial_level = level;
    }
    config
}

fn build_collaborators(config: &GameConfig, args: &PlayArgs) -> Result<Collaborators, MemoriaError> {
    let timeout = config.device.request_timeout;
    let device = Arc::new(HttpDevice::new(&config.device.base_url, timeout)?);

    let predictor: Option<Arc<dyn Predictor>> = if config.predictor.enabled {
        let url = config
            .predictor
            .url
            .as_deref()
            .unwrap_or(&config.device.base_url);
        Some(Arc::new(HttpPredictor::new(url, timeout)?))
    } else {
        None
    };

    let audio: Arc<dyn AudioSink> = if args.mute {
        Arc::new(Silent)
    } else {
        Arc::new(ToneSynth::terminal())
    };

    let emitter = match args.events_file {
        Some(ref path) if path.as_os_str() == "-" => EventEmitter::stderr(),
        Some(ref path) => EventEmitter::from_file(path)?,
        None => EventEmitter::noop(),
    };

    Ok(Collaborators {
        status: device.clone(),
        control: device,
        predictor,
        audio,
        notifier: Arc::new(ConsoleNotifier::stderr()),
        emitter: Arc::new(emitter),
    })
}

/// One-line summary of the engine state.
fn render_status(snapshot: &EngineSnapshot) -> String {
    let mode = match snapshot.mode {
        Mode::Idle => "idle",
        Mode::Playing => "playing",
        Mode::Paused => "paused",
    };
    let mut line = format!(
        "[{mode}/{}] level {} | score {} | streak {:+}",
        snapshot.phase.name(),
        snapshot.level,
        snapshot.board.score,
        snapshot.board.streak
    );
    if let Some(countdown) = snapshot.announcements.countdown {
        let _ = write!(line, " | {countdown}");
    }
    if let Some(turn) = snapshot.turn {
        let _ = write!(line, " | {}s", turn.remaining);
    }
    if let Some(ref prompt) = snapshot.announcements.prompt {
        let _ = write!(line, " | {prompt}");
    }
    if let Some(ref result) = snapshot.announcements.result {
        let _ = write!(line, " | {result}");
    }
    if snapshot.paused_for_message {
        line.push_str(" | …");
    }
    line
}
