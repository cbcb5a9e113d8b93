//! Overlay / toast notifier

use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use tracing::info;

/// Fire-and-forget consumer of overlay messages.
pub trait Notifier: Send + Sync {
    /// Shows `message`, expected to disappear after `expire`.
    fn show(&self, message: &str, expire: Duration);
}

/// Prints overlays as lines on a writer (stderr by default).
pub struct ConsoleNotifier {
    out: Mutex<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for ConsoleNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleNotifier").finish_non_exhaustive()
    }
}

impl ConsoleNotifier {
    /// Notifier writing to `out`.
    #[must_use]
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    /// Notifier writing to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self::new(Box::new(std::io::stderr()))
    }
}

impl Notifier for ConsoleNotifier {
    fn show(&self, message: &str, expire: Duration) {
        info!(message, expire_ms = u64::try_from(expire.as_millis()).unwrap_or(u64::MAX), "overlay");
        if let Ok(mut out) = self.out.lock() {
            let _ = writeln!(out, "  » {message}");
            let _ = out.flush();
        }
    }
}

/// Only logs overlays.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn show(&self, message: &str, expire: Duration) {
        info!(message, expire_ms = u64::try_from(expire.as_millis()).unwrap_or(u64::MAX), "overlay");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn console_writes_one_line_per_overlay() {
        let buffer = Buffer::default();
        let notifier = ConsoleNotifier::new(Box::new(buffer.clone()));
        notifier.show("✅ Ronda completada", Duration::from_secs(2));
        notifier.show("⏰ ¡Tiempo Agotado!", Duration::from_millis(1500));

        let text = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("Ronda completada"));
    }
}
