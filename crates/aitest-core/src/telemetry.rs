//! Tracing initialisation for aitest binaries.
//!
//! Logs always go to stderr so stdout stays free for the live view.
//! While a [`LogHold`] is alive, log lines are buffered instead and written
//! out when it drops, so they never interleave with a repainting frame.
//! Calling [`init_tracing`] more than once is harmless; only the first
//! call installs a subscriber.

use std::io::{self, Write};
use std::sync::Mutex;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding an `EnvFilter` directive (e.g. `aitest_core=debug`).
pub const LOG_ENV: &str = "AITEST_LOG";

/// Buffered log output; `None` when logs go straight to stderr.
static HELD: Mutex<Option<Vec<u8>>> = Mutex::new(None);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    /// Newline-delimited JSON.
    Json,
}

fn filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

/// Install the global subscriber.
///
/// `AITEST_LOG`, then `RUST_LOG`, override `level` when set.
pub fn init_tracing(format: LogFormat, level: Level) {
    let env_filter = filter(level);
    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(|| LogWriter).json())
            .try_init()
            .ok(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(|| LogWriter))
            .try_init()
            .ok(),
    };
}

/// Stderr, or the hold buffer while a [`LogHold`] is alive.
struct LogWriter;

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut held = HELD.lock().unwrap_or_else(|e| e.into_inner());
        match held.as_mut() {
            Some(buffer) => {
                buffer.extend_from_slice(buf);
                Ok(buf.len())
            }
            None => io::stderr().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

/// Buffers log output until dropped.
#[must_use = "logs are released as soon as the hold is dropped"]
#[derive(Debug)]
pub struct LogHold {
    owner: bool,
}

/// Hold log output for the guard's lifetime. Nested holds release at the outermost drop.
pub fn hold_logs() -> LogHold {
    let mut held = HELD.lock().unwrap_or_else(|e| e.into_inner());
    let owner = held.is_none();
    if owner {
        *held = Some(Vec::new());
    }
    LogHold { owner }
}

impl Drop for LogHold {
    fn drop(&mut self) {
        if !self.owner {
            return;
        }
        let buffered = HELD.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(bytes) = buffered.filter(|b| !b.is_empty()) {
            let mut stderr = io::stderr().lock();
            let _ = stderr.write_all(&bytes);
            let _ = stderr.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn held_len() -> Option<usize> {
        HELD.lock().unwrap().as_ref().map(Vec::len)
    }

    #[test]
    fn test_hold_buffers_until_dropped() {
        let outer = hold_logs();
        LogWriter.write_all(b"case.failed\n").unwrap();
        assert_eq!(held_len(), Some(12));

        let inner = hold_logs();
        drop(inner);
        assert_eq!(held_len(), Some(12), "inner hold must not release");

        drop(outer);
        assert_eq!(held_len(), None);
    }
}
