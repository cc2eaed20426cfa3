//! Minimal logger.
//!
//! Prints `[elapsed LEVEL target] message` to stderr. Use `init_with_level`
//! to install it once at startup; `level_from_verbosity` maps the usual
//! `-v`/`-q` command-line counts onto a level filter.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

struct StderrLogger {
    level: LevelFilter,
    started: Instant,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let elapsed = self.started.elapsed().as_secs_f64();
        let target = record.target().split("::").next().unwrap_or_default();
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(
            stderr,
            "[{:7.3}s {:>5} {}] {}",
            elapsed,
            record.level(),
            target,
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<StderrLogger> = OnceLock::new();

/// Install the stderr logger with the provided level filter.
///
/// Calling this more than once is a no-op after the first successful
/// initialization.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_none() {
        let logger = LOGGER.get_or_init(|| StderrLogger {
            level,
            started: Instant::now(),
        });
        log::set_logger(logger)?;
        log::set_max_level(level);
    }
    Ok(())
}

/// `Warn` by default, one step louder per `-v`, `Error` only when quiet.
pub fn level_from_verbosity(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Error;
    }
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Install a `tracing` subscriber on stderr.
///
/// `RUST_LOG` wins when set; otherwise events at `level` and above are shown.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool, level: LevelFilter) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(level));
    if json {
        let _ = fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_span_events(FmtSpan::CLOSE)
            .json()
            .flatten_event(true)
            .finish()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_span_events(FmtSpan::CLOSE)
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init();
    }
}

#[cfg(feature = "tracing")]
fn default_filter(level: LevelFilter) -> EnvFilter {
    EnvFilter::new(level.to_string().to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(level_from_verbosity(0, false), LevelFilter::Warn);
        assert_eq!(level_from_verbosity(1, false), LevelFilter::Info);
        assert_eq!(level_from_verbosity(2, false), LevelFilter::Debug);
        assert_eq!(level_from_verbosity(7, false), LevelFilter::Trace);
        assert_eq!(level_from_verbosity(3, true), LevelFilter::Error);
    }

    #[cfg(feature = "tracing")]
    #[test]
    fn tracing_filter_follows_verbosity() {
        let debug = default_filter(level_from_verbosity(2, false));
        assert_eq!(debug.to_string(), "debug");
        let quiet = default_filter(level_from_verbosity(0, true));
        assert_eq!(quiet.to_string(), "error");
    }
}
