//! Logging infrastructure for update-vars
//!
//! This module provides logging via the `log` crate, outputting to the
//! firmware console. Operator-facing errors are printed separately with
//! [`crate::console_println!`] so they show up at any log level.

use log::{Level, LevelFilter, Metadata, Record};

/// Default maximum level
const DEFAULT_LEVEL: LevelFilter = LevelFilter::Info;

/// Console logger implementation
struct ConsoleLogger;

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            // Format: [LEVEL] target: message
            crate::console_println!(
                "[{}] {}: {}",
                level_tag(record.level()),
                record.target(),
                record.args()
            );
        }
    }

    fn flush(&self) {}
}

/// Fixed-width level tag
///
/// Plain text: the console's text output prints a bare ESC as `?`, so no
/// colour codes.
fn level_tag(level: Level) -> &'static str {
    match level {
        Level::Error => "ERROR",
        Level::Warn => "WARN ",
        Level::Info => "INFO ",
        Level::Debug => "DEBUG",
        Level::Trace => "TRACE",
    }
}

static LOGGER: ConsoleLogger = ConsoleLogger;

/// Initialize the logging subsystem
///
/// Does nothing if a logger is already installed.
pub fn init() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(DEFAULT_LEVEL);
    }
}

/// Set the maximum log level
pub fn set_level(level: LevelFilter) {
    log::set_max_level(level);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_tags_are_plain_text() {
        for level in [Level::Error, Level::Warn, Level::Info, Level::Debug, Level::Trace] {
            let tag = level_tag(level);
            assert_eq!(tag.len(), 5, "{:?}", level);
            assert!(tag.chars().all(|c| c.is_ascii_uppercase() || c == ' '));
        }
        assert_eq!(level_tag(Level::Warn), "WARN ");
    }
}
