//! Logger setup for the terminal front-end.
//!
//! The screen is drawn on stdout. With `log_to_file` set, everything from
//! info up goes to `./adgen.log` and nothing is logged to the terminal.
//! Without it, only warnings and errors reach the terminal.

use std::path::Path;

use adgen_logging::log::LevelFilter;
use adgen_logging::LogDestination;

use super::config::AppConfig;

const LOG_FILE: &str = "./adgen.log";

pub fn initialize(config: &AppConfig) {
    let (destination, level) = destination_for(config);
    adgen_logging::initialize(destination, level, Path::new(LOG_FILE));
}

fn destination_for(config: &AppConfig) -> (LogDestination, LevelFilter) {
    if config.log_to_file {
        (LogDestination::File, LevelFilter::Info)
    } else {
        (LogDestination::Terminal, LevelFilter::Warn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn file_logging_keeps_the_terminal_quiet() {
        let config = AppConfig::default();
        assert!(config.log_to_file);
        assert_eq!(
            destination_for(&config),
            (LogDestination::File, LevelFilter::Info)
        );
    }

    #[test]
    fn terminal_logging_only_shows_warnings() {
        let config = AppConfig {
            log_to_file: false,
            ..AppConfig::default()
        };
        assert_eq!(
            destination_for(&config),
            (LogDestination::Terminal, LevelFilter::Warn)
        );
    }
}
