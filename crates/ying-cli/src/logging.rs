//! Tracing setup for the `ying` binary.
//!
//! Logs always go to stderr: stdout carries the wrapped command's output and
//! the JSON printed by `bucket-size`. `RUST_LOG` wins when set.

use clap::ValueEnum;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// How chatty the run is, from the `-q`/`-v`/`-d`/`--trace` flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogPreset {
    /// Warnings, plus startup and report progress
    #[default]
    Production,
    Verbose,
    Debug,
    /// Includes every filtered output chunk
    Trace,
    Quiet,
}

impl LogPreset {
    /// Quiet beats trace beats debug beats verbose.
    pub fn from_flags(verbose: bool, debug: bool, trace: bool, quiet: bool) -> Self {
        match (quiet, trace, debug, verbose) {
            (true, ..) => Self::Quiet,
            (_, true, ..) => Self::Trace,
            (_, _, true, _) => Self::Debug,
            (_, _, _, true) => Self::Verbose,
            _ => Self::Production,
        }
    }

    fn base_directives(self) -> &'static [&'static str] {
        match self {
            Self::Production => &["ying=warn", "ying::startup=info", "ying::report=info"],
            Self::Verbose => &["ying=info"],
            Self::Debug => &["ying=debug"],
            Self::Trace => &["ying=trace"],
            Self::Quiet => &["ying=error"],
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    pub preset: LogPreset,
    /// `--log` overrides in the order given, targets already under `ying::`.
    pub overrides: Vec<(String, Level)>,
    pub format: LogFormat,
}

impl LogConfig {
    pub fn from_cli(
        verbose: bool,
        debug: bool,
        trace: bool,
        quiet: bool,
        log_overrides: Vec<String>,
        format: LogFormat,
    ) -> Self {
        let overrides = log_overrides
            .iter()
            .flat_map(|arg| arg.split(','))
            .filter_map(parse_override)
            .collect();
        Self {
            preset: LogPreset::from_flags(verbose, debug, trace, quiet),
            overrides,
            format,
        }
    }

    pub fn directives(&self) -> String {
        let overrides = self
            .overrides
            .iter()
            .map(|(target, level)| format!("{}={}", target, level.as_str().to_ascii_lowercase()));
        self.preset
            .base_directives()
            .iter()
            .map(|d| d.to_string())
            .chain(overrides)
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn build_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(self.directives()))
            .unwrap_or_else(|_| EnvFilter::new("ying=warn"))
    }
}

/// `relay=debug` becomes `ying::relay` at DEBUG; unknown levels are dropped.
fn parse_override(part: &str) -> Option<(String, Level)> {
    let (target, level) = part.split_once('=')?;
    let target = target.trim();
    let level = level.trim().parse::<Level>().ok()?;
    let target = if target == "ying" || target.starts_with("ying::") {
        target.to_string()
    } else {
        format!("ying::{target}")
    };
    Some((target, level))
}

pub fn init(config: &LogConfig) {
    let text = (config.format == LogFormat::Text)
        .then(|| fmt::layer().with_writer(std::io::stderr).with_target(true));
    let json = (config.format == LogFormat::Json)
        .then(|| fmt::layer().json().with_writer(std::io::stderr).with_target(true));

    tracing_subscriber::registry()
        .with(config.build_filter())
        .with(text)
        .with(json)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_priority() {
        assert_eq!(LogPreset::from_flags(true, true, true, true), LogPreset::Quiet);
        assert_eq!(LogPreset::from_flags(true, true, true, false), LogPreset::Trace);
        assert_eq!(LogPreset::from_flags(true, true, false, false), LogPreset::Debug);
        assert_eq!(LogPreset::from_flags(true, false, false, false), LogPreset::Verbose);
        assert_eq!(LogPreset::from_flags(false, false, false, false), LogPreset::Production);
    }

    #[test]
    fn test_overrides_are_prefixed() {
        let config = LogConfig::from_cli(
            false,
            false,
            false,
            false,
            vec!["relay=debug".into(), "plog=trace,ying::storage=info".into()],
            LogFormat::Text,
        );
        assert_eq!(
            config.overrides,
            vec![
                ("ying::relay".to_string(), Level::DEBUG),
                ("ying::plog".to_string(), Level::TRACE),
                ("ying::storage".to_string(), Level::INFO),
            ]
        );
    }

    #[test]
    fn test_invalid_override_level_is_ignored() {
        let config = LogConfig::from_cli(
            false,
            false,
            false,
            false,
            vec!["relay=loud".into(), "no-level".into()],
            LogFormat::Text,
        );
        assert!(config.overrides.is_empty());
    }

    #[test]
    fn test_production_keeps_report_progress() {
        let config = LogConfig::default();
        assert_eq!(config.directives(), "ying=warn,ying::startup=info,ying::report=info");
    }

    #[test]
    fn test_directives_include_overrides() {
        let config = LogConfig::from_cli(
            false,
            false,
            false,
            true,
            vec!["relay=debug".into()],
            LogFormat::Text,
        );
        assert_eq!(config.directives(), "ying=error,ying::relay=debug");
    }
}
