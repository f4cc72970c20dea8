//! Logging setup for graphfilter.
//!
//! The compiler itself only emits `tracing` events: `debug!` when a filter
//! key is skipped, `warn!` when schema generation drops a relation, `trace!`
//! at phase boundaries. This module installs a subscriber for hosts that do
//! not bring their own. It needs the `tracing-subscriber` feature; without
//! it, [`init`] only resolves the settings.
//!
//! # Environment Variables
//!
//! - `GRAPHFILTER_DEBUG=true|1|yes` - Enable debug logging
//! - `GRAPHFILTER_LOG_LEVEL=trace|debug|info|warn|error` - Set a specific level
//! - `GRAPHFILTER_LOG_FORMAT=json|pretty|compact` - Set the output format (default: json)
//!
//! # Usage
//!
//! ```rust,no_run
//! use graphfilter_query::logging::{self, LogFormat, LogSettings};
//!
//! // From the environment (call once at startup)
//! logging::init();
//!
//! // Or explicitly
//! logging::init_with(LogSettings::new("debug", LogFormat::Pretty));
//! ```

use std::env;
use std::fmt;
use std::sync::Once;

static INIT: Once = Once::new();

const DEBUG_VAR: &str = "GRAPHFILTER_DEBUG";
const LEVEL_VAR: &str = "GRAPHFILTER_LOG_LEVEL";
const FORMAT_VAR: &str = "GRAPHFILTER_LOG_FORMAT";

/// Subscriber output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Multi-line, human oriented.
    Pretty,
    /// Single line per event.
    Compact,
}

impl LogFormat {
    /// Parse a format name. Unknown names fall back to JSON.
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "pretty" => Self::Pretty,
            "compact" => Self::Compact,
            _ => Self::Json,
        }
    }

    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Pretty => "pretty",
            Self::Compact => "compact",
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// Whether anything was requested at all.
    pub enabled: bool,
    /// `trace`, `debug`, `info`, `warn` or `error`.
    pub level: &'static str,
    /// Output format.
    pub format: LogFormat,
}

impl LogSettings {
    /// Explicit, enabled settings. Unknown levels become `warn`.
    pub fn new(level: &str, format: LogFormat) -> Self {
        Self {
            enabled: true,
            level: normalize_level(level).unwrap_or("warn"),
            format,
        }
    }

    /// Resolve from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Resolve from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let debug = lookup(DEBUG_VAR).is_some_and(|v| truthy(&v));
        let requested = lookup(LEVEL_VAR);
        let fallback = if debug { "debug" } else { "warn" };
        let level = requested
            .as_deref()
            .and_then(normalize_level)
            .unwrap_or(fallback);
        let format = lookup(FORMAT_VAR)
            .map(|f| LogFormat::parse(&f))
            .unwrap_or_default();

        Self {
            enabled: debug || requested.is_some(),
            level,
            format,
        }
    }

    /// Directive enabling `level` for the graphfilter crates only.
    pub fn directive(&self) -> String {
        ["graphfilter", "graphfilter_query", "graphfilter_schema"]
            .iter()
            .map(|target| format!("{}={}", target, self.level))
            .collect::<Vec<_>>()
            .join(",")
    }
}

fn truthy(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

fn normalize_level(level: &str) -> Option<&'static str> {
    match level.to_ascii_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" => Some("warn"),
        "error" => Some("error"),
        _ => None,
    }
}

/// Check if debug logging is enabled via `GRAPHFILTER_DEBUG`.
#[inline]
pub fn is_debug_enabled() -> bool {
    env::var(DEBUG_VAR).is_ok_and(|v| truthy(&v))
}

/// The level the environment asks for. Defaults to `warn`.
pub fn get_log_level() -> &'static str {
    LogSettings::from_env().level
}

/// The format the environment asks for. Defaults to `json`.
pub fn get_log_format() -> &'static str {
    LogSettings::from_env().format.as_str()
}

/// Initialize logging from the environment.
///
/// Does nothing unless `GRAPHFILTER_DEBUG` or `GRAPHFILTER_LOG_LEVEL` is set.
/// Only the first call to any `init*` function has an effect.
pub fn init() {
    let settings = LogSettings::from_env();
    if settings.enabled {
        init_with(settings);
    }
}

/// Initialize logging with a specific level, keeping the environment's format.
pub fn init_with_level(level: &str) {
    init_with(LogSettings::new(level, LogSettings::from_env().format));
}

/// Initialize debug logging, keeping the environment's format.
pub fn init_debug() {
    init_with_level("debug");
}

/// Install a subscriber for the given settings.
pub fn init_with(settings: LogSettings) {
    INIT.call_once(|| install(&settings));
}

#[cfg(feature = "tracing-subscriber")]
fn install(settings: &LogSettings) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_new(settings.directive()).unwrap_or_else(|_| EnvFilter::new("warn"));
    let registry = tracing_subscriber::registry().with(filter);
    let installed = match settings.format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
    };

    match installed {
        Ok(()) => tracing::info!(
            level = settings.level,
            format = %settings.format,
            "graphfilter logging initialized"
        ),
        Err(e) => tracing::debug!(error = %e, "a global subscriber is already installed"),
    }
}

#[cfg(not(feature = "tracing-subscriber"))]
fn install(settings: &LogSettings) {
    let _ = settings;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn resolve(vars: &[(&str, &str)]) -> LogSettings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LogSettings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_nothing_requested() {
        let settings = resolve(&[]);
        assert!(!settings.enabled);
        assert_eq!(settings.level, "warn");
        assert_eq!(settings.format, LogFormat::Json);
    }

    #[test]
    fn test_debug_flag() {
        let settings = resolve(&[("GRAPHFILTER_DEBUG", "YES")]);
        assert!(settings.enabled);
        assert_eq!(settings.level, "debug");

        assert!(!resolve(&[("GRAPHFILTER_DEBUG", "off")]).enabled);
    }

    #[test]
    fn test_explicit_level_wins() {
        let settings = resolve(&[
            ("GRAPHFILTER_DEBUG", "1"),
            ("GRAPHFILTER_LOG_LEVEL", "Trace"),
            ("GRAPHFILTER_LOG_FORMAT", "compact"),
        ]);
        assert_eq!(settings.level, "trace");
        assert_eq!(settings.format, LogFormat::Compact);
    }

    #[test]
    fn test_unknown_level_falls_back() {
        let settings = resolve(&[("GRAPHFILTER_LOG_LEVEL", "loud")]);
        assert!(settings.enabled);
        assert_eq!(settings.level, "warn");
        assert_eq!(LogSettings::new("loud", LogFormat::Pretty).level, "warn");
    }

    #[test]
    fn test_directive() {
        let settings = LogSettings::new("info", LogFormat::Json);
        assert_eq!(
            settings.directive(),
            "graphfilter=info,graphfilter_query=info,graphfilter_schema=info"
        );
    }
}
