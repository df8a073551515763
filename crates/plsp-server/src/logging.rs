use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub const LOG_ENV: &str = "PLSP_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// `timestamp LEVEL target - message`
    #[default]
    Compact,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "json" | "jsonl" => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

/// Builds the filter from the level directive and quiets the dependency
/// crates that are chatty at debug.
pub fn build_env_filter(level: &str) -> anyhow::Result<EnvFilter> {
    let mut directives = vec![level.to_string()];
    for (target, lvl) in [("walkdir", "warn"), ("zip", "warn")] {
        directives.push(format!("{target}={lvl}"));
    }
    let filter_str = directives.join(",");
    EnvFilter::try_new(&filter_str)
        .map_err(|e| anyhow::anyhow!("invalid tracing filter '{filter_str}': {e}"))
}

/// Level precedence: explicit flag, then `PLSP_LOG`, then the configured
/// default.
pub fn resolve_level(flag: Option<&str>, configured: &str) -> String {
    flag.map(str::to_string)
        .or_else(|| std::env::var(LOG_ENV).ok().filter(|v| !v.trim().is_empty()))
        .unwrap_or_else(|| configured.to_string())
}

/// Installs the global subscriber writing to stderr. Calling it twice is an
/// error from the subscriber registry.
pub fn init(level: &str, format: LogFormat) -> anyhow::Result<()> {
    let layer = if format == LogFormat::Json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_names(true)
            .with_filter(build_env_filter(level)?)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_names(true)
            .with_filter(build_env_filter(level)?)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("install tracing subscriber: {e}"))?;

    tracing::trace!("logging initialized: level={level}, format={format:?}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_accepts_levels_and_target_directives() {
        assert!(build_env_filter("debug").is_ok());
        assert!(build_env_filter("plsp_server=trace").is_ok());
        assert!(build_env_filter("plsp_server=[").is_err());
    }

    #[test]
    fn format_parse_defaults_to_compact() {
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("text"), LogFormat::Compact);
    }

    #[test]
    fn flag_wins_over_configured_level() {
        assert_eq!(resolve_level(Some("warn"), "info"), "warn");
    }
}
