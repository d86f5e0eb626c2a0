use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, fmt};

use crate::AskAgentError;

static TELEMETRY_GUARD: OnceLock<()> = OnceLock::new();

/// Configuration options when initialising telemetry.
#[derive(Debug, Clone)]
pub struct TelemetryOptions {
    /// Filter directive; falls back to `RUST_LOG`, then `info`.
    pub env_filter: Option<String>,
    pub with_ansi: bool,
    /// Write to stderr so stdout stays clean for answers.
    pub to_stderr: bool,
}

impl Default for TelemetryOptions {
    fn default() -> Self {
        Self {
            env_filter: None,
            with_ansi: true,
            to_stderr: true,
        }
    }
}

fn resolve_filter(explicit: Option<String>) -> String {
    explicit
        .filter(|value| !value.trim().is_empty())
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| "info".to_string())
}

/// Initialise the global tracing subscriber.
///
/// Safe to call multiple times; only the first invocation installs the subscriber.
pub fn init_telemetry(options: TelemetryOptions) -> Result<(), AskAgentError> {
    if TELEMETRY_GUARD.get().is_some() {
        return Ok(());
    }

    let filter = EnvFilter::try_new(resolve_filter(options.env_filter)).map_err(|err| {
        AskAgentError::InvalidConfiguration(format!("invalid log filter: {err}"))
    })?;

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_ansi(options.with_ansi);
    let result = if options.to_stderr {
        builder.with_writer(std::io::stderr).try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|err| {
        AskAgentError::InvalidConfiguration(format!("telemetry init failed: {err}"))
    })?;

    TELEMETRY_GUARD.get_or_init(|| ());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_filter_wins_over_blank() {
        assert_eq!(resolve_filter(Some("debug".into())), "debug");
        assert_ne!(resolve_filter(Some("  ".into())), "  ");
    }
}
