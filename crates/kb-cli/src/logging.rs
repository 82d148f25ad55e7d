use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install the global subscriber, writing to stderr.
///
/// `level` wins when given (from `--verbose` or `KB_LOG_LEVEL`); otherwise
/// `RUST_LOG` is honoured, defaulting to "info".
pub fn init(level: Option<&str>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .compact();

    let filter_layer = match level {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?,
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

/// Effective level override: `--verbose` first, then `KB_LOG_LEVEL`.
pub fn resolve_level(verbose: bool, env_level: Option<&str>) -> Option<String> {
    if verbose {
        return Some("debug".to_string());
    }
    env_level
        .map(str::trim)
        .filter(|level| !level.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::{info, warn};

    #[test]
    fn test_logging_init() {
        // We can only init once per process
        let _ = init(Some("warn"));

        info!("This is an info message");
        warn!("This is a warning message");
    }

    #[test]
    fn test_verbose_beats_env() {
        assert_eq!(resolve_level(true, Some("error")).as_deref(), Some("debug"));
        assert_eq!(resolve_level(false, Some("trace")).as_deref(), Some("trace"));
        assert_eq!(resolve_level(false, Some("  ")), None);
        assert_eq!(resolve_level(false, None), None);
    }
}
