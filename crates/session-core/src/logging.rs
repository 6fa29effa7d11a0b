//! Subscriber installation driven by the `[log]` section of
//! [`UserAgentConfig`]
//!
//! Every crate of the stack logs through `tracing`; nothing is printed until
//! an application installs a subscriber, either its own or this one.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::UserAgentConfig;
use crate::errors::{Result, SessionError};

/// Parse a `[log] level` value such as `"debug"` or `"off"`
pub(crate) fn parse_level(level: &str) -> Result<LevelFilter> {
    level
        .parse()
        .map_err(|_| SessionError::config(format!("Invalid log level: {}", level)))
}

/// Install the global subscriber described by `config.log`.
///
/// `RUST_LOG`, when set, replaces the configured level. Fails when a global
/// subscriber is already installed.
pub fn setup_logging(config: &UserAgentConfig) -> Result<()> {
    let level = parse_level(&config.log.level)?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()));

    let builder = fmt::Subscriber::builder().with_env_filter(filter);
    let installed = if config.log.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| SessionError::config(format!("logging: {}", e)))?;

    tracing::debug!("Logging for {} at {}", config.uri, level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    use crate::config::LogSettings;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug").unwrap(), LevelFilter::DEBUG);
        assert_eq!(parse_level("WARN").unwrap(), LevelFilter::WARN);
        assert_eq!(parse_level("off").unwrap(), LevelFilter::OFF);
        assert!(parse_level("loud").is_err());
    }

    #[test]
    #[serial]
    fn test_second_setup_fails_instead_of_panicking() {
        let config = UserAgentConfig::default().with_log(LogSettings {
            level: "debug".into(),
            json: false,
        });
        let _ = setup_logging(&config);
        assert!(setup_logging(&UserAgentConfig::default()).is_err());
    }

    #[test]
    #[serial]
    fn test_bad_level_is_refused_before_installing() {
        let config = UserAgentConfig::default().with_log(LogSettings {
            level: "chatty".into(),
            json: true,
        });
        assert!(matches!(setup_logging(&config), Err(SessionError::Config { .. })));
    }
}
