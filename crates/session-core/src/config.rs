//! User agent configuration
//!
//! Loaded from TOML or built in code. Durations are written as integer
//! milliseconds:
//!
//! ```toml
//! uri = "sip:alice@example.com"
//! display_name = "Alice"
//! no_answer_timeout_ms = 30000
//!
//! [timers]
//! t1_ms = 500
//! t2_ms = 4000
//! t4_ms = 5000
//!
//! [dtmf]
//! duration_ms = 100
//! inter_tone_gap_ms = 500
//!
//! [log]
//! level = "info"
//! json = false
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use rtcsip_dialog_core::config::duration_ms;
use rtcsip_dialog_core::TimerSettings;
use rtcsip_sip_core::{Method, Uri};

use crate::errors::{Result, SessionError};
use crate::logging::parse_level;

/// Shortest tone accepted on the wire
pub const MIN_DTMF_DURATION: Duration = Duration::from_millis(70);
/// Longest tone accepted on the wire
pub const MAX_DTMF_DURATION: Duration = Duration::from_millis(6000);
/// Floor for the pause between tones
pub const MIN_INTER_TONE_GAP: Duration = Duration::from_millis(50);

/// DTMF defaults applied when a `send_dtmf` call leaves them unset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DtmfSettings {
    #[serde(rename = "duration_ms", with = "duration_ms")]
    pub duration: Duration,

    #[serde(rename = "inter_tone_gap_ms", with = "duration_ms")]
    pub inter_tone_gap: Duration,
}

impl Default for DtmfSettings {
    fn default() -> Self {
        Self {
            duration: Duration::from_millis(100),
            inter_tone_gap: Duration::from_millis(500),
        }
    }
}

/// Output of [`setup_logging`](crate::logging::setup_logging)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Maximum level; `RUST_LOG` overrides it
    pub level: String,

    /// JSON lines instead of text
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Configuration shared by every session of a [`UserAgent`](crate::UserAgent)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserAgentConfig {
    /// Address of record, used in From and to complete bare targets
    pub uri: Uri,

    /// Display name for From
    pub display_name: Option<String>,

    /// Contact advertised in INVITEs and 2xx; defaults to `uri`
    pub contact: Option<Uri>,

    /// How long an incoming call may ring before it is rejected with 408
    #[serde(rename = "no_answer_timeout_ms", with = "duration_ms")]
    pub no_answer_timeout: Duration,

    /// Methods listed in the Allow header
    pub allowed_methods: Vec<String>,

    pub timers: TimerSettings,

    pub dtmf: DtmfSettings,

    pub log: LogSettings,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            uri: Uri::sip("localhost").with_user("rtcsip"),
            display_name: None,
            contact: None,
            no_answer_timeout: Duration::from_secs(60),
            allowed_methods: [Method::Invite, Method::Ack, Method::Cancel, Method::Bye, Method::Info]
                .iter()
                .map(Method::to_string)
                .collect(),
            timers: TimerSettings::default(),
            dtmf: DtmfSettings::default(),
            log: LogSettings::default(),
        }
    }
}

impl UserAgentConfig {
    pub fn new(uri: Uri) -> Self {
        Self {
            uri,
            ..Default::default()
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_contact(mut self, contact: Uri) -> Self {
        self.contact = Some(contact);
        self
    }

    pub fn with_no_answer_timeout(mut self, timeout: Duration) -> Self {
        self.no_answer_timeout = timeout;
        self
    }

    pub fn with_timers(mut self, timers: TimerSettings) -> Self {
        self.timers = timers;
        self
    }

    pub fn with_dtmf(mut self, dtmf: DtmfSettings) -> Self {
        self.dtmf = dtmf;
        self
    }

    pub fn with_log(mut self, log: LogSettings) -> Self {
        self.log = log;
        self
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s).map_err(|e| SessionError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| SessionError::config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        let timers = &self.timers;
        if timers.t1.is_zero() || timers.t2.is_zero() || timers.t4.is_zero() {
            return Err(SessionError::config("protocol timers must be non-zero"));
        }
        if timers.t2 < timers.t1 {
            return Err(SessionError::config("T2 must not be shorter than T1"));
        }
        if self.no_answer_timeout.is_zero() {
            return Err(SessionError::config("no_answer_timeout must be non-zero"));
        }
        if self.uri.host.is_empty() {
            return Err(SessionError::config("uri must have a host"));
        }
        if !(MIN_DTMF_DURATION..=MAX_DTMF_DURATION).contains(&self.dtmf.duration) {
            return Err(SessionError::config(format!(
                "DTMF duration must be within {}..={} ms",
                MIN_DTMF_DURATION.as_millis(),
                MAX_DTMF_DURATION.as_millis()
            )));
        }
        if self.dtmf.inter_tone_gap < MIN_INTER_TONE_GAP {
            return Err(SessionError::config(format!(
                "inter-tone gap must be at least {} ms",
                MIN_INTER_TONE_GAP.as_millis()
            )));
        }
        parse_level(&self.log.level)?;
        Ok(())
    }

    /// Contact URI advertised by sessions
    pub fn contact_uri(&self) -> Uri {
        self.contact.clone().unwrap_or_else(|| self.uri.clone())
    }

    /// Value of the Allow header
    pub fn allow_header(&self) -> String {
        self.allowed_methods.join(",")
    }

    /// Turn a user-supplied target into a request URI.
    ///
    /// Accepts `sip:`/`sips:` URIs and bare user parts, which are completed
    /// with the domain of `uri`.
    pub fn normalize_target(&self, target: &str) -> Result<Uri> {
        let target = target.trim();
        if target.is_empty() {
            return Err(SessionError::invalid_argument("empty target"));
        }
        let lower = target.to_ascii_lowercase();
        if lower.starts_with("sip:") || lower.starts_with("sips:") {
            return target
                .parse()
                .map_err(|_| SessionError::invalid_argument(format!("invalid target: {}", target)));
        }
        if target.contains(':') {
            return Err(SessionError::invalid_argument(format!(
                "unsupported target scheme: {}",
                target
            )));
        }
        let (user, host) = match target.split_once('@') {
            Some((user, host)) => (user, host.to_string()),
            None => (target, self.uri.host_port()),
        };
        format!("sip:{}@{}", user, host)
            .parse()
            .map_err(|_| SessionError::invalid_argument(format!("invalid target: {}", target)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_validate() {
        let config = UserAgentConfig::default();
        config.validate().unwrap();
        assert_eq!(config.timers.timer_h(), Duration::from_secs(32));
        assert_eq!(config.no_answer_timeout, Duration::from_secs(60));
        assert_eq!(config.allow_header(), "INVITE,ACK,CANCEL,BYE,INFO");
    }

    #[test]
    fn test_from_toml_str() {
        let config = UserAgentConfig::from_toml_str(
            r#"
            uri = "sip:alice@example.com"
            no_answer_timeout_ms = 1500

            [timers]
            t1_ms = 100
            t2_ms = 800
        "#,
        )
        .unwrap();
        assert_eq!(config.uri.to_string(), "sip:alice@example.com");
        assert_eq!(config.no_answer_timeout, Duration::from_millis(1500));
        assert_eq!(config.timers.t1, Duration::from_millis(100));
        assert_eq!(config.timers.t4, Duration::from_secs(5));
        assert_eq!(config.dtmf, DtmfSettings::default());
    }

    #[test]
    fn test_validation_errors() {
        let err = UserAgentConfig::from_toml_str("[timers]\nt1_ms = 0").unwrap_err();
        assert!(matches!(err, SessionError::Config { .. }));

        let config = UserAgentConfig::default().with_timers(
            TimerSettings::default()
                .with_t1(Duration::from_secs(5))
                .with_t2(Duration::from_secs(1)),
        );
        assert!(config.validate().is_err());

        assert!(UserAgentConfig::from_toml_str("uri = \"mailto:x\"").is_err());
    }

    #[test]
    fn test_log_section() {
        let config = UserAgentConfig::from_toml_str("[log]\nlevel = \"debug\"\njson = true").unwrap();
        assert_eq!(
            config.log,
            LogSettings {
                level: "debug".into(),
                json: true,
            }
        );
        assert_eq!(UserAgentConfig::default().log.level, "info");

        let err = UserAgentConfig::from_toml_str("[log]\nlevel = \"chatty\"").unwrap_err();
        assert!(matches!(err, SessionError::Config { .. }));
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"uri = \"sip:bob@example.org\"\n").unwrap();
        let config = UserAgentConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(config.uri.host, "example.org");
        assert!(UserAgentConfig::from_toml_file("/nonexistent/rtcsip.toml").is_err());
    }

    #[test]
    fn test_normalize_target() {
        let config = UserAgentConfig::new("sip:alice@example.com:5070".parse().unwrap());
        assert_eq!(
            config.normalize_target("bob").unwrap().to_string(),
            "sip:bob@example.com:5070"
        );
        assert_eq!(
            config.normalize_target("bob@other.net").unwrap().to_string(),
            "sip:bob@other.net"
        );
        assert_eq!(
            config.normalize_target("sips:carol@secure.net").unwrap().to_string(),
            "sips:carol@secure.net"
        );
        assert!(config.normalize_target("").is_err());
        assert!(config.normalize_target("tel:+1555").is_err());
        assert!(config.normalize_target("sip:").is_err());
    }
}
