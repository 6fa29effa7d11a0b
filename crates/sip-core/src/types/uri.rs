//! # SIP URI
//!
//! A compact SIP/SIPS URI as used for request targets, Contact and Route sets:
//!
//! ```text
//! sip:user@host:port;uri-parameters?headers
//! ```
//!
//! Parsing goes through the nom grammar in [`crate::parser::uri`].
//!
//! ```rust
//! use rtcsip_sip_core::{Uri, Scheme};
//!
//! let uri: Uri = "sip:alice@example.com:5060;transport=ws".parse().unwrap();
//! assert_eq!(uri.scheme, Scheme::Sip);
//! assert_eq!(uri.user.as_deref(), Some("alice"));
//! assert_eq!(uri.port, Some(5060));
//! assert_eq!(uri.parameter("transport"), Some("ws"));
//! assert_eq!(uri.to_string(), "sip:alice@example.com:5060;transport=ws");
//! ```

use std::fmt;
use std::str::FromStr;

use nom::combinator::all_consuming;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{Error, Result};
use crate::parser::uri::parse_uri;

/// URI scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scheme {
    Sip,
    Sips,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Sip => "sip",
            Scheme::Sips => "sips",
        }
    }
}

/// A SIP or SIPS URI
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Uri {
    pub scheme: Scheme,
    pub user: Option<String>,
    pub host: String,
    pub port: Option<u16>,
    /// URI parameters in order of appearance; flag parameters have no value
    pub params: Vec<(String, Option<String>)>,
    /// `?name=value` pairs, in order
    pub headers: Vec<(String, String)>,
}

impl Uri {
    /// Create a `sip:` URI for a host
    pub fn sip(host: impl Into<String>) -> Self {
        Self {
            scheme: Scheme::Sip,
            user: None,
            host: host.into(),
            port: None,
            params: Vec::new(),
            headers: Vec::new(),
        }
    }

    /// Set the user part
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Set the port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Append a URI parameter
    pub fn with_parameter(mut self, name: impl Into<String>, value: Option<String>) -> Self {
        self.params.push((name.into(), value));
        self
    }

    /// Look up a URI parameter value (case-insensitive name)
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.as_deref())
    }

    /// `host[:port]`
    pub fn host_port(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.scheme.as_str())?;
        if let Some(user) = &self.user {
            write!(f, "{}@", user)?;
        }
        write!(f, "{}", self.host_port())?;
        for (name, value) in &self.params {
            match value {
                Some(value) => write!(f, ";{}={}", name, value)?,
                None => write!(f, ";{}", name)?,
            }
        }
        for (i, (name, value)) in self.headers.iter().enumerate() {
            let separator = if i == 0 { '?' } else { '&' };
            write!(f, "{}{}={}", separator, name, value)?;
        }
        Ok(())
    }
}

impl FromStr for Uri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match all_consuming(parse_uri)(s.as_bytes()) {
            Ok((_, uri)) => Ok(uri),
            Err(e) => {
                trace!("Rejected URI {:?}: {:?}", s, e);
                Err(Error::invalid_uri(s))
            }
        }
    }
}

impl TryFrom<String> for Uri {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Uri> for String {
    fn from(uri: Uri) -> Self {
        uri.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_minimal_uri() {
        let uri: Uri = "sip:example.com".parse().unwrap();
        assert_eq!(uri.user, None);
        assert_eq!(uri.host, "example.com");
        assert_eq!(uri.port, None);
    }

    #[test]
    fn test_parse_ipv6_with_port() {
        let uri: Uri = "sips:bob@[2001:db8::1]:5061".parse().unwrap();
        assert_eq!(uri.scheme, Scheme::Sips);
        assert_eq!(uri.host, "[2001:db8::1]");
        assert_eq!(uri.port, Some(5061));
    }

    #[test]
    fn test_rejects_malformed_uris() {
        assert!("tel:+123".parse::<Uri>().is_err());
        assert!("sip:".parse::<Uri>().is_err());
        assert!("sip:@host".parse::<Uri>().is_err());
        assert!("sip:alice@host:port".parse::<Uri>().is_err());
        assert!("sip:alice@host?subject".parse::<Uri>().is_err());
        assert!("sip:alice@host name".parse::<Uri>().is_err());
    }

    #[test]
    fn test_headers_round_trip_display() {
        let text = "sips:bob@[2001:db8::1]:5061;transport=tls?subject=project&priority=urgent";
        let uri: Uri = text.parse().unwrap();
        assert_eq!(uri.headers.len(), 2);
        assert_eq!(uri.to_string(), text);
        assert_eq!(uri.to_string().parse::<Uri>().unwrap(), uri);
    }

    #[test]
    fn test_flag_parameters_round_trip_display() {
        let uri = Uri::sip("10.0.0.1")
            .with_user("alice")
            .with_parameter("lr", None)
            .with_parameter("transport", Some("ws".to_string()));
        assert_eq!(uri.to_string(), "sip:alice@10.0.0.1;lr;transport=ws");
        assert_eq!(uri.parameter("TRANSPORT"), Some("ws"));
    }
}
