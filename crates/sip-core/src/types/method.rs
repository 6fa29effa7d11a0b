//! # SIP Methods
//!
//! The request methods the call-control core sends or reacts to. Anything else
//! is carried verbatim as [`Method::Extension`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// SIP request method
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    Invite,
    Ack,
    Bye,
    Cancel,
    Info,
    Options,
    Update,
    Extension(String),
}

impl Method {
    /// The method token as it appears on the wire
    pub fn as_str(&self) -> &str {
        match self {
            Method::Invite => "INVITE",
            Method::Ack => "ACK",
            Method::Bye => "BYE",
            Method::Cancel => "CANCEL",
            Method::Info => "INFO",
            Method::Options => "OPTIONS",
            Method::Update => "UPDATE",
            Method::Extension(token) => token,
        }
    }

    /// Whether a request with this method creates a new CSeq number inside a dialog.
    ///
    /// ACK and CANCEL reuse the sequence number of the INVITE they refer to.
    pub fn increments_cseq(&self) -> bool {
        !matches!(self, Method::Ack | Method::Cancel)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() || s.chars().any(char::is_whitespace) {
            return Err(Error::InvalidMethod(s.to_string()));
        }
        Ok(match s.to_ascii_uppercase().as_str() {
            "INVITE" => Method::Invite,
            "ACK" => Method::Ack,
            "BYE" => Method::Bye,
            "CANCEL" => Method::Cancel,
            "INFO" => Method::Info,
            "OPTIONS" => Method::Options,
            "UPDATE" => Method::Update,
            _ => Method::Extension(s.to_string()),
        })
    }
}
