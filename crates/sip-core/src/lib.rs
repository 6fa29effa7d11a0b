//! # rtcsip-sip-core
//!
//! The SIP message model shared by the rtcsip dialog and session layers.
//!
//! Messages are exchanged with an external transaction/transport layer in
//! already-parsed form, so this crate only provides the typed values the
//! call-control core reads and writes:
//!
//! - [`Method`], [`StatusCode`] with RFC 3261 reason phrases
//! - [`Uri`] (parsed with nom), [`NameAddr`], [`CSeq`], extension [`Headers`]
//! - [`Request`] and [`Response`], plus [`SimpleRequestBuilder`]
//! - tag, Call-ID and branch generators in [`utils`]

pub mod builder;
pub mod error;
pub mod parser;
pub mod types;
pub mod utils;

pub use builder::SimpleRequestBuilder;
pub use error::{Error, Error as SipError, Result};
pub use types::headers::names as header_names;
pub use types::{
    Body, CSeq, Headers, Method, NameAddr, Request, Response, Scheme, StatusCode, Uri,
    APPLICATION_SDP,
};

pub mod prelude {
    pub use crate::builder::SimpleRequestBuilder;
    pub use crate::types::*;
}
