//! SIP message types
//!
//! - [`Method`] and [`StatusCode`]
//! - [`Uri`], [`NameAddr`] and [`CSeq`]
//! - [`Headers`] for everything without a typed field
//! - [`Request`], [`Response`] and their [`Body`]

pub mod address;
pub mod headers;
pub mod method;
pub mod sip_request;
pub mod sip_response;
pub mod status;
pub mod uri;

pub use address::{CSeq, NameAddr};
pub use headers::Headers;
pub use method::Method;
pub use sip_request::{Body, Request, APPLICATION_SDP};
pub use sip_response::Response;
pub use status::StatusCode;
pub use uri::{Scheme, Uri};
