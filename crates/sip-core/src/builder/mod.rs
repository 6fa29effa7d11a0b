//! Builders for outgoing SIP messages

mod request;

pub use request::SimpleRequestBuilder;
