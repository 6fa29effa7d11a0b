//! # rtcsip-dialog-core
//!
//! RFC 3261 dialog layer for the rtcsip call-control stack.
//!
//! A [`Dialog`] identifies one call leg by its [`DialogId`] (Call-ID, local
//! tag, remote tag), tracks whether it is early or confirmed, keeps the route
//! set and sequence numbers, and builds in-dialog requests. Protocol timer
//! values live in [`TimerSettings`].
//!
//! ```rust
//! use rtcsip_dialog_core::{Dialog, DialogState};
//! use rtcsip_sip_core::{Headers, Method, NameAddr, Response, SimpleRequestBuilder, StatusCode};
//!
//! let invite = SimpleRequestBuilder::new(Method::Invite, "sip:bob@example.com".parse().unwrap())
//!     .from(NameAddr::new("sip:alice@example.com".parse().unwrap()).with_tag("a"))
//!     .to(NameAddr::new("sip:bob@example.com".parse().unwrap()))
//!     .build()
//!     .unwrap();
//! let ok = Response::from_request(&invite, StatusCode::OK)
//!     .with_to_tag("b")
//!     .with_contact("sip:bob@192.0.2.1".parse().unwrap());
//!
//! let mut dialog = Dialog::from_response(&invite, &ok, DialogState::Confirmed).unwrap();
//! let bye = dialog.create_request(Method::Bye, Headers::new(), None).unwrap();
//! assert_eq!(bye.uri.to_string(), "sip:bob@192.0.2.1");
//! ```

pub mod config;
pub mod dialog;
pub mod errors;

pub use config::TimerSettings;
pub use dialog::{Dialog, DialogId, DialogRole, DialogState};
pub use errors::{DialogError, DialogResult};
