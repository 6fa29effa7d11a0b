//! Core dialog types
//!
//! - [`DialogId`]: composite call-id/local-tag/remote-tag key
//! - [`Dialog`]: route set, sequence numbers and request construction
//! - [`DialogState`]: Early, Confirmed, Terminated
//!
//! ```text
//!  1xx+tag        2xx / ACK-eligible 200        BYE / failure
//! ────────▶ Early ──────────────────▶ Confirmed ─────────────▶ Terminated
//!             │                                                  ▲
//!             └──────────── discarded (other branch won) ────────┘
//! ```

pub mod dialog_id;
pub mod dialog_impl;
pub mod dialog_state;

pub use dialog_id::DialogId;
pub use dialog_impl::Dialog;
pub use dialog_state::{DialogRole, DialogState};
