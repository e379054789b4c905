//! Matrix Line Protocol Library
//!
//! This crate provides parsing and encoding for the text protocol spoken by
//! the emulated matrix switcher's control port.
//!
//! # Format
//!
//! Every request and every reply is a single ASCII line terminated by
//! `\r\n` (a bare `\n` is accepted on input). Nodes are addressed with
//! slash-separated paths, properties with a dot suffix and methods with a
//! colon suffix:
//!
//! - `GET /V1/MEDIA/VIDEO` - list child nodes (`n- /V1/MEDIA/VIDEO/XP`)
//! - `GET /V1/MEDIA/VIDEO/0A1B2C3D4E5F_S0.*` - list properties
//! - `SET /V1/MEDIA/VIDEO/0A1B2C3D4E5F_S0.SignalPresent=false`
//! - `CALL /V1/MEDIA/VIDEO/XP:switch(TX1:RX1)`
//! - `OPEN /V1/MEDIA/VIDEO` - subscribe to `CHG` notifications
//!
//! # Example
//!
//! ```rust
//! use mmu_protocol::{LineCodec, Request};
//!
//! let mut codec = LineCodec::new();
//! codec.push_bytes(b"CALL /V1/MEDIA/VIDEO/XP:switch(TX1:RX1)\r\n");
//!
//! let request = codec.next_request().unwrap().unwrap();
//! assert!(matches!(request, Request::Call { ref method, .. } if method == "switch"));
//! ```

pub mod codec;
pub mod error;
pub mod request;
pub mod response;

pub use codec::LineCodec;
pub use error::{ErrorCode, ParseError};
pub use request::Request;
pub use response::Response;

/// Line terminator used for every encoded reply
pub const LINE_TERMINATOR: &str = "\r\n";
