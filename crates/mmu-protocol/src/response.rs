//! Device replies and change notifications
//!
//! Each reply is one line starting with a two-letter tag:
//!
//! - `n-` child node, `pr`/`pw` read-only/writable property
//! - `pE`, `mE`, `nE` property/method/node error
//! - `mO` method succeeded
//! - `o-`/`c-` subscription opened/closed
//! - `CHG` unsolicited change notification
//! - `-E` unparseable request

use std::fmt;

use crate::error::ErrorCode;
use crate::LINE_TERMINATOR;

/// A reply line sent from the device to a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// A child node of a listed node
    Node { path: String },
    /// A property value
    Property {
        path: String,
        property: String,
        value: String,
        writable: bool,
    },
    /// Reading or writing a property failed
    PropertyError {
        path: String,
        property: String,
        code: ErrorCode,
        reason: String,
    },
    /// Node lookup failed
    NodeError {
        path: String,
        code: ErrorCode,
        reason: String,
    },
    /// Method invocation succeeded
    MethodOk { path: String, method: String },
    /// Method invocation failed
    MethodError {
        path: String,
        method: String,
        code: ErrorCode,
        reason: String,
    },
    /// Subscription opened
    Opened { path: String },
    /// Subscription closed
    Closed { path: String },
    /// Unsolicited property change on an opened node
    Change {
        path: String,
        property: String,
        value: String,
    },
    /// The request line could not be parsed
    SyntaxError { line: String },
}

impl Response {
    /// Encode to wire bytes including the line terminator
    pub fn encode(&self) -> Vec<u8> {
        let mut line = self.to_string();
        line.push_str(LINE_TERMINATOR);
        line.into_bytes()
    }

    /// Whether this reply reports a failure
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Response::PropertyError { .. }
                | Response::NodeError { .. }
                | Response::MethodError { .. }
                | Response::SyntaxError { .. }
        )
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Node { path } => write!(f, "n- {}", path),
            Response::Property {
                path,
                property,
                value,
                writable,
            } => {
                let tag = if *writable { "pw" } else { "pr" };
                write!(f, "{} {}.{}={}", tag, path, property, value)
            }
            Response::PropertyError {
                path,
                property,
                code,
                reason,
            } => write!(f, "pE {}.{} {}:{}", path, property, code, reason),
            Response::NodeError { path, code, reason } => {
                write!(f, "nE {} {}:{}", path, code, reason)
            }
            Response::MethodOk { path, method } => write!(f, "mO {}:{}", path, method),
            Response::MethodError {
                path,
                method,
                code,
                reason,
            } => write!(f, "mE {}:{} {}:{}", path, method, code, reason),
            Response::Opened { path } => write!(f, "o- {}", path),
            Response::Closed { path } => write!(f, "c- {}", path),
            Response::Change {
                path,
                property,
                value,
            } => write!(f, "CHG {}.{}={}", path, property, value),
            Response::SyntaxError { line } => {
                write!(f, "-E {} {}:{}", line, ErrorCode::Syntax, ErrorCode::Syntax.reason())
            }
        }
    }
}
