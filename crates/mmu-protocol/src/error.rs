//! Error types for line protocol parsing and error replies

use std::fmt;

use thiserror::Error;

/// Errors that can occur while parsing a request line
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Line contained only whitespace
    #[error("empty request")]
    Empty,

    /// Verb is not one of GET/SET/CALL/OPEN/CLOSE
    #[error("unknown verb: {0}")]
    UnknownVerb(String),

    /// Node path is missing a leading slash or contains empty segments
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Arguments after the verb do not match the verb's grammar
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}

/// Numeric error codes carried in `%E###` reply suffixes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Request could not be parsed
    Syntax,
    /// Node, property or method does not exist
    NotExists,
    /// Property is read-only for external clients
    AccessDenied,
    /// Value cannot be converted to the property's type
    InvalidValue,
    /// Command was understood but refused by the device
    Rejected,
}

impl ErrorCode {
    /// Numeric value of the code
    pub fn number(&self) -> u16 {
        match self {
            ErrorCode::Syntax => 1,
            ErrorCode::NotExists => 2,
            ErrorCode::AccessDenied => 3,
            ErrorCode::InvalidValue => 4,
            ErrorCode::Rejected => 5,
        }
    }

    /// Short reason used when no more specific message is available
    pub fn reason(&self) -> &'static str {
        match self {
            ErrorCode::Syntax => "Syntax error",
            ErrorCode::NotExists => "Not exists",
            ErrorCode::AccessDenied => "Access denied",
            ErrorCode::InvalidValue => "Invalid value",
            ErrorCode::Rejected => "Rejected",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%E{:03}", self.number())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_display_is_zero_padded() {
        assert_eq!(ErrorCode::Syntax.to_string(), "%E001");
        assert_eq!(ErrorCode::Rejected.to_string(), "%E005");
    }
}
