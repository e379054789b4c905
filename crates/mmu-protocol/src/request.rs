//! Client requests
//!
//! A request line is `<VERB> <argument>`. The argument grammar depends on
//! the verb:
//!
//! | Verb    | Argument                    |
//! |---------|-----------------------------|
//! | `GET`   | `/path`, `/path.*`, `/path.Prop` |
//! | `SET`   | `/path.Prop=value`          |
//! | `CALL`  | `/path:method(args)`        |
//! | `OPEN`  | `/path`                     |
//! | `CLOSE` | `/path`                     |

use std::fmt;

use crate::error::ParseError;

/// A parsed client request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// List the child nodes of a node: `GET /path`
    Get { path: String },
    /// List every property of a node: `GET /path.*`
    GetAll { path: String },
    /// Read one property: `GET /path.Prop`
    GetProperty { path: String, property: String },
    /// Write one property: `SET /path.Prop=value`
    Set {
        path: String,
        property: String,
        value: String,
    },
    /// Invoke a method on a node: `CALL /path:method(args)`
    Call {
        path: String,
        method: String,
        args: String,
    },
    /// Subscribe to change notifications below a node: `OPEN /path`
    Open { path: String },
    /// Drop a subscription: `CLOSE /path`
    Close { path: String },
}

impl Request {
    /// Parse a single request line (terminator already stripped)
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ParseError::Empty);
        }

        let (verb, rest) = match line.split_once(' ') {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        match verb.to_ascii_uppercase().as_str() {
            "GET" => parse_get(rest),
            "SET" => parse_set(rest),
            "CALL" => parse_call(rest),
            "OPEN" => Ok(Request::Open {
                path: parse_path(rest)?,
            }),
            "CLOSE" => Ok(Request::Close {
                path: parse_path(rest)?,
            }),
            _ => Err(ParseError::UnknownVerb(verb.to_string())),
        }
    }

    /// Node path the request addresses
    pub fn path(&self) -> &str {
        match self {
            Request::Get { path }
            | Request::GetAll { path }
            | Request::GetProperty { path, .. }
            | Request::Set { path, .. }
            | Request::Call { path, .. }
            | Request::Open { path }
            | Request::Close { path } => path,
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Get { path } => write!(f, "GET {}", path),
            Request::GetAll { path } => write!(f, "GET {}.*", path),
            Request::GetProperty { path, property } => write!(f, "GET {}.{}", path, property),
            Request::Set {
                path,
                property,
                value,
            } => write!(f, "SET {}.{}={}", path, property, value),
            Request::Call { path, method, args } => {
                write!(f, "CALL {}:{}({})", path, method, args)
            }
            Request::Open { path } => write!(f, "OPEN {}", path),
            Request::Close { path } => write!(f, "CLOSE {}", path),
        }
    }
}

fn parse_get(rest: &str) -> Result<Request, ParseError> {
    if rest.is_empty() {
        return Err(ParseError::InvalidFrame("GET requires a path".into()));
    }

    match rest.split_once('.') {
        Some((path, "*")) => Ok(Request::GetAll {
            path: parse_path(path)?,
        }),
        Some((path, property)) => Ok(Request::GetProperty {
            path: parse_path(path)?,
            property: parse_property(property)?,
        }),
        None => Ok(Request::Get {
            path: parse_path(rest)?,
        }),
    }
}

fn parse_set(rest: &str) -> Result<Request, ParseError> {
    let (target, value) = rest
        .split_once('=')
        .ok_or_else(|| ParseError::InvalidFrame(format!("SET without '=': {}", rest)))?;
    let (path, property) = target
        .split_once('.')
        .ok_or_else(|| ParseError::InvalidFrame(format!("SET without property: {}", rest)))?;

    Ok(Request::Set {
        path: parse_path(path)?,
        property: parse_property(property)?,
        value: value.to_string(),
    })
}

fn parse_call(rest: &str) -> Result<Request, ParseError> {
    let (path, invocation) = rest
        .split_once(':')
        .ok_or_else(|| ParseError::InvalidFrame(format!("CALL without method: {}", rest)))?;
    let (method, args) = invocation
        .strip_suffix(')')
        .and_then(|inner| inner.split_once('('))
        .ok_or_else(|| ParseError::InvalidFrame(format!("malformed invocation: {}", invocation)))?;

    if method.is_empty() || !method.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ParseError::InvalidFrame(format!("invalid method name: {}", method)));
    }

    Ok(Request::Call {
        path: parse_path(path)?,
        method: method.to_string(),
        args: args.to_string(),
    })
}

/// Validate a node path, normalising a single trailing slash away
fn parse_path(raw: &str) -> Result<String, ParseError> {
    if !raw.starts_with('/') || raw.chars().any(char::is_whitespace) {
        return Err(ParseError::InvalidPath(raw.to_string()));
    }
    if raw == "/" {
        return Ok(raw.to_string());
    }

    let trimmed = raw.strip_suffix('/').unwrap_or(raw);
    if trimmed[1..].split('/').any(str::is_empty) {
        return Err(ParseError::InvalidPath(raw.to_string()));
    }

    Ok(trimmed.to_string())
}

fn parse_property(raw: &str) -> Result<String, ParseError> {
    if raw.is_empty() || raw.contains(['/', '.', ' ']) {
        return Err(ParseError::InvalidFrame(format!("invalid property name: {}", raw)));
    }
    Ok(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_get_variants() {
        assert_eq!(
            Request::parse("GET /V1/MEDIA/VIDEO").unwrap(),
            Request::Get {
                path: "/V1/MEDIA/VIDEO".into()
            }
        );
        assert_eq!(
            Request::parse("GET /V1/MEDIA/VIDEO/AB_S0.*").unwrap(),
            Request::GetAll {
                path: "/V1/MEDIA/VIDEO/AB_S0".into()
            }
        );
        assert_eq!(
            Request::parse("get /.ProductName").unwrap(),
            Request::GetProperty {
                path: "/".into(),
                property: "ProductName".into()
            }
        );
    }

    #[test]
    fn test_parse_set_keeps_dots_in_value() {
        let req = Request::parse("SET /V1/ENDPOINTS/DEVICEMAP/X1.IpAddress=10.0.0.7").unwrap();
        assert_eq!(
            req,
            Request::Set {
                path: "/V1/ENDPOINTS/DEVICEMAP/X1".into(),
                property: "IpAddress".into(),
                value: "10.0.0.7".into(),
            }
        );
    }

    #[test]
    fn test_parse_call_with_colon_in_args() {
        let req = Request::parse("CALL /V1/MEDIA/VIDEO/XP:switch(TX1:RX1)").unwrap();
        assert_eq!(
            req,
            Request::Call {
                path: "/V1/MEDIA/VIDEO/XP".into(),
                method: "switch".into(),
                args: "TX1:RX1".into(),
            }
        );
    }

    #[test]
    fn test_parse_call_with_empty_args() {
        let req = Request::parse("CALL /V1/MEDIA/VIDEO/XP:switchAll()").unwrap();
        assert!(matches!(req, Request::Call { ref args, .. } if args.is_empty()));
    }

    #[test]
    fn test_trailing_slash_is_normalised() {
        let req = Request::parse("OPEN /V1/MEDIA/").unwrap();
        assert_eq!(req.path(), "/V1/MEDIA");
    }

    #[test]
    fn test_rejects_bad_input() {
        assert_eq!(Request::parse("   "), Err(ParseError::Empty));
        assert!(matches!(
            Request::parse("FETCH /V1"),
            Err(ParseError::UnknownVerb(_))
        ));
        assert!(matches!(
            Request::parse("GET V1/MEDIA"),
            Err(ParseError::InvalidPath(_))
        ));
        assert!(matches!(
            Request::parse("GET /V1//MEDIA"),
            Err(ParseError::InvalidPath(_))
        ));
        assert!(matches!(
            Request::parse("SET /V1/MEDIA.Prop"),
            Err(ParseError::InvalidFrame(_))
        ));
        assert!(matches!(
            Request::parse("CALL /V1/MEDIA/VIDEO/XP:switch"),
            Err(ParseError::InvalidFrame(_))
        ));
    }

    #[test]
    fn test_display_matches_wire_form() {
        for line in [
            "GET /V1/MEDIA",
            "GET /V1/MEDIA/VIDEO/AB_D0.*",
            "GET /V1/MEDIA/VIDEO/AB_D0.SourceStream",
            "SET /V1/MEDIA/VIDEO/AB_S0.SignalPresent=false",
            "CALL /V1/MEDIA/VIDEO/XP:switch(0:RX2)",
            "OPEN /V1/MEDIA/AUDIO",
            "CLOSE /V1/MEDIA/AUDIO",
        ] {
            assert_eq!(Request::parse(line).unwrap().to_string(), line);
        }
    }
}
