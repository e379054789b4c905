//! Client sessions
//!
//! A [`Session`] turns parsed requests into replies against a
//! [`DeviceStore`] and filters change notifications down to the nodes the
//! client has opened. [`run_session`] drives one over a byte stream.

use std::collections::BTreeSet;
use std::sync::Arc;

use mmu_matrix::{
    media_root, Actor, DeviceStore, Layer, MatrixError, NodePath, PropertyChange, PropertyPath,
    XP_NODE,
};
use mmu_protocol::{ErrorCode, LineCodec, Request, Response};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// Protocol error code for a model error
pub fn error_code(err: &MatrixError) -> ErrorCode {
    match err {
        MatrixError::MalformedCommand(_) => ErrorCode::Syntax,
        MatrixError::SourceNotFound { .. }
        | MatrixError::DestinationNotFound { .. }
        | MatrixError::LayerNotFound(_)
        | MatrixError::NotFound(_) => ErrorCode::NotExists,
        MatrixError::ReadOnly(_) => ErrorCode::AccessDenied,
        MatrixError::InvalidValue { .. } | MatrixError::InvalidPath(_) => ErrorCode::InvalidValue,
        MatrixError::SourceDisabled { .. } | MatrixError::Retired => ErrorCode::Rejected,
    }
}

/// Request handling state of one client connection
#[derive(Debug)]
pub struct Session {
    device: Arc<DeviceStore>,
    opened: BTreeSet<NodePath>,
}

impl Session {
    pub fn new(device: Arc<DeviceStore>) -> Self {
        Self {
            device,
            opened: BTreeSet::new(),
        }
    }

    /// Reply to one request
    pub fn handle(&mut self, request: Request) -> Vec<Response> {
        match request {
            Request::Get { path } => self.list_children(path),
            Request::GetAll { path } => self.list_properties(path),
            Request::GetProperty { path, property } => vec![self.get_property(path, property)],
            Request::Set {
                path,
                property,
                value,
            } => vec![self.set_property(path, property, &value)],
            Request::Call { path, method, args } => vec![self.call(path, method, &args)],
            Request::Open { path } => vec![self.open(path)],
            Request::Close { path } => {
                if let Ok(node) = path.parse::<NodePath>() {
                    self.opened.remove(&node);
                }
                vec![Response::Closed { path }]
            }
        }
    }

    /// Notification for a change, if the client has opened an ancestor
    pub fn notification(&self, change: &PropertyChange) -> Option<Response> {
        let node = &change.path.node;
        self.opened
            .iter()
            .any(|opened| node.starts_with(opened))
            .then(|| Response::Change {
                path: node.to_string(),
                property: change.path.property.clone(),
                value: change.value.to_string(),
            })
    }

    fn node_error(path: String, err: &MatrixError) -> Response {
        Response::NodeError {
            path,
            code: error_code(err),
            reason: err.to_string(),
        }
    }

    fn property_error(path: String, property: String, err: &MatrixError) -> Response {
        Response::PropertyError {
            path,
            property,
            code: error_code(err),
            reason: err.to_string(),
        }
    }

    fn list_children(&self, path: String) -> Vec<Response> {
        let result = path
            .parse::<NodePath>()
            .and_then(|node| Ok((self.device.children(&node)?, node)));
        match result {
            Ok((children, node)) => children
                .into_iter()
                .map(|name| Response::Node {
                    path: node.child(name).to_string(),
                })
                .collect(),
            Err(e) => vec![Self::node_error(path, &e)],
        }
    }

    fn list_properties(&self, path: String) -> Vec<Response> {
        let result = path
            .parse::<NodePath>()
            .and_then(|node| self.device.properties(&node));
        match result {
            Ok(props) => props
                .into_iter()
                .map(|(property, value, writable)| Response::Property {
                    path: path.clone(),
                    property,
                    value: value.to_string(),
                    writable,
                })
                .collect(),
            Err(e) => vec![Self::node_error(path, &e)],
        }
    }

    fn get_property(&self, path: String, property: String) -> Response {
        let result = path
            .parse::<NodePath>()
            .and_then(|node| self.device.get_value(&PropertyPath::new(node, property.as_str())));
        match result {
            Ok((value, writable)) => Response::Property {
                path,
                property,
                value: value.to_string(),
                writable,
            },
            Err(e) => Self::property_error(path, property, &e),
        }
    }

    fn set_property(&self, path: String, property: String, raw: &str) -> Response {
        let result = path.parse::<NodePath>().and_then(|node| {
            self.device
                .set_raw(&PropertyPath::new(node, property.as_str()), raw, Actor::External)
        });
        match result {
            Ok(value) => Response::Property {
                path,
                property,
                value: value.to_string(),
                writable: true,
            },
            Err(e) => {
                debug!("SET {}.{}={} failed: {}", path, property, raw, e);
                Self::property_error(path, property, &e)
            }
        }
    }

    /// Layer owning a crosspoint node path, `/V1/MEDIA/<LAYER>/XP`
    fn crosspoint_layer(&self, path: &str) -> Result<Layer, MatrixError> {
        let node: NodePath = path.parse()?;
        let not_found = || MatrixError::NotFound(path.to_string());
        let rest = node.strip_prefix(&media_root()).ok_or_else(not_found)?;
        match rest.segments() {
            [layer, xp] if xp == XP_NODE => {
                let layer = Layer::ALL
                    .into_iter()
                    .find(|l| l.as_str() == layer)
                    .ok_or_else(not_found)?;
                if self.device.layers().contains(&layer) {
                    Ok(layer)
                } else {
                    Err(not_found())
                }
            }
            _ => Err(not_found()),
        }
    }

    fn call(&self, path: String, method: String, args: &str) -> Response {
        let result = self.crosspoint_layer(&path).and_then(|layer| match method.as_str() {
            "switch" => self.device.switch(layer, args),
            "switchAll" => self.device.switch_all(layer, args),
            _ => Err(MatrixError::NotFound(format!("{}:{}", path, method))),
        });
        match result {
            Ok(()) => Response::MethodOk { path, method },
            Err(e) => {
                info!("CALL {}:{}({}) rejected: {}", path, method, args, e);
                Response::MethodError {
                    path,
                    method,
                    code: error_code(&e),
                    reason: e.to_string(),
                }
            }
        }
    }

    fn open(&mut self, path: String) -> Response {
        let result = path
            .parse::<NodePath>()
            .and_then(|node| self.device.children(&node).map(|_| node));
        match result {
            Ok(node) => {
                self.opened.insert(node);
                Response::Opened { path }
            }
            Err(e) => Self::node_error(path, &e),
        }
    }
}

/// Serve one client until it disconnects or the task is aborted
pub async fn run_session<S>(mut stream: S, device: Arc<DeviceStore>, id: u64)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    debug!("Connection {} opened", id);

    // Subscribe before the first request so no change is missed
    let mut changes = device.subscribe_changes();
    let mut session = Session::new(device);
    let mut codec = LineCodec::new();
    let mut buffer = vec![0u8; 1024];

    loop {
        tokio::select! {
            result = stream.read(&mut buffer) => {
                let n = match result {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) => {
                        debug!("Connection {} read error: {}", id, e);
                        break;
                    }
                };
                codec.push_bytes(&buffer[..n]);

                let mut out = Vec::new();
                while let Some((request, line)) = codec.next_request_with_line() {
                    let replies = match request {
                        Ok(request) => session.handle(request),
                        Err(_) => vec![Response::SyntaxError { line }],
                    };
                    for reply in replies {
                        out.extend(reply.encode());
                    }
                }
                if !out.is_empty() && stream.write_all(&out).await.is_err() {
                    break;
                }
            }

            change = changes.recv() => {
                match change {
                    Ok(change) => {
                        if let Some(note) = session.notification(&change) {
                            if stream.write_all(&note.encode()).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Connection {} missed {} change notifications", id, skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    debug!("Connection {} closed", id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use mmu_matrix::{DeviceIdentity, MatrixConfig};

    fn session() -> Session {
        let device = DeviceStore::new(MatrixConfig::default(), DeviceIdentity::default()).unwrap();
        Session::new(Arc::new(device))
    }

    fn reply(session: &mut Session, line: &str) -> Vec<String> {
        session
            .handle(Request::parse(line).unwrap())
            .into_iter()
            .map(|r| r.to_string())
            .collect()
    }

    #[test]
    fn test_get_listing() {
        let mut session = session();
        let lines = reply(&mut session, "GET /V1/MEDIA");
        assert_eq!(lines[0], "n- /V1/MEDIA/AUDIO");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_get_identity_property() {
        let mut session = session();
        assert_eq!(
            reply(&mut session, "GET /.ProductName"),
            ["pr /.ProductName=TPN-MMU-X100"]
        );
    }

    #[test]
    fn test_call_switch_and_read_back() {
        let mut session = session();
        assert_eq!(
            reply(&mut session, "CALL /V1/MEDIA/VIDEO/XP:switch(TX1:RX1)"),
            ["mO /V1/MEDIA/VIDEO/XP:switch"]
        );

        let rx1 = session
            .device
            .find_output_by_alias(Layer::Video, "RX1")
            .unwrap()
            .unwrap();
        let lines = reply(
            &mut session,
            &format!("GET /V1/MEDIA/VIDEO/{}.SourceStreamAlias", rx1),
        );
        assert_eq!(lines, [format!("pr /V1/MEDIA/VIDEO/{}.SourceStreamAlias=TX1", rx1)]);
    }

    #[test]
    fn test_call_errors_carry_codes() {
        let mut session = session();
        let lines = reply(&mut session, "CALL /V1/MEDIA/VIDEO/XP:switch(BOGUS:RX1)");
        assert!(lines[0].starts_with("mE /V1/MEDIA/VIDEO/XP:switch %E002:"));

        let lines = reply(&mut session, "CALL /V1/MEDIA/VIDEO/XP:switch(nocolon)");
        assert!(lines[0].contains("%E001:"));

        let lines = reply(&mut session, "CALL /V1/MEDIA/VIDEO:switch(TX1:RX1)");
        assert!(lines[0].contains("%E002:"));

        let lines = reply(&mut session, "CALL /V1/MEDIA/VIDEO/XP:explode()");
        assert!(lines[0].contains("%E002:"));
    }

    #[test]
    fn test_set_read_only_is_access_denied() {
        let mut session = session();
        let lines = reply(&mut session, "SET /.ProductName=Other");
        assert!(lines[0].starts_with("pE /.ProductName %E003:"));
    }

    #[test]
    fn test_set_endpoint_label() {
        let mut session = session();
        assert_eq!(
            reply(&mut session, "SET /V1/ENDPOINTS/DEVICEMAP/X1.DeviceLabel=Podium"),
            ["pw /V1/ENDPOINTS/DEVICEMAP/X1.DeviceLabel=Podium"]
        );
    }

    #[test]
    fn test_notifications_follow_opened_nodes() {
        let mut session = session();
        let mut changes = session.device.subscribe_changes();

        assert_eq!(reply(&mut session, "OPEN /V1/MEDIA/VIDEO"), ["o- /V1/MEDIA/VIDEO"]);
        session.device.switch(Layer::Video, "TX2:RX2").unwrap();
        session.device.switch(Layer::Audio, "TX2:RX2").unwrap();

        let mut notes = Vec::new();
        while let Ok(change) = changes.try_recv() {
            notes.extend(session.notification(&change).map(|r| r.to_string()));
        }
        assert_eq!(notes.len(), 3);
        assert!(notes.iter().all(|n| n.starts_with("CHG /V1/MEDIA/VIDEO/")));

        reply(&mut session, "CLOSE /V1/MEDIA/VIDEO");
        session.device.switch(Layer::Video, "TX3:RX2").unwrap();
        while let Ok(change) = changes.try_recv() {
            assert!(session.notification(&change).is_none());
        }
    }

    #[test]
    fn test_open_missing_node() {
        let mut session = session();
        let lines = reply(&mut session, "OPEN /V1/NOPE");
        assert!(lines[0].starts_with("nE /V1/NOPE %E002:"));
    }
}
