//! Management endpoints under `/V1/ENDPOINTS/DEVICEMAP`
//!
//! One endpoint per physical transmitter or receiver. Labels and addresses
//! are operator-editable and have no effect on routing.

use serde::{Deserialize, Serialize};

use crate::error::MatrixError;
use crate::path::NodePath;
use crate::tree::PropertyTree;
use crate::value::Value;

pub const DEVICE_LABEL: &str = "DeviceLabel";
pub const IP_ADDRESS: &str = "IpAddress";
pub const ROLE: &str = "Role";

const ROLES: &[&str] = &["TX", "RX"];
const FIRST_HOST: usize = 10;

/// Whether an endpoint is a transmitter or a receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EndpointRole {
    Tx,
    Rx,
}

impl EndpointRole {
    fn as_str(&self) -> &'static str {
        match self {
            EndpointRole::Tx => "TX",
            EndpointRole::Rx => "RX",
        }
    }
}

/// Current values of one endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub id: String,
    pub role: EndpointRole,
    pub label: String,
    pub ip_address: String,
}

/// `/V1/ENDPOINTS/DEVICEMAP`
pub fn device_map() -> NodePath {
    NodePath::from_segments(["V1", "ENDPOINTS", "DEVICEMAP"])
}

/// Create `X1..X<2n>`: `n` transmitters followed by `n` receivers
pub fn install(tree: &mut PropertyTree, size: usize) {
    let roles = std::iter::repeat(EndpointRole::Tx)
        .take(size)
        .chain(std::iter::repeat(EndpointRole::Rx).take(size));

    for (index, role) in roles.enumerate() {
        let n = index + 1;
        let ordinal = if role == EndpointRole::Tx { n } else { n - size };
        let node = device_map().child(format!("X{}", n));

        tree.add_property(
            &node.property(DEVICE_LABEL),
            Value::string(format!("{}{}", role.as_str(), ordinal)),
            true,
        );
        tree.add_property(
            &node.property(IP_ADDRESS),
            Value::string(format!("192.168.0.{}", FIRST_HOST + index)),
            true,
        );
        tree.add_property(
            &node.property(ROLE),
            Value::enumeration(role.as_str(), ROLES),
            false,
        );
    }
}

/// Read every endpoint in `X<n>` order
pub fn read(tree: &PropertyTree) -> Result<Vec<Endpoint>, MatrixError> {
    let mut ids = tree.children(&device_map())?;
    ids.sort_by_key(|id| id.trim_start_matches('X').parse::<usize>().unwrap_or(usize::MAX));

    ids.into_iter()
        .map(|id| {
            let node = device_map().child(id.as_str());
            let text = |name: &str| -> Result<String, MatrixError> {
                Ok(tree.get(&node.property(name))?.to_string())
            };
            let role = match text(ROLE)?.as_str() {
                "RX" => EndpointRole::Rx,
                _ => EndpointRole::Tx,
            };
            Ok(Endpoint {
                label: text(DEVICE_LABEL)?,
                ip_address: text(IP_ADDRESS)?,
                role,
                id,
            })
        })
        .collect()
}
