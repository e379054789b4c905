//! Device model configuration

use serde::{Deserialize, Serialize};

use crate::layer::Layer;

/// Shape and policy of the emulated matrix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatrixConfig {
    /// Layers present on the device
    pub layers: Vec<Layer>,
    /// Inputs and outputs per layer
    pub matrix_size: usize,
    /// Reject switches from Inputs whose `Enabled` is false
    pub enforce_enabled: bool,
    /// Let clients write Input `Enabled`
    pub writable_enabled: bool,
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self {
            layers: Layer::ALL.to_vec(),
            matrix_size: default_matrix_size(),
            enforce_enabled: false,
            writable_enabled: true,
        }
    }
}

fn default_matrix_size() -> usize {
    3
}

/// Identity values reported at the tree root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceIdentity {
    pub manufacturer_name: String,
    pub product_name: String,
    pub part_number: String,
    pub serial_number: String,
    pub package_version: String,
    pub application_name: String,
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self {
            manufacturer_name: "Lightware Visual Engineering".to_string(),
            product_name: "TPN-MMU-X100".to_string(),
            part_number: "91710013".to_string(),
            serial_number: "EMULATOR".to_string(),
            package_version: "v0.0.0".to_string(),
            application_name: "TPN_MMU Emulator".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: MatrixConfig =
            serde_json::from_str(r#"{"layers": ["VIDEO", "USBHID"], "enforce_enabled": true}"#)
                .unwrap();
        assert_eq!(config.layers, vec![Layer::Video, Layer::UsbHid]);
        assert_eq!(config.matrix_size, 3);
        assert!(config.enforce_enabled);
        assert!(config.writable_enabled);
    }

    #[test]
    fn test_identity_defaults() {
        let identity: DeviceIdentity = serde_json::from_str(r#"{"serial_number": "LAB-7"}"#).unwrap();
        assert_eq!(identity.serial_number, "LAB-7");
        assert_eq!(identity.product_name, "TPN-MMU-X100");
    }
}
