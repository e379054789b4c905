//! Identifier and alias layout used to build a device
//!
//! A blueprint fixes the stream identifiers of every layer. A fresh one gets
//! random MAC-like identifiers; one recovered from a saved snapshot reuses
//! the identifiers the device had before, which is what keeps them stable
//! across listener restarts.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::MatrixConfig;
use crate::layer::{Layer, StreamId};

/// Suffix of Input identifiers
pub const INPUT_SUFFIX: &str = "_S0";
/// Suffix of Output identifiers
pub const OUTPUT_SUFFIX: &str = "_D0";

/// One Input or Output to create
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSeed {
    pub id: StreamId,
    pub alias: String,
}

/// Streams of one layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerBlueprint {
    pub inputs: Vec<StreamSeed>,
    pub outputs: Vec<StreamSeed>,
}

impl LayerBlueprint {
    /// Fresh layer with `size` Inputs `TX1..` and `size` Outputs `RX1..`
    pub fn generate(size: usize) -> Self {
        let mut used = HashSet::new();
        let mut fresh_mac = || loop {
            let mac = random_mac();
            if used.insert(mac.clone()) {
                return mac;
            }
        };

        let inputs = (1..=size)
            .map(|n| StreamSeed {
                id: StreamId::new(format!("{}{}", fresh_mac(), INPUT_SUFFIX)),
                alias: format!("TX{}", n),
            })
            .collect();
        let outputs = (1..=size)
            .map(|n| StreamSeed {
                id: StreamId::new(format!("{}{}", fresh_mac(), OUTPUT_SUFFIX)),
                alias: format!("RX{}", n),
            })
            .collect();

        Self { inputs, outputs }
    }
}

/// Streams of every configured layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceBlueprint {
    pub layers: BTreeMap<Layer, LayerBlueprint>,
}

impl DeviceBlueprint {
    /// Fresh blueprint for every layer in `config`
    pub fn generate(config: &MatrixConfig) -> Self {
        let layers = config
            .layers
            .iter()
            .map(|layer| (*layer, LayerBlueprint::generate(config.matrix_size)))
            .collect();
        Self { layers }
    }
}

/// Twelve upper-case hex digits
pub fn random_mac() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    hex[..12].to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_mac_shape() {
        let mac = random_mac();
        assert_eq!(mac.len(), 12);
        assert!(mac
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
    }

    #[test]
    fn test_layer_blueprint_aliases_and_suffixes() {
        let layer = LayerBlueprint::generate(3);
        let aliases: Vec<_> = layer.inputs.iter().map(|s| s.alias.as_str()).collect();
        assert_eq!(aliases, ["TX1", "TX2", "TX3"]);
        assert!(layer.inputs.iter().all(|s| s.id.as_str().ends_with(INPUT_SUFFIX)));
        assert!(layer.outputs.iter().all(|s| s.id.as_str().ends_with(OUTPUT_SUFFIX)));

        let ids: HashSet<_> = layer
            .inputs
            .iter()
            .chain(&layer.outputs)
            .map(|s| s.id.as_str()[..12].to_string())
            .collect();
        assert_eq!(ids.len(), 6);
    }

    #[test]
    fn test_device_blueprint_follows_config() {
        let config = MatrixConfig {
            layers: vec![Layer::Video, Layer::Audio],
            matrix_size: 2,
            ..MatrixConfig::default()
        };
        let blueprint = DeviceBlueprint::generate(&config);
        assert_eq!(blueprint.layers.len(), 2);
        assert_eq!(blueprint.layers[&Layer::Audio].outputs.len(), 2);
    }
}
