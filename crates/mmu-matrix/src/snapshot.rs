//! Saved snapshots
//!
//! A [`SavedSnapshot`] captures everything needed to rebuild an equivalent
//! device: stream identifiers and aliases, live signal and enable values,
//! the routing map and the operator-editable endpoint fields. Rebuilding
//! from it never generates new identifiers for streams it knows about.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::blueprint::{DeviceBlueprint, LayerBlueprint, StreamSeed};
use crate::config::MatrixConfig;
use crate::error::MatrixError;
use crate::layer::{props, Layer, LayerState, Route, StreamId};
use crate::store::DeviceStore;
use crate::switch::apply_route;
use crate::tree::Actor;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedInput {
    pub id: StreamId,
    pub alias: String,
    pub signal_present: bool,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedOutput {
    pub id: StreamId,
    pub alias: String,
    pub source: Route,
    pub signal_present: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedLayer {
    pub inputs: Vec<SavedInput>,
    pub outputs: Vec<SavedOutput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedEndpoint {
    pub id: String,
    pub label: String,
    pub ip_address: String,
}

/// Serializable projection of a device's identity-bearing state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedSnapshot {
    pub layers: BTreeMap<Layer, SavedLayer>,
    pub endpoints: Vec<SavedEndpoint>,
}

fn capture_layer(state: &LayerState) -> Result<SavedLayer, MatrixError> {
    let inputs = state
        .inputs()
        .iter()
        .map(|id| {
            Ok(SavedInput {
                id: id.clone(),
                alias: state.alias(id)?,
                signal_present: state.signal_present(id)?,
                enabled: state.is_enabled(id)?,
            })
        })
        .collect::<Result<_, MatrixError>>()?;
    let outputs = state
        .outputs()
        .iter()
        .map(|id| {
            Ok(SavedOutput {
                id: id.clone(),
                alias: state.alias(id)?,
                source: state.route(id)?,
                signal_present: state.signal_present(id)?,
            })
        })
        .collect::<Result<_, MatrixError>>()?;
    Ok(SavedLayer { inputs, outputs })
}

impl SavedSnapshot {
    /// Capture the current state of `store`
    ///
    /// Each layer is read under its own lock.
    pub fn capture(store: &DeviceStore) -> Result<Self, MatrixError> {
        let mut layers = BTreeMap::new();
        for layer in store.layers() {
            layers.insert(layer, store.with_layer(layer, capture_layer)?);
        }
        let endpoints = store
            .endpoints()?
            .into_iter()
            .map(|e| SavedEndpoint {
                id: e.id,
                label: e.label,
                ip_address: e.ip_address,
            })
            .collect();
        Ok(Self { layers, endpoints })
    }

    /// Blueprint that reuses every captured identifier
    ///
    /// Configured layers missing from the snapshot get fresh identifiers.
    pub fn blueprint(&self, config: &MatrixConfig) -> DeviceBlueprint {
        let layers = config
            .layers
            .iter()
            .map(|layer| {
                let seeds = match self.layers.get(layer) {
                    Some(saved) => LayerBlueprint {
                        inputs: saved
                            .inputs
                            .iter()
                            .map(|i| StreamSeed {
                                id: i.id.clone(),
                                alias: i.alias.clone(),
                            })
                            .collect(),
                        outputs: saved
                            .outputs
                            .iter()
                            .map(|o| StreamSeed {
                                id: o.id.clone(),
                                alias: o.alias.clone(),
                            })
                            .collect(),
                    },
                    None => LayerBlueprint::generate(config.matrix_size),
                };
                (*layer, seeds)
            })
            .collect();
        DeviceBlueprint { layers }
    }

    /// Re-apply captured values onto a store built from [`Self::blueprint`]
    ///
    /// Input values go first so that restored routes copy the restored
    /// signal. Routes bypass the enable gate: they were valid when captured.
    /// Streams unknown to the store are skipped.
    pub fn restore(&self, store: &DeviceStore) -> Result<(), MatrixError> {
        for (layer, saved) in &self.layers {
            if !store.layers().contains(layer) {
                debug!("Skipping restore of unconfigured layer {}", layer);
                continue;
            }
            store.mutate_layer(*layer, |state| {
                let mut changes = Vec::new();
                for input in &saved.inputs {
                    if !state.is_input(&input.id) {
                        continue;
                    }
                    for (prop, value) in [
                        (props::SIGNAL_PRESENT, input.signal_present),
                        (props::ENABLED, input.enabled),
                    ] {
                        changes.extend(state.tree_mut().set(
                            &input.id.property(prop),
                            Value::Bool(value),
                            Actor::Internal,
                        )?);
                    }
                }
                for output in &saved.outputs {
                    if !state.is_output(&output.id) {
                        continue;
                    }
                    let route = match &output.source {
                        Route::Input(input) if !state.is_input(input) => Route::Disconnected,
                        route => route.clone(),
                    };
                    changes.extend(apply_route(state, &output.id, &route)?);
                }
                Ok(((), changes))
            })?;
        }

        let known: Vec<String> = store.endpoints()?.into_iter().map(|e| e.id).collect();
        for endpoint in self.endpoints.iter().filter(|e| known.contains(&e.id)) {
            store.set_endpoint(&endpoint.id, Some(&endpoint.label), Some(&endpoint.ip_address))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceIdentity;

    #[test]
    fn test_serializes_with_string_routes() {
        let mut snapshot = SavedSnapshot::default();
        snapshot.layers.insert(
            Layer::Video,
            SavedLayer {
                inputs: vec![],
                outputs: vec![SavedOutput {
                    id: StreamId::new("A_D0"),
                    alias: "RX1".to_string(),
                    source: Route::Disconnected,
                    signal_present: false,
                }],
            },
        );

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["layers"]["VIDEO"]["outputs"][0]["source"], "0");
        assert_eq!(json["layers"]["VIDEO"]["outputs"][0]["signalPresent"], false);

        let back: SavedSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn test_blueprint_reuses_identifiers() {
        let config = MatrixConfig::default();
        let store = DeviceStore::new(config.clone(), DeviceIdentity::default()).unwrap();
        let snapshot = SavedSnapshot::capture(&store).unwrap();

        let blueprint = snapshot.blueprint(&config);
        let rebuilt = DeviceStore::build(config, DeviceIdentity::default(), &blueprint).unwrap();
        for layer in Layer::ALL {
            assert_eq!(rebuilt.list_inputs(layer).unwrap(), store.list_inputs(layer).unwrap());
            assert_eq!(rebuilt.list_outputs(layer).unwrap(), store.list_outputs(layer).unwrap());
        }
    }

    #[test]
    fn test_blueprint_fills_missing_layers() {
        let snapshot = SavedSnapshot::default();
        let blueprint = snapshot.blueprint(&MatrixConfig::default());
        assert_eq!(blueprint.layers.len(), 4);
        assert_eq!(blueprint.layers[&Layer::Audio].inputs.len(), 3);
    }
}
