//! Read-only state view for status surfaces

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::DeviceIdentity;
use crate::endpoints::Endpoint;
use crate::error::MatrixError;
use crate::layer::{props, Layer, LayerState, Route, StreamId};
use crate::store::DeviceStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputView {
    pub id: StreamId,
    pub alias: String,
    pub signal_present: bool,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputView {
    pub id: StreamId,
    pub alias: String,
    pub source_stream: Route,
    pub source_stream_alias: String,
    pub signal_present: bool,
}

/// Signal description of an Input
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceView {
    pub id: StreamId,
    pub alias: String,
    pub signal_present: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_resolution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_rate: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_space: Option<String>,
}

/// Connection view of an Output
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationView {
    pub id: StreamId,
    pub alias: String,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_source: Option<StreamId>,
    pub signal_present: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerView {
    pub inputs: Vec<InputView>,
    pub outputs: Vec<OutputView>,
    pub sources: Vec<SourceView>,
    pub destinations: Vec<DestinationView>,
    pub routing: BTreeMap<StreamId, Route>,
}

/// Identity block of a [`StateSnapshot`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceView {
    pub manufacturer_name: String,
    pub product_name: String,
    pub part_number: String,
    pub serial_number: String,
    pub package_version: String,
    pub application_name: String,
}

impl From<&DeviceIdentity> for DeviceView {
    fn from(identity: &DeviceIdentity) -> Self {
        Self {
            manufacturer_name: identity.manufacturer_name.clone(),
            product_name: identity.product_name.clone(),
            part_number: identity.part_number.clone(),
            serial_number: identity.serial_number.clone(),
            package_version: identity.package_version.clone(),
            application_name: identity.application_name.clone(),
        }
    }
}

/// Everything a status page shows
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub device: DeviceView,
    pub listener_enabled: bool,
    pub endpoints: Vec<Endpoint>,
    pub layers: BTreeMap<Layer, LayerView>,
}

impl StateSnapshot {
    pub fn capture(store: &DeviceStore, listener_enabled: bool) -> Result<Self, MatrixError> {
        let mut layers = BTreeMap::new();
        for layer in store.layers() {
            layers.insert(layer, store.with_layer(layer, LayerView::capture)?);
        }
        Ok(Self {
            device: DeviceView::from(store.identity()),
            listener_enabled,
            endpoints: store.endpoints()?,
            layers,
        })
    }
}

impl LayerView {
    fn capture(state: &LayerState) -> Result<Self, MatrixError> {
        let mut view = LayerView {
            inputs: Vec::new(),
            outputs: Vec::new(),
            sources: Vec::new(),
            destinations: Vec::new(),
            routing: state.routing()?,
        };

        for id in state.inputs() {
            let alias = state.alias(id)?;
            let signal_present = state.signal_present(id)?;
            view.inputs.push(InputView {
                id: id.clone(),
                alias: alias.clone(),
                signal_present,
                enabled: state.is_enabled(id)?,
            });
            view.sources.push(SourceView {
                id: id.clone(),
                alias,
                signal_present,
                signal_type: state.read_str(id, props::SIGNAL_TYPE).ok(),
                active_resolution: state.read_str(id, props::ACTIVE_RESOLUTION).ok(),
                refresh_rate: state.read_int(id, props::REFRESH_RATE),
                color_space: state.read_str(id, props::COLOR_SPACE).ok(),
            });
        }

        for id in state.outputs() {
            let alias = state.alias(id)?;
            let route = state.route(id)?;
            let signal_present = state.signal_present(id)?;
            view.destinations.push(DestinationView {
                id: id.clone(),
                alias: alias.clone(),
                connected: route.input().is_some(),
                connected_source: route.input().cloned(),
                signal_present,
            });
            view.outputs.push(OutputView {
                id: id.clone(),
                alias,
                source_stream_alias: state.read_str(id, props::SOURCE_STREAM_ALIAS)?,
                source_stream: route,
                signal_present,
            });
        }

        Ok(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatrixConfig;

    #[test]
    fn test_capture_shape() {
        let store = DeviceStore::new(MatrixConfig::default(), DeviceIdentity::default()).unwrap();
        store.switch(Layer::Video, "TX1:RX1").unwrap();

        let snapshot = StateSnapshot::capture(&store, true).unwrap();
        let video = &snapshot.layers[&Layer::Video];
        assert_eq!(video.inputs.len(), 3);
        assert_eq!(video.routing.len(), 3);

        let rx1 = video.destinations.iter().find(|d| d.alias == "RX1").unwrap();
        assert!(rx1.connected);
        assert!(rx1.signal_present);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["listenerEnabled"], true);
        assert_eq!(json["device"]["productName"], "TPN-MMU-X100");
        assert_eq!(json["layers"]["VIDEO"]["sources"][0]["refreshRate"], 60);
        assert!(json["layers"]["AUDIO"]["sources"][0].get("refreshRate").is_none());
    }
}
