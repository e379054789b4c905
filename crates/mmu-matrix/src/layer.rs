//! Layers, streams and per-layer routing state

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::blueprint::LayerBlueprint;
use crate::config::MatrixConfig;
use crate::error::MatrixError;
use crate::path::{NodePath, PropertyPath};
use crate::propagation;
use crate::tree::PropertyTree;
use crate::value::Value;

/// Property names used on Input and Output nodes
pub mod props {
    pub const STREAM_ALIAS: &str = "StreamAlias";
    pub const SIGNAL_PRESENT: &str = "SignalPresent";
    pub const ENABLED: &str = "Enabled";
    pub const SIGNAL_TYPE: &str = "SignalType";
    pub const ACTIVE_RESOLUTION: &str = "ActiveResolution";
    pub const REFRESH_RATE: &str = "RefreshRate";
    pub const COLOR_SPACE: &str = "ColorSpace";
    pub const SOURCE_STREAM: &str = "SourceStream";
    pub const SOURCE_STREAM_ALIAS: &str = "SourceStreamAlias";
}

/// Name of the crosspoint node inside every layer
pub const XP_NODE: &str = "XP";

/// `SourceStream` value of a disconnected Output, and the disconnect
/// sentinel accepted in place of a source alias
pub const DISCONNECTED: &str = "0";

/// Signal types an Input can report
pub const SIGNAL_TYPES: &[&str] = &["HDMI", "DP", "DVI"];

/// Color spaces an Input can report
pub const COLOR_SPACES: &[&str] = &["RGB", "YCbCr444", "YCbCr422", "YCbCr420"];

const DEFAULT_RESOLUTION: &str = "1920x1080";
const DEFAULT_REFRESH_RATE: i64 = 60;

/// Independent routing domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Layer {
    Video,
    Audio,
    UsbIcron,
    UsbHid,
}

impl Layer {
    /// Every layer, in declaration order
    pub const ALL: [Layer; 4] = [Layer::Video, Layer::Audio, Layer::UsbIcron, Layer::UsbHid];

    /// Node name under `/V1/MEDIA`
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Video => "VIDEO",
            Layer::Audio => "AUDIO",
            Layer::UsbIcron => "USBICRON",
            Layer::UsbHid => "USBHID",
        }
    }

    /// Whether streams on this layer carry video timing metadata
    pub fn carries_video(&self) -> bool {
        matches!(self, Layer::Video)
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Layer {
    type Err = MatrixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Layer::ALL
            .into_iter()
            .find(|layer| layer.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| MatrixError::LayerNotFound(s.to_string()))
    }
}

/// Stable identifier of an Input or Output node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    /// Wrap an identifier string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Node path of this stream relative to its layer node
    pub fn node(&self) -> NodePath {
        NodePath::from_segments([self.0.as_str()])
    }

    /// A property of this stream's node
    pub fn property(&self, name: &str) -> PropertyPath {
        self.node().property(name)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Routing map entry of one Output
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Route {
    /// Not fed by any Input
    Disconnected,
    /// Fed by the Input with this identifier
    Input(StreamId),
}

impl Route {
    /// `SourceStream` text for this route
    pub fn source_stream(&self) -> &str {
        match self {
            Route::Disconnected => DISCONNECTED,
            Route::Input(id) => id.as_str(),
        }
    }

    /// Routed Input, if any
    pub fn input(&self) -> Option<&StreamId> {
        match self {
            Route::Disconnected => None,
            Route::Input(id) => Some(id),
        }
    }
}

impl From<String> for Route {
    fn from(s: String) -> Self {
        if s.is_empty() || s == DISCONNECTED {
            Route::Disconnected
        } else {
            Route::Input(StreamId(s))
        }
    }
}

impl From<Route> for String {
    fn from(route: Route) -> Self {
        route.source_stream().to_string()
    }
}

/// Routing and signal state of one layer
///
/// Values live in the layer's own [`PropertyTree`], rooted at the layer node
/// (`/V1/MEDIA/<LAYER>`). Input and Output membership is fixed at build time.
#[derive(Debug)]
pub struct LayerState {
    layer: Layer,
    tree: PropertyTree,
    inputs: Vec<StreamId>,
    outputs: Arc<[StreamId]>,
}

impl LayerState {
    /// Build the layer's nodes from a blueprint and wire signal propagation
    pub fn build(
        layer: Layer,
        blueprint: &LayerBlueprint,
        config: &MatrixConfig,
    ) -> Result<Self, MatrixError> {
        let mut tree = PropertyTree::new();
        tree.add_node(&NodePath::from_segments([XP_NODE]));

        let mut inputs = Vec::with_capacity(blueprint.inputs.len());
        for seed in &blueprint.inputs {
            let id = &seed.id;
            tree.add_property(&id.property(props::STREAM_ALIAS), Value::string(&seed.alias), false);
            tree.add_property(&id.property(props::SIGNAL_PRESENT), Value::Bool(true), true);
            tree.add_property(
                &id.property(props::ENABLED),
                Value::Bool(true),
                config.writable_enabled,
            );
            if layer.carries_video() {
                tree.add_property(
                    &id.property(props::SIGNAL_TYPE),
                    Value::enumeration("HDMI", SIGNAL_TYPES),
                    false,
                );
                tree.add_property(
                    &id.property(props::ACTIVE_RESOLUTION),
                    Value::string(DEFAULT_RESOLUTION),
                    false,
                );
                tree.add_property(
                    &id.property(props::REFRESH_RATE),
                    Value::Int(DEFAULT_REFRESH_RATE),
                    false,
                );
                tree.add_property(
                    &id.property(props::COLOR_SPACE),
                    Value::enumeration("RGB", COLOR_SPACES),
                    false,
                );
            }
            inputs.push(id.clone());
        }

        let mut outputs = Vec::with_capacity(blueprint.outputs.len());
        for seed in &blueprint.outputs {
            let id = &seed.id;
            tree.add_property(&id.property(props::STREAM_ALIAS), Value::string(&seed.alias), false);
            tree.add_property(
                &id.property(props::SOURCE_STREAM),
                Value::string(DISCONNECTED),
                false,
            );
            tree.add_property(&id.property(props::SOURCE_STREAM_ALIAS), Value::string(""), false);
            tree.add_property(&id.property(props::SIGNAL_PRESENT), Value::Bool(false), false);
            if layer.carries_video() {
                tree.add_property(
                    &id.property(props::ACTIVE_RESOLUTION),
                    Value::string(DEFAULT_RESOLUTION),
                    false,
                );
                tree.add_property(
                    &id.property(props::REFRESH_RATE),
                    Value::Int(DEFAULT_REFRESH_RATE),
                    false,
                );
            }
            outputs.push(id.clone());
        }

        inputs.sort();
        outputs.sort();
        let outputs: Arc<[StreamId]> = outputs.into();

        propagation::wire(layer, &mut tree, &inputs, Arc::clone(&outputs))?;

        Ok(Self {
            layer,
            tree,
            inputs,
            outputs,
        })
    }

    /// The layer this state belongs to
    pub fn layer(&self) -> Layer {
        self.layer
    }

    /// Input identifiers in ascending order
    pub fn inputs(&self) -> &[StreamId] {
        &self.inputs
    }

    /// Output identifiers in ascending order
    pub fn outputs(&self) -> &[StreamId] {
        &self.outputs
    }

    /// The layer's property tree
    pub fn tree(&self) -> &PropertyTree {
        &self.tree
    }

    /// Mutable access to the layer's property tree
    pub fn tree_mut(&mut self) -> &mut PropertyTree {
        &mut self.tree
    }

    /// Whether `id` names an Input of this layer
    pub fn is_input(&self, id: &StreamId) -> bool {
        self.inputs.binary_search(id).is_ok()
    }

    /// Whether `id` names an Output of this layer
    pub fn is_output(&self, id: &StreamId) -> bool {
        self.outputs.binary_search(id).is_ok()
    }

    /// Find an Input by its `StreamAlias`
    pub fn find_input_by_alias(&self, alias: &str) -> Option<&StreamId> {
        self.inputs.iter().find(|id| self.alias(id).as_deref() == Ok(alias))
    }

    /// Find an Output by its `StreamAlias`
    pub fn find_output_by_alias(&self, alias: &str) -> Option<&StreamId> {
        self.outputs.iter().find(|id| self.alias(id).as_deref() == Ok(alias))
    }

    /// `StreamAlias` of an Input or Output
    pub fn alias(&self, id: &StreamId) -> Result<String, MatrixError> {
        self.read_str(id, props::STREAM_ALIAS)
    }

    /// `SignalPresent` of an Input or Output
    pub fn signal_present(&self, id: &StreamId) -> Result<bool, MatrixError> {
        self.read_bool(id, props::SIGNAL_PRESENT)
    }

    /// `Enabled` of an Input
    pub fn is_enabled(&self, id: &StreamId) -> Result<bool, MatrixError> {
        self.read_bool(id, props::ENABLED)
    }

    /// Routing map entry of an Output
    pub fn route(&self, output: &StreamId) -> Result<Route, MatrixError> {
        if !self.is_output(output) {
            return Err(MatrixError::DestinationNotFound {
                layer: self.layer,
                stream: output.to_string(),
            });
        }
        self.read_str(output, props::SOURCE_STREAM).map(Route::from)
    }

    /// Complete routing map, keyed by Output identifier
    pub fn routing(&self) -> Result<BTreeMap<StreamId, Route>, MatrixError> {
        self.outputs
            .iter()
            .map(|id| Ok((id.clone(), self.route(id)?)))
            .collect()
    }

    /// Read a string or enumerated property of a stream
    pub fn read_str(&self, id: &StreamId, property: &str) -> Result<String, MatrixError> {
        let path = id.property(property);
        self.tree
            .get(&path)?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| MatrixError::NotFound(path.to_string()))
    }

    /// Read a boolean property of a stream
    pub fn read_bool(&self, id: &StreamId, property: &str) -> Result<bool, MatrixError> {
        let path = id.property(property);
        self.tree
            .get(&path)?
            .as_bool()
            .ok_or_else(|| MatrixError::NotFound(path.to_string()))
    }

    /// Read an integer property of a stream, if present
    pub fn read_int(&self, id: &StreamId, property: &str) -> Option<i64> {
        self.tree.get(&id.property(property)).ok()?.as_int()
    }
}
