//! The device store
//!
//! Owns the management tree (identity, application, endpoints) and one
//! [`LayerState`] per configured layer, each behind its own lock. Layer
//! subtrees are mounted at `/V1/MEDIA/<LAYER>`; path-addressed operations are
//! resolved to the tree that owns the node.
//!
//! Every applied change is published on a broadcast channel while the lock
//! of the owning tree is still held, so subscribers observe changes in the
//! order they were applied.
//!
//! A store replaced by a listener restart is retired: reads keep working but
//! every write fails with [`MatrixError::Retired`], checked under the lock of
//! the tree being written.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tracing::debug;

use crate::blueprint::{DeviceBlueprint, LayerBlueprint};
use crate::config::{DeviceIdentity, MatrixConfig};
use crate::endpoints::{self, Endpoint};
use crate::error::MatrixError;
use crate::events::{PropertyChange, CHANGE_CHANNEL_CAPACITY};
use crate::layer::{props, Layer, LayerState, Route, StreamId};
use crate::path::{NodePath, PropertyPath};
use crate::tree::{Actor, Change, PropertyTree};
use crate::value::Value;

/// `/V1/MEDIA`
pub fn media_root() -> NodePath {
    NodePath::from_segments(["V1", "MEDIA"])
}

/// Mount point of a layer's subtree
pub fn layer_root(layer: Layer) -> NodePath {
    media_root().child(layer.as_str())
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Which tree owns a node
enum Target {
    Management(NodePath),
    Layer(Layer, NodePath),
}

/// All device state
#[derive(Debug)]
pub struct DeviceStore {
    identity: DeviceIdentity,
    config: MatrixConfig,
    management: Mutex<PropertyTree>,
    layers: BTreeMap<Layer, Mutex<LayerState>>,
    changes: broadcast::Sender<PropertyChange>,
    retired: AtomicBool,
}

impl DeviceStore {
    /// Build a device with freshly generated identifiers
    pub fn new(config: MatrixConfig, identity: DeviceIdentity) -> Result<Self, MatrixError> {
        let blueprint = DeviceBlueprint::generate(&config);
        Self::build(config, identity, &blueprint)
    }

    /// Build a device from a blueprint
    ///
    /// Layers named in `config` but absent from the blueprint get fresh
    /// identifiers. Blueprint layers that are not configured are ignored.
    pub fn build(
        config: MatrixConfig,
        identity: DeviceIdentity,
        blueprint: &DeviceBlueprint,
    ) -> Result<Self, MatrixError> {
        let mut layers = BTreeMap::new();
        for layer in &config.layers {
            let state = match blueprint.layers.get(layer) {
                Some(seeds) => LayerState::build(*layer, seeds, &config)?,
                None => {
                    LayerState::build(*layer, &LayerBlueprint::generate(config.matrix_size), &config)?
                }
            };
            layers.insert(*layer, Mutex::new(state));
        }

        let size = layers
            .values()
            .map(|state| lock(state).inputs().len())
            .max()
            .unwrap_or(config.matrix_size);
        let management = Self::management_tree(&identity, size, layers.keys().copied());
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);

        debug!("Device built with layers {:?}", layers.keys().collect::<Vec<_>>());

        Ok(Self {
            identity,
            config,
            management: Mutex::new(management),
            layers,
            changes,
            retired: AtomicBool::new(false),
        })
    }

    fn management_tree(
        identity: &DeviceIdentity,
        endpoint_count: usize,
        layers: impl Iterator<Item = Layer>,
    ) -> PropertyTree {
        let mut tree = PropertyTree::new();
        let root = NodePath::root();
        for (name, value) in [
            ("ManufacturerName", &identity.manufacturer_name),
            ("ProductName", &identity.product_name),
            ("PartNumber", &identity.part_number),
            ("SerialNumber", &identity.serial_number),
            ("PackageVersion", &identity.package_version),
        ] {
            tree.add_property(&root.property(name), Value::string(value), false);
        }
        tree.add_property(
            &NodePath::from_segments(["V1", "APPLICATION"]).property("Name"),
            Value::string(&identity.application_name),
            false,
        );
        endpoints::install(&mut tree, endpoint_count);

        // Placeholders so listings of /V1/MEDIA show the mounted layers
        for layer in layers {
            tree.add_node(&layer_root(layer));
        }
        tree
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn config(&self) -> &MatrixConfig {
        &self.config
    }

    /// Configured layers in ascending order
    pub fn layers(&self) -> Vec<Layer> {
        self.layers.keys().copied().collect()
    }

    /// Receive every change applied from now on
    pub fn subscribe_changes(&self) -> broadcast::Receiver<PropertyChange> {
        self.changes.subscribe()
    }

    /// Refuse all further writes
    ///
    /// Writes already holding a lock finish first; a capture taken after
    /// this call sees every write that was acknowledged.
    pub fn retire(&self) {
        self.retired.store(true, Ordering::SeqCst);
    }

    /// Accept writes again after an aborted replacement
    pub fn reinstate(&self) {
        self.retired.store(false, Ordering::SeqCst);
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }

    fn ensure_live(&self) -> Result<(), MatrixError> {
        if self.is_retired() {
            Err(MatrixError::Retired)
        } else {
            Ok(())
        }
    }

    fn layer_lock(&self, layer: Layer) -> Result<&Mutex<LayerState>, MatrixError> {
        self.layers
            .get(&layer)
            .ok_or_else(|| MatrixError::LayerNotFound(layer.to_string()))
    }

    /// Read a layer under its lock
    pub fn with_layer<R>(
        &self,
        layer: Layer,
        f: impl FnOnce(&LayerState) -> Result<R, MatrixError>,
    ) -> Result<R, MatrixError> {
        let state = lock(self.layer_lock(layer)?);
        f(&state)
    }

    /// Mutate a layer under its lock and publish what changed
    pub(crate) fn mutate_layer<R>(
        &self,
        layer: Layer,
        f: impl FnOnce(&mut LayerState) -> Result<(R, Vec<Change>), MatrixError>,
    ) -> Result<R, MatrixError> {
        let mut state = lock(self.layer_lock(layer)?);
        self.ensure_live()?;
        let (result, changes) = f(&mut state)?;
        self.publish(&layer_root(layer), changes);
        Ok(result)
    }

    fn publish(&self, mount: &NodePath, changes: Vec<Change>) {
        for change in changes {
            // No receivers is fine
            let _ = self.changes.send(PropertyChange::from_change(change, mount));
        }
    }

    fn resolve(&self, node: &NodePath) -> Target {
        let media = media_root();
        if node.len() > media.len() && node.starts_with(&media) {
            let segment = node.segments()[media.len()].as_str();
            if let Some(layer) = Layer::ALL.into_iter().find(|l| l.as_str() == segment) {
                if self.layers.contains_key(&layer) {
                    let rest = node.segments()[media.len() + 1..].to_vec();
                    return Target::Layer(layer, NodePath::from_segments(rest));
                }
            }
        }
        Target::Management(node.clone())
    }

    // --- typed layer access ---

    pub fn list_inputs(&self, layer: Layer) -> Result<Vec<StreamId>, MatrixError> {
        self.with_layer(layer, |state| Ok(state.inputs().to_vec()))
    }

    pub fn list_outputs(&self, layer: Layer) -> Result<Vec<StreamId>, MatrixError> {
        self.with_layer(layer, |state| Ok(state.outputs().to_vec()))
    }

    pub fn find_input_by_alias(&self, layer: Layer, alias: &str) -> Result<Option<StreamId>, MatrixError> {
        self.with_layer(layer, |state| Ok(state.find_input_by_alias(alias).cloned()))
    }

    pub fn find_output_by_alias(&self, layer: Layer, alias: &str) -> Result<Option<StreamId>, MatrixError> {
        self.with_layer(layer, |state| Ok(state.find_output_by_alias(alias).cloned()))
    }

    /// `SignalPresent` of any Input or Output
    pub fn get_signal_present(&self, layer: Layer, id: &StreamId) -> Result<bool, MatrixError> {
        self.with_layer(layer, |state| state.signal_present(id))
    }

    /// Routing map entry of an Output
    pub fn route(&self, layer: Layer, output: &StreamId) -> Result<Route, MatrixError> {
        self.with_layer(layer, |state| state.route(output))
    }

    /// Complete routing map of a layer
    pub fn routing(&self, layer: Layer) -> Result<BTreeMap<StreamId, Route>, MatrixError> {
        self.with_layer(layer, LayerState::routing)
    }

    /// Test hook: change whether an Input sees a signal
    ///
    /// Outputs currently routed from the Input follow.
    pub fn set_input_signal_present(
        &self,
        layer: Layer,
        input: &StreamId,
        present: bool,
    ) -> Result<(), MatrixError> {
        self.mutate_layer(layer, |state| {
            Self::require_input(state, input)?;
            let changes = state.tree_mut().set(
                &input.property(props::SIGNAL_PRESENT),
                Value::Bool(present),
                Actor::External,
            )?;
            Ok(((), changes))
        })
    }

    /// Change an Input's `Enabled` flag regardless of its external access
    pub fn set_input_enabled(
        &self,
        layer: Layer,
        input: &StreamId,
        enabled: bool,
    ) -> Result<(), MatrixError> {
        self.mutate_layer(layer, |state| {
            Self::require_input(state, input)?;
            let changes = state.tree_mut().set(
                &input.property(props::ENABLED),
                Value::Bool(enabled),
                Actor::Internal,
            )?;
            Ok(((), changes))
        })
    }

    fn require_input(state: &LayerState, input: &StreamId) -> Result<(), MatrixError> {
        if state.is_input(input) {
            Ok(())
        } else {
            Err(MatrixError::SourceNotFound {
                layer: state.layer(),
                stream: input.to_string(),
            })
        }
    }

    // --- path-addressed access ---

    /// Value and writability of any property
    pub fn get_value(&self, path: &PropertyPath) -> Result<(Value, bool), MatrixError> {
        let read = |tree: &PropertyTree, path: &PropertyPath| {
            tree.property(path)
                .map(|prop| (prop.value().clone(), prop.is_writable()))
        };
        match self.resolve(&path.node) {
            Target::Management(node) => {
                read(&*lock(&self.management), &PropertyPath::new(node, path.property.clone()))
            }
            Target::Layer(layer, node) => self.with_layer(layer, |state| {
                read(state.tree(), &PropertyPath::new(node, path.property.clone()))
            }),
        }
        .map_err(|e| match e {
            MatrixError::NotFound(_) => MatrixError::NotFound(path.to_string()),
            other => other,
        })
    }

    /// Write any property from wire text and return the stored value
    pub fn set_raw(&self, path: &PropertyPath, raw: &str, actor: Actor) -> Result<Value, MatrixError> {
        let relabel = |e: MatrixError| match e {
            MatrixError::NotFound(_) => MatrixError::NotFound(path.to_string()),
            MatrixError::ReadOnly(_) => MatrixError::ReadOnly(path.to_string()),
            MatrixError::InvalidValue { value, .. } => MatrixError::InvalidValue {
                path: path.to_string(),
                value,
            },
            other => other,
        };

        match self.resolve(&path.node) {
            Target::Management(node) => {
                let rel = PropertyPath::new(node, path.property.clone());
                let mut tree = lock(&self.management);
                self.ensure_live()?;
                let changes = tree.set_raw(&rel, raw, actor).map_err(relabel)?;
                let stored = tree.get(&rel).map_err(relabel)?.clone();
                self.publish(&NodePath::root(), changes);
                Ok(stored)
            }
            Target::Layer(layer, node) => self.mutate_layer(layer, |state| {
                let rel = PropertyPath::new(node, path.property.clone());
                let changes = state.tree_mut().set_raw(&rel, raw, actor).map_err(relabel)?;
                let stored = state.tree().get(&rel).map_err(relabel)?.clone();
                Ok((stored, changes))
            }),
        }
    }

    /// Child names of any node
    pub fn children(&self, node: &NodePath) -> Result<Vec<String>, MatrixError> {
        match self.resolve(node) {
            Target::Management(rel) => lock(&self.management).children(&rel),
            Target::Layer(layer, rel) => self.with_layer(layer, |state| state.tree().children(&rel)),
        }
        .map_err(|_| MatrixError::NotFound(node.to_string()))
    }

    /// Properties of any node as `(name, value, writable)`
    pub fn properties(&self, node: &NodePath) -> Result<Vec<(String, Value, bool)>, MatrixError> {
        match self.resolve(node) {
            Target::Management(rel) => lock(&self.management).properties(&rel),
            Target::Layer(layer, rel) => {
                self.with_layer(layer, |state| state.tree().properties(&rel))
            }
        }
        .map_err(|_| MatrixError::NotFound(node.to_string()))
    }

    /// Plain mapping of any subtree, layers grafted in place
    pub fn snapshot(&self, node: &NodePath) -> Result<serde_json::Value, MatrixError> {
        match self.resolve(node) {
            Target::Layer(layer, rel) => self.with_layer(layer, |state| state.tree().snapshot(&rel)),
            Target::Management(rel) => {
                let mut json = lock(&self.management).snapshot(&rel)?;
                for layer in self.layers() {
                    let Some(below) = layer_root(layer).strip_prefix(&rel) else {
                        continue;
                    };
                    let layer_json =
                        self.with_layer(layer, |state| state.tree().snapshot(&NodePath::root()))?;
                    let slot = below
                        .segments()
                        .iter()
                        .try_fold(&mut json, |value, segment| value.get_mut(segment.as_str()));
                    if let Some(slot) = slot {
                        *slot = layer_json;
                    }
                }
                Ok(json)
            }
        }
        .map_err(|e| match e {
            MatrixError::NotFound(_) => MatrixError::NotFound(node.to_string()),
            other => other,
        })
    }

    // --- endpoints ---

    pub fn endpoints(&self) -> Result<Vec<Endpoint>, MatrixError> {
        endpoints::read(&lock(&self.management))
    }

    /// Update an endpoint's label and/or address
    pub fn set_endpoint(
        &self,
        id: &str,
        label: Option<&str>,
        ip_address: Option<&str>,
    ) -> Result<(), MatrixError> {
        let node = endpoints::device_map().child(id);
        let mut tree = lock(&self.management);
        self.ensure_live()?;
        if tree.node(&node).is_none() {
            return Err(MatrixError::NotFound(node.to_string()));
        }

        let mut changes = Vec::new();
        for (name, value) in [(endpoints::DEVICE_LABEL, label), (endpoints::IP_ADDRESS, ip_address)] {
            if let Some(value) = value {
                changes.extend(tree.set(&node.property(name), Value::string(value), Actor::Internal)?);
            }
        }
        self.publish(&NodePath::root(), changes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> DeviceStore {
        DeviceStore::new(MatrixConfig::default(), DeviceIdentity::default()).unwrap()
    }

    fn path(text: &str) -> PropertyPath {
        let (node, prop) = text.rsplit_once('.').unwrap();
        PropertyPath::new(node.parse().unwrap(), prop)
    }

    #[test]
    fn test_identity_properties() {
        let store = store();
        let (value, writable) = store.get_value(&path("/.ProductName")).unwrap();
        assert_eq!(value.to_string(), "TPN-MMU-X100");
        assert!(!writable);
        let (name, _) = store.get_value(&path("/V1/APPLICATION.Name")).unwrap();
        assert_eq!(name.to_string(), "TPN_MMU Emulator");
    }

    #[test]
    fn test_media_listing_shows_layers() {
        let store = store();
        let children = store.children(&media_root()).unwrap();
        assert_eq!(children, vec!["AUDIO", "USBHID", "USBICRON", "VIDEO"]);

        let video = store.children(&layer_root(Layer::Video)).unwrap();
        assert_eq!(video.len(), 7);
        assert!(video.contains(&"XP".to_string()));
    }

    #[test]
    fn test_unconfigured_layer_is_not_found() {
        let config = MatrixConfig {
            layers: vec![Layer::Video],
            ..MatrixConfig::default()
        };
        let store = DeviceStore::new(config, DeviceIdentity::default()).unwrap();
        assert!(store.children(&layer_root(Layer::Audio)).is_err());
        assert!(matches!(
            store.list_inputs(Layer::Audio),
            Err(MatrixError::LayerNotFound(_))
        ));
    }

    #[test]
    fn test_read_only_and_invalid_writes() {
        let store = store();
        let input = store.list_inputs(Layer::Video).unwrap()[0].clone();
        let alias = input.property(props::STREAM_ALIAS).rebase(&layer_root(Layer::Video));

        let err = store.set_raw(&alias, "X", Actor::External).unwrap_err();
        assert_eq!(err, MatrixError::ReadOnly(alias.to_string()));

        let signal = input.property(props::SIGNAL_PRESENT).rebase(&layer_root(Layer::Video));
        assert!(matches!(
            store.set_raw(&signal, "maybe", Actor::External),
            Err(MatrixError::InvalidValue { .. })
        ));
        let stored = store.set_raw(&signal, "false", Actor::External).unwrap();
        assert_eq!(stored, Value::Bool(false));
    }

    #[test]
    fn test_changes_are_published_with_absolute_paths() {
        let store = store();
        let mut rx = store.subscribe_changes();
        let input = store.list_inputs(Layer::Audio).unwrap()[1].clone();

        store.set_input_signal_present(Layer::Audio, &input, false).unwrap();

        let change = rx.try_recv().unwrap();
        assert_eq!(
            change.path,
            input.property(props::SIGNAL_PRESENT).rebase(&layer_root(Layer::Audio))
        );
        assert_eq!(change.value, Value::Bool(false));
        assert_eq!(change.actor, Actor::External);
    }

    #[test]
    fn test_snapshot_grafts_layers() {
        let store = store();
        let root = store.snapshot(&NodePath::root()).unwrap();
        assert_eq!(root["ProductName"], serde_json::json!("TPN-MMU-X100"));

        let input = store.list_inputs(Layer::Video).unwrap()[0].clone();
        assert_eq!(
            root["V1"]["MEDIA"]["VIDEO"][input.as_str()]["SignalPresent"],
            serde_json::json!(true)
        );

        let layer = store.snapshot(&layer_root(Layer::UsbIcron)).unwrap();
        assert!(layer.get("XP").is_some());
    }

    #[test]
    fn test_set_endpoint() {
        let store = store();
        let mut rx = store.subscribe_changes();
        store.set_endpoint("X2", Some("Lectern"), None).unwrap();

        let endpoints = store.endpoints().unwrap();
        assert_eq!(endpoints[1].label, "Lectern");
        assert_eq!(endpoints[1].ip_address, "192.168.0.11");
        assert_eq!(rx.try_recv().unwrap().path.to_string(), "/V1/ENDPOINTS/DEVICEMAP/X2.DeviceLabel");

        assert!(matches!(
            store.set_endpoint("X99", Some("Nowhere"), None),
            Err(MatrixError::NotFound(_))
        ));
    }

    #[test]
    fn test_retired_store_rejects_writes() {
        let store = store();
        let input = store.find_input_by_alias(Layer::Video, "TX1").unwrap().unwrap();
        store.retire();

        assert_eq!(store.switch(Layer::Video, "TX1:RX1"), Err(MatrixError::Retired));
        assert_eq!(
            store.set_input_signal_present(Layer::Video, &input, false),
            Err(MatrixError::Retired)
        );
        assert_eq!(
            store.set_endpoint("X1", Some("Lectern"), None),
            Err(MatrixError::Retired)
        );
        assert_eq!(
            store.set_raw(
                &endpoints::device_map().child("X1").property(endpoints::DEVICE_LABEL),
                "Lectern",
                Actor::External
            ),
            Err(MatrixError::Retired)
        );

        // Reads still work and nothing was applied
        assert!(store.get_signal_present(Layer::Video, &input).unwrap());
        let rx1 = store.find_output_by_alias(Layer::Video, "RX1").unwrap().unwrap();
        assert_eq!(store.route(Layer::Video, &rx1).unwrap(), Route::Disconnected);

        store.reinstate();
        store.switch(Layer::Video, "TX1:RX1").unwrap();
        assert_eq!(store.route(Layer::Video, &rx1).unwrap(), Route::Input(input));
    }
}
