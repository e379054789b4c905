//! Control surface of the emulator
//!
//! [`Emulator`] is what a status page, test harness or the binary talks to.
//! Layers and streams are addressed by their wire names so callers do not
//! need the model types. Every call runs against the current device store
//! and holds off a listener restart until it returns, so an acknowledged
//! write is never lost to a device swap.

use std::net::SocketAddr;
use std::sync::Arc;

use mmu_matrix::{
    DeviceIdentity, DeviceStore, Layer, MatrixConfig, MatrixError, NodePath, Route,
    StateSnapshot, StreamId, DISCONNECTED,
};
use tracing::info;

use crate::config::ListenerConfig;
use crate::error::ListenerError;
use crate::listener::ListenerManager;

/// The emulated device and its network listener
#[derive(Debug)]
pub struct Emulator {
    listener: ListenerManager,
}

impl Emulator {
    /// Build a device with fresh identifiers; the listener starts disabled
    pub fn new(
        matrix: MatrixConfig,
        identity: DeviceIdentity,
        listener: ListenerConfig,
    ) -> Result<Self, MatrixError> {
        let device = DeviceStore::new(matrix, identity)?;
        info!(
            "Emulating {} {} with layers {:?}",
            device.identity().manufacturer_name,
            device.identity().product_name,
            device.layers()
        );
        Ok(Self {
            listener: ListenerManager::new(listener, device),
        })
    }

    /// The current device store
    ///
    /// Writes through this handle fail once a listener restart replaces it;
    /// the methods below always reach the current store.
    pub fn device(&self) -> Arc<DeviceStore> {
        self.listener.device()
    }

    pub fn listener(&self) -> &ListenerManager {
        &self.listener
    }

    fn layer(name: &str) -> Result<Layer, MatrixError> {
        name.parse()
    }

    /// Execute a `SRC:DST` crosspoint command
    pub fn switch(&self, layer: &str, command: &str) -> Result<(), MatrixError> {
        let layer = Self::layer(layer)?;
        self.listener.with_device(|device| device.switch(layer, command))
    }

    /// Route every Output of a layer to one source, or `"0"` to disconnect
    pub fn switch_all(&self, layer: &str, source: &str) -> Result<(), MatrixError> {
        let layer = Self::layer(layer)?;
        self.listener.with_device(|device| device.switch_all(layer, source))
    }

    pub fn set_input_signal_present(
        &self,
        layer: &str,
        input_id: &str,
        present: bool,
    ) -> Result<(), MatrixError> {
        let layer = Self::layer(layer)?;
        self.listener.with_device(|device| {
            device.set_input_signal_present(layer, &StreamId::new(input_id), present)
        })
    }

    /// Change an Input's `Enabled` flag, when inputs are configured writable
    pub fn set_input_enabled(
        &self,
        layer: &str,
        input_id: &str,
        enabled: bool,
    ) -> Result<(), MatrixError> {
        let layer = Self::layer(layer)?;
        self.listener.with_device(|device| {
            if !device.config().writable_enabled {
                return Err(MatrixError::ReadOnly(format!(
                    "/V1/MEDIA/{}/{}.Enabled",
                    layer, input_id
                )));
            }
            device.set_input_enabled(layer, &StreamId::new(input_id), enabled)
        })
    }

    /// Route an Output by identifier; `None` or `"0"` disconnects it
    pub fn route_destination(
        &self,
        layer: &str,
        output_id: &str,
        input_id: Option<&str>,
    ) -> Result<(), MatrixError> {
        let route = match input_id {
            None | Some(DISCONNECTED) | Some("") => Route::Disconnected,
            Some(id) => Route::Input(StreamId::new(id)),
        };
        let layer = Self::layer(layer)?;
        self.listener
            .with_device(|device| device.set_route(layer, &StreamId::new(output_id), &route))
    }

    /// Edit a management endpoint's label and/or IP address
    pub fn set_endpoint(
        &self,
        id: &str,
        label: Option<&str>,
        ip_address: Option<&str>,
    ) -> Result<(), MatrixError> {
        self.listener
            .with_device(|device| device.set_endpoint(id, label, ip_address))
    }

    pub fn find_input_by_alias(&self, layer: &str, alias: &str) -> Result<Option<StreamId>, MatrixError> {
        let layer = Self::layer(layer)?;
        self.listener
            .with_device(|device| device.find_input_by_alias(layer, alias))
    }

    /// Everything a status surface shows
    pub fn state_snapshot(&self) -> Result<StateSnapshot, MatrixError> {
        let listener_enabled = self.is_listener_enabled();
        self.listener
            .with_device(|device| StateSnapshot::capture(device, listener_enabled))
    }

    /// Plain mapping of any subtree, e.g. `/V1/MEDIA/VIDEO`
    pub fn property_snapshot(&self, path: &str) -> Result<serde_json::Value, MatrixError> {
        let node: NodePath = path.parse()?;
        self.listener.with_device(|device| device.snapshot(&node))
    }

    pub async fn enable_listener(&self) -> Result<(), ListenerError> {
        self.listener.enable().await
    }

    pub async fn disable_listener(&self) -> Result<(), ListenerError> {
        self.listener.disable().await
    }

    pub fn is_listener_enabled(&self) -> bool {
        self.listener.is_enabled()
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr().await
    }
}
