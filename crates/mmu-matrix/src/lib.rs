//! Matrix Switcher Device Model
//!
//! This crate holds the in-memory model of an AV-over-IP matrix switcher:
//! the property tree, the per-layer routing state, crosspoint switching and
//! the signal propagation that keeps Outputs in step with their Inputs.
//!
//! # Architecture
//!
//! - [`PropertyTree`] is the generic substrate: named nodes carrying typed
//!   properties, with synchronous, bounded-depth change subscriptions.
//! - [`DeviceStore`] owns one tree for management data and one
//!   [`LayerState`] per layer, each behind its own lock. Commands on the same
//!   layer serialize; different layers proceed independently.
//! - Switching (`switch`, `switch_all`, `set_route`) validates before it
//!   writes, then copies the source signal onto the Output.
//! - Propagation subscribes to every Input's `SignalPresent` and rewrites the
//!   Outputs routed from it. For every Output, `SignalPresent` equals that of
//!   its routed Input, or false when disconnected.
//! - [`SavedSnapshot`] captures identifiers and live values so that a new
//!   store can be built with the same identifiers.
//!
//! # Example
//!
//! ```rust
//! use mmu_matrix::{DeviceIdentity, DeviceStore, Layer, MatrixConfig};
//!
//! let store = DeviceStore::new(MatrixConfig::default(), DeviceIdentity::default()).unwrap();
//! store.switch(Layer::Video, "TX2:RX1").unwrap();
//!
//! let rx1 = store.find_output_by_alias(Layer::Video, "RX1").unwrap().unwrap();
//! assert!(store.get_signal_present(Layer::Video, &rx1).unwrap());
//! ```

pub mod blueprint;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod events;
pub mod layer;
pub mod path;
pub mod propagation;
pub mod snapshot;
pub mod state;
pub mod store;
pub mod switch;
pub mod tree;
pub mod value;

pub use blueprint::{DeviceBlueprint, LayerBlueprint, StreamSeed};
pub use config::{DeviceIdentity, MatrixConfig};
pub use endpoints::{Endpoint, EndpointRole};
pub use error::MatrixError;
pub use events::PropertyChange;
pub use layer::{Layer, LayerState, Route, StreamId, DISCONNECTED, XP_NODE};
pub use path::{NodePath, PropertyPath};
pub use snapshot::SavedSnapshot;
pub use state::{DeviceView, LayerView, StateSnapshot};
pub use store::{layer_root, media_root, DeviceStore};
pub use switch::{CrosspointCommand, SourceSpec};
pub use tree::{Actor, PropertyTree, MAX_DISPATCH_DEPTH};
pub use value::Value;
