//! Change notifications published by the device store

use crate::path::PropertyPath;
use crate::tree::{Actor, Change};
use crate::value::Value;

/// Capacity of the change broadcast channel
pub const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// A property change with an absolute path
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyChange {
    pub path: PropertyPath,
    pub value: Value,
    pub actor: Actor,
}

impl PropertyChange {
    /// Lift a tree-relative change into the device address space
    pub fn from_change(change: Change, mount: &crate::path::NodePath) -> Self {
        Self {
            path: change.path.rebase(mount),
            value: change.value,
            actor: change.actor,
        }
    }
}
