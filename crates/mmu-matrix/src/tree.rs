//! Property node model
//!
//! A generic ownership tree of named nodes, each carrying typed properties
//! and child nodes. Everything the device exposes is stored here.
//!
//! # Subscriptions
//!
//! Subscribers are attached to a single property and invoked synchronously,
//! in registration order, whenever that property is written. A subscriber
//! never mutates the tree directly; it returns follow-up [`Write`]s which the
//! dispatcher applies as internal writes. Dispatch is breadth-first and
//! bounded by [`MAX_DISPATCH_DEPTH`], so a cycle of subscribers cannot
//! recurse forever.
//!
//! External writes notify unconditionally. Internal writes that would not
//! change the stored value are skipped entirely.

use std::collections::{BTreeMap, HashMap, VecDeque};

use tracing::warn;

use crate::error::MatrixError;
use crate::path::{NodePath, PropertyPath};
use crate::value::Value;

/// Maximum cascade depth of subscriber-triggered writes
pub const MAX_DISPATCH_DEPTH: usize = 8;

/// Who is performing a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    /// A client outside the core; subject to the read-only guard
    External,
    /// Core code; may write any property
    Internal,
}

/// A property write that was applied to the tree
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    /// Property path relative to the tree root
    pub path: PropertyPath,
    /// Value now stored
    pub value: Value,
    /// Origin of the write
    pub actor: Actor,
}

/// A follow-up write requested by a subscriber
#[derive(Debug, Clone, PartialEq)]
pub struct Write {
    /// Property to write
    pub path: PropertyPath,
    /// New value
    pub value: Value,
}

/// Callback attached to a property
pub type Subscriber = Box<dyn Fn(&Change, &PropertyTree) -> Vec<Write> + Send + Sync>;

/// A single property slot
#[derive(Debug, Clone)]
pub struct Property {
    value: Value,
    writable: bool,
}

impl Property {
    /// Current value
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Whether external clients may write it
    pub fn is_writable(&self) -> bool {
        self.writable
    }
}

/// A node: properties plus named children
#[derive(Debug, Clone, Default)]
pub struct Node {
    properties: BTreeMap<String, Property>,
    children: BTreeMap<String, Node>,
}

impl Node {
    /// Child node names in ascending order
    pub fn child_names(&self) -> impl Iterator<Item = &str> {
        self.children.keys().map(String::as_str)
    }

    /// Properties in ascending name order
    pub fn properties(&self) -> impl Iterator<Item = (&str, &Property)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (name, prop) in &self.properties {
            map.insert(name.clone(), prop.value.to_json());
        }
        for (name, child) in &self.children {
            map.insert(name.clone(), child.to_json());
        }
        serde_json::Value::Object(map)
    }
}

/// The property tree
#[derive(Default)]
pub struct PropertyTree {
    root: Node,
    subscribers: HashMap<PropertyPath, Vec<Subscriber>>,
}

impl std::fmt::Debug for PropertyTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyTree")
            .field("root", &self.root)
            .field("subscribed_properties", &self.subscribers.len())
            .finish()
    }
}

impl PropertyTree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a node (and any missing ancestors)
    pub fn add_node(&mut self, path: &NodePath) {
        let mut node = &mut self.root;
        for segment in path.segments() {
            node = node.children.entry(segment.clone()).or_default();
        }
    }

    /// Create or replace a property, creating its node if needed
    pub fn add_property(&mut self, path: &PropertyPath, value: Value, writable: bool) {
        self.add_node(&path.node);
        if let Some(node) = self.node_mut(&path.node) {
            node.properties
                .insert(path.property.clone(), Property { value, writable });
        }
    }

    /// Look up a node
    pub fn node(&self, path: &NodePath) -> Option<&Node> {
        path.segments()
            .iter()
            .try_fold(&self.root, |node, seg| node.children.get(seg))
    }

    fn node_mut(&mut self, path: &NodePath) -> Option<&mut Node> {
        path.segments()
            .iter()
            .try_fold(&mut self.root, |node, seg| node.children.get_mut(seg))
    }

    fn require_node(&self, path: &NodePath) -> Result<&Node, MatrixError> {
        self.node(path)
            .ok_or_else(|| MatrixError::NotFound(path.to_string()))
    }

    /// Look up a property slot
    pub fn property(&self, path: &PropertyPath) -> Result<&Property, MatrixError> {
        self.node(&path.node)
            .and_then(|node| node.properties.get(&path.property))
            .ok_or_else(|| MatrixError::NotFound(path.to_string()))
    }

    fn property_mut(&mut self, path: &PropertyPath) -> Result<&mut Property, MatrixError> {
        self.node_mut(&path.node)
            .and_then(|node| node.properties.get_mut(&path.property))
            .ok_or_else(|| MatrixError::NotFound(path.to_string()))
    }

    /// Current value of a property
    pub fn get(&self, path: &PropertyPath) -> Result<&Value, MatrixError> {
        self.property(path).map(Property::value)
    }

    /// Child names of a node
    pub fn children(&self, path: &NodePath) -> Result<Vec<String>, MatrixError> {
        Ok(self
            .require_node(path)?
            .child_names()
            .map(str::to_string)
            .collect())
    }

    /// Properties of a node as `(name, value, writable)`
    pub fn properties(&self, path: &NodePath) -> Result<Vec<(String, Value, bool)>, MatrixError> {
        Ok(self
            .require_node(path)?
            .properties()
            .map(|(name, prop)| (name.to_string(), prop.value.clone(), prop.writable))
            .collect())
    }

    /// Write a property and dispatch subscribers
    ///
    /// Returns every change applied, the requested one first followed by any
    /// cascaded internal writes.
    pub fn set(
        &mut self,
        path: &PropertyPath,
        value: Value,
        actor: Actor,
    ) -> Result<Vec<Change>, MatrixError> {
        let prop = self.property_mut(path)?;

        if actor == Actor::External && !prop.writable {
            return Err(MatrixError::ReadOnly(path.to_string()));
        }
        if !prop.value.same_kind(&value) {
            return Err(MatrixError::InvalidValue {
                path: path.to_string(),
                value: value.to_string(),
            });
        }
        if actor == Actor::Internal && prop.value == value {
            return Ok(Vec::new());
        }

        prop.value = value.clone();
        Ok(self.dispatch(Change {
            path: path.clone(),
            value,
            actor,
        }))
    }

    /// Write a property from wire text, converting to the property's type
    pub fn set_raw(
        &mut self,
        path: &PropertyPath,
        raw: &str,
        actor: Actor,
    ) -> Result<Vec<Change>, MatrixError> {
        let value = self
            .get(path)?
            .parse_like(raw)
            .ok_or_else(|| MatrixError::InvalidValue {
                path: path.to_string(),
                value: raw.to_string(),
            })?;
        self.set(path, value, actor)
    }

    /// Attach a subscriber to an existing property
    pub fn subscribe(&mut self, path: &PropertyPath, subscriber: Subscriber) -> Result<(), MatrixError> {
        self.property(path)?;
        self.subscribers
            .entry(path.clone())
            .or_default()
            .push(subscriber);
        Ok(())
    }

    /// Plain mapping of a subtree's current values
    pub fn snapshot(&self, path: &NodePath) -> Result<serde_json::Value, MatrixError> {
        Ok(self.require_node(path)?.to_json())
    }

    fn dispatch(&mut self, first: Change) -> Vec<Change> {
        let mut applied = Vec::new();
        let mut queue = VecDeque::from([(first, 0usize)]);

        while let Some((change, depth)) = queue.pop_front() {
            let writes: Vec<Write> = {
                let tree: &PropertyTree = self;
                match tree.subscribers.get(&change.path) {
                    Some(subs) => subs.iter().flat_map(|sub| sub(&change, tree)).collect(),
                    None => Vec::new(),
                }
            };
            applied.push(change);

            for write in writes {
                if depth >= MAX_DISPATCH_DEPTH {
                    warn!("Dropping cascaded write to {}: depth limit reached", write.path);
                    continue;
                }
                match self.apply_internal(write) {
                    Ok(Some(next)) => queue.push_back((next, depth + 1)),
                    Ok(None) => {}
                    Err(e) => warn!("Cascaded write failed: {}", e),
                }
            }
        }

        applied
    }

    /// Compare-and-set without dispatch; the caller queues the change
    fn apply_internal(&mut self, write: Write) -> Result<Option<Change>, MatrixError> {
        let prop = self.property_mut(&write.path)?;
        if !prop.value.same_kind(&write.value) {
            return Err(MatrixError::InvalidValue {
                path: write.path.to_string(),
                value: write.value.to_string(),
            });
        }
        if prop.value == write.value {
            return Ok(None);
        }
        prop.value = write.value.clone();
        Ok(Some(Change {
            path: write.path,
            value: write.value,
            actor: Actor::Internal,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;

    fn prop(node: &str, name: &str) -> PropertyPath {
        NodePath::from_segments([node]).property(name)
    }

    fn sample_tree() -> PropertyTree {
        let mut tree = PropertyTree::new();
        tree.add_property(&prop("A", "Flag"), Value::Bool(false), true);
        tree.add_property(&prop("A", "Label"), Value::string("a"), false);
        tree.add_property(&prop("B", "Flag"), Value::Bool(false), false);
        tree
    }

    #[test]
    fn test_get_and_not_found() {
        let tree = sample_tree();
        assert_eq!(tree.get(&prop("A", "Flag")).unwrap(), &Value::Bool(false));
        assert!(matches!(
            tree.get(&prop("A", "Missing")),
            Err(MatrixError::NotFound(_))
        ));
        assert!(matches!(
            tree.get(&prop("Z", "Flag")),
            Err(MatrixError::NotFound(_))
        ));
    }

    #[test]
    fn test_read_only_guard_applies_to_external_only() {
        let mut tree = sample_tree();
        let label = prop("A", "Label");

        assert!(matches!(
            tree.set(&label, Value::string("x"), Actor::External),
            Err(MatrixError::ReadOnly(_))
        ));
        assert_eq!(tree.get(&label).unwrap(), &Value::string("a"));

        tree.set(&label, Value::string("x"), Actor::Internal).unwrap();
        assert_eq!(tree.get(&label).unwrap(), &Value::string("x"));
    }

    #[test]
    fn test_type_mismatch_is_rejected() {
        let mut tree = sample_tree();
        let result = tree.set(&prop("A", "Flag"), Value::Int(1), Actor::Internal);
        assert!(matches!(result, Err(MatrixError::InvalidValue { .. })));
        assert!(matches!(
            tree.set_raw(&prop("A", "Flag"), "maybe", Actor::External),
            Err(MatrixError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_external_write_notifies_even_when_unchanged() {
        let mut tree = sample_tree();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        tree.subscribe(
            &prop("A", "Flag"),
            Box::new(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Vec::new()
            }),
        )
        .unwrap();

        tree.set(&prop("A", "Flag"), Value::Bool(false), Actor::External).unwrap();
        tree.set(&prop("A", "Flag"), Value::Bool(false), Actor::External).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        // Internal no-op writes are skipped
        let changes = tree.set(&prop("A", "Flag"), Value::Bool(false), Actor::Internal).unwrap();
        assert!(changes.is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_subscribers_run_in_registration_order() {
        let mut tree = sample_tree();
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            tree.subscribe(
                &prop("A", "Flag"),
                Box::new(move |_, _| {
                    order.lock().unwrap().push(tag);
                    Vec::new()
                }),
            )
            .unwrap();
        }

        tree.set(&prop("A", "Flag"), Value::Bool(true), Actor::External).unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_cascade_applies_follow_up_writes() {
        let mut tree = sample_tree();
        tree.subscribe(
            &prop("A", "Flag"),
            Box::new(|change, _| {
                vec![Write {
                    path: prop("B", "Flag"),
                    value: change.value.clone(),
                }]
            }),
        )
        .unwrap();

        let changes = tree.set(&prop("A", "Flag"), Value::Bool(true), Actor::External).unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[1].path, prop("B", "Flag"));
        assert_eq!(changes[1].actor, Actor::Internal);
        assert_eq!(tree.get(&prop("B", "Flag")).unwrap(), &Value::Bool(true));
    }

    #[test]
    fn test_cycle_is_bounded() {
        let mut tree = PropertyTree::new();
        tree.add_property(&prop("A", "N"), Value::Int(0), true);
        tree.add_property(&prop("B", "N"), Value::Int(0), false);

        // A -> B -> A ... each hop increments, so compare-and-skip never stops it
        for (from, to) in [("A", "B"), ("B", "A")] {
            tree.subscribe(
                &prop(from, "N"),
                Box::new(move |change, _| {
                    let n = change.value.as_int().unwrap_or_default();
                    vec![Write {
                        path: prop(to, "N"),
                        value: Value::Int(n + 1),
                    }]
                }),
            )
            .unwrap();
        }

        let changes = tree.set(&prop("A", "N"), Value::Int(1), Actor::External).unwrap();
        assert_eq!(changes.len(), MAX_DISPATCH_DEPTH + 1);
    }

    #[test]
    fn test_subscribe_requires_existing_property() {
        let mut tree = sample_tree();
        let result = tree.subscribe(&prop("A", "Nope"), Box::new(|_, _| Vec::new()));
        assert!(matches!(result, Err(MatrixError::NotFound(_))));
    }

    #[test]
    fn test_snapshot_and_listing() {
        let tree = sample_tree();
        let snap = tree.snapshot(&NodePath::root()).unwrap();
        assert_eq!(snap["A"]["Flag"], serde_json::json!(false));
        assert_eq!(snap["A"]["Label"], serde_json::json!("a"));

        assert_eq!(tree.children(&NodePath::root()).unwrap(), vec!["A", "B"]);
        let props = tree.properties(&NodePath::from_segments(["A"])).unwrap();
        assert_eq!(props.len(), 2);
        assert!(props.iter().any(|(name, _, writable)| name == "Flag" && *writable));
    }
}
