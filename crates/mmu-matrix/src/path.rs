//! Node and property addressing

use std::fmt;
use std::str::FromStr;

use crate::error::MatrixError;

/// Slash-separated path of a node, relative to some tree root
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodePath(Vec<String>);

impl NodePath {
    /// The root node
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Build a path from segment names
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Path of a named child of this node
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.into());
        Self(segments)
    }

    /// Segment names from the root down
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Whether this is the root path
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of segments
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the path has no segments
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Concatenate a relative path onto this one
    pub fn join(&self, relative: &NodePath) -> Self {
        let mut segments = self.0.clone();
        segments.extend(relative.0.iter().cloned());
        Self(segments)
    }

    /// Whether `prefix` is this path or one of its ancestors
    pub fn starts_with(&self, prefix: &NodePath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Remainder of this path below `prefix`
    pub fn strip_prefix(&self, prefix: &NodePath) -> Option<NodePath> {
        self.0
            .strip_prefix(prefix.0.as_slice())
            .map(|rest| Self(rest.to_vec()))
    }

    /// Address a property of this node
    pub fn property(&self, name: impl Into<String>) -> PropertyPath {
        PropertyPath::new(self.clone(), name)
    }
}

impl FromStr for NodePath {
    type Err = MatrixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix('/')
            .ok_or_else(|| MatrixError::InvalidPath(s.to_string()))?;
        if rest.is_empty() {
            return Ok(Self::root());
        }

        let segments: Vec<String> = rest.split('/').map(str::to_string).collect();
        if segments.iter().any(|seg| seg.is_empty() || seg.contains('.')) {
            return Err(MatrixError::InvalidPath(s.to_string()));
        }
        Ok(Self(segments))
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "/");
        }
        for segment in &self.0 {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

/// A property on a node: `/node/path.Property`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyPath {
    /// Owning node
    pub node: NodePath,
    /// Property name
    pub property: String,
}

impl PropertyPath {
    /// Create a property path
    pub fn new(node: NodePath, property: impl Into<String>) -> Self {
        Self {
            node,
            property: property.into(),
        }
    }

    /// Re-root this path below `base`
    pub fn rebase(&self, base: &NodePath) -> Self {
        Self::new(base.join(&self.node), self.property.clone())
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.node.is_root() {
            write!(f, "/.{}", self.property)
        } else {
            write!(f, "{}.{}", self.node, self.property)
        }
    }
}
