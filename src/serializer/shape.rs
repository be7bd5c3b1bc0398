//! Record of what a payload contains, used to read the response back.

use crate::graph::SaveMode;
use crate::model::DescriptorId;

/// How a node was rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    /// A full entry with properties
    Entity,
    /// An `@id` reference to an existing or already written entity
    Reference,
    /// A removal: a deleted entity or a deleted link
    Removed,
    /// `null` for a cleared single-valued navigation
    Cleared,
}

/// One emitted node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeNode {
    /// Entity descriptor for entries and nested entities, link descriptor otherwise
    pub descriptor: DescriptorId,
    /// Link that put this node under its parent, if any
    pub link: Option<DescriptorId>,
    pub kind: ShapeKind,
    pub navigations: Vec<ShapeNavigation>,
}

impl ShapeNode {
    pub(crate) fn leaf(descriptor: DescriptorId, link: Option<DescriptorId>, kind: ShapeKind) -> Self {
        Self {
            descriptor,
            link,
            kind,
            navigations: Vec::new(),
        }
    }

    /// Number of nodes in this subtree, including this one.
    #[must_use]
    pub fn node_count(&self) -> usize {
        1 + self
            .navigations
            .iter()
            .flat_map(|nav| &nav.nodes)
            .map(ShapeNode::node_count)
            .sum::<usize>()
    }
}

/// A navigation property as written on its parent entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeNavigation {
    pub property: String,
    /// Member name on the wire, e.g. `Cars@delta`
    pub wire_key: String,
    pub collection: bool,
    pub nodes: Vec<ShapeNode>,
}

/// Everything a request payload contains, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadShape {
    pub mode: SaveMode,
    /// True when the entries are wrapped in a `value` array
    pub envelope: bool,
    pub entity_set: Option<String>,
    pub roots: Vec<ShapeNode>,
}

impl PayloadShape {
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.roots.iter().map(ShapeNode::node_count).sum()
    }
}
