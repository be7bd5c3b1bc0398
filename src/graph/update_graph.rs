//! The nested graph of descriptors to send in one request.

use crate::model::DescriptorId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which request a graph is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveMode {
    /// Delta payload with any number of roots, `PATCH` to the entity set
    BulkUpdate,
    /// Single new root with nested new entities, `POST` to the entity set
    DeepInsert,
}

impl fmt::Display for SaveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BulkUpdate => f.write_str("bulk update"),
            Self::DeepInsert => f.write_str("deep insert"),
        }
    }
}

/// How a related descriptor hangs off its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// The target entity itself is part of the change set and is nested
    NestedEntity,
    /// Only the relationship changed: a reference, a removal or a cleared value
    Link,
}

/// One child of a graph node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedDescriptor {
    /// Navigation property on the parent
    pub navigation: String,
    /// Link descriptor connecting parent and child
    pub link: DescriptorId,
    /// The child: the target entity for nested edges, the link otherwise
    pub descriptor: DescriptorId,
    pub kind: EdgeKind,
}

/// Tree overlay over the pending descriptors, rooted at the caller's entities.
///
/// Shared descendants appear under every parent that reaches them; the
/// serializer turns repeat encounters into references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateGraph {
    pub(crate) mode: SaveMode,
    pub(crate) top_level: Vec<DescriptorId>,
    pub(crate) related: IndexMap<DescriptorId, Vec<RelatedDescriptor>>,
    pub(crate) entity_set_name: Option<String>,
}

impl UpdateGraph {
    pub(crate) fn new(mode: SaveMode) -> Self {
        Self {
            mode,
            top_level: Vec::new(),
            related: IndexMap::new(),
            entity_set_name: None,
        }
    }

    #[must_use]
    pub fn mode(&self) -> SaveMode {
        self.mode
    }

    /// Root descriptors in caller order.
    #[must_use]
    pub fn top_level_descriptors(&self) -> &[DescriptorId] {
        &self.top_level
    }

    /// Entity set the request is addressed to.
    #[must_use]
    pub fn entity_set_name(&self) -> Option<&str> {
        self.entity_set_name.as_deref()
    }

    /// Edges leaving `node`, in the order they will be serialized.
    #[must_use]
    pub fn related(&self, node: DescriptorId) -> &[RelatedDescriptor] {
        self.related.get(&node).map_or(&[], Vec::as_slice)
    }

    /// Ordered immediate children of `node`.
    #[must_use]
    pub fn get_related_descriptors(&self, node: DescriptorId) -> Vec<DescriptorId> {
        self.related(node).iter().map(|edge| edge.descriptor).collect()
    }

    /// True when `id` is a root or a child of any node.
    #[must_use]
    pub fn contains(&self, id: DescriptorId) -> bool {
        self.top_level.contains(&id)
            || self
                .related
                .values()
                .flatten()
                .any(|edge| edge.descriptor == id || edge.link == id)
    }

    /// Number of nodes whose children were computed.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.related.len()
    }
}
