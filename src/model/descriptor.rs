//! Descriptors: the tracker's records of entities, links and streams.
//!
//! A [`Descriptor`] is a common [`DescriptorHeader`] (id, state, change order)
//! plus one of three payloads in [`DescriptorKind`]. Descriptors are created
//! and mutated only by the tracker; callers receive shared references.

use super::{InstanceId, ODataValue};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Change order of a descriptor that is not part of a pending change set.
pub const NO_CHANGE_ORDER: u64 = u64::MAX;

/// Tracking state of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityState {
    Detached,
    Unchanged,
    Added,
    Deleted,
    Modified,
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Detached => "Detached",
            Self::Unchanged => "Unchanged",
            Self::Added => "Added",
            Self::Deleted => "Deleted",
            Self::Modified => "Modified",
        };
        f.write_str(name)
    }
}

/// Arena key of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DescriptorId(u64);

impl DescriptorId {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DescriptorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "descriptor#{}", self.0)
    }
}

/// Fields shared by every descriptor kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorHeader {
    pub(crate) id: DescriptorId,
    pub(crate) state: EntityState,
    pub(crate) change_order: u64,
}

impl DescriptorHeader {
    pub(crate) fn new(id: DescriptorId, state: EntityState) -> Self {
        Self {
            id,
            state,
            change_order: NO_CHANGE_ORDER,
        }
    }

    /// True when the descriptor carries a pending change.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.state != EntityState::Unchanged && self.change_order != NO_CHANGE_ORDER
    }
}

/// A tracked entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDescriptor {
    instance: InstanceId,
    pub(crate) type_name: String,
    pub(crate) entity_set: Option<String>,
    /// Relative canonical path such as `People(100)`, once keys are known
    pub(crate) identity: Option<String>,
    pub(crate) etag: Option<String>,
    pub(crate) streams: Vec<DescriptorId>,
    /// Server-known property values, refreshed on attach and after a save
    pub(crate) snapshot: IndexMap<String, ODataValue>,
    /// Properties written since the snapshot, in write order
    pub(crate) changed_properties: IndexSet<String>,
}

impl EntityDescriptor {
    pub(crate) fn new(instance: InstanceId, type_name: impl Into<String>) -> Self {
        Self {
            instance,
            type_name: type_name.into(),
            entity_set: None,
            identity: None,
            etag: None,
            streams: Vec::new(),
            snapshot: IndexMap::new(),
            changed_properties: IndexSet::new(),
        }
    }

    /// The instance this descriptor tracks.
    #[must_use]
    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    #[must_use]
    pub fn entity_set(&self) -> Option<&str> {
        self.entity_set.as_deref()
    }

    #[must_use]
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    #[must_use]
    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    #[must_use]
    pub fn streams(&self) -> &[DescriptorId] {
        &self.streams
    }

    #[must_use]
    pub fn snapshot(&self) -> &IndexMap<String, ODataValue> {
        &self.snapshot
    }

    #[must_use]
    pub fn changed_properties(&self) -> &IndexSet<String> {
        &self.changed_properties
    }
}

/// A tracked relationship between two entity instances.
///
/// `target == None` records a cleared single-valued navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkDescriptor {
    pub(crate) source: InstanceId,
    pub(crate) source_property: String,
    pub(crate) target: Option<InstanceId>,
}

impl LinkDescriptor {
    #[must_use]
    pub fn source(&self) -> InstanceId {
        self.source
    }

    #[must_use]
    pub fn source_property(&self) -> &str {
        &self.source_property
    }

    #[must_use]
    pub fn target(&self) -> Option<InstanceId> {
        self.target
    }
}

/// A media resource (`name == None`) or named stream property of an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDescriptor {
    pub(crate) entity: InstanceId,
    pub(crate) name: Option<String>,
    pub(crate) content_type: String,
    pub(crate) content: Vec<u8>,
    pub(crate) etag: Option<String>,
}

impl StreamDescriptor {
    #[must_use]
    pub fn entity(&self) -> InstanceId {
        self.entity
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    #[must_use]
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    #[must_use]
    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }
}

/// Kind-specific payload of a descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum DescriptorKind {
    Entity(EntityDescriptor),
    Link(LinkDescriptor),
    Stream(StreamDescriptor),
}

/// A tracked record.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    pub(crate) header: DescriptorHeader,
    pub(crate) kind: DescriptorKind,
}

impl Descriptor {
    pub(crate) fn new(id: DescriptorId, state: EntityState, kind: DescriptorKind) -> Self {
        Self {
            header: DescriptorHeader::new(id, state),
            kind,
        }
    }

    #[must_use]
    pub fn id(&self) -> DescriptorId {
        self.header.id
    }

    #[must_use]
    pub fn state(&self) -> EntityState {
        self.header.state
    }

    #[must_use]
    pub fn change_order(&self) -> u64 {
        self.header.change_order
    }

    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.header.is_modified()
    }

    #[must_use]
    pub fn header(&self) -> &DescriptorHeader {
        &self.header
    }

    #[must_use]
    pub fn kind(&self) -> &DescriptorKind {
        &self.kind
    }

    #[must_use]
    pub fn as_entity(&self) -> Option<&EntityDescriptor> {
        match &self.kind {
            DescriptorKind::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    pub(crate) fn as_entity_mut(&mut self) -> Option<&mut EntityDescriptor> {
        match &mut self.kind {
            DescriptorKind::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_link(&self) -> Option<&LinkDescriptor> {
        match &self.kind {
            DescriptorKind::Link(link) => Some(link),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_stream(&self) -> Option<&StreamDescriptor> {
        match &self.kind {
            DescriptorKind::Stream(stream) => Some(stream),
            _ => None,
        }
    }

    /// Short kind label for logs.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            DescriptorKind::Entity(_) => "entity",
            DescriptorKind::Link(_) => "link",
            DescriptorKind::Stream(_) => "stream",
        }
    }
}
