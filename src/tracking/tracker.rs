//! The entity tracker: descriptor arena, lookup indexes and change ordering.

use super::state::{plan_transition, Transition};
use crate::error::{InvalidOperationKind, ODataError, Result};
use crate::model::{
    Descriptor, DescriptorId, DescriptorKind, EntityDescriptor, EntityState, InstanceId,
    LinkDescriptor, ODataValue, StreamDescriptor,
};
use indexmap::IndexMap;
use std::collections::HashMap;

type LinkKey = (InstanceId, String, Option<InstanceId>);
type StreamKey = (InstanceId, Option<String>);

/// Everything needed to start tracking an entity.
#[derive(Debug, Clone)]
pub(crate) struct NewEntity {
    pub instance: InstanceId,
    pub type_name: String,
    pub state: EntityState,
    pub entity_set: Option<String>,
    pub identity: Option<String>,
    pub etag: Option<String>,
    pub snapshot: IndexMap<String, ODataValue>,
}

/// Tracks descriptors for one session.
///
/// The indexes are the only answer to "is this tracked": a descriptor is live
/// exactly while it is in the arena, and leaves it only by detaching.
#[derive(Debug, Default)]
pub struct EntityTracker {
    descriptors: IndexMap<DescriptorId, Descriptor>,
    by_instance: HashMap<InstanceId, DescriptorId>,
    by_identity: HashMap<String, DescriptorId>,
    links: IndexMap<LinkKey, DescriptorId>,
    streams: HashMap<StreamKey, DescriptorId>,
    next_descriptor: u64,
    change_counter: u64,
}

impl EntityTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live descriptors of all kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Highest change order handed out so far.
    #[must_use]
    pub fn last_change_order(&self) -> u64 {
        self.change_counter
    }

    #[must_use]
    pub fn descriptor(&self, id: DescriptorId) -> Option<&Descriptor> {
        self.descriptors.get(&id)
    }

    /// Descriptor of a tracked entity instance.
    #[must_use]
    pub fn entity_descriptor(&self, instance: InstanceId) -> Option<&Descriptor> {
        self.by_instance
            .get(&instance)
            .and_then(|id| self.descriptors.get(id))
    }

    #[must_use]
    pub fn descriptor_by_identity(&self, identity: &str) -> Option<&Descriptor> {
        self.by_identity
            .get(identity)
            .and_then(|id| self.descriptors.get(id))
    }

    #[must_use]
    pub fn link_descriptor(
        &self,
        source: InstanceId,
        property: &str,
        target: Option<InstanceId>,
    ) -> Option<&Descriptor> {
        self.links
            .get(&(source, property.to_string(), target))
            .and_then(|id| self.descriptors.get(id))
    }

    #[must_use]
    pub fn stream_descriptor(&self, entity: InstanceId, name: Option<&str>) -> Option<&Descriptor> {
        self.streams
            .get(&(entity, name.map(str::to_string)))
            .and_then(|id| self.descriptors.get(id))
    }

    /// All live descriptors in creation order.
    pub fn descriptors(&self) -> impl Iterator<Item = &Descriptor> {
        self.descriptors.values()
    }

    pub fn entities(&self) -> impl Iterator<Item = &Descriptor> {
        self.descriptors().filter(|d| d.as_entity().is_some())
    }

    pub fn links(&self) -> impl Iterator<Item = &Descriptor> {
        self.descriptors().filter(|d| d.as_link().is_some())
    }

    /// Links whose source is `source`, in change order.
    #[must_use]
    pub fn links_from(&self, source: InstanceId) -> Vec<&Descriptor> {
        let mut links: Vec<&Descriptor> = self
            .links
            .iter()
            .filter(|((from, _, _), _)| *from == source)
            .filter_map(|(_, id)| self.descriptors.get(id))
            .collect();
        sort_by_change_order(&mut links);
        links
    }

    /// Every descriptor with a pending change, in change order.
    ///
    /// Ties cannot occur between stamped descriptors; unstamped ones are not
    /// modified by definition. The id is used as a final tie-break anyway so
    /// the result never depends on map layout.
    #[must_use]
    pub fn modified_descriptors(&self) -> Vec<&Descriptor> {
        let mut changed: Vec<&Descriptor> = self
            .descriptors
            .values()
            .filter(|d| d.is_modified())
            .collect();
        sort_by_change_order(&mut changed);
        changed
    }

    // ========================================================================
    // Mutation (context-mediated)
    // ========================================================================

    fn allocate_id(&mut self) -> DescriptorId {
        self.next_descriptor += 1;
        DescriptorId::new(self.next_descriptor)
    }

    fn stamp(&mut self, id: DescriptorId) {
        self.change_counter += 1;
        if let Some(descriptor) = self.descriptors.get_mut(&id) {
            descriptor.header.change_order = self.change_counter;
        }
    }

    pub(crate) fn entity_mut(&mut self, instance: InstanceId) -> Option<&mut EntityDescriptor> {
        let id = *self.by_instance.get(&instance)?;
        self.descriptors
            .get_mut(&id)
            .and_then(Descriptor::as_entity_mut)
    }

    fn require_entity(&self, instance: InstanceId) -> Result<&Descriptor> {
        self.entity_descriptor(instance).ok_or_else(|| {
            ODataError::invalid_operation(
                format!("{instance}"),
                InvalidOperationKind::EntityNotContained,
            )
        })
    }

    /// Start tracking an entity in `Unchanged` or `Added` state.
    pub(crate) fn track_entity(&mut self, entity: NewEntity) -> Result<DescriptorId> {
        if self.by_instance.contains_key(&entity.instance) {
            return Err(ODataError::invalid_operation(
                format!("{}", entity.instance),
                InvalidOperationKind::AlreadyTracked,
            ));
        }
        if let Some(identity) = &entity.identity {
            if self.by_identity.contains_key(identity) {
                return Err(ODataError::invalid_operation(
                    format!("{}", entity.instance),
                    InvalidOperationKind::IdentityConflict(identity.clone()),
                ));
            }
        }

        let id = self.allocate_id();
        let mut descriptor = EntityDescriptor::new(entity.instance, entity.type_name);
        descriptor.entity_set = entity.entity_set;
        descriptor.identity = entity.identity.clone();
        descriptor.etag = entity.etag;
        if entity.state == EntityState::Added {
            descriptor.changed_properties = entity.snapshot.keys().cloned().collect();
        } else {
            descriptor.snapshot = entity.snapshot;
        }

        self.descriptors.insert(
            id,
            Descriptor::new(id, entity.state, DescriptorKind::Entity(descriptor)),
        );
        self.by_instance.insert(entity.instance, id);
        if let Some(identity) = entity.identity {
            self.by_identity.insert(identity, id);
        }
        self.stamp(id);
        tracing::debug!(%id, instance = %entity.instance, state = %entity.state, "tracking entity");
        Ok(id)
    }

    /// Apply a state change to a tracked entity.
    pub(crate) fn change_entity_state(
        &mut self,
        instance: InstanceId,
        target: EntityState,
    ) -> Result<()> {
        let descriptor = self.require_entity(instance)?;
        let id = descriptor.id();
        let current = descriptor.state();
        let plan = plan_transition(current, target)?;
        self.apply(id, target, plan);
        if plan == Transition::Preserve {
            if let Some(entity) = self.entity_mut(instance) {
                entity.changed_properties.clear();
            }
        }
        Ok(())
    }

    /// Apply a state change to any descriptor.
    pub(crate) fn change_state(&mut self, id: DescriptorId, target: EntityState) -> Result<()> {
        let current = self
            .descriptors
            .get(&id)
            .map(Descriptor::state)
            .ok_or_else(|| {
                ODataError::invalid_operation(format!("{id}"), InvalidOperationKind::LinkNotTracked)
            })?;
        let plan = plan_transition(current, target)?;
        self.apply(id, target, plan);
        Ok(())
    }

    fn apply(&mut self, id: DescriptorId, target: EntityState, plan: Transition) {
        match plan {
            Transition::NoOp => {}
            Transition::Detach => self.detach(id),
            Transition::Stamp | Transition::Preserve => {
                if let Some(descriptor) = self.descriptors.get_mut(&id) {
                    descriptor.header.state = target;
                }
                if plan == Transition::Stamp {
                    self.stamp(id);
                }
            }
        }
    }

    /// Record a property write on a tracked entity.
    ///
    /// An Unchanged entity becomes Modified. A Modified entity whose
    /// properties all match the snapshot again reverts to Unchanged, keeping
    /// its change order.
    pub(crate) fn property_changed(
        &mut self,
        instance: InstanceId,
        name: &str,
        current: &IndexMap<String, ODataValue>,
    ) -> Result<()> {
        let descriptor = self.require_entity(instance)?;
        let id = descriptor.id();
        let state = descriptor.state();
        if state == EntityState::Deleted {
            return Err(ODataError::invalid_operation(
                format!("setting '{name}' on {instance}"),
                InvalidOperationKind::EntityDeleted,
            ));
        }

        let reverted = {
            let Some(entity) = self.entity_mut(instance) else {
                return Ok(());
            };
            entity.changed_properties.insert(name.to_string());
            state != EntityState::Added && entity.snapshot == *current
        };

        match (state, reverted) {
            (EntityState::Unchanged, false) => self.apply(id, EntityState::Modified, Transition::Stamp),
            (EntityState::Modified, true) => {
                self.apply(id, EntityState::Unchanged, Transition::Preserve);
                if let Some(entity) = self.entity_mut(instance) {
                    entity.changed_properties.clear();
                }
            }
            (EntityState::Unchanged, true) => {
                if let Some(entity) = self.entity_mut(instance) {
                    entity.changed_properties.clear();
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Re-key an entity under a new identity.
    pub(crate) fn set_identity(&mut self, instance: InstanceId, identity: String) -> Result<()> {
        let id = self.require_entity(instance)?.id();
        if let Some(existing) = self.by_identity.get(&identity) {
            if *existing != id {
                return Err(ODataError::invalid_operation(
                    format!("{instance}"),
                    InvalidOperationKind::IdentityConflict(identity),
                ));
            }
        }
        let previous = self
            .entity_mut(instance)
            .and_then(|entity| entity.identity.replace(identity.clone()));
        if let Some(old) = previous {
            self.by_identity.remove(&old);
        }
        self.by_identity.insert(identity, id);
        Ok(())
    }

    /// Mark a descriptor as saved: Unchanged, change order retained.
    pub(crate) fn accept_changes(&mut self, id: DescriptorId) {
        if let Some(descriptor) = self.descriptors.get_mut(&id) {
            descriptor.header.state = EntityState::Unchanged;
        }
    }

    pub(crate) fn track_link(
        &mut self,
        link: LinkDescriptor,
        state: EntityState,
    ) -> Result<DescriptorId> {
        let key = (link.source, link.source_property.clone(), link.target);
        if self.links.contains_key(&key) {
            return Err(ODataError::invalid_operation(
                format!("{}.{}", link.source, link.source_property),
                InvalidOperationKind::LinkExists,
            ));
        }
        let id = self.allocate_id();
        self.descriptors
            .insert(id, Descriptor::new(id, state, DescriptorKind::Link(link)));
        self.links.insert(key, id);
        self.stamp(id);
        Ok(id)
    }

    /// Track a stream write, replacing pending content of the same stream.
    pub(crate) fn track_stream(&mut self, stream: StreamDescriptor) -> Result<DescriptorId> {
        let owner = self.require_entity(stream.entity)?.id();
        let key = (stream.entity, stream.name.clone());
        if let Some(&id) = self.streams.get(&key) {
            if let Some(descriptor) = self.descriptors.get_mut(&id) {
                descriptor.header.state = EntityState::Modified;
                descriptor.kind = DescriptorKind::Stream(stream);
            }
            self.stamp(id);
            return Ok(id);
        }

        let id = self.allocate_id();
        self.descriptors.insert(
            id,
            Descriptor::new(id, EntityState::Modified, DescriptorKind::Stream(stream)),
        );
        self.streams.insert(key, id);
        if let Some(entity) = self
            .descriptors
            .get_mut(&owner)
            .and_then(Descriptor::as_entity_mut)
        {
            entity.streams.push(id);
        }
        self.stamp(id);
        Ok(id)
    }

    /// Remove a descriptor and every index entry pointing at it.
    ///
    /// Detaching an entity also detaches its streams and all links touching it.
    pub(crate) fn detach(&mut self, id: DescriptorId) {
        let Some(descriptor) = self.descriptors.shift_remove(&id) else {
            return;
        };
        match descriptor.kind {
            DescriptorKind::Entity(entity) => {
                let instance = entity.instance();
                self.by_instance.remove(&instance);
                if let Some(identity) = &entity.identity {
                    if self.by_identity.get(identity) == Some(&id) {
                        self.by_identity.remove(identity);
                    }
                }
                for stream in entity.streams {
                    self.detach(stream);
                }
                let touching: Vec<DescriptorId> = self
                    .links
                    .iter()
                    .filter(|((source, _, target), _)| {
                        *source == instance || *target == Some(instance)
                    })
                    .map(|(_, link)| *link)
                    .collect();
                for link in touching {
                    self.detach(link);
                }
                tracing::debug!(%id, %instance, "detached entity");
            }
            DescriptorKind::Link(link) => {
                self.links
                    .shift_remove(&(link.source, link.source_property, link.target));
            }
            DescriptorKind::Stream(stream) => {
                self.streams.remove(&(stream.entity, stream.name));
            }
        }
    }
}

fn sort_by_change_order(descriptors: &mut [&Descriptor]) {
    descriptors.sort_by_key(|d| (d.change_order(), d.id()));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_entity(raw: u64, state: EntityState, identity: Option<&str>) -> NewEntity {
        NewEntity {
            instance: InstanceId::new(raw),
            type_name: "NS.Person".to_string(),
            state,
            entity_set: Some("People".to_string()),
            identity: identity.map(str::to_string),
            etag: None,
            snapshot: IndexMap::new(),
        }
    }

    #[test]
    fn test_track_twice_is_rejected() {
        let mut tracker = EntityTracker::new();
        tracker
            .track_entity(new_entity(1, EntityState::Unchanged, Some("People(1)")))
            .unwrap();
        let err = tracker
            .track_entity(new_entity(1, EntityState::Unchanged, None))
            .unwrap_err();
        assert_eq!(
            err.invalid_operation_kind(),
            Some(&InvalidOperationKind::AlreadyTracked)
        );
    }

    #[test]
    fn test_identity_conflict_is_rejected() {
        let mut tracker = EntityTracker::new();
        tracker
            .track_entity(new_entity(1, EntityState::Unchanged, Some("People(1)")))
            .unwrap();
        let err = tracker
            .track_entity(new_entity(2, EntityState::Unchanged, Some("People(1)")))
            .unwrap_err();
        assert!(matches!(
            err.invalid_operation_kind(),
            Some(InvalidOperationKind::IdentityConflict(_))
        ));
    }

    #[test]
    fn test_detach_removes_links_and_indexes() {
        let mut tracker = EntityTracker::new();
        let a = tracker
            .track_entity(new_entity(1, EntityState::Unchanged, Some("People(1)")))
            .unwrap();
        tracker
            .track_entity(new_entity(2, EntityState::Unchanged, Some("People(2)")))
            .unwrap();
        tracker
            .track_link(
                LinkDescriptor {
                    source: InstanceId::new(2),
                    source_property: "Friends".into(),
                    target: Some(InstanceId::new(1)),
                },
                EntityState::Added,
            )
            .unwrap();
        assert_eq!(tracker.len(), 3);

        tracker.detach(a);
        assert_eq!(tracker.len(), 1);
        assert!(tracker.entity_descriptor(InstanceId::new(1)).is_none());
        assert!(tracker.descriptor_by_identity("People(1)").is_none());
        assert_eq!(tracker.links().count(), 0);
    }

    #[test]
    fn test_modified_descriptors_follow_change_order() {
        let mut tracker = EntityTracker::new();
        for raw in 1..=3 {
            tracker
                .track_entity(new_entity(raw, EntityState::Unchanged, None))
                .unwrap();
        }
        tracker
            .change_entity_state(InstanceId::new(3), EntityState::Modified)
            .unwrap();
        tracker
            .change_entity_state(InstanceId::new(1), EntityState::Deleted)
            .unwrap();

        let order: Vec<_> = tracker
            .modified_descriptors()
            .iter()
            .filter_map(|d| d.as_entity().map(EntityDescriptor::instance))
            .collect();
        assert_eq!(order, vec![InstanceId::new(3), InstanceId::new(1)]);
    }
}
