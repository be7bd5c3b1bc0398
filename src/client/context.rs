//! The session facade.
//!
//! [`DataServiceContext`] owns the service model, configuration, entity
//! instances and the tracker. Every mutation is funnelled through the tracker
//! so the change order always reflects the caller's edit sequence.

use crate::config::ClientConfig;
use crate::error::{InvalidOperationKind, ODataError, Result};
use crate::model::{
    Descriptor, DescriptorId, EntityInstance, EntityState, InstanceId, InstanceStore,
    LinkDescriptor, NavigationProperty, ODataValue, ServiceModel, StreamDescriptor,
};
use crate::serializer::uri::entity_path;
use crate::tracking::{EntityTracker, NewEntity};

/// Expected cardinality of a navigation at a call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cardinality {
    Any,
    Collection,
    Single,
}

/// One client session against an OData service.
pub struct DataServiceContext {
    pub(super) model: Box<dyn ServiceModel>,
    pub(super) config: ClientConfig,
    pub(super) tracker: EntityTracker,
    pub(super) instances: InstanceStore,
}

impl std::fmt::Debug for DataServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataServiceContext")
            .field("service_root", &self.config.service_root())
            .field("tracked", &self.tracker.len())
            .field("instances", &self.instances.len())
            .finish_non_exhaustive()
    }
}

impl DataServiceContext {
    pub fn new(model: impl ServiceModel + 'static, config: ClientConfig) -> Self {
        Self {
            model: Box::new(model),
            config,
            tracker: EntityTracker::new(),
            instances: InstanceStore::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn model(&self) -> &dyn ServiceModel {
        self.model.as_ref()
    }

    #[must_use]
    pub fn tracker(&self) -> &EntityTracker {
        &self.tracker
    }

    #[must_use]
    pub fn instances(&self) -> &InstanceStore {
        &self.instances
    }

    // ========================================================================
    // Instances
    // ========================================================================

    /// Hand an instance to the session without tracking it.
    pub fn create_instance(&mut self, entity: EntityInstance) -> InstanceId {
        self.instances.insert(entity)
    }

    #[must_use]
    pub fn instance(&self, id: InstanceId) -> Option<&EntityInstance> {
        self.instances.get(id)
    }

    fn require_instance(&self, id: InstanceId) -> Result<&EntityInstance> {
        self.instances
            .get(id)
            .ok_or_else(|| ODataError::argument("entity", format!("{id} was not created by this context")))
    }

    fn require_tracked(&self, instance: InstanceId) -> Result<&Descriptor> {
        self.tracker.entity_descriptor(instance).ok_or_else(|| {
            ODataError::invalid_operation(format!("{instance}"), InvalidOperationKind::EntityNotContained)
        })
    }

    /// Check that `entity_set` exists and can hold `instance`.
    fn check_entity_set(&self, entity_set: &str, instance: &EntityInstance) -> Result<()> {
        if entity_set.is_empty() {
            return Err(ODataError::argument_null("entitySetName"));
        }
        let declared = self.model.entity_set_type(entity_set).ok_or_else(|| {
            ODataError::argument("entitySetName", format!("'{entity_set}' is not an entity set of the service"))
        })?;
        if !self.model.is_assignable_to(instance.type_name(), &declared) {
            return Err(ODataError::argument(
                "entity",
                format!("'{}' cannot be stored in '{entity_set}' of type '{declared}'", instance.type_name()),
            ));
        }
        Ok(())
    }

    fn resolve_entity_set(&self, instance: &EntityInstance) -> Result<String> {
        self.model
            .resolve_entity_set(instance.type_name())
            .ok_or_else(|| ODataError::argument_null("entitySetName"))
    }

    // ========================================================================
    // Entities
    // ========================================================================

    /// Track an existing entity as `Unchanged` in `entity_set`.
    pub fn attach_to(
        &mut self,
        entity_set: &str,
        instance: InstanceId,
        etag: Option<&str>,
    ) -> Result<DescriptorId> {
        let entity = self.require_instance(instance)?;
        self.check_entity_set(entity_set, entity)?;
        if self.tracker.entity_descriptor(instance).is_some() {
            return Err(ODataError::invalid_operation(
                format!("attaching {instance}"),
                InvalidOperationKind::AlreadyTracked,
            ));
        }
        let identity = entity_path(self.model.as_ref(), entity_set, entity, self.config.payload.key_delimiter)?;
        let new = NewEntity {
            instance,
            type_name: entity.type_name().to_string(),
            state: EntityState::Unchanged,
            entity_set: Some(entity_set.to_string()),
            identity: Some(identity),
            etag: etag.map(str::to_string),
            snapshot: entity.properties().clone(),
        };
        self.tracker.track_entity(new)
    }

    /// Track an existing entity, resolving its entity set from the model.
    pub fn attach(&mut self, instance: InstanceId) -> Result<DescriptorId> {
        let entity_set = self.resolve_entity_set(self.require_instance(instance)?)?;
        self.attach_to(&entity_set, instance, None)
    }

    /// Track a new entity as `Added` in `entity_set`.
    pub fn add_object(&mut self, entity_set: &str, instance: InstanceId) -> Result<DescriptorId> {
        let entity = self.require_instance(instance)?;
        self.check_entity_set(entity_set, entity)?;
        let new = NewEntity {
            instance,
            type_name: entity.type_name().to_string(),
            state: EntityState::Added,
            entity_set: Some(entity_set.to_string()),
            identity: None,
            etag: None,
            snapshot: entity.properties().clone(),
        };
        self.tracker.track_entity(new)
    }

    /// Mark an entity as updated.
    ///
    /// Unchanged becomes Modified with every current property counted as set.
    /// Added and Modified entities are left alone.
    pub fn update_object(&mut self, instance: InstanceId) -> Result<()> {
        let state = self.require_tracked(instance)?.state();
        match state {
            EntityState::Unchanged => {
                self.tracker.change_entity_state(instance, EntityState::Modified)?;
                let names: Vec<String> = self.require_instance(instance)?.properties().keys().cloned().collect();
                if let Some(entity) = self.tracker.entity_mut(instance) {
                    entity.changed_properties.extend(names);
                }
                Ok(())
            }
            EntityState::Deleted => Err(ODataError::invalid_operation(
                format!("updating {instance}"),
                InvalidOperationKind::EntityDeleted,
            )),
            _ => Ok(()),
        }
    }

    /// Mark an entity for deletion. An entity that was only added is detached.
    pub fn delete_object(&mut self, instance: InstanceId) -> Result<()> {
        let descriptor = self.require_tracked(instance)?;
        if descriptor.state() == EntityState::Added {
            let id = descriptor.id();
            self.tracker.detach(id);
            return Ok(());
        }
        self.tracker.change_entity_state(instance, EntityState::Deleted)
    }

    /// Stop tracking an entity; false when it was not tracked.
    pub fn detach(&mut self, instance: InstanceId) -> bool {
        match self.tracker.entity_descriptor(instance).map(Descriptor::id) {
            Some(id) => {
                self.tracker.detach(id);
                true
            }
            None => false,
        }
    }

    /// Force a tracked entity into `state`.
    pub fn change_state(&mut self, instance: InstanceId, state: EntityState) -> Result<()> {
        self.tracker.change_entity_state(instance, state)
    }

    /// Write a property and record the change.
    ///
    /// Returns the previous value. Writing the snapshot values back onto a
    /// Modified entity reverts it to Unchanged.
    pub fn set_property(
        &mut self,
        instance: InstanceId,
        name: &str,
        value: impl Into<ODataValue>,
    ) -> Result<Option<ODataValue>> {
        let tracked_state = self.tracker.entity_descriptor(instance).map(Descriptor::state);
        if tracked_state == Some(EntityState::Deleted) {
            return Err(ODataError::invalid_operation(
                format!("setting '{name}' on {instance}"),
                InvalidOperationKind::EntityDeleted,
            ));
        }
        let entity = self
            .instances
            .get_mut(instance)
            .ok_or_else(|| ODataError::argument("entity", format!("{instance} was not created by this context")))?;
        let previous = entity.set(name, value);
        if tracked_state.is_some() {
            self.tracker.property_changed(instance, name, entity.properties())?;
        }
        Ok(previous)
    }

    // ========================================================================
    // Links
    // ========================================================================

    fn check_navigation(&self, source: InstanceId, navigation: &str, expected: Cardinality) -> Result<NavigationProperty> {
        let type_name = self.require_instance(source)?.type_name();
        let shape = self.model.navigation(type_name, navigation).ok_or_else(|| {
            ODataError::invalid_operation(
                format!("linking from {source}"),
                InvalidOperationKind::UnknownNavigation {
                    entity_type: type_name.to_string(),
                    navigation: navigation.to_string(),
                },
            )
        })?;
        match (expected, shape.collection) {
            (Cardinality::Collection, false) => Err(ODataError::invalid_operation(
                format!("linking from {source}"),
                InvalidOperationKind::SingleValuedNavigation(navigation.to_string()),
            )),
            (Cardinality::Single, true) => Err(ODataError::invalid_operation(
                format!("linking from {source}"),
                InvalidOperationKind::CollectionNavigation(navigation.to_string()),
            )),
            _ => Ok(shape),
        }
    }

    /// Both ends must be tracked; with `live`, neither may be Deleted.
    fn check_endpoints(&self, source: InstanceId, target: Option<InstanceId>, live: bool) -> Result<()> {
        for end in std::iter::once(source).chain(target) {
            let state = self.require_tracked(end)?.state();
            if live && state == EntityState::Deleted {
                return Err(ODataError::invalid_operation(
                    format!("linking {end}"),
                    InvalidOperationKind::EntityDeleted,
                ));
            }
        }
        Ok(())
    }

    fn link(source: InstanceId, navigation: &str, target: Option<InstanceId>) -> LinkDescriptor {
        LinkDescriptor {
            source,
            source_property: navigation.to_string(),
            target,
        }
    }

    /// Track an existing relationship as `Unchanged`.
    pub fn attach_link(&mut self, source: InstanceId, navigation: &str, target: InstanceId) -> Result<DescriptorId> {
        self.check_navigation(source, navigation, Cardinality::Any)?;
        self.check_endpoints(source, Some(target), false)?;
        self.tracker
            .track_link(Self::link(source, navigation, Some(target)), EntityState::Unchanged)
    }

    /// Add `target` to the collection navigation `navigation` of `source`.
    ///
    /// Re-adding a link that was deleted reverts it to Unchanged.
    pub fn add_link(&mut self, source: InstanceId, navigation: &str, target: InstanceId) -> Result<DescriptorId> {
        self.check_navigation(source, navigation, Cardinality::Collection)?;
        self.check_endpoints(source, Some(target), true)?;
        if let Some(existing) = self.tracker.link_descriptor(source, navigation, Some(target)) {
            let id = existing.id();
            if existing.state() == EntityState::Deleted {
                self.tracker.change_state(id, EntityState::Unchanged)?;
                return Ok(id);
            }
            return Err(ODataError::invalid_operation(
                format!("{source}.{navigation}"),
                InvalidOperationKind::LinkExists,
            ));
        }
        self.tracker
            .track_link(Self::link(source, navigation, Some(target)), EntityState::Added)
    }

    /// Remove `target` from the collection navigation `navigation` of `source`.
    ///
    /// A link that was only added is detached. Otherwise the link is marked
    /// Deleted, which needs both ends to exist on the service.
    pub fn delete_link(&mut self, source: InstanceId, navigation: &str, target: InstanceId) -> Result<()> {
        self.check_navigation(source, navigation, Cardinality::Collection)?;
        self.check_endpoints(source, Some(target), false)?;
        if let Some(existing) = self.tracker.link_descriptor(source, navigation, Some(target)) {
            let id = existing.id();
            return match existing.state() {
                EntityState::Added => {
                    self.tracker.detach(id);
                    Ok(())
                }
                _ => self.tracker.change_state(id, EntityState::Deleted),
            };
        }
        let insert_end = [source, target].into_iter().any(|end| {
            self.tracker
                .entity_descriptor(end)
                .is_some_and(|d| d.state() == EntityState::Added)
        });
        if insert_end {
            return Err(ODataError::invalid_operation(
                format!("{source}.{navigation}"),
                InvalidOperationKind::NoRelationWithInsertEnd,
            ));
        }
        self.tracker
            .track_link(Self::link(source, navigation, Some(target)), EntityState::Deleted)
            .map(|_| ())
    }

    /// Detach every pending link of `source.navigation` before a new one replaces it.
    fn clear_single_valued(&mut self, source: InstanceId, navigation: &str) {
        let previous: Vec<DescriptorId> = self
            .tracker
            .links_from(source)
            .into_iter()
            .filter(|d| d.as_link().is_some_and(|l| l.source_property() == navigation))
            .map(Descriptor::id)
            .collect();
        for id in previous {
            self.tracker.detach(id);
        }
    }

    /// Point the single-valued navigation `navigation` of `source` at
    /// `target`, or clear it with `None`.
    pub fn set_link(&mut self, source: InstanceId, navigation: &str, target: Option<InstanceId>) -> Result<DescriptorId> {
        self.check_navigation(source, navigation, Cardinality::Single)?;
        self.check_endpoints(source, target, true)?;
        let state = match self.require_tracked(source)?.state() {
            EntityState::Added => EntityState::Added,
            _ => EntityState::Modified,
        };
        self.clear_single_valued(source, navigation);
        self.tracker.track_link(Self::link(source, navigation, target), state)
    }

    /// Add a new entity and link it into the collection navigation of `source`.
    pub fn add_related_object(&mut self, source: InstanceId, navigation: &str, target: InstanceId) -> Result<DescriptorId> {
        let shape = self.check_navigation(source, navigation, Cardinality::Collection)?;
        self.check_endpoints(source, None, true)?;
        self.add_related(source, navigation, &shape, target)
    }

    /// Add a new entity as the single-valued navigation of `source`.
    pub fn set_related_object(&mut self, source: InstanceId, navigation: &str, target: InstanceId) -> Result<DescriptorId> {
        let shape = self.check_navigation(source, navigation, Cardinality::Single)?;
        self.check_endpoints(source, None, true)?;
        self.clear_single_valued(source, navigation);
        self.add_related(source, navigation, &shape, target)
    }

    fn add_related(
        &mut self,
        source: InstanceId,
        navigation: &str,
        shape: &NavigationProperty,
        target: InstanceId,
    ) -> Result<DescriptorId> {
        let entity_set = self
            .model
            .resolve_entity_set(&shape.target)
            .ok_or_else(|| ODataError::argument_null("entitySetName"))?;
        let entity = self.add_object(&entity_set, target)?;
        self.tracker
            .track_link(Self::link(source, navigation, Some(target)), EntityState::Added)?;
        Ok(entity)
    }

    // ========================================================================
    // Streams
    // ========================================================================

    /// Queue content for the media resource (`name == None`) or a named stream.
    pub fn set_save_stream(
        &mut self,
        instance: InstanceId,
        name: Option<&str>,
        content_type: &str,
        content: Vec<u8>,
    ) -> Result<DescriptorId> {
        if self.require_tracked(instance)?.state() == EntityState::Deleted {
            return Err(ODataError::invalid_operation(
                format!("streaming to {instance}"),
                InvalidOperationKind::EntityDeleted,
            ));
        }
        let etag = self
            .tracker
            .stream_descriptor(instance, name)
            .and_then(Descriptor::as_stream)
            .and_then(|s| s.etag().map(str::to_string));
        self.tracker.track_stream(StreamDescriptor {
            entity: instance,
            name: name.map(str::to_string),
            content_type: content_type.to_string(),
            content,
            etag,
        })
    }

    // ========================================================================
    // Queries
    // ========================================================================

    #[must_use]
    pub fn get_descriptor(&self, instance: InstanceId) -> Option<&Descriptor> {
        self.tracker.entity_descriptor(instance)
    }

    #[must_use]
    pub fn get_link_descriptor(
        &self,
        source: InstanceId,
        navigation: &str,
        target: Option<InstanceId>,
    ) -> Option<&Descriptor> {
        self.tracker.link_descriptor(source, navigation, target)
    }

    /// Pending descriptors of every kind, in change order.
    #[must_use]
    pub fn modified_descriptors(&self) -> Vec<&Descriptor> {
        self.tracker.modified_descriptors()
    }
}
