//! Entity instances and the arena that owns them.

use super::ODataValue;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable handle to an entity instance held by an [`InstanceStore`].
///
/// Handles outlive tracking: detaching an entity keeps the instance, so it can
/// be attached again later under a fresh descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(u64);

impl InstanceId {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "instance#{}", self.0)
    }
}

/// A client-side entity: its qualified type name and an ordered property bag.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityInstance {
    type_name: String,
    properties: IndexMap<String, ODataValue>,
}

impl EntityInstance {
    /// Create an instance of the given entity type with no properties.
    #[must_use]
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            properties: IndexMap::new(),
        }
    }

    /// Builder-style property assignment.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ODataValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ODataValue> {
        self.properties.get(name)
    }

    /// Properties in insertion order.
    #[must_use]
    pub fn properties(&self) -> &IndexMap<String, ODataValue> {
        &self.properties
    }

    /// Set a property, returning the previous value.
    ///
    /// This does not notify any tracker; go through the context to record the
    /// change.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<ODataValue>) -> Option<ODataValue> {
        self.properties.insert(name.into(), value.into())
    }
}

/// Arena of entity instances addressed by [`InstanceId`].
#[derive(Debug, Default)]
pub struct InstanceStore {
    instances: IndexMap<InstanceId, EntityInstance>,
    next_id: u64,
}

impl InstanceStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Move an instance into the arena and hand out its handle.
    pub fn insert(&mut self, instance: EntityInstance) -> InstanceId {
        self.next_id += 1;
        let id = InstanceId(self.next_id);
        self.instances.insert(id, instance);
        id
    }

    #[must_use]
    pub fn get(&self, id: InstanceId) -> Option<&EntityInstance> {
        self.instances.get(&id)
    }

    pub fn get_mut(&mut self, id: InstanceId) -> Option<&mut EntityInstance> {
        self.instances.get_mut(&id)
    }

    #[must_use]
    pub fn contains(&self, id: InstanceId) -> bool {
        self.instances.contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (InstanceId, &EntityInstance)> {
        self.instances.iter().map(|(id, instance)| (*id, instance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_keeps_insertion_order() {
        let person = EntityInstance::new("NS.Person")
            .with("ID", 100)
            .with("Name", "Bing")
            .with("Age", 30);
        let names: Vec<_> = person.properties().keys().cloned().collect();
        assert_eq!(names, vec!["ID", "Name", "Age"]);
        assert_eq!(person.get("Name"), Some(&ODataValue::String("Bing".into())));
    }

    #[test]
    fn test_store_hands_out_distinct_ids() {
        let mut store = InstanceStore::new();
        let a = store.insert(EntityInstance::new("NS.Car"));
        let b = store.insert(EntityInstance::new("NS.Car"));
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
        assert!(store.contains(a));
    }
}
