//! Service model lookups.
//!
//! The tracker, graph builder and serializer only ever ask the model a handful
//! of questions (key properties, navigation shape, entity-set resolution), so
//! those are abstracted behind [`ServiceModel`]. [`EdmModel`] is an in-memory
//! implementation that can be built programmatically or deserialized from
//! YAML/JSON:
//!
//! ```yaml
//! entity_types:
//!   NS.Person:
//!     keys: [ID]
//!     properties: { ID: Edm.Int32, Name: Edm.String }
//!     navigations:
//!       Cars: { target: NS.Car, collection: true }
//! entity_sets:
//!   People: NS.Person
//! ```

use super::PropertyType;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Shape of a navigation property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationProperty {
    /// Qualified name of the target entity type
    pub target: String,
    /// True for collection-valued navigations
    #[serde(default)]
    pub collection: bool,
}

/// Metadata questions asked by the tracking and serialization engine.
pub trait ServiceModel {
    /// Entity set that holds instances of `type_name` (or of a base type).
    fn resolve_entity_set(&self, type_name: &str) -> Option<String>;

    /// Declared entity type of an entity set.
    fn entity_set_type(&self, entity_set: &str) -> Option<String>;

    /// Key property names of an entity type, in declaration order.
    fn key_properties(&self, type_name: &str) -> Vec<String>;

    /// Navigation property `name` declared on `type_name` or a base type.
    fn navigation(&self, type_name: &str, name: &str) -> Option<NavigationProperty>;

    /// Declared type of a structural property.
    fn property_type(&self, type_name: &str, property: &str) -> Option<PropertyType>;

    /// True when `type_name` equals `base` or derives from it.
    fn is_assignable_to(&self, type_name: &str, base: &str) -> bool;
}

/// Definition of one entity type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityTypeDef {
    pub base_type: Option<String>,
    pub keys: Vec<String>,
    pub properties: IndexMap<String, PropertyType>,
    pub navigations: IndexMap<String, NavigationProperty>,
}

impl EntityTypeDef {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn base(mut self, base_type: impl Into<String>) -> Self {
        self.base_type = Some(base_type.into());
        self
    }

    /// Declare a key property together with its type.
    #[must_use]
    pub fn key(mut self, name: impl Into<String>, kind: PropertyType) -> Self {
        let name = name.into();
        self.keys.push(name.clone());
        self.properties.insert(name, kind);
        self
    }

    #[must_use]
    pub fn property(mut self, name: impl Into<String>, kind: PropertyType) -> Self {
        self.properties.insert(name.into(), kind);
        self
    }

    #[must_use]
    pub fn navigation(mut self, name: impl Into<String>, target: impl Into<String>, collection: bool) -> Self {
        self.navigations.insert(
            name.into(),
            NavigationProperty {
                target: target.into(),
                collection,
            },
        );
        self
    }
}

/// In-memory service model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdmModel {
    pub entity_types: IndexMap<String, EntityTypeDef>,
    /// Entity set name to declared entity type
    pub entity_sets: IndexMap<String, String>,
}

impl EdmModel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_entity_type(mut self, name: impl Into<String>, def: EntityTypeDef) -> Self {
        self.entity_types.insert(name.into(), def);
        self
    }

    #[must_use]
    pub fn with_entity_set(mut self, name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        self.entity_sets.insert(name.into(), entity_type.into());
        self
    }

    /// The type and its ancestors, most derived first.
    ///
    /// Stops at unknown types and at the first repeated name, so a malformed
    /// base-type cycle cannot loop.
    fn lineage<'a>(&'a self, type_name: &'a str) -> Vec<(&'a str, &'a EntityTypeDef)> {
        let mut chain: Vec<(&str, &EntityTypeDef)> = Vec::new();
        let mut current = Some(type_name);
        while let Some(name) = current {
            if chain.iter().any(|(seen, _)| *seen == name) {
                break;
            }
            let Some(def) = self.entity_types.get(name) else {
                break;
            };
            chain.push((name, def));
            current = def.base_type.as_deref();
        }
        chain
    }
}

impl ServiceModel for EdmModel {
    fn resolve_entity_set(&self, type_name: &str) -> Option<String> {
        // Prefer the set declared for the most derived type
        self.lineage(type_name).iter().find_map(|(name, _)| {
            self.entity_sets
                .iter()
                .find(|(_, set_type)| set_type.as_str() == *name)
                .map(|(set, _)| set.clone())
        })
    }

    fn entity_set_type(&self, entity_set: &str) -> Option<String> {
        self.entity_sets.get(entity_set).cloned()
    }

    fn key_properties(&self, type_name: &str) -> Vec<String> {
        self.lineage(type_name)
            .into_iter()
            .rev()
            .find(|(_, def)| !def.keys.is_empty())
            .map(|(_, def)| def.keys.clone())
            .unwrap_or_default()
    }

    fn navigation(&self, type_name: &str, name: &str) -> Option<NavigationProperty> {
        self.lineage(type_name)
            .into_iter()
            .find_map(|(_, def)| def.navigations.get(name).cloned())
    }

    fn property_type(&self, type_name: &str, property: &str) -> Option<PropertyType> {
        self.lineage(type_name)
            .into_iter()
            .find_map(|(_, def)| def.properties.get(property).cloned())
    }

    fn is_assignable_to(&self, type_name: &str, base: &str) -> bool {
        type_name == base || self.lineage(type_name).iter().any(|(name, _)| *name == base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EdmPrimitiveType;

    fn int32() -> PropertyType {
        PropertyType::Primitive(EdmPrimitiveType::Int32)
    }

    fn model() -> EdmModel {
        EdmModel::new()
            .with_entity_type(
                "NS.Person",
                EntityTypeDef::new()
                    .key("ID", int32())
                    .navigation("Cars", "NS.Car", true)
                    .navigation("Spouse", "NS.Person", false),
            )
            .with_entity_type("NS.Employee", EntityTypeDef::new().base("NS.Person"))
            .with_entity_type("NS.Car", EntityTypeDef::new().key("ID", int32()))
            .with_entity_set("People", "NS.Person")
            .with_entity_set("Cars", "NS.Car")
    }

    #[test]
    fn test_derived_type_inherits_keys_navigations_and_set() {
        let model = model();
        assert_eq!(model.key_properties("NS.Employee"), vec!["ID"]);
        assert_eq!(
            model.navigation("NS.Employee", "Cars"),
            Some(NavigationProperty {
                target: "NS.Car".into(),
                collection: true
            })
        );
        assert_eq!(model.resolve_entity_set("NS.Employee").as_deref(), Some("People"));
        assert!(model.is_assignable_to("NS.Employee", "NS.Person"));
        assert!(!model.is_assignable_to("NS.Person", "NS.Employee"));
    }

    #[test]
    fn test_base_type_cycle_terminates() {
        let model = EdmModel::new()
            .with_entity_type("NS.A", EntityTypeDef::new().base("NS.B"))
            .with_entity_type("NS.B", EntityTypeDef::new().base("NS.A"));
        assert!(model.key_properties("NS.A").is_empty());
        assert_eq!(model.resolve_entity_set("NS.A"), None);
    }

    #[test]
    fn test_model_from_yaml() {
        let yaml = r"
entity_types:
  NS.Person:
    keys: [ID]
    properties: { ID: Edm.Int32, Name: Edm.String, Tags: Collection(Edm.String) }
    navigations:
      Cars: { target: NS.Car, collection: true }
entity_sets:
  People: NS.Person
";
        let model: EdmModel = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(model.property_type("NS.Person", "ID"), Some(int32()));
        assert_eq!(
            model.property_type("NS.Person", "Tags"),
            Some(PropertyType::Collection(EdmPrimitiveType::String))
        );
        assert_eq!(model.entity_set_type("People").as_deref(), Some("NS.Person"));
    }
}
