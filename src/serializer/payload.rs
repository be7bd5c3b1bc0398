//! Renders an [`UpdateGraph`] as a JSON request body.

use super::literal::write_json_value;
use super::shape::{PayloadShape, ShapeKind, ShapeNavigation, ShapeNode};
use super::uri::{absolute_uri, entity_path, metadata_context};
use super::JsonWriter;
use crate::config::{ClientConfig, PropertySendOption};
use crate::error::{InvalidOperationKind, ODataError, Result, SerializationErrorKind};
use crate::graph::{EdgeKind, RelatedDescriptor, SaveMode, UpdateGraph};
use crate::model::{
    Descriptor, DescriptorId, EntityDescriptor, EntityInstance, EntityState, InstanceId,
    InstanceStore, ServiceModel,
};
use crate::tracking::EntityTracker;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::io::Write;

/// Per-call bookkeeping. Each entity is written in full at most once.
struct WriteState {
    mode: SaveMode,
    visited: HashSet<DescriptorId>,
    envelope_set: Option<String>,
}

/// Writes delta feeds and deep-insert entities.
pub struct PayloadSerializer<'a> {
    tracker: &'a EntityTracker,
    instances: &'a InstanceStore,
    model: &'a dyn ServiceModel,
    config: &'a ClientConfig,
}

impl<'a> PayloadSerializer<'a> {
    #[must_use]
    pub fn new(
        tracker: &'a EntityTracker,
        instances: &'a InstanceStore,
        model: &'a dyn ServiceModel,
        config: &'a ClientConfig,
    ) -> Self {
        Self {
            tracker,
            instances,
            model,
            config,
        }
    }

    fn annotation(&self, term: &str) -> String {
        self.config.payload.annotation_style.annotation(term)
    }

    /// Write every root of `graph` as a delta feed:
    /// `{"@context":"{root}/$metadata#{Set}/$delta","value":[...]}`.
    pub fn write_graph<W: Write>(
        &self,
        graph: &UpdateGraph,
        writer: &mut JsonWriter<W>,
    ) -> Result<PayloadShape> {
        let entity_set = graph
            .entity_set_name()
            .ok_or_else(|| ODataError::argument_null("entitySetName"))?;
        let mut state = WriteState {
            mode: graph.mode(),
            visited: HashSet::new(),
            envelope_set: Some(entity_set.to_string()),
        };

        writer.begin_object()?;
        writer.string_member(
            &self.annotation("context"),
            &metadata_context(self.config.service_root(), &format!("{entity_set}/$delta")),
        )?;
        writer.key("value")?;
        writer.begin_array()?;
        let mut roots = Vec::with_capacity(graph.top_level_descriptors().len());
        for &top in graph.top_level_descriptors() {
            if state.visited.contains(&top) {
                tracing::debug!(id = %top, "top-level entity already written as a nested entry");
                continue;
            }
            roots.push(self.write_root(writer, graph, top, &mut state, true)?);
        }
        writer.end_array()?;
        writer.end_object()?;

        tracing::debug!(entries = roots.len(), set = entity_set, "wrote delta payload");
        Ok(PayloadShape {
            mode: graph.mode(),
            envelope: true,
            entity_set: Some(entity_set.to_string()),
            roots,
        })
    }

    /// Write one root entity and its nested graph, without an envelope.
    pub fn write_single_entity<W: Write>(
        &self,
        root: DescriptorId,
        graph: &UpdateGraph,
        writer: &mut JsonWriter<W>,
    ) -> Result<PayloadShape> {
        let mut state = WriteState {
            mode: graph.mode(),
            visited: HashSet::new(),
            envelope_set: None,
        };
        let node = self.write_root(writer, graph, root, &mut state, false)?;
        tracing::debug!(nodes = node.node_count(), "wrote single-entity payload");
        Ok(PayloadShape {
            mode: graph.mode(),
            envelope: false,
            entity_set: graph.entity_set_name().map(str::to_string),
            roots: vec![node],
        })
    }

    /// Absolute canonical URI of a tracked entity.
    pub fn entity_uri(&self, descriptor: &Descriptor) -> Result<String> {
        let entity = entity_of(descriptor)?;
        if let Some(identity) = entity.identity() {
            return Ok(absolute_uri(self.config.service_root(), identity));
        }
        let entity_set = self.entity_set_of(entity)?;
        let instance = self.instance_of(entity.instance())?;
        let path = entity_path(
            self.model,
            &entity_set,
            instance,
            self.config.payload.key_delimiter,
        )?;
        Ok(absolute_uri(self.config.service_root(), &path))
    }

    fn entity_set_of(&self, entity: &EntityDescriptor) -> Result<String> {
        entity
            .entity_set()
            .map(str::to_string)
            .or_else(|| self.model.resolve_entity_set(entity.type_name()))
            .ok_or_else(|| {
                ODataError::serialization(
                    format!("writing a {}", entity.type_name()),
                    SerializationErrorKind::UnresolvedEntitySet(entity.type_name().to_string()),
                )
            })
    }

    fn instance_of(&self, instance: InstanceId) -> Result<&EntityInstance> {
        self.instances.get(instance).ok_or_else(|| {
            ODataError::invalid_operation(
                format!("{instance}"),
                InvalidOperationKind::EntityNotContained,
            )
        })
    }

    fn descriptor(&self, id: DescriptorId) -> Result<&Descriptor> {
        self.tracker.descriptor(id).ok_or_else(|| {
            ODataError::invalid_operation(format!("{id}"), InvalidOperationKind::EntityNotContained)
        })
    }

    fn write_root<W: Write>(
        &self,
        writer: &mut JsonWriter<W>,
        graph: &UpdateGraph,
        id: DescriptorId,
        state: &mut WriteState,
        top_level: bool,
    ) -> Result<ShapeNode> {
        let descriptor = self.descriptor(id)?;
        if descriptor.state() == EntityState::Deleted {
            state.visited.insert(id);
            self.write_removed(writer, &self.entity_uri(descriptor)?, "deleted")?;
            return Ok(ShapeNode::leaf(id, None, ShapeKind::Removed));
        }
        self.write_entry(writer, graph, descriptor, None, state, top_level)
    }

    fn write_removed<W: Write>(&self, writer: &mut JsonWriter<W>, uri: &str, reason: &str) -> Result<()> {
        writer.begin_object()?;
        writer.key(&self.annotation("removed"))?;
        writer.begin_object()?;
        writer.string_member("reason", reason)?;
        writer.end_object()?;
        writer.string_member(&self.annotation("id"), uri)?;
        writer.end_object()
    }

    fn write_reference<W: Write>(&self, writer: &mut JsonWriter<W>, uri: &str) -> Result<()> {
        writer.begin_object()?;
        writer.string_member(&self.annotation("id"), uri)?;
        writer.end_object()
    }

    fn write_entry<W: Write>(
        &self,
        writer: &mut JsonWriter<W>,
        graph: &UpdateGraph,
        descriptor: &Descriptor,
        link: Option<DescriptorId>,
        state: &mut WriteState,
        top_level: bool,
    ) -> Result<ShapeNode> {
        let entity = entity_of(descriptor)?;
        let instance = self.instance_of(entity.instance())?;
        state.visited.insert(descriptor.id());

        writer.begin_object()?;

        let entity_set = entity
            .entity_set()
            .map(str::to_string)
            .or_else(|| self.model.resolve_entity_set(entity.type_name()));
        if top_level {
            if let (Some(set), Some(envelope)) = (&entity_set, &state.envelope_set) {
                if set != envelope {
                    writer.string_member(&self.annotation("context"), &format!("#{set}/$entity"))?;
                }
            }
        }
        let declared = entity_set.as_deref().and_then(|set| self.model.entity_set_type(set));
        if declared.is_some_and(|declared| declared != entity.type_name()) {
            writer.string_member(&self.annotation("type"), &format!("#{}", entity.type_name()))?;
        }

        self.write_properties(writer, descriptor.state(), entity, instance)?;

        let mut navigations = Vec::new();
        for (property, edges) in group_by_navigation(graph.related(descriptor.id())) {
            let shape = self
                .model
                .navigation(entity.type_name(), property)
                .ok_or_else(|| {
                    ODataError::invalid_operation(
                        "writing navigation",
                        InvalidOperationKind::UnknownNavigation {
                            entity_type: entity.type_name().to_string(),
                            navigation: property.to_string(),
                        },
                    )
                })?;

            let mut nodes = Vec::with_capacity(edges.len());
            let wire_key = if shape.collection && state.mode == SaveMode::BulkUpdate {
                format!("{property}@delta")
            } else {
                property.to_string()
            };
            writer.key(&wire_key)?;
            if shape.collection {
                writer.begin_array()?;
                for edge in &edges {
                    nodes.push(self.write_related(writer, graph, edge, true, state)?);
                }
                writer.end_array()?;
            } else if let Some(edge) = edges.last() {
                if edges.len() > 1 {
                    tracing::debug!(navigation = property, "several edges on a single-valued navigation; last one wins");
                }
                nodes.push(self.write_related(writer, graph, edge, false, state)?);
            }

            navigations.push(ShapeNavigation {
                property: property.to_string(),
                wire_key,
                collection: shape.collection,
                nodes,
            });
        }

        writer.end_object()?;
        Ok(ShapeNode {
            descriptor: descriptor.id(),
            link,
            kind: ShapeKind::Entity,
            navigations,
        })
    }

    fn write_properties<W: Write>(
        &self,
        writer: &mut JsonWriter<W>,
        state: EntityState,
        entity: &EntityDescriptor,
        instance: &EntityInstance,
    ) -> Result<()> {
        let keys = self.model.key_properties(entity.type_name());
        let only_set = self.config.payload.send_option == PropertySendOption::OnlySetProperties;
        let include = |name: &str| -> bool {
            let is_key = keys.iter().any(|k| k == name);
            match state {
                EntityState::Added => !only_set || entity.changed_properties().contains(name),
                EntityState::Modified => {
                    is_key || !only_set || entity.changed_properties().contains(name)
                }
                _ => is_key,
            }
        };

        for (name, value) in instance.properties() {
            if include(name) {
                writer.key(name)?;
                write_json_value(writer, value, self.config.payload.ieee754_compatible)?;
            }
        }
        Ok(())
    }

    fn write_related<W: Write>(
        &self,
        writer: &mut JsonWriter<W>,
        graph: &UpdateGraph,
        edge: &RelatedDescriptor,
        collection: bool,
        state: &mut WriteState,
    ) -> Result<ShapeNode> {
        match edge.kind {
            EdgeKind::NestedEntity => {
                let target = self.descriptor(edge.descriptor)?;
                if target.state() == EntityState::Deleted {
                    state.visited.insert(target.id());
                    if collection {
                        self.write_removed(writer, &self.entity_uri(target)?, "deleted")?;
                    } else {
                        writer.null()?;
                    }
                    return Ok(ShapeNode::leaf(target.id(), Some(edge.link), ShapeKind::Removed));
                }
                if state.visited.contains(&target.id()) {
                    self.write_reference(writer, &self.entity_uri(target)?)?;
                    return Ok(ShapeNode::leaf(target.id(), Some(edge.link), ShapeKind::Reference));
                }
                self.write_entry(writer, graph, target, Some(edge.link), state, false)
            }
            EdgeKind::Link => {
                let link_descriptor = self.descriptor(edge.link)?;
                let link = link_descriptor.as_link().ok_or_else(|| {
                    ODataError::invalid_operation(format!("{}", edge.link), InvalidOperationKind::LinkNotTracked)
                })?;
                let target_uri = match link.target() {
                    Some(target) => {
                        let descriptor = self.tracker.entity_descriptor(target).ok_or_else(|| {
                            ODataError::invalid_operation(
                                format!("link target {target}"),
                                InvalidOperationKind::EntityNotContained,
                            )
                        })?;
                        Some(self.entity_uri(descriptor)?)
                    }
                    None => None,
                };

                let kind = match (link_descriptor.state(), target_uri) {
                    (EntityState::Deleted, Some(uri)) if collection => {
                        self.write_removed(writer, &uri, "changed")?;
                        ShapeKind::Removed
                    }
                    (EntityState::Deleted, _) => {
                        writer.null()?;
                        ShapeKind::Removed
                    }
                    (_, None) => {
                        writer.null()?;
                        ShapeKind::Cleared
                    }
                    (_, Some(uri)) => {
                        self.write_reference(writer, &uri)?;
                        ShapeKind::Reference
                    }
                };
                Ok(ShapeNode::leaf(link_descriptor.id(), Some(edge.link), kind))
            }
        }
    }
}

fn entity_of(descriptor: &Descriptor) -> Result<&EntityDescriptor> {
    descriptor.as_entity().ok_or_else(|| {
        ODataError::invalid_operation(
            format!("{} is a {} descriptor", descriptor.id(), descriptor.kind_name()),
            InvalidOperationKind::EntityNotContained,
        )
    })
}

/// Group edges by navigation, keeping first-appearance order.
fn group_by_navigation(edges: &[RelatedDescriptor]) -> IndexMap<&str, Vec<&RelatedDescriptor>> {
    let mut groups: IndexMap<&str, Vec<&RelatedDescriptor>> = IndexMap::new();
    for edge in edges {
        groups.entry(edge.navigation.as_str()).or_default().push(edge);
    }
    groups
}
