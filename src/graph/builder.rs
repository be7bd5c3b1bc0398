//! Builds an [`UpdateGraph`] from the tracker's pending descriptors.

use super::{EdgeKind, RelatedDescriptor, SaveMode, UpdateGraph};
use crate::error::{InvalidOperationKind, ODataError, Result};
use crate::model::{Descriptor, DescriptorId, EntityState, InstanceId, ServiceModel};
use crate::tracking::EntityTracker;
use std::collections::{HashSet, VecDeque};

/// Walks navigation links from the roots and selects what to send.
pub struct GraphBuilder<'a> {
    tracker: &'a EntityTracker,
    model: &'a dyn ServiceModel,
    mode: SaveMode,
}

impl<'a> GraphBuilder<'a> {
    #[must_use]
    pub fn new(tracker: &'a EntityTracker, model: &'a dyn ServiceModel, mode: SaveMode) -> Self {
        Self {
            tracker,
            model,
            mode,
        }
    }

    /// Build the graph for `roots` out of the `changed` descriptors.
    ///
    /// With `validate_only` the full traversal and all checks run, but no
    /// entity set has to be resolvable.
    pub fn build_descriptor_graph(
        &self,
        changed: &[&Descriptor],
        validate_only: bool,
        roots: &[InstanceId],
    ) -> Result<UpdateGraph> {
        if roots.is_empty() {
            return Err(ODataError::argument_null("roots"));
        }
        if self.mode == SaveMode::DeepInsert && roots.len() > 1 {
            return Err(ODataError::invalid_operation(
                "deep insert",
                InvalidOperationKind::OnlyOneTopLevelEntity,
            ));
        }

        let pending: HashSet<DescriptorId> = changed
            .iter()
            .filter(|d| {
                if d.as_stream().is_some() {
                    tracing::debug!(id = %d.id(), "stream descriptors are saved separately; skipping");
                    false
                } else {
                    true
                }
            })
            .map(|d| d.id())
            .collect();

        let mut graph = UpdateGraph::new(self.mode);
        let mut queue: VecDeque<InstanceId> = VecDeque::new();

        for &root in roots {
            let descriptor = self.tracker.entity_descriptor(root).ok_or_else(|| {
                ODataError::invalid_operation(
                    format!("{} root {root}", self.mode),
                    InvalidOperationKind::EntityNotContained,
                )
            })?;
            if self.mode == SaveMode::DeepInsert && descriptor.state() != EntityState::Added {
                return Err(ODataError::invalid_operation(
                    format!("deep insert root {root}"),
                    InvalidOperationKind::DeepInsertRootNotAdded,
                ));
            }
            if !graph.top_level.contains(&descriptor.id()) {
                graph.top_level.push(descriptor.id());
                queue.push_back(root);
            }
        }

        // Children of each node are computed once, which also ends cycles
        while let Some(instance) = queue.pop_front() {
            let Some(node) = self.tracker.entity_descriptor(instance) else {
                continue;
            };
            if graph.related.contains_key(&node.id()) {
                continue;
            }
            let edges = self.related_edges(instance, &pending, &mut queue)?;
            graph.related.insert(node.id(), edges);
        }

        graph.entity_set_name = self.root_entity_set(roots[0]);
        if graph.entity_set_name.is_none() && !validate_only {
            return Err(ODataError::argument_null("entitySetName"));
        }

        tracing::debug!(
            mode = %self.mode,
            roots = graph.top_level.len(),
            nodes = graph.node_count(),
            "built descriptor graph"
        );
        Ok(graph)
    }

    fn root_entity_set(&self, root: InstanceId) -> Option<String> {
        let entity = self.tracker.entity_descriptor(root)?.as_entity()?;
        entity
            .entity_set()
            .map(str::to_string)
            .or_else(|| self.model.resolve_entity_set(entity.type_name()))
    }

    fn related_edges(
        &self,
        source: InstanceId,
        pending: &HashSet<DescriptorId>,
        queue: &mut VecDeque<InstanceId>,
    ) -> Result<Vec<RelatedDescriptor>> {
        let mut edges = Vec::new();
        for link_descriptor in self.tracker.links_from(source) {
            let Some(link) = link_descriptor.as_link() else {
                continue;
            };
            let link_state = link_descriptor.state();
            let link_pending = pending.contains(&link_descriptor.id());
            let target = link
                .target()
                .and_then(|t| self.tracker.entity_descriptor(t).map(|d| (t, d)));

            let edge = |descriptor: DescriptorId, kind: EdgeKind| RelatedDescriptor {
                navigation: link.source_property().to_string(),
                link: link_descriptor.id(),
                descriptor,
                kind,
            };

            if self.mode == SaveMode::DeepInsert {
                if matches!(link_state, EntityState::Deleted | EntityState::Modified) {
                    return Err(deep_insert_mutation(source, link.source_property()));
                }
                match target {
                    Some((_, t)) if matches!(t.state(), EntityState::Deleted | EntityState::Modified) => {
                        return Err(deep_insert_mutation(source, link.source_property()));
                    }
                    Some((instance, t)) if t.state() == EntityState::Added => {
                        edges.push(edge(t.id(), EdgeKind::NestedEntity));
                        queue.push_back(instance);
                    }
                    _ if link_pending => edges.push(edge(link_descriptor.id(), EdgeKind::Link)),
                    _ => {}
                }
                continue;
            }

            if link_state == EntityState::Deleted {
                if link_pending {
                    edges.push(edge(link_descriptor.id(), EdgeKind::Link));
                }
                continue;
            }
            match target {
                Some((instance, t)) if pending.contains(&t.id()) && t.state() != EntityState::Unchanged => {
                    edges.push(edge(t.id(), EdgeKind::NestedEntity));
                    if t.state() != EntityState::Deleted {
                        queue.push_back(instance);
                    }
                }
                _ if link_pending => edges.push(edge(link_descriptor.id(), EdgeKind::Link)),
                _ => {}
            }
        }
        Ok(edges)
    }
}

fn deep_insert_mutation(source: InstanceId, navigation: &str) -> ODataError {
    ODataError::invalid_operation(
        format!("deep insert via {source}.{navigation}"),
        InvalidOperationKind::DeepInsertDeletedOrModified,
    )
}
