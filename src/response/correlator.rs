//! Reads a save response back onto the descriptors that produced the request.
//!
//! Correlation runs in two phases. The first walks the response in lockstep
//! with the [`PayloadShape`] and decides an outcome for every node, failing
//! the whole call on anything malformed. Only when that succeeds does the
//! second phase touch descriptors, so a rejected response leaves the session
//! exactly as it was.

use super::save_result::{OperationResponse, SaveChangesResponse, SaveResult};
use crate::config::{AnnotationStyle, ClientConfig};
use crate::error::{ErrorContext, ODataError, Result, ServerError};
use crate::model::{DescriptorId, DescriptorKind, EntityState, InstanceStore, ODataValue, ServiceModel};
use crate::serializer::uri::entity_path;
use crate::serializer::{PayloadShape, ShapeKind, ShapeNode};
use crate::tracking::EntityTracker;
use crate::transport::ODataResponse;
use serde_json::{Map, Value};

const FAILURE_ANNOTATIONS: [&str; 2] = [
    "@Core.DataModificationException",
    "@Org.OData.Core.V1.DataModificationException",
];

/// Status reported for a failed operation that carries no `responseCode`.
const DEFAULT_FAILURE_STATUS: u16 = 400;

#[derive(Debug, Default)]
struct Merge {
    properties: Vec<(String, ODataValue)>,
    etag: Option<String>,
}

#[derive(Debug)]
enum Outcome {
    Apply(Merge),
    Failed(ServerError),
}

#[derive(Debug)]
struct Plan {
    descriptor: DescriptorId,
    link: Option<DescriptorId>,
    kind: ShapeKind,
    outcome: Outcome,
}

/// Applies a save response to the tracker and instance store.
pub struct ResponseCorrelator<'a> {
    tracker: &'a mut EntityTracker,
    instances: &'a mut InstanceStore,
    model: &'a dyn ServiceModel,
    config: &'a ClientConfig,
}

impl<'a> ResponseCorrelator<'a> {
    pub fn new(
        tracker: &'a mut EntityTracker,
        instances: &'a mut InstanceStore,
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

    /// Correlate `response` with the request described by `shape`.
    ///
    /// Returns the per-node outcomes when every operation succeeded. Any
    /// failure is reported as an aggregate [`ODataError::Request`] carrying
    /// the first server error and the full response tree.
    pub fn correlate(
        mut self,
        shape: &PayloadShape,
        response: &ODataResponse,
        result: &mut SaveResult,
    ) -> Result<SaveChangesResponse> {
        if response.status >= 400 {
            let inner = parse_error_body(response);
            tracing::warn!(status = response.status, message = %inner.message, "save request rejected");
            return Err(ODataError::request(
                "the service rejected the request",
                Some(inner),
                failed_response(result),
            ));
        }

        let acknowledge_all = response.is_no_content();
        let body = if acknowledge_all {
            Value::Null
        } else {
            match serde_json::from_slice::<Value>(&response.body) {
                Ok(body) => body,
                Err(err) => {
                    return Err(ODataError::request(
                        "the response could not be read",
                        Some(ServerError {
                            status_code: response.status,
                            code: None,
                            message: err.to_string(),
                        }),
                        failed_response(result),
                    ))
                }
            }
        };

        let entries: Vec<Option<&Value>> = if acknowledge_all {
            vec![None; shape.roots.len()]
        } else if shape.envelope {
            let items = body.get("value").and_then(Value::as_array);
            (0..shape.roots.len())
                .map(|i| items.and_then(|items| items.get(i)))
                .collect()
        } else {
            vec![Some(&body)]
        };

        // Phase 1: decide every outcome without touching any descriptor
        let mut plans = Vec::new();
        let mut operations = Vec::with_capacity(shape.roots.len());
        for (node, entry) in shape.roots.iter().zip(entries) {
            match self.plan_node(node, entry, response.status, acknowledge_all, &mut plans) {
                Ok(operation) => operations.push(operation),
                Err(err) => {
                    tracing::warn!(error = %err, "save response failed validation");
                    return Err(ODataError::request(
                        "the response failed validation",
                        Some(ServerError {
                            status_code: response.status,
                            code: None,
                            message: err.to_string(),
                        }),
                        failed_response(result),
                    ));
                }
            }
        }

        // Phase 2: apply
        for plan in plans {
            self.apply(plan);
        }

        let state = result.complete(&operations);
        let response = SaveChangesResponse { state, operations };
        let failures = response.failures();
        if let Some(first) = failures.first() {
            tracing::warn!(failed = failures.len(), %state, "operations failed");
            let inner = first.error.clone();
            return Err(ODataError::request(
                "one or more operations failed",
                inner,
                response,
            ));
        }
        tracing::info!(operations = response.iter().count(), "save response applied");
        Ok(response)
    }

    fn plan_node(
        &self,
        node: &ShapeNode,
        entry: Option<&Value>,
        status: u16,
        acknowledge_all: bool,
        plans: &mut Vec<Plan>,
    ) -> Result<OperationResponse> {
        let outcome = match (entry.and_then(failure_of), node.kind, entry) {
            (Some(failure), _, _) => Outcome::Failed(failure),
            (None, ShapeKind::Entity, Some(Value::Object(members))) => {
                Outcome::Apply(self.read_entry(node.descriptor, members)?)
            }
            (None, ShapeKind::Entity, None) if !acknowledge_all => {
                Outcome::Failed(missing_entry(status))
            }
            (None, ShapeKind::Entity, Some(other)) if !other.is_null() => {
                return Err(ODataError::validation(format!(
                    "expected an entry object for {}, found {other}",
                    node.descriptor
                )));
            }
            _ => Outcome::Apply(Merge::default()),
        };

        let (status_code, error) = match &outcome {
            Outcome::Apply(_) => (status, None),
            Outcome::Failed(err) => {
                tracing::warn!(descriptor = %node.descriptor, message = %err.message, "operation failed");
                (err.status_code, Some(err.clone()))
            }
        };
        plans.push(Plan {
            descriptor: node.descriptor,
            link: node.link,
            kind: node.kind,
            outcome,
        });

        let mut nested = Vec::new();
        for navigation in &node.navigations {
            let value = entry.and_then(|entry| {
                entry
                    .get(&navigation.wire_key)
                    .or_else(|| entry.get(&navigation.property))
                    .or_else(|| entry.get(format!("{}@delta", navigation.property)))
            });
            for (index, child) in navigation.nodes.iter().enumerate() {
                let child_entry = match value {
                    Some(Value::Array(items)) if navigation.collection => items.get(index),
                    Some(single) if !navigation.collection && !single.is_null() => Some(single),
                    _ => None,
                };
                nested.push(self.plan_node(child, child_entry, status, acknowledge_all, plans)?);
            }
        }

        Ok(OperationResponse {
            descriptor: node.descriptor,
            status_code,
            error,
            nested,
        })
    }

    fn read_entry(&self, id: DescriptorId, members: &Map<String, Value>) -> Result<Merge> {
        let entity = self
            .tracker
            .descriptor(id)
            .and_then(|d| d.as_entity())
            .ok_or_else(|| ODataError::validation(format!("{id} is not a tracked entity")))?;

        let type_name = AnnotationStyle::spellings("type")
            .iter()
            .find_map(|name| members.get(name).and_then(Value::as_str))
            .map_or(entity.type_name(), |t| t.trim_start_matches('#'));

        for key in self.model.key_properties(type_name) {
            if members.get(&key).is_some_and(Value::is_null) {
                return Err(ODataError::validation(format!(
                    "the key property '{key}' of '{type_name}' is null in the response"
                )));
            }
        }

        let mut merge = Merge {
            etag: AnnotationStyle::spellings("etag")
                .iter()
                .find_map(|name| members.get(name).and_then(Value::as_str))
                .map(str::to_string),
            ..Merge::default()
        };
        for (name, value) in members {
            if name.contains('@') || self.model.navigation(type_name, name).is_some() {
                continue;
            }
            let declared = self.model.property_type(type_name, name);
            let value = ODataValue::from_json(value, declared.as_ref())
                .with_context(|| format!("reading '{name}' of '{type_name}'"))?;
            merge.properties.push((name.clone(), value));
        }
        Ok(merge)
    }

    fn apply(&mut self, plan: Plan) {
        let Outcome::Apply(merge) = plan.outcome else {
            return;
        };
        if let Some(link) = plan.link {
            if link != plan.descriptor {
                self.settle_link(link);
            }
        }
        let Some(descriptor) = self.tracker.descriptor(plan.descriptor) else {
            return;
        };
        let is_entity = matches!(descriptor.kind(), DescriptorKind::Entity(_));
        let is_link = matches!(descriptor.kind(), DescriptorKind::Link(_));
        if is_entity {
            // A repeat reference acknowledges only its link
            if plan.kind != ShapeKind::Reference {
                self.settle_entity(plan.descriptor, merge);
            }
        } else if is_link {
            self.settle_link(plan.descriptor);
        } else {
            self.tracker.accept_changes(plan.descriptor);
        }
    }

    fn settle_link(&mut self, id: DescriptorId) {
        let Some(descriptor) = self.tracker.descriptor(id) else {
            return;
        };
        let cleared = descriptor.as_link().is_some_and(|link| link.target().is_none());
        if descriptor.state() == EntityState::Deleted || cleared {
            self.tracker.detach(id);
        } else {
            self.tracker.accept_changes(id);
        }
    }

    fn settle_entity(&mut self, id: DescriptorId, merge: Merge) {
        let Some(descriptor) = self.tracker.descriptor(id) else {
            return;
        };
        if descriptor.state() == EntityState::Deleted {
            self.tracker.detach(id);
            return;
        }
        let Some(entity) = descriptor.as_entity() else {
            return;
        };
        let instance_id = entity.instance();
        let entity_set = entity
            .entity_set()
            .map(str::to_string)
            .or_else(|| self.model.resolve_entity_set(entity.type_name()));

        let Some(instance) = self.instances.get_mut(instance_id) else {
            return;
        };
        for (name, value) in merge.properties {
            instance.set(name, value);
        }
        let snapshot = instance.properties().clone();
        let identity = entity_set.and_then(|set| {
            entity_path(self.model, &set, instance, self.config.payload.key_delimiter).ok()
        });

        if let Some(entity) = self.tracker.entity_mut(instance_id) {
            entity.snapshot = snapshot;
            entity.changed_properties.clear();
            if merge.etag.is_some() {
                entity.etag = merge.etag;
            }
        }
        if let Some(identity) = identity {
            if let Err(err) = self.tracker.set_identity(instance_id, identity) {
                tracing::warn!(error = %err, "identity returned by the service is already tracked");
            }
        }
        self.tracker.accept_changes(id);
    }
}

fn failed_response(result: &mut SaveResult) -> SaveChangesResponse {
    SaveChangesResponse {
        state: result.fail(),
        operations: Vec::new(),
    }
}

fn missing_entry(status: u16) -> ServerError {
    ServerError {
        status_code: status,
        code: None,
        message: "the response contains no entry for this operation".to_string(),
    }
}

/// Per-entry failure annotation, if present.
fn failure_of(value: &Value) -> Option<ServerError> {
    let annotation = FAILURE_ANNOTATIONS
        .iter()
        .find_map(|name| value.get(*name))?;
    let info = annotation.get("info");
    let text = |field: &str| {
        info.and_then(|info| info.get(field))
            .or_else(|| annotation.get(field))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    let status_code = annotation
        .get("responseCode")
        .or_else(|| info.and_then(|info| info.get("responseCode")))
        .and_then(Value::as_u64)
        .and_then(|code| u16::try_from(code).ok())
        .unwrap_or(DEFAULT_FAILURE_STATUS);
    Some(ServerError {
        status_code,
        code: text("code"),
        message: text("message").unwrap_or_else(|| "the operation failed".to_string()),
    })
}

/// `{"error":{"code":..,"message":..}}`, falling back to the raw body.
fn parse_error_body(response: &ODataResponse) -> ServerError {
    let parsed = serde_json::from_slice::<Value>(&response.body).ok();
    let error = parsed.as_ref().and_then(|body| body.get("error"));
    let field = |name: &str| error.and_then(|e| e.get(name)).and_then(Value::as_str).map(str::to_string);
    ServerError {
        status_code: response.status,
        code: field("code"),
        message: field("message").unwrap_or_else(|| String::from_utf8_lossy(&response.body).into_owned()),
    }
}
