//! Session scripts.
//!
//! A script declares a model, a set of named entity instances and the
//! tracking calls to replay against them:
//!
//! ```yaml
//! model:
//!   entity_types:
//!     NS.Person: { keys: [ID], properties: { ID: Edm.Int32, Name: Edm.String } }
//!   entity_sets: { People: NS.Person }
//! entities:
//!   - { name: bing, type: NS.Person, properties: { ID: 100, Name: Bing } }
//! steps:
//!   - { op: attach, entity: bing }
//!   - { op: set_property, entity: bing, name: Name, value: Bang }
//! save:
//!   mode: bulk_update
//!   roots: [bing]
//! ```

use crate::client::DataServiceContext;
use crate::config::ClientConfig;
use crate::graph::SaveMode;
use crate::model::{EdmModel, EntityInstance, EntityState, InstanceId, ODataValue, ServiceModel};
use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A named entity instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySpec {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub properties: IndexMap<String, serde_json::Value>,
}

/// One tracking call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Attach {
        entity: String,
        #[serde(default)]
        entity_set: Option<String>,
        #[serde(default)]
        etag: Option<String>,
    },
    Add {
        entity: String,
        #[serde(default)]
        entity_set: Option<String>,
    },
    Update {
        entity: String,
    },
    Delete {
        entity: String,
    },
    Detach {
        entity: String,
    },
    SetProperty {
        entity: String,
        name: String,
        value: serde_json::Value,
    },
    ChangeState {
        entity: String,
        state: EntityState,
    },
    AttachLink {
        source: String,
        navigation: String,
        target: String,
    },
    AddLink {
        source: String,
        navigation: String,
        target: String,
    },
    DeleteLink {
        source: String,
        navigation: String,
        target: String,
    },
    SetLink {
        source: String,
        navigation: String,
        #[serde(default)]
        target: Option<String>,
    },
    AddRelated {
        source: String,
        navigation: String,
        target: String,
    },
    SetRelated {
        source: String,
        navigation: String,
        target: String,
    },
    SetStream {
        entity: String,
        #[serde(default)]
        name: Option<String>,
        content_type: String,
        content: String,
    },
}

impl Step {
    fn op(&self) -> &'static str {
        match self {
            Self::Attach { .. } => "attach",
            Self::Add { .. } => "add",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
            Self::Detach { .. } => "detach",
            Self::SetProperty { .. } => "set_property",
            Self::ChangeState { .. } => "change_state",
            Self::AttachLink { .. } => "attach_link",
            Self::AddLink { .. } => "add_link",
            Self::DeleteLink { .. } => "delete_link",
            Self::SetLink { .. } => "set_link",
            Self::AddRelated { .. } => "add_related",
            Self::SetRelated { .. } => "set_related",
            Self::SetStream { .. } => "set_stream",
        }
    }
}

/// What to save once the steps have run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveSpec {
    #[serde(default = "default_mode")]
    pub mode: SaveMode,
    pub roots: Vec<String>,
}

const fn default_mode() -> SaveMode {
    SaveMode::BulkUpdate
}

/// A replayable tracking session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionScript {
    /// Overrides the configured service root
    #[serde(default)]
    pub service_root: Option<String>,
    pub model: EdmModel,
    #[serde(default)]
    pub entities: Vec<EntitySpec>,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub save: Option<SaveSpec>,
}

/// A context after replaying a script, with the script's instance names.
#[derive(Debug)]
pub struct Session {
    pub context: DataServiceContext,
    pub names: IndexMap<String, InstanceId>,
}

impl Session {
    pub fn instance(&self, name: &str) -> Result<InstanceId> {
        lookup(&self.names, name)
    }

    /// Roots named by the script's `save` section.
    pub fn roots(&self, save: &SaveSpec) -> Result<Vec<InstanceId>> {
        save.roots.iter().map(|name| self.instance(name)).collect()
    }
}

fn lookup(names: &IndexMap<String, InstanceId>, name: &str) -> Result<InstanceId> {
    names
        .get(name)
        .copied()
        .ok_or_else(|| anyhow!("unknown entity '{name}'"))
}

impl SessionScript {
    /// Parse a YAML (or JSON) script.
    pub fn parse(content: &str) -> Result<Self> {
        serde_yaml_ng::from_str(content).context("invalid session script")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read script {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("in {}", path.display()))
    }

    /// Create the instances and run every step.
    pub fn replay(&self, mut config: ClientConfig) -> Result<Session> {
        if let Some(root) = &self.service_root {
            config.service_root.clone_from(root);
        }
        let mut session = Session {
            context: DataServiceContext::new(self.model.clone(), config),
            names: IndexMap::new(),
        };

        for spec in &self.entities {
            let mut instance = EntityInstance::new(spec.type_name.clone());
            for (name, raw) in &spec.properties {
                let declared = self.model.property_type(&spec.type_name, name);
                let value = ODataValue::from_json(raw, declared.as_ref())
                    .with_context(|| format!("property '{name}' of entity '{}'", spec.name))?;
                instance.set(name.clone(), value);
            }
            let id = session.context.create_instance(instance);
            if session.names.insert(spec.name.clone(), id).is_some() {
                return Err(anyhow!("entity '{}' is declared twice", spec.name));
            }
        }

        for (index, step) in self.steps.iter().enumerate() {
            self.apply(&mut session, step)
                .with_context(|| format!("step {} ({})", index + 1, step.op()))?;
        }
        tracing::debug!(
            entities = session.names.len(),
            steps = self.steps.len(),
            pending = session.context.modified_descriptors().len(),
            "replayed session script"
        );
        Ok(session)
    }

    fn apply(&self, session: &mut Session, step: &Step) -> Result<()> {
        let Session { context, names } = session;
        let id = |name: &str| lookup(names, name);
        match step {
            Step::Attach { entity, entity_set, etag } => {
                let instance = id(entity)?;
                match entity_set {
                    Some(set) => context.attach_to(set, instance, etag.as_deref())?,
                    None => context.attach(instance)?,
                };
            }
            Step::Add { entity, entity_set } => {
                let instance = id(entity)?;
                let set = match entity_set {
                    Some(set) => set.clone(),
                    None => self
                        .model
                        .resolve_entity_set(&self.type_of(entity)?)
                        .ok_or_else(|| anyhow!("no entity set holds '{entity}'"))?,
                };
                context.add_object(&set, instance)?;
            }
            Step::Update { entity } => context.update_object(id(entity)?)?,
            Step::Delete { entity } => context.delete_object(id(entity)?)?,
            Step::Detach { entity } => {
                context.detach(id(entity)?);
            }
            Step::SetProperty { entity, name, value } => {
                let declared = self.model.property_type(&self.type_of(entity)?, name);
                let value = ODataValue::from_json(value, declared.as_ref())?;
                context.set_property(id(entity)?, name, value)?;
            }
            Step::ChangeState { entity, state } => {
                context.change_state(id(entity)?, *state)?;
            }
            Step::AttachLink { source, navigation, target } => {
                context.attach_link(id(source)?, navigation, id(target)?)?;
            }
            Step::AddLink { source, navigation, target } => {
                context.add_link(id(source)?, navigation, id(target)?)?;
            }
            Step::DeleteLink { source, navigation, target } => {
                context.delete_link(id(source)?, navigation, id(target)?)?;
            }
            Step::SetLink { source, navigation, target } => {
                let target = target.as_deref().map(id).transpose()?;
                context.set_link(id(source)?, navigation, target)?;
            }
            Step::AddRelated { source, navigation, target } => {
                context.add_related_object(id(source)?, navigation, id(target)?)?;
            }
            Step::SetRelated { source, navigation, target } => {
                context.set_related_object(id(source)?, navigation, id(target)?)?;
            }
            Step::SetStream { entity, name, content_type, content } => {
                context.set_save_stream(
                    id(entity)?,
                    name.as_deref(),
                    content_type,
                    content.as_bytes().to_vec(),
                )?;
            }
        }
        Ok(())
    }

    fn type_of(&self, name: &str) -> Result<String> {
        self.entities
            .iter()
            .find(|spec| spec.name == name)
            .map(|spec| spec.type_name.clone())
            .ok_or_else(|| anyhow!("unknown entity '{name}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = r"
model:
  entity_types:
    NS.Person:
      keys: [ID]
      properties: { ID: Edm.Int32, Name: Edm.String }
      navigations:
        Cars: { target: NS.Car, collection: true }
    NS.Car:
      keys: [ID]
      properties: { ID: Edm.Int32, Name: Edm.String }
  entity_sets: { People: NS.Person, Cars: NS.Car }
entities:
  - { name: bing, type: NS.Person, properties: { ID: 100, Name: Bing } }
  - { name: car, type: NS.Car, properties: { ID: 1001, Name: A } }
steps:
  - { op: attach, entity: bing }
  - { op: add_related, source: bing, navigation: Cars, target: car }
save:
  roots: [bing]
";

    #[test]
    fn test_parse_and_replay() {
        let script = SessionScript::parse(SCRIPT).unwrap();
        assert_eq!(script.steps.len(), 2);
        let save = script.save.clone().unwrap();
        assert_eq!(save.mode, SaveMode::BulkUpdate);

        let session = script.replay(ClientConfig::default()).unwrap();
        let car = session.instance("car").unwrap();
        assert_eq!(
            session.context.get_descriptor(car).map(|d| d.state()),
            Some(EntityState::Added)
        );
        assert_eq!(session.roots(&save).unwrap().len(), 1);
    }

    #[test]
    fn test_failing_step_names_its_position() {
        let mut script = SessionScript::parse(SCRIPT).unwrap();
        script.steps.push(Step::Update {
            entity: "ghost".to_string(),
        });
        let err = script.replay(ClientConfig::default()).unwrap_err();
        assert!(format!("{err:#}").contains("step 3 (update)"), "{err:#}");
    }
}
