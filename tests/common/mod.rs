//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use odata_track::model::{EdmPrimitiveType, EntityTypeDef, PropertyType};
use odata_track::{
    AsyncTransport, ClientConfig, DataServiceContext, EdmModel, EntityInstance, InstanceId,
    ODataRequest, ODataResponse, Transport, TransportError,
};
use std::cell::RefCell;

pub fn int32() -> PropertyType {
    PropertyType::Primitive(EdmPrimitiveType::Int32)
}

pub fn string() -> PropertyType {
    PropertyType::Primitive(EdmPrimitiveType::String)
}

/// People with a `Cars` collection and a single-valued `Spouse`.
/// `NS.Employee` derives from `NS.Person` and shares the `People` set.
pub fn people_model() -> EdmModel {
    EdmModel::new()
        .with_entity_type(
            "NS.Person",
            EntityTypeDef::new()
                .key("ID", int32())
                .property("Name", string())
                .navigation("Cars", "NS.Car", true)
                .navigation("Spouse", "NS.Person", false),
        )
        .with_entity_type(
            "NS.Employee",
            EntityTypeDef::new().base("NS.Person").property("Salary", int32()),
        )
        .with_entity_type(
            "NS.Car",
            EntityTypeDef::new().key("ID", int32()).property("Name", string()),
        )
        .with_entity_set("People", "NS.Person")
        .with_entity_set("Cars", "NS.Car")
}

pub fn context() -> DataServiceContext {
    DataServiceContext::new(people_model(), ClientConfig::default())
}

pub fn context_with(config: ClientConfig) -> DataServiceContext {
    DataServiceContext::new(people_model(), config)
}

pub fn person(ctx: &mut DataServiceContext, id: i32, name: &str) -> InstanceId {
    ctx.create_instance(EntityInstance::new("NS.Person").with("ID", id).with("Name", name))
}

pub fn car(ctx: &mut DataServiceContext, id: i32, name: &str) -> InstanceId {
    ctx.create_instance(EntityInstance::new("NS.Car").with("ID", id).with("Name", name))
}

/// Transport that records every request and answers with a canned response.
pub struct RecordingTransport {
    pub response: Result<ODataResponse, TransportError>,
    pub requests: RefCell<Vec<ODataRequest>>,
}

impl RecordingTransport {
    pub fn new(response: ODataResponse) -> Self {
        Self {
            response: Ok(response),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn failing(error: TransportError) -> Self {
        Self {
            response: Err(error),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn last_body(&self) -> String {
        self.requests
            .borrow()
            .last()
            .map(ODataRequest::body_text)
            .unwrap_or_default()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, request: &ODataRequest) -> Result<ODataResponse, TransportError> {
        self.requests.borrow_mut().push(request.clone());
        self.response.clone()
    }
}

impl AsyncTransport for RecordingTransport {
    async fn send(&self, request: &ODataRequest) -> Result<ODataResponse, TransportError> {
        <Self as Transport>::send(self, request)
    }
}
