//! **Change tracking and graph serialization for OData clients.**
//!
//! `odata-track` is the engine underneath an OData client's save pipeline. It
//! tracks a mutable graph of entity instances (cycles and shared references
//! included), orders pending changes by a per-session change counter, builds
//! nested update graphs for **bulk update** and **deep insert**, writes them
//! as OData JSON payloads and reads partial-failure responses back onto the
//! descriptors that produced them.
//!
//! ## Core Concepts & Modules
//!
//! - **[`model`]**: entity instances, [`ODataValue`]s, descriptors and the
//!   [`ServiceModel`] trait with its in-memory [`EdmModel`].
//! - **[`tracking`]**: the [`EntityTracker`], its state machine and change ordering.
//! - **[`graph`]**: the [`GraphBuilder`] selecting what a save sends.
//! - **[`serializer`]**: the streaming [`JsonWriter`], bit-exact literals and
//!   the [`PayloadSerializer`].
//! - **[`response`]**: save outcomes, response correlation and query materialization.
//! - **[`client`]**: the [`DataServiceContext`] session facade and save pipeline.
//! - **[`transport`]**: the request/response types and the transport traits.
//! - **[`config`]**: [`ClientConfig`] with presets, validation and YAML discovery.
//!
//! ## Getting Started
//!
//! ```
//! use odata_track::{ClientConfig, DataServiceContext, EdmModel, EntityInstance, SaveMode};
//! use odata_track::model::{EdmPrimitiveType, EntityTypeDef, PropertyType};
//!
//! fn main() -> odata_track::Result<()> {
//!     let int = PropertyType::Primitive(EdmPrimitiveType::Int32);
//!     let model = EdmModel::new()
//!         .with_entity_type(
//!             "NS.Person",
//!             EntityTypeDef::new().key("ID", int.clone()).navigation("Cars", "NS.Car", true),
//!         )
//!         .with_entity_type("NS.Car", EntityTypeDef::new().key("ID", int))
//!         .with_entity_set("People", "NS.Person")
//!         .with_entity_set("Cars", "NS.Car");
//!     let mut ctx = DataServiceContext::new(model, ClientConfig::default());
//!
//!     let person = ctx.create_instance(EntityInstance::new("NS.Person").with("ID", 100).with("Name", "Bing"));
//!     let car = ctx.create_instance(EntityInstance::new("NS.Car").with("ID", 1001).with("Name", "A"));
//!     ctx.attach(person)?;
//!     ctx.add_related_object(person, "Cars", car)?;
//!
//!     let prepared = ctx.build_request(SaveMode::BulkUpdate, &[person])?;
//!     assert!(prepared.request.body_text().contains(r#""Cars@delta":[{"ID":1001,"Name":"A"}]"#));
//!     Ok(())
//! }
//! ```
//!
//! ## Command-Line Interface (CLI)
//!
//! The `odata-track` binary replays session scripts and prints the request
//! payload they produce; see [`cli::SessionScript`].

// Lint to discourage unwrap() in production code - prefer explicit error handling
#![warn(clippy::unwrap_used)]
#![allow(
    // Doc completeness: # Errors sections are aspirational
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    // Payload writers mirror the wire format and read best unsplit
    clippy::too_many_lines,
    clippy::module_name_repetitions
)]

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod graph;
pub mod model;
pub mod response;
pub mod serializer;
pub mod tracking;
pub mod transport;

// Re-export main types for convenience
pub use client::{DataServiceContext, PreparedRequest};
pub use config::{ClientConfig, ClientConfigBuilder, ConfigPreset};
pub use config::{ConfigError, Validatable};
pub use error::{DataServiceRequestError, ErrorContext, ODataError, OptionContext, Result, ServerError};
pub use graph::{GraphBuilder, SaveMode, UpdateGraph};
pub use model::{
    Descriptor, DescriptorId, EdmModel, EntityInstance, EntityState, InstanceId, ODataValue,
    ServiceModel,
};
pub use response::{
    Materializer, OperationResponse, PayloadKind, QueryResult, SaveChangesResponse, SaveState,
};
pub use serializer::{JsonWriter, PayloadSerializer, PayloadShape};
pub use tracking::EntityTracker;
pub use transport::{AsyncTransport, ODataRequest, ODataResponse, Transport, TransportError};
