//! Client session: tracking API and save pipeline.
//!
//! ```
//! use odata_track::client::DataServiceContext;
//! use odata_track::config::ClientConfig;
//! use odata_track::model::{EdmModel, EdmPrimitiveType, EntityInstance, EntityState, EntityTypeDef, PropertyType};
//!
//! let model = EdmModel::new()
//!     .with_entity_type(
//!         "NS.Person",
//!         EntityTypeDef::new().key("ID", PropertyType::Primitive(EdmPrimitiveType::Int32)),
//!     )
//!     .with_entity_set("People", "NS.Person");
//! let mut ctx = DataServiceContext::new(model, ClientConfig::default());
//!
//! let person = ctx.create_instance(EntityInstance::new("NS.Person").with("ID", 1));
//! ctx.attach(person)?;
//! ctx.set_property(person, "Name", "Bing")?;
//! assert_eq!(ctx.get_descriptor(person).map(|d| d.state()), Some(EntityState::Modified));
//! # Ok::<(), odata_track::ODataError>(())
//! ```

mod context;
mod save;

pub use context::DataServiceContext;
pub use save::PreparedRequest;
