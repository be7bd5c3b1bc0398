//! Client-side data model.
//!
//! Entity instances and their values live in an [`InstanceStore`]; the tracker
//! records what happened to them in [`Descriptor`]s. [`ServiceModel`] answers
//! the metadata questions the engine needs.

mod descriptor;
mod edm;
mod entity;
mod value;

pub use descriptor::*;
pub use edm::*;
pub use entity::*;
pub use value::*;
