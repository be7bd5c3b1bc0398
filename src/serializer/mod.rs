//! JSON payloads and literals.
//!
//! - [`JsonWriter`]: streaming token writer
//! - [`literal`]: bit-exact URL and JSON literal forms
//! - [`uri`]: key predicates, entity URIs and percent-encoding
//! - [`PayloadSerializer`]: delta feeds and deep-insert bodies, returning the
//!   [`PayloadShape`] the response correlator walks

pub mod literal;
mod payload;
mod shape;
pub mod uri;
mod writer;

pub use payload::PayloadSerializer;
pub use shape::{PayloadShape, ShapeKind, ShapeNavigation, ShapeNode};
pub use writer::JsonWriter;
