//! Update graphs for bulk update and deep insert.
//!
//! The graph is an overlay: it holds descriptor ids only, so it is cheap to
//! rebuild and never outlives a borrow of the tracker.

mod builder;
mod update_graph;

pub use builder::GraphBuilder;
pub use update_graph::{EdgeKind, RelatedDescriptor, SaveMode, UpdateGraph};
