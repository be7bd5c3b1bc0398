//! Everything that happens after the request leaves: save outcomes,
//! response correlation and query materialization.

mod correlator;
mod materializer;
mod save_result;

pub use correlator::ResponseCorrelator;
pub use materializer::{Materialized, Materializer, PayloadKind, QueryResult};
pub use save_result::{OperationResponse, SaveChangesResponse, SaveResult, SaveState};
