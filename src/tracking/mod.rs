//! Change tracking.
//!
//! [`EntityTracker`] owns every descriptor of a session. All mutation goes
//! through tracker methods, which enforce the state machine in `state` and
//! stamp each state-changing operation with the next value of a per-session
//! change counter. Sorting pending descriptors by that counter reproduces the
//! caller's edit sequence.

mod state;
mod tracker;

pub use tracker::EntityTracker;
pub(crate) use tracker::NewEntity;
