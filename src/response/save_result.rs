//! Outcome of a save call.

use crate::error::ServerError;
use crate::model::DescriptorId;
use std::fmt;

/// Lifecycle of one save call.
///
/// `Pending -> Sending -> Success | PartialFailure | Failure`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SaveState {
    #[default]
    Pending,
    Sending,
    Success,
    /// Some operations failed, the rest were applied
    PartialFailure,
    /// Nothing was applied
    Failure,
}

impl SaveState {
    /// Terminal states end the call.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::PartialFailure | Self::Failure)
    }
}

impl fmt::Display for SaveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Sending => "sending",
            Self::Success => "success",
            Self::PartialFailure => "partial failure",
            Self::Failure => "failure",
        };
        f.write_str(name)
    }
}

/// Result of one operation, nested like the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResponse {
    pub descriptor: DescriptorId,
    pub status_code: u16,
    pub error: Option<ServerError>,
    pub nested: Vec<OperationResponse>,
}

impl OperationResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// This operation followed by all nested ones, depth first.
    pub fn iter(&self) -> impl Iterator<Item = &OperationResponse> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let next = stack.pop()?;
            stack.extend(next.nested.iter().rev());
            Some(next)
        })
    }
}

/// Per-node outcomes of a save call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveChangesResponse {
    pub state: SaveState,
    pub operations: Vec<OperationResponse>,
}

impl SaveChangesResponse {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Every operation, depth first in request order.
    pub fn iter(&self) -> impl Iterator<Item = &OperationResponse> {
        self.operations.iter().flat_map(OperationResponse::iter)
    }

    #[must_use]
    pub fn failures(&self) -> Vec<&OperationResponse> {
        self.iter().filter(|op| !op.is_success()).collect()
    }

    /// Outcome of the operation for `descriptor`, if it took part.
    #[must_use]
    pub fn find(&self, descriptor: DescriptorId) -> Option<&OperationResponse> {
        self.iter().find(|op| op.descriptor == descriptor)
    }
}

/// Drives the [`SaveState`] machine of one call.
#[derive(Debug, Default)]
pub struct SaveResult {
    state: SaveState,
}

impl SaveResult {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> SaveState {
        self.state
    }

    /// The request is about to be handed to the transport.
    pub fn begin_sending(&mut self) {
        debug_assert_eq!(self.state, SaveState::Pending);
        self.state = SaveState::Sending;
    }

    /// Settle on a terminal state from the correlated operations.
    pub fn complete(&mut self, operations: &[OperationResponse]) -> SaveState {
        let (total, failed) = operations
            .iter()
            .flat_map(OperationResponse::iter)
            .fold((0usize, 0usize), |(total, failed), op| {
                (total + 1, failed + usize::from(!op.is_success()))
            });
        self.state = match failed {
            0 => SaveState::Success,
            f if f == total => SaveState::Failure,
            _ => SaveState::PartialFailure,
        };
        self.state
    }

    /// The call failed before any operation could be applied.
    pub fn fail(&mut self) -> SaveState {
        self.state = SaveState::Failure;
        self.state
    }
}
