//! Descriptor state machine.
//!
//! ```text
//!            mutate              delete
//! Unchanged ───────▶ Modified ─────────▶ Deleted
//!     ▲                 │                   │
//!     └──── revert ─────┴──────── revert ───┘
//!
//! Added ──▶ Detached          any ──▶ Detached (terminal)
//! ```

use crate::error::{InvalidOperationKind, ODataError, Result};
use crate::model::EntityState;

/// What the tracker must do to honour a requested state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    /// Move to the target state and take a fresh change order
    Stamp,
    /// Move to the target state keeping the current change order
    Preserve,
    /// Remove the descriptor from the tracker
    Detach,
    /// Already in the target state
    NoOp,
}

/// Plan the transition `current -> target`, rejecting illegal ones.
pub(crate) fn plan_transition(current: EntityState, target: EntityState) -> Result<Transition> {
    use EntityState::{Added, Deleted, Detached, Modified, Unchanged};

    if target == Added {
        return Err(ODataError::NotSupported(
            "changing state to Added; use add_object or add_link".to_string(),
        ));
    }
    if target == Detached {
        return Ok(Transition::Detach);
    }
    if current == target {
        return Ok(Transition::NoOp);
    }

    match (current, target) {
        (Unchanged, Modified | Deleted) | (Modified, Deleted) => Ok(Transition::Stamp),
        (Modified | Deleted, Unchanged) => Ok(Transition::Preserve),
        _ => Err(illegal(current, target)),
    }
}

fn illegal(from: EntityState, to: EntityState) -> ODataError {
    ODataError::invalid_operation(
        "change_state",
        InvalidOperationKind::StateTransition {
            from: from.to_string(),
            to: to.to_string(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use EntityState::*;

    #[test]
    fn test_added_target_is_not_supported() {
        for current in [Unchanged, Modified, Deleted, Added] {
            let err = plan_transition(current, Added).unwrap_err();
            assert!(matches!(err, ODataError::NotSupported(_)), "{current}: {err:?}");
        }
    }

    #[test]
    fn test_added_only_detaches() {
        assert_eq!(plan_transition(Added, Detached).unwrap(), Transition::Detach);
        for target in [Unchanged, Modified, Deleted] {
            let err = plan_transition(Added, target).unwrap_err();
            assert!(err.invalid_operation_kind().is_some(), "{target}: {err:?}");
        }
    }

    #[test]
    fn test_modified_only_from_unchanged() {
        assert_eq!(plan_transition(Unchanged, Modified).unwrap(), Transition::Stamp);
        assert_eq!(plan_transition(Modified, Modified).unwrap(), Transition::NoOp);
        assert!(plan_transition(Deleted, Modified).is_err());
    }

    #[test]
    fn test_revert_preserves_order() {
        assert_eq!(plan_transition(Modified, Unchanged).unwrap(), Transition::Preserve);
        assert_eq!(plan_transition(Deleted, Unchanged).unwrap(), Transition::Preserve);
        assert_eq!(plan_transition(Unchanged, Unchanged).unwrap(), Transition::NoOp);
    }

    #[test]
    fn test_delete_stamps() {
        assert_eq!(plan_transition(Unchanged, Deleted).unwrap(), Transition::Stamp);
        assert_eq!(plan_transition(Modified, Deleted).unwrap(), Transition::Stamp);
    }
}
