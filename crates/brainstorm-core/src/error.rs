//! Domain error types.

use thiserror::Error;
use uuid::Uuid;

/// Top-level domain error type.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Input rejected before any write (missing topic, bad duration, blank name).
    #[error("validation error: {0}")]
    Validation(String),

    /// No event stream exists for the aggregate.
    #[error("room not found: {0}")]
    AggregateNotFound(Uuid),

    /// The room exists but has no participant with this name.
    #[error("participant {name:?} not found in room {room_id}")]
    ParticipantNotFound {
        /// The room that was searched.
        room_id: Uuid,
        /// The participant name that was not found.
        name: String,
    },

    /// The request collides with existing state (e.g. a duplicate join).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Optimistic concurrency conflict.
    #[error(
        "concurrency conflict on aggregate {aggregate_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        /// The aggregate that had the conflict.
        aggregate_id: Uuid,
        /// The expected version.
        expected: i64,
        /// The actual version found.
        actual: i64,
    },

    /// The command is well-formed but the room is not in a state that allows it.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The store could not be reached; the operation may be retried.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Stored data could not be decoded or the store failed permanently.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl DomainError {
    /// Whether retrying the same operation later can succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable(_) | Self::ConcurrencyConflict { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_unavailable_and_concurrency_conflict_are_transient() {
        assert!(DomainError::StoreUnavailable("timeout".into()).is_transient());
        assert!(
            DomainError::ConcurrencyConflict {
                aggregate_id: Uuid::new_v4(),
                expected: 1,
                actual: 2,
            }
            .is_transient()
        );
    }

    #[test]
    fn test_validation_and_state_errors_are_not_transient() {
        assert!(!DomainError::Validation("blank".into()).is_transient());
        assert!(!DomainError::InvalidState("completed".into()).is_transient());
        assert!(!DomainError::Infrastructure("corrupt".into()).is_transient());
    }
}
