//! Command handlers for the Room & Turn context.
//!
//! Every handler follows the same shape: load the room's events, rebuild the
//! aggregate, run the command against it and append whatever it produced at
//! the version it was loaded at. A concurrent writer makes the append fail
//! with `ConcurrencyConflict`; the handler then reloads and decides again,
//! so idempotent commands (advance, submit) settle on the winner's result.

use brainstorm_core::aggregate::AggregateRoot;
use brainstorm_core::clock::Clock;
use brainstorm_core::command::Command;
use brainstorm_core::error::DomainError;
use brainstorm_core::repository::{EventRepository, StoredEvent};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::aggregates::{AdvanceOutcome, Room, SubmitOutcome};
use crate::domain::commands::{
    CreateRoom, JoinRoom, SetActive, SetReady, StartOrAdvance, SubmitContribution,
};
use crate::domain::events::RoomEvent;

/// Attempts per command before a version conflict is surfaced to the caller.
pub const MAX_CONFLICT_ATTEMPTS: usize = 3;

/// Result of a successfully handled command.
#[derive(Debug)]
pub struct RoomCommandResult<T = ()> {
    /// The room affected or created by the command.
    pub aggregate_id: Uuid,
    /// What the command decided.
    pub outcome: T,
    /// The stored events produced and persisted; empty for a no-op.
    pub stored_events: Vec<StoredEvent>,
}

/// Reconstitutes a `Room` from stored events.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if event deserialization fails.
pub(crate) fn reconstitute(
    room_id: Uuid,
    existing_events: &[StoredEvent],
) -> Result<Room, DomainError> {
    let mut room = Room::new(room_id);
    for stored in existing_events {
        let event = RoomEvent::try_from(stored)?;
        room.apply(&event);
    }
    Ok(room)
}

/// Loads a room that must exist.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` for an empty stream and whatever
/// the repository or decoding reports otherwise.
pub(crate) async fn load_room(
    room_id: Uuid,
    repo: &dyn EventRepository,
) -> Result<Room, DomainError> {
    let existing_events = repo.load_events(room_id).await?;
    if existing_events.is_empty() {
        return Err(DomainError::AggregateNotFound(room_id));
    }
    reconstitute(room_id, &existing_events)
}

async fn execute<T, F>(
    room_id: Uuid,
    command_type: &'static str,
    repo: &dyn EventRepository,
    mut decide: F,
) -> Result<RoomCommandResult<T>, DomainError>
where
    F: FnMut(&mut Room) -> Result<T, DomainError> + Send,
    T: Send,
{
    let mut attempt = 1;
    loop {
        let mut room = load_room(room_id, repo).await?;
        let outcome = decide(&mut room)?;

        let stored_events: Vec<StoredEvent> = room
            .uncommitted_events()
            .iter()
            .map(StoredEvent::from_event)
            .collect();
        if stored_events.is_empty() {
            debug!(%room_id, command_type, "command produced no events");
            return Ok(RoomCommandResult {
                aggregate_id: room_id,
                outcome,
                stored_events,
            });
        }

        match repo
            .append_events(room_id, room.version(), &stored_events)
            .await
        {
            Ok(()) => {
                return Ok(RoomCommandResult {
                    aggregate_id: room_id,
                    outcome,
                    stored_events,
                });
            }
            Err(DomainError::ConcurrencyConflict { .. }) if attempt < MAX_CONFLICT_ATTEMPTS => {
                warn!(%room_id, command_type, attempt, "version conflict, reloading room");
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Handles the `CreateRoom` command: creates a new room and persists its
/// `RoomCreated` event.
///
/// # Errors
///
/// Returns `DomainError::Validation` for an invalid configuration and
/// `DomainError` if event appending fails.
pub async fn handle_create_room(
    command: &CreateRoom,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<RoomCommandResult, DomainError> {
    let room_id = Uuid::new_v4();
    let mut room = Room::new(room_id);

    room.create(
        &command.topic,
        command.turn_count,
        command.durations.clone(),
        command.correlation_id,
        clock,
    )?;

    let stored_events: Vec<StoredEvent> = room
        .uncommitted_events()
        .iter()
        .map(StoredEvent::from_event)
        .collect();

    repo.append_events(room_id, room.version(), &stored_events)
        .await?;

    Ok(RoomCommandResult {
        aggregate_id: room_id,
        outcome: (),
        stored_events,
    })
}

/// Handles the `JoinRoom` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound`, `Validation`, `Conflict` or
/// `InvalidState` from the room, or a repository error.
pub async fn handle_join_room(
    command: &JoinRoom,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<RoomCommandResult, DomainError> {
    execute(command.room_id, command.command_type(), repo, |room| {
        room.join(&command.name, command.correlation_id, clock)
    })
    .await
}

/// Handles the `SetReady` command. The outcome is `false` when the flag
/// already had the requested value.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound`, `ParticipantNotFound` or
/// `InvalidState` from the room, or a repository error.
pub async fn handle_set_ready(
    command: &SetReady,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<RoomCommandResult<bool>, DomainError> {
    execute(command.room_id, command.command_type(), repo, |room| {
        room.set_ready(&command.name, command.ready, command.correlation_id, clock)
    })
    .await
}

/// Handles the `SetActive` command. The outcome is `false` when the flag
/// already had the requested value.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` or `ParticipantNotFound` from the
/// room, or a repository error.
pub async fn handle_set_active(
    command: &SetActive,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<RoomCommandResult<bool>, DomainError> {
    execute(command.room_id, command.command_type(), repo, |room| {
        room.set_active(&command.name, command.active, command.correlation_id, clock)
    })
    .await
}

/// Handles the `StartOrAdvance` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` or `InvalidState` from the room,
/// or a repository error.
pub async fn handle_start_or_advance(
    command: &StartOrAdvance,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<RoomCommandResult<AdvanceOutcome>, DomainError> {
    execute(command.room_id, command.command_type(), repo, |room| {
        room.start_or_advance(command.from_turn, command.correlation_id, clock)
    })
    .await
}

/// Handles the `SubmitContribution` command, explicit or timed out.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound`, `ParticipantNotFound` or
/// `InvalidState` from the room, or a repository error.
pub async fn handle_submit_contribution(
    command: &SubmitContribution,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<RoomCommandResult<SubmitOutcome>, DomainError> {
    execute(command.room_id, command.command_type(), repo, |room| {
        room.submit_contribution(
            &command.name,
            command.turn,
            command.text.clone(),
            command.source,
            command.correlation_id,
            clock,
        )
    })
    .await
}
