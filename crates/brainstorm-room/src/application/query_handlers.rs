//! Query handlers for the Room & Turn context.
//!
//! This module contains query handlers that reconstitute rooms from stored
//! events and return read-only view DTOs for admins and participants.

use brainstorm_core::clock::Clock;
use brainstorm_core::error::DomainError;
use brainstorm_core::repository::EventRepository;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::application::command_handlers::load_room;
use crate::application::export::ExportTable;
use crate::domain::aggregates::{Participant, Room, RoomStatus};
use crate::domain::rotation::mask_name;

/// Status label shown next to a participant on the admin screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    /// Deactivated by the admin.
    Inactive,
    /// Waiting room, not ready yet.
    Waiting,
    /// Ready for the next step.
    Ready,
    /// Still owes a contribution for the current turn.
    AwaitingContribution,
    /// Contributed, not yet ready for the next turn.
    Preparing,
    /// Contributed to the final turn.
    Done,
}

/// A participant row of the admin view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParticipantStatusView {
    /// Participant name.
    pub name: String,
    /// Ready flag.
    pub ready: bool,
    /// Active flag.
    pub active: bool,
    /// Whether the current turn is closed for this participant.
    pub has_contributed: bool,
    /// Derived status label.
    pub status: ParticipantStatus,
}

/// Read-only view of a room for the admin screen and live observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomView {
    /// The room identifier.
    pub room_id: Uuid,
    /// The brainstorming topic.
    pub topic: String,
    /// Lifecycle status.
    pub status: RoomStatus,
    /// 0 while waiting.
    pub current_turn: u32,
    /// Total number of turns.
    pub turn_count: u32,
    /// Minutes per turn.
    pub durations: Vec<u32>,
    /// Deadline of the open turn.
    pub deadline: Option<DateTime<Utc>>,
    /// Participants in join order.
    pub participants: Vec<ParticipantStatusView>,
    /// Quorum over the active participants.
    pub all_ready: bool,
    /// Quorum holds and a next turn exists.
    pub can_advance: bool,
    /// The room sits on its last turn.
    pub is_final_turn: bool,
    /// The export may be downloaded.
    pub ready_to_export: bool,
    /// Contributions recorded for the current turn.
    pub contribution_count: usize,
    /// Current version (event count).
    pub version: i64,
}

impl RoomView {
    /// Projects a room into its admin view.
    #[must_use]
    pub fn from_room(room: &Room) -> Self {
        let all_ready = room.all_ready();
        let is_final_turn = room.is_final_turn();
        Self {
            room_id: room.id,
            topic: room.topic().to_owned(),
            status: room.status(),
            current_turn: room.current_turn(),
            turn_count: room.turn_count(),
            durations: room.durations().to_vec(),
            deadline: room.deadline(),
            participants: room
                .participants()
                .iter()
                .map(|p| participant_row(room, p))
                .collect(),
            all_ready,
            can_advance: all_ready && room.status() != RoomStatus::Completed && !is_final_turn,
            is_final_turn,
            ready_to_export: room.status() == RoomStatus::Completed,
            contribution_count: room.contribution_count(room.current_turn()),
            version: room.version,
        }
    }

    /// Looks up a participant row by name.
    #[must_use]
    pub fn participant(&self, name: &str) -> Option<&ParticipantStatusView> {
        self.participants.iter().find(|p| p.name == name)
    }
}

fn participant_row(room: &Room, participant: &Participant) -> ParticipantStatusView {
    let has_contributed = room.has_contributed(room.current_turn(), &participant.name);
    let status = if !participant.active {
        ParticipantStatus::Inactive
    } else if room.status() == RoomStatus::Waiting {
        if participant.ready {
            ParticipantStatus::Ready
        } else {
            ParticipantStatus::Waiting
        }
    } else if !has_contributed {
        ParticipantStatus::AwaitingContribution
    } else if room.is_final_turn() {
        ParticipantStatus::Done
    } else if participant.ready {
        ParticipantStatus::Ready
    } else {
        ParticipantStatus::Preparing
    };
    ParticipantStatusView {
        name: participant.name.clone(),
        ready: participant.ready,
        active: participant.active,
        has_contributed,
        status,
    }
}

/// What a participant's screen shows right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ParticipantPhase {
    /// Waiting room.
    Waiting {
        /// Own ready flag.
        ready: bool,
    },
    /// Writing the contribution for `turn`.
    Contributing {
        /// The open turn.
        turn: u32,
        /// Countdown, absent for untimed turns.
        seconds_left: Option<u64>,
    },
    /// Turn closed, waiting for the admin to open the next one.
    AwaitingNextTurn {
        /// The closed turn.
        turn: u32,
        /// Own ready flag.
        ready: bool,
    },
    /// Final turn closed or room completed.
    Finished,
    /// Deactivated by the admin.
    Inactive,
}

/// One masked entry of a participant's relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    /// The turn.
    pub turn: u32,
    /// Masked name of the contributor shown.
    pub contributor: String,
    /// Their turn text, absent until submitted.
    pub contribution: Option<String>,
}

/// Read-only view of a room from one participant's seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParticipantView {
    /// The room identifier.
    pub room_id: Uuid,
    /// The brainstorming topic.
    pub topic: String,
    /// Own name, masked.
    pub masked_name: String,
    /// Room status.
    pub status: RoomStatus,
    /// 0 while waiting.
    pub current_turn: u32,
    /// Total number of turns.
    pub turn_count: u32,
    /// What to show.
    #[serde(flatten)]
    pub phase: ParticipantPhase,
    /// Whether the current turn is closed for this participant.
    pub has_contributed: bool,
    /// The relay of prior contributions with masked contributors.
    pub history: Vec<HistoryEntry>,
}

impl ParticipantView {
    /// Projects a room into `name`'s view at the clock's current time.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ParticipantNotFound` if `name` never joined.
    pub fn from_room(room: &Room, name: &str, clock: &dyn Clock) -> Result<Self, DomainError> {
        let participant =
            room.participant(name)
                .ok_or_else(|| DomainError::ParticipantNotFound {
                    room_id: room.id,
                    name: name.to_owned(),
                })?;
        let turn = room.current_turn();
        let has_contributed = room.has_contributed(turn, name);

        let phase = if !participant.active {
            ParticipantPhase::Inactive
        } else {
            match room.status() {
                RoomStatus::Waiting => ParticipantPhase::Waiting {
                    ready: participant.ready,
                },
                RoomStatus::Completed => ParticipantPhase::Finished,
                RoomStatus::InProgress if !has_contributed => ParticipantPhase::Contributing {
                    turn,
                    seconds_left: room
                        .deadline()
                        .map(|deadline| clock.remaining_until(deadline).as_secs()),
                },
                RoomStatus::InProgress if room.is_final_turn() => ParticipantPhase::Finished,
                RoomStatus::InProgress => ParticipantPhase::AwaitingNextTurn {
                    turn,
                    ready: participant.ready,
                },
            }
        };

        let history = room
            .relay_for(name)
            .into_iter()
            .map(|entry| HistoryEntry {
                turn: entry.turn,
                contributor: mask_name(&entry.contributor),
                contribution: entry.contribution,
            })
            .collect();

        Ok(Self {
            room_id: room.id,
            topic: room.topic().to_owned(),
            masked_name: mask_name(name),
            status: room.status(),
            current_turn: turn,
            turn_count: room.turn_count(),
            phase,
            has_contributed,
            history,
        })
    }
}

/// Retrieves the admin view of a room.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if no events exist for the ID.
/// Returns `DomainError::Infrastructure` if event deserialization fails.
pub async fn get_room_view(
    room_id: Uuid,
    repo: &dyn EventRepository,
) -> Result<RoomView, DomainError> {
    let room = load_room(room_id, repo).await?;
    Ok(RoomView::from_room(&room))
}

/// Retrieves one participant's view of a room.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` for an unknown room and
/// `DomainError::ParticipantNotFound` for an unknown name.
pub async fn get_participant_view(
    room_id: Uuid,
    name: &str,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<ParticipantView, DomainError> {
    let room = load_room(room_id, repo).await?;
    ParticipantView::from_room(&room, name, clock)
}

/// Resolves the contribution table of a completed room.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` for an unknown room and
/// `DomainError::InvalidState` while the room is not completed.
pub async fn export_contributions(
    room_id: Uuid,
    repo: &dyn EventRepository,
) -> Result<ExportTable, DomainError> {
    let room = load_room(room_id, repo).await?;
    if room.status() != RoomStatus::Completed {
        return Err(DomainError::InvalidState(format!(
            "room {room_id} is not completed yet"
        )));
    }
    Ok(ExportTable::from_room(&room))
}
