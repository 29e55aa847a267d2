//! Domain events for the Room & Turn context.

use brainstorm_core::error::DomainError;
use brainstorm_core::event::{DomainEvent, EventMetadata};
use brainstorm_core::repository::StoredEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a contribution came to be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributionSource {
    /// The participant pressed submit.
    Explicit,
    /// The participant's countdown reached zero.
    Timeout,
}

/// Emitted when an admin creates a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomCreated {
    /// The room identifier.
    pub room_id: Uuid,
    /// The brainstorming topic.
    pub topic: String,
    /// Number of turns, fixed for the room's lifetime.
    pub turn_count: u32,
    /// Minutes allotted to each turn, one entry per turn.
    pub durations: Vec<u32>,
}

/// Emitted when a participant joins a waiting room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantJoined {
    /// The room identifier.
    pub room_id: Uuid,
    /// The participant name (identity within the room).
    pub name: String,
    /// Zero-based position in join order.
    pub join_order: u32,
}

/// Emitted when a participant marks or unmarks themselves ready.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessChanged {
    /// The room identifier.
    pub room_id: Uuid,
    /// The participant name.
    pub name: String,
    /// The new ready flag.
    pub ready: bool,
}

/// Emitted when an admin activates or deactivates a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantActivityChanged {
    /// The room identifier.
    pub room_id: Uuid,
    /// The participant name.
    pub name: String,
    /// The new active flag.
    pub active: bool,
}

/// Emitted when a turn opens. Clears every participant's ready flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnStarted {
    /// The room identifier.
    pub room_id: Uuid,
    /// The turn that opened (1-based).
    pub turn: u32,
    /// When the turn's countdown reaches zero, if the turn is timed.
    pub deadline: Option<DateTime<Utc>>,
    /// Rotation roster in join order; only present when turn 1 opens.
    pub roster: Option<Vec<String>>,
}

/// Emitted when a participant closes a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionSubmitted {
    /// The room identifier.
    pub room_id: Uuid,
    /// The turn being closed.
    pub turn: u32,
    /// The contributing participant.
    pub name: String,
    /// The submitted text, possibly empty.
    pub text: String,
    /// Explicit submit or countdown expiry.
    pub source: ContributionSource,
}

/// Emitted when every active participant has closed the final turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomCompleted {
    /// The room identifier.
    pub room_id: Uuid,
    /// The final turn number.
    pub final_turn: u32,
}

/// Event type identifier for [`RoomCreated`].
pub const ROOM_CREATED_EVENT_TYPE: &str = "room.created";

/// Event type identifier for [`ParticipantJoined`].
pub const PARTICIPANT_JOINED_EVENT_TYPE: &str = "room.participant_joined";

/// Event type identifier for [`ReadinessChanged`].
pub const READINESS_CHANGED_EVENT_TYPE: &str = "room.readiness_changed";

/// Event type identifier for [`ParticipantActivityChanged`].
pub const PARTICIPANT_ACTIVITY_CHANGED_EVENT_TYPE: &str = "room.participant_activity_changed";

/// Event type identifier for [`TurnStarted`].
pub const TURN_STARTED_EVENT_TYPE: &str = "room.turn_started";

/// Event type identifier for [`ContributionSubmitted`].
pub const CONTRIBUTION_SUBMITTED_EVENT_TYPE: &str = "room.contribution_submitted";

/// Event type identifier for [`RoomCompleted`].
pub const ROOM_COMPLETED_EVENT_TYPE: &str = "room.completed";

/// Event payload variants for the Room & Turn context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomEventKind {
    /// A room has been created.
    RoomCreated(RoomCreated),
    /// A participant has joined.
    ParticipantJoined(ParticipantJoined),
    /// A participant's ready flag changed.
    ReadinessChanged(ReadinessChanged),
    /// A participant's active flag changed.
    ParticipantActivityChanged(ParticipantActivityChanged),
    /// A turn has opened.
    TurnStarted(TurnStarted),
    /// A contribution has been recorded.
    ContributionSubmitted(ContributionSubmitted),
    /// The room has completed.
    RoomCompleted(RoomCompleted),
}

impl RoomEventKind {
    /// The persisted type name of this payload.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RoomCreated(_) => ROOM_CREATED_EVENT_TYPE,
            Self::ParticipantJoined(_) => PARTICIPANT_JOINED_EVENT_TYPE,
            Self::ReadinessChanged(_) => READINESS_CHANGED_EVENT_TYPE,
            Self::ParticipantActivityChanged(_) => PARTICIPANT_ACTIVITY_CHANGED_EVENT_TYPE,
            Self::TurnStarted(_) => TURN_STARTED_EVENT_TYPE,
            Self::ContributionSubmitted(_) => CONTRIBUTION_SUBMITTED_EVENT_TYPE,
            Self::RoomCompleted(_) => ROOM_COMPLETED_EVENT_TYPE,
        }
    }
}

/// Domain event envelope for the Room & Turn context.
#[derive(Debug, Clone)]
pub struct RoomEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: RoomEventKind,
}

impl DomainEvent for RoomEvent {
    fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    fn to_payload(&self) -> serde_json::Value {
        // Serialization of derived Serialize types to Value is infallible.
        serde_json::to_value(&self.kind).expect("RoomEventKind serialization is infallible")
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}

impl TryFrom<&StoredEvent> for RoomEvent {
    type Error = DomainError;

    fn try_from(stored: &StoredEvent) -> Result<Self, Self::Error> {
        let kind: RoomEventKind = serde_json::from_value(stored.payload.clone()).map_err(|e| {
            DomainError::Infrastructure(format!(
                "event {} deserialization failed: {e}",
                stored.event_id
            ))
        })?;
        Ok(Self {
            metadata: stored.metadata(),
            kind,
        })
    }
}
