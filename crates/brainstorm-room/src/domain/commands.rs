//! Commands for the Room & Turn context.

use brainstorm_core::command::Command;
use uuid::Uuid;

use super::events::ContributionSource;

/// Command to create a new room.
#[derive(Debug, Clone)]
pub struct CreateRoom {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The brainstorming topic.
    pub topic: String,
    /// Number of turns.
    pub turn_count: u32,
    /// Minutes per turn, one entry per turn.
    pub durations: Vec<u32>,
}

impl Command for CreateRoom {
    fn command_type(&self) -> &'static str {
        "room.create"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to join a waiting room.
#[derive(Debug, Clone)]
pub struct JoinRoom {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The room to join.
    pub room_id: Uuid,
    /// The participant's name.
    pub name: String,
}

impl Command for JoinRoom {
    fn command_type(&self) -> &'static str {
        "room.join"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to mark or unmark a participant ready.
#[derive(Debug, Clone)]
pub struct SetReady {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The room identifier.
    pub room_id: Uuid,
    /// The participant name.
    pub name: String,
    /// The desired ready flag.
    pub ready: bool,
}

impl Command for SetReady {
    fn command_type(&self) -> &'static str {
        "room.set_ready"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to activate or deactivate a participant.
#[derive(Debug, Clone)]
pub struct SetActive {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The room identifier.
    pub room_id: Uuid,
    /// The participant name.
    pub name: String,
    /// The desired active flag.
    pub active: bool,
}

impl Command for SetActive {
    fn command_type(&self) -> &'static str {
        "room.set_active"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to start the session or open the next turn.
///
/// `from_turn` is the turn the caller observed; the command only takes
/// effect while the room is still at that turn.
#[derive(Debug, Clone)]
pub struct StartOrAdvance {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The room identifier.
    pub room_id: Uuid,
    /// The turn the caller expects the room to be at (0 while waiting).
    pub from_turn: u32,
}

impl Command for StartOrAdvance {
    fn command_type(&self) -> &'static str {
        "room.start_or_advance"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to close a turn for one participant.
#[derive(Debug, Clone)]
pub struct SubmitContribution {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The room identifier.
    pub room_id: Uuid,
    /// The contributing participant.
    pub name: String,
    /// The turn being closed.
    pub turn: u32,
    /// The contribution text, possibly empty.
    pub text: String,
    /// Explicit submit or countdown expiry.
    pub source: ContributionSource,
}

impl Command for SubmitContribution {
    fn command_type(&self) -> &'static str {
        match self.source {
            ContributionSource::Explicit => "room.submit_contribution",
            ContributionSource::Timeout => "room.auto_submit_contribution",
        }
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}
