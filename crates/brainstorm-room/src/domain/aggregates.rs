//! Aggregate roots for the Room & Turn context.

use std::collections::BTreeMap;

use brainstorm_core::aggregate::AggregateRoot;
use brainstorm_core::clock::Clock;
use brainstorm_core::error::DomainError;
use brainstorm_core::event::EventMetadata;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::{
    ContributionSource, ContributionSubmitted, ParticipantActivityChanged, ParticipantJoined,
    ReadinessChanged, RoomCompleted, RoomCreated, RoomEvent, RoomEventKind, TurnStarted,
};
use super::rotation::relay_contributors;

/// Room lifecycle. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    /// Participants are joining and getting ready.
    Waiting,
    /// A turn is open.
    InProgress,
    /// Every active participant closed the final turn.
    Completed,
}

/// A participant as folded from the room's events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    /// Name, unique within the room.
    pub name: String,
    /// Zero-based join position.
    pub join_order: u32,
    /// Ready flag; cleared whenever a turn opens.
    pub ready: bool,
    /// Inactive participants do not count toward quorum or completion.
    pub active: bool,
}

/// A closed (turn, participant) slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contribution {
    /// The submitted text.
    pub text: String,
    /// When the submission was recorded.
    pub submitted_at: DateTime<Utc>,
    /// Explicit submit or countdown expiry.
    pub source: ContributionSource,
}

/// One step of a participant's relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayEntry {
    /// The turn the contribution belongs to.
    pub turn: u32,
    /// The roster member who wrote it.
    pub contributor: String,
    /// The text, if that member has closed the turn.
    pub contribution: Option<String>,
}

/// Outcome of a start-or-advance request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// The room moved to `turn`.
    Advanced {
        /// The newly opened turn.
        turn: u32,
    },
    /// The room had already left the requested source turn; nothing changed.
    AlreadyAdvanced {
        /// The room's turn when the request was evaluated.
        current_turn: u32,
    },
}

/// Outcome of a contribution submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The contribution was recorded.
    Accepted {
        /// Whether this submission also completed the room.
        completed_room: bool,
    },
    /// The (turn, participant) slot was already closed; nothing changed.
    AlreadyClosed,
}

/// The aggregate root for a brainstorming room.
#[derive(Debug)]
pub struct Room {
    /// Aggregate identifier.
    pub id: Uuid,
    /// Current version (event count).
    pub(crate) version: i64,
    created: bool,
    topic: String,
    turn_count: u32,
    durations: Vec<u32>,
    status: RoomStatus,
    current_turn: u32,
    deadline: Option<DateTime<Utc>>,
    /// Participants in join order.
    participants: Vec<Participant>,
    /// Rotation roster captured when turn 1 opened.
    roster: Vec<String>,
    contributions: BTreeMap<(u32, String), Contribution>,
    /// Uncommitted events pending persistence.
    uncommitted_events: Vec<RoomEvent>,
}

impl Room {
    /// Creates an empty, not yet created room.
    #[must_use]
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            version: 0,
            created: false,
            topic: String::new(),
            turn_count: 0,
            durations: Vec::new(),
            status: RoomStatus::Waiting,
            current_turn: 0,
            deadline: None,
            participants: Vec::new(),
            roster: Vec::new(),
            contributions: BTreeMap::new(),
            uncommitted_events: Vec::new(),
        }
    }

    // ---- read accessors ----

    /// The brainstorming topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Total number of turns.
    #[must_use]
    pub fn turn_count(&self) -> u32 {
        self.turn_count
    }

    /// Minutes per turn.
    #[must_use]
    pub fn durations(&self) -> &[u32] {
        &self.durations
    }

    /// Lifecycle status.
    #[must_use]
    pub fn status(&self) -> RoomStatus {
        self.status
    }

    /// 0 while waiting, otherwise the open (or final) turn.
    #[must_use]
    pub fn current_turn(&self) -> u32 {
        self.current_turn
    }

    /// Deadline of the open turn, if it is timed.
    #[must_use]
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    /// Participants in join order.
    #[must_use]
    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    /// Looks up a participant by name.
    #[must_use]
    pub fn participant(&self, name: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.name == name)
    }

    /// Rotation roster (empty until turn 1 opens).
    #[must_use]
    pub fn roster(&self) -> &[String] {
        &self.roster
    }

    /// The contribution `name` made to `turn`, if any.
    #[must_use]
    pub fn contribution(&self, turn: u32, name: &str) -> Option<&Contribution> {
        self.contributions.get(&(turn, name.to_owned()))
    }

    /// Whether `name` has closed `turn`.
    #[must_use]
    pub fn has_contributed(&self, turn: u32, name: &str) -> bool {
        self.contribution(turn, name).is_some()
    }

    /// Number of contributions recorded for `turn`.
    #[must_use]
    pub fn contribution_count(&self, turn: u32) -> usize {
        self.contributions
            .range((turn, String::new())..)
            .take_while(|((t, _), _)| *t == turn)
            .count()
    }

    /// Active participants in join order.
    pub fn active_participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter().filter(|p| p.active)
    }

    /// Quorum: at least one active participant and every active one ready.
    #[must_use]
    pub fn all_ready(&self) -> bool {
        let mut active = self.active_participants().peekable();
        active.peek().is_some() && active.all(|p| p.ready)
    }

    /// At least one active participant and every active one closed `turn`.
    #[must_use]
    pub fn turn_closed_by_all(&self, turn: u32) -> bool {
        let mut active = self.active_participants().peekable();
        active.peek().is_some() && active.all(|p| self.has_contributed(turn, &p.name))
    }

    /// Whether the room sits on its last turn (open or completed).
    #[must_use]
    pub fn is_final_turn(&self) -> bool {
        self.status != RoomStatus::Waiting && self.current_turn == self.turn_count
    }

    /// The contributions `name` reads for turns `1..=current_turn`.
    #[must_use]
    pub fn relay_for(&self, name: &str) -> Vec<RelayEntry> {
        relay_contributors(&self.roster, name, self.current_turn)
            .into_iter()
            .map(|(turn, contributor)| RelayEntry {
                turn,
                contributor: contributor.to_owned(),
                contribution: self.contribution(turn, contributor).map(|c| c.text.clone()),
            })
            .collect()
    }

    // ---- commands ----

    /// Creates the room, producing a `RoomCreated` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` for a blank topic, a zero turn
    /// count, a duration list whose length differs from the turn count, or
    /// a zero-minute duration. Returns `DomainError::Conflict` if the room
    /// already exists.
    pub fn create(
        &mut self,
        topic: &str,
        turn_count: u32,
        durations: Vec<u32>,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        if self.created {
            return Err(DomainError::Conflict(format!(
                "room {} already exists",
                self.id
            )));
        }
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(DomainError::Validation("topic must not be blank".to_owned()));
        }
        if turn_count == 0 {
            return Err(DomainError::Validation(
                "turn count must be at least 1".to_owned(),
            ));
        }
        if durations.len() != turn_count as usize {
            return Err(DomainError::Validation(format!(
                "expected {turn_count} turn durations, got {}",
                durations.len()
            )));
        }
        if let Some(index) = durations.iter().position(|&minutes| minutes == 0) {
            return Err(DomainError::Validation(format!(
                "duration of turn {} must be a positive number of minutes",
                index + 1
            )));
        }

        self.raise(
            RoomEventKind::RoomCreated(RoomCreated {
                room_id: self.id,
                topic: topic.to_owned(),
                turn_count,
                durations,
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Adds a participant, producing a `ParticipantJoined` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` for a blank name,
    /// `DomainError::InvalidState` once the session has started and
    /// `DomainError::Conflict` if the name is taken.
    pub fn join(
        &mut self,
        name: &str,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        let name = normalize_name(name)?;
        if self.status != RoomStatus::Waiting {
            return Err(DomainError::InvalidState(format!(
                "room {} has already started; new participants cannot join",
                self.id
            )));
        }
        if self.participant(&name).is_some() {
            return Err(DomainError::Conflict(format!(
                "participant {name:?} already joined room {}",
                self.id
            )));
        }

        let join_order = u32::try_from(self.participants.len()).map_err(|_| {
            DomainError::Validation("room cannot hold more participants".to_owned())
        })?;
        self.raise(
            RoomEventKind::ParticipantJoined(ParticipantJoined {
                room_id: self.id,
                name,
                join_order,
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Marks or unmarks a participant ready. Returns `false` when the flag
    /// already had the requested value and nothing was produced.
    ///
    /// While a turn is open, a participant may only get ready for the next
    /// turn after closing the current one; the final turn has no next turn.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ParticipantNotFound` for an unknown name and
    /// `DomainError::InvalidState` when readiness is not allowed right now.
    pub fn set_ready(
        &mut self,
        name: &str,
        ready: bool,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<bool, DomainError> {
        let name = name.trim();
        let participant = self.require_participant(name)?;
        if participant.ready == ready {
            return Ok(false);
        }
        if ready {
            match self.status {
                RoomStatus::Waiting => {}
                RoomStatus::InProgress if self.is_final_turn() => {
                    return Err(DomainError::InvalidState(format!(
                        "turn {} is the final turn; there is no next turn to get ready for",
                        self.current_turn
                    )));
                }
                RoomStatus::InProgress => {
                    if !self.has_contributed(self.current_turn, name) {
                        return Err(DomainError::InvalidState(format!(
                            "participant {name:?} must close turn {} before getting ready",
                            self.current_turn
                        )));
                    }
                }
                RoomStatus::Completed => {
                    return Err(DomainError::InvalidState(format!(
                        "room {} is completed",
                        self.id
                    )));
                }
            }
        }

        self.raise(
            RoomEventKind::ReadinessChanged(ReadinessChanged {
                room_id: self.id,
                name: name.to_owned(),
                ready,
            }),
            correlation_id,
            clock,
        );
        Ok(true)
    }

    /// Activates or deactivates a participant. Returns `false` when the flag
    /// already had the requested value.
    ///
    /// On the final turn, deactivating the last participant who still owed a
    /// contribution completes the room.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ParticipantNotFound` for an unknown name.
    pub fn set_active(
        &mut self,
        name: &str,
        active: bool,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<bool, DomainError> {
        let name = name.trim();
        let participant = self.require_participant(name)?;
        if participant.active == active {
            return Ok(false);
        }

        self.raise(
            RoomEventKind::ParticipantActivityChanged(ParticipantActivityChanged {
                room_id: self.id,
                name: name.to_owned(),
                active,
            }),
            correlation_id,
            clock,
        );
        self.complete_if_final_turn_closed(correlation_id, clock);
        Ok(true)
    }

    /// Opens the turn after `from_turn`, producing a `TurnStarted` event that
    /// also clears every ready flag.
    ///
    /// A request whose `from_turn` is behind the room is a no-op, so retried
    /// or duplicated requests advance at most once.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidState` if `from_turn` is ahead of the
    /// room, the room is completed or on its final turn, or the quorum does
    /// not hold.
    pub fn start_or_advance(
        &mut self,
        from_turn: u32,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<AdvanceOutcome, DomainError> {
        if from_turn < self.current_turn {
            return Ok(AdvanceOutcome::AlreadyAdvanced {
                current_turn: self.current_turn,
            });
        }
        if from_turn > self.current_turn {
            return Err(DomainError::InvalidState(format!(
                "room {} is at turn {}, not turn {from_turn}",
                self.id, self.current_turn
            )));
        }
        if self.status == RoomStatus::Completed {
            return Err(DomainError::InvalidState(format!(
                "room {} is completed",
                self.id
            )));
        }
        if self.is_final_turn() {
            return Err(DomainError::InvalidState(format!(
                "turn {} is the final turn",
                self.current_turn
            )));
        }
        if !self.all_ready() {
            return Err(DomainError::InvalidState(
                "not every active participant is ready".to_owned(),
            ));
        }

        let turn = self.current_turn + 1;
        let now = clock.now();
        let deadline = self
            .durations
            .get(turn as usize - 1)
            .filter(|&&minutes| minutes > 0)
            .map(|&minutes| now + Duration::minutes(i64::from(minutes)));
        let roster = (turn == 1).then(|| {
            self.active_participants()
                .map(|p| p.name.clone())
                .collect::<Vec<_>>()
        });

        self.raise(
            RoomEventKind::TurnStarted(TurnStarted {
                room_id: self.id,
                turn,
                deadline,
                roster,
            }),
            correlation_id,
            clock,
        );
        Ok(AdvanceOutcome::Advanced { turn })
    }

    /// Closes `turn` for `name`, producing a `ContributionSubmitted` event and,
    /// when it was the last one owed on the final turn, a `RoomCompleted`
    /// event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ParticipantNotFound` for an unknown name and
    /// `DomainError::InvalidState` when no turn is open, `turn` is not the
    /// open turn, or the participant is inactive. An already closed slot is
    /// never an error.
    pub fn submit_contribution(
        &mut self,
        name: &str,
        turn: u32,
        text: String,
        source: ContributionSource,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<SubmitOutcome, DomainError> {
        let name = name.trim();
        let participant = self.require_participant(name)?;
        if self.has_contributed(turn, name) {
            return Ok(SubmitOutcome::AlreadyClosed);
        }
        if self.status != RoomStatus::InProgress {
            return Err(DomainError::InvalidState(format!(
                "room {} has no open turn",
                self.id
            )));
        }
        if turn != self.current_turn {
            return Err(DomainError::InvalidState(format!(
                "turn {turn} is not open; the current turn is {}",
                self.current_turn
            )));
        }
        if !participant.active {
            return Err(DomainError::InvalidState(format!(
                "participant {name:?} is inactive"
            )));
        }

        self.raise(
            RoomEventKind::ContributionSubmitted(ContributionSubmitted {
                room_id: self.id,
                turn,
                name: name.to_owned(),
                text,
                source,
            }),
            correlation_id,
            clock,
        );
        let completed_room = self.complete_if_final_turn_closed(correlation_id, clock);
        Ok(SubmitOutcome::Accepted { completed_room })
    }

    // ---- internals ----

    fn require_participant(&self, name: &str) -> Result<&Participant, DomainError> {
        let name = name.trim();
        self.participant(name)
            .ok_or_else(|| DomainError::ParticipantNotFound {
                room_id: self.id,
                name: name.to_owned(),
            })
    }

    fn complete_if_final_turn_closed(&mut self, correlation_id: Uuid, clock: &dyn Clock) -> bool {
        if self.status != RoomStatus::InProgress
            || !self.is_final_turn()
            || !self.turn_closed_by_all(self.current_turn)
        {
            return false;
        }
        self.raise(
            RoomEventKind::RoomCompleted(RoomCompleted {
                room_id: self.id,
                final_turn: self.current_turn,
            }),
            correlation_id,
            clock,
        );
        true
    }

    /// Returns the next sequence number for a new event.
    #[allow(clippy::cast_possible_wrap)]
    fn next_sequence_number(&self) -> i64 {
        self.version + self.uncommitted_events.len() as i64 + 1
    }

    /// Records a new event and folds it immediately, so later checks within
    /// the same command see its effect. The version only moves on `apply`.
    fn raise(&mut self, kind: RoomEventKind, correlation_id: Uuid, clock: &dyn Clock) {
        let event = RoomEvent {
            metadata: EventMetadata::caused_by_command(
                kind.event_type(),
                self.id,
                self.next_sequence_number(),
                correlation_id,
                clock.now(),
            ),
            kind,
        };
        self.mutate(&event);
        self.uncommitted_events.push(event);
    }

    fn mutate(&mut self, event: &RoomEvent) {
        match &event.kind {
            RoomEventKind::RoomCreated(payload) => {
                self.created = true;
                self.topic.clone_from(&payload.topic);
                self.turn_count = payload.turn_count;
                self.durations.clone_from(&payload.durations);
                self.status = RoomStatus::Waiting;
                self.current_turn = 0;
            }
            RoomEventKind::ParticipantJoined(payload) => {
                self.participants.push(Participant {
                    name: payload.name.clone(),
                    join_order: payload.join_order,
                    ready: false,
                    active: true,
                });
            }
            RoomEventKind::ReadinessChanged(payload) => {
                if let Some(p) = self.participants.iter_mut().find(|p| p.name == payload.name) {
                    p.ready = payload.ready;
                }
            }
            RoomEventKind::ParticipantActivityChanged(payload) => {
                if let Some(p) = self.participants.iter_mut().find(|p| p.name == payload.name) {
                    p.active = payload.active;
                }
            }
            RoomEventKind::TurnStarted(payload) => {
                self.status = RoomStatus::InProgress;
                self.current_turn = payload.turn;
                self.deadline = payload.deadline;
                for p in &mut self.participants {
                    p.ready = false;
                }
                if let Some(roster) = &payload.roster {
                    self.roster.clone_from(roster);
                }
            }
            RoomEventKind::ContributionSubmitted(payload) => {
                self.contributions.insert(
                    (payload.turn, payload.name.clone()),
                    Contribution {
                        text: payload.text.clone(),
                        submitted_at: event.metadata.occurred_at,
                        source: payload.source,
                    },
                );
            }
            RoomEventKind::RoomCompleted(_) => {
                self.status = RoomStatus::Completed;
                self.deadline = None;
            }
        }
    }
}

fn normalize_name(name: &str) -> Result<String, DomainError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::Validation(
            "participant name must not be blank".to_owned(),
        ));
    }
    Ok(name.to_owned())
}

impl AggregateRoot for Room {
    type Event = RoomEvent;

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) {
        self.mutate(event);
        self.version += 1;
    }

    fn uncommitted_events(&self) -> &[Self::Event] {
        &self.uncommitted_events
    }

    fn clear_uncommitted_events(&mut self) {
        self.uncommitted_events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brainstorm_core::event::DomainEvent;
    use brainstorm_test_support::{FixedClock, fixed_now};

    use crate::domain::events::{
        CONTRIBUTION_SUBMITTED_EVENT_TYPE, ROOM_COMPLETED_EVENT_TYPE, ROOM_CREATED_EVENT_TYPE,
        TURN_STARTED_EVENT_TYPE,
    };

    fn clock() -> FixedClock {
        FixedClock(fixed_now())
    }

    /// Folds pending events as if they had been persisted and reloaded.
    fn commit(room: &mut Room) {
        let pending = room.uncommitted_events().len() as i64;
        room.clear_uncommitted_events();
        room.version += pending;
    }

    fn room_with(names: &[&str], turn_count: u32) -> Room {
        let clock = clock();
        let mut room = Room::new(Uuid::new_v4());
        room.create("Faster onboarding", turn_count, vec![1; turn_count as usize], Uuid::new_v4(), &clock)
            .unwrap();
        for name in names {
            room.join(name, Uuid::new_v4(), &clock).unwrap();
        }
        commit(&mut room);
        room
    }

    fn ready_all(room: &mut Room) {
        let clock = clock();
        let names: Vec<String> = room.active_participants().map(|p| p.name.clone()).collect();
        for name in names {
            room.set_ready(&name, true, Uuid::new_v4(), &clock).unwrap();
        }
        commit(room);
    }

    fn submit(room: &mut Room, name: &str, text: &str) -> SubmitOutcome {
        let turn = room.current_turn();
        let outcome = room
            .submit_contribution(
                name,
                turn,
                text.to_owned(),
                ContributionSource::Explicit,
                Uuid::new_v4(),
                &clock(),
            )
            .unwrap();
        commit(room);
        outcome
    }

    fn advance(room: &mut Room) -> AdvanceOutcome {
        let from = room.current_turn();
        let outcome = room.start_or_advance(from, Uuid::new_v4(), &clock()).unwrap();
        commit(room);
        outcome
    }

    #[test]
    fn test_create_produces_room_created_event() {
        // Arrange
        let room_id = Uuid::new_v4();
        let correlation_id = Uuid::new_v4();
        let clock = clock();
        let mut room = Room::new(room_id);

        // Act
        room.create("  Office snacks  ", 2, vec![3, 5], correlation_id, &clock)
            .unwrap();

        // Assert
        let events = room.uncommitted_events();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.event_type(), ROOM_CREATED_EVENT_TYPE);
        let meta = event.metadata();
        assert_eq!(meta.aggregate_id, room_id);
        assert_eq!(meta.sequence_number, 1);
        assert_eq!(meta.correlation_id, correlation_id);
        assert_eq!(meta.causation_id, correlation_id);
        assert_eq!(meta.occurred_at, clock.0);
        match &event.kind {
            RoomEventKind::RoomCreated(payload) => {
                assert_eq!(payload.topic, "Office snacks");
                assert_eq!(payload.turn_count, 2);
                assert_eq!(payload.durations, vec![3, 5]);
            }
            other => panic!("expected RoomCreated, got {other:?}"),
        }
        assert_eq!(room.status(), RoomStatus::Waiting);
        assert_eq!(room.current_turn(), 0);
    }

    #[test]
    fn test_create_rejects_zero_turns_and_zero_durations() {
        let clock = clock();

        let zero_turns = Room::new(Uuid::new_v4()).create("t", 0, vec![], Uuid::new_v4(), &clock);
        let zero_minutes =
            Room::new(Uuid::new_v4()).create("t", 2, vec![1, 0], Uuid::new_v4(), &clock);
        let short_list = Room::new(Uuid::new_v4()).create("t", 2, vec![1], Uuid::new_v4(), &clock);
        let blank_topic = Room::new(Uuid::new_v4()).create("   ", 1, vec![1], Uuid::new_v4(), &clock);

        for result in [zero_turns, zero_minutes, short_list, blank_topic] {
            assert!(matches!(result, Err(DomainError::Validation(_))), "{result:?}");
        }
    }

    #[test]
    fn test_join_rejects_duplicate_and_blank_names() {
        let mut room = room_with(&["Ada"], 1);

        let duplicate = room.join(" Ada ", Uuid::new_v4(), &clock());
        let blank = room.join("  ", Uuid::new_v4(), &clock());

        assert!(matches!(duplicate, Err(DomainError::Conflict(_))));
        assert!(matches!(blank, Err(DomainError::Validation(_))));
        assert!(room.uncommitted_events().is_empty());
    }

    #[test]
    fn test_join_is_rejected_once_the_session_started() {
        let mut room = room_with(&["Ada"], 2);
        ready_all(&mut room);
        advance(&mut room);

        let result = room.join("Grace", Uuid::new_v4(), &clock());

        assert!(matches!(result, Err(DomainError::InvalidState(_))));
    }

    #[test]
    fn test_all_ready_requires_a_non_empty_active_set() {
        let mut room = room_with(&[], 1);
        assert!(!room.all_ready());

        room.join("Ada", Uuid::new_v4(), &clock()).unwrap();
        commit(&mut room);
        assert!(!room.all_ready());

        ready_all(&mut room);
        assert!(room.all_ready());
    }

    #[test]
    fn test_inactive_participant_readiness_never_affects_quorum() {
        // Arrange
        let mut room = room_with(&["A", "B"], 1);
        room.set_active("B", false, Uuid::new_v4(), &clock()).unwrap();
        room.set_ready("A", true, Uuid::new_v4(), &clock()).unwrap();
        commit(&mut room);
        assert!(room.all_ready());

        // Act
        room.set_ready("B", true, Uuid::new_v4(), &clock()).unwrap();
        let after_ready = room.all_ready();
        room.set_ready("B", false, Uuid::new_v4(), &clock()).unwrap();
        let after_unready = room.all_ready();

        // Assert
        assert!(after_ready);
        assert!(after_unready);
    }

    #[test]
    fn test_deactivating_the_only_unready_participant_flips_quorum() {
        let mut room = room_with(&["A", "B", "C"], 1);
        room.set_ready("A", true, Uuid::new_v4(), &clock()).unwrap();
        room.set_ready("B", true, Uuid::new_v4(), &clock()).unwrap();
        commit(&mut room);
        assert!(!room.all_ready());

        room.set_active("C", false, Uuid::new_v4(), &clock()).unwrap();

        assert!(room.all_ready());
    }

    #[test]
    fn test_set_ready_same_value_is_a_noop() {
        let mut room = room_with(&["Ada"], 1);

        let changed = room.set_ready("Ada", false, Uuid::new_v4(), &clock()).unwrap();

        assert!(!changed);
        assert!(room.uncommitted_events().is_empty());
    }

    #[test]
    fn test_set_ready_unknown_participant_is_not_found() {
        let mut room = room_with(&["Ada"], 1);

        let result = room.set_ready("Bob", true, Uuid::new_v4(), &clock());

        match result.unwrap_err() {
            DomainError::ParticipantNotFound { name, .. } => assert_eq!(name, "Bob"),
            other => panic!("expected ParticipantNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_start_requires_quorum() {
        let mut room = room_with(&["A", "B"], 2);
        room.set_ready("A", true, Uuid::new_v4(), &clock()).unwrap();
        commit(&mut room);

        let result = room.start_or_advance(0, Uuid::new_v4(), &clock());

        assert!(matches!(result, Err(DomainError::InvalidState(_))));
        assert_eq!(room.current_turn(), 0);
    }

    #[test]
    fn test_start_opens_turn_one_clears_readiness_and_captures_roster() {
        // Arrange
        let mut room = room_with(&["A", "B", "C"], 2);
        room.set_active("B", false, Uuid::new_v4(), &clock()).unwrap();
        commit(&mut room);
        ready_all(&mut room);
        room.set_ready("B", true, Uuid::new_v4(), &clock()).unwrap();
        commit(&mut room);

        // Act
        let outcome = room.start_or_advance(0, Uuid::new_v4(), &clock()).unwrap();

        // Assert
        assert_eq!(outcome, AdvanceOutcome::Advanced { turn: 1 });
        let events = room.uncommitted_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), TURN_STARTED_EVENT_TYPE);
        assert_eq!(room.status(), RoomStatus::InProgress);
        assert_eq!(room.current_turn(), 1);
        assert_eq!(room.deadline(), Some(clock().0 + Duration::minutes(1)));
        assert_eq!(room.roster(), ["A".to_owned(), "C".to_owned()]);
        assert!(room.participants().iter().all(|p| !p.ready));
    }

    #[test]
    fn test_advance_from_a_past_turn_is_a_noop() {
        let mut room = room_with(&["A"], 3);
        ready_all(&mut room);
        advance(&mut room);

        let outcome = room.start_or_advance(0, Uuid::new_v4(), &clock()).unwrap();

        assert_eq!(outcome, AdvanceOutcome::AlreadyAdvanced { current_turn: 1 });
        assert!(room.uncommitted_events().is_empty());
    }

    #[test]
    fn test_advance_from_a_future_turn_is_rejected() {
        let mut room = room_with(&["A"], 3);

        let result = room.start_or_advance(2, Uuid::new_v4(), &clock());

        assert!(matches!(result, Err(DomainError::InvalidState(_))));
    }

    #[test]
    fn test_ready_for_next_turn_requires_closing_the_current_one() {
        let mut room = room_with(&["A", "B"], 2);
        ready_all(&mut room);
        advance(&mut room);

        let before = room.set_ready("A", true, Uuid::new_v4(), &clock());
        submit(&mut room, "A", "idea");
        let after = room.set_ready("A", true, Uuid::new_v4(), &clock());

        assert!(matches!(before, Err(DomainError::InvalidState(_))));
        assert!(after.unwrap());
    }

    #[test]
    fn test_final_turn_has_no_readiness_step() {
        let mut room = room_with(&["A", "B"], 1);
        ready_all(&mut room);
        advance(&mut room);
        submit(&mut room, "A", "x");

        let result = room.set_ready("A", true, Uuid::new_v4(), &clock());

        assert!(matches!(result, Err(DomainError::InvalidState(_))));
    }

    #[test]
    fn test_second_submit_for_the_same_slot_keeps_the_first_text() {
        let mut room = room_with(&["A", "B"], 2);
        ready_all(&mut room);
        advance(&mut room);
        submit(&mut room, "A", "first");

        let outcome = submit(&mut room, "A", "second");

        assert_eq!(outcome, SubmitOutcome::AlreadyClosed);
        assert_eq!(room.contribution(1, "A").unwrap().text, "first");
    }

    #[test]
    fn test_submit_for_a_turn_that_is_not_open_is_rejected() {
        let mut room = room_with(&["A"], 2);
        ready_all(&mut room);
        advance(&mut room);

        let result = room.submit_contribution(
            "A",
            2,
            "early".to_owned(),
            ContributionSource::Explicit,
            Uuid::new_v4(),
            &clock(),
        );

        assert!(matches!(result, Err(DomainError::InvalidState(_))));
    }

    #[test]
    fn test_inactive_participant_cannot_submit() {
        let mut room = room_with(&["A", "B"], 1);
        ready_all(&mut room);
        advance(&mut room);
        room.set_active("B", false, Uuid::new_v4(), &clock()).unwrap();
        commit(&mut room);

        let result = room.submit_contribution(
            "B",
            1,
            "late".to_owned(),
            ContributionSource::Explicit,
            Uuid::new_v4(),
            &clock(),
        );

        assert!(matches!(result, Err(DomainError::InvalidState(_))));
    }

    #[test]
    fn test_last_final_turn_submission_completes_the_room() {
        // Arrange
        let mut room = room_with(&["A", "B"], 1);
        ready_all(&mut room);
        advance(&mut room);
        submit(&mut room, "A", "x");

        // Act
        let outcome = room
            .submit_contribution(
                "B",
                1,
                String::new(),
                ContributionSource::Timeout,
                Uuid::new_v4(),
                &clock(),
            )
            .unwrap();

        // Assert
        assert_eq!(outcome, SubmitOutcome::Accepted { completed_room: true });
        let types: Vec<&str> = room
            .uncommitted_events()
            .iter()
            .map(DomainEvent::event_type)
            .collect();
        assert_eq!(
            types,
            vec![CONTRIBUTION_SUBMITTED_EVENT_TYPE, ROOM_COMPLETED_EVENT_TYPE]
        );
        let sequence: Vec<i64> = room
            .uncommitted_events()
            .iter()
            .map(|e| e.metadata().sequence_number)
            .collect();
        assert_eq!(sequence, vec![room.version() + 1, room.version() + 2]);
        assert_eq!(room.status(), RoomStatus::Completed);
        assert_eq!(room.deadline(), None);
    }

    #[test]
    fn test_deactivating_the_last_missing_contributor_completes_the_room() {
        let mut room = room_with(&["A", "B"], 1);
        ready_all(&mut room);
        advance(&mut room);
        submit(&mut room, "A", "x");

        room.set_active("B", false, Uuid::new_v4(), &clock()).unwrap();

        assert_eq!(room.status(), RoomStatus::Completed);
        // Reactivation never moves the status backward.
        room.set_active("B", true, Uuid::new_v4(), &clock()).unwrap();
        assert_eq!(room.status(), RoomStatus::Completed);
    }

    #[test]
    fn test_current_turn_never_exceeds_turn_count() {
        let mut room = room_with(&["A"], 2);
        for _ in 0..2 {
            ready_all(&mut room);
            advance(&mut room);
            submit(&mut room, "A", "x");
        }

        let result = room.start_or_advance(2, Uuid::new_v4(), &clock());

        assert!(matches!(result, Err(DomainError::InvalidState(_))));
        assert_eq!(room.current_turn(), room.turn_count());
        assert_eq!(room.status(), RoomStatus::Completed);
    }

    #[test]
    fn test_three_participant_relay_scenario() {
        // Arrange
        let mut room = room_with(&["A", "B", "C"], 2);
        ready_all(&mut room);
        advance(&mut room);
        submit(&mut room, "A", "x");
        submit(&mut room, "B", "y");
        room.submit_contribution(
            "C",
            1,
            String::new(),
            ContributionSource::Timeout,
            Uuid::new_v4(),
            &clock(),
        )
        .unwrap();
        commit(&mut room);
        ready_all(&mut room);

        // Act
        let outcome = advance(&mut room);

        // Assert
        assert_eq!(outcome, AdvanceOutcome::Advanced { turn: 2 });
        let first = |name: &str| room.relay_for(name).into_iter().next().unwrap();
        assert_eq!(first("A").contributor, "C");
        assert_eq!(first("A").contribution.as_deref(), Some(""));
        assert_eq!(first("B").contributor, "A");
        assert_eq!(first("B").contribution.as_deref(), Some("x"));
        assert_eq!(first("C").contributor, "B");
        assert_eq!(first("C").contribution.as_deref(), Some("y"));
        assert_eq!(room.contribution_count(1), 3);
        assert_eq!(room.contribution_count(2), 0);
    }

    #[test]
    fn test_padded_name_resolves_to_the_joined_participant() {
        // Arrange
        let mut room = room_with(&[" Ada "], 1);

        // Act
        let readied = room.set_ready("  Ada", true, Uuid::new_v4(), &clock()).unwrap();
        commit(&mut room);
        advance(&mut room);
        let outcome = submit(&mut room, "Ada ", "tidy desks");

        // Assert
        assert!(readied);
        assert_eq!(outcome, SubmitOutcome::Accepted { completed_room: true });
        assert_eq!(room.contribution(1, "Ada").unwrap().text, "tidy desks");
        assert!(!room.set_active(" Ada ", true, Uuid::new_v4(), &clock()).unwrap());
    }
}
