//! Live room observation on top of the store's change feed.

use std::sync::Arc;

use brainstorm_core::aggregate::AggregateRoot;
use brainstorm_core::error::DomainError;
use brainstorm_core::repository::{EventFeed, EventRepository, StoredEvent};
use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::application::command_handlers::load_room;
use crate::application::query_handlers::RoomView;
use crate::domain::aggregates::Room;
use crate::domain::events::RoomEvent;

/// A room kept current by folding its appended events as they arrive.
pub struct RoomSubscription {
    room_id: Uuid,
    room: Room,
    repo: Arc<dyn EventRepository>,
    feed: Receiver<StoredEvent>,
}

impl std::fmt::Debug for RoomSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomSubscription")
            .field("room_id", &self.room_id)
            .field("version", &self.room.version())
            .finish_non_exhaustive()
    }
}

/// Subscribes to a room. The feed is joined before the room is loaded, so no
/// append can fall between the snapshot and the first change.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` for an unknown room or the
/// repository's error.
pub async fn subscribe_room(
    room_id: Uuid,
    repo: Arc<dyn EventRepository>,
    feed: &dyn EventFeed,
) -> Result<RoomSubscription, DomainError> {
    let receiver = feed.subscribe();
    let room = load_room(room_id, repo.as_ref()).await?;
    Ok(RoomSubscription {
        room_id,
        room,
        repo,
        feed: receiver,
    })
}

impl RoomSubscription {
    /// The room as of the last folded event.
    #[must_use]
    pub fn current(&self) -> RoomView {
        RoomView::from_room(&self.room)
    }

    /// Waits for the next change to this room and returns the new view.
    ///
    /// Events already covered by the snapshot are skipped. A gap in the
    /// sequence or a lagged receiver reloads the room from the store.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::StoreUnavailable` once the feed is closed, or
    /// the store's error if a reload fails.
    pub async fn changed(&mut self) -> Result<RoomView, DomainError> {
        loop {
            match self.feed.recv().await {
                Ok(stored) => {
                    if stored.aggregate_id != self.room_id
                        || stored.sequence_number <= self.room.version()
                    {
                        continue;
                    }
                    if stored.sequence_number == self.room.version() + 1 {
                        let event = RoomEvent::try_from(&stored)?;
                        self.room.apply(&event);
                    } else {
                        debug!(
                            room_id = %self.room_id,
                            expected = self.room.version() + 1,
                            received = stored.sequence_number,
                            "sequence gap on room feed, reloading"
                        );
                        self.reload().await?;
                    }
                    return Ok(self.current());
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(room_id = %self.room_id, skipped, "room feed lagged, reloading");
                    let before = self.room.version();
                    self.reload().await?;
                    if self.room.version() != before {
                        return Ok(self.current());
                    }
                }
                Err(RecvError::Closed) => {
                    return Err(DomainError::StoreUnavailable(
                        "room change feed closed".to_owned(),
                    ));
                }
            }
        }
    }

    async fn reload(&mut self) -> Result<(), DomainError> {
        self.room = load_room(self.room_id, self.repo.as_ref()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use brainstorm_event_store::memory_event_repository::InMemoryEventRepository;
    use brainstorm_test_support::{FixedClock, fixed_now};

    use super::*;
    use crate::application::command_handlers::{
        handle_create_room, handle_join_room, handle_set_ready,
    };
    use crate::domain::commands::{CreateRoom, JoinRoom, SetReady};

    async fn create(repo: &InMemoryEventRepository) -> Uuid {
        let command = CreateRoom {
            correlation_id: Uuid::new_v4(),
            topic: "Release names".to_owned(),
            turn_count: 1,
            durations: vec![1],
        };
        handle_create_room(&command, &FixedClock(fixed_now()), repo)
            .await
            .unwrap()
            .aggregate_id
    }

    async fn join(repo: &InMemoryEventRepository, room_id: Uuid, name: &str) {
        let command = JoinRoom {
            correlation_id: Uuid::new_v4(),
            room_id,
            name: name.to_owned(),
        };
        handle_join_room(&command, &FixedClock(fixed_now()), repo)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_subscription_yields_current_view_then_each_change() {
        // Arrange
        let repo = Arc::new(InMemoryEventRepository::new());
        let room_id = create(&repo).await;
        let mut subscription = subscribe_room(room_id, repo.clone(), repo.as_ref())
            .await
            .unwrap();
        assert!(subscription.current().participants.is_empty());

        // Act
        join(&repo, room_id, "Ada").await;
        let after_join = subscription.changed().await.unwrap();
        handle_set_ready(
            &SetReady {
                correlation_id: Uuid::new_v4(),
                room_id,
                name: "Ada".to_owned(),
                ready: true,
            },
            &FixedClock(fixed_now()),
            repo.as_ref(),
        )
        .await
        .unwrap();
        let after_ready = subscription.changed().await.unwrap();

        // Assert
        assert_eq!(after_join.participants.len(), 1);
        assert!(!after_join.all_ready);
        assert!(after_ready.all_ready);
        assert_eq!(after_ready.version, 3);
    }

    #[tokio::test]
    async fn test_subscription_ignores_other_rooms() {
        // Arrange
        let repo = Arc::new(InMemoryEventRepository::new());
        let watched = create(&repo).await;
        let other = create(&repo).await;
        let mut subscription = subscribe_room(watched, repo.clone(), repo.as_ref())
            .await
            .unwrap();

        // Act
        join(&repo, other, "Bob").await;
        join(&repo, watched, "Ada").await;
        let view = subscription.changed().await.unwrap();

        // Assert
        assert_eq!(view.room_id, watched);
        assert_eq!(view.participants[0].name, "Ada");
    }

    #[tokio::test]
    async fn test_lagged_subscription_reconciles_by_reloading() {
        // Arrange
        let repo = Arc::new(InMemoryEventRepository::with_feed_capacity(1));
        let room_id = create(&repo).await;
        let mut subscription = subscribe_room(room_id, repo.clone(), repo.as_ref())
            .await
            .unwrap();

        // Act
        for name in ["Ada", "Bob", "Cy"] {
            join(&repo, room_id, name).await;
        }
        let view = subscription.changed().await.unwrap();

        // Assert
        let names: Vec<&str> = view.participants.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Ada", "Bob", "Cy"]);
    }

    #[tokio::test]
    async fn test_subscribe_to_unknown_room_is_not_found() {
        let repo = Arc::new(InMemoryEventRepository::new());

        let result = subscribe_room(Uuid::new_v4(), repo.clone(), repo.as_ref()).await;

        assert!(matches!(result, Err(DomainError::AggregateNotFound(_))));
    }
}
