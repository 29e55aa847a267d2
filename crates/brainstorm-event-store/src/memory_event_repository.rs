//! In-process implementation of `EventRepository` and `EventFeed`.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use brainstorm_core::error::DomainError;
use brainstorm_core::repository::{EventFeed, EventRepository, StoredEvent};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::DEFAULT_FEED_CAPACITY;

/// Event streams held in memory, keyed by aggregate.
#[derive(Debug)]
pub struct InMemoryEventRepository {
    streams: RwLock<HashMap<Uuid, Vec<StoredEvent>>>,
    feed: broadcast::Sender<StoredEvent>,
}

impl InMemoryEventRepository {
    /// Creates an empty store with the default feed capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_feed_capacity(DEFAULT_FEED_CAPACITY)
    }

    /// Creates an empty store whose change feed buffers `capacity` events
    /// per subscriber before lagging.
    #[must_use]
    pub fn with_feed_capacity(capacity: usize) -> Self {
        let (feed, _) = broadcast::channel(capacity);
        Self {
            streams: RwLock::new(HashMap::new()),
            feed,
        }
    }
}

impl Default for InMemoryEventRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> DomainError {
    DomainError::Infrastructure("in-memory event store lock poisoned".into())
}

#[async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        let streams = self.streams.read().map_err(|_| poisoned())?;
        Ok(streams.get(&aggregate_id).cloned().unwrap_or_default())
    }

    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        let mut streams = self.streams.write().map_err(|_| poisoned())?;
        let stream = streams.entry(aggregate_id).or_default();
        let actual = stream.last().map_or(0, |e| e.sequence_number);
        if actual != expected_version {
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id,
                expected: expected_version,
                actual,
            });
        }

        for (next, event) in (expected_version + 1..).zip(events) {
            if event.aggregate_id != aggregate_id || event.sequence_number != next {
                return Err(DomainError::Infrastructure(format!(
                    "event {} does not continue stream {aggregate_id} at sequence {next}",
                    event.event_id
                )));
            }
        }

        stream.extend_from_slice(events);
        // Publishing under the write lock keeps feed order equal to append order.
        for event in events {
            let _ = self.feed.send(event.clone());
        }
        debug!(%aggregate_id, appended = events.len(), "appended events");
        Ok(())
    }
}

impl EventFeed for InMemoryEventRepository {
    fn subscribe(&self) -> broadcast::Receiver<StoredEvent> {
        self.feed.subscribe()
    }
}
