//! `PostgreSQL` implementation of the `EventRepository` trait.
//!
//! Appended events are also published on an in-process change feed after
//! the transaction commits, so observers connected to this server instance
//! see every write it makes.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use brainstorm_core::error::DomainError;
use brainstorm_core::repository::{EventFeed, EventRepository, StoredEvent};

use crate::DEFAULT_FEED_CAPACITY;

const SELECT_STREAM: &str = r"
SELECT event_id, aggregate_id, event_type, payload, sequence_number,
       correlation_id, causation_id, occurred_at
FROM domain_events
WHERE aggregate_id = $1
ORDER BY sequence_number ASC
";

const SELECT_STREAM_VERSION: &str = r"
SELECT COALESCE(MAX(sequence_number), 0)
FROM domain_events
WHERE aggregate_id = $1
";

const INSERT_EVENT: &str = r"
INSERT INTO domain_events
    (event_id, aggregate_id, event_type, payload, sequence_number,
     correlation_id, causation_id, occurred_at)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
";

/// PostgreSQL-backed event repository.
#[derive(Debug, Clone)]
pub struct PgEventRepository {
    pool: PgPool,
    feed: broadcast::Sender<StoredEvent>,
}

impl PgEventRepository {
    /// Creates a new `PgEventRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        let (feed, _) = broadcast::channel(DEFAULT_FEED_CAPACITY);
        Self { pool, feed }
    }
}

/// Connectivity failures are transient; everything else is permanent.
fn map_sqlx_error(err: sqlx::Error) -> DomainError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => DomainError::StoreUnavailable(err.to_string()),
        other => DomainError::Infrastructure(other.to_string()),
    }
}

fn row_to_stored_event(row: &PgRow) -> Result<StoredEvent, sqlx::Error> {
    Ok(StoredEvent {
        event_id: row.try_get("event_id")?,
        aggregate_id: row.try_get("aggregate_id")?,
        event_type: row.try_get("event_type")?,
        payload: row.try_get("payload")?,
        sequence_number: row.try_get("sequence_number")?,
        correlation_id: row.try_get("correlation_id")?,
        causation_id: row.try_get("causation_id")?,
        occurred_at: row.try_get("occurred_at")?,
    })
}

#[async_trait]
impl EventRepository for PgEventRepository {
    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        let rows = sqlx::query(SELECT_STREAM)
            .bind(aggregate_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        rows.iter()
            .map(row_to_stored_event)
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_sqlx_error)
    }

    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let actual: i64 = sqlx::query_scalar(SELECT_STREAM_VERSION)
            .bind(aggregate_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        if actual != expected_version {
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id,
                expected: expected_version,
                actual,
            });
        }

        for event in events {
            let inserted = sqlx::query(INSERT_EVENT)
                .bind(event.event_id)
                .bind(event.aggregate_id)
                .bind(&event.event_type)
                .bind(&event.payload)
                .bind(event.sequence_number)
                .bind(event.correlation_id)
                .bind(event.causation_id)
                .bind(event.occurred_at)
                .execute(&mut *tx)
                .await;

            if let Err(err) = inserted {
                // A concurrent writer claimed the same sequence number between
                // our version check and insert.
                if let sqlx::Error::Database(db_err) = &err {
                    if db_err.is_unique_violation() {
                        warn!(%aggregate_id, expected_version, "lost append race");
                        return Err(DomainError::ConcurrencyConflict {
                            aggregate_id,
                            expected: expected_version,
                            actual: event.sequence_number,
                        });
                    }
                }
                return Err(map_sqlx_error(err));
            }
        }

        tx.commit().await.map_err(map_sqlx_error)?;

        for event in events {
            let _ = self.feed.send(event.clone());
        }
        debug!(%aggregate_id, appended = events.len(), "appended events");
        Ok(())
    }
}

impl EventFeed for PgEventRepository {
    fn subscribe(&self) -> broadcast::Receiver<StoredEvent> {
        self.feed.subscribe()
    }
}
