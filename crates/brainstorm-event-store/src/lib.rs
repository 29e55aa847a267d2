//! Event stores for the brainstorming service.
//!
//! Both stores implement `EventRepository` and `EventFeed`. The in-memory
//! store backs development runs and tests; the PostgreSQL store is the
//! durable backend.

pub mod memory_event_repository;
pub mod pg_event_repository;

/// Schema migrations for the PostgreSQL store, embedded at build time.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

/// Default capacity of the change-feed broadcast channel.
pub const DEFAULT_FEED_CAPACITY: usize = 1024;
