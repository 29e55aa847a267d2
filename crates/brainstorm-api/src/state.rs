//! Shared application state.

use std::sync::Arc;

use brainstorm_core::clock::Clock;
use brainstorm_core::repository::{EventFeed, EventRepository};

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Clock for timestamps and turn deadlines.
    pub clock: Arc<dyn Clock>,
    /// Event store holding every room.
    pub event_repository: Arc<dyn EventRepository>,
    /// Change feed of the same store, for live streams.
    pub event_feed: Arc<dyn EventFeed>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        event_repository: Arc<dyn EventRepository>,
        event_feed: Arc<dyn EventFeed>,
    ) -> Self {
        Self {
            clock,
            event_repository,
            event_feed,
        }
    }

    /// State backed by one store that is both repository and feed.
    #[must_use]
    pub fn with_store<S>(clock: Arc<dyn Clock>, store: Arc<S>) -> Self
    where
        S: EventRepository + EventFeed + 'static,
    {
        Self::new(clock, store.clone(), store)
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}
