//! Domain model: the `Room` aggregate, its commands and events.

pub mod aggregates;
pub mod commands;
pub mod events;
pub mod rotation;
