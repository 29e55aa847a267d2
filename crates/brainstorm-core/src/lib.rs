//! Shared event-sourcing abstractions for the brainstorming coordinator.
//!
//! Defines the traits and types every bounded context builds on: aggregates,
//! commands, events, the event repository and its change feed, the clock and
//! the domain error taxonomy. It contains no infrastructure code.

pub mod aggregate;
pub mod clock;
pub mod command;
pub mod error;
pub mod event;
pub mod repository;
