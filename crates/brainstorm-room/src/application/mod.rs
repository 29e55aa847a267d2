//! Application services: command handlers, read models and observers.

pub mod command_handlers;
pub mod export;
pub mod query_handlers;
pub mod session;
pub mod subscriptions;
