//! Brainstorm API library: router, state, errors and configuration.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod telemetry;
