//! Room & Turn coordination for round-robin brainstorming.
//!
//! Responsible for the room lifecycle (waiting, in progress, completed),
//! readiness quorum, timed turns with auto-submit, the rotating relay of
//! prior contributions and the read models observers render.

pub mod application;
pub mod domain;
