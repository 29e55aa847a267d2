//! Shared test fakes for the brainstorming service.

mod clock;
mod repository;

pub use clock::{FixedClock, fixed_now};
pub use repository::{
    EmptyEventRepository, FailingEventRepository, FlakyEventRepository,
    InterleavingEventRepository, RecordingEventRepository,
};
