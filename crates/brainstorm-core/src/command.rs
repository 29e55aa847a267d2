//! Command abstractions.

use uuid::Uuid;

/// An intent issued by a participant or an admin.
pub trait Command: Send + Sync + std::fmt::Debug {
    /// Stable name of the command, used as a span field and in logs.
    fn command_type(&self) -> &'static str;

    /// Correlation ID carried onto every event the command produces.
    fn correlation_id(&self) -> Uuid;
}
