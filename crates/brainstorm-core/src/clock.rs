//! Clock abstraction so deadlines and timestamps stay deterministic in tests.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;

    /// Time left until `deadline`, saturating at zero once it has passed.
    fn remaining_until(&self, deadline: DateTime<Utc>) -> Duration {
        (deadline - self.now()).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Production clock that delegates to the system clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    struct At(DateTime<Utc>);

    impl Clock for At {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    #[test]
    fn test_remaining_until_future_deadline() {
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let clock = At(now);

        let remaining = clock.remaining_until(now + chrono::Duration::seconds(90));

        assert_eq!(remaining, Duration::from_secs(90));
    }

    #[test]
    fn test_remaining_until_past_deadline_saturates_at_zero() {
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let clock = At(now);

        let remaining = clock.remaining_until(now - chrono::Duration::seconds(5));

        assert_eq!(remaining, Duration::ZERO);
    }
}
