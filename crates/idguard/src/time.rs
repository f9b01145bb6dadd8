//! Clock abstraction
//!
//! Lifetime checks, key validity checks and the configuration manager's
//! refresh schedule all read the time through a [`TimeProvider`] so tests can
//! move time without sleeping.

use std::fmt::Debug;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// Source of the current UTC time
pub trait TimeProvider: Send + Sync + Debug {
    /// Current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests
///
/// Clones share the same instant.
///
/// ```rust
/// use chrono::Duration;
/// use idguard::time::{ManualTimeProvider, TimeProvider};
///
/// let clock = ManualTimeProvider::default();
/// let start = clock.now();
/// clock.advance(Duration::minutes(10));
/// assert_eq!(clock.now() - start, Duration::minutes(10));
/// ```
#[derive(Debug, Clone)]
pub struct ManualTimeProvider {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualTimeProvider {
    /// Clock frozen at `now`
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    /// Move the clock forward (or backward with a negative duration)
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    /// Jump to an absolute instant
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Default for ManualTimeProvider {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl TimeProvider for ManualTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Shared default clock
pub(crate) fn system_clock() -> Arc<dyn TimeProvider> {
    Arc::new(SystemTimeProvider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_is_shared_between_clones() {
        let clock = ManualTimeProvider::new(DateTime::UNIX_EPOCH);
        let other = clock.clone();
        clock.advance(Duration::seconds(30));
        assert_eq!(other.now().timestamp(), 30);

        other.set(DateTime::UNIX_EPOCH);
        assert_eq!(clock.now(), DateTime::UNIX_EPOCH);
    }

    #[test]
    fn test_system_clock_moves_forward() {
        let clock = SystemTimeProvider;
        let first = clock.now();
        assert!(clock.now() >= first);
    }
}
