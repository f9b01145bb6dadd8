use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

/// Bounded history of configurations that validated tokens, newest first
#[derive(Debug)]
pub(crate) struct LastKnownGood<C: ?Sized> {
    entries: VecDeque<Entry<C>>,
    size_limit: usize,
    lifetime: Duration,
}

#[derive(Debug)]
struct Entry<C: ?Sized> {
    configuration: Arc<C>,
    recorded_at: DateTime<Utc>,
}

impl<C: ?Sized> LastKnownGood<C> {
    pub(crate) fn new(size_limit: usize, lifetime: Duration) -> Self {
        Self {
            entries: VecDeque::with_capacity(size_limit),
            size_limit,
            lifetime,
        }
    }

    /// Record `configuration` at the head; an existing entry for the same
    /// instance is moved rather than duplicated
    pub(crate) fn set(&mut self, configuration: Arc<C>, now: DateTime<Utc>) {
        self.entries
            .retain(|entry| !Arc::ptr_eq(&entry.configuration, &configuration));
        self.entries.push_front(Entry {
            configuration,
            recorded_at: now,
        });
        self.entries.truncate(self.size_limit);
    }

    /// Entries recorded less than `lifetime` ago, newest first
    pub(crate) fn configurations(&self, now: DateTime<Utc>) -> Vec<Arc<C>> {
        self.entries
            .iter()
            .filter(|entry| self.is_alive(entry, now))
            .map(|entry| Arc::clone(&entry.configuration))
            .collect()
    }

    /// The head, when it is still alive
    pub(crate) fn head(&self, now: DateTime<Utc>) -> Option<Arc<C>> {
        self.entries
            .front()
            .filter(|entry| self.is_alive(entry, now))
            .map(|entry| Arc::clone(&entry.configuration))
    }

    fn is_alive(&self, entry: &Entry<C>, now: DateTime<Utc>) -> bool {
        now - entry.recorded_at < self.lifetime
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(seconds, 0).expect("timestamp in range")
    }

    #[test]
    fn test_newest_first_and_bounded() {
        let mut lkg = LastKnownGood::new(2, Duration::hours(1));
        let (a, b, c) = (Arc::new("a"), Arc::new("b"), Arc::new("c"));
        lkg.set(Arc::clone(&a), at(0));
        lkg.set(Arc::clone(&b), at(1));
        lkg.set(Arc::clone(&c), at(2));

        let entries = lkg.configurations(at(3));
        assert_eq!(entries.len(), 2);
        assert!(Arc::ptr_eq(&entries[0], &c));
        assert!(Arc::ptr_eq(&entries[1], &b));
    }

    #[test]
    fn test_set_promotes_existing_entry() {
        let mut lkg = LastKnownGood::new(5, Duration::hours(1));
        let (a, b) = (Arc::new("a"), Arc::new("b"));
        lkg.set(Arc::clone(&a), at(0));
        lkg.set(Arc::clone(&b), at(1));
        lkg.set(Arc::clone(&a), at(2));

        assert_eq!(lkg.entries.len(), 2);
        assert!(Arc::ptr_eq(&lkg.head(at(3)).unwrap(), &a));
    }

    #[test]
    fn test_entries_expire() {
        let mut lkg = LastKnownGood::new(5, Duration::seconds(60));
        lkg.set(Arc::new("old"), at(0));
        lkg.set(Arc::new("new"), at(50));

        assert_eq!(lkg.configurations(at(70)).len(), 1);
        assert!(lkg.head(at(70)).is_some());
        assert!(lkg.head(at(200)).is_none());
    }
}
