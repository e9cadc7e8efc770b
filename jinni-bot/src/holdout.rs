//! Per-channel, per-reference reply suppression.
//!
//! A lookup may reply only if the resource's status changed since the last
//! recorded lookup, or the last record is older than the holdout window.
//! Records live for the life of the process; there is no eviction.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Outcome of the last lookup that passed the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    pub status: u16,
    pub at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Reply-worthy; the record has been replaced.
    Proceed { previous: Option<Record> },
    /// Same status inside the window; the record is untouched.
    Suppress { remaining: Duration },
}

#[derive(Default)]
struct Tables {
    records: HashMap<String, HashMap<String, Record>>,
    in_flight: HashSet<(String, String)>,
}

/// Holdout table keyed by target (channel, or our nick for private
/// messages) and then by reference key.
pub struct HoldoutStore {
    window: Duration,
    tables: Mutex<Tables>,
}

impl HoldoutStore {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            tables: Mutex::new(Tables::default()),
        }
    }

    /// Gate a lookup that came back with `status` at `now`.
    pub fn evaluate(&self, target: &str, key: &str, status: u16, now: Instant) -> Verdict {
        let mut tables = self.tables.lock();
        let records = tables.records.entry(target.to_string()).or_default();
        let previous = records.get(key).copied();

        if let Some(last) = previous {
            let elapsed = now.saturating_duration_since(last.at);
            if last.status == status && elapsed <= self.window {
                return Verdict::Suppress {
                    remaining: self.window - elapsed,
                };
            }
        }

        records.insert(key.to_string(), Record { status, at: now });
        Verdict::Proceed { previous }
    }

    pub fn record(&self, target: &str, key: &str) -> Option<Record> {
        self.tables
            .lock()
            .records
            .get(target)
            .and_then(|r| r.get(key))
            .copied()
    }

    /// Number of records across all targets.
    pub fn len(&self) -> usize {
        self.tables.lock().records.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Claim the lookup for (target, key). `None` means one is already in
    /// flight and this one should be dropped. The claim is released when the
    /// guard drops.
    pub fn begin(&self, target: &str, key: &str) -> Option<InFlight<'_>> {
        let slot = (target.to_string(), key.to_string());
        let mut tables = self.tables.lock();
        if !tables.in_flight.insert(slot.clone()) {
            return None;
        }
        Some(InFlight { store: self, slot })
    }
}

/// Claim on an in-flight lookup.
pub struct InFlight<'a> {
    store: &'a HoldoutStore,
    slot: (String, String),
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.store.tables.lock().in_flight.remove(&self.slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(180_000);

    #[test]
    fn first_lookup_proceeds_and_records() {
        let store = HoldoutStore::new(WINDOW);
        let t0 = Instant::now();
        assert_eq!(
            store.evaluate("#ops", "FOO-123", 200, t0),
            Verdict::Proceed { previous: None }
        );
        assert_eq!(
            store.record("#ops", "FOO-123"),
            Some(Record { status: 200, at: t0 })
        );
    }

    #[test]
    fn same_status_inside_window_is_suppressed_then_released() {
        let store = HoldoutStore::new(WINDOW);
        let t0 = Instant::now();
        store.evaluate("#ops", "FOO-123", 200, t0);

        let t60 = t0 + Duration::from_secs(60);
        assert_eq!(
            store.evaluate("#ops", "FOO-123", 200, t60),
            Verdict::Suppress { remaining: Duration::from_secs(120) }
        );
        // Suppression leaves the original timestamp in place.
        assert_eq!(store.record("#ops", "FOO-123").unwrap().at, t0);

        let t200 = t0 + Duration::from_secs(200);
        assert_eq!(
            store.evaluate("#ops", "FOO-123", 200, t200),
            Verdict::Proceed { previous: Some(Record { status: 200, at: t0 }) }
        );
        assert_eq!(store.record("#ops", "FOO-123").unwrap().at, t200);
    }

    #[test]
    fn exactly_at_the_window_is_still_suppressed() {
        let store = HoldoutStore::new(WINDOW);
        let t0 = Instant::now();
        store.evaluate("#ops", "FOO-1", 200, t0);
        assert!(matches!(
            store.evaluate("#ops", "FOO-1", 200, t0 + WINDOW),
            Verdict::Suppress { .. }
        ));
        assert!(matches!(
            store.evaluate("#ops", "FOO-1", 200, t0 + WINDOW + Duration::from_millis(1)),
            Verdict::Proceed { .. }
        ));
    }

    #[test]
    fn status_change_inside_window_proceeds() {
        let store = HoldoutStore::new(WINDOW);
        let t0 = Instant::now();
        store.evaluate("#ops", "OS-1", 403, t0);
        let t1 = t0 + Duration::from_secs(5);
        assert_eq!(
            store.evaluate("#ops", "OS-1", 200, t1),
            Verdict::Proceed { previous: Some(Record { status: 403, at: t0 }) }
        );
        assert_eq!(store.record("#ops", "OS-1").unwrap().status, 200);
    }

    #[test]
    fn targets_and_keys_are_independent() {
        let store = HoldoutStore::new(WINDOW);
        let t0 = Instant::now();
        store.evaluate("#ops", "OS-1", 200, t0);
        assert!(matches!(
            store.evaluate("#dev", "OS-1", 200, t0),
            Verdict::Proceed { previous: None }
        ));
        assert!(matches!(
            store.evaluate("#ops", "OS-2", 200, t0),
            Verdict::Proceed { previous: None }
        ));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn in_flight_claims_are_exclusive_until_dropped() {
        let store = HoldoutStore::new(WINDOW);
        let first = store.begin("#ops", "OS-1");
        assert!(first.is_some());
        assert!(store.begin("#ops", "OS-1").is_none());
        assert!(store.begin("#dev", "OS-1").is_some());
        drop(first);
        assert!(store.begin("#ops", "OS-1").is_some());
    }

    #[test]
    fn zero_window_never_suppresses_after_time_moves() {
        let store = HoldoutStore::new(Duration::ZERO);
        let t0 = Instant::now();
        store.evaluate("#ops", "OS-1", 200, t0);
        assert!(matches!(
            store.evaluate("#ops", "OS-1", 200, t0 + Duration::from_millis(1)),
            Verdict::Proceed { .. }
        ));
    }
}
