//! Push-style subscribers.
//!
//! Subscribers are a best-effort notification path next to the pull API.
//! Each one is tracked by a [`SubscriptionRecord`] whose cursor only moves
//! when its callback reports success.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use rcfg_core::Product;

use crate::messages::ConfigUpdate;

/// Callback invoked with the configuration for a subscriber's products.
pub type SubscriberCallback = Arc<dyn Fn(&ConfigUpdate) -> anyhow::Result<()> + Send + Sync>;

/// Handle returned by registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subscriber-{}", self.0)
    }
}

/// What a subscriber wants and how far it has been served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRecord {
    pub id: SubscriberId,
    pub products: BTreeSet<Product>,
    /// Director targets version last delivered successfully.
    pub last_acknowledged_version: u64,
}

struct Subscriber {
    record: SubscriptionRecord,
    callback: SubscriberCallback,
}

#[derive(Default)]
pub(crate) struct Subscribers {
    next_id: u64,
    entries: Vec<Subscriber>,
}

impl Subscribers {
    pub fn register(&mut self, products: BTreeSet<Product>, callback: SubscriberCallback) -> SubscriberId {
        self.next_id += 1;
        let id = SubscriberId(self.next_id);
        self.entries.push(Subscriber {
            record: SubscriptionRecord {
                id,
                products,
                last_acknowledged_version: 0,
            },
            callback,
        });
        id
    }

    pub fn unregister(&mut self, id: SubscriberId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|s| s.record.id != id);
        self.entries.len() != before
    }

    /// Subscribers behind `targets_version`.
    pub fn due(&self, targets_version: u64) -> Vec<(SubscriptionRecord, SubscriberCallback)> {
        self.entries
            .iter()
            .filter(|s| s.record.last_acknowledged_version < targets_version)
            .map(|s| (s.record.clone(), Arc::clone(&s.callback)))
            .collect()
    }

    /// Advance a cursor. Ignored if the subscriber left meanwhile.
    pub fn acknowledge(&mut self, id: SubscriberId, version: u64) {
        if let Some(s) = self.entries.iter_mut().find(|s| s.record.id == id) {
            s.record.last_acknowledged_version = s.record.last_acknowledged_version.max(version);
        }
    }

    pub fn records(&self) -> Vec<SubscriptionRecord> {
        self.entries.iter().map(|s| s.record.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> SubscriberCallback {
        Arc::new(|_: &ConfigUpdate| -> anyhow::Result<()> { Ok(()) })
    }

    #[test]
    fn test_register_and_unregister() {
        let mut subs = Subscribers::default();
        let a = subs.register([Product::new("A")].into_iter().collect(), noop());
        let b = subs.register(BTreeSet::new(), noop());
        assert_ne!(a, b);
        assert_eq!(subs.records().len(), 2);

        assert!(subs.unregister(a));
        assert!(!subs.unregister(a));
        assert_eq!(subs.records()[0].id, b);
    }

    #[test]
    fn test_due_follows_cursor() {
        let mut subs = Subscribers::default();
        let id = subs.register(BTreeSet::new(), noop());
        assert_eq!(subs.due(1).len(), 1);

        subs.acknowledge(id, 1);
        assert!(subs.due(1).is_empty());
        assert_eq!(subs.due(2).len(), 1);

        // Cursors never move backwards.
        subs.acknowledge(id, 0);
        assert_eq!(subs.records()[0].last_acknowledged_version, 1);
    }
}
