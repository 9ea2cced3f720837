//! Liveness tracking for downstream clients.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rcfg_core::Client;

#[derive(Debug, Clone)]
struct TrackedClient {
    client: Client,
    /// Unix ms. Never moves backwards.
    last_seen: i64,
}

/// Clients seen within the last `ttl`.
///
/// Entries are reaped lazily by [`ClientTracker::active_clients`].
pub struct ClientTracker {
    ttl: Duration,
    clients: Mutex<HashMap<String, TrackedClient>>,
}

impl ClientTracker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Record that `client` was seen at `now` (Unix ms). Callers sharing a
    /// tracker must agree on the clock.
    ///
    /// The client's products are replaced. An older `now` than the recorded
    /// one leaves the last-seen time untouched.
    pub fn seen(&self, client: Client, now: i64) {
        let mut clients = self.lock();
        match clients.get_mut(&client.id) {
            Some(tracked) => {
                tracked.last_seen = tracked.last_seen.max(now);
                tracked.client = client;
            }
            None => {
                tracing::debug!(client = %client.id, "tracking new client");
                clients.insert(
                    client.id.clone(),
                    TrackedClient {
                        client,
                        last_seen: now,
                    },
                );
            }
        }
    }

    /// Clients seen within the TTL of `now`. Expired clients are forgotten.
    pub fn active_clients(&self, now: i64) -> Vec<Client> {
        let ttl = self.ttl.as_millis().min(i64::MAX as u128) as i64;
        let mut clients = self.lock();
        clients.retain(|id, tracked| {
            let active = now.saturating_sub(tracked.last_seen) <= ttl;
            if !active {
                tracing::debug!(client = %id, "client expired");
            }
            active
        });
        clients.values().map(|t| t.client.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, TrackedClient>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};

    use proptest::prelude::*;
    use rcfg_testkit::generators::SeenEvent;

    #[test]
    fn test_client_expires_after_ttl() {
        let tracker = ClientTracker::new(Duration::from_secs(5));
        tracker.seen(Client::new("c1", ["P"]), 0);

        let active = tracker.active_clients(4_000);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "c1");

        assert!(tracker.active_clients(6_000).is_empty());
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_boundary_is_inclusive() {
        let tracker = ClientTracker::new(Duration::from_secs(5));
        tracker.seen(Client::new("c1", ["P"]), 1_000);
        assert_eq!(tracker.active_clients(6_000).len(), 1);
        assert!(tracker.active_clients(6_001).is_empty());
    }

    #[test]
    fn test_seen_replaces_products_but_not_time() {
        let tracker = ClientTracker::new(Duration::from_secs(5));
        tracker.seen(Client::new("c1", ["A"]), 10_000);
        tracker.seen(Client::new("c1", ["B"]), 2_000);

        let active = tracker.active_clients(14_000);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].products, BTreeSet::from([rcfg_core::Product::new("B")]));
        assert_eq!(tracker.len(), 1);
    }

    proptest! {
        #[test]
        fn test_active_clients_match_model(
            events in prop::collection::vec(any::<SeenEvent>(), 0..40),
            offset in 0i64..20_000,
        ) {
            let ttl = Duration::from_secs(10);
            let tracker = ClientTracker::new(ttl);

            // Model: latest products and max timestamp per id.
            let mut model: BTreeMap<String, (BTreeSet<rcfg_core::Product>, i64)> = BTreeMap::new();
            for event in &events {
                tracker.seen(event.client.clone(), event.at);
                let entry = model
                    .entry(event.client.id.clone())
                    .or_insert((BTreeSet::new(), event.at));
                entry.0 = event.client.products.clone();
                entry.1 = entry.1.max(event.at);
            }

            let now = events.iter().map(|e| e.at).max().unwrap_or(0) + offset;
            let mut active = tracker.active_clients(now);
            active.sort_by(|a, b| a.id.cmp(&b.id));

            let expected: Vec<(String, BTreeSet<rcfg_core::Product>)> = model
                .into_iter()
                .filter(|(_, (_, last))| now - last <= 10_000)
                .map(|(id, (products, _))| (id, products))
                .collect();
            let actual: Vec<(String, BTreeSet<rcfg_core::Product>)> = active
                .into_iter()
                .map(|c| (c.id, c.products))
                .collect();

            prop_assert_eq!(&actual, &expected);
            prop_assert_eq!(tracker.len(), expected.len());
        }
    }
}
