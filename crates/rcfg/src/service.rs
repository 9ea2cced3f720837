//! The distribution service: refresh loop, pull API and subscribers.
//!
//! The service periodically asks the backend for updates on behalf of the
//! clients it has seen, hands every bundle to the verifier, and serves
//! verified configuration slices back to those clients.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rcfg_core::{now_millis, Client, ConfigPath, CoreError, Product};
use rcfg_store::KvStore;
use rcfg_uptane::{TrustState, UptaneClient, UptaneError};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::backend::{Backend, RetryingBackend};
use crate::clients::ClientTracker;
use crate::config::ServiceConfig;
use crate::error::{BackendError, Result, ServiceError};
use crate::messages::{
    ClientGetConfigsRequest, ClientGetConfigsResponse, ConfigFile, ConfigUpdate,
    LatestConfigsRequest,
};
use crate::subscribers::{SubscriberId, Subscribers, SubscriptionRecord};

/// Products the backend has been asked for.
#[derive(Debug, Default)]
struct ProductDemand {
    /// Confirmed by a successful fetch.
    products: BTreeSet<Product>,
    /// Staged, waiting for a successful fetch.
    new_products: BTreeSet<Product>,
}

impl ProductDemand {
    fn stage<'a>(&mut self, products: impl IntoIterator<Item = &'a Product>) {
        for product in products {
            if !self.products.contains(product) {
                self.new_products.insert(product.clone());
            }
        }
    }

    /// Confirm the products that were part of a successful request.
    /// Products staged while it was in flight stay staged.
    fn confirm(&mut self, sent: &BTreeSet<Product>) {
        for product in sent {
            self.new_products.remove(product);
            self.products.insert(product.clone());
        }
    }
}

/// Fetches, verifies and distributes remote configuration.
pub struct DistributionService<S: KvStore, B: Backend> {
    config: ServiceConfig,
    uptane: Arc<UptaneClient<S>>,
    backend: RetryingBackend<B>,
    tracker: ClientTracker,
    demand: Mutex<ProductDemand>,
    subscribers: Mutex<Subscribers>,
    /// Held for a whole refresh cycle.
    refresh_lock: tokio::sync::Mutex<()>,
    /// Set until the first successful refresh.
    first_refresh: AtomicBool,
}

impl<S, B> DistributionService<S, B>
where
    S: KvStore + 'static,
    B: Backend + 'static,
{
    /// Create a service, opening the verifier over `store`.
    pub async fn new(config: ServiceConfig, store: S, backend: B) -> Result<Self> {
        let config = config.validated()?;
        let uptane = UptaneClient::open(store, config.cache_key(), config.org_id).await?;
        Self::with_uptane(config, Arc::new(uptane), backend)
    }

    /// Create a service around an existing verifier.
    pub fn with_uptane(
        config: ServiceConfig,
        uptane: Arc<UptaneClient<S>>,
        backend: B,
    ) -> Result<Self> {
        let config = config.validated()?;
        if uptane.org_id() != config.org_id {
            return Err(ServiceError::InvalidConfig(format!(
                "verifier is scoped to org {} but service to org {}",
                uptane.org_id(),
                config.org_id
            )));
        }
        Ok(Self {
            tracker: ClientTracker::new(config.clients_ttl),
            backend: RetryingBackend::new(backend, config.retry.clone()),
            config,
            uptane,
            demand: Mutex::new(ProductDemand::default()),
            subscribers: Mutex::new(Subscribers::default()),
            refresh_lock: tokio::sync::Mutex::new(()),
            first_refresh: AtomicBool::new(true),
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn uptane(&self) -> &Arc<UptaneClient<S>> {
        &self.uptane
    }

    /// The backend, without the retry wrapper.
    pub fn backend(&self) -> &B {
        self.backend.inner()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Clients
    // ─────────────────────────────────────────────────────────────────────────

    /// Record that `client` is alive at `now`.
    ///
    /// `now` is wall-clock Unix ms, normally [`now_millis`]. Refreshes and
    /// [`get_configs_for`](Self::get_configs_for) expire clients against
    /// that same clock.
    pub fn seen(&self, client: Client, now: i64) {
        self.tracker.seen(client, now);
    }

    /// Clients seen within the TTL of `now`.
    pub fn active_clients(&self, now: i64) -> Vec<Client> {
        self.tracker.active_clients(now)
    }

    /// Products confirmed by a successful fetch.
    pub fn products(&self) -> BTreeSet<Product> {
        self.lock_demand().products.clone()
    }

    /// Products staged for the next fetch.
    pub fn new_products(&self) -> BTreeSet<Product> {
        self.lock_demand().new_products.clone()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Refresh
    // ─────────────────────────────────────────────────────────────────────────

    /// Spawn the refresh loop.
    ///
    /// The loop stops once `shutdown` becomes `true` or its sender is
    /// dropped. A refresh already running is allowed to finish first.
    pub fn start(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move { service.run(shutdown).await })
    }

    async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let interval = self.config.refresh_interval;
        tracing::info!(interval_secs = interval.as_secs(), "remote config refresh loop started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.refresh().await {
                        tracing::error!(error = %e, "could not refresh remote config");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!("remote config refresh loop stopped");
    }

    /// Run one refresh cycle: fetch, verify, then notify subscribers.
    ///
    /// On failure nothing changes: the verifier keeps its state and staged
    /// products stay staged for the next cycle.
    pub async fn refresh(&self) -> Result<()> {
        let _cycle = self.refresh_lock.lock().await;

        let active = self.tracker.active_clients(now_millis());
        let (products, new_products) = {
            let mut demand = self.lock_demand();
            demand.stage(active.iter().flat_map(|c| c.products.iter()));
            (demand.products.clone(), demand.new_products.clone())
        };

        let previous = if self.first_refresh.load(Ordering::SeqCst) {
            TrustState::default()
        } else {
            self.uptane.state().await
        };
        let request = LatestConfigsRequest::new(&previous, active, products, new_products.clone());
        tracing::debug!(
            clients = request.active_clients.len(),
            products = request.products.len(),
            new_products = request.new_products.len(),
            director_targets = request.director_targets_version,
            "refreshing remote config"
        );

        let timeout = self.config.fetch_timeout;
        let bundle = tokio::time::timeout(timeout, self.backend.fetch(&request))
            .await
            .map_err(|_| BackendError::Timeout(timeout))??;

        if let Err(e) = self.uptane.update(&bundle).await {
            tracing::warn!(error = %e, "rejected remote config update");
            return Err(e.into());
        }

        self.lock_demand().confirm(&new_products);
        self.first_refresh.store(false, Ordering::SeqCst);

        let state = self.uptane.state().await;
        tracing::info!(
            director_root = state.director_root_version,
            director_targets = state.director_targets_version,
            targets = state.targets.len(),
            "remote config refreshed"
        );

        self.dispatch(&state).await;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Pull API
    // ─────────────────────────────────────────────────────────────────────────

    /// Serve a polling client: director roots after the one it acknowledged,
    /// the current targets document and the trusted files for its products.
    ///
    /// The caller is recorded as seen.
    pub async fn get_configs_for(
        &self,
        request: &ClientGetConfigsRequest,
    ) -> Result<ClientGetConfigsResponse> {
        self.tracker.seen(request.client.clone(), now_millis());

        let products = &request.client.products;
        let view = self
            .uptane
            .configs_since(request.acknowledged_root_version, |path| {
                Ok(products.contains(&ConfigPath::parse(path)?.product))
            })
            .await
            .map_err(invalid_path_error)?;

        Ok(ClientGetConfigsResponse {
            roots: view.roots,
            targets: view.targets,
            config_files: view
                .files
                .into_iter()
                .map(|f| ConfigFile {
                    path: f.path,
                    raw: f.raw,
                })
                .collect(),
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Subscribers
    // ─────────────────────────────────────────────────────────────────────────

    /// Register a callback for `products`. Unknown products are staged for
    /// the next refresh.
    pub fn register_subscriber<F>(
        &self,
        products: impl IntoIterator<Item = Product>,
        callback: F,
    ) -> SubscriberId
    where
        F: Fn(&ConfigUpdate) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let products: BTreeSet<Product> = products.into_iter().collect();
        self.lock_demand().stage(&products);
        let id = self.lock_subscribers().register(products, Arc::new(callback));
        tracing::debug!(subscriber = %id, "registered subscriber");
        id
    }

    /// Returns false if `id` was not registered.
    pub fn unregister_subscriber(&self, id: SubscriberId) -> bool {
        self.lock_subscribers().unregister(id)
    }

    pub fn subscriptions(&self) -> Vec<SubscriptionRecord> {
        self.lock_subscribers().records()
    }

    async fn dispatch(&self, state: &TrustState) {
        let due = self.lock_subscribers().due(state.director_targets_version);
        for (record, callback) in due {
            let update = match self.config_update(&record.products, state).await {
                Ok(update) => update,
                Err(e) => {
                    tracing::error!(subscriber = %record.id, error = %e, "could not build subscriber update");
                    continue;
                }
            };

            match callback(&update) {
                Ok(()) => {
                    tracing::debug!(
                        subscriber = %record.id,
                        version = update.targets_version,
                        "notified subscriber"
                    );
                    self.lock_subscribers()
                        .acknowledge(record.id, update.targets_version);
                }
                Err(e) => {
                    tracing::error!(subscriber = %record.id, error = %e, "could not notify subscriber");
                }
            }
        }
    }

    async fn config_update(
        &self,
        products: &BTreeSet<Product>,
        state: &TrustState,
    ) -> Result<ConfigUpdate> {
        let view = self
            .uptane
            .configs_since(state.director_root_version, |path| {
                Ok(products.contains(&ConfigPath::parse(path)?.product))
            })
            .await
            .map_err(invalid_path_error)?;

        Ok(ConfigUpdate {
            targets_version: view.targets.version,
            config_files: view
                .files
                .into_iter()
                .map(|f| ConfigFile {
                    path: f.path,
                    raw: f.raw,
                })
                .collect(),
        })
    }

    fn lock_demand(&self) -> MutexGuard<'_, ProductDemand> {
        self.demand.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_subscribers(&self) -> MutexGuard<'_, Subscribers> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn invalid_path_error(e: UptaneError) -> ServiceError {
    match e {
        UptaneError::Decode(CoreError::InvalidConfigPath(path)) => {
            ServiceError::InvalidConfigPath(path)
        }
        other => other.into(),
    }
}
