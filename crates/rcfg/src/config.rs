//! Service configuration.

use std::time::Duration;

use crate::error::{Result, ServiceError};

/// Shortest allowed refresh interval.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_CLIENTS_TTL: Duration = Duration::from_secs(10);
/// Client TTLs must lie strictly between these bounds.
pub const MIN_CLIENTS_TTL: Duration = Duration::from_secs(5);
pub const MAX_CLIENTS_TTL: Duration = Duration::from_secs(60);
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Bounded exponential backoff for transient fetch failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before the attempt following failed attempt number `attempt`
    /// (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.max(1.0).powi(exponent);
        if !secs.is_finite() || secs >= self.max_backoff.as_secs_f64() {
            return self.max_backoff;
        }
        Duration::from_secs_f64(secs)
    }
}

/// Configuration for the [`DistributionService`](crate::DistributionService).
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Time between refreshes.
    pub refresh_interval: Duration,
    /// How long a client stays active after it was last seen.
    pub clients_ttl: Duration,
    /// Upper bound on one fetch, retries included.
    pub fetch_timeout: Duration,
    /// Organisation whose configuration this client may receive.
    pub org_id: u64,
    /// Datacenter of the backend, part of the cache key.
    pub datacenter: String,
    pub retry: RetryPolicy,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            clients_ttl: DEFAULT_CLIENTS_TTL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            org_id: 0,
            datacenter: "default".to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ServiceConfig {
    /// Clamp out-of-range durations and reject unusable settings.
    pub fn validated(mut self) -> Result<Self> {
        if self.refresh_interval < MIN_REFRESH_INTERVAL {
            tracing::warn!(
                configured = ?self.refresh_interval,
                minimum = ?MIN_REFRESH_INTERVAL,
                "refresh interval below minimum, clamping"
            );
            self.refresh_interval = MIN_REFRESH_INTERVAL;
        }

        if self.clients_ttl <= MIN_CLIENTS_TTL || self.clients_ttl >= MAX_CLIENTS_TTL {
            tracing::warn!(
                configured = ?self.clients_ttl,
                default = ?DEFAULT_CLIENTS_TTL,
                "clients ttl outside accepted range, using default"
            );
            self.clients_ttl = DEFAULT_CLIENTS_TTL;
        }

        if self.fetch_timeout.is_zero() {
            return Err(ServiceError::InvalidConfig("fetch timeout must be positive".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ServiceError::InvalidConfig(
                "retry policy needs at least one attempt".into(),
            ));
        }
        if self.datacenter.is_empty() || self.datacenter.contains('/') {
            return Err(ServiceError::InvalidConfig(format!(
                "invalid datacenter {:?}",
                self.datacenter
            )));
        }
        Ok(self)
    }

    /// Namespace of this service's cached state: `{datacenter}/{org_id}/`.
    pub fn cache_key(&self) -> String {
        format!("{}/{}/", self.datacenter, self.org_id)
    }
}
