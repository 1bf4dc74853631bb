//! Configuration for the resolver pool and lookups.
//!
//! All durations are expressed in milliseconds when deserialized, and every
//! field has a default, so an empty document is a valid configuration.

use std::time::Duration;

use serde::Deserialize;

/// Public & free DNS servers, used when no resolvers are configured.
pub const PUBLIC_RESOLVERS: &[&str] = &[
    "1.1.1.1:53",        // Cloudflare
    "8.8.8.8:53",        // Google
    "209.244.0.3:53",    // Level3
    "64.6.64.6:53",      // Verisign
    "77.88.8.8:53",      // Yandex.DNS
    "74.82.42.42:53",    // Hurricane Electric
    "45.77.165.194:53",  // Fourth Estate
    "91.239.100.100:53", // UncensoredDNS
    "1.0.0.1:53",        // Cloudflare Secondary
    "8.8.4.4:53",        // Google Secondary
    "9.9.9.10:53",       // Quad9 Secondary
    "209.244.0.4:53",    // Level3 Secondary
    "64.6.65.6:53",      // Verisign Secondary
    "77.88.8.1:53",      // Yandex.DNS Secondary
    "89.233.43.71:53",   // UncensoredDNS Secondary
];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClientConfiguration {
    /// Resolver addresses, with or without a port. Empty means [`PUBLIC_RESOLVERS`].
    pub resolvers: Vec<String>,
    pub resolver: ResolverConfig,
    pub pool: PoolConfig,
    pub retry: RetryConfig,
    pub transfer: TransferConfig,
}

impl ClientConfiguration {
    pub fn resolver_addresses(&self) -> Vec<String> {
        if self.resolvers.is_empty() {
            PUBLIC_RESOLVERS.iter().map(|s| (*s).to_owned()).collect()
        } else {
            self.resolvers.clone()
        }
    }
}

/// Tuning for a single resolver and its background tasks.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    window_ms: u64,
    transaction_timeout_ms: u64,
    sweep_interval_ms: u64,
    sample_threshold: usize,
    failure_ratio: f64,
    dispatch_capacity: usize,
    inbound_capacity: usize,
    shutdown_grace_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            window_ms: 2_000,
            transaction_timeout_ms: 1_000,
            sweep_interval_ms: 1_000,
            sample_threshold: 50,
            failure_ratio: 0.10,
            dispatch_capacity: 100,
            inbound_capacity: 1_000,
            shutdown_grace_ms: 1_000,
        }
    }
}

impl ResolverConfig {
    /// Length of the health window, also used as the socket write deadline.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms.max(1))
    }

    /// How long a sent query may wait for its response.
    pub fn transaction_timeout(&self) -> Duration {
        Duration::from_millis(self.transaction_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }

    /// Minimum number of exchanges in a window before a resolver can be
    /// marked unavailable.
    pub fn sample_threshold(&self) -> usize {
        self.sample_threshold
    }

    /// Error ratio above which a resolver is marked unavailable.
    pub fn failure_ratio(&self) -> f64 {
        self.failure_ratio
    }

    pub fn dispatch_capacity(&self) -> usize {
        self.dispatch_capacity.max(1)
    }

    pub fn inbound_capacity(&self) -> usize {
        self.inbound_capacity.max(1)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window_ms = window.as_millis() as u64;
        self
    }

    pub fn with_transaction_timeout(mut self, timeout: Duration) -> Self {
        self.transaction_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace_ms = grace.as_millis() as u64;
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    selection_delay_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            selection_delay_ms: 500,
        }
    }
}

impl PoolConfig {
    /// How long selection sleeps when every resolver is unavailable.
    pub fn selection_delay(&self) -> Duration {
        Duration::from_millis(self.selection_delay_ms.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    max_attempts: u32,
    backoff_step_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff_step_ms: 100,
        }
    }
}

impl RetryConfig {
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay before the attempt following `attempt` (zero based), growing linearly.
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_step_ms) * (attempt + 1)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    connect_timeout_ms: u64,
    read_timeout_ms: u64,
    port: u16,
    source: String,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            read_timeout_ms: 10_000,
            port: 53,
            source: "DNS Zone XFR".to_owned(),
        }
    }
}

impl TransferConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Source label attached to discoveries from zone transfers.
    pub fn source(&self) -> &str {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ClientConfiguration::default();
        assert_eq!(config.resolver.window(), Duration::from_secs(2));
        assert_eq!(config.resolver.transaction_timeout(), Duration::from_secs(1));
        assert_eq!(config.resolver.sample_threshold(), 50);
        assert_eq!(config.resolver.dispatch_capacity(), 100);
        assert_eq!(config.pool.selection_delay(), Duration::from_millis(500));
        assert_eq!(config.retry.max_attempts(), 10);
        assert_eq!(config.transfer.port(), 53);
        assert_eq!(config.transfer.source(), "DNS Zone XFR");
    }

    #[test]
    fn linear_backoff() {
        let retry = RetryConfig::default();
        assert_eq!(retry.backoff(0), Duration::from_millis(100));
        assert_eq!(retry.backoff(4), Duration::from_millis(500));
    }

    #[test]
    fn empty_resolvers_fall_back_to_public() {
        let config = ClientConfiguration::default();
        assert_eq!(config.resolver_addresses().len(), PUBLIC_RESOLVERS.len());

        let config = ClientConfiguration {
            resolvers: vec!["192.0.2.53".to_owned()],
            ..Default::default()
        };
        assert_eq!(config.resolver_addresses(), vec!["192.0.2.53".to_owned()]);
    }

    #[test]
    fn partial_documents_deserialize() {
        let config: ClientConfiguration = serde_json::from_str(
            r#"{"resolvers": ["9.9.9.9"], "retry": {"max_attempts": 3}, "resolver": {"window_ms": 500}}"#,
        )
        .unwrap();
        assert_eq!(config.resolvers, vec!["9.9.9.9".to_owned()]);
        assert_eq!(config.retry.max_attempts(), 3);
        assert_eq!(config.retry.backoff(0), Duration::from_millis(100));
        assert_eq!(config.resolver.window(), Duration::from_millis(500));
        assert_eq!(config.resolver.transaction_timeout(), Duration::from_secs(1));
    }
}
