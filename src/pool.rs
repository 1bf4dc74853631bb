//! The set of resolvers queries are spread across.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use arc_swap::ArcSwap;
use rand::Rng as _;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::{PoolConfig, ResolverConfig};
use crate::error::ResolveError;
use crate::resolver::Resolver;

const DEFAULT_PORT: u16 = 53;

/// Parse a resolver address, defaulting the port to 53.
///
/// Accepts `1.2.3.4`, `1.2.3.4:5353`, `2001:db8::1`, and `[2001:db8::1]:5353`.
pub fn parse_address(address: &str) -> Result<SocketAddr, ResolveError> {
    let address = address.trim();
    if let Ok(socket) = address.parse::<SocketAddr>() {
        return Ok(socket);
    }

    let host = address
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(address);
    host.parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, DEFAULT_PORT))
        .map_err(|_| ResolveError::InvalidAddress(address.to_owned()))
}

/// A pool of resolvers that hands out an available one at random.
///
/// The pool is cheap to clone; clones share the resolver set, so a call to
/// [`ResolverPool::set_custom_resolvers`] is seen by all of them.
#[derive(Clone)]
pub struct ResolverPool {
    resolvers: Arc<ArcSwap<Vec<Resolver>>>,
    config: PoolConfig,
    resolver_config: ResolverConfig,
}

impl fmt::Debug for ResolverPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverPool")
            .field("resolvers", &self.len())
            .field("config", &self.config)
            .finish()
    }
}

impl ResolverPool {
    pub fn new(resolvers: Vec<Resolver>, config: PoolConfig, resolver_config: ResolverConfig) -> Self {
        Self {
            resolvers: Arc::new(ArcSwap::from_pointee(resolvers)),
            config,
            resolver_config,
        }
    }

    /// Start a resolver for every address. Addresses that cannot be parsed
    /// or connected are skipped with a warning.
    pub async fn connect<S: AsRef<str>>(
        addresses: &[S],
        config: PoolConfig,
        resolver_config: ResolverConfig,
    ) -> Self {
        let resolvers = connect_all(addresses, &resolver_config).await;
        Self::new(resolvers, config, resolver_config)
    }

    pub fn len(&self) -> usize {
        self.resolvers.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.load().is_empty()
    }

    /// Number of resolvers currently available.
    pub fn available(&self) -> usize {
        self.resolvers
            .load()
            .iter()
            .filter(|resolver| resolver.is_available())
            .count()
    }

    /// Addresses of every resolver in the pool.
    pub fn addresses(&self) -> Vec<SocketAddr> {
        self.resolvers.load().iter().map(Resolver::address).collect()
    }

    /// Wait for an available resolver.
    ///
    /// Random picks are tried first, then every resolver in order. When none
    /// is available the pool sleeps for the configured selection delay and
    /// tries again, so this only returns once a resolver becomes available.
    pub async fn next_resolver(&self) -> Resolver {
        loop {
            if let Some(resolver) = self.try_next() {
                return resolver;
            }
            trace!("no resolver available");
            tokio::time::sleep(self.config.selection_delay()).await;
        }
    }

    /// Like [`ResolverPool::next_resolver`], giving up once `cancel` fires.
    pub async fn next_resolver_until(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Resolver, ResolveError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(ResolveError::Cancelled),
            resolver = self.next_resolver() => Ok(resolver),
        }
    }

    /// A single non-blocking selection pass.
    pub fn try_next(&self) -> Option<Resolver> {
        let resolvers = self.resolvers.load();
        if resolvers.is_empty() {
            return None;
        }

        let mut rng = rand::rng();
        for _ in 0..resolvers.len() {
            let candidate = &resolvers[rng.random_range(0..resolvers.len())];
            if candidate.is_available() {
                return Some(candidate.clone());
            }
        }

        resolvers
            .iter()
            .find(|resolver| resolver.is_available())
            .cloned()
    }

    /// Replace every resolver in the pool.
    ///
    /// An empty list is ignored. While the old resolvers are being stopped
    /// and the new ones started the pool is empty, so selection waits.
    pub async fn set_custom_resolvers<S: AsRef<str>>(&self, addresses: &[S]) {
        if addresses.is_empty() {
            return;
        }

        let old = self.resolvers.swap(Arc::new(Vec::new()));
        for resolver in old.iter() {
            resolver.stop().await;
        }

        let resolvers = connect_all(addresses, &self.resolver_config).await;
        info!(count = resolvers.len(), "replaced resolvers");
        self.resolvers.store(Arc::new(resolvers));
    }

    /// Stop every resolver in the pool and leave it empty.
    pub async fn stop_all(&self) {
        let old = self.resolvers.swap(Arc::new(Vec::new()));
        for resolver in old.iter() {
            resolver.stop().await;
        }
    }
}

async fn connect_all<S: AsRef<str>>(addresses: &[S], config: &ResolverConfig) -> Vec<Resolver> {
    let mut resolvers = Vec::with_capacity(addresses.len());
    for address in addresses {
        let address = address.as_ref();
        let socket = match parse_address(address) {
            Ok(socket) => socket,
            Err(error) => {
                warn!(%error, "skipping resolver");
                continue;
            }
        };

        match Resolver::connect(socket, config.clone()).await {
            Ok(resolver) => {
                debug!(resolver = %socket, "connected resolver");
                resolvers.push(resolver);
            }
            Err(error) => warn!(resolver = %socket, %error, "failed to start resolver"),
        }
    }
    resolvers
}
