//! Forward, reverse, and zone-transfer lookups on top of a [`ResolverPool`].

use std::sync::Arc;

use hickory_proto::op::Query;
use hickory_proto::rr::Name;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt as _;
use tracing::{debug, trace};

use crate::config::{ClientConfiguration, RetryConfig};
use crate::error::ResolveError;
use crate::pool::ResolverPool;
use crate::resolver::ExchangeResult;
use crate::rr::RecordKind;

pub use self::reverse::{ReverseLookup, ptr_name};

mod reverse;
mod xfr;

/// A DNS client that spreads queries over a pool of resolvers and retries
/// failures that another attempt might fix.
#[derive(Debug, Clone)]
pub struct Client {
    pool: ResolverPool,
    config: Arc<ClientConfiguration>,
}

impl Client {
    /// Start a resolver for each configured address, or for the built-in
    /// public resolvers when none are configured.
    pub async fn new(config: ClientConfiguration) -> Client {
        let pool = ResolverPool::connect(
            &config.resolver_addresses(),
            config.pool.clone(),
            config.resolver.clone(),
        )
        .await;
        Client::with_pool(pool, config)
    }

    pub fn with_pool(pool: ResolverPool, config: ClientConfiguration) -> Client {
        Client {
            pool,
            config: Arc::new(config),
        }
    }

    pub fn pool(&self) -> &ResolverPool {
        &self.pool
    }

    pub fn config(&self) -> &ClientConfiguration {
        &self.config
    }

    /// Replace the resolvers used by this client. Addresses without a port
    /// use port 53, and an empty list leaves the pool unchanged.
    pub async fn set_custom_resolvers<S: AsRef<str>>(&self, addresses: &[S]) {
        self.pool.set_custom_resolvers(addresses).await;
    }

    /// Look up `name` for the record type named by `mnemonic`.
    pub async fn resolve(&self, name: &str, mnemonic: &str) -> ExchangeResult {
        self.resolve_until(name, mnemonic, &CancellationToken::new())
            .await
    }

    /// Like [`Client::resolve`], giving up with [`ResolveError::Cancelled`]
    /// once `cancel` fires.
    #[tracing::instrument(skip_all, fields(dns.name = %name, dns.type = %mnemonic), level = "debug")]
    pub async fn resolve_until(
        &self,
        name: &str,
        mnemonic: &str,
        cancel: &CancellationToken,
    ) -> ExchangeResult {
        let kind: RecordKind = mnemonic.parse()?;
        let query = Query::query(query_name(name)?, kind.record_type());

        with_retries(&self.config.retry, cancel, |attempt| {
            let query = query.clone();
            async move {
                let resolver = self.pool.next_resolver_until(cancel).await?;
                trace!(attempt, resolver = %resolver.address(), "sending query");
                tokio::select! {
                    _ = cancel.cancelled() => Err(ResolveError::Cancelled),
                    result = resolver.oneshot(query) => result,
                }
            }
        })
        .await
    }

    /// Stop every resolver. Pending queries fail with [`ResolveError::Stopped`].
    pub async fn shutdown(&self) {
        self.pool.stop_all().await;
    }
}

fn query_name(name: &str) -> Result<Name, ResolveError> {
    let mut parsed = Name::from_ascii(name).map_err(|source| ResolveError::InvalidName {
        name: name.to_owned(),
        source,
    })?;
    parsed.set_fqdn(true);
    Ok(parsed)
}

/// Run `attempt` until it succeeds, fails terminally, or the retry budget is
/// spent. Retryable failures sleep for a linearly growing backoff between
/// attempts; the last failure is returned once attempts run out.
async fn with_retries<F, Fut>(
    retry: &RetryConfig,
    cancel: &CancellationToken,
    mut attempt: F,
) -> ExchangeResult
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = ExchangeResult>,
{
    let attempts = retry.max_attempts();
    let mut last = None;

    for n in 0..attempts {
        match attempt(n).await {
            Ok(answers) => return Ok(answers),
            Err(error) if error.is_retryable() => {
                debug!(attempt = n + 1, %error, "retryable failure");
                last = Some(error);
                if n + 1 < attempts {
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(ResolveError::Cancelled),
                        _ = tokio::time::sleep(retry.backoff(n)) => {}
                    }
                }
            }
            Err(error) => return Err(error),
        }
    }

    Err(last.unwrap_or(ResolveError::Cancelled))
}
