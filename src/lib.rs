//! Fault-tolerant DNS lookups over a pool of unreliable public resolvers.

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod pool;
mod queue;
pub mod resolver;
pub mod rr;

pub use self::client::{Client, ReverseLookup};
pub use self::config::ClientConfiguration;
pub use self::error::{ResolveError, TransferError};
pub use self::pool::ResolverPool;
pub use self::resolver::{ExchangeFuture, ExchangeResult, Resolver};
pub use self::rr::{Answer, Discovery, RecordKind, Tag};
