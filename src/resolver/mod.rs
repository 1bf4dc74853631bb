//! A single upstream DNS resolver.
//!
//! Each [`Resolver`] owns one connected UDP socket and five background tasks:
//! the health monitor, the pacer, the exchange loop, the socket reader, and the
//! timeout sweeper. Queries are appended to an unbounded pending queue and the
//! caller gets back an [`ExchangeFuture`] that settles exactly once, with the
//! answers, a DNS error, a timeout, or [`ResolveError::Stopped`] once the
//! resolver has been shut down.

use std::fmt;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use hickory_proto::op::{Message, Query};
use pin_project::pin_project;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ResolverConfig;
use crate::error::ResolveError;
use crate::queue::Queue;
use crate::rr::{Answer, RecordKind, trim_root};

use self::exchange::ExchangeLoop;
use self::health::HealthMonitor;
use self::inflight::InFlight;

mod exchange;
mod health;
mod inflight;
mod pacer;
mod sweeper;

/// The outcome of one DNS exchange.
pub type ExchangeResult = Result<Vec<Answer>, ResolveError>;

/// A query waiting for its result, either in the pending queue or in flight.
#[derive(Debug)]
pub(crate) struct Request {
    query: Query,
    name: String,
    kind: RecordKind,
    sent: Option<Instant>,
    result: oneshot::Sender<ExchangeResult>,
}

impl Request {
    pub(crate) fn new(
        query: Query,
        kind: RecordKind,
        result: oneshot::Sender<ExchangeResult>,
    ) -> Self {
        let name = trim_root(&query.name().to_string()).to_owned();
        Self {
            query,
            name,
            kind,
            sent: None,
            result,
        }
    }

    /// The queried name without its root dot.
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn kind(&self) -> RecordKind {
        self.kind
    }

    pub(crate) fn query(&self) -> &Query {
        &self.query
    }

    /// Whether `response` answers this query: the first question must carry
    /// the same name (ignoring case), type and class.
    pub(crate) fn is_answered_by(&self, response: &Message) -> bool {
        response.queries().first().is_some_and(|question| {
            question.query_type() == self.query.query_type()
                && question.query_class() == self.query.query_class()
                && trim_root(&question.name().to_string()).eq_ignore_ascii_case(&self.name)
        })
    }

    pub(crate) fn mark_sent(&mut self, at: Instant) {
        self.sent = Some(at);
    }

    pub(crate) fn is_expired(&self, now: Instant, timeout: Duration) -> bool {
        self.sent
            .is_some_and(|sent| now.saturating_duration_since(sent) > timeout)
    }

    /// Deliver the result. A caller that stopped waiting is ignored.
    pub(crate) fn respond(self, result: ExchangeResult) {
        let _ = self.result.send(result);
    }

    pub(crate) fn fail(self, error: ResolveError) {
        self.respond(Err(error));
    }
}

/// State shared between a resolver handle and its background tasks.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) address: SocketAddr,
    pub(crate) config: ResolverConfig,
    pub(crate) health: HealthMonitor,
    pub(crate) queue: Queue<Request>,
    pub(crate) inflight: InFlight,
    pub(crate) shutdown: CancellationToken,
}

impl Shared {
    /// Fail everything still queued or in flight.
    fn fail_pending(&self) -> usize {
        let mut failed = 0;
        for request in self.queue.drain() {
            request.fail(ResolveError::Stopped(self.address));
            failed += 1;
        }
        for request in self.inflight.drain() {
            request.fail(ResolveError::Stopped(self.address));
            failed += 1;
        }
        failed
    }
}

#[derive(Debug)]
struct Inner {
    shared: Arc<Shared>,
    tasks: Mutex<Option<JoinSet<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}

/// Handle to a running resolver. Clones share the same socket and tasks.
#[derive(Debug, Clone)]
pub struct Resolver {
    inner: Arc<Inner>,
}

impl Resolver {
    /// Open a UDP socket connected to `address` and start the resolver tasks.
    pub async fn connect(address: SocketAddr, config: ResolverConfig) -> io::Result<Self> {
        let bind = if address.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(bind).await?;
        socket.connect(address).await?;
        Self::from_socket(socket, config)
    }

    /// Start a resolver on an already connected socket.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_socket(socket: UdpSocket, config: ResolverConfig) -> io::Result<Self> {
        let address = socket.peer_addr()?;
        let socket = Arc::new(socket);

        let shared = Arc::new(Shared {
            address,
            health: HealthMonitor::new(&config),
            config,
            queue: Queue::new(),
            inflight: InFlight::new(),
            shutdown: CancellationToken::new(),
        });

        let (dispatch_tx, dispatch_rx) = mpsc::channel(shared.config.dispatch_capacity());
        let (inbound_tx, inbound_rx) = mpsc::channel(shared.config.inbound_capacity());

        let mut tasks = JoinSet::new();
        tasks.spawn(health::monitor(shared.clone()));
        tasks.spawn(pacer::pace(shared.clone(), dispatch_tx));
        tasks.spawn(ExchangeLoop::new(shared.clone(), socket.clone()).run(dispatch_rx, inbound_rx));
        tasks.spawn(exchange::read_messages(shared.clone(), socket, inbound_tx));
        tasks.spawn(sweeper::sweep(shared.clone()));

        debug!(resolver = %address, "resolver started");
        Ok(Self {
            inner: Arc::new(Inner {
                shared,
                tasks: Mutex::new(Some(tasks)),
            }),
        })
    }

    pub fn address(&self) -> SocketAddr {
        self.inner.shared.address
    }

    /// Whether the last health window judged this resolver usable.
    pub fn is_available(&self) -> bool {
        self.inner.shared.health.is_available()
    }

    /// Number of queries sent and still awaiting a response.
    pub fn in_flight(&self) -> usize {
        self.inner.shared.inflight.len()
    }

    /// Number of queries waiting to be sent.
    pub fn queued(&self) -> usize {
        self.inner.shared.queue.len()
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.shared.shutdown.is_cancelled()
    }

    #[cfg(test)]
    pub(crate) fn health(&self) -> &HealthMonitor {
        &self.inner.shared.health
    }

    /// Queue `query` and wait for its result.
    ///
    /// Only the record kinds in [`RecordKind::ALL`] can be queried, anything
    /// else fails immediately with [`ResolveError::UnsupportedType`].
    pub fn exchange(&self, query: Query) -> ExchangeFuture {
        let shared = &self.inner.shared;
        let Some(kind) = RecordKind::from_code(u16::from(query.query_type())) else {
            return ExchangeFuture::failed(
                ResolveError::UnsupportedType(query.query_type().to_string()),
                shared.address,
            );
        };

        if shared.shutdown.is_cancelled() {
            return ExchangeFuture::failed(ResolveError::Stopped(shared.address), shared.address);
        }

        let (tx, rx) = oneshot::channel();
        shared.queue.append(Request::new(query, kind, tx));

        // stop() may have drained the queue between the check and the append
        if shared.shutdown.is_cancelled() {
            shared.fail_pending();
        }

        ExchangeFuture::waiting(rx, shared.address)
    }

    /// Like [`Resolver::exchange`], giving up with [`ResolveError::Cancelled`]
    /// once `cancel` fires. A query already sent stays in flight until it is
    /// answered or times out.
    pub async fn exchange_until(&self, query: Query, cancel: &CancellationToken) -> ExchangeResult {
        tokio::select! {
            _ = cancel.cancelled() => Err(ResolveError::Cancelled),
            result = self.exchange(query) => result,
        }
    }

    /// Stop the background tasks and fail every pending query.
    ///
    /// Tasks get [`ResolverConfig::shutdown_grace`] to exit before they are
    /// aborted. Stopping twice is harmless.
    pub async fn stop(&self) {
        let shared = &self.inner.shared;
        shared.shutdown.cancel();

        let tasks = self.inner.tasks.lock().expect("poisoned").take();
        if let Some(mut tasks) = tasks {
            let drained = tokio::time::timeout(shared.config.shutdown_grace(), async {
                while tasks.join_next().await.is_some() {}
            })
            .await;

            if drained.is_err() {
                warn!(resolver = %shared.address, "resolver tasks did not stop in time, aborting");
                tasks.abort_all();
            }
        }

        let failed = shared.fail_pending();
        debug!(resolver = %shared.address, failed, "resolver stopped");
    }
}

impl tower::Service<Query> for Resolver {
    type Response = Vec<Answer>;
    type Error = ResolveError;
    type Future = ExchangeFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        if self.is_stopped() {
            Poll::Ready(Err(ResolveError::Stopped(self.address())))
        } else {
            Poll::Ready(Ok(()))
        }
    }

    fn call(&mut self, query: Query) -> Self::Future {
        self.exchange(query)
    }
}

#[pin_project(project = ExchangeStateProj)]
enum ExchangeState {
    Waiting(#[pin] oneshot::Receiver<ExchangeResult>),
    Failed(Option<ResolveError>),
}

/// Future returned by [`Resolver::exchange`].
#[pin_project]
pub struct ExchangeFuture {
    #[pin]
    state: ExchangeState,
    address: SocketAddr,
}

impl ExchangeFuture {
    fn waiting(rx: oneshot::Receiver<ExchangeResult>, address: SocketAddr) -> Self {
        Self {
            state: ExchangeState::Waiting(rx),
            address,
        }
    }

    fn failed(error: ResolveError, address: SocketAddr) -> Self {
        Self {
            state: ExchangeState::Failed(Some(error)),
            address,
        }
    }
}

impl fmt::Debug for ExchangeFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeFuture")
            .field("address", &self.address)
            .finish()
    }
}

impl Future for ExchangeFuture {
    type Output = ExchangeResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let address = *this.address;
        match this.state.project() {
            ExchangeStateProj::Waiting(rx) => rx
                .poll(cx)
                .map(|received| received.unwrap_or(Err(ResolveError::Stopped(address)))),
            ExchangeStateProj::Failed(error) => Poll::Ready(Err(error
                .take()
                .unwrap_or(ResolveError::Stopped(address)))),
        }
    }
}
