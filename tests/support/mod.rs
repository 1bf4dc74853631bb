#![allow(unused)]

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr as _;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use dragnet_dns::codec::DnsCodec;
use futures::{SinkExt as _, StreamExt as _};
use hickory_proto::op::{Message, MessageType, OpCode, ResponseCode};
use hickory_proto::rr::rdata::{A, PTR, SOA, TXT};
use hickory_proto::rr::{Name, RData, Record};
use hickory_proto::serialize::binary::{BinDecodable as _, BinEncodable as _};
use hickory_proto::xfer::Protocol;
use tokio::net::{TcpListener, UdpSocket};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

/// Registers a global default tracing subscriber when called for the first time. This is intended
/// for use in tests.
pub fn subscribe() {
    static INSTALL_TRACING_SUBSCRIBER: Once = Once::new();
    INSTALL_TRACING_SUBSCRIBER.call_once(|| {
        let subscriber = tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .finish();
        tracing::subscriber::set_global_default(subscriber).unwrap();
    });
}

/// What the scripted server does with a query.
pub enum Script {
    Reply(Message),
    Delayed(Message, Duration),
    Drop,
}

/// A UDP DNS server on localhost that answers according to a handler.
pub struct ScriptedServer {
    address: SocketAddr,
    queries: Arc<AtomicUsize>,
    ids: Arc<Mutex<Vec<u16>>>,
    task: JoinHandle<()>,
}

impl ScriptedServer {
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&Message) -> Script + Send + Sync + 'static,
    {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let address = socket.local_addr().unwrap();
        let queries = Arc::new(AtomicUsize::new(0));
        let ids = Arc::new(Mutex::new(Vec::new()));

        let task = tokio::spawn({
            let queries = queries.clone();
            let ids = ids.clone();
            async move {
                let mut buf = vec![0u8; 4096];
                loop {
                    let Ok((len, peer)) = socket.recv_from(&mut buf).await else {
                        return;
                    };
                    let Ok(request) = Message::from_bytes(&buf[..len]) else {
                        continue;
                    };
                    queries.fetch_add(1, Ordering::SeqCst);
                    ids.lock().unwrap().push(request.id());

                    match handler(&request) {
                        Script::Reply(response) => {
                            let bytes = response.to_bytes().unwrap();
                            let _ = socket.send_to(&bytes, peer).await;
                        }
                        Script::Delayed(response, delay) => {
                            let socket = socket.clone();
                            tokio::spawn(async move {
                                tokio::time::sleep(delay).await;
                                let bytes = response.to_bytes().unwrap();
                                let _ = socket.send_to(&bytes, peer).await;
                            });
                        }
                        Script::Drop => {}
                    }
                }
            }
        });

        Self {
            address,
            queries,
            ids,
            task,
        }
    }

    /// A server that never answers.
    pub async fn silent() -> Self {
        Self::start(|_| Script::Drop).await
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Number of well-formed queries received so far.
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Transaction IDs of every query received, in arrival order.
    pub fn ids(&self) -> Vec<u16> {
        self.ids.lock().unwrap().clone()
    }
}

impl Drop for ScriptedServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// A TCP server on localhost that answers every AXFR with the same envelopes.
pub struct TransferServer {
    address: SocketAddr,
    task: JoinHandle<()>,
}

impl TransferServer {
    pub async fn start(envelopes: Vec<Message>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let envelopes = envelopes.clone();
                tokio::spawn(async move {
                    let mut framed = Framed::new(stream, DnsCodec::new_for_protocol(Protocol::Tcp));
                    let Some(Ok(request)) = framed.next().await else {
                        return;
                    };
                    for mut envelope in envelopes {
                        envelope.set_id(request.id());
                        envelope.add_queries(request.queries().to_vec());
                        if framed.send(envelope).await.is_err() {
                            return;
                        }
                    }
                });
            }
        });

        Self { address, task }
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }
}

impl Drop for TransferServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub fn name(name: &str) -> Name {
    Name::from_str(name).unwrap()
}

/// A response to `request` carrying `answers`.
pub fn reply(request: &Message, code: ResponseCode, answers: Vec<Record>) -> Message {
    let mut response = Message::new();
    response
        .set_id(request.id())
        .set_message_type(MessageType::Response)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(request.recursion_desired())
        .set_recursion_available(true)
        .set_response_code(code)
        .add_queries(request.queries().to_vec())
        .add_answers(answers);
    response
}

/// The name of the first question in `request`.
pub fn question(request: &Message) -> String {
    request
        .queries()
        .first()
        .map(|query| query.name().to_string())
        .unwrap_or_default()
}

pub fn a_record(owner: &str, address: &str) -> Record {
    let IpAddr::V4(v4) = address.parse().unwrap() else {
        panic!("not an IPv4 address: {address}");
    };
    Record::from_rdata(name(owner), 300, RData::A(A(v4)))
}

pub fn txt_record(owner: &str, text: &str) -> Record {
    Record::from_rdata(name(owner), 300, RData::TXT(TXT::new(vec![text.to_owned()])))
}

pub fn ptr_record(owner: &str, target: &str) -> Record {
    Record::from_rdata(name(owner), 300, RData::PTR(PTR(self::name(target))))
}

pub fn soa_record(owner: &str) -> Record {
    let soa = SOA::new(
        name("ns1.example.com."),
        name("hostmaster.example.com."),
        2024010101,
        7200,
        3600,
        1209600,
        300,
    );
    Record::from_rdata(name(owner), 300, RData::SOA(soa))
}

/// An AXFR response envelope carrying `records`.
pub fn envelope(code: ResponseCode, records: Vec<Record>) -> Message {
    let mut message = Message::new();
    message
        .set_message_type(MessageType::Response)
        .set_op_code(OpCode::Query)
        .set_authoritative(true)
        .set_response_code(code)
        .add_answers(records);
    message
}
