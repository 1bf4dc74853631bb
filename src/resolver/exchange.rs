//! The tasks that own a resolver's socket.
//!
//! All writes and all in-flight inserts happen on the exchange loop, so the
//! socket never sees interleaved writes and a response can never be matched
//! before its query has been recorded. A separate reader task owns socket
//! reads and forwards decoded messages to the exchange loop.

use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use bytes::BytesMut;
use hickory_proto::op::{Edns, Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata::opt::{ClientSubnet, EdnsOption};
use hickory_proto::udp::MAX_RECEIVE_BUFFER_SIZE;
use hickory_proto::xfer::Protocol;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::codec::{Decoder as _, Encoder as _};
use tracing::{debug, trace};

use crate::codec::DnsCodec;
use crate::error::ResolveError;
use crate::rr::{Answer, RecordKind};

use super::{ExchangeResult, Request, Shared};

/// Advertised EDNS(0) UDP payload size.
const UDP_PAYLOAD_SIZE: u16 = 1232;

/// Build the wire query for `query`.
///
/// Recursion is requested, AA/AD/CD are left clear, and an EDNS client-subnet
/// option of `0.0.0.0/0` keeps the querier's location out of the request.
pub(crate) fn query_message(id: u16, query: Query) -> Message {
    let mut message = Message::new();
    message
        .set_id(id)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true)
        .set_authoritative(false)
        .set_authentic_data(false)
        .set_checking_disabled(false)
        .add_query(query);

    let edns = message.extensions_mut().get_or_insert_with(Edns::new);
    edns.set_max_payload(UDP_PAYLOAD_SIZE).set_version(0);
    edns.options_mut().insert(EdnsOption::Subnet(ClientSubnet::new(
        IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        0,
        0,
    )));

    message
}

/// Turn a response into the result for the query named `name`.
pub(crate) fn classify(name: &str, kind: RecordKind, response: &Message) -> ExchangeResult {
    let code = response.response_code();
    if code != ResponseCode::NoError {
        return Err(ResolveError::Response {
            name: name.to_owned(),
            record_type: kind.record_type(),
            code,
        });
    }

    let answers: Vec<Answer> = response
        .answers()
        .iter()
        .filter_map(|record| Answer::from_response(name, kind, record))
        .collect();

    if answers.is_empty() {
        return Err(ResolveError::NoRecords {
            name: name.to_owned(),
            record_type: kind.record_type(),
        });
    }
    Ok(answers)
}

pub(crate) struct ExchangeLoop {
    shared: Arc<Shared>,
    socket: Arc<UdpSocket>,
    codec: DnsCodec,
    buffer: BytesMut,
}

impl ExchangeLoop {
    pub(crate) fn new(shared: Arc<Shared>, socket: Arc<UdpSocket>) -> Self {
        Self {
            shared,
            socket,
            codec: DnsCodec::new_for_protocol(Protocol::Udp),
            buffer: BytesMut::with_capacity(512),
        }
    }

    pub(crate) async fn run(
        mut self,
        mut dispatch: mpsc::Receiver<Request>,
        mut inbound: mpsc::Receiver<Message>,
    ) {
        let shutdown = self.shared.shutdown.clone();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(message) = inbound.recv() => self.handle_response(message),
                Some(request) = dispatch.recv() => self.send_query(request).await,
                else => break,
            }
        }

        dispatch.close();
        while let Ok(request) = dispatch.try_recv() {
            request.fail(ResolveError::Stopped(self.shared.address));
        }
    }

    async fn send_query(&mut self, mut request: Request) {
        let shared = &self.shared;
        let Some(id) = shared.inflight.allocate_id() else {
            shared.health.record_error();
            request.fail(ResolveError::IdsExhausted(shared.address));
            return;
        };

        self.buffer.clear();
        if let Err(error) = self
            .codec
            .encode(query_message(id, request.query().clone()), &mut self.buffer)
        {
            shared.health.record_error();
            request.fail(ResolveError::Encode(error));
            return;
        }

        shared.health.record_exchange();
        let deadline = shared.config.window();
        let sent = match tokio::time::timeout(deadline, self.socket.send(&self.buffer)).await {
            Ok(sent) => sent,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "write deadline exceeded",
            )),
        };

        match sent {
            Ok(_) => {
                trace!(id, name = request.name(), record_type = %request.kind(), "query sent");
                request.mark_sent(Instant::now());
                shared.inflight.insert(id, request);
            }
            Err(error) => {
                debug!(%error, resolver = %shared.address, "failed to write query");
                shared.health.record_error();
                request.fail(ResolveError::Send(error));
            }
        }
    }

    fn handle_response(&mut self, message: Message) {
        let Some(request) = self.shared.inflight.take_matching(message.id(), &message) else {
            trace!(id = message.id(), "discarding unmatched response");
            return;
        };

        let result = classify(request.name(), request.kind(), &message);
        if let Err(error) = &result {
            if error.is_retryable() {
                self.shared.health.record_error();
            }
            trace!(id = message.id(), %error, "query failed");
        }
        request.respond(result);
    }
}

/// Read datagrams off the socket and hand decoded messages to the exchange loop.
pub(crate) async fn read_messages(
    shared: Arc<Shared>,
    socket: Arc<UdpSocket>,
    inbound: mpsc::Sender<Message>,
) {
    let mut codec = DnsCodec::new_for_protocol(Protocol::Udp);
    let mut buffer = vec![0u8; MAX_RECEIVE_BUFFER_SIZE];

    loop {
        let received = tokio::select! {
            _ = shared.shutdown.cancelled() => return,
            received = socket.recv(&mut buffer) => received,
        };

        let length = match received {
            Ok(length) => length,
            Err(error) => {
                shared.health.record_error();
                debug!(%error, resolver = %shared.address, "socket read failed");
                continue;
            }
        };

        let mut frame = BytesMut::from(&buffer[..length]);
        match codec.decode(&mut frame) {
            Ok(Some(message)) => {
                let forwarded = tokio::select! {
                    _ = shared.shutdown.cancelled() => return,
                    forwarded = inbound.send(message) => forwarded,
                };
                if forwarded.is_err() {
                    return;
                }
            }
            Ok(None) => {}
            Err(error) => {
                shared.health.record_error();
                debug!(%error, resolver = %shared.address, "dropping undecodable response");
            }
        }
    }
}
