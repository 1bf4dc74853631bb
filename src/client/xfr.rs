use std::net::{IpAddr, SocketAddr};

use futures::{SinkExt as _, StreamExt as _};
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{Name, RecordType};
use hickory_proto::xfer::Protocol;
use rand::Rng as _;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::codec::DnsCodec;
use crate::error::{ResolveError, TransferError};
use crate::rr::{Answer, Discovery, Tag, trim_root};

use super::Client;

impl Client {
    /// Transfer `zone` from the nameserver `server` and group the records by
    /// owner name. `server` may be a hostname or an IP address.
    pub async fn zone_transfer(
        &self,
        zone: &str,
        domain: &str,
        server: &str,
    ) -> Result<Vec<Discovery>, TransferError> {
        self.zone_transfer_until(zone, domain, server, &CancellationToken::new())
            .await
    }

    #[tracing::instrument(skip_all, fields(dns.name = %zone, dns.type = "AXFR", %server), level = "debug")]
    pub async fn zone_transfer_until(
        &self,
        zone: &str,
        domain: &str,
        server: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Discovery>, TransferError> {
        let ip = self.server_address(server, cancel).await?;
        let address = SocketAddr::new(ip, self.config.transfer.port());

        tokio::select! {
            _ = cancel.cancelled() => Err(TransferError::Cancelled),
            discoveries = self.transfer_from(address, zone, domain) => discoveries,
        }
    }

    async fn server_address(
        &self,
        server: &str,
        cancel: &CancellationToken,
    ) -> Result<IpAddr, TransferError> {
        if let Ok(ip) = trim_root(server).parse::<IpAddr>() {
            return Ok(ip);
        }

        let answers = match self.resolve_until(server, "A", cancel).await {
            Ok(answers) => answers,
            Err(ResolveError::Cancelled) => return Err(TransferError::Cancelled),
            Err(error) => {
                trace!(%error, "no A record for nameserver, trying AAAA");
                match self.resolve_until(server, "AAAA", cancel).await {
                    Ok(answers) => answers,
                    Err(ResolveError::Cancelled) => return Err(TransferError::Cancelled),
                    Err(source) => {
                        return Err(TransferError::NoAddress {
                            server: server.to_owned(),
                            source,
                        });
                    }
                }
            }
        };

        answers
            .iter()
            .find_map(|answer| answer.data().parse::<IpAddr>().ok())
            .ok_or_else(|| TransferError::NoAddress {
                server: server.to_owned(),
                source: ResolveError::NoRecords {
                    name: trim_root(server).to_owned(),
                    record_type: RecordType::A,
                },
            })
    }

    /// Run an AXFR for `zone` against the nameserver at `address`.
    ///
    /// Envelopes that fail to decode, carry an error code, or do not arrive
    /// within the read timeout end the transfer; the records collected so far
    /// are still returned.
    pub async fn transfer_from(
        &self,
        address: SocketAddr,
        zone: &str,
        domain: &str,
    ) -> Result<Vec<Discovery>, TransferError> {
        let config = &self.config.transfer;
        let mut name = Name::from_ascii(zone).map_err(|source| TransferError::InvalidZone {
            zone: zone.to_owned(),
            source,
        })?;
        name.set_fqdn(true);

        let stream = match tokio::time::timeout(config.connect_timeout(), TcpStream::connect(address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(TransferError::Connect { address, source }),
            Err(_) => return Err(TransferError::ConnectTimeout(address)),
        };
        let mut framed = Framed::new(stream, DnsCodec::new_for_protocol(Protocol::Tcp));

        let mut request = Message::new();
        request
            .set_id(rand::rng().random())
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query)
            .add_query(Query::query(name, RecordType::AXFR));
        framed
            .send(request)
            .await
            .map_err(|source| TransferError::Protocol { address, source })?;

        let mut answers = Vec::new();
        let mut soa_seen = 0usize;
        'envelopes: loop {
            let envelope = match tokio::time::timeout(config.read_timeout(), framed.next()).await {
                Ok(Some(Ok(envelope))) => envelope,
                Ok(Some(Err(error))) => {
                    debug!(%error, "discarding transfer envelope");
                    break;
                }
                Ok(None) => break,
                Err(_) => {
                    debug!(%address, "zone transfer read timed out");
                    break;
                }
            };

            if envelope.response_code() != ResponseCode::NoError {
                debug!(code = %envelope.response_code(), "zone transfer refused");
                break;
            }

            for record in envelope.answers() {
                if record.record_type() == RecordType::SOA {
                    soa_seen += 1;
                    // the closing SOA repeats the opening one
                    if soa_seen > 1 {
                        break 'envelopes;
                    }
                }
                if let Some(answer) = Answer::from_transfer(record) {
                    answers.push(answer);
                }
            }
        }

        trace!(records = answers.len(), "zone transfer complete");
        Ok(Discovery::group(answers, domain, Tag::Axfr, config.source()))
    }
}
