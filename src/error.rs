use std::io;
use std::net::SocketAddr;

use hickory_proto::ProtoError;
use hickory_proto::op::ResponseCode;
use hickory_proto::rr::RecordType;

use crate::codec::CodecError;

/// Failure of a single DNS query.
///
/// Every variant is classified as either retryable (the query may succeed
/// against the same or another resolver) or terminal, see
/// [`ResolveError::is_retryable`].
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("DNS message type '{0}' not supported")]
    UnsupportedType(String),

    #[error("Invalid DNS name {name}: {source}")]
    InvalidName {
        name: String,
        #[source]
        source: ProtoError,
    },

    #[error("Invalid IP address parameter: {0}")]
    InvalidAddress(String),

    #[error("DNS error: Failed to write query msg: {0}")]
    Send(#[source] io::Error),

    #[error("DNS error: Failed to encode query msg: {0}")]
    Encode(#[source] CodecError),

    #[error("DNS query for {name}, type {record_type} timed out")]
    Timeout {
        name: String,
        record_type: RecordType,
    },

    #[error("DNS query for {name}, type {record_type} returned error {code}")]
    Response {
        name: String,
        record_type: RecordType,
        code: ResponseCode,
    },

    #[error("DNS query for {name}, type {record_type} returned 0 records")]
    NoRecords {
        name: String,
        record_type: RecordType,
    },

    #[error("No free transaction IDs on resolver {0}")]
    IdsExhausted(SocketAddr),

    #[error("Resolver {0} stopped")]
    Stopped(SocketAddr),

    #[error("PTR record not found for IP address: {0}")]
    PtrNotFound(String),

    #[error("Invalid target in PTR record answer: {0}")]
    InvalidPtrTarget(String),

    #[error("DNS query cancelled")]
    Cancelled,
}

impl ResolveError {
    /// Whether the query should be attempted again, possibly on another resolver.
    pub fn is_retryable(&self) -> bool {
        match self {
            ResolveError::Send(_)
            | ResolveError::Encode(_)
            | ResolveError::Timeout { .. }
            | ResolveError::IdsExhausted(_) => true,
            ResolveError::Response { code, .. } => *code != ResponseCode::NXDomain,
            _ => false,
        }
    }
}

/// Failure of a whole zone transfer.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("DNS server has no A or AAAA record: {server}: {source}")]
    NoAddress {
        server: String,
        #[source]
        source: ResolveError,
    },

    #[error("Invalid zone name {zone}: {source}")]
    InvalidZone {
        zone: String,
        #[source]
        source: ProtoError,
    },

    #[error("Zone xfr error: Failed to obtain TCP connection to {address}: {source}")]
    Connect {
        address: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Zone xfr error: Timed out connecting to {0}")]
    ConnectTimeout(SocketAddr),

    #[error("DNS zone transfer error: {address}: {source}")]
    Protocol {
        address: SocketAddr,
        #[source]
        source: CodecError,
    },

    #[error("DNS zone transfer cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_codes_are_classified() {
        let servfail = ResolveError::Response {
            name: "example.com".into(),
            record_type: RecordType::A,
            code: ResponseCode::ServFail,
        };
        let nxdomain = ResolveError::Response {
            name: "example.com".into(),
            record_type: RecordType::A,
            code: ResponseCode::NXDomain,
        };
        assert!(servfail.is_retryable());
        assert!(!nxdomain.is_retryable());
    }

    #[test]
    fn terminal_errors() {
        assert!(!ResolveError::UnsupportedType("HINFO".into()).is_retryable());
        assert!(
            !ResolveError::NoRecords {
                name: "example.com".into(),
                record_type: RecordType::MX,
            }
            .is_retryable()
        );
        assert!(!ResolveError::Stopped("127.0.0.1:53".parse().unwrap()).is_retryable());
        assert!(!ResolveError::Cancelled.is_retryable());
    }

    #[test]
    fn timeouts_are_retryable() {
        let error = ResolveError::Timeout {
            name: "example.com".into(),
            record_type: RecordType::AAAA,
        };
        assert!(error.is_retryable());
        assert_eq!(
            error.to_string(),
            "DNS query for example.com, type AAAA timed out"
        );
    }
}
