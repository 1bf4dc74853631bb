use std::fmt;

use bytes::{Buf, BufMut, BytesMut};
use hickory_proto::ProtoError;
use hickory_proto::op::Message;
use hickory_proto::serialize::binary::{BinDecodable, BinDecoder, BinEncodable, BinEncoder};
use hickory_proto::udp::MAX_RECEIVE_BUFFER_SIZE;
use hickory_proto::xfer::Protocol;
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

/// The wire codec for standard DNS messages defined in RFC 1035.
///
/// Over TCP every message is preceded by a two byte length marker, over UDP
/// a datagram carries exactly one message.
pub struct DnsCodec {
    length_delimited: bool,
    max_message_size: u16,
}

impl fmt::Debug for DnsCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DnsCodec")
            .field("length_delimited", &self.length_delimited)
            .field("max_message_size", &self.max_message_size)
            .finish()
    }
}

impl Clone for DnsCodec {
    fn clone(&self) -> Self {
        Self {
            length_delimited: self.length_delimited,
            max_message_size: self.max_message_size,
        }
    }
}

impl DnsCodec {
    pub fn new_for_protocol(protocol: Protocol) -> Self {
        match protocol {
            Protocol::Tcp => Self::new(true, u16::MAX),
            _ => Self::new(false, MAX_RECEIVE_BUFFER_SIZE as u16),
        }
    }

    pub fn new(length_delimited: bool, max_message_size: u16) -> Self {
        Self {
            length_delimited,
            max_message_size,
        }
    }

    fn parse_length(&mut self, src: &mut BytesMut) -> Option<usize> {
        if src.len() < 2 {
            // Not enough data to read length marker
            return None;
        }

        let mut length_bytes = [0u8; 2];
        length_bytes.copy_from_slice(&src[..2]);
        let length = u16::from_be_bytes(length_bytes) as usize;

        if src.len() < (length + 2) {
            src.reserve((length + 2) - src.len());
            // Not enough data to read entire message
            return None;
        }
        trace!("decode len={length}");
        src.advance(2);
        Some(length)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Failed to decode message, dropping")]
    DropMessage(#[source] ProtoError, usize),

    #[error("Invalid message: {0}")]
    Protocol(#[source] ProtoError),

    #[error(transparent)]
    IO(#[from] std::io::Error),
}

impl Decoder for DnsCodec {
    type Item = Message;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let length = if self.length_delimited {
            match self.parse_length(src) {
                Some(length) => length,
                None => return Ok(None),
            }
        } else {
            src.len()
        };

        if src.is_empty() {
            // No data to decode.
            return Ok(None);
        }

        trace!("decode buffer={}", src.len());

        let result = {
            let mut decoder = BinDecoder::new(&src[..length]);
            Message::read(&mut decoder)
        };
        // The frame is consumed either way so a bad message never wedges the stream.
        src.advance(length);
        result
            .map(Some)
            .map_err(|error| CodecError::DropMessage(error, length))
    }
}

impl Encoder<Message> for DnsCodec {
    type Error = CodecError;

    fn encode(&mut self, message: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        trace!(id = message.id(), "encoding query");
        let mut buffer = Vec::with_capacity(512);
        {
            let mut encoder = BinEncoder::new(&mut buffer);
            encoder.set_max_size(self.max_message_size);
            message.emit(&mut encoder)
        }
        .map_err(CodecError::Protocol)?;

        if self.length_delimited {
            dst.reserve(buffer.len() + 2);
            dst.put(u16::to_be_bytes(buffer.len() as u16).as_slice());
        } else {
            dst.reserve(buffer.len());
        }

        dst.put(&*buffer);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use hickory_proto::op::{Query, ResponseCode};
    use hickory_proto::rr::{Name, RecordType};

    fn query_message(id: u16) -> Message {
        let mut message = Message::new();
        message.set_id(id).add_query(Query::query(
            Name::from_ascii("example.com.").unwrap(),
            RecordType::A,
        ));
        message
    }

    #[test]
    fn tcp_frames_carry_length_prefix() {
        let mut codec = DnsCodec::new_for_protocol(Protocol::Tcp);
        let mut buf = BytesMut::new();
        codec.encode(query_message(7), &mut buf).unwrap();

        let length = u16::from_be_bytes([buf[0], buf[1]]) as usize;
        assert_eq!(length + 2, buf.len());

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.id(), 7);
        assert!(buf.is_empty());
    }

    #[test]
    fn tcp_partial_frame_waits_for_more() {
        let mut codec = DnsCodec::new_for_protocol(Protocol::Tcp);
        let mut full = BytesMut::new();
        codec.encode(query_message(9), &mut full).unwrap();

        let mut partial = BytesMut::from(&full[..full.len() - 3]);
        assert!(codec.decode(&mut partial).unwrap().is_none());
    }

    #[test]
    fn udp_garbage_is_dropped() {
        let mut codec = DnsCodec::new_for_protocol(Protocol::Udp);
        let mut buf = BytesMut::from(&[0xffu8, 0x00, 0x01][..]);
        let error = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(error, CodecError::DropMessage(_, 3)));
        assert!(buf.is_empty());
    }

    #[test]
    fn udp_round_trip_keeps_response_code() {
        let mut codec = DnsCodec::new_for_protocol(Protocol::Udp);
        let mut message = query_message(11);
        message.set_response_code(ResponseCode::ServFail);

        let mut buf = BytesMut::new();
        codec.encode(message, &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.response_code(), ResponseCode::ServFail);
    }
}
