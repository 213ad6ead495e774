//! The datagram envelope: a one-byte type tag followed by opaque payload.

use crate::consts::MAX_PACKET_SIZE;
use bytes::{BufMut, Bytes, BytesMut};

/// A single datagram payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PMessage {
    pub ptype: u8,
    pub payload: Bytes,
}

impl PMessage {
    pub fn new(ptype: u8, payload: Bytes) -> Self {
        Self { ptype, payload }
    }

    /// A packet with no payload (BEAT, CLOSE).
    pub fn empty(ptype: u8) -> Self {
        Self {
            ptype,
            payload: Bytes::new(),
        }
    }

    /// Produces the datagram to put on the wire.
    pub fn encode(&self) -> Bytes {
        debug_assert!(1 + self.payload.len() <= MAX_PACKET_SIZE);
        let mut buf = BytesMut::with_capacity(1 + self.payload.len());
        buf.put_u8(self.ptype);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Splits a received datagram into tag and payload. An empty read
    /// carries no packet.
    pub fn decode(datagram: &[u8]) -> Option<PMessage> {
        let (&ptype, payload) = datagram.split_first()?;
        Some(PMessage {
            ptype,
            payload: Bytes::copy_from_slice(payload),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts;

    #[test]
    fn encode_decode_roundtrip() {
        let msg = PMessage::new(consts::MAPDATA, Bytes::from_static(b"tile"));
        let wire = msg.encode();
        assert_eq!(wire.as_ref(), b"\x05tile");
        assert_eq!(PMessage::decode(&wire).unwrap(), msg);
    }

    #[test]
    fn empty_payload_is_just_the_tag() {
        let wire = PMessage::empty(consts::BEAT).encode();
        assert_eq!(wire.as_ref(), &[consts::BEAT]);
        let decoded = PMessage::decode(&wire).unwrap();
        assert_eq!(decoded.ptype, consts::BEAT);
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn empty_datagram_is_no_packet() {
        assert_eq!(PMessage::decode(&[]), None);
    }
}
