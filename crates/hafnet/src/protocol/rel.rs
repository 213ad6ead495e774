//! Reliable-stream message bodies.
//!
//! A REL packet carries a 16-bit base sequence number followed by one or
//! more sub-messages. Each sub-message starts with a type byte; if its
//! high bit is set a 16-bit length prefix follows, otherwise the payload
//! runs to the end of the packet and the sub-message is the last one.

use bytes::{BufMut, Bytes, BytesMut};
use hearthen_binary::BinaryReader;

/// Sub-type flag marking a length-prefixed sub-message.
pub const MTYPE_PREFIXED: u8 = 0x80;

/// One message in a reliable stream. The sub-type is stored with the
/// length-prefix flag stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RMessage {
    pub seq: u16,
    pub mtype: u8,
    pub payload: Bytes,
}

impl RMessage {
    pub fn new(seq: u16, mtype: u8, payload: Bytes) -> Self {
        Self {
            seq,
            mtype: mtype & !MTYPE_PREFIXED,
            payload,
        }
    }
}

/// Splits a REL packet body into its sub-messages, assigning consecutive
/// sequence numbers from the base. A truncated sub-message abandons the
/// rest of the packet.
pub fn decode_rel(payload: Bytes) -> Vec<RMessage> {
    let mut reader = BinaryReader::new(payload);
    let mut out = Vec::new();
    let Ok(base) = reader.read_u16() else {
        return out;
    };
    let mut seq = base;
    while !reader.is_empty() {
        let Ok(mtype) = reader.read_u8() else {
            break;
        };
        let body = if mtype & MTYPE_PREFIXED != 0 {
            let Ok(len) = reader.read_u16() else {
                break;
            };
            match reader.read_bytes(len as usize) {
                Ok(body) => body,
                Err(_) => break,
            }
        } else {
            reader.read_rest()
        };
        out.push(RMessage::new(seq, mtype, body));
        seq = seq.wrapping_add(1);
    }
    out
}

/// Encodes one message as a REL packet body in the unprefixed form: the
/// payload runs to the end of the packet.
pub fn encode_rel(msg: &RMessage) -> Bytes {
    let mut buf = BytesMut::with_capacity(3 + msg.payload.len());
    buf.put_u16_le(msg.seq);
    buf.put_u8(msg.mtype & !MTYPE_PREFIXED);
    buf.put_slice(&msg.payload);
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(parts: &[&[u8]]) -> Bytes {
        let mut buf = BytesMut::new();
        for part in parts {
            buf.put_slice(part);
        }
        buf.freeze()
    }

    #[test]
    fn single_unprefixed_message() {
        let msgs = decode_rel(body(&[&[0x2a, 0x00], &[0x03], b"hello"]));
        assert_eq!(
            msgs,
            vec![RMessage::new(0x2a, 3, Bytes::from_static(b"hello"))]
        );
    }

    #[test]
    fn prefixed_messages_get_consecutive_seqs() {
        // base = 7, then two prefixed sub-messages and a trailing
        // unprefixed one.
        let msgs = decode_rel(body(&[
            &[0x07, 0x00],
            &[0x81, 0x02, 0x00],
            b"aa",
            &[0x82, 0x01, 0x00],
            b"b",
            &[0x03],
            b"rest",
        ]));
        assert_eq!(
            msgs,
            vec![
                RMessage::new(7, 1, Bytes::from_static(b"aa")),
                RMessage::new(8, 2, Bytes::from_static(b"b")),
                RMessage::new(9, 3, Bytes::from_static(b"rest")),
            ]
        );
    }

    #[test]
    fn seqs_wrap_within_a_packet() {
        let msgs = decode_rel(body(&[
            &[0xff, 0xff],
            &[0x81, 0x00, 0x00],
            &[0x02],
            b"x",
        ]));
        assert_eq!(msgs[0].seq, 0xffff);
        assert_eq!(msgs[1].seq, 0);
    }

    #[test]
    fn truncated_submessage_drops_the_tail() {
        // The second sub-message declares 5 payload bytes but only 2 are
        // present.
        let msgs = decode_rel(body(&[
            &[0x00, 0x00],
            &[0x81, 0x01, 0x00],
            b"a",
            &[0x82, 0x05, 0x00],
            b"bc",
        ]));
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].seq, 0);
    }

    #[test]
    fn missing_base_yields_nothing() {
        assert!(decode_rel(Bytes::from_static(&[0x01])).is_empty());
        assert!(decode_rel(Bytes::new()).is_empty());
    }

    #[test]
    fn encode_is_the_unprefixed_form() {
        let msg = RMessage::new(0x1234, 0x85, Bytes::from_static(b"pay"));
        let wire = encode_rel(&msg);
        assert_eq!(wire.as_ref(), &[0x34, 0x12, 0x05, b'p', b'a', b'y']);

        let decoded = decode_rel(wire);
        assert_eq!(decoded, vec![msg]);
    }
}
