//! Wire protocol for the wgtun tunnel.
//!
//! Every datagram exchanged with a peer starts with a fixed 16-byte header
//! in network byte order (big-endian), followed by the payload:
//!
//! - Type (1 byte): frame type
//! - Reserved (3 bytes): zero on encode, ignored on decode
//! - Session ID (4 bytes): identifies the tunnel session with the peer
//! - Counter (8 bytes): monotonically increasing per-session send counter
//! - Payload (variable): one raw IP packet, or empty for keepalives
//!
//! Total frame size: 16 bytes + payload length.
//!
//! Unknown type values survive a decode/encode round trip unchanged so
//! that newer frame types can pass through older endpoints.

use std::fmt;

/// Size of the fixed frame header in bytes.
pub const HEADER_SIZE: usize = 16;

/// Frame type carried in the first header byte.
///
/// The numeric values mirror WireGuard's message numbering: `1` is
/// reserved for a future handshake, `4` is a data frame. Keepalives use
/// `2`. Any other value decodes to [`FrameType::Unknown`] and is kept
/// as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    /// Reserved for a future handshake exchange; never emitted.
    Handshake,
    /// Empty-payload frame that refreshes NAT/firewall state.
    Keepalive,
    /// Frame carrying one encapsulated IP packet.
    Data,
    /// Unrecognized type value, preserved for forward compatibility.
    Unknown(u8),
}

impl FrameType {
    /// Decode a frame type from its wire value.
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Handshake,
            2 => Self::Keepalive,
            4 => Self::Data,
            other => Self::Unknown(other),
        }
    }

    /// Wire value of this frame type.
    pub fn raw(self) -> u8 {
        match self {
            Self::Handshake => 1,
            Self::Keepalive => 2,
            Self::Data => 4,
            Self::Unknown(raw) => raw,
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handshake => write!(f, "handshake"),
            Self::Keepalive => write!(f, "keepalive"),
            Self::Data => write!(f, "data"),
            Self::Unknown(raw) => write!(f, "unknown({raw})"),
        }
    }
}

/// Fixed-size frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Frame type.
    pub frame_type: FrameType,
    /// Session identifier.
    pub session_id: u32,
    /// Per-session send counter.
    pub counter: u64,
}

impl FrameHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = HEADER_SIZE;

    /// Encode the header to bytes (network byte order).
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = self.frame_type.raw();
        // buf[1..4] stays zero (reserved)
        buf[4..8].copy_from_slice(&self.session_id.to_be_bytes());
        buf[8..16].copy_from_slice(&self.counter.to_be_bytes());
        buf
    }

    /// Decode a header from bytes (network byte order).
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < Self::SIZE {
            return Err(ProtocolError::Truncated {
                expected: Self::SIZE,
                actual: buf.len(),
            });
        }

        let frame_type = FrameType::from_raw(buf[0]);
        let session_id = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let counter = u64::from_be_bytes([
            buf[8], buf[9], buf[10], buf[11], buf[12], buf[13], buf[14], buf[15],
        ]);

        Ok(Self {
            frame_type,
            session_id,
            counter,
        })
    }
}

/// Complete frame with header and payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame header.
    pub header: FrameHeader,
    /// Encapsulated IP packet, or empty for keepalives.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a new frame.
    pub fn new(frame_type: FrameType, session_id: u32, counter: u64, payload: Vec<u8>) -> Self {
        Self {
            header: FrameHeader {
                frame_type,
                session_id,
                counter,
            },
            payload,
        }
    }

    /// Create an empty keepalive frame.
    pub fn keepalive(session_id: u32, counter: u64) -> Self {
        Self::new(FrameType::Keepalive, session_id, counter, Vec::new())
    }

    /// Total size of the frame on the wire.
    pub fn total_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Encode the frame to bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.total_size());
        buf.extend_from_slice(&self.header.encode());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Decode a frame from bytes.
    ///
    /// Everything past the header is the payload; a zero-length payload is
    /// valid (keepalives).
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        let header = FrameHeader::decode(buf)?;
        let payload = buf[HEADER_SIZE..].to_vec();
        Ok(Self { header, payload })
    }
}

/// Protocol-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("truncated packet: need at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_type_raw_round_trip() {
        for raw in 0..=u8::MAX {
            assert_eq!(FrameType::from_raw(raw).raw(), raw);
        }
        assert_eq!(FrameType::from_raw(4), FrameType::Data);
        assert_eq!(FrameType::from_raw(2), FrameType::Keepalive);
        assert_eq!(FrameType::from_raw(1), FrameType::Handshake);
        assert_eq!(FrameType::from_raw(9), FrameType::Unknown(9));
    }

    #[test]
    fn test_header_encode_decode() {
        let header = FrameHeader {
            frame_type: FrameType::Data,
            session_id: 0xDEAD_BEEF,
            counter: 0x0123_4567_89AB_CDEF,
        };

        let encoded = header.encode();
        assert_eq!(encoded.len(), HEADER_SIZE);
        // Reserved bytes are zero.
        assert_eq!(&encoded[1..4], &[0, 0, 0]);
        // Big-endian field layout.
        assert_eq!(&encoded[4..8], &0xDEAD_BEEFu32.to_be_bytes());
        assert_eq!(&encoded[8..16], &0x0123_4567_89AB_CDEFu64.to_be_bytes());

        let decoded = FrameHeader::decode(&encoded).expect("decode failed");
        assert_eq!(header, decoded);
    }

    #[test]
    fn test_frame_encode_decode() {
        let payload = vec![0x45, 0, 0, 84, 1, 2, 3];
        let frame = Frame::new(FrameType::Data, 12345, 42, payload.clone());

        let encoded = frame.encode();
        assert_eq!(encoded.len(), HEADER_SIZE + payload.len());

        let decoded = Frame::decode(&encoded).expect("decode failed");
        assert_eq!(frame, decoded);
    }

    #[test]
    fn test_data_frame_size_for_84_byte_packet() {
        // An 84-byte IP packet must produce exactly a 100-byte frame.
        let frame = Frame::new(FrameType::Data, 12345, 1, vec![0u8; 84]);
        assert_eq!(frame.encode().len(), 100);
    }

    #[test]
    fn test_keepalive_frame_is_header_only() {
        let frame = Frame::keepalive(12345, 7);
        let encoded = frame.encode();
        assert_eq!(encoded.len(), HEADER_SIZE);

        let decoded = Frame::decode(&encoded).expect("decode failed");
        assert_eq!(decoded.header.frame_type, FrameType::Keepalive);
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn test_unknown_type_is_preserved() {
        let frame = Frame::new(FrameType::Unknown(0x7F), 1, 1, vec![0xAA]);
        let decoded = Frame::decode(&frame.encode()).expect("decode failed");
        assert_eq!(decoded.header.frame_type, FrameType::Unknown(0x7F));
        assert_eq!(decoded.payload, vec![0xAA]);
    }

    #[test]
    fn test_decode_truncated_fails_for_every_short_length() {
        for len in 0..HEADER_SIZE {
            let buf = vec![0u8; len];
            let result = Frame::decode(&buf);
            assert!(
                matches!(
                    result,
                    Err(ProtocolError::Truncated { expected: 16, actual }) if actual == len
                ),
                "length {len} should be rejected"
            );
        }
    }
}
