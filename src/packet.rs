//! Wire-format definitions for transfer frames.
//!
//! Every datagram exchanged between server and client is a [`Packet`]: a
//! fixed 512-byte frame with a 6-byte header and up to 506 bytes of payload,
//! zero-padded to the full frame size.  This module is responsible for:
//! - Defining the on-wire binary layout (type, sequence, checksum, length).
//! - Serialising a [`Packet`] into a ready-to-send 512-byte buffer.
//! - Deserialising a raw datagram back into a [`Packet`], returning errors
//!   for malformed input.
//! - Computing and verifying the additive payload checksum.
//!
//! No I/O happens here — this is pure data transformation.
//!
//! # Wire format
//!
//! Multi-byte integers are **little-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Type      |   Sequence    |            Checksum           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |            Length             |          Payload ...          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                  Payload, zero-padded to 512 bytes            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! # Checksum
//!
//! The checksum is the sum of the payload bytes as unsigned values,
//! truncated to 16 bits.  It is deliberately weak — a single flipped byte
//! always changes the sum, but compensating multi-byte corruptions can
//! cancel out.  The fault injector ([`crate::gremlin`]) has multi-byte
//! corruption tiers specifically to exercise that weakness, so the sum stays
//! a sum; swapping in a CRC would change the protocol.
//!
//! Decoding performs **no** checksum validation; callers decide when to run
//! [`Packet::verify`].

use std::fmt;

/// Total size of every frame on the wire, in bytes.
pub const PACKET_SIZE: usize = 512;
/// Byte length of the fixed-size header.
pub const HEADER_SIZE: usize = 6;
/// Maximum payload carried by one frame.
pub const MAX_PAYLOAD: usize = PACKET_SIZE - HEADER_SIZE;
/// Sequence numbers live in `[0, SEQ_SPACE)` and wrap modulo this value.
pub const SEQ_SPACE: u8 = 32;
/// Fixed go-back-N send window, in packets.
pub const WINDOW_SIZE: usize = 16;

/// Reserved GET payload that closes a session after a successful transfer.
///
/// Also rejected as a filename, so a request can never collide with it.
pub const SUCCESS_MARKER: &[u8] = b"!! TRANSFER SUCCESSFUL !!";

// Byte offsets of each field within the serialised header.
const OFF_TYPE: usize = 0;
const OFF_SEQ: usize = 1;
const OFF_CHECKSUM: usize = 2;
const OFF_LENGTH: usize = 4;

// ---------------------------------------------------------------------------
// PacketType
// ---------------------------------------------------------------------------

/// The four frame types of the protocol.
///
/// The discriminants are the on-wire byte values; any other byte fails to
/// decode with [`PacketError::UnknownType`] and is discarded by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    /// Positive acknowledgement; sequence field carries the next expected
    /// sequence number.
    Ack = 0,
    /// Negative acknowledgement (damaged frame); triggers fast retransmit.
    Nak = 1,
    /// Transfer request (payload = filename) or session-close marker
    /// (payload = success string).
    Get = 2,
    /// Data frame carrying a file chunk, or the zero-length end-of-stream
    /// sentinel.
    Trn = 3,
}

impl PacketType {
    /// Map an on-wire byte to a type, or `None` for unrecognized values.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Ack),
            1 => Some(Self::Nak),
            2 => Some(Self::Get),
            3 => Some(Self::Trn),
            _ => None,
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ack => "ACK",
            Self::Nak => "NAK",
            Self::Get => "GET",
            Self::Trn => "TRN",
        };
        write!(f, "{name}")
    }
}

// ---------------------------------------------------------------------------
// Packet
// ---------------------------------------------------------------------------

/// One decoded (or about-to-be-encoded) protocol frame.
///
/// All fields are fixed at construction; a packet is immutable once built.
/// `checksum` always holds the additive sum of `payload` for packets built
/// via [`Packet::data`] / [`Packet::control`]; for decoded packets it holds
/// whatever arrived on the wire, to be checked with [`Packet::verify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Frame type.
    pub kind: PacketType,
    /// Wire sequence number in `[0, SEQ_SPACE)`.
    pub sequence: u8,
    /// Additive checksum of the payload as stored in the header.
    pub checksum: u16,
    /// Payload length in bytes, `0 ≤ length ≤ MAX_PAYLOAD`.
    pub length: u16,
    /// Payload bytes (`length` of them; padding is not represented).
    pub payload: Vec<u8>,
}

impl Packet {
    /// Build a payload-carrying frame with the checksum computed.
    ///
    /// # Panics
    ///
    /// Panics if `payload` exceeds [`MAX_PAYLOAD`] — chunking is the
    /// caller's job and oversized payloads are a programming error.
    pub fn data(kind: PacketType, sequence: u8, payload: &[u8]) -> Self {
        assert!(
            payload.len() <= MAX_PAYLOAD,
            "payload of {} bytes exceeds the {MAX_PAYLOAD}-byte frame capacity",
            payload.len()
        );
        Self {
            kind,
            sequence,
            checksum: additive_checksum(payload),
            length: payload.len() as u16,
            payload: payload.to_vec(),
        }
    }

    /// Build a zero-length control frame (ACK, NAK, or the TRN sentinel).
    ///
    /// Control frames carry checksum 0: there is no payload to sum.
    pub fn control(kind: PacketType, sequence: u8) -> Self {
        Self {
            kind,
            sequence,
            checksum: 0,
            length: 0,
            payload: Vec::new(),
        }
    }

    /// Serialise this packet into a full 512-byte frame.
    ///
    /// Unused payload bytes are zero.
    pub fn encode(&self) -> [u8; PACKET_SIZE] {
        let mut buf = [0u8; PACKET_SIZE];
        buf[OFF_TYPE] = self.kind as u8;
        buf[OFF_SEQ] = self.sequence;
        buf[OFF_CHECKSUM..OFF_CHECKSUM + 2].copy_from_slice(&self.checksum.to_le_bytes());
        buf[OFF_LENGTH..OFF_LENGTH + 2].copy_from_slice(&self.length.to_le_bytes());
        buf[HEADER_SIZE..HEADER_SIZE + self.payload.len()].copy_from_slice(&self.payload);
        buf
    }

    /// Parse a [`Packet`] from a raw datagram.
    ///
    /// Pure field extraction with shape checks only:
    /// - `buf` must contain at least the 6-byte header,
    /// - the type byte must be a known [`PacketType`],
    /// - the `length` field must be ≤ [`MAX_PAYLOAD`] and covered by `buf`.
    ///
    /// The checksum is **not** validated here; the receiver decides when to
    /// call [`Packet::verify`].
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < HEADER_SIZE {
            return Err(PacketError::TooShort);
        }

        let kind = PacketType::from_byte(buf[OFF_TYPE])
            .ok_or(PacketError::UnknownType(buf[OFF_TYPE]))?;
        let sequence = buf[OFF_SEQ];
        let checksum = u16::from_le_bytes([buf[OFF_CHECKSUM], buf[OFF_CHECKSUM + 1]]);
        let length = u16::from_le_bytes([buf[OFF_LENGTH], buf[OFF_LENGTH + 1]]);

        if length as usize > MAX_PAYLOAD || HEADER_SIZE + length as usize > buf.len() {
            return Err(PacketError::LengthOutOfRange(length));
        }

        Ok(Self {
            kind,
            sequence,
            checksum,
            length,
            payload: buf[HEADER_SIZE..HEADER_SIZE + length as usize].to_vec(),
        })
    }

    /// Recompute the additive checksum over the decoded payload and compare
    /// it with the stored header field.
    pub fn verify(&self) -> bool {
        additive_checksum(&self.payload) == self.checksum
    }

    /// `true` for the zero-length TRN frame that terminates a transfer.
    pub fn is_sentinel(&self) -> bool {
        self.kind == PacketType::Trn && self.length == 0
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can arise when parsing a raw datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketError {
    /// Buffer shorter than the fixed header size.
    TooShort,
    /// The type byte is not one of ACK/NAK/GET/TRN.
    UnknownType(u8),
    /// `length` field exceeds the frame capacity or the received bytes.
    LengthOutOfRange(u16),
}

impl fmt::Display for PacketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort => write!(f, "datagram too short to contain a header"),
            Self::UnknownType(b) => write!(f, "unknown packet type byte {b:#04x}"),
            Self::LengthOutOfRange(n) => {
                write!(f, "length field {n} exceeds frame capacity")
            }
        }
    }
}

impl std::error::Error for PacketError {}

// ---------------------------------------------------------------------------
// Checksum
// ---------------------------------------------------------------------------

/// Sum of `data` bytes as unsigned values, truncated to 16 bits.
pub fn additive_checksum(data: &[u8]) -> u16 {
    data.iter().map(|&b| u32::from(b)).sum::<u32>() as u16
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_is_always_512_bytes() {
        assert_eq!(Packet::control(PacketType::Ack, 0).encode().len(), PACKET_SIZE);
        assert_eq!(
            Packet::data(PacketType::Trn, 3, &[0xAA; MAX_PAYLOAD]).encode().len(),
            PACKET_SIZE
        );
    }

    #[test]
    fn header_field_layout() {
        let pkt = Packet::data(PacketType::Trn, 7, b"abc");
        let buf = pkt.encode();
        assert_eq!(buf[0], 3); // TRN
        assert_eq!(buf[1], 7);
        // checksum: 'a' + 'b' + 'c' = 294 = 0x0126, little-endian
        assert_eq!(&buf[2..4], &[0x26, 0x01]);
        // length: 3
        assert_eq!(&buf[4..6], &[3, 0]);
        assert_eq!(&buf[6..9], b"abc");
    }

    #[test]
    fn unused_payload_bytes_are_zero() {
        let buf = Packet::data(PacketType::Trn, 0, b"xy").encode();
        assert!(buf[HEADER_SIZE + 2..].iter().all(|&b| b == 0));
    }

    #[test]
    fn control_frame_has_zero_checksum_and_length() {
        let pkt = Packet::control(PacketType::Nak, 5);
        assert_eq!(pkt.checksum, 0);
        assert_eq!(pkt.length, 0);
        assert!(pkt.payload.is_empty());
    }

    #[test]
    fn additive_checksum_values() {
        assert_eq!(additive_checksum(&[]), 0);
        assert_eq!(additive_checksum(&[1, 2, 3]), 6);
        assert_eq!(additive_checksum(&[0xFF; 506]), (506 * 255 % 65536) as u16);
    }

    #[test]
    fn encode_decode_roundtrip() {
        let pkt = Packet::data(PacketType::Trn, 31, b"hello world");
        let decoded = Packet::decode(&pkt.encode()).unwrap();
        assert_eq!(decoded, pkt);
        assert!(decoded.verify());
    }

    #[test]
    fn decode_short_buffer() {
        assert_eq!(Packet::decode(&[]), Err(PacketError::TooShort));
        assert_eq!(Packet::decode(&[0u8; 5]), Err(PacketError::TooShort));
    }

    #[test]
    fn decode_unknown_type() {
        let mut buf = Packet::control(PacketType::Ack, 0).encode();
        buf[0] = 9;
        assert_eq!(Packet::decode(&buf), Err(PacketError::UnknownType(9)));
    }

    #[test]
    fn decode_length_beyond_capacity() {
        let mut buf = Packet::control(PacketType::Trn, 0).encode();
        buf[4..6].copy_from_slice(&600u16.to_le_bytes());
        assert_eq!(Packet::decode(&buf), Err(PacketError::LengthOutOfRange(600)));
    }

    #[test]
    fn decode_length_beyond_received_bytes() {
        let pkt = Packet::data(PacketType::Trn, 0, b"data");
        let buf = pkt.encode();
        // Truncate below header + claimed payload.
        assert_eq!(
            Packet::decode(&buf[..HEADER_SIZE + 2]),
            Err(PacketError::LengthOutOfRange(4))
        );
    }

    #[test]
    fn decode_does_not_validate_checksum() {
        let mut buf = Packet::data(PacketType::Trn, 0, b"data").encode();
        buf[HEADER_SIZE] = !buf[HEADER_SIZE];
        let decoded = Packet::decode(&buf).expect("decode must stay shape-only");
        assert!(!decoded.verify());
    }

    #[test]
    fn verify_detects_single_byte_corruption() {
        let mut buf = Packet::data(PacketType::Trn, 2, b"payload bytes").encode();
        buf[HEADER_SIZE + 3] = !buf[HEADER_SIZE + 3];
        assert!(!Packet::decode(&buf).unwrap().verify());
    }

    /// The additive sum cannot detect corruptions whose deltas cancel: this
    /// is the documented weakness the fault injector exists to expose.
    #[test]
    fn verify_misses_compensating_two_byte_corruption() {
        let mut buf = Packet::data(PacketType::Trn, 2, &[10, 20, 30]).encode();
        buf[HEADER_SIZE] += 1; // 10 -> 11
        buf[HEADER_SIZE + 1] -= 1; // 20 -> 19; sum unchanged
        let decoded = Packet::decode(&buf).unwrap();
        assert!(decoded.verify(), "compensating corruption must slip through");
        assert_ne!(decoded.payload, &[10, 20, 30]);
    }

    #[test]
    fn sentinel_detection() {
        assert!(Packet::control(PacketType::Trn, 4).is_sentinel());
        assert!(!Packet::data(PacketType::Trn, 4, b"x").is_sentinel());
        assert!(!Packet::control(PacketType::Ack, 4).is_sentinel());
    }

    #[test]
    fn max_payload_accepted() {
        let pkt = Packet::data(PacketType::Trn, 0, &[7u8; MAX_PAYLOAD]);
        assert_eq!(pkt.length as usize, MAX_PAYLOAD);
    }

    #[test]
    #[should_panic(expected = "exceeds")]
    fn oversized_payload_panics() {
        let _ = Packet::data(PacketType::Trn, 0, &[0u8; MAX_PAYLOAD + 1]);
    }
}
