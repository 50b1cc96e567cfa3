//! Frame layout and header codec
//!
//! Every frame is a flat byte buffer: a fixed 9-byte header followed by
//! an opaque payload. The whole frame must fit in one LoRa packet.
//!
//! ## Frame Structure
//!
//! ```text
//! ┌─────┬─────┬─────┬─────┬───────────┬─────┬─────┬─────┬──────────────────┐
//! │ len │ sys │ src │ dst │  seq (BE) │type │ tid │ ttl │ payload          │
//! │  0  │  1  │  2  │  3  │   4 - 5   │  6  │  7  │  8  │ 9 .. max_frame   │
//! └─────┴─────┴─────┴─────┴───────────┴─────┴─────┴─────┴──────────────────┘
//! ```
//!
//! Byte 0 carries the total frame length on the air. Receivers never
//! trust it; the transport-reported length is authoritative.

use super::message::MessageType;
use crate::error::FrameError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed header size in bytes
pub const HEADER_LEN: usize = 9;

/// Physical ceiling of one LoRa packet
pub const MAX_FRAME: usize = 256;

/// Byte offsets of the header fields
pub mod offset {
    pub const LENGTH: usize = 0;
    pub const SYSTEM_ID: usize = 1;
    pub const SOURCE_ID: usize = 2;
    pub const DESTINATION_ID: usize = 3;
    pub const SEQUENCE_ID: usize = 4;
    pub const MESSAGE_TYPE: usize = 6;
    pub const TYPE_ID: usize = 7;
    pub const TTL: usize = 8;
}

/// Decoded frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Byte 0 as found in the buffer
    pub length: u8,
    /// Logical network identifier
    pub system_id: u8,
    /// Originating node (0 = no origin / relay)
    pub source: u8,
    /// Target node (0 = any node, for relay-class receivers)
    pub destination: u8,
    /// Per-source sequence number, assigned by the origin
    pub sequence_id: u16,
    /// Application message type
    pub message_type: MessageType,
    /// Sensor / apparatus identifier; meaning depends on the message type
    pub type_id: u8,
    /// Remaining rebroadcast budget
    pub ttl: u8,
}

impl Header {
    /// Parse the header out of a received buffer.
    ///
    /// Length bounds are checked before any field is read.
    pub fn parse(buf: &[u8], max_frame: usize) -> Result<Self, FrameError> {
        check_frame_len(buf.len(), max_frame)?;
        Ok(Self::read_unchecked(buf))
    }

    /// Read fields from a buffer already known to hold a full header
    fn read_unchecked(buf: &[u8]) -> Self {
        Self {
            length: buf[offset::LENGTH],
            system_id: buf[offset::SYSTEM_ID],
            source: buf[offset::SOURCE_ID],
            destination: buf[offset::DESTINATION_ID],
            sequence_id: sequence_id(buf),
            message_type: MessageType::from(buf[offset::MESSAGE_TYPE]),
            type_id: buf[offset::TYPE_ID],
            ttl: buf[offset::TTL],
        }
    }

    /// Write the header into the first 9 bytes of `buf`
    pub fn write(&self, buf: &mut [u8]) -> Result<(), FrameError> {
        if buf.len() < HEADER_LEN {
            return Err(FrameError::FrameTooShort {
                len: buf.len(),
                min: HEADER_LEN,
            });
        }
        buf[offset::LENGTH] = self.length;
        buf[offset::SYSTEM_ID] = self.system_id;
        buf[offset::SOURCE_ID] = self.source;
        buf[offset::DESTINATION_ID] = self.destination;
        buf[offset::SEQUENCE_ID..offset::SEQUENCE_ID + 2]
            .copy_from_slice(&self.sequence_id.to_be_bytes());
        buf[offset::MESSAGE_TYPE] = u8::from(self.message_type);
        buf[offset::TYPE_ID] = self.type_id;
        buf[offset::TTL] = self.ttl;
        Ok(())
    }

    /// Does this frame ask receivers to forget the source's sequence id?
    pub fn is_reset(&self) -> bool {
        self.message_type == MessageType::Reset
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sys={} src={} dst={} seq={} type={} tid={} ttl={}",
            self.system_id,
            self.source,
            self.destination,
            self.sequence_id,
            u8::from(self.message_type),
            self.type_id,
            self.ttl
        )
    }
}

/// Big-endian sequence id from bytes 4-5 of a header buffer
pub fn sequence_id(buf: &[u8]) -> u16 {
    u16::from_be_bytes([buf[offset::SEQUENCE_ID], buf[offset::SEQUENCE_ID + 1]])
}

fn check_frame_len(len: usize, max_frame: usize) -> Result<(), FrameError> {
    if len < HEADER_LEN {
        return Err(FrameError::FrameTooShort {
            len,
            min: HEADER_LEN,
        });
    }
    if len > max_frame {
        return Err(FrameError::FrameTooLong {
            len,
            max: max_frame,
        });
    }
    Ok(())
}

/// An owned frame: header plus payload in one buffer.
///
/// Frames move by value through each stage (build, gate, transmit;
/// receive, parse, decide), so a send and a receive never share storage.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Vec<u8>,
}

impl Frame {
    /// Build a frame from header fields and a payload.
    ///
    /// The length byte is overwritten with the total frame length
    /// (saturating at 255 for a full 256-byte frame).
    pub fn new(header: &Header, payload: &[u8], max_frame: usize) -> Result<Self, FrameError> {
        let room = max_frame.min(MAX_FRAME).saturating_sub(HEADER_LEN);
        if payload.len() > room {
            return Err(FrameError::PayloadTooLarge {
                len: payload.len(),
                max: room,
            });
        }

        let total = HEADER_LEN + payload.len();
        let mut bytes = vec![0u8; total];
        let header = Header {
            length: u8::try_from(total).unwrap_or(u8::MAX),
            ..*header
        };
        header.write(&mut bytes)?;
        bytes[HEADER_LEN..].copy_from_slice(payload);
        Ok(Self { bytes })
    }

    /// Take ownership of a received buffer after bounds checking it
    pub fn from_bytes(bytes: Vec<u8>, max_frame: usize) -> Result<Self, FrameError> {
        check_frame_len(bytes.len(), max_frame)?;
        Ok(Self { bytes })
    }

    /// Decoded header
    pub fn header(&self) -> Header {
        Header::read_unchecked(&self.bytes)
    }

    /// Bytes after the header
    pub fn payload(&self) -> &[u8] {
        &self.bytes[HEADER_LEN..]
    }

    /// Sequence id of this frame
    pub fn sequence_id(&self) -> u16 {
        sequence_id(&self.bytes)
    }

    /// Remaining rebroadcast budget
    pub fn ttl(&self) -> u8 {
        self.bytes[offset::TTL]
    }

    /// Decrement the rebroadcast budget in place, returns false if already zero
    pub fn decrement_ttl(&mut self) -> bool {
        match self.bytes[offset::TTL].checked_sub(1) {
            Some(ttl) => {
                self.bytes[offset::TTL] = ttl;
                true
            }
            None => false,
        }
    }

    /// Total frame length in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Frames always carry a header, so never empty
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Wire bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume into the wire bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("header", &self.header())
            .field("payload_len", &self.payload().len())
            .finish()
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> Header {
        Header {
            length: 0,
            system_id: 111,
            source: 2,
            destination: 3,
            sequence_id: 0x0102,
            message_type: MessageType::Text,
            type_id: 0,
            ttl: 5,
        }
    }

    #[test]
    fn test_header_layout() {
        let frame = Frame::new(&sample_header(), b"hi", 222).unwrap();
        assert_eq!(
            frame.as_bytes(),
            &[11, 111, 2, 3, 0x01, 0x02, 3, 0, 5, b'h', b'i']
        );
    }

    #[test]
    fn test_sequence_id_is_big_endian() {
        let buf = [0, 0, 0, 0, 0xAB, 0xCD, 0, 0, 0];
        assert_eq!(sequence_id(&buf), 0xABCD);
    }

    #[test]
    fn test_parse_rejects_short_buffer() {
        let err = Header::parse(&[111; 8], 222).unwrap_err();
        assert_eq!(err, FrameError::FrameTooShort { len: 8, min: 9 });
    }

    #[test]
    fn test_parse_rejects_long_buffer() {
        let err = Header::parse(&[0; 223], 222).unwrap_err();
        assert_eq!(err, FrameError::FrameTooLong { len: 223, max: 222 });
    }

    #[test]
    fn test_parse_header_only_frame() {
        let mut buf = [0u8; HEADER_LEN];
        sample_header().write(&mut buf).unwrap();
        let header = Header::parse(&buf, 222).unwrap();
        assert_eq!(header.source, 2);
        assert_eq!(header.sequence_id, 0x0102);
        assert_eq!(header.ttl, 5);
    }

    #[test]
    fn test_write_needs_full_header() {
        let mut buf = [0u8; 4];
        assert!(sample_header().write(&mut buf).is_err());
    }

    #[test]
    fn test_payload_too_large() {
        let payload = vec![0u8; 214];
        let err = Frame::new(&sample_header(), &payload, 222).unwrap_err();
        assert_eq!(err, FrameError::PayloadTooLarge { len: 214, max: 213 });

        let payload = vec![0u8; 213];
        assert_eq!(Frame::new(&sample_header(), &payload, 222).unwrap().len(), 222);
    }

    #[test]
    fn test_full_frame_length_byte_saturates() {
        let payload = vec![7u8; MAX_FRAME - HEADER_LEN];
        let frame = Frame::new(&sample_header(), &payload, MAX_FRAME).unwrap();
        assert_eq!(frame.len(), 256);
        assert_eq!(frame.header().length, 255);
    }

    #[test]
    fn test_decrement_ttl() {
        let mut frame = Frame::new(&sample_header(), b"", 222).unwrap();
        assert!(frame.decrement_ttl());
        assert_eq!(frame.ttl(), 4);

        let mut header = sample_header();
        header.ttl = 0;
        let mut frame = Frame::new(&header, b"", 222).unwrap();
        assert!(!frame.decrement_ttl());
        assert_eq!(frame.ttl(), 0);
    }

    #[test]
    fn test_reset_type() {
        let mut header = sample_header();
        assert!(!header.is_reset());
        header.message_type = MessageType::Reset;
        assert!(header.is_reset());
    }
}
