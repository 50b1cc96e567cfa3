//! Basestation serial framing
//!
//! The basestation transceiver relays every frame it accepts to the PC
//! over a USB serial link. On that link byte 0 holds the index of the
//! last byte of the frame, so `byte0` more bytes follow it:
//!
//! ```text
//! ┌──────┬─────┬─────┬─────┬───────┬──────┬─────┬─────┬─────────┐
//! │ last │ sys │ src │ dst │  seq  │ type │ tid │ ttl │ payload │
//! └──────┴─────┴─────┴─────┴───────┴──────┴─────┴─────┴─────────┘
//! ```
//!
//! [`SerialCodec`] plugs into `tokio_util::codec::{FramedRead, FramedWrite}`.
//! Decoded frames keep byte 0 as it arrived on the link.
//!
//! A `FramedRead` ends its stream after the first decode error. Readers
//! that should outlive line noise enable [`SerialCodec::with_resync`]:
//! an impossible length byte is then skipped and counted instead.

use crate::error::{FrameError, MeshError};
use crate::mesh::frame::{Frame, HEADER_LEN, MAX_FRAME};
use crate::mesh::message::MessageType;
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

/// Text payload that tells a monitor the capture is complete
pub const DONE_MARKER: &[u8] = b"<done>";

/// Does this frame end a monitoring session?
pub fn is_done_marker(frame: &Frame) -> bool {
    let payload = frame.payload();
    let end = payload
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |i| i + 1);
    frame.header().message_type == MessageType::Text && &payload[..end] == DONE_MARKER
}

/// Codec for the last-index framed basestation link
#[derive(Debug, Clone, Copy)]
pub struct SerialCodec {
    max_frame: usize,
    resync: bool,
    skipped: u64,
}

impl SerialCodec {
    /// Codec accepting frames up to `max_frame` bytes
    pub fn new(max_frame: usize) -> Self {
        Self {
            max_frame: max_frame.min(MAX_FRAME),
            resync: false,
            skipped: 0,
        }
    }

    /// Skip malformed input byte by byte instead of failing the stream
    pub fn with_resync(mut self, resync: bool) -> Self {
        self.resync = resync;
        self
    }

    /// Largest frame this codec accepts
    pub fn max_frame(&self) -> usize {
        self.max_frame
    }

    /// Bytes dropped while resynchronizing
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn check_length(&self, total: usize) -> Result<(), FrameError> {
        if total < HEADER_LEN {
            return Err(FrameError::FrameTooShort {
                len: total,
                min: HEADER_LEN,
            });
        }
        if total > self.max_frame {
            return Err(FrameError::FrameTooLong {
                len: total,
                max: self.max_frame,
            });
        }
        Ok(())
    }
}

impl Default for SerialCodec {
    fn default() -> Self {
        Self::new(MAX_FRAME)
    }
}

impl Decoder for SerialCodec {
    type Item = Frame;
    type Error = MeshError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(&last_index) = src.first() else {
                return Ok(None);
            };

            let total = last_index as usize + 1;
            if let Err(err) = self.check_length(total) {
                // Drop the bad length byte so the next call starts fresh
                src.advance(1);
                if !self.resync {
                    return Err(err.into());
                }
                self.skipped += 1;
                warn!(error = %err, "skipping byte on serial stream");
                continue;
            }

            if src.len() < total {
                // Need more data
                src.reserve(total - src.len());
                return Ok(None);
            }

            let bytes = src.split_to(total);
            return Ok(Some(Frame::from_bytes(bytes.to_vec(), self.max_frame)?));
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                if !src.is_empty() {
                    warn!(remaining = src.len(), "stream ended inside a frame");
                    src.clear();
                }
                Ok(None)
            }
        }
    }
}

impl Encoder<Frame> for SerialCodec {
    type Error = MeshError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        <Self as Encoder<&Frame>>::encode(self, &item, dst)
    }
}

impl Encoder<&Frame> for SerialCodec {
    type Error = MeshError;

    fn encode(&mut self, item: &Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let bytes = item.as_bytes();
        if bytes.len() > self.max_frame {
            return Err(FrameError::FrameTooLong {
                len: bytes.len(),
                max: self.max_frame,
            }
            .into());
        }

        dst.reserve(bytes.len());
        // Frames are never empty and never longer than 256 bytes
        dst.put_u8((bytes.len() - 1) as u8);
        dst.extend_from_slice(&bytes[1..]);
        Ok(())
    }
}
