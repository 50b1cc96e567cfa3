//! Application message types and payload layouts
//!
//! The core treats payloads as opaque. This module gives producers and
//! the basestation a typed view of the message kinds the deployments
//! actually send.

use super::frame::Header;
use serde::{Deserialize, Serialize};

/// Bytes in front of the pixels of a pixel-segment payload
pub const SEGMENT_HEADER_LEN: usize = 6;

/// Message type byte (header offset 6)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// Run of camera pixels from one image row
    PixelSegment,
    /// Ask an apparatus for a value
    Request,
    /// Apparatus reply
    Response,
    /// Plain text
    Text,
    /// Receivers forget the source's last sequence id
    Reset,
    /// Deployment-specific type
    Other(u8),
}

impl From<u8> for MessageType {
    fn from(byte: u8) -> Self {
        match byte {
            0 => MessageType::PixelSegment,
            1 => MessageType::Request,
            2 => MessageType::Response,
            3 => MessageType::Text,
            9 => MessageType::Reset,
            other => MessageType::Other(other),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(kind: MessageType) -> Self {
        match kind {
            MessageType::PixelSegment => 0,
            MessageType::Request => 1,
            MessageType::Response => 2,
            MessageType::Text => 3,
            MessageType::Reset => 9,
            MessageType::Other(byte) => byte,
        }
    }
}

/// Pixels from one image row, starting at `column`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelSegment {
    pub row: u16,
    pub column: u16,
    /// Bytes per pixel (3 for RGB)
    pub depth: u8,
    /// `count * depth` bytes, pixel-major
    pub pixels: Vec<u8>,
}

impl PixelSegment {
    /// Number of whole pixels carried
    pub fn count(&self) -> usize {
        if self.depth == 0 {
            0
        } else {
            self.pixels.len() / self.depth as usize
        }
    }

    /// Wire layout. Only whole pixels are written, at most 255 of them;
    /// the count byte always matches the pixel bytes that follow.
    fn encode(&self) -> Vec<u8> {
        let count = self.count().min(u8::MAX as usize);
        let pixels = &self.pixels[..count * self.depth as usize];

        let mut bytes = Vec::with_capacity(SEGMENT_HEADER_LEN + pixels.len());
        bytes.extend_from_slice(&self.row.to_be_bytes());
        bytes.extend_from_slice(&self.column.to_be_bytes());
        bytes.push(count as u8);
        bytes.push(self.depth);
        bytes.extend_from_slice(pixels);
        bytes
    }

    fn decode(payload: &[u8]) -> Option<Self> {
        if payload.len() < SEGMENT_HEADER_LEN {
            return None;
        }
        let count = payload[4] as usize;
        let depth = payload[5];
        let pixel_bytes = count * depth as usize;
        if payload.len() != SEGMENT_HEADER_LEN + pixel_bytes {
            return None;
        }
        Some(Self {
            row: u16::from_be_bytes([payload[0], payload[1]]),
            column: u16::from_be_bytes([payload[2], payload[3]]),
            depth,
            pixels: payload[SEGMENT_HEADER_LEN..].to_vec(),
        })
    }

    /// Cut one row of pixels into segments that each fit `max_payload`.
    ///
    /// Only whole pixels are sent; trailing bytes short of a full pixel
    /// are dropped. Returns nothing if not even one pixel fits.
    pub fn split_row(
        row: u16,
        first_column: u16,
        pixels: &[u8],
        depth: u8,
        max_payload: usize,
    ) -> Vec<PixelSegment> {
        if depth == 0 || max_payload <= SEGMENT_HEADER_LEN {
            return Vec::new();
        }
        let per_segment = ((max_payload - SEGMENT_HEADER_LEN) / depth as usize).min(u8::MAX as usize);
        if per_segment == 0 {
            return Vec::new();
        }

        let whole = pixels.len() - pixels.len() % depth as usize;
        let mut column = first_column;
        pixels[..whole]
            .chunks(per_segment * depth as usize)
            .map(|chunk| {
                let segment = PixelSegment {
                    row,
                    column,
                    depth,
                    pixels: chunk.to_vec(),
                };
                column = column.wrapping_add((chunk.len() / depth as usize) as u16);
                segment
            })
            .collect()
    }
}

/// Typed view of a frame's payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppMessage {
    PixelSegment { camera: u8, segment: PixelSegment },
    Request { apparatus: u8, value: u32 },
    Response { apparatus: u8, value: u32 },
    Text(String),
    Reset,
    /// Anything that is not one of the known layouts
    Opaque {
        message_type: MessageType,
        type_id: u8,
        payload: Vec<u8>,
    },
}

impl AppMessage {
    /// Type byte for the header
    pub fn message_type(&self) -> MessageType {
        match self {
            AppMessage::PixelSegment { .. } => MessageType::PixelSegment,
            AppMessage::Request { .. } => MessageType::Request,
            AppMessage::Response { .. } => MessageType::Response,
            AppMessage::Text(_) => MessageType::Text,
            AppMessage::Reset => MessageType::Reset,
            AppMessage::Opaque { message_type, .. } => *message_type,
        }
    }

    /// Type-specific id byte for the header
    pub fn type_id(&self) -> u8 {
        match self {
            AppMessage::PixelSegment { camera, .. } => *camera,
            AppMessage::Request { apparatus, .. } | AppMessage::Response { apparatus, .. } => {
                *apparatus
            }
            AppMessage::Text(_) | AppMessage::Reset => 0,
            AppMessage::Opaque { type_id, .. } => *type_id,
        }
    }

    /// Payload bytes
    pub fn encode_payload(&self) -> Vec<u8> {
        match self {
            AppMessage::PixelSegment { segment, .. } => segment.encode(),
            // Values travel in the microcontroller's native (little-endian) order
            AppMessage::Request { value, .. } | AppMessage::Response { value, .. } => {
                value.to_le_bytes().to_vec()
            }
            AppMessage::Text(text) => text.as_bytes().to_vec(),
            AppMessage::Reset => Vec::new(),
            AppMessage::Opaque { payload, .. } => payload.clone(),
        }
    }

    /// Interpret a received payload according to its header
    pub fn decode(header: &Header, payload: &[u8]) -> Self {
        let typed = match header.message_type {
            MessageType::PixelSegment => {
                PixelSegment::decode(payload).map(|segment| AppMessage::PixelSegment {
                    camera: header.type_id,
                    segment,
                })
            }
            MessageType::Request => read_u32_le(payload).map(|value| AppMessage::Request {
                apparatus: header.type_id,
                value,
            }),
            MessageType::Response => read_u32_le(payload).map(|value| AppMessage::Response {
                apparatus: header.type_id,
                value,
            }),
            MessageType::Text => String::from_utf8(payload.to_vec()).ok().map(AppMessage::Text),
            MessageType::Reset => Some(AppMessage::Reset),
            MessageType::Other(_) => None,
        };

        typed.unwrap_or_else(|| AppMessage::Opaque {
            message_type: header.message_type,
            type_id: header.type_id,
            payload: payload.to_vec(),
        })
    }
}

fn read_u32_le(payload: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = payload.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_for(message: &AppMessage) -> Header {
        Header {
            length: 0,
            system_id: 111,
            source: 4,
            destination: 1,
            sequence_id: 1,
            message_type: message.message_type(),
            type_id: message.type_id(),
            ttl: 5,
        }
    }

    #[test]
    fn test_message_type_bytes() {
        assert_eq!(MessageType::from(3), MessageType::Text);
        assert_eq!(MessageType::from(9), MessageType::Reset);
        assert_eq!(MessageType::from(42), MessageType::Other(42));
        assert_eq!(u8::from(MessageType::PixelSegment), 0);
        assert_eq!(u8::from(MessageType::Other(42)), 42);
    }

    #[test]
    fn test_request_value_is_little_endian() {
        let msg = AppMessage::Request {
            apparatus: 7,
            value: 0x0A0B0C0D,
        };
        assert_eq!(msg.type_id(), 7);
        assert_eq!(msg.encode_payload(), vec![0x0D, 0x0C, 0x0B, 0x0A]);
    }

    #[test]
    fn test_decode_response() {
        let msg = AppMessage::Response {
            apparatus: 2,
            value: 3300,
        };
        let decoded = AppMessage::decode(&header_for(&msg), &msg.encode_payload());
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_short_request_decodes_as_opaque() {
        let msg = AppMessage::Request {
            apparatus: 1,
            value: 5,
        };
        let decoded = AppMessage::decode(&header_for(&msg), &[1, 2]);
        assert!(matches!(decoded, AppMessage::Opaque { type_id: 1, .. }));
    }

    #[test]
    fn test_invalid_utf8_text_is_opaque() {
        let msg = AppMessage::Text(String::new());
        let decoded = AppMessage::decode(&header_for(&msg), &[0xFF, 0xFE]);
        assert!(matches!(
            decoded,
            AppMessage::Opaque {
                message_type: MessageType::Text,
                ..
            }
        ));
    }

    #[test]
    fn test_pixel_segment_layout() {
        let segment = PixelSegment {
            row: 0x0102,
            column: 0x0304,
            depth: 3,
            pixels: vec![10, 20, 30, 40, 50, 60],
        };
        let msg = AppMessage::PixelSegment { camera: 1, segment };
        assert_eq!(
            msg.encode_payload(),
            vec![0x01, 0x02, 0x03, 0x04, 2, 3, 10, 20, 30, 40, 50, 60]
        );
        let decoded = AppMessage::decode(&header_for(&msg), &msg.encode_payload());
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_pixel_segment_writes_whole_pixels_only() {
        let segment = PixelSegment {
            row: 4,
            column: 0,
            depth: 3,
            pixels: vec![1, 2, 3, 4, 5, 6, 7],
        };
        let msg = AppMessage::PixelSegment { camera: 2, segment };
        let payload = msg.encode_payload();
        assert_eq!(payload[4], 2);
        assert_eq!(payload.len(), SEGMENT_HEADER_LEN + 6);

        match AppMessage::decode(&header_for(&msg), &payload) {
            AppMessage::PixelSegment { camera, segment } => {
                assert_eq!(camera, 2);
                assert_eq!(segment.pixels, vec![1, 2, 3, 4, 5, 6]);
            }
            other => panic!("expected pixel segment, got {:?}", other),
        }
    }

    #[test]
    fn test_pixel_segment_count_caps_at_255() {
        let segment = PixelSegment {
            row: 0,
            column: 0,
            depth: 1,
            pixels: vec![9; 300],
        };
        let msg = AppMessage::PixelSegment { camera: 0, segment };
        let payload = msg.encode_payload();
        assert_eq!(payload[4], 255);
        assert_eq!(payload.len(), SEGMENT_HEADER_LEN + 255);
        assert!(matches!(
            AppMessage::decode(&header_for(&msg), &payload),
            AppMessage::PixelSegment { .. }
        ));
    }

    #[test]
    fn test_split_row_fits_payload() {
        // 213 bytes of room: (213 - 6) / 3 = 69 pixels per segment
        let pixels: Vec<u8> = (0..150 * 3).map(|i| i as u8).collect();
        let segments = PixelSegment::split_row(12, 2, &pixels, 3, 213);

        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].count(), 69);
        assert_eq!(segments[1].column, 2 + 69);
        assert_eq!(segments[2].count(), 150 - 2 * 69);
        for segment in &segments {
            let msg = AppMessage::PixelSegment {
                camera: 1,
                segment: segment.clone(),
            };
            assert!(msg.encode_payload().len() <= 213);
            assert_eq!(segment.row, 12);
        }
    }

    #[test]
    fn test_split_row_drops_partial_pixel() {
        let segments = PixelSegment::split_row(0, 0, &[1, 2, 3, 4], 3, 213);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].pixels, vec![1, 2, 3]);
    }

    #[test]
    fn test_split_row_no_room() {
        assert!(PixelSegment::split_row(0, 0, &[1, 2, 3], 3, 8).is_empty());
        assert!(PixelSegment::split_row(0, 0, &[1, 2, 3], 0, 213).is_empty());
    }
}
