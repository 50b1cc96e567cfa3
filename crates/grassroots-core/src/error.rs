//! Error types for the grassroots core.

use thiserror::Error;

/// Framing errors raised while reading or building a frame buffer
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Buffer is shorter than the fixed header
    #[error("frame too short: {len} bytes, header needs {min}")]
    FrameTooShort { len: usize, min: usize },

    /// Buffer exceeds the deployment's frame ceiling
    #[error("frame too long: {len} bytes, limit is {max}")]
    FrameTooLong { len: usize, max: usize },

    /// Payload does not fit behind the header
    #[error("payload too large: {len} bytes, room for {max}")]
    PayloadTooLarge { len: usize, max: usize },
}

/// Why the flood decision engine dropped a received frame.
///
/// Variants are listed in the order the checks run; the first failing
/// check wins.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    #[error("frame shorter than header")]
    FrameTooShort,

    #[error("frame longer than maximum frame size")]
    FrameTooLong,

    #[error("frame belongs to another system")]
    WrongSystem,

    #[error("frame not addressed to this node")]
    NotAddressedToMe,

    #[error("source node outside tracked range")]
    UnknownSource,

    #[error("rebroadcast budget exhausted")]
    NoBudgetRemaining,

    #[error("stale or duplicate sequence id")]
    StaleOrDuplicate,
}

impl From<FrameError> for RejectReason {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::FrameTooShort { .. } => RejectReason::FrameTooShort,
            // A receive buffer never carries a separate payload, so an
            // oversize payload can only mean an oversize frame.
            FrameError::FrameTooLong { .. } | FrameError::PayloadTooLarge { .. } => {
                RejectReason::FrameTooLong
            }
        }
    }
}

/// Mesh node error type
#[derive(Error, Debug)]
pub enum MeshError {
    /// Outgoing payload does not fit in one frame
    #[error("payload too large: {len} bytes, room for {max}")]
    PayloadTooLarge { len: usize, max: usize },

    /// Carrier sense never reported a clear channel
    #[error("channel still busy after {attempts} carrier-sense polls")]
    ChannelAccessTimeout { attempts: u32 },

    /// Malformed frame on a byte stream
    #[error("framing error: {0}")]
    Frame(FrameError),

    /// Radio adapter failure
    #[error("radio error: {0}")]
    Radio(String),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<FrameError> for MeshError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::PayloadTooLarge { len, max } => MeshError::PayloadTooLarge { len, max },
            other => MeshError::Frame(other),
        }
    }
}

/// Result type alias for mesh operations
pub type Result<T> = std::result::Result<T, MeshError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_error_maps_to_reject_reason() {
        let short = FrameError::FrameTooShort { len: 4, min: 9 };
        assert_eq!(RejectReason::from(short), RejectReason::FrameTooShort);

        let long = FrameError::FrameTooLong { len: 300, max: 256 };
        assert_eq!(RejectReason::from(long), RejectReason::FrameTooLong);
    }

    #[test]
    fn test_payload_too_large_surfaces_to_producer() {
        let err: MeshError = FrameError::PayloadTooLarge { len: 300, max: 213 }.into();
        assert!(matches!(err, MeshError::PayloadTooLarge { len: 300, max: 213 }));
        assert!(err.to_string().contains("payload too large"));
    }
}
