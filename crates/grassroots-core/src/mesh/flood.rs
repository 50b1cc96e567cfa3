//! Flood routing decisions
//!
//! Every node runs the same ordered check sequence on each received
//! frame. A small [`Role`] switch selects which checks apply:
//!
//! | # | check                       | endpoint | relay |
//! |---|-----------------------------|----------|-------|
//! | 1 | length ≥ header             | ✓        | ✓     |
//! | 2 | length ≤ max frame          | ✓        | ✓     |
//! | 3 | system id matches           | ✓        | ✓     |
//! | 4 | destination is this node    | ✓        |       |
//! | 5 | source id is tracked        | ✓        | ✓     |
//! | 6 | rebroadcast budget > 0      |          | ✓     |
//! | 7 | sequence id is fresh        | ✓        | ✓     |
//!
//! The first failing check decides the [`RejectReason`]. A frame that
//! passes is recorded in the freshness table (or resets it, for
//! message type 9), then delivered locally by an endpoint or
//! handed back with its budget decremented by a relay.
//!
//! Sequence ids are tracked per source, not per (source, destination):
//! an origin's counter keeps rising across all destinations, so a relay
//! never mistakes a frame to a new destination for a stale one.

use super::frame::{offset, Frame, Header};
use super::freshness::FreshnessTracker;
use super::message::MessageType;
use crate::config::{NodeConfig, ProtocolConfig};
use crate::error::{FrameError, RejectReason};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Which checks a node applies and what it does with accepted frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Sensor or basestation: consumes frames addressed to it
    Endpoint,
    /// Rebroadcasts every fresh frame with budget left
    Relay,
}

/// Outcome of an accepted frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Frame terminates here; hand it to the application
    Deliver(Frame),
    /// Frame must be retransmitted; its budget is already decremented
    Forward(Frame),
}

impl Disposition {
    /// The frame carried by either outcome
    pub fn frame(&self) -> &Frame {
        match self {
            Disposition::Deliver(frame) | Disposition::Forward(frame) => frame,
        }
    }

    /// Consume into the frame
    pub fn into_frame(self) -> Frame {
        match self {
            Disposition::Deliver(frame) | Disposition::Forward(frame) => frame,
        }
    }
}

/// The per-node flood policy and the state it owns.
///
/// Owns the freshness table and the outgoing sequence counter. Both are
/// read-then-write state; share an engine across threads only behind a
/// lock or a single owning task.
#[derive(Debug, Clone)]
pub struct FloodEngine {
    /// Our node ID
    node_id: u8,
    /// Endpoint or relay checks
    role: Role,
    /// Deployment constants
    protocol: ProtocolConfig,
    /// Highest accepted sequence id per source
    tracker: FreshnessTracker,
    /// Sequence id of the last frame we originated
    sequence: u16,
}

impl FloodEngine {
    /// Create an engine with an empty freshness table
    pub fn new(config: &NodeConfig) -> Self {
        Self {
            node_id: config.node_id,
            role: config.role,
            protocol: config.protocol,
            tracker: FreshnessTracker::new(config.protocol.max_nodes),
            sequence: 0,
        }
    }

    /// Our node ID
    pub fn node_id(&self) -> u8 {
        self.node_id
    }

    /// Configured role
    pub fn role(&self) -> Role {
        self.role
    }

    /// Deployment constants
    pub fn protocol(&self) -> &ProtocolConfig {
        &self.protocol
    }

    /// Read-only view of the freshness table
    pub fn tracker(&self) -> &FreshnessTracker {
        &self.tracker
    }

    /// Sequence id of the last originated frame (0 before the first)
    pub fn last_sequence(&self) -> u16 {
        self.sequence
    }

    /// Run the ordered checks without touching any state
    pub fn check(&self, buf: &[u8]) -> Result<Header, RejectReason> {
        let header = Header::parse(buf, self.protocol.max_frame)?;

        if header.system_id != self.protocol.system_id {
            return Err(RejectReason::WrongSystem);
        }
        if self.role == Role::Endpoint && header.destination != self.node_id {
            return Err(RejectReason::NotAddressedToMe);
        }
        if !self.tracker.tracks(header.source) {
            return Err(RejectReason::UnknownSource);
        }
        if self.role == Role::Relay && header.ttl == 0 {
            return Err(RejectReason::NoBudgetRemaining);
        }
        if !self.tracker.is_fresh(header.source, header.sequence_id) {
            return Err(RejectReason::StaleOrDuplicate);
        }
        Ok(header)
    }

    /// Decide what to do with a received buffer.
    ///
    /// On acceptance the freshness table is updated and, for a relay,
    /// the frame's budget is decremented in place.
    pub fn on_receive(&mut self, bytes: Vec<u8>) -> Result<Disposition, RejectReason> {
        let header = match self.check(&bytes) {
            Ok(header) => header,
            Err(reason) => {
                let last_seen = bytes
                    .get(offset::SOURCE_ID)
                    .and_then(|source| self.tracker.last_seen(*source));
                log_reject(&bytes, reason, last_seen);
                return Err(reason);
            }
        };

        if header.length as usize != bytes.len() {
            debug!(
                declared = header.length,
                actual = bytes.len(),
                "length byte disagrees with transport length"
            );
        }

        if header.is_reset() {
            self.tracker.reset(header.source);
            debug!(source = header.source, "sequence tracking reset by source");
        } else {
            self.tracker.record(header.source, header.sequence_id);
        }

        // Bounds were checked by `check`
        let mut frame = Frame::from_bytes(bytes, self.protocol.max_frame)
            .map_err(RejectReason::from)?;

        match self.role {
            Role::Endpoint => {
                debug!(%header, "accepted for local delivery");
                Ok(Disposition::Deliver(frame))
            }
            Role::Relay => {
                frame.decrement_ttl();
                info!(%header, ttl = frame.ttl(), "accepted for rebroadcast");
                Ok(Disposition::Forward(frame))
            }
        }
    }

    /// Build a frame originated by this node.
    ///
    /// The payload is size-checked before the sequence counter moves, so
    /// a rejected send does not burn a sequence id. The first frame is
    /// sequence 1; the counter skips 0 when it wraps. Sending a reset does
    /// not restart the counter.
    pub fn originate(
        &mut self,
        message_type: MessageType,
        type_id: u8,
        destination: u8,
        payload: &[u8],
    ) -> Result<Frame, FrameError> {
        let room = self.protocol.max_payload();
        if payload.len() > room {
            return Err(FrameError::PayloadTooLarge {
                len: payload.len(),
                max: room,
            });
        }

        self.sequence = match self.sequence.wrapping_add(1) {
            0 => 1,
            next => next,
        };

        let header = Header {
            length: 0,
            system_id: self.protocol.system_id,
            source: self.node_id,
            destination,
            sequence_id: self.sequence,
            message_type,
            type_id,
            ttl: self.protocol.initial_ttl,
        };
        let frame = Frame::new(&header, payload, self.protocol.max_frame)?;

        info!(header = %frame.header(), len = frame.len(), "originated frame");
        Ok(frame)
    }
}

fn log_reject(bytes: &[u8], reason: RejectReason, last_seen: Option<u16>) {
    match reason {
        RejectReason::FrameTooShort | RejectReason::FrameTooLong => {
            debug!(len = bytes.len(), %reason, "dropped frame");
        }
        _ => {
            // Length checks passed, so the header is readable
            if let Ok(header) = Header::parse(bytes, usize::MAX) {
                debug!(%header, ?last_seen, %reason, "dropped frame");
            }
        }
    }
}
