//! Mesh node: one cooperative poll loop per radio
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        MeshNode                             │
//! │  ┌─────────────────────┐    ┌─────────────────────────┐     │
//! │  │    FloodEngine      │    │     ChannelAccess       │     │
//! │  │  - ordered checks   │───►│  - carrier sense        │     │
//! │  │  - freshness table  │    │  - fixed backoff        │     │
//! │  │  - sequence counter │    └───────────┬─────────────┘     │
//! │  └─────────▲───────────┘                │                   │
//! │            │            ┌───────────────▼─────────────┐     │
//! │            └────────────┤        RadioLink            │     │
//! │                         └─────────────────────────────┘     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The node owns all of its state and is driven from one thread: call
//! [`MeshNode::poll`] in the main loop and [`MeshNode::send`] whenever the
//! application has something to say. To drive a node from several tasks,
//! wrap it in a mutex or route every call through one owning task.
//!
//! # Usage
//!
//! ```rust,ignore
//! use grassroots_core::mesh::{MeshNode, SimulatedAir};
//! use grassroots_core::NodeConfig;
//!
//! let air = SimulatedAir::new();
//! let mut sensor = MeshNode::new(NodeConfig::endpoint(3), air.attach())?;
//! sensor.send_text(1, "water level 42cm")?;
//!
//! loop {
//!     sensor.poll()?;
//!     for frame in sensor.receive_packets() {
//!         println!("from {}: {:?}", frame.header().source, frame.payload());
//!     }
//! }
//! ```

use super::flood::{Disposition, FloodEngine, Role};
use super::frame::{Frame, Header};
use super::mac::ChannelAccess;
use super::message::{AppMessage, MessageType};
use super::traits::{NodeStats, RadioLink, Reception};
use crate::config::NodeConfig;
use crate::error::{MeshError, RejectReason, Result};
use std::collections::VecDeque;
use tracing::{debug, warn};

/// What one call to [`MeshNode::poll`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing was pending on the radio
    Idle,
    /// A frame for this node was queued for the application
    Delivered(Header),
    /// A frame was rebroadcast with this (decremented) header
    Forwarded(Header),
    /// A frame was accepted for rebroadcast but the channel never cleared
    ForwardAbandoned(Header),
    /// A frame failed one of the flood checks
    Rejected(RejectReason),
    /// The adapter flagged an invalid packet, drained without parsing
    Discarded { reported_len: usize },
}

/// A complete mesh node combining flood policy, channel access and radio
pub struct MeshNode<R: RadioLink> {
    /// Flood policy and its state
    engine: FloodEngine,
    /// Carrier-sense gate
    mac: ChannelAccess,
    /// Physical layer
    radio: R,
    /// Frames delivered locally, waiting for the application
    received_packets: VecDeque<Frame>,
    /// Last accepted frame
    current: Option<Frame>,
    /// Counters
    stats: NodeStats,
}

impl<R: RadioLink> std::fmt::Debug for MeshNode<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeshNode")
            .field("node_id", &self.engine.node_id())
            .field("role", &self.engine.role())
            .field("system_id", &self.engine.protocol().system_id)
            .field("pending", &self.received_packets.len())
            .finish()
    }
}

impl<R: RadioLink> MeshNode<R> {
    /// Create a node on top of `radio`
    pub fn new(config: NodeConfig, radio: R) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            engine: FloodEngine::new(&config),
            mac: ChannelAccess::new(config.channel),
            radio,
            received_packets: VecDeque::new(),
            current: None,
            stats: NodeStats::default(),
        })
    }

    /// This node's address
    pub fn node_id(&self) -> u8 {
        self.engine.node_id()
    }

    /// Endpoint or relay
    pub fn role(&self) -> Role {
        self.engine.role()
    }

    /// The flood engine (freshness table, sequence counter)
    pub fn engine(&self) -> &FloodEngine {
        &self.engine
    }

    /// The radio
    pub fn radio(&self) -> &R {
        &self.radio
    }

    /// Mutable radio access
    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    /// Counters so far
    pub fn stats(&self) -> &NodeStats {
        &self.stats
    }

    /// Last accepted frame, for relay logging
    pub fn current_frame(&self) -> Option<&Frame> {
        self.current.as_ref()
    }

    /// Originate a frame and put it on the air.
    ///
    /// Returns the sequence id used. `PayloadTooLarge` comes back before
    /// anything is sent so the producer can fragment or give up.
    pub fn send(
        &mut self,
        message_type: MessageType,
        type_id: u8,
        destination: u8,
        payload: &[u8],
    ) -> Result<u16> {
        let frame = self
            .engine
            .originate(message_type, type_id, destination, payload)?;
        let sequence_id = frame.sequence_id();
        self.transmit(&frame)?;
        self.stats.originated += 1;
        Ok(sequence_id)
    }

    /// Originate a typed application message
    pub fn send_message(&mut self, destination: u8, message: &AppMessage) -> Result<u16> {
        self.send(
            message.message_type(),
            message.type_id(),
            destination,
            &message.encode_payload(),
        )
    }

    /// Originate a text message
    pub fn send_text(&mut self, destination: u8, text: &str) -> Result<u16> {
        self.send(MessageType::Text, 0, destination, text.as_bytes())
    }

    /// Tell every receiver to forget this node's sequence ids
    pub fn send_reset(&mut self, destination: u8) -> Result<u16> {
        self.send(MessageType::Reset, 0, destination, &[])
    }

    /// One receive-check / decide / forward step.
    ///
    /// Never waits for input: returns [`PollOutcome::Idle`] at once if the
    /// radio has nothing pending. May wait on the channel when forwarding;
    /// a forward that times out is reported as
    /// [`PollOutcome::ForwardAbandoned`], not as an error.
    pub fn poll(&mut self) -> Result<PollOutcome> {
        let bytes = match self.radio.receive() {
            None => return Ok(PollOutcome::Idle),
            Some(Reception::Invalid { reported_len }) => {
                self.stats.packets_rx += 1;
                self.stats.invalid_drained += 1;
                debug!(reported_len, "discarded invalid packet");
                return Ok(PollOutcome::Discarded { reported_len });
            }
            Some(Reception::Frame(bytes)) => bytes,
        };

        self.stats.packets_rx += 1;
        self.stats.bytes_rx += bytes.len() as u64;

        match self.engine.on_receive(bytes) {
            Err(reason) => {
                self.stats.rejected.record(reason);
                Ok(PollOutcome::Rejected(reason))
            }
            Ok(Disposition::Deliver(frame)) => {
                let header = frame.header();
                self.stats.delivered += 1;
                self.current = Some(frame.clone());
                self.received_packets.push_back(frame);
                Ok(PollOutcome::Delivered(header))
            }
            Ok(Disposition::Forward(frame)) => {
                let header = frame.header();
                // The frame is already recorded as seen, so a busy channel
                // drops it instead of stopping the loop
                let outcome = match self.transmit(&frame) {
                    Ok(()) => {
                        self.stats.forwarded += 1;
                        PollOutcome::Forwarded(header)
                    }
                    Err(MeshError::ChannelAccessTimeout { .. }) => PollOutcome::ForwardAbandoned(header),
                    Err(err) => return Err(err),
                };
                self.current = Some(frame);
                Ok(outcome)
            }
        }
    }

    /// Poll until the radio is idle or `max_steps` polls have run.
    ///
    /// Returns the number of packets processed.
    pub fn run_until_idle(&mut self, max_steps: usize) -> Result<usize> {
        let mut processed = 0;
        for _ in 0..max_steps {
            if self.poll()? == PollOutcome::Idle {
                break;
            }
            processed += 1;
        }
        Ok(processed)
    }

    /// Drain frames delivered to this node
    pub fn receive_packets(&mut self) -> impl Iterator<Item = Frame> + '_ {
        self.received_packets.drain(..)
    }

    /// Are delivered frames waiting?
    pub fn has_received_packets(&self) -> bool {
        !self.received_packets.is_empty()
    }

    fn transmit(&mut self, frame: &Frame) -> Result<()> {
        match self.mac.transmit(&mut self.radio, frame) {
            Ok(report) => {
                self.stats.busy_polls += report.busy_polls as u64;
                self.stats.packets_tx += 1;
                self.stats.bytes_tx += report.bytes as u64;
                Ok(())
            }
            Err(err @ MeshError::ChannelAccessTimeout { attempts }) => {
                self.stats.busy_polls += attempts as u64;
                self.stats.access_timeouts += 1;
                warn!(header = %frame.header(), "transmission abandoned");
                Err(err)
            }
            Err(err) => Err(err),
        }
    }
}
