//! Radio adapter interface and node statistics
//!
//! The protocol core never touches modulation settings or the SPI bus.
//! It needs three things from a transceiver: "is someone talking right
//! now", "send these bytes", and "hand me the next packet, if any".

use crate::error::{RejectReason, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::time::Duration;

/// One poll of the radio's receive path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reception {
    /// Raw frame bytes, header included
    Frame(Vec<u8>),
    /// Transport reported a size outside `[0, max_frame]`; the adapter
    /// has drained the packet and the core discards it unparsed
    Invalid { reported_len: usize },
}

/// Transceiver operations used by the protocol core
///
/// Implementations wrap a concrete radio (an SX127x driver, a serial
/// modem, the in-memory simulator). Modulation parameters, frequency and
/// power stay on the implementation side.
pub trait RadioLink: Debug {
    /// Is a signal currently present on the channel?
    ///
    /// For LoRa this is the preamble / signal-detected status bit.
    fn signal_present(&mut self) -> bool;

    /// Transmit one complete frame
    fn transmit(&mut self, frame: &[u8]) -> Result<()>;

    /// Next received packet, or `None` immediately if nothing is pending
    fn receive(&mut self) -> Option<Reception>;

    /// Pause between carrier-sense polls
    fn wait(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl<R: RadioLink + ?Sized> RadioLink for Box<R> {
    fn signal_present(&mut self) -> bool {
        (**self).signal_present()
    }

    fn transmit(&mut self, frame: &[u8]) -> Result<()> {
        (**self).transmit(frame)
    }

    fn receive(&mut self) -> Option<Reception> {
        (**self).receive()
    }

    fn wait(&mut self, duration: Duration) {
        (**self).wait(duration)
    }
}

/// Drop counters, one per reject reason
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectCounts {
    pub frame_too_short: u64,
    pub frame_too_long: u64,
    pub wrong_system: u64,
    pub not_addressed_to_me: u64,
    pub unknown_source: u64,
    pub no_budget_remaining: u64,
    pub stale_or_duplicate: u64,
}

impl RejectCounts {
    /// Count one rejection
    pub fn record(&mut self, reason: RejectReason) {
        let counter = match reason {
            RejectReason::FrameTooShort => &mut self.frame_too_short,
            RejectReason::FrameTooLong => &mut self.frame_too_long,
            RejectReason::WrongSystem => &mut self.wrong_system,
            RejectReason::NotAddressedToMe => &mut self.not_addressed_to_me,
            RejectReason::UnknownSource => &mut self.unknown_source,
            RejectReason::NoBudgetRemaining => &mut self.no_budget_remaining,
            RejectReason::StaleOrDuplicate => &mut self.stale_or_duplicate,
        };
        *counter += 1;
    }

    /// Count for a single reason
    pub fn get(&self, reason: RejectReason) -> u64 {
        match reason {
            RejectReason::FrameTooShort => self.frame_too_short,
            RejectReason::FrameTooLong => self.frame_too_long,
            RejectReason::WrongSystem => self.wrong_system,
            RejectReason::NotAddressedToMe => self.not_addressed_to_me,
            RejectReason::UnknownSource => self.unknown_source,
            RejectReason::NoBudgetRemaining => self.no_budget_remaining,
            RejectReason::StaleOrDuplicate => self.stale_or_duplicate,
        }
    }

    /// All rejections
    pub fn total(&self) -> u64 {
        self.frame_too_short
            + self.frame_too_long
            + self.wrong_system
            + self.not_addressed_to_me
            + self.unknown_source
            + self.no_budget_remaining
            + self.stale_or_duplicate
    }

    /// Add another node's counts
    pub fn merge(&mut self, other: &RejectCounts) {
        self.frame_too_short += other.frame_too_short;
        self.frame_too_long += other.frame_too_long;
        self.wrong_system += other.wrong_system;
        self.not_addressed_to_me += other.not_addressed_to_me;
        self.unknown_source += other.unknown_source;
        self.no_budget_remaining += other.no_budget_remaining;
        self.stale_or_duplicate += other.stale_or_duplicate;
    }
}

/// Statistics for one node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStats {
    /// Packets pulled from the radio (valid or not)
    pub packets_rx: u64,
    /// Frames put on the air
    pub packets_tx: u64,
    /// Frames this node originated
    pub originated: u64,
    /// Frames rebroadcast as a relay
    pub forwarded: u64,
    /// Frames delivered to the local application
    pub delivered: u64,
    /// Packets the adapter flagged as invalid and drained
    pub invalid_drained: u64,
    /// Dropped frames by reason
    pub rejected: RejectCounts,
    /// Carrier-sense polls that found the channel busy
    pub busy_polls: u64,
    /// Sends abandoned because the channel never cleared
    pub access_timeouts: u64,
    /// Bytes transmitted
    pub bytes_tx: u64,
    /// Bytes received
    pub bytes_rx: u64,
}
