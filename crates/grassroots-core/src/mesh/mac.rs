//! Channel access control
//!
//! Carrier sense before every transmission:
//!
//! 1. Ask the radio whether a signal is present on the channel
//! 2. If busy, wait a fixed backoff interval and ask again
//! 3. If clear, transmit immediately
//!
//! This is collision avoidance only. There is no random contention
//! window and no collision detection once a transmission starts. The
//! firmware polls forever; here the number of busy polls is bounded by
//! [`ChannelAccessConfig::max_attempts`] unless configured unbounded.

use super::frame::Frame;
use super::traits::RadioLink;
use crate::config::ChannelAccessConfig;
use crate::error::{MeshError, Result};
use tracing::{trace, warn};

/// Result of one carrier-sense poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No signal detected, transmission may start
    Clear,
    /// Someone is on the air
    Busy,
}

/// Summary of one completed channel access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessReport {
    /// Busy polls before the channel cleared
    pub busy_polls: u32,
    /// Bytes handed to the radio
    pub bytes: usize,
}

/// Single-slot carrier-sense gate in front of the radio
#[derive(Debug, Clone)]
pub struct ChannelAccess {
    config: ChannelAccessConfig,
}

impl ChannelAccess {
    /// Create a controller with the given pacing
    pub fn new(config: ChannelAccessConfig) -> Self {
        Self { config }
    }

    /// Pacing in use
    pub fn config(&self) -> &ChannelAccessConfig {
        &self.config
    }

    /// One non-blocking carrier-sense poll
    pub fn sense<R: RadioLink + ?Sized>(&self, radio: &mut R) -> ChannelState {
        if radio.signal_present() {
            ChannelState::Busy
        } else {
            ChannelState::Clear
        }
    }

    /// Wait for a clear channel, then transmit `frame`.
    ///
    /// Blocks (through [`RadioLink::wait`]) while the channel is busy.
    /// Once transmission starts it is not abortable.
    pub fn transmit<R: RadioLink + ?Sized>(&self, radio: &mut R, frame: &Frame) -> Result<AccessReport> {
        let mut busy_polls: u32 = 0;

        while self.sense(radio) == ChannelState::Busy {
            busy_polls = busy_polls.saturating_add(1);
            if let Some(max) = self.config.max_attempts {
                if busy_polls >= max {
                    warn!(
                        attempts = busy_polls,
                        seq = frame.sequence_id(),
                        "channel never cleared, giving up"
                    );
                    return Err(MeshError::ChannelAccessTimeout {
                        attempts: busy_polls,
                    });
                }
            }
            trace!(busy_polls, backoff_ms = self.config.backoff_ms, "channel busy, deferring");
            radio.wait(self.config.backoff());
        }

        radio.transmit(frame.as_bytes())?;
        Ok(AccessReport {
            busy_polls,
            bytes: frame.len(),
        })
    }
}

impl Default for ChannelAccess {
    fn default() -> Self {
        Self::new(ChannelAccessConfig::default())
    }
}
