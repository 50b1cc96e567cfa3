//! Node and deployment configuration.
//!
//! [`ProtocolConfig`] holds the constants that must agree across every node
//! of one deployment. [`NodeConfig`] adds the per-node identity and the
//! channel-access pacing.

use crate::error::{MeshError, Result};
use crate::mesh::flood::Role;
use crate::mesh::frame::{HEADER_LEN, MAX_FRAME};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Deployment-wide protocol constants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Logical network identifier; frames for other systems are discarded
    pub system_id: u8,
    /// Size of the freshness table; valid source ids are `0..max_nodes`
    pub max_nodes: usize,
    /// Rebroadcast budget stamped on originated frames
    pub initial_ttl: u8,
    /// Largest frame (header + payload) the transport carries
    pub max_frame: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            system_id: 111,
            max_nodes: 25,
            initial_ttl: 5,
            // Keeps SF7/125 kHz airtime inside the US915 dwell limit
            max_frame: 222,
        }
    }
}

impl ProtocolConfig {
    /// Check the constants against the physical limits of the frame format
    pub fn validate(&self) -> Result<()> {
        if self.max_frame < HEADER_LEN || self.max_frame > MAX_FRAME {
            return Err(MeshError::Config(format!(
                "max_frame {} outside {}..={}",
                self.max_frame, HEADER_LEN, MAX_FRAME
            )));
        }
        if self.max_nodes == 0 || self.max_nodes > 256 {
            return Err(MeshError::Config(format!(
                "max_nodes {} outside 1..=256",
                self.max_nodes
            )));
        }
        Ok(())
    }

    /// Room left for payload behind the header
    pub fn max_payload(&self) -> usize {
        self.max_frame.saturating_sub(HEADER_LEN)
    }
}

/// Carrier-sense pacing for the channel access controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelAccessConfig {
    /// Wait between carrier-sense polls while the channel is busy (ms)
    pub backoff_ms: u64,
    /// Give up after this many busy polls; `None` waits forever
    pub max_attempts: Option<u32>,
}

impl Default for ChannelAccessConfig {
    fn default() -> Self {
        Self {
            backoff_ms: 100,
            max_attempts: Some(300),
        }
    }
}

impl ChannelAccessConfig {
    /// Unbounded waiting, matching the firmware's `while (busy) wait`
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            ..Default::default()
        }
    }

    /// Backoff interval as a `Duration`
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// Configuration for one mesh node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// This node's address; relays conventionally use 0
    pub node_id: u8,
    /// Endpoint or relay behavior
    pub role: Role,
    /// Deployment constants
    pub protocol: ProtocolConfig,
    /// Carrier-sense pacing
    pub channel: ChannelAccessConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: 0,
            role: Role::Relay,
            protocol: ProtocolConfig::default(),
            channel: ChannelAccessConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Endpoint (sensor or basestation) with the given address
    pub fn endpoint(node_id: u8) -> Self {
        Self {
            node_id,
            role: Role::Endpoint,
            ..Default::default()
        }
    }

    /// Relay with the given address
    pub fn relay(node_id: u8) -> Self {
        Self {
            node_id,
            role: Role::Relay,
            ..Default::default()
        }
    }

    /// Builder: set the protocol constants
    pub fn with_protocol(mut self, protocol: ProtocolConfig) -> Self {
        self.protocol = protocol;
        self
    }

    /// Builder: set the system id
    pub fn with_system_id(mut self, system_id: u8) -> Self {
        self.protocol.system_id = system_id;
        self
    }

    /// Builder: set channel access pacing
    pub fn with_channel(mut self, channel: ChannelAccessConfig) -> Self {
        self.channel = channel;
        self
    }

    /// Validate the whole configuration
    pub fn validate(&self) -> Result<()> {
        self.protocol.validate()?;
        if self.role == Role::Endpoint && self.node_id as usize >= self.protocol.max_nodes {
            return Err(MeshError::Config(format!(
                "node_id {} cannot originate traffic with max_nodes {}",
                self.node_id, self.protocol.max_nodes
            )));
        }
        Ok(())
    }
}
