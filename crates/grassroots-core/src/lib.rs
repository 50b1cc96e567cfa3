//! # Grassroots Mesh Protocol Core
//!
//! This crate implements the protocol core of a low-power LoRa flood mesh:
//! battery-powered sensors originate short messages and relay nodes
//! rebroadcast them toward a basestation, without routing tables.
//!
//! ## Overview
//!
//! - **Framing**: fixed 9-byte header in front of an opaque payload
//! - **Freshness**: per-source sequence tracking suppresses duplicates and loops
//! - **Flood decision**: ordered accept checks, hop budget, deliver or forward
//! - **Channel access**: carrier sense with a fixed backoff before every send
//! - **Serial framing**: the basestation's USB link to the monitoring PC
//!
//! Radio initialization, modulation and sensor acquisition sit behind the
//! [`mesh::RadioLink`] trait and are not part of this crate.
//!
//! ## Packet Flow
//!
//! ```text
//! TX: payload → originate (seq+1, ttl) → carrier sense → radio
//! RX: radio → length → system → destination → source → ttl → freshness → deliver | forward
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use grassroots_core::prelude::*;
//!
//! # fn main() -> grassroots_core::Result<()> {
//! let air = SimulatedAir::new();
//! let mut sensor = MeshNode::new(NodeConfig::endpoint(3), air.attach())?;
//! let mut base = MeshNode::new(NodeConfig::endpoint(1), air.attach())?;
//!
//! sensor.send_text(1, "water level 42cm")?;
//! base.poll()?;
//! for frame in base.receive_packets() {
//!     println!("{}", frame.header());
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod mesh;
pub mod serial;

// Re-export main types
pub use config::{ChannelAccessConfig, NodeConfig, ProtocolConfig};
pub use error::{FrameError, MeshError, RejectReason, Result};
pub use serial::SerialCodec;

// Mesh re-exports
pub use mesh::{Frame, Header, MeshNode, MessageType, RadioLink, Role};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{ChannelAccessConfig, NodeConfig, ProtocolConfig};
    pub use crate::error::{MeshError, RejectReason};
    pub use crate::mesh::{
        AppMessage, Frame, Header, MeshNode, MessageType, PollOutcome, RadioLink, Role,
        SimulatedAir,
    };
}
