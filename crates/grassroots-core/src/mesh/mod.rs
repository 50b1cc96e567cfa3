//! Flood-routing mesh protocol core
//!
//! Sensor endpoints originate short frames; relays rebroadcast them toward
//! the basestation. There are no routing tables. Loops are suppressed by
//! a per-source freshness table and every frame carries a hop budget.
//!
//! - **Frame**: 9-byte header codec and the owned frame buffer
//! - **Message**: message types and application payload codecs
//! - **Freshness**: last sequence id seen per source
//! - **Flood**: ordered receive checks and the deliver / forward decision
//! - **MAC**: carrier sense with fixed backoff
//! - **Node**: the poll loop tying it all to a [`RadioLink`]
//! - **Simulation**: in-memory air for tests and the CLI
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Application Layer                                  │
//! │          (pixel segments, apparatus requests, text, reset)              │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                                  │
//!                                  ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           MeshNode                                      │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐     │
//! │  │    send     │  │    poll     │  │   deliver   │  │   forward   │     │
//! │  └─────────────┘  └─────────────┘  └─────────────┘  └─────────────┘     │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                                  │
//!                                  ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         FloodEngine                                     │
//! │  ┌───────────────────────────┐  ┌─────────────────────────────────────┐ │
//! │  │   FreshnessTracker        │  │      ordered checks                 │ │
//! │  │  (last seq per source)    │  │  len, sys, dst, src, ttl, seq       │ │
//! │  └───────────────────────────┘  └─────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                                  │
//!                                  ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   ChannelAccess + RadioLink                             │
//! │  ┌────────────────┐  ┌─────────────┐  ┌─────────────┐                   │
//! │  │ signal_present │  │  transmit   │  │   receive   │                   │
//! │  └────────────────┘  └─────────────┘  └─────────────┘                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use grassroots_core::mesh::{MeshNode, SimulatedAir};
//! use grassroots_core::NodeConfig;
//!
//! let air = SimulatedAir::new();
//! let mut sensor = MeshNode::new(NodeConfig::endpoint(3), air.attach())?;
//! let mut relay = MeshNode::new(NodeConfig::relay(0), air.attach())?;
//!
//! sensor.send_text(1, "level=42")?;
//! relay.poll()?; // rebroadcasts with ttl 4
//! ```

pub mod traits;
pub mod frame;
pub mod message;
pub mod freshness;
pub mod flood;
pub mod mac;
pub mod node;
pub mod simulation;

// Re-export main types
pub use traits::{NodeStats, RadioLink, Reception, RejectCounts};
pub use frame::{Frame, Header, HEADER_LEN, MAX_FRAME};
pub use message::{AppMessage, MessageType, PixelSegment};
pub use freshness::FreshnessTracker;
pub use flood::{Disposition, FloodEngine, Role};
pub use mac::{AccessReport, ChannelAccess, ChannelState};
pub use node::{MeshNode, PollOutcome};
pub use simulation::{MeshSimulator, SimConfig, SimRadio, SimStats, SimulatedAir, Topology};
