//! Multi-node mesh simulation
//!
//! This module provides an in-memory radio medium for testing flood
//! behavior without hardware. It models:
//!
//! - Which radios hear which (explicit links, or everyone hears everyone)
//! - Per-radio receive queues
//! - A jammed channel that stays busy for a number of carrier-sense polls
//! - A log of every transmission
//!
//! ## Example
//!
//! ```ignore
//! use grassroots_core::mesh::simulation::{MeshSimulator, SimConfig, Topology};
//!
//! // Sensor and basestation at the ends of a three-relay chain
//! let config = SimConfig::default().with_topology(Topology::Line).with_relays(3);
//! let mut sim = MeshSimulator::new(config)?;
//!
//! sim.send_text(0, 2, "hello")?;
//! sim.run(1000);
//!
//! println!("Delivered: {}", sim.stats().deliveries);
//! ```

use super::flood::Role;
use super::frame::{Frame, Header};
use super::node::{MeshNode, PollOutcome};
use super::traits::{NodeStats, RadioLink, Reception, RejectCounts};
use crate::config::{ChannelAccessConfig, NodeConfig, ProtocolConfig};
use crate::error::{MeshError, RejectReason, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

/// One frame put on the simulated air
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transmission {
    /// Index of the transmitting radio
    pub from: usize,
    /// Wire bytes
    pub bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct AirState {
    /// Receive queue per attached radio
    inboxes: Vec<VecDeque<Reception>>,
    /// Explicit (from, to) links; `None` means everyone hears everyone
    links: Option<HashSet<(usize, usize)>>,
    /// Remaining carrier-sense polls that report busy
    jammed_polls: u32,
    /// Every transmission so far
    log: Vec<Transmission>,
}

impl AirState {
    fn hears(&self, from: usize, to: usize) -> bool {
        from != to
            && match &self.links {
                None => true,
                Some(links) => links.contains(&(from, to)),
            }
    }
}

/// Shared in-memory radio medium
#[derive(Debug, Clone, Default)]
pub struct SimulatedAir {
    state: Arc<Mutex<AirState>>,
}

impl SimulatedAir {
    /// Empty medium where every radio hears every other
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, AirState> {
        // A panic while holding the lock leaves no partial update behind
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Attach a new radio to the medium
    pub fn attach(&self) -> SimRadio {
        let mut state = self.state();
        state.inboxes.push(VecDeque::new());
        SimRadio {
            index: state.inboxes.len() - 1,
            air: self.clone(),
        }
    }

    /// Let radios `a` and `b` hear each other.
    ///
    /// The first call switches the medium from "everyone hears everyone"
    /// to explicit links.
    pub fn link(&self, a: usize, b: usize) {
        let mut state = self.state();
        let links = state.links.get_or_insert_with(HashSet::new);
        links.insert((a, b));
        links.insert((b, a));
    }

    /// Report the channel busy for the next `polls` carrier-sense checks
    pub fn jam(&self, polls: u32) {
        self.state().jammed_polls = polls;
    }

    /// Every transmission so far
    pub fn transmissions(&self) -> Vec<Transmission> {
        self.state().log.clone()
    }

    /// Packets waiting in radio `index`'s receive queue
    pub fn pending(&self, index: usize) -> usize {
        self.state().inboxes.get(index).map_or(0, VecDeque::len)
    }

    fn broadcast(&self, from: usize, bytes: &[u8]) {
        let mut state = self.state();
        let receivers: Vec<usize> = (0..state.inboxes.len())
            .filter(|to| state.hears(from, *to))
            .collect();
        for to in receivers {
            state.inboxes[to].push_back(Reception::Frame(bytes.to_vec()));
        }
        state.log.push(Transmission {
            from,
            bytes: bytes.to_vec(),
        });
    }
}

/// A radio attached to a [`SimulatedAir`]
#[derive(Debug, Clone)]
pub struct SimRadio {
    index: usize,
    air: SimulatedAir,
}

impl SimRadio {
    /// Position of this radio on the medium
    pub fn index(&self) -> usize {
        self.index
    }

    /// Queue raw bytes as if they had been received
    pub fn inject(&mut self, bytes: Vec<u8>) {
        self.air.state().inboxes[self.index].push_back(Reception::Frame(bytes));
    }

    /// Queue an adapter-level invalid packet
    pub fn inject_invalid(&mut self, reported_len: usize) {
        self.air.state().inboxes[self.index].push_back(Reception::Invalid { reported_len });
    }
}

impl RadioLink for SimRadio {
    fn signal_present(&mut self) -> bool {
        let mut state = self.air.state();
        if state.jammed_polls > 0 {
            state.jammed_polls -= 1;
            true
        } else {
            false
        }
    }

    fn transmit(&mut self, frame: &[u8]) -> Result<()> {
        self.air.broadcast(self.index, frame);
        Ok(())
    }

    fn receive(&mut self) -> Option<Reception> {
        self.air.state().inboxes[self.index].pop_front()
    }

    fn wait(&mut self, _duration: Duration) {
        // Simulated time: the jam counter advances per poll instead
    }
}

/// How simulated nodes are wired together
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Topology {
    /// First endpoint, then a chain of relays, then the other endpoints
    Line,
    /// Endpoints hear only relays; relays hear everyone
    Star,
    /// Everyone hears everyone
    Full,
}

/// Simulation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Wiring
    pub topology: Topology,
    /// Number of relay nodes (all use address 0)
    pub relays: usize,
    /// Number of endpoints (addresses 1..=endpoints)
    pub endpoints: usize,
    /// Deployment constants shared by all nodes
    pub protocol: ProtocolConfig,
    /// Carrier-sense pacing shared by all nodes
    pub channel: ChannelAccessConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            topology: Topology::Line,
            relays: 2,
            endpoints: 2,
            protocol: ProtocolConfig::default(),
            channel: ChannelAccessConfig::default(),
        }
    }
}

impl SimConfig {
    pub fn with_topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }

    pub fn with_relays(mut self, relays: usize) -> Self {
        self.relays = relays;
        self
    }

    pub fn with_endpoints(mut self, endpoints: usize) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_protocol(mut self, protocol: ProtocolConfig) -> Self {
        self.protocol = protocol;
        self
    }
}

/// Simulation events for logging
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    Sent { node_idx: usize, header: Header },
    Delivered { node_idx: usize, header: Header },
    Forwarded { node_idx: usize, header: Header },
    ForwardAbandoned { node_idx: usize, header: Header },
    Rejected { node_idx: usize, reason: RejectReason },
    SendFailed { node_idx: usize, error: String },
}

/// Simulation statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimStats {
    /// Messages originated
    pub messages_sent: u64,
    /// Local deliveries across all endpoints
    pub deliveries: u64,
    /// Relay rebroadcasts
    pub forwards: u64,
    /// Frames put on the air
    pub transmissions: u64,
    /// Drops across all nodes
    pub rejected: RejectCounts,
    /// Poll rounds until quiescence
    pub rounds: usize,
    /// Per-node statistics
    pub per_node: Vec<SimNodeStats>,
}

impl SimStats {
    /// Fraction of sent messages that were delivered at least once
    pub fn delivery_rate(&self) -> f64 {
        if self.messages_sent == 0 {
            0.0
        } else {
            self.deliveries as f64 / self.messages_sent as f64
        }
    }
}

/// Statistics for one simulated node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimNodeStats {
    pub node_idx: usize,
    pub node_id: u8,
    pub role: Role,
    pub stats: NodeStats,
}

/// Multi-node flood simulator
pub struct MeshSimulator {
    config: SimConfig,
    air: SimulatedAir,
    nodes: Vec<MeshNode<SimRadio>>,
    /// Frames delivered per node, in arrival order
    delivered: Vec<Vec<Frame>>,
    events: Vec<SimEvent>,
    messages_sent: u64,
    rounds: usize,
}

impl std::fmt::Debug for MeshSimulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeshSimulator")
            .field("topology", &self.config.topology)
            .field("nodes", &self.nodes.len())
            .finish()
    }
}

impl MeshSimulator {
    /// Build nodes and wire them per the configured topology
    pub fn new(config: SimConfig) -> Result<Self> {
        if config.endpoints == 0 {
            return Err(MeshError::Config("simulation needs at least one endpoint".into()));
        }

        let air = SimulatedAir::new();
        let mut nodes = Vec::new();
        let mut endpoint_idx = Vec::new();
        let mut relay_idx = Vec::new();

        let add = |node_config: NodeConfig, nodes: &mut Vec<MeshNode<SimRadio>>| -> Result<usize> {
            let node_config = node_config
                .with_protocol(config.protocol)
                .with_channel(config.channel);
            nodes.push(MeshNode::new(node_config, air.attach())?);
            Ok(nodes.len() - 1)
        };

        // Line order: E1, R1..Rn, E2..Em
        endpoint_idx.push(add(NodeConfig::endpoint(1), &mut nodes)?);
        for _ in 0..config.relays {
            relay_idx.push(add(NodeConfig::relay(0), &mut nodes)?);
        }
        for id in 2..=config.endpoints {
            endpoint_idx.push(add(NodeConfig::endpoint(id as u8), &mut nodes)?);
        }

        match config.topology {
            Topology::Full => {}
            Topology::Line => {
                let mut chain = vec![endpoint_idx[0]];
                chain.extend(&relay_idx);
                for pair in chain.windows(2) {
                    air.link(pair[0], pair[1]);
                }
                let tail = *chain.last().unwrap_or(&endpoint_idx[0]);
                for &idx in &endpoint_idx[1..] {
                    air.link(tail, idx);
                }
            }
            Topology::Star => {
                for (i, &relay) in relay_idx.iter().enumerate() {
                    for &endpoint in &endpoint_idx {
                        air.link(relay, endpoint);
                    }
                    for &other in &relay_idx[i + 1..] {
                        air.link(relay, other);
                    }
                }
            }
        }

        let delivered = vec![Vec::new(); nodes.len()];
        Ok(Self {
            config,
            air,
            nodes,
            delivered,
            events: Vec::new(),
            messages_sent: 0,
            rounds: 0,
        })
    }

    /// The shared medium
    pub fn air(&self) -> &SimulatedAir {
        &self.air
    }

    /// Number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Node by index
    pub fn node(&self, idx: usize) -> Option<&MeshNode<SimRadio>> {
        self.nodes.get(idx)
    }

    /// Index of the endpoint with address `node_id`
    pub fn endpoint_index(&self, node_id: u8) -> Option<usize> {
        self.nodes
            .iter()
            .position(|n| n.role() == Role::Endpoint && n.node_id() == node_id)
    }

    /// Frames delivered to node `idx`
    pub fn delivered(&self, idx: usize) -> &[Frame] {
        self.delivered.get(idx).map_or(&[], Vec::as_slice)
    }

    /// Event log
    pub fn events(&self) -> &[SimEvent] {
        &self.events
    }

    /// Originate a text message from node `idx`
    pub fn send_text(&mut self, idx: usize, destination: u8, text: &str) -> Result<u16> {
        let node = self
            .nodes
            .get_mut(idx)
            .ok_or_else(|| MeshError::Config(format!("no node at index {}", idx)))?;

        match node.send_text(destination, text) {
            Ok(sequence_id) => {
                self.messages_sent += 1;
                if let Some(header) = self.air.transmissions().last().map(|t| t.bytes.clone()) {
                    if let Ok(header) = Header::parse(&header, usize::MAX) {
                        self.events.push(SimEvent::Sent { node_idx: idx, header });
                    }
                }
                Ok(sequence_id)
            }
            Err(err) => {
                self.events.push(SimEvent::SendFailed {
                    node_idx: idx,
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Poll every node round-robin until the air is quiet.
    ///
    /// Returns the number of rounds run.
    pub fn run(&mut self, max_rounds: usize) -> usize {
        let mut rounds = 0;
        while rounds < max_rounds {
            rounds += 1;
            let mut active = false;
            for idx in 0..self.nodes.len() {
                match self.nodes[idx].poll() {
                    Ok(PollOutcome::Idle) => {}
                    Ok(outcome) => {
                        active = true;
                        self.record(idx, outcome);
                    }
                    Err(err) => {
                        active = true;
                        warn!(node_idx = idx, error = %err, "poll failed");
                        self.events.push(SimEvent::SendFailed {
                            node_idx: idx,
                            error: err.to_string(),
                        });
                    }
                }
            }
            if !active {
                break;
            }
        }
        self.rounds += rounds;
        debug!(rounds, "simulation quiescent");
        rounds
    }

    fn record(&mut self, node_idx: usize, outcome: PollOutcome) {
        match outcome {
            PollOutcome::Delivered(header) => {
                let frames: Vec<Frame> = self.nodes[node_idx].receive_packets().collect();
                self.delivered[node_idx].extend(frames);
                self.events.push(SimEvent::Delivered { node_idx, header });
            }
            PollOutcome::Forwarded(header) => {
                self.events.push(SimEvent::Forwarded { node_idx, header });
            }
            PollOutcome::ForwardAbandoned(header) => {
                self.events.push(SimEvent::ForwardAbandoned { node_idx, header });
            }
            PollOutcome::Rejected(reason) => {
                self.events.push(SimEvent::Rejected { node_idx, reason });
            }
            PollOutcome::Discarded { .. } | PollOutcome::Idle => {}
        }
    }

    /// Aggregate statistics
    pub fn stats(&self) -> SimStats {
        let mut stats = SimStats {
            messages_sent: self.messages_sent,
            transmissions: self.air.transmissions().len() as u64,
            rounds: self.rounds,
            ..Default::default()
        };
        for (node_idx, node) in self.nodes.iter().enumerate() {
            let node_stats = node.stats().clone();
            stats.deliveries += node_stats.delivered;
            stats.forwards += node_stats.forwarded;
            stats.rejected.merge(&node_stats.rejected);
            stats.per_node.push(SimNodeStats {
                node_idx,
                node_id: node.node_id(),
                role: node.role(),
                stats: node_stats,
            });
        }
        stats
    }
}
