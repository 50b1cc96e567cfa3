//! Integration tests driving flood decisions and whole nodes.

use grassroots_core::mesh::flood::{Disposition, FloodEngine};
use grassroots_core::mesh::simulation::{MeshSimulator, SimConfig, SimulatedAir, Topology};
use grassroots_core::mesh::{Frame, Header, MeshNode, MessageType, PollOutcome};
use grassroots_core::{NodeConfig, ProtocolConfig, RejectReason};

fn raw_frame(system_id: u8, source: u8, dest: u8, seq: u16, message_type: MessageType, ttl: u8) -> Vec<u8> {
    let header = Header {
        length: 0,
        system_id,
        source,
        destination: dest,
        sequence_id: seq,
        message_type,
        type_id: 0,
        ttl,
    };
    Frame::new(&header, b"hi", 222).unwrap().into_bytes()
}

fn text(seq: u16) -> Vec<u8> {
    raw_frame(111, 2, 3, seq, MessageType::Text, 5)
}

#[test]
fn test_endpoint_accepts_then_rejects_replay() {
    let mut node = FloodEngine::new(&NodeConfig::endpoint(3));

    match node.on_receive(text(1)) {
        Ok(Disposition::Deliver(frame)) => {
            assert_eq!(frame.payload(), b"hi");
            assert_eq!(frame.ttl(), 5);
        }
        other => panic!("expected local delivery, got {:?}", other),
    }
    assert_eq!(node.on_receive(text(1)), Err(RejectReason::StaleOrDuplicate));
}

#[test]
fn test_relay_forwards_with_decremented_ttl() {
    let mut relay = FloodEngine::new(&NodeConfig::relay(0));
    let received = text(1);

    let forwarded = match relay.on_receive(received.clone()) {
        Ok(Disposition::Forward(frame)) => frame,
        other => panic!("expected forward, got {:?}", other),
    };
    assert_eq!(forwarded.ttl(), 4);

    // Only the ttl byte changes
    let bytes = forwarded.as_bytes();
    assert_eq!(bytes.len(), received.len());
    assert_eq!(&bytes[..8], &received[..8]);
    assert_eq!(&bytes[9..], &received[9..]);

    assert_eq!(relay.on_receive(received), Err(RejectReason::StaleOrDuplicate));
}

#[test]
fn test_wrong_system_leaves_tracker_untouched() {
    let mut node = FloodEngine::new(&NodeConfig::endpoint(3));
    let frame = raw_frame(112, 2, 3, 1, MessageType::Text, 5);

    assert_eq!(node.on_receive(frame), Err(RejectReason::WrongSystem));
    assert_eq!(node.tracker().last_seen(2), Some(0));

    // The same sequence is still fresh for the right system
    assert!(node.on_receive(text(1)).is_ok());
}

#[test]
fn test_relay_drops_exhausted_budget() {
    let mut relay = FloodEngine::new(&NodeConfig::relay(0));
    let frame = raw_frame(111, 2, 3, 50, MessageType::Text, 0);

    assert_eq!(relay.on_receive(frame), Err(RejectReason::NoBudgetRemaining));
    assert_eq!(relay.tracker().last_seen(2), Some(0));
}

#[test]
fn test_endpoint_ignores_budget() {
    let mut node = FloodEngine::new(&NodeConfig::endpoint(3));
    let frame = raw_frame(111, 2, 3, 1, MessageType::Text, 0);
    assert!(matches!(node.on_receive(frame), Ok(Disposition::Deliver(_))));
}

#[test]
fn test_unknown_source() {
    let mut relay = FloodEngine::new(&NodeConfig::relay(0));
    let frame = raw_frame(111, 25, 1, 1, MessageType::Text, 5);
    assert_eq!(relay.on_receive(frame), Err(RejectReason::UnknownSource));
}

#[test]
fn test_length_bounds_checked_first() {
    let mut relay = FloodEngine::new(&NodeConfig::relay(0));

    assert_eq!(relay.on_receive(vec![0; 8]), Err(RejectReason::FrameTooShort));
    assert_eq!(relay.on_receive(vec![0; 223]), Err(RejectReason::FrameTooLong));

    // Exactly a header is a valid, empty-payload frame
    let mut header_only = text(1);
    header_only.truncate(9);
    assert!(relay.on_receive(header_only).is_ok());
}

#[test]
fn test_reset_allows_restarted_source() {
    let mut node = FloodEngine::new(&NodeConfig::endpoint(3));

    assert!(node.on_receive(text(40)).is_ok());
    assert_eq!(node.on_receive(text(2)), Err(RejectReason::StaleOrDuplicate));

    let reset = raw_frame(111, 2, 3, 41, MessageType::Reset, 5);
    assert!(node.on_receive(reset).is_ok());
    assert_eq!(node.tracker().last_seen(2), Some(0));

    assert!(node.on_receive(text(1)).is_ok());
    assert_eq!(node.tracker().last_seen(2), Some(1));
}

#[test]
fn test_stale_reset_is_ignored() {
    let mut node = FloodEngine::new(&NodeConfig::endpoint(3));
    assert!(node.on_receive(text(40)).is_ok());

    let reset = raw_frame(111, 2, 3, 40, MessageType::Reset, 5);
    assert_eq!(node.on_receive(reset), Err(RejectReason::StaleOrDuplicate));
    assert_eq!(node.tracker().last_seen(2), Some(40));
}

#[test]
fn test_sensor_relay_basestation_chain() {
    let air = SimulatedAir::new();
    let mut sensor = MeshNode::new(NodeConfig::endpoint(3), air.attach()).unwrap();
    let mut relay = MeshNode::new(NodeConfig::relay(0), air.attach()).unwrap();
    let mut base = MeshNode::new(NodeConfig::endpoint(1), air.attach()).unwrap();
    // sensor (0) <-> relay (1) <-> base (2)
    air.link(0, 1);
    air.link(1, 2);

    sensor.send_text(1, "level=42").unwrap();
    assert_eq!(base.poll().unwrap(), PollOutcome::Idle);

    match relay.poll().unwrap() {
        PollOutcome::Forwarded(header) => assert_eq!(header.ttl, 4),
        other => panic!("expected forward, got {:?}", other),
    }

    match base.poll().unwrap() {
        PollOutcome::Delivered(header) => {
            assert_eq!(header.source, 3);
            assert_eq!(header.ttl, 4);
        }
        other => panic!("expected delivery, got {:?}", other),
    }
    let delivered: Vec<Frame> = base.receive_packets().collect();
    assert_eq!(delivered[0].payload(), b"level=42");

    // The sensor hears the rebroadcast of its own frame; it is not the destination
    assert_eq!(
        sensor.poll().unwrap(),
        PollOutcome::Rejected(RejectReason::NotAddressedToMe)
    );
    assert_eq!(relay.stats().forwarded, 1);
    assert_eq!(air.transmissions().len(), 2);
}

#[test]
fn test_ttl_bounds_hop_count() {
    // Five relays: the last one forwards with ttl 0 and the endpoint still delivers
    let mut sim = MeshSimulator::new(
        SimConfig::default()
            .with_topology(Topology::Line)
            .with_relays(5),
    )
    .unwrap();
    sim.send_text(0, 2, "five hops").unwrap();
    sim.run(100);
    let stats = sim.stats();
    assert_eq!(stats.deliveries, 1);
    assert_eq!(stats.forwards, 5);
    // Relay four hears relay five's ttl 0 echo
    assert_eq!(stats.rejected.no_budget_remaining, 1);

    // Six relays: the sixth sees ttl 0 and drops it
    let mut sim = MeshSimulator::new(
        SimConfig::default()
            .with_topology(Topology::Line)
            .with_relays(6),
    )
    .unwrap();
    sim.send_text(0, 2, "too far").unwrap();
    sim.run(100);
    let stats = sim.stats();
    assert_eq!(stats.deliveries, 0);
    assert_eq!(stats.forwards, 5);
    assert_eq!(stats.rejected.no_budget_remaining, 2);
}

#[test]
fn test_star_delivers_once_despite_duplicates() {
    let mut sim = MeshSimulator::new(
        SimConfig::default()
            .with_topology(Topology::Star)
            .with_relays(2)
            .with_endpoints(3),
    )
    .unwrap();
    let sensor = sim.endpoint_index(2).unwrap();
    let base = sim.endpoint_index(1).unwrap();

    sim.send_text(sensor, 1, "one").unwrap();
    sim.run(100);

    assert_eq!(sim.delivered(base).len(), 1);
    let stats = sim.stats();
    assert_eq!(stats.deliveries, 1);
    assert_eq!(stats.forwards, 2);
    assert!(stats.rejected.stale_or_duplicate >= 1);
}

#[test]
fn test_other_system_is_isolated() {
    let air = SimulatedAir::new();
    let mut sensor =
        MeshNode::new(NodeConfig::endpoint(3).with_system_id(112), air.attach()).unwrap();
    let mut relay = MeshNode::new(NodeConfig::relay(0), air.attach()).unwrap();

    sensor.send_text(1, "neighbor network").unwrap();
    assert_eq!(
        relay.poll().unwrap(),
        PollOutcome::Rejected(RejectReason::WrongSystem)
    );
    assert_eq!(relay.engine().tracker().last_seen(3), Some(0));
}

#[test]
fn test_smaller_deployment_limits() {
    let protocol = ProtocolConfig {
        max_nodes: 4,
        max_frame: 32,
        ..Default::default()
    };
    let mut relay = FloodEngine::new(&NodeConfig::relay(0).with_protocol(protocol));

    assert_eq!(
        relay.on_receive(raw_frame(111, 4, 1, 1, MessageType::Text, 5)),
        Err(RejectReason::UnknownSource)
    );
    assert_eq!(relay.on_receive(vec![0; 33]), Err(RejectReason::FrameTooLong));
    assert!(relay.on_receive(raw_frame(111, 3, 1, 1, MessageType::Text, 5)).is_ok());
}

#[test]
fn test_reset_over_redundant_paths_delivers_once() {
    let air = SimulatedAir::new();
    let mut nodes = vec![
        MeshNode::new(NodeConfig::endpoint(3), air.attach()).unwrap(),
        MeshNode::new(NodeConfig::relay(0), air.attach()).unwrap(),
        MeshNode::new(NodeConfig::relay(0), air.attach()).unwrap(),
        MeshNode::new(NodeConfig::endpoint(1), air.attach()).unwrap(),
    ];
    // sensor (0), relays (1, 2), base (3); two paths from sensor to base
    for (a, b) in [(0, 1), (0, 2), (1, 2), (1, 3), (2, 3)] {
        air.link(a, b);
    }

    let first = nodes[0].send_text(1, "a").unwrap();
    let reset = nodes[0].send_reset(1).unwrap();
    let next = nodes[0].send_text(1, "b").unwrap();
    assert_eq!((first, reset, next), (1, 2, 3));

    let mut delivered = Vec::new();
    for _ in 0..100 {
        let mut active = false;
        for node in nodes.iter_mut() {
            if node.poll().unwrap() != PollOutcome::Idle {
                active = true;
            }
        }
        delivered.extend(nodes[3].receive_packets());
        if !active {
            break;
        }
    }

    let texts: Vec<&[u8]> = delivered
        .iter()
        .filter(|frame| frame.header().message_type == MessageType::Text)
        .map(|frame| frame.payload())
        .collect();
    assert_eq!(texts.iter().filter(|p| **p == b"a").count(), 1);
    assert_eq!(texts.iter().filter(|p| **p == b"b").count(), 1);
    assert_eq!(nodes[3].engine().tracker().last_seen(3), Some(3));
}
