//! Property tests for the flood decision engine.

use grassroots_core::mesh::flood::{Disposition, FloodEngine};
use grassroots_core::mesh::{Frame, Header, MessageType};
use grassroots_core::{NodeConfig, RejectReason};
use proptest::prelude::*;

fn frame_bytes(system_id: u8, source: u8, seq: u16, ttl: u8, payload: &[u8]) -> Vec<u8> {
    let header = Header {
        length: 0,
        system_id,
        source,
        destination: 3,
        sequence_id: seq,
        message_type: MessageType::Text,
        type_id: 0,
        ttl,
    };
    Frame::new(&header, payload, 222).unwrap().into_bytes()
}

proptest! {
    #[test]
    fn prop_freshness_is_strictly_increasing(
        source in 0u8..25,
        first in 1u16..=u16::MAX,
        second in any::<u16>(),
    ) {
        let mut node = FloodEngine::new(&NodeConfig::endpoint(3));
        prop_assert!(node.on_receive(frame_bytes(111, source, first, 5, b"a")).is_ok());

        let result = node.on_receive(frame_bytes(111, source, second, 5, b"b"));
        if second > first {
            prop_assert!(result.is_ok());
            prop_assert_eq!(node.tracker().last_seen(source), Some(second));
        } else {
            prop_assert_eq!(result, Err(RejectReason::StaleOrDuplicate));
            prop_assert_eq!(node.tracker().last_seen(source), Some(first));
        }
    }

    #[test]
    fn prop_relay_decrements_ttl_by_one(
        ttl in 1u8..=u8::MAX,
        seq in 1u16..=u16::MAX,
        payload in proptest::collection::vec(any::<u8>(), 0..64),
    ) {
        let mut relay = FloodEngine::new(&NodeConfig::relay(0));
        let received = frame_bytes(111, 7, seq, ttl, &payload);

        match relay.on_receive(received.clone()) {
            Ok(Disposition::Forward(frame)) => {
                prop_assert_eq!(frame.ttl(), ttl - 1);
                prop_assert_eq!(frame.payload(), &payload[..]);
                prop_assert_eq!(&frame.as_bytes()[..8], &received[..8]);
            }
            other => prop_assert!(false, "expected forward, got {:?}", other),
        }
    }

    #[test]
    fn prop_other_systems_never_touch_state(
        system_id in any::<u8>().prop_filter("foreign system", |s| *s != 111),
        source in 0u8..25,
        seq in any::<u16>(),
        ttl in any::<u8>(),
    ) {
        let mut relay = FloodEngine::new(&NodeConfig::relay(0));
        let result = relay.on_receive(frame_bytes(system_id, source, seq, ttl, b"x"));
        prop_assert_eq!(result, Err(RejectReason::WrongSystem));
        prop_assert_eq!(relay.tracker().last_seen(source), Some(0));
    }

    #[test]
    fn prop_short_buffers_rejected_before_inspection(
        bytes in proptest::collection::vec(any::<u8>(), 0..9),
    ) {
        let mut relay = FloodEngine::new(&NodeConfig::relay(0));
        prop_assert_eq!(relay.on_receive(bytes), Err(RejectReason::FrameTooShort));
    }

    #[test]
    fn prop_long_buffers_rejected_before_inspection(
        bytes in proptest::collection::vec(any::<u8>(), 223..400),
    ) {
        let mut relay = FloodEngine::new(&NodeConfig::relay(0));
        prop_assert_eq!(relay.on_receive(bytes), Err(RejectReason::FrameTooLong));
    }
}
