// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Property-based tests for the byte-level building blocks

use std::net::Ipv4Addr;

use gainspan_core::framer::{escape, is_reserved, SpiFramer};
use gainspan_core::numeric::{parse_ipv4, parse_number, Radix};
use gainspan_core::ring::FRAME_RECORD_MAX;
use gainspan_core::{Cid, FrameQueue, RxEvent, RxFrame, RxMachine};
use proptest::prelude::*;

proptest! {
    #[test]
    fn prop_spi_stuffing_is_transparent(data in prop::collection::vec(any::<u8>(), 0..256)) {
        let mut framer = SpiFramer::new();
        let mut decoded = Vec::new();

        for &byte in &data {
            let wire = escape(byte).wire_bytes();
            // Reserved bytes never reach the wire unescaped
            prop_assert_eq!(wire.as_slice().len(), if is_reserved(byte) { 2 } else { 1 });
            for &w in wire.as_slice() {
                if let Some(b) = framer.decode(w).unwrap() {
                    decoded.push(b);
                }
            }
        }

        prop_assert_eq!(decoded, data);
        prop_assert!(!framer.xoff());
    }

    #[test]
    fn prop_ring_keeps_newest_bytes(len in 1u16..64, seed in any::<u8>()) {
        let cid = Cid::new(1).unwrap();
        let mut queue: FrameQueue<16> = FrameQueue::new();
        let payload: Vec<u8> = (0..len).map(|i| seed.wrapping_add(i as u8)).collect();

        queue.push_frame(RxFrame::client(cid, len));
        let mut victims = 0;
        for &byte in &payload {
            victims += queue.push_byte(byte);
        }

        let kept = payload.len().min(queue.capacity());
        prop_assert_eq!(queue.len(), kept);
        prop_assert_eq!(queue.dropped() as usize, payload.len() - kept);
        prop_assert_eq!(victims, payload.len() - kept);

        let mut out = Vec::new();
        while let Some((c, byte)) = queue.pop() {
            prop_assert_eq!(c, cid);
            out.push(byte);
        }
        prop_assert_eq!(&out[..], &payload[payload.len() - kept..]);
        prop_assert!(queue.current().is_none());
    }

    #[test]
    fn prop_ring_multiplexes_frames_in_order(
        steps in prop::collection::vec((0u8..4, 1u16..12, 0usize..8, any::<bool>(), any::<bool>()), 1..20)
    ) {
        let mut queue: FrameQueue<32> = FrameQueue::new();
        // Every payload byte is its index in `written`
        let mut written: Vec<Cid> = Vec::new();
        let mut read: Vec<(Cid, u8)> = Vec::new();

        for (raw_cid, len, reads, contiguous, udp) in steps {
            let cid = Cid::new(raw_cid).unwrap();
            let frame = if udp {
                RxFrame::udp_server(cid, len, Ipv4Addr::new(10, 0, 0, raw_cid), 7000)
            } else {
                RxFrame::client(cid, len)
            };

            // Header plus a possible wrap gap never needs more than this
            let roomy = queue.free() >= 2 * FRAME_RECORD_MAX;
            let lost = queue.push_frame(frame);
            if roomy {
                prop_assert_eq!(lost, 0);
            }

            for _ in 0..len {
                let full = queue.is_full();
                let byte = written.len() as u8;
                written.push(cid);
                let lost = queue.push_byte(byte);
                if !full {
                    prop_assert_eq!(lost, 0);
                }
                prop_assert!(queue.len() <= queue.capacity());
            }

            if contiguous {
                let mut buf = vec![0u8; reads];
                if let Some(frame) = queue.current() {
                    let n = queue.read_contiguous(&mut buf);
                    read.extend(buf[..n].iter().map(|&b| (frame.cid, b)));
                }
            } else {
                for _ in 0..reads {
                    let peeked = queue.peek();
                    match queue.pop() {
                        Some((c, b)) => {
                            prop_assert_eq!(peeked, Some(b));
                            read.push((c, b));
                        }
                        None => break,
                    }
                }
            }
            prop_assert!(queue.buffered() <= queue.len());
        }

        while let Some(entry) = queue.pop() {
            read.push(entry);
        }
        prop_assert!(queue.is_empty());
        prop_assert!(queue.current().is_none());

        // Oldest first, each byte tagged with the connection it was sent for
        for pair in read.windows(2) {
            prop_assert!(pair[0].1 < pair[1].1);
        }
        for &(c, b) in &read {
            prop_assert_eq!(c, written[b as usize]);
        }
        prop_assert_eq!(read.len() + queue.dropped() as usize, written.len());
    }

    #[test]
    fn prop_decimal_fields_parse(value in 0u16..10000) {
        let text = format!("{:04}", value);
        prop_assert_eq!(parse_number::<u16>(text.as_bytes(), Radix::Decimal), Some(value));
    }

    #[test]
    fn prop_hex_cid_parses(n in 0u8..16) {
        let text = format!("{:x}", n);
        prop_assert_eq!(parse_number::<u8>(text.as_bytes(), Radix::Hex), Some(n));
        prop_assert_eq!(parse_number::<u8>(text.as_bytes(), Radix::Hex).and_then(Cid::new), Cid::new(n));
    }

    #[test]
    fn prop_ipv4_parses(octets in any::<[u8; 4]>()) {
        let addr = Ipv4Addr::from(octets);
        prop_assert_eq!(parse_ipv4(addr.to_string().as_bytes()), Some(addr));
    }

    #[test]
    fn prop_out_of_range_octet_rejected(octet in 256u32..1000) {
        let text = format!("10.{}.0.1", octet);
        prop_assert_eq!(parse_ipv4(text.as_bytes()), None);
    }

    #[test]
    fn prop_rx_machine_never_overruns_frames(input in prop::collection::vec(any::<u8>(), 0..512)) {
        let mut rx = RxMachine::new();
        let mut left: Option<u16> = None;

        for &byte in &input {
            match rx.step(byte) {
                RxEvent::Frame(frame) => {
                    prop_assert!(frame.length > 0);
                    left = Some(frame.length);
                }
                RxEvent::Payload(_) => {
                    let remaining = left.unwrap_or(0);
                    prop_assert!(remaining > 0);
                    left = Some(remaining - 1);
                }
                _ => {}
            }
        }
    }
}
