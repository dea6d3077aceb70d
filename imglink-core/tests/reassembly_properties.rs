//! Property-based tests for frame reassembly
//!
//! Frames are split the way the device splits them, then delivered in
//! arbitrary order, with duplicates and with corrupt fragments mixed in.

use std::time::Duration;

use imglink_core::{
    BoundsError, CompletionStatus, DataFragment, FirstFragmentPolicy, FrameIdentity, PixelFormat,
    ReassemblyManager, TransportKind, WireLayout, frame_payload_len,
};
use proptest::prelude::*;
use tokio::time::Instant;

const MAX_FRAME: usize = 64 * 1024 * 1024;

fn manager(policy: FirstFragmentPolicy) -> ReassemblyManager {
    ReassemblyManager::new(WireLayout::default(), policy, MAX_FRAME)
}

fn frame_data(width: u32, height: u32, seed: u8) -> Vec<u8> {
    (0..frame_payload_len(width, height))
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

// Property test strategies

fn geometry_strategy() -> impl Strategy<Value = (u32, u32)> {
    (1u32..=96, 1u32..=64)
}

/// A frame's fragments in a random delivery order.
fn shuffled_frame_strategy() -> impl Strategy<Value = (u32, u32, u8, Vec<usize>)> {
    (geometry_strategy(), any::<u8>()).prop_flat_map(|((w, h), seed)| {
        let count = WireLayout::default().fragments_for(frame_payload_len(w, h) as usize);
        (
            Just(w),
            Just(h),
            Just(seed),
            Just((0..count).collect::<Vec<_>>()).prop_shuffle(),
        )
    })
}

proptest! {
    #[test]
    fn any_order_reassembles_input((w, h, seed, order) in shuffled_frame_strategy()) {
        let layout = WireLayout::default();
        let data = frame_data(w, h, seed);
        let frags = DataFragment::split(&data, w, h, PixelFormat::Yuv420Sp, &layout);
        let mut mgr = manager(FirstFragmentPolicy::Retain);
        let now = Instant::now();

        let last = order.len() - 1;
        for (n, &i) in order.iter().enumerate() {
            let status = mgr.submit(frags[i].clone(), now);
            if n < last {
                prop_assert_eq!(status, CompletionStatus::InProgress);
            } else {
                match status {
                    CompletionStatus::Complete(frame) => {
                        prop_assert_eq!(&frame.data[..], &data[..]);
                        prop_assert_eq!(frame.width, w);
                        prop_assert_eq!(frame.height, h);
                        prop_assert_eq!(frame.format, PixelFormat::Yuv420Sp);
                    }
                    other => prop_assert!(false, "expected completion, got {:?}", other),
                }
            }
        }
        prop_assert!(mgr.is_empty());
    }

    #[test]
    fn duplicates_are_idempotent(
        (w, h, seed, order) in shuffled_frame_strategy(),
        repeats in prop::collection::vec(any::<prop::sample::Index>(), 1..8),
    ) {
        let layout = WireLayout::default();
        let data = frame_data(w, h, seed);
        let frags = DataFragment::split(&data, w, h, PixelFormat::U8C1, &layout);
        prop_assume!(frags.len() > 1);
        let mut mgr = manager(FirstFragmentPolicy::Retain);
        let now = Instant::now();

        // Everything except the final fragment, then replay some of them.
        let (head, tail) = order.split_at(order.len() - 1);
        for &i in head {
            mgr.submit(frags[i].clone(), now);
        }
        let identity = FrameIdentity::new(w, frags.len() as u32);
        let before = mgr.progress(identity);

        for r in &repeats {
            let i = head[r.index(head.len())];
            prop_assert_eq!(mgr.submit(frags[i].clone(), now), CompletionStatus::Duplicate);
        }
        prop_assert_eq!(mgr.progress(identity), before);

        match mgr.submit(frags[tail[0]].clone(), now) {
            CompletionStatus::Complete(frame) => prop_assert_eq!(&frame.data[..], &data[..]),
            other => prop_assert!(false, "expected completion, got {:?}", other),
        }
    }

    #[test]
    fn out_of_range_index_changes_nothing(
        (w, h) in geometry_strategy(),
        excess in 0u32..1000,
    ) {
        let layout = WireLayout::default();
        let data = frame_data(w, h, 0);
        let mut frags = DataFragment::split(&data, w, h, PixelFormat::U8C1, &layout);
        let mut mgr = manager(FirstFragmentPolicy::ClearOnNewFrame);
        let now = Instant::now();

        let count = frags.len() as u32;
        let mut bad = frags.remove(0);
        bad.index = count + excess;

        prop_assert_eq!(
            mgr.submit(bad, now),
            CompletionStatus::Rejected(BoundsError::IndexOutOfRange { index: count + excess, count })
        );
        prop_assert!(mgr.is_empty());
    }

    #[test]
    fn corrupt_bytes_never_panic(
        bytes in prop::collection::vec(any::<u8>(), 0..1100),
        transport in prop_oneof![Just(TransportKind::Udp), Just(TransportKind::Tcp)],
    ) {
        let layout = WireLayout::default();
        let _ = imglink_core::Packet::classify(&bytes, &layout, transport);
    }
}

#[test]
fn evicted_frame_does_not_complete_from_late_fragments() {
    let layout = WireLayout::default();
    let data = frame_data(64, 48, 3);
    let frags = DataFragment::split(&data, 64, 48, PixelFormat::U8C1, &layout);
    assert!(frags.len() >= 3);

    let mut mgr = manager(FirstFragmentPolicy::Retain);
    let t0 = Instant::now();
    for f in &frags[..frags.len() - 1] {
        mgr.submit(f.clone(), t0);
    }

    let evicted = mgr.sweep(t0 + Duration::from_secs(4), Duration::from_secs(3));
    assert_eq!(evicted.len(), 1);
    assert_eq!(evicted[0].missing, vec![frags.len() as u32 - 1]);

    let late = mgr.submit(frags[frags.len() - 1].clone(), t0 + Duration::from_secs(5));
    assert_eq!(late, CompletionStatus::InProgress);
    assert_eq!(mgr.len(), 1);
}
