//! Reassembly of fragmented frames.
//!
//! Fragments are grouped by [`FrameIdentity`] into pre-allocated
//! frame buffers. Placement is index-based, so arrival order does not
//! matter; a retransmitted index is ignored. A buffer leaves the manager
//! either complete (returned as a [`Frame`]) or through [`sweep`] once it
//! has been idle past the inactivity deadline.
//!
//! [`sweep`]: ReassemblyManager::sweep

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;
use tracing::debug;

use crate::error::BoundsError;
use crate::format::PixelFormat;
use crate::wire::{DataFragment, TransportKind, WireLayout};

// ── FrameIdentity ────────────────────────────────────────────────

/// Key of an in-flight frame: `(width << 32) | fragment_count`.
///
/// Two different frames with the same width and fragment count map to
/// the same identity. The device never has two such frames in flight, so
/// the collision is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameIdentity(u64);

impl FrameIdentity {
    pub const fn new(width: u32, count: u32) -> Self {
        Self(((width as u64) << 32) | count as u64)
    }

    pub const fn of(fragment: &DataFragment) -> Self {
        Self::new(fragment.width, fragment.count)
    }

    pub const fn width(self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub const fn count(self) -> u32 {
        self.0 as u32
    }

    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for FrameIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

// ── Frame ────────────────────────────────────────────────────────

/// A fully reassembled frame, as handed to the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Raw pixel bytes, `width * height * 3 / 2` long.
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

/// Payload size the engine allocates for a frame of the given geometry.
pub const fn frame_payload_len(width: u32, height: u32) -> u64 {
    let pixels = width as u64 * height as u64;
    pixels.saturating_add(pixels / 2)
}

// ── FirstFragmentPolicy ──────────────────────────────────────────

/// What fragment 0 of a frame the manager has not seen does to the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirstFragmentPolicy {
    /// Drop every other in-flight buffer.
    ///
    /// The UDP device sends one frame at a time; fragment 0 of a new
    /// frame means the previous attempt was abandoned. Concurrent
    /// multi-frame UDP sessions are not supported under this policy.
    ClearOnNewFrame,
    /// Leave other buffers alone; stale ones are left to the reaper.
    Retain,
}

impl FirstFragmentPolicy {
    pub const fn for_transport(kind: TransportKind) -> Self {
        match kind {
            TransportKind::Udp => Self::ClearOnNewFrame,
            TransportKind::Tcp => Self::Retain,
        }
    }
}

// ── CompletionStatus ─────────────────────────────────────────────

/// Outcome of submitting one fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionStatus {
    /// Accepted; the frame still has missing fragments.
    InProgress,
    /// The index was already received. Nothing changed.
    Duplicate,
    /// The fragment does not fit its frame. Nothing changed.
    Rejected(BoundsError),
    /// Accepted and the frame is now complete.
    Complete(Frame),
}

// ── Eviction ─────────────────────────────────────────────────────

/// Diagnostic for a frame dropped by the reaper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eviction {
    pub identity: FrameIdentity,
    pub width: u32,
    pub height: u32,
    pub received: u32,
    pub expected: u32,
    /// Indices never received, ascending.
    pub missing: Vec<u32>,
}

impl std::fmt::Display for Eviction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "frame {} ({}x{}) timed out with {}/{} fragments, missing {:?}",
            self.identity, self.width, self.height, self.received, self.expected, self.missing
        )
    }
}

// ── FrameBuffer ──────────────────────────────────────────────────

/// One frame under reassembly.
#[derive(Debug)]
struct FrameBuffer {
    data: Vec<u8>,
    width: u32,
    height: u32,
    format: PixelFormat,
    count: u32,
    received: HashSet<u32>,
    last_update: Instant,
}

impl FrameBuffer {
    fn new(fragment: &DataFragment, len: usize, now: Instant) -> Self {
        Self {
            data: vec![0; len],
            width: fragment.width,
            height: fragment.height,
            format: fragment.format,
            count: fragment.count,
            received: HashSet::new(),
            last_update: now,
        }
    }

    fn received_count(&self) -> u32 {
        self.received.len() as u32
    }

    fn into_frame(self) -> Frame {
        Frame {
            data: Bytes::from(self.data),
            width: self.width,
            height: self.height,
            format: self.format,
        }
    }

    fn eviction(&self, identity: FrameIdentity) -> Eviction {
        let missing = (0..self.count)
            .filter(|i| !self.received.contains(i))
            .collect();
        Eviction {
            identity,
            width: self.width,
            height: self.height,
            received: self.received_count(),
            expected: self.count,
            missing,
        }
    }
}

// ── ReassemblyManager ────────────────────────────────────────────

/// Keyed store of in-progress frames.
#[derive(Debug)]
pub struct ReassemblyManager {
    buffers: HashMap<FrameIdentity, FrameBuffer>,
    layout: WireLayout,
    policy: FirstFragmentPolicy,
    max_frame_bytes: usize,
}

impl ReassemblyManager {
    pub fn new(layout: WireLayout, policy: FirstFragmentPolicy, max_frame_bytes: usize) -> Self {
        Self {
            buffers: HashMap::new(),
            layout,
            policy,
            max_frame_bytes,
        }
    }

    pub fn policy(&self) -> FirstFragmentPolicy {
        self.policy
    }

    /// Number of frames currently in flight.
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// `(received, declared)` fragment counts for a live frame.
    pub fn progress(&self, identity: FrameIdentity) -> Option<(u32, u32)> {
        self.buffers
            .get(&identity)
            .map(|b| (b.received_count(), b.count))
    }

    /// Drop every in-flight frame.
    pub fn clear(&mut self) {
        self.buffers.clear();
    }

    /// Place one fragment.
    ///
    /// Under [`FirstFragmentPolicy::ClearOnNewFrame`], fragment 0 of an
    /// unknown frame drops every other in-flight frame before anything
    /// else is checked. A fragment that is then rejected leaves no buffer
    /// of its own behind.
    pub fn submit(&mut self, fragment: DataFragment, now: Instant) -> CompletionStatus {
        let identity = FrameIdentity::of(&fragment);
        let index = fragment.index;
        let known = self.buffers.contains_key(&identity);

        if index == 0
            && !known
            && self.policy == FirstFragmentPolicy::ClearOnNewFrame
            && !self.buffers.is_empty()
        {
            debug!(
                "new frame {identity} started; dropping {} partial frame(s)",
                self.buffers.len()
            );
            self.buffers.clear();
        }

        if index >= fragment.count {
            return CompletionStatus::Rejected(BoundsError::IndexOutOfRange {
                index,
                count: fragment.count,
            });
        }

        let capacity = match self.buffers.get(&identity) {
            Some(buffer) => buffer.data.len(),
            None => match self.admit(&fragment) {
                Ok(size) => size,
                Err(e) => return CompletionStatus::Rejected(e),
            },
        };

        let offset = self.layout.offset_of(index);
        let len = fragment.payload.len();
        if offset.checked_add(len).is_none_or(|end| end > capacity) {
            return CompletionStatus::Rejected(BoundsError::PayloadOverflow {
                offset,
                len,
                capacity,
            });
        }

        let buffer = self
            .buffers
            .entry(identity)
            .or_insert_with(|| FrameBuffer::new(&fragment, capacity, now));

        if !buffer.received.insert(index) {
            return CompletionStatus::Duplicate;
        }
        buffer.data[offset..offset + len].copy_from_slice(&fragment.payload);
        buffer.last_update = now;

        if buffer.received_count() < buffer.count {
            return CompletionStatus::InProgress;
        }

        self.buffers
            .remove(&identity)
            .map_or(CompletionStatus::InProgress, |done| {
                CompletionStatus::Complete(done.into_frame())
            })
    }

    /// Payload size for a frame not yet in the map, if its header is
    /// within the configured limits.
    fn admit(&self, fragment: &DataFragment) -> Result<usize, BoundsError> {
        let size = frame_payload_len(fragment.width, fragment.height);
        if size > self.max_frame_bytes as u64 {
            return Err(BoundsError::FrameTooLarge {
                size,
                max: self.max_frame_bytes,
            });
        }
        let max =
            u32::try_from(self.layout.fragments_for(self.max_frame_bytes)).unwrap_or(u32::MAX);
        if fragment.count > max {
            return Err(BoundsError::TooManyFragments {
                count: fragment.count,
                max,
            });
        }
        Ok(size as usize)
    }

    /// Evict every frame idle for longer than `stale_after`.
    pub fn sweep(&mut self, now: Instant, stale_after: Duration) -> Vec<Eviction> {
        let stale: Vec<FrameIdentity> = self
            .buffers
            .iter()
            .filter(|(_, b)| now.saturating_duration_since(b.last_update) > stale_after)
            .map(|(id, _)| *id)
            .collect();

        let mut evicted = Vec::with_capacity(stale.len());
        for identity in stale {
            if let Some(buffer) = self.buffers.remove(&identity) {
                evicted.push(buffer.eviction(identity));
            }
        }
        evicted.sort_by_key(|e| e.identity);
        evicted
    }
}

// ── Tests ────────────────────────────────────────────────────────
