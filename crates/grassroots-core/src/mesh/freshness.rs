//! Per-source sequence tracking for duplicate suppression
//!
//! One slot per possible source node holds the highest sequence id
//! accepted from that node. A frame is fresh only if its sequence id is
//! strictly greater. All slots start at 0, so the first frame from any
//! source (sequence 1) is always fresh.

/// Last accepted sequence id per source node
#[derive(Debug, Clone)]
pub struct FreshnessTracker {
    last_seen: Vec<u16>,
}

impl FreshnessTracker {
    /// Create a tracker for source ids `0..max_nodes`
    pub fn new(max_nodes: usize) -> Self {
        Self {
            last_seen: vec![0; max_nodes],
        }
    }

    /// Is `source` inside the tracked range?
    pub fn tracks(&self, source: u8) -> bool {
        (source as usize) < self.last_seen.len()
    }

    /// True iff `sequence_id` is newer than anything accepted from `source`.
    ///
    /// Untracked sources are never fresh; callers reject them first.
    pub fn is_fresh(&self, source: u8, sequence_id: u16) -> bool {
        self.last_seen
            .get(source as usize)
            .map(|last| sequence_id > *last)
            .unwrap_or(false)
    }

    /// Remember `sequence_id` as the latest from `source`
    pub fn record(&mut self, source: u8, sequence_id: u16) {
        if let Some(slot) = self.last_seen.get_mut(source as usize) {
            *slot = sequence_id;
        }
    }

    /// Forget everything seen from `source` (sender rebooted its counter)
    pub fn reset(&mut self, source: u8) {
        self.record(source, 0);
    }

    /// Last accepted sequence id, or `None` for an untracked source
    pub fn last_seen(&self, source: u8) -> Option<u16> {
        self.last_seen.get(source as usize).copied()
    }

    /// Number of tracked sources
    pub fn capacity(&self) -> usize {
        self.last_seen.len()
    }
}
