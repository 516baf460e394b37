//! Per-connection frame counters.

use crate::apply::ApplyOutcome;

/// Frame statistics for the active connection.
///
/// `frame_count`, `updates_applied` and `entries_skipped` restart at zero for
/// every new connection. `last_frame_id` carries over until the next frame
/// arrives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameCounters {
    pub frame_count: u64,
    pub last_frame_id: u32,
    pub updates_applied: u64,
    pub entries_skipped: u64,
}

impl FrameCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the per-connection counters.
    pub fn reset(&mut self) {
        self.frame_count = 0;
        self.updates_applied = 0;
        self.entries_skipped = 0;
    }

    /// Records an accepted frame.
    pub fn record_frame(&mut self, frame_id: u32, outcome: ApplyOutcome) {
        self.frame_count += 1;
        self.last_frame_id = frame_id;
        self.updates_applied += outcome.updates_applied;
        self.entries_skipped += outcome.skipped as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_reset() {
        let mut counters = FrameCounters::new();
        counters.record_frame(
            7,
            ApplyOutcome {
                updates_applied: 2,
                skipped: 1,
            },
        );
        counters.record_frame(8, ApplyOutcome::default());

        assert_eq!(counters.frame_count, 2);
        assert_eq!(counters.last_frame_id, 8);
        assert_eq!(counters.updates_applied, 2);
        assert_eq!(counters.entries_skipped, 1);

        counters.reset();
        assert_eq!(counters.frame_count, 0);
        assert_eq!(counters.updates_applied, 0);
        assert_eq!(counters.entries_skipped, 0);
        assert_eq!(counters.last_frame_id, 8);
    }
}
