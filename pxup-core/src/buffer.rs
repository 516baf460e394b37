//! Reusable scratch buffer for decoded frame entries.
//!
//! The buffer is sized once per frame, before any entry is written, and its
//! capacity never shrinks. Steady-state streams therefore decode without
//! touching the allocator.

use crate::error::CoreError;
use pxup_protocol::Update;
use serde::{Deserialize, Serialize};

/// How the buffer grows when a frame needs more room than it has.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthStrategy {
    /// Grow to exactly the requested entry count.
    #[default]
    Exact,
    /// Try the next power of two first, fall back to the exact count.
    Headroom,
}

impl GrowthStrategy {
    /// Parses a strategy name as used in config files and the environment.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "exact" => Some(GrowthStrategy::Exact),
            "headroom" => Some(GrowthStrategy::Headroom),
            _ => None,
        }
    }
}

/// Grow-only buffer holding the entries of the frame being assembled.
#[derive(Debug, Default)]
pub struct UpdateBuffer {
    entries: Vec<Update>,
    strategy: GrowthStrategy,
    frame_limit: Option<usize>,
    grow_count: u64,
}

impl UpdateBuffer {
    /// Creates an empty buffer with the exact growth strategy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty buffer with the given growth strategy.
    pub fn with_strategy(strategy: GrowthStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    /// Sets the largest frame the buffer will be asked to hold.
    ///
    /// Frames are bounded before they reach the buffer; the limit only keeps
    /// headroom growth from reserving room no frame can use.
    pub fn with_frame_limit(mut self, limit: usize) -> Self {
        self.frame_limit = Some(limit);
        self
    }

    /// Returns the growth strategy.
    pub fn strategy(&self) -> GrowthStrategy {
        self.strategy
    }

    /// Returns the number of entries the buffer holds without reallocating.
    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    /// Returns how many times the buffer has grown.
    pub fn grow_count(&self) -> u64 {
        self.grow_count
    }

    /// Returns the number of entries written for the current frame.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Prepares the buffer for a frame of `count` entries.
    ///
    /// Capacity is grown first. If growth fails the previous contents and
    /// capacity are left untouched and the error is returned; on success the
    /// previous frame's entries are dropped.
    pub fn begin_frame(&mut self, count: usize) -> Result<(), CoreError> {
        self.ensure_capacity(count)?;
        self.entries.clear();
        Ok(())
    }

    /// Appends an entry to the current frame.
    ///
    /// Callers write at most the `count` passed to
    /// [`begin_frame`](Self::begin_frame), so this never reallocates.
    pub fn push(&mut self, update: Update) {
        debug_assert!(self.entries.len() < self.entries.capacity());
        self.entries.push(update);
    }

    /// Drops the current frame's entries, keeping the capacity.
    pub fn discard(&mut self) {
        self.entries.clear();
    }

    /// Returns the entries of the current frame.
    pub fn as_slice(&self) -> &[Update] {
        &self.entries
    }

    fn ensure_capacity(&mut self, needed: usize) -> Result<(), CoreError> {
        if needed <= self.entries.capacity() {
            return Ok(());
        }

        if self.strategy == GrowthStrategy::Headroom {
            let mut preferred = needed.checked_next_power_of_two().unwrap_or(needed);
            if let Some(limit) = self.frame_limit {
                preferred = preferred.min(limit.max(needed));
            }
            if preferred > needed {
                if self.try_grow(preferred) {
                    return Ok(());
                }
                tracing::debug!(
                    "Update buffer headroom of {} entries unavailable, falling back to {}",
                    preferred,
                    needed
                );
            }
        }

        if self.try_grow(needed) {
            Ok(())
        } else {
            tracing::warn!("Failed to allocate update buffer for {} entries", needed);
            Err(CoreError::AllocationFailed { requested: needed })
        }
    }

    fn try_grow(&mut self, target: usize) -> bool {
        let additional = target.saturating_sub(self.entries.len());
        match self.entries.try_reserve_exact(additional) {
            Ok(()) => {
                self.grow_count += 1;
                tracing::debug!(
                    "Update buffer grown to {} entries",
                    self.entries.capacity()
                );
                true
            }
            Err(_) => false,
        }
    }
}
