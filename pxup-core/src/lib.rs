//! # pxup-core
//!
//! Update engine for pxup.
//!
//! This crate provides:
//! - A reusable, grow-only scratch buffer for decoded entries
//! - The raster surface abstraction and an in-memory RGB565 surface
//! - Bounds-checked application of a decoded frame to a surface
//! - Per-connection frame counters

pub mod apply;
pub mod buffer;
pub mod counters;
pub mod error;
pub mod surface;

pub use apply::{apply_frame, ApplyOutcome};
pub use buffer::{GrowthStrategy, UpdateBuffer};
pub use counters::FrameCounters;
pub use error::CoreError;
pub use surface::{MemorySurface, Rgb565, Surface};
