//! Application of a decoded frame to a surface.
//!
//! Every entry is bounds-checked against the surface before it is written.
//! Entries that fall outside are skipped without failing the frame: the
//! sender's scaling can round onto the boundary, and framing is already
//! known to be intact once a frame has been fully decoded.

use crate::surface::{Rgb565, Surface};
use pxup_protocol::{PixelEntry, RunEntry, Update};

/// Result of applying one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Pixels written: one per accepted pixel entry, `length` per accepted run.
    pub updates_applied: u64,
    /// Entries rejected by the bounds check.
    pub skipped: u32,
}

/// Applies every entry of a frame to `surface`, in order, in one pass.
pub fn apply_frame<S: Surface + ?Sized>(surface: &mut S, updates: &[Update]) -> ApplyOutcome {
    let width = surface.width();
    let height = surface.height();
    let mut outcome = ApplyOutcome::default();

    for update in updates {
        let written = match update {
            Update::Pixel(p) => apply_pixel(surface, p, width, height),
            Update::Run(r) => apply_run(surface, r, width, height),
        };
        match written {
            Some(n) => outcome.updates_applied += n,
            None => outcome.skipped += 1,
        }
    }

    outcome
}

fn apply_pixel<S: Surface + ?Sized>(
    surface: &mut S,
    p: &PixelEntry,
    width: u16,
    height: u16,
) -> Option<u64> {
    if p.x < width && p.y < height {
        surface.set_pixel(p.x, p.y, Rgb565(p.color));
        Some(1)
    } else {
        None
    }
}

fn apply_run<S: Surface + ?Sized>(
    surface: &mut S,
    r: &RunEntry,
    width: u16,
    height: u16,
) -> Option<u64> {
    if r.y < height && r.x0 < width && r.length > 0 && r.end() <= width as u32 {
        surface.fill_run(r.x0, r.y, r.length, Rgb565(r.color));
        Some(r.length as u64)
    } else {
        None
    }
}
