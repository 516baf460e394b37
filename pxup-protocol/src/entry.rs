//! Fixed-width body entries.
//!
//! ```text
//! pixel-list entry (6 bytes)        run-list entry (8 bytes)
//! +-----+-----+-------+             +-----+-----+--------+-------+
//! |  x  |  y  | color |             |  y  | x0  | length | color |
//! +-----+-----+-------+             +-----+-----+--------+-------+
//! ```
//!
//! All fields are `u16` little-endian; colors are RGB565.

use crate::header::PacketKind;
use bytes::{Buf, BufMut, BytesMut};

/// A single-pixel write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelEntry {
    pub x: u16,
    pub y: u16,
    pub color: u16,
}

impl PixelEntry {
    /// Wire size in bytes.
    pub const SIZE: usize = 6;

    pub fn new(x: u16, y: u16, color: u16) -> Self {
        Self { x, y, color }
    }

    /// Decodes from the first [`Self::SIZE`] bytes of `bytes`.
    ///
    /// Panics if `bytes` is shorter than [`Self::SIZE`]; use
    /// [`PacketKind::decode_entry`](crate::PacketKind::decode_entry) for
    /// checked decoding.
    pub fn from_le_bytes(mut bytes: &[u8]) -> Self {
        Self {
            x: bytes.get_u16_le(),
            y: bytes.get_u16_le(),
            color: bytes.get_u16_le(),
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16_le(self.x);
        buf.put_u16_le(self.y);
        buf.put_u16_le(self.color);
    }
}

/// A horizontal run of `length` pixels starting at `(x0, y)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunEntry {
    pub y: u16,
    pub x0: u16,
    pub length: u16,
    pub color: u16,
}

impl RunEntry {
    /// Wire size in bytes.
    pub const SIZE: usize = 8;

    pub fn new(y: u16, x0: u16, length: u16, color: u16) -> Self {
        Self {
            y,
            x0,
            length,
            color,
        }
    }

    /// Decodes from the first [`Self::SIZE`] bytes of `bytes`.
    ///
    /// Panics if `bytes` is shorter than [`Self::SIZE`].
    pub fn from_le_bytes(mut bytes: &[u8]) -> Self {
        Self {
            y: bytes.get_u16_le(),
            x0: bytes.get_u16_le(),
            length: bytes.get_u16_le(),
            color: bytes.get_u16_le(),
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16_le(self.y);
        buf.put_u16_le(self.x0);
        buf.put_u16_le(self.length);
        buf.put_u16_le(self.color);
    }

    /// Exclusive end column, widened so `x0 + length` cannot overflow.
    pub fn end(&self) -> u32 {
        self.x0 as u32 + self.length as u32
    }
}

/// One decoded body entry of either kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Update {
    Pixel(PixelEntry),
    Run(RunEntry),
}

impl Update {
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Update::Pixel(p) => p.encode(buf),
            Update::Run(r) => r.encode(buf),
        }
    }

    /// Returns the packet kind that carries this entry.
    pub fn kind(&self) -> PacketKind {
        match self {
            Update::Pixel(_) => PacketKind::Pixel,
            Update::Run(_) => PacketKind::Run,
        }
    }
}

impl From<PixelEntry> for Update {
    fn from(entry: PixelEntry) -> Self {
        Update::Pixel(entry)
    }
}

impl From<RunEntry> for Update {
    fn from(entry: RunEntry) -> Self {
        Update::Run(entry)
    }
}
