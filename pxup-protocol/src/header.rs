//! Packet header and kind dispatch.
//!
//! Both packet kinds share one 11-byte header layout. Multi-byte fields are
//! little-endian:
//!
//! ```text
//! +---------+---------+----------+-------------+
//! |  magic  | version | frame_id | entry_count |
//! | 4 bytes | 1 byte  | 4 bytes  |   2 bytes   |
//! +---------+---------+----------+-------------+
//! ```
//!
//! The magic selects the packet kind, and each kind carries its own version
//! constant.

use crate::entry::{PixelEntry, RunEntry, Update};
use crate::error::ProtocolError;
use bytes::{Buf, BufMut, BytesMut};
use std::fmt;

/// Magic bytes identifying pixel-list packets: "PXUP".
pub const PIXEL_MAGIC: [u8; 4] = *b"PXUP";

/// Magic bytes identifying run-list packets: "PXUR".
pub const RUN_MAGIC: [u8; 4] = *b"PXUR";

/// Length of the magic prefix.
pub const MAGIC_LEN: usize = 4;

/// Size of the fixed header in bytes (4+1+4+2 = 11).
pub const HEADER_SIZE: usize = 11;

/// Packet kind descriptor.
///
/// Everything that differs between the two packet formats hangs off this
/// type: magic, version, entry width and entry decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    /// Per-pixel writes (`x`, `y`, `color`).
    Pixel,
    /// Horizontal runs (`y`, `x0`, `length`, `color`).
    Run,
}

impl PacketKind {
    /// Returns the magic bytes for this kind.
    pub const fn magic(self) -> [u8; 4] {
        match self {
            PacketKind::Pixel => PIXEL_MAGIC,
            PacketKind::Run => RUN_MAGIC,
        }
    }

    /// Returns the only version accepted for this kind.
    pub const fn version(self) -> u8 {
        match self {
            PacketKind::Pixel => 0x02,
            PacketKind::Run => 0x01,
        }
    }

    /// Returns the wire size of one entry.
    pub const fn entry_size(self) -> usize {
        match self {
            PacketKind::Pixel => PixelEntry::SIZE,
            PacketKind::Run => RunEntry::SIZE,
        }
    }

    /// Short label used in logs and metrics.
    pub const fn as_str(self) -> &'static str {
        match self {
            PacketKind::Pixel => "pixel",
            PacketKind::Run => "run",
        }
    }

    /// Identifies the packet kind from its magic bytes.
    pub fn from_magic(magic: &[u8; 4]) -> Result<Self, ProtocolError> {
        match *magic {
            PIXEL_MAGIC => Ok(PacketKind::Pixel),
            RUN_MAGIC => Ok(PacketKind::Run),
            other => Err(ProtocolError::InvalidMagic(other)),
        }
    }

    /// Decodes one entry of this kind from its wire bytes.
    pub fn decode_entry(self, bytes: &[u8]) -> Result<Update, ProtocolError> {
        let size = self.entry_size();
        if bytes.len() < size {
            return Err(ProtocolError::Truncated {
                needed: size,
                available: bytes.len(),
            });
        }
        Ok(match self {
            PacketKind::Pixel => Update::Pixel(PixelEntry::from_le_bytes(&bytes[..size])),
            PacketKind::Run => Update::Run(RunEntry::from_le_bytes(&bytes[..size])),
        })
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketKind::Pixel => f.write_str("pixel-list"),
            PacketKind::Run => f.write_str("run-list"),
        }
    }
}

/// A parsed packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Packet kind, derived from the magic.
    pub kind: PacketKind,
    /// Protocol version byte.
    pub version: u8,
    /// Sender-assigned frame identifier.
    pub frame_id: u32,
    /// Number of entries in the body.
    pub entry_count: u16,
}

impl PacketHeader {
    /// Creates a header with the current version for `kind`.
    pub fn new(kind: PacketKind, frame_id: u32, entry_count: u16) -> Self {
        Self {
            kind,
            version: kind.version(),
            frame_id,
            entry_count,
        }
    }

    /// Parses the seven header bytes that follow an already-matched magic.
    ///
    /// The version must equal the kind's constant exactly.
    pub fn parse(kind: PacketKind, rest: &[u8]) -> Result<Self, ProtocolError> {
        let needed = HEADER_SIZE - MAGIC_LEN;
        if rest.len() < needed {
            return Err(ProtocolError::Truncated {
                needed,
                available: rest.len(),
            });
        }

        let mut buf = &rest[..needed];
        let version = buf.get_u8();
        if version != kind.version() {
            return Err(ProtocolError::UnsupportedVersion { kind, version });
        }

        let frame_id = buf.get_u32_le();
        let entry_count = buf.get_u16_le();

        Ok(Self {
            kind,
            version,
            frame_id,
            entry_count,
        })
    }

    /// Decodes a full header (magic included) from the front of `buf`.
    ///
    /// Returns `Ok(None)` if fewer than [`HEADER_SIZE`] bytes are present.
    /// A bad magic is reported as soon as the first four bytes are known.
    pub fn decode(buf: &[u8]) -> Result<Option<Self>, ProtocolError> {
        if buf.len() < MAGIC_LEN {
            return Ok(None);
        }

        let mut magic = [0u8; MAGIC_LEN];
        magic.copy_from_slice(&buf[..MAGIC_LEN]);
        let kind = PacketKind::from_magic(&magic)?;

        if buf.len() < HEADER_SIZE {
            return Ok(None);
        }

        Self::parse(kind, &buf[MAGIC_LEN..HEADER_SIZE]).map(Some)
    }

    /// Appends the encoded header to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.kind.magic());
        buf.put_u8(self.version);
        buf.put_u32_le(self.frame_id);
        buf.put_u16_le(self.entry_count);
    }

    /// Returns the body length in bytes.
    pub fn body_len(&self) -> usize {
        self.entry_count as usize * self.kind.entry_size()
    }

    /// Returns whether the frame carries no entries.
    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }
}
