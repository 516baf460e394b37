//! # pxup-protocol
//!
//! Wire format for the pxup display update stream.
//!
//! This crate provides:
//! - The shared 11-byte packet header and magic-based kind dispatch
//! - Fixed-width pixel-list (PXUP) and run-list (PXUR) entries
//! - Packet encoding, and slice-based decoding for buffered input
//!
//! It performs no I/O. Streaming decoders read exact byte counts from their
//! transport and hand the slices to [`PacketHeader::parse`] and
//! [`PacketKind::decode_entry`].

pub mod codec;
pub mod entry;
pub mod error;
pub mod header;

pub use codec::Packet;
pub use entry::{PixelEntry, RunEntry, Update};
pub use error::ProtocolError;
pub use header::{PacketHeader, PacketKind, HEADER_SIZE, MAGIC_LEN, PIXEL_MAGIC, RUN_MAGIC};

/// Default TCP port for the receiver.
pub const DEFAULT_PORT: u16 = 8090;
