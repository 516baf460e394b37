//! Protocol error types.

use crate::header::PacketKind;
use thiserror::Error;

/// Errors raised while parsing or building packets.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid magic bytes: expected 'PXUP' or 'PXUR', got {0:?}")]
    InvalidMagic([u8; 4]),

    #[error("unsupported {kind} version: {version:#04x}")]
    UnsupportedVersion { kind: PacketKind, version: u8 },

    #[error("truncated input: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("too many entries for one packet: {count} (max {max})")]
    TooManyEntries { count: usize, max: usize },

    #[error("{kind} packet cannot carry a {entry} entry")]
    MixedEntries { kind: PacketKind, entry: PacketKind },
}

impl ProtocolError {
    /// Returns whether the error means the byte stream lost its framing.
    ///
    /// Once framing is lost the stream cannot be resynchronized and the
    /// connection has to be dropped.
    pub fn is_framing_lost(&self) -> bool {
        matches!(
            self,
            ProtocolError::InvalidMagic(_) | ProtocolError::UnsupportedVersion { .. }
        )
    }
}
