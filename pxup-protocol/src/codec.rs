//! Whole-packet encoding and buffered decoding.
//!
//! The receiver decodes entries straight off the socket; this module is the
//! buffered counterpart used to build packets and to decode them from memory.

use crate::entry::{PixelEntry, RunEntry, Update};
use crate::error::ProtocolError;
use crate::header::{PacketHeader, PacketKind, HEADER_SIZE};
use bytes::{Buf, BytesMut};

/// A complete packet: header plus decoded entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: PacketHeader,
    pub updates: Vec<Update>,
}

impl Packet {
    /// Builds a pixel-list packet.
    pub fn pixels(frame_id: u32, entries: &[PixelEntry]) -> Result<Self, ProtocolError> {
        Self::build(
            PacketKind::Pixel,
            frame_id,
            entries.iter().copied().map(Update::Pixel).collect(),
        )
    }

    /// Builds a run-list packet.
    pub fn runs(frame_id: u32, entries: &[RunEntry]) -> Result<Self, ProtocolError> {
        Self::build(
            PacketKind::Run,
            frame_id,
            entries.iter().copied().map(Update::Run).collect(),
        )
    }

    /// Builds a packet of `kind`, checking the entry count and entry kinds.
    pub fn build(
        kind: PacketKind,
        frame_id: u32,
        updates: Vec<Update>,
    ) -> Result<Self, ProtocolError> {
        let count = u16::try_from(updates.len()).map_err(|_| ProtocolError::TooManyEntries {
            count: updates.len(),
            max: u16::MAX as usize,
        })?;

        if let Some(other) = updates.iter().find(|u| u.kind() != kind) {
            return Err(ProtocolError::MixedEntries {
                kind,
                entry: other.kind(),
            });
        }

        Ok(Self {
            header: PacketHeader::new(kind, frame_id, count),
            updates,
        })
    }

    /// Returns the encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.header.body_len()
    }

    /// Encodes the packet into bytes.
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.header.encode(&mut buf);
        for update in &self.updates {
            update.encode(&mut buf);
        }
        buf
    }

    /// Decodes a packet from the front of `buf`.
    ///
    /// Returns `Ok(Some(packet))` if a complete packet was decoded,
    /// `Ok(None)` if more data is needed, or `Err` on protocol errors.
    /// Nothing is consumed unless a whole packet is available.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        let header = match PacketHeader::decode(&buf[..])? {
            Some(header) => header,
            None => return Ok(None),
        };

        let total_len = HEADER_SIZE + header.body_len();
        if buf.len() < total_len {
            return Ok(None);
        }

        buf.advance(HEADER_SIZE);
        let body = buf.split_to(header.body_len());

        let updates = body
            .chunks_exact(header.kind.entry_size())
            .map(|chunk| header.kind.decode_entry(chunk))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(Self { header, updates }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_pixel_packet_layout() {
        let packet = Packet::pixels(
            7,
            &[
                PixelEntry::new(10, 10, 0xF800),
                PixelEntry::new(279, 239, 0x07E0),
            ],
        )
        .unwrap();

        let encoded = packet.encode();
        assert_eq!(encoded.len(), 11 + 2 * 6);
        assert_eq!(&encoded[..11], b"PXUP\x02\x07\x00\x00\x00\x02\x00");
    }

    #[test]
    fn test_run_packet_roundtrip() {
        let packet = Packet::runs(3, &[RunEntry::new(0, 275, 10, 0xFFFF)]).unwrap();
        let mut buf = packet.encode();

        let decoded = Packet::decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, packet);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_empty_packet() {
        let packet = Packet::pixels(42, &[]).unwrap();
        let mut buf = packet.encode();
        assert_eq!(buf.len(), HEADER_SIZE);

        let decoded = Packet::decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.header.frame_id, 42);
        assert!(decoded.updates.is_empty());
    }

    #[test]
    fn test_partial_packet_is_not_consumed() {
        let packet = Packet::pixels(1, &[PixelEntry::new(1, 1, 1)]).unwrap();
        let encoded = packet.encode();

        let mut buf = BytesMut::from(&encoded[..encoded.len() - 1]);
        assert!(Packet::decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), encoded.len() - 1);

        buf.extend_from_slice(&encoded[encoded.len() - 1..]);
        assert_eq!(Packet::decode(&mut buf).unwrap().unwrap(), packet);
    }

    #[test]
    fn test_multiple_packets_in_buffer() {
        let first = Packet::pixels(1, &[PixelEntry::new(0, 0, 0)]).unwrap();
        let second = Packet::runs(2, &[RunEntry::new(1, 0, 4, 0x001F)]).unwrap();

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&first.encode());
        buf.extend_from_slice(&second.encode());

        assert_eq!(Packet::decode(&mut buf).unwrap().unwrap(), first);
        assert_eq!(Packet::decode(&mut buf).unwrap().unwrap(), second);
        assert!(Packet::decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_too_many_entries() {
        let entries = vec![PixelEntry::new(0, 0, 0); u16::MAX as usize + 1];
        let result = Packet::pixels(0, &entries);
        assert!(matches!(
            result,
            Err(ProtocolError::TooManyEntries { count: 65536, .. })
        ));
    }

    #[test]
    fn test_mixed_entries_rejected() {
        let result = Packet::build(
            PacketKind::Pixel,
            0,
            vec![RunEntry::new(0, 0, 1, 0).into()],
        );
        assert!(matches!(
            result,
            Err(ProtocolError::MixedEntries {
                kind: PacketKind::Pixel,
                entry: PacketKind::Run
            })
        ));

        // One stray entry among valid ones is enough
        let mut updates: Vec<Update> = vec![PixelEntry::new(0, 0, 0).into(); 3];
        updates.push(RunEntry::new(0, 0, 1, 0).into());
        let err = Packet::build(PacketKind::Pixel, 0, updates).unwrap_err();
        assert_eq!(
            err.to_string(),
            "pixel-list packet cannot carry a run-list entry"
        );
    }

    proptest! {
        #[test]
        fn prop_pixel_roundtrip_preserves_order(
            frame_id in any::<u32>(),
            pixels in prop::collection::vec((any::<u16>(), any::<u16>(), any::<u16>()), 0..512),
        ) {
            let entries: Vec<PixelEntry> = pixels
                .iter()
                .map(|&(x, y, color)| PixelEntry::new(x, y, color))
                .collect();

            let mut buf = Packet::pixels(frame_id, &entries).unwrap().encode();
            let decoded = Packet::decode(&mut buf).unwrap().unwrap();

            let decoded_pixels: Vec<(u16, u16, u16)> = decoded
                .updates
                .iter()
                .map(|u| match u {
                    Update::Pixel(p) => (p.x, p.y, p.color),
                    Update::Run(_) => unreachable!("pixel packet decoded a run"),
                })
                .collect();

            prop_assert_eq!(decoded.header.frame_id, frame_id);
            prop_assert_eq!(decoded_pixels, pixels);
        }
    }
}
