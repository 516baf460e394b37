//! Streaming header and body decoding.
//!
//! Headers are validated field by field as they arrive: the magic picks the
//! packet kind before anything else is read, and the version must match
//! that kind's constant. The declared entry count is checked against the
//! frame limit before the update buffer is sized.

use crate::error::ServerError;
use crate::reader::FramedReader;
use pxup_core::UpdateBuffer;
use pxup_protocol::{PacketHeader, PacketKind, RunEntry, HEADER_SIZE, MAGIC_LEN};
use tokio::io::AsyncRead;

/// Largest entry width of any packet kind.
const MAX_ENTRY_SIZE: usize = RunEntry::SIZE;

/// Decodes frames off a [`FramedReader`] into an [`UpdateBuffer`].
#[derive(Debug, Clone, Copy)]
pub struct FrameDecoder {
    entry_limit: usize,
}

impl FrameDecoder {
    /// Creates a decoder accepting at most `entry_limit` entries per frame.
    pub fn new(entry_limit: usize) -> Self {
        Self { entry_limit }
    }

    /// Creates a decoder for a surface of `area` pixels.
    ///
    /// A frame never needs more entries than the surface has pixels, so the
    /// area is the upper bound; `max_entries` can tighten it further.
    pub fn for_surface(area: usize, max_entries: Option<usize>) -> Self {
        let limit = match max_entries {
            Some(max) => area.min(max),
            None => area,
        };
        Self::new(limit)
    }

    /// Returns the per-frame entry limit.
    pub fn entry_limit(&self) -> usize {
        self.entry_limit
    }

    /// Reads and validates one packet header.
    pub async fn read_header<R: AsyncRead + Unpin>(
        &self,
        reader: &mut FramedReader<R>,
    ) -> Result<PacketHeader, ServerError> {
        let mut magic = [0u8; MAGIC_LEN];
        reader.read_exactly(&mut magic).await?;
        let kind = PacketKind::from_magic(&magic)?;

        let mut rest = [0u8; HEADER_SIZE - MAGIC_LEN];
        reader.read_exactly(&mut rest).await?;
        Ok(PacketHeader::parse(kind, &rest)?)
    }

    /// Reads the body described by `header` into `buffer`.
    ///
    /// On any error the buffer holds no usable frame: either it was never
    /// prepared, or the partially filled entries have been discarded.
    pub async fn read_body<R: AsyncRead + Unpin>(
        &self,
        reader: &mut FramedReader<R>,
        header: &PacketHeader,
        buffer: &mut UpdateBuffer,
    ) -> Result<(), ServerError> {
        let count = header.entry_count as usize;
        if count > self.entry_limit {
            return Err(ServerError::Oversized {
                count,
                max: self.entry_limit,
            });
        }

        buffer.begin_frame(count)?;

        let result = self.read_entries(reader, header, buffer).await;
        if result.is_err() {
            buffer.discard();
        }
        result
    }

    async fn read_entries<R: AsyncRead + Unpin>(
        &self,
        reader: &mut FramedReader<R>,
        header: &PacketHeader,
        buffer: &mut UpdateBuffer,
    ) -> Result<(), ServerError> {
        let size = header.kind.entry_size();
        let mut entry = [0u8; MAX_ENTRY_SIZE];

        for _ in 0..header.entry_count {
            reader.read_exactly(&mut entry[..size]).await?;
            buffer.push(header.kind.decode_entry(&entry[..size])?);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pxup_protocol::{Packet, PixelEntry, ProtocolError, Update};
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_read_pixel_frame() {
        let packet = Packet::pixels(
            7,
            &[
                PixelEntry::new(10, 10, 0xF800),
                PixelEntry::new(279, 239, 0x07E0),
            ],
        )
        .unwrap();
        let mock = Builder::new().read(&packet.encode()).build();
        let mut reader = FramedReader::new(mock);
        let mut buffer = UpdateBuffer::new();
        let decoder = FrameDecoder::for_surface(280 * 240, None);

        let header = decoder.read_header(&mut reader).await.unwrap();
        assert_eq!(header, packet.header);

        decoder
            .read_body(&mut reader, &header, &mut buffer)
            .await
            .unwrap();
        assert_eq!(buffer.as_slice(), packet.updates.as_slice());
    }

    #[tokio::test]
    async fn test_read_run_frame_split_mid_entry() {
        let packet = Packet::runs(3, &[RunEntry::new(0, 275, 10, 0xFFFF)]).unwrap();
        let bytes = packet.encode();
        let mock = Builder::new()
            .read(&bytes[..5])
            .read(&bytes[5..14])
            .read(&bytes[14..])
            .build();
        let mut reader = FramedReader::new(mock);
        let mut buffer = UpdateBuffer::new();
        let decoder = FrameDecoder::new(1000);

        let header = decoder.read_header(&mut reader).await.unwrap();
        decoder
            .read_body(&mut reader, &header, &mut buffer)
            .await
            .unwrap();
        assert_eq!(
            buffer.as_slice(),
            &[Update::Run(RunEntry::new(0, 275, 10, 0xFFFF))]
        );
    }

    #[tokio::test]
    async fn test_bad_magic_stops_after_four_bytes() {
        let mock = Builder::new().read(b"GET / HTTP/1.1\r\n").build();
        let mut reader = FramedReader::new(mock);
        let decoder = FrameDecoder::new(100);

        let result = decoder.read_header(&mut reader).await;
        assert!(matches!(
            result,
            Err(ServerError::Protocol(ProtocolError::InvalidMagic(m))) if &m == b"GET "
        ));
    }

    #[tokio::test]
    async fn test_unsupported_version() {
        let mock = Builder::new()
            .read(b"PXUP\x01\x00\x00\x00\x00\x01\x00")
            .build();
        let mut reader = FramedReader::new(mock);
        let decoder = FrameDecoder::new(100);

        let result = decoder.read_header(&mut reader).await;
        assert!(matches!(
            result,
            Err(ServerError::Protocol(ProtocolError::UnsupportedVersion {
                kind: PacketKind::Pixel,
                version: 1
            }))
        ));
    }

    #[tokio::test]
    async fn test_oversized_count_rejected_before_allocation() {
        // 65000 entries declared on a 100x100 surface
        let mock = Builder::new()
            .read(b"PXUP\x02\x01\x00\x00\x00\xE8\xFD")
            .build();
        let mut reader = FramedReader::new(mock);
        let mut buffer = UpdateBuffer::new();
        let decoder = FrameDecoder::for_surface(100 * 100, None);

        let header = decoder.read_header(&mut reader).await.unwrap();
        assert_eq!(header.entry_count, 65000);

        let result = decoder.read_body(&mut reader, &header, &mut buffer).await;
        assert!(matches!(
            result,
            Err(ServerError::Oversized {
                count: 65000,
                max: 10000
            })
        ));
        assert_eq!(buffer.capacity(), 0);
    }

    #[tokio::test]
    async fn test_max_entries_tightens_limit() {
        let decoder = FrameDecoder::for_surface(280 * 240, Some(4096));
        assert_eq!(decoder.entry_limit(), 4096);

        let decoder = FrameDecoder::for_surface(16, Some(4096));
        assert_eq!(decoder.entry_limit(), 16);
    }

    #[tokio::test]
    async fn test_short_body_discards_frame() {
        let packet = Packet::pixels(
            1,
            &[PixelEntry::new(1, 1, 1), PixelEntry::new(2, 2, 2)],
        )
        .unwrap();
        let bytes = packet.encode();
        // Close three bytes into the second entry
        let mock = Builder::new().read(&bytes[..HEADER_SIZE + 9]).build();
        let mut reader = FramedReader::new(mock);
        let mut buffer = UpdateBuffer::new();
        let decoder = FrameDecoder::new(100);

        let header = decoder.read_header(&mut reader).await.unwrap();
        let result = decoder.read_body(&mut reader, &header, &mut buffer).await;

        assert!(matches!(
            result,
            Err(ServerError::ShortRead {
                expected: 6,
                received: 3
            })
        ));
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_max_entries_rejects_before_buffer() {
        let packet = Packet::pixels(1, &[PixelEntry::new(0, 0, 0); 5]).unwrap();
        let mock = Builder::new().read(&packet.encode()[..HEADER_SIZE]).build();
        let mut reader = FramedReader::new(mock);
        let decoder = FrameDecoder::for_surface(64, Some(4));
        let mut buffer = UpdateBuffer::new().with_frame_limit(decoder.entry_limit());

        let header = decoder.read_header(&mut reader).await.unwrap();
        let result = decoder.read_body(&mut reader, &header, &mut buffer).await;
        assert!(matches!(
            result,
            Err(ServerError::Oversized { count: 5, max: 4 })
        ));
        assert_eq!(buffer.capacity(), 0);
    }
}
