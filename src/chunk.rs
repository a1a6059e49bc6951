//! Chunk framing.
//!
//! Splits the serialized image stream into bounded-size transport frames.
//! Each frame is self-describing and independently verifiable in isolation:
//! magic sentinel, total stream size, sequence position, payload checksum,
//! and payload length. Only sequence continuity needs the full set.

use anyhow::{ensure, Context, Result};

/// Frame-boundary sentinel checked by the receiver.
pub const CHUNK_MAGIC: u32 = 0xdaba_d000;

/// Header bytes in front of every chunk payload.
pub const CHUNK_HEADER_SIZE: usize = 12;

/// Checksum over a chunk's payload bytes.
///
/// The wire layout reserves a 16-bit slot; the algorithm behind it is
/// swappable without changing the chunk layout.
pub type ChecksumFn = fn(&[u8]) -> u16;

/// Placeholder checksum the current device loader expects.
pub fn null_checksum(_payload: &[u8]) -> u16 {
    0
}

/// CRC-16 (Nordic DFU variant) for receivers that verify payload integrity.
pub fn crc16(payload: &[u8]) -> u16 {
    let mut crc: u16 = 0xffff;
    for &b in payload {
        crc = (crc >> 8 & 0x00ff) | (crc << 8 & 0xff00);
        crc ^= b as u16;
        crc ^= (crc & 0x00ff) >> 4;
        crc ^= (crc << 8) << 4;
        crc ^= ((crc & 0x00ff) << 4) << 1;
    }
    crc
}

/// One framed unit of the output stream.
#[derive(Debug)]
pub struct Chunk {
    /// Size of the whole stream, not just this chunk.
    pub total_size: u16,
    pub index: u8,
    pub num_chunks: u8,
    pub checksum: u16,
    pub payload: Vec<u8>,
}

impl Chunk {
    /// `magic u32 | total_size u16 | index u8 | num_chunks u8 | checksum u16
    /// | payload_len u16 | payload`, integers little-endian.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(CHUNK_HEADER_SIZE + self.payload.len());
        out.extend_from_slice(&CHUNK_MAGIC.to_le_bytes());
        out.extend_from_slice(&self.total_size.to_le_bytes());
        out.push(self.index);
        out.push(self.num_chunks);
        out.extend_from_slice(&self.checksum.to_le_bytes());
        out.extend_from_slice(&(self.payload.len() as u16).to_le_bytes());
        out.extend_from_slice(&self.payload);
        out
    }
}

/// Stateless stream splitter.
pub struct Chunker {
    max_payload: usize,
    checksum: ChecksumFn,
}

impl Chunker {
    pub fn new(max_payload: usize) -> Self {
        Self {
            max_payload,
            checksum: null_checksum,
        }
    }

    pub fn with_checksum(mut self, checksum: ChecksumFn) -> Self {
        self.checksum = checksum;
        self
    }

    /// Split `stream` into `ceil(len / max_payload)` frames. Every chunk
    /// except the last carries exactly `max_payload` bytes.
    pub fn split(&self, stream: &[u8]) -> Result<Vec<Chunk>> {
        ensure!(self.max_payload > 0, "chunk payload size must be non-zero");
        let total_size = u16::try_from(stream.len())
            .context("stream does not fit the 16-bit total size field")?;
        let num_chunks = u8::try_from(stream.len().div_ceil(self.max_payload))
            .context("stream needs more than 255 chunks")?;

        let chunks = stream
            .chunks(self.max_payload)
            .enumerate()
            .map(|(index, payload)| Chunk {
                total_size,
                index: index as u8,
                num_chunks,
                checksum: (self.checksum)(payload),
                payload: payload.to_vec(),
            })
            .collect();
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_into_full_chunks_plus_remainder() {
        let stream = vec![0x5a; 200];
        let chunks = Chunker::new(80).split(&stream).unwrap();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].payload.len(), 80);
        assert_eq!(chunks[1].payload.len(), 80);
        assert_eq!(chunks[2].payload.len(), 40);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i as u8);
            assert_eq!(chunk.num_chunks, 3);
            assert_eq!(chunk.total_size, 200);
            assert_eq!(chunk.checksum, 0);
        }
    }

    #[test]
    fn chunking_is_lossless_and_order_preserving() {
        let stream: Vec<u8> = (0..=255).cycle().take(700).map(|b| b as u8).collect();
        let chunks = Chunker::new(68).split(&stream).unwrap();

        let rejoined: Vec<u8> = chunks.iter().flat_map(|c| c.payload.clone()).collect();
        assert_eq!(rejoined, stream);
    }

    #[test]
    fn exact_multiple_has_no_short_tail() {
        let chunks = Chunker::new(50).split(&[0u8; 100]).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].payload.len(), 50);
    }

    #[test]
    fn frame_layout_is_little_endian() {
        let chunk = Chunk {
            total_size: 0x0250,
            index: 1,
            num_chunks: 3,
            checksum: 0,
            payload: vec![0xaa; 4],
        };
        let encoded = chunk.encode();
        assert_eq!(
            encoded,
            vec![
                0x00, 0xd0, 0xba, 0xda, // magic
                0x50, 0x02, // total size
                0x01, 0x03, // index, num_chunks
                0x00, 0x00, // checksum
                0x04, 0x00, // payload length
                0xaa, 0xaa, 0xaa, 0xaa,
            ]
        );
    }

    #[test]
    fn checksum_slot_is_pluggable() {
        let chunks = Chunker::new(16)
            .with_checksum(crc16)
            .split(&[1, 2, 3, 4])
            .unwrap();
        assert_eq!(chunks[0].checksum, crc16(&[1, 2, 3, 4]));
        assert_ne!(chunks[0].checksum, 0);
    }

    #[test]
    fn empty_stream_yields_no_chunks() {
        let chunks = Chunker::new(68).split(&[]).unwrap();
        assert!(chunks.is_empty());
    }
}
