//! OTA image assembly.
//!
//! The canonical in-memory image and its fixed-layout metadata header. The
//! header is the first thing the device loader reads: entrypoint offset,
//! payload length, and three load-descriptor slots. The entrypoint is always
//! an offset from the flash base, never an absolute address, so the same
//! image can be re-based if the flash region moves.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::error::OtaError;

/// Load-descriptor slots in the metadata header. Unused slots are all-zero.
pub const MAX_LOAD_DIRECTIVES: usize = 3;

/// Serialized header length: entrypoint + payload length + 3 descriptors.
pub const METADATA_SIZE: usize = 4 + MAX_LOAD_DIRECTIVES * 8;

/// A region the device loader copies out of the payload into volatile
/// memory at boot.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LoadDirective {
    /// Destination address in volatile memory.
    pub dest: u64,
    /// Offset of the source window within the payload buffer.
    pub offset: u64,
    /// Window length in bytes.
    pub len: u64,
}

/// The assembled OTA image. Immutable after assembly.
#[derive(Debug, Serialize)]
pub struct OtaImage {
    /// Payload length in bytes.
    pub size: usize,
    pub loads: Vec<LoadDirective>,
    /// Entrypoint offset relative to the flash base.
    pub entrypoint: u64,
    #[serde(serialize_with = "crate::utils::serialize_hex")]
    pub data: Vec<u8>,
}

impl OtaImage {
    pub fn new(entrypoint: u64, loads: Vec<LoadDirective>, data: Vec<u8>) -> Result<Self> {
        if loads.len() > MAX_LOAD_DIRECTIVES {
            return Err(OtaError::TooManyLoadDirectives { count: loads.len() }.into());
        }
        Ok(Self {
            size: data.len(),
            loads,
            entrypoint,
            data,
        })
    }

    /// The fixed-layout little-endian metadata header:
    /// `entrypoint u16 | payload_len u16 | 3 x (dest u32 | offset u16 | len u16)`.
    pub fn metadata(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(METADATA_SIZE);

        let entrypoint = u16::try_from(self.entrypoint)
            .context("entrypoint offset exceeds the 16-bit header field")?;
        let size =
            u16::try_from(self.size).context("payload length exceeds the 16-bit header field")?;
        out.extend_from_slice(&entrypoint.to_le_bytes());
        out.extend_from_slice(&size.to_le_bytes());

        for slot in 0..MAX_LOAD_DIRECTIVES {
            let (dest, offset, len) = match self.loads.get(slot) {
                Some(load) => (load.dest, load.offset, load.len),
                None => (0, 0, 0),
            };
            let dest = u32::try_from(dest).context("load destination exceeds 32 bits")?;
            let offset = u16::try_from(offset).context("load offset exceeds 16 bits")?;
            let len = u16::try_from(len).context("load length exceeds 16 bits")?;
            out.extend_from_slice(&dest.to_le_bytes());
            out.extend_from_slice(&offset.to_le_bytes());
            out.extend_from_slice(&len.to_le_bytes());
        }
        Ok(out)
    }

    /// The full stream handed to the chunker: header, then payload.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut out = self.metadata()?;
        out.reserve(self.data.len());
        out.extend_from_slice(&self.data);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_layout_is_fixed_and_little_endian() {
        let image = OtaImage::new(
            0x41,
            vec![LoadDirective {
                dest: 0x2000_0000,
                offset: 0x200,
                len: 0x30,
            }],
            vec![0xcc; 0x250],
        )
        .unwrap();

        let metadata = image.metadata().unwrap();
        assert_eq!(metadata.len(), METADATA_SIZE);
        assert_eq!(&metadata[0..2], &[0x41, 0x00]); // entrypoint
        assert_eq!(&metadata[2..4], &[0x50, 0x02]); // payload length 0x250
        assert_eq!(&metadata[4..8], &[0x00, 0x00, 0x00, 0x20]); // dest
        assert_eq!(&metadata[8..10], &[0x00, 0x02]); // offset
        assert_eq!(&metadata[10..12], &[0x30, 0x00]); // len
        // the two unused slots are all-zero
        assert!(metadata[12..].iter().all(|&b| b == 0));
    }

    #[test]
    fn serialized_stream_is_header_then_payload() {
        let image = OtaImage::new(0, Vec::new(), vec![1, 2, 3, 4]).unwrap();
        let stream = image.serialize().unwrap();
        assert_eq!(stream.len(), METADATA_SIZE + 4);
        assert_eq!(&stream[METADATA_SIZE..], &[1, 2, 3, 4]);
    }

    #[test]
    fn more_than_three_directives_is_an_error() {
        let load = LoadDirective {
            dest: 0,
            offset: 0,
            len: 0,
        };
        let err = OtaImage::new(0, vec![load; 4], Vec::new()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OtaError>(),
            Some(OtaError::TooManyLoadDirectives { count: 4 })
        ));
    }

    #[test]
    fn oversized_entrypoint_offset_is_rejected() {
        let image = OtaImage::new(0x1_0000, Vec::new(), Vec::new()).unwrap();
        assert!(image.metadata().is_err());
    }

    #[test]
    fn json_artifact_hex_encodes_the_payload() {
        let image = OtaImage::new(0x41, Vec::new(), vec![0xda, 0xba]).unwrap();
        let json = serde_json::to_value(&image).unwrap();
        assert_eq!(json["size"], 2);
        assert_eq!(json["entrypoint"], 0x41);
        assert_eq!(json["data"], "daba");
    }
}
