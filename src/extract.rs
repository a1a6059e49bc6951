//! Segment extraction.
//!
//! Walks the selected segments in ascending address order and lays out the
//! contiguous flash image. Gaps between flash-resident segments are filled
//! with zeros so the image can be memory-mapped at the flash base without
//! disturbing absolute addresses. SRAM-resident segments become zero-filled
//! placeholder windows in the image, recorded as load directives for the
//! device loader; their content is supplied later by the data patcher.

use anyhow::Result;

use crate::config::OtaParams;
use crate::elf::{OtaSegment, Placement};
use crate::error::OtaError;
use crate::image::LoadDirective;

/// The flash image payload plus the load directives referencing windows in it.
#[derive(Debug)]
pub struct ExtractedImage {
    pub data: Vec<u8>,
    pub loads: Vec<LoadDirective>,
}

/// Lay out `segments` into a contiguous buffer starting at the flash base.
///
/// Segments must be sorted ascending by address; a segment starting below
/// the write cursor is a fatal layout error.
pub fn extract(segments: &[OtaSegment], params: &OtaParams) -> Result<ExtractedImage> {
    // worst case: the whole flash window plus the SRAM placeholder
    let mut data = Vec::with_capacity((params.flash_len + params.sram_len) as usize);
    let mut loads = Vec::new();
    let mut cursor = params.flash_addr;

    for segment in segments {
        match segment.placement {
            Placement::Flash => {
                let gap = segment.address.checked_sub(cursor).ok_or(
                    OtaError::SegmentLayoutOverlap {
                        address: segment.address,
                        cursor,
                    },
                )?;
                data.resize(data.len() + gap as usize, 0);
                data.extend_from_slice(&segment.data);
                cursor += gap + segment.data.len() as u64;
            }
            Placement::Sram => {
                loads.push(LoadDirective {
                    dest: segment.address,
                    offset: cursor - params.flash_addr,
                    len: segment.mem_size,
                });
                data.resize(data.len() + segment.mem_size as usize, 0);
                cursor += segment.mem_size;
            }
        }
    }

    tracing::info!(
        "extracted {} bytes, {} load directive(s)",
        data.len(),
        loads.len()
    );
    Ok(ExtractedImage { data, loads })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> OtaParams {
        OtaParams {
            flash_addr: 0x17000,
            flash_len: 0x4000,
            sram_addr: 0x2000_0000,
            sram_len: 0x1000,
        }
    }

    fn flash_segment(address: u64, data: Vec<u8>) -> OtaSegment {
        OtaSegment {
            address,
            mem_size: data.len() as u64,
            data,
            placement: Placement::Flash,
        }
    }

    #[test]
    fn gaps_between_flash_segments_are_zero_filled() {
        // 100 bytes at the base, 80 bytes at 0x17200: a 412-byte gap
        let segments = vec![
            flash_segment(0x17000, vec![0xaa; 100]),
            flash_segment(0x17200, vec![0xbb; 80]),
        ];
        let image = extract(&segments, &params()).unwrap();

        assert_eq!(image.data.len(), 0x250);
        assert_eq!(&image.data[..100], &[0xaa; 100][..]);
        assert!(image.data[100..512].iter().all(|&b| b == 0));
        assert_eq!(&image.data[512..], &[0xbb; 80][..]);
        assert!(image.loads.is_empty());
    }

    #[test]
    fn sram_segment_becomes_placeholder_and_directive() {
        let segments = vec![
            flash_segment(0x17000, vec![0x11; 16]),
            OtaSegment {
                address: 0x2000_0000,
                mem_size: 0x30,
                data: Vec::new(),
                placement: Placement::Sram,
            },
        ];
        let image = extract(&segments, &params()).unwrap();

        assert_eq!(image.data.len(), 16 + 0x30);
        assert!(image.data[16..].iter().all(|&b| b == 0));
        assert_eq!(image.loads.len(), 1);
        let load = &image.loads[0];
        assert_eq!(load.dest, 0x2000_0000);
        assert_eq!(load.offset, 16);
        assert_eq!(load.len, 0x30);
    }

    #[test]
    fn overlapping_segments_are_fatal() {
        let segments = vec![
            flash_segment(0x17000, vec![0; 0x100]),
            flash_segment(0x170f0, vec![0; 0x10]),
        ];
        let err = extract(&segments, &params()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OtaError>(),
            Some(OtaError::SegmentLayoutOverlap { .. })
        ));
    }

    #[test]
    fn segment_at_flash_base_has_no_gap() {
        let segments = vec![flash_segment(0x17000, vec![1, 2, 3])];
        let image = extract(&segments, &params()).unwrap();
        assert_eq!(image.data, vec![1, 2, 3]);
    }

    #[test]
    fn empty_segment_list_yields_empty_image() {
        let image = extract(&[], &params()).unwrap();
        assert!(image.data.is_empty());
        assert!(image.loads.is_empty());
    }
}
