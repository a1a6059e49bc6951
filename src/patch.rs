//! Data patching.
//!
//! Overwrites the SRAM placeholder window in the extracted payload with the
//! concatenated bytes recovered from the linker map. The exact-fit check at
//! the end is the most important correctness gate in the pipeline: it proves
//! the linker's accounting of `.ota.data` matches what was physically
//! extracted from the object files.

use anyhow::{ensure, Result};

use crate::error::OtaError;
use crate::image::LoadDirective;
use crate::mapfile::{verify_resolved, LinkerEntry};

/// Write `entries` back-to-back into the window `load` describes.
///
/// The entries' total byte length must equal `load.len` exactly; any
/// shortfall or overshoot is a [`OtaError::PatchSizeMismatch`].
pub fn patch(data: &mut [u8], load: &LoadDirective, entries: &[LinkerEntry]) -> Result<()> {
    verify_resolved(entries)?;

    let expected = load.len as usize;
    let actual: usize = entries.iter().filter_map(LinkerEntry::resolved_len).sum();
    if actual != expected {
        return Err(OtaError::PatchSizeMismatch { expected, actual }.into());
    }

    let start = load.offset as usize;
    ensure!(
        start + expected <= data.len(),
        "load directive window [{start}, {}) exceeds the {}-byte payload",
        start + expected,
        data.len()
    );

    let mut pos = start;
    for entry in entries {
        match entry {
            LinkerEntry::Hole { size } => {
                let size = *size as usize;
                data[pos..pos + size].fill(0);
                pos += size;
            }
            LinkerEntry::Reference { bytes, .. } => {
                // verify_resolved ran above
                let bytes = bytes.as_deref().unwrap_or_default();
                data[pos..pos + bytes.len()].copy_from_slice(bytes);
                pos += bytes.len();
            }
        }
    }
    tracing::info!("patched {} bytes at offset {}", expected, start);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(bytes: Vec<u8>) -> LinkerEntry {
        LinkerEntry::Reference {
            object: "app.o".to_string(),
            section: ".data".to_string(),
            bytes: Some(bytes),
        }
    }

    #[test]
    fn exact_fit_patch_fills_the_window() {
        let mut data = vec![0xee; 64];
        let load = LoadDirective {
            dest: 0x2000_0000,
            offset: 8,
            len: 48,
        };
        let entries = vec![LinkerEntry::Hole { size: 16 }, reference(vec![0xab; 32])];

        patch(&mut data, &load, &entries).unwrap();

        // bytes outside the window are untouched
        assert!(data[..8].iter().all(|&b| b == 0xee));
        assert!(data[56..].iter().all(|&b| b == 0xee));
        // hole then reference bytes, in declaration order
        assert!(data[8..24].iter().all(|&b| b == 0));
        assert!(data[24..56].iter().all(|&b| b == 0xab));
    }

    #[test]
    fn size_shortfall_is_a_mismatch() {
        let mut data = vec![0; 64];
        let load = LoadDirective {
            dest: 0x2000_0000,
            offset: 0,
            len: 48,
        };
        let entries = vec![LinkerEntry::Hole { size: 15 }, reference(vec![0xab; 32])];

        let err = patch(&mut data, &load, &entries).unwrap_err();
        match err.downcast_ref::<OtaError>() {
            Some(OtaError::PatchSizeMismatch { expected, actual }) => {
                assert_eq!(*expected, 48);
                assert_eq!(*actual, 47);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn overshoot_is_a_mismatch() {
        let mut data = vec![0; 64];
        let load = LoadDirective {
            dest: 0x2000_0000,
            offset: 0,
            len: 16,
        };
        let entries = vec![reference(vec![0; 17])];
        let err = patch(&mut data, &load, &entries).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OtaError>(),
            Some(OtaError::PatchSizeMismatch { .. })
        ));
    }

    #[test]
    fn unresolved_entries_block_patching() {
        let mut data = vec![0; 16];
        let load = LoadDirective {
            dest: 0x2000_0000,
            offset: 0,
            len: 16,
        };
        let entries = vec![LinkerEntry::Reference {
            object: "app.o".to_string(),
            section: ".data".to_string(),
            bytes: None,
        }];
        let err = patch(&mut data, &load, &entries).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OtaError>(),
            Some(OtaError::UnresolvedLinkerEntries { .. })
        ));
    }
}
