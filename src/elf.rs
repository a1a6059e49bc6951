//! Binary image reading.
//!
//! Parses the input ELF, locates the OTA entrypoint through its marker
//! symbol, and selects the program segments that fall inside the configured
//! OTA flash or SRAM regions. Segments outside both regions are expected in
//! any real binary and are skipped silently; a selected segment must also
//! carry one of the OTA sections, which keeps unrelated linker-injected
//! segments (runtime/OS initialization data overlapping the address window)
//! out of the image.

use anyhow::{Context, Result};
use object::read::{Object, ObjectSection, ObjectSegment, ObjectSymbol};

use crate::config::OtaParams;
use crate::error::OtaError;

/// Symbols with this prefix name the real entrypoint symbol in their suffix.
pub const ENTRYPOINT_MARKER: &str = "__ota_entrypoint_";

/// Section names that make a segment part of the OTA image.
const OTA_SECTIONS: [&str; 2] = [".ota.text", ".ota.data"];

/// Where a selected segment lives at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Memory-mapped directly out of the flash image.
    Flash,
    /// Copied into volatile memory by the device loader at boot.
    Sram,
}

/// A program segment selected for the OTA image.
///
/// Immutable once read from the binary.
#[derive(Debug)]
pub struct OtaSegment {
    /// Virtual load address.
    pub address: u64,
    /// In-memory size (`p_memsz`).
    pub mem_size: u64,
    /// File-backed bytes of the segment.
    pub data: Vec<u8>,
    pub placement: Placement,
}

/// Read the OTA-relevant program segments, sorted ascending by address.
pub fn read_segments(obj: &object::File, params: &OtaParams) -> Result<Vec<OtaSegment>> {
    let sections = section_ranges(obj);

    let mut segments = Vec::new();
    for segment in obj.segments() {
        let address = segment.address();
        let mem_size = segment.size();

        let Some(placement) = classify(address, mem_size, params) else {
            tracing::debug!(
                "skipping segment at {:#x} ({} bytes): outside OTA regions",
                address,
                mem_size
            );
            continue;
        };
        if !contains_ota_section(&sections, address, mem_size) {
            tracing::debug!(
                "skipping segment at {:#x} ({} bytes): no OTA section inside",
                address,
                mem_size
            );
            continue;
        }

        let data = segment
            .data()
            .with_context(|| format!("failed to read segment data at {address:#x}"))?
            .to_vec();
        segments.push(OtaSegment {
            address,
            mem_size,
            data,
            placement,
        });
    }

    segments.sort_by_key(|s| s.address);
    Ok(segments)
}

/// Entrypoint offset relative to the flash base.
pub fn find_entrypoint(obj: &object::File, params: &OtaParams) -> Result<u64> {
    let mut symbols = Vec::new();
    for sym in obj.symbols() {
        let name = sym.name().context("failed to read symbol name")?;
        symbols.push((name.to_string(), sym.address()));
    }
    resolve_entrypoint(&symbols, params.flash_addr)
}

/// Name and address range of every named, non-empty section.
fn section_ranges(obj: &object::File) -> Vec<(String, u64, u64)> {
    obj.sections()
        .filter(|s| s.size() > 0)
        .filter_map(|s| Some((s.name().ok()?.to_string(), s.address(), s.size())))
        .collect()
}

/// Classify a segment by full containment in one of the two regions.
fn classify(address: u64, len: u64, params: &OtaParams) -> Option<Placement> {
    if params.flash_contains(address, len) {
        Some(Placement::Flash)
    } else if params.sram_contains(address, len) {
        Some(Placement::Sram)
    } else {
        None
    }
}

/// Whether any section named in [`OTA_SECTIONS`] lies inside the segment.
fn contains_ota_section(sections: &[(String, u64, u64)], seg_addr: u64, seg_len: u64) -> bool {
    sections.iter().any(|(name, addr, len)| {
        OTA_SECTIONS.contains(&name.as_str())
            && *addr >= seg_addr
            && addr + len <= seg_addr + seg_len
    })
}

/// Two-step entrypoint discovery over (name, address) symbol pairs.
///
/// Exactly one symbol must carry the marker prefix; its suffix names the
/// real entrypoint symbol, whose address is returned relative to the flash
/// base.
fn resolve_entrypoint(symbols: &[(String, u64)], flash_base: u64) -> Result<u64> {
    let markers: Vec<&str> = symbols
        .iter()
        .filter_map(|(name, _)| name.strip_prefix(ENTRYPOINT_MARKER))
        .collect();

    let name = match markers.as_slice() {
        [] => {
            return Err(OtaError::NoEntrypointMarker {
                prefix: ENTRYPOINT_MARKER,
            }
            .into())
        }
        [name] => *name,
        many => {
            return Err(OtaError::AmbiguousEntrypointMarker {
                names: many.iter().map(|n| n.to_string()).collect(),
            }
            .into())
        }
    };

    let (_, address) = symbols
        .iter()
        .find(|(sym, _)| sym == name)
        .ok_or_else(|| OtaError::EntrypointSymbolNotFound {
            name: name.to_string(),
        })?;

    address
        .checked_sub(flash_base)
        .ok_or_else(|| {
            OtaError::EntrypointBelowFlashBase {
                name: name.to_string(),
                address: *address,
                flash_base,
            }
            .into()
        })
}
