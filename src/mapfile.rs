//! Linker map resolution.
//!
//! The linker map is the build tool's text report of how output sections
//! were composed from input object file sections. This module recovers the
//! ordered list of contributions making up the `.ota.data` output section
//! and resolves each reference to its raw bytes by reading the named object
//! file. Declaration order matters: the data patcher writes the entries
//! back-to-back in exactly this order.

use anyhow::{bail, Context, Result};
use object::read::{Object, ObjectSection};
use std::path::Path;

use crate::error::OtaError;

/// Name of the output section whose composition is recovered from the map.
pub const DATA_SECTION: &str = ".ota.data";

/// Trailing marker on map lines describing zero-filled fill regions.
const HOLE_MARKER: &str = "--HOLE--";

/// One contribution to the `.ota.data` output section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkerEntry {
    /// A declared fill region with no backing object data; resolved at
    /// creation as `size` zero bytes.
    Hole { size: u64 },
    /// Data from `section` of object file `object`; `bytes` stays `None`
    /// until the resolution pass finds the section.
    Reference {
        object: String,
        section: String,
        bytes: Option<Vec<u8>>,
    },
}

impl LinkerEntry {
    /// Byte length this entry contributes, if known.
    pub fn resolved_len(&self) -> Option<usize> {
        match self {
            LinkerEntry::Hole { size } => Some(*size as usize),
            LinkerEntry::Reference { bytes, .. } => bytes.as_ref().map(Vec::len),
        }
    }

    fn is_resolved(&self) -> bool {
        self.resolved_len().is_some()
    }

    fn describe(&self) -> String {
        match self {
            LinkerEntry::Hole { size } => format!("hole({size:#x})"),
            LinkerEntry::Reference {
                object, section, ..
            } => format!("{object}({section})"),
        }
    }
}

/// Parse the `.ota.data` block out of a linker map report.
///
/// The block starts at a line beginning with `.ota.data` and runs to the
/// next blank line; its first line is the column header and carries no
/// entry.
pub fn parse_map(text: &str) -> Result<Vec<LinkerEntry>> {
    let mut lines = text.lines();
    loop {
        match lines.next() {
            Some(line) if line.starts_with(DATA_SECTION) => break,
            Some(_) => continue,
            None => {
                return Err(OtaError::MapSectionNotFound {
                    section: DATA_SECTION.to_string(),
                }
                .into())
            }
        }
    }

    let mut entries = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            break;
        }
        entries.push(parse_line(line)?);
    }
    Ok(entries)
}

/// Parse a single map line: `origin size object (section)` or a fill line
/// ending in the hole marker. Sizes are hexadecimal.
fn parse_line(line: &str) -> Result<LinkerEntry> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let size_token = tokens
        .get(1)
        .with_context(|| format!("malformed map line: `{line}`"))?;
    let size = u64::from_str_radix(size_token.trim_start_matches("0x"), 16)
        .with_context(|| format!("invalid size `{size_token}` in map line: `{line}`"))?;

    if line.trim_end().ends_with(HOLE_MARKER) {
        return Ok(LinkerEntry::Hole { size });
    }

    let (object, section) = match (tokens.get(2), tokens.get(3)) {
        (Some(object), Some(section)) => {
            (object.to_string(), section.trim_matches(['(', ')']).to_string())
        }
        _ => bail!("map line names no object/section: `{line}`"),
    };
    Ok(LinkerEntry::Reference {
        object,
        section,
        bytes: None,
    })
}

/// Assign bytes from one object file to every reference entry naming it.
///
/// Entries match on the final path component of the map's object identifier.
/// Sections are matched by exact name only; an entry whose section is absent
/// (or empty) stays unresolved.
pub fn resolve_from_object(
    entries: &mut [LinkerEntry],
    name: &str,
    obj: &object::File,
) -> Result<()> {
    let mut sections = Vec::new();
    for section in obj.sections() {
        let Ok(section_name) = section.name() else {
            continue;
        };
        let data = section
            .data()
            .with_context(|| format!("failed to read section `{section_name}` of {name}"))?;
        sections.push((section_name.to_string(), data.to_vec()));
    }
    apply_object(entries, name, &sections);
    Ok(())
}

fn apply_object(entries: &mut [LinkerEntry], name: &str, sections: &[(String, Vec<u8>)]) {
    for entry in entries.iter_mut() {
        let LinkerEntry::Reference {
            object,
            section,
            bytes,
        } = entry
        else {
            continue;
        };
        if bytes.is_some() || !object_matches(object, name) {
            continue;
        }
        let resolved = sections
            .iter()
            .find(|(n, data)| n == section && !data.is_empty());
        if let Some((_, data)) = resolved {
            tracing::debug!("resolved {}({}): {} bytes", object, section, data.len());
            *bytes = Some(data.clone());
        }
    }
}

// TODO: archive member identifiers (`lib.a(obj.o)`) are not matched; split
// the identifier if `.ota.data` is ever linked out of an archive.
fn object_matches(identifier: &str, name: &str) -> bool {
    identifier == name
        || Path::new(identifier)
            .file_name()
            .is_some_and(|file| file == name)
}

/// Every entry must be resolved before the data patcher may run.
pub fn verify_resolved(entries: &[LinkerEntry]) -> Result<()> {
    let unresolved: Vec<String> = entries
        .iter()
        .filter(|e| !e.is_resolved())
        .map(LinkerEntry::describe)
        .collect();
    if unresolved.is_empty() {
        Ok(())
    } else {
        Err(OtaError::UnresolvedLinkerEntries {
            entries: unresolved,
        }
        .into())
    }
}
