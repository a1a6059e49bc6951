//! Error taxonomy for the OTA build pipeline.
//!
//! Every variant is fatal to the current build: the tool aborts and surfaces
//! the specific failure with enough context (symbol name, entry list,
//! expected/actual byte counts) for a human to fix the input binary or
//! linker script. Nothing here is retried internally.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OtaError {
    /// No symbol in the binary carries the entrypoint marker prefix.
    #[error("no entrypoint marker found (expected a symbol prefixed with `{prefix}`)")]
    NoEntrypointMarker { prefix: &'static str },

    /// More than one marker symbol exists. The symbol table gives no
    /// ordering guarantee, so silently picking one would be arbitrary.
    #[error("multiple entrypoint markers found: {names:?}")]
    AmbiguousEntrypointMarker { names: Vec<String> },

    #[error("entrypoint symbol `{name}` not found in the symbol table")]
    EntrypointSymbolNotFound { name: String },

    /// The entrypoint resolved below the configured flash base, which means
    /// the region configuration does not match the binary's link address.
    #[error("entrypoint `{name}` at {address:#x} lies below the flash base {flash_base:#x}")]
    EntrypointBelowFlashBase {
        name: String,
        address: u64,
        flash_base: u64,
    },

    #[error("linker map file not found: {path}")]
    MapFileMissing { path: String },

    #[error("linker map contains no `{section}` output section")]
    MapSectionNotFound { section: String },

    #[error("unresolved linker map entries: {}", entries.join(", "))]
    UnresolvedLinkerEntries { entries: Vec<String> },

    /// The linker's accounting of `.ota.data` does not match the bytes
    /// extracted from the object files.
    #[error("patch data is {actual} bytes but the placeholder region is {expected} bytes")]
    PatchSizeMismatch { expected: usize, actual: usize },

    #[error("{count} load directives produced, the metadata header has room for 3")]
    TooManyLoadDirectives { count: usize },

    /// A segment starts before the write cursor, i.e. overlaps the previous
    /// segment in the flash layout.
    #[error("segment at {address:#x} overlaps previous segment ending at {cursor:#x}")]
    SegmentLayoutOverlap { address: u64, cursor: u64 },
}
