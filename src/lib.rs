//! OTA image extraction and chunking.
//!
//! This library builds a transmittable OTA firmware image from a compiled
//! binary and frames it for transport. It is organized into several modules:
//! - `config`: CLI configuration and memory layout parameters.
//! - `elf`: segment selection and entrypoint discovery.
//! - `extract`: flash image layout and load directives.
//! - `mapfile`: linker map parsing and `.ota.data` resolution.
//! - `patch`: placeholder data patching.
//! - `image`: image assembly and metadata serialization.
//! - `chunk`: transport chunk framing.

pub mod chunk;
pub mod config;
pub mod elf;
pub mod error;
pub mod extract;
pub mod image;
pub mod mapfile;
pub mod patch;
pub mod utils;
