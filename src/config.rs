//! Configuration module.
//!
//! This module defines the command-line interface (CLI) for the tool using
//! `clap`, plus the [`OtaParams`] memory-layout struct that is passed
//! explicitly into every pipeline stage. Keeping the region parameters in a
//! value type (rather than process-wide state) keeps builds reentrant and
//! testable with varying memory layouts.

use clap::Parser;
use std::path::PathBuf;

/// Extracts an OTA firmware image from a compiled binary and frames it into
/// bounded-size transport chunks.
///
/// The binary's program segments inside the configured flash and SRAM
/// regions become the image payload; the `.ota.data` contents are recovered
/// from the linker map and the given object files.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Path to the binary containing the code to be extracted
    pub binary_path: PathBuf,

    /// Object files supplying `.ota.data` contributions named by the linker map
    #[arg(num_args = 0..)]
    pub objects: Vec<PathBuf>,

    /// Linker map file (defaults to the binary path with a `.map` extension)
    #[arg(long)]
    pub map: Option<PathBuf>,

    /// Start location of the OTA app in flash
    #[arg(long, default_value = "0x17000", value_parser = parse_int)]
    pub ota_flash_addr: u64,

    /// Max length of the OTA app in flash
    #[arg(long, default_value = "0x4000", value_parser = parse_int)]
    pub ota_flash_len: u64,

    /// Start location of the OTA app in SRAM
    #[arg(long, default_value = "0x20000000", value_parser = parse_int)]
    pub ota_sram_addr: u64,

    /// Max length of the OTA app in SRAM
    #[arg(long, default_value = "0x1000", value_parser = parse_int)]
    pub ota_sram_len: u64,

    /// Maximum payload bytes per transport chunk
    #[arg(long, default_value_t = 68)]
    pub chunk_payload: usize,

    /// Directory the chunk files are written to (recreated on every run)
    #[arg(long, default_value = "./ota_blobs")]
    pub out_dir: PathBuf,

    /// Also write the intermediate image artifact as JSON
    #[arg(long)]
    pub image_json: Option<PathBuf>,

    /// Use the CRC-16 chunk checksum instead of the placeholder constant
    #[arg(long)]
    pub crc: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", help = "Set the logging level")]
    pub log_level: String,
}

impl Config {
    /// Path of the linker map artifact: an explicit `--map`, or the binary
    /// path with its extension replaced by `.map`.
    pub fn map_path(&self) -> PathBuf {
        match &self.map {
            Some(path) => path.clone(),
            None => self.binary_path.with_extension("map"),
        }
    }
}

/// Parse a decimal or `0x`-prefixed hexadecimal integer.
fn parse_int(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid integer `{s}`: {e}"))
}

/// Memory layout parameters for a single build.
///
/// The flash region holds the image itself; the SRAM (volatile) region holds
/// data the device loader copies out of the image at boot.
#[derive(Debug, Clone, Copy)]
pub struct OtaParams {
    pub flash_addr: u64,
    pub flash_len: u64,
    pub sram_addr: u64,
    pub sram_len: u64,
}

impl OtaParams {
    /// Whether `[addr, addr+len)` lies fully inside the flash region.
    pub fn flash_contains(&self, addr: u64, len: u64) -> bool {
        range_contains(addr, len, self.flash_addr, self.flash_len)
    }

    /// Whether `[addr, addr+len)` lies fully inside the SRAM region.
    pub fn sram_contains(&self, addr: u64, len: u64) -> bool {
        range_contains(addr, len, self.sram_addr, self.sram_len)
    }
}

impl From<&Config> for OtaParams {
    fn from(config: &Config) -> Self {
        Self {
            flash_addr: config.ota_flash_addr,
            flash_len: config.ota_flash_len,
            sram_addr: config.ota_sram_addr,
            sram_len: config.ota_sram_len,
        }
    }
}

fn range_contains(start: u64, len: u64, region_start: u64, region_len: u64) -> bool {
    start >= region_start
        && start
            .checked_add(len)
            .is_some_and(|end| end <= region_start + region_len)
}
