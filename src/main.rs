//! Entry point for the otapack tool.
//!
//! This file handles high-level application flow:
//! 1. Parse command-line arguments using `clap`.
//! 2. Read the input binary, its linker map, and any secondary object files.
//! 3. Execute the build steps: read segments, extract, resolve, patch,
//!    assemble.
//! 4. Write the hex-encoded chunk files (and optionally the JSON artifact).
//!
//! Error handling is done via `anyhow`.

use anyhow::{bail, Context, Result};
use clap::Parser;
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;

use otapack::chunk::{crc16, Chunk, Chunker};
use otapack::config::{Config, OtaParams};
use otapack::error::OtaError;
use otapack::image::OtaImage;
use otapack::utils::to_hex;
use otapack::{elf, extract, mapfile, patch};

fn main() -> Result<()> {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&config.log_level)
                .context("invalid log level")?,
        )
        .init();

    let image = build_image(&config)?;

    if let Some(path) = &config.image_json {
        let json = serde_json::to_string_pretty(&image)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    let stream = image.serialize()?;
    let mut chunker = Chunker::new(config.chunk_payload);
    if config.crc {
        chunker = chunker.with_checksum(crc16);
    }
    let chunks = chunker.split(&stream)?;
    write_chunks(&config.out_dir, &chunks)?;

    println!(
        "Wrote {} chunks ({} bytes) to {}",
        chunks.len(),
        stream.len(),
        config.out_dir.display()
    );
    Ok(())
}

/// Run the extraction pipeline: segments and linker map entries are
/// gathered independently, then joined by the data patcher.
fn build_image(config: &Config) -> Result<OtaImage> {
    let params = OtaParams::from(config);

    let file = File::open(&config.binary_path)
        .with_context(|| format!("failed to open {}", config.binary_path.display()))?;
    let mmap = unsafe { Mmap::map(&file)? };
    let obj = object::File::parse(&*mmap).context("failed to parse input binary")?;

    let entrypoint = elf::find_entrypoint(&obj, &params)?;
    let segments = elf::read_segments(&obj, &params)?;
    tracing::info!(
        "selected {} segments, entrypoint offset {:#x}",
        segments.len(),
        entrypoint
    );
    let extracted = extract::extract(&segments, &params)?;

    let entries = resolve_map_entries(config)?;

    let extract::ExtractedImage { mut data, loads } = extracted;
    let [load] = loads.as_slice() else {
        bail!(
            "expected exactly one SRAM load directive for {}, found {}",
            mapfile::DATA_SECTION,
            loads.len()
        );
    };
    patch::patch(&mut data, load, &entries)?;

    OtaImage::new(entrypoint, loads, data)
}

/// Parse the linker map and resolve its entries against the secondary
/// object files given on the command line.
fn resolve_map_entries(config: &Config) -> Result<Vec<mapfile::LinkerEntry>> {
    let map_path = config.map_path();
    if !map_path.exists() {
        return Err(OtaError::MapFileMissing {
            path: map_path.display().to_string(),
        }
        .into());
    }
    let map_text = std::fs::read_to_string(&map_path)
        .with_context(|| format!("failed to read {}", map_path.display()))?;
    let mut entries = mapfile::parse_map(&map_text)?;

    for path in &config.objects {
        let file = File::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        let mmap = unsafe { Mmap::map(&file)? };
        let obj = object::File::parse(&*mmap)
            .with_context(|| format!("failed to parse object file {}", path.display()))?;
        let name = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        mapfile::resolve_from_object(&mut entries, &name, &obj)?;
    }

    mapfile::verify_resolved(&entries)?;
    Ok(entries)
}

/// Recreate the output directory and write one hex-encoded file per chunk.
fn write_chunks(out_dir: &Path, chunks: &[Chunk]) -> Result<()> {
    if out_dir.is_dir() {
        std::fs::remove_dir_all(out_dir)
            .with_context(|| format!("failed to clear {}", out_dir.display()))?;
    }
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    for chunk in chunks {
        let path = out_dir.join(format!("ota.chunk.{}", chunk.index));
        std::fs::write(&path, to_hex(&chunk.encode()))
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(())
}
