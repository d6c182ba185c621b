mod boot;
mod buffer;
mod cli;
mod dirent;
mod error;
mod fat;
mod image;
mod layout;
mod tree;

use anyhow::{bail, Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use cli::Args;
use layout::DiskGeometry;
use log::{debug, info};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tree::Directory;

fn main() -> Result<()> {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            std::process::exit(parse_exit_code(e.kind()));
        }
    };

    env_logger::Builder::new()
        .filter_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        })
        .format_timestamp(None)
        .format_target(false)
        .init();

    run(&args)
}

/// Help and version exit 0. Usage errors exit 1, not clap's default 2.
fn parse_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => 1,
    }
}

fn run(args: &Args) -> Result<()> {
    info!("Neko image builder v{}", env!("CARGO_PKG_VERSION"));

    let boot_sector = read_input(&args.boot_sector, "boot sector")?;
    let bootloader = read_input(&args.bootloader, "bootloader")?;
    let root = load_root(args)?;

    let built = image::build_image(
        DiskGeometry::default(),
        &boot_sector,
        &bootloader,
        &args.label,
        &root,
    )
    .context("Failed to build disk image")?;

    debug!(
        "Partition: LBA {}..{}, data region at {:#x}",
        built.layout.geometry.first_partition_sector,
        built.layout.geometry.first_partition_sector + built.layout.total_sectors,
        built.layout.data_start()
    );
    for entry in &built.entries {
        debug!(
            "  {:#08x} {}{} cluster={} clusters={} size={}",
            entry.slot,
            entry.path,
            if entry.is_dir { "/" } else { "" },
            entry.chain.first,
            entry.chain.len,
            entry.size
        );
    }

    info!("Writing image file...");
    write_output(&args.output, &built.bytes)?;
    info!("Done");
    Ok(())
}

fn read_input(path: &Path, what: &str) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("Failed to read {what} {path:?}"))
}

/// Either a host directory tree or a single kernel file at the root.
fn load_root(args: &Args) -> Result<Directory> {
    if let Some(dir) = &args.root {
        return Directory::scan(dir);
    }
    let Some(kernel) = &args.kernel else {
        bail!("either --root or --kernel is required");
    };
    let name = kernel
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Kernel path {kernel:?} has no usable file name"))?;
    let metadata =
        fs::metadata(kernel).with_context(|| format!("Failed to read kernel {kernel:?}"))?;
    if !metadata.is_file() {
        bail!("Kernel {kernel:?} is not a regular file");
    }
    let mut root = Directory::new();
    root.insert_host_file(name, kernel.clone(), metadata.len());
    Ok(root)
}

/// Write the finished image through a temporary file in the same directory,
/// renamed over `path` once complete. On failure `path` is left untouched.
fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary file in {dir:?}"))?;
    tmp.write_all(bytes)
        .and_then(|()| tmp.as_file().sync_all())
        .with_context(|| format!("Failed to write image {path:?}"))?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to write image {path:?}"))?;
    Ok(())
}
