/// Disk image assembly.
///
/// Order of operations:
///   1. boot sector and bootloader
///   2. MBR partition entry and BPB
///   3. reserved FAT entries
///   4. root directory: volume label, then a depth-first walk of the tree
///
/// The walk allocates clusters as it goes, so the cluster numbers in the
/// image follow the order entries are visited in.
use crate::boot;
use crate::buffer::ImageBuffer;
use crate::dirent::{DirEntry, ShortName};
use crate::error::ImageError;
use crate::fat::{ClusterAllocator, ClusterChain};
use crate::layout::{DiskGeometry, Layout, DIRENT_SIZE};
use crate::tree::{Directory, FileNode, Node};
use log::info;

/// One dirent written during the walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedEntry {
    /// Slash-separated path from the root, e.g. `SUB/B.TXT`.
    pub path: String,
    pub is_dir: bool,
    pub chain: ClusterChain,
    pub size: u32,
    /// Byte offset of the dirent itself.
    pub slot: usize,
}

pub struct BuiltImage {
    pub layout: Layout,
    pub bytes: Vec<u8>,
    pub entries: Vec<PlacedEntry>,
}

/// Fixed-capacity array of 32-byte slots.
struct DirSlots {
    path: String,
    base: usize,
    capacity: usize,
    used: usize,
}

impl DirSlots {
    fn new(path: String, base: usize, capacity: usize) -> Self {
        DirSlots {
            path,
            base,
            capacity,
            used: 0,
        }
    }

    fn take(&mut self) -> Result<usize, ImageError> {
        if self.used >= self.capacity {
            return Err(ImageError::DirectoryFull {
                path: self.path.clone(),
                capacity: self.capacity,
            });
        }
        let offset = self.base + self.used * DIRENT_SIZE;
        self.used += 1;
        Ok(offset)
    }

    fn child_path(&self, name: &str) -> String {
        if self.path.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.path, name)
        }
    }
}

/// Allocate a chain for `file`, then read it and copy it to the chain's first
/// cluster. The chain is reserved before the host file is opened, so a file
/// that cannot fit is rejected without reading it. The bytes are dropped on
/// return.
fn write_payload(
    image: &mut ImageBuffer,
    layout: &Layout,
    alloc: &mut ClusterAllocator,
    path: &str,
    file: &FileNode,
    size: u32,
) -> Result<ClusterChain, ImageError> {
    let chain = alloc.allocate_chain(image, size as usize)?;
    if chain.is_empty() {
        return Ok(chain);
    }

    let data = file.load().map_err(|e| ImageError::ReadFailed {
        path: path.to_string(),
        message: e.to_string(),
    })?;
    if data.len() != size as usize {
        return Err(ImageError::ReadFailed {
            path: path.to_string(),
            message: format!("size changed from {size} to {} bytes", data.len()),
        });
    }
    // Chains are consecutive, so the payload is one contiguous span.
    image.write(layout.cluster_to_offset(chain.first), &data)?;
    Ok(chain)
}

/// Write one entry per child of `dir` into `slots`, recursing into
/// subdirectories. Returns every entry written, in visit order.
fn write_directory(
    image: &mut ImageBuffer,
    layout: &Layout,
    alloc: &mut ClusterAllocator,
    slots: &mut DirSlots,
    dir: &Directory,
) -> Result<Vec<PlacedEntry>, ImageError> {
    let mut placed = Vec::new();

    for (name, node) in &dir.entries {
        let short = ShortName::new(name)?;
        let slot = slots.take()?;
        let path = slots.child_path(name);

        match node {
            Node::Directory(sub) => {
                let chain = alloc.allocate_directory(image)?;
                image.write(slot, &DirEntry::directory(short, chain.first as u16).encode())?;
                placed.push(PlacedEntry {
                    path: path.clone(),
                    is_dir: true,
                    chain,
                    size: 0,
                    slot,
                });

                let mut sub_slots = DirSlots::new(
                    path,
                    layout.cluster_to_offset(chain.first),
                    layout.subdir_capacity(),
                );
                placed.extend(write_directory(image, layout, alloc, &mut sub_slots, sub)?);
            }
            Node::File(file) => {
                let size = u32::try_from(file.len).map_err(|_| ImageError::FileTooLarge {
                    path: path.clone(),
                    len: file.len,
                })?;
                let chain = write_payload(image, layout, alloc, &path, file, size)?;
                image.write(slot, &DirEntry::file(short, chain.first as u16, size).encode())?;
                placed.push(PlacedEntry {
                    path,
                    is_dir: false,
                    chain,
                    size,
                    slot,
                });
            }
        }
    }

    Ok(placed)
}

/// Assemble a complete disk image in memory.
pub fn build_image(
    geometry: DiskGeometry,
    boot_sector: &[u8],
    bootloader: &[u8],
    label: &str,
    root: &Directory,
) -> Result<BuiltImage, ImageError> {
    let layout = Layout::new(geometry)?;
    let label = ShortName::new(label)?;
    let mut image = ImageBuffer::new(layout.geometry.image_size);

    info!("Writing boot sector and bootloader...");
    boot::write_boot_code(&mut image, &layout, boot_sector, bootloader)?;

    info!("Generating MBR...");
    boot::write_mbr(&mut image, &layout)?;

    info!("Generating FAT FS...");
    boot::write_bpb(&mut image, &layout)?;
    let mut alloc = ClusterAllocator::new(&layout);
    alloc.reserve_media_entries(&mut image)?;

    let mut root_slots = DirSlots::new(String::new(), layout.root_dir_offset, layout.root_capacity());
    let label_slot = root_slots.take()?;
    image.write(label_slot, &DirEntry::volume_label(label).encode())?;

    info!("Copying {} entries...", root.count());
    let entries = write_directory(&mut image, &layout, &mut alloc, &mut root_slots, root)?;

    let used = alloc.next_cluster() - crate::layout::FIRST_ALLOCATABLE_CLUSTER;
    info!(
        "Data region at {:#x}: {used} of {} clusters used",
        layout.data_start(),
        layout.max_cluster - 2
    );

    Ok(BuiltImage {
        bytes: image.into_inner(),
        layout,
        entries,
    })
}
