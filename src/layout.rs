/// Disk geometry and the byte layout derived from it.
///
/// Layout (defaults, 512-byte sectors):
///   Sector 0:        boot sector + MBR partition table (entry 0 at 0x1BE)
///   Sector 1..128:   bootloader
///   Sector 128:      FAT boot sector / BPB (partition start)
///   Sector 136:      FAT #0 (256 sectors)
///   Sector 392:      FAT #1 (256 sectors)
///   Sector 648:      root directory (512 entries, 32 sectors)
///   Sector 680..:    data region, cluster 2 first
use crate::error::ImageError;

pub const DIRENT_SIZE: usize = 32;

/// First cluster handed out by the allocator. Clusters 0 and 1 are reserved
/// by FAT; cluster 2 is left unused.
pub const FIRST_ALLOCATABLE_CLUSTER: u32 = 3;

/// Highest cluster number a FAT16 chain can address before the
/// reserved/bad/end-of-chain range starting at 0xFFF0.
const FAT16_MAX_CLUSTER: u32 = 0xFFEF;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskGeometry {
    pub image_size: usize,
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub fat_count: u8,
    pub root_entries: u16,
    pub sectors_per_fat: u16,
    pub hidden_sectors: u32,
    pub first_partition_sector: u32,
    pub media_descriptor: u8,
}

impl Default for DiskGeometry {
    fn default() -> Self {
        DiskGeometry {
            image_size: 16 * 1024 * 1024,
            bytes_per_sector: 512,
            sectors_per_cluster: 8,
            reserved_sectors: 8,
            fat_count: 2,
            root_entries: 512,
            sectors_per_fat: 256,
            hidden_sectors: 128,
            first_partition_sector: 128,
            media_descriptor: 0xFF,
        }
    }
}

/// Byte offsets derived from a [`DiskGeometry`]. Computed once per build;
/// nothing else recomputes geometry.
#[derive(Debug, Clone)]
pub struct Layout {
    pub geometry: DiskGeometry,
    pub total_sectors: u32,
    pub cluster_size: usize,
    pub partition_offset: usize,
    pub fat0_offset: usize,
    pub fat1_offset: usize,
    pub root_dir_offset: usize,
    pub root_dir_end: usize,
    pub max_cluster: u32,
}

impl Layout {
    pub fn new(geometry: DiskGeometry) -> Result<Self, ImageError> {
        let g = &geometry;
        let bps = g.bytes_per_sector as usize;
        if bps == 0 || g.sectors_per_cluster == 0 || g.sectors_per_fat == 0 {
            return Err(ImageError::Geometry(
                "sector, cluster and FAT sizes must be non-zero".into(),
            ));
        }
        if g.fat_count != 2 {
            return Err(ImageError::Geometry(format!(
                "exactly two FAT copies are written, geometry asks for {}",
                g.fat_count
            )));
        }
        if g.image_size % bps != 0 {
            return Err(ImageError::Geometry(format!(
                "image size {} is not a whole number of {bps}-byte sectors",
                g.image_size
            )));
        }

        let image_sectors = g.image_size / bps;
        let total_sectors = image_sectors
            .checked_sub(g.first_partition_sector as usize)
            .filter(|&n| n > 0)
            .ok_or_else(|| {
                ImageError::Geometry(format!(
                    "partition start sector {} is past the end of a {image_sectors}-sector image",
                    g.first_partition_sector
                ))
            })?;
        let total_sectors = u32::try_from(total_sectors)
            .map_err(|_| ImageError::Geometry("image too large for 32-bit sector count".into()))?;

        let cluster_size = bps * g.sectors_per_cluster as usize;
        let partition_offset = bps * g.first_partition_sector as usize;
        let fat_size = bps * g.sectors_per_fat as usize;
        let fat0_offset = bps * (g.first_partition_sector as usize + g.reserved_sectors as usize);
        let fat1_offset = fat0_offset + fat_size;
        let root_dir_offset = fat1_offset + fat_size;
        let root_dir_end = root_dir_offset + g.root_entries as usize * DIRENT_SIZE;

        if root_dir_end > g.image_size {
            return Err(ImageError::Geometry(format!(
                "root directory ends at {root_dir_end:#x}, past image end {:#x}",
                g.image_size
            )));
        }

        // Highest cluster whose whole span fits in the image, capped by the
        // number of 16-bit slots in one FAT copy.
        let data_clusters = (g.image_size - root_dir_end) / cluster_size;
        let by_data = (data_clusters + 1) as u64;
        let by_fat = ((fat_size / 2) as u64).saturating_sub(1);
        let max_cluster = by_data.min(by_fat).min(FAT16_MAX_CLUSTER as u64) as u32;
        if max_cluster < FIRST_ALLOCATABLE_CLUSTER {
            return Err(ImageError::Geometry(
                "no room for any data cluster".into(),
            ));
        }

        Ok(Layout {
            geometry,
            total_sectors,
            cluster_size,
            partition_offset,
            fat0_offset,
            fat1_offset,
            root_dir_offset,
            root_dir_end,
            max_cluster,
        })
    }

    /// Start of the data region (cluster 2).
    pub fn data_start(&self) -> usize {
        self.root_dir_end
    }

    pub fn cluster_to_offset(&self, cluster: u32) -> usize {
        debug_assert!(cluster >= 2, "clusters 0 and 1 have no data");
        self.root_dir_end + self.cluster_size * (cluster as usize - 2)
    }

    /// Byte offset of `cluster`'s 16-bit entry in each FAT copy.
    pub fn fat_entry_offsets(&self, cluster: u32) -> [usize; 2] {
        let idx = cluster as usize * 2;
        [self.fat0_offset + idx, self.fat1_offset + idx]
    }

    pub fn root_capacity(&self) -> usize {
        self.geometry.root_entries as usize
    }

    pub fn subdir_capacity(&self) -> usize {
        self.cluster_size / DIRENT_SIZE
    }

    pub fn clusters_for(&self, byte_length: usize) -> usize {
        byte_length.div_ceil(self.cluster_size)
    }
}
