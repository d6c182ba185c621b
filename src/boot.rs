/// MBR partition entry and FAT BIOS Parameter Block.
///
/// Both structures are written from declarative field tables so the offsets
/// live in exactly one place.
use crate::buffer::{Field, ImageBuffer};
use crate::error::ImageError;
use crate::layout::Layout;
use log::debug;

pub const SECTOR_SIZE: usize = 512;
pub const BOOTLOADER_OFFSET: usize = 512;
pub const MBR_ENTRY_OFFSET: usize = 0x1BE;

pub const MBR_BOOTABLE: u8 = 0x80;
/// FAT16 with LBA addressing.
pub const MBR_TYPE_FAT16_LBA: u8 = 0x0E;

pub const OEM_NAME: &[u8; 8] = b"MSWIN4.1";
pub const OEM_NAME_OFFSET: usize = 0x03;

pub mod mbr {
    use super::Field;

    pub const BOOT_INDICATOR: Field = Field::new("boot_indicator", 0x00, 1);
    pub const PARTITION_TYPE: Field = Field::new("partition_type", 0x04, 1);
    pub const LBA_START: Field = Field::new("lba_start", 0x08, 4);
    pub const LBA_COUNT: Field = Field::new("lba_count", 0x0C, 4);
}

pub mod bpb {
    use super::Field;

    pub const BYTES_PER_SECTOR: Field = Field::new("bytes_per_sector", 0x0B, 2);
    pub const SECTORS_PER_CLUSTER: Field = Field::new("sectors_per_cluster", 0x0D, 1);
    pub const RESERVED_SECTORS: Field = Field::new("reserved_sectors", 0x0E, 2);
    pub const FAT_COUNT: Field = Field::new("fat_count", 0x10, 1);
    pub const ROOT_ENTRIES: Field = Field::new("root_entries", 0x11, 2);
    pub const MEDIA_DESCRIPTOR: Field = Field::new("media_descriptor", 0x15, 1);
    pub const SECTORS_PER_FAT: Field = Field::new("sectors_per_fat", 0x16, 2);
    pub const HIDDEN_SECTORS: Field = Field::new("hidden_sectors", 0x1C, 4);
    // The 16-bit count at 0x13 stays zero; readers fall back to this one.
    pub const TOTAL_SECTORS: Field = Field::new("total_sectors", 0x20, 4);
}

fn mbr_fields(layout: &Layout) -> [(Field, u64); 4] {
    [
        (mbr::BOOT_INDICATOR, MBR_BOOTABLE as u64),
        (mbr::PARTITION_TYPE, MBR_TYPE_FAT16_LBA as u64),
        (mbr::LBA_START, layout.geometry.first_partition_sector as u64),
        (mbr::LBA_COUNT, layout.total_sectors as u64),
    ]
}

fn bpb_fields(layout: &Layout) -> [(Field, u64); 9] {
    let g = &layout.geometry;
    [
        (bpb::BYTES_PER_SECTOR, g.bytes_per_sector as u64),
        (bpb::SECTORS_PER_CLUSTER, g.sectors_per_cluster as u64),
        (bpb::RESERVED_SECTORS, g.reserved_sectors as u64),
        (bpb::FAT_COUNT, g.fat_count as u64),
        (bpb::ROOT_ENTRIES, g.root_entries as u64),
        (bpb::MEDIA_DESCRIPTOR, g.media_descriptor as u64),
        (bpb::SECTORS_PER_FAT, g.sectors_per_fat as u64),
        (bpb::HIDDEN_SECTORS, g.hidden_sectors as u64),
        (bpb::TOTAL_SECTORS, layout.total_sectors as u64),
    ]
}

/// Copy the boot sector to sector 0 and the bootloader right after it.
///
/// The bootloader must end before the partition starts.
pub fn write_boot_code(
    image: &mut ImageBuffer,
    layout: &Layout,
    boot_sector: &[u8],
    bootloader: &[u8],
) -> Result<(), ImageError> {
    if boot_sector.len() > SECTOR_SIZE {
        return Err(ImageError::BootSectorTooLarge {
            len: boot_sector.len(),
            max: SECTOR_SIZE,
        });
    }
    let loader_max = layout.partition_offset.saturating_sub(BOOTLOADER_OFFSET);
    if bootloader.len() > loader_max {
        return Err(ImageError::BootloaderTooLarge {
            len: bootloader.len(),
            max: loader_max,
        });
    }

    debug!("Boot sector: {} bytes at 0x0", boot_sector.len());
    image.write(0, boot_sector)?;
    debug!(
        "Bootloader: {} bytes at {BOOTLOADER_OFFSET:#x}",
        bootloader.len()
    );
    image.write(BOOTLOADER_OFFSET, bootloader)?;
    Ok(())
}

/// Fill in partition entry 0 of the MBR.
pub fn write_mbr(image: &mut ImageBuffer, layout: &Layout) -> Result<(), ImageError> {
    debug!(
        "MBR: partition 0 at LBA {} ({} sectors)",
        layout.geometry.first_partition_sector, layout.total_sectors
    );
    image.write_fields(MBR_ENTRY_OFFSET, &mbr_fields(layout))
}

/// Write the BIOS Parameter Block at the start of the partition.
pub fn write_bpb(image: &mut ImageBuffer, layout: &Layout) -> Result<(), ImageError> {
    let base = layout.partition_offset;
    debug!("BPB at {base:#x}");
    image.write(base + OEM_NAME_OFFSET, OEM_NAME)?;
    image.write_fields(base, &bpb_fields(layout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::DiskGeometry;

    fn read_field(image: &ImageBuffer, base: usize, field: &Field) -> u64 {
        let bytes = image.slice(base + field.offset, field.width).unwrap();
        let mut le = [0u8; 8];
        le[..field.width].copy_from_slice(bytes);
        u64::from_le_bytes(le)
    }

    fn setup() -> (ImageBuffer, Layout) {
        let layout = Layout::new(DiskGeometry::default()).unwrap();
        (ImageBuffer::new(layout.geometry.image_size), layout)
    }

    #[test]
    fn test_mbr_entry() {
        let (mut image, layout) = setup();
        write_mbr(&mut image, &layout).unwrap();

        let raw = image.slice(MBR_ENTRY_OFFSET, 16).unwrap();
        assert_eq!(raw[0], 0x80);
        assert_eq!(raw[4], 0x0E);
        assert_eq!(&raw[8..12], &128u32.to_le_bytes());
        assert_eq!(&raw[12..16], &(32768u32 - 128).to_le_bytes());
    }

    #[test]
    fn test_bpb_fields() {
        let (mut image, layout) = setup();
        write_bpb(&mut image, &layout).unwrap();
        let base = layout.partition_offset;

        assert_eq!(image.slice(base + 3, 8).unwrap(), b"MSWIN4.1");
        for (field, value) in bpb_fields(&layout) {
            assert_eq!(read_field(&image, base, &field), value, "{}", field.name);
        }
        assert_eq!(read_field(&image, base, &bpb::BYTES_PER_SECTOR), 512);
        assert_eq!(read_field(&image, base, &bpb::SECTORS_PER_CLUSTER), 8);
        assert_eq!(read_field(&image, base, &bpb::ROOT_ENTRIES), 512);
        assert_eq!(read_field(&image, base, &bpb::MEDIA_DESCRIPTOR), 0xFF);
        assert_eq!(read_field(&image, base, &bpb::TOTAL_SECTORS), 32640);
        // Legacy 16-bit total sector count is left empty
        assert_eq!(image.read_u16_le(base + 0x13).unwrap(), 0);
    }

    #[test]
    fn test_boot_code_placement() {
        let (mut image, layout) = setup();
        write_boot_code(&mut image, &layout, &[0xAA; 512], &[0xBB; 100]).unwrap();
        assert!(image.slice(0, 512).unwrap().iter().all(|&b| b == 0xAA));
        assert!(image.slice(512, 100).unwrap().iter().all(|&b| b == 0xBB));
        assert_eq!(image.slice(612, 1).unwrap(), &[0]);
    }

    #[test]
    fn test_boot_code_limits() {
        let (mut image, layout) = setup();
        assert_eq!(
            write_boot_code(&mut image, &layout, &[0; 513], &[]),
            Err(ImageError::BootSectorTooLarge { len: 513, max: 512 })
        );

        let max = layout.partition_offset - BOOTLOADER_OFFSET;
        assert!(write_boot_code(&mut image, &layout, &[], &vec![1; max]).is_ok());
        assert_eq!(
            write_boot_code(&mut image, &layout, &[], &vec![1; max + 1]),
            Err(ImageError::BootloaderTooLarge { len: max + 1, max })
        );
    }
}
