/// 32-byte FAT directory entries with 8.3 short names.
use crate::error::ImageError;
use crate::layout::DIRENT_SIZE;
use bitflags::bitflags;

pub const SHORT_NAME_LEN: usize = 11;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Attributes: u8 {
        const VOLUME_ID = 0x08;
        const DIRECTORY = 0x10;
        const ARCHIVE = 0x20;
    }
}

/// An 11-byte, space-padded name field.
///
/// Names are taken verbatim: no case folding and no splitting at the dot.
/// Anything longer than 11 bytes is rejected, never truncated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortName([u8; SHORT_NAME_LEN]);

impl ShortName {
    pub fn new(name: &str) -> Result<Self, ImageError> {
        let bytes = name.as_bytes();
        if bytes.is_empty() || bytes.len() > SHORT_NAME_LEN {
            return Err(ImageError::InvalidName {
                name: name.to_string(),
            });
        }
        let mut raw = [b' '; SHORT_NAME_LEN];
        raw[..bytes.len()].copy_from_slice(bytes);
        Ok(ShortName(raw))
    }

    pub fn as_bytes(&self) -> &[u8; SHORT_NAME_LEN] {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    pub name: ShortName,
    pub attributes: Attributes,
    pub first_cluster: u16,
    pub size: u32,
}

impl DirEntry {
    pub fn volume_label(name: ShortName) -> Self {
        DirEntry {
            name,
            attributes: Attributes::VOLUME_ID,
            first_cluster: 0,
            size: 0,
        }
    }

    pub fn directory(name: ShortName, cluster: u16) -> Self {
        DirEntry {
            name,
            attributes: Attributes::DIRECTORY,
            first_cluster: cluster,
            size: 0,
        }
    }

    pub fn file(name: ShortName, cluster: u16, size: u32) -> Self {
        DirEntry {
            name,
            attributes: Attributes::ARCHIVE,
            first_cluster: cluster,
            size,
        }
    }

    /// Serialize to the on-disk layout. Timestamps and the high cluster
    /// word stay zero.
    pub fn encode(&self) -> [u8; DIRENT_SIZE] {
        let mut raw = [0u8; DIRENT_SIZE];
        // DIR_Name
        raw[0..11].copy_from_slice(self.name.as_bytes());
        // DIR_Attr
        raw[11] = self.attributes.bits();
        // DIR_FstClusLO
        raw[26..28].copy_from_slice(&self.first_cluster.to_le_bytes());
        // DIR_FileSize
        raw[28..32].copy_from_slice(&self.size.to_le_bytes());
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_name_padding() {
        assert_eq!(ShortName::new("A.TXT").unwrap().as_bytes(), b"A.TXT      ");
        assert_eq!(
            ShortName::new("KERNEL  BIN").unwrap().as_bytes(),
            b"KERNEL  BIN"
        );
        // No case folding
        assert_eq!(ShortName::new("boot").unwrap().as_bytes(), b"boot       ");
    }

    #[test]
    fn test_short_name_limits() {
        assert!(ShortName::new("ABCDEFGHIJK").is_ok());
        assert_eq!(
            ShortName::new("ABCDEFGHIJKL"),
            Err(ImageError::InvalidName {
                name: "ABCDEFGHIJKL".into()
            })
        );
        assert!(ShortName::new("").is_err());
    }

    #[test]
    fn test_encode_file() {
        let entry = DirEntry::file(ShortName::new("A.TXT").unwrap(), 3, 1000);
        let raw = entry.encode();
        assert_eq!(&raw[0..11], b"A.TXT      ");
        assert_eq!(raw[11], 0x20);
        assert_eq!(&raw[12..26], &[0u8; 14]);
        assert_eq!(&raw[26..28], &[3, 0]);
        assert_eq!(&raw[28..32], &1000u32.to_le_bytes());
    }

    #[test]
    fn test_encode_directory_and_label() {
        let dir = DirEntry::directory(ShortName::new("SUB").unwrap(), 0x1234).encode();
        assert_eq!(dir[11], Attributes::DIRECTORY.bits());
        assert_eq!(&dir[26..28], &[0x34, 0x12]);
        assert_eq!(&dir[28..32], &[0; 4]);

        let label = DirEntry::volume_label(ShortName::new("NEKO").unwrap()).encode();
        assert_eq!(label[11], 0x08);
        assert_eq!(&label[26..32], &[0; 6]);
    }
}
