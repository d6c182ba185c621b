/// Sequential cluster allocator and FAT writer.
///
/// Clusters are handed out strictly in order and never reused, so every
/// chain is a run of consecutive cluster numbers and its payload is
/// contiguous in the data region. Both FAT copies are written together.
use crate::buffer::ImageBuffer;
use crate::error::ImageError;
use crate::layout::{Layout, FIRST_ALLOCATABLE_CLUSTER};

pub const FAT16_EOC: u16 = 0xFFFF;

/// A run of consecutive clusters. `first == 0` means no clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterChain {
    pub first: u32,
    pub len: usize,
}

impl ClusterChain {
    pub const EMPTY: ClusterChain = ClusterChain { first: 0, len: 0 };

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clusters(&self) -> impl Iterator<Item = u32> {
        let first = self.first;
        (0..self.len as u32).map(move |i| first + i)
    }
}

pub struct ClusterAllocator<'a> {
    layout: &'a Layout,
    next_cluster: u32,
}

impl<'a> ClusterAllocator<'a> {
    pub fn new(layout: &'a Layout) -> Self {
        ClusterAllocator {
            layout,
            next_cluster: FIRST_ALLOCATABLE_CLUSTER,
        }
    }

    pub fn next_cluster(&self) -> u32 {
        self.next_cluster
    }

    /// Fill FAT entries 0 (media descriptor) and 1 (end-of-chain marker).
    pub fn reserve_media_entries(&self, image: &mut ImageBuffer) -> Result<(), ImageError> {
        let media = 0xFF00 | self.layout.geometry.media_descriptor as u16;
        self.write_entry(image, 0, media)?;
        self.write_entry(image, 1, FAT16_EOC)
    }

    fn write_entry(&self, image: &mut ImageBuffer, cluster: u32, value: u16) -> Result<(), ImageError> {
        for offset in self.layout.fat_entry_offsets(cluster) {
            image.write_u16_le(offset, value)?;
        }
        Ok(())
    }

    /// Allocate enough clusters for `byte_length` bytes and link them in
    /// both FATs. Zero bytes yields [`ClusterChain::EMPTY`] and touches
    /// nothing. On failure the allocator is left unchanged.
    pub fn allocate_chain(
        &mut self,
        image: &mut ImageBuffer,
        byte_length: usize,
    ) -> Result<ClusterChain, ImageError> {
        let count = self.layout.clusters_for(byte_length);
        if count == 0 {
            return Ok(ClusterChain::EMPTY);
        }

        let first = self.next_cluster;
        let last = (first as u64) + (count as u64) - 1;
        if last > self.layout.max_cluster as u64 {
            return Err(ImageError::VolumeFull {
                clusters: count,
                next: first,
                max: self.layout.max_cluster,
            });
        }

        let chain = ClusterChain { first, len: count };
        for (i, current) in chain.clusters().enumerate() {
            let link = if i + 1 < count {
                (current + 1) as u16
            } else {
                FAT16_EOC
            };
            self.write_entry(image, current, link)?;
        }
        self.next_cluster += count as u32;
        Ok(chain)
    }

    /// A directory gets exactly one cluster, marked end-of-chain.
    pub fn allocate_directory(&mut self, image: &mut ImageBuffer) -> Result<ClusterChain, ImageError> {
        self.allocate_chain(image, self.layout.cluster_size)
    }
}
