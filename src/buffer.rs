/// In-memory disk image.
///
/// The whole image is allocated once, zero-filled, and every write is
/// checked against its size. Scalars are always little-endian.
use crate::error::ImageError;

/// A fixed-width little-endian scalar at a known offset.
///
/// Offsets are relative to whatever base the table is written at
/// (see [`ImageBuffer::write_fields`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub offset: usize,
    pub width: usize,
}

impl Field {
    pub const fn new(name: &'static str, offset: usize, width: usize) -> Self {
        Field {
            name,
            offset,
            width,
        }
    }
}

pub struct ImageBuffer {
    data: Vec<u8>,
}

impl ImageBuffer {
    pub fn new(size: usize) -> Self {
        ImageBuffer {
            data: vec![0u8; size],
        }
    }

    fn span(&self, offset: usize, len: usize) -> Result<std::ops::Range<usize>, ImageError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(offset..end),
            _ => Err(ImageError::OutOfBounds {
                offset,
                len,
                capacity: self.data.len(),
            }),
        }
    }

    /// Copy `bytes` into the image at `offset`.
    pub fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<(), ImageError> {
        let range = self.span(offset, bytes.len())?;
        self.data[range].copy_from_slice(bytes);
        Ok(())
    }

    pub fn write_u16_le(&mut self, offset: usize, value: u16) -> Result<(), ImageError> {
        self.write(offset, &value.to_le_bytes())
    }

    /// Write `value` into `field`, relative to `base`.
    pub fn write_field(&mut self, base: usize, field: &Field, value: u64) -> Result<(), ImageError> {
        if !matches!(field.width, 1 | 2 | 4 | 8)
            || (field.width < 8 && value >> (field.width * 8) != 0)
        {
            return Err(ImageError::FieldOverflow {
                field: field.name,
                width: field.width,
                value,
            });
        }
        let bytes = value.to_le_bytes();
        self.write(base + field.offset, &bytes[..field.width])
    }

    /// Write a table of `(field, value)` pairs at `base`.
    pub fn write_fields(&mut self, base: usize, fields: &[(Field, u64)]) -> Result<(), ImageError> {
        for (field, value) in fields {
            self.write_field(base, field, *value)?;
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn slice(&self, offset: usize, len: usize) -> Result<&[u8], ImageError> {
        let range = self.span(offset, len)?;
        Ok(&self.data[range])
    }

    #[cfg(test)]
    pub fn read_u16_le(&self, offset: usize) -> Result<u16, ImageError> {
        let b = self.slice(offset, 2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}
