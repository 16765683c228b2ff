//! Read access for the ABI walkers.
//!
//! Readers never share a stream position. Every read takes a [`Cursor`] by value and hands
//! back the advanced one, so peeking is just keeping the old cursor around.

use object::{Endian, Endianness};

use crate::image::Image;
use crate::relocation::ReconstructedBuffer;
use crate::utils::{read_c_string, MAX_C_STRING};

/// Pointer width of every supported target.
pub const POINTER_SIZE: u64 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cursor(u64);

impl Cursor {
    pub fn at(address: u64) -> Self {
        Self(address)
    }

    pub fn position(self) -> u64 {
        self.0
    }

    pub fn advance(self, bytes: u64) -> Self {
        Self(self.0.wrapping_add(bytes))
    }
}

/// Reconstructed regions first, raw image bytes second.
#[derive(Clone, Copy)]
pub struct DataView<'a> {
    regions: &'a [ReconstructedBuffer],
    image: &'a dyn Image,
    endianness: Endianness,
}

impl<'a> DataView<'a> {
    pub fn new(
        regions: &'a [ReconstructedBuffer],
        image: &'a dyn Image,
        endianness: Endianness,
    ) -> Self {
        Self {
            regions,
            image,
            endianness,
        }
    }

    pub fn regions(&self) -> &'a [ReconstructedBuffer] {
        self.regions
    }

    pub fn region_containing(&self, address: u64) -> Option<&'a ReconstructedBuffer> {
        self.regions.iter().find(|region| region.contains(address))
    }

    pub fn in_region(&self, address: u64) -> bool {
        self.region_containing(address).is_some()
    }

    pub fn read_u64(&self, address: u64) -> Option<u64> {
        if let Some(region) = self.region_containing(address) {
            return region.read_u64(address);
        }
        let bytes = self.image.bytes_at(address)?.get(..8)?.try_into().ok()?;
        Some(self.endianness.read_u64_bytes(bytes))
    }

    pub fn read_u32(&self, address: u64) -> Option<u32> {
        if let Some(region) = self.region_containing(address) {
            return region.read_u32(address);
        }
        let bytes = self.image.bytes_at(address)?.get(..4)?.try_into().ok()?;
        Some(self.endianness.read_u32_bytes(bytes))
    }

    /// Reads one pointer-sized word.
    pub fn read_ptr(&self, cursor: Cursor) -> Option<(u64, Cursor)> {
        let value = self.read_u64(cursor.position())?;
        Some((value, cursor.advance(POINTER_SIZE)))
    }

    pub fn read_word(&self, cursor: Cursor) -> Option<(u32, Cursor)> {
        let value = self.read_u32(cursor.position())?;
        Some((value, cursor.advance(4)))
    }

    /// Name strings are never relocated, so they come straight from the image.
    pub fn c_string(&self, address: u64) -> Option<String> {
        let bytes = self.image.bytes_at(address)?;
        Some(read_c_string(bytes, MAX_C_STRING)).filter(|s| !s.is_empty())
    }

    pub fn image(&self) -> &'a dyn Image {
        self.image
    }
}
