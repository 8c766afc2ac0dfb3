use serde::{Deserialize, Serialize};

use crate::{MemoryAccess, Pa};

/// A loadable segment described by an image header.
///
/// Parsers produce segments while walking their format's header table;
/// segments only drive region creation and are not kept by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// The link-time virtual address.
    pub vaddr: u64,

    /// The link-time physical address.
    pub paddr: u64,

    /// The address the segment was placed at.
    pub address: Pa,

    /// Offset of the segment content in the file.
    pub offset: u64,

    /// Number of bytes taken from the file.
    pub file_size: u64,

    /// Number of bytes occupied in memory. The tail past `file_size`
    /// is zero-filled.
    pub mem_size: u64,

    /// Access permissions.
    pub access: MemoryAccess,

    /// Alignment requested by the header.
    pub align: u64,
}

impl Segment {
    /// Returns one past the last placed address.
    pub fn end(&self) -> Pa {
        self.address.wrapping_add(self.mem_size)
    }
}

/// The result of a successful image parse.
///
/// Consumed by boot code to set up the initial program counter and
/// any architecture-specific boot registers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    /// The entry point, if the format declares one.
    pub entry: Option<Pa>,

    /// Difference between the chosen load address and the link address.
    pub bias: i64,

    /// Lowest occupied address.
    pub low: Pa,

    /// One past the highest occupied address.
    pub high: Pa,

    /// Number of bytes loaded.
    pub size: u64,
}

impl ImageInfo {
    /// Creates the result for a single flat blob.
    pub fn flat(address: Pa, size: u64, entry: Option<Pa>) -> Self {
        Self {
            entry,
            bias: 0,
            low: address,
            high: address.wrapping_add(size),
            size,
        }
    }
}
