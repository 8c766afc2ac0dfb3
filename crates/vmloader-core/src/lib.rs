//! Core loader functionality.
//!
//! This crate holds the pieces every image format shares: guest address
//! types, the [`GuestMemory`] and [`FirmwareConfig`] collaborator traits,
//! and the [`RomRegistry`] that collects image regions while a machine is
//! being assembled and writes them into guest memory on reset.
//!
//! Format parsers live in their own crates and only ever talk to the
//! registry. A parser that fails half way through can be undone by wrapping
//! it in a registry transaction:
//!
//! ```
//! # use vmloader_core::{LoaderError, RomRegistry};
//! let mut registry = RomRegistry::new();
//!
//! let result: Result<(), LoaderError> = registry.transaction(|registry| {
//!     registry.add_blob_fixed("header", vec![0u8; 64], 0x8000_0000u64)?;
//!     Err(LoaderError::Other("bad payload"))
//! });
//!
//! assert!(result.is_err());
//! assert!(registry.is_empty());
//! ```

mod core;
mod error;
mod firmware;
mod mapped;
mod memory;
mod registry;
mod rom;
mod segment;

pub use self::{
    core::{AddressSpace, Hex, HexDump, MemoryAccess, Pa, RegionHandle},
    error::{LoaderError, Overlap, Overlaps, RomSpan},
    firmware::{FirmwareConfig, FirmwareFiles},
    mapped::{MappedFile, MappedSlice},
    memory::{GuestMemory, PagedMemory},
    registry::{
        BlobOptions, FileOptions, ResetMode, RomGap, RomRegistry, get_image_size,
        load_image_size,
    },
    rom::{FwFile, Placement, Rom, RomBacking, RomData, RomId, RomInfo},
    segment::{ImageInfo, Segment},
};
